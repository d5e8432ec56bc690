// Copyright 2016 The Grin Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The peer registry (C1, §4.1): a mapping from peer id (here, address --
//! see `crate::peer` doc comment) to peer record, with serialized
//! mutation and lock-free stable snapshots for iteration. Generalized
//! from the teacher's `p2p::peers::Peers`, same `RwLock<HashMap<..>>`
//! shape, with `best`/`clean_peers`/`ban` added per SPEC_FULL §4.1's
//! concrete API surface.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use rand::seq::SliceRandom;

use krypton_core::core::difficulty::Difficulty;

use crate::peer::Peer;
use crate::store::PeerStore;
use crate::types::{Error, PeerAddr};

/// Tracks every currently connected peer. Mutation (`register`/
/// `unregister`) is serialized by the single `RwLock`; `snapshot` clones
/// the `Arc<Peer>` handles so callers iterate without holding the lock
/// (§4.1 "readers see consistent snapshots").
pub struct Peers {
	store: Arc<PeerStore>,
	peers: RwLock<HashMap<PeerAddr, Arc<Peer>>>,
}

impl Peers {
	/// Builds a registry backed by `store` for ban persistence (§4.3).
	pub fn new(store: Arc<PeerStore>) -> Peers {
		Peers {
			store,
			peers: RwLock::new(HashMap::new()),
		}
	}

	/// Registers a newly handshaken peer. Fails if a peer at this address
	/// is already registered (§4.1 "fails if id already present").
	pub fn register(&self, peer: Arc<Peer>) -> Result<(), Error> {
		let addr = peer.addr();
		let mut peers = self.peers.write();
		if peers.contains_key(&addr) {
			return Err(Error::AlreadyRegistered);
		}
		peers.insert(addr, peer);
		Ok(())
	}

	/// Removes a peer and cancels all of its in-flight requests.
	/// Idempotent: unregistering an address that isn't present is a no-op
	/// (§4.1).
	pub fn unregister(&self, addr: &PeerAddr) {
		if let Some(peer) = self.peers.write().remove(addr) {
			peer.stop();
		}
	}

	/// A stable snapshot of every currently registered peer.
	pub fn snapshot(&self) -> Vec<Arc<Peer>> {
		self.peers.read().values().cloned().collect()
	}

	/// Number of currently registered peers.
	pub fn len(&self) -> usize {
		self.peers.read().len()
	}

	/// Whether the registry holds no peers.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Looks up a peer by address.
	pub fn get(&self, addr: &PeerAddr) -> Option<Arc<Peer>> {
		self.peers.read().get(addr).cloned()
	}

	/// The peer advertising the greatest total difficulty strictly above
	/// `min_td`, ties broken by earliest handshake (§4.1 `best`). Returns
	/// `None` if no connected, non-banned peer qualifies -- the sync
	/// coordinator (C7) treats that as "nothing to sync from".
	pub fn best(&self, min_td: Difficulty) -> Option<Arc<Peer>> {
		self.peers
			.read()
			.values()
			.filter(|p| !p.is_banned())
			.filter(|p| p.head().0 > min_td)
			.max_by_key(|p| (p.head().0, p.connected_since()))
			.cloned()
	}

	/// Disconnects and soft-bans `addr` for `duration_secs`, persisting the
	/// ban so it survives a restart (§4.3, §6 `nodes/`).
	pub fn ban(&self, addr: &PeerAddr, duration_secs: u64) {
		self.unregister(addr);
		if let Err(e) = self.store.ban_peer(addr, duration_secs) {
			log::warn!("peers: failed to persist ban for {}: {}", addr, e);
		}
	}

	/// Whether `addr` is currently under a persisted ban (checked before
	/// dialing or accepting, independent of whether it happens to be
	/// registered right now).
	pub fn is_banned(&self, addr: &PeerAddr) -> bool {
		match self.store.get_peer(addr) {
			Ok(Some(data)) => {
				use crate::store::PeerState;
				data.flags == PeerState::Banned && data.banned_until > now_secs()
			}
			_ => false,
		}
	}

	/// Trims the registry down to `desired_count` connected peers,
	/// disconnecting a random subset of the excess (§5 "global cap on peer
	/// connections"). Keeps the master peer of an active sync round alive
	/// by excluding `keep` from eviction.
	pub fn clean_peers(&self, desired_count: usize, keep: Option<PeerAddr>) {
		let mut addrs: Vec<PeerAddr> = {
			let peers = self.peers.read();
			peers.keys().filter(|a| Some(**a) != keep).cloned().collect()
		};
		if addrs.len() <= desired_count {
			return;
		}
		let excess = addrs.len() - desired_count;
		addrs.shuffle(&mut rand::thread_rng());
		for addr in addrs.into_iter().take(excess) {
			self.unregister(&addr);
		}
	}

	/// A random subset of connected peers, excluding any in `exclude`, of
	/// size `ceil(sqrt(N))` -- the fan-out width used by the fetcher's
	/// propagation step (§4.5 Scenario D: "forwarded to a square-root-sized
	/// random subset of peers that do not yet know it").
	pub fn random_fanout(&self, exclude: &[PeerAddr]) -> Vec<Arc<Peer>> {
		let mut candidates: Vec<Arc<Peer>> =
			self.peers.read().values().filter(|p| !exclude.contains(&p.addr())).cloned().collect();
		candidates.shuffle(&mut rand::thread_rng());
		let n = (candidates.len() as f64).sqrt().ceil() as usize;
		candidates.truncate(n);
		candidates
	}
}

fn now_secs() -> u64 {
	use std::time::{SystemTime, UNIX_EPOCH};
	SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::conn::Connection;
	use crate::types::PeerInfo;
	use krypton_core::core::hash::ZERO_HASH;
	use std::net::{TcpListener, TcpStream};

	fn fake_peer(port: u16, td: u64) -> Arc<Peer> {
		let listener = TcpListener::bind("127.0.0.1:0").unwrap();
		let local = listener.local_addr().unwrap();
		let client = TcpStream::connect(local).unwrap();
		let (server, _) = listener.accept().unwrap();
		drop(server);
		let conn = Connection::new(client).unwrap();
		Peer::new(
			conn,
			PeerInfo {
				capabilities: crate::types::Capabilities::FULL_NODE,
				user_agent: "test".to_owned(),
				version: crate::msg::PROTOCOL_VERSION,
				addr: PeerAddr(format!("127.0.0.1:{}", port).parse().unwrap()),
				total_difficulty: Difficulty::from_num(td),
				head_hash: ZERO_HASH,
				genesis_hash: ZERO_HASH,
			},
		)
	}

	fn new_registry() -> (tempfile::TempDir, Peers) {
		let dir = tempfile::tempdir().unwrap();
		let store = Arc::new(PeerStore::new(dir.path().to_str().unwrap()));
		(dir, Peers::new(store))
	}

	#[test]
	fn register_then_unregister_round_trips() {
		let (_dir, peers) = new_registry();
		let peer = fake_peer(40001, 10);
		peers.register(peer.clone()).unwrap();
		assert_eq!(peers.len(), 1);
		peers.unregister(&peer.addr());
		assert_eq!(peers.len(), 0);
	}

	#[test]
	fn duplicate_register_fails() {
		let (_dir, peers) = new_registry();
		let peer = fake_peer(40002, 10);
		peers.register(peer.clone()).unwrap();
		let dup = fake_peer(40002, 20);
		assert!(peers.register(dup).is_err());
	}

	#[test]
	fn best_picks_greatest_td_above_threshold() {
		let (_dir, peers) = new_registry();
		peers.register(fake_peer(40003, 100)).unwrap();
		peers.register(fake_peer(40004, 500)).unwrap();
		let best = peers.best(Difficulty::from_num(100)).unwrap();
		assert_eq!(best.head().0, Difficulty::from_num(500));
	}

	#[test]
	fn best_returns_none_when_nothing_exceeds_threshold() {
		let (_dir, peers) = new_registry();
		peers.register(fake_peer(40005, 100)).unwrap();
		assert!(peers.best(Difficulty::from_num(100)).is_none());
	}

	#[test]
	fn unregister_is_idempotent() {
		let (_dir, peers) = new_registry();
		let addr = PeerAddr("127.0.0.1:1".parse().unwrap());
		peers.unregister(&addr);
		peers.unregister(&addr);
	}
}
