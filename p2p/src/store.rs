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

//! Persisted peer records under `nodes/` (§6 "Persisted state"):
//! addresses and soft-ban state survive a restart so reselection and the
//! cooldown window (§4.3 "Soft ban policy") aren't reset to zero every
//! time the node comes back up. Generalized from the teacher's
//! `p2p::store::PeerStore`, RLP-backed instead of its native wire format.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use rlp::{DecoderError, Rlp, RlpStream};

use krypton_store::{self as store, Store};

use crate::types::{Capabilities, PeerAddr};

const PEER_PREFIX: u8 = b'p';

/// A peer's soft-ban state (§4.3): promotes under repeated faults, demoted
/// back to `Healthy` is never automatic — only an explicit `unban` (e.g.
/// after the cooldown window elapses) clears a `Banned` peer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PeerState {
	/// No recent faults.
	Healthy,
	/// Has faulted recently but is still usable; further faults ban it.
	Defunct,
	/// Disconnected and excluded from reselection until `banned_until`.
	Banned,
}

impl PeerState {
	fn as_u8(self) -> u8 {
		match self {
			PeerState::Healthy => 0,
			PeerState::Defunct => 1,
			PeerState::Banned => 2,
		}
	}

	fn from_u8(b: u8) -> PeerState {
		match b {
			1 => PeerState::Defunct,
			2 => PeerState::Banned,
			_ => PeerState::Healthy,
		}
	}
}

/// A persisted peer record.
#[derive(Clone, Debug, PartialEq)]
pub struct PeerData {
	/// The peer's last known address.
	pub addr: PeerAddr,
	/// What the peer last claimed to serve.
	pub capabilities: Capabilities,
	/// Free-form client identifier string from the last handshake.
	pub user_agent: String,
	/// Current soft-ban state.
	pub flags: PeerState,
	/// Unix timestamp (seconds) this peer was last connected to.
	pub last_connected: u64,
	/// Unix timestamp (seconds) after which a `Banned` peer becomes
	/// eligible for reselection again (§4.3 cooldown window). Meaningless
	/// unless `flags == Banned`.
	pub banned_until: u64,
}

impl rlp::Encodable for PeerData {
	fn rlp_append(&self, s: &mut RlpStream) {
		s.begin_list(6);
		s.append(&self.addr);
		s.append(&self.capabilities.bits());
		s.append(&self.user_agent);
		s.append(&self.flags.as_u8());
		s.append(&self.last_connected);
		s.append(&self.banned_until);
	}
}

impl rlp::Decodable for PeerData {
	fn decode(rlp: &Rlp<'_>) -> Result<Self, DecoderError> {
		if rlp.item_count()? != 6 {
			return Err(DecoderError::RlpIncorrectListLen);
		}
		let capab_bits: u32 = rlp.val_at(1)?;
		let flags: u8 = rlp.val_at(3)?;
		Ok(PeerData {
			addr: rlp.val_at(0)?,
			capabilities: Capabilities::from_bits_truncate(capab_bits),
			user_agent: rlp.val_at(2)?,
			flags: PeerState::from_u8(flags),
			last_connected: rlp.val_at(4)?,
			banned_until: rlp.val_at(5)?,
		})
	}
}

/// LMDB-backed table of known peer addresses, under the node's `nodes/`
/// directory (§6).
pub struct PeerStore {
	db: Store,
}

impl PeerStore {
	/// Opens (creating if absent) the peer-db under `data_dir`.
	pub fn new(data_dir: &str) -> PeerStore {
		let env = Arc::new(store::lmdb::new_env(data_dir.to_owned()));
		PeerStore {
			db: Store::open(env, "peers"),
		}
	}

	fn key(addr: &PeerAddr) -> Vec<u8> {
		store::to_key(PEER_PREFIX, addr.to_string().as_bytes())
	}

	/// Inserts or overwrites a peer record.
	pub fn save_peer(&self, peer: &PeerData) -> Result<(), store::Error> {
		self.db.put_ser(&Self::key(&peer.addr), peer)
	}

	/// Looks up a peer record by address.
	pub fn get_peer(&self, addr: &PeerAddr) -> Result<Option<PeerData>, store::Error> {
		self.db.get_ser(&Self::key(addr))
	}

	/// All known peer records, in key (address string) order.
	pub fn all_peers(&self) -> Result<Vec<PeerData>, store::Error> {
		self.db.iter(&[PEER_PREFIX])?.collect()
	}

	/// Records `addr` as banned for `duration_secs` from now (§4.3).
	pub fn ban_peer(&self, addr: &PeerAddr, duration_secs: u64) -> Result<(), store::Error> {
		let mut peer = self.get_peer(addr)?.unwrap_or(PeerData {
			addr: *addr,
			capabilities: Capabilities::UNKNOWN,
			user_agent: String::new(),
			flags: PeerState::Healthy,
			last_connected: 0,
			banned_until: 0,
		});
		peer.flags = PeerState::Banned;
		peer.banned_until = now_secs() + duration_secs;
		self.save_peer(&peer)
	}
}

fn now_secs() -> u64 {
	SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn addr(port: u16) -> PeerAddr {
		PeerAddr(format!("127.0.0.1:{}", port).parse().unwrap())
	}

	#[test]
	fn save_and_get_round_trip() {
		let dir = tempfile::tempdir().unwrap();
		let store = PeerStore::new(dir.path().to_str().unwrap());
		let peer = PeerData {
			addr: addr(30303),
			capabilities: Capabilities::FULL_NODE,
			user_agent: "krypton-test/0.1".to_owned(),
			flags: PeerState::Healthy,
			last_connected: 100,
			banned_until: 0,
		};
		store.save_peer(&peer).unwrap();
		let fetched = store.get_peer(&peer.addr).unwrap().unwrap();
		assert_eq!(fetched, peer);
	}

	#[test]
	fn ban_peer_sets_banned_flag_and_window() {
		let dir = tempfile::tempdir().unwrap();
		let store = PeerStore::new(dir.path().to_str().unwrap());
		let a = addr(30304);
		store.ban_peer(&a, 3600).unwrap();
		let peer = store.get_peer(&a).unwrap().unwrap();
		assert_eq!(peer.flags, PeerState::Banned);
		assert!(peer.banned_until > 0);
	}

	#[test]
	fn all_peers_returns_every_saved_record() {
		let dir = tempfile::tempdir().unwrap();
		let store = PeerStore::new(dir.path().to_str().unwrap());
		for port in [30301, 30302, 30303] {
			store
				.save_peer(&PeerData {
					addr: addr(port),
					capabilities: Capabilities::UNKNOWN,
					user_agent: String::new(),
					flags: PeerState::Healthy,
					last_connected: 0,
					banned_until: 0,
				})
				.unwrap();
		}
		assert_eq!(store.all_peers().unwrap().len(), 3);
	}
}
