// Copyright 2018 The Grin Developers
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

//! C5, the fetcher (§4.5): handles unsolicited announcements and
//! broadcasts outside of a sync round -- single-block retrieval,
//! arrival-time fairness, a DOS cap on announcements per peer per window,
//! and fan-out propagation of newly accepted blocks.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, warn};
use parking_lot::Mutex;

use krypton_chain::{Chain, Options};
use krypton_core::core::block::{Block, BlockHeader};
use krypton_core::core::hash::{Hash, Hashed};
use krypton_p2p::{Peer, PeerAddr, Peers};

use crate::event_bus::{Event, EventBus};

/// Tunables governing the fetcher's DOS resistance and orphan-parking
/// patience, generalized from `krypton_config::SyncConfig` (§9 resolution
/// 2).
#[derive(Clone, Copy, Debug)]
pub struct FetcherConfig {
	/// Width, in seconds, of the sliding window an announcement count is
	/// measured over.
	pub announce_window_secs: u64,
	/// Announcements a single peer may make within one window before
	/// further ones are silently dropped.
	pub max_announces_per_window: u32,
	/// How long a block may sit waiting for its parent before it's
	/// dropped rather than imported.
	pub pending_parent_timeout_secs: u64,
}

impl From<&krypton_config::SyncConfig> for FetcherConfig {
	fn from(cfg: &krypton_config::SyncConfig) -> FetcherConfig {
		FetcherConfig {
			announce_window_secs: cfg.announce_window_secs,
			max_announces_per_window: cfg.max_announces_per_window,
			pending_parent_timeout_secs: cfg.pending_parent_timeout_secs,
		}
	}
}

struct Announcement {
	number: u64,
	origin: PeerAddr,
	arrival: Instant,
}

struct AnnounceWindow {
	count: u32,
	window_start: Instant,
}

struct PendingBlock {
	block: Block,
	parked_at: Instant,
}

/// Handles announcements and broadcasts that arrive outside of an active
/// sync round. Owns its own small "pending parent" set, independent of
/// the chain's orphan pool, keyed by announcement/broadcast rather than
/// fully-verified import.
pub struct Fetcher {
	chain: Arc<Chain>,
	peers: Arc<Peers>,
	events: Arc<EventBus>,
	config: FetcherConfig,

	announcements: Mutex<HashMap<Hash, Announcement>>,
	claimed: Mutex<HashSet<Hash>>,
	awaiting_body: Mutex<HashMap<PeerAddr, Hash>>,
	announce_windows: Mutex<HashMap<PeerAddr, AnnounceWindow>>,
	pending: Mutex<HashMap<Hash, Vec<PendingBlock>>>,
	dos_dropped: AtomicU64,
}

impl Fetcher {
	/// Builds a fetcher over the chain/peer registry/event bus it
	/// coordinates between.
	pub fn new(chain: Arc<Chain>, peers: Arc<Peers>, events: Arc<EventBus>, config: FetcherConfig) -> Arc<Fetcher> {
		Arc::new(Fetcher {
			chain,
			peers,
			events,
			config,
			announcements: Mutex::new(HashMap::new()),
			claimed: Mutex::new(HashSet::new()),
			awaiting_body: Mutex::new(HashMap::new()),
			announce_windows: Mutex::new(HashMap::new()),
			pending: Mutex::new(HashMap::new()),
			dos_dropped: AtomicU64::new(0),
		})
	}

	/// How many announcements this fetcher has dropped for exceeding a
	/// peer's DOS window, for metrics/logging.
	pub fn dos_dropped_total(&self) -> u64 {
		self.dos_dropped.load(Ordering::Relaxed)
	}

	/// A peer announced `hash`/`number` without the body (§4.5
	/// `NewBlockHashes`). First announcer wins the retrieval slot;
	/// duplicates from other peers are ignored rather than re-requested.
	pub fn on_announce(&self, hash: Hash, number: u64, origin: PeerAddr) {
		if self.chain.block_exists(&hash).unwrap_or(false) {
			return;
		}
		if self.dos_capped(origin) {
			self.dos_dropped.fetch_add(1, Ordering::Relaxed);
			return;
		}
		{
			let mut anns = self.announcements.lock();
			if anns.contains_key(&hash) {
				return;
			}
			anns.insert(hash, Announcement { number, origin, arrival: Instant::now() });
		}
		let peer = match self.peers.get(&origin) {
			Some(p) => p,
			None => return,
		};
		use krypton_p2p::msg::GetBlockHeaders;
		if peer
			.send_get_block_headers(GetBlockHeaders {
				start_hash: Some(hash),
				start_number: 0,
				max_headers: 1,
				skip: 0,
				reverse: false,
			})
			.is_err()
		{
			self.announcements.lock().remove(&hash);
		} else {
			self.claimed.lock().insert(hash);
		}
	}

	/// A peer broadcast a full block (§4.5 `NewBlock`). Returns `false`
	/// when the block is intrinsically invalid and the sender should be
	/// penalized, mirroring `p2p::ChainAdapter::block_received`'s
	/// contract.
	pub fn on_broadcast(&self, block: Block, origin: PeerAddr) -> bool {
		self.announcements.lock().remove(&block.hash());
		self.import_or_park(block, Some(origin))
	}

	/// Headers the fetcher claimed a retrieval slot for are consumed here;
	/// anything left over is handed back to the caller (typically the
	/// downloader, via `p2p::ChainAdapter::headers_received`) since it
	/// wasn't this fetcher's request.
	pub fn filter_headers(&self, headers: Vec<BlockHeader>, from: PeerAddr) -> Vec<BlockHeader> {
		let mut remainder = Vec::with_capacity(headers.len());
		for header in headers {
			let hash = header.hash();
			let mut claimed = self.claimed.lock();
			if claimed.remove(&hash) {
				drop(claimed);
				if let Some(peer) = self.peers.get(&from) {
					if peer.send_get_block_bodies(vec![hash]).is_ok() {
						self.awaiting_body.lock().insert(from, hash);
						continue;
					}
				}
				self.announcements.lock().remove(&hash);
			} else {
				remainder.push(header);
			}
		}
		remainder
	}

	/// Bodies answering a fetcher-issued `GetBlockBodies` are consumed
	/// here; anything left over (not a response to an announcement this
	/// fetcher tracked) is handed back to the caller.
	pub fn filter_bodies(&self, bodies: Vec<krypton_core::core::block::BlockBody>, from: PeerAddr) -> Vec<krypton_core::core::block::BlockBody> {
		let expected_hash = self.awaiting_body.lock().remove(&from);
		let header = expected_hash.and_then(|h| self.announcements.lock().get(&h).map(|_| h));
		match (header, bodies.split_first()) {
			(Some(hash), Some((body, rest))) => {
				if let Ok(header) = self.chain.get_header(&hash) {
					let block = Block { header, body: body.clone() };
					self.announcements.lock().remove(&hash);
					self.import_or_park(block, Some(from));
				}
				rest.to_vec()
			}
			_ => bodies,
		}
	}

	fn import_or_park(&self, block: Block, origin: Option<PeerAddr>) -> bool {
		let head = match self.chain.head() {
			Ok(h) => h,
			Err(_) => return true,
		};
		if block.header.number > head.height + 1 {
			debug!("fetcher: parking block {} ahead of head {}", block.header.number, head.height);
			self.pending.lock().entry(block.header.parent_hash).or_default().push(PendingBlock {
				block,
				parked_at: Instant::now(),
			});
			return true;
		}
		match self.chain.process_block(block.clone(), Options::none()) {
			Ok(Some(tip)) => {
				let hash = block.hash();
				self.events.post(Event::ChainHead(tip.clone()));
				self.propagate(&block, tip.total_difficulty, origin);
				self.release_pending(hash);
				true
			}
			Ok(None) => true,
			Err(e) => {
				warn!("fetcher: rejecting block {}: {}", block.hash(), e);
				!e.is_peer_fault()
			}
		}
	}

	fn release_pending(&self, parent: Hash) {
		let ready = self.pending.lock().remove(&parent).unwrap_or_default();
		for pending in ready {
			self.import_or_park(pending.block, None);
		}
	}

	/// Drops any parked block that has outlived `pending_parent_timeout_secs`
	/// without its parent arriving. Meant to be called periodically by the
	/// syncer's housekeeping tick.
	pub fn expire_pending(&self) {
		let timeout = Duration::from_secs(self.config.pending_parent_timeout_secs);
		let mut pending = self.pending.lock();
		pending.retain(|parent, blocks| {
			let before = blocks.len();
			blocks.retain(|p| p.parked_at.elapsed() < timeout);
			if blocks.len() != before {
				debug!("fetcher: expired {} block(s) parked on {}", before - blocks.len(), parent);
			}
			!blocks.is_empty()
		});
	}

	fn propagate(&self, block: &Block, td: krypton_core::core::difficulty::Difficulty, origin: Option<PeerAddr>) {
		let exclude: Vec<PeerAddr> = origin.into_iter().collect();
		let fanout = self.peers.random_fanout(&exclude);
		let mut told: Vec<PeerAddr> = fanout.iter().map(|p: &Arc<Peer>| p.addr()).collect();
		told.extend(exclude.iter().copied());
		for peer in &fanout {
			let _ = peer.send_block(block, td);
		}
		let number = block.header.number;
		let hash = block.hash();
		for peer in self.peers.snapshot() {
			if !told.contains(&peer.addr()) {
				let _ = peer.send_block_hash(hash, number);
			}
		}
	}

	fn dos_capped(&self, addr: PeerAddr) -> bool {
		let mut windows = self.announce_windows.lock();
		let now = Instant::now();
		let window = windows.entry(addr).or_insert(AnnounceWindow { count: 0, window_start: now });
		if now.duration_since(window.window_start) > Duration::from_secs(self.config.announce_window_secs) {
			window.window_start = now;
			window.count = 0;
		}
		window.count += 1;
		window.count > self.config.max_announces_per_window
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn config() -> FetcherConfig {
		FetcherConfig {
			announce_window_secs: 10,
			max_announces_per_window: 2,
			pending_parent_timeout_secs: 60,
		}
	}

	#[test]
	fn dos_cap_trips_after_configured_count() {
		let cfg = config();
		let windows: Mutex<HashMap<PeerAddr, AnnounceWindow>> = Mutex::new(HashMap::new());
		let addr = PeerAddr("127.0.0.1:1".parse().unwrap());
		let capped_after = |n: u32| -> bool {
			let mut windows = windows.lock();
			let now = Instant::now();
			let window = windows.entry(addr).or_insert(AnnounceWindow { count: 0, window_start: now });
			window.count = n;
			window.count > cfg.max_announces_per_window
		};
		assert!(!capped_after(2));
		assert!(capped_after(3));
	}
}
