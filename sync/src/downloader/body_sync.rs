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

//! The `FillingChain` sub-state (§4.4): pulls bodies for an already
//! header-verified skeleton and hands each reassembled block to
//! [`krypton_chain::Chain::process_block`]. Requests are spread across
//! every idle helper peer at once, each sized from that peer's own
//! observed throughput rather than a single shared estimate, with a
//! high/low-water throttle on how much fetched-but-unimported work is
//! allowed to pile up ahead of `process_block` (§4.4 "Throttling"). A
//! malformed batch bans its source and is retried elsewhere; a block that
//! fails chain verification aborts the round outright (§7 `InvalidBlock`).

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Select};
use log::{debug, warn};

use krypton_chain::{Chain, Options};
use krypton_core::consensus::MAX_BODIES_PER_REQUEST;
use krypton_core::core::block::{Block, BlockHeader};
use krypton_core::core::hash::{Hash, Hashed};
use krypton_p2p::{Peer, PeerAddr, Peers, RequestKind};
use krypton_util::{CancelToken, ThroughputEstimator};

use super::helpers::{idle_helpers, DownloaderConfig};
use super::state_sync;
use crate::error::SyncError;
use crate::response_router::ResponseRouter;
use crate::state::{Progress, SyncState, SyncStatus, SyncSubState};

const BODY_TIMEOUT: Duration = Duration::from_secs(30);
const MIN_BATCH: usize = 16;
/// A rough per-body size estimate used only to translate a throughput
/// figure into a request size; actual bodies vary and the estimator
/// corrects itself from observed transfers regardless.
const ASSUMED_BODY_BYTES: f64 = 4_000.0;
/// Target wall-clock time per batch at the current throughput estimate.
const TARGET_BATCH_SECS: f64 = 2.0;

struct InflightBatch {
	peer: Arc<Peer>,
	start: usize,
	len: usize,
	rx: Receiver<Vec<krypton_core::core::block::BlockBody>>,
	requested_at: Instant,
}

/// Downloads bodies for `skeleton` (already verified headers above the
/// common ancestor) and imports each reassembled block in order, fanning
/// requests out across every idle peer in `peers`.
#[allow(clippy::too_many_arguments)]
pub fn fill_chain(
	chain: &Chain,
	peers: &Peers,
	router: &ResponseRouter,
	cancel: &CancelToken,
	sync_state: &SyncState,
	skeleton: &[BlockHeader],
	starting_height: u64,
	highest_height: u64,
	config: &DownloaderConfig,
) -> Result<(), SyncError> {
	let mut estimators: HashMap<PeerAddr, ThroughputEstimator> = HashMap::new();
	let mut work: VecDeque<usize> = (0..skeleton.len()).collect();
	let mut inflight: HashMap<PeerAddr, InflightBatch> = HashMap::new();
	let mut staging: BTreeMap<usize, (Arc<Peer>, Vec<krypton_core::core::block::BlockBody>)> = BTreeMap::new();
	let mut imported = 0usize;
	let mut paused = false;

	while imported < skeleton.len() {
		if cancel.is_cancelled() {
			return Err(SyncError::Cancelled);
		}

		let staged_count: usize = staging.values().map(|(_, b)| b.len()).sum();
		if paused {
			if staged_count <= config.import_queue_low_water {
				paused = false;
			}
		} else if staged_count >= config.import_queue_high_water {
			paused = true;
			debug!("body_sync: import queue high-water hit at {} staged bod(y/ies), pausing assignment", staged_count);
		}

		if !paused && !work.is_empty() && inflight.len() < config.qos_tuning_peers {
			let busy: Vec<PeerAddr> = inflight.keys().cloned().collect();
			for helper in idle_helpers(peers, RequestKind::Bodies, &busy) {
				if inflight.len() >= config.qos_tuning_peers || work.is_empty() {
					break;
				}
				let addr = helper.addr();
				let bytes_per_sec = estimators.entry(addr).or_insert_with(|| ThroughputEstimator::new(64_000.0, 0.3)).bytes_per_sec();
				let len = batch_size_for(bytes_per_sec).min(work.len());
				let start = match work.front() {
					Some(i) => *i,
					None => break,
				};
				let hashes: Vec<Hash> = skeleton[start..start + len].iter().map(|h| h.hash()).collect();
				let rx = router.await_bodies(addr);
				let sent = helper.send_get_block_bodies(hashes);
				if sent.is_ok() {
					for _ in 0..len {
						work.pop_front();
					}
					inflight.insert(
						addr,
						InflightBatch {
							peer: helper,
							start,
							len,
							rx,
							requested_at: Instant::now(),
						},
					);
				}
			}
		}

		if inflight.is_empty() {
			if work.is_empty() {
				break;
			}
			return Err(SyncError::NoPeersAvailable);
		}

		let addrs: Vec<PeerAddr> = inflight.keys().cloned().collect();
		let on_cancel = cancel.on_cancel();
		let mut sel = Select::new();
		for addr in &addrs {
			sel.recv(&inflight[addr].rx);
		}
		let cancel_idx = sel.recv(&on_cancel);
		let remaining = addrs
			.iter()
			.map(|a| BODY_TIMEOUT.checked_sub(inflight[a].requested_at.elapsed()).unwrap_or_default())
			.min()
			.unwrap_or_default();

		match sel.select_timeout(remaining) {
			Ok(oper) => {
				let idx = oper.index();
				if idx == cancel_idx {
					let _ = oper.recv(&on_cancel);
					return Err(SyncError::Cancelled);
				}
				let addr = addrs[idx];
				let entry = inflight.remove(&addr).expect("selected index came from inflight");
				match oper.recv(&entry.rx) {
					Ok(bodies) if bodies.len() == entry.len => {
						entry.peer.complete_request(RequestKind::Bodies);
						let bytes: usize = bodies.iter().map(|b| rlp::encode(b).len()).sum();
						estimators
							.entry(addr)
							.or_insert_with(|| ThroughputEstimator::new(64_000.0, 0.3))
							.observe(bytes as u64, entry.requested_at.elapsed());
						staging.insert(entry.start, (entry.peer, bodies));
					}
					Ok(_) => {
						entry.peer.complete_request(RequestKind::Bodies);
						entry.peer.ban_immediately();
						requeue(&mut work, entry.start, entry.len);
					}
					Err(_) => {
						entry.peer.complete_request(RequestKind::Bodies);
						entry.peer.ban_immediately();
						requeue(&mut work, entry.start, entry.len);
					}
				}
			}
			Err(_) => {
				let timed_out: Vec<PeerAddr> =
					addrs.iter().filter(|a| inflight[a].requested_at.elapsed() >= BODY_TIMEOUT).cloned().collect();
				for addr in timed_out {
					if let Some(entry) = inflight.remove(&addr) {
						warn!("body_sync: {} timed out fetching bodies at index {}", entry.peer.addr(), entry.start);
						if let Some(est) = estimators.get_mut(&addr) {
							est.penalize();
						}
						entry.peer.complete_request(RequestKind::Bodies);
						entry.peer.record_fault();
						requeue(&mut work, entry.start, entry.len);
					}
				}
			}
		}

		while let Some((peer, bodies)) = staging.remove(&imported) {
			let start = imported;
			if bodies.iter().any(|b| !b.well_formed()) {
				peer.ban_immediately();
				requeue(&mut work, start, bodies.len());
				break;
			}

			let count = bodies.len();
			for (offset, body) in bodies.into_iter().enumerate() {
				let header = skeleton[start + offset].clone();
				let state_root = header.state_root;
				let block = Block { header, body };
				match chain.process_block(block, Options::none()) {
					Ok(_) => {}
					Err(krypton_chain::Error::InvalidBlock(msg)) => {
						peer.ban_immediately();
						return Err(SyncError::InvalidBlock(msg));
					}
					Err(e) if e.is_peer_fault() => {
						peer.ban_immediately();
						return Err(SyncError::PeerFault(peer.addr()));
					}
					Err(e) => return Err(SyncError::from(e)),
				}
				try_fetch_state(peers, router, cancel, state_root);
			}
			imported = start + count;

			sync_state.update(SyncStatus::Syncing(
				SyncSubState::FillingChain,
				Progress {
					starting_height,
					current_height: skeleton[imported - 1].number,
					highest_height,
				},
			));
		}
	}
	Ok(())
}

fn batch_size_for(bytes_per_sec: f64) -> usize {
	let size = ((bytes_per_sec * TARGET_BATCH_SECS) / ASSUMED_BODY_BYTES) as usize;
	size.clamp(MIN_BATCH, MAX_BODIES_PER_REQUEST)
}

fn requeue(work: &mut VecDeque<usize>, start: usize, len: usize) {
	for i in (start..start + len).rev() {
		work.push_front(i);
	}
}

/// Best-effort state-node fetch for a just-imported block's post-state
/// root, against whichever peer is idle for `State` requests right now
/// (§4.4 "same scheduling discipline as body_sync"). Never blocks body
/// import on the result: a failure or timeout here is simply logged.
fn try_fetch_state(peers: &Peers, router: &ResponseRouter, cancel: &CancelToken, state_root: Hash) {
	let helper = match idle_helpers(peers, RequestKind::State, &[]).into_iter().next() {
		Some(p) => p,
		None => return,
	};
	match state_sync::fetch_nodes(&helper, router, cancel, vec![state_root]) {
		Ok(nodes) => debug!("body_sync: fetched {} state node(s) from {} for {}", nodes.len(), helper.addr(), state_root),
		Err(e) => debug!("body_sync: best-effort state fetch from {} failed: {}", helper.addr(), e),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn batch_size_is_bounded() {
		assert_eq!(batch_size_for(0.0), MIN_BATCH);
		assert_eq!(batch_size_for(f64::MAX), MAX_BODIES_PER_REQUEST);
	}
}
