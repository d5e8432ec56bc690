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

//! The `FetchingHeaders` sub-state (§4.4): pulls the header skeleton above
//! the common ancestor in `MAX_HEADERS_PER_REQUEST`-sized chunks, spread
//! across every idle helper peer at once rather than one peer at a time,
//! verifying PoW and parent linkage on arrival so a bad chunk fails fast,
//! before any body is ever requested. A chunk that fails verification
//! bans its source (§7 `PeerFault`) and is retried on a different helper;
//! the round only gives up once the helper pool itself runs dry.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Select};
use log::{debug, warn};

use krypton_core::consensus::MAX_HEADERS_PER_REQUEST;
use krypton_core::core::block::BlockHeader;
use krypton_core::core::hash::Hashed;
use krypton_p2p::msg::GetBlockHeaders;
use krypton_p2p::{Peer, PeerAddr, Peers, RequestKind};
use krypton_pow::PowVerifier;
use krypton_util::CancelToken;

use super::helpers::{idle_helpers, DownloaderConfig};
use crate::error::SyncError;
use crate::response_router::ResponseRouter;
use crate::state::{Progress, SyncState, SyncStatus, SyncSubState};

const CHUNK_TIMEOUT: Duration = Duration::from_secs(20);

struct InflightChunk {
	peer: Arc<Peer>,
	start: u64,
	len: usize,
	rx: Receiver<Vec<BlockHeader>>,
	requested_at: Instant,
}

/// Downloads and verifies every header above `ancestor`, up to `peers`'
/// best-known extent of the chain (`highest_height_hint`). Returns the
/// skeleton in ascending order, not including `ancestor` itself.
pub fn fetch_header_skeleton(
	peers: &Peers,
	router: &ResponseRouter,
	pow_verifier: &dyn PowVerifier,
	cancel: &CancelToken,
	sync_state: &SyncState,
	ancestor: &BlockHeader,
	highest_height_hint: u64,
	config: &DownloaderConfig,
) -> Result<Vec<BlockHeader>, SyncError> {
	let starting_height = ancestor.number;
	let mut target = highest_height_hint;
	if target <= starting_height {
		return Ok(Vec::new());
	}

	let mut work: VecDeque<u64> = ((starting_height + 1)..=target).collect();
	let mut inflight: HashMap<PeerAddr, InflightChunk> = HashMap::new();
	let mut staging: BTreeMap<u64, (Arc<Peer>, usize, Vec<BlockHeader>)> = BTreeMap::new();
	let mut skeleton: Vec<BlockHeader> = Vec::new();
	let mut previous = ancestor.clone();
	let mut next_start = starting_height + 1;
	let mut saw_verification_failure = false;

	// Headers only ever stage in memory ahead of a cheap linkage/PoW check
	// (§4.4); the high/low-water import-queue throttle applies to the body
	// phase below, where the downstream consumer is `Chain::process_block`.
	while previous.number < target {
		if cancel.is_cancelled() {
			return Err(SyncError::Cancelled);
		}

		if !work.is_empty() && inflight.len() < config.qos_tuning_peers {
			let busy: Vec<PeerAddr> = inflight.keys().cloned().collect();
			for helper in idle_helpers(peers, RequestKind::Headers, &busy) {
				if inflight.len() >= config.qos_tuning_peers || work.is_empty() {
					break;
				}
				let start = match work.front() {
					Some(h) => *h,
					None => break,
				};
				let len = work.len().min(MAX_HEADERS_PER_REQUEST);
				let addr = helper.addr();
				let rx = router.await_headers(addr);
				let sent = helper.send_get_block_headers(GetBlockHeaders {
					start_hash: None,
					start_number: start,
					max_headers: len as u32,
					skip: 0,
					reverse: false,
				});
				if sent.is_ok() {
					for _ in 0..len {
						work.pop_front();
					}
					inflight.insert(
						addr,
						InflightChunk {
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
			if work.is_empty() && staging.is_empty() {
				break;
			}
			if work.is_empty() {
				// Nothing left to assign, but something is staged above a
				// gap we can't fill (its predecessor chunk must have failed
				// and already exhausted the pool). Nothing more to do.
				break;
			}
			return Err(if saw_verification_failure {
				SyncError::ChainVerificationFailed(format!("no peers left to fetch headers above {}", previous.number))
			} else {
				SyncError::NoPeersAvailable
			});
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
			.map(|a| CHUNK_TIMEOUT.checked_sub(inflight[a].requested_at.elapsed()).unwrap_or_default())
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
					Ok(headers) => {
						entry.peer.complete_request(RequestKind::Headers);
						staging.insert(entry.start, (entry.peer, entry.len, headers));
					}
					Err(_) => {
						entry.peer.complete_request(RequestKind::Headers);
						entry.peer.ban_immediately();
						requeue(&mut work, entry.start, entry.len);
					}
				}
			}
			Err(_) => {
				let timed_out: Vec<PeerAddr> =
					addrs.iter().filter(|a| inflight[a].requested_at.elapsed() >= CHUNK_TIMEOUT).cloned().collect();
				for addr in timed_out {
					if let Some(entry) = inflight.remove(&addr) {
						warn!("header_sync: {} timed out fetching headers from {}", entry.peer.addr(), entry.start);
						entry.peer.complete_request(RequestKind::Headers);
						entry.peer.record_fault();
						requeue(&mut work, entry.start, entry.len);
					}
				}
			}
		}

		while let Some((peer, expected, headers)) = staging.remove(&next_start) {
			let start = next_start;
			let mut sim = previous.clone();
			let mut valid = true;
			for header in &headers {
				if header.parent_hash != sim.hash() || header.number != sim.number + 1 || pow_verifier.verify(header).is_err()
				{
					valid = false;
					break;
				}
				sim = header.clone();
			}

			if !valid {
				saw_verification_failure = true;
				peer.ban_immediately();
				requeue(&mut work, start, expected);
				break;
			}

			previous = sim;
			skeleton.extend(headers.iter().cloned());
			next_start = start + expected as u64;
			if headers.len() < expected {
				// The peer ran out before our hint said it would -- treat
				// this as the real tip rather than a fault.
				target = previous.number;
				work.clear();
			}

			let highest = target.max(previous.number);
			sync_state.update(SyncStatus::Syncing(
				SyncSubState::FetchingHeaders,
				Progress {
					starting_height,
					current_height: previous.number,
					highest_height: highest,
				},
			));
		}
	}

	debug!("header_sync: fetched {} header(s) above {}", skeleton.len(), ancestor.number);
	Ok(skeleton)
}

fn requeue(work: &mut VecDeque<u64>, start: u64, len: usize) {
	for h in (start..start + len as u64).rev() {
		work.push_front(h);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn requeue_restores_ascending_order_at_the_front() {
		let mut work: VecDeque<u64> = VecDeque::from(vec![10, 11]);
		requeue(&mut work, 5, 3);
		assert_eq!(work.into_iter().collect::<Vec<_>>(), vec![5, 6, 7, 10, 11]);
	}
}
