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

//! Runs one sync round at a time: pick a master peer, find the common
//! ancestor, pull and verify the header skeleton, then fill in bodies.
//! Generalized from the teacher's `servers::grin::sync::syncer` loop
//! (`needs_syncing` / `sync_loop` / per-phase `check_run`), minus the
//! dandelion/stem-specific pieces that have no Krypton counterpart.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info, warn};

use krypton_chain::Chain;
use krypton_p2p::{Peer, Peers};
use krypton_pow::PowVerifier;
use krypton_util::CancelToken;

use super::helpers::DownloaderConfig;
use super::{ancestor, body_sync, header_sync};
use crate::adapter::NetworkAdapter;
use crate::error::SyncError;
use crate::fetcher::Fetcher;
use crate::state::{SyncState, SyncStatus};

/// How often the idle loop checks whether a round is warranted.
const IDLE_TICK: Duration = Duration::from_millis(300);

/// Drives sync rounds against whichever peer currently has the most work
/// above ours, and owns the housekeeping tick that expires the fetcher's
/// parked blocks.
pub struct Syncer {
	chain: Arc<Chain>,
	peers: Arc<Peers>,
	pow_verifier: Arc<dyn PowVerifier>,
	adapter: Arc<NetworkAdapter>,
	fetcher: Arc<Fetcher>,
	sync_state: Arc<SyncState>,
	cancel: CancelToken,
	config: DownloaderConfig,
}

impl Syncer {
	/// Builds a syncer over its collaborators. `cancel` is shared with
	/// whatever owns the syncer's lifetime (typically the coordinator),
	/// so stopping it also unblocks any in-flight round.
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		chain: Arc<Chain>,
		peers: Arc<Peers>,
		pow_verifier: Arc<dyn PowVerifier>,
		adapter: Arc<NetworkAdapter>,
		fetcher: Arc<Fetcher>,
		sync_state: Arc<SyncState>,
		cancel: CancelToken,
		config: DownloaderConfig,
	) -> Arc<Syncer> {
		Arc::new(Syncer {
			chain,
			peers,
			pow_verifier,
			adapter,
			fetcher,
			sync_state,
			cancel,
			config,
		})
	}

	/// Spawns the sync loop on its own thread.
	pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
		thread::spawn(move || self.run())
	}

	fn run(&self) {
		info!("syncer: starting");
		while !self.cancel.is_cancelled() {
			self.fetcher.expire_pending();
			match self.select_master_peer() {
				Some(peer) => {
					if let Err(e) = self.run_round(&peer) {
						// Faults against a specific helper (not necessarily
						// the master) are banned where they're discovered,
						// deep in header_sync/body_sync; this only handles
						// the errors that name the master directly or
						// escalate through the strike counter (§7).
						match &e {
							SyncError::PeerFault(addr) => {
								if let Some(p) = self.peers.get(addr) {
									p.ban_immediately();
								}
							}
							SyncError::AncestorNotFound => {
								peer.ban_immediately();
							}
							SyncError::Timeout => {
								peer.record_fault();
							}
							_ => {}
						}
						match e {
							SyncError::Cancelled => break,
							_ => warn!("syncer: round against {} failed: {}", peer.addr(), e),
						}
					}
				}
				None => self.sync_state.update(SyncStatus::Idle),
			}
			self.wait(IDLE_TICK);
		}
		self.sync_state.update(SyncStatus::Idle);
		info!("syncer: stopped");
	}

	fn wait(&self, d: Duration) {
		let on_cancel = self.cancel.on_cancel();
		let _ = crossbeam_channel::select! {
			recv(on_cancel) -> _ => (),
			default(d) => (),
		};
	}

	/// The peer with the greatest total difficulty strictly above ours, if
	/// any -- `None` means we're caught up as far as we can tell.
	fn select_master_peer(&self) -> Option<Arc<Peer>> {
		let head = self.chain.head().ok()?;
		self.peers.best(head.total_difficulty)
	}

	fn run_round(&self, peer: &Arc<Peer>) -> Result<(), SyncError> {
		let ancestor = ancestor::find_common_ancestor(&self.chain, peer, &self.adapter.router(), &self.cancel)?;
		debug!("syncer: common ancestor with {} at height {}", peer.addr(), ancestor.number);

		let highest_hint = self.adapter.peer_height(&peer.addr()).unwrap_or(ancestor.number);
		let skeleton = header_sync::fetch_header_skeleton(
			&self.peers,
			&self.adapter.router(),
			self.pow_verifier.as_ref(),
			&self.cancel,
			&self.sync_state,
			&ancestor,
			highest_hint,
			&self.config,
		)?;

		if skeleton.is_empty() {
			self.sync_state.update(SyncStatus::Idle);
			return Ok(());
		}
		let highest = skeleton.last().map(|h| h.number).unwrap_or(ancestor.number);

		body_sync::fill_chain(
			&self.chain,
			&self.peers,
			&self.adapter.router(),
			&self.cancel,
			&self.sync_state,
			&skeleton,
			ancestor.number,
			highest,
			&self.config,
		)?;

		self.sync_state.update(SyncStatus::Committing(crate::state::Progress {
			starting_height: ancestor.number,
			current_height: highest,
			highest_height: highest,
		}));
		self.sync_state.update(SyncStatus::Idle);
		info!("syncer: caught up to {} at height {}", peer.addr(), highest);
		Ok(())
	}
}
