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

//! C7, the sync coordinator (§4.4): the single-flight gate around
//! [`Syncer`]. Owns the syncer's thread and cancel token so `start`/`stop`
//! are idempotent and only one syncer thread is ever running, matching the
//! teacher's single `run_sync()` entry point.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;

use krypton_chain::Chain;
use krypton_p2p::Peers;
use krypton_pow::PowVerifier;
use krypton_util::CancelToken;

use crate::adapter::NetworkAdapter;
use crate::downloader::{DownloaderConfig, Syncer};
use crate::fetcher::Fetcher;
use crate::state::SyncState;

/// Wraps a [`Syncer`] so it can be started and stopped at most once at a
/// time, exposing the pieces other layers (RPC, the binary's shutdown
/// path) need without handing out the syncer itself.
pub struct Coordinator {
	chain: Arc<Chain>,
	peers: Arc<Peers>,
	pow_verifier: Arc<dyn PowVerifier>,
	adapter: Arc<NetworkAdapter>,
	fetcher: Arc<Fetcher>,
	sync_state: Arc<SyncState>,
	downloader_config: DownloaderConfig,

	running: AtomicBool,
	handle: Mutex<Option<JoinHandle<()>>>,
	cancel: Mutex<Option<CancelToken>>,
}

impl Coordinator {
	/// Builds an idle coordinator over its collaborators. Call [`Coordinator::start`]
	/// to begin syncing.
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		chain: Arc<Chain>,
		peers: Arc<Peers>,
		pow_verifier: Arc<dyn PowVerifier>,
		adapter: Arc<NetworkAdapter>,
		fetcher: Arc<Fetcher>,
		sync_state: Arc<SyncState>,
		downloader_config: DownloaderConfig,
	) -> Arc<Coordinator> {
		Arc::new(Coordinator {
			chain,
			peers,
			pow_verifier,
			adapter,
			fetcher,
			sync_state,
			downloader_config,
			running: AtomicBool::new(false),
			handle: Mutex::new(None),
			cancel: Mutex::new(None),
		})
	}

	/// Starts the sync loop if it isn't already running. A second call
	/// while already running is a no-op.
	pub fn start(self: &Arc<Self>) {
		if self.running.swap(true, Ordering::SeqCst) {
			return;
		}
		let cancel = CancelToken::new();
		*self.cancel.lock() = Some(cancel.clone());

		let syncer = Syncer::new(
			self.chain.clone(),
			self.peers.clone(),
			self.pow_verifier.clone(),
			self.adapter.clone(),
			self.fetcher.clone(),
			self.sync_state.clone(),
			cancel,
			self.downloader_config,
		);
		*self.handle.lock() = Some(syncer.spawn());
	}

	/// Cancels the running syncer and joins its thread. Safe to call when
	/// not running.
	pub fn stop(&self) {
		if let Some(cancel) = self.cancel.lock().take() {
			cancel.cancel();
		}
		if let Some(handle) = self.handle.lock().take() {
			let _ = handle.join();
		}
		self.running.store(false, Ordering::SeqCst);
	}

	/// The shared cancellation token for the current (or most recent)
	/// round, if the coordinator has ever been started.
	pub fn cancel_token(&self) -> Option<CancelToken> {
		self.cancel.lock().clone()
	}

	/// The shared sync state, for RPC's `syncing` method to poll.
	pub fn sync_state(&self) -> Arc<SyncState> {
		self.sync_state.clone()
	}

	/// Whether a syncer thread is currently running.
	pub fn is_running(&self) -> bool {
		self.running.load(Ordering::SeqCst)
	}
}
