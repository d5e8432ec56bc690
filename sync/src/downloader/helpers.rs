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

//! Shared tunables and peer-pool selection for the header/body/state
//! scheduling phases (§4.4). Kept out of `syncer.rs` so `header_sync` and
//! `body_sync` can both depend on it without depending on each other.

use std::sync::Arc;

use krypton_p2p::{Peer, PeerAddr, Peers, RequestKind};

/// Downloader-facing tunables, generalized from `krypton_config::SyncConfig`
/// (§9 resolution 2) the same way `crate::fetcher::FetcherConfig` is.
#[derive(Clone, Copy, Debug)]
pub struct DownloaderConfig {
	/// Soft cap on simultaneously in-flight chunk requests during a round
	/// (§4.4 "qosTuningPeers"), independent of how many idle peers exist.
	pub qos_tuning_peers: usize,
	/// Staged-item count at which new chunk assignment pauses (§4.4
	/// "Throttling").
	pub import_queue_high_water: usize,
	/// Staged-item count at which assignment resumes after pausing.
	pub import_queue_low_water: usize,
}

impl From<&krypton_config::SyncConfig> for DownloaderConfig {
	fn from(cfg: &krypton_config::SyncConfig) -> DownloaderConfig {
		DownloaderConfig {
			qos_tuning_peers: cfg.qos_tuning_peers.max(1) as usize,
			import_queue_high_water: cfg.import_queue_high_water.max(1),
			import_queue_low_water: cfg.import_queue_low_water,
		}
	}
}

impl Default for DownloaderConfig {
	fn default() -> DownloaderConfig {
		DownloaderConfig::from(&krypton_config::SyncConfig::default())
	}
}

/// Connected, non-banned peers not already busy with a request of `kind`
/// and not already claimed by the caller's own bookkeeping (`busy`) -- the
/// pool a scheduling loop draws helpers from each time it has room to
/// issue more work (§4.4 "helpers pulled from the peer registry").
pub fn idle_helpers(peers: &Peers, kind: RequestKind, busy: &[PeerAddr]) -> Vec<Arc<Peer>> {
	peers
		.snapshot()
		.into_iter()
		.filter(|p| !p.is_banned())
		.filter(|p| !p.has_inflight(kind))
		.filter(|p| !busy.contains(&p.addr()))
		.collect()
}
