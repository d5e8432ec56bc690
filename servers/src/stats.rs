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

//! A point-in-time snapshot of node state, for logging and diagnostics.
//! Generalized from the teacher's `common::stats::ServerStats`, stripped
//! of the stratum/mining fields this workspace has no miner to populate.

use krypton_chain::Tip;
use krypton_sync::SyncStatus;

/// One peer's advertised state, as seen by this node.
#[derive(Clone, Debug)]
pub struct PeerStats {
	/// The peer's network address.
	pub addr: String,
	/// Total difficulty last reported by the peer.
	pub total_difficulty: String,
	/// Whether the peer is currently banned.
	pub banned: bool,
}

/// Everything worth logging or exposing about a running node at a given
/// instant.
#[derive(Clone, Debug)]
pub struct NodeStats {
	/// Number of currently connected peers.
	pub peer_count: usize,
	/// The chain's current head.
	pub head: Tip,
	/// Current sync status.
	pub sync_status: SyncStatus,
	/// Number of orphaned blocks awaiting their parent.
	pub orphans: usize,
	/// Per-peer snapshot.
	pub peers: Vec<PeerStats>,
}
