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

//! The sync round's externally observable state (§4.4): `Idle`, or
//! `Syncing` in one of three sub-states, or `Committing` while the chain
//! applies what was fetched. Shared, lock-guarded, and cheap to poll --
//! the RPC `syncing` method (§ rpc) reads it directly.

use parking_lot::RwLock;

/// Which phase of a sync round is currently running.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncSubState {
	/// Bisecting the locator to find the highest block both sides agree
	/// on (§4.4 ancestor search, bounded by the finality window).
	FindingAncestor,
	/// Pulling and verifying the header skeleton above the ancestor.
	FetchingHeaders,
	/// Pulling bodies (and, in archive mode, state nodes/receipts) for the
	/// verified headers and handing them to the chain.
	FillingChain,
}

/// How far into its target a round has progressed, for both internal
/// pacing decisions and external progress reporting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Progress {
	/// Height the round started importing from.
	pub starting_height: u64,
	/// Height imported so far.
	pub current_height: u64,
	/// Best height currently believed to be available from peers. Refined
	/// upward as more headers arrive; never authoritative until the round
	/// completes.
	pub highest_height: u64,
}

/// The sync state machine (§4.4): `Idle -> Syncing{sub-state} ->
/// Committing -> Idle`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncStatus {
	/// Caught up, or not enough peers to tell.
	Idle,
	/// A round is in progress.
	Syncing(SyncSubState, Progress),
	/// Headers and bodies are verified; applying them to the chain.
	Committing(Progress),
}

impl SyncStatus {
	/// The progress snapshot, if this status carries one.
	pub fn progress(&self) -> Option<Progress> {
		match self {
			SyncStatus::Idle => None,
			SyncStatus::Syncing(_, p) => Some(*p),
			SyncStatus::Committing(p) => Some(*p),
		}
	}
}

/// Shared, externally pollable sync status. One instance per node, handed
/// to the syncer, the fetcher, and the RPC dispatch table.
pub struct SyncState {
	status: RwLock<SyncStatus>,
}

impl SyncState {
	/// A fresh state, starting `Idle`.
	pub fn new() -> SyncState {
		SyncState {
			status: RwLock::new(SyncStatus::Idle),
		}
	}

	/// Replaces the current status.
	pub fn update(&self, status: SyncStatus) {
		*self.status.write() = status;
	}

	/// The current status.
	pub fn status(&self) -> SyncStatus {
		*self.status.read()
	}

	/// Whether a round is currently running (anything but `Idle`).
	pub fn is_syncing(&self) -> bool {
		!matches!(self.status(), SyncStatus::Idle)
	}
}

impl Default for SyncState {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn starts_idle() {
		let state = SyncState::new();
		assert_eq!(state.status(), SyncStatus::Idle);
		assert!(!state.is_syncing());
	}

	#[test]
	fn reports_progress_while_syncing() {
		let state = SyncState::new();
		let progress = Progress {
			starting_height: 10,
			current_height: 20,
			highest_height: 100,
		};
		state.update(SyncStatus::Syncing(SyncSubState::FetchingHeaders, progress));
		assert!(state.is_syncing());
		assert_eq!(state.status().progress(), Some(progress));
	}
}
