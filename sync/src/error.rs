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

//! Errors the sync layer surfaces (§7). `is_peer_fault` tells the
//! downloader/fetcher whether the responsible peer should be soft-banned,
//! mirroring `krypton_chain::Error::is_peer_fault`.

use krypton_p2p::PeerAddr;

/// Errors produced by the downloader, fetcher and coordinator.
#[derive(Debug, failure::Fail)]
pub enum SyncError {
	/// A peer sent a malformed response, responded out of order, or failed
	/// a verification check (bad PoW, header/body mismatch).
	#[fail(display = "peer fault: {}", _0)]
	PeerFault(PeerAddr),
	/// A request did not complete within its deadline.
	#[fail(display = "request timed out")]
	Timeout,
	/// A downloaded header or block failed chain verification.
	#[fail(display = "chain verification failed: {}", _0)]
	ChainVerificationFailed(String),
	/// No common ancestor was found within the finality window.
	#[fail(display = "no common ancestor within finality window")]
	AncestorNotFound,
	/// A block was structurally invalid independent of any particular peer.
	#[fail(display = "invalid block: {}", _0)]
	InvalidBlock(String),
	/// The underlying store failed.
	#[fail(display = "store error: {}", _0)]
	Storage(krypton_store::Error),
	/// The round was cancelled.
	#[fail(display = "sync cancelled")]
	Cancelled,
	/// The supplied sync configuration is invalid.
	#[fail(display = "invalid sync configuration: {}", _0)]
	ConfigError(String),
	/// The helper pool emptied out (every candidate banned or disconnected)
	/// before a retrieval could finish. Not itself a peer's fault.
	#[fail(display = "no peers available to continue sync")]
	NoPeersAvailable,
}

impl SyncError {
	/// Whether this error indicates the peer misbehaved and should be
	/// penalized, as opposed to a transient or local condition.
	pub fn is_peer_fault(&self) -> bool {
		matches!(
			self,
			SyncError::PeerFault(_)
				| SyncError::Timeout
				| SyncError::ChainVerificationFailed(_)
				| SyncError::AncestorNotFound
				| SyncError::InvalidBlock(_)
		)
	}

	/// Whether the offending peer should be banned outright on this single
	/// occurrence rather than merely accruing a strike (§7: `PeerFault` and
	/// `InvalidBlock` ban immediately; only `Timeout` escalates through the
	/// soft-ban counter).
	pub fn bans_peer_immediately(&self) -> bool {
		matches!(self, SyncError::PeerFault(_) | SyncError::InvalidBlock(_) | SyncError::AncestorNotFound)
	}
}

impl From<krypton_store::Error> for SyncError {
	fn from(e: krypton_store::Error) -> SyncError {
		SyncError::Storage(e)
	}
}

impl From<krypton_chain::Error> for SyncError {
	fn from(e: krypton_chain::Error) -> SyncError {
		match e {
			krypton_chain::Error::Storage(s) => SyncError::Storage(s),
			other => SyncError::ChainVerificationFailed(other.to_string()),
		}
	}
}
