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

//! Chain-level error kinds (§7), organized the way the spec separates
//! recoverable peer faults from fatal/round-level failures. The downloader
//! and fetcher (the `krypton_sync` crate) match on these to decide whether
//! to ban a peer, abort a round, or just requeue.

use failure::Fail;

use krypton_pow::PowError;

/// Errors the chain pipeline (`pipe::process_block`) can return.
#[derive(Debug, Fail)]
pub enum Error {
	/// §8 invariant 1: parent isn't canonical (nor a known alternative
	/// fork) yet. Not itself fatal — the sync layer parks the block as an
	/// orphan and retries once the parent arrives.
	#[fail(display = "unknown parent: {:?}", _0)]
	UnknownParent(krypton_core::core::hash::Hash),
	/// The header failed PoW verification (§7 `PeerFault`).
	#[fail(display = "invalid proof of work: {}", _0)]
	InvalidPow(#[fail(cause)] PowError),
	/// The header's declared difficulty doesn't match the expected value
	/// given its parent (§4.4 "difficulty rule").
	#[fail(display = "invalid difficulty")]
	InvalidDifficulty,
	/// The block's declared total difficulty bookkeeping is internally
	/// inconsistent.
	#[fail(display = "wrong total difficulty")]
	WrongTotalDifficulty,
	/// The block body violates a structural invariant (too many uncles,
	/// oversize extra-data, ...).
	#[fail(display = "malformed block: {}", _0)]
	Malformed(String),
	/// The executor rejected the block (§7 `InvalidBlock`): abort the
	/// round, ban the source, keep the existing canonical head.
	#[fail(display = "invalid block: {}", _0)]
	InvalidBlock(String),
	/// This exact block has already been imported.
	#[fail(display = "block already known")]
	AlreadyKnown,
	/// Underlying store I/O failed (§7 `Storage`).
	#[fail(display = "storage error: {}", _0)]
	Storage(#[fail(cause)] krypton_store::Error),
}

impl From<krypton_store::Error> for Error {
	fn from(e: krypton_store::Error) -> Error {
		Error::Storage(e)
	}
}

impl From<PowError> for Error {
	fn from(e: PowError) -> Error {
		Error::InvalidPow(e)
	}
}

impl Error {
	/// Whether this error means the offending peer should be banned (§7
	/// propagation policy): anything that isn't a purely local/transient
	/// condition.
	pub fn is_peer_fault(&self) -> bool {
		!matches!(self, Error::AlreadyKnown | Error::UnknownParent(_) | Error::Storage(_))
	}
}
