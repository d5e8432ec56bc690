// Copyright 2016 The Grin Developers
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

//! Consensus-relevant constants. The proof-of-work rules themselves are a
//! fixed input the sync/chain layers treat as an external verifier (see
//! `PowVerifier` in the `pow` crate) — what lives here is everything a
//! correct node still needs to know without re-deriving PoW validity: block
//! rewards, structural limits and the target block interval.

/// Block subsidy paid to the coinbase address, in wei.
pub const BLOCK_REWARD: u128 = 5_000_000_000_000_000_000;

/// Target time between blocks, in seconds.
pub const BLOCK_TIME_SEC: u64 = 15;

/// Maximum number of uncle headers a block body may reference.
pub const MAX_UNCLES: usize = crate::core::block::MAX_UNCLES;

/// Maximum depth (in blocks) at which an uncle may still be referenced by a
/// descendant block.
pub const MAX_UNCLE_DEPTH: u64 = 6;

/// Maximum size, in bytes, of a header's `extra_data` field. Bounded purely
/// for DoS protection — it carries no consensus meaning here.
pub const MAX_EXTRA_DATA_LEN: usize = 32;

/// Floor on a block's gas limit; the executor (external collaborator) is
/// responsible for adjusting it upward between this and any protocol
/// maximum.
pub const MIN_GAS_LIMIT: u64 = 5_000;

/// Number of confirmations (blocks built on top) after which a block is
/// considered final for practical purposes. Used by the downloader's
/// ancestor search as the finality window `F` (SPEC_FULL §4.1).
pub const FINALITY_CONFIRMATIONS: u64 = 128;

/// Maximum number of block hashes returned in a single `BlockHashes`
/// response, and the matching request cap.
pub const MAX_HEADERS_PER_REQUEST: usize = 192;

/// Maximum number of bodies returned/requested in a single round trip.
pub const MAX_BODIES_PER_REQUEST: usize = 128;
