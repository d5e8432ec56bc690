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

//! Base types the chain pipeline requires: the canonical tip, the
//! persistence seam ([`ChainStore`]), the downstream notification seam
//! ([`ChainAdapter`]), and the state-executor seam ([`ExecutorHandle`],
//! SPEC_FULL §2 — named by role only, out of scope as an implementation).

use krypton_core::core::block::{Block, BlockHeader};
use krypton_core::core::difficulty::Difficulty;
use krypton_core::core::hash::{Hash, Hashed};

/// The tip of a fork: a handle to the fork's ancestry from its leaf.
/// `total_difficulty` is the quantity §3/§8 rank competing chains by.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tip {
	/// Height (block number) of the tip.
	pub height: u64,
	/// Hash of the tip block.
	pub last_block_h: Hash,
	/// Hash of the tip's parent.
	pub prev_block_h: Hash,
	/// Total difficulty accumulated from genesis to this tip.
	pub total_difficulty: Difficulty,
}

impl Tip {
	/// The tip at genesis.
	pub fn new(genesis_hash: Hash, genesis_difficulty: Difficulty) -> Tip {
		Tip {
			height: 0,
			last_block_h: genesis_hash,
			prev_block_h: genesis_hash,
			total_difficulty: genesis_difficulty,
		}
	}

	/// The tip resulting from appending `header` on top of a fork whose
	/// running total difficulty (not including `header`) was
	/// `prev_total_difficulty`.
	pub fn from_header(header: &BlockHeader, prev_total_difficulty: Difficulty) -> Tip {
		Tip {
			height: header.number,
			last_block_h: header.hash(),
			prev_block_h: header.parent_hash,
			total_difficulty: prev_total_difficulty + header.difficulty,
		}
	}
}

/// Per-import options. `skip_pow` exists for test genesis/fixture setup,
/// where headers are synthesized rather than mined — never set in
/// production import paths.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Options {
	/// Skip PoW verification for this import.
	pub skip_pow: bool,
}

impl Options {
	/// The default options used for blocks arriving over the wire.
	pub fn none() -> Options {
		Options::default()
	}
}

/// Outcome of executing a block against a parent state root (SPEC_FULL
/// §2's `ExecutorHandle`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionOutcome {
	/// Resulting state root after applying the block's transactions.
	pub state_root: Hash,
	/// Resulting receipts root.
	pub receipts_root: Hash,
	/// Total gas used executing the block.
	pub gas_used: u64,
}

/// Errors the executor can report. Always surfaces as
/// [`crate::ErrorKind::InvalidBlock`] to the chain pipeline (§7).
#[derive(Clone, Debug, PartialEq, Eq, failure::Fail)]
pub enum ExecError {
	/// A transaction's gas limit would exceed the block's remaining gas.
	#[fail(display = "gas limit exceeded")]
	GasLimitExceeded,
	/// A transaction's sender could not be recovered or had insufficient
	/// balance/nonce.
	#[fail(display = "invalid transaction: {}", _0)]
	InvalidTransaction(String),
	/// The block's declared state or receipts root didn't match what
	/// execution produced.
	#[fail(display = "state root mismatch")]
	StateRootMismatch,
}

/// The state executor named by role in SPEC_FULL §2: "given a block and a
/// parent state root, applies transactions and returns a post-state root
/// plus receipts." The core calls it but does not specify it; this trait is
/// the seam, left unimplemented in production by design — a real executor
/// is a separate, much larger subsystem.
pub trait ExecutorHandle: Send + Sync {
	/// Executes `block` against `parent_state_root`, yielding the
	/// resulting state/receipts roots and gas used, or an `ExecError` if
	/// the block doesn't apply validly.
	fn execute(&self, block: &Block, parent_state_root: &Hash) -> Result<ExecutionOutcome, ExecError>;
}

/// Persistence seam over the chain store (§3): hash -> header, hash ->
/// body, hash -> TD, plus the canonical number -> hash mapping maintained
/// only along the current best chain.
pub trait ChainStore: Send + Sync {
	/// The chain's current head.
	fn head(&self) -> Result<Tip, krypton_store::Error>;
	/// Persists `tip` as the current head.
	fn save_head(&self, tip: &Tip) -> Result<(), krypton_store::Error>;
	/// Looks up a header by hash.
	fn get_header(&self, hash: &Hash) -> Result<BlockHeader, krypton_store::Error>;
	/// Looks up a full block (header + body) by hash.
	fn get_block(&self, hash: &Hash) -> Result<Block, krypton_store::Error>;
	/// Whether `hash` has already been imported.
	fn block_exists(&self, hash: &Hash) -> Result<bool, krypton_store::Error>;
	/// Persists `block`'s header and body, and its total difficulty.
	fn save_block(&self, block: &Block, total_difficulty: Difficulty) -> Result<(), krypton_store::Error>;
	/// The total difficulty of the block identified by `hash`, if known.
	fn get_total_difficulty(&self, hash: &Hash) -> Result<Difficulty, krypton_store::Error>;
	/// The canonical hash at `height`, if any block chain currently has one
	/// (the canonical mapping only ever covers the current best chain).
	fn get_header_by_height(&self, height: u64) -> Result<BlockHeader, krypton_store::Error>;
	/// Rewrites the canonical number -> hash mapping for `[from_height,
	/// to.height]` to follow the fork ending at `to` (§4.1 reorg handling).
	fn set_canonical_chain(&self, to: &BlockHeader, from_height: u64) -> Result<(), krypton_store::Error>;
	/// Height up to which the startup upgrade pass ([`crate::upgrade`]) has
	/// already run, if it has run at all. `None` means never run.
	fn upgrade_cursor(&self) -> Result<Option<u64>, krypton_store::Error>;
	/// Records that the upgrade pass has completed up to and including
	/// `height`, so a restart resumes from here instead of redoing it.
	fn set_upgrade_cursor(&self, height: u64) -> Result<(), krypton_store::Error>;
}

/// Downstream notification seam: the chain pipeline calls this after each
/// successful import so the rest of the system (C6 event bus, propagation)
/// can react without the chain crate depending on them directly.
pub trait ChainAdapter: Send + Sync {
	/// A block was validated, executed and appended to the canonical
	/// chain.
	fn block_accepted(&self, block: &Block, tip: &Tip);
}

/// A [`ChainAdapter`] that does nothing; used by tests and by any binary
/// that doesn't yet wire up propagation.
pub struct NoopAdapter;

impl ChainAdapter for NoopAdapter {
	fn block_accepted(&self, _block: &Block, _tip: &Tip) {}
}

/// An [`ExecutorHandle`] that performs no state transition: it trusts
/// whatever state and receipts roots the block already declares rather
/// than deriving them from the parent state and the block's
/// transactions. Lets a node follow a chain's headers/bodies end to end
/// before a real state-execution engine is wired in; never valid for a
/// deployment that needs to trust its own state root, since it accepts
/// any block regardless of what it actually contains.
pub struct NoopExecutor;

impl ExecutorHandle for NoopExecutor {
	fn execute(&self, block: &Block, _parent_state_root: &Hash) -> Result<ExecutionOutcome, ExecError> {
		Ok(ExecutionOutcome {
			state_root: block.header.state_root,
			receipts_root: block.header.receipts_root,
			gas_used: block.header.gas_used,
		})
	}
}
