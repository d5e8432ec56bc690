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

//! The block validation pipeline: header checks, body checks, execution,
//! in that order, each step short-circuiting on failure (§8 invariant 1: a
//! block is only ever appended on top of an already-canonical parent).

use krypton_core::consensus::MAX_EXTRA_DATA_LEN;
use krypton_core::core::block::Block;
use krypton_core::core::difficulty::Difficulty;
use krypton_core::core::hash::Hashed;
use krypton_pow::PowVerifier;

use crate::error::Error;
use crate::types::{ChainStore, ExecutorHandle, Options, Tip};

/// Result of successfully running a block through the pipeline: the new
/// tip it produces, and whether it extended the previous canonical head
/// directly (as opposed to landing on a fork that didn't (yet) become
/// the best chain).
pub struct ProcessResult {
	/// The candidate tip formed by this block.
	pub tip: Tip,
	/// Whether `tip` overtakes the chain's current head (§8 invariant 5:
	/// TD of the canonical head never decreases — this is the comparison
	/// that decides it).
	pub triggers_reorg: bool,
}

/// Runs `block` through header validation, body validation and execution
/// against `store`, without mutating `store` — the caller (`Chain`) is
/// responsible for persisting and for any reorg bookkeeping once this
/// returns `Ok`.
pub fn process_block(
	block: &Block,
	store: &dyn ChainStore,
	executor: &dyn ExecutorHandle,
	pow_verifier: &dyn PowVerifier,
	opts: Options,
) -> Result<ProcessResult, Error> {
	if store.block_exists(&block.hash())? {
		return Err(Error::AlreadyKnown);
	}

	let parent = store
		.get_header(&block.header.parent_hash)
		.map_err(|_| Error::UnknownParent(block.header.parent_hash))?;

	validate_header(block, &parent, pow_verifier, opts)?;
	validate_body(block)?;

	let outcome = executor
		.execute(block, &parent.state_root)
		.map_err(|e| Error::InvalidBlock(e.to_string()))?;
	if outcome.state_root != block.header.state_root || outcome.receipts_root != block.header.receipts_root {
		return Err(Error::InvalidBlock(
			"executor outcome does not match header roots".to_owned(),
		));
	}

	let parent_td = store.get_total_difficulty(&parent.hash())?;
	let tip = Tip::from_header(&block.header, parent_td);

	let head = store.head()?;
	let triggers_reorg = tip.total_difficulty > head.total_difficulty;

	Ok(ProcessResult { tip, triggers_reorg })
}

fn validate_header(
	block: &Block,
	parent: &krypton_core::core::block::BlockHeader,
	pow_verifier: &dyn PowVerifier,
	opts: Options,
) -> Result<(), Error> {
	let header = &block.header;

	if header.number != parent.number + 1 {
		return Err(Error::Malformed(format!(
			"number {} does not follow parent {}",
			header.number, parent.number
		)));
	}
	if header.timestamp <= parent.timestamp {
		return Err(Error::Malformed("timestamp does not advance".to_owned()));
	}
	if header.extra_data.len() > MAX_EXTRA_DATA_LEN {
		return Err(Error::Malformed("extra_data too large".to_owned()));
	}
	if header.difficulty < Difficulty::min() {
		return Err(Error::InvalidDifficulty);
	}

	if !opts.skip_pow {
		pow_verifier.verify(header)?;
	}

	Ok(())
}

fn validate_body(block: &Block) -> Result<(), Error> {
	if !block.body.well_formed() {
		return Err(Error::Malformed("too many uncles".to_owned()));
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::store::LmdbChainStore;
	use crate::types::{ExecError, ExecutionOutcome};
	use krypton_core::core::block::BlockBody;
	use krypton_core::core::genesis::genesis_block;
	use krypton_core::core::hash::Hash;
	use krypton_core::global::ChainType;
	use krypton_pow::DevPowVerifier;

	struct PassthroughExecutor;
	impl ExecutorHandle for PassthroughExecutor {
		fn execute(&self, block: &Block, _parent_state_root: &Hash) -> Result<ExecutionOutcome, ExecError> {
			Ok(ExecutionOutcome {
				state_root: block.header.state_root,
				receipts_root: block.header.receipts_root,
				gas_used: 0,
			})
		}
	}

	fn seeded_store() -> (tempfile::TempDir, LmdbChainStore) {
		let dir = tempfile::tempdir().unwrap();
		let store = LmdbChainStore::new(dir.path().to_str().unwrap());
		let genesis = genesis_block(ChainType::AutomatedTesting);
		store.save_block(&genesis, genesis.header.difficulty).unwrap();
		store.set_canonical_chain(&genesis.header, 0).unwrap();
		store
			.save_head(&Tip::new(genesis.hash(), genesis.header.difficulty))
			.unwrap();
		(dir, store)
	}

	fn child_of(parent: &krypton_core::core::block::BlockHeader) -> Block {
		let mut header = parent.clone();
		header.parent_hash = parent.hash();
		header.number = parent.number + 1;
		header.timestamp = parent.timestamp + 15;
		header.difficulty = Difficulty::min();
		let (_, mix) = DevPowVerifier::compute_digest(&header);
		header.mix_digest = mix;
		Block {
			header,
			body: BlockBody {
				transactions: vec![],
				uncles: vec![],
			},
		}
	}

	#[test]
	fn valid_child_extends_head() {
		let (_dir, store) = seeded_store();
		let genesis_header = store.get_header_by_height(0).unwrap();
		let block = child_of(&genesis_header);

		let result = process_block(&block, &store, &PassthroughExecutor, &DevPowVerifier, Options::none())
			.unwrap();
		assert_eq!(result.tip.height, 1);
		assert!(result.triggers_reorg);
	}

	#[test]
	fn unknown_parent_is_rejected() {
		let (_dir, store) = seeded_store();
		let genesis_header = store.get_header_by_height(0).unwrap();
		let mut block = child_of(&genesis_header);
		block.header.parent_hash = Hash([0xabu8; 32]);

		let err = process_block(&block, &store, &PassthroughExecutor, &DevPowVerifier, Options::none())
			.unwrap_err();
		assert!(matches!(err, Error::UnknownParent(_)));
	}

	#[test]
	fn bad_pow_is_rejected_unless_skipped() {
		let (_dir, store) = seeded_store();
		let genesis_header = store.get_header_by_height(0).unwrap();
		let mut block = child_of(&genesis_header);
		block.header.mix_digest = Hash([0u8; 32]);

		let err = process_block(&block, &store, &PassthroughExecutor, &DevPowVerifier, Options::none())
			.unwrap_err();
		assert!(matches!(err, Error::InvalidPow(_)));

		let opts = Options { skip_pow: true };
		assert!(process_block(&block, &store, &PassthroughExecutor, &DevPowVerifier, opts).is_ok());
	}

	#[test]
	fn already_known_block_is_rejected() {
		let (_dir, store) = seeded_store();
		let genesis_header = store.get_header_by_height(0).unwrap();
		let block = child_of(&genesis_header);
		store.save_block(&block, Difficulty::min()).unwrap();

		let err = process_block(&block, &store, &PassthroughExecutor, &DevPowVerifier, Options::none())
			.unwrap_err();
		assert!(matches!(err, Error::AlreadyKnown));
	}
}
