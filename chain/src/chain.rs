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

//! Facade over the chain store and validation pipeline: the single entry
//! point the downloader (C4) and fetcher (C5) import blocks through.
//! Owns the orphan pool for blocks whose parent hasn't arrived yet (§3
//! "ownership" note: the chain owns imported blocks persistently once
//! accepted).

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::RwLock;

use krypton_core::core::block::Block;
use krypton_core::core::hash::{Hash, Hashed};
use krypton_pow::PowVerifier;

use crate::error::Error;
use crate::pipe;
use crate::types::{ChainAdapter, ChainStore, ExecutorHandle, Options, Tip};

const MAX_ORPHANS: usize = 512;

struct Orphan {
	block: Block,
	opts: Options,
}

/// Blocks that validated structurally but whose parent isn't canonical
/// yet. Bounded and evicted oldest-first so a burst of out-of-order
/// announcements can't grow memory without bound (§3 Announcement
/// lifetime note applies equally here).
struct OrphanPool {
	by_hash: RwLock<HashMap<Hash, Orphan>>,
	by_parent: RwLock<HashMap<Hash, Vec<Hash>>>,
	insertion_order: RwLock<Vec<Hash>>,
}

impl OrphanPool {
	fn new() -> OrphanPool {
		OrphanPool {
			by_hash: RwLock::new(HashMap::new()),
			by_parent: RwLock::new(HashMap::new()),
			insertion_order: RwLock::new(Vec::new()),
		}
	}

	fn len(&self) -> usize {
		self.by_hash.read().len()
	}

	fn add(&self, block: Block, opts: Options) {
		let hash = block.hash();
		let parent = block.header.parent_hash;
		self.by_hash.write().insert(hash, Orphan { block, opts });
		self.by_parent.write().entry(parent).or_default().push(hash);
		self.insertion_order.write().push(hash);

		if self.len() > MAX_ORPHANS {
			let oldest = self.insertion_order.write().remove(0);
			if let Some(orphan) = self.by_hash.write().remove(&oldest) {
				if let Some(siblings) = self.by_parent.write().get_mut(&orphan.block.header.parent_hash) {
					siblings.retain(|h| *h != oldest);
				}
			}
		}
	}

	/// Pops every orphan directly parented on `hash`, so the caller can
	/// retry importing them now that their parent is canonical.
	fn take_children_of(&self, hash: &Hash) -> Vec<(Block, Options)> {
		let children = self.by_parent.write().remove(hash).unwrap_or_default();
		let mut by_hash = self.by_hash.write();
		children
			.into_iter()
			.filter_map(|h| by_hash.remove(&h))
			.map(|orphan| (orphan.block, orphan.opts))
			.collect()
	}
}

/// The blockchain: validation pipeline plus persistence, fronting a
/// pluggable [`ChainStore`], [`ExecutorHandle`] and
/// [`krypton_pow::PowVerifier`] (§2's external collaborators).
pub struct Chain {
	store: Arc<dyn ChainStore>,
	executor: Arc<dyn ExecutorHandle>,
	pow_verifier: Arc<dyn PowVerifier>,
	adapter: Arc<dyn ChainAdapter>,
	orphans: OrphanPool,
}

impl Chain {
	/// Builds a `Chain` over the given collaborators. Callers are expected
	/// to have already written a genesis block into `store`.
	pub fn new(
		store: Arc<dyn ChainStore>,
		executor: Arc<dyn ExecutorHandle>,
		pow_verifier: Arc<dyn PowVerifier>,
		adapter: Arc<dyn ChainAdapter>,
	) -> Chain {
		Chain {
			store,
			executor,
			pow_verifier,
			adapter,
			orphans: OrphanPool::new(),
		}
	}

	/// The chain's current head.
	pub fn head(&self) -> Result<Tip, Error> {
		Ok(self.store.head()?)
	}

	/// Whether `hash` is already part of the persisted chain store (known,
	/// whether or not still canonical).
	pub fn block_exists(&self, hash: &Hash) -> Result<bool, Error> {
		Ok(self.store.block_exists(hash)?)
	}

	/// The header at the given hash, if known.
	pub fn get_header(&self, hash: &Hash) -> Result<krypton_core::core::block::BlockHeader, Error> {
		Ok(self.store.get_header(hash)?)
	}

	/// The full block (header + body) at the given hash, if known. Used
	/// to answer `GetBlockBodies` and to hand blocks to the fetcher's
	/// propagation step.
	pub fn get_block(&self, hash: &Hash) -> Result<Block, Error> {
		Ok(self.store.get_block(hash)?)
	}

	/// The canonical header at `height`, if any.
	pub fn get_header_by_height(&self, height: u64) -> Result<krypton_core::core::block::BlockHeader, Error> {
		Ok(self.store.get_header_by_height(height)?)
	}

	/// Number of blocks currently parked waiting for their parent (§4.5
	/// fetcher "pending set" uses the same idea at the announcement
	/// layer; this is the chain-level equivalent for full blocks).
	pub fn orphans_len(&self) -> usize {
		self.orphans.len()
	}

	/// Imports `block` into the chain (§8 invariant 1: only ever appended
	/// on top of an already-canonical parent; rejections never advance
	/// the head — §8 invariant 4).
	///
	/// On `UnknownParent`, the block is parked as an orphan and `Ok(None)`
	/// is returned — not treated as failure, since the sync layer is
	/// expected to eventually deliver the parent. Any other error is
	/// propagated so the caller can apply §7's ban/abort policy.
	pub fn process_block(&self, block: Block, opts: Options) -> Result<Option<Tip>, Error> {
		match pipe::process_block(&block, self.store.as_ref(), self.executor.as_ref(), self.pow_verifier.as_ref(), opts) {
			Ok(result) => {
				self.store.save_block(&block, result.tip.total_difficulty)?;
				if result.triggers_reorg {
					self.store.set_canonical_chain(&block.header, self.head()?.height)?;
					self.store.save_head(&result.tip)?;
					info!("chain: new head {} at height {}", block.hash(), result.tip.height);
				}
				self.adapter.block_accepted(&block, &result.tip);

				let hash = block.hash();
				self.import_ready_children(hash);
				Ok(Some(result.tip))
			}
			Err(Error::UnknownParent(parent)) => {
				debug!("chain: parking orphan {} awaiting parent {}", block.hash(), parent);
				self.orphans.add(block, opts);
				Ok(None)
			}
			Err(Error::AlreadyKnown) => Ok(None),
			Err(e) => {
				warn!("chain: rejecting block {}: {}", block.hash(), e);
				Err(e)
			}
		}
	}

	/// Retries every orphan directly parented on `hash`, recursing through
	/// any chain of orphans this unblocks.
	fn import_ready_children(&self, hash: Hash) {
		for (child, opts) in self.orphans.take_children_of(&hash) {
			let _ = self.process_block(child, opts);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::store::LmdbChainStore;
	use crate::types::{ExecError, ExecutionOutcome, NoopAdapter};
	use krypton_core::core::block::BlockBody;
	use krypton_core::core::difficulty::Difficulty;
	use krypton_core::core::genesis::genesis_block;
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

	fn new_chain() -> (tempfile::TempDir, Chain) {
		let dir = tempfile::tempdir().unwrap();
		let store = LmdbChainStore::new(dir.path().to_str().unwrap());
		let genesis = genesis_block(ChainType::AutomatedTesting);
		store.save_block(&genesis, genesis.header.difficulty).unwrap();
		store.set_canonical_chain(&genesis.header, 0).unwrap();
		store
			.save_head(&Tip::new(genesis.hash(), genesis.header.difficulty))
			.unwrap();

		let chain = Chain::new(
			Arc::new(store),
			Arc::new(PassthroughExecutor),
			Arc::new(DevPowVerifier),
			Arc::new(NoopAdapter),
		);
		(dir, chain)
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
	fn importing_three_blocks_advances_head_in_order() {
		let (_dir, chain) = new_chain();
		let mut header = chain.get_header_by_height(0).unwrap();
		for expected_height in 1..=3u64 {
			let block = child_of(&header);
			header = block.header.clone();
			let tip = chain.process_block(block, Options::none()).unwrap().unwrap();
			assert_eq!(tip.height, expected_height);
		}
		assert_eq!(chain.head().unwrap().height, 3);
	}

	#[test]
	fn block_with_missing_parent_is_parked_not_rejected() {
		let (_dir, chain) = new_chain();
		let genesis_header = chain.get_header_by_height(0).unwrap();
		let child = child_of(&genesis_header);
		let grandchild = child_of(&child.header);

		let result = chain.process_block(grandchild, Options::none()).unwrap();
		assert!(result.is_none());
		assert_eq!(chain.orphans_len(), 1);
		assert_eq!(chain.head().unwrap().height, 0);
	}

	#[test]
	fn arriving_parent_releases_parked_orphan() {
		let (_dir, chain) = new_chain();
		let genesis_header = chain.get_header_by_height(0).unwrap();
		let child = child_of(&genesis_header);
		let grandchild = child_of(&child.header);

		chain.process_block(grandchild, Options::none()).unwrap();
		chain.process_block(child, Options::none()).unwrap();

		assert_eq!(chain.head().unwrap().height, 2);
		assert_eq!(chain.orphans_len(), 0);
	}
}
