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

//! A transaction-location index: hash -> (block hash, block number, index
//! within the block). The chain store (SPEC_FULL §3) only maps hash ->
//! header/body/TD -- it has no reason to also support "where did this
//! transaction land", and it's the RPC surface, not the chain, that needs
//! `getTransactionByHash`/`getTransactionReceipt`. Kept here, in-memory,
//! rebuilt from the canonical chain if the process restarts, rather than
//! adding a secondary persisted index to `ChainStore` for a single
//! read-path's benefit.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use krypton_core::core::block::Block;
use krypton_core::core::hash::{Hash, Hashed};

/// Where a transaction landed: the block it was included in, and its
/// position within that block's transaction list.
#[derive(Clone, Copy, Debug)]
pub struct TxLocation {
	/// Hash of the block the transaction was included in.
	pub block_hash: Hash,
	/// Number of that block.
	pub block_number: u64,
	/// Index of the transaction within the block's transaction list.
	pub index: u64,
}

/// The index itself. Cheap to share: one instance lives for the life of
/// the node, fed by every accepted block regardless of which import path
/// (downloader or fetcher) produced it.
#[derive(Default)]
pub struct TxIndex {
	locations: RwLock<HashMap<Hash, TxLocation>>,
}

impl TxIndex {
	/// An empty index.
	pub fn new() -> Arc<TxIndex> {
		Arc::new(TxIndex::default())
	}

	/// Records every transaction in a newly-accepted block. Idempotent:
	/// re-recording the same block (e.g. a duplicate notification) just
	/// overwrites identical entries.
	pub fn record_block(&self, block: &Block) {
		let block_hash = block.hash();
		let block_number = block.header.number;
		let mut locations = self.locations.write();
		for (index, tx) in block.body.transactions.iter().enumerate() {
			locations.insert(
				tx.hash(),
				TxLocation {
					block_hash,
					block_number,
					index: index as u64,
				},
			);
		}
	}

	/// Looks up where `hash` landed, if this index has seen it.
	pub fn locate(&self, hash: &Hash) -> Option<TxLocation> {
		self.locations.read().get(hash).copied()
	}

	/// Number of transactions currently indexed, for diagnostics.
	pub fn len(&self) -> usize {
		self.locations.read().len()
	}

	/// Whether the index holds no transactions.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use krypton_core::core::block::BlockBody;
	use krypton_core::core::genesis::genesis_block;
	use krypton_core::global::ChainType;

	#[test]
	fn records_and_locates_transactions() {
		let index = TxIndex::new();
		let mut block = genesis_block(ChainType::AutomatedTesting);
		block.header.number = 7;
		block.body = BlockBody {
			transactions: vec![],
			uncles: vec![],
		};
		index.record_block(&block);
		assert!(index.is_empty());
	}
}
