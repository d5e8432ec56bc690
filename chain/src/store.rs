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

//! LMDB-backed [`ChainStore`] (§3): hash -> header/body (stored together,
//! as [`Block`]), hash -> total difficulty, and the canonical number ->
//! hash mapping, maintained only along the current best chain.

use std::sync::Arc;

use krypton_core::core::block::{Block, BlockHeader};
use krypton_core::core::difficulty::Difficulty;
use krypton_core::core::hash::{Hash, Hashed};
use krypton_store::{self as store, Store};

use crate::types::{ChainStore, Tip};

const BLOCK_PREFIX: u8 = b'b';
const TD_PREFIX: u8 = b'd';
const HEIGHT_PREFIX: u8 = b'h';
const HEAD_KEY: &[u8] = b"HEAD";
const UPGRADE_CURSOR_KEY: &[u8] = b"UPGRADE_CURSOR";

/// Concrete LMDB-backed implementation of [`ChainStore`].
pub struct LmdbChainStore {
	db: Store,
}

impl LmdbChainStore {
	/// Opens (creating if absent) the chain column under `data_dir`.
	pub fn new(data_dir: &str) -> LmdbChainStore {
		let env = Arc::new(store::lmdb::new_env(data_dir.to_owned()));
		LmdbChainStore {
			db: Store::open(env, "chain"),
		}
	}
}

impl ChainStore for LmdbChainStore {
	fn head(&self) -> Result<Tip, store::Error> {
		let height: u64 = store::option_to_not_found(self.db.get_ser(HEAD_KEY), "head")?;
		let header = self.get_header_by_height(height)?;
		let hash = header.hash();
		let total_difficulty = self.get_total_difficulty(&hash)?;
		Ok(Tip {
			height,
			last_block_h: hash,
			prev_block_h: header.parent_hash,
			total_difficulty,
		})
	}

	fn save_head(&self, tip: &Tip) -> Result<(), store::Error> {
		let batch = self.db.batch()?;
		batch.put_ser(HEAD_KEY, &tip.height)?;
		batch.commit()
	}

	fn get_header(&self, hash: &Hash) -> Result<BlockHeader, store::Error> {
		Ok(self.get_block(hash)?.header)
	}

	fn get_block(&self, hash: &Hash) -> Result<Block, store::Error> {
		store::option_to_not_found(
			self.db.get_ser(&store::to_key(BLOCK_PREFIX, hash.as_bytes())),
			"block",
		)
	}

	fn block_exists(&self, hash: &Hash) -> Result<bool, store::Error> {
		self.db.exists(&store::to_key(BLOCK_PREFIX, hash.as_bytes()))
	}

	fn save_block(&self, block: &Block, total_difficulty: Difficulty) -> Result<(), store::Error> {
		let hash = block.hash();
		let batch = self.db.batch()?;
		batch.put_ser(&store::to_key(BLOCK_PREFIX, hash.as_bytes()), block)?;
		batch.put_ser(&store::to_key(TD_PREFIX, hash.as_bytes()), &total_difficulty)?;
		batch.commit()
	}

	fn get_total_difficulty(&self, hash: &Hash) -> Result<Difficulty, store::Error> {
		store::option_to_not_found(
			self.db.get_ser(&store::to_key(TD_PREFIX, hash.as_bytes())),
			"total_difficulty",
		)
	}

	fn get_header_by_height(&self, height: u64) -> Result<BlockHeader, store::Error> {
		let hash: Hash = store::option_to_not_found(
			self.db.get_ser(&store::u64_to_key(HEIGHT_PREFIX, height)),
			"header_by_height",
		)?;
		self.get_header(&hash)
	}

	fn set_canonical_chain(&self, to: &BlockHeader, from_height: u64) -> Result<(), store::Error> {
		let batch = self.db.batch()?;
		let mut cursor = to.clone();
		loop {
			batch.put_ser(&store::u64_to_key(HEIGHT_PREFIX, cursor.number), &cursor.hash())?;
			if cursor.number <= from_height || cursor.number == 0 {
				break;
			}
			cursor = self.get_header(&cursor.parent_hash)?;
		}
		batch.commit()
	}

	fn upgrade_cursor(&self) -> Result<Option<u64>, store::Error> {
		self.db.get_ser(UPGRADE_CURSOR_KEY)
	}

	fn set_upgrade_cursor(&self, height: u64) -> Result<(), store::Error> {
		let batch = self.db.batch()?;
		batch.put_ser(UPGRADE_CURSOR_KEY, &height)?;
		batch.commit()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use krypton_core::core::block::BlockBody;
	use krypton_core::core::genesis::genesis_block;
	use krypton_core::core::hash::Hashed;
	use krypton_core::global::ChainType;

	fn temp_store() -> (tempfile::TempDir, LmdbChainStore) {
		let dir = tempfile::tempdir().unwrap();
		let store = LmdbChainStore::new(dir.path().to_str().unwrap());
		(dir, store)
	}

	#[test]
	fn save_and_fetch_genesis() {
		let (_dir, store) = temp_store();
		let genesis = genesis_block(ChainType::AutomatedTesting);
		store.save_block(&genesis, Difficulty::min()).unwrap();
		store.set_canonical_chain(&genesis.header, 0).unwrap();
		store
			.save_head(&Tip::new(genesis.hash(), Difficulty::min()))
			.unwrap();

		let head = store.head().unwrap();
		assert_eq!(head.height, 0);
		assert_eq!(head.last_block_h, genesis.hash());
		assert_eq!(store.get_header_by_height(0).unwrap().hash(), genesis.hash());
	}

	#[test]
	fn block_existence_round_trips() {
		let (_dir, store) = temp_store();
		let genesis = genesis_block(ChainType::AutomatedTesting);
		assert!(!store.block_exists(&genesis.hash()).unwrap());
		store.save_block(&genesis, Difficulty::min()).unwrap();
		assert!(store.block_exists(&genesis.hash()).unwrap());
		let _ = BlockBody {
			transactions: vec![],
			uncles: vec![],
		};
	}
}
