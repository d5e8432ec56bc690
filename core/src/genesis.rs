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

//! Genesis block definitions, one per [`ChainType`](crate::global::ChainType).
//! Genesis has no parent, no uncles and no transactions; its difficulty and
//! PoW fields are simply the network's agreed-upon starting point.

use crate::core::block::{Block, BlockBody, BlockHeader, Bloom};
use crate::core::difficulty::Difficulty;
use crate::core::hash::{Hash, ZERO_HASH};
use crate::core::transaction::Address;
use crate::global::ChainType;

fn empty_body() -> BlockBody {
	BlockBody {
		transactions: vec![],
		uncles: vec![],
	}
}

/// Builds the genesis block for the given chain type.
pub fn genesis_block(chain_type: ChainType) -> Block {
	let (difficulty, timestamp, extra_data) = match chain_type {
		ChainType::Mainnet => (
			Difficulty::from_num(17_179_869_184),
			1_600_000_000,
			b"krypton mainnet".to_vec(),
		),
		ChainType::Testnet => (
			Difficulty::from_num(1_048_576),
			1_600_000_000,
			b"krypton testnet".to_vec(),
		),
		ChainType::AutomatedTesting => (Difficulty::min(), 1_600_000_000, b"krypton test".to_vec()),
	};

	let header = BlockHeader {
		parent_hash: BlockHeader::genesis_parent_hash(),
		uncle_hashes: vec![],
		coinbase: Address([0u8; 20]),
		state_root: ZERO_HASH,
		transactions_root: empty_list_root(),
		receipts_root: empty_list_root(),
		logs_bloom: Bloom::default(),
		difficulty,
		number: 0,
		gas_limit: 5_000_000,
		gas_used: 0,
		timestamp,
		extra_data,
		mix_digest: ZERO_HASH,
		nonce: 0,
	};

	Block {
		header,
		body: empty_body(),
	}
}

/// The root hash of an empty transaction or receipt list. Both the genesis
/// block and any block with no transactions share this value.
fn empty_list_root() -> Hash {
	use crate::core::hash::keccak256;
	keccak256(&rlp::encode_list::<Hash, Hash>(&[]))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::core::hash::Hashed;

	#[test]
	fn genesis_has_no_parent_and_zero_number() {
		let genesis = genesis_block(ChainType::AutomatedTesting);
		assert_eq!(genesis.header.parent_hash, ZERO_HASH);
		assert_eq!(genesis.header.number, 0);
		assert!(genesis.body.transactions.is_empty());
	}

	#[test]
	fn mainnet_and_testnet_genesis_hashes_differ() {
		let mainnet = genesis_block(ChainType::Mainnet);
		let testnet = genesis_block(ChainType::Testnet);
		assert_ne!(mainnet.hash(), testnet.hash());
	}

	#[test]
	fn genesis_hash_is_deterministic() {
		let a = genesis_block(ChainType::Mainnet);
		let b = genesis_block(ChainType::Mainnet);
		assert_eq!(a.hash(), b.hash());
	}
}
