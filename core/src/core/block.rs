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

//! Blocks: a header plus a body (§3). The header hash *is* the block hash —
//! there is no separate body commitment beyond the header's roots.

use std::fmt;

use rlp::{DecoderError, Rlp, RlpStream};
use serde::{Deserialize, Serialize};

use crate::core::difficulty::Difficulty;
use crate::core::hash::{Hash, Hashed, ZERO_HASH};
use crate::core::transaction::{Address, Transaction};

/// Maximum number of uncle headers a block body may carry.
pub const MAX_UNCLES: usize = 2;

/// A 2048-bit logs bloom filter, one per header.
#[derive(Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bloom(pub [u8; 256]);

impl Default for Bloom {
	fn default() -> Bloom {
		Bloom([0u8; 256])
	}
}

impl fmt::Debug for Bloom {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Bloom(..)")
	}
}

impl rlp::Encodable for Bloom {
	fn rlp_append(&self, s: &mut RlpStream) {
		s.encoder().encode_value(&self.0);
	}
}

impl rlp::Decodable for Bloom {
	fn decode(rlp: &Rlp<'_>) -> Result<Self, DecoderError> {
		let data = rlp.data()?;
		if data.len() != 256 {
			return Err(DecoderError::RlpIncorrectListLen);
		}
		let mut b = [0u8; 256];
		b.copy_from_slice(data);
		Ok(Bloom(b))
	}
}

/// A block header. §3: "header hash = keccak-256 of the canonical
/// encoding; block hash = header hash."
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockHeader {
	/// Hash of the parent header.
	pub parent_hash: Hash,
	/// Ordered hashes of this block's uncle headers (at most
	/// [`MAX_UNCLES`]).
	pub uncle_hashes: Vec<Hash>,
	/// Address credited with this block's reward.
	pub coinbase: Address,
	/// Root of the post-execution state trie.
	pub state_root: Hash,
	/// Root of this block's transaction trie.
	pub transactions_root: Hash,
	/// Root of this block's receipt trie.
	pub receipts_root: Hash,
	/// Bloom filter over all logs emitted in this block.
	pub logs_bloom: Bloom,
	/// Proof-of-work difficulty.
	pub difficulty: Difficulty,
	/// Block number (height), monotonically increasing from genesis.
	pub number: u64,
	/// Maximum gas this block's transactions may consume in total.
	pub gas_limit: u64,
	/// Total gas consumed by this block's transactions.
	pub gas_used: u64,
	/// Unix timestamp, seconds.
	pub timestamp: u64,
	/// Free-form bytes, bounded by consensus (§ consensus module).
	pub extra_data: Vec<u8>,
	/// PoW mix digest, bound to the nonce by the external verifier.
	pub mix_digest: Hash,
	/// PoW nonce.
	pub nonce: u64,
}

impl BlockHeader {
	/// The genesis header's parent hash: the all-zero hash, since genesis
	/// has no parent.
	pub fn genesis_parent_hash() -> Hash {
		ZERO_HASH
	}
}

impl rlp::Encodable for BlockHeader {
	fn rlp_append(&self, s: &mut RlpStream) {
		s.begin_list(14);
		s.append(&self.parent_hash);
		s.append_list(&self.uncle_hashes);
		s.append(&self.coinbase);
		s.append(&self.state_root);
		s.append(&self.transactions_root);
		s.append(&self.receipts_root);
		s.append(&self.logs_bloom);
		s.append(&self.difficulty);
		s.append(&self.number);
		s.append(&self.gas_limit);
		s.append(&self.gas_used);
		s.append(&self.timestamp);
		s.append(&self.extra_data);
		s.append(&self.mix_digest);
		s.append(&self.nonce);
	}
}

impl rlp::Decodable for BlockHeader {
	fn decode(rlp: &Rlp<'_>) -> Result<Self, DecoderError> {
		if rlp.item_count()? != 14 {
			return Err(DecoderError::RlpIncorrectListLen);
		}
		Ok(BlockHeader {
			parent_hash: rlp.val_at(0)?,
			uncle_hashes: rlp.list_at(1)?,
			coinbase: rlp.val_at(2)?,
			state_root: rlp.val_at(3)?,
			transactions_root: rlp.val_at(4)?,
			receipts_root: rlp.val_at(5)?,
			logs_bloom: rlp.val_at(6)?,
			difficulty: rlp.val_at(7)?,
			number: rlp.val_at(8)?,
			gas_limit: rlp.val_at(9)?,
			gas_used: rlp.val_at(10)?,
			timestamp: rlp.val_at(11)?,
			extra_data: rlp.val_at(12)?,
			mix_digest: rlp.val_at(13)?,
			nonce: rlp.val_at(14 - 1)?,
		})
	}
}

impl Hashed for BlockHeader {}

impl fmt::Debug for BlockHeader {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("BlockHeader")
			.field("number", &self.number)
			.field("hash", &self.hash())
			.field("parent_hash", &self.parent_hash)
			.field("difficulty", &self.difficulty)
			.finish()
	}
}

/// A block body: an ordered transaction list plus at most
/// [`MAX_UNCLES`] uncle headers.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct BlockBody {
	/// Transactions included in this block, in execution order.
	pub transactions: Vec<Transaction>,
	/// Uncle (ommer) headers included for reward purposes.
	pub uncles: Vec<BlockHeader>,
}

impl rlp::Encodable for BlockBody {
	fn rlp_append(&self, s: &mut RlpStream) {
		s.begin_list(2);
		s.append_list(&self.transactions);
		s.append_list(&self.uncles);
	}
}

impl rlp::Decodable for BlockBody {
	fn decode(rlp: &Rlp<'_>) -> Result<Self, DecoderError> {
		if rlp.item_count()? != 2 {
			return Err(DecoderError::RlpIncorrectListLen);
		}
		Ok(BlockBody {
			transactions: rlp.list_at(0)?,
			uncles: rlp.list_at(1)?,
		})
	}
}

impl BlockBody {
	/// Whether this body satisfies the at-most-`MAX_UNCLES` invariant.
	pub fn well_formed(&self) -> bool {
		self.uncles.len() <= MAX_UNCLES
	}
}

/// A full block: header plus body. `Block::hash()` is defined as the
/// header's hash (§3 invariant) — there is no separate block-level
/// encoding.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Block {
	/// The block's header.
	pub header: BlockHeader,
	/// The block's body.
	pub body: BlockBody,
}

impl rlp::Encodable for Block {
	fn rlp_append(&self, s: &mut RlpStream) {
		s.begin_list(2);
		s.append(&self.header);
		s.append(&self.body);
	}
}

impl rlp::Decodable for Block {
	fn decode(rlp: &Rlp<'_>) -> Result<Self, DecoderError> {
		Ok(Block {
			header: rlp.val_at(0)?,
			body: rlp.val_at(1)?,
		})
	}
}

impl Block {
	/// The block hash, which is its header's hash.
	pub fn hash(&self) -> Hash {
		self.header.hash()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample_header(number: u64, parent_hash: Hash) -> BlockHeader {
		BlockHeader {
			parent_hash,
			uncle_hashes: vec![],
			coinbase: Address([0x1u8; 20]),
			state_root: Hash([0x2u8; 32]),
			transactions_root: Hash([0x3u8; 32]),
			receipts_root: Hash([0x4u8; 32]),
			logs_bloom: Bloom::default(),
			difficulty: Difficulty::from_num(1000),
			number,
			gas_limit: 8_000_000,
			gas_used: 0,
			timestamp: 1_600_000_000 + number,
			extra_data: vec![],
			mix_digest: Hash([0x5u8; 32]),
			nonce: 42,
		}
	}

	#[test]
	fn header_rlp_round_trips() {
		let h = sample_header(10, ZERO_HASH);
		let encoded = rlp::encode(&h);
		let decoded: BlockHeader = rlp::decode(&encoded).unwrap();
		assert_eq!(h, decoded);
		assert_eq!(h.hash(), decoded.hash());
	}

	#[test]
	fn block_hash_equals_header_hash() {
		let header = sample_header(1, ZERO_HASH);
		let block = Block {
			header: header.clone(),
			body: BlockBody {
				transactions: vec![],
				uncles: vec![],
			},
		};
		assert_eq!(block.hash(), header.hash());
	}

	#[test]
	fn body_with_too_many_uncles_is_not_well_formed() {
		let uncle = sample_header(0, ZERO_HASH);
		let body = BlockBody {
			transactions: vec![],
			uncles: vec![uncle.clone(), uncle.clone(), uncle],
		};
		assert!(!body.well_formed());
	}

	#[test]
	fn block_rlp_round_trips() {
		let header = sample_header(5, Hash([0x9u8; 32]));
		let block = Block {
			header,
			body: BlockBody {
				transactions: vec![],
				uncles: vec![],
			},
		};
		let encoded = rlp::encode(&block);
		let decoded: Block = rlp::decode(&encoded).unwrap();
		assert_eq!(block, decoded);
	}
}
