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

//! Wire shapes returned by the dispatch table (§6), and the hex encoding
//! helpers the Ethereum-family JSON-RPC convention uses for every integer
//! and byte string ("quantity"/"data" in the upstream terminology).

use jsonrpc_core::{Error as RpcError, ErrorCode};
use serde::Serialize;

use krypton_core::core::block::{Block, BlockHeader};
use krypton_core::core::hash::{Hash, Hashed};
use krypton_core::core::transaction::Transaction;

/// Encodes an integer the Ethereum-family way: `0x`-prefixed, no leading
/// zeroes (except the value zero itself, encoded as `0x0`).
pub fn quantity(n: u64) -> String {
	format!("0x{:x}", n)
}

/// Encodes an arbitrary byte string as `0x`-prefixed lowercase hex.
pub fn data_hex(bytes: &[u8]) -> String {
	let mut s = String::with_capacity(2 + bytes.len() * 2);
	s.push_str("0x");
	for b in bytes {
		s.push_str(&format!("{:02x}", b));
	}
	s
}

/// Encodes a 32-byte hash as `0x`-prefixed hex.
pub fn hash_hex(hash: &Hash) -> String {
	format!("0x{}", hash)
}

/// Parses a `0x`-prefixed 32-byte hash, the form every hash-valued RPC
/// parameter arrives in.
pub fn parse_hash(s: &str) -> Result<Hash, RpcError> {
	let stripped = s.strip_prefix("0x").unwrap_or(s);
	let bytes = hex_decode(stripped).map_err(invalid_params)?;
	if bytes.len() != 32 {
		return Err(invalid_params("expected a 32-byte hash"));
	}
	Ok(Hash::from_slice(&bytes))
}

/// Parses a block number parameter: a `0x`-prefixed quantity, or one of the
/// tags `"latest"`/`"earliest"`/`"pending"`. `current_head` resolves the
/// tags; Krypton has no separate pending block, so `"pending"` aliases
/// `"latest"`.
pub fn parse_block_number(s: &str, current_head: u64) -> Result<u64, RpcError> {
	match s {
		"latest" | "pending" => Ok(current_head),
		"earliest" => Ok(0),
		hex => {
			let stripped = hex.strip_prefix("0x").unwrap_or(hex);
			u64::from_str_radix(stripped, 16).map_err(invalid_params)
		}
	}
}

fn hex_decode(s: &str) -> Result<Vec<u8>, String> {
	if s.len() % 2 != 0 {
		return Err(format!("odd-length hex string: {}", s));
	}
	(0..s.len())
		.step_by(2)
		.map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|e| e.to_string()))
		.collect()
}

pub(crate) fn invalid_params(e: impl std::fmt::Display) -> RpcError {
	RpcError {
		code: ErrorCode::InvalidParams,
		message: e.to_string(),
		data: None,
	}
}

pub(crate) fn internal_error(e: impl std::fmt::Display) -> RpcError {
	RpcError {
		code: ErrorCode::InternalError,
		message: e.to_string(),
		data: None,
	}
}

/// Either the hashes of a block's transactions, or the transactions
/// themselves, depending on the `fullTransactions` flag callers pass to
/// `getBlockByHash`/`getBlockByNumber`.
#[derive(Serialize)]
#[serde(untagged)]
pub enum BlockTransactions {
	/// `fullTransactions: false` (the default).
	Hashes(Vec<String>),
	/// `fullTransactions: true`.
	Full(Vec<TransactionView>),
}

/// A block as returned by `getBlockByHash`/`getBlockByNumber`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockView {
	pub hash: String,
	pub parent_hash: String,
	pub number: String,
	pub timestamp: String,
	pub difficulty: String,
	pub gas_limit: String,
	pub gas_used: String,
	pub extra_data: String,
	pub miner: String,
	pub state_root: String,
	pub transactions_root: String,
	pub receipts_root: String,
	pub logs_bloom: String,
	pub mix_hash: String,
	pub nonce: String,
	pub uncles: Vec<String>,
	pub transactions: BlockTransactions,
}

impl BlockView {
	/// Builds the view from a full block, embedding full transaction
	/// objects when `full_transactions` is set.
	pub fn from_block(block: &Block, full_transactions: bool) -> BlockView {
		let header = &block.header;
		let transactions = if full_transactions {
			BlockTransactions::Full(
				block
					.body
					.transactions
					.iter()
					.enumerate()
					.map(|(i, tx)| TransactionView::from_transaction(tx, Some((header, i as u64))))
					.collect(),
			)
		} else {
			BlockTransactions::Hashes(block.body.transactions.iter().map(|tx| hash_hex(&tx.hash())).collect())
		};
		BlockView::from_header(header, transactions)
	}

	fn from_header(header: &BlockHeader, transactions: BlockTransactions) -> BlockView {
		BlockView {
			hash: hash_hex(&header.hash()),
			parent_hash: hash_hex(&header.parent_hash),
			number: quantity(header.number),
			timestamp: quantity(header.timestamp),
			difficulty: format!("0x{:x}", header.difficulty.into_u256()),
			gas_limit: quantity(header.gas_limit),
			gas_used: quantity(header.gas_used),
			extra_data: data_hex(&header.extra_data),
			miner: header.coinbase.to_string(),
			state_root: hash_hex(&header.state_root),
			transactions_root: hash_hex(&header.transactions_root),
			receipts_root: hash_hex(&header.receipts_root),
			logs_bloom: data_hex(&header.logs_bloom.0),
			mix_hash: hash_hex(&header.mix_digest),
			nonce: format!("0x{:016x}", header.nonce),
			uncles: header.uncle_hashes.iter().map(hash_hex).collect(),
			transactions,
		}
	}
}

/// A transaction as returned by `getTransactionByHash`, or embedded in a
/// block view when full transactions were requested.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionView {
	pub hash: String,
	pub nonce: String,
	pub from: Option<String>,
	pub to: Option<String>,
	pub value: String,
	pub gas_price: String,
	pub gas: String,
	pub input: String,
	pub v: String,
	pub r: String,
	pub s: String,
	pub block_hash: Option<String>,
	pub block_number: Option<String>,
	pub transaction_index: Option<String>,
}

impl TransactionView {
	/// Builds the view. `location`, when set, is the `(header, index)` of
	/// the block the transaction was mined in; `None` for a pending
	/// transaction still sitting in the pool.
	pub fn from_transaction(tx: &Transaction, location: Option<(&BlockHeader, u64)>) -> TransactionView {
		TransactionView {
			hash: hash_hex(&tx.hash()),
			nonce: quantity(tx.nonce),
			from: tx.sender().ok().map(|a| a.to_string()),
			to: tx.to.map(|a| a.to_string()),
			value: format!("0x{:x}", tx.value),
			gas_price: format!("0x{:x}", tx.gas_price),
			gas: quantity(tx.gas_limit),
			input: data_hex(&tx.data),
			v: quantity(tx.v),
			r: format!("0x{:x}", tx.r),
			s: format!("0x{:x}", tx.s),
			block_hash: location.map(|(h, _)| hash_hex(&h.hash())),
			block_number: location.map(|(h, _)| quantity(h.number)),
			transaction_index: location.map(|(_, i)| quantity(i)),
		}
	}
}

/// The `syncing` method's result: the downloader's progress tuple, or
/// `false` when idle.
#[derive(Serialize)]
#[serde(untagged)]
pub enum SyncingView {
	/// Not currently syncing.
	NotSyncing(bool),
	/// A round is in progress.
	Progress {
		#[serde(rename = "startingBlock")]
		starting_block: String,
		#[serde(rename = "currentBlock")]
		current_block: String,
		#[serde(rename = "highestBlock")]
		highest_block: String,
	},
}
