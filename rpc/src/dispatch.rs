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

//! Builds the `jsonrpc_core::IoHandler` dispatch table (SPEC_FULL §6 /
//! §9 "dynamic dispatch across RPC handlers"): a mapping from method name
//! to a function value with uniform signature, modeled here as
//! `jsonrpc-core`'s own method registration rather than a hand-rolled
//! `HashMap<String, fn>` -- the library already is that mapping.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use jsonrpc_core::{IoHandler, Params, Value};
use parking_lot::Mutex;
use serde_json::json;

use krypton_chain::Chain;
use krypton_core::core::hash::Hashed;
use krypton_p2p::Peers;
use krypton_pool::{PoolError, TransactionPool, TxSource};
use krypton_sync::{Coordinator, SyncStatus};

use crate::txindex::TxIndex;
use crate::types::{
	data_hex, hash_hex, internal_error, invalid_params, parse_block_number, parse_hash, quantity, BlockView,
	SyncingView, TransactionView,
};

/// Monotonically increasing filter id, shared by every installed block
/// filter.
struct FilterManager {
	next_id: AtomicU64,
	filters: Mutex<HashMap<u64, u64>>,
}

impl FilterManager {
	fn new() -> FilterManager {
		FilterManager {
			next_id: AtomicU64::new(1),
			filters: Mutex::new(HashMap::new()),
		}
	}

	fn install(&self, current_height: u64) -> u64 {
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		self.filters.lock().insert(id, current_height);
		id
	}

	fn uninstall(&self, id: u64) -> bool {
		self.filters.lock().remove(&id).is_some()
	}

	/// Hashes of every block mined since this filter last polled, oldest
	/// first. Advances the filter's watermark to `current_height`.
	fn poll(&self, id: u64, current_height: u64, chain: &Chain) -> Option<Vec<String>> {
		let mut filters = self.filters.lock();
		let last_seen = filters.get_mut(&id)?;
		let from = *last_seen + 1;
		let mut hashes = Vec::new();
		for height in from..=current_height {
			if let Ok(header) = chain.get_header_by_height(height) {
				hashes.push(hash_hex(&header.hash()));
			}
		}
		*last_seen = current_height;
		Some(hashes)
	}
}

/// Everything the dispatch table reads from: the chain, the pool, the
/// peer registry, the sync coordinator's progress state, and the
/// transaction-location index this crate maintains itself (§ txindex).
/// One instance is built at startup and cloned into every closure
/// registered on the `IoHandler`.
#[derive(Clone)]
pub struct RpcContext {
	/// The chain this node serves reads from.
	pub chain: Arc<Chain>,
	/// The pending-transaction pool.
	pub pool: Arc<dyn TransactionPool>,
	/// The connected-peer registry.
	pub peers: Arc<Peers>,
	/// The sync coordinator, polled for `syncing`'s progress tuple.
	pub coordinator: Arc<Coordinator>,
	/// Transaction-location index fed by every accepted block.
	pub tx_index: Arc<TxIndex>,
	/// Numeric network id exchanged in the protocol handshake, echoed by
	/// `net_version`.
	pub network_id: u64,
}

/// Builds the dispatch table over `ctx`. The returned handler answers
/// every method SPEC_FULL §6 names as a minimum: `protocolVersion`,
/// `blockNumber`, `syncing`, `getBlockByHash`/`getBlockByNumber`,
/// `getTransactionByHash`, `getTransactionReceipt`, `peerCount`,
/// `listening`, `version`, plus stubbed mining-control/account methods
/// (the miner and wallet are named, out-of-scope collaborators) and a
/// minimal block-filter family.
pub fn build_handler(ctx: RpcContext) -> IoHandler {
	let mut io = IoHandler::new();
	let filters = Arc::new(FilterManager::new());

	{
		io.add_method("web3_clientVersion", |_params: Params| async move {
			Ok(Value::String(format!("krypton/v{}", env!("CARGO_PKG_VERSION"))))
		});
	}

	{
		io.add_method("protocolVersion", |_params: Params| async move {
			Ok(Value::String(quantity(krypton_p2p::PROTOCOL_VERSION as u64)))
		});
	}

	{
		let ctx = ctx.clone();
		io.add_method("net_version", move |_params: Params| {
			let ctx = ctx.clone();
			async move { Ok(Value::String(ctx.network_id.to_string())) }
		});
	}

	{
		let ctx = ctx.clone();
		io.add_method("net_peerCount", move |_params: Params| {
			let ctx = ctx.clone();
			async move { Ok(Value::String(quantity(ctx.peers.len() as u64))) }
		});
	}
	{
		let ctx = ctx.clone();
		io.add_method("peerCount", move |_params: Params| {
			let ctx = ctx.clone();
			async move { Ok(Value::String(quantity(ctx.peers.len() as u64))) }
		});
	}

	{
		io.add_method("net_listening", |_params: Params| async move { Ok(Value::Bool(true)) });
		io.add_method("listening", |_params: Params| async move { Ok(Value::Bool(true)) });
	}

	{
		let ctx = ctx.clone();
		io.add_method("eth_blockNumber", move |_params: Params| {
			let ctx = ctx.clone();
			async move {
				let head = ctx.chain.head().map_err(internal_error)?;
				Ok(Value::String(quantity(head.height)))
			}
		});
	}
	{
		let ctx = ctx.clone();
		io.add_method("blockNumber", move |_params: Params| {
			let ctx = ctx.clone();
			async move {
				let head = ctx.chain.head().map_err(internal_error)?;
				Ok(Value::String(quantity(head.height)))
			}
		});
	}

	{
		let ctx = ctx.clone();
		let sync_method = move |_params: Params| {
			let ctx = ctx.clone();
			async move {
				let status = ctx.coordinator.sync_state().status();
				let view = match status {
					SyncStatus::Idle => SyncingView::NotSyncing(false),
					SyncStatus::Syncing(_, progress) | SyncStatus::Committing(progress) => SyncingView::Progress {
						starting_block: quantity(progress.starting_height),
						current_block: quantity(progress.current_height),
						highest_block: quantity(progress.highest_height),
					},
				};
				serde_json::to_value(view).map_err(internal_error)
			}
		};
		io.add_method("eth_syncing", sync_method.clone());
		io.add_method("syncing", sync_method);
	}

	{
		let ctx = ctx.clone();
		io.add_method("eth_getBlockByHash", move |params: Params| {
			let ctx = ctx.clone();
			async move {
				let (hash_str, full): (String, bool) = params.parse().map_err(|_| invalid_params("expected [hash, bool]"))?;
				let hash = parse_hash(&hash_str)?;
				match ctx.chain.get_block(&hash) {
					Ok(block) => serde_json::to_value(BlockView::from_block(&block, full)).map_err(internal_error),
					Err(_) => Ok(Value::Null),
				}
			}
		});
	}

	{
		let ctx = ctx.clone();
		io.add_method("eth_getBlockByNumber", move |params: Params| {
			let ctx = ctx.clone();
			async move {
				let (tag, full): (String, bool) = params.parse().map_err(|_| invalid_params("expected [tag, bool]"))?;
				let head = ctx.chain.head().map_err(internal_error)?;
				let number = parse_block_number(&tag, head.height)?;
				match ctx.chain.get_header_by_height(number).and_then(|h| ctx.chain.get_block(&h.hash())) {
					Ok(block) => serde_json::to_value(BlockView::from_block(&block, full)).map_err(internal_error),
					Err(_) => Ok(Value::Null),
				}
			}
		});
	}

	{
		let ctx = ctx.clone();
		io.add_method("getBlockByHash", move |params: Params| {
			let ctx = ctx.clone();
			async move {
				let (hash_str,): (String,) = params.parse().map_err(|_| invalid_params("expected [hash]"))?;
				let hash = parse_hash(&hash_str)?;
				match ctx.chain.get_block(&hash) {
					Ok(block) => serde_json::to_value(BlockView::from_block(&block, false)).map_err(internal_error),
					Err(_) => Ok(Value::Null),
				}
			}
		});
	}
	{
		let ctx = ctx.clone();
		io.add_method("getBlockByNumber", move |params: Params| {
			let ctx = ctx.clone();
			async move {
				let (tag,): (String,) = params.parse().map_err(|_| invalid_params("expected [number]"))?;
				let head = ctx.chain.head().map_err(internal_error)?;
				let number = parse_block_number(&tag, head.height)?;
				match ctx.chain.get_header_by_height(number).and_then(|h| ctx.chain.get_block(&h.hash())) {
					Ok(block) => serde_json::to_value(BlockView::from_block(&block, false)).map_err(internal_error),
					Err(_) => Ok(Value::Null),
				}
			}
		});
	}

	{
		let ctx = ctx.clone();
		let method = move |params: Params| {
			let ctx = ctx.clone();
			async move {
				let (hash_str,): (String,) = params.parse().map_err(|_| invalid_params("expected [hash]"))?;
				let hash = parse_hash(&hash_str)?;
				match ctx.tx_index.locate(&hash) {
					Some(loc) => match ctx.chain.get_block(&loc.block_hash) {
						Ok(block) => {
							let tx = &block.body.transactions[loc.index as usize];
							serde_json::to_value(TransactionView::from_transaction(tx, Some((&block.header, loc.index))))
								.map_err(internal_error)
						}
						Err(_) => Ok(Value::Null),
					},
					None => Ok(Value::Null),
				}
			}
		};
		io.add_method("eth_getTransactionByHash", method.clone());
		io.add_method("getTransactionByHash", method);
	}

	{
		let ctx = ctx.clone();
		let method = move |params: Params| {
			let ctx = ctx.clone();
			async move {
				let (hash_str,): (String,) = params.parse().map_err(|_| invalid_params("expected [hash]"))?;
				let hash = parse_hash(&hash_str)?;
				let loc = match ctx.tx_index.locate(&hash) {
					Some(loc) => loc,
					None => return Ok(Value::Null),
				};
				let block = match ctx.chain.get_block(&loc.block_hash) {
					Ok(b) => b,
					Err(_) => return Ok(Value::Null),
				};
				let tx = &block.body.transactions[loc.index as usize];
				Ok(json!({
					"transactionHash": hash_hex(&hash),
					"transactionIndex": quantity(loc.index),
					"blockHash": hash_hex(&loc.block_hash),
					"blockNumber": quantity(loc.block_number),
					"from": tx.sender().ok().map(|a| a.to_string()),
					"to": tx.to.map(|a| a.to_string()),
					// The state executor (SPEC_FULL §2, out of scope) is the
					// only thing that knows per-transaction gas use; absent
					// it, the best this surface can report is the block's
					// aggregate.
					"cumulativeGasUsed": quantity(block.header.gas_used),
					"gasUsed": quantity(block.header.gas_used),
					"logsBloom": data_hex(&block.header.logs_bloom.0),
					"logs": Value::Array(Vec::new()),
					"status": quantity(1),
				}))
			}
		};
		io.add_method("eth_getTransactionReceipt", method.clone());
		io.add_method("getTransactionReceipt", method);
	}

	{
		let ctx = ctx.clone();
		let method = move |params: Params| {
			let ctx = ctx.clone();
			async move {
				let (raw,): (String,) = params.parse().map_err(|_| invalid_params("expected [data]"))?;
				let stripped = raw.strip_prefix("0x").unwrap_or(&raw);
				let bytes = (0..stripped.len())
					.step_by(2)
					.map(|i| u8::from_str_radix(&stripped[i..i + 2], 16))
					.collect::<Result<Vec<u8>, _>>()
					.map_err(invalid_params)?;
				let tx: krypton_core::core::transaction::Transaction =
					rlp::decode(&bytes).map_err(invalid_params)?;
				let hash = tx.hash();
				match ctx.pool.insert(tx, TxSource::Local) {
					Ok(()) => Ok(Value::String(hash_hex(&hash))),
					Err(PoolError::AlreadyInPool) => Ok(Value::String(hash_hex(&hash))),
					Err(e) => Err(invalid_params(e)),
				}
			}
		};
		io.add_method("eth_sendRawTransaction", method.clone());
		io.add_method("sendRawTransaction", method);
	}

	// Mining-control and account methods: the miner and wallet/key
	// management are named, out-of-scope external collaborators
	// (SPEC_FULL §2). A node with neither attached answers these exactly
	// as upstream clients expect: not mining, no managed accounts.
	{
		io.add_method("eth_mining", |_p: Params| async move { Ok(Value::Bool(false)) });
		io.add_method("eth_hashrate", |_p: Params| async move { Ok(Value::String(quantity(0))) });
		io.add_method("eth_coinbase", |_p: Params| async move {
			Err(internal_error("no coinbase address configured: mining is disabled"))
		});
		io.add_method("eth_accounts", |_p: Params| async move { Ok(Value::Array(Vec::new())) });
		io.add_method("eth_gasPrice", |_p: Params| async move { Ok(Value::String(quantity(1))) });
	}

	// Minimal block-filter family (§6 "filter APIs"). No log filters: logs
	// are a property of receipts, which require the state executor this
	// workspace doesn't implement.
	{
		let ctx = ctx.clone();
		let filters_m = filters.clone();
		io.add_method("eth_newBlockFilter", move |_p: Params| {
			let ctx = ctx.clone();
			let filters_m = filters_m.clone();
			async move {
				let head = ctx.chain.head().map_err(internal_error)?;
				Ok(Value::String(quantity(filters_m.install(head.height))))
			}
		});
	}
	{
		let filters_m = filters.clone();
		io.add_method("eth_uninstallFilter", move |params: Params| {
			let filters_m = filters_m.clone();
			async move {
				let (id_str,): (String,) = params.parse().map_err(|_| invalid_params("expected [id]"))?;
				let id = parse_filter_id(&id_str)?;
				Ok(Value::Bool(filters_m.uninstall(id)))
			}
		});
	}
	{
		let ctx = ctx.clone();
		let filters_m = filters.clone();
		io.add_method("eth_getFilterChanges", move |params: Params| {
			let ctx = ctx.clone();
			let filters_m = filters_m.clone();
			async move {
				let (id_str,): (String,) = params.parse().map_err(|_| invalid_params("expected [id]"))?;
				let id = parse_filter_id(&id_str)?;
				let head = ctx.chain.head().map_err(internal_error)?;
				match filters_m.poll(id, head.height, &ctx.chain) {
					Some(hashes) => Ok(Value::Array(hashes.into_iter().map(Value::String).collect())),
					None => Err(invalid_params("unknown filter id")),
				}
			}
		});
	}

	io
}

fn parse_filter_id(s: &str) -> Result<u64, jsonrpc_core::Error> {
	let stripped = s.strip_prefix("0x").unwrap_or(s);
	u64::from_str_radix(stripped, 16).map_err(invalid_params)
}

#[cfg(test)]
mod tests {
	use super::*;
	use krypton_chain::{Chain, LmdbChainStore, NoopAdapter};
	use krypton_core::core::genesis::genesis_block;
	use krypton_core::core::hash::Hashed;
	use krypton_core::global::ChainType;
	use krypton_pow::DevPowVerifier;

	struct StubExecutor;
	impl krypton_chain::ExecutorHandle for StubExecutor {
		fn execute(
			&self,
			block: &krypton_core::core::block::Block,
			_parent_state_root: &krypton_core::core::hash::Hash,
		) -> Result<krypton_chain::ExecutionOutcome, krypton_chain::ExecError> {
			Ok(krypton_chain::ExecutionOutcome {
				state_root: block.header.state_root,
				receipts_root: block.header.receipts_root,
				gas_used: block.header.gas_used,
			})
		}
	}

	fn genesis_chain() -> (tempfile::TempDir, Arc<Chain>) {
		let dir = tempfile::tempdir().unwrap();
		let store = Arc::new(LmdbChainStore::new(dir.path().to_str().unwrap()));
		let genesis = genesis_block(ChainType::AutomatedTesting);
		store
			.save_block(&genesis, krypton_core::core::difficulty::Difficulty::min())
			.unwrap();
		store.set_canonical_chain(&genesis.header, 0).unwrap();
		store
			.save_head(&krypton_chain::Tip::new(genesis.hash(), krypton_core::core::difficulty::Difficulty::min()))
			.unwrap();
		let chain = Chain::new(store, Arc::new(StubExecutor), Arc::new(DevPowVerifier), Arc::new(NoopAdapter));
		(dir, Arc::new(chain))
	}

	#[test]
	fn filter_manager_reports_only_new_blocks() {
		let (_dir, chain) = genesis_chain();
		let manager = FilterManager::new();
		let id = manager.install(0);
		let first = manager.poll(id, 0, &chain).unwrap();
		assert!(first.is_empty());
	}

	#[test]
	fn uninstall_makes_the_filter_unknown() {
		let manager = FilterManager::new();
		let id = manager.install(0);
		assert!(manager.uninstall(id));
		assert!(!manager.uninstall(id));
	}
}
