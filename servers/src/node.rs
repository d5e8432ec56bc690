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

//! The node: wires the chain, peer registry, sync coordinator, pool and
//! RPC surface into one running process. Generalized from the teacher's
//! `grin::server::Server`, which plays the same role over the
//! mimblewimble-specific crates; here every collaborator is the
//! Ethereum-family equivalent described in SPEC_FULL.

use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;

use fs2::FileExt;
use parking_lot::Mutex;

use krypton_chain::{Chain, ChainAdapter as ChainImportAdapter, ChainStore, LmdbChainStore, Tip};
use krypton_config::ServerConfig;
use krypton_core::core::block::Block;
use krypton_core::core::genesis::genesis_block;
use krypton_core::core::hash::Hashed;
use krypton_core::global;
use krypton_p2p::{Handshaker, PeerStore, Peers, Server as P2pServer};
use krypton_pool::{MemoryPool, TransactionPool};
use krypton_pow::PowVerifier;
use krypton_rpc::{build_handler, RpcContext, TxIndex};
use krypton_sync::{Coordinator, DownloaderConfig, EventBus, Fetcher, FetcherConfig, NetworkAdapter, ResponseRouter, SyncState};
use krypton_util::CancelToken;

use crate::error::Error;
use crate::seed;
use crate::stats::{NodeStats, PeerStats};

/// Feeds every accepted block into the RPC transaction index (SPEC_FULL
/// §6's `getTransactionByHash`/`getTransactionReceipt`). The only
/// production implementation of `krypton_chain::ChainAdapter`; everything
/// else about "what happens after a block lands" lives downstream of the
/// p2p-facing `krypton_p2p::ChainAdapter` (`NetworkAdapter`) instead.
struct TxIndexAdapter {
	tx_index: Arc<TxIndex>,
}

impl ChainImportAdapter for TxIndexAdapter {
	fn block_accepted(&self, block: &Block, _tip: &Tip) {
		self.tx_index.record_block(block);
	}
}

/// A running (or not-yet-started) Krypton node: one chain, one peer
/// registry, one sync coordinator, one pool, and an optional JSON-RPC
/// listener, all sharing the configuration they were built from.
pub struct Node {
	config: ServerConfig,
	chain: Arc<Chain>,
	pool: Arc<dyn TransactionPool>,
	peers: Arc<Peers>,
	p2p_server: Arc<P2pServer>,
	coordinator: Arc<Coordinator>,
	tx_index: Arc<TxIndex>,
	network_id: u64,
	seed_cancel: CancelToken,
	rpc_server: Mutex<Option<jsonrpc_http_server::Server>>,
	lock_file: Arc<File>,
}

impl Node {
	/// Exclusive (advisory) lock on `db_root` so two node processes never
	/// share one chain/peer store (§Scenario F). Mirrors the teacher's
	/// `one_grin_at_a_time`: an `fs2` exclusive lock on a sentinel file,
	/// held for the process lifetime and released in [`Node::stop`].
	fn one_krypton_at_a_time(config: &ServerConfig) -> Result<Arc<File>, Error> {
		let dir = Path::new(&config.db_root);
		fs::create_dir_all(dir)?;
		let path = dir.join("krypton.lock");
		let lock_file = fs::OpenOptions::new().read(true).write(true).create(true).open(&path)?;
		lock_file
			.try_lock_exclusive()
			.map_err(|_| Error::AlreadyRunning(path.display().to_string()))?;
		Ok(Arc::new(lock_file))
	}

	/// Builds a node over `config`, ready to [`Node::start`]. Writes the
	/// network's genesis block to the store if it isn't already there
	/// (first run). `executor` and `pow_verifier` are the named,
	/// out-of-scope collaborators (SPEC_FULL §2) the caller must supply;
	/// a binary with nothing real to plug in can use
	/// [`krypton_chain::NoopExecutor`] and [`krypton_pow::DevPowVerifier`].
	pub fn init(
		config: ServerConfig,
		executor: Arc<dyn krypton_chain::ExecutorHandle>,
		pow_verifier: Arc<dyn PowVerifier>,
	) -> Result<Arc<Node>, Error> {
		global::set_chain_type(config.chain_type);
		std::fs::create_dir_all(&config.db_root)?;
		let lock_file = Node::one_krypton_at_a_time(&config)?;

		let chain_db_path = Path::new(&config.db_root).join("chain");
		std::fs::create_dir_all(&chain_db_path)?;
		let store = LmdbChainStore::new(chain_db_path.to_str().expect("utf8 db path"));

		let genesis = genesis_block(config.chain_type);
		let genesis_hash = genesis.hash();
		if store.head().is_err() {
			store.save_block(&genesis, genesis.header.difficulty).map_err(krypton_chain::Error::from)?;
			store.set_canonical_chain(&genesis.header, 0).map_err(krypton_chain::Error::from)?;
			store
				.save_head(&Tip::new(genesis_hash, genesis.header.difficulty))
				.map_err(krypton_chain::Error::from)?;
		}
		krypton_chain::upgrade::run(&store)?;

		let tx_index = TxIndex::new();
		let chain_adapter = Arc::new(TxIndexAdapter { tx_index: tx_index.clone() });
		let chain = Arc::new(Chain::new(Arc::new(store), executor, pow_verifier.clone(), chain_adapter));

		let pool: Arc<dyn TransactionPool> = Arc::new(MemoryPool::new());

		let peer_db_path = Path::new(&config.db_root).join("peers");
		std::fs::create_dir_all(&peer_db_path)?;
		let peer_store = PeerStore::new(peer_db_path.to_str().expect("utf8 db path"));
		let peers = Arc::new(Peers::new(Arc::new(peer_store)));

		let events = EventBus::new();
		let fetcher_config = FetcherConfig::from(&config.sync_config);
		let fetcher = Fetcher::new(chain.clone(), peers.clone(), events, fetcher_config);
		let router = Arc::new(ResponseRouter::new());
		let network_adapter = NetworkAdapter::new(chain.clone(), pool.clone(), fetcher.clone(), router, peers.clone());

		let network_id = config.chain_type.network_id();
		let handshaker = Handshaker { network_id, genesis_hash };
		let p2p_server = Arc::new(P2pServer::new(peers.clone(), network_adapter.clone(), handshaker));

		let sync_state = Arc::new(SyncState::new());
		let downloader_config = DownloaderConfig::from(&config.sync_config);
		let coordinator = Coordinator::new(
			chain.clone(),
			peers.clone(),
			pow_verifier,
			network_adapter,
			fetcher,
			sync_state,
			downloader_config,
		);

		Ok(Arc::new(Node {
			config,
			chain,
			pool,
			peers,
			p2p_server,
			coordinator,
			tx_index,
			network_id,
			seed_cancel: CancelToken::new(),
			rpc_server: Mutex::new(None),
			lock_file,
		}))
	}

	/// Starts listening for peer connections, begins chain sync, dials
	/// configured seeds, and (if enabled) starts the JSON-RPC HTTP
	/// listener. Returns the port actually bound for peer connections.
	pub fn start(self: &Arc<Self>) -> Result<u16, Error> {
		let bound_port = self.p2p_server.listen(&self.config.p2p_config.host, self.config.p2p_config.port)?;

		self.coordinator.start();

		seed::connect_and_monitor(
			self.p2p_server.clone(),
			self.peers.clone(),
			self.config.p2p_config.clone(),
			self.seed_cancel.clone(),
		);

		if self.config.rpc_config.enabled {
			let ctx = RpcContext {
				chain: self.chain.clone(),
				pool: self.pool.clone(),
				peers: self.peers.clone(),
				coordinator: self.coordinator.clone(),
				tx_index: self.tx_index.clone(),
				network_id: self.network_id,
			};
			let handler = build_handler(ctx);
			let addr = format!("{}:{}", self.config.rpc_config.host, self.config.rpc_config.port)
				.parse()
				.map_err(|e| Error::Rpc(format!("invalid rpc address: {}", e)))?;
			let server = jsonrpc_http_server::ServerBuilder::new(handler)
				.start_http(&addr)
				.map_err(|e| Error::Rpc(e.to_string()))?;
			*self.rpc_server.lock() = Some(server);
			log::info!("rpc: listening on {}", addr);
		}

		Ok(bound_port)
	}

	/// Stops chain sync, seed dialing and the RPC listener (if running),
	/// and tears down the peer listener. Idempotent.
	pub fn stop(&self) {
		self.coordinator.stop();
		self.seed_cancel.cancel();
		self.p2p_server.cancel_token().cancel();
		if let Some(server) = self.rpc_server.lock().take() {
			server.close();
		}
		let _ = self.lock_file.unlock();
	}

	/// The chain this node serves.
	pub fn chain(&self) -> Arc<Chain> {
		self.chain.clone()
	}

	/// The connected-peer registry.
	pub fn peers(&self) -> Arc<Peers> {
		self.peers.clone()
	}

	/// A point-in-time snapshot of node state, for logging or a future
	/// status endpoint.
	pub fn stats(&self) -> Result<NodeStats, Error> {
		let head = self.chain.head()?;
		let peer_snapshot = self.peers.snapshot();
		let peers = peer_snapshot
			.iter()
			.map(|p| {
				let (td, _) = p.head();
				PeerStats {
					addr: p.addr().to_string(),
					total_difficulty: format!("{:?}", td),
					banned: p.is_banned(),
				}
			})
			.collect();
		Ok(NodeStats {
			peer_count: self.peers.len(),
			head,
			sync_status: self.coordinator.sync_state().status(),
			orphans: self.chain.orphans_len(),
			peers,
		})
	}
}
