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

//! [`NetworkAdapter`] implements `krypton_p2p::ChainAdapter`: the one
//! place inbound wire messages cross from the networking layer into
//! chain/pool/fetcher/downloader. Kept deliberately thin -- every method
//! either delegates to the fetcher, forwards to the response router, or
//! reads the chain store, so `krypton_p2p` stays decoupled from all of
//! them (§3's seam).

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use krypton_chain::Chain;
use krypton_core::core::block::{Block, BlockHeader};
use krypton_core::core::difficulty::Difficulty;
use krypton_core::core::hash::{Hash, Hashed, ZERO_HASH};
use krypton_core::core::transaction::Transaction;
use krypton_p2p::types::{Capabilities, ChainAdapter as P2pChainAdapter};
use krypton_p2p::{PeerAddr, PeerInfo, Peers};
use krypton_pool::{TransactionPool, TxSource};

use crate::fetcher::Fetcher;
use crate::response_router::ResponseRouter;

/// Bridges `krypton_p2p`'s protocol handler to the chain, pool, fetcher
/// and downloader.
pub struct NetworkAdapter {
	chain: Arc<Chain>,
	pool: Arc<dyn TransactionPool>,
	fetcher: Arc<Fetcher>,
	router: Arc<ResponseRouter>,
	peers: Arc<Peers>,
	peer_heights: Mutex<HashMap<PeerAddr, u64>>,
}

impl NetworkAdapter {
	/// Builds an adapter over its collaborators.
	pub fn new(
		chain: Arc<Chain>,
		pool: Arc<dyn TransactionPool>,
		fetcher: Arc<Fetcher>,
		router: Arc<ResponseRouter>,
		peers: Arc<Peers>,
	) -> Arc<NetworkAdapter> {
		Arc::new(NetworkAdapter {
			chain,
			pool,
			fetcher,
			router,
			peers,
			peer_heights: Mutex::new(HashMap::new()),
		})
	}

	/// The last height a peer announced via a difficulty update, if any.
	/// Refines the downloader's `highest_height` progress estimate (§4.4).
	pub fn peer_height(&self, addr: &PeerAddr) -> Option<u64> {
		self.peer_heights.lock().get(addr).copied()
	}

	/// The response router shared with the downloader, so it can register
	/// waiters before issuing requests through the same peers this
	/// adapter receives responses from.
	pub fn router(&self) -> Arc<ResponseRouter> {
		self.router.clone()
	}
}

impl P2pChainAdapter for NetworkAdapter {
	fn total_difficulty(&self) -> Difficulty {
		self.chain.head().map(|t| t.total_difficulty).unwrap_or_else(|_| Difficulty::min())
	}

	fn total_height(&self) -> u64 {
		self.chain.head().map(|t| t.height).unwrap_or(0)
	}

	fn genesis_hash(&self) -> Hash {
		self.chain.get_header_by_height(0).map(|h| h.hash()).unwrap_or(ZERO_HASH)
	}

	fn transaction_received(&self, tx: Transaction, _addr: PeerAddr) {
		if let Err(e) = self.pool.insert(tx, TxSource::Peer) {
			debug!("adapter: rejected peer transaction: {}", e);
		}
	}

	fn block_received(&self, block: Block, addr: PeerAddr) -> bool {
		self.fetcher.on_broadcast(block, addr)
	}

	fn headers_received(&self, headers: Vec<BlockHeader>, addr: PeerAddr) {
		let remainder = self.fetcher.filter_headers(headers, addr);
		self.router.deliver_headers(addr, remainder);
	}

	fn block_hashes_received(&self, hashes: Vec<(Hash, u64)>, addr: PeerAddr) {
		for (hash, number) in hashes {
			self.fetcher.on_announce(hash, number, addr);
		}
	}

	fn bodies_received(&self, bodies: Vec<krypton_core::core::block::BlockBody>, addr: PeerAddr) {
		let remainder = self.fetcher.filter_bodies(bodies, addr);
		self.router.deliver_bodies(addr, remainder);
	}

	fn node_data_received(&self, data: Vec<Vec<u8>>, addr: PeerAddr) {
		self.router.deliver_node_data(addr, data);
	}

	fn receipts_received(&self, receipts: Vec<Vec<u8>>, addr: PeerAddr) {
		self.router.deliver_receipts(addr, receipts);
	}

	fn get_block_headers(&self, req: &krypton_p2p::msg::GetBlockHeaders) -> Vec<BlockHeader> {
		let start = match req.start_hash {
			Some(hash) => match self.chain.get_header(&hash) {
				Ok(header) => header.number,
				Err(_) => return Vec::new(),
			},
			None => req.start_number,
		};
		let max = (req.max_headers as u64).min(krypton_core::consensus::MAX_HEADERS_PER_REQUEST as u64);
		let step = req.skip as u64 + 1;

		let mut headers = Vec::new();
		let mut height = start;
		for _ in 0..max {
			match self.chain.get_header_by_height(height) {
				Ok(header) => headers.push(header),
				Err(_) => break,
			}
			if req.reverse {
				if height < step {
					break;
				}
				height -= step;
			} else {
				height += step;
			}
		}
		headers
	}

	fn get_block(&self, h: Hash) -> Option<Block> {
		self.chain.get_block(&h).ok()
	}

	fn find_peer_addrs(&self, _capab: Capabilities) -> Vec<PeerAddr> {
		self.peers.snapshot().iter().map(|p| p.addr()).collect()
	}

	fn peer_addrs_received(&self, _addrs: Vec<PeerAddr>) {
		// Dialing discovered peers is the listener's responsibility; this
		// adapter only needs to not drop the information silently when a
		// future discovery loop wants it.
	}

	fn peer_connected(&self, info: &PeerInfo) {
		self.peer_heights.lock().remove(&info.addr);
	}

	fn peer_difficulty(&self, addr: PeerAddr, _diff: Difficulty, height: u64) {
		self.peer_heights.lock().insert(addr, height);
	}
}
