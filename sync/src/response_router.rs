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

//! Correlates inbound responses (delivered by [`crate::adapter::NetworkAdapter`]
//! from `krypton_p2p`'s read loop) back to the downloader call that is
//! blocked waiting for them. One outstanding waiter per (peer, request
//! kind) at a time, matching `krypton_p2p::Peer`'s own single-in-flight
//! invariant (§4.3) -- registering a second waiter for the same key simply
//! replaces the first, whose receiver then sees a disconnect.

use std::collections::HashMap;

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;

use krypton_core::core::block::{BlockBody, BlockHeader};
use krypton_p2p::PeerAddr;

struct Routes<T> {
	waiters: Mutex<HashMap<PeerAddr, Sender<T>>>,
}

impl<T> Routes<T> {
	fn new() -> Routes<T> {
		Routes {
			waiters: Mutex::new(HashMap::new()),
		}
	}

	fn register(&self, addr: PeerAddr) -> Receiver<T> {
		let (tx, rx) = bounded(1);
		self.waiters.lock().insert(addr, tx);
		rx
	}

	fn deliver(&self, addr: PeerAddr, value: T) {
		if let Some(tx) = self.waiters.lock().remove(&addr) {
			let _ = tx.send(value);
		}
	}
}

/// Holds the one pending waiter per peer for each of the four response
/// kinds the wire protocol carries.
pub struct ResponseRouter {
	headers: Routes<Vec<BlockHeader>>,
	bodies: Routes<Vec<BlockBody>>,
	node_data: Routes<Vec<Vec<u8>>>,
	receipts: Routes<Vec<Vec<u8>>>,
}

impl ResponseRouter {
	/// An empty router.
	pub fn new() -> ResponseRouter {
		ResponseRouter {
			headers: Routes::new(),
			bodies: Routes::new(),
			node_data: Routes::new(),
			receipts: Routes::new(),
		}
	}

	/// Registers interest in the next `BlockHeaders` response from `addr`.
	/// Must be called before issuing the matching `GetBlockHeaders`, so the
	/// response has somewhere to land even if it arrives immediately.
	pub fn await_headers(&self, addr: PeerAddr) -> Receiver<Vec<BlockHeader>> {
		self.headers.register(addr)
	}

	/// Registers interest in the next `BlockBodies` response from `addr`.
	pub fn await_bodies(&self, addr: PeerAddr) -> Receiver<Vec<BlockBody>> {
		self.bodies.register(addr)
	}

	/// Registers interest in the next `NodeData` response from `addr`.
	pub fn await_node_data(&self, addr: PeerAddr) -> Receiver<Vec<Vec<u8>>> {
		self.node_data.register(addr)
	}

	/// Registers interest in the next `Receipts` response from `addr`.
	pub fn await_receipts(&self, addr: PeerAddr) -> Receiver<Vec<Vec<u8>>> {
		self.receipts.register(addr)
	}

	/// Hands a received header batch to whoever is waiting on it, if
	/// anyone; otherwise it's silently dropped (the peer's single-in-flight
	/// invariant means this only happens for a round that already gave up).
	pub fn deliver_headers(&self, addr: PeerAddr, headers: Vec<BlockHeader>) {
		self.headers.deliver(addr, headers);
	}

	/// Hands a received body batch to whoever is waiting on it.
	pub fn deliver_bodies(&self, addr: PeerAddr, bodies: Vec<BlockBody>) {
		self.bodies.deliver(addr, bodies);
	}

	/// Hands received state nodes to whoever is waiting on them.
	pub fn deliver_node_data(&self, addr: PeerAddr, data: Vec<Vec<u8>>) {
		self.node_data.deliver(addr, data);
	}

	/// Hands received receipts to whoever is waiting on them.
	pub fn deliver_receipts(&self, addr: PeerAddr, receipts: Vec<Vec<u8>>) {
		self.receipts.deliver(addr, receipts);
	}
}

impl Default for ResponseRouter {
	fn default() -> Self {
		Self::new()
	}
}
