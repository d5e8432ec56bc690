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

//! The listener: accepts inbound connections and dials outbound ones,
//! running the handshake (§4.3) on each before handing the resulting
//! [`Peer`] to the registry and spawning its read loop. Generalized from
//! the teacher's `p2p::server::Server`, threaded rather than
//! futures-0.1-based per SPEC_FULL §5.

use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

use log::{debug, info, warn};

use krypton_core::core::hash::Hash;
use krypton_util::CancelToken;

use crate::conn::Connection;
use crate::peer::Peer;
use crate::peers::Peers;
use crate::msg::{Status, PROTOCOL_VERSION};
use crate::types::{Capabilities, ChainAdapter, Error, PeerAddr, PeerInfo};

/// Everything the listener needs to build an outgoing `Status` and to
/// decide whether an incoming one is acceptable (§4.3 handshake).
pub struct Handshaker {
	/// This node's network id (`krypton_core::global::ChainType::network_id`).
	pub network_id: u64,
	/// This node's genesis hash.
	pub genesis_hash: Hash,
}

impl Handshaker {
	fn our_status(&self, adapter: &dyn ChainAdapter) -> Status {
		Status {
			version: PROTOCOL_VERSION,
			network_id: self.network_id,
			total_difficulty: adapter.total_difficulty(),
			head_hash: adapter.genesis_hash(), // refreshed post-handshake via announcements
			genesis_hash: self.genesis_hash,
			capabilities: Capabilities::FULL_NODE,
		}
	}
}

/// Accepts inbound peer connections and dials configured seeds/outbound
/// addresses, running the handshake on each and handing the result to the
/// peer registry (C1). One accept thread, one connect-on-demand call per
/// dial; every resulting peer gets its own read-loop thread (§5).
pub struct Server {
	peers: Arc<Peers>,
	adapter: Arc<dyn ChainAdapter>,
	handshaker: Handshaker,
	cancel: CancelToken,
}

impl Server {
	/// Builds a server over an already-constructed registry and adapter.
	pub fn new(peers: Arc<Peers>, adapter: Arc<dyn ChainAdapter>, handshaker: Handshaker) -> Server {
		Server {
			peers,
			adapter,
			handshaker,
			cancel: CancelToken::new(),
		}
	}

	/// This server's cancellation token; firing it stops the accept loop
	/// and every spawned peer's read loop (§5 hierarchical cancellation).
	pub fn cancel_token(&self) -> CancelToken {
		self.cancel.clone()
	}

	/// Binds `host:port` (`port == 0` picks an ephemeral port) and accepts
	/// connections until cancelled, returning the port actually bound.
	/// Spawns a fresh thread per accepted connection; never blocks the
	/// caller.
	pub fn listen(self: &Arc<Self>, host: &str, port: u16) -> std::io::Result<u16> {
		let listener = TcpListener::bind((host, port))?;
		let bound_port = listener.local_addr()?.port();
		// A non-blocking-ish poll loop: short accept timeout so the loop
		// can also observe cancellation (§5 "every suspension point...
		// selects on the global cancel signal").
		listener.set_nonblocking(true)?;
		let server = self.clone();
		let host = host.to_owned();
		thread::Builder::new()
			.name("krypton-p2p-listener".to_owned())
			.spawn(move || {
				info!("p2p: listening on {}:{}", host, bound_port);
				loop {
					if server.cancel.is_cancelled() {
						return;
					}
					match listener.accept() {
						Ok((stream, addr)) => {
							debug!("p2p: inbound connection from {}", addr);
							let server = server.clone();
							thread::Builder::new()
								.name(format!("krypton-p2p-in-{}", addr))
								.spawn(move || server.accept_inbound(stream))
								.expect("spawning inbound peer thread");
						}
						Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
							thread::sleep(std::time::Duration::from_millis(200));
						}
						Err(e) => {
							warn!("p2p: accept error: {}", e);
						}
					}
				}
			})
			.expect("spawning p2p listener thread");
		Ok(bound_port)
	}

	fn accept_inbound(self: &Arc<Self>, stream: TcpStream) {
		if let Err(e) = self.handle_stream(stream, None) {
			warn!("p2p: inbound handshake failed: {}", e);
		}
	}

	/// Dials `addr`, runs the handshake as the outbound side, and registers
	/// the resulting peer. Returns once the handshake completes; the peer
	/// keeps running on its own thread afterward.
	pub fn connect(self: &Arc<Self>, addr: PeerAddr) -> Result<(), Error> {
		if self.peers.is_banned(&addr) {
			return Err(Error::Banned);
		}
		let stream = TcpStream::connect(addr.0).map_err(Error::Connection)?;
		self.handle_stream(stream, Some(addr))
	}

	/// Runs the handshake and registers the resulting peer, then hands its
	/// read loop to a dedicated thread so the handshake's caller (inbound
	/// accept thread or `connect`) returns promptly (§5 "each peer has an
	/// inbound reader task").
	fn handle_stream(self: &Arc<Self>, stream: TcpStream, dial_addr: Option<PeerAddr>) -> Result<(), Error> {
		let peer_addr = dial_addr.unwrap_or(PeerAddr(stream.peer_addr().map_err(Error::Connection)?));
		let conn = Connection::new(stream).map_err(Error::Connection)?;
		let ours = self.handshaker.our_status(self.adapter.as_ref());
		let theirs = if dial_addr.is_some() {
			Peer::handshake_outbound(&conn, &ours)?
		} else {
			Peer::handshake_inbound(&conn, &ours)?
		};

		let info = PeerInfo {
			capabilities: theirs.capabilities,
			user_agent: String::new(),
			version: theirs.version,
			addr: peer_addr,
			total_difficulty: theirs.total_difficulty,
			head_hash: theirs.head_hash,
			genesis_hash: theirs.genesis_hash,
		};
		let peer = Peer::new(conn, info.clone());
		self.peers.register(peer.clone())?;
		self.adapter.peer_connected(&info);
		info!("p2p: peer {} connected (td={})", peer_addr, theirs.total_difficulty);

		let server = self.clone();
		thread::Builder::new()
			.name(format!("krypton-p2p-peer-{}", peer_addr))
			.spawn(move || {
				let adapter = server.adapter.clone();
				peer.run(adapter);
				server.peers.unregister(&peer_addr);
			})
			.expect("spawning peer read-loop thread");
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::store::PeerStore;
	use krypton_core::core::block::{Block, BlockHeader};
	use krypton_core::core::difficulty::Difficulty;
	use krypton_core::core::hash::ZERO_HASH;
	use krypton_core::core::transaction::Transaction;

	struct StubAdapter;
	impl ChainAdapter for StubAdapter {
		fn total_difficulty(&self) -> Difficulty {
			Difficulty::from_num(1)
		}
		fn total_height(&self) -> u64 {
			0
		}
		fn genesis_hash(&self) -> Hash {
			ZERO_HASH
		}
		fn transaction_received(&self, _tx: Transaction, _addr: PeerAddr) {}
		fn block_received(&self, _block: Block, _addr: PeerAddr) -> bool {
			true
		}
		fn headers_received(&self, _headers: Vec<BlockHeader>, _addr: PeerAddr) {}
		fn block_hashes_received(&self, _hashes: Vec<(Hash, u64)>, _addr: PeerAddr) {}
		fn bodies_received(&self, _bodies: Vec<krypton_core::core::block::BlockBody>, _addr: PeerAddr) {}
		fn node_data_received(&self, _data: Vec<Vec<u8>>, _addr: PeerAddr) {}
		fn receipts_received(&self, _receipts: Vec<Vec<u8>>, _addr: PeerAddr) {}
		fn get_block_headers(&self, _req: &crate::msg::GetBlockHeaders) -> Vec<BlockHeader> {
			Vec::new()
		}
		fn get_block(&self, _h: Hash) -> Option<Block> {
			None
		}
		fn find_peer_addrs(&self, _capab: Capabilities) -> Vec<PeerAddr> {
			Vec::new()
		}
		fn peer_addrs_received(&self, _addrs: Vec<PeerAddr>) {}
		fn peer_connected(&self, _info: &PeerInfo) {}
		fn peer_difficulty(&self, _addr: PeerAddr, _diff: Difficulty, _height: u64) {}
	}

	#[test]
	fn two_servers_handshake_over_loopback() {
		let dir_a = tempfile::tempdir().unwrap();
		let dir_b = tempfile::tempdir().unwrap();
		let peers_a = Arc::new(Peers::new(Arc::new(PeerStore::new(dir_a.path().to_str().unwrap()))));
		let peers_b = Arc::new(Peers::new(Arc::new(PeerStore::new(dir_b.path().to_str().unwrap()))));

		let server_a = Arc::new(Server::new(
			peers_a.clone(),
			Arc::new(StubAdapter),
			Handshaker { network_id: 1337, genesis_hash: ZERO_HASH },
		));
		let server_b = Arc::new(Server::new(
			peers_b.clone(),
			Arc::new(StubAdapter),
			Handshaker { network_id: 1337, genesis_hash: ZERO_HASH },
		));

		let port = server_b.listen("127.0.0.1", 0).unwrap();
		std::thread::sleep(std::time::Duration::from_millis(100));

		let result = server_a.connect(PeerAddr(format!("127.0.0.1:{}", port).parse().unwrap()));
		assert!(result.is_ok());
		std::thread::sleep(std::time::Duration::from_millis(100));
		assert_eq!(peers_a.len(), 1);
	}
}
