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

//! Base peer-to-peer types: errors, capabilities, peer info, and the
//! bridge trait (`ChainAdapter`) connecting the networking layer to the
//! rest of the node without this crate depending on `krypton_chain` or
//! `krypton_pool` directly.

use std::fmt;
use std::io;
use std::net::SocketAddr;

use rlp::{DecoderError, Rlp, RlpStream};
use serde::{Deserialize, Serialize};

use krypton_core::core::block::{Block, BlockHeader};
use krypton_core::core::difficulty::Difficulty;
use krypton_core::core::hash::Hash;
use krypton_core::core::transaction::Transaction;

use crate::msg::GetBlockHeaders;

/// Maximum number of headers a peer should ever send in one message
/// (§consensus, shared with the downloader's skeleton chunk size).
pub const MAX_BLOCK_HEADERS: u32 = krypton_core::consensus::MAX_HEADERS_PER_REQUEST as u32;
/// Maximum number of bodies a peer should ever send in one message.
pub const MAX_BLOCK_BODIES: u32 = krypton_core::consensus::MAX_BODIES_PER_REQUEST as u32;
/// Maximum number of peer addresses a peer should ever send.
pub const MAX_PEER_ADDRS: u32 = 256;

/// Errors surfaced by the networking layer.
#[derive(Debug)]
pub enum Error {
	/// A message's RLP body failed to decode.
	Serialization(DecoderError),
	/// The underlying TCP connection failed.
	Connection(io::Error),
	/// An inbound message exceeded the wire size limit (§7 `PeerFault`) --
	/// distinguished from a generic `Connection` error so the read loop can
	/// ban the sender on the spot rather than treat it as connection noise.
	OversizeMessage,
	/// The remote is banned.
	Banned,
	/// The connection was closed, locally or remotely.
	ConnectionClose,
	/// A request timed out waiting for its response.
	Timeout,
	/// The peer store failed.
	Store(krypton_store::Error),
	/// We tried to connect to ourselves (nonce collision during handshake).
	PeerWithSelf,
	/// The remote's protocol version isn't one we speak.
	ProtocolMismatch {
		/// Our protocol version.
		us: u32,
		/// The peer's protocol version.
		peer: u32,
	},
	/// The remote's genesis hash doesn't match ours — different network.
	GenesisMismatch {
		/// Our genesis hash.
		us: Hash,
		/// The peer's genesis hash.
		peer: Hash,
	},
	/// A peer at this address is already registered (§4.1 "fails if id
	/// already present").
	AlreadyRegistered,
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Error::Serialization(e) => write!(f, "serialization error: {}", e),
			Error::Connection(e) => write!(f, "connection error: {}", e),
			Error::OversizeMessage => write!(f, "oversize message"),
			Error::Banned => write!(f, "peer is banned"),
			Error::ConnectionClose => write!(f, "connection closed"),
			Error::Timeout => write!(f, "request timed out"),
			Error::Store(e) => write!(f, "peer store error: {}", e),
			Error::PeerWithSelf => write!(f, "refused connection to self"),
			Error::ProtocolMismatch { us, peer } => {
				write!(f, "protocol mismatch: us={} peer={}", us, peer)
			}
			Error::GenesisMismatch { us, peer } => {
				write!(f, "genesis mismatch: us={} peer={}", us, peer)
			}
			Error::AlreadyRegistered => write!(f, "peer already registered"),
		}
	}
}

impl std::error::Error for Error {}

impl From<DecoderError> for Error {
	fn from(e: DecoderError) -> Error {
		Error::Serialization(e)
	}
}
impl From<krypton_store::Error> for Error {
	fn from(e: krypton_store::Error) -> Error {
		Error::Store(e)
	}
}
impl From<io::Error> for Error {
	fn from(e: io::Error) -> Error {
		Error::Connection(e)
	}
}

bitflags::bitflags! {
	/// What a peer claims it can serve. Unknown until a successful
	/// handshake.
	#[derive(Serialize, Deserialize)]
	pub struct Capabilities: u32 {
		/// We don't know yet what the peer can do.
		const UNKNOWN = 0b0000_0000;
		/// Serves full block history (no pruning).
		const BLOCK_HIST = 0b0000_0001;
		/// Serves historical state via `GetNodeData`.
		const STATE_HIST = 0b0000_0010;
		/// Answers peer-list requests.
		const PEER_LIST = 0b0000_0100;
		/// Everything a full node provides.
		const FULL_NODE = Self::BLOCK_HIST.bits | Self::STATE_HIST.bits | Self::PEER_LIST.bits;
	}
}

/// A `SocketAddr` newtype so we can give it an RLP encoding (the orphan
/// rule blocks implementing `rlp::Encodable` directly on `SocketAddr`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PeerAddr(pub SocketAddr);

impl fmt::Display for PeerAddr {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl rlp::Encodable for PeerAddr {
	fn rlp_append(&self, s: &mut RlpStream) {
		match self.0 {
			SocketAddr::V4(v4) => {
				s.begin_list(3);
				s.append(&0u8);
				s.append(&v4.ip().octets().to_vec());
				s.append(&v4.port());
			}
			SocketAddr::V6(v6) => {
				s.begin_list(3);
				s.append(&1u8);
				let mut bytes = Vec::with_capacity(16);
				for seg in v6.ip().segments().iter() {
					bytes.extend_from_slice(&seg.to_be_bytes());
				}
				s.append(&bytes);
				s.append(&v6.port());
			}
		}
	}
}

impl rlp::Decodable for PeerAddr {
	fn decode(rlp: &Rlp<'_>) -> Result<Self, DecoderError> {
		use std::net::{Ipv4Addr, Ipv6Addr, SocketAddrV4, SocketAddrV6};
		let kind: u8 = rlp.val_at(0)?;
		let ip_bytes: Vec<u8> = rlp.val_at(1)?;
		let port: u16 = rlp.val_at(2)?;
		if kind == 0 {
			if ip_bytes.len() != 4 {
				return Err(DecoderError::RlpIncorrectListLen);
			}
			let ip = Ipv4Addr::new(ip_bytes[0], ip_bytes[1], ip_bytes[2], ip_bytes[3]);
			Ok(PeerAddr(SocketAddr::V4(SocketAddrV4::new(ip, port))))
		} else {
			if ip_bytes.len() != 16 {
				return Err(DecoderError::RlpIncorrectListLen);
			}
			let mut segs = [0u16; 8];
			for i in 0..8 {
				segs[i] = u16::from_be_bytes([ip_bytes[i * 2], ip_bytes[i * 2 + 1]]);
			}
			let ip = Ipv6Addr::new(segs[0], segs[1], segs[2], segs[3], segs[4], segs[5], segs[6], segs[7]);
			Ok(PeerAddr(SocketAddr::V6(SocketAddrV6::new(ip, port, 0, 0))))
		}
	}
}

/// General information about a connected peer, established during the
/// handshake (§4.3) and kept live by ping/pong total-difficulty updates.
#[derive(Clone, Debug)]
pub struct PeerInfo {
	/// What the peer claims to serve.
	pub capabilities: Capabilities,
	/// Free-form client identifier string.
	pub user_agent: String,
	/// Protocol version the peer is speaking.
	pub version: u32,
	/// The peer's network address.
	pub addr: PeerAddr,
	/// Total difficulty the peer last reported.
	pub total_difficulty: Difficulty,
	/// Hash of the peer's reported chain head.
	pub head_hash: Hash,
	/// Genesis hash the peer is operating against.
	pub genesis_hash: Hash,
}

/// Bridge from the networking layer to the rest of the node. Keeps this
/// crate free of a direct dependency on `krypton_chain`/`krypton_pool` —
/// the sync crate implements this.
pub trait ChainAdapter: Send + Sync {
	/// Our chain's current total difficulty, advertised in our own
	/// handshake and pings.
	fn total_difficulty(&self) -> Difficulty;
	/// Our chain's current height.
	fn total_height(&self) -> u64;
	/// Our genesis hash, compared against a peer's during handshake.
	fn genesis_hash(&self) -> Hash;

	/// A transaction was received from a peer.
	fn transaction_received(&self, tx: Transaction, addr: PeerAddr);
	/// A full block was received from a peer. Returns `false` if the block
	/// was intrinsically invalid, which the caller treats as grounds to
	/// ban the sender (§7 `PeerFault`).
	fn block_received(&self, block: Block, addr: PeerAddr) -> bool;
	/// A batch of headers was received, typically in response to a
	/// `GetBlockHeaders` request.
	fn headers_received(&self, headers: Vec<BlockHeader>, addr: PeerAddr);
	/// A peer announced new block hashes without the bodies.
	fn block_hashes_received(&self, hashes: Vec<(Hash, u64)>, addr: PeerAddr);
	/// A batch of bodies was received, in response to a `GetBlockBodies`
	/// request (§4.4 downloader "body phase").
	fn bodies_received(&self, bodies: Vec<krypton_core::core::block::BlockBody>, addr: PeerAddr);
	/// A batch of state trie nodes was received, in response to a
	/// `GetNodeData` request (§4.4 downloader "state phase").
	fn node_data_received(&self, data: Vec<Vec<u8>>, addr: PeerAddr);
	/// A batch of receipts was received, in response to a `GetReceipts`
	/// request (§4.4 downloader "receipt phase").
	fn receipts_received(&self, receipts: Vec<Vec<u8>>, addr: PeerAddr);

	/// Answers a `GetBlockHeaders` request: starting at `req.start_hash`
	/// (if known to us) or else `req.start_number`, walks `req.max_headers`
	/// entries spaced `req.skip` apart, toward higher numbers unless
	/// `req.reverse`. Used by both the ancestor binary search (§4.4,
	/// height-addressed probes) and the header-skeleton chunk fetch.
	fn get_block_headers(&self, req: &GetBlockHeaders) -> Vec<BlockHeader>;
	/// Looks up a full block by hash, to answer `GetBlocks`/`GetBlockBodies`.
	fn get_block(&self, h: Hash) -> Option<Block>;

	/// Good peer addresses we know of with the given capability.
	fn find_peer_addrs(&self, capab: Capabilities) -> Vec<PeerAddr>;
	/// A peer sent us a list of addresses it knows about.
	fn peer_addrs_received(&self, addrs: Vec<PeerAddr>);
	/// A new peer finished its handshake successfully.
	fn peer_connected(&self, info: &PeerInfo);
	/// Heard an updated total difficulty from a connected peer.
	fn peer_difficulty(&self, addr: PeerAddr, diff: Difficulty, height: u64);
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn peer_addr_v4_round_trips() {
		let addr = PeerAddr("127.0.0.1:30303".parse().unwrap());
		let encoded = rlp::encode(&addr);
		let decoded: PeerAddr = rlp::decode(&encoded).unwrap();
		assert_eq!(addr, decoded);
	}

	#[test]
	fn peer_addr_v6_round_trips() {
		let addr = PeerAddr("[::1]:30303".parse().unwrap());
		let encoded = rlp::encode(&addr);
		let decoded: PeerAddr = rlp::decode(&encoded).unwrap();
		assert_eq!(addr, decoded);
	}

	#[test]
	fn full_node_capability_implies_constituents() {
		let full = Capabilities::FULL_NODE;
		assert!(full.contains(Capabilities::BLOCK_HIST));
		assert!(full.contains(Capabilities::STATE_HIST));
		assert!(full.contains(Capabilities::PEER_LIST));
	}
}
