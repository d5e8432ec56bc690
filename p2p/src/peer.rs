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

//! The protocol handler (C3, §4.3): one [`Peer`] per connection, running
//! the handshake, reading inbound messages, dispatching by code, and
//! enforcing the protocol invariants (one in-flight request per kind, soft
//! ban on faults). Generalized from the teacher's `p2p::peer::Peer`
//! (itself a thin wrapper over `p2p::protocol::ProtocolV2`), collapsed into
//! a single type since this workspace has one protocol version family, not
//! the teacher's pluggable `Protocol` trait for multiple wire versions.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, warn};
use parking_lot::Mutex;

use krypton_core::core::hash::Hashed;
use krypton_util::RateCounter;

use crate::conn::Connection;
use crate::meter::MessageMeter;
use crate::msg::{Code, GetBlockHeaders, HashAndNumber, HashRequest, Message, Status, PROTOCOL_VERSION};
use crate::types::{Capabilities, ChainAdapter, Error, PeerAddr, PeerInfo};

/// A kind of request the downloader/fetcher can have outstanding against a
/// peer (§4.3 invariant 2: at most one in-flight request of each kind per
/// peer).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum RequestKind {
	/// `GetBlockHeaders`.
	Headers,
	/// `GetBlockBodies`.
	Bodies,
	/// `GetNodeData`.
	State,
	/// `GetReceipts`.
	Receipts,
}

/// How many consecutive faults (malformed message, unrequested response,
/// oversize payload, timeout) a peer may accrue before the soft-ban
/// threshold fires (§4.3 "Soft ban policy").
pub const SOFT_BAN_THRESHOLD: u32 = 3;
/// How long, once soft-banned, a peer is excluded from reselection (§4.3).
pub const SOFT_BAN_COOLDOWN: Duration = Duration::from_secs(10 * 60);
/// Minimum spacing between two requests of the same kind to one peer
/// (§4.3 "minimum idle-time-between-requests").
pub const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(200);

struct Inflight {
	since: Instant,
}

/// A connected, handshaken peer. Exclusively owned by the peer registry
/// (§3 ownership note); the downloader and fetcher look peers up by
/// address rather than holding references to this type directly.
pub struct Peer {
	/// Information learned during the handshake; `total_difficulty` and
	/// `head_hash` are refreshed as the peer announces new blocks.
	pub info: Mutex<PeerInfo>,
	conn: Connection,
	meter: Mutex<MessageMeter>,
	inflight: Mutex<[Option<Inflight>; 4]>,
	last_request_at: Mutex<[Option<Instant>; 4]>,
	fault_count: AtomicU32,
	banned_until: Mutex<Option<Instant>>,
	throughput: RateCounter,
	connected_at: Instant,
}

fn kind_index(kind: RequestKind) -> usize {
	match kind {
		RequestKind::Headers => 0,
		RequestKind::Bodies => 1,
		RequestKind::State => 2,
		RequestKind::Receipts => 3,
	}
}

impl Peer {
	/// Wraps an already-handshaken connection plus the info exchanged
	/// during that handshake.
	pub fn new(conn: Connection, info: PeerInfo) -> Arc<Peer> {
		Arc::new(Peer {
			info: Mutex::new(info),
			conn,
			meter: Mutex::new(MessageMeter::new()),
			inflight: Mutex::new([None, None, None, None]),
			last_request_at: Mutex::new([None, None, None, None]),
			fault_count: AtomicU32::new(0),
			banned_until: Mutex::new(None),
			throughput: RateCounter::new(),
			connected_at: Instant::now(),
		})
	}

	/// The peer's network address, used as its identity throughout the
	/// registry (§4.1).
	pub fn addr(&self) -> PeerAddr {
		self.info.lock().addr
	}

	/// A snapshot of the peer's current total difficulty and head hash.
	pub fn head(&self) -> (krypton_core::core::difficulty::Difficulty, krypton_core::core::hash::Hash) {
		let info = self.info.lock();
		(info.total_difficulty, info.head_hash)
	}

	/// Wall-clock time since this peer's handshake completed.
	pub fn connected_since(&self) -> Duration {
		self.connected_at.elapsed()
	}

	/// Whether this peer is currently soft-banned (§4.3).
	pub fn is_banned(&self) -> bool {
		match *self.banned_until.lock() {
			Some(until) => Instant::now() < until,
			None => false,
		}
	}

	/// Reserves an in-flight slot for `kind`, failing if one is already
	/// outstanding (§4.3 invariant 2) or the minimum request interval
	/// hasn't elapsed (§4.3 "minimum idle-time-between-requests").
	pub fn begin_request(&self, kind: RequestKind) -> Result<(), Error> {
		let idx = kind_index(kind);
		let mut inflight = self.inflight.lock();
		if inflight[idx].is_some() {
			return Err(Error::Timeout);
		}
		let mut last = self.last_request_at.lock();
		if let Some(prev) = last[idx] {
			if prev.elapsed() < MIN_REQUEST_INTERVAL {
				return Err(Error::Timeout);
			}
		}
		inflight[idx] = Some(Inflight { since: Instant::now() });
		last[idx] = Some(Instant::now());
		Ok(())
	}

	/// Clears the in-flight slot for `kind` (response arrived, or the
	/// round cancelled). Idempotent.
	pub fn complete_request(&self, kind: RequestKind) {
		self.inflight.lock()[kind_index(kind)] = None;
	}

	/// Whether a request of `kind` is currently outstanding.
	pub fn has_inflight(&self, kind: RequestKind) -> bool {
		self.inflight.lock()[kind_index(kind)].is_some()
	}

	/// How long the current in-flight request of `kind` has been
	/// outstanding, used by the downloader to compute `rtt * k` deadlines
	/// (§4.4).
	pub fn inflight_age(&self, kind: RequestKind) -> Option<Duration> {
		self.inflight.lock()[kind_index(kind)].as_ref().map(|i| i.since.elapsed())
	}

	/// Records an escalating fault (§7 `Timeout`: a request that never
	/// answered, or connection noise that isn't itself a protocol
	/// violation). Returns `true` once the soft-ban threshold is crossed,
	/// in which case the caller must disconnect.
	pub fn record_fault(&self) -> bool {
		let count = self.fault_count.fetch_add(1, Ordering::SeqCst) + 1;
		if count >= SOFT_BAN_THRESHOLD {
			*self.banned_until.lock() = Some(Instant::now() + SOFT_BAN_COOLDOWN);
			warn!("peer {}: soft-banned after {} faults", self.addr(), count);
			true
		} else {
			false
		}
	}

	/// Bans the peer on a single occurrence (§7 `PeerFault`/`InvalidBlock`):
	/// a malformed message, an unrequested response, or content that fails
	/// validation. Unlike `record_fault`, there's no strike counter —
	/// these don't get a second chance. Always signals disconnect.
	pub fn ban_immediately(&self) -> bool {
		*self.banned_until.lock() = Some(Instant::now() + SOFT_BAN_COOLDOWN);
		warn!("peer {}: banned", self.addr());
		true
	}

	/// Sends a message, counting it in the meter under the negotiated
	/// protocol version.
	pub fn send(&self, msg: &Message) -> Result<(), Error> {
		let version = self.info.lock().version;
		let body = msg.encode_body();
		self.meter.lock().on_write(version, msg.code(), body.len());
		self.conn.send(msg.code(), &body)
	}

	/// Requests headers starting at `req`, reserving the `Headers` slot.
	pub fn send_get_block_headers(&self, req: GetBlockHeaders) -> Result<(), Error> {
		self.begin_request(RequestKind::Headers)?;
		self.send(&Message::GetBlockHeaders(req))
	}

	/// Requests bodies by hash, reserving the `Bodies` slot.
	pub fn send_get_block_bodies(&self, hashes: Vec<krypton_core::core::hash::Hash>) -> Result<(), Error> {
		self.begin_request(RequestKind::Bodies)?;
		self.send(&Message::GetBlockBodies(HashRequest { hashes }))
	}

	/// Requests state trie nodes by hash, reserving the `State` slot
	/// (protocol 63+).
	pub fn send_get_node_data(&self, hashes: Vec<krypton_core::core::hash::Hash>) -> Result<(), Error> {
		self.begin_request(RequestKind::State)?;
		self.send(&Message::GetNodeData(HashRequest { hashes }))
	}

	/// Requests receipts by block hash, reserving the `Receipts` slot
	/// (protocol 63+).
	pub fn send_get_receipts(&self, hashes: Vec<krypton_core::core::hash::Hash>) -> Result<(), Error> {
		self.begin_request(RequestKind::Receipts)?;
		self.send(&Message::GetReceipts(HashRequest { hashes }))
	}

	/// Announces a block by hash only (§4.5 propagation: the "announce by
	/// hash" half of fan-out).
	pub fn send_block_hash(&self, hash: krypton_core::core::hash::Hash, number: u64) -> Result<(), Error> {
		self.send(&Message::NewBlockHashes(vec![HashAndNumber { hash, number }]))
	}

	/// Broadcasts a full block (§4.5 propagation: the "forward in full" half
	/// of fan-out).
	pub fn send_block(
		&self,
		block: &krypton_core::core::block::Block,
		td: krypton_core::core::difficulty::Difficulty,
	) -> Result<(), Error> {
		self.send(&Message::NewBlock(block.clone(), td))
	}

	/// Runs the handshake as the dialing side: sends our `Status`, then
	/// waits for and validates the peer's.
	pub fn handshake_outbound(conn: &Connection, ours: &Status) -> Result<Status, Error> {
		conn.send(Code::Status, &Message::Status(ours.clone()).encode_body())?;
		Self::read_and_validate_status(conn, ours)
	}

	/// Runs the handshake as the accepting side: waits for the peer's
	/// `Status` first, then replies with ours.
	pub fn handshake_inbound(conn: &Connection, ours: &Status) -> Result<Status, Error> {
		let theirs = Self::read_and_validate_status(conn, ours)?;
		conn.send(Code::Status, &Message::Status(ours.clone()).encode_body())?;
		Ok(theirs)
	}

	fn read_and_validate_status(conn: &Connection, ours: &Status) -> Result<Status, Error> {
		let (code, version_hint, body) = conn.recv_raw()?;
		if code != Code::Status {
			return Err(Error::ProtocolMismatch { us: ours.version, peer: version_hint });
		}
		let theirs = match Message::decode_body(Code::Status, ours.version, &body)? {
			Message::Status(s) => s,
			_ => unreachable!("decode_body(Status, ..) always yields Message::Status"),
		};
		if theirs.genesis_hash != ours.genesis_hash {
			return Err(Error::GenesisMismatch { us: ours.genesis_hash, peer: theirs.genesis_hash });
		}
		if theirs.network_id != ours.network_id {
			return Err(Error::ProtocolMismatch { us: ours.version as u32, peer: theirs.version });
		}
		Ok(theirs)
	}

	/// Reads and dispatches inbound messages until the connection closes or
	/// `cancel` fires (§5 "every suspension point... selects on the global
	/// cancel signal"). `adapter` is the bridge back to chain/pool (§3
	/// `ChainAdapter`).
	pub fn run(self: &Arc<Peer>, adapter: Arc<dyn ChainAdapter>) {
		loop {
			if self.conn.cancel().is_cancelled() {
				debug!("peer {}: cancelled, stopping read loop", self.addr());
				return;
			}
			match self.conn.recv_raw() {
				Ok((code, _hint, body)) => {
					let version = self.info.lock().version;
					if let Err(banned) = self.dispatch(code, version, &body, adapter.as_ref()) {
						if banned {
							debug!("peer {}: disconnecting after dispatch fault", self.addr());
							return;
						}
					}
				}
				Err(Error::ConnectionClose) => return,
				Err(Error::Timeout) => continue,
				Err(Error::OversizeMessage) => {
					warn!("peer {}: oversize message, banning", self.addr());
					self.ban_immediately();
					return;
				}
				Err(e) => {
					warn!("peer {}: read error: {}", self.addr(), e);
					if self.record_fault() {
						return;
					}
				}
			}
		}
	}

	/// Decodes and handles one message. Every fault caught here (malformed
	/// body, unrequested response, a block the adapter rejects) is a single-
	/// occurrence `PeerFault` (§7): `Err(true)` always means "banned, caller
	/// must disconnect."
	fn dispatch(&self, code: Code, version: u32, body: &[u8], adapter: &dyn ChainAdapter) -> Result<(), bool> {
		let size = body.len();
		self.meter.lock().on_read(version, code, size);
		let msg = match Message::decode_body(code, version, body) {
			Ok(m) => m,
			Err(_) => return Err(self.ban_immediately()),
		};
		let addr = self.addr();
		match msg {
			Message::Status(_) => {
				// A Status after the handshake completed is fatal (§4.3
				// "messages received before handshake completion are
				// fatal" — symmetrically, a *second* Status is a protocol
				// violation, not a no-op).
				Err(self.ban_immediately())
			}
			Message::NewBlockHashes(hashes) => {
				adapter.block_hashes_received(hashes.into_iter().map(|h| (h.hash, h.number)).collect(), addr);
				Ok(())
			}
			Message::Transactions(txs) => {
				for tx in txs {
					adapter.transaction_received(tx, addr);
				}
				Ok(())
			}
			Message::GetBlockHeaders(req) => {
				let headers = adapter.get_block_headers(&req);
				let _ = self.send(&Message::BlockHeaders(headers));
				Ok(())
			}
			Message::BlockHeaders(headers) => {
				if !self.has_inflight(RequestKind::Headers) {
					return Err(self.ban_immediately());
				}
				self.complete_request(RequestKind::Headers);
				adapter.headers_received(headers, addr);
				Ok(())
			}
			Message::GetBlockBodies(req) => {
				let bodies: Vec<_> = req
					.hashes
					.iter()
					.filter_map(|h| adapter.get_block(*h))
					.map(|b| b.body)
					.collect();
				let _ = self.send(&Message::BlockBodies(bodies));
				Ok(())
			}
			Message::BlockBodies(bodies) => {
				if !self.has_inflight(RequestKind::Bodies) {
					return Err(self.ban_immediately());
				}
				self.complete_request(RequestKind::Bodies);
				adapter.bodies_received(bodies, addr);
				Ok(())
			}
			Message::NewBlock(block, td) => {
				{
					let mut info = self.info.lock();
					if td > info.total_difficulty {
						info.total_difficulty = td;
						info.head_hash = block.hash();
					}
				}
				if !adapter.block_received(block, addr) {
					return Err(self.ban_immediately());
				}
				Ok(())
			}
			Message::GetNodeData(req) => {
				let _ = self.send(&Message::NodeData(vec![Vec::new(); req.hashes.len()]));
				Ok(())
			}
			Message::NodeData(data) => {
				if !self.has_inflight(RequestKind::State) {
					return Err(self.ban_immediately());
				}
				self.complete_request(RequestKind::State);
				adapter.node_data_received(data, addr);
				Ok(())
			}
			Message::GetReceipts(req) => {
				let _ = self.send(&Message::Receipts(vec![Vec::new(); req.hashes.len()]));
				Ok(())
			}
			Message::Receipts(receipts) => {
				if !self.has_inflight(RequestKind::Receipts) {
					return Err(self.ban_immediately());
				}
				self.complete_request(RequestKind::Receipts);
				adapter.receipts_received(receipts, addr);
				Ok(())
			}
		}
	}

	/// Tears down the connection and cancels any suspension points waiting
	/// on it (§4.1 unregister "cancels all in-flight requests").
	pub fn stop(&self) {
		self.conn.cancel().cancel();
		for kind in [RequestKind::Headers, RequestKind::Bodies, RequestKind::State, RequestKind::Receipts] {
			self.complete_request(kind);
		}
	}

	/// What this peer claims to be able to serve.
	pub fn capabilities(&self) -> Capabilities {
		self.info.lock().capabilities
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn request_kind_enforces_single_inflight() {
		// Exercised indirectly through `Peers`/`Connection` integration
		// tests (p2p::tests) where a real duplex pair is available;
		// `kind_index` bijection is covered here directly.
		for (i, kind) in [RequestKind::Headers, RequestKind::Bodies, RequestKind::State, RequestKind::Receipts]
			.into_iter()
			.enumerate()
		{
			assert_eq!(kind_index(kind), i);
		}
	}
}
