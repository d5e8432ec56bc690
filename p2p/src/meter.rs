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

//! The message meter (C2, §4.2): classifies every packet read or written
//! on a peer's duplex stream into one of ten buckets by `(version, code)`
//! and tallies packet/byte counts per bucket. Generalized from the
//! teacher's bandwidth-throttling wrapper
//! (`p2p::conn::{ThrottledReader, ThrottledWriter}`) — same "wrap the
//! stream transparently" shape, but counting/classifying instead of
//! rate-limiting raw bytes.

use std::fmt;

use crate::msg::{Code, PROTOCOL_V62, PROTOCOL_V63};

/// One of the ten classification buckets a message is attributed to (§4.2).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Bucket {
	/// `GetBlockHeaders` requests (or legacy `GetBlockHashes`).
	RequestHashes,
	/// `GetBlockBodies` requests (or legacy `GetBlocks`).
	RequestBlocks,
	/// `GetBlockHeaders` requests at protocol 62+.
	RequestHeaders,
	/// `GetBlockBodies` requests at protocol 62+.
	RequestBodies,
	/// `GetNodeData` requests at protocol 63+.
	RequestState,
	/// `GetReceipts` requests at protocol 63+.
	RequestReceipts,
	/// `NewBlockHashes` announcements.
	PropagateHashes,
	/// `NewBlock` broadcasts.
	PropagateBlock,
	/// `Transactions` propagation.
	PropagateTxn,
	/// Everything else (status, responses, unclassified).
	Misc,
}

impl fmt::Display for Bucket {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			Bucket::RequestHashes => "request_hashes",
			Bucket::RequestBlocks => "request_blocks",
			Bucket::RequestHeaders => "request_headers",
			Bucket::RequestBodies => "request_bodies",
			Bucket::RequestState => "request_state",
			Bucket::RequestReceipts => "request_receipts",
			Bucket::PropagateHashes => "propagate_hashes",
			Bucket::PropagateBlock => "propagate_block",
			Bucket::PropagateTxn => "propagate_txn",
			Bucket::Misc => "misc",
		};
		write!(f, "{}", s)
	}
}

/// Classifies a `(version, code)` pair into exactly one [`Bucket`] (§4.2
/// "attributes... to exactly one bucket"). Version gating is enforced
/// upstream by [`crate::msg::Code::allowed_at`]; this function assumes the
/// pairing is valid and picks the bucket that applies at `version`.
pub fn classify(version: u32, code: Code) -> Bucket {
	match code {
		Code::GetBlockHeaders => {
			if version >= PROTOCOL_V62 {
				Bucket::RequestHeaders
			} else {
				Bucket::RequestHashes
			}
		}
		Code::GetBlockBodies => {
			if version >= PROTOCOL_V62 {
				Bucket::RequestBodies
			} else {
				Bucket::RequestBlocks
			}
		}
		Code::GetNodeData if version >= PROTOCOL_V63 => Bucket::RequestState,
		Code::GetReceipts if version >= PROTOCOL_V63 => Bucket::RequestReceipts,
		Code::NewBlockHashes => Bucket::PropagateHashes,
		Code::NewBlock => Bucket::PropagateBlock,
		Code::Transactions => Bucket::PropagateTxn,
		_ => Bucket::Misc,
	}
}

/// Packet/byte tally for a single bucket.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Tally {
	/// Number of messages counted.
	pub packets: u64,
	/// Total bytes counted across those messages.
	pub bytes: u64,
}

/// Transparent meter over a peer's message stream (§4.2). Every read or
/// write of a classified message increments exactly one bucket's tally;
/// readers (protocol handler, RPC `peerCount`/debug surfaces) get a
/// point-in-time snapshot without locking the peer itself.
pub struct MessageMeter {
	read: [Tally; 10],
	written: [Tally; 10],
}

const BUCKETS: [Bucket; 10] = [
	Bucket::RequestHashes,
	Bucket::RequestBlocks,
	Bucket::RequestHeaders,
	Bucket::RequestBodies,
	Bucket::RequestState,
	Bucket::RequestReceipts,
	Bucket::PropagateHashes,
	Bucket::PropagateBlock,
	Bucket::PropagateTxn,
	Bucket::Misc,
];

fn index_of(bucket: Bucket) -> usize {
	BUCKETS.iter().position(|b| *b == bucket).expect("all buckets listed in BUCKETS")
}

impl MessageMeter {
	/// Builds a fresh meter with all tallies at zero.
	pub fn new() -> MessageMeter {
		MessageMeter {
			read: [Tally::default(); 10],
			written: [Tally::default(); 10],
		}
	}

	/// Records an inbound message of `size` bytes under negotiated
	/// `version` and `code`.
	pub fn on_read(&mut self, version: u32, code: Code, size: usize) {
		let bucket = classify(version, code);
		let tally = &mut self.read[index_of(bucket)];
		tally.packets += 1;
		tally.bytes += size as u64;
	}

	/// Records an outbound message of `size` bytes under negotiated
	/// `version` and `code`.
	pub fn on_write(&mut self, version: u32, code: Code, size: usize) {
		let bucket = classify(version, code);
		let tally = &mut self.written[index_of(bucket)];
		tally.packets += 1;
		tally.bytes += size as u64;
	}

	/// The read tally for `bucket`.
	pub fn read_tally(&self, bucket: Bucket) -> Tally {
		self.read[index_of(bucket)]
	}

	/// The write tally for `bucket`.
	pub fn write_tally(&self, bucket: Bucket) -> Tally {
		self.written[index_of(bucket)]
	}

	/// Total bytes read across every bucket.
	pub fn total_bytes_read(&self) -> u64 {
		self.read.iter().map(|t| t.bytes).sum()
	}

	/// Total bytes written across every bucket.
	pub fn total_bytes_written(&self) -> u64 {
		self.written.iter().map(|t| t.bytes).sum()
	}
}

impl Default for MessageMeter {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn legacy_and_62plus_headers_land_in_different_buckets() {
		assert_eq!(classify(61, Code::GetBlockHeaders), Bucket::RequestHashes);
		assert_eq!(classify(62, Code::GetBlockHeaders), Bucket::RequestHeaders);
	}

	#[test]
	fn state_and_receipts_only_classify_at_63() {
		assert_eq!(classify(62, Code::GetNodeData), Bucket::Misc);
		assert_eq!(classify(63, Code::GetNodeData), Bucket::RequestState);
	}

	#[test]
	fn meter_attributes_exactly_one_bucket_per_message() {
		let mut meter = MessageMeter::new();
		meter.on_read(63, Code::NewBlock, 1000);
		assert_eq!(meter.read_tally(Bucket::PropagateBlock).packets, 1);
		assert_eq!(meter.read_tally(Bucket::PropagateBlock).bytes, 1000);
		assert_eq!(meter.read_tally(Bucket::Misc).packets, 0);
		assert_eq!(meter.total_bytes_read(), 1000);
	}

	#[test]
	fn read_and_write_tallies_are_independent() {
		let mut meter = MessageMeter::new();
		meter.on_read(63, Code::Transactions, 50);
		meter.on_write(63, Code::Transactions, 30);
		assert_eq!(meter.read_tally(Bucket::PropagateTxn).bytes, 50);
		assert_eq!(meter.write_tally(Bucket::PropagateTxn).bytes, 30);
	}
}
