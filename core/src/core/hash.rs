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

//! The primary hash function used throughout the protocol: keccak-256.
//! Used pervasively to identify blocks, headers and transactions.

use std::fmt;

use rlp::{DecoderError, Rlp, RlpStream};
use serde::{Deserialize, Serialize};
use tiny_keccak::{Hasher, Keccak};

/// A 32-byte hash identifying a header, block or transaction.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Hash(pub [u8; 32]);

/// The hash of an empty byte string, i.e. `keccak256([])`. Used as the
/// canonical "absent" hash (e.g. a genesis block's parent hash).
pub const ZERO_HASH: Hash = Hash([0u8; 32]);

impl fmt::Display for Hash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for byte in self.0.iter() {
			write!(f, "{:02x}", byte)?;
		}
		Ok(())
	}
}

impl fmt::Debug for Hash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Hash({})", self)
	}
}

impl Hash {
	/// Builds a hash from a 32-byte slice. Panics if `bytes` isn't exactly
	/// 32 bytes long — callers own that invariant (e.g. wire decoding checks
	/// length before calling this).
	pub fn from_slice(bytes: &[u8]) -> Hash {
		let mut a = [0u8; 32];
		a.copy_from_slice(bytes);
		Hash(a)
	}

	/// Borrows the hash as a byte slice.
	pub fn as_bytes(&self) -> &[u8] {
		&self.0
	}
}

impl rlp::Encodable for Hash {
	fn rlp_append(&self, s: &mut RlpStream) {
		s.encoder().encode_value(&self.0);
	}
}

impl rlp::Decodable for Hash {
	fn decode(rlp: &Rlp<'_>) -> Result<Self, DecoderError> {
		let data = rlp.data()?;
		if data.len() != 32 {
			return Err(DecoderError::RlpIncorrectListLen);
		}
		Ok(Hash::from_slice(data))
	}
}

/// Computes the keccak-256 digest of an arbitrary byte string.
pub fn keccak256(data: &[u8]) -> Hash {
	let mut hasher = Keccak::v256();
	let mut out = [0u8; 32];
	hasher.update(data);
	hasher.finalize(&mut out);
	Hash(out)
}

/// Types whose canonical hash is the keccak-256 of their RLP encoding.
/// Blocks, headers and transactions all implement this; the downloader and
/// fetcher use it to identify the objects they schedule and import.
pub trait Hashed: rlp::Encodable {
	/// The keccak-256 hash of `self`'s canonical RLP encoding.
	fn hash(&self) -> Hash {
		keccak256(&rlp::encode(self))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn keccak_is_deterministic_and_display_is_64_hex_chars() {
		let h1 = keccak256(b"krypton");
		let h2 = keccak256(b"krypton");
		let h3 = keccak256(b"krypton2");
		assert_eq!(h1, h2);
		assert_ne!(h1, h3);
		assert_eq!(h1.to_string().len(), 64);
		assert!(h1.to_string().chars().all(|c| c.is_ascii_hexdigit()));
	}

	#[test]
	fn display_is_lowercase_hex() {
		let h = Hash([0xabu8; 32]);
		assert_eq!(h.to_string(), "ab".repeat(32));
	}
}
