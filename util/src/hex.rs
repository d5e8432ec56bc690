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

//! Hex encoding/decoding, used for hashes, addresses and enode ids across
//! the workspace.

use std::fmt::Write;
use std::num::ParseIntError;

/// Encodes bytes into a lowercase hex string.
pub fn to_hex(bytes: &[u8]) -> String {
	let mut s = String::with_capacity(bytes.len() * 2);
	for byte in bytes {
		write!(&mut s, "{:02x}", byte).expect("writing to a String cannot fail");
	}
	s
}

/// Decodes a hex string (with or without a leading `0x`) into bytes.
pub fn from_hex(hex_str: &str) -> Result<Vec<u8>, ParseIntError> {
	let trimmed = hex_str.strip_prefix("0x").unwrap_or(hex_str).trim();
	(0..trimmed.len())
		.step_by(2)
		.map(|i| u8::from_str_radix(&trimmed[i..(i + 2).min(trimmed.len())], 16))
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn round_trips() {
		let bytes = vec![0xde, 0xad, 0xbe, 0xef];
		let s = to_hex(&bytes);
		assert_eq!(s, "deadbeef");
		assert_eq!(from_hex(&s).unwrap(), bytes);
		assert_eq!(from_hex("0xdeadbeef").unwrap(), bytes);
	}
}
