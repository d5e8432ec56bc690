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

//! Block difficulty and total difficulty (TD), the quantity used to rank
//! competing chains (§3, §8 invariant 5: TD of the canonical head never
//! decreases).

use std::fmt;
use std::iter::Sum;
use std::ops::Add;

use primitive_types::U256;
use rlp::{DecoderError, Rlp, RlpStream};
use serde::{Deserialize, Serialize};

/// A block's difficulty, or the cumulative total difficulty of a chain of
/// blocks. Both are represented by the same newtype since TD is simply the
/// sum of per-block difficulties from genesis.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Difficulty(U256);

impl Difficulty {
	/// The zero difficulty, used as the starting accumulator for TD.
	pub fn zero() -> Difficulty {
		Difficulty(U256::zero())
	}

	/// The minimum valid difficulty for a mined block.
	pub fn min() -> Difficulty {
		Difficulty(U256::one())
	}

	/// Builds a `Difficulty` from a plain integer.
	pub fn from_num(n: u64) -> Difficulty {
		Difficulty(U256::from(n))
	}

	/// The underlying 256-bit integer.
	pub fn into_u256(self) -> U256 {
		self.0
	}
}

impl fmt::Display for Difficulty {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl fmt::Debug for Difficulty {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Difficulty({})", self.0)
	}
}

impl Add for Difficulty {
	type Output = Difficulty;
	fn add(self, rhs: Difficulty) -> Difficulty {
		Difficulty(self.0 + rhs.0)
	}
}

impl Sum for Difficulty {
	fn sum<I: Iterator<Item = Difficulty>>(iter: I) -> Difficulty {
		iter.fold(Difficulty::zero(), Add::add)
	}
}

impl rlp::Encodable for Difficulty {
	fn rlp_append(&self, s: &mut RlpStream) {
		let mut buf = [0u8; 32];
		self.0.to_big_endian(&mut buf);
		let first_nonzero = buf.iter().position(|&b| b != 0).unwrap_or(32);
		s.encoder().encode_value(&buf[first_nonzero..]);
	}
}

impl rlp::Decodable for Difficulty {
	fn decode(rlp: &Rlp<'_>) -> Result<Self, DecoderError> {
		let data = rlp.data()?;
		if data.len() > 32 {
			return Err(DecoderError::RlpIsTooBig);
		}
		Ok(Difficulty(U256::from_big_endian(data)))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn total_difficulty_accumulates() {
		let td = Difficulty::zero() + Difficulty::from_num(10) + Difficulty::from_num(5);
		assert_eq!(td, Difficulty::from_num(15));
	}

	#[test]
	fn ordering_matches_integer_ordering() {
		assert!(Difficulty::from_num(5) < Difficulty::from_num(6));
		assert!(Difficulty::zero() < Difficulty::min());
	}

	#[test]
	fn rlp_round_trips() {
		let d = Difficulty::from_num(0xdead_beef);
		let encoded = rlp::encode(&d);
		let decoded: Difficulty = rlp::decode(&encoded).unwrap();
		assert_eq!(d, decoded);
	}

	#[test]
	fn rlp_round_trips_zero() {
		let d = Difficulty::zero();
		let encoded = rlp::encode(&d);
		let decoded: Difficulty = rlp::decode(&encoded).unwrap();
		assert_eq!(d, decoded);
	}
}
