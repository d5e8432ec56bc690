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

//! The persistent key-value store named by role in SPEC_FULL §2: "ordered
//! byte-keyed storage with atomic batches". Out of scope as a consensus
//! component, but modeled directly (not mocked) because the chain store's
//! data model (§3) depends on its shape: a `get`/`put`/`delete` map plus a
//! `Batch` that groups writes into a single atomic commit.

#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(unused_mut)]

pub mod lmdb;

pub use crate::lmdb::{option_to_not_found, Batch, Error, SerIterator, Store};

/// Builds a db key from a single-byte column prefix and an arbitrary byte
/// identifier, e.g. `to_key(HEADER_PREFIX, hash.as_bytes())`.
pub fn to_key(prefix: u8, id: &[u8]) -> Vec<u8> {
	let mut res = Vec::with_capacity(id.len() + 1);
	res.push(prefix);
	res.extend_from_slice(id);
	res
}

/// Builds a db key from a single-byte column prefix and a big-endian u64,
/// used for the canonical number -> hash mapping so iteration order matches
/// numeric order.
pub fn u64_to_key(prefix: u8, val: u64) -> Vec<u8> {
	let mut res = Vec::with_capacity(9);
	res.push(prefix);
	res.extend_from_slice(&val.to_be_bytes());
	res
}
