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

//! Block, header, and transaction primitives for Krypton: an
//! account/state, proof-of-work blockchain in the Ethereum family.

#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(unused_mut)]

#[macro_use]
extern crate lazy_static;

pub mod consensus;
pub mod core;
pub mod genesis;
pub mod global;

pub use crate::core::block::{Block, BlockHeader};
pub use crate::core::difficulty::Difficulty;
pub use crate::core::hash::{Hash, Hashed};
pub use crate::core::transaction::{Address, Transaction, TransactionError};
