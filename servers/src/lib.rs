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

//! Wires `krypton_chain`, `krypton_p2p`, `krypton_sync`, `krypton_pool`
//! and `krypton_rpc` into a single running [`Node`], and dials bootnodes
//! (SPEC_FULL §6) to keep it connected.

#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(unused_mut)]
#![warn(missing_docs)]

pub mod error;
pub mod node;
pub mod seed;
pub mod stats;

pub use error::Error;
pub use node::Node;
pub use stats::{NodeStats, PeerStats};
