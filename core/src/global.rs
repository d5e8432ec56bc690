// Copyright 2017 The Grin Developers
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

//! Values that should be shared across all modules without passing them
//! around explicitly, but that aren't consensus values themselves. Used
//! sparingly: currently just which chain this process is running against,
//! since the genesis block, network id and bootnode list all hang off it.

use std::sync::RwLock;

use serde::{Deserialize, Serialize};

/// Which chain a running node is part of. Mirrors the `network_id` /
/// `genesis_hash` pair exchanged in the protocol handshake (SPEC_FULL §4.3):
/// two peers only stay connected if both match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainType {
	/// Production network.
	Mainnet,
	/// Long-lived public test network.
	Testnet,
	/// Ephemeral network spun up for integration tests; small, fast-moving
	/// genesis so tests aren't slowed down by realistic difficulty.
	AutomatedTesting,
}

impl ChainType {
	/// The numeric network id exchanged in the `Status` handshake message.
	pub fn network_id(&self) -> u64 {
		match self {
			ChainType::Mainnet => 1,
			ChainType::Testnet => 2,
			ChainType::AutomatedTesting => 1337,
		}
	}
}

lazy_static! {
	/// The chain type this process is configured for. Defaults to
	/// `AutomatedTesting` so unit tests never accidentally pick up mainnet
	/// parameters; binaries must call `set_chain_type` during startup.
	pub static ref CHAIN_TYPE: RwLock<ChainType> = RwLock::new(ChainType::AutomatedTesting);
}

/// Sets the chain type for the remainder of the process's lifetime.
pub fn set_chain_type(chain_type: ChainType) {
	let mut current = CHAIN_TYPE.write().unwrap();
	*current = chain_type;
}

/// The chain type this process is configured for.
pub fn chain_type() -> ChainType {
	*CHAIN_TYPE.read().unwrap()
}

/// Whether this process is configured for automated testing.
pub fn is_automated_testing_mode() -> bool {
	chain_type() == ChainType::AutomatedTesting
}

/// Whether this process is configured for mainnet.
pub fn is_mainnet() -> bool {
	chain_type() == ChainType::Mainnet
}
