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

//! Scenario F (spec §8): a second node started against a data directory
//! already held by a running one fails fast instead of racing it over the
//! same LMDB/peer stores.

use std::sync::Arc;

use krypton_chain::NoopExecutor;
use krypton_config::ServerConfig;
use krypton_core::global::ChainType;
use krypton_pow::DevPowVerifier;
use krypton_servers::{Error, Node};

fn test_config(db_root: &std::path::Path) -> ServerConfig {
	let mut config = ServerConfig::default();
	config.chain_type = ChainType::AutomatedTesting;
	config.db_root = db_root.to_str().expect("utf8 tempdir path").to_owned();
	config.p2p_config.host = "127.0.0.1".to_owned();
	config.p2p_config.port = 0;
	config.p2p_config.seeds = Vec::new();
	config.rpc_config.enabled = false;
	config
}

/// Scenario F (spec §8): starting a second node against the same
/// `db_root` fails with an error naming that path, rather than silently
/// opening a second handle onto the same chain/peer stores.
#[test]
fn second_node_on_same_data_dir_fails_fast() {
	let dir = tempfile::tempdir().unwrap();

	let first = Node::init(test_config(dir.path()), Arc::new(NoopExecutor), Arc::new(DevPowVerifier)).unwrap();
	first.start().unwrap();

	let second = Node::init(test_config(dir.path()), Arc::new(NoopExecutor), Arc::new(DevPowVerifier));

	let path_str = dir.path().to_str().unwrap();
	match second {
		Err(Error::AlreadyRunning(msg)) => {
			assert!(msg.contains(path_str), "error `{}` should reference the original data dir {}", msg, path_str);
		}
		other => panic!("expected AlreadyRunning, got {:?}", other.map(|_| ())),
	}

	first.stop();

	// Once the first node releases its lock, a fresh one can take its place.
	let third = Node::init(test_config(dir.path()), Arc::new(NoopExecutor), Arc::new(DevPowVerifier));
	assert!(third.is_ok(), "a data dir must become available again once its owner stops");
	third.unwrap().stop();
}
