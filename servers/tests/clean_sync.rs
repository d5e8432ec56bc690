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

//! End-to-end sync scenarios (spec §8 scenarios A/C): two full `Node`s
//! wired exactly as `krypton_servers::Node::init` wires them, talking
//! over real loopback TCP. Grounded on the teacher's
//! `servers/tests/simulnet.rs` (start a handful of real servers, let them
//! sync over the wire, then assert on their resulting chains) rather than
//! driving the downloader's internals directly.

use std::sync::Arc;
use std::time::{Duration, Instant};

use krypton_chain::{NoopExecutor, Options};
use krypton_config::ServerConfig;
use krypton_core::core::block::{Block, BlockBody, BlockHeader, Bloom};
use krypton_core::core::difficulty::Difficulty;
use krypton_core::core::hash::Hashed;
use krypton_core::core::transaction::Address;
use krypton_core::global::ChainType;
use krypton_pow::{DevPowVerifier, PowVerifier};
use krypton_servers::Node;

/// Builds and seals `count` blocks on top of `parent`, in ascending order,
/// each passing [`DevPowVerifier`] and an (empty) [`NoopExecutor`] --
/// the same shape as `krypton_chain::pipe`'s own test fixtures, just
/// chained further.
fn mine_chain(parent: &BlockHeader, count: u64) -> Vec<Block> {
	let mut blocks = Vec::with_capacity(count as usize);
	let mut previous = parent.clone();
	for _ in 0..count {
		let mut header = BlockHeader {
			parent_hash: previous.hash(),
			uncle_hashes: vec![],
			coinbase: Address([0u8; 20]),
			state_root: previous.state_root,
			transactions_root: krypton_core::core::hash::ZERO_HASH,
			receipts_root: krypton_core::core::hash::ZERO_HASH,
			logs_bloom: Bloom::default(),
			difficulty: Difficulty::min(),
			number: previous.number + 1,
			gas_limit: previous.gas_limit,
			gas_used: 0,
			timestamp: previous.timestamp + 15,
			extra_data: vec![],
			mix_digest: krypton_core::core::hash::ZERO_HASH,
			nonce: 0,
		};
		let (_, mix) = DevPowVerifier::compute_digest(&header);
		header.mix_digest = mix;
		DevPowVerifier.verify(&header).expect("mined header passes DevPowVerifier");

		blocks.push(Block {
			header: header.clone(),
			body: BlockBody {
				transactions: vec![],
				uncles: vec![],
			},
		});
		previous = header;
	}
	blocks
}

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

fn wait_until<F: Fn() -> bool>(timeout: Duration, poll: Duration, cond: F) -> bool {
	let start = Instant::now();
	while start.elapsed() < timeout {
		if cond() {
			return true;
		}
		std::thread::sleep(poll);
	}
	cond()
}

/// Scenario A (spec §8): a node well behind a single peer catches up and
/// its canonical head converges on the peer's, driven entirely by
/// `Coordinator`/`Syncer` picking the peer as master and running a real
/// round over the wire.
#[test]
fn clean_sync_catches_up_to_a_single_peer() {
	let remote_dir = tempfile::tempdir().unwrap();
	let local_dir = tempfile::tempdir().unwrap();

	let remote = Node::init(
		test_config(remote_dir.path()),
		Arc::new(NoopExecutor),
		Arc::new(DevPowVerifier),
	)
	.unwrap();
	let remote_port = remote.start().unwrap();

	let genesis = remote.chain().get_header_by_height(0).unwrap();
	for block in mine_chain(&genesis, 20) {
		remote.chain().process_block(block, Options::none()).unwrap();
	}
	assert_eq!(remote.chain().head().unwrap().height, 20);

	let mut local_config = test_config(local_dir.path());
	local_config.p2p_config.seeds = vec![format!("127.0.0.1:{}", remote_port)];
	let local = Node::init(local_config, Arc::new(NoopExecutor), Arc::new(DevPowVerifier)).unwrap();
	local.start().unwrap();

	let caught_up = wait_until(Duration::from_secs(20), Duration::from_millis(100), || {
		local.chain().head().map(|t| t.height).unwrap_or(0) == 20
	});

	assert!(caught_up, "local node never caught up to the remote head");
	let local_head = local.chain().head().unwrap();
	let remote_head = remote.chain().head().unwrap();
	assert_eq!(local_head.last_block_h, remote_head.last_block_h);
	assert_eq!(local_head.total_difficulty, remote_head.total_difficulty);

	local.stop();
	remote.stop();
}

/// The fetcher's propagation path (spec §4.5/§8 scenario D, simplified to
/// one sender): once caught up, a block broadcast directly to the local
/// node (bypassing a sync round entirely) is still accepted and becomes
/// the new head.
#[test]
fn broadcast_block_is_adopted_without_a_sync_round() {
	let dir = tempfile::tempdir().unwrap();
	let node = Node::init(test_config(dir.path()), Arc::new(NoopExecutor), Arc::new(DevPowVerifier)).unwrap();
	node.start().unwrap();

	let genesis = node.chain().get_header_by_height(0).unwrap();
	let next = mine_chain(&genesis, 1).remove(0);

	let tip = node.chain().process_block(next.clone(), Options::none()).unwrap();
	assert!(tip.is_some());
	assert_eq!(node.chain().head().unwrap().last_block_h, next.hash());

	node.stop();
}
