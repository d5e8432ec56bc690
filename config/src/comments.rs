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

//! Comments for configuration keys, injected into a freshly-serialized
//! TOML file so a hand-edited `krypton-server.toml` is self-documenting.

use std::collections::HashMap;

fn comments() -> HashMap<String, String> {
	let mut retval = HashMap::new();
	retval.insert(
		"[server]".to_string(),
		"
# Generated configuration file for Krypton.
#
# A config change here only takes effect after restarting the node —
# this file is read once at startup and never watched.
"
		.to_string(),
	);
	retval.insert(
		"chain_type".to_string(),
		"
# Which network this node joins. One of:
# Mainnet - the production network
# Testnet - the long-lived public test network
# AutomatedTesting - small fast genesis, for CI
"
		.to_string(),
	);
	retval.insert(
		"db_root".to_string(),
		"
# Directory, relative to the working directory unless absolute, where
# chain data is stored.
"
		.to_string(),
	);
	retval.insert(
		"[server.p2p_config]".to_string(),
		"
# Peer networking.
"
		.to_string(),
	);
	retval.insert(
		"peer_max_count".to_string(),
		"
# Maximum number of simultaneous peer connections.
"
		.to_string(),
	);
	retval.insert(
		"seeds".to_string(),
		"
# Addresses dialed at startup in addition to any persisted peer list.
"
		.to_string(),
	);
	retval.insert(
		"[server.sync_config]".to_string(),
		"
# Chain synchronization tuning.
"
		.to_string(),
	);
	retval.insert(
		"finality_confirmations".to_string(),
		"
# Reorgs deeper than this many blocks are rejected outright.
"
		.to_string(),
	);
	retval.insert(
		"qos_tuning_peers".to_string(),
		"
# Soft cap on simultaneously in-flight header/body requests during a
# sync round, regardless of how many idle peers are available.
"
		.to_string(),
	);
	retval.insert(
		"import_queue_high_water".to_string(),
		"
# Once this many fetched-but-not-yet-imported items are staged, the
# downloader stops assigning new requests until the queue drains to
# import_queue_low_water.
"
		.to_string(),
	);
	retval.insert(
		"[server.rpc_config]".to_string(),
		"
# JSON-RPC 2.0 surface.
"
		.to_string(),
	);
	retval.insert(
		"enabled".to_string(),
		"
# Whether the HTTP JSON-RPC listener is started at all.
"
		.to_string(),
	);
	retval
}

/// Walks `raw` line by line, prepending any comment registered for a
/// section header or key found on that line.
pub fn insert_comments(raw: String) -> String {
	let comments = comments();
	let mut result = String::with_capacity(raw.len());
	for line in raw.lines() {
		let trimmed = line.trim();
		let key = trimmed.split('=').next().unwrap_or("").trim();
		if let Some(comment) = comments.get(trimmed).or_else(|| comments.get(key)) {
			result.push_str(comment);
		}
		result.push_str(line);
		result.push('\n');
	}
	result
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn section_header_gets_its_comment_prepended() {
		let raw = "[server]\nchain_type = \"Mainnet\"\n".to_string();
		let commented = insert_comments(raw);
		assert!(commented.contains("Generated configuration file"));
		assert!(commented.contains("chain_type = \"Mainnet\""));
	}
}
