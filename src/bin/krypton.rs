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

//! Entry point for the Krypton node binary: parses a handful of CLI
//! flags, loads configuration (SPEC_FULL §1, no hot-reload), starts
//! logging, brings up a [`krypton_servers::Node`], and blocks until
//! interrupted.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{App, Arg};
use log::info;

use krypton_chain::NoopExecutor;
use krypton_config::GlobalConfig;
use krypton_pow::DevPowVerifier;
use krypton_servers::Node;

fn main() {
	let matches = App::new("krypton")
		.version(env!("CARGO_PKG_VERSION"))
		.about("Full node for Krypton, a proof-of-work account/state blockchain")
		.arg(
			Arg::with_name("config_file")
				.short("c")
				.long("config_file")
				.takes_value(true)
				.help("Path to krypton-server.toml; defaults to the working directory or $HOME/.krypton"),
		)
		.get_matches();

	let global_config = GlobalConfig::new(matches.value_of("config_file")).unwrap_or_else(|e| {
		eprintln!("error loading configuration: {}", e);
		std::process::exit(1);
	});

	let logging = global_config
		.members
		.as_ref()
		.and_then(|m| m.logging.clone());
	krypton_util::init_logger(Some(logging.unwrap_or_default()));

	info!("starting Krypton node, version {}", env!("CARGO_PKG_VERSION"));

	let server_config = global_config.server_config().clone();
	let node = Node::init(server_config, Arc::new(NoopExecutor), Arc::new(DevPowVerifier)).unwrap_or_else(|e| {
		eprintln!("failed to initialize node: {}", e);
		std::process::exit(1);
	});

	let bound_port = node.start().unwrap_or_else(|e| {
		eprintln!("failed to start node: {}", e);
		std::process::exit(1);
	});
	info!("p2p listening on port {}", bound_port);

	let shutdown_node = node.clone();
	ctrlc::set_handler(move || {
		info!("shutdown requested, stopping...");
		shutdown_node.stop();
		std::process::exit(0);
	})
	.expect("failed to install Ctrl-C handler");

	loop {
		thread::sleep(Duration::from_secs(60));
	}
}
