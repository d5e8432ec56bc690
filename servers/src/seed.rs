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

//! Bootnode dialing (SPEC_FULL §6 node discovery): parses the configured
//! seed list, which may mix bare `host:port` addresses and
//! `enode://<hex-pubkey>@host:port` URLs, and keeps the peer count above
//! the configured minimum by periodically re-dialing. Generalized from
//! the teacher's `grin::seed::connect_and_monitor` thread-and-channel
//! shape, simplified to a single poll loop matching `p2p::Server::listen`'s
//! own cancellation style rather than the teacher's mpsc-fed listener.

use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};

use krypton_config::P2PConfig;
use krypton_p2p::{PeerAddr, Peers, Server};
use krypton_util::CancelToken;

const MONITOR_INTERVAL: Duration = Duration::from_secs(5);

/// Strips an `enode://<hex>@` prefix, if present, and resolves the
/// remaining `host:port` to a [`PeerAddr`]. The hex-encoded public key
/// ahead of the `@` identifies the node out-of-band (e.g. for an
/// operator's allow-list); this handshake (§4.3) doesn't yet verify peer
/// identity against it, so it's parsed only to be discarded.
pub fn parse_seed_addr(raw: &str) -> Result<PeerAddr, String> {
	let host_port = match raw.strip_prefix("enode://") {
		Some(rest) => rest.split_once('@').map(|(_, addr)| addr).ok_or_else(|| format!("malformed enode url: {}", raw))?,
		None => raw,
	};
	let mut addrs = host_port
		.to_socket_addrs()
		.map_err(|e| format!("could not resolve {}: {}", host_port, e))?;
	let addr: SocketAddr = addrs.next().ok_or_else(|| format!("no address for {}", host_port))?;
	Ok(PeerAddr(addr))
}

/// Dials every configured seed once, then keeps re-checking the peer
/// count every [`MONITOR_INTERVAL`] until `cancel` fires, dialing more of
/// the configured seeds whenever the connected count falls below
/// `peer_min_preferred_count`. Runs on its own thread; returns
/// immediately.
pub fn connect_and_monitor(p2p_server: Arc<Server>, peers: Arc<Peers>, config: P2PConfig, cancel: CancelToken) {
	thread::Builder::new()
		.name("krypton-seed".to_owned())
		.spawn(move || {
			let seed_addrs: Vec<PeerAddr> = config
				.seeds
				.iter()
				.filter_map(|raw| match parse_seed_addr(raw) {
					Ok(addr) => Some(addr),
					Err(e) => {
						warn!("seed: skipping unparseable seed {:?}: {}", raw, e);
						None
					}
				})
				.collect();

			loop {
				if cancel.is_cancelled() {
					return;
				}

				if peers.len() < config.peer_min_preferred_count as usize {
					for addr in &seed_addrs {
						if peers.get(addr).is_some() || peers.is_banned(addr) {
							continue;
						}
						debug!("seed: dialing {}", addr);
						if let Err(e) = p2p_server.connect(*addr) {
							warn!("seed: failed to connect to {}: {}", addr, e);
						}
					}
					peers.clean_peers(config.peer_max_count as usize, None);
				}

				let mut slept = Duration::from_secs(0);
				while slept < MONITOR_INTERVAL {
					if cancel.is_cancelled() {
						return;
					}
					thread::sleep(Duration::from_millis(200));
					slept += Duration::from_millis(200);
				}
			}
		})
		.expect("spawning seed thread");
	info!("seed: monitoring peer count, preferring at least {} peers", config.peer_min_preferred_count);
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_bare_host_port() {
		let addr = parse_seed_addr("127.0.0.1:30303").unwrap();
		assert_eq!(addr.0.port(), 30303);
	}

	#[test]
	fn parses_enode_url_ignoring_the_pubkey() {
		let hex_pubkey = "a".repeat(128);
		let raw = format!("enode://{}@127.0.0.1:30304", hex_pubkey);
		let addr = parse_seed_addr(&raw).unwrap();
		assert_eq!(addr.0.port(), 30304);
	}

	#[test]
	fn rejects_malformed_enode_url() {
		assert!(parse_seed_addr("enode://missing-at-sign").is_err());
	}
}
