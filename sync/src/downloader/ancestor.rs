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

//! The `FindingAncestor` sub-state (§4.4): binary search, bounded by the
//! finality window, for the highest height at which our canonical chain
//! and the master peer's agree. A peer that forked deeper than the
//! finality window back is treated as unreconcilable rather than walked
//! all the way to genesis.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::select;

use krypton_chain::Chain;
use krypton_core::consensus::FINALITY_CONFIRMATIONS;
use krypton_core::core::block::BlockHeader;
use krypton_core::core::hash::Hashed;
use krypton_p2p::msg::GetBlockHeaders;
use krypton_p2p::Peer;
use krypton_util::CancelToken;

use crate::error::SyncError;
use crate::response_router::ResponseRouter;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Finds the highest block both we and `peer` agree on, searching back at
/// most `FINALITY_CONFIRMATIONS` blocks from our current head.
pub fn find_common_ancestor(
	chain: &Chain,
	peer: &Arc<Peer>,
	router: &ResponseRouter,
	cancel: &CancelToken,
) -> Result<BlockHeader, SyncError> {
	let head = chain.head()?;
	let lo_bound = head.height.saturating_sub(FINALITY_CONFIRMATIONS);

	if !is_common(chain, peer, router, cancel, lo_bound)? {
		return Err(SyncError::AncestorNotFound);
	}

	let mut lo = lo_bound;
	let mut hi = head.height;
	while lo < hi {
		let mid = lo + (hi - lo + 1) / 2;
		if is_common(chain, peer, router, cancel, mid)? {
			lo = mid;
		} else {
			hi = mid - 1;
		}
	}
	Ok(chain.get_header_by_height(lo)?)
}

fn is_common(
	chain: &Chain,
	peer: &Arc<Peer>,
	router: &ResponseRouter,
	cancel: &CancelToken,
	height: u64,
) -> Result<bool, SyncError> {
	let ours = chain.get_header_by_height(height)?;
	match request_header_at(peer, router, cancel, height)? {
		Some(theirs) => Ok(theirs.hash() == ours.hash()),
		None => Ok(false),
	}
}

fn request_header_at(
	peer: &Arc<Peer>,
	router: &ResponseRouter,
	cancel: &CancelToken,
	height: u64,
) -> Result<Option<BlockHeader>, SyncError> {
	let rx = router.await_headers(peer.addr());
	peer.send_get_block_headers(GetBlockHeaders {
		start_hash: None,
		start_number: height,
		max_headers: 1,
		skip: 0,
		reverse: false,
	})
	.map_err(|_| SyncError::PeerFault(peer.addr()))?;

	let on_cancel = cancel.on_cancel();
	select! {
		recv(rx) -> msg => match msg {
			Ok(mut headers) => Ok(headers.pop()),
			Err(_) => Err(SyncError::PeerFault(peer.addr())),
		},
		recv(on_cancel) -> _ => Err(SyncError::Cancelled),
		default(PROBE_TIMEOUT) => Err(SyncError::Timeout),
	}
}
