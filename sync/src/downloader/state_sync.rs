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

//! State-node retrieval (protocol 63+ `GetNodeData`), present for parity
//! with the body/receipt queues (§4.4: "same scheduling discipline as
//! body_sync") but deliberately thin: the state executor that would turn
//! these bytes into a usable trie is named by role only and out of scope
//! (`krypton_chain::ExecutorHandle`), so a full sync round reconstructs
//! state by executing every historical block instead of snapshot-syncing
//! a trie. `body_sync` calls this on a best-effort basis against whatever
//! helper is idle after each imported block, fetching and counting nodes
//! without persisting them anywhere -- real exercise of the wire path for
//! a future executor that wants true snapshot sync.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::select;

use krypton_core::core::hash::Hash;
use krypton_p2p::Peer;
use krypton_util::CancelToken;

use crate::error::SyncError;
use crate::response_router::ResponseRouter;

const NODE_BATCH_TIMEOUT: Duration = Duration::from_secs(20);

/// Requests `hashes`' raw trie node bytes from `peer` and returns them in
/// request order, or an error if the round should abort. Callers that
/// don't need snapshot sync (the normal case here, §above) simply never
/// call this.
pub fn fetch_nodes(
	peer: &Arc<Peer>,
	router: &ResponseRouter,
	cancel: &CancelToken,
	hashes: Vec<Hash>,
) -> Result<Vec<Vec<u8>>, SyncError> {
	let rx = router.await_node_data(peer.addr());
	peer.send_get_node_data(hashes).map_err(|_| SyncError::PeerFault(peer.addr()))?;

	let on_cancel = cancel.on_cancel();
	select! {
		recv(rx) -> msg => msg.map_err(|_| SyncError::PeerFault(peer.addr())),
		recv(on_cancel) -> _ => Err(SyncError::Cancelled),
		default(NODE_BATCH_TIMEOUT) => Err(SyncError::Timeout),
	}
}
