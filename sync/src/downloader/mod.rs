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

//! C4, the downloader (§4.4): ancestor search, header skeleton, body
//! fill, and state-node best-effort fetch, driven one round at a time by
//! [`syncer::Syncer`]. The header and body phases each spread their work
//! across every idle, non-banned peer in [`krypton_p2p::Peers`] rather
//! than just the round's master -- a shared work queue of chunks, an
//! in-flight map keyed by peer address, and a staging buffer that
//! reassembles completed chunks back into order (§4.4 "many helpers...
//! in parallel").

pub mod ancestor;
pub mod body_sync;
pub mod header_sync;
pub mod helpers;
pub mod state_sync;
pub mod syncer;

pub use helpers::DownloaderConfig;
pub use syncer::Syncer;
