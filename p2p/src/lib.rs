// Copyright 2016 The Grin Developers
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

//! Peer-to-peer networking (SPEC_FULL §4.1-4.3): the peer registry (C1),
//! message meter (C2), and protocol handler (C3). The downloader (C4) and
//! fetcher (C5) in `krypton_sync` build on top of the types exported here
//! without this crate depending back on them -- the seam is
//! [`types::ChainAdapter`].

#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(unused_mut)]

pub mod conn;
pub mod meter;
pub mod msg;
pub mod peer;
pub mod peers;
pub mod server;
pub mod store;
pub mod types;

pub use crate::conn::Connection;
pub use crate::meter::{Bucket, MessageMeter};
pub use crate::msg::{Code, Message, Status, PROTOCOL_V62, PROTOCOL_V63, PROTOCOL_VERSION};
pub use crate::peer::{Peer, RequestKind};
pub use crate::peers::Peers;
pub use crate::server::{Handshaker, Server};
pub use crate::store::{PeerData, PeerState, PeerStore};
pub use crate::types::{Capabilities, ChainAdapter, Error, PeerAddr, PeerInfo};
