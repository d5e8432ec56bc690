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

//! Header/body/state sync (§4.4-4.7): the downloader, the fetcher, the
//! event bus, and the coordinator tying them to `krypton_chain`,
//! `krypton_pool` and `krypton_p2p` through [`adapter::NetworkAdapter`].

#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(unused_mut)]
#![warn(missing_docs)]

pub mod adapter;
pub mod coordinator;
pub mod downloader;
pub mod error;
pub mod event_bus;
pub mod fetcher;
pub mod response_router;
pub mod state;

pub use adapter::NetworkAdapter;
pub use coordinator::Coordinator;
pub use downloader::{DownloaderConfig, Syncer};
pub use error::SyncError;
pub use event_bus::{Event, EventBus, EventKind, EventReceiver};
pub use fetcher::{Fetcher, FetcherConfig};
pub use response_router::ResponseRouter;
pub use state::{Progress, SyncState, SyncStatus, SyncSubState};
