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

//! The block chain itself: validates and persists new blocks, tracks the
//! canonical head, and parks out-of-order arrivals until their parent
//! shows up.

#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(unused_mut)]
#![warn(missing_docs)]

mod chain;
pub mod error;
pub mod pipe;
pub mod store;
pub mod types;
pub mod upgrade;

pub use crate::chain::Chain;
pub use crate::error::Error;
pub use crate::store::LmdbChainStore;
pub use crate::types::{
	ChainAdapter, ChainStore, ExecError, ExecutionOutcome, ExecutorHandle, NoopAdapter, NoopExecutor, Options, Tip,
};
