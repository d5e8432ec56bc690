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

//! The node's top-level error type: every collaborator crate's error
//! composes into this one `Fail` via `From`, the same flattening the
//! teacher's binary crate does at the workspace root.

use failure::Fail;

/// Everything that can go wrong bringing a node up or keeping it running.
#[derive(Debug, Fail)]
pub enum Error {
	/// Chain storage or validation pipeline failure.
	#[fail(display = "chain error: {}", _0)]
	Chain(#[fail(cause)] krypton_chain::Error),
	/// Listener bind/connect/handshake failure.
	#[fail(display = "p2p error: {}", _0)]
	P2p(#[fail(cause)] krypton_p2p::Error),
	/// Binding the JSON-RPC HTTP listener failed.
	#[fail(display = "rpc server error: {}", _0)]
	Rpc(String),
	/// Underlying OS-level I/O failure (binding a socket, creating the
	/// data directory, ...).
	#[fail(display = "io error: {}", _0)]
	Io(#[fail(cause)] std::io::Error),
	/// Another process already holds the exclusive lock on `db_root`
	/// (§Scenario F: two nodes started against the same data directory).
	#[fail(display = "failed to lock {} (krypton node already running against this data directory?)", _0)]
	AlreadyRunning(String),
}

impl From<krypton_chain::Error> for Error {
	fn from(e: krypton_chain::Error) -> Error {
		Error::Chain(e)
	}
}

impl From<krypton_p2p::Error> for Error {
	fn from(e: krypton_p2p::Error) -> Error {
		Error::P2p(e)
	}
}

impl From<std::io::Error> for Error {
	fn from(e: std::io::Error) -> Error {
		Error::Io(e)
	}
}
