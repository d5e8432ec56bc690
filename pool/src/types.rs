// Copyright 2017 The Grin Developers
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

//! The transaction pool seam (SPEC_FULL §2): named by role only, the real
//! pool (validity against current state, replacement rules, eviction under
//! pressure) is a separate subsystem this workspace doesn't implement. What
//! it does specify is the interface the sync layer needs: a place to hand
//! newly-received transactions, and a feed of ones the pool decided to
//! accept, for propagation (§4.5).

use failure::Fail;

use krypton_core::core::transaction::{Transaction, TransactionError};

/// Errors a pool can report for a rejected transaction.
#[derive(Debug, Fail)]
pub enum PoolError {
	/// The transaction's signature didn't recover to a valid sender.
	#[fail(display = "invalid transaction: {}", _0)]
	InvalidTransaction(#[fail(cause)] TransactionError),
	/// This exact transaction (by hash) is already held.
	#[fail(display = "transaction already in pool")]
	AlreadyInPool,
	/// The pool is at capacity and this transaction didn't outbid anything
	/// evictable.
	#[fail(display = "pool full")]
	Full,
}

impl From<TransactionError> for PoolError {
	fn from(e: TransactionError) -> PoolError {
		PoolError::InvalidTransaction(e)
	}
}

/// Where an incoming transaction came from, mirroring the distinction the
/// propagation policy in §4.5 cares about: transactions announced by a peer
/// are handled differently (DOS-capped, filtered) from ones submitted
/// locally (e.g. via RPC).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxSource {
	/// Received from a peer over the wire.
	Peer,
	/// Submitted locally (RPC, in-process caller).
	Local,
}

/// The transaction pool seam. `insert` is the only mutation; acceptance is
/// observed through `subscribe`, not through `insert`'s return value, so
/// that propagation (broadcasting an accepted transaction to other peers)
/// never needs to poll.
pub trait TransactionPool: Send + Sync {
	/// Validates and admits `tx`, or rejects it with a [`PoolError`].
	fn insert(&self, tx: Transaction, source: TxSource) -> Result<(), PoolError>;
	/// Registers a new subscriber that receives every transaction this pool
	/// subsequently accepts. Each subscriber gets its own channel; a slow
	/// subscriber only risks lagging its own feed, never the pool itself
	/// (same drop-or-buffer discipline as the event bus, §4.6).
	fn subscribe(&self) -> crossbeam_channel::Receiver<Transaction>;
	/// Number of transactions currently held.
	fn len(&self) -> usize;
	/// Whether the pool holds no transactions.
	fn is_empty(&self) -> bool {
		self.len() == 0
	}
}
