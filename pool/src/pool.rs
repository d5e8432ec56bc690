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

//! A minimal in-memory [`TransactionPool`] used for wiring the binary and
//! for tests. It checks signature validity and de-duplicates by hash but
//! does nothing else a production pool would (no nonce ordering, no gas
//! price replacement, no eviction) — those belong to the subsystem this
//! crate only specifies the seam for.

use std::collections::HashSet;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

use krypton_core::core::hash::{Hash, Hashed};
use krypton_core::core::transaction::Transaction;

use crate::types::{PoolError, TransactionPool, TxSource};

const MAX_POOL_SIZE: usize = 20_000;

struct Inner {
	seen: HashSet<Hash>,
	subscribers: Vec<Sender<Transaction>>,
}

/// Reference in-memory transaction pool.
pub struct MemoryPool {
	inner: Mutex<Inner>,
}

impl MemoryPool {
	/// An empty pool with no subscribers.
	pub fn new() -> MemoryPool {
		MemoryPool {
			inner: Mutex::new(Inner {
				seen: HashSet::new(),
				subscribers: Vec::new(),
			}),
		}
	}
}

impl Default for MemoryPool {
	fn default() -> MemoryPool {
		MemoryPool::new()
	}
}

impl TransactionPool for MemoryPool {
	fn insert(&self, tx: Transaction, _source: TxSource) -> Result<(), PoolError> {
		tx.sender()?;

		let hash = tx.hash();
		let mut inner = self.inner.lock();
		if inner.seen.contains(&hash) {
			return Err(PoolError::AlreadyInPool);
		}
		if inner.seen.len() >= MAX_POOL_SIZE {
			return Err(PoolError::Full);
		}
		inner.seen.insert(hash);
		inner.subscribers.retain(|s| s.send(tx.clone()).is_ok());
		Ok(())
	}

	fn subscribe(&self) -> Receiver<Transaction> {
		let (tx, rx) = crossbeam_channel::unbounded();
		self.inner.lock().subscribers.push(tx);
		rx
	}

	fn len(&self) -> usize {
		self.inner.lock().seen.len()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use primitive_types::U256;
	use secp256k1::{Message, Secp256k1, SecretKey};

	fn signed(nonce: u64, sk: &SecretKey) -> Transaction {
		let tx = Transaction {
			nonce,
			gas_price: U256::from(1u64),
			gas_limit: 21_000,
			to: None,
			value: U256::zero(),
			data: vec![],
			v: 0,
			r: U256::zero(),
			s: U256::zero(),
		};
		let secp = Secp256k1::signing_only();
		let msg = Message::from_digest_slice(tx.signing_hash().as_bytes()).unwrap();
		let (recovery_id, sig_bytes) = secp.sign_ecdsa_recoverable(&msg, sk).serialize_compact();
		let mut signed = tx;
		signed.v = recovery_id.to_i32() as u64 + 27;
		signed.r = U256::from_big_endian(&sig_bytes[0..32]);
		signed.s = U256::from_big_endian(&sig_bytes[32..64]);
		signed
	}

	#[test]
	fn duplicate_transaction_is_rejected() {
		let pool = MemoryPool::new();
		let sk = SecretKey::from_slice(&[0x11u8; 32]).unwrap();
		let tx = signed(0, &sk);

		pool.insert(tx.clone(), TxSource::Peer).unwrap();
		assert_eq!(pool.len(), 1);
		let err = pool.insert(tx, TxSource::Peer).unwrap_err();
		assert!(matches!(err, PoolError::AlreadyInPool));
	}

	#[test]
	fn subscriber_receives_accepted_transaction() {
		let pool = MemoryPool::new();
		let rx = pool.subscribe();
		let sk = SecretKey::from_slice(&[0x22u8; 32]).unwrap();
		let tx = signed(0, &sk);

		pool.insert(tx.clone(), TxSource::Local).unwrap();
		let received = rx.try_recv().unwrap();
		assert_eq!(received.hash(), tx.hash());
	}

	#[test]
	fn unsigned_transaction_is_rejected() {
		let pool = MemoryPool::new();
		let tx = Transaction {
			nonce: 0,
			gas_price: U256::from(1u64),
			gas_limit: 21_000,
			to: None,
			value: U256::zero(),
			data: vec![],
			v: 0,
			r: U256::zero(),
			s: U256::zero(),
		};
		assert!(pool.insert(tx, TxSource::Peer).is_err());
	}
}
