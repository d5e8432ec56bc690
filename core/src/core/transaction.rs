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

//! Transactions: nonce, gas price/limit, optional recipient, value, payload
//! and an ECDSA signature the sender is recovered from (§3).

use std::fmt;

use failure::Fail;
use primitive_types::U256;
use rlp::{DecoderError, Rlp, RlpStream};
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, Secp256k1};
use serde::{Deserialize, Serialize};

use crate::core::hash::{keccak256, Hash, Hashed};

/// A 20-byte account address, derived from the low-order bytes of the
/// keccak-256 hash of a public key.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(pub [u8; 20]);

impl fmt::Display for Address {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "0x")?;
		for byte in self.0.iter() {
			write!(f, "{:02x}", byte)?;
		}
		Ok(())
	}
}

impl fmt::Debug for Address {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Address({})", self)
	}
}

impl rlp::Encodable for Address {
	fn rlp_append(&self, s: &mut RlpStream) {
		s.encoder().encode_value(&self.0);
	}
}

impl rlp::Decodable for Address {
	fn decode(rlp: &Rlp<'_>) -> Result<Self, DecoderError> {
		let data = rlp.data()?;
		if data.len() != 20 {
			return Err(DecoderError::RlpIncorrectListLen);
		}
		let mut a = [0u8; 20];
		a.copy_from_slice(data);
		Ok(Address(a))
	}
}

/// Errors recovering or validating a transaction's sender.
#[derive(Debug, Fail, PartialEq, Eq)]
pub enum TransactionError {
	/// The (v, r, s) triple does not correspond to a valid recoverable
	/// signature over the transaction's signing hash.
	#[fail(display = "invalid transaction signature")]
	InvalidSignature,
	/// `v` was outside the two accepted recovery-id values.
	#[fail(display = "invalid recovery id {}", _0)]
	InvalidRecoveryId(u64),
}

/// A single transaction: nonce, gas price, gas limit, optional recipient
/// (`None` signals contract creation), value, payload and signature.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
	/// Sender-assigned sequence number, used for replay protection and
	/// ordering within the pool.
	pub nonce: u64,
	/// Price the sender is willing to pay per unit of gas.
	pub gas_price: U256,
	/// Maximum gas the transaction may consume.
	pub gas_limit: u64,
	/// Recipient address; `None` for a contract-creation transaction.
	pub to: Option<Address>,
	/// Amount transferred to `to`.
	pub value: U256,
	/// Call data or init code.
	pub data: Vec<u8>,
	/// Signature recovery id plus 27 (legacy encoding).
	pub v: u64,
	/// Signature r component.
	pub r: U256,
	/// Signature s component.
	pub s: U256,
}

impl Transaction {
	/// RLP-encodes the fields covered by the signature (everything except
	/// v, r, s), mirroring the wire/signing encoding split used throughout
	/// account-model chains.
	fn signing_payload(&self) -> RlpStream {
		let mut s = RlpStream::new();
		s.begin_list(6);
		s.append(&self.nonce);
		append_u256(&mut s, &self.gas_price);
		s.append(&self.gas_limit);
		match &self.to {
			Some(addr) => s.append(addr),
			None => s.append_empty_data(),
		};
		append_u256(&mut s, &self.value);
		s.append(&self.data);
		s
	}

	/// The hash signed over to produce (v, r, s).
	pub fn signing_hash(&self) -> Hash {
		keccak256(&self.signing_payload().out())
	}

	/// Recovers the sender address from the signature. Returns an error iff
	/// the signature is not a valid recoverable ECDSA signature over
	/// `signing_hash()` — i.e. sender is well-defined iff signature is valid
	/// (§3 invariant).
	pub fn sender(&self) -> Result<Address, TransactionError> {
		let recovery_id = if self.v >= 27 { self.v - 27 } else { self.v };
		let recovery_id = RecoveryId::from_i32(recovery_id as i32)
			.map_err(|_| TransactionError::InvalidRecoveryId(self.v))?;

		let mut sig_bytes = [0u8; 64];
		self.r.to_big_endian(&mut sig_bytes[0..32]);
		self.s.to_big_endian(&mut sig_bytes[32..64]);

		let sig = RecoverableSignature::from_compact(&sig_bytes, recovery_id)
			.map_err(|_| TransactionError::InvalidSignature)?;
		let msg = Message::from_digest_slice(self.signing_hash().as_bytes())
			.map_err(|_| TransactionError::InvalidSignature)?;

		let secp = Secp256k1::verification_only();
		let pubkey = secp
			.recover_ecdsa(&msg, &sig)
			.map_err(|_| TransactionError::InvalidSignature)?;

		let uncompressed = pubkey.serialize_uncompressed();
		// Address = low 20 bytes of keccak256(pubkey) over the 64-byte
		// X||Y encoding (the leading 0x04 prefix byte is dropped).
		let digest = keccak256(&uncompressed[1..]);
		let mut addr = [0u8; 20];
		addr.copy_from_slice(&digest.as_bytes()[12..]);
		Ok(Address(addr))
	}
}

fn append_u256(s: &mut RlpStream, v: &U256) {
	if v.is_zero() {
		s.append_empty_data();
		return;
	}
	let mut buf = [0u8; 32];
	v.to_big_endian(&mut buf);
	let first_nonzero = buf.iter().position(|&b| b != 0).unwrap_or(32);
	s.append(&&buf[first_nonzero..]);
}

fn decode_u256(rlp: &Rlp<'_>) -> Result<U256, DecoderError> {
	let data: Vec<u8> = rlp.as_val()?;
	Ok(U256::from_big_endian(&data))
}

impl rlp::Encodable for Transaction {
	fn rlp_append(&self, s: &mut RlpStream) {
		s.begin_list(9);
		s.append(&self.nonce);
		append_u256(s, &self.gas_price);
		s.append(&self.gas_limit);
		match &self.to {
			Some(addr) => s.append(addr),
			None => s.append_empty_data(),
		};
		append_u256(s, &self.value);
		s.append(&self.data);
		s.append(&self.v);
		append_u256(s, &self.r);
		append_u256(s, &self.s);
	}
}

impl rlp::Decodable for Transaction {
	fn decode(rlp: &Rlp<'_>) -> Result<Self, DecoderError> {
		if rlp.item_count()? != 9 {
			return Err(DecoderError::RlpIncorrectListLen);
		}
		let to_rlp = rlp.at(3)?;
		let to = if to_rlp.is_empty() {
			None
		} else {
			Some(to_rlp.as_val()?)
		};
		Ok(Transaction {
			nonce: rlp.val_at(0)?,
			gas_price: decode_u256(&rlp.at(1)?)?,
			gas_limit: rlp.val_at(2)?,
			to,
			value: decode_u256(&rlp.at(4)?)?,
			data: rlp.val_at(5)?,
			v: rlp.val_at(6)?,
			r: decode_u256(&rlp.at(7)?)?,
			s: decode_u256(&rlp.at(8)?)?,
		})
	}
}

impl Hashed for Transaction {}

impl fmt::Debug for Transaction {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Transaction")
			.field("nonce", &self.nonce)
			.field("to", &self.to)
			.field("value", &self.value)
			.field("hash", &self.hash())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use secp256k1::SecretKey;

	fn sign(tx: &Transaction, sk: &SecretKey) -> Transaction {
		let secp = Secp256k1::signing_only();
		let msg = Message::from_digest_slice(tx.signing_hash().as_bytes()).unwrap();
		let (recovery_id, sig_bytes) = secp.sign_ecdsa_recoverable(&msg, sk).serialize_compact();
		let mut signed = tx.clone();
		signed.v = recovery_id.to_i32() as u64 + 27;
		signed.r = U256::from_big_endian(&sig_bytes[0..32]);
		signed.s = U256::from_big_endian(&sig_bytes[32..64]);
		signed
	}

	fn sample(nonce: u64) -> Transaction {
		Transaction {
			nonce,
			gas_price: U256::from(1_000_000_000u64),
			gas_limit: 21_000,
			to: Some(Address([0x11u8; 20])),
			value: U256::from(1_000u64),
			data: vec![],
			v: 0,
			r: U256::zero(),
			s: U256::zero(),
		}
	}

	#[test]
	fn sender_recovers_to_signer() {
		let secp = Secp256k1::new();
		let sk = SecretKey::from_slice(&[0x42u8; 32]).unwrap();
		let pubkey = secp256k1::PublicKey::from_secret_key(&secp, &sk);
		let uncompressed = pubkey.serialize_uncompressed();
		let digest = keccak256(&uncompressed[1..]);
		let mut expected = [0u8; 20];
		expected.copy_from_slice(&digest.as_bytes()[12..]);

		let tx = sign(&sample(0), &sk);
		assert_eq!(tx.sender().unwrap(), Address(expected));
	}

	#[test]
	fn tampered_payload_never_recovers_original_sender() {
		let secp = Secp256k1::new();
		let sk = SecretKey::from_slice(&[0x42u8; 32]).unwrap();
		let pubkey = secp256k1::PublicKey::from_secret_key(&secp, &sk);
		let uncompressed = pubkey.serialize_uncompressed();
		let digest = keccak256(&uncompressed[1..]);
		let mut original_sender = [0u8; 20];
		original_sender.copy_from_slice(&digest.as_bytes()[12..]);

		let mut tx = sign(&sample(0), &sk);
		// Mutate the signed payload without re-signing: recovery either
		// fails outright or silently yields a different address — never
		// the original signer's.
		tx.value = tx.value + U256::from(1u64);
		if let Ok(addr) = tx.sender() {
			assert_ne!(addr, Address(original_sender));
		}
	}

	#[test]
	fn rlp_round_trips() {
		let secp = Secp256k1::new();
		let sk = SecretKey::from_slice(&[0x7au8; 32]).unwrap();
		let tx = sign(&sample(7), &sk);
		let encoded = rlp::encode(&tx);
		let decoded: Transaction = rlp::decode(&encoded).unwrap();
		assert_eq!(tx, decoded);
		assert_eq!(tx.hash(), decoded.hash());
	}

	#[test]
	fn contract_creation_round_trips_with_no_recipient() {
		let mut tx = sample(1);
		tx.to = None;
		let encoded = rlp::encode(&tx);
		let decoded: Transaction = rlp::decode(&encoded).unwrap();
		assert_eq!(decoded.to, None);
	}
}
