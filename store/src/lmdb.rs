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

//! LMDB-backed implementation of the ordered byte-keyed store. Generalized
//! from the original Writeable/Readable-specific wrapper to RLP
//! `Encodable`/`Decodable`, since Krypton's wire and persisted types are
//! RLP-encoded (SPEC_FULL §3), not the MimbleWimble-specific binary format
//! this module was originally written against.

use std::fs;
use std::marker;
use std::sync::Arc;

use failure::Fail;
use lmdb_zero as lmdb;
use lmdb_zero::traits::CreateCursor;
use lmdb_zero::LmdbResultExt;

/// Errors returned by the store.
#[derive(Debug, Fail)]
pub enum Error {
	/// The requested key was not present.
	#[fail(display = "not found: {}", _0)]
	NotFoundErr(String),
	/// The underlying LMDB call failed.
	#[fail(display = "lmdb error: {}", _0)]
	LmdbErr(lmdb::error::Error),
	/// An RLP-encoded value failed to decode.
	#[fail(display = "decode error: {}", _0)]
	DecodeErr(String),
}

impl From<lmdb::error::Error> for Error {
	fn from(e: lmdb::error::Error) -> Error {
		Error::LmdbErr(e)
	}
}

/// Turns a missing-value `Ok(None)` into a `NotFoundErr`, leaving other
/// outcomes untouched. Convenient at call sites that require a value.
pub fn option_to_not_found<T>(res: Result<Option<T>, Error>, field_name: &str) -> Result<T, Error> {
	match res {
		Ok(None) => Err(Error::NotFoundErr(field_name.to_owned())),
		Ok(Some(o)) => Ok(o),
		Err(e) => Err(e),
	}
}

/// Creates a new LMDB environment under the given data directory, ready to
/// open named databases ("columns") from.
pub fn new_env(path: String) -> lmdb::Environment {
	let full_path = path + "/lmdb";
	fs::create_dir_all(&full_path).unwrap();
	unsafe {
		let mut env_builder = lmdb::EnvBuilder::new().unwrap();
		env_builder.set_maxdbs(8).unwrap();
		// Half a TB should give us plenty of headroom; an issue only on
		// 32-bit targets, which this workspace doesn't support anyway.
		env_builder.set_mapsize(549_755_813_888).unwrap_or_else(|e| {
			panic!("unable to reserve LMDB address space: {:?}", e);
		});
		env_builder
			.open(&full_path, lmdb::open::Flags::empty(), 0o600)
			.unwrap()
	}
}

/// Ordered byte-keyed store backed by a single LMDB named database. All
/// writes go through [`Batch`], which commits atomically.
pub struct Store {
	env: Arc<lmdb::Environment>,
	db: Arc<lmdb::Database<'static>>,
}

impl Store {
	/// Opens (creating if absent) the named database under `env`.
	pub fn open(env: Arc<lmdb::Environment>, name: &str) -> Store {
		let db = Arc::new(
			lmdb::Database::open(
				env.clone(),
				Some(name),
				&lmdb::DatabaseOptions::new(lmdb::db::CREATE),
			)
			.unwrap(),
		);
		Store { env, db }
	}

	/// Raw byte get.
	pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
		let txn = lmdb::ReadTransaction::new(self.env.clone())?;
		let access = txn.access();
		let res: lmdb::error::Result<&[u8]> = access.get(&self.db, key);
		res.map(|res| res.to_vec()).to_opt().map_err(From::from)
	}

	/// Gets and RLP-decodes a value.
	pub fn get_ser<T: rlp::Decodable>(&self, key: &[u8]) -> Result<Option<T>, Error> {
		let txn = lmdb::ReadTransaction::new(self.env.clone())?;
		let access = txn.access();
		self.get_ser_access(key, &access)
	}

	fn get_ser_access<T: rlp::Decodable>(
		&self,
		key: &[u8],
		access: &lmdb::ConstAccessor,
	) -> Result<Option<T>, Error> {
		let res: lmdb::error::Result<&[u8]> = access.get(&self.db, key);
		match res.to_opt() {
			Ok(Some(bytes)) => {
				let decoded = rlp::decode(bytes).map_err(|e| Error::DecodeErr(e.to_string()))?;
				Ok(Some(decoded))
			}
			Ok(None) => Ok(None),
			Err(e) => Err(From::from(e)),
		}
	}

	/// Whether `key` is present.
	pub fn exists(&self, key: &[u8]) -> Result<bool, Error> {
		let txn = lmdb::ReadTransaction::new(self.env.clone())?;
		let access = txn.access();
		let res: lmdb::error::Result<&lmdb::Ignore> = access.get(&self.db, key);
		res.to_opt().map(|r| r.is_some()).map_err(From::from)
	}

	/// Iterates RLP-decoded values forward from `from` (inclusive), while
	/// the key shares `from`'s prefix.
	pub fn iter<T: rlp::Decodable>(&self, from: &[u8]) -> Result<SerIterator<T>, Error> {
		let txn = Arc::new(lmdb::ReadTransaction::new(self.env.clone())?);
		let cursor = Arc::new(txn.cursor(self.db.clone()).unwrap());
		Ok(SerIterator {
			tx: txn,
			cursor,
			seek: false,
			prefix: from.to_vec(),
			_marker: marker::PhantomData,
		})
	}

	/// Opens a new atomic write batch against this store.
	pub fn batch(&self) -> Result<Batch, Error> {
		let txn = lmdb::WriteTransaction::new(self.env.clone())?;
		Ok(Batch { store: self, tx: txn })
	}
}

/// A set of writes committed to the store atomically (§4.1's "mutation is
/// serialized" and the chain store's atomic-batch requirement, §3).
pub struct Batch<'a> {
	store: &'a Store,
	tx: lmdb::WriteTransaction<'a>,
}

impl<'a> Batch<'a> {
	/// Raw byte put.
	pub fn put(&self, key: &[u8], value: Vec<u8>) -> Result<(), Error> {
		self.tx
			.access()
			.put(&self.store.db, key, &value, lmdb::put::Flags::empty())?;
		Ok(())
	}

	/// RLP-encodes `value` and writes it under `key`.
	pub fn put_ser<W: rlp::Encodable>(&self, key: &[u8], value: &W) -> Result<(), Error> {
		self.put(key, rlp::encode(value).to_vec())
	}

	/// Reads through to the store (does not see this batch's own
	/// uncommitted writes).
	pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
		self.store.get(key)
	}

	/// Whether `key` is present, as seen by the store (not this batch).
	pub fn exists(&self, key: &[u8]) -> Result<bool, Error> {
		self.store.exists(key)
	}

	/// See [`Store::iter`].
	pub fn iter<T: rlp::Decodable>(&self, from: &[u8]) -> Result<SerIterator<T>, Error> {
		self.store.iter(from)
	}

	/// Gets an RLP-decoded value, taking this batch's own writes into
	/// account (unlike [`Batch::get`]).
	pub fn get_ser<T: rlp::Decodable>(&self, key: &[u8]) -> Result<Option<T>, Error> {
		let access = self.tx.access();
		self.store.get_ser_access(key, &access)
	}

	/// Deletes `key`.
	pub fn delete(&self, key: &[u8]) -> Result<(), Error> {
		self.tx.access().del_key(&self.store.db, key)?;
		Ok(())
	}

	/// Commits the batch atomically.
	pub fn commit(self) -> Result<(), Error> {
		self.tx.commit()?;
		Ok(())
	}

	/// Creates a nested batch that merges into this one on commit, and is
	/// abandoned (without affecting the parent) otherwise.
	pub fn child(&mut self) -> Result<Batch, Error> {
		Ok(Batch {
			store: self.store,
			tx: self.tx.child_tx()?,
		})
	}
}

/// Iterator over RLP-decoded values sharing a key prefix.
pub struct SerIterator<T>
where
	T: rlp::Decodable,
{
	tx: Arc<lmdb::ReadTransaction<'static>>,
	cursor: Arc<lmdb::Cursor<'static, 'static>>,
	seek: bool,
	prefix: Vec<u8>,
	_marker: marker::PhantomData<T>,
}

impl<T> Iterator for SerIterator<T>
where
	T: rlp::Decodable,
{
	type Item = T;

	fn next(&mut self) -> Option<T> {
		let access = self.tx.access();
		let kv = if self.seek {
			Arc::get_mut(&mut self.cursor).unwrap().next(&access)
		} else {
			self.seek = true;
			Arc::get_mut(&mut self.cursor)
				.unwrap()
				.seek_range_k(&access, &self.prefix[..])
		};
		self.deser_if_prefix_match(kv)
	}
}

impl<T> SerIterator<T>
where
	T: rlp::Decodable,
{
	fn deser_if_prefix_match(&self, kv: Result<(&[u8], &[u8]), lmdb::Error>) -> Option<T> {
		match kv {
			Ok((k, v)) => {
				let plen = self.prefix.len();
				if plen == 0 || k[0..plen] == self.prefix[..] {
					rlp::decode(v).ok()
				} else {
					None
				}
			}
			Err(_) => None,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Arc;

	fn open_store() -> (tempfile::TempDir, Store) {
		let dir = tempfile::tempdir().unwrap();
		let env = Arc::new(new_env(dir.path().to_str().unwrap().to_owned()));
		let store = Store::open(env, "test_col");
		(dir, store)
	}

	#[test]
	fn put_then_get_round_trips() {
		let (_dir, store) = open_store();
		let batch = store.batch().unwrap();
		batch.put(b"k1", b"v1".to_vec()).unwrap();
		batch.commit().unwrap();
		assert_eq!(store.get(b"k1").unwrap(), Some(b"v1".to_vec()));
	}

	#[test]
	fn uncommitted_batch_is_invisible() {
		let (_dir, store) = open_store();
		let batch = store.batch().unwrap();
		batch.put(b"k1", b"v1".to_vec()).unwrap();
		assert_eq!(store.get(b"k1").unwrap(), None);
	}

	#[test]
	fn delete_removes_key() {
		let (_dir, store) = open_store();
		let batch = store.batch().unwrap();
		batch.put(b"k1", b"v1".to_vec()).unwrap();
		batch.commit().unwrap();

		let batch = store.batch().unwrap();
		batch.delete(b"k1").unwrap();
		batch.commit().unwrap();
		assert!(!store.exists(b"k1").unwrap());
	}

	#[test]
	fn iter_respects_prefix() {
		let (_dir, store) = open_store();
		let batch = store.batch().unwrap();
		batch.put_ser(b"a:1", &7u64).unwrap();
		batch.put_ser(b"a:2", &8u64).unwrap();
		batch.put_ser(b"b:1", &9u64).unwrap();
		batch.commit().unwrap();

		let vals: Vec<u64> = store.iter(b"a:").unwrap().collect();
		assert_eq!(vals, vec![7u64, 8u64]);
	}
}
