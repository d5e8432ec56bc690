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

//! Startup upgrade pass: walks the canonical chain once, checking every
//! block's header/height mapping resolves, and records how far it got so
//! a restart resumes instead of redoing the walk. Stands in for the two
//! startup gates named by the node this is generalized from (a schema
//! version bump and a log-bloom mipmap reindex): both are, structurally,
//! "touch every block once, remember where you stopped".

use krypton_core::core::hash::Hashed;

use crate::types::ChainStore;
use crate::Error;

/// Runs the upgrade pass against `store`, resuming from its persisted
/// cursor. A no-op if the cursor is already at the chain head.
pub fn run(store: &dyn ChainStore) -> Result<(), Error> {
	let head = store.head()?;
	let start = store.upgrade_cursor()?.map(|h| h + 1).unwrap_or(0);

	if start > head.height {
		return Ok(());
	}

	for height in start..=head.height {
		let header = store.get_header_by_height(height)?;
		if header.number != height {
			return Err(Error::from(krypton_store::Error::NotFoundErr("upgrade: height/number mismatch".to_owned())));
		}
		let _ = header.hash();
	}

	store.set_upgrade_cursor(head.height)?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use krypton_core::core::difficulty::Difficulty;
	use krypton_core::core::genesis::genesis_block;
	use krypton_core::global::ChainType;

	use crate::store::LmdbChainStore;
	use crate::types::Tip;

	fn seeded_store() -> (tempfile::TempDir, LmdbChainStore) {
		let dir = tempfile::tempdir().unwrap();
		let store = LmdbChainStore::new(dir.path().to_str().unwrap());
		let genesis = genesis_block(ChainType::AutomatedTesting);
		store.save_block(&genesis, Difficulty::min()).unwrap();
		store.set_canonical_chain(&genesis.header, 0).unwrap();
		store.save_head(&Tip::new(genesis.hash(), Difficulty::min())).unwrap();
		(dir, store)
	}

	#[test]
	fn runs_from_scratch_and_records_cursor() {
		let (_dir, store) = seeded_store();
		assert_eq!(store.upgrade_cursor().unwrap(), None);
		run(&store).unwrap();
		assert_eq!(store.upgrade_cursor().unwrap(), Some(0));
	}

	#[test]
	fn second_run_is_a_cheap_no_op() {
		let (_dir, store) = seeded_store();
		run(&store).unwrap();
		run(&store).unwrap();
		assert_eq!(store.upgrade_cursor().unwrap(), Some(0));
	}
}
