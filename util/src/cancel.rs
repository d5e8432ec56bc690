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

//! A cancellation primitive observed at every suspension point of the
//! downloader, fetcher and protocol handler. Generalizes the `Arc<AtomicBool>`
//! stop flags threaded through the sync loop (`servers::grin::sync::syncer`)
//! into something that can also be `select!`-ed on alongside channel recvs,
//! which a bare `AtomicBool` cannot do.

use crate::Mutex;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cancellation token. Cheap to clone; all clones observe the same signal.
/// Firing is idempotent: calling `cancel()` twice is a no-op the second time.
#[derive(Clone)]
pub struct CancelToken {
	flag: Arc<AtomicBool>,
	// Held open until `cancel()` drops it; dropping closes every clone of
	// `close_rx`, waking any `select!` parked on `on_cancel()`.
	close_tx: Arc<Mutex<Option<Sender<()>>>>,
	close_rx: Receiver<()>,
}

impl CancelToken {
	/// Builds a fresh, un-cancelled token.
	pub fn new() -> CancelToken {
		let (tx, rx) = bounded(0);
		CancelToken {
			flag: Arc::new(AtomicBool::new(false)),
			close_tx: Arc::new(Mutex::new(Some(tx))),
			close_rx: rx,
		}
	}

	/// Fires the token. Safe to call from any thread, any number of times.
	pub fn cancel(&self) {
		if !self.flag.swap(true, Ordering::SeqCst) {
			// Drop the sender to close the channel; all `on_cancel()`
			// receivers immediately observe a closed channel.
			self.close_tx.lock().take();
		}
	}

	/// Non-blocking check, for code that polls rather than selects.
	pub fn is_cancelled(&self) -> bool {
		self.flag.load(Ordering::SeqCst)
	}

	/// A receiver that becomes ready (with a disconnect) the moment the
	/// token is cancelled. Intended for use inside `crossbeam_channel::select!`
	/// alongside a task's real work channels.
	pub fn on_cancel(&self) -> Receiver<()> {
		self.close_rx.clone()
	}
}

impl Default for CancelToken {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crossbeam_channel::select;
	use std::thread;
	use std::time::Duration;

	#[test]
	fn cancel_is_idempotent_and_observed_by_clones() {
		let token = CancelToken::new();
		let clone = token.clone();
		assert!(!token.is_cancelled());
		token.cancel();
		token.cancel();
		assert!(clone.is_cancelled());
	}

	#[test]
	fn select_wakes_on_cancel() {
		let token = CancelToken::new();
		let (tx, work) = bounded::<()>(1);
		let t2 = token.clone();
		let handle = thread::spawn(move || {
			let on_cancel = t2.on_cancel();
			loop {
				select! {
					recv(work) -> _ => continue,
					recv(on_cancel) -> _ => return,
				}
			}
		});
		thread::sleep(Duration::from_millis(20));
		token.cancel();
		handle.join().unwrap();
		drop(tx);
	}
}
