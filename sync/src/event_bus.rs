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

//! C6, the event bus (§4.7, §9 open question 3): typed publish-subscribe
//! with per-type fan-out. Each subscriber gets a bounded, drop-oldest
//! queue plus a `dropped_total` counter rather than backpressuring the
//! publisher -- a slow RPC subscription must never stall block import.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;

use krypton_core::core::block::Block;
use krypton_core::core::transaction::Transaction;
use krypton_chain::Tip;

/// How many not-yet-consumed events a single subscriber may hold before
/// the oldest is dropped to make room for the newest (§9 resolution 3).
pub const SUBSCRIBER_CAPACITY: usize = 256;

/// An event posted to the bus.
#[derive(Clone, Debug)]
pub enum Event {
	/// A block this node produced or imported as the new head.
	NewMinedBlock(Block),
	/// A transaction accepted into the pool.
	NewTransaction(Transaction),
	/// The canonical head changed.
	ChainHead(Tip),
}

/// The type tag a subscriber registers interest in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
	/// See [`Event::NewMinedBlock`].
	NewMinedBlock,
	/// See [`Event::NewTransaction`].
	NewTransaction,
	/// See [`Event::ChainHead`].
	ChainHead,
}

impl Event {
	fn kind(&self) -> EventKind {
		match self {
			Event::NewMinedBlock(_) => EventKind::NewMinedBlock,
			Event::NewTransaction(_) => EventKind::NewTransaction,
			Event::ChainHead(_) => EventKind::ChainHead,
		}
	}
}

struct Subscriber {
	id: u64,
	kind: EventKind,
	queue: Arc<Mutex<VecDeque<Event>>>,
	notify: Sender<()>,
	dropped: Arc<AtomicU64>,
}

/// A subscription handle. Polling drains the subscriber's own queue; it
/// never blocks the publisher and never sees events posted before
/// `subscribe` was called.
pub struct EventReceiver {
	id: u64,
	queue: Arc<Mutex<VecDeque<Event>>>,
	notify: Receiver<()>,
	dropped: Arc<AtomicU64>,
}

impl EventReceiver {
	/// This subscription's id, passed to [`EventBus::unsubscribe`].
	pub fn id(&self) -> u64 {
		self.id
	}

	/// Pops the oldest unconsumed event, if any, without blocking.
	pub fn try_recv(&self) -> Option<Event> {
		self.queue.lock().pop_front()
	}

	/// Waits up to `timeout` for an event, returning immediately if one is
	/// already queued.
	pub fn recv_timeout(&self, timeout: Duration) -> Option<Event> {
		if let Some(event) = self.try_recv() {
			return Some(event);
		}
		let _ = self.notify.recv_timeout(timeout);
		self.try_recv()
	}

	/// How many events were dropped from this subscriber's queue because
	/// it fell behind (§9 resolution 3's `dropped_total`).
	pub fn dropped_total(&self) -> u64 {
		self.dropped.load(Ordering::Relaxed)
	}
}

/// The bus itself: a registry of subscribers, one queue per subscriber.
pub struct EventBus {
	subscribers: Mutex<Vec<Subscriber>>,
	next_id: AtomicU64,
}

impl EventBus {
	/// An empty bus.
	pub fn new() -> Arc<EventBus> {
		Arc::new(EventBus {
			subscribers: Mutex::new(Vec::new()),
			next_id: AtomicU64::new(1),
		})
	}

	/// Registers interest in every event of `kind`, returning a handle to
	/// poll them.
	pub fn subscribe(&self, kind: EventKind) -> EventReceiver {
		let id = self.next_id.fetch_add(1, Ordering::SeqCst);
		let queue = Arc::new(Mutex::new(VecDeque::with_capacity(SUBSCRIBER_CAPACITY)));
		let dropped = Arc::new(AtomicU64::new(0));
		let (notify_tx, notify_rx) = bounded(1);
		self.subscribers.lock().push(Subscriber {
			id,
			kind,
			queue: queue.clone(),
			notify: notify_tx,
			dropped: dropped.clone(),
		});
		EventReceiver {
			id,
			queue,
			notify: notify_rx,
			dropped,
		}
	}

	/// Drops a subscription; no further events will be delivered to it
	/// (§4.7 invariant "no delivery after unsubscribe").
	pub fn unsubscribe(&self, id: u64) {
		self.subscribers.lock().retain(|s| s.id != id);
	}

	/// Delivers `event` to every current subscriber of its kind, dropping
	/// the oldest queued event for any subscriber that's full (§9
	/// resolution 3). Delivery order within one subscriber matches post
	/// order.
	pub fn post(&self, event: Event) {
		let kind = event.kind();
		let subscribers = self.subscribers.lock();
		for sub in subscribers.iter().filter(|s| s.kind == kind) {
			let mut queue = sub.queue.lock();
			if queue.len() >= SUBSCRIBER_CAPACITY {
				queue.pop_front();
				sub.dropped.fetch_add(1, Ordering::Relaxed);
			}
			queue.push_back(event.clone());
			drop(queue);
			let _ = sub.notify.try_send(());
		}
	}

	/// Drops every subscriber, closing their notify channels. Queued but
	/// unconsumed events remain readable via `try_recv` until the
	/// `EventReceiver` itself is dropped.
	pub fn stop(&self) {
		self.subscribers.lock().clear();
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use krypton_core::core::hash::ZERO_HASH;

	fn head_event() -> Event {
		Event::ChainHead(Tip::new(ZERO_HASH, krypton_core::core::difficulty::Difficulty::min()))
	}

	#[test]
	fn delivers_only_to_matching_kind() {
		let bus = EventBus::new();
		let heads = bus.subscribe(EventKind::ChainHead);
		let txs = bus.subscribe(EventKind::NewTransaction);
		bus.post(head_event());
		assert!(heads.try_recv().is_some());
		assert!(txs.try_recv().is_none());
	}

	#[test]
	fn drops_oldest_when_full_and_counts_it() {
		let bus = EventBus::new();
		let sub = bus.subscribe(EventKind::ChainHead);
		for _ in 0..SUBSCRIBER_CAPACITY + 5 {
			bus.post(head_event());
		}
		assert_eq!(sub.dropped_total(), 5);
		let mut drained = 0;
		while sub.try_recv().is_some() {
			drained += 1;
		}
		assert_eq!(drained, SUBSCRIBER_CAPACITY);
	}

	#[test]
	fn unsubscribe_stops_delivery() {
		let bus = EventBus::new();
		let sub = bus.subscribe(EventKind::ChainHead);
		bus.unsubscribe(sub.id());
		bus.post(head_event());
		assert!(sub.try_recv().is_none());
	}
}
