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

//! Utilities to track the rate of data transfers.

use std::time::{Duration, SystemTime};

/// Tracks the number of transfers, bytes exchanged, and transfer rate over
/// the last minute. Lazily evicts stale samples rather than ticking a timer,
/// so rates are worst-case (but cheap) estimates.
pub struct RateCounter {
	last_min_bytes: Vec<u64>,
	last_min_times: Vec<u64>,
}

impl RateCounter {
	/// Instantiates a new rate counter.
	pub fn new() -> RateCounter {
		RateCounter {
			last_min_bytes: vec![],
			last_min_times: vec![],
		}
	}

	/// Records a transfer of `bytes`, evicting samples older than one minute.
	pub fn inc(&mut self, bytes: u64) {
		let now_millis = millis_since_epoch();
		self.last_min_times.push(now_millis);
		self.last_min_bytes.push(bytes);
		while !self.last_min_times.is_empty() && self.last_min_times[0] + 60_000 < now_millis {
			self.last_min_times.remove(0);
			self.last_min_bytes.remove(0);
		}
	}

	/// Total bytes counted in the last minute.
	pub fn bytes_per_min(&self) -> u64 {
		self.last_min_bytes.iter().sum()
	}

	/// Number of transfers counted in the last minute.
	pub fn count_per_min(&self) -> u64 {
		self.last_min_bytes.len() as u64
	}
}

impl Default for RateCounter {
	fn default() -> Self {
		Self::new()
	}
}

/// Exponentially smoothed throughput estimate in bytes/second, used by the
/// downloader to size per-peer batches and timeouts (§4.4). A fresh peer
/// starts at `initial` bytes/sec; each completed transfer nudges the
/// estimate toward the observed rate, and a timeout halves it directly.
pub struct ThroughputEstimator {
	bytes_per_sec: f64,
	alpha: f64,
}

impl ThroughputEstimator {
	/// Builds an estimator seeded at `initial` bytes/sec, smoothing new
	/// samples in at `alpha` (0..1; higher reacts faster to new samples).
	pub fn new(initial: f64, alpha: f64) -> ThroughputEstimator {
		ThroughputEstimator {
			bytes_per_sec: initial.max(1.0),
			alpha,
		}
	}

	/// Folds in a completed transfer of `bytes` over `elapsed`.
	pub fn observe(&mut self, bytes: u64, elapsed: Duration) {
		let secs = elapsed.as_secs_f64().max(0.001);
		let sample = bytes as f64 / secs;
		self.bytes_per_sec = self.alpha * sample + (1.0 - self.alpha) * self.bytes_per_sec;
	}

	/// Penalizes the estimate after a timeout or failed batch (§4.4, §7).
	pub fn penalize(&mut self) {
		self.bytes_per_sec = (self.bytes_per_sec / 2.0).max(1.0);
	}

	/// Current estimate in bytes/second.
	pub fn bytes_per_sec(&self) -> f64 {
		self.bytes_per_sec
	}
}

fn millis_since_epoch() -> u64 {
	let since_epoch = SystemTime::now()
		.duration_since(SystemTime::UNIX_EPOCH)
		.unwrap_or(Duration::new(0, 0));
	since_epoch.as_secs() * 1000 + since_epoch.subsec_millis() as u64
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rate_counter_accumulates() {
		let mut rc = RateCounter::new();
		rc.inc(100);
		rc.inc(50);
		assert_eq!(rc.bytes_per_min(), 150);
		assert_eq!(rc.count_per_min(), 2);
	}

	#[test]
	fn throughput_estimator_penalize_halves() {
		let mut est = ThroughputEstimator::new(1000.0, 0.3);
		est.penalize();
		assert!((est.bytes_per_sec() - 500.0).abs() < 1e-6);
	}
}
