// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Injectable time source so expiry and renewal can be tested deterministically.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};

pub trait Clock: Send + Sync {
	fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now(&self) -> DateTime<Utc> {
		Utc::now()
	}
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
	now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
	pub fn new(start: DateTime<Utc>) -> Self {
		Self {
			now: Arc::new(Mutex::new(start)),
		}
	}

	pub fn set(&self, now: DateTime<Utc>) {
		*self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
	}

	pub fn advance(&self, by: Duration) {
		let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
		*now += by;
	}
}

impl Clock for ManualClock {
	fn now(&self) -> DateTime<Utc> {
		*self.now.lock().unwrap_or_else(|e| e.into_inner())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::TimeZone;

	#[test]
	fn manual_clock_advances_for_all_clones() {
		let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
		let clock = ManualClock::new(start);
		let shared = clock.clone();

		clock.advance(Duration::days(2));
		assert_eq!(shared.now(), start + Duration::days(2));

		shared.set(start);
		assert_eq!(clock.now(), start);
	}
}
