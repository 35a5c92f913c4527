// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{trace, warn};

use crate::event::{AuditLogEntry, AuditSeverity};
use crate::sink::AuditSink;

/// Fans audit entries out to every configured sink.
///
/// Logging is fire-and-forget: sink failures and panics are reported through
/// `tracing` and never reach the caller.
pub struct AuditLogger {
	enabled: bool,
	min_severity: AuditSeverity,
	sinks: Vec<Arc<dyn AuditSink>>,
}

impl AuditLogger {
	pub fn new(enabled: bool, min_severity: AuditSeverity) -> Self {
		Self {
			enabled,
			min_severity,
			sinks: Vec::new(),
		}
	}

	/// A logger that drops everything.
	pub fn disabled() -> Self {
		Self::new(false, AuditSeverity::Info)
	}

	pub fn with_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
		self.sinks.push(sink);
		self
	}

	pub fn add_sink(&mut self, sink: Arc<dyn AuditSink>) {
		self.sinks.push(sink);
	}

	pub fn is_enabled(&self) -> bool {
		self.enabled
	}

	/// Log an entry. Returns `false` if it was filtered out before reaching any sink.
	pub fn log(&self, entry: AuditLogEntry) -> bool {
		if !self.enabled || entry.severity < self.min_severity {
			trace!(event_type = %entry.event_type, "audit entry filtered");
			return false;
		}

		for sink in &self.sinks {
			match catch_unwind(AssertUnwindSafe(|| sink.publish(&entry))) {
				Ok(Ok(())) => {}
				Ok(Err(e)) => {
					warn!(
						sink = sink.name(),
						event_type = %entry.event_type,
						error = %e,
						"audit sink publish failed"
					);
				}
				Err(panic) => {
					warn!(
						sink = sink.name(),
						event_type = %entry.event_type,
						panic = %panic_message(panic.as_ref()),
						"audit sink panicked"
					);
				}
			}
		}
		true
	}
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
	panic
		.downcast_ref::<&str>()
		.copied()
		.or_else(|| panic.downcast_ref::<String>().map(String::as_str))
		.unwrap_or("non-string panic payload")
}

impl Default for AuditLogger {
	fn default() -> Self {
		Self::new(true, AuditSeverity::Info)
	}
}

impl std::fmt::Debug for AuditLogger {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("AuditLogger")
			.field("enabled", &self.enabled)
			.field("min_severity", &self.min_severity)
			.field(
				"sinks",
				&self.sinks.iter().map(|s| s.name()).collect::<Vec<_>>(),
			)
			.finish()
	}
}
