// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::{Arc, Mutex};

use crate::error::AuditSinkError;
use crate::event::{AuditEventType, AuditLogEntry, AuditSeverity};

/// Destination for audit entries.
pub trait AuditSink: Send + Sync {
	fn name(&self) -> &str;

	fn publish(&self, entry: &AuditLogEntry) -> Result<(), AuditSinkError>;
}

/// Emits each entry as a structured `tracing` event on the `tac::audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
	fn name(&self) -> &str {
		"tracing"
	}

	fn publish(&self, entry: &AuditLogEntry) -> Result<(), AuditSinkError> {
		macro_rules! emit {
			($level:ident) => {
				tracing::$level!(
					target: "tac::audit",
					audit_id = %entry.id,
					event_type = %entry.event_type,
					severity = %entry.severity,
					actor = entry.actor.as_deref().unwrap_or("-"),
					resource_type = entry.resource_type.as_deref().unwrap_or("-"),
					resource_id = entry.resource_id.as_deref().unwrap_or("-"),
					details = %entry.details,
					"{}",
					entry.action
				)
			};
		}

		match entry.severity {
			AuditSeverity::Debug => emit!(debug),
			AuditSeverity::Info | AuditSeverity::Notice => emit!(info),
			AuditSeverity::Warning => emit!(warn),
			AuditSeverity::Error | AuditSeverity::Critical => emit!(error),
		}
		Ok(())
	}
}

/// Keeps entries in memory. Clones share the same buffer.
#[derive(Debug, Default, Clone)]
pub struct MemoryAuditSink {
	entries: Arc<Mutex<Vec<AuditLogEntry>>>,
}

impl MemoryAuditSink {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn entries(&self) -> Vec<AuditLogEntry> {
		self.lock().clone()
	}

	pub fn of_type(&self, event_type: AuditEventType) -> Vec<AuditLogEntry> {
		self.lock()
			.iter()
			.filter(|e| e.event_type == event_type)
			.cloned()
			.collect()
	}

	pub fn count(&self, event_type: AuditEventType) -> usize {
		self.lock()
			.iter()
			.filter(|e| e.event_type == event_type)
			.count()
	}

	pub fn len(&self) -> usize {
		self.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.lock().is_empty()
	}

	pub fn clear(&self) {
		self.lock().clear();
	}

	fn lock(&self) -> std::sync::MutexGuard<'_, Vec<AuditLogEntry>> {
		// A panic while holding the lock cannot leave a Vec half-written.
		self.entries.lock().unwrap_or_else(|e| e.into_inner())
	}
}

impl AuditSink for MemoryAuditSink {
	fn name(&self) -> &str {
		"memory"
	}

	fn publish(&self, entry: &AuditLogEntry) -> Result<(), AuditSinkError> {
		self.lock().push(entry.clone());
		Ok(())
	}
}
