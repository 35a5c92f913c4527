// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core event types for audit logging.
//!
//! - [`AuditEventType`]: every auditable identity, access and extension event
//! - [`AuditSeverity`]: RFC 5424-compatible severity levels
//! - [`AuditLogEntry`]: a single audit record
//! - [`AuditLogBuilder`]: fluent API for constructing entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Types of events that can be recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
	// Identity lifecycle
	IdentityCreated,
	IdentityUpdated,
	IdentityRenewed,
	CredentialRegenerated,
	CredentialAssigned,
	IdentityDeleted,

	// Access decisions
	AccessGranted,
	AccessDenied,

	// Extension loading
	ExtensionLoaded,
	ExtensionFailed,
	ExtensionSkipped,
	LoadOrderDegraded,
}

impl AuditEventType {
	pub fn all() -> &'static [AuditEventType] {
		&[
			AuditEventType::IdentityCreated,
			AuditEventType::IdentityUpdated,
			AuditEventType::IdentityRenewed,
			AuditEventType::CredentialRegenerated,
			AuditEventType::CredentialAssigned,
			AuditEventType::IdentityDeleted,
			AuditEventType::AccessGranted,
			AuditEventType::AccessDenied,
			AuditEventType::ExtensionLoaded,
			AuditEventType::ExtensionFailed,
			AuditEventType::ExtensionSkipped,
			AuditEventType::LoadOrderDegraded,
		]
	}

	pub fn default_severity(&self) -> AuditSeverity {
		match self {
			AuditEventType::IdentityCreated
			| AuditEventType::IdentityUpdated
			| AuditEventType::IdentityRenewed
			| AuditEventType::CredentialAssigned
			| AuditEventType::AccessGranted
			| AuditEventType::ExtensionLoaded => AuditSeverity::Info,

			AuditEventType::ExtensionSkipped => AuditSeverity::Debug,

			AuditEventType::CredentialRegenerated | AuditEventType::IdentityDeleted => {
				AuditSeverity::Notice
			}

			AuditEventType::AccessDenied
			| AuditEventType::ExtensionFailed
			| AuditEventType::LoadOrderDegraded => AuditSeverity::Warning,
		}
	}
}

impl fmt::Display for AuditEventType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			AuditEventType::IdentityCreated => "identity_created",
			AuditEventType::IdentityUpdated => "identity_updated",
			AuditEventType::IdentityRenewed => "identity_renewed",
			AuditEventType::CredentialRegenerated => "credential_regenerated",
			AuditEventType::CredentialAssigned => "credential_assigned",
			AuditEventType::IdentityDeleted => "identity_deleted",
			AuditEventType::AccessGranted => "access_granted",
			AuditEventType::AccessDenied => "access_denied",
			AuditEventType::ExtensionLoaded => "extension_loaded",
			AuditEventType::ExtensionFailed => "extension_failed",
			AuditEventType::ExtensionSkipped => "extension_skipped",
			AuditEventType::LoadOrderDegraded => "load_order_degraded",
		};
		write!(f, "{s}")
	}
}

/// RFC 5424 severity. Lower numeric value means more severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuditSeverity {
	Debug = 7,
	#[default]
	Info = 6,
	Notice = 5,
	Warning = 4,
	Error = 3,
	Critical = 2,
}

impl AuditSeverity {
	pub fn as_syslog_code(&self) -> u8 {
		*self as u8
	}
}

impl PartialOrd for AuditSeverity {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for AuditSeverity {
	fn cmp(&self, other: &Self) -> Ordering {
		(*other as u8).cmp(&(*self as u8))
	}
}

impl fmt::Display for AuditSeverity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			AuditSeverity::Debug => "debug",
			AuditSeverity::Info => "info",
			AuditSeverity::Notice => "notice",
			AuditSeverity::Warning => "warning",
			AuditSeverity::Error => "error",
			AuditSeverity::Critical => "critical",
		};
		write!(f, "{s}")
	}
}

impl FromStr for AuditSeverity {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"debug" => Ok(AuditSeverity::Debug),
			"info" => Ok(AuditSeverity::Info),
			"notice" => Ok(AuditSeverity::Notice),
			"warning" => Ok(AuditSeverity::Warning),
			"error" => Ok(AuditSeverity::Error),
			"critical" => Ok(AuditSeverity::Critical),
			other => Err(format!("unknown audit severity '{other}'")),
		}
	}
}

/// An entry in the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
	pub id: Uuid,
	pub timestamp: DateTime<Utc>,
	pub event_type: AuditEventType,
	pub severity: AuditSeverity,
	/// Who performed the action, when known (operator name, extension name).
	pub actor: Option<String>,
	/// Kind of thing affected, e.g. "identity", "barrier", "extension".
	pub resource_type: Option<String>,
	pub resource_id: Option<String>,
	pub action: String,
	pub details: serde_json::Value,
}

impl AuditLogEntry {
	pub fn builder(event_type: AuditEventType) -> AuditLogBuilder {
		AuditLogBuilder::new(event_type)
	}
}

#[derive(Debug, Clone)]
pub struct AuditLogBuilder {
	event_type: AuditEventType,
	severity: Option<AuditSeverity>,
	actor: Option<String>,
	resource_type: Option<String>,
	resource_id: Option<String>,
	action: Option<String>,
	details: serde_json::Value,
}

impl AuditLogBuilder {
	pub fn new(event_type: AuditEventType) -> Self {
		Self {
			event_type,
			severity: None,
			actor: None,
			resource_type: None,
			resource_id: None,
			action: None,
			details: serde_json::Value::Null,
		}
	}

	/// Override the event type's default severity.
	pub fn severity(mut self, severity: AuditSeverity) -> Self {
		self.severity = Some(severity);
		self
	}

	pub fn actor(mut self, actor: impl Into<String>) -> Self {
		self.actor = Some(actor.into());
		self
	}

	/// Set the actor only if one is known.
	pub fn actor_opt(mut self, actor: Option<impl Into<String>>) -> Self {
		self.actor = actor.map(Into::into);
		self
	}

	pub fn resource(
		mut self,
		resource_type: impl Into<String>,
		resource_id: impl Into<String>,
	) -> Self {
		self.resource_type = Some(resource_type.into());
		self.resource_id = Some(resource_id.into());
		self
	}

	pub fn action(mut self, action: impl Into<String>) -> Self {
		self.action = Some(action.into());
		self
	}

	pub fn details(mut self, details: serde_json::Value) -> Self {
		self.details = details;
		self
	}

	pub fn build(self) -> AuditLogEntry {
		AuditLogEntry {
			id: Uuid::new_v4(),
			timestamp: Utc::now(),
			event_type: self.event_type,
			severity: self
				.severity
				.unwrap_or_else(|| self.event_type.default_severity()),
			actor: self.actor,
			resource_type: self.resource_type,
			resource_id: self.resource_id,
			action: self.action.unwrap_or_else(|| self.event_type.to_string()),
			details: self.details,
		}
	}
}
