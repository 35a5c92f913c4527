// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Audit configuration section.

use serde::{Deserialize, Serialize};

/// Severity names accepted for `min_severity`, most verbose first.
pub const AUDIT_SEVERITY_NAMES: &[&str] =
	&["debug", "info", "notice", "warning", "error", "critical"];

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AuditConfigLayer {
	pub enabled: Option<bool>,
	pub min_severity: Option<String>,
}

impl AuditConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.enabled.is_some() {
			self.enabled = other.enabled;
		}
		if other.min_severity.is_some() {
			self.min_severity = other.min_severity;
		}
	}

	pub fn finalize(self) -> AuditConfig {
		AuditConfig {
			enabled: self.enabled.unwrap_or(true),
			min_severity: self
				.min_severity
				.map(|s| s.to_ascii_lowercase())
				.unwrap_or_else(|| "info".to_string()),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditConfig {
	pub enabled: bool,
	pub min_severity: String,
}

impl Default for AuditConfig {
	fn default() -> Self {
		AuditConfigLayer::default().finalize()
	}
}
