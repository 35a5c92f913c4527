// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Identity data model.
//!
//! An [`Identity`] is a credential-bearing principal. It carries a set of
//! dot-hierarchical permission tags and up to two independently keyed
//! credential [`Modality`]s: a proximity tap (`nfc`) and a remote scan (`rfid`).

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::error::{IdentityError, Result};

/// Stable, never reused identity key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityId(String);

impl IdentityId {
	pub fn new(id: impl Into<String>) -> Self {
		Self(id.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	pub fn into_inner(self) -> String {
		self.0
	}
}

impl fmt::Display for IdentityId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for IdentityId {
	fn from(id: &str) -> Self {
		Self(id.to_string())
	}
}

impl From<String> for IdentityId {
	fn from(id: String) -> Self {
		Self(id)
	}
}

/// A credential channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
	/// High-security proximity tap.
	Nfc,
	/// Lower-security remote scan, subject to a distance threshold.
	Rfid,
}

impl Modality {
	pub fn all() -> &'static [Modality] {
		&[Modality::Nfc, Modality::Rfid]
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			Modality::Nfc => "nfc",
			Modality::Rfid => "rfid",
		}
	}
}

impl fmt::Display for Modality {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for Modality {
	type Err = IdentityError;

	fn from_str(s: &str) -> Result<Self> {
		match s.to_ascii_lowercase().as_str() {
			"nfc" => Ok(Modality::Nfc),
			"rfid" => Ok(Modality::Rfid),
			other => Err(IdentityError::Validation(format!(
				"unknown modality '{other}'"
			))),
		}
	}
}

/// Reverse-index key. Lookups are per modality, but the store keeps each
/// token unique across modalities and identities.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CredentialKey {
	pub modality: Modality,
	pub token: String,
}

impl CredentialKey {
	pub fn new(modality: Modality, token: impl Into<String>) -> Self {
		Self {
			modality,
			token: token.into(),
		}
	}
}

impl fmt::Display for CredentialKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}.{}", self.modality, self.token)
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
	pub id: IdentityId,
	pub name: String,
	/// Insertion ordered; equality ignores order.
	pub tags: IndexSet<String>,
	pub nfc_enabled: bool,
	pub rfid_enabled: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub nfc_data: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub rfid_data: Option<String>,
	/// Remote-scan proximity threshold. `None` uses the ambient default.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub max_distance: Option<f64>,
	/// `None` never expires.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub expiration: Option<DateTime<Utc>>,
	pub created: DateTime<Utc>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub created_by: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub renewed: Option<DateTime<Utc>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub renewed_by: Option<String>,
	pub updated: DateTime<Utc>,
	#[serde(default)]
	pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Identity {
	pub fn is_enabled(&self, modality: Modality) -> bool {
		match modality {
			Modality::Nfc => self.nfc_enabled,
			Modality::Rfid => self.rfid_enabled,
		}
	}

	pub fn token(&self, modality: Modality) -> Option<&str> {
		match modality {
			Modality::Nfc => self.nfc_data.as_deref(),
			Modality::Rfid => self.rfid_data.as_deref(),
		}
	}

	pub(crate) fn set_enabled(&mut self, modality: Modality, enabled: bool) {
		match modality {
			Modality::Nfc => self.nfc_enabled = enabled,
			Modality::Rfid => self.rfid_enabled = enabled,
		}
	}

	pub(crate) fn set_token(&mut self, modality: Modality, token: Option<String>) {
		match modality {
			Modality::Nfc => self.nfc_data = token,
			Modality::Rfid => self.rfid_data = token,
		}
	}

	/// Reverse-index keys for every issued token.
	pub fn credential_keys(&self) -> Vec<CredentialKey> {
		Modality::all()
			.iter()
			.filter_map(|&m| self.token(m).map(|t| CredentialKey::new(m, t)))
			.collect()
	}

	pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
		self.expiration.is_some_and(|exp| exp <= now)
	}

	/// Time left before expiry, clamped at zero. `None` if the identity never expires.
	pub fn time_until_expiration(&self, now: DateTime<Utc>) -> Option<Duration> {
		self.expiration
			.map(|exp| std::cmp::max(exp - now, Duration::zero()))
	}

	/// Check the record invariants.
	pub fn validate(&self) -> Result<()> {
		if self.id.as_str().trim().is_empty() {
			return Err(IdentityError::Validation("id must not be empty".to_string()));
		}
		if self.name.trim().is_empty() {
			return Err(IdentityError::Validation("name is required".to_string()));
		}
		if self.tags.is_empty() {
			return Err(IdentityError::Validation(
				"at least one tag is required".to_string(),
			));
		}
		if self.tags.iter().any(|t| t.trim().is_empty()) {
			return Err(IdentityError::Validation(
				"tags must not be empty strings".to_string(),
			));
		}
		if !self.nfc_enabled && !self.rfid_enabled {
			return Err(IdentityError::Validation(
				"at least one of nfc or rfid must be enabled".to_string(),
			));
		}
		for &modality in Modality::all() {
			if !self.is_enabled(modality) && self.token(modality).is_some() {
				return Err(IdentityError::Validation(format!(
					"{modality} token present but {modality} is disabled"
				)));
			}
			if self.token(modality).is_some_and(|t| t.is_empty()) {
				return Err(IdentityError::Validation(format!(
					"{modality} token must not be empty"
				)));
			}
		}
		if let Some(distance) = self.max_distance {
			if !distance.is_finite() || distance <= 0.0 {
				return Err(IdentityError::Validation(format!(
					"max_distance must be a positive number, got {distance}"
				)));
			}
		}
		Ok(())
	}
}

/// Read view returned by [`IdentityManager::info`](crate::IdentityManager::info).
#[derive(Debug, Clone)]
pub struct IdentityInfo {
	pub identity: Identity,
	pub is_expired: bool,
	pub time_until_expiration: Option<Duration>,
}

/// Outcome of a composite "can this credential be used" check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialStatus {
	Usable,
	NotFound,
	Expired,
	ModalityDisabled,
	NotIssued,
}

impl CredentialStatus {
	pub fn is_usable(&self) -> bool {
		matches!(self, CredentialStatus::Usable)
	}

	pub fn reason(&self) -> &'static str {
		match self {
			CredentialStatus::Usable => "ok",
			CredentialStatus::NotFound => "identity not found",
			CredentialStatus::Expired => "identity expired",
			CredentialStatus::ModalityDisabled => "modality disabled",
			CredentialStatus::NotIssued => "credential not issued",
		}
	}
}

impl fmt::Display for CredentialStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.reason())
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IdentityStats {
	pub total: usize,
	pub expired: usize,
	pub nfc_enabled: usize,
	pub rfid_enabled: usize,
	pub nfc_issued: usize,
	pub rfid_issued: usize,
}
