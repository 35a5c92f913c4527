// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Identity lifecycle: create, renew, re-key, update and delete.
//!
//! Every operation validates its input before touching the store, so a failed
//! call never leaves a half-created identity or a dangling reverse-index
//! entry. Successful mutations emit an audit entry.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use indexmap::IndexSet;
use serde::Deserialize;
use serde_json::json;
use tac_audit::{AuditEventType, AuditLogEntry, AuditLogger};
use tac_config::IdentityConfig;
use tracing::{debug, instrument};

use crate::clock::Clock;
use crate::error::{IdentityError, Result};
use crate::serde_helpers::optional_timestamp;
use crate::store::IdentityStore;
use crate::token::TokenGenerator;
use crate::types::{CredentialStatus, Identity, IdentityId, IdentityInfo, IdentityStats, Modality};

/// Options for [`IdentityManager::create`].
///
/// Also deserialisable so callers that receive options as data go through the
/// same validation; see [`CreateIdentity::from_json`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CreateIdentity {
	/// Explicit id. Generated when absent.
	pub id: Option<String>,
	/// Base for a generated id, used verbatim instead of the sanitized username.
	pub id_prefix: Option<String>,
	pub username: Option<String>,
	pub name: Option<String>,
	pub tags: Vec<String>,
	/// Defaults to enabled.
	pub nfc_enabled: Option<bool>,
	/// Defaults to enabled.
	pub rfid_enabled: Option<bool>,
	pub nfc_data: Option<String>,
	pub rfid_data: Option<String>,
	pub max_distance: Option<f64>,
	#[serde(deserialize_with = "optional_timestamp")]
	pub expiration: Option<DateTime<Utc>>,
	pub created_by: Option<String>,
	pub metadata: BTreeMap<String, serde_json::Value>,
}

impl CreateIdentity {
	pub fn new(name: impl Into<String>, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
		Self {
			name: Some(name.into()),
			tags: tags.into_iter().map(Into::into).collect(),
			..Default::default()
		}
	}

	/// Parse options from loosely typed data. Shape errors, including a
	/// malformed expiration, are validation errors.
	pub fn from_json(value: serde_json::Value) -> Result<Self> {
		serde_json::from_value(value).map_err(|e| IdentityError::Validation(e.to_string()))
	}

	pub fn id(mut self, id: impl Into<String>) -> Self {
		self.id = Some(id.into());
		self
	}

	pub fn id_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.id_prefix = Some(prefix.into());
		self
	}

	pub fn username(mut self, username: impl Into<String>) -> Self {
		self.username = Some(username.into());
		self
	}

	pub fn nfc_enabled(mut self, enabled: bool) -> Self {
		self.nfc_enabled = Some(enabled);
		self
	}

	pub fn rfid_enabled(mut self, enabled: bool) -> Self {
		self.rfid_enabled = Some(enabled);
		self
	}

	pub fn nfc_data(mut self, token: impl Into<String>) -> Self {
		self.nfc_data = Some(token.into());
		self
	}

	pub fn rfid_data(mut self, token: impl Into<String>) -> Self {
		self.rfid_data = Some(token.into());
		self
	}

	pub fn max_distance(mut self, distance: f64) -> Self {
		self.max_distance = Some(distance);
		self
	}

	pub fn expires_at(mut self, expiration: DateTime<Utc>) -> Self {
		self.expiration = Some(expiration);
		self
	}

	pub fn created_by(mut self, actor: impl Into<String>) -> Self {
		self.created_by = Some(actor.into());
		self
	}

	pub fn metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
		self.metadata.insert(key.into(), value);
		self
	}
}

/// Options for [`IdentityManager::create_subscription`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CreateSubscription {
	pub username: Option<String>,
	pub duration_days: Option<i64>,
	/// Becomes the identity's only initial tag.
	pub slot: Option<String>,
	/// Display name. Defaults to the username.
	pub name: Option<String>,
	pub nfc_enabled: Option<bool>,
	pub rfid_enabled: Option<bool>,
	pub created_by: Option<String>,
	pub metadata: BTreeMap<String, serde_json::Value>,
}

impl CreateSubscription {
	pub fn new(username: impl Into<String>, duration_days: i64, slot: impl Into<String>) -> Self {
		Self {
			username: Some(username.into()),
			duration_days: Some(duration_days),
			slot: Some(slot.into()),
			..Default::default()
		}
	}

	pub fn from_json(value: serde_json::Value) -> Result<Self> {
		serde_json::from_value(value).map_err(|e| IdentityError::Validation(e.to_string()))
	}

	pub fn created_by(mut self, actor: impl Into<String>) -> Self {
		self.created_by = Some(actor.into());
		self
	}

	pub fn metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
		self.metadata.insert(key.into(), value);
		self
	}
}

#[derive(Debug, Clone, Default)]
pub struct RenewOptions {
	pub renewed_by: Option<String>,
	/// Merged into the identity's metadata (e.g. a payment transaction id).
	pub metadata: BTreeMap<String, serde_json::Value>,
}

impl RenewOptions {
	pub fn by(actor: impl Into<String>) -> Self {
		Self {
			renewed_by: Some(actor.into()),
			..Default::default()
		}
	}
}

/// Partial update. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct IdentityUpdate {
	pub name: Option<String>,
	pub tags: Option<Vec<String>>,
	pub nfc_enabled: Option<bool>,
	pub rfid_enabled: Option<bool>,
	/// `Some(None)` clears the threshold back to the ambient default.
	pub max_distance: Option<Option<f64>>,
	pub metadata: BTreeMap<String, serde_json::Value>,
	pub updated_by: Option<String>,
}

pub struct IdentityManager {
	store: IdentityStore,
	clock: Arc<dyn Clock>,
	tokens: TokenGenerator,
	audit: Arc<AuditLogger>,
	id_separator: String,
}

impl IdentityManager {
	pub fn new(
		store: IdentityStore,
		config: &IdentityConfig,
		clock: Arc<dyn Clock>,
		audit: Arc<AuditLogger>,
	) -> Self {
		Self {
			store,
			clock,
			tokens: TokenGenerator::new(config.token_bytes),
			audit,
			id_separator: config.id_separator.clone(),
		}
	}

	pub fn store(&self) -> &IdentityStore {
		&self.store
	}

	pub fn now(&self) -> DateTime<Utc> {
		self.clock.now()
	}

	pub fn get(&self, id: &IdentityId) -> Option<&Identity> {
		self.store.get(id)
	}

	/// O(1) reverse-index read.
	pub fn lookup(&self, modality: Modality, token: &str) -> Option<&Identity> {
		self.store.lookup(modality, token)
	}

	#[instrument(skip(self, options), fields(name = options.name.as_deref().unwrap_or("")))]
	pub fn create(&mut self, options: CreateIdentity) -> Result<Identity> {
		let now = self.clock.now();

		let name = options
			.name
			.as_deref()
			.map(str::trim)
			.filter(|n| !n.is_empty())
			.ok_or_else(|| IdentityError::Validation("name is required".to_string()))?
			.to_string();
		let tags = normalize_tags(options.tags)?;

		let nfc_enabled = options.nfc_enabled.unwrap_or(true);
		let rfid_enabled = options.rfid_enabled.unwrap_or(true);
		if !nfc_enabled && !rfid_enabled {
			return Err(IdentityError::Validation(
				"at least one of nfc or rfid must be enabled".to_string(),
			));
		}
		if !nfc_enabled && options.nfc_data.is_some() {
			return Err(IdentityError::Validation(
				"nfc_data supplied but nfc is disabled".to_string(),
			));
		}
		if !rfid_enabled && options.rfid_data.is_some() {
			return Err(IdentityError::Validation(
				"rfid_data supplied but rfid is disabled".to_string(),
			));
		}

		let id = match options.id.as_deref().map(str::trim) {
			Some("") => {
				return Err(IdentityError::Validation("id must not be empty".to_string()));
			}
			Some(explicit) => {
				let id = IdentityId::from(explicit);
				if self.store.is_taken(&id) {
					return Err(IdentityError::IdentityExists(id));
				}
				id
			}
			None => {
				let base = match options.id_prefix.as_deref().map(str::trim) {
					Some(prefix) if !prefix.is_empty() => prefix.to_string(),
					_ => sanitize_username(options.username.as_deref().unwrap_or(&name)),
				};
				self.generate_id(&base, now)
			}
		};

		let rfid_data = match options.rfid_data {
			Some(token) => Some(token),
			None if rfid_enabled => Some(self.mint_token()),
			None => None,
		};

		let identity = Identity {
			id,
			name,
			tags,
			nfc_enabled,
			rfid_enabled,
			nfc_data: options.nfc_data,
			rfid_data,
			max_distance: options.max_distance,
			expiration: options.expiration,
			created: now,
			created_by: options.created_by,
			renewed: None,
			renewed_by: None,
			updated: now,
			metadata: options.metadata,
		};

		self.store.put(identity.clone())?;

		debug!(identity_id = %identity.id, "identity created");
		self.audit.log(
			AuditLogEntry::builder(AuditEventType::IdentityCreated)
				.actor_opt(identity.created_by.clone())
				.resource("identity", identity.id.as_str())
				.details(json!({
					"name": identity.name,
					"tags": identity.tags,
					"nfc_enabled": identity.nfc_enabled,
					"rfid_enabled": identity.rfid_enabled,
					"expiration": identity.expiration,
				}))
				.build(),
		);

		Ok(identity)
	}

	/// Time-limited identity for a single slot, expiring `duration_days` from now.
	#[instrument(skip(self, options), fields(username = options.username.as_deref().unwrap_or("")))]
	pub fn create_subscription(&mut self, options: CreateSubscription) -> Result<Identity> {
		let username = options
			.username
			.as_deref()
			.map(str::trim)
			.filter(|u| !u.is_empty())
			.ok_or_else(|| IdentityError::Validation("username is required".to_string()))?
			.to_string();
		let duration_days = options
			.duration_days
			.ok_or_else(|| IdentityError::Validation("duration is required".to_string()))?;
		if duration_days <= 0 {
			return Err(IdentityError::Validation(format!(
				"duration must be a positive number of days, got {duration_days}"
			)));
		}
		let slot = options
			.slot
			.as_deref()
			.map(str::trim)
			.filter(|s| !s.is_empty())
			.ok_or_else(|| IdentityError::Validation("slot is required".to_string()))?
			.to_string();

		let expiration = add_days(self.clock.now(), duration_days)?;

		let mut metadata = options.metadata;
		metadata.insert("subscription_days".to_string(), json!(duration_days));
		metadata.insert("slot".to_string(), json!(slot));

		self.create(CreateIdentity {
			username: Some(username.clone()),
			name: Some(options.name.unwrap_or(username)),
			tags: vec![slot],
			nfc_enabled: options.nfc_enabled,
			rfid_enabled: options.rfid_enabled,
			expiration: Some(expiration),
			created_by: options.created_by,
			metadata,
			..Default::default()
		})
	}

	/// Extend expiration by `additional_days`, counted from the previous
	/// deadline (or from now if the identity never had one).
	#[instrument(skip(self, options), fields(identity_id = %id))]
	pub fn renew(
		&mut self,
		id: &IdentityId,
		additional_days: i64,
		options: RenewOptions,
	) -> Result<Identity> {
		let mut identity = self.cloned(id)?;
		if additional_days <= 0 {
			return Err(IdentityError::Validation(format!(
				"renewal must add a positive number of days, got {additional_days}"
			)));
		}

		let now = self.clock.now();
		let previous = identity.expiration;
		let expiration = add_days(previous.unwrap_or(now), additional_days)?;

		identity.expiration = Some(expiration);
		identity.renewed = Some(now);
		identity.renewed_by = options.renewed_by;
		identity.updated = now;
		identity.metadata.extend(options.metadata);

		self.store.put(identity.clone())?;

		self.audit.log(
			AuditLogEntry::builder(AuditEventType::IdentityRenewed)
				.actor_opt(identity.renewed_by.clone())
				.resource("identity", identity.id.as_str())
				.details(json!({
					"additional_days": additional_days,
					"previous_expiration": previous,
					"expiration": expiration,
				}))
				.build(),
		);

		Ok(identity)
	}

	/// Replace the modality's token with a freshly minted one.
	#[instrument(skip(self), fields(identity_id = %id, modality = %modality))]
	pub fn regenerate_credential(&mut self, id: &IdentityId, modality: Modality) -> Result<Identity> {
		let mut identity = self.cloned(id)?;
		if !identity.is_enabled(modality) {
			return Err(IdentityError::ModalityDisabled {
				id: id.clone(),
				modality,
			});
		}

		let had_previous = identity.token(modality).is_some();
		identity.set_token(modality, Some(self.mint_token()));
		identity.updated = self.clock.now();

		self.store.put(identity.clone())?;

		self.audit.log(
			AuditLogEntry::builder(AuditEventType::CredentialRegenerated)
				.resource("identity", identity.id.as_str())
				.details(json!({
					"modality": modality,
					"replaced_previous": had_previous,
				}))
				.build(),
		);

		Ok(identity)
	}

	/// Assign a token explicitly, e.g. once physical media has been written.
	#[instrument(skip(self, token), fields(identity_id = %id, modality = %modality))]
	pub fn set_credential(
		&mut self,
		id: &IdentityId,
		modality: Modality,
		token: impl Into<String>,
	) -> Result<Identity> {
		let token = token.into();
		let mut identity = self.cloned(id)?;
		if token.trim().is_empty() {
			return Err(IdentityError::Validation(
				"credential token must not be empty".to_string(),
			));
		}
		if !identity.is_enabled(modality) {
			return Err(IdentityError::ModalityDisabled {
				id: id.clone(),
				modality,
			});
		}
		if identity.token(modality) == Some(token.as_str()) {
			return Ok(identity);
		}

		identity.set_token(modality, Some(token));
		identity.updated = self.clock.now();

		self.store.put(identity.clone())?;

		self.audit.log(
			AuditLogEntry::builder(AuditEventType::CredentialAssigned)
				.resource("identity", identity.id.as_str())
				.details(json!({ "modality": modality }))
				.build(),
		);

		Ok(identity)
	}

	/// Read view with derived expiry fields. Never mutates state.
	pub fn info(&self, id: &IdentityId) -> Result<IdentityInfo> {
		let identity = self.cloned(id)?;
		let now = self.clock.now();
		Ok(IdentityInfo {
			is_expired: identity.is_expired_at(now),
			time_until_expiration: identity.time_until_expiration(now),
			identity,
		})
	}

	/// Exists, not expired, modality enabled and its token issued.
	pub fn can_use(&self, id: &IdentityId, modality: Modality) -> CredentialStatus {
		let Some(identity) = self.store.get(id) else {
			return CredentialStatus::NotFound;
		};
		if identity.is_expired_at(self.clock.now()) {
			CredentialStatus::Expired
		} else if !identity.is_enabled(modality) {
			CredentialStatus::ModalityDisabled
		} else if identity.token(modality).is_none() {
			CredentialStatus::NotIssued
		} else {
			CredentialStatus::Usable
		}
	}

	/// Apply a partial update. Newly enabled modalities without a token get
	/// one minted; disabled modalities lose theirs.
	#[instrument(skip(self, update), fields(identity_id = %id))]
	pub fn update(&mut self, id: &IdentityId, update: IdentityUpdate) -> Result<Identity> {
		let mut identity = self.cloned(id)?;
		let mut changed = Vec::new();

		if let Some(name) = update.name {
			identity.name = name.trim().to_string();
			changed.push("name");
		}
		if let Some(tags) = update.tags {
			identity.tags = normalize_tags(tags)?;
			changed.push("tags");
		}
		if let Some(distance) = update.max_distance {
			identity.max_distance = distance;
			changed.push("max_distance");
		}

		let mut newly_enabled = Vec::new();
		for (modality, requested) in [
			(Modality::Nfc, update.nfc_enabled),
			(Modality::Rfid, update.rfid_enabled),
		] {
			let Some(enabled) = requested else {
				continue;
			};
			if enabled == identity.is_enabled(modality) {
				continue;
			}
			identity.set_enabled(modality, enabled);
			if enabled {
				newly_enabled.push(modality);
			} else {
				identity.set_token(modality, None);
			}
			changed.push(match modality {
				Modality::Nfc => "nfc_enabled",
				Modality::Rfid => "rfid_enabled",
			});
		}

		if !update.metadata.is_empty() {
			identity.metadata.extend(update.metadata);
			changed.push("metadata");
		}

		// Validate before minting so a rejected update does not burn tokens.
		identity.validate()?;
		for modality in newly_enabled {
			if identity.token(modality).is_none() {
				identity.set_token(modality, Some(self.mint_token()));
			}
		}

		identity.updated = self.clock.now();
		self.store.put(identity.clone())?;

		self.audit.log(
			AuditLogEntry::builder(AuditEventType::IdentityUpdated)
				.actor_opt(update.updated_by)
				.resource("identity", identity.id.as_str())
				.details(json!({ "changed": changed }))
				.build(),
		);

		Ok(identity)
	}

	/// Remove the identity and every reverse-index entry for its tokens.
	#[instrument(skip(self), fields(identity_id = %id))]
	pub fn delete(&mut self, id: &IdentityId) -> Result<Identity> {
		let identity = self.store.remove(id)?;

		self.audit.log(
			AuditLogEntry::builder(AuditEventType::IdentityDeleted)
				.resource("identity", identity.id.as_str())
				.details(json!({ "name": identity.name }))
				.build(),
		);

		Ok(identity)
	}

	/// All identities in id order.
	pub fn list(&self) -> impl Iterator<Item = &Identity> {
		self.store.iter()
	}

	pub fn filter<'a>(&'a self, predicate: impl Fn(&Identity) -> bool) -> Vec<&'a Identity> {
		self.store.iter().filter(|i| predicate(i)).collect()
	}

	/// Identities past their expiration. They stay in the store until deleted.
	pub fn expired(&self) -> Vec<&Identity> {
		let now = self.clock.now();
		self.filter(|i| i.is_expired_at(now))
	}

	/// Identities that are still valid but expire within `window`.
	pub fn expiring_within(&self, window: Duration) -> Vec<&Identity> {
		let now = self.clock.now();
		let horizon = now
			.checked_add_signed(window)
			.unwrap_or(DateTime::<Utc>::MAX_UTC);
		self.filter(|i| i.expiration.is_some_and(|exp| exp > now && exp <= horizon))
	}

	pub fn stats(&self) -> IdentityStats {
		let now = self.clock.now();
		self.store
			.iter()
			.fold(IdentityStats::default(), |mut stats, identity| {
				stats.total += 1;
				stats.expired += usize::from(identity.is_expired_at(now));
				stats.nfc_enabled += usize::from(identity.nfc_enabled);
				stats.rfid_enabled += usize::from(identity.rfid_enabled);
				stats.nfc_issued += usize::from(identity.nfc_data.is_some());
				stats.rfid_issued += usize::from(identity.rfid_data.is_some());
				stats
			})
	}

	fn cloned(&self, id: &IdentityId) -> Result<Identity> {
		self.store
			.get(id)
			.cloned()
			.ok_or_else(|| IdentityError::NotFound(id.clone()))
	}

	fn mint_token(&self) -> String {
		self.tokens
			.generate_unique(|token| self.store.token_owner(token).is_some())
	}

	fn generate_id(&self, base: &str, now: DateTime<Utc>) -> IdentityId {
		let stem = format!("{base}{}{}", self.id_separator, now.timestamp_millis());
		let mut candidate = IdentityId::from(stem.as_str());
		let mut suffix = 2u32;
		while self.store.is_taken(&candidate) {
			candidate = IdentityId::from(format!("{stem}{}{suffix}", self.id_separator));
			suffix += 1;
		}
		candidate
	}
}

impl std::fmt::Debug for IdentityManager {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("IdentityManager")
			.field("store", &self.store)
			.field("id_separator", &self.id_separator)
			.finish()
	}
}

/// Lowercase ASCII alphanumerics; everything else becomes `_`. Never empty.
pub fn sanitize_username(raw: &str) -> String {
	let mapped: String = raw
		.trim()
		.chars()
		.map(|c| {
			if c.is_ascii_alphanumeric() {
				c.to_ascii_lowercase()
			} else {
				'_'
			}
		})
		.collect();
	let trimmed = mapped.trim_matches('_');
	if trimmed.is_empty() {
		"identity".to_string()
	} else {
		trimmed.to_string()
	}
}

fn normalize_tags(tags: Vec<String>) -> Result<IndexSet<String>> {
	let mut normalized = IndexSet::with_capacity(tags.len());
	for tag in tags {
		let tag = tag.trim();
		if tag.is_empty() {
			return Err(IdentityError::Validation(
				"tags must not be empty strings".to_string(),
			));
		}
		normalized.insert(tag.to_string());
	}
	if normalized.is_empty() {
		return Err(IdentityError::Validation(
			"at least one tag is required".to_string(),
		));
	}
	Ok(normalized)
}

fn add_days(base: DateTime<Utc>, days: i64) -> Result<DateTime<Utc>> {
	Duration::try_days(days)
		.and_then(|d| base.checked_add_signed(d))
		.ok_or_else(|| IdentityError::Validation(format!("{days} days is out of range")))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::clock::ManualClock;
	use crate::storage::{KeyValueStore, MemoryStore};
	use crate::types::fixtures::epoch;
	use proptest::prelude::*;
	use tac_audit::MemoryAuditSink;

	struct Harness {
		manager: IdentityManager,
		clock: ManualClock,
		audit: MemoryAuditSink,
		backend: MemoryStore,
	}

	fn harness() -> Harness {
		let clock = ManualClock::new(epoch());
		let audit = MemoryAuditSink::new();
		let backend = MemoryStore::new();
		let logger = AuditLogger::default().with_sink(Arc::new(audit.clone()));
		let manager = IdentityManager::new(
			IdentityStore::new(Box::new(backend.clone())),
			&IdentityConfig::default(),
			Arc::new(clock.clone()),
			Arc::new(logger),
		);
		Harness {
			manager,
			clock,
			audit,
			backend,
		}
	}

	fn basic(h: &mut Harness) -> Identity {
		h.manager
			.create(CreateIdentity::new("Ada Lovelace", ["tenant.1.a"]).username("ada"))
			.unwrap()
	}

	mod create {
		use super::*;

		#[test]
		fn defaults_enable_both_modalities_and_mint_rfid_only() {
			let mut h = harness();
			let identity = basic(&mut h);

			assert!(identity.nfc_enabled);
			assert!(identity.rfid_enabled);
			assert!(identity.nfc_data.is_none());
			let rfid = identity.rfid_data.clone().unwrap();
			assert_eq!(rfid.len(), IdentityConfig::default().token_bytes * 2);
			assert_eq!(
				h.manager.lookup(Modality::Rfid, &rfid).unwrap().id,
				identity.id
			);
			assert_eq!(h.audit.count(AuditEventType::IdentityCreated), 1);
		}

		#[test]
		fn generated_id_uses_sanitized_username_and_time() {
			let mut h = harness();
			let identity = h
				.manager
				.create(CreateIdentity::new("Bob", ["staff"]).username("  Bob Smith! "))
				.unwrap();
			assert_eq!(
				identity.id.as_str(),
				format!("bob_smith_{}", epoch().timestamp_millis())
			);
		}

		#[test]
		fn generated_ids_do_not_collide_within_the_same_millisecond() {
			let mut h = harness();
			let first = basic(&mut h);
			let second = basic(&mut h);
			assert_ne!(first.id, second.id);
			assert!(second.id.as_str().ends_with("_2"));
		}

		#[test]
		fn explicit_prefix_is_used_verbatim() {
			let mut h = harness();
			let identity = h
				.manager
				.create(CreateIdentity::new("Kiosk", ["lobby"]).id_prefix("KIOSK"))
				.unwrap();
			assert!(identity.id.as_str().starts_with("KIOSK_"));
		}

		#[test]
		fn explicit_duplicate_id_is_rejected() {
			let mut h = harness();
			h.manager
				.create(CreateIdentity::new("A", ["x"]).id("fixed"))
				.unwrap();
			let err = h
				.manager
				.create(CreateIdentity::new("B", ["x"]).id("fixed"))
				.unwrap_err();
			assert!(matches!(err, IdentityError::IdentityExists(id) if id.as_str() == "fixed"));
		}

		#[test]
		fn explicit_id_of_deleted_identity_is_not_reused() {
			let mut h = harness();
			let first = h
				.manager
				.create(CreateIdentity::new("A", ["x"]).id("fixed"))
				.unwrap();
			h.manager.delete(&first.id).unwrap();

			let err = h
				.manager
				.create(CreateIdentity::new("B", ["x"]).id("fixed"))
				.unwrap_err();
			assert!(matches!(err, IdentityError::IdentityExists(id) if id == first.id));
			assert!(h.manager.get(&first.id).is_none());
			assert_eq!(h.audit.count(AuditEventType::IdentityCreated), 1);
		}

		#[test]
		fn generated_id_of_deleted_identity_is_not_reused() {
			let mut h = harness();
			let first = basic(&mut h);
			h.manager.delete(&first.id).unwrap();

			let second = basic(&mut h);
			assert_ne!(first.id, second.id);
			assert_eq!(
				second.id.as_str(),
				format!("ada_{}_2", epoch().timestamp_millis())
			);
		}

		#[test]
		fn missing_name_tags_or_modalities_are_rejected_without_writes() {
			let mut h = harness();
			let cases = [
				CreateIdentity {
					tags: vec!["x".to_string()],
					..Default::default()
				},
				CreateIdentity::new("No tags", Vec::<String>::new()),
				CreateIdentity::new("Blank tag", ["  "]),
				CreateIdentity::new("Nothing enabled", ["x"])
					.nfc_enabled(false)
					.rfid_enabled(false),
				CreateIdentity::new("Token on disabled", ["x"])
					.nfc_enabled(false)
					.nfc_data("abc"),
			];
			for options in cases {
				assert!(matches!(
					h.manager.create(options),
					Err(IdentityError::Validation(_))
				));
			}
			assert!(h.backend.is_empty());
			assert_eq!(h.manager.store().index_len(), 0);
			assert!(h.audit.is_empty());
		}

		#[test]
		fn malformed_expiration_is_a_validation_error() {
			let err = CreateIdentity::from_json(json!({
				"name": "x",
				"tags": ["a"],
				"expiration": "next tuesday",
			}))
			.unwrap_err();
			assert!(matches!(err, IdentityError::Validation(_)));
		}

		#[test]
		fn expiration_accepts_rfc3339_and_millis() {
			let from_text = CreateIdentity::from_json(json!({
				"expiration": "2025-06-01T12:00:00Z",
			}))
			.unwrap();
			let from_millis = CreateIdentity::from_json(json!({
				"expiration": epoch().timestamp_millis(),
			}))
			.unwrap();
			assert_eq!(from_text.expiration, Some(epoch()));
			assert_eq!(from_millis.expiration, Some(epoch()));
		}

		#[test]
		fn supplied_token_in_use_is_rejected() {
			let mut h = harness();
			h.manager
				.create(CreateIdentity::new("A", ["x"]).nfc_data("card-1"))
				.unwrap();
			let err = h
				.manager
				.create(CreateIdentity::new("B", ["x"]).nfc_data("card-1"))
				.unwrap_err();
			assert!(matches!(
				err,
				IdentityError::TokenInUse {
					modality: Modality::Nfc
				}
			));
			assert_eq!(h.manager.store().len(), 1);
		}

		#[test]
		fn duplicate_tags_collapse_preserving_order() {
			let mut h = harness();
			let identity = h
				.manager
				.create(CreateIdentity::new("T", ["b", "a", "b"]))
				.unwrap();
			assert_eq!(
				identity.tags.iter().collect::<Vec<_>>(),
				vec!["b", "a"]
			);
		}
	}

	mod subscription {
		use super::*;

		#[test]
		fn creates_single_slot_identity_expiring_after_duration() {
			let mut h = harness();
			let identity = h
				.manager
				.create_subscription(
					CreateSubscription::new("carol", 30, "parking.7")
						.metadata("transaction_id", json!("tx-1")),
				)
				.unwrap();

			assert_eq!(identity.name, "carol");
			assert_eq!(identity.tags.iter().collect::<Vec<_>>(), vec!["parking.7"]);
			assert_eq!(identity.expiration, Some(epoch() + Duration::days(30)));
			assert_eq!(identity.metadata["subscription_days"], json!(30));
			assert_eq!(identity.metadata["transaction_id"], json!("tx-1"));
		}

		#[test]
		fn requires_username_duration_and_slot() {
			let mut h = harness();
			for options in [
				CreateSubscription {
					duration_days: Some(1),
					slot: Some("a".to_string()),
					..Default::default()
				},
				CreateSubscription {
					username: Some("u".to_string()),
					slot: Some("a".to_string()),
					..Default::default()
				},
				CreateSubscription::new("u", 0, "a"),
				CreateSubscription::new("u", 5, " "),
			] {
				assert!(matches!(
					h.manager.create_subscription(options),
					Err(IdentityError::Validation(_))
				));
			}
			assert!(h.manager.store().is_empty());
		}
	}

	mod renew {
		use super::*;

		#[test]
		fn extends_from_previous_deadline_not_from_now() {
			let mut h = harness();
			let identity = h
				.manager
				.create(CreateIdentity::new("R", ["x"]).expires_at(epoch() + Duration::days(10)))
				.unwrap();

			h.clock.advance(Duration::days(3));
			let renewed = h
				.manager
				.renew(&identity.id, 5, RenewOptions::by("desk"))
				.unwrap();

			assert_eq!(renewed.expiration, Some(epoch() + Duration::days(15)));
			assert_eq!(renewed.renewed, Some(epoch() + Duration::days(3)));
			assert_eq!(renewed.renewed_by.as_deref(), Some("desk"));
			assert_eq!(h.audit.count(AuditEventType::IdentityRenewed), 1);
		}

		#[test]
		fn starts_from_now_when_never_set() {
			let mut h = harness();
			let identity = basic(&mut h);
			let renewed = h
				.manager
				.renew(&identity.id, 7, RenewOptions::default())
				.unwrap();
			assert_eq!(renewed.expiration, Some(epoch() + Duration::days(7)));
		}

		#[test]
		fn renewing_an_already_expired_identity_is_still_additive() {
			let mut h = harness();
			let identity = h
				.manager
				.create(CreateIdentity::new("R", ["x"]).expires_at(epoch()))
				.unwrap();
			h.clock.advance(Duration::days(20));
			let renewed = h
				.manager
				.renew(&identity.id, 5, RenewOptions::default())
				.unwrap();
			assert_eq!(renewed.expiration, Some(epoch() + Duration::days(5)));
		}

		#[test]
		fn unknown_id_is_not_found() {
			let mut h = harness();
			assert!(matches!(
				h.manager
					.renew(&IdentityId::from("ghost"), 1, RenewOptions::default()),
				Err(IdentityError::NotFound(_))
			));
		}

		#[test]
		fn non_positive_days_never_shorten() {
			let mut h = harness();
			let identity = basic(&mut h);
			assert!(h
				.manager
				.renew(&identity.id, 0, RenewOptions::default())
				.is_err());
			assert!(h
				.manager
				.renew(&identity.id, -3, RenewOptions::default())
				.is_err());
		}

		proptest! {
			#[test]
			fn renewal_is_additive(d1 in 1i64..2000, d2 in 1i64..2000, start in 0i64..400) {
				let mut h = harness();
				let base = epoch() + Duration::days(start);
				let identity = h
					.manager
					.create(CreateIdentity::new("P", ["x"]).expires_at(base))
					.unwrap();

				let mut other = harness();
				let twin = other
					.manager
					.create(CreateIdentity::new("P", ["x"]).expires_at(base))
					.unwrap();

				h.manager.renew(&identity.id, d1, RenewOptions::default()).unwrap();
				h.clock.advance(Duration::hours(5));
				let twice = h.manager.renew(&identity.id, d2, RenewOptions::default()).unwrap();
				let once = other.manager.renew(&twin.id, d1 + d2, RenewOptions::default()).unwrap();

				prop_assert_eq!(twice.expiration, once.expiration);
				prop_assert_eq!(
					twice.expiration.unwrap().timestamp_millis(),
					base.timestamp_millis() + (d1 + d2) * 86_400_000
				);
			}
		}
	}

	mod credentials {
		use super::*;

		#[test]
		fn regenerate_swaps_exactly_one_index_entry() {
			let mut h = harness();
			let identity = basic(&mut h);
			let old = identity.rfid_data.clone().unwrap();
			let before = h.manager.store().index_len();

			let updated = h
				.manager
				.regenerate_credential(&identity.id, Modality::Rfid)
				.unwrap();
			let new = updated.rfid_data.clone().unwrap();

			assert_ne!(old, new);
			assert_eq!(h.manager.store().index_len(), before);
			assert!(h.manager.lookup(Modality::Rfid, &old).is_none());
			assert_eq!(h.manager.lookup(Modality::Rfid, &new).unwrap().id, identity.id);
			assert_eq!(
				h.backend.get(&format!("credential.rfid.{old}")).unwrap(),
				None
			);
		}

		#[test]
		fn regenerate_on_disabled_modality_fails() {
			let mut h = harness();
			let identity = h
				.manager
				.create(CreateIdentity::new("N", ["x"]).rfid_enabled(false))
				.unwrap();
			assert!(matches!(
				h.manager.regenerate_credential(&identity.id, Modality::Rfid),
				Err(IdentityError::ModalityDisabled {
					modality: Modality::Rfid,
					..
				})
			));
		}

		#[test]
		fn set_credential_issues_nfc_token() {
			let mut h = harness();
			let identity = basic(&mut h);
			assert_eq!(
				h.manager.can_use(&identity.id, Modality::Nfc),
				CredentialStatus::NotIssued
			);

			h.manager
				.set_credential(&identity.id, Modality::Nfc, "card-42")
				.unwrap();
			assert_eq!(
				h.manager.lookup(Modality::Nfc, "card-42").unwrap().id,
				identity.id
			);
			assert!(h.manager.can_use(&identity.id, Modality::Nfc).is_usable());

			h.manager
				.set_credential(&identity.id, Modality::Nfc, "card-43")
				.unwrap();
			assert!(h.manager.lookup(Modality::Nfc, "card-42").is_none());
			assert_eq!(h.audit.count(AuditEventType::CredentialAssigned), 2);
		}

		#[test]
		fn set_credential_rejects_token_owned_elsewhere() {
			let mut h = harness();
			let a = basic(&mut h);
			let b = basic(&mut h);
			h.manager.set_credential(&a.id, Modality::Nfc, "shared").unwrap();

			assert!(matches!(
				h.manager.set_credential(&b.id, Modality::Nfc, "shared"),
				Err(IdentityError::TokenInUse { .. })
			));
			assert_eq!(h.manager.lookup(Modality::Nfc, "shared").unwrap().id, a.id);
			assert!(h.manager.get(&b.id).unwrap().nfc_data.is_none());
		}

		#[test]
		fn set_credential_rejects_token_issued_in_another_modality() {
			let mut h = harness();
			let a = basic(&mut h);
			let b = basic(&mut h);
			let rfid = a.rfid_data.clone().unwrap();

			assert!(matches!(
				h.manager.set_credential(&b.id, Modality::Nfc, &rfid),
				Err(IdentityError::TokenInUse {
					modality: Modality::Nfc
				})
			));
			assert!(h.manager.lookup(Modality::Nfc, &rfid).is_none());
		}
	}

	mod queries {
		use super::*;

		#[test]
		fn info_derives_expiry_without_mutation() {
			let mut h = harness();
			let identity = h
				.manager
				.create(CreateIdentity::new("I", ["x"]).expires_at(epoch() + Duration::days(1)))
				.unwrap();

			let info = h.manager.info(&identity.id).unwrap();
			assert!(!info.is_expired);
			assert_eq!(info.time_until_expiration, Some(Duration::days(1)));

			h.clock.advance(Duration::days(2));
			let info = h.manager.info(&identity.id).unwrap();
			assert!(info.is_expired);
			assert_eq!(info.time_until_expiration, Some(Duration::zero()));
			assert!(h.manager.get(&identity.id).is_some());
		}

		#[test]
		fn can_use_reports_each_failure() {
			let mut h = harness();
			assert_eq!(
				h.manager.can_use(&IdentityId::from("ghost"), Modality::Rfid),
				CredentialStatus::NotFound
			);

			let identity = h
				.manager
				.create(
					CreateIdentity::new("C", ["x"])
						.nfc_enabled(false)
						.expires_at(epoch() + Duration::days(1)),
				)
				.unwrap();
			assert_eq!(
				h.manager.can_use(&identity.id, Modality::Nfc),
				CredentialStatus::ModalityDisabled
			);
			assert_eq!(
				h.manager.can_use(&identity.id, Modality::Rfid),
				CredentialStatus::Usable
			);

			h.clock.advance(Duration::days(1));
			assert_eq!(
				h.manager.can_use(&identity.id, Modality::Rfid),
				CredentialStatus::Expired
			);
		}

		#[test]
		fn expired_and_expiring_views() {
			let mut h = harness();
			let soon = h
				.manager
				.create(CreateIdentity::new("Soon", ["x"]).expires_at(epoch() + Duration::days(2)))
				.unwrap();
			let past = h
				.manager
				.create(CreateIdentity::new("Past", ["x"]).expires_at(epoch() - Duration::days(1)))
				.unwrap();
			basic(&mut h);

			let expired: Vec<_> = h.manager.expired().iter().map(|i| i.id.clone()).collect();
			assert_eq!(expired, vec![past.id.clone()]);

			let expiring: Vec<_> = h
				.manager
				.expiring_within(Duration::days(3))
				.iter()
				.map(|i| i.id.clone())
				.collect();
			assert_eq!(expiring, vec![soon.id]);

			let stats = h.manager.stats();
			assert_eq!(stats.total, 3);
			assert_eq!(stats.expired, 1);
			assert_eq!(stats.rfid_issued, 3);
			assert_eq!(stats.nfc_issued, 0);
		}
	}

	mod update_and_delete {
		use super::*;

		#[test]
		fn enabling_a_modality_mints_and_indexes_a_token() {
			let mut h = harness();
			let identity = h
				.manager
				.create(CreateIdentity::new("U", ["x"]).rfid_enabled(false))
				.unwrap();
			assert!(identity.rfid_data.is_none());

			let updated = h
				.manager
				.update(
					&identity.id,
					IdentityUpdate {
						rfid_enabled: Some(true),
						..Default::default()
					},
				)
				.unwrap();
			let token = updated.rfid_data.clone().unwrap();
			assert_eq!(h.manager.lookup(Modality::Rfid, &token).unwrap().id, identity.id);
		}

		#[test]
		fn disabling_a_modality_drops_its_token() {
			let mut h = harness();
			let identity = basic(&mut h);
			let token = identity.rfid_data.clone().unwrap();

			let updated = h
				.manager
				.update(
					&identity.id,
					IdentityUpdate {
						rfid_enabled: Some(false),
						..Default::default()
					},
				)
				.unwrap();
			assert!(updated.rfid_data.is_none());
			assert!(h.manager.lookup(Modality::Rfid, &token).is_none());
		}

		#[test]
		fn invalid_update_changes_nothing() {
			let mut h = harness();
			let identity = basic(&mut h);

			let err = h
				.manager
				.update(
					&identity.id,
					IdentityUpdate {
						nfc_enabled: Some(false),
						rfid_enabled: Some(false),
						..Default::default()
					},
				)
				.unwrap_err();
			assert!(matches!(err, IdentityError::Validation(_)));
			assert_eq!(h.manager.get(&identity.id), Some(&identity));
			assert!(h
				.manager
				.lookup(Modality::Rfid, identity.rfid_data.as_deref().unwrap())
				.is_some());
		}

		#[test]
		fn updates_tags_name_and_distance() {
			let mut h = harness();
			let identity = basic(&mut h);
			let updated = h
				.manager
				.update(
					&identity.id,
					IdentityUpdate {
						name: Some("Ada L.".to_string()),
						tags: Some(vec!["staff".to_string(), "tenant.2".to_string()]),
						max_distance: Some(Some(3.5)),
						..Default::default()
					},
				)
				.unwrap();
			assert_eq!(updated.name, "Ada L.");
			assert_eq!(updated.tags.len(), 2);
			assert_eq!(updated.max_distance, Some(3.5));
			assert_eq!(h.audit.count(AuditEventType::IdentityUpdated), 1);
		}

		#[test]
		fn delete_purges_every_token() {
			let mut h = harness();
			let identity = basic(&mut h);
			let updated = h
				.manager
				.set_credential(&identity.id, Modality::Nfc, "card-1")
				.unwrap();
			let rfid = updated.rfid_data.clone().unwrap();

			h.manager.delete(&identity.id).unwrap();
			assert!(h.manager.lookup(Modality::Nfc, "card-1").is_none());
			assert!(h.manager.lookup(Modality::Rfid, &rfid).is_none());
			assert_eq!(h.manager.store().index_len(), 0);
			assert_eq!(
				h.backend.keys(),
				vec![format!("retired.{}", identity.id)]
			);
			assert!(matches!(
				h.manager.delete(&identity.id),
				Err(IdentityError::NotFound(_))
			));
		}

		#[test]
		fn update_unknown_is_not_found() {
			let mut h = harness();
			assert!(matches!(
				h.manager
					.update(&IdentityId::from("ghost"), IdentityUpdate::default()),
				Err(IdentityError::NotFound(_))
			));
		}
	}

	#[test]
	fn sanitize_username_examples() {
		assert_eq!(sanitize_username("Alice"), "alice");
		assert_eq!(sanitize_username("  j.doe@corp "), "j_doe_corp");
		assert_eq!(sanitize_username("!!!"), "identity");
	}
}
