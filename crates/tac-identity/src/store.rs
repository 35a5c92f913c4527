// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Identity records plus the credential reverse index.
//!
//! The store enforces three invariants on every write:
//!
//! - every record passes [`Identity::validate`]
//! - every issued token maps to exactly one identity in the reverse index,
//!   with no stale or duplicate entries, whatever its modality
//! - an id that was ever deleted is retired and never stored again
//!
//! In-memory state is updated first, then written through to the
//! [`KeyValueStore`]. Records are the source of truth: [`IdentityStore::load`]
//! rebuilds the index from them and repairs whatever it finds persisted.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde_json::json;
use tracing::{debug, warn};

use crate::error::{IdentityError, Result, StorageError};
use crate::storage::KeyValueStore;
use crate::types::{CredentialKey, Identity, IdentityId, Modality};

pub const IDENTITY_KEY_PREFIX: &str = "identity.";
pub const CREDENTIAL_KEY_PREFIX: &str = "credential.";
pub const RETIRED_KEY_PREFIX: &str = "retired.";

pub fn identity_storage_key(id: &IdentityId) -> String {
	format!("{IDENTITY_KEY_PREFIX}{id}")
}

pub fn credential_storage_key(key: &CredentialKey) -> String {
	format!("{CREDENTIAL_KEY_PREFIX}{key}")
}

pub fn retired_storage_key(id: &IdentityId) -> String {
	format!("{RETIRED_KEY_PREFIX}{id}")
}

/// Owner of `token` under any modality.
fn token_owner<'a>(
	index: &'a HashMap<CredentialKey, IdentityId>,
	token: &str,
) -> Option<&'a IdentityId> {
	Modality::all()
		.iter()
		.find_map(|&modality| index.get(&CredentialKey::new(modality, token)))
}

pub struct IdentityStore {
	records: BTreeMap<IdentityId, Identity>,
	index: HashMap<CredentialKey, IdentityId>,
	retired: BTreeSet<IdentityId>,
	backend: Box<dyn KeyValueStore>,
}

impl IdentityStore {
	/// An empty store. Anything already in `backend` is ignored; use [`load`](Self::load) to hydrate.
	pub fn new(backend: Box<dyn KeyValueStore>) -> Self {
		Self {
			records: BTreeMap::new(),
			index: HashMap::new(),
			retired: BTreeSet::new(),
			backend,
		}
	}

	/// Hydrate from `backend`, rebuilding and repairing the persisted reverse index.
	pub fn load(backend: Box<dyn KeyValueStore>) -> Result<Self> {
		let all = backend.get_all()?;
		let mut store = Self::new(backend);
		let mut persisted_index = BTreeMap::new();

		for (key, value) in all {
			if key.starts_with(IDENTITY_KEY_PREFIX) {
				let identity: Identity =
					serde_json::from_value(value).map_err(|e| StorageError::Corrupt {
						key: key.clone(),
						message: e.to_string(),
					})?;
				store.records.insert(identity.id.clone(), identity);
			} else if key.starts_with(CREDENTIAL_KEY_PREFIX) {
				persisted_index.insert(key, value);
			} else if let Some(id) = key.strip_prefix(RETIRED_KEY_PREFIX) {
				store.retired.insert(IdentityId::from(id));
			}
		}

		// Rebuild in id order so a duplicated token deterministically stays
		// with the first identity that claims it.
		let mut repaired = Vec::new();
		for identity in store.records.values_mut() {
			for key in identity.credential_keys() {
				let claimed = token_owner(&store.index, &key.token)
					.is_some_and(|owner| owner != &identity.id);
				if claimed {
					warn!(
						identity_id = %identity.id,
						modality = %key.modality,
						"duplicate credential token found while loading, clearing it"
					);
					identity.set_token(key.modality, None);
					repaired.push(identity.id.clone());
				} else {
					store.index.insert(key, identity.id.clone());
				}
			}
		}

		for id in repaired {
			if let Some(identity) = store.records.get(&id) {
				store
					.backend
					.set(&identity_storage_key(&id), serde_json::to_value(identity)?)?;
			}
		}

		let expected: BTreeMap<String, &IdentityId> = store
			.index
			.iter()
			.map(|(key, id)| (credential_storage_key(key), id))
			.collect();

		let mut stale = 0usize;
		for (key, value) in &persisted_index {
			let matches = expected
				.get(key)
				.is_some_and(|id| value.as_str() == Some(id.as_str()));
			if !matches {
				store.backend.unset(key)?;
				stale += 1;
			}
		}
		for (key, id) in &expected {
			let present = persisted_index
				.get(key)
				.is_some_and(|value| value.as_str() == Some(id.as_str()));
			if !present {
				store.backend.set(key, json!(id.as_str()))?;
			}
		}

		debug!(
			identities = store.records.len(),
			credentials = store.index.len(),
			retired = store.retired.len(),
			stale_index_entries = stale,
			"identity store loaded"
		);
		Ok(store)
	}

	pub fn get(&self, id: &IdentityId) -> Option<&Identity> {
		self.records.get(id)
	}

	pub fn contains(&self, id: &IdentityId) -> bool {
		self.records.contains_key(id)
	}

	/// Whether `id` belonged to an identity that has since been deleted.
	pub fn is_retired(&self, id: &IdentityId) -> bool {
		self.retired.contains(id)
	}

	/// Live or retired. A taken id can never be handed out again.
	pub fn is_taken(&self, id: &IdentityId) -> bool {
		self.contains(id) || self.is_retired(id)
	}

	/// O(1) reverse-index read.
	pub fn lookup(&self, modality: Modality, token: &str) -> Option<&Identity> {
		let key = CredentialKey::new(modality, token);
		self.index.get(&key).and_then(|id| self.records.get(id))
	}

	pub fn owner_of(&self, key: &CredentialKey) -> Option<&IdentityId> {
		self.index.get(key)
	}

	/// Owner of `token` in any modality.
	pub fn token_owner(&self, token: &str) -> Option<&IdentityId> {
		token_owner(&self.index, token)
	}

	/// All identities in id order.
	pub fn iter(&self) -> impl Iterator<Item = &Identity> {
		self.records.values()
	}

	pub fn len(&self) -> usize {
		self.records.len()
	}

	pub fn is_empty(&self) -> bool {
		self.records.is_empty()
	}

	pub fn index_len(&self) -> usize {
		self.index.len()
	}

	/// Insert or replace a record.
	///
	/// Index entries for tokens the record no longer carries are removed before
	/// entries for its new tokens are inserted. A token owned by another
	/// identity, in any modality, or a retired id rejects the whole write with
	/// nothing changed.
	pub fn put(&mut self, identity: Identity) -> Result<()> {
		identity.validate()?;
		if self.is_retired(&identity.id) {
			return Err(IdentityError::IdentityExists(identity.id));
		}

		let new_keys = identity.credential_keys();
		for key in &new_keys {
			if let Some(owner) = self.token_owner(&key.token) {
				if owner != &identity.id {
					return Err(IdentityError::TokenInUse {
						modality: key.modality,
					});
				}
			}
		}

		let value = serde_json::to_value(&identity)?;
		let old_keys = self
			.records
			.get(&identity.id)
			.map(Identity::credential_keys)
			.unwrap_or_default();
		let stale: Vec<CredentialKey> = old_keys
			.into_iter()
			.filter(|k| !new_keys.contains(k))
			.collect();
		let added: Vec<CredentialKey> = new_keys
			.into_iter()
			.filter(|k| !self.index.contains_key(k))
			.collect();

		let id = identity.id.clone();
		for key in &stale {
			self.index.remove(key);
		}
		for key in &added {
			self.index.insert(key.clone(), id.clone());
		}
		self.records.insert(id.clone(), identity);

		self.backend.set(&identity_storage_key(&id), value)?;
		for key in &stale {
			self.backend.unset(&credential_storage_key(key))?;
		}
		for key in &added {
			self.backend
				.set(&credential_storage_key(key), json!(id.as_str()))?;
		}
		Ok(())
	}

	/// Remove a record and every index entry for its tokens. The id is retired.
	pub fn remove(&mut self, id: &IdentityId) -> Result<Identity> {
		let identity = self
			.records
			.remove(id)
			.ok_or_else(|| IdentityError::NotFound(id.clone()))?;

		let keys = identity.credential_keys();
		for key in &keys {
			self.index.remove(key);
		}
		self.retired.insert(id.clone());

		for key in &keys {
			self.backend.unset(&credential_storage_key(key))?;
		}
		self.backend.unset(&identity_storage_key(id))?;
		self.backend.set(&retired_storage_key(id), json!(true))?;
		Ok(identity)
	}
}

impl std::fmt::Debug for IdentityStore {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("IdentityStore")
			.field("identities", &self.records.len())
			.field("credentials", &self.index.len())
			.field("retired", &self.retired.len())
			.finish()
	}
}
