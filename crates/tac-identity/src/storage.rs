// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Key-value persistence contract consumed by the identity store.
//!
//! The core decides *what* is stored; a backend decides *how*. A `set` is
//! assumed durable once it returns `Ok`.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use crate::error::StorageError;

pub trait KeyValueStore: Send + Sync {
	fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StorageError>;

	fn set(&self, key: &str, value: serde_json::Value) -> Result<(), StorageError>;

	fn unset(&self, key: &str) -> Result<(), StorageError>;

	fn get_all(&self) -> Result<BTreeMap<String, serde_json::Value>, StorageError>;
}

/// In-process backend. Clones share the same map, so a test can keep a handle
/// and inspect what the store persisted.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
	entries: Arc<RwLock<BTreeMap<String, serde_json::Value>>>,
}

impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn len(&self) -> usize {
		self.entries.read().map(|e| e.len()).unwrap_or(0)
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn keys(&self) -> Vec<String> {
		self.entries
			.read()
			.map(|e| e.keys().cloned().collect())
			.unwrap_or_default()
	}
}

fn poisoned<T>(_: T) -> StorageError {
	StorageError::Unavailable("memory store lock poisoned".to_string())
}

impl KeyValueStore for MemoryStore {
	fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StorageError> {
		Ok(self.entries.read().map_err(poisoned)?.get(key).cloned())
	}

	fn set(&self, key: &str, value: serde_json::Value) -> Result<(), StorageError> {
		self.entries
			.write()
			.map_err(poisoned)?
			.insert(key.to_string(), value);
		Ok(())
	}

	fn unset(&self, key: &str) -> Result<(), StorageError> {
		self.entries.write().map_err(poisoned)?.remove(key);
		Ok(())
	}

	fn get_all(&self) -> Result<BTreeMap<String, serde_json::Value>, StorageError> {
		Ok(self.entries.read().map_err(poisoned)?.clone())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn set_get_unset() {
		let store = MemoryStore::new();
		store.set("a", json!(1)).unwrap();
		assert_eq!(store.get("a").unwrap(), Some(json!(1)));

		store.unset("a").unwrap();
		assert_eq!(store.get("a").unwrap(), None);
		assert!(store.is_empty());
	}

	#[test]
	fn unset_missing_key_is_ok() {
		let store = MemoryStore::new();
		assert!(store.unset("missing").is_ok());
	}

	#[test]
	fn clones_share_entries() {
		let store = MemoryStore::new();
		let handle = store.clone();
		store.set("k", json!("v")).unwrap();
		assert_eq!(handle.get_all().unwrap().len(), 1);
		assert_eq!(handle.keys(), vec!["k".to_string()]);
	}
}
