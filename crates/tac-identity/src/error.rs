// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for identity operations.

use thiserror::Error;

use crate::types::{IdentityId, Modality};

/// Result type for identity operations.
pub type Result<T> = std::result::Result<T, IdentityError>;

#[derive(Debug, Error)]
pub enum IdentityError {
	/// Missing or malformed input. Nothing was written.
	#[error("validation failed: {0}")]
	Validation(String),

	#[error("identity not found: {0}")]
	NotFound(IdentityId),

	/// The id is live or belonged to a deleted identity.
	#[error("identity id already used: {0}")]
	IdentityExists(IdentityId),

	#[error("{modality} is not enabled for identity {id}")]
	ModalityDisabled { id: IdentityId, modality: Modality },

	#[error("{modality} token is already assigned to another identity")]
	TokenInUse { modality: Modality },

	#[error("storage error: {0}")]
	Storage(#[from] StorageError),

	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),
}

/// Errors surfaced by a [`KeyValueStore`](crate::storage::KeyValueStore) backend.
#[derive(Debug, Error)]
pub enum StorageError {
	#[error("storage unavailable: {0}")]
	Unavailable(String),

	#[error("corrupt entry at {key}: {message}")]
	Corrupt { key: String, message: String },
}
