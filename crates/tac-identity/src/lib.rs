// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Identities, their credentials and the reverse index from credential token
//! to identity.

pub mod clock;
pub mod error;
pub mod lifecycle;
pub mod serde_helpers;
pub mod storage;
pub mod store;
pub mod token;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{IdentityError, Result, StorageError};
pub use lifecycle::{
	sanitize_username, CreateIdentity, CreateSubscription, IdentityManager, IdentityUpdate,
	RenewOptions,
};
pub use storage::{KeyValueStore, MemoryStore};
pub use store::{IdentityStore, CREDENTIAL_KEY_PREFIX, IDENTITY_KEY_PREFIX, RETIRED_KEY_PREFIX};
pub use token::TokenGenerator;
pub use types::{
	CredentialKey, CredentialStatus, Identity, IdentityId, IdentityInfo, IdentityStats, Modality,
};
