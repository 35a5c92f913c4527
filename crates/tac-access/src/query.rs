// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use tac_identity::{Identity, IdentityManager};

use crate::tags;

/// Identities whose tags satisfy `required` under the hierarchy and wildcard
/// rules. Expiry is not considered.
pub fn identities_satisfying<'a>(manager: &'a IdentityManager, required: &str) -> Vec<&'a Identity> {
	manager.filter(|identity| tags::evaluate(&identity.tags, [required]).granted)
}
