// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Built-in `beforeAccess` guards.
//!
//! The tag matcher has no notion of time or distance, so these checks are
//! expressed as ordinary hooks owned by `core`.

use tac_config::IdentityConfig;
use tac_identity::{Identity, Modality};

use crate::barrier::{Barrier, ScanContext};
use crate::error::Result;
use crate::hooks::{BeforeAccessHook, Hook, HookRegistry, HookVote};

pub const CORE_OWNER: &str = "core";
pub const EXPIRED_REASON: &str = "identity expired";

/// Denies identities whose expiration is at or before the scan time.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExpirationGuard;

impl BeforeAccessHook for ExpirationGuard {
	fn before_access(
		&self,
		identity: &Identity,
		_barrier: &Barrier,
		scan: &ScanContext,
	) -> Result<HookVote> {
		if identity.is_expired_at(scan.scanned_at) {
			Ok(HookVote::deny(EXPIRED_REASON))
		} else {
			Ok(HookVote::Continue)
		}
	}
}

/// Denies remote scans reported further away than the identity's threshold,
/// or the ambient default when the identity has none.
#[derive(Debug, Clone, Copy)]
pub struct DistanceGuard {
	default_max_distance: f64,
}

impl DistanceGuard {
	pub fn new(default_max_distance: f64) -> Self {
		Self {
			default_max_distance,
		}
	}

	pub fn limit_for(&self, identity: &Identity) -> f64 {
		identity.max_distance.unwrap_or(self.default_max_distance)
	}
}

impl BeforeAccessHook for DistanceGuard {
	fn before_access(
		&self,
		identity: &Identity,
		_barrier: &Barrier,
		scan: &ScanContext,
	) -> Result<HookVote> {
		if scan.modality != Modality::Rfid {
			return Ok(HookVote::Continue);
		}
		let Some(distance) = scan.distance else {
			return Ok(HookVote::Continue);
		};
		let limit = self.limit_for(identity);
		if distance > limit {
			Ok(HookVote::Deny(format!(
				"distance {distance:.1} exceeds limit {limit:.1}"
			)))
		} else {
			Ok(HookVote::Continue)
		}
	}
}

/// Register the expiration and distance guards ahead of any extension hooks.
pub fn register_builtin_guards(registry: &mut HookRegistry, config: &IdentityConfig) {
	registry.add(CORE_OWNER, Hook::before(ExpirationGuard));
	registry.add(
		CORE_OWNER,
		Hook::before(DistanceGuard::new(config.default_max_distance)),
	);
}
