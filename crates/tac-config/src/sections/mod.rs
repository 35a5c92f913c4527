// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

mod access;
mod audit;
mod extensions;
mod identity;
mod logging;

pub use access::{AccessConfig, AccessConfigLayer};
pub use audit::{AuditConfig, AuditConfigLayer, AUDIT_SEVERITY_NAMES};
pub use extensions::{
	CyclePolicy, ExtensionsConfig, ExtensionsConfigLayer, DEFAULT_NAMESPACE, DEFAULT_SKIP_PREFIXES,
};
pub use identity::{
	IdentityConfig, IdentityConfigLayer, DEFAULT_ID_SEPARATOR, DEFAULT_MAX_DISTANCE,
	DEFAULT_TOKEN_BYTES, MAX_TOKEN_BYTES, MIN_TOKEN_BYTES,
};
pub use logging::{LoggingConfig, LoggingConfigLayer};
