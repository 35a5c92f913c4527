// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Access decisions: tag matching plus the `beforeAccess`/`afterAccess` hook
//! pipeline.

pub mod barrier;
pub mod error;
pub mod evaluator;
pub mod guards;
pub mod hooks;
pub mod query;
pub mod tags;

pub use barrier::{Barrier, ScanContext};
pub use error::HookError;
pub use evaluator::{
	AccessDecision, AccessEvaluator, AccessPhase, NO_MATCHING_TAG, UNKNOWN_CREDENTIAL,
};
pub use guards::{
	register_builtin_guards, DistanceGuard, ExpirationGuard, CORE_OWNER, EXPIRED_REASON,
};
pub use hooks::{AfterAccessHook, BeforeAccessHook, Hook, HookName, HookRegistry, HookVote};
pub use query::identities_satisfying;
pub use tags::{
	evaluate, expand_hierarchy, expand_identity_tags, tag_satisfies, MatchOutcome, ANY_TAG,
};
