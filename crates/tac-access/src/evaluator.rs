// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! One access decision, end to end.
//!
//! Evaluation walks `Scanning -> PreHooks -> Matching -> PostHooks` and ends
//! in `Granted` or `Denied`:
//!
//! 1. **Pre-hooks** run in registration order. The first explicit deny ends
//!    evaluation; tag matching is skipped.
//! 2. **Matching** runs the tag matcher over identity and barrier tags.
//! 3. **Post-hooks** observe the outcome but cannot change it.
//!
//! A hook that returns an error or panics is logged and treated as having
//! no opinion.

use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tac_audit::{AuditEventType, AuditLogEntry, AuditLogger};
use tac_identity::Identity;
use tracing::{debug, instrument, trace, warn};

use crate::barrier::{Barrier, ScanContext};
use crate::hooks::{HookRegistry, HookVote};
use crate::tags;

pub const UNKNOWN_CREDENTIAL: &str = "unknown credential";
pub const NO_MATCHING_TAG: &str = "no matching tag";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessPhase {
	Scanning,
	PreHooks,
	Matching,
	PostHooks,
	Granted,
	Denied,
}

impl fmt::Display for AccessPhase {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			AccessPhase::Scanning => "scanning",
			AccessPhase::PreHooks => "pre_hooks",
			AccessPhase::Matching => "matching",
			AccessPhase::PostHooks => "post_hooks",
			AccessPhase::Granted => "granted",
			AccessPhase::Denied => "denied",
		};
		f.write_str(s)
	}
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccessDecision {
	pub granted: bool,
	pub reason: Option<String>,
	/// Phase in which the outcome was decided: `Scanning` for an unknown
	/// credential, `PreHooks` for a veto, otherwise `Matching`.
	pub phase_reached: AccessPhase,
	/// Owner of the hook that vetoed, if any.
	pub vetoed_by: Option<String>,
}

impl AccessDecision {
	pub fn final_phase(&self) -> AccessPhase {
		if self.granted {
			AccessPhase::Granted
		} else {
			AccessPhase::Denied
		}
	}
}

pub struct AccessEvaluator {
	hooks: HookRegistry,
	audit: Arc<AuditLogger>,
}

impl AccessEvaluator {
	pub fn new(audit: Arc<AuditLogger>) -> Self {
		Self {
			hooks: HookRegistry::new(),
			audit,
		}
	}

	pub fn with_hooks(hooks: HookRegistry, audit: Arc<AuditLogger>) -> Self {
		Self { hooks, audit }
	}

	pub fn hooks(&self) -> &HookRegistry {
		&self.hooks
	}

	pub fn hooks_mut(&mut self) -> &mut HookRegistry {
		&mut self.hooks
	}

	#[instrument(
		skip(self, identity, barrier, scan),
		fields(identity_id = %identity.id, barrier_id = %barrier.id, modality = %scan.modality)
	)]
	pub fn evaluate(
		&self,
		identity: &Identity,
		barrier: &Barrier,
		scan: &ScanContext,
	) -> AccessDecision {
		trace!(phase = %AccessPhase::PreHooks, "access phase");
		let decision = match self.run_before_hooks(identity, barrier, scan) {
			Some((owner, reason)) => AccessDecision {
				granted: false,
				reason: Some(reason),
				phase_reached: AccessPhase::PreHooks,
				vetoed_by: Some(owner),
			},
			None => {
				trace!(phase = %AccessPhase::Matching, "access phase");
				let outcome = tags::evaluate(&identity.tags, &barrier.tags);
				AccessDecision {
					granted: outcome.granted,
					reason: Some(
						outcome
							.reason
							.unwrap_or_else(|| NO_MATCHING_TAG.to_string()),
					),
					phase_reached: AccessPhase::Matching,
					vetoed_by: None,
				}
			}
		};

		trace!(phase = %AccessPhase::PostHooks, "access phase");
		self.run_after_hooks(&decision, identity, barrier);

		debug!(
			granted = decision.granted,
			reason = decision.reason.as_deref().unwrap_or(""),
			phase = %decision.final_phase(),
			"access decided"
		);
		self.record(&decision, Some(identity), barrier, scan);
		decision
	}

	/// Deny a credential that maps to no identity. Hooks are not consulted
	/// since they require an identity.
	#[instrument(skip(self, barrier, scan), fields(barrier_id = %barrier.id, modality = %scan.modality))]
	pub fn deny_unknown(&self, barrier: &Barrier, scan: &ScanContext) -> AccessDecision {
		let decision = AccessDecision {
			granted: false,
			reason: Some(UNKNOWN_CREDENTIAL.to_string()),
			phase_reached: AccessPhase::Scanning,
			vetoed_by: None,
		};
		debug!("unknown credential denied");
		self.record(&decision, None, barrier, scan);
		decision
	}

	fn run_before_hooks(
		&self,
		identity: &Identity,
		barrier: &Barrier,
		scan: &ScanContext,
	) -> Option<(String, String)> {
		for registered in self.hooks.before_hooks() {
			let result = catch_unwind(AssertUnwindSafe(|| {
				registered.hook.before_access(identity, barrier, scan)
			}));
			match result {
				Ok(Ok(HookVote::Continue)) => {}
				Ok(Ok(HookVote::Deny(reason))) => {
					debug!(owner = %registered.owner, reason = %reason, "access vetoed by hook");
					return Some((registered.owner.clone(), reason));
				}
				Ok(Err(e)) => {
					warn!(owner = %registered.owner, error = %e, "beforeAccess hook failed, ignoring its vote");
				}
				Err(panic) => {
					warn!(
						owner = %registered.owner,
						panic = %panic_message(panic.as_ref()),
						"beforeAccess hook panicked, ignoring its vote"
					);
				}
			}
		}
		None
	}

	fn run_after_hooks(&self, decision: &AccessDecision, identity: &Identity, barrier: &Barrier) {
		for registered in self.hooks.after_hooks() {
			let result = catch_unwind(AssertUnwindSafe(|| {
				registered.hook.after_access(decision, identity, barrier)
			}));
			match result {
				Ok(Ok(())) => {}
				Ok(Err(e)) => {
					warn!(owner = %registered.owner, error = %e, "afterAccess hook failed");
				}
				Err(panic) => {
					warn!(
						owner = %registered.owner,
						panic = %panic_message(panic.as_ref()),
						"afterAccess hook panicked"
					);
				}
			}
		}
	}

	fn record(
		&self,
		decision: &AccessDecision,
		identity: Option<&Identity>,
		barrier: &Barrier,
		scan: &ScanContext,
	) {
		let event_type = if decision.granted {
			AuditEventType::AccessGranted
		} else {
			AuditEventType::AccessDenied
		};
		self.audit.log(
			AuditLogEntry::builder(event_type)
				.actor_opt(identity.map(|i| i.id.to_string()))
				.resource("barrier", barrier.id.as_str())
				.details(json!({
					"identity_id": identity.map(|i| i.id.as_str()),
					"modality": scan.modality,
					"distance": scan.distance,
					"reason": decision.reason,
					"phase": decision.phase_reached,
					"vetoed_by": decision.vetoed_by,
				}))
				.build(),
		);
	}
}

impl fmt::Debug for AccessEvaluator {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("AccessEvaluator")
			.field("hooks", &self.hooks)
			.finish()
	}
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
	if let Some(s) = payload.downcast_ref::<&str>() {
		s.to_string()
	} else if let Some(s) = payload.downcast_ref::<String>() {
		s.clone()
	} else {
		"non-string panic payload".to_string()
	}
}
