// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Access hooks and their registry.
//!
//! Two extension points exist. `beforeAccess` hooks run ahead of tag matching
//! and may veto; `afterAccess` hooks observe the final decision. Hooks run in
//! registration order, which is the extension load order.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tac_identity::Identity;
use tracing::debug;

use crate::barrier::{Barrier, ScanContext};
use crate::error::{HookError, Result};
use crate::evaluator::AccessDecision;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HookName {
	#[serde(rename = "beforeAccess")]
	BeforeAccess,
	#[serde(rename = "afterAccess")]
	AfterAccess,
}

impl HookName {
	pub fn as_str(&self) -> &'static str {
		match self {
			HookName::BeforeAccess => "beforeAccess",
			HookName::AfterAccess => "afterAccess",
		}
	}
}

impl fmt::Display for HookName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for HookName {
	type Err = HookError;

	fn from_str(s: &str) -> Result<Self> {
		match s {
			"beforeAccess" => Ok(HookName::BeforeAccess),
			"afterAccess" => Ok(HookName::AfterAccess),
			other => Err(HookError::UnknownHook(other.to_string())),
		}
	}
}

/// What a `beforeAccess` hook wants to happen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookVote {
	/// No opinion; evaluation proceeds.
	Continue,
	/// Deny outright, skipping tag matching.
	Deny(String),
}

impl HookVote {
	pub fn deny(reason: impl Into<String>) -> Self {
		Self::Deny(reason.into())
	}
}

pub trait BeforeAccessHook: Send + Sync {
	fn before_access(
		&self,
		identity: &Identity,
		barrier: &Barrier,
		scan: &ScanContext,
	) -> Result<HookVote>;
}

pub trait AfterAccessHook: Send + Sync {
	fn after_access(
		&self,
		decision: &AccessDecision,
		identity: &Identity,
		barrier: &Barrier,
	) -> Result<()>;
}

impl<F> BeforeAccessHook for F
where
	F: Fn(&Identity, &Barrier, &ScanContext) -> Result<HookVote> + Send + Sync,
{
	fn before_access(
		&self,
		identity: &Identity,
		barrier: &Barrier,
		scan: &ScanContext,
	) -> Result<HookVote> {
		self(identity, barrier, scan)
	}
}

impl<F> AfterAccessHook for F
where
	F: Fn(&AccessDecision, &Identity, &Barrier) -> Result<()> + Send + Sync,
{
	fn after_access(
		&self,
		decision: &AccessDecision,
		identity: &Identity,
		barrier: &Barrier,
	) -> Result<()> {
		self(decision, identity, barrier)
	}
}

/// A hook implementation tagged with the extension point it serves.
#[derive(Clone)]
pub enum Hook {
	Before(Arc<dyn BeforeAccessHook>),
	After(Arc<dyn AfterAccessHook>),
}

impl Hook {
	pub fn before(hook: impl BeforeAccessHook + 'static) -> Self {
		Self::Before(Arc::new(hook))
	}

	pub fn after(hook: impl AfterAccessHook + 'static) -> Self {
		Self::After(Arc::new(hook))
	}

	pub fn name(&self) -> HookName {
		match self {
			Hook::Before(_) => HookName::BeforeAccess,
			Hook::After(_) => HookName::AfterAccess,
		}
	}
}

impl fmt::Debug for Hook {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("Hook").field(&self.name()).finish()
	}
}

/// A hook plus the name of whoever registered it.
pub struct Registered<T: ?Sized> {
	pub owner: String,
	pub hook: Arc<T>,
}

impl<T: ?Sized> Clone for Registered<T> {
	fn clone(&self) -> Self {
		Self {
			owner: self.owner.clone(),
			hook: Arc::clone(&self.hook),
		}
	}
}

#[derive(Clone, Default)]
pub struct HookRegistry {
	before: Vec<Registered<dyn BeforeAccessHook>>,
	after: Vec<Registered<dyn AfterAccessHook>>,
}

impl HookRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Register `hook` under a textual hook name. Unknown names and hooks of
	/// the wrong kind are rejected.
	pub fn add_hook(&mut self, name: &str, owner: impl Into<String>, hook: Hook) -> Result<()> {
		let expected: HookName = name.parse()?;
		let actual = hook.name();
		if expected != actual {
			return Err(HookError::HookMismatch { expected, actual });
		}
		self.add(owner, hook);
		Ok(())
	}

	pub fn add(&mut self, owner: impl Into<String>, hook: Hook) {
		let owner = owner.into();
		debug!(owner = %owner, hook = %hook.name(), "hook registered");
		match hook {
			Hook::Before(hook) => self.before.push(Registered { owner, hook }),
			Hook::After(hook) => self.after.push(Registered { owner, hook }),
		}
	}

	/// Append every hook from `other`, keeping its order.
	pub fn extend(&mut self, other: HookRegistry) {
		self.before.extend(other.before);
		self.after.extend(other.after);
	}

	pub fn before_hooks(&self) -> &[Registered<dyn BeforeAccessHook>] {
		&self.before
	}

	pub fn after_hooks(&self) -> &[Registered<dyn AfterAccessHook>] {
		&self.after
	}

	pub fn len(&self) -> usize {
		self.before.len() + self.after.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn count_for(&self, owner: &str) -> usize {
		self.before.iter().filter(|r| r.owner == owner).count()
			+ self.after.iter().filter(|r| r.owner == owner).count()
	}
}

impl fmt::Debug for HookRegistry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("HookRegistry")
			.field(
				"before",
				&self.before.iter().map(|r| &r.owner).collect::<Vec<_>>(),
			)
			.field(
				"after",
				&self.after.iter().map(|r| &r.owner).collect::<Vec<_>>(),
			)
			.finish()
	}
}
