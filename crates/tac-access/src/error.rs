// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

use crate::hooks::HookName;

pub type Result<T> = std::result::Result<T, HookError>;

#[derive(Debug, Error)]
pub enum HookError {
	#[error("unknown hook '{0}'")]
	UnknownHook(String),

	#[error("hook registered as {expected} but implements {actual}")]
	HookMismatch { expected: HookName, actual: HookName },

	/// Raised by a hook implementation. Isolated by the evaluator.
	#[error("hook failed: {0}")]
	Failed(String),
}

impl HookError {
	pub fn failed(message: impl Into<String>) -> Self {
		Self::Failed(message.into())
	}
}
