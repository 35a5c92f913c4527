// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Access evaluation configuration section.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AccessConfigLayer {
	pub builtin_guards: Option<bool>,
}

impl AccessConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.builtin_guards.is_some() {
			self.builtin_guards = other.builtin_guards;
		}
	}

	pub fn finalize(self) -> AccessConfig {
		AccessConfig {
			builtin_guards: self.builtin_guards.unwrap_or(true),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccessConfig {
	/// Register the expiration and distance guards as the first
	/// before-access hooks, ahead of any extension hooks.
	pub builtin_guards: bool,
}

impl Default for AccessConfig {
	fn default() -> Self {
		AccessConfigLayer::default().finalize()
	}
}
