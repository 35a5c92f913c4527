// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Identity configuration section.

use serde::{Deserialize, Serialize};

/// Ambient proximity threshold for the remote-scan modality when an identity
/// carries no `max_distance` of its own.
pub const DEFAULT_MAX_DISTANCE: f64 = 8.0;

/// Random bytes per minted credential token (hex encoded, so tokens are twice as long).
pub const DEFAULT_TOKEN_BYTES: usize = 16;

pub const MIN_TOKEN_BYTES: usize = 4;
pub const MAX_TOKEN_BYTES: usize = 64;

pub const DEFAULT_ID_SEPARATOR: &str = "_";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IdentityConfigLayer {
	pub default_max_distance: Option<f64>,
	pub token_bytes: Option<usize>,
	pub id_separator: Option<String>,
}

impl IdentityConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.default_max_distance.is_some() {
			self.default_max_distance = other.default_max_distance;
		}
		if other.token_bytes.is_some() {
			self.token_bytes = other.token_bytes;
		}
		if other.id_separator.is_some() {
			self.id_separator = other.id_separator;
		}
	}

	pub fn finalize(self) -> IdentityConfig {
		IdentityConfig {
			default_max_distance: self.default_max_distance.unwrap_or(DEFAULT_MAX_DISTANCE),
			token_bytes: self.token_bytes.unwrap_or(DEFAULT_TOKEN_BYTES),
			id_separator: self
				.id_separator
				.unwrap_or_else(|| DEFAULT_ID_SEPARATOR.to_string()),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IdentityConfig {
	pub default_max_distance: f64,
	pub token_bytes: usize,
	pub id_separator: String,
}

impl Default for IdentityConfig {
	fn default() -> Self {
		IdentityConfigLayer::default().finalize()
	}
}
