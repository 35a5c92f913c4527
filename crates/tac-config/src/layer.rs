// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Partial configuration produced by a single source.

use serde::{Deserialize, Serialize};

use crate::sections::{
	AccessConfigLayer, AuditConfigLayer, ExtensionsConfigLayer, IdentityConfigLayer,
	LoggingConfigLayer,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TacConfigLayer {
	pub identity: Option<IdentityConfigLayer>,
	pub extensions: Option<ExtensionsConfigLayer>,
	pub access: Option<AccessConfigLayer>,
	pub audit: Option<AuditConfigLayer>,
	pub logging: Option<LoggingConfigLayer>,
}

impl TacConfigLayer {
	/// Merge a higher-precedence layer on top of this one.
	pub fn merge(&mut self, other: Self) {
		merge_section(&mut self.identity, other.identity, IdentityConfigLayer::merge);
		merge_section(
			&mut self.extensions,
			other.extensions,
			ExtensionsConfigLayer::merge,
		);
		merge_section(&mut self.access, other.access, AccessConfigLayer::merge);
		merge_section(&mut self.audit, other.audit, AuditConfigLayer::merge);
		merge_section(&mut self.logging, other.logging, LoggingConfigLayer::merge);
	}
}

fn merge_section<T>(base: &mut Option<T>, overlay: Option<T>, merge: fn(&mut T, T)) {
	match (base.as_mut(), overlay) {
		(Some(existing), Some(layer)) => merge(existing, layer),
		(None, Some(layer)) => *base = Some(layer),
		(_, None) => {}
	}
}
