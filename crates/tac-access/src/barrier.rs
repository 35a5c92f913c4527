// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use tac_identity::Modality;

/// A door, gate or turnstile, as far as access decisions are concerned.
///
/// Barriers are owned by an external registry; the evaluator only needs the
/// id for auditing and the required tags for matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Barrier {
	pub id: String,
	pub tags: IndexSet<String>,
}

impl Barrier {
	pub fn new(id: impl Into<String>, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
		Self {
			id: id.into(),
			tags: tags.into_iter().map(Into::into).collect(),
		}
	}
}

/// How and when a credential was presented.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScanContext {
	pub modality: Modality,
	/// Reported reader distance. Only meaningful for remote scans.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub distance: Option<f64>,
	pub scanned_at: DateTime<Utc>,
}

impl ScanContext {
	pub fn new(modality: Modality, scanned_at: DateTime<Utc>) -> Self {
		Self {
			modality,
			distance: None,
			scanned_at,
		}
	}

	pub fn with_distance(mut self, distance: f64) -> Self {
		self.distance = Some(distance);
		self
	}
}
