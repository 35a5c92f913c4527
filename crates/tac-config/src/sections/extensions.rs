// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Extension loader configuration section.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const DEFAULT_NAMESPACE: &str = "extensions";

/// Module name prefixes skipped during discovery (disabled and sample modules).
pub const DEFAULT_SKIP_PREFIXES: &[&str] = &["_", "example"];

/// What the loader does when the declared dependencies contain a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CyclePolicy {
	/// Fall back to discovery order and attempt every module anyway.
	#[default]
	Degrade,
	/// Load only modules that can be ordered; the cyclic subset and its
	/// dependents fail without being initialised.
	Abort,
}

impl fmt::Display for CyclePolicy {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			CyclePolicy::Degrade => write!(f, "degrade"),
			CyclePolicy::Abort => write!(f, "abort"),
		}
	}
}

impl FromStr for CyclePolicy {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"degrade" => Ok(CyclePolicy::Degrade),
			"abort" => Ok(CyclePolicy::Abort),
			other => Err(format!("unknown cycle policy '{other}'")),
		}
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExtensionsConfigLayer {
	pub namespace: Option<String>,
	pub skip_prefixes: Option<Vec<String>>,
	pub cycle_policy: Option<CyclePolicy>,
	/// Per-extension settings tables, keyed by extension name.
	pub settings: Option<BTreeMap<String, serde_json::Value>>,
}

impl ExtensionsConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.namespace.is_some() {
			self.namespace = other.namespace;
		}
		if other.skip_prefixes.is_some() {
			self.skip_prefixes = other.skip_prefixes;
		}
		if other.cycle_policy.is_some() {
			self.cycle_policy = other.cycle_policy;
		}
		// Settings merge per extension so an env or file layer can override one
		// extension without wiping the rest.
		if let Some(overlay) = other.settings {
			let settings = self.settings.get_or_insert_with(BTreeMap::new);
			settings.extend(overlay);
		}
	}

	pub fn finalize(self) -> ExtensionsConfig {
		ExtensionsConfig {
			namespace: self
				.namespace
				.unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
			skip_prefixes: self.skip_prefixes.unwrap_or_else(|| {
				DEFAULT_SKIP_PREFIXES
					.iter()
					.map(|p| p.to_string())
					.collect()
			}),
			cycle_policy: self.cycle_policy.unwrap_or_default(),
			settings: self.settings.unwrap_or_default(),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtensionsConfig {
	pub namespace: String,
	pub skip_prefixes: Vec<String>,
	pub cycle_policy: CyclePolicy,
	pub settings: BTreeMap<String, serde_json::Value>,
}

impl ExtensionsConfig {
	/// Returns true if a discovered module name matches one of the skip prefixes.
	pub fn is_skipped(&self, module_name: &str) -> bool {
		self.skip_prefixes
			.iter()
			.any(|prefix| !prefix.is_empty() && module_name.starts_with(prefix.as_str()))
	}

	pub fn settings_for(&self, extension: &str) -> Option<&serde_json::Value> {
		self.settings.get(extension)
	}
}

impl Default for ExtensionsConfig {
	fn default() -> Self {
		ExtensionsConfigLayer::default().finalize()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn test_default_values() {
		let config = ExtensionsConfig::default();
		assert_eq!(config.namespace, "extensions");
		assert_eq!(config.skip_prefixes, vec!["_", "example"]);
		assert_eq!(config.cycle_policy, CyclePolicy::Degrade);
		assert!(config.settings.is_empty());
	}

	#[test]
	fn test_is_skipped() {
		let config = ExtensionsConfig::default();
		assert!(config.is_skipped("_disabled"));
		assert!(config.is_skipped("example_hook"));
		assert!(!config.is_skipped("billing"));
	}

	#[test]
	fn test_empty_prefix_skips_nothing() {
		let config = ExtensionsConfigLayer {
			skip_prefixes: Some(vec![String::new()]),
			..Default::default()
		}
		.finalize();
		assert!(!config.is_skipped("billing"));
	}

	#[test]
	fn test_settings_merge_per_extension() {
		let mut base = ExtensionsConfigLayer {
			settings: Some(BTreeMap::from([
				("billing".to_string(), json!({"rate": 5})),
				("display".to_string(), json!({"theme": "dark"})),
			])),
			..Default::default()
		};
		base.merge(ExtensionsConfigLayer {
			settings: Some(BTreeMap::from([(
				"billing".to_string(),
				json!({"rate": 7}),
			)])),
			..Default::default()
		});
		let config = base.finalize();
		assert_eq!(config.settings_for("billing"), Some(&json!({"rate": 7})));
		assert_eq!(config.settings_for("display"), Some(&json!({"theme": "dark"})));
	}

	#[test]
	fn test_cycle_policy_parsing() {
		assert_eq!("abort".parse::<CyclePolicy>(), Ok(CyclePolicy::Abort));
		assert_eq!(" Degrade ".parse::<CyclePolicy>(), Ok(CyclePolicy::Degrade));
		assert!("strict".parse::<CyclePolicy>().is_err());
	}

	#[test]
	fn test_layer_from_toml_with_settings() {
		let layer: ExtensionsConfigLayer = toml::from_str(
			r#"
cycle_policy = "abort"

[settings.billing]
rate = 3
"#,
		)
		.unwrap();
		let config = layer.finalize();
		assert_eq!(config.cycle_policy, CyclePolicy::Abort);
		assert_eq!(config.settings_for("billing"), Some(&json!({"rate": 3})));
	}

	mod proptests {
		use super::*;
		use proptest::prelude::*;

		proptest! {
			#[test]
			fn later_layer_wins_per_extension(
				base in prop::collection::btree_map("[a-z]{1,6}", 0u32..100, 0..6),
				overlay in prop::collection::btree_map("[a-z]{1,6}", 0u32..100, 0..6),
			) {
				let layer = |m: &BTreeMap<String, u32>| ExtensionsConfigLayer {
					settings: Some(m.iter().map(|(k, v)| (k.clone(), json!(v))).collect()),
					..Default::default()
				};
				let mut merged = layer(&base);
				merged.merge(layer(&overlay));
				let config = merged.finalize();

				for (name, value) in &overlay {
					prop_assert_eq!(config.settings_for(name), Some(&json!(value)));
				}
				for (name, value) in base.iter().filter(|(k, _)| !overlay.contains_key(*k)) {
					prop_assert_eq!(config.settings_for(name), Some(&json!(value)));
				}
			}

			#[test]
			fn prefixed_names_are_skipped(prefix in "[a-z_]{1,4}", rest in "[a-z]{0,8}") {
				let config = ExtensionsConfigLayer {
					skip_prefixes: Some(vec![prefix.clone()]),
					..Default::default()
				}
				.finalize();
				let prefixed = format!("{prefix}{rest}");
				prop_assert!(config.is_skipped(&prefixed));
			}
		}
	}
}
