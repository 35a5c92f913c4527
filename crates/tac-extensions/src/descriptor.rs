// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Extension metadata and the module contract.

use serde::{Deserialize, Serialize};

use crate::context::ExtensionContext;
use crate::error::{ExtensionError, Result};

pub const DEFAULT_VERSION: &str = "0.0.0";

/// Metadata as declared by a module. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExtensionMetadata {
	pub name: Option<String>,
	pub version: Option<String>,
	pub description: Option<String>,
	pub dependencies: Vec<String>,
	pub optional_dependencies: Vec<String>,
}

impl ExtensionMetadata {
	pub fn named(name: impl Into<String>) -> Self {
		Self {
			name: Some(name.into()),
			..Default::default()
		}
	}

	/// Parse metadata shipped as data alongside a module.
	pub fn from_json(module: &str, value: serde_json::Value) -> Result<Self> {
		serde_json::from_value(value).map_err(|e| ExtensionError::Metadata {
			module: module.to_string(),
			message: e.to_string(),
		})
	}

	pub fn version(mut self, version: impl Into<String>) -> Self {
		self.version = Some(version.into());
		self
	}

	pub fn description(mut self, description: impl Into<String>) -> Self {
		self.description = Some(description.into());
		self
	}

	pub fn depends_on(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
		self.dependencies.extend(names.into_iter().map(Into::into));
		self
	}

	pub fn optionally_depends_on(
		mut self,
		names: impl IntoIterator<Item = impl Into<String>>,
	) -> Self {
		self.optional_dependencies
			.extend(names.into_iter().map(Into::into));
		self
	}

	/// Fill defaults. The name falls back to the discovered module name.
	pub fn into_descriptor(self, module_name: &str) -> Result<ExtensionDescriptor> {
		let invalid = |message: String| ExtensionError::Metadata {
			module: module_name.to_string(),
			message,
		};

		let name = match self.name {
			Some(name) if name.trim().is_empty() => {
				return Err(invalid("name must not be empty".to_string()));
			}
			Some(name) => name,
			None => module_name.to_string(),
		};
		if let Some(dep) = self
			.dependencies
			.iter()
			.chain(&self.optional_dependencies)
			.find(|d| d.trim().is_empty())
		{
			return Err(invalid(format!("empty dependency name {dep:?}")));
		}

		Ok(ExtensionDescriptor {
			name,
			version: self.version.unwrap_or_else(|| DEFAULT_VERSION.to_string()),
			description: self.description.unwrap_or_default(),
			dependencies: self.dependencies,
			optional_dependencies: self.optional_dependencies,
		})
	}
}

/// Metadata with defaults applied. Rebuilt on every load pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtensionDescriptor {
	pub name: String,
	pub version: String,
	pub description: String,
	pub dependencies: Vec<String>,
	pub optional_dependencies: Vec<String>,
}

/// A loadable unit of behaviour.
pub trait ExtensionModule: Send + Sync {
	fn metadata(&self) -> Result<ExtensionMetadata> {
		Ok(ExtensionMetadata::default())
	}

	/// Register hooks, commands and background processes. Registrations only
	/// take effect if this returns `Ok`.
	fn init(&self, ctx: &mut ExtensionContext<'_>) -> Result<()>;
}

type InitFn = dyn Fn(&mut ExtensionContext<'_>) -> Result<()> + Send + Sync;

/// An [`ExtensionModule`] built from metadata and a closure.
pub struct FnExtension {
	metadata: ExtensionMetadata,
	init: Box<InitFn>,
}

impl FnExtension {
	pub fn new<F>(metadata: ExtensionMetadata, init: F) -> Self
	where
		F: Fn(&mut ExtensionContext<'_>) -> Result<()> + Send + Sync + 'static,
	{
		Self {
			metadata,
			init: Box::new(init),
		}
	}
}

impl ExtensionModule for FnExtension {
	fn metadata(&self) -> Result<ExtensionMetadata> {
		Ok(self.metadata.clone())
	}

	fn init(&self, ctx: &mut ExtensionContext<'_>) -> Result<()> {
		(self.init)(ctx)
	}
}
