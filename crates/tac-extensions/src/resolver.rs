// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Module discovery.
//!
//! A [`ModuleResolver`] abstracts however extension code is located and
//! loaded. The loader only asks it for names in a namespace and for the module
//! behind a qualified name.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::descriptor::ExtensionModule;
use crate::error::{ExtensionError, Result};

pub trait ModuleResolver: Send + Sync {
	/// Module names in `namespace`, in discovery order.
	fn list_modules(&self, namespace: &str) -> Result<Vec<String>>;

	fn load_module(&self, qualified_name: &str) -> Result<Arc<dyn ExtensionModule>>;
}

pub fn qualified_name(namespace: &str, module: &str) -> String {
	format!("{namespace}.{module}")
}

enum Entry {
	Module(Arc<dyn ExtensionModule>),
	Broken(String),
}

/// Resolver backed by modules registered in process.
#[derive(Default)]
pub struct InMemoryResolver {
	namespaces: IndexMap<String, IndexMap<String, Entry>>,
}

impl InMemoryResolver {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn register(
		&mut self,
		namespace: &str,
		name: &str,
		module: impl ExtensionModule + 'static,
	) -> &mut Self {
		self.insert(namespace, name, Entry::Module(Arc::new(module)))
	}

	/// A module that is listed but fails to load.
	pub fn register_broken(
		&mut self,
		namespace: &str,
		name: &str,
		message: impl Into<String>,
	) -> &mut Self {
		self.insert(namespace, name, Entry::Broken(message.into()))
	}

	fn insert(&mut self, namespace: &str, name: &str, entry: Entry) -> &mut Self {
		self.namespaces
			.entry(namespace.to_string())
			.or_default()
			.insert(name.to_string(), entry);
		self
	}
}

impl ModuleResolver for InMemoryResolver {
	fn list_modules(&self, namespace: &str) -> Result<Vec<String>> {
		Ok(self
			.namespaces
			.get(namespace)
			.map(|modules| modules.keys().cloned().collect())
			.unwrap_or_default())
	}

	fn load_module(&self, qualified_name: &str) -> Result<Arc<dyn ExtensionModule>> {
		let not_found = || ExtensionError::Resolve {
			module: qualified_name.to_string(),
			message: "no such module".to_string(),
		};
		// Namespaces may contain dots, so match registered prefixes rather than
		// splitting. The longest namespace wins.
		let entry = self
			.namespaces
			.iter()
			.filter_map(|(namespace, modules)| {
				let name = qualified_name
					.strip_prefix(namespace.as_str())?
					.strip_prefix('.')?;
				Some((namespace.len(), modules.get(name)?))
			})
			.max_by_key(|(len, _)| *len)
			.map(|(_, entry)| entry);
		match entry {
			Some(Entry::Module(module)) => Ok(Arc::clone(module)),
			Some(Entry::Broken(message)) => Err(ExtensionError::Resolve {
				module: qualified_name.to_string(),
				message: message.clone(),
			}),
			None => Err(not_found()),
		}
	}
}

impl std::fmt::Debug for InMemoryResolver {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_map()
			.entries(
				self.namespaces
					.iter()
					.map(|(ns, modules)| (ns, modules.keys().collect::<Vec<_>>())),
			)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::context::ExtensionContext;
	use crate::descriptor::{ExtensionMetadata, FnExtension};

	fn noop() -> FnExtension {
		FnExtension::new(ExtensionMetadata::default(), |_: &mut ExtensionContext<'_>| Ok(()))
	}

	#[test]
	fn lists_in_registration_order() {
		let mut resolver = InMemoryResolver::new();
		resolver
			.register("extensions", "zeta", noop())
			.register("extensions", "alpha", noop())
			.register("other", "beta", noop());

		assert_eq!(
			resolver.list_modules("extensions").unwrap(),
			vec!["zeta", "alpha"]
		);
		assert!(resolver.list_modules("missing").unwrap().is_empty());
	}

	#[test]
	fn load_module_resolves_qualified_names() {
		let mut resolver = InMemoryResolver::new();
		resolver
			.register("extensions", "alpha", noop())
			.register_broken("extensions", "bad", "syntax error");

		assert!(resolver.load_module("extensions.alpha").is_ok());
		assert!(matches!(
			resolver.load_module("extensions.bad"),
			Err(ExtensionError::Resolve { message, .. }) if message == "syntax error"
		));
		assert!(resolver.load_module("extensions.ghost").is_err());
		assert!(resolver.load_module("unqualified").is_err());
	}

	#[test]
	fn dotted_namespaces_resolve_by_prefix() {
		let mut resolver = InMemoryResolver::new();
		resolver
			.register("tac.ext", "billing", noop())
			.register("tac", "ext", noop());

		assert_eq!(resolver.list_modules("tac.ext").unwrap(), vec!["billing"]);
		assert!(resolver
			.load_module(&qualified_name("tac.ext", "billing"))
			.is_ok());
		assert!(resolver.load_module(&qualified_name("tac", "ext")).is_ok());
		assert!(resolver.load_module("tac.ext.ghost").is_err());
	}
}
