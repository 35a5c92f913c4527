// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The surface an extension sees during `init`.
//!
//! Registrations are staged in the context and only committed to the
//! registry once `init` returns `Ok`. A failing extension leaves nothing
//! behind.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use tac_access::{Hook, HookRegistry};

use crate::background::BackgroundProcess;
use crate::command::CommandDescriptor;
use crate::descriptor::ExtensionDescriptor;
use crate::error::{ExtensionError, Result};
use crate::registry::ExtensionRegistry;

#[derive(Default)]
pub(crate) struct Staged {
	pub hooks: HookRegistry,
	pub commands: IndexMap<String, CommandDescriptor>,
	pub processes: IndexMap<String, Arc<dyn BackgroundProcess>>,
}

pub struct ExtensionContext<'a> {
	descriptor: &'a ExtensionDescriptor,
	settings: Option<&'a serde_json::Value>,
	registry: &'a ExtensionRegistry,
	staged: Staged,
}

impl<'a> ExtensionContext<'a> {
	pub(crate) fn new(
		descriptor: &'a ExtensionDescriptor,
		settings: Option<&'a serde_json::Value>,
		registry: &'a ExtensionRegistry,
	) -> Self {
		Self {
			descriptor,
			settings,
			registry,
			staged: Staged::default(),
		}
	}

	pub fn descriptor(&self) -> &ExtensionDescriptor {
		self.descriptor
	}

	pub fn name(&self) -> &str {
		&self.descriptor.name
	}

	/// This extension's table from the `[extensions.settings]` config section.
	pub fn settings(&self) -> Option<&serde_json::Value> {
		self.settings
	}

	/// Deserialize this extension's settings. `None` if none were configured.
	pub fn settings_as<T: DeserializeOwned>(&self) -> Result<Option<T>> {
		self.settings
			.map(|value| {
				serde_json::from_value(value.clone()).map_err(|e| {
					ExtensionError::init(self.name(), format!("invalid settings: {e}"))
				})
			})
			.transpose()
	}

	/// Whether another extension has already been loaded.
	pub fn is_loaded(&self, name: &str) -> bool {
		self.registry.is_loaded(name)
	}

	/// Register a hook under `beforeAccess` or `afterAccess`.
	pub fn add_hook(&mut self, name: &str, hook: Hook) -> Result<()> {
		let owner = self.descriptor.name.clone();
		self.staged.hooks.add_hook(name, owner, hook)?;
		Ok(())
	}

	pub fn register_command(
		&mut self,
		name: impl Into<String>,
		command: CommandDescriptor,
	) -> Result<()> {
		let name = name.into();
		if self.registry.has_command(&name) || self.staged.commands.contains_key(&name) {
			return Err(ExtensionError::DuplicateCommand(name));
		}
		self.staged.commands.insert(name, command);
		Ok(())
	}

	pub fn register_background_process(
		&mut self,
		name: impl Into<String>,
		process: impl BackgroundProcess + 'static,
	) -> Result<()> {
		let name = name.into();
		if self.registry.has_background_process(&name)
			|| self.staged.processes.contains_key(&name)
		{
			return Err(ExtensionError::DuplicateBackgroundProcess(name));
		}
		self.staged.processes.insert(name, Arc::new(process));
		Ok(())
	}

	pub(crate) fn into_staged(self) -> Staged {
		self.staged
	}
}

impl std::fmt::Debug for ExtensionContext<'_> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ExtensionContext")
			.field("extension", &self.descriptor.name)
			.field("staged_hooks", &self.staged.hooks.len())
			.field("staged_commands", &self.staged.commands.len())
			.field("staged_processes", &self.staged.processes.len())
			.finish()
	}
}
