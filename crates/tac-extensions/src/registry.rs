// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Bookkeeping for loaded extensions and what they registered.
//!
//! One registry belongs to one instance; nothing here is global.

use std::sync::Arc;

use indexmap::IndexMap;
use tac_access::HookRegistry;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::background::{spawn_process, BackgroundProcess, BackgroundTasks};
use crate::command::CommandDescriptor;
use crate::context::Staged;
use crate::descriptor::{ExtensionDescriptor, ExtensionModule};
use crate::error::{CommandError, ExtensionError, Result};

#[derive(Clone)]
pub struct LoadedExtension {
	pub descriptor: ExtensionDescriptor,
	pub module: Arc<dyn ExtensionModule>,
}

#[derive(Debug, Clone)]
pub struct RegisteredCommand {
	pub owner: String,
	pub descriptor: CommandDescriptor,
}

#[derive(Clone)]
pub struct RegisteredProcess {
	pub owner: String,
	pub process: Arc<dyn BackgroundProcess>,
}

#[derive(Default)]
pub struct ExtensionRegistry {
	extensions: IndexMap<String, LoadedExtension>,
	commands: IndexMap<String, RegisteredCommand>,
	processes: IndexMap<String, RegisteredProcess>,
}

impl ExtensionRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn is_loaded(&self, name: &str) -> bool {
		self.extensions.contains_key(name)
	}

	pub fn extension(&self, name: &str) -> Option<&LoadedExtension> {
		self.extensions.get(name)
	}

	/// Loaded extension names in load order.
	pub fn loaded_names(&self) -> impl Iterator<Item = &str> {
		self.extensions.keys().map(String::as_str)
	}

	pub fn len(&self) -> usize {
		self.extensions.len()
	}

	pub fn is_empty(&self) -> bool {
		self.extensions.is_empty()
	}

	/// Record a loaded extension.
	pub fn register_extension(
		&mut self,
		descriptor: ExtensionDescriptor,
		module: Arc<dyn ExtensionModule>,
	) -> Result<()> {
		if self.is_loaded(&descriptor.name) {
			return Err(ExtensionError::AlreadyLoaded(descriptor.name));
		}
		debug!(extension = %descriptor.name, version = %descriptor.version, "extension registered");
		self.extensions
			.insert(descriptor.name.clone(), LoadedExtension { descriptor, module });
		Ok(())
	}

	pub fn has_command(&self, name: &str) -> bool {
		self.commands.contains_key(name)
	}

	pub fn command(&self, name: &str) -> Option<&RegisteredCommand> {
		self.commands.get(name)
	}

	pub fn commands(&self) -> impl Iterator<Item = (&str, &RegisteredCommand)> {
		self.commands.iter().map(|(name, c)| (name.as_str(), c))
	}

	pub fn run_command(
		&self,
		name: &str,
		args: &[String],
	) -> std::result::Result<serde_json::Value, CommandError> {
		let command = self
			.commands
			.get(name)
			.ok_or_else(|| CommandError::Unknown(name.to_string()))?;
		command.descriptor.handler.execute(args)
	}

	pub fn has_background_process(&self, name: &str) -> bool {
		self.processes.contains_key(name)
	}

	pub fn background_processes(&self) -> impl Iterator<Item = (&str, &RegisteredProcess)> {
		self.processes.iter().map(|(name, p)| (name.as_str(), p))
	}

	/// Commit everything an extension staged during a successful `init`.
	pub(crate) fn commit(
		&mut self,
		descriptor: ExtensionDescriptor,
		module: Arc<dyn ExtensionModule>,
		staged: Staged,
		hooks: &mut HookRegistry,
	) -> Result<()> {
		let owner = descriptor.name.clone();
		self.register_extension(descriptor, module)?;
		hooks.extend(staged.hooks);
		for (name, descriptor) in staged.commands {
			debug!(command = %name, owner = %owner, "command registered");
			self.commands.insert(
				name,
				RegisteredCommand {
					owner: owner.clone(),
					descriptor,
				},
			);
		}
		for (name, process) in staged.processes {
			debug!(process = %name, owner = %owner, "background process registered");
			self.processes.insert(
				name,
				RegisteredProcess {
					owner: owner.clone(),
					process,
				},
			);
		}
		Ok(())
	}

	/// Spawn every registered background process on the current tokio
	/// runtime. Each gets a child of `shutdown`.
	pub fn spawn_background(&self, shutdown: &CancellationToken) -> BackgroundTasks {
		let mut tasks = BackgroundTasks::new(shutdown.clone());
		for (name, registered) in &self.processes {
			let handle = spawn_process(
				name.clone(),
				registered.owner.clone(),
				Arc::clone(&registered.process),
				shutdown.child_token(),
			);
			tasks.push(name.clone(), handle);
		}
		tasks
	}
}

impl std::fmt::Debug for ExtensionRegistry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ExtensionRegistry")
			.field("extensions", &self.extensions.keys().collect::<Vec<_>>())
			.field("commands", &self.commands.keys().collect::<Vec<_>>())
			.field("processes", &self.processes.keys().collect::<Vec<_>>())
			.finish()
	}
}
