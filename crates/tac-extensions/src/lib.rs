// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Extension discovery, dependency ordering and loading.
//!
//! Extensions contribute access hooks, operator commands and background
//! processes. The [`ExtensionLoader`] discovers modules through a
//! [`ModuleResolver`], orders them by declared dependencies and initialises
//! each one in isolation so a single bad module never takes the rest down.

pub mod background;
pub mod command;
pub mod context;
pub mod descriptor;
pub mod error;
pub mod loader;
pub mod registry;
pub mod resolver;
pub mod sort;

pub use background::{BackgroundProcess, BackgroundTasks};
pub use command::{CommandDescriptor, CommandHandler};
pub use context::ExtensionContext;
pub use descriptor::{
	ExtensionDescriptor, ExtensionMetadata, ExtensionModule, FnExtension, DEFAULT_VERSION,
};
pub use error::{
	CommandError, ExtensionError, FailedExtension, LoadPhase, ProcessError, Result,
};
pub use loader::{ExtensionLoader, LoadReport};
pub use registry::{ExtensionRegistry, LoadedExtension, RegisteredCommand, RegisteredProcess};
pub use resolver::{qualified_name, InMemoryResolver, ModuleResolver};
pub use sort::{partition_orderable, topo_sort};

pub use tac_access::{Hook, HookVote};
