// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! A single TAC instance.
//!
//! [`Tac`] owns one identity manager, one access evaluator and one extension
//! registry. Nothing is global, so several instances can coexist in one
//! process.

use std::sync::Arc;

use tac_access::{
	identities_satisfying, register_builtin_guards, AccessDecision, AccessEvaluator, Barrier,
	ScanContext, CORE_OWNER,
};
use tac_audit::{AuditLogger, AuditSeverity, AuditSink, TracingAuditSink};
use tac_config::TacConfig;
use tac_extensions::{
	BackgroundTasks, ExtensionDescriptor, ExtensionLoader, ExtensionRegistry, InMemoryResolver,
	LoadReport, ModuleResolver,
};
use tac_identity::{
	Clock, Identity, IdentityManager, IdentityStore, KeyValueStore, MemoryStore, Modality,
	SystemClock,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::error::{Result, TacError};

/// Builder for a [`Tac`] instance. Every collaborator has an in-process
/// default.
pub struct TacBuilder {
	config: TacConfig,
	resolver: Option<Arc<dyn ModuleResolver>>,
	backend: Option<Box<dyn KeyValueStore>>,
	clock: Option<Arc<dyn Clock>>,
	audit_sinks: Vec<Arc<dyn AuditSink>>,
}

impl TacBuilder {
	pub fn new(config: TacConfig) -> Self {
		Self {
			config,
			resolver: None,
			backend: None,
			clock: None,
			audit_sinks: Vec::new(),
		}
	}

	/// Where extension modules are discovered. Defaults to an empty resolver.
	pub fn resolver(mut self, resolver: Arc<dyn ModuleResolver>) -> Self {
		self.resolver = Some(resolver);
		self
	}

	/// Persistence backend for identities. Defaults to [`MemoryStore`].
	pub fn backend(mut self, backend: impl KeyValueStore + 'static) -> Self {
		self.backend = Some(Box::new(backend));
		self
	}

	pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = Some(clock);
		self
	}

	/// Additional audit sink. Entries always go to `tracing` as well.
	pub fn audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
		self.audit_sinks.push(sink);
		self
	}

	/// Hydrate the identity store from the backend and assemble the instance.
	/// Extensions are not loaded until [`Tac::start`].
	pub fn build(self) -> Result<Tac> {
		let min_severity: AuditSeverity = self
			.config
			.audit
			.min_severity
			.parse()
			.map_err(TacError::AuditSeverity)?;
		let mut logger = AuditLogger::new(self.config.audit.enabled, min_severity)
			.with_sink(Arc::new(TracingAuditSink));
		for sink in self.audit_sinks {
			logger.add_sink(sink);
		}
		let audit = Arc::new(logger);

		let backend = self
			.backend
			.unwrap_or_else(|| Box::new(MemoryStore::new()));
		let store = IdentityStore::load(backend)?;
		let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
		let identities =
			IdentityManager::new(store, &self.config.identity, clock, Arc::clone(&audit));

		let resolver = self
			.resolver
			.unwrap_or_else(|| Arc::new(InMemoryResolver::new()));
		let loader = ExtensionLoader::new(
			resolver,
			self.config.extensions.clone(),
			Arc::clone(&audit),
		);

		debug!(identities = identities.store().len(), "instance assembled");
		Ok(Tac {
			evaluator: AccessEvaluator::new(Arc::clone(&audit)),
			extensions: ExtensionRegistry::new(),
			config: self.config,
			audit,
			identities,
			loader,
			started: false,
		})
	}
}

impl Default for TacBuilder {
	fn default() -> Self {
		Self::new(TacConfig::default())
	}
}

pub struct Tac {
	config: TacConfig,
	audit: Arc<AuditLogger>,
	identities: IdentityManager,
	evaluator: AccessEvaluator,
	extensions: ExtensionRegistry,
	loader: ExtensionLoader,
	started: bool,
}

impl Tac {
	pub fn builder(config: TacConfig) -> TacBuilder {
		TacBuilder::new(config)
	}

	/// Run the startup load pass. Built-in guards are registered first so they
	/// run ahead of any extension hook. Scans are refused until this returns.
	#[instrument(skip(self))]
	pub fn start(&mut self) -> Result<LoadReport> {
		if self.started {
			return Err(TacError::AlreadyStarted);
		}
		if self.config.access.builtin_guards {
			register_builtin_guards(self.evaluator.hooks_mut(), &self.config.identity);
			debug!(owner = CORE_OWNER, "built-in guards registered");
		}
		let report = self
			.loader
			.load_all(&mut self.extensions, self.evaluator.hooks_mut())?;
		self.started = true;
		info!(
			extensions = self.extensions.len(),
			hooks = self.evaluator.hooks().len(),
			identities = self.identities.store().len(),
			"instance started"
		);
		Ok(report)
	}

	pub fn is_started(&self) -> bool {
		self.started
	}

	/// Decide whether the holder of `token` may pass `barrier`.
	pub fn scan(&self, token: &str, barrier: &Barrier, scan: &ScanContext) -> Result<AccessDecision> {
		self.ensure_started()?;
		let decision = match self.identities.lookup(scan.modality, token) {
			Some(identity) => self.evaluator.evaluate(identity, barrier, scan),
			None => self.evaluator.deny_unknown(barrier, scan),
		};
		Ok(decision)
	}

	/// [`Tac::scan`] stamped with the instance clock.
	pub fn scan_now(
		&self,
		modality: Modality,
		token: &str,
		barrier: &Barrier,
		distance: Option<f64>,
	) -> Result<AccessDecision> {
		let mut scan = ScanContext::new(modality, self.identities.now());
		scan.distance = distance;
		self.scan(token, barrier, &scan)
	}

	/// Load one extension outside the startup pass.
	pub fn load_one(&mut self, name: &str) -> Result<ExtensionDescriptor> {
		let descriptor =
			self.loader
				.load_one(name, &mut self.extensions, self.evaluator.hooks_mut())?;
		Ok(descriptor)
	}

	pub fn run_command(&self, name: &str, args: &[String]) -> Result<serde_json::Value> {
		Ok(self.extensions.run_command(name, args)?)
	}

	/// Spawn extension background processes on the current tokio runtime.
	pub fn spawn_background(&self, shutdown: &CancellationToken) -> Result<BackgroundTasks> {
		self.ensure_started()?;
		Ok(self.extensions.spawn_background(shutdown))
	}

	pub fn identities(&self) -> &IdentityManager {
		&self.identities
	}

	pub fn identities_mut(&mut self) -> &mut IdentityManager {
		&mut self.identities
	}

	/// Identities holding a tag that satisfies `tag`.
	pub fn identities_with_tag(&self, tag: &str) -> Vec<&Identity> {
		identities_satisfying(&self.identities, tag)
	}

	pub fn evaluator(&self) -> &AccessEvaluator {
		&self.evaluator
	}

	pub fn extensions(&self) -> &ExtensionRegistry {
		&self.extensions
	}

	pub fn config(&self) -> &TacConfig {
		&self.config
	}

	pub fn audit(&self) -> &Arc<AuditLogger> {
		&self.audit
	}

	fn ensure_started(&self) -> Result<()> {
		if self.started {
			Ok(())
		} else {
			Err(TacError::NotStarted)
		}
	}
}

impl std::fmt::Debug for Tac {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Tac")
			.field("started", &self.started)
			.field("identities", &self.identities.store().len())
			.field("extensions", &self.extensions)
			.field("hooks", &self.evaluator.hooks())
			.finish_non_exhaustive()
	}
}
