// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Extension loading with per-module failure isolation.
//!
//! A load pass moves each discovered module through
//! `discovered -> metadata parsed -> sorted -> initialising` and ends it in
//! exactly one of loaded, skipped or failed. One bad module never aborts the
//! pass. The [`LoadReport`] records every outcome, and so does the audit log.

use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde_json::json;
use tac_access::HookRegistry;
use tac_audit::{AuditEventType, AuditLogEntry, AuditLogger};
use tac_config::{CyclePolicy, ExtensionsConfig};
use tracing::{debug, info, instrument, warn};

use crate::context::ExtensionContext;
use crate::descriptor::{ExtensionDescriptor, ExtensionModule};
use crate::error::{ExtensionError, FailedExtension, LoadPhase, Result};
use crate::registry::ExtensionRegistry;
use crate::resolver::{qualified_name, ModuleResolver};
use crate::sort::{partition_orderable, topo_sort};

/// Outcome of a bulk load pass.
#[derive(Debug, Default)]
pub struct LoadReport {
	/// Order in which initialisation was attempted.
	pub order: Vec<String>,
	pub loaded: Vec<String>,
	/// Modules filtered out by a skip prefix.
	pub skipped: Vec<String>,
	pub failed: Vec<FailedExtension>,
	/// Module reported by cycle detection, if the dependency graph had a cycle.
	pub cycle: Option<String>,
}

impl LoadReport {
	/// Nothing failed and the intended order was used.
	pub fn is_clean(&self) -> bool {
		self.failed.is_empty() && self.cycle.is_none()
	}

	pub fn failure(&self, name: &str) -> Option<&FailedExtension> {
		self.failed.iter().find(|f| f.name == name)
	}
}

struct Candidate {
	descriptor: ExtensionDescriptor,
	module: Arc<dyn ExtensionModule>,
}

pub struct ExtensionLoader {
	resolver: Arc<dyn ModuleResolver>,
	config: ExtensionsConfig,
	audit: Arc<AuditLogger>,
}

impl ExtensionLoader {
	pub fn new(
		resolver: Arc<dyn ModuleResolver>,
		config: ExtensionsConfig,
		audit: Arc<AuditLogger>,
	) -> Self {
		Self {
			resolver,
			config,
			audit,
		}
	}

	pub fn config(&self) -> &ExtensionsConfig {
		&self.config
	}

	/// Discover, order and initialise every module in the configured
	/// namespace. Fails only if the namespace cannot be listed.
	#[instrument(skip_all, fields(namespace = %self.config.namespace))]
	pub fn load_all(
		&self,
		registry: &mut ExtensionRegistry,
		hooks: &mut HookRegistry,
	) -> Result<LoadReport> {
		let mut report = LoadReport::default();
		let names = self
			.resolver
			.list_modules(&self.config.namespace)
			.map_err(|e| ExtensionError::Discovery {
				namespace: self.config.namespace.clone(),
				message: e.to_string(),
			})?;

		let mut candidates = Vec::new();
		let mut seen = HashSet::new();
		for name in names {
			if self.config.is_skipped(&name) {
				debug!(module = %name, "module skipped by prefix");
				self.audit_skipped(&name);
				report.skipped.push(name);
				continue;
			}
			match self.resolve(&name) {
				Ok(candidate) => {
					let declared = candidate.descriptor.name.clone();
					if registry.is_loaded(&declared) || !seen.insert(declared.clone()) {
						self.push_failure(
							&mut report,
							declared.clone(),
							ExtensionError::AlreadyLoaded(declared),
							LoadPhase::Load,
						);
					} else {
						candidates.push(candidate);
					}
				}
				Err(error) => self.push_failure(&mut report, name, error, LoadPhase::Load),
			}
		}

		let descriptors: Vec<ExtensionDescriptor> =
			candidates.iter().map(|c| c.descriptor.clone()).collect();
		let order = match topo_sort(&descriptors) {
			Ok(order) => order,
			Err(ExtensionError::DependencyCycle { module }) => {
				let order = self.order_after_cycle(&module, &descriptors, &mut report);
				report.cycle = Some(module);
				order
			}
			Err(other) => return Err(other),
		};

		let mut by_name: HashMap<String, Candidate> = candidates
			.into_iter()
			.map(|c| (c.descriptor.name.clone(), c))
			.collect();
		for name in &order {
			let Some(candidate) = by_name.remove(name) else {
				continue;
			};
			report.order.push(name.clone());
			match self.initialize(candidate, registry, hooks) {
				Ok(descriptor) => report.loaded.push(descriptor.name),
				Err(failed) => {
					report.failed.push(failed);
				}
			}
		}

		info!(
			loaded = report.loaded.len(),
			skipped = report.skipped.len(),
			failed = report.failed.len(),
			degraded = report.cycle.is_some(),
			"extension load pass complete"
		);
		Ok(report)
	}

	/// Load a single module on demand with the same dependency check and
	/// registration path as a bulk pass. Skip prefixes do not apply.
	#[instrument(skip(self, registry, hooks), fields(namespace = %self.config.namespace))]
	pub fn load_one(
		&self,
		name: &str,
		registry: &mut ExtensionRegistry,
		hooks: &mut HookRegistry,
	) -> std::result::Result<ExtensionDescriptor, FailedExtension> {
		let candidate = self.resolve(name).map_err(|error| {
			self.record_failure(name.to_string(), error, LoadPhase::Load)
		})?;
		let declared = candidate.descriptor.name.clone();
		if registry.is_loaded(&declared) {
			return Err(self.record_failure(
				declared.clone(),
				ExtensionError::AlreadyLoaded(declared),
				LoadPhase::Load,
			));
		}
		self.initialize(candidate, registry, hooks)
	}

	fn resolve(&self, name: &str) -> Result<Candidate> {
		let module = self
			.resolver
			.load_module(&qualified_name(&self.config.namespace, name))?;
		let metadata = module.metadata()?;
		let descriptor = metadata.into_descriptor(name)?;
		Ok(Candidate { descriptor, module })
	}

	fn order_after_cycle(
		&self,
		module: &str,
		descriptors: &[ExtensionDescriptor],
		report: &mut LoadReport,
	) -> Vec<String> {
		warn!(
			module = %module,
			policy = %self.config.cycle_policy,
			"dependency cycle detected, load order is degraded"
		);
		self.audit.log(
			AuditLogEntry::builder(AuditEventType::LoadOrderDegraded)
				.resource("extension", module)
				.details(json!({
					"module": module,
					"policy": self.config.cycle_policy.to_string(),
				}))
				.build(),
		);

		match self.config.cycle_policy {
			CyclePolicy::Degrade => descriptors.iter().map(|d| d.name.clone()).collect(),
			CyclePolicy::Abort => {
				let (ordered, blocked) = partition_orderable(descriptors);
				for name in blocked {
					self.push_failure(
						report,
						name,
						ExtensionError::DependencyCycle {
							module: module.to_string(),
						},
						LoadPhase::Dependencies,
					);
				}
				ordered
			}
		}
	}

	fn initialize(
		&self,
		candidate: Candidate,
		registry: &mut ExtensionRegistry,
		hooks: &mut HookRegistry,
	) -> std::result::Result<ExtensionDescriptor, FailedExtension> {
		let Candidate { descriptor, module } = candidate;
		let name = descriptor.name.clone();

		if let Some(missing) = descriptor
			.dependencies
			.iter()
			.find(|dep| !registry.is_loaded(dep))
		{
			return Err(self.record_failure(
				name.clone(),
				ExtensionError::MissingDependency {
					module: name,
					dependency: missing.clone(),
				},
				LoadPhase::Dependencies,
			));
		}
		for optional in descriptor
			.optional_dependencies
			.iter()
			.filter(|dep| !registry.is_loaded(dep))
		{
			warn!(extension = %name, dependency = %optional, "optional dependency not loaded");
		}

		let settings = self.config.settings_for(&name);
		let mut ctx = ExtensionContext::new(&descriptor, settings, registry);
		let outcome = catch_unwind(AssertUnwindSafe(|| module.init(&mut ctx)));
		let error = match outcome {
			Ok(Ok(())) => None,
			Ok(Err(e)) => Some(e),
			Err(panic) => Some(ExtensionError::init(
				name.clone(),
				format!("panicked: {}", panic_message(panic.as_ref())),
			)),
		};
		let staged = ctx.into_staged();
		if let Some(error) = error {
			return Err(self.record_failure(name, error, LoadPhase::Init));
		}

		let hook_count = staged.hooks.len();
		if let Err(error) = registry.commit(descriptor.clone(), module, staged, hooks) {
			return Err(self.record_failure(name, error, LoadPhase::Init));
		}

		info!(extension = %name, version = %descriptor.version, hooks = hook_count, "extension loaded");
		self.audit.log(
			AuditLogEntry::builder(AuditEventType::ExtensionLoaded)
				.resource("extension", name.as_str())
				.details(json!({
					"version": descriptor.version,
					"hooks": hook_count,
				}))
				.build(),
		);
		Ok(descriptor)
	}

	fn push_failure(&self, report: &mut LoadReport, name: String, error: ExtensionError, phase: LoadPhase) {
		report.failed.push(self.record_failure(name, error, phase));
	}

	fn record_failure(&self, name: String, error: ExtensionError, phase: LoadPhase) -> FailedExtension {
		warn!(extension = %name, phase = %phase, error = %error, "extension failed");
		self.audit.log(
			AuditLogEntry::builder(AuditEventType::ExtensionFailed)
				.resource("extension", name.as_str())
				.details(json!({
					"phase": phase,
					"error": error.to_string(),
				}))
				.build(),
		);
		FailedExtension { name, error, phase }
	}

	fn audit_skipped(&self, name: &str) {
		self.audit.log(
			AuditLogEntry::builder(AuditEventType::ExtensionSkipped)
				.resource("extension", name)
				.build(),
		);
	}
}

impl std::fmt::Debug for ExtensionLoader {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ExtensionLoader")
			.field("config", &self.config)
			.finish_non_exhaustive()
	}
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
	payload
		.downcast_ref::<&str>()
		.map(|s| s.to_string())
		.or_else(|| payload.downcast_ref::<String>().cloned())
		.unwrap_or_else(|| "non-string panic payload".to_string())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::descriptor::{ExtensionMetadata, FnExtension};
	use crate::resolver::InMemoryResolver;
	use tac_access::{Barrier, Hook, HookVote, ScanContext};
	use tac_audit::MemoryAuditSink;
	use tac_identity::Identity;

	const NS: &str = "extensions";

	fn ok_module(metadata: ExtensionMetadata) -> FnExtension {
		FnExtension::new(metadata, |_: &mut ExtensionContext<'_>| Ok(()))
	}

	fn hooking_module(metadata: ExtensionMetadata) -> FnExtension {
		FnExtension::new(metadata, |ctx: &mut ExtensionContext<'_>| {
			ctx.add_hook(
				"beforeAccess",
				Hook::before(
					|_: &Identity, _: &Barrier, _: &ScanContext| -> tac_access::error::Result<HookVote> {
						Ok(HookVote::Continue)
					},
				),
			)
		})
	}

	struct Fixture {
		loader: ExtensionLoader,
		registry: ExtensionRegistry,
		hooks: HookRegistry,
		audit: MemoryAuditSink,
	}

	fn fixture(resolver: InMemoryResolver, config: ExtensionsConfig) -> Fixture {
		let audit = MemoryAuditSink::new();
		let logger = AuditLogger::new(true, tac_audit::AuditSeverity::Debug)
			.with_sink(Arc::new(audit.clone()));
		Fixture {
			loader: ExtensionLoader::new(Arc::new(resolver), config, Arc::new(logger)),
			registry: ExtensionRegistry::new(),
			hooks: HookRegistry::new(),
			audit,
		}
	}

	impl Fixture {
		fn load_all(&mut self) -> LoadReport {
			self.loader
				.load_all(&mut self.registry, &mut self.hooks)
				.unwrap()
		}
	}

	mod ordering {
		use super::*;

		#[test]
		fn loads_dependencies_first_regardless_of_discovery_order() {
			let mut resolver = InMemoryResolver::new();
			resolver
				.register(NS, "display", ok_module(ExtensionMetadata::default().depends_on(["billing"])))
				.register(NS, "billing", ok_module(ExtensionMetadata::default().depends_on(["payments"])))
				.register(NS, "payments", ok_module(ExtensionMetadata::default()));

			let mut f = fixture(resolver, ExtensionsConfig::default());
			let report = f.load_all();

			assert!(report.is_clean());
			assert_eq!(report.loaded, vec!["payments", "billing", "display"]);
			assert_eq!(report.order, report.loaded);
			assert_eq!(f.audit.count(AuditEventType::ExtensionLoaded), 3);
		}

		#[test]
		fn dotted_namespace_loads_every_module() {
			let mut resolver = InMemoryResolver::new();
			resolver
				.register("tac.ext", "billing", ok_module(ExtensionMetadata::default()))
				.register("tac.ext", "display", ok_module(ExtensionMetadata::default().depends_on(["billing"])));

			let config = ExtensionsConfig {
				namespace: "tac.ext".to_string(),
				..Default::default()
			};
			let mut f = fixture(resolver, config);
			let report = f.load_all();

			assert!(report.is_clean());
			assert_eq!(report.loaded, vec!["billing", "display"]);
		}

		#[test]
		fn skip_prefixes_filter_discovery() {
			let mut resolver = InMemoryResolver::new();
			resolver
				.register(NS, "_disabled", ok_module(ExtensionMetadata::default()))
				.register(NS, "example_door", ok_module(ExtensionMetadata::default()))
				.register(NS, "real", ok_module(ExtensionMetadata::default()));

			let mut f = fixture(resolver, ExtensionsConfig::default());
			let report = f.load_all();

			assert_eq!(report.skipped, vec!["_disabled", "example_door"]);
			assert_eq!(report.loaded, vec!["real"]);
			assert_eq!(f.audit.count(AuditEventType::ExtensionSkipped), 2);
		}

		#[test]
		fn cycle_degrades_to_discovery_order_and_still_attempts_everything() {
			let mut resolver = InMemoryResolver::new();
			resolver
				.register(NS, "a", ok_module(ExtensionMetadata::default().depends_on(["b"])))
				.register(NS, "b", ok_module(ExtensionMetadata::default().depends_on(["a"])))
				.register(NS, "c", ok_module(ExtensionMetadata::default()));

			let mut f = fixture(resolver, ExtensionsConfig::default());
			let report = f.load_all();

			assert!(report.cycle.is_some());
			assert!(!report.is_clean());
			assert_eq!(report.order, vec!["a", "b", "c"]);
			assert_eq!(report.loaded, vec!["c"]);
			for name in ["a", "b"] {
				let failure = report.failure(name).unwrap();
				assert_eq!(failure.phase, LoadPhase::Dependencies);
			}
			assert_eq!(f.audit.count(AuditEventType::LoadOrderDegraded), 1);
		}

		#[test]
		fn cycle_with_abort_policy_fails_only_the_blocked_subset() {
			let mut resolver = InMemoryResolver::new();
			resolver
				.register(NS, "x", ok_module(ExtensionMetadata::default().depends_on(["a"])))
				.register(NS, "a", ok_module(ExtensionMetadata::default().depends_on(["b"])))
				.register(NS, "b", ok_module(ExtensionMetadata::default().depends_on(["a"])))
				.register(NS, "free", ok_module(ExtensionMetadata::default()));

			let config = ExtensionsConfig {
				cycle_policy: CyclePolicy::Abort,
				..Default::default()
			};
			let mut f = fixture(resolver, config);
			let report = f.load_all();

			assert_eq!(report.order, vec!["free"]);
			assert_eq!(report.loaded, vec!["free"]);
			let mut failed: Vec<_> = report.failed.iter().map(|f| f.name.as_str()).collect();
			failed.sort();
			assert_eq!(failed, vec!["a", "b", "x"]);
			assert!(report
				.failed
				.iter()
				.all(|f| matches!(f.error, ExtensionError::DependencyCycle { .. })));
		}
	}

	mod failures {
		use super::*;

		#[test]
		fn missing_hard_dependency_fails_without_init() {
			let mut resolver = InMemoryResolver::new();
			resolver.register(
				NS,
				"billing",
				FnExtension::new(
					ExtensionMetadata::default().depends_on(["payments"]),
					|_: &mut ExtensionContext<'_>| panic!("init must not run"),
				),
			);

			let mut f = fixture(resolver, ExtensionsConfig::default());
			let report = f.load_all();

			let failure = report.failure("billing").unwrap();
			assert_eq!(failure.phase, LoadPhase::Dependencies);
			assert!(matches!(
				&failure.error,
				ExtensionError::MissingDependency { dependency, .. } if dependency == "payments"
			));
		}

		#[test]
		fn missing_optional_dependency_only_warns() {
			let mut resolver = InMemoryResolver::new();
			resolver.register(
				NS,
				"display",
				ok_module(ExtensionMetadata::default().optionally_depends_on(["billing"])),
			);
			let mut f = fixture(resolver, ExtensionsConfig::default());
			assert_eq!(f.load_all().loaded, vec!["display"]);
		}

		#[test]
		fn broken_module_fails_in_load_phase() {
			let mut resolver = InMemoryResolver::new();
			resolver
				.register_broken(NS, "broken", "syntax error")
				.register(NS, "fine", ok_module(ExtensionMetadata::default()));

			let mut f = fixture(resolver, ExtensionsConfig::default());
			let report = f.load_all();

			assert_eq!(report.failure("broken").unwrap().phase, LoadPhase::Load);
			assert_eq!(report.loaded, vec!["fine"]);
			assert_eq!(f.audit.count(AuditEventType::ExtensionFailed), 1);
		}

		#[test]
		fn failing_init_leaves_no_hooks_behind() {
			let mut resolver = InMemoryResolver::new();
			resolver.register(
				NS,
				"flaky",
				FnExtension::new(ExtensionMetadata::default(), |ctx: &mut ExtensionContext<'_>| {
					ctx.add_hook(
						"beforeAccess",
						Hook::before(
							|_: &Identity, _: &Barrier, _: &ScanContext| -> tac_access::error::Result<HookVote> {
								Ok(HookVote::deny("never"))
							},
						),
					)?;
					Err(ExtensionError::init("flaky", "device not found"))
				}),
			);

			let mut f = fixture(resolver, ExtensionsConfig::default());
			let report = f.load_all();

			assert_eq!(report.failure("flaky").unwrap().phase, LoadPhase::Init);
			assert!(f.hooks.is_empty());
			assert!(!f.registry.is_loaded("flaky"));
		}

		#[test]
		fn panicking_init_is_isolated() {
			let mut resolver = InMemoryResolver::new();
			resolver
				.register(
					NS,
					"panicky",
					FnExtension::new(ExtensionMetadata::default(), |_: &mut ExtensionContext<'_>| {
						panic!("boom")
					}),
				)
				.register(NS, "fine", hooking_module(ExtensionMetadata::default()));

			let mut f = fixture(resolver, ExtensionsConfig::default());
			let report = f.load_all();

			let failure = report.failure("panicky").unwrap();
			assert_eq!(failure.phase, LoadPhase::Init);
			assert!(failure.error.to_string().contains("boom"));
			assert_eq!(report.loaded, vec!["fine"]);
			assert_eq!(f.hooks.count_for("fine"), 1);
		}

		#[test]
		fn unknown_hook_name_fails_init() {
			let mut resolver = InMemoryResolver::new();
			resolver.register(
				NS,
				"typo",
				FnExtension::new(ExtensionMetadata::default(), |ctx: &mut ExtensionContext<'_>| {
					ctx.add_hook(
						"beforeAcess",
						Hook::before(
							|_: &Identity, _: &Barrier, _: &ScanContext| -> tac_access::error::Result<HookVote> {
								Ok(HookVote::Continue)
							},
						),
					)
				}),
			);

			let mut f = fixture(resolver, ExtensionsConfig::default());
			let report = f.load_all();
			assert!(matches!(
				report.failure("typo").unwrap().error,
				ExtensionError::Hook(tac_access::HookError::UnknownHook(_))
			));
		}

		#[test]
		fn duplicate_declared_names_fail_the_later_module() {
			let mut resolver = InMemoryResolver::new();
			resolver
				.register(NS, "one", ok_module(ExtensionMetadata::named("shared")))
				.register(NS, "two", ok_module(ExtensionMetadata::named("shared")));

			let mut f = fixture(resolver, ExtensionsConfig::default());
			let report = f.load_all();
			assert_eq!(report.loaded, vec!["shared"]);
			assert!(matches!(
				report.failure("shared").unwrap().error,
				ExtensionError::AlreadyLoaded(_)
			));
		}
	}

	mod on_demand {
		use super::*;

		#[test]
		fn load_one_checks_dependencies_against_loaded_set() {
			let mut resolver = InMemoryResolver::new();
			resolver
				.register(NS, "payments", ok_module(ExtensionMetadata::default()))
				.register(NS, "billing", hooking_module(ExtensionMetadata::default().depends_on(["payments"])));

			let mut f = fixture(resolver, ExtensionsConfig::default());
			let err = f
				.loader
				.load_one("billing", &mut f.registry, &mut f.hooks)
				.unwrap_err();
			assert_eq!(err.phase, LoadPhase::Dependencies);

			f.loader
				.load_one("payments", &mut f.registry, &mut f.hooks)
				.unwrap();
			let descriptor = f
				.loader
				.load_one("billing", &mut f.registry, &mut f.hooks)
				.unwrap();
			assert_eq!(descriptor.name, "billing");
			assert_eq!(f.hooks.count_for("billing"), 1);

			let again = f
				.loader
				.load_one("billing", &mut f.registry, &mut f.hooks)
				.unwrap_err();
			assert!(matches!(again.error, ExtensionError::AlreadyLoaded(_)));
		}

		#[test]
		fn bulk_pass_reports_already_loaded_modules() {
			let mut resolver = InMemoryResolver::new();
			resolver.register(NS, "payments", ok_module(ExtensionMetadata::default()));
			let mut f = fixture(resolver, ExtensionsConfig::default());
			f.loader
				.load_one("payments", &mut f.registry, &mut f.hooks)
				.unwrap();

			let report = f.load_all();
			assert!(report.loaded.is_empty());
			assert_eq!(report.failed.len(), 1);
		}

		#[test]
		fn settings_are_handed_to_the_extension() {
			let mut resolver = InMemoryResolver::new();
			resolver.register(
				NS,
				"billing",
				FnExtension::new(ExtensionMetadata::default(), |ctx: &mut ExtensionContext<'_>| {
					let rate = ctx
						.settings()
						.and_then(|s| s.get("rate"))
						.and_then(|r| r.as_u64())
						.ok_or_else(|| ExtensionError::init(ctx.name(), "rate is required"))?;
					assert_eq!(rate, 5);
					Ok(())
				}),
			);
			let mut config = ExtensionsConfig::default();
			config
				.settings
				.insert("billing".to_string(), json!({ "rate": 5 }));

			let mut f = fixture(resolver, config);
			assert_eq!(f.load_all().loaded, vec!["billing"]);
		}
	}
}
