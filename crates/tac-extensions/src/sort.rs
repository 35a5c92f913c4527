// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Load ordering.
//!
//! Edges run from a module to each of its dependencies, hard and optional,
//! restricted to the discovered set. Dependencies outside the set do not
//! affect ordering; the loader checks them at init time.

use std::collections::{HashMap, HashSet};

use crate::descriptor::ExtensionDescriptor;
use crate::error::{ExtensionError, Result};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
	Visiting,
	Done,
}

fn edges<'a>(
	descriptor: &'a ExtensionDescriptor,
	known: &'a HashSet<&'a str>,
) -> impl Iterator<Item = &'a str> + 'a {
	descriptor
		.dependencies
		.iter()
		.chain(&descriptor.optional_dependencies)
		.map(String::as_str)
		.filter(move |dep| known.contains(dep))
}

/// Depth-first topological sort. Every dependency precedes its dependents;
/// ties follow discovery order. A module reached while it is still being
/// visited is reported as [`ExtensionError::DependencyCycle`].
pub fn topo_sort(descriptors: &[ExtensionDescriptor]) -> Result<Vec<String>> {
	let by_name: HashMap<&str, &ExtensionDescriptor> =
		descriptors.iter().map(|d| (d.name.as_str(), d)).collect();
	let known: HashSet<&str> = by_name.keys().copied().collect();
	let mut marks: HashMap<&str, Mark> = HashMap::new();
	let mut order = Vec::with_capacity(descriptors.len());

	fn visit<'a>(
		name: &'a str,
		by_name: &HashMap<&'a str, &'a ExtensionDescriptor>,
		known: &'a HashSet<&'a str>,
		marks: &mut HashMap<&'a str, Mark>,
		order: &mut Vec<String>,
	) -> Result<()> {
		match marks.get(name) {
			Some(Mark::Done) => return Ok(()),
			Some(Mark::Visiting) => {
				return Err(ExtensionError::DependencyCycle {
					module: name.to_string(),
				});
			}
			None => {}
		}
		marks.insert(name, Mark::Visiting);
		if let Some(&descriptor) = by_name.get(name) {
			for dep in edges(descriptor, known) {
				visit(dep, by_name, known, marks, order)?;
			}
		}
		marks.insert(name, Mark::Done);
		order.push(name.to_string());
		Ok(())
	}

	for descriptor in descriptors {
		visit(&descriptor.name, &by_name, &known, &mut marks, &mut order)?;
	}
	Ok(order)
}

/// Split modules into those that can be ordered and those blocked by a cycle.
///
/// Kahn's algorithm, always releasing the earliest-discovered ready module.
/// Blocked modules are cycle members plus everything that transitively
/// depends on one.
pub fn partition_orderable(descriptors: &[ExtensionDescriptor]) -> (Vec<String>, Vec<String>) {
	let known: HashSet<&str> = descriptors.iter().map(|d| d.name.as_str()).collect();
	let mut pending: Vec<(&str, HashSet<&str>)> = descriptors
		.iter()
		.map(|d| (d.name.as_str(), edges(d, &known).collect()))
		.collect();
	let mut ordered = Vec::new();

	while let Some(pos) = pending.iter().position(|(_, deps)| deps.is_empty()) {
		let (name, _) = pending.remove(pos);
		for (_, deps) in pending.iter_mut() {
			deps.remove(name);
		}
		ordered.push(name.to_string());
	}

	let blocked = pending
		.into_iter()
		.map(|(name, _)| name.to_string())
		.collect();
	(ordered, blocked)
}
