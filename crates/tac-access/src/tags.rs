// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Hierarchical tag matching.
//!
//! Tags are dot-separated paths such as `tenant.1.a`. A more specific tag
//! carries the permissions of all of its ancestors, so an identity tagged
//! `tenant.1.a` passes a barrier that requires `tenant`. The reverse never
//! holds. Identity tags may end in `.*` to cover a prefix and everything
//! beneath it.
//!
//! Everything here is a pure function over string slices.

use indexmap::IndexSet;

/// Barrier tag that any identity with at least one tag satisfies.
pub const ANY_TAG: &str = "*";

/// Suffix marking an identity tag as a prefix wildcard.
pub const WILDCARD_SUFFIX: &str = ".*";

const SEPARATOR: char = '.';

/// Result of matching identity tags against barrier tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchOutcome {
	pub granted: bool,
	/// `"<identity tag> -> <barrier tag>"` for the first satisfying pair, or
	/// `"*"` for the any-tag barrier. `None` when denied.
	pub reason: Option<String>,
}

impl MatchOutcome {
	fn granted(reason: String) -> Self {
		Self {
			granted: true,
			reason: Some(reason),
		}
	}

	fn denied() -> Self {
		Self {
			granted: false,
			reason: None,
		}
	}
}

/// Every prefix of `tag`, most general first and `tag` itself last.
///
/// `"a.b.c"` expands to `["a", "a.b", "a.b.c"]`.
pub fn expand_hierarchy(tag: &str) -> Vec<String> {
	let mut expanded: Vec<String> = tag
		.char_indices()
		.filter(|&(_, c)| c == SEPARATOR)
		.map(|(i, _)| tag[..i].to_string())
		.collect();
	expanded.push(tag.to_string());
	expanded
}

/// Expand every non-wildcard tag into its hierarchy. Wildcards are kept
/// verbatim. First occurrence wins, so iteration order is general before
/// specific within each input tag, and input order across tags.
pub fn expand_identity_tags<I>(tags: I) -> IndexSet<String>
where
	I: IntoIterator,
	I::Item: AsRef<str>,
{
	let mut expanded = IndexSet::new();
	for tag in tags {
		let tag = tag.as_ref();
		if is_wildcard(tag) {
			expanded.insert(tag.to_string());
		} else {
			expanded.extend(expand_hierarchy(tag));
		}
	}
	expanded
}

pub fn is_wildcard(tag: &str) -> bool {
	tag.ends_with(WILDCARD_SUFFIX)
}

/// Whether a single identity tag satisfies a single barrier requirement.
///
/// Not symmetric: `tag_satisfies("tenant.1", "tenant")` holds but
/// `tag_satisfies("tenant", "tenant.1")` does not.
pub fn tag_satisfies(identity_tag: &str, barrier_tag: &str) -> bool {
	if identity_tag == barrier_tag {
		return true;
	}

	if let Some(prefix) = identity_tag.strip_suffix(WILDCARD_SUFFIX) {
		if barrier_tag == prefix || is_descendant(barrier_tag, prefix) {
			return true;
		}
	}

	is_descendant(identity_tag, barrier_tag)
}

/// `tag` lies strictly below `ancestor` in the dot hierarchy.
fn is_descendant(tag: &str, ancestor: &str) -> bool {
	tag.len() > ancestor.len()
		&& tag.starts_with(ancestor)
		&& tag[ancestor.len()..].starts_with(SEPARATOR)
}

/// Decide whether `identity_tags` satisfy `barrier_tags`.
///
/// Barrier tags are scanned in order, and for each one the expanded identity
/// tags in order; the first satisfying pair is reported.
pub fn evaluate<I, B>(identity_tags: I, barrier_tags: B) -> MatchOutcome
where
	I: IntoIterator,
	I::Item: AsRef<str>,
	B: IntoIterator,
	B::Item: AsRef<str>,
{
	let identity_tags: Vec<I::Item> = identity_tags.into_iter().collect();
	let barrier_tags: Vec<B::Item> = barrier_tags.into_iter().collect();

	if !identity_tags.is_empty() && barrier_tags.iter().any(|t| t.as_ref() == ANY_TAG) {
		return MatchOutcome::granted(ANY_TAG.to_string());
	}

	let expanded = expand_identity_tags(&identity_tags);
	for barrier_tag in &barrier_tags {
		let barrier_tag = barrier_tag.as_ref();
		if let Some(identity_tag) = expanded
			.iter()
			.find(|identity_tag| tag_satisfies(identity_tag, barrier_tag))
		{
			return MatchOutcome::granted(format!("{identity_tag} -> {barrier_tag}"));
		}
	}

	MatchOutcome::denied()
}
