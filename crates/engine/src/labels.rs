//! Helpful types

use serde::{Deserialize, Serialize};
use smartstring::{LazyCompact, SmartString};
use std::fmt::Display;

/// An engine node's name.
///
/// Unique within the graph reachable from one root; used for
/// diagnostics and for input lookup by name.
#[derive(Debug, Hash, PartialEq, Eq, Clone, Serialize, Deserialize, PartialOrd, Ord)]
pub struct NodeLabel {
	x: SmartString<LazyCompact>,
}

impl NodeLabel {
	/// Make a new node label
	pub fn new(name: &str) -> Self {
		Self { x: name.into() }
	}

	/// Get this label as a `&str`
	pub fn as_str(&self) -> &str {
		&self.x
	}

	/// Is this label the empty string?
	pub fn is_empty(&self) -> bool {
		self.x.is_empty()
	}
}

impl Display for NodeLabel {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		self.x.fmt(f)
	}
}

impl From<String> for NodeLabel {
	fn from(value: String) -> Self {
		Self::new(&value)
	}
}

impl From<&str> for NodeLabel {
	fn from(value: &str) -> Self {
		Self::new(value)
	}
}

impl PartialEq<str> for NodeLabel {
	fn eq(&self, other: &str) -> bool {
		self.x == other
	}
}
