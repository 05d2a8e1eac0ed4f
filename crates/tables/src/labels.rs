//! Helpful types

use serde::{Deserialize, Serialize};
use smartstring::{LazyCompact, SmartString};
use std::fmt::Display;

/// A row's identity within its table.
#[derive(Debug, Hash, PartialEq, Eq, Clone, Serialize, Deserialize, PartialOrd, Ord)]
pub struct RowId {
	x: SmartString<LazyCompact>,
}

impl RowId {
	/// Make a new row id
	pub fn new(id: &str) -> Self {
		Self { x: id.into() }
	}

	/// Get this id as a `&str`
	pub fn as_str(&self) -> &str {
		&self.x
	}
}

impl Display for RowId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		self.x.fmt(f)
	}
}

impl From<String> for RowId {
	fn from(value: String) -> Self {
		Self::new(&value)
	}
}

impl From<&str> for RowId {
	fn from(value: &str) -> Self {
		Self::new(value)
	}
}

/// A named secondary index's name within its table node.
#[derive(Debug, Hash, PartialEq, Eq, Clone, Serialize, Deserialize, PartialOrd, Ord)]
pub struct IndexLabel {
	x: SmartString<LazyCompact>,
}

impl IndexLabel {
	/// Make a new index label
	pub fn new(name: &str) -> Self {
		Self { x: name.into() }
	}

	/// Get this label as a `&str`
	pub fn as_str(&self) -> &str {
		&self.x
	}
}

impl Display for IndexLabel {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		self.x.fmt(f)
	}
}

impl From<String> for IndexLabel {
	fn from(value: String) -> Self {
		Self::new(&value)
	}
}

impl From<&str> for IndexLabel {
	fn from(value: &str) -> Self {
		Self::new(value)
	}
}

impl PartialEq<str> for IndexLabel {
	fn eq(&self, other: &str) -> bool {
		self.x == other
	}
}
