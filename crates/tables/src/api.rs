//! Contracts between table-backed leaf nodes and their data sources.

use serde::{Deserialize, Serialize};

use crate::labels::RowId;

/// The most named secondary indexes one table node may carry.
pub const TABLE_MAX_INDEXES: usize = 256;

/// How a tracked row changed since tracked data was last cleared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
	/// The row is new.
	Inserted,

	/// The row is gone.
	Deleted,

	/// The row still exists; the named columns changed.
	Updated {
		/// The names of the changed columns
		columns: Vec<String>,
	},
}

/// One tracked change of one row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedChange {
	/// The row that changed
	pub row: RowId,

	/// How it changed
	pub kind: ChangeKind,
}

/// A cheaply clonable handle to an external table that records
/// changes between observations.
///
/// "Tracked" state accumulates from the moment it is cleared until it
/// is cleared again; the outer main loop clears it once an iteration
/// has successfully consumed it. Both probes below are read-only.
pub trait SourceTable: 'static {
	/// The handle type for a named secondary index over this table.
	/// Opaque to the adapter; it only stores and hands these out.
	type Index: 'static;

	/// Were any rows inserted, modified, or deleted since tracked
	/// data was last cleared?
	fn has_tracked_changes(&self) -> bool;

	/// Every tracked change, for diagnostics and for incremental
	/// handlers on dependent nodes.
	fn tracked_changes(&self) -> Vec<TrackedChange>;
}

/// Describes one source table of a concrete engine: the node name it
/// registers under and how to capture its handle from the engine's
/// init argument.
///
/// One impl per table replaces per-table generated boilerplate; see
/// [`crate::node::add_table_node`].
pub trait TableDescriptor<A>: 'static {
	/// The table handle type.
	type Table: SourceTable;

	/// The engine node name for this table.
	const NAME: &'static str;

	/// Capture the table handle from the init argument.
	fn table(arg: &A) -> Self::Table;
}
