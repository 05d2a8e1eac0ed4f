//! The table-backed leaf node.

use itertools::Itertools;
use std::marker::PhantomData;

use sluice_engine::{
	api::{Node, NodeStatus, NodeStub},
	engine::{Engine, NodeScope},
	errors::WiringError,
	labels::NodeLabel,
	NodeId,
};

use crate::{
	api::{ChangeKind, SourceTable, TableDescriptor, TABLE_MAX_INDEXES},
	errors::IndexError,
	labels::IndexLabel,
};

/// A leaf engine node wrapping one external table.
///
/// Its data is the table handle plus a set of named secondary
/// indexes. Its `run` is the read-only probe of the source's
/// tracked-change state, so this node is safe to run in every
/// iteration, including read-only ones.
///
/// Dependent nodes read the handle through the engine's typed
/// accessors and consume the table's tracked changes in their change
/// handlers.
pub struct TableNode<T: SourceTable> {
	table: T,
	indexes: Vec<(IndexLabel, T::Index)>,
}

impl<T: SourceTable> TableNode<T> {
	/// Wrap a table handle in a node.
	pub fn new(table: T) -> Self {
		Self {
			table,
			indexes: Vec::new(),
		}
	}

	/// The wrapped table handle.
	pub fn table(&self) -> &T {
		&self.table
	}

	/// Register a named secondary index.
	///
	/// Indexes are created by the data source and only stored here so
	/// dependent nodes can look them up by name.
	pub fn add_index(
		&mut self,
		name: impl Into<IndexLabel>,
		index: T::Index,
	) -> Result<(), IndexError> {
		let name = name.into();
		if self.indexes.len() >= TABLE_MAX_INDEXES {
			return Err(IndexError::TooManyIndexes { index: name });
		}
		if self.indexes.iter().any(|(n, _)| *n == name) {
			return Err(IndexError::DuplicateIndex { index: name });
		}
		self.indexes.push((name, index));
		Ok(())
	}

	/// Look up a named secondary index.
	pub fn get_index(&self, name: &str) -> Option<&T::Index> {
		self.indexes
			.iter()
			.find(|(n, _)| *n == *name)
			.map(|(_, idx)| idx)
	}
}

impl<T: SourceTable, C> Node<C> for TableNode<T> {
	fn run(&mut self, _scope: &NodeScope<'_, C>) -> NodeStatus {
		if self.table.has_tracked_changes() {
			NodeStatus::Updated
		} else {
			NodeStatus::Unchanged
		}
	}

	// The handle does not dangle between refreshes; reading the
	// table while this node is stale is safe.
	fn is_valid(&self) -> bool {
		true
	}

	fn compute_failure_info(&self) -> Option<String> {
		let changes = self.table.tracked_changes();
		if changes.is_empty() {
			return None;
		}
		let info = changes
			.iter()
			.map(|change| match &change.kind {
				ChangeKind::Inserted => format!("row {} (New)", change.row),
				ChangeKind::Deleted => format!("row {} (Deleted)", change.row),
				ChangeKind::Updated { columns } => format!(
					"row {} (Updated) columns: {}",
					change.row,
					columns.iter().join(", ")
				),
			})
			.join("; ");
		Some(info)
	}
}

/// The stub registering a [`TableNode`] for one [`TableDescriptor`].
pub struct TableNodeStub<D> {
	_descriptor: PhantomData<D>,
}

impl<D> TableNodeStub<D> {
	/// Make a stub for descriptor `D`.
	pub fn new() -> Self {
		Self {
			_descriptor: PhantomData,
		}
	}
}

impl<D> Default for TableNodeStub<D> {
	fn default() -> Self {
		Self::new()
	}
}

impl<A, C, D: TableDescriptor<A>> NodeStub<A, C> for TableNodeStub<D> {
	fn build(&self, _name: &NodeLabel, arg: &A) -> Box<dyn Node<C>> {
		Box::new(TableNode::new(D::table(arg)))
	}
}

/// Register the table-backed leaf node described by `D`, under
/// [`TableDescriptor::NAME`].
pub fn add_table_node<D, A, C: 'static>(engine: &mut Engine<A, C>) -> Result<NodeId, WiringError>
where
	D: TableDescriptor<A>,
{
	engine.add_node(D::NAME, TableNodeStub::<D>::new())
}

/// Register a named secondary index on a table node.
/// Call only after [`Engine::init`], as the index is stored in the
/// node's data.
pub fn table_node_add_index<T, A, C: 'static>(
	engine: &mut Engine<A, C>,
	node: NodeId,
	name: impl Into<IndexLabel>,
	index: T::Index,
) -> Result<(), IndexError>
where
	T: SourceTable,
{
	let name = name.into();
	let Some(data) = engine.get_internal_data_mut::<TableNode<T>>(node) else {
		return Err(IndexError::NotATableNode);
	};
	tracing::debug!(
		source = "tables",
		summary = "index registered",
		index = %name,
	);
	data.add_index(name, index)
}

/// Look up a named secondary index on a table node.
pub fn table_node_get_index<'a, T, A, C: 'static>(
	engine: &'a Engine<A, C>,
	node: NodeId,
	name: &str,
) -> Option<&'a T::Index>
where
	T: SourceTable,
{
	engine.get_internal_data::<TableNode<T>>(node)?.get_index(name)
}
