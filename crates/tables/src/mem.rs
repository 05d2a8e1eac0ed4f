//! An in-memory tracked table.
//!
//! This is the data source used by tests and demo agents: a table of
//! string-valued rows that records every insert, update, and delete
//! between calls to [`MemTable::clear_tracked`], the way a database
//! IDL tracks changes between main-loop observations.

use std::{cell::RefCell, collections::BTreeMap, rc::Rc};

use smartstring::{LazyCompact, SmartString};

use crate::{
	api::{ChangeKind, SourceTable, TrackedChange},
	labels::RowId,
};

/// One row: column name → value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemRow {
	columns: BTreeMap<String, String>,
}

impl MemRow {
	/// Make an empty row
	pub fn new() -> Self {
		Self::default()
	}

	/// Get a column's value
	pub fn get(&self, column: &str) -> Option<&str> {
		self.columns.get(column).map(|x| &x[..])
	}

	/// Set a column's value
	pub fn set(&mut self, column: &str, value: &str) {
		self.columns.insert(column.into(), value.into());
	}

	/// Iterate over this row's columns, sorted by name
	pub fn columns(&self) -> impl Iterator<Item = (&str, &str)> {
		self.columns.iter().map(|(k, v)| (&k[..], &v[..]))
	}
}

impl<const N: usize> From<[(&str, &str); N]> for MemRow {
	fn from(value: [(&str, &str); N]) -> Self {
		let mut row = Self::new();
		for (column, v) in value {
			row.set(column, v);
		}
		row
	}
}

#[derive(Debug, Default)]
struct MemTableInner {
	rows: BTreeMap<RowId, MemRow>,
	tracked: BTreeMap<RowId, ChangeKind>,
}

impl MemTableInner {
	/// Fold one more change of `row` into the tracked set.
	fn track(&mut self, row: RowId, kind: ChangeKind) {
		use ChangeKind::*;

		let merged = match (self.tracked.remove(&row), kind) {
			// A row born and gone within one window never happened.
			(Some(Inserted), Deleted) => None,
			// Changes to a new row are part of its insertion.
			(Some(Inserted), _) => Some(Inserted),
			(Some(Updated { mut columns }), Updated { columns: more }) => {
				for c in more {
					if !columns.contains(&c) {
						columns.push(c);
					}
				}
				Some(Updated { columns })
			}
			// A row deleted and recreated within one window is an
			// update of everything the new row carries.
			(Some(Deleted), Inserted) => Some(Updated {
				columns: self
					.rows
					.get(&row)
					.map(|r| r.columns().map(|(c, _)| c.to_string()).collect())
					.unwrap_or_default(),
			}),
			(_, kind) => Some(kind),
		};

		if let Some(kind) = merged {
			self.tracked.insert(row, kind);
		}
	}
}

/// A cheaply clonable handle to one in-memory tracked table.
/// All clones share the same rows and tracked state.
#[derive(Debug, Clone)]
pub struct MemTable {
	name: SmartString<LazyCompact>,
	inner: Rc<RefCell<MemTableInner>>,
}

impl MemTable {
	/// Make a new, empty table
	pub fn new(name: &str) -> Self {
		Self {
			name: name.into(),
			inner: Rc::new(RefCell::new(MemTableInner::default())),
		}
	}

	/// This table's name
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Insert a row, tracking the change.
	/// Inserting over an existing id replaces the row and is tracked
	/// as an update of the new row's columns.
	pub fn insert(&self, id: &str, row: MemRow) {
		let id = RowId::from(id);
		let mut inner = self.inner.borrow_mut();
		let replaced = inner.rows.insert(id.clone(), row).is_some();
		if replaced {
			let columns = inner.rows[&id]
				.columns()
				.map(|(c, _)| c.to_string())
				.collect();
			inner.track(id, ChangeKind::Updated { columns });
		} else {
			inner.track(id, ChangeKind::Inserted);
		}
	}

	/// Set one column of an existing row, tracking the change.
	/// Returns `false` if no such row exists. Writing a value the
	/// column already has tracks nothing.
	pub fn update(&self, id: &str, column: &str, value: &str) -> bool {
		let id = RowId::from(id);
		let mut inner = self.inner.borrow_mut();
		let Some(row) = inner.rows.get_mut(&id) else {
			return false;
		};
		if row.get(column) == Some(value) {
			return true;
		}
		row.set(column, value);
		inner.track(
			id,
			ChangeKind::Updated {
				columns: vec![column.to_string()],
			},
		);
		true
	}

	/// Remove a row, tracking the change.
	/// Returns `false` if no such row exists.
	pub fn remove(&self, id: &str) -> bool {
		let id = RowId::from(id);
		let mut inner = self.inner.borrow_mut();
		if inner.rows.remove(&id).is_none() {
			return false;
		}
		inner.track(id, ChangeKind::Deleted);
		true
	}

	/// Get a snapshot of one row
	pub fn get(&self, id: &str) -> Option<MemRow> {
		self.inner.borrow().rows.get(&RowId::from(id)).cloned()
	}

	/// Get a snapshot of every row, sorted by id
	pub fn rows(&self) -> Vec<(RowId, MemRow)> {
		self.inner
			.borrow()
			.rows
			.iter()
			.map(|(id, row)| (id.clone(), row.clone()))
			.collect()
	}

	/// The number of rows in this table
	pub fn len(&self) -> usize {
		self.inner.borrow().rows.len()
	}

	/// Does this table have no rows?
	pub fn is_empty(&self) -> bool {
		self.inner.borrow().rows.is_empty()
	}

	/// Forget all tracked changes. The outer main loop calls this
	/// once an iteration has successfully consumed them.
	pub fn clear_tracked(&self) {
		self.inner.borrow_mut().tracked.clear();
	}

	/// Make a secondary index over this table with the given key
	/// columns.
	pub fn index(&self, key_columns: &[&str]) -> MemIndex {
		MemIndex {
			table: self.clone(),
			key_columns: key_columns.iter().map(|x| x.to_string()).collect(),
		}
	}
}

impl SourceTable for MemTable {
	type Index = MemIndex;

	fn has_tracked_changes(&self) -> bool {
		!self.inner.borrow().tracked.is_empty()
	}

	fn tracked_changes(&self) -> Vec<TrackedChange> {
		self.inner
			.borrow()
			.tracked
			.iter()
			.map(|(row, kind)| TrackedChange {
				row: row.clone(),
				kind: kind.clone(),
			})
			.collect()
	}
}

/// An exact-match secondary index over a [`MemTable`].
///
/// Key columns are fixed at creation; lookups scan the current rows,
/// which is plenty for the table sizes this backend is meant for.
#[derive(Debug, Clone)]
pub struct MemIndex {
	table: MemTable,
	key_columns: Vec<String>,
}

impl MemIndex {
	/// All rows whose key columns equal `key`, sorted by id.
	/// `key` values match the index's key columns, in order.
	pub fn lookup(&self, key: &[&str]) -> Vec<(RowId, MemRow)> {
		self.table
			.rows()
			.into_iter()
			.filter(|(_, row)| {
				self.key_columns.len() == key.len()
					&& self
						.key_columns
						.iter()
						.zip(key)
						.all(|(column, want)| row.get(column) == Some(*want))
			})
			.collect()
	}

	/// The first row matching `key`, if any.
	pub fn lookup_one(&self, key: &[&str]) -> Option<(RowId, MemRow)> {
		self.lookup(key).into_iter().next()
	}
}
