//! Table-backed leaf nodes for the sluice engine.
//!
//! Engines that derive state from external tables wrap each table in
//! a leaf node whose data is the table handle plus a set of named
//! secondary indexes. The leaf's `run` is a read-only probe of the
//! source's tracked-change state: it reports `Updated` when any row
//! was inserted, modified, or deleted since the last observation.
//!
//! This crate provides that adapter ([`node::TableNode`]), the
//! contract a table handle must meet ([`api::SourceTable`]), per-table
//! registration ([`api::TableDescriptor`]), and an in-memory tracked
//! table ([`mem::MemTable`]) used by tests and demos. Real
//! deployments supply their own [`api::SourceTable`] impls; the
//! engine does not depend on any particular source shape.

#![warn(missing_docs)]

pub mod api;
pub mod errors;
pub mod labels;
pub mod mem;
pub mod node;
