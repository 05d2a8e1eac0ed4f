//! An incremental processing engine.
//!
//! The engine drives a DAG of computation nodes whose outputs depend
//! on a set of external inputs, and propagates *change* through the
//! graph instead of recomputing everything on every iteration. The
//! canonical workload is a control-plane agent that derives a large
//! output table (e.g. forwarding rules) from many source tables, where
//! a full recompute per iteration is too expensive.
//!
//! Nodes exist for the data they maintain. Every node declares its
//! inputs; for each input it may carry an incremental change handler.
//! When an input changed and its handler can process the change, the
//! node's data is patched in place. When there is no handler, or the
//! handler declines, the engine falls back to the node's full
//! recompute. Dependencies must be explicit: all data flowing into a
//! node arrives through its declared inputs, never through globals.
//!
//! The engine is single-threaded and cooperative. One call to
//! [`engine::Engine::run`] performs one post-order traversal of the
//! graph; callbacks run to completion on the calling thread.

#![warn(missing_docs)]

pub mod api;
pub mod errors;
pub mod labels;

#[allow(clippy::module_inception)]
pub mod engine;

/// The handle identifying a registered node.
pub use sluice_util::graph::GraphNodeIdx as NodeId;
