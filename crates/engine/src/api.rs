//! Traits that allow external code to define engine nodes.

use serde::{Deserialize, Serialize};
use std::any::Any;

use crate::engine::NodeScope;
use crate::labels::NodeLabel;

/// The most inputs a single node may declare.
pub const ENGINE_MAX_INPUTS: usize = 256;

/// The state of a node after the last engine run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeState {
	/// Data in the node is not up to date with its inputs.
	/// This is the state of every node before its first run,
	/// and at the start of every iteration.
	Stale,

	/// Data in the node is valid and was updated during the last run.
	Updated,

	/// Data in the node is valid and did not change during the last run.
	Unchanged,

	/// Processing was canceled for this node during the last run.
	Canceled,
}

impl NodeState {
	/// Is this [`NodeState::Stale`]?
	pub fn is_stale(&self) -> bool {
		matches!(self, Self::Stale)
	}

	/// Is this [`NodeState::Updated`]?
	pub fn is_updated(&self) -> bool {
		matches!(self, Self::Updated)
	}

	/// Is this [`NodeState::Canceled`]?
	pub fn is_canceled(&self) -> bool {
		matches!(self, Self::Canceled)
	}

	/// Was this node refreshed by the last run?
	/// (either [`NodeState::Updated`] or [`NodeState::Unchanged`])
	pub fn is_fresh(&self) -> bool {
		matches!(self, Self::Updated | Self::Unchanged)
	}
}

/// What a node's full recompute reports about its data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
	/// The node's data changed.
	Updated,

	/// The node's data is up to date and identical to last iteration's.
	Unchanged,
}

impl From<NodeStatus> for NodeState {
	fn from(value: NodeStatus) -> Self {
		match value {
			NodeStatus::Updated => NodeState::Updated,
			NodeStatus::Unchanged => NodeState::Unchanged,
		}
	}
}

/// What a change handler reports about one input's change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerOutcome {
	/// The change cannot be handled incrementally.
	/// The engine falls back to a full recompute of the node.
	Unhandled,

	/// The change was handled and the node's data was updated.
	HandledUpdated,

	/// The change was handled and the node's data was left unchanged.
	HandledUnchanged,
}

/// How the engine processes changes of one input.
///
/// An input registered without a handler (`None`) cannot be processed
/// incrementally: any change of that input forces a full recompute of
/// the owning node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputHandler {
	/// Dispatch the change to the owning node's
	/// [`Node::handle_change`], passing the input's name.
	Node,

	/// Accept the change without touching the node's data.
	///
	/// This answers [`HandlerOutcome::HandledUnchanged`] on the
	/// node's behalf. Use it only when changes of this input are
	/// known to be covered by the handler of a correlated input;
	/// in practice this should be very rare.
	Noop,
}

/// Per-node engine counters. Monotone within one engine lifecycle;
/// reset by [`crate::engine::Engine::init`].
#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize)]
pub struct NodeStats {
	/// How many times this node's full recompute ran.
	pub recompute: u64,

	/// How many iterations handled this node's input changes
	/// incrementally, updating its data without a recompute.
	pub compute: u64,

	/// How many times a needed recompute was denied, canceling
	/// this node.
	pub cancel: u64,
}

/// Object-safe upcast to [`Any`], blanket-implemented for every
/// `'static` type. Lets the engine hand out typed payload references
/// without requiring trait upcasting from the toolchain.
pub trait AsAny: Any {
	/// This value as a [`dyn Any`](Any)
	fn as_any(&self) -> &dyn Any;

	/// This value as a mutable [`dyn Any`](Any)
	fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
	fn as_any(&self) -> &dyn Any {
		self
	}

	fn as_any_mut(&mut self) -> &mut dyn Any {
		self
	}
}

/// One engine node: its behavior and its data, in one value.
///
/// A node is built once by its stub when [`crate::engine::Engine::init`]
/// runs, persists across iterations, and is dropped by
/// [`crate::engine::Engine::cleanup`]. Release resources in [`Drop`].
///
/// The node value is the node's *data* in the engine's data-access
/// contract: dependent nodes and external readers see it through
/// [`crate::engine::Engine::get_data`] and friends, read-only. Only
/// this node's own `run` and `handle_change` may mutate it.
///
/// `C` is the caller-supplied engine context (typically a record of
/// transaction handles). It is opaque to the engine.
pub trait Node<C>: AsAny {
	/// Fully process all inputs of this node and regenerate its data.
	///
	/// `run` is only invoked when recomputes are allowed in the
	/// current iteration, so the context returned by
	/// [`NodeScope::get_context`] carries whatever transaction
	/// handles the caller set for a writable iteration.
	fn run(&mut self, scope: &NodeScope<'_, C>) -> NodeStatus;

	/// Process a change of the named input incrementally.
	///
	/// Called for inputs registered with [`InputHandler::Node`] when
	/// the input's node ended the iteration [`NodeState::Updated`].
	/// The change usually needs to be evaluated against the node's
	/// other inputs, all of which are readable through `scope`.
	///
	/// A handler that needs a transaction handle must check for it in
	/// the context and return [`HandlerOutcome::Unhandled`] if it is
	/// missing. The default declines every change.
	fn handle_change(&mut self, input: &NodeLabel, scope: &NodeScope<'_, C>) -> HandlerOutcome {
		let _ = (input, scope);
		HandlerOutcome::Unhandled
	}

	/// May this node's data be used even though the node is not fresh?
	///
	/// [`crate::engine::Engine::get_data`] consults this when the
	/// node's state is neither [`NodeState::Updated`] nor
	/// [`NodeState::Unchanged`]. Return `true` if the data does not
	/// dangle between refreshes (e.g. it stores owned values, not
	/// references into external records).
	fn is_valid(&self) -> bool {
		false
	}

	/// Clear per-iteration tracked data.
	/// Called on every node by [`crate::engine::Engine::init_run`]
	/// before each iteration.
	fn clear_tracked_data(&mut self) {}

	/// Describe this node's pending changes for diagnostics.
	///
	/// When an input edge was registered with
	/// [`crate::engine::Engine::add_input_with_compute_debug`] and its
	/// handler declines a change, the engine asks the *input* node for
	/// this description and logs it. Only called when debug logging
	/// is enabled.
	fn compute_failure_info(&self) -> Option<String> {
		None
	}
}

/// A registered description of a node.
/// Stubs are small and stateless; the engine calls [`NodeStub::build`]
/// exactly once per node, in post-order, during
/// [`crate::engine::Engine::init`].
///
/// `A` is the opaque argument passed to `init` (typically a record of
/// data-source connections the stubs capture table handles from).
pub trait NodeStub<A, C> {
	/// Build the node, allocating its initial data.
	fn build(&self, name: &NodeLabel, arg: &A) -> Box<dyn Node<C>>;
}
