//! The data-access view handed to node callbacks.

use crate::{
	api::Node,
	labels::NodeLabel,
	NodeId,
};

use super::Engine;

/// The engine, as seen by a node callback: data access and the
/// caller's context, with the engine's type parameters for the init
/// argument erased.
pub(crate) trait EngineView<C> {
	/// The name of `node`.
	fn view_name(&self, node: NodeId) -> &NodeLabel;

	/// The input of `node` named `input_name`.
	fn view_input(&self, node: NodeId, input_name: &str) -> Option<NodeId>;

	/// The data of `node`, if it is safe to use
	/// (fresh this iteration, or vouched for by `is_valid`).
	fn view_data(&self, node: NodeId) -> Option<&dyn Node<C>>;

	/// The caller's context, if one is set.
	fn view_context(&self) -> Option<&C>;
}

impl<A, C: 'static> EngineView<C> for Engine<A, C> {
	fn view_name(&self, node: NodeId) -> &NodeLabel {
		&self.slot(node).unwrap().name
	}

	fn view_input(&self, node: NodeId, input_name: &str) -> Option<NodeId> {
		self.get_input(node, input_name)
	}

	fn view_data(&self, node: NodeId) -> Option<&dyn Node<C>> {
		let slot = self.slot(node)?;
		let data = slot.node.as_deref()?;
		if slot.state.is_fresh() || data.is_valid() {
			Some(data)
		} else {
			None
		}
	}

	fn view_context(&self) -> Option<&C> {
		self.get_context()
	}
}

/// What a node callback may see of the engine while it runs.
///
/// A scope is tied to the node whose callback is running. It reads
/// other nodes' data through the same safety checks as
/// [`Engine::get_data`]; the running node's own data is not readable
/// through the scope (the callback already holds it, mutably).
pub struct NodeScope<'a, C> {
	view: &'a dyn EngineView<C>,

	/// The node whose callback this scope was made for
	node: NodeId,
}

impl<'a, C: 'static> NodeScope<'a, C> {
	pub(crate) fn new(view: &'a dyn EngineView<C>, node: NodeId) -> Self {
		Self { view, node }
	}

	/// The id of the node this callback runs for.
	pub fn node(&self) -> NodeId {
		self.node
	}

	/// The name of the node this callback runs for.
	pub fn name(&self) -> &NodeLabel {
		self.view.view_name(self.node)
	}

	/// Get this node's input named `input_name`.
	pub fn get_input(&self, input_name: &str) -> Option<NodeId> {
		self.view.view_input(self.node, input_name)
	}

	/// Get a node's data, checking that it is safe to use.
	/// Read-only: only the node's own callbacks may mutate its data.
	pub fn get_data<T: Node<C>>(&self, node: NodeId) -> Option<&T> {
		self.view.view_data(node)?.as_any().downcast_ref()
	}

	/// Get the data of this node's input named `input_name`,
	/// with the same checks as [`NodeScope::get_data`].
	pub fn get_input_data<T: Node<C>>(&self, input_name: &str) -> Option<&T> {
		self.get_data(self.get_input(input_name)?)
	}

	/// The caller's context for this iteration.
	///
	/// In an iteration run with `recompute_allowed == false` the
	/// caller leaves any transaction fields unset; a change handler
	/// that needs one must then return
	/// [`crate::api::HandlerOutcome::Unhandled`].
	pub fn get_context(&self) -> Option<&C> {
		self.view.view_context()
	}
}
