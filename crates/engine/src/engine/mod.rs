//! The engine driver.
//!
//! Owns the node graph, drives per-iteration traversals, and exposes
//! the data-access contract used by node callbacks and by external
//! readers.

use std::fmt::Debug;
use tracing::debug;

use sluice_util::graph::{FinalizedGraph, Graph};

use crate::{
	api::{AsAny, InputHandler, Node, NodeState, NodeStats, NodeStub, ENGINE_MAX_INPUTS},
	errors::WiringError,
	labels::NodeLabel,
	NodeId,
};

mod run;
mod scope;

pub use scope::NodeScope;
pub(crate) use scope::EngineView;

/// One registered node: its name, its live value (between `init` and
/// `cleanup`), its per-iteration state, and its counters.
pub(crate) struct NodeSlot<A, C> {
	pub(crate) name: NodeLabel,

	/// The stub this node is built from. Consumed by [`Engine::init`].
	pub(crate) stub: Option<Box<dyn NodeStub<A, C>>>,

	/// The live node. `Some` from `init` until `cleanup`, except
	/// while one of its own callbacks is running.
	pub(crate) node: Option<Box<dyn Node<C>>>,

	pub(crate) state: NodeState,
	pub(crate) stats: NodeStats,
}

impl<A, C> Debug for NodeSlot<A, C> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("NodeSlot")
			.field("name", &self.name)
			.field("state", &self.state)
			.field("stats", &self.stats)
			.finish()
	}
}

/// One dependency edge, stored on the consuming node.
/// The edge's endpoints live in the graph; this is the payload.
#[derive(Debug, Clone, Copy)]
pub(crate) struct InputEdge {
	/// How changes of this input are processed.
	/// `None` means any change forces a full recompute.
	pub(crate) handler: Option<InputHandler>,

	/// Ask the input for [`Node::compute_failure_info`] when a
	/// handler on this edge declines a change.
	pub(crate) debug_compute_failure: bool,
}

/// The graph, in one of its two phases: being wired, or finalized
/// with a traversal order rooted at the output node.
enum EngineGraph<A, C> {
	Building(Graph<NodeSlot<A, C>, InputEdge>),
	Ready {
		graph: FinalizedGraph<NodeSlot<A, C>, InputEdge>,
		root: NodeId,
		order: Vec<NodeId>,
	},
}

/// An incremental processing engine instance.
///
/// `A` is the opaque argument handed to node stubs at [`Engine::init`];
/// `C` is the caller's context record (transaction handles and the
/// like), opaque to the engine.
///
/// Lifecycle: register nodes and inputs, call [`Engine::init`] with
/// the output node, then once per main-loop iteration call
/// [`Engine::init_run`] followed by [`Engine::run`]. Call
/// [`Engine::cleanup`] before the process exits.
pub struct Engine<A, C = ()> {
	graph: EngineGraph<A, C>,

	/// The caller's context. Read by node callbacks through
	/// [`NodeScope::get_context`]; never interpreted by the engine.
	context: Option<C>,

	/// The next run must recompute every node.
	force_recompute: bool,

	/// An outer poll loop should wake and run the engine without
	/// throttling. Raised with the force flag by
	/// [`Engine::set_force_recompute_immediate`].
	wake_requested: bool,

	has_run: bool,
	any_updated: bool,
	canceled: bool,
}

impl<A, C: 'static> Default for Engine<A, C> {
	fn default() -> Self {
		Self::new()
	}
}

impl<A, C: 'static> Engine<A, C> {
	/// Make a new engine with no nodes.
	pub fn new() -> Self {
		Self {
			graph: EngineGraph::Building(Graph::new()),
			context: None,
			force_recompute: false,
			wake_requested: false,
			has_run: false,
			any_updated: false,
			canceled: false,
		}
	}

	//
	// MARK: wiring
	//

	/// Register a node. The node itself is not built until
	/// [`Engine::init`]; until then it exists as its stub.
	///
	/// Names must be unique and non-empty.
	pub fn add_node(
		&mut self,
		name: impl Into<NodeLabel>,
		stub: impl NodeStub<A, C> + 'static,
	) -> Result<NodeId, WiringError> {
		let name = name.into();
		let EngineGraph::Building(graph) = &mut self.graph else {
			return Err(WiringError::AlreadyInitialized);
		};

		if name.is_empty() {
			return Err(WiringError::EmptyNodeName);
		}
		if graph.iter_nodes().any(|n| n.name == name) {
			return Err(WiringError::DuplicateNode { node: name });
		}

		Ok(graph.add_node(NodeSlot {
			name,
			stub: Some(Box::new(stub)),
			node: None,
			state: NodeState::Stale,
			stats: NodeStats::default(),
		}))
	}

	/// Add an input (dependency) for `node`.
	///
	/// If `handler` is `None` the engine cannot process changes of
	/// this input incrementally and will fall back to `node`'s full
	/// recompute whenever the input reports a change.
	///
	/// Inputs are evaluated in registration order.
	pub fn add_input(
		&mut self,
		node: NodeId,
		source: NodeId,
		handler: Option<InputHandler>,
	) -> Result<(), WiringError> {
		self.add_input_impl(node, source, handler, false)
	}

	/// Same as [`Engine::add_input`], and additionally asks the
	/// engine to log the input's [`Node::compute_failure_info`]
	/// whenever a handler on this edge declines a change. The info
	/// is only gathered when debug logging is enabled.
	pub fn add_input_with_compute_debug(
		&mut self,
		node: NodeId,
		source: NodeId,
		handler: Option<InputHandler>,
	) -> Result<(), WiringError> {
		self.add_input_impl(node, source, handler, true)
	}

	fn add_input_impl(
		&mut self,
		node: NodeId,
		source: NodeId,
		handler: Option<InputHandler>,
		debug_compute_failure: bool,
	) -> Result<(), WiringError> {
		let EngineGraph::Building(graph) = &mut self.graph else {
			return Err(WiringError::AlreadyInitialized);
		};

		for idx in [node, source] {
			if idx.as_usize() >= graph.len_nodes() {
				return Err(WiringError::NoSuchNode {
					node_idx: idx.as_usize(),
				});
			}
		}

		let sources = graph
			.edges_starting_at(node)
			.map(|(_, (_, to, _))| *to)
			.collect::<Vec<_>>();
		if sources.len() >= ENGINE_MAX_INPUTS {
			return Err(WiringError::TooManyInputs {
				node: graph.get_node(node).name.clone(),
			});
		}
		let source_name = &graph.get_node(source).name;
		if sources
			.iter()
			.any(|s| graph.get_node(*s).name == *source_name)
		{
			return Err(WiringError::DuplicateInput {
				node: graph.get_node(node).name.clone(),
				input: source_name.clone(),
			});
		}

		graph.add_edge(
			node,
			source,
			InputEdge {
				handler,
				debug_compute_failure,
			},
		);
		Ok(())
	}

	//
	// MARK: lifecycle
	//

	/// Initialize the engine for the graph reachable from `root`.
	///
	/// Finalizes the wiring, checks it for cycles, and builds every
	/// reachable node from its stub, in post-order, passing `arg`.
	/// Also resets all node statistics.
	///
	/// A failed `init` leaves the engine unusable; wiring errors are
	/// fatal at design level.
	pub fn init(&mut self, root: NodeId, arg: &A) -> Result<(), WiringError> {
		let EngineGraph::Building(g) = &self.graph else {
			return Err(WiringError::AlreadyInitialized);
		};
		if root.as_usize() >= g.len_nodes() {
			return Err(WiringError::NoSuchNode {
				node_idx: root.as_usize(),
			});
		}

		let graph = match std::mem::replace(&mut self.graph, EngineGraph::Building(Graph::new())) {
			EngineGraph::Building(g) => g,
			EngineGraph::Ready { .. } => unreachable!(),
		};

		let mut graph = graph.finalize();
		let order = match graph.postorder_from(root) {
			Ok(order) => order,
			Err(_) => {
				self.graph = EngineGraph::Ready {
					graph,
					root,
					order: Vec::new(),
				};
				return Err(WiringError::HasCycle);
			}
		};

		for id in &order {
			let slot = graph.get_node_mut(*id);
			let name = slot.name.clone();
			let stub = slot.stub.take().unwrap();
			slot.node = Some(stub.build(&name, arg));
			slot.state = NodeState::Stale;
			slot.stats = NodeStats::default();
		}

		debug!(
			source = "engine",
			summary = "initialized",
			root = %graph.get_node(root).name,
			nodes = order.len(),
		);

		self.graph = EngineGraph::Ready { graph, root, order };
		self.has_run = false;
		self.any_updated = false;
		self.canceled = false;
		Ok(())
	}

	/// Drop every reachable node, releasing its data, in post-order.
	/// Should be called before the program terminates.
	///
	/// The engine cannot be re-initialized afterwards; queries keep
	/// working but return no data.
	pub fn cleanup(&mut self) {
		let EngineGraph::Ready { graph, order, .. } = &mut self.graph else {
			return;
		};

		for id in order.iter() {
			let slot = graph.get_node_mut(*id);
			slot.node = None;
			slot.state = NodeState::Stale;
		}

		debug!(source = "engine", summary = "cleaned up");
	}

	//
	// MARK: context
	//

	/// Store the context node callbacks will see through
	/// [`NodeScope::get_context`].
	///
	/// When the next run is made with `recompute_allowed == false`,
	/// the caller must make sure any transaction fields in the
	/// context are absent: change handlers are then expected to
	/// decline changes they cannot process read-only.
	pub fn set_context(&mut self, context: C) {
		self.context = Some(context);
	}

	/// Remove the stored context.
	pub fn clear_context(&mut self) -> Option<C> {
		self.context.take()
	}

	/// Return the current context, if one is set.
	pub fn get_context(&self) -> Option<&C> {
		self.context.as_ref()
	}

	//
	// MARK: force-recompute control
	//

	/// Force the next run to recompute every node.
	///
	/// Use when it is unclear whether anything changed, or when a
	/// change could not be processed in the iteration it was
	/// observed in and cannot be tracked across iterations.
	pub fn set_force_recompute(&mut self) {
		self.force_recompute = true;
	}

	/// Same as [`Engine::set_force_recompute`], but also raises a
	/// wake request so the outer poll loop runs the engine without
	/// throttling.
	pub fn set_force_recompute_immediate(&mut self) {
		self.force_recompute = true;
		self.wake_requested = true;
	}

	/// Clear the force flag so the next run does the usual
	/// incremental processing.
	pub fn clear_force_recompute(&mut self) {
		self.force_recompute = false;
	}

	/// Will the next run recompute every node?
	pub fn get_force_recompute(&self) -> bool {
		self.force_recompute
	}

	/// Trigger a full recompute as soon as possible.
	pub fn trigger_recompute(&mut self) {
		tracing::info!(source = "engine", summary = "full recompute triggered");
		self.set_force_recompute_immediate();
	}

	/// Consume a pending wake request. Outer poll loops call this
	/// once per iteration to decide whether to skip their throttling.
	pub fn take_wake_request(&mut self) -> bool {
		std::mem::take(&mut self.wake_requested)
	}

	//
	// MARK: queries
	//

	/// Did the engine run in the last iteration?
	pub fn has_run(&self) -> bool {
		self.has_run
	}

	/// Did any node update its data in the last iteration?
	pub fn has_updated(&self) -> bool {
		self.any_updated
	}

	/// Did the last run cancel processing for any node?
	pub fn canceled(&self) -> bool {
		self.canceled
	}

	/// Did this node update its data in the last iteration?
	pub fn node_changed(&self, node: NodeId) -> bool {
		self.slot(node)
			.map(|s| s.state.is_updated())
			.unwrap_or(false)
	}

	/// The state of this node after the last run.
	pub fn node_state(&self, node: NodeId) -> Option<NodeState> {
		self.slot(node).map(|s| s.state)
	}

	/// This node's counters.
	pub fn node_stats(&self, node: NodeId) -> Option<NodeStats> {
		self.slot(node).map(|s| s.stats)
	}

	/// This node's name.
	pub fn node_name(&self, node: NodeId) -> Option<&NodeLabel> {
		self.slot(node).map(|s| &s.name)
	}

	/// Find a node by name.
	pub fn node_by_name(&self, name: &str) -> Option<NodeId> {
		match &self.graph {
			EngineGraph::Building(g) => g
				.iter_nodes_idx()
				.find(|(_, s)| s.name == *name)
				.map(|(id, _)| id),
			EngineGraph::Ready { graph, .. } => graph
				.iter_nodes_idx()
				.find(|(_, s)| s.name == *name)
				.map(|(id, _)| id),
		}
	}

	/// Every node the engine knows, in traversal order once
	/// initialized (registration order before that).
	pub fn nodes(&self) -> Vec<NodeId> {
		match &self.graph {
			EngineGraph::Building(g) => g.iter_nodes_idx().map(|(id, _)| id).collect(),
			EngineGraph::Ready { order, .. } => order.clone(),
		}
	}

	/// The output node the engine was initialized with.
	pub fn root(&self) -> Option<NodeId> {
		match &self.graph {
			EngineGraph::Building(_) => None,
			EngineGraph::Ready { root, .. } => Some(*root),
		}
	}

	//
	// MARK: data access
	//

	/// Get a node's data, checking that it is safe to use.
	///
	/// Returns the node only if the last run refreshed it
	/// ([`NodeState::is_fresh`]) or the node vouches for itself via
	/// [`Node::is_valid`]. Otherwise returns `None`.
	///
	/// The returned data must be treated as read-only by everyone
	/// but the node's own callbacks.
	pub fn get_data<T: Node<C>>(&self, node: NodeId) -> Option<&T> {
		self.view_data(node)?.as_any().downcast_ref()
	}

	/// Get a node's data *without* any coherence checks on the state
	/// of the node. This may be used only when data is known to be
	/// valid, e.g. immediately after [`Engine::init`] and before the
	/// first [`Engine::run`].
	pub fn get_internal_data<T: Node<C>>(&self, node: NodeId) -> Option<&T> {
		self.slot(node)?.node.as_ref()?.as_any().downcast_ref()
	}

	/// Mutable variant of [`Engine::get_internal_data`], for setup
	/// that must attach to node data after `init` (e.g. registering
	/// table indexes on a data-source node).
	pub fn get_internal_data_mut<T: Node<C>>(&mut self, node: NodeId) -> Option<&mut T> {
		self.slot_mut_checked(node)?
			.node
			.as_mut()?
			.as_any_mut()
			.downcast_mut()
	}

	/// Get the input of `node` named `input_name`.
	pub fn get_input(&self, node: NodeId, input_name: &str) -> Option<NodeId> {
		self.input_sources(node)
			.into_iter()
			.map(|(src, _)| src)
			.find(|src| self.slot(*src).map(|s| s.name == *input_name).unwrap_or(false))
	}

	/// Get the data of the input of `node` named `input_name`,
	/// with the same checks as [`Engine::get_data`].
	pub fn get_input_data<T: Node<C>>(&self, node: NodeId, input_name: &str) -> Option<&T> {
		self.get_data(self.get_input(node, input_name)?)
	}

	//
	// MARK: internals
	//

	fn slot(&self, node: NodeId) -> Option<&NodeSlot<A, C>> {
		match &self.graph {
			EngineGraph::Building(g) => {
				if node.as_usize() >= g.len_nodes() {
					return None;
				}
				Some(g.get_node(node))
			}
			EngineGraph::Ready { graph, .. } => {
				if node.as_usize() >= graph.len_nodes() {
					return None;
				}
				Some(graph.get_node(node))
			}
		}
	}

	fn slot_mut_checked(&mut self, node: NodeId) -> Option<&mut NodeSlot<A, C>> {
		match &mut self.graph {
			EngineGraph::Building(g) => {
				if node.as_usize() >= g.len_nodes() {
					return None;
				}
				Some(g.get_node_mut(node))
			}
			EngineGraph::Ready { graph, .. } => {
				if node.as_usize() >= graph.len_nodes() {
					return None;
				}
				Some(graph.get_node_mut(node))
			}
		}
	}

	/// Internal-invariant variant of [`Engine::slot_mut_checked`]:
	/// `node` comes from the traversal order.
	fn slot_mut(&mut self, node: NodeId) -> &mut NodeSlot<A, C> {
		self.slot_mut_checked(node).unwrap()
	}

	/// This node's inputs, in registration order.
	fn input_sources(&self, node: NodeId) -> Vec<(NodeId, InputEdge)> {
		match &self.graph {
			EngineGraph::Building(g) => {
				if node.as_usize() >= g.len_nodes() {
					return Vec::new();
				}
				g.edges_starting_at(node)
					.map(|(_, (_, to, edge))| (*to, *edge))
					.collect()
			}
			EngineGraph::Ready { graph, .. } => {
				if node.as_usize() >= graph.len_nodes() {
					return Vec::new();
				}
				graph
					.edges_starting_at(node)
					.iter()
					.map(|edge_idx| {
						let (_, to, edge) = graph.get_edge(*edge_idx);
						(*to, *edge)
					})
					.collect()
			}
		}
	}
}
