//! One engine iteration: the post-order traversal and the per-node
//! state machine.

use tracing::{debug, warn};

use crate::{
	api::{HandlerOutcome, InputHandler, NodeState, NodeStatus},
	NodeId,
};

use super::{Engine, EngineGraph, EngineView, NodeScope};

impl<A, C: 'static> Engine<A, C> {
	/// Initialize the engine nodes for a new run. Call this in the
	/// main processing loop before every potential [`Engine::run`].
	///
	/// Clears the per-iteration engine flags, resets every reachable
	/// node to [`NodeState::Stale`], and clears each node's tracked
	/// data.
	pub fn init_run(&mut self) {
		self.has_run = false;
		self.any_updated = false;
		self.canceled = false;

		let EngineGraph::Ready { graph, order, .. } = &mut self.graph else {
			return;
		};
		for id in order.iter() {
			let slot = graph.get_node_mut(*id);
			slot.state = NodeState::Stale;
			if let Some(node) = &mut slot.node {
				node.clear_tracked_data();
			}
		}
	}

	/// Execute one traversal, updating every reachable node's state.
	///
	/// In incremental mode (the force flag is clear), each node's
	/// changed inputs are offered to its change handlers; a missing
	/// or declining handler falls the node back to a full recompute.
	/// If `recompute_allowed` is `false` and a recompute is required,
	/// the node and everything depending on it end the iteration
	/// [`NodeState::Canceled`].
	///
	/// If the force flag is set, every node is recomputed without
	/// consulting handlers. The flag is cleared once a forced run
	/// completes without cancellations, so a forced-recompute request
	/// survives iterations that could not honor it.
	///
	/// Leaf nodes (no inputs) always execute their `run`: for a
	/// data-source node that is the read-only probe of the source's
	/// tracked changes, and it is what lets changes surface at all.
	pub fn run(&mut self, recompute_allowed: bool) {
		let (order, root) = match &self.graph {
			EngineGraph::Ready { order, root, .. } => (order.clone(), *root),
			EngineGraph::Building(_) => {
				warn!(
					source = "engine",
					summary = "run before init, ignoring"
				);
				return;
			}
		};

		// The root carries no node after `cleanup` or a failed `init`.
		if self.slot(root).map(|s| s.node.is_none()).unwrap_or(true) {
			warn!(
				source = "engine",
				summary = "run without live nodes, ignoring"
			);
			return;
		}

		let forced = self.force_recompute;
		debug!(
			source = "engine",
			summary = "run",
			forced,
			recompute_allowed,
		);

		for id in order {
			self.run_node(id, forced, recompute_allowed);
		}

		self.has_run = true;
		// A canceled iteration's outputs are not coherent: don't
		// advertise updates the root never saw. Callers check
		// `canceled()` and re-run.
		if self.canceled {
			self.any_updated = false;
		}
		if forced && !self.canceled {
			self.force_recompute = false;
		}
	}

	/// Check if the engine needs to run but didn't: the force flag
	/// is set, or some leaf's probe reports a change.
	///
	/// Probing runs leaf nodes but does not commit node states;
	/// [`Engine::run`] re-probes them.
	pub fn need_run(&mut self) -> bool {
		if self.force_recompute {
			return true;
		}

		let order = match &self.graph {
			EngineGraph::Ready { order, .. } => order.clone(),
			EngineGraph::Building(_) => return false,
		};

		for id in order {
			if !self.input_sources(id).is_empty() {
				continue;
			}
			let Some(mut node) = self.slot_mut(id).node.take() else {
				continue;
			};
			let status = {
				let scope = NodeScope::new(&*self, id);
				node.run(&scope)
			};
			self.slot_mut(id).node = Some(node);

			if status == NodeStatus::Updated {
				return true;
			}
		}
		false
	}

	/// Process one node of the traversal.
	fn run_node(&mut self, id: NodeId, forced: bool, recompute_allowed: bool) {
		let inputs = self.input_sources(id);

		// A canceled input poisons the whole subtree: our inputs are
		// not coherent, so neither handlers nor a recompute may run.
		if inputs
			.iter()
			.any(|(src, _)| self.state_of(*src).is_canceled())
		{
			let slot = self.slot_mut(id);
			slot.state = NodeState::Canceled;
			debug!(
				source = "engine",
				summary = "node canceled",
				node = %slot.name,
				cause = "canceled input",
			);
			return;
		}

		// Leaves always run; see `Engine::run`.
		if inputs.is_empty() {
			self.recompute_node(id, true);
			return;
		}

		if forced {
			self.recompute_node(id, recompute_allowed);
			return;
		}

		let mut needs_recompute = false;
		let mut any_handled_update = false;

		for (src, edge) in inputs {
			if !self.state_of(src).is_updated() {
				continue;
			}

			match edge.handler {
				None => {
					needs_recompute = true;
					break;
				}
				Some(InputHandler::Noop) => {
					// Handled by definition, data untouched.
				}
				Some(InputHandler::Node) => match self.dispatch_change(id, src) {
					HandlerOutcome::Unhandled => {
						needs_recompute = true;
						if edge.debug_compute_failure {
							self.log_compute_failure(id, src);
						}
						break;
					}
					HandlerOutcome::HandledUpdated => any_handled_update = true,
					HandlerOutcome::HandledUnchanged => {}
				},
			}
		}

		if needs_recompute {
			self.recompute_node(id, recompute_allowed);
		} else if any_handled_update {
			{
				let slot = self.slot_mut(id);
				slot.state = NodeState::Updated;
				slot.stats.compute += 1;
				debug!(
					source = "engine",
					summary = "node updated incrementally",
					node = %slot.name,
				);
			}
			self.any_updated = true;
		} else {
			self.slot_mut(id).state = NodeState::Unchanged;
		}
	}

	/// Fully recompute one node, or cancel it if recomputes are not
	/// allowed this iteration.
	fn recompute_node(&mut self, id: NodeId, allowed: bool) {
		if !allowed {
			{
				let slot = self.slot_mut(id);
				slot.state = NodeState::Canceled;
				slot.stats.cancel += 1;
				debug!(
					source = "engine",
					summary = "node canceled",
					node = %slot.name,
					cause = "recompute not allowed",
				);
			}
			self.canceled = true;
			return;
		}

		let mut node = self.slot_mut(id).node.take().unwrap();
		let status = {
			let scope = NodeScope::new(&*self, id);
			node.run(&scope)
		};

		{
			let slot = self.slot_mut(id);
			slot.node = Some(node);
			slot.state = status.into();
			slot.stats.recompute += 1;
			debug!(
				source = "engine",
				summary = "node recomputed",
				node = %slot.name,
				status = ?status,
			);
		}
		if status == NodeStatus::Updated {
			self.any_updated = true;
		}
	}

	/// Offer one changed input to the owning node's change handler.
	fn dispatch_change(&mut self, id: NodeId, src: NodeId) -> HandlerOutcome {
		let input_name = self.slot(src).unwrap().name.clone();

		let mut node = self.slot_mut(id).node.take().unwrap();
		let outcome = {
			let scope = NodeScope::new(&*self, id);
			node.handle_change(&input_name, &scope)
		};
		let slot = self.slot_mut(id);
		slot.node = Some(node);

		debug!(
			source = "engine",
			summary = "input change offered",
			node = %slot.name,
			input = %input_name,
			outcome = ?outcome,
		);
		outcome
	}

	/// Log what the input `src` knows about its pending changes.
	/// Gathers nothing unless debug logging is enabled.
	fn log_compute_failure(&self, node: NodeId, src: NodeId) {
		if !tracing::enabled!(tracing::Level::DEBUG) {
			return;
		}
		let info = self
			.view_data(src)
			.and_then(|data| data.compute_failure_info());
		if let Some(info) = info {
			debug!(
				source = "engine",
				summary = "compute failure info",
				node = %self.view_name(node),
				input = %self.view_name(src),
				info = %info,
			);
		}
	}

	fn state_of(&self, node: NodeId) -> NodeState {
		self.node_state(node).unwrap_or(NodeState::Stale)
	}
}
