//! Engine-context discipline and the callback data-access scope.

use std::{
	cell::Cell,
	rc::Rc,
};

use sluice_engine::{
	api::{HandlerOutcome, InputHandler, Node, NodeState, NodeStatus, NodeStub},
	engine::{Engine, NodeScope},
	labels::NodeLabel,
};

/// A caller context: one opaque write-transaction handle, present
/// only in iterations that allow recomputes.
struct Ctx {
	txn: Option<String>,
}

struct Leaf {
	pending: Rc<Cell<bool>>,
}

impl Node<Ctx> for Leaf {
	fn run(&mut self, _scope: &NodeScope<'_, Ctx>) -> NodeStatus {
		if self.pending.get() {
			NodeStatus::Updated
		} else {
			NodeStatus::Unchanged
		}
	}

	fn is_valid(&self) -> bool {
		true
	}
}

struct LeafStub {
	pending: Rc<Cell<bool>>,
}

impl NodeStub<(), Ctx> for LeafStub {
	fn build(&self, _name: &NodeLabel, _arg: &()) -> Box<dyn Node<Ctx>> {
		Box::new(Leaf {
			pending: self.pending.clone(),
		})
	}
}

/// A node whose change handler writes through the context's
/// transaction. Without one, it must decline.
struct TxnWriter {
	ran_with_txn: Rc<Cell<bool>>,
}

impl Node<Ctx> for TxnWriter {
	fn run(&mut self, scope: &NodeScope<'_, Ctx>) -> NodeStatus {
		// `run` only executes when recomputes are allowed, and the
		// caller guarantees a transaction in that case.
		let has_txn = scope
			.get_context()
			.map(|c| c.txn.is_some())
			.unwrap_or(false);
		self.ran_with_txn.set(has_txn);
		NodeStatus::Updated
	}

	fn handle_change(&mut self, _input: &NodeLabel, scope: &NodeScope<'_, Ctx>) -> HandlerOutcome {
		match scope.get_context().and_then(|c| c.txn.as_ref()) {
			Some(_) => HandlerOutcome::HandledUpdated,
			None => HandlerOutcome::Unhandled,
		}
	}
}

struct TxnWriterStub {
	ran_with_txn: Rc<Cell<bool>>,
}

impl NodeStub<(), Ctx> for TxnWriterStub {
	fn build(&self, _name: &NodeLabel, _arg: &()) -> Box<dyn Node<Ctx>> {
		Box::new(TxnWriter {
			ran_with_txn: self.ran_with_txn.clone(),
		})
	}
}

fn build(
	pending: &Rc<Cell<bool>>,
	ran_with_txn: &Rc<Cell<bool>>,
) -> (Engine<(), Ctx>, sluice_engine::NodeId) {
	let mut engine: Engine<(), Ctx> = Engine::new();
	let leaf = engine
		.add_node(
			"leaf",
			LeafStub {
				pending: pending.clone(),
			},
		)
		.unwrap();
	let writer = engine
		.add_node(
			"writer",
			TxnWriterStub {
				ran_with_txn: ran_with_txn.clone(),
			},
		)
		.unwrap();
	engine
		.add_input(writer, leaf, Some(InputHandler::Node))
		.unwrap();
	engine.init(writer, &()).unwrap();
	(engine, writer)
}

/// A handler that needs a transaction declines in a read-only
/// iteration; since recomputes are also disallowed then, the node is
/// canceled rather than left stale-but-marked-fresh.
#[test]
fn handler_without_transaction_declines_and_cancels() {
	let pending = Rc::new(Cell::new(true));
	let ran_with_txn = Rc::new(Cell::new(false));
	let (mut engine, writer) = build(&pending, &ran_with_txn);

	engine.set_context(Ctx { txn: None });
	engine.init_run();
	engine.run(false);

	assert_eq!(engine.node_state(writer).unwrap(), NodeState::Canceled);
	assert!(engine.canceled());

	// Next iteration gets a transaction: the handler processes the
	// same change incrementally.
	engine.set_context(Ctx {
		txn: Some("txn-1".into()),
	});
	engine.init_run();
	engine.run(true);

	assert_eq!(engine.node_state(writer).unwrap(), NodeState::Updated);
	assert_eq!(engine.node_stats(writer).unwrap().compute, 1);
	assert!(!engine.canceled());
}

/// Forced recomputes run with the transaction in place.
#[test]
fn forced_recompute_sees_transaction() {
	let pending = Rc::new(Cell::new(false));
	let ran_with_txn = Rc::new(Cell::new(false));
	let (mut engine, writer) = build(&pending, &ran_with_txn);

	engine.set_context(Ctx {
		txn: Some("txn-2".into()),
	});
	engine.set_force_recompute();
	engine.init_run();
	engine.run(true);

	assert_eq!(engine.node_state(writer).unwrap(), NodeState::Updated);
	assert!(ran_with_txn.get());
}

/// A node's own data is not readable through its scope while one of
/// its callbacks is running, but fresh input data is.
#[test]
fn scope_reads_inputs_not_self() {
	struct Probe {
		saw_input: Rc<Cell<bool>>,
		saw_self: Rc<Cell<bool>>,
	}

	impl Node<Ctx> for Probe {
		fn run(&mut self, scope: &NodeScope<'_, Ctx>) -> NodeStatus {
			self.saw_input
				.set(scope.get_input_data::<Leaf>("leaf").is_some());
			self.saw_self
				.set(scope.get_data::<Probe>(scope.node()).is_some());
			NodeStatus::Updated
		}
	}

	struct ProbeStub {
		saw_input: Rc<Cell<bool>>,
		saw_self: Rc<Cell<bool>>,
	}

	impl NodeStub<(), Ctx> for ProbeStub {
		fn build(&self, _name: &NodeLabel, _arg: &()) -> Box<dyn Node<Ctx>> {
			Box::new(Probe {
				saw_input: self.saw_input.clone(),
				saw_self: self.saw_self.clone(),
			})
		}
	}

	let saw_input = Rc::new(Cell::new(false));
	let saw_self = Rc::new(Cell::new(true));

	let mut engine: Engine<(), Ctx> = Engine::new();
	let leaf = engine
		.add_node(
			"leaf",
			LeafStub {
				pending: Rc::new(Cell::new(true)),
			},
		)
		.unwrap();
	let probe = engine
		.add_node(
			"probe",
			ProbeStub {
				saw_input: saw_input.clone(),
				saw_self: saw_self.clone(),
			},
		)
		.unwrap();
	engine.add_input(probe, leaf, None).unwrap();
	engine.init(probe, &()).unwrap();

	engine.init_run();
	engine.run(true);

	assert!(saw_input.get());
	assert!(!saw_self.get());
}
