//! The agent's engine nodes: two source tables, the set of ports
//! bound to this chassis, and the derived flow table.

use std::{
	cell::RefCell,
	collections::{BTreeMap, BTreeSet},
	rc::Rc,
};
use tracing::debug;

use sluice_engine::{
	api::{HandlerOutcome, Node, NodeStatus, NodeStub},
	engine::NodeScope,
	labels::NodeLabel,
};
use sluice_tables::{
	api::{ChangeKind, SourceTable, TableDescriptor},
	mem::MemTable,
	node::TableNode,
};

/// The data sources the engine is initialized with.
pub struct Sources {
	/// `port_binding(port, chassis)`: which chassis owns each port
	pub port_binding: MemTable,

	/// `mac_binding(port, ip, mac)`: learned addresses per port
	pub mac_binding: MemTable,

	/// The chassis this agent runs on
	pub chassis: String,
}

/// The sink derived flows are committed to. Stands in for a
/// southbound write transaction.
pub type FlowTxn = Rc<RefCell<Vec<String>>>;

/// The caller context for one iteration. `flow_txn` is only present
/// in iterations that allow recomputes; change handlers that need to
/// commit must decline without it.
pub struct AgentContext {
	/// The write handle for this iteration, if any
	pub flow_txn: Option<FlowTxn>,
}

/// The `port_binding` source table.
pub struct PortBindingTable;

impl TableDescriptor<Sources> for PortBindingTable {
	type Table = MemTable;
	const NAME: &'static str = "port_binding";

	fn table(arg: &Sources) -> MemTable {
		arg.port_binding.clone()
	}
}

/// The `mac_binding` source table.
pub struct MacBindingTable;

impl TableDescriptor<Sources> for MacBindingTable {
	type Table = MemTable;
	const NAME: &'static str = "mac_binding";

	fn table(arg: &Sources) -> MemTable {
		arg.mac_binding.clone()
	}
}

/// The ports bound to this chassis, rebuilt from `port_binding`.
///
/// Port moves are rare, so this node carries no change handler: any
/// `port_binding` change recomputes it (and everything above it).
pub struct RuntimeData {
	chassis: String,

	/// The ports bound to this chassis
	pub local_ports: BTreeSet<String>,
}

impl Node<AgentContext> for RuntimeData {
	fn run(&mut self, scope: &NodeScope<'_, AgentContext>) -> NodeStatus {
		let Some(ports) = scope.get_input_data::<TableNode<MemTable>>("port_binding") else {
			return NodeStatus::Unchanged;
		};

		let local = ports
			.table()
			.rows()
			.into_iter()
			.filter(|(_, row)| row.get("chassis") == Some(self.chassis.as_str()))
			.filter_map(|(_, row)| row.get("port").map(|p| p.to_string()))
			.collect::<BTreeSet<_>>();

		if local == self.local_ports {
			return NodeStatus::Unchanged;
		}
		debug!(
			source = "sluiced",
			summary = "local ports changed",
			n_ports = local.len(),
		);
		self.local_ports = local;
		NodeStatus::Updated
	}

	// Owned strings; safe to read while stale.
	fn is_valid(&self) -> bool {
		true
	}
}

/// Stub for [`RuntimeData`]; captures the chassis name from the init
/// argument.
pub struct RuntimeDataStub;

impl NodeStub<Sources, AgentContext> for RuntimeDataStub {
	fn build(&self, _name: &NodeLabel, arg: &Sources) -> Box<dyn Node<AgentContext>> {
		Box::new(RuntimeData {
			chassis: arg.chassis.clone(),
			local_ports: BTreeSet::new(),
		})
	}
}

/// The derived forwarding table: one flow per learned address on a
/// local port, keyed `port/ip`.
///
/// `mac_binding` changes are frequent, so they are handled
/// incrementally where possible; everything else falls back to a
/// full recompute.
pub struct FlowTable {
	/// `port/ip` → mac
	pub flows: BTreeMap<String, String>,
}

impl FlowTable {
	fn commit(&self, txn: &FlowTxn, op: String) {
		txn.borrow_mut().push(op);
	}
}

impl Node<AgentContext> for FlowTable {
	fn run(&mut self, scope: &NodeScope<'_, AgentContext>) -> NodeStatus {
		let Some(runtime) = scope.get_input_data::<RuntimeData>("runtime_data") else {
			return NodeStatus::Unchanged;
		};
		let Some(macs) = scope.get_input_data::<TableNode<MemTable>>("mac_binding") else {
			return NodeStatus::Unchanged;
		};

		let mut flows = BTreeMap::new();
		for (_, row) in macs.table().rows() {
			let (Some(port), Some(ip), Some(mac)) =
				(row.get("port"), row.get("ip"), row.get("mac"))
			else {
				continue;
			};
			if runtime.local_ports.contains(port) {
				flows.insert(format!("{port}/{ip}"), mac.to_string());
			}
		}

		if flows == self.flows {
			return NodeStatus::Unchanged;
		}
		self.flows = flows;

		// `run` only executes in iterations that allow recomputes,
		// and those carry a transaction.
		if let Some(txn) = scope.get_context().and_then(|c| c.flow_txn.as_ref()) {
			self.commit(txn, format!("reinstall {} flows", self.flows.len()));
		}
		NodeStatus::Updated
	}

	fn handle_change(
		&mut self,
		input: &NodeLabel,
		scope: &NodeScope<'_, AgentContext>,
	) -> HandlerOutcome {
		if input.as_str() != "mac_binding" {
			return HandlerOutcome::Unhandled;
		}
		let Some(txn) = scope
			.get_context()
			.and_then(|c| c.flow_txn.as_ref())
			.cloned()
		else {
			// No write transaction this iteration.
			return HandlerOutcome::Unhandled;
		};
		let Some(runtime) = scope.get_input_data::<RuntimeData>("runtime_data") else {
			return HandlerOutcome::Unhandled;
		};
		let Some(macs) = scope.get_input_data::<TableNode<MemTable>>("mac_binding") else {
			return HandlerOutcome::Unhandled;
		};

		let mut changed = false;
		for change in macs.table().tracked_changes() {
			match &change.kind {
				// A deleted row no longer tells us which flow it
				// fed, and a moved binding changes the flow key;
				// both need the full rebuild.
				ChangeKind::Deleted => return HandlerOutcome::Unhandled,
				ChangeKind::Updated { columns }
					if columns.iter().any(|c| c == "port" || c == "ip") =>
				{
					return HandlerOutcome::Unhandled;
				}
				_ => {}
			}

			let Some(row) = macs.table().get(change.row.as_str()) else {
				return HandlerOutcome::Unhandled;
			};
			let (Some(port), Some(ip), Some(mac)) =
				(row.get("port"), row.get("ip"), row.get("mac"))
			else {
				continue;
			};
			if !runtime.local_ports.contains(port) {
				continue;
			}

			let key = format!("{port}/{ip}");
			if self.flows.get(&key).map(|x| &x[..]) == Some(mac) {
				continue;
			}
			self.flows.insert(key.clone(), mac.to_string());
			self.commit(&txn, format!("install flow {key} -> {mac}"));
			changed = true;
		}

		if changed {
			HandlerOutcome::HandledUpdated
		} else {
			HandlerOutcome::HandledUnchanged
		}
	}

	fn is_valid(&self) -> bool {
		true
	}
}

/// Stub for [`FlowTable`].
pub struct FlowTableStub;

impl NodeStub<Sources, AgentContext> for FlowTableStub {
	fn build(&self, _name: &NodeLabel, _arg: &Sources) -> Box<dyn Node<AgentContext>> {
		Box::new(FlowTable {
			flows: BTreeMap::new(),
		})
	}
}
