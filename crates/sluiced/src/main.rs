//! A demo control-plane agent.
//!
//! Derives a forwarding table for one chassis from two source tables
//! (`port_binding`, `mac_binding`), incrementally where possible:
//! learned-address churn flows through a change handler, port moves
//! and deletions fall back to a full recompute, and iterations
//! without a write transaction cancel instead of computing half an
//! answer.

use anyhow::Context;
use clap::Parser;
use std::{cell::RefCell, path::PathBuf, rc::Rc};
use tracing::{info, warn};

use sluice_engine::{api::InputHandler, engine::Engine};
use sluice_tables::{
	mem::MemTable,
	node::{add_table_node, table_node_add_index},
};

mod config;
mod nodes;

use config::SluicedConfig;
use nodes::{
	AgentContext, FlowTable, FlowTableStub, FlowTxn, MacBindingTable, PortBindingTable,
	RuntimeDataStub, Sources,
};

#[derive(Parser)]
#[command(about = "Derive forwarding flows from tracked source tables")]
struct Args {
	/// Path to a TOML config file
	#[arg(long)]
	config: Option<PathBuf>,

	/// Override the number of iterations to drive
	#[arg(long)]
	iterations: Option<usize>,
}

fn main() -> anyhow::Result<()> {
	let args = Args::parse();

	let mut config = match &args.config {
		Some(path) => SluicedConfig::load_from_file(path)
			.map_err(|e| anyhow::anyhow!("could not load config: {e}"))?,
		None => SluicedConfig::default(),
	};
	if let Some(iterations) = args.iterations {
		config.run.iterations = iterations;
	}

	tracing_subscriber::fmt()
		.with_env_filter(config.logging.filter.as_str())
		.without_time()
		.with_ansi(true)
		.init();

	run_agent(config)
}

fn run_agent(config: SluicedConfig) -> anyhow::Result<()> {
	let sources = Sources {
		port_binding: MemTable::new("port_binding"),
		mac_binding: MemTable::new("mac_binding"),
		chassis: config.run.chassis.clone(),
	};

	// Wire the graph: two table leaves, the local-port set, and the
	// derived flow table as the output node.
	let mut engine: Engine<Sources, AgentContext> = Engine::new();
	let port_binding = add_table_node::<PortBindingTable, _, _>(&mut engine)?;
	let mac_binding = add_table_node::<MacBindingTable, _, _>(&mut engine)?;
	let runtime_data = engine.add_node("runtime_data", RuntimeDataStub)?;
	let flow_table = engine.add_node("flow_table", FlowTableStub)?;
	engine.add_input(runtime_data, port_binding, None)?;
	engine.add_input(flow_table, runtime_data, None)?;
	engine.add_input_with_compute_debug(flow_table, mac_binding, Some(InputHandler::Node))?;

	engine
		.init(flow_table, &sources)
		.context("engine init failed")?;
	table_node_add_index::<MemTable, _, _>(
		&mut engine,
		mac_binding,
		"by_port_ip",
		sources.mac_binding.index(&["port", "ip"]),
	)?;

	// Stands in for the southbound transaction log.
	let committed: FlowTxn = Rc::new(RefCell::new(Vec::new()));

	for iteration in 0..config.run.iterations {
		apply_script(iteration, &sources);

		let recompute_allowed = !config.run.readonly_iterations.contains(&iteration);
		if config.run.force_at == Some(iteration) {
			engine.trigger_recompute();
		}
		if engine.take_wake_request() {
			info!(iteration, summary = "wake requested, running unthrottled");
		}

		engine.set_context(AgentContext {
			flow_txn: recompute_allowed.then(|| committed.clone()),
		});
		engine.init_run();

		if !engine.need_run() {
			info!(iteration, summary = "no pending changes, skipping run");
			continue;
		}
		engine.run(recompute_allowed);
		report(&engine, iteration);

		if engine.canceled() {
			// Keep the tables' tracked data so the next writable
			// iteration can process the same changes.
			warn!(iteration, summary = "iteration canceled, keeping tracked changes");
		} else {
			sources.port_binding.clear_tracked();
			sources.mac_binding.clear_tracked();
		}
	}

	if let Some(flows) = engine.get_data::<FlowTable>(flow_table) {
		for (key, mac) in &flows.flows {
			info!(flow = %key, mac = %mac, summary = "final flow");
		}
	}
	for op in committed.borrow().iter() {
		info!(op = %op, summary = "committed");
	}

	engine.cleanup();
	Ok(())
}

/// Scripted table churn, one scenario per iteration: initial load,
/// incremental learning, a read-only iteration, retry, a forced
/// recompute, and a deletion.
fn apply_script(iteration: usize, sources: &Sources) {
	match iteration {
		0 => {
			sources
				.port_binding
				.insert("p1", [("port", "p1"), ("chassis", "chassis-1")].into());
			sources
				.port_binding
				.insert("p2", [("port", "p2"), ("chassis", "chassis-2")].into());
			sources.mac_binding.insert(
				"m1",
				[("port", "p1"), ("ip", "10.0.0.1"), ("mac", "aa:aa")].into(),
			);
		}
		1 => {
			sources.mac_binding.insert(
				"m2",
				[("port", "p1"), ("ip", "10.0.0.2"), ("mac", "bb:bb")].into(),
			);
		}
		2 => {
			// Lands in a read-only iteration: the handler declines,
			// the run cancels, and the change is retried later.
			sources.mac_binding.update("m1", "mac", "aa:ab");
		}
		4 => {
			sources
				.port_binding
				.insert("p3", [("port", "p3"), ("chassis", "chassis-1")].into());
		}
		6 => {
			sources.mac_binding.remove("m2");
		}
		_ => {}
	}
}

fn report(engine: &Engine<Sources, AgentContext>, iteration: usize) {
	for node in engine.nodes() {
		let Some(name) = engine.node_name(node) else {
			continue;
		};
		let Some(stats) = engine.node_stats(node) else {
			continue;
		};
		info!(
			iteration,
			node = %name,
			state = ?engine.node_state(node).unwrap(),
			recompute = stats.recompute,
			compute = stats.compute,
			cancel = stats.cancel,
		);
	}
}
