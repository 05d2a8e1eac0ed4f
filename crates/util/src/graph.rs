//! Convenient graph manipulation.
//! We don't use petgraph because we need parallel edges
//! with a stable insertion order.

use std::{error::Error, fmt::Debug, fmt::Display};

/// The index of a node in a [`Graph`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GraphNodeIdx(usize);

impl From<GraphNodeIdx> for usize {
	fn from(value: GraphNodeIdx) -> Self {
		value.0
	}
}

impl GraphNodeIdx {
	/// Get this index as a `usize`
	pub fn as_usize(&self) -> usize {
		self.0
	}
}

/// The index of an edge in a [`Graph`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GraphEdgeIdx(usize);

impl From<GraphEdgeIdx> for usize {
	fn from(value: GraphEdgeIdx) -> Self {
		value.0
	}
}

impl GraphEdgeIdx {
	/// Get this index as a `usize`
	pub fn as_usize(&self) -> usize {
		self.0
	}
}

/// Returned by [`FinalizedGraph::postorder_from`] when the graph
/// contains a directed cycle reachable from the given root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphHasCycle;

impl Display for GraphHasCycle {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "this graph has a directed cycle")
	}
}

impl Error for GraphHasCycle {}

/// A directed graph with parallel edges.
/// Fast writes are not a goal (within reason).
///
/// [`Graph`]s are designed to be created once,
/// (possibly mutated, if creation requires multiple stages),
/// and mostly read afterwards. Node values stay mutable
/// so that long-lived graphs can carry per-node state.
#[derive(Debug, Clone)]
pub struct Graph<NodeType, EdgeType>
where
	NodeType: Debug,
	EdgeType: Debug,
{
	/// Array of nodes in this graph
	nodes: Vec<NodeType>,

	/// Array of edges in this graph
	edges: Vec<(GraphNodeIdx, GraphNodeIdx, EdgeType)>,
}

impl<NodeType, EdgeType> Default for Graph<NodeType, EdgeType>
where
	NodeType: Debug,
	EdgeType: Debug,
{
	fn default() -> Self {
		Self::new()
	}
}

impl<NodeType, EdgeType> Graph<NodeType, EdgeType>
where
	NodeType: Debug,
	EdgeType: Debug,
{
	/// Create an empty graph
	pub fn new() -> Self {
		Self {
			nodes: Vec::new(),
			edges: Vec::new(),
		}
	}

	/// Convert this graph to a structure with fast reads.
	pub fn finalize(self) -> FinalizedGraph<NodeType, EdgeType> {
		let mut edge_map_in = (0..self.nodes.len())
			.map(|_| Vec::new())
			.collect::<Vec<_>>();
		let mut edge_map_out = (0..self.nodes.len())
			.map(|_| Vec::new())
			.collect::<Vec<_>>();
		for (i, x) in self.edges.iter().enumerate() {
			edge_map_out[usize::from(x.0)].push(GraphEdgeIdx(i));
			edge_map_in[usize::from(x.1)].push(GraphEdgeIdx(i));
		}

		FinalizedGraph {
			graph: self,
			edge_map_in,
			edge_map_out,
		}
	}

	/// Add a node to this graph.
	#[inline]
	pub fn add_node(&mut self, node: NodeType) -> GraphNodeIdx {
		let i = self.nodes.len();
		self.nodes.push(node);
		GraphNodeIdx(i)
	}

	/// Get a node by index
	#[inline]
	pub fn get_node(&self, node_idx: GraphNodeIdx) -> &NodeType {
		self.nodes.get(usize::from(node_idx)).unwrap()
	}

	/// Get a mutable reference to a node by index
	#[inline]
	pub fn get_node_mut(&mut self, node_idx: GraphNodeIdx) -> &mut NodeType {
		self.nodes.get_mut(usize::from(node_idx)).unwrap()
	}

	/// The number of nodes in this graph
	#[inline]
	pub fn len_nodes(&self) -> usize {
		self.nodes.len()
	}

	/// Iterate over all nodes in this graph
	#[inline]
	pub fn iter_nodes(&self) -> impl Iterator<Item = &NodeType> {
		self.nodes.iter()
	}

	/// Iterate over all nodes in this graph, including node index
	#[inline]
	pub fn iter_nodes_idx(&self) -> impl Iterator<Item = (GraphNodeIdx, &NodeType)> {
		self.iter_nodes()
			.enumerate()
			.map(|(a, b)| (GraphNodeIdx(a), b))
	}

	/// Add an edge to this graph.
	/// Edges between one pair of nodes keep their insertion order.
	#[inline]
	pub fn add_edge(
		&mut self,
		from: GraphNodeIdx,
		to: GraphNodeIdx,
		edge_value: EdgeType,
	) -> GraphEdgeIdx {
		let i = self.edges.len();
		self.edges.push((from, to, edge_value));
		GraphEdgeIdx(i)
	}

	/// Get an edge by index
	#[inline]
	pub fn get_edge(&self, edge_idx: GraphEdgeIdx) -> &(GraphNodeIdx, GraphNodeIdx, EdgeType) {
		self.edges.get(usize::from(edge_idx)).unwrap()
	}

	/// The number of edges in this graph
	#[inline]
	pub fn len_edges(&self) -> usize {
		self.edges.len()
	}

	/// Iterate over the edges that start at the given node,
	/// in insertion order. This is a linear scan; [`FinalizedGraph`]
	/// answers the same question with a precomputed map.
	pub fn edges_starting_at(
		&self,
		node: GraphNodeIdx,
	) -> impl Iterator<Item = (GraphEdgeIdx, &(GraphNodeIdx, GraphNodeIdx, EdgeType))> {
		self.edges
			.iter()
			.enumerate()
			.filter(move |(_, (from, _, _))| *from == node)
			.map(|(a, b)| (GraphEdgeIdx(a), b))
	}
}

/// A directed graph with parallel edges and fast reads.
///
/// All read operations are fast. Node values stay mutable;
/// the edge set does not.
pub struct FinalizedGraph<NodeType, EdgeType>
where
	NodeType: Debug,
	EdgeType: Debug,
{
	/// The graph data
	graph: Graph<NodeType, EdgeType>,

	/// An array of edge idx, sorted by start node.
	/// Redundant, but makes reads faster.
	edge_map_out: Vec<Vec<GraphEdgeIdx>>,

	/// An array of edge idx, sorted by end node.
	/// Redundant, but makes reads faster.
	edge_map_in: Vec<Vec<GraphEdgeIdx>>,
}

impl<NodeType, EdgeType> Debug for FinalizedGraph<NodeType, EdgeType>
where
	NodeType: Debug,
	EdgeType: Debug,
{
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("FinalizedGraph")
			.field("nodes", &self.graph.nodes)
			.field("edges", &self.graph.edges)
			.finish()
	}
}

impl<NodeType, EdgeType> FinalizedGraph<NodeType, EdgeType>
where
	NodeType: Debug,
	EdgeType: Debug,
{
	/// Get a node by index
	#[inline]
	pub fn get_node(&self, node_idx: GraphNodeIdx) -> &NodeType {
		self.graph.get_node(node_idx)
	}

	/// Get a mutable reference to a node by index
	#[inline]
	pub fn get_node_mut(&mut self, node_idx: GraphNodeIdx) -> &mut NodeType {
		self.graph.get_node_mut(node_idx)
	}

	/// The number of nodes in this graph
	#[inline]
	pub fn len_nodes(&self) -> usize {
		self.graph.len_nodes()
	}

	/// Iterate over all nodes in this graph
	#[inline]
	pub fn iter_nodes(&self) -> impl Iterator<Item = &NodeType> {
		self.graph.iter_nodes()
	}

	/// Iterate over all nodes in this graph, including node index
	#[inline]
	pub fn iter_nodes_idx(&self) -> impl Iterator<Item = (GraphNodeIdx, &NodeType)> {
		self.graph.iter_nodes_idx()
	}

	/// Get an edge by index
	#[inline]
	pub fn get_edge(&self, edge_idx: GraphEdgeIdx) -> &(GraphNodeIdx, GraphNodeIdx, EdgeType) {
		self.graph.get_edge(edge_idx)
	}

	/// The number of edges in this graph
	#[inline]
	pub fn len_edges(&self) -> usize {
		self.graph.len_edges()
	}

	/// Get all edges starting at the given node, in insertion order
	pub fn edges_starting_at(&self, node: GraphNodeIdx) -> &[GraphEdgeIdx] {
		self.edge_map_out.get(usize::from(node)).unwrap()
	}

	/// Get all edges ending at the given node, in insertion order
	pub fn edges_ending_at(&self, node: GraphNodeIdx) -> &[GraphEdgeIdx] {
		self.edge_map_in.get(usize::from(node)).unwrap()
	}

	/// Walk the graph depth-first along out-edges from `root` and
	/// return every reachable node in post-order: a node appears
	/// after all nodes it has edges to. Each node appears once, even
	/// if it is reachable along many paths.
	///
	/// Fails if the reachable subgraph contains a directed cycle.
	pub fn postorder_from(&self, root: GraphNodeIdx) -> Result<Vec<GraphNodeIdx>, GraphHasCycle> {
		#[derive(Clone, Copy, PartialEq, Eq)]
		enum Mark {
			New,
			OnStack,
			Finished,
		}

		let mut marks = vec![Mark::New; self.len_nodes()];
		let mut order = Vec::new();

		// Iterative DFS. The second stack element tracks how many
		// out-edges of the node we have already followed.
		let mut stack: Vec<(GraphNodeIdx, usize)> = vec![(root, 0)];
		marks[root.as_usize()] = Mark::OnStack;

		while let Some((node, n_visited)) = stack.pop() {
			let out = self.edges_starting_at(node);

			if n_visited < out.len() {
				stack.push((node, n_visited + 1));
				let (_, next, _) = self.get_edge(out[n_visited]);
				match marks[next.as_usize()] {
					Mark::New => {
						marks[next.as_usize()] = Mark::OnStack;
						stack.push((*next, 0));
					}
					Mark::OnStack => return Err(GraphHasCycle),
					Mark::Finished => {}
				}
			} else {
				marks[node.as_usize()] = Mark::Finished;
				order.push(node);
			}
		}

		Ok(order)
	}
}
