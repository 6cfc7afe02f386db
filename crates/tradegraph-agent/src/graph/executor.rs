use std::collections::HashMap;

use tracing::{debug, info, warn};

use tradegraph_core::error::{Result, TradegraphError};

use super::edge::Edge;
use super::node::{Node, NodeState, NodeStatus};
use crate::context::Context;

/// A registered node plus the executor's bookkeeping for it.
struct Slot {
    node: Box<dyn Node>,
    /// Lifecycle state as of the current (or last) run.
    state: NodeState,
    /// Outgoing edges, evaluated in insertion order.
    edges: Vec<Edge>,
    /// Invocations during the current (or last) run, pending re-runs included.
    visits: usize,
}

impl Slot {
    fn new(node: Box<dyn Node>) -> Self {
        Self {
            node,
            state: NodeState::Pending,
            edges: Vec::new(),
            visits: 0,
        }
    }
}

/// Executes a graph of nodes over a shared [`Context`].
///
/// Single current node, first-match-wins edges, no backtracking and no step
/// limit: a graph whose predicates never stop firing runs forever. Node
/// errors propagate out of [`Graph::execute`] untouched.
pub struct Graph {
    name: String,
    start: String,
    slots: HashMap<String, Slot>,
}

impl Graph {
    /// Create a graph whose start node is `start`.
    pub fn new(name: impl Into<String>, start: impl Node + 'static) -> Self {
        let start_name = start.name().to_string();
        let mut slots = HashMap::new();
        slots.insert(start_name.clone(), Slot::new(Box::new(start)));
        Self {
            name: name.into(),
            start: start_name,
            slots,
        }
    }

    pub fn start(&self) -> &str {
        &self.start
    }

    /// Register a node and return its name.
    pub fn add_node(&mut self, node: impl Node + 'static) -> Result<String> {
        let name = node.name().to_string();
        if self.slots.contains_key(&name) {
            return Err(TradegraphError::Graph(format!(
                "graph '{}' already has a node named '{}'",
                self.name, name
            )));
        }
        self.slots.insert(name.clone(), Slot::new(Box::new(node)));
        Ok(name)
    }

    /// Append an unconditional edge to `from`'s edge list.
    pub fn add_edge(&mut self, from: &str, to: &str) -> Result<()> {
        self.push_edge(from, Edge::always(to))
    }

    /// Append a guarded edge to `from`'s edge list.
    pub fn add_conditional_edge(
        &mut self,
        from: &str,
        to: &str,
        predicate: impl Fn(&Context) -> bool + Send + Sync + 'static,
    ) -> Result<()> {
        self.push_edge(from, Edge::when(to, predicate))
    }

    fn push_edge(&mut self, from: &str, edge: Edge) -> Result<()> {
        if !self.slots.contains_key(&edge.target) {
            return Err(self.unknown(&edge.target));
        }
        match self.slots.get_mut(from) {
            Some(slot) => {
                slot.edges.push(edge);
                Ok(())
            }
            None => Err(self.unknown(from)),
        }
    }

    fn unknown(&self, name: &str) -> TradegraphError {
        TradegraphError::Graph(format!("graph '{}' has no node named '{}'", self.name, name))
    }

    /// Recorded lifecycle state of a node, as of the last run.
    pub fn state(&self, name: &str) -> Option<NodeState> {
        self.slots.get(name).map(|s| s.state)
    }

    /// How many times a node was invoked during the last run.
    pub fn visits(&self, name: &str) -> usize {
        self.slots.get(name).map_or(0, |s| s.visits)
    }

    /// Run the graph to completion.
    pub fn execute(&mut self, ctx: &mut Context) -> Result<()> {
        for slot in self.slots.values_mut() {
            slot.state = NodeState::Pending;
            slot.visits = 0;
            slot.node.reset();
        }

        info!(graph = %self.name, start = %self.start, "Graph started");
        let mut current = self.start.clone();

        loop {
            let Some(slot) = self.slots.get_mut(&current) else {
                return Err(TradegraphError::Graph(format!(
                    "graph '{}' has no node named '{}'",
                    self.name, current
                )));
            };

            slot.state = NodeState::Running;
            slot.visits += 1;
            debug!(graph = %self.name, node = %current, visit = slot.visits, "Running node");

            let status = match slot.node.run(ctx) {
                Ok(status) => status,
                Err(e) => {
                    warn!(graph = %self.name, node = %current, error = %e, "Node failed");
                    return Err(e);
                }
            };

            if status == NodeStatus::Pending {
                slot.state = NodeState::Pending;
                debug!(graph = %self.name, node = %current, "Node pending, re-running");
                continue;
            }
            slot.state = NodeState::Passed;

            match slot.edges.iter().find(|e| e.fires(ctx)) {
                Some(edge) => {
                    debug!(graph = %self.name, from = %current, to = %edge.target, "Edge fired");
                    current = edge.target.clone();
                }
                None => {
                    info!(graph = %self.name, last = %current, "Graph finished");
                    return Ok(());
                }
            }
        }
    }
}

impl Node for Graph {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self, ctx: &mut Context) -> Result<NodeStatus> {
        self.execute(ctx)?;
        Ok(NodeStatus::Passed)
    }

    fn reset(&mut self) {
        for slot in self.slots.values_mut() {
            slot.node.reset();
        }
    }
}
