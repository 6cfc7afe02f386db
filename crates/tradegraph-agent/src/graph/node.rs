use serde::{Deserialize, Serialize};

use tradegraph_core::error::Result;

use crate::context::Context;

/// Outcome of one invocation of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    /// Not done yet; the executor runs the same node again.
    Pending,
    /// Done; the executor follows the first firing edge.
    Passed,
}

/// Lifecycle state the executor records for each registered node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    #[default]
    Pending,
    Running,
    Passed,
}

/// A named unit of work in a graph.
///
/// Nodes communicate only through the [`Context`]. Anything an outgoing edge
/// predicate reads must be written before `run` returns.
pub trait Node: Send {
    /// Unique name within the owning graph.
    fn name(&self) -> &str;

    fn run(&mut self, ctx: &mut Context) -> Result<NodeStatus>;

    /// Drop per-pass state (counters, cursors). Called by the executor at the
    /// start of every run so a pass aborted by an error leaves nothing behind.
    fn reset(&mut self) {}
}

/// A node backed by a closure.
pub struct FnNode<F> {
    name: String,
    f: F,
}

impl<F> FnNode<F>
where
    F: FnMut(&mut Context) -> Result<NodeStatus> + Send,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> Node for FnNode<F>
where
    F: FnMut(&mut Context) -> Result<NodeStatus> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self, ctx: &mut Context) -> Result<NodeStatus> {
        (self.f)(ctx)
    }
}
