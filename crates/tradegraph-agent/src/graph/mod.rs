//! Graph execution engine.
//!
//! A graph is a registry of named [`Node`]s, each owning an ordered list of
//! outgoing [`Edge`]s. Starting from the start node, the executor runs the
//! current node until it reports [`NodeStatus::Passed`], then follows the
//! first edge whose predicate holds. When no edge fires the run is over.
//!
//! A [`Graph`] is itself a `Node`, so sub-pipelines compose into larger ones.

pub mod edge;
pub mod executor;
pub mod node;

pub use edge::{Edge, Predicate};
pub use executor::Graph;
pub use node::{FnNode, Node, NodeState, NodeStatus};
