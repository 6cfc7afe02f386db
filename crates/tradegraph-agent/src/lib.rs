pub mod agent;
pub mod broker;
pub mod context;
pub mod graph;
pub mod patterns;
pub mod pipelines;

pub use agent::{Agent, Structured};
pub use broker::PaperBroker;
pub use context::{Context, Key, LogEntry};
pub use graph::{Edge, FnNode, Graph, Node, NodeState, NodeStatus};
pub use pipelines::{main_graph, Collaborators};
