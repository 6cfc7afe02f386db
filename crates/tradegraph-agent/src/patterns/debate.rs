//! Round-limited adversarial loop.
//!
//! Two [`TurnNode`]s alternate. Each turn appends one line to a shared
//! transcript and bumps a shared counter before returning, so the exit edge
//! after the second speaker sees the updated count. With `rounds = r` the
//! decision node is reached after exactly `2r` turns.

use tracing::debug;

use tradegraph_core::error::Result;

use crate::context::{Context, Key};
use crate::graph::{Graph, Node, NodeStatus};

/// One side of a debate.
pub trait Speaker: Send {
    /// Label prefixed to this speaker's transcript lines.
    fn label(&self) -> &str;

    /// Produce this turn's contribution.
    fn speak(&mut self, ctx: &mut Context) -> Result<String>;
}

/// Runs a [`Speaker`] and records its turn.
pub struct TurnNode<S> {
    name: String,
    speaker: S,
    transcript: Key<String>,
    counter: Key<u32>,
}

impl<S: Speaker> TurnNode<S> {
    pub fn new(
        name: impl Into<String>,
        speaker: S,
        transcript: Key<String>,
        counter: Key<u32>,
    ) -> Self {
        Self {
            name: name.into(),
            speaker,
            transcript,
            counter,
        }
    }
}

impl<S: Speaker> Node for TurnNode<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self, ctx: &mut Context) -> Result<NodeStatus> {
        let said = self.speaker.speak(ctx)?;
        let line = format!("{}: {}", self.speaker.label(), said.replace('\n', " "));

        let mut transcript = ctx.get_cache(self.transcript).unwrap_or_default();
        if !transcript.is_empty() {
            transcript.push('\n');
        }
        transcript.push_str(&line);
        ctx.set_cache(self.transcript, transcript);

        let count = ctx.get_cache(self.counter).unwrap_or(0) + 1;
        ctx.set_cache(self.counter, count);
        debug!(node = %self.name, turn = count, "Debate turn recorded");

        Ok(NodeStatus::Passed)
    }
}

/// Wire `a -> b`, then from `b` either to `decision` once
/// `counter >= rounds * 2` or back to `a`. `rounds` is read from config at
/// evaluation time and defaults to 1.
pub fn connect_debate(
    graph: &mut Graph,
    a: &str,
    b: &str,
    decision: &str,
    counter: Key<u32>,
    rounds: Key<u32>,
) -> Result<()> {
    graph.add_edge(a, b)?;
    graph.add_conditional_edge(b, decision, move |ctx| {
        let limit = ctx.get_config(rounds).unwrap_or(1).saturating_mul(2);
        ctx.get_cache(counter).unwrap_or(0) >= limit
    })?;
    graph.add_edge(b, a)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::keys::{cache, config};
    use crate::graph::FnNode;

    struct Echo(&'static str);

    impl Speaker for Echo {
        fn label(&self) -> &str {
            self.0
        }

        fn speak(&mut self, ctx: &mut Context) -> Result<String> {
            let turn = ctx.get_cache(cache::COUNT).unwrap_or(0) + 1;
            Ok(format!("argument {turn}"))
        }
    }

    fn debate_graph() -> Graph {
        let bull = TurnNode::new("bull", Echo("Bull"), cache::HISTORY, cache::COUNT);
        let bear = TurnNode::new("bear", Echo("Bear"), cache::HISTORY, cache::COUNT);
        let decide = FnNode::new("decision", |ctx: &mut Context| {
            let mut history = ctx.get_cache(cache::HISTORY).unwrap_or_default();
            history.push_str("\nManager: HOLD");
            ctx.set_cache(cache::HISTORY, history);
            Ok(NodeStatus::Passed)
        });

        let mut graph = Graph::new("debate", bull);
        graph.add_node(bear).unwrap();
        graph.add_node(decide).unwrap();
        connect_debate(&mut graph, "bull", "bear", "decision", cache::COUNT, config::ROUNDS)
            .unwrap();
        graph
    }

    #[test]
    fn test_two_rounds_make_four_turns() {
        let mut graph = debate_graph();
        let mut ctx = Context::new();
        ctx.set_config(config::ROUNDS, 2);

        graph.execute(&mut ctx).unwrap();

        let history = ctx.get_cache(cache::HISTORY).unwrap();
        let lines: Vec<&str> = history.lines().collect();
        assert_eq!(
            lines,
            vec![
                "Bull: argument 1",
                "Bear: argument 2",
                "Bull: argument 3",
                "Bear: argument 4",
                "Manager: HOLD",
            ]
        );
        assert_eq!(graph.visits("bull"), 2);
        assert_eq!(graph.visits("bear"), 2);
        assert_eq!(graph.visits("decision"), 1);
        assert_eq!(ctx.get_cache(cache::COUNT), Some(4));
    }

    #[test]
    fn test_rounds_default_to_one() {
        let mut graph = debate_graph();
        let mut ctx = Context::new();
        graph.execute(&mut ctx).unwrap();
        assert_eq!(graph.visits("bull"), 1);
        assert_eq!(graph.visits("bear"), 1);
        assert_eq!(graph.visits("decision"), 1);
    }

    #[test]
    fn test_multiline_turn_stays_one_line() {
        struct Verbose;
        impl Speaker for Verbose {
            fn label(&self) -> &str {
                "Bull"
            }
            fn speak(&mut self, _ctx: &mut Context) -> Result<String> {
                Ok("first\nsecond".into())
            }
        }

        let mut node = TurnNode::new("bull", Verbose, cache::HISTORY, cache::COUNT);
        let mut ctx = Context::new();
        node.run(&mut ctx).unwrap();
        assert_eq!(ctx.get_cache(cache::HISTORY).unwrap(), "Bull: first second");
        assert_eq!(ctx.get_cache(cache::COUNT), Some(1));
    }
}
