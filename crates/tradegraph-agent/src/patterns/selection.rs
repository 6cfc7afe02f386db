//! Worklist selection loop.
//!
//! A [`SelectionNode`] pops the head of a worklist into a "current item" key
//! on every visit. Wired with [`connect_selection`], the processor handles the
//! current item and loops back, so a worklist of `k` items visits the selector
//! `k + 1` times and the processor `k` times. The last visit finds the list
//! drained, clears the current item and lets the selector's remaining edges
//! pick the next stage.

use tracing::{debug, info};

use tradegraph_core::error::{Result, TradegraphError};

use crate::context::{Context, Key};
use crate::graph::{Graph, Node, NodeStatus};

type SelectHook = Box<dyn FnMut(&mut Context, &str) + Send>;

pub struct SelectionNode {
    name: String,
    worklist: Key<Vec<String>>,
    fallback: Key<Vec<String>>,
    current: Key<String>,
    on_select: Option<SelectHook>,
    popped: usize,
}

impl SelectionNode {
    /// `worklist` is drained one item per visit into `current`. When it is
    /// empty on the first visit of a pass it is seeded from `fallback`.
    pub fn new(
        name: impl Into<String>,
        worklist: Key<Vec<String>>,
        fallback: Key<Vec<String>>,
        current: Key<String>,
    ) -> Self {
        Self {
            name: name.into(),
            worklist,
            fallback,
            current,
            on_select: None,
            popped: 0,
        }
    }

    /// Run `hook` after each item is selected, e.g. to reset per-item state.
    pub fn on_select(mut self, hook: impl FnMut(&mut Context, &str) + Send + 'static) -> Self {
        self.on_select = Some(Box::new(hook));
        self
    }
}

impl Node for SelectionNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self, ctx: &mut Context) -> Result<NodeStatus> {
        let mut items = ctx.get_cache(self.worklist).unwrap_or_default();

        if items.is_empty() {
            if self.popped > 0 {
                info!(node = %self.name, processed = self.popped, "Worklist drained");
                ctx.remove_cache(self.current);
                self.popped = 0;
                return Ok(NodeStatus::Passed);
            }

            items = ctx.get_cache(self.fallback).unwrap_or_default();
            if items.is_empty() {
                return Err(TradegraphError::EmptyWorklist {
                    node: self.name.clone(),
                    worklist: self.worklist.name().to_string(),
                    fallback: self.fallback.name().to_string(),
                });
            }
            debug!(
                node = %self.name,
                fallback = %self.fallback,
                items = items.len(),
                "Seeding worklist from fallback"
            );
        }

        let item = items.remove(0);
        let remaining = items.len();
        ctx.set_cache(self.worklist, items);
        ctx.set_cache(self.current, item.clone());
        self.popped += 1;

        if let Some(hook) = self.on_select.as_mut() {
            hook(ctx, &item);
        }

        info!(node = %self.name, item = %item, remaining, "Selected item");
        Ok(NodeStatus::Passed)
    }

    fn reset(&mut self) {
        self.popped = 0;
    }
}

/// Wire a selection loop: `selector -> first` while an item is current, and
/// `last -> selector` to come back for the next one. Edges added to the
/// selector afterwards fire once the worklist is drained.
pub fn connect_selection(
    graph: &mut Graph,
    selector: &str,
    first: &str,
    last: &str,
    current: Key<String>,
) -> Result<()> {
    graph.add_conditional_edge(selector, first, move |ctx| ctx.get_cache(current).is_some())?;
    graph.add_edge(last, selector)
}
