use std::fmt;

use crate::context::Context;

/// Guard on an edge. Must be cheap and free of I/O.
pub type Predicate = Box<dyn Fn(&Context) -> bool + Send + Sync>;

/// A directed link from the owning node to `target`.
pub struct Edge {
    pub target: String,
    predicate: Option<Predicate>,
}

impl Edge {
    /// An edge that always fires.
    pub fn always(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            predicate: None,
        }
    }

    /// An edge that fires when `predicate` holds.
    pub fn when(
        target: impl Into<String>,
        predicate: impl Fn(&Context) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            target: target.into(),
            predicate: Some(Box::new(predicate)),
        }
    }

    pub fn is_conditional(&self) -> bool {
        self.predicate.is_some()
    }

    pub fn fires(&self, ctx: &Context) -> bool {
        self.predicate.as_ref().map_or(true, |p| p(ctx))
    }
}

impl fmt::Debug for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Edge")
            .field("target", &self.target)
            .field("conditional", &self.is_conditional())
            .finish()
    }
}
