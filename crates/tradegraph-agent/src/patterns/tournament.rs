//! Pairwise-comparison ranking.
//!
//! Every unordered pair is compared once and the winner scores a point.
//! Scores need not be transitive (A > B, B > C, C > A is fine): the ordering
//! is a heuristic, made deterministic by a stable sort on the input order.

use tracing::debug;

use tradegraph_core::error::Result;
use tradegraph_core::types::Side;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TournamentResult {
    /// Candidates with their win counts, best first. Ties keep input order.
    pub ranked: Vec<(String, u32)>,
    pub comparisons: usize,
}

impl TournamentResult {
    /// The top `slots` candidates unioned with `held`.
    ///
    /// Held entries are never dropped; they follow the top picks in their
    /// given order, skipping any already chosen.
    pub fn select(&self, slots: usize, held: &[String]) -> Vec<String> {
        let mut picked: Vec<String> = self
            .ranked
            .iter()
            .take(slots)
            .map(|(name, _)| name.clone())
            .collect();
        for h in held {
            if !picked.contains(h) {
                picked.push(h.clone());
            }
        }
        picked
    }
}

pub struct Tournament<'a> {
    candidates: &'a [String],
}

impl<'a> Tournament<'a> {
    pub fn new(candidates: &'a [String]) -> Self {
        Self { candidates }
    }

    /// All unordered index pairs `(i, j)` with `i < j`.
    pub fn pairs(&self) -> Vec<(usize, usize)> {
        let n = self.candidates.len();
        (0..n)
            .flat_map(|i| (i + 1..n).map(move |j| (i, j)))
            .collect()
    }

    /// Compare every pair with `compare(a, b)`. `None` means no decision and
    /// scores nobody. The first comparison error aborts the tournament.
    pub fn run<F>(&self, mut compare: F) -> Result<TournamentResult>
    where
        F: FnMut(&str, &str) -> Result<Option<Side>>,
    {
        let mut scores = vec![0u32; self.candidates.len()];
        let pairs = self.pairs();

        for &(i, j) in &pairs {
            let (a, b) = (&self.candidates[i], &self.candidates[j]);
            let winner = compare(a, b)?;
            match winner {
                Some(Side::A) => scores[i] += 1,
                Some(Side::B) => scores[j] += 1,
                None => {}
            }
            debug!(a = %a, b = %b, winner = ?winner, "Pair compared");
        }

        let mut ranked: Vec<(String, u32)> = self
            .candidates
            .iter()
            .cloned()
            .zip(scores)
            .collect();
        // sort_by is stable
        ranked.sort_by(|x, y| y.1.cmp(&x.1));

        Ok(TournamentResult {
            ranked,
            comparisons: pairs.len(),
        })
    }
}
