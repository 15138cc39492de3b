//! Weighted candidate selection and the miss protocol.
//!
//! For one stub the router:
//!
//! 1. loads a single weight snapshot,
//! 2. drops candidates that decline the prefix,
//! 3. ranks the rest (score desc, RTT asc, id asc),
//! 4. fetches from each in turn under a timeout until one answers or the
//!    retry budget runs out.
//!
//! Demotion lives only inside one call. The next miss starts from a fresh
//! ranking, so a backend that failed earlier is eligible again.

use std::sync::Arc;
use std::time::Duration;

use grid_trie::Key;
use tracing::{debug, warn};

use crate::{
    Backend, BackendId, Fetched, MissError, NullSink, Outcome, ReputationSink, RouterConfig,
    Scorer, Weight, WeightScorer, WeightSnapshot, WeightTable,
};

/// A candidate with its ranking inputs.
#[derive(Clone)]
pub struct Ranked {
    /// The backend.
    pub backend: Arc<dyn Backend>,
    /// Score from the scorer.
    pub score: Weight,
    /// RTT estimate from the snapshot.
    pub rtt: Option<Duration>,
}

impl std::fmt::Debug for Ranked {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ranked")
            .field("backend", self.backend.id())
            .field("score", &self.score)
            .field("rtt", &self.rtt)
            .finish()
    }
}

/// A miss that some backend answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    /// The answer.
    pub fetched: Fetched,
    /// Who answered.
    pub backend: BackendId,
    /// Attempts made, including the successful one.
    pub attempts: usize,
    /// Weight snapshot version used for ranking.
    pub version: u64,
}

/// Selects among backends for a mount prefix.
pub struct Router {
    config: RouterConfig,
    weights: Arc<WeightTable>,
    scorer: Arc<dyn Scorer>,
    reputation: Arc<dyn ReputationSink>,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("config", &self.config)
            .field("weights_version", &self.weights.version())
            .finish()
    }
}

impl Router {
    /// Create a router ranking by raw weight and discarding reports.
    pub fn new(config: RouterConfig, weights: Arc<WeightTable>) -> Self {
        Self {
            config,
            weights,
            scorer: Arc::new(WeightScorer),
            reputation: Arc::new(NullSink),
        }
    }

    /// Replace the scorer.
    #[must_use]
    pub fn with_scorer(mut self, scorer: Arc<dyn Scorer>) -> Self {
        self.scorer = scorer;
        self
    }

    /// Replace the reputation sink.
    #[must_use]
    pub fn with_reputation(mut self, sink: Arc<dyn ReputationSink>) -> Self {
        self.reputation = sink;
        self
    }

    /// Configuration in use.
    pub const fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// The weight table read by this router.
    pub fn weights(&self) -> &Arc<WeightTable> {
        &self.weights
    }

    /// Rank the candidates that accept `prefix` against one snapshot.
    pub fn rank(
        &self,
        prefix: &Key,
        candidates: &[Arc<dyn Backend>],
        snapshot: &WeightSnapshot,
    ) -> Vec<Ranked> {
        let mut ranked: Vec<Ranked> = candidates
            .iter()
            .filter(|b| {
                let accepts = b.accepts(prefix);
                if !accepts {
                    debug!(backend = %b.id(), prefix = %prefix, "backend declined prefix");
                }
                accepts
            })
            .map(|b| Ranked {
                score: self.scorer.score(b.id(), snapshot),
                rtt: snapshot.rtt(b.id()),
                backend: Arc::clone(b),
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| match (a.rtt, b.rtt) {
                    (Some(x), Some(y)) => x.cmp(&y),
                    (Some(_), None) => std::cmp::Ordering::Less,
                    (None, Some(_)) => std::cmp::Ordering::Greater,
                    (None, None) => std::cmp::Ordering::Equal,
                })
                .then_with(|| a.backend.id().cmp(b.backend.id()))
        });
        ranked
    }

    /// Resolve one stub's prefix against its candidates.
    ///
    /// Every attempt is reported to the reputation sink. An `Absent` answer
    /// ends the miss like a subtree does.
    pub async fn resolve_miss(
        &self,
        prefix: &Key,
        candidates: &[Arc<dyn Backend>],
    ) -> Result<Resolved, MissError> {
        let snapshot = self.weights.snapshot();
        let ranked = self.rank(prefix, candidates, &snapshot);
        let budget = self.config.retry_budget.max(1).min(ranked.len());

        if ranked.is_empty() {
            warn!(prefix = %prefix, "no backend accepts prefix");
            return Err(MissError::exhausted(prefix.clone(), 0));
        }

        for (attempt, candidate) in ranked.iter().take(budget).enumerate() {
            let id = candidate.backend.id();
            debug!(
                backend = %id,
                kind = %candidate.backend.kind(),
                prefix = %prefix,
                attempt = attempt + 1,
                score = %candidate.score,
                "fetching"
            );

            let fetch = candidate.backend.fetch(prefix);
            match tokio::time::timeout(self.config.fetch_timeout, fetch).await {
                Ok(Ok(fetched)) => {
                    self.reputation.report(id, Outcome::Success);
                    debug!(
                        backend = %id,
                        prefix = %prefix,
                        absent = matches!(fetched, Fetched::Absent),
                        "fetch answered"
                    );
                    return Ok(Resolved {
                        fetched,
                        backend: id.clone(),
                        attempts: attempt + 1,
                        version: snapshot.version(),
                    });
                }
                Ok(Err(e)) => {
                    self.reputation.report(id, Outcome::Failure);
                    warn!(backend = %id, prefix = %prefix, error = %e, "broken promise: fetch failed");
                }
                Err(_) => {
                    self.reputation.report(id, Outcome::Timeout);
                    warn!(
                        backend = %id,
                        prefix = %prefix,
                        timeout_ms = self.config.fetch_timeout.as_millis() as u64,
                        "fetch timed out"
                    );
                }
            }
        }

        warn!(prefix = %prefix, attempts = budget, "candidates exhausted");
        Err(MissError::exhausted(prefix.clone(), budget))
    }
}
