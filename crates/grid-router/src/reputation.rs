//! Fetch outcome feedback.
//!
//! The router reports what happened on every attempt and nothing more. What
//! a collaborator does with the reports (adjust weights, ban peers) is its
//! own business.

use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc;

use crate::BackendId;

/// What a single fetch attempt did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// Subtree or authoritative absence returned.
    Success,
    /// Transport error.
    Failure,
    /// Attempt timed out.
    Timeout,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

/// One reputation report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    /// Backend the attempt went to.
    pub backend: BackendId,
    /// What happened.
    pub outcome: Outcome,
}

/// Receives one report per fetch attempt.
pub trait ReputationSink: Send + Sync {
    /// Record an attempt outcome. Must not block.
    fn report(&self, backend: &BackendId, outcome: Outcome);
}

/// Discards reports.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ReputationSink for NullSink {
    fn report(&self, _backend: &BackendId, _outcome: Outcome) {}
}

/// Keeps every report in memory.
#[derive(Debug, Default)]
pub struct OutcomeLog {
    reports: Mutex<Vec<Report>>,
}

impl OutcomeLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// All reports so far, oldest first.
    pub fn reports(&self) -> Vec<Report> {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Count reports for `backend` with `outcome`.
    pub fn count(&self, backend: &BackendId, outcome: Outcome) -> usize {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| &r.backend == backend && r.outcome == outcome)
            .count()
    }
}

impl ReputationSink for OutcomeLog {
    fn report(&self, backend: &BackendId, outcome: Outcome) {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Report {
                backend: backend.clone(),
                outcome,
            });
    }
}

/// Forward reports to an async consumer. A closed channel drops them.
impl ReputationSink for mpsc::UnboundedSender<Report> {
    fn report(&self, backend: &BackendId, outcome: Outcome) {
        let _ = self.send(Report {
            backend: backend.clone(),
            outcome,
        });
    }
}
