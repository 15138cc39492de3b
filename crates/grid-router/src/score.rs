//! Pluggable candidate scoring.

use crate::{BackendId, Weight, WeightSnapshot};

/// Turns a weight snapshot into a ranking score for one backend.
///
/// Closures `Fn(&BackendId, &WeightSnapshot) -> Weight` are scorers too.
pub trait Scorer: Send + Sync {
    /// Score `backend`. Higher ranks first.
    fn score(&self, backend: &BackendId, weights: &WeightSnapshot) -> Weight;
}

/// Score = the backend's weight in the snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct WeightScorer;

impl Scorer for WeightScorer {
    fn score(&self, backend: &BackendId, weights: &WeightSnapshot) -> Weight {
        weights.weight(backend)
    }
}

impl<F> Scorer for F
where
    F: Fn(&BackendId, &WeightSnapshot) -> Weight + Send + Sync,
{
    fn score(&self, backend: &BackendId, weights: &WeightSnapshot) -> Weight {
        self(backend, weights)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WeightTable;

    #[test]
    fn weight_scorer_reads_snapshot() {
        let table = WeightTable::new();
        table.set_weight("a", 4);
        let snap = table.snapshot();
        assert_eq!(WeightScorer.score(&"a".into(), &snap), Weight(4));
        assert_eq!(WeightScorer.score(&"b".into(), &snap), Weight::ZERO);
    }

    #[test]
    fn closure_scorer() {
        let inverted = |id: &BackendId, w: &WeightSnapshot| Weight(-w.weight(id).0);
        let table = WeightTable::new();
        table.set_weight("a", 4);
        assert_eq!(inverted.score(&"a".into(), &table.snapshot()), Weight(-4));
    }
}
