use serde::Serialize;

/// Mutable bookkeeping of a training run, advanced by the controller at
/// iteration and epoch boundaries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpochState {
    /// Training batches processed so far, across all epochs.
    pub iteration: usize,
    /// Zero-based index of the current epoch.
    pub epoch: usize,
    /// Lowest mean validation loss seen; `+∞` until the first epoch ends.
    pub best_metric: f64,
    pub patience_remaining: usize,
    pub learning_rate: f64,
}

impl EpochState {
    pub fn new(patience: usize, learning_rate: f64) -> EpochState {
        EpochState {
            iteration: 0,
            epoch: 0,
            best_metric: f64::INFINITY,
            patience_remaining: patience,
            learning_rate,
        }
    }

    /// Early-stopping update for one epoch's mean validation loss.
    ///
    /// A strictly lower loss becomes the new best and refills patience;
    /// anything else costs one unit of patience. Returns whether the loss
    /// improved.
    pub fn record_validation(&mut self, loss: f64, patience: usize) -> bool {
        if loss < self.best_metric {
            self.best_metric = loss;
            self.patience_remaining = patience;
            true
        } else {
            self.patience_remaining = self.patience_remaining.saturating_sub(1);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patience_counts_down_on_plateau() {
        let mut state = EpochState::new(2, 0.1);
        let mut improved = Vec::new();
        let mut remaining = Vec::new();
        for loss in [1.0, 1.0, 1.0] {
            improved.push(state.record_validation(loss, 2));
            remaining.push(state.patience_remaining);
        }
        assert_eq!(improved, vec![true, false, false]);
        assert_eq!(remaining, vec![2, 1, 0]);
        assert_eq!(state.best_metric, 1.0);
    }

    #[test]
    fn improvement_refills_patience() {
        let mut state = EpochState::new(3, 0.1);
        state.record_validation(2.0, 3);
        state.record_validation(2.5, 3);
        assert_eq!(state.patience_remaining, 2);
        assert!(state.record_validation(1.5, 3));
        assert_eq!(state.patience_remaining, 3);
        assert_eq!(state.best_metric, 1.5);
    }

    #[test]
    fn patience_never_underflows() {
        let mut state = EpochState::new(0, 0.1);
        state.record_validation(1.0, 0);
        state.record_validation(2.0, 0);
        assert_eq!(state.patience_remaining, 0);
    }

    #[test]
    fn nan_loss_is_not_an_improvement() {
        let mut state = EpochState::new(2, 0.1);
        assert!(!state.record_validation(f64::NAN, 2));
        assert_eq!(state.patience_remaining, 1);
    }
}
