use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info};

use crate::data::source::BatchSource;
use crate::display::MetricsDisplay;
use crate::error::{ConfigurationError, TrainError};
use crate::pipeline::PrefetchPipeline;
use crate::train::epoch_state::EpochState;
use crate::train::epoch_stats::EpochStats;
use crate::train::metrics::MetricsLog;
use crate::train::schedule::DecaySchedule;
use crate::train::step::{TrainStep, ValidateStep, ValidationOutcome};
use crate::train::train_config::{TrainConfig, TrainingMode};

/// Where a run stands. Only `Running` allows further epochs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    Running,
    StoppedByPatience,
    StoppedByEpochLimit,
    /// The external stop flag was raised.
    Cancelled,
}

/// Final report of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub outcome: RunState,
    pub epochs_completed: usize,
    pub iterations: usize,
    /// `+∞` when no epoch finished (or in pretraining mode).
    pub best_validation_loss: f64,
    pub final_learning_rate: f64,
}

/// Running sums over one validation phase.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ValidationTally {
    pub loss_sum: f64,
    pub correct: f64,
    pub items: usize,
}

impl ValidationTally {
    pub fn add(&mut self, outcome: ValidationOutcome, items: usize) {
        self.loss_sum += outcome.loss_sum;
        self.correct += outcome.correct;
        self.items += items;
    }

    /// `(mean loss, accuracy)` over the items actually examined. An empty
    /// phase counts as infinitely bad rather than producing NaN.
    pub fn means(&self) -> (f64, f64) {
        if self.items == 0 {
            return (f64::INFINITY, 0.0);
        }
        let n = self.items as f64;
        (self.loss_sum / n, self.correct / n)
    }
}

/// Epoch loop with early stopping and fixed learning-rate decay.
///
/// Each epoch: decay check, a training pass over a fresh prefetch pipeline,
/// a validation pass over another, the early-stopping update (skipped in
/// pretraining mode), one display call, then the termination check. A
/// controller drives a single run; the metrics it gathered stay readable
/// after the run ends, including when it ends in an error.
pub struct EpochController {
    config: TrainConfig,
    schedule: DecaySchedule,
    state: EpochState,
    run_state: RunState,
    epochs_completed: usize,
    metrics: MetricsLog,
}

impl EpochController {
    pub fn new(config: TrainConfig) -> Result<EpochController, ConfigurationError> {
        config.validate()?;
        Ok(EpochController {
            schedule: DecaySchedule::for_epochs(config.epochs),
            state: EpochState::new(config.patience, config.learning_rate),
            run_state: RunState::Running,
            epochs_completed: 0,
            metrics: MetricsLog::new(),
            config,
        })
    }

    pub fn state(&self) -> &EpochState {
        &self.state
    }

    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    pub fn metrics(&self) -> &MetricsLog {
        &self.metrics
    }

    pub fn into_metrics(self) -> MetricsLog {
        self.metrics
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            outcome: self.run_state,
            epochs_completed: self.epochs_completed,
            iterations: self.state.iteration,
            best_validation_loss: self.state.best_metric,
            final_learning_rate: self.state.learning_rate,
        }
    }

    /// Runs epochs until a terminal state is reached and returns the summary.
    ///
    /// # Arguments
    /// - `train_source`      : one training pass is `item_count()` items
    /// - `validation_source` : evaluated in full after every training pass
    /// - `steps`             : the model; trained and validated in place
    /// - `display`           : called once per completed epoch
    ///
    /// # Early termination
    /// The run ends before the epoch limit if:
    /// - patience reaches zero in `TrainingMode::Normal` (`StoppedByPatience`), **or**
    /// - `stop_flag` is set (`Cancelled`). It is checked after every batch and
    ///   at the end of each epoch.
    ///
    /// Dropping the `progress_tx` receiver does not stop the run. Progress
    /// sends that fail are skipped.
    ///
    /// # Errors
    /// The first `SourceError` or `StepError` aborts the run. Metrics gathered
    /// until then stay readable through `metrics()`.
    pub fn run<S, D>(
        &mut self,
        train_source: Arc<dyn BatchSource>,
        validation_source: Arc<dyn BatchSource>,
        steps: &mut S,
        display: &mut D,
    ) -> Result<RunSummary, TrainError>
    where
        S: TrainStep + ValidateStep,
        D: MetricsDisplay + ?Sized,
    {
        if self.run_state != RunState::Running {
            return Ok(self.summary());
        }
        info!(
            epochs = self.config.epochs,
            patience = self.config.patience,
            learning_rate = self.config.learning_rate,
            producers = self.config.producer_count,
            mode = ?self.config.mode,
            train_items = train_source.item_count(),
            validation_items = validation_source.item_count(),
            "starting training run"
        );
        if self.config.epochs == 0 {
            self.run_state = RunState::StoppedByEpochLimit;
        }

        while self.run_state == RunState::Running {
            self.run_epoch(&train_source, &validation_source, steps, display)?;
        }

        info!(
            outcome = ?self.run_state,
            epochs = self.epochs_completed,
            iterations = self.state.iteration,
            best_validation_loss = self.state.best_metric,
            "training run finished"
        );
        Ok(self.summary())
    }

    /// One epoch: decay check, training pass, validation pass, early-stopping
    /// update, display, then the termination check that sets `run_state` or
    /// advances `state.epoch`.
    fn run_epoch<S, D>(
        &mut self,
        train_source: &Arc<dyn BatchSource>,
        validation_source: &Arc<dyn BatchSource>,
        steps: &mut S,
        display: &mut D,
    ) -> Result<(), TrainError>
    where
        S: TrainStep + ValidateStep,
        D: MetricsDisplay + ?Sized,
    {
        let epoch = self.state.epoch;

        // ── Learning-rate decay ───────────────────────────────────────────
        if self.schedule.decays_at(epoch) {
            self.state.learning_rate = self.schedule.apply(epoch, self.state.learning_rate);
            info!(epoch, learning_rate = self.state.learning_rate, "learning rate decayed");
        }

        // ── Training pass ─────────────────────────────────────────────────
        let started = Instant::now();
        if !self.train_phase(train_source, steps)? {
            self.run_state = RunState::Cancelled;
            return Ok(());
        }
        let train_ms = started.elapsed().as_millis() as u64;

        // ── Validation pass ───────────────────────────────────────────────
        let tally = match self.validate_phase(validation_source, steps)? {
            Some(tally) => tally,
            None => {
                self.run_state = RunState::Cancelled;
                return Ok(());
            }
        };
        let (val_loss, val_accuracy) = tally.means();
        self.metrics.record_epoch(self.state.iteration, val_loss, val_accuracy);

        // ── Early stopping ────────────────────────────────────────────────
        let improved = match self.config.mode {
            TrainingMode::Normal => self.state.record_validation(val_loss, self.config.patience),
            TrainingMode::Pretraining => false,
        };
        self.epochs_completed += 1;

        // ── Display and progress ──────────────────────────────────────────
        display.display(&self.metrics, self.config.windows);

        let stats = EpochStats {
            epoch,
            total_epochs: self.config.epochs,
            iteration: self.state.iteration,
            last_train_loss: self.metrics.last_training_loss(),
            val_loss,
            val_accuracy,
            learning_rate: self.state.learning_rate,
            patience_remaining: self.state.patience_remaining,
            improved,
            train_ms,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            epoch,
            val_loss,
            val_accuracy,
            last_train_loss = ?stats.last_train_loss,
            patience_remaining = stats.patience_remaining,
            seconds = stats.elapsed_ms / 1000,
            "epoch complete"
        );
        if let Some(ref tx) = self.config.progress_tx {
            // A gone receiver is not a stop request; only `stop_flag` is.
            let _ = tx.send(stats);
        }

        // ── Termination ───────────────────────────────────────────────────
        if self.config.mode == TrainingMode::Normal && self.state.patience_remaining == 0 {
            self.run_state = RunState::StoppedByPatience;
            info!(best_validation_loss = self.state.best_metric, "patience exhausted");
        } else if epoch + 1 >= self.config.epochs {
            self.run_state = RunState::StoppedByEpochLimit;
        } else if self.stop_requested() {
            self.run_state = RunState::Cancelled;
        } else {
            self.state.epoch += 1;
        }
        Ok(())
    }

    /// One pass over the training source. `Ok(false)` means the stop flag
    /// interrupted it.
    fn train_phase<S: TrainStep>(
        &mut self,
        source: &Arc<dyn BatchSource>,
        steps: &mut S,
    ) -> Result<bool, TrainError> {
        let mut pipeline = PrefetchPipeline::create(
            Arc::clone(source),
            source.item_count(),
            self.config.producer_count,
            self.config.queue_capacity,
        )?;
        while let Some(item) = pipeline.next() {
            let batch = item?;
            let outcome = steps.train(&batch, self.state.learning_rate)?;
            self.metrics.record_iteration(self.state.iteration, outcome.loss, outcome.gradient_norm);
            self.state.iteration += 1;
            if self.stop_requested() {
                pipeline.cancel();
                debug!(iteration = self.state.iteration, "training phase cancelled");
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// One pass over the validation source. `None` means the stop flag
    /// interrupted it.
    fn validate_phase<S: ValidateStep>(
        &mut self,
        source: &Arc<dyn BatchSource>,
        steps: &mut S,
    ) -> Result<Option<ValidationTally>, TrainError> {
        let mut pipeline = PrefetchPipeline::create(
            Arc::clone(source),
            source.item_count(),
            self.config.producer_count,
            self.config.queue_capacity,
        )?;
        let mut tally = ValidationTally::default();
        while let Some(item) = pipeline.next() {
            let batch = item?;
            let outcome = steps.validate(&batch)?;
            tally.add(outcome, batch.len());
            if self.stop_requested() {
                pipeline.cancel();
                return Ok(None);
            }
        }
        Ok(Some(tally))
    }

    fn stop_requested(&self) -> bool {
        self.config
            .stop_flag
            .as_ref()
            .map_or(false, |flag| flag.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tally_divides_by_items_examined() {
        let mut tally = ValidationTally::default();
        for (size, loss) in [(4, 8.0), (4, 4.0), (2, 1.0)] {
            tally.add(ValidationOutcome { loss_sum: loss, correct: size as f64 / 2.0 }, size);
        }
        let (loss, accuracy) = tally.means();
        assert!((loss - 1.3).abs() < 1e-12);
        assert!((accuracy - 0.5).abs() < 1e-12);
    }

    #[test]
    fn empty_tally_is_infinitely_bad() {
        assert_eq!(ValidationTally::default().means(), (f64::INFINITY, 0.0));
    }

    #[test]
    fn invalid_config_is_rejected() {
        assert!(EpochController::new(TrainConfig::new(5, 2, -1.0)).is_err());
    }

    #[test]
    fn fresh_controller_state() {
        let controller = EpochController::new(TrainConfig::new(5, 2, 0.1)).unwrap();
        assert_eq!(controller.run_state(), RunState::Running);
        assert_eq!(controller.state().best_metric, f64::INFINITY);
        assert_eq!(controller.state().patience_remaining, 2);
        assert!(controller.metrics().training_loss().is_empty());
    }
}
