use std::path::Path;

use serde::{Deserialize, Serialize};

/// Ordered `(iteration, value)` pairs.
pub type MetricSeries = Vec<(usize, f64)>;

/// Metrics recorded during one training run.
///
/// Per-iteration series are keyed by the index of the training batch that
/// produced them. Per-epoch validation series are keyed by the iteration
/// count reached at the end of that epoch's training phase. All series are
/// append-only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsLog {
    training_loss: MetricSeries,
    gradient_norm: MetricSeries,
    validation_loss: MetricSeries,
    validation_accuracy: MetricSeries,
}

impl MetricsLog {
    pub fn new() -> MetricsLog {
        MetricsLog::default()
    }

    pub fn record_iteration(&mut self, iteration: usize, loss: f64, gradient_norm: f64) {
        self.training_loss.push((iteration, loss));
        self.gradient_norm.push((iteration, gradient_norm));
    }

    pub fn record_epoch(&mut self, iteration: usize, validation_loss: f64, validation_accuracy: f64) {
        self.validation_loss.push((iteration, validation_loss));
        self.validation_accuracy.push((iteration, validation_accuracy));
    }

    pub fn training_loss(&self) -> &[(usize, f64)] {
        &self.training_loss
    }

    pub fn gradient_norm(&self) -> &[(usize, f64)] {
        &self.gradient_norm
    }

    pub fn validation_loss(&self) -> &[(usize, f64)] {
        &self.validation_loss
    }

    pub fn validation_accuracy(&self) -> &[(usize, f64)] {
        &self.validation_accuracy
    }

    /// The last `window` training losses.
    pub fn recent_training_loss(&self, window: usize) -> &[(usize, f64)] {
        tail(&self.training_loss, window)
    }

    /// The last `window` gradient norms.
    pub fn recent_gradient_norm(&self, window: usize) -> &[(usize, f64)] {
        tail(&self.gradient_norm, window)
    }

    /// Population variance of the gradient norm over every run of `window`
    /// consecutive iterations, keyed by the last iteration of the run.
    /// Empty while fewer than `window` norms exist.
    pub fn rolling_gradient_variance(&self, window: usize) -> MetricSeries {
        if window == 0 {
            return Vec::new();
        }
        self.gradient_norm
            .windows(window)
            .map(|run| {
                let values: Vec<f64> = run.iter().map(|&(_, v)| v).collect();
                (run[window - 1].0, variance(&values))
            })
            .collect()
    }

    pub fn last_training_loss(&self) -> Option<f64> {
        self.training_loss.last().map(|&(_, v)| v)
    }

    pub fn last_validation_loss(&self) -> Option<f64> {
        self.validation_loss.last().map(|&(_, v)| v)
    }

    pub fn last_validation_accuracy(&self) -> Option<f64> {
        self.validation_accuracy.last().map(|&(_, v)| v)
    }

    /// Lowest validation loss recorded so far, ignoring NaN.
    pub fn best_validation_loss(&self) -> Option<f64> {
        self.validation_loss
            .iter()
            .map(|&(_, v)| v)
            .filter(|v| !v.is_nan())
            .fold(None, |best, v| Some(best.map_or(v, |b: f64| b.min(v))))
    }

    /// Writes the whole log as pretty-printed JSON.
    pub fn save_json(&self, path: &Path) -> std::io::Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
    }
}

fn tail(series: &[(usize, f64)], window: usize) -> &[(usize, f64)] {
    &series[series.len().saturating_sub(window)..]
}

/// Arithmetic mean; zero for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population variance; zero for an empty slice.
pub fn variance(values: &[f64]) -> f64 {
    let m = mean(values);
    mean(&values.iter().map(|v| (v - m) * (v - m)).collect::<Vec<_>>())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_with_norms(norms: &[f64]) -> MetricsLog {
        let mut log = MetricsLog::new();
        for (i, &n) in norms.iter().enumerate() {
            log.record_iteration(i, 1.0, n);
        }
        log
    }

    #[test]
    fn iteration_series_stay_aligned() {
        let log = log_with_norms(&[0.5, 0.25]);
        assert_eq!(log.training_loss(), &[(0, 1.0), (1, 1.0)]);
        assert_eq!(log.gradient_norm(), &[(0, 0.5), (1, 0.25)]);
    }

    #[test]
    fn recent_window_takes_the_tail() {
        let log = log_with_norms(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(log.recent_gradient_norm(2), &[(2, 3.0), (3, 4.0)]);
        assert_eq!(log.recent_gradient_norm(10).len(), 4);
    }

    #[test]
    fn rolling_variance_is_keyed_by_window_end() {
        let log = log_with_norms(&[1.0, 3.0, 1.0, 3.0]);
        let var = log.rolling_gradient_variance(2);
        assert_eq!(var, vec![(1, 1.0), (2, 1.0), (3, 1.0)]);
    }

    #[test]
    fn rolling_variance_needs_a_full_window() {
        let log = log_with_norms(&[1.0, 2.0]);
        assert!(log.rolling_gradient_variance(3).is_empty());
        assert!(log.rolling_gradient_variance(0).is_empty());
    }

    #[test]
    fn best_validation_loss_skips_nan() {
        let mut log = MetricsLog::new();
        assert_eq!(log.best_validation_loss(), None);
        log.record_epoch(10, 0.8, 0.5);
        log.record_epoch(20, f64::NAN, 0.0);
        log.record_epoch(30, 0.6, 0.7);
        assert_eq!(log.best_validation_loss(), Some(0.6));
        assert_eq!(log.last_validation_accuracy(), Some(0.7));
    }

    #[test]
    fn variance_of_constant_is_zero() {
        assert_eq!(variance(&[2.0, 2.0, 2.0]), 0.0);
        assert_eq!(variance(&[]), 0.0);
    }
}
