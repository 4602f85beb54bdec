use serde::Serialize;
use tracing::info;

use crate::train::metrics::{mean, MetricsLog};

/// Window sizes handed to a display on every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DisplayWindows {
    /// Iterations per rolling gradient-variance window.
    pub variance_window: usize,
    /// Iterations shown in the "recent" views.
    pub recent_window: usize,
}

impl Default for DisplayWindows {
    fn default() -> Self {
        DisplayWindows { variance_window: 25, recent_window: 50 }
    }
}

/// Receives the run's metrics once per epoch. Read-only with respect to the
/// run: a display can keep its own state but never changes the controller's.
pub trait MetricsDisplay {
    fn display(&mut self, metrics: &MetricsLog, windows: DisplayWindows);
}

/// Displays nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDisplay;

impl MetricsDisplay for NoDisplay {
    fn display(&mut self, _metrics: &MetricsLog, _windows: DisplayWindows) {}
}

/// Sends to both displays, in order.
impl<A: MetricsDisplay, B: MetricsDisplay> MetricsDisplay for (A, B) {
    fn display(&mut self, metrics: &MetricsLog, windows: DisplayWindows) {
        self.0.display(metrics, windows);
        self.1.display(metrics, windows);
    }
}

/// Condensed view of a `MetricsLog` for logs and the HTTP monitor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSummary {
    pub iterations: usize,
    pub epochs: usize,
    pub last_training_loss: Option<f64>,
    pub recent_training_loss_mean: Option<f64>,
    pub recent_gradient_norm_mean: Option<f64>,
    pub gradient_variance: Option<f64>,
    pub last_validation_loss: Option<f64>,
    pub best_validation_loss: Option<f64>,
    pub last_validation_accuracy: Option<f64>,
    pub windows: DisplayWindows,
}

impl MetricsSummary {
    pub fn from_log(metrics: &MetricsLog, windows: DisplayWindows) -> MetricsSummary {
        let recent_mean = |series: &[(usize, f64)]| {
            if series.is_empty() {
                None
            } else {
                Some(mean(&series.iter().map(|&(_, v)| v).collect::<Vec<_>>()))
            }
        };
        MetricsSummary {
            iterations: metrics.training_loss().len(),
            epochs: metrics.validation_loss().len(),
            last_training_loss: metrics.last_training_loss(),
            recent_training_loss_mean: recent_mean(metrics.recent_training_loss(windows.recent_window)),
            recent_gradient_norm_mean: recent_mean(metrics.recent_gradient_norm(windows.recent_window)),
            gradient_variance: metrics
                .rolling_gradient_variance(windows.variance_window)
                .last()
                .map(|&(_, v)| v),
            last_validation_loss: metrics.last_validation_loss(),
            best_validation_loss: metrics.best_validation_loss(),
            last_validation_accuracy: metrics.last_validation_accuracy(),
            windows,
        }
    }
}

/// Writes a one-line summary through `tracing` on every epoch.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDisplay;

impl MetricsDisplay for LogDisplay {
    fn display(&mut self, metrics: &MetricsLog, windows: DisplayWindows) {
        let s = MetricsSummary::from_log(metrics, windows);
        info!(
            iterations = s.iterations,
            recent_loss = ?s.recent_training_loss_mean,
            recent_grad_norm = ?s.recent_gradient_norm_mean,
            grad_variance = ?s.gradient_variance,
            val_loss = ?s.last_validation_loss,
            best_val_loss = ?s.best_validation_loss,
            val_accuracy = ?s.last_validation_accuracy,
            "metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_of_empty_log() {
        let s = MetricsSummary::from_log(&MetricsLog::new(), DisplayWindows::default());
        assert_eq!(s.iterations, 0);
        assert_eq!(s.recent_training_loss_mean, None);
        assert_eq!(s.gradient_variance, None);
    }

    #[test]
    fn summary_uses_recent_window() {
        let mut log = MetricsLog::new();
        for i in 0..10 {
            log.record_iteration(i, i as f64, 1.0);
        }
        log.record_epoch(10, 0.4, 0.9);
        let windows = DisplayWindows { variance_window: 3, recent_window: 2 };
        let s = MetricsSummary::from_log(&log, windows);
        assert_eq!(s.recent_training_loss_mean, Some(8.5));
        assert_eq!(s.gradient_variance, Some(0.0));
        assert_eq!(s.epochs, 1);
        assert_eq!(s.best_validation_loss, Some(0.4));
    }

    struct Counter(usize);

    impl MetricsDisplay for Counter {
        fn display(&mut self, _metrics: &MetricsLog, _windows: DisplayWindows) {
            self.0 += 1;
        }
    }

    #[test]
    fn pair_forwards_to_both() {
        let mut pair = (Counter(0), Counter(5));
        pair.display(&MetricsLog::new(), DisplayWindows::default());
        assert_eq!((pair.0).0, 1);
        assert_eq!((pair.1).0, 6);
    }
}
