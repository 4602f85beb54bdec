pub mod display;
pub mod http_monitor;

pub use display::{DisplayWindows, LogDisplay, MetricsDisplay, MetricsSummary, NoDisplay};
pub use http_monitor::HttpMonitor;
