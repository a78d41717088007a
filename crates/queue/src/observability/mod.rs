pub mod analytics;
pub mod metrics;

pub use analytics::{ObservabilityLayer, PerformanceAnalytics};
pub use metrics::{LiveMetrics, MetricsCollector, PerformanceMetrics};
