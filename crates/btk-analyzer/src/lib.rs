pub mod fifo;
pub mod metrics;

pub use fifo::build_round_trips;
pub use metrics::{compute_metrics, PerformanceMetrics};
