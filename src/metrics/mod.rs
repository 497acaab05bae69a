//! Prometheus metrics for the workload reconciler
//!
//! Counts store operations by outcome and tracks how often updates lose
//! their optimistic-concurrency race.

mod prometheus;

pub use self::prometheus::*;
