//! Metrics module for Prometheus-based monitoring.
//!
//! Covers LLM and embedding traffic, strategist interventions, and the
//! transcript delivery side (messages pushed/revealed, viewers, rooms).
//!
//! ```ignore
//! use debate_forge::metrics::{init_metrics, export_metrics, MetricsCollector};
//!
//! init_metrics().expect("Failed to initialize metrics");
//! MetricsCollector::new().record_message_pushed("message");
//! let metrics_text = export_metrics();
//! ```

pub mod collectors;
pub mod prometheus;

pub use collectors::{DebateOutcome, MetricsCollector};
pub use prometheus::{export_metrics, init_metrics, metrics_handler};
