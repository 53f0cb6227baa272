//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! session / listener / adapter / http
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Connection id and listener handle flow through every event
//! - Credentials never reach a log line

pub mod logging;
pub mod metrics;
