//! Utility modules supporting the harvest pipeline.
//!
//! - [`Deduplicator`]: first-seen identifier filter scoped to one run
//! - [`HttpClient`] / [`send_text`]: shared client and status-checked requests
//! - [`RateGate`]: fixed-spacing throttle in front of every request
//!   ([`FixedDelay`] by default, [`NoDelay`] for tests)
//! - [`xml`]: owned element tree for E-utilities responses
//!
//! # Rate gates
//!
//! ```rust,no_run
//! use research_harvest::utils::{FixedDelay, RateGate};
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let gate = FixedDelay::new(Duration::from_millis(500));
//! gate.wait().await; // passes immediately
//! gate.wait().await; // ~500ms later
//! # }
//! ```

mod dedup;
mod http;
mod rate_gate;
pub mod xml;

pub use dedup::{dedup_ids, Deduplicator};
pub use http::{send_text, HttpClient, DEFAULT_TIMEOUT};
pub use rate_gate::{FixedDelay, NoDelay, RateGate, OPENALEX_DELAY, PUBMED_DELAY, SCOPUS_DELAY};
