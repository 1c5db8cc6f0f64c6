//! # Research Harvest
//!
//! Collects bibliographic records from PubMed, OpenAlex and Scopus, maps them
//! onto one common schema, drops duplicates and writes the result as CSV.
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`models`]: Core data structures (Record, SubQuery, QueryTemplate)
//! - [`sources`]: One adapter per database and pagination protocol
//! - [`normalize`]: Field fallback and abstract reconstruction helpers
//! - [`pipeline`]: Runs an adapter over every sub-query and deduplicates
//! - [`output`]: CSV export
//! - [`utils`]: HTTP client, rate gates, deduplication and XML parsing
//! - [`config`]: Configuration management
//!
//! ## Example
//!
//! ```rust,no_run
//! use research_harvest::models::SubQuery;
//! use research_harvest::pipeline::Pipeline;
//! use research_harvest::sources::OpenAlexSource;
//! use research_harvest::utils::HttpClient;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let source = OpenAlexSource::new(HttpClient::new()?);
//! let sub_queries = SubQuery::year_range("machine learning", 2020, 2022);
//! let report = Pipeline::new(1500).run(&source, &sub_queries).await?;
//! println!("{} unique records", report.records().len());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod models;
pub mod normalize;
pub mod output;
pub mod pipeline;
pub mod sources;
pub mod utils;

// Re-export commonly used types
pub use models::{Record, SourceType, SubQuery};
pub use pipeline::{ParseFailurePolicy, Pipeline, RunReport};
pub use sources::{SourceAdapter, SourceError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
