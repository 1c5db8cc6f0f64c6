//! Core data models for harvested records and sub-queries.

mod query;
mod record;

pub use query::{QueryTemplate, SubQuery};
pub(crate) use record::non_blank;
pub use record::{Citations, Record, RecordBuilder, SourceType, NOT_AVAILABLE};
