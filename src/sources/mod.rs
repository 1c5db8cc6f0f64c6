//! Source adapters: one per bibliographic database and pagination protocol.
//!
//! Every database speaks its own query language and pages its results in its
//! own way. The [`SourceAdapter`] trait hides that behind a single step
//! function, [`SourceAdapter::fetch_page`], which takes the current pagination
//! state and returns the raw entries of one page together with the next state
//! (or `None` once the source is exhausted).
//!
//! | Adapter | Protocol | State |
//! |---------|----------|-------|
//! | [`PubMedSource`] | search ids, then fetch in batches of 50 | [`BatchState`] |
//! | [`OpenAlexSource`] | opaque `next_cursor` tokens | [`CursorState`] |
//! | [`ScopusSource`] | numeric `start` offset | [`OffsetState`] |
//!
//! # Feature Flags
//!
//! - `pubmed` - Enable PubMed source (default: enabled)
//! - `openalex` - Enable OpenAlex source (default: enabled)
//! - `scopus` - Enable Scopus source (default: enabled)

#[cfg(feature = "source-openalex")]
mod openalex;
#[cfg(feature = "source-pubmed")]
mod pubmed;
#[cfg(feature = "source-scopus")]
mod scopus;

pub mod mock;

pub use mock::{MockEntry, MockPage, MockSource};

#[cfg(feature = "source-openalex")]
pub use openalex::{CursorState, OpenAlexSource, START_CURSOR};
#[cfg(feature = "source-pubmed")]
pub use pubmed::{BatchState, PubMedSource, PUBMED_BATCH_SIZE};
#[cfg(feature = "source-scopus")]
pub use scopus::{OffsetState, ScopusSource, SCOPUS_PAGE_SIZE};

use async_trait::async_trait;

use crate::models::{Record, SourceType, SubQuery};

/// One page of raw entries plus the state needed to fetch the next one
#[derive(Debug)]
pub struct Page<E, S> {
    pub entries: Vec<E>,

    /// `None` once the source has nothing more for this sub-query
    pub next: Option<S>,
}

impl<E, S> Page<E, S> {
    /// A page after which pagination continues from `next`
    pub fn more(entries: Vec<E>, next: S) -> Self {
        Self {
            entries,
            next: Some(next),
        }
    }

    /// The final page of a sub-query
    pub fn last(entries: Vec<E>) -> Self {
        Self {
            entries,
            next: None,
        }
    }

    pub fn is_last(&self) -> bool {
        self.next.is_none()
    }
}

/// A database's query construction, pagination protocol and record mapping.
///
/// Adapters hold no per-query state of their own; everything needed to
/// continue is carried in [`SourceAdapter::State`]. Every implementation must
/// move its state monotonically toward a terminal page so a pagination loop
/// always ends.
#[async_trait]
pub trait SourceAdapter: Send + Sync + std::fmt::Debug {
    /// Pagination token carried between calls
    type State: Send + std::fmt::Debug;

    /// Raw per-record payload, only meaningful to [`SourceAdapter::normalize`]
    type Entry: Send;

    /// The database this adapter talks to
    fn source_type(&self) -> SourceType;

    /// Short identifier of this source (e.g. "pubmed")
    fn id(&self) -> &str {
        self.source_type().id()
    }

    /// Human-readable name of this source
    fn name(&self) -> &str {
        self.source_type().name()
    }

    /// State for the first request of a sub-query
    fn initial_state(&self) -> Self::State;

    /// Fetch one page.
    ///
    /// `cap` is the maximum number of records wanted for this sub-query;
    /// the returned `next` state is `None` once it is reached.
    async fn fetch_page(
        &self,
        query: &SubQuery,
        state: Self::State,
        cap: usize,
    ) -> Result<Page<Self::Entry, Self::State>, SourceError>;

    /// Map a raw entry into the common schema.
    ///
    /// Returns `None` for entries without an identifier.
    fn normalize(&self, entry: Self::Entry, query: &SubQuery) -> Option<Record>;
}

/// Errors that can occur when interacting with a source
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Network or transport failure
    #[error("Network error: {0}")]
    Network(String),

    /// Non-success HTTP status
    #[error("HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    /// Response body could not be decoded (XML, JSON)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Adapter cannot be built from the supplied settings
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SourceError {
    /// Whether this error came from an undecodable response body
    pub fn is_parse(&self) -> bool {
        matches!(self, SourceError::Parse(_))
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        SourceError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Parse(format!("JSON: {}", err))
    }
}
