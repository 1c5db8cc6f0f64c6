//! OpenAlex research source implementation.
//!
//! Works are paged with OpenAlex cursor pagination: the first request sends
//! `cursor=*` and every response names the cursor for the following page in
//! `meta.next_cursor`.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use crate::models::{non_blank, Citations, Record, RecordBuilder, SourceType, SubQuery};
use crate::normalize::{
    first_present, lenient, parse_count, reconstruct_abstract, Accessor, Lenient,
};
use crate::sources::{Page, SourceAdapter, SourceError};
use crate::utils::{send_text, FixedDelay, HttpClient, RateGate, OPENALEX_DELAY};

const OPENALEX_API_BASE: &str = "https://api.openalex.org";

/// Cursor sent with the first request of a sub-query
pub const START_CURSOR: &str = "*";

/// Results requested per page
pub const OPENALEX_PAGE_SIZE: usize = 50;

/// Pagination state for cursor paging
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorState {
    pub cursor: String,

    /// Works received so far for this sub-query
    pub fetched: usize,
}

impl Default for CursorState {
    fn default() -> Self {
        Self {
            cursor: START_CURSOR.to_string(),
            fetched: 0,
        }
    }
}

/// OpenAlex research source
///
/// Uses the OpenAlex REST API.
#[derive(Debug, Clone)]
pub struct OpenAlexSource {
    client: HttpClient,
    base_url: String,
    page_size: usize,
    email: Option<String>,
    gate: Arc<dyn RateGate>,
}

impl OpenAlexSource {
    /// Create a new OpenAlex source
    pub fn new(client: HttpClient) -> Self {
        Self {
            client,
            base_url: OPENALEX_API_BASE.to_string(),
            page_size: OPENALEX_PAGE_SIZE,
            email: std::env::var("OPENALEX_EMAIL").ok(),
            gate: Arc::new(FixedDelay::new(OPENALEX_DELAY)),
        }
    }

    /// Send a contact address with every request (polite pool)
    pub fn with_email(mut self, email: Option<String>) -> Self {
        self.email = non_blank(email);
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.clamp(1, 200);
        self
    }

    pub fn with_gate(mut self, gate: Arc<dyn RateGate>) -> Self {
        self.gate = gate;
        self
    }

    /// The `filter` expression for a sub-query
    pub fn build_filter(query: &SubQuery) -> String {
        let mut filter = format!("title.search:{}", query.term);
        if let Some(year) = query.year {
            filter.push_str(&format!(
                ",from_publication_date:{year}-01-01,to_publication_date:{year}-12-31"
            ));
        }
        filter
    }

    /// Decode a works page into its raw results and next cursor
    fn parse_page(body: &str) -> Result<(Vec<Value>, Option<String>), SourceError> {
        let page: WorksPage = serde_json::from_str(body)?;
        let next_cursor = page.meta.and_then(|m| non_blank(m.next_cursor));
        Ok((page.results, next_cursor))
    }

    fn author_names(work: &Work) -> Vec<&str> {
        work.authorships
            .iter()
            .flatten()
            .filter_map(|a| a.0.as_ref()?.author.as_ref())
            .filter_map(|a| a.display_name.as_deref())
            .collect()
    }
}

/// Venue lookups in precedence order
const VENUE_ACCESSORS: &[Accessor<Work>] = &[
    host_venue_name,
    primary_location_name,
    first_location_name,
];

fn host_venue_name(work: &Work) -> Option<&str> {
    work.host_venue.as_ref()?.display_name.as_deref()
}

fn primary_location_name(work: &Work) -> Option<&str> {
    work.primary_location.as_ref()?.source.as_ref()?.display_name.as_deref()
}

fn first_location_name(work: &Work) -> Option<&str> {
    work.locations
        .as_ref()?
        .first()?
        .0
        .as_ref()?
        .source
        .as_ref()?
        .display_name
        .as_deref()
}

#[async_trait]
impl SourceAdapter for OpenAlexSource {
    type State = CursorState;
    type Entry = Value;

    fn source_type(&self) -> SourceType {
        SourceType::OpenAlex
    }

    fn initial_state(&self) -> CursorState {
        CursorState::default()
    }

    async fn fetch_page(
        &self,
        query: &SubQuery,
        state: CursorState,
        cap: usize,
    ) -> Result<Page<Value, CursorState>, SourceError> {
        if state.fetched >= cap {
            return Ok(Page::last(Vec::new()));
        }

        tracing::info!(
            "Fetching OpenAlex records {} to {} for {}",
            state.fetched + 1,
            state.fetched + self.page_size,
            query
        );

        let filter = Self::build_filter(query);
        let per_page = self.page_size.to_string();
        let mut params = vec![
            ("filter", filter.as_str()),
            ("per-page", per_page.as_str()),
            ("cursor", state.cursor.as_str()),
        ];
        if let Some(email) = &self.email {
            params.push(("mailto", email.as_str()));
        }

        self.gate.wait().await;
        let body = send_text(
            self.client
                .get(&format!("{}/works", self.base_url))
                .query(&params),
        )
        .await?;

        let (results, next_cursor) = Self::parse_page(&body)?;
        if results.is_empty() {
            return Ok(Page::last(Vec::new()));
        }

        let fetched = state.fetched + results.len();
        match next_cursor {
            Some(cursor) if fetched < cap => {
                Ok(Page::more(results, CursorState { cursor, fetched }))
            }
            _ => Ok(Page::last(results)),
        }
    }

    fn normalize(&self, entry: Value, query: &SubQuery) -> Option<Record> {
        let work: Work = match serde_json::from_value(entry) {
            Ok(work) => work,
            Err(e) => {
                tracing::warn!("Skipping OpenAlex work with unexpected shape: {}", e);
                return None;
            }
        };
        let id = non_blank(work.id.as_deref())?;

        let citations = work
            .cited_by_count
            .as_ref()
            .and_then(parse_count)
            .unwrap_or(0);
        let year = work.publication_year.as_ref().and_then(|y| match y {
            Value::Number(n) => Some(n.to_string()),
            Value::String(s) => Some(s.clone()),
            _ => None,
        });
        let landing_page = work
            .primary_location
            .as_ref()
            .and_then(|l| l.landing_page_url.as_deref());

        Some(
            RecordBuilder::new(id, SourceType::OpenAlex)
                .title(work.title.as_deref())
                .authors(Self::author_names(&work))
                .year(year)
                .source_name(first_present(&work, VENUE_ACCESSORS))
                .doi(work.doi.as_deref())
                .citations(Citations::Count(citations))
                .abstract_text(reconstruct_abstract(work.abstract_inverted_index.as_ref()))
                .url(landing_page)
                .origin_tag(query.label())
                .build(),
        )
    }
}

// ===== OpenAlex API Types =====

#[derive(Debug, Deserialize)]
struct WorksPage {
    #[serde(default)]
    results: Vec<Value>,
    #[serde(default)]
    meta: Option<Meta>,
}

#[derive(Debug, Deserialize)]
struct Meta {
    #[serde(default)]
    next_cursor: Option<String>,
}

/// Every field optional and type-tolerant: works come back with arbitrary
/// gaps, nulls and the occasional mistyped scalar
#[derive(Debug, Default, Deserialize)]
struct Work {
    #[serde(default, deserialize_with = "lenient")]
    id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    title: Option<String>,
    #[serde(default)]
    publication_year: Option<Value>,
    #[serde(default, deserialize_with = "lenient")]
    doi: Option<String>,
    #[serde(default)]
    cited_by_count: Option<Value>,
    #[serde(default, deserialize_with = "lenient")]
    authorships: Option<Vec<Lenient<Authorship>>>,
    #[serde(default, deserialize_with = "lenient")]
    host_venue: Option<NamedSource>,
    #[serde(default, deserialize_with = "lenient")]
    primary_location: Option<Location>,
    #[serde(default, deserialize_with = "lenient")]
    locations: Option<Vec<Lenient<Location>>>,
    #[serde(default)]
    abstract_inverted_index: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct Authorship {
    #[serde(default, deserialize_with = "lenient")]
    author: Option<NamedSource>,
}

#[derive(Debug, Default, Deserialize)]
struct NamedSource {
    #[serde(default, deserialize_with = "lenient")]
    display_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Location {
    #[serde(default, deserialize_with = "lenient")]
    source: Option<NamedSource>,
    #[serde(default, deserialize_with = "lenient")]
    landing_page_url: Option<String>,
}
