//! Scopus research source implementation using the Elsevier Search API.
//!
//! Results are paged by `start` offset, most-cited first, in pages of
//! [`SCOPUS_PAGE_SIZE`] until an empty page or the configured cap.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use crate::models::{
    non_blank, Citations, QueryTemplate, Record, RecordBuilder, SourceType, SubQuery,
};
use crate::normalize::{lenient, parse_count};
use crate::sources::{Page, SourceAdapter, SourceError};
use crate::utils::{send_text, FixedDelay, HttpClient, RateGate, SCOPUS_DELAY};

const SCOPUS_SEARCH_URL: &str = "https://api.elsevier.com/content/search/scopus";

/// Entries requested per page
pub const SCOPUS_PAGE_SIZE: usize = 25;

/// Pagination state for offset paging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetState {
    pub offset: usize,
    pub page_size: usize,
}

/// Scopus research source
///
/// Requires an Elsevier API key, sent as the `X-ELS-APIKey` header.
#[derive(Clone)]
pub struct ScopusSource {
    client: HttpClient,
    api_key: String,
    search_url: String,
    page_size: usize,
    template: QueryTemplate,
    gate: Arc<dyn RateGate>,
}

impl std::fmt::Debug for ScopusSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopusSource")
            .field("search_url", &self.search_url)
            .field("page_size", &self.page_size)
            .field("template", &self.template)
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}

impl ScopusSource {
    /// Create a new Scopus source; the API key must not be blank
    pub fn new(client: HttpClient, api_key: impl Into<String>) -> Result<Self, SourceError> {
        let api_key = non_blank(Some(api_key.into()))
            .ok_or_else(|| SourceError::Config("Scopus requires an API key".to_string()))?;

        Ok(Self {
            client,
            api_key,
            search_url: SCOPUS_SEARCH_URL.to_string(),
            page_size: SCOPUS_PAGE_SIZE,
            template: QueryTemplate::default(),
            gate: Arc::new(FixedDelay::new(SCOPUS_DELAY)),
        })
    }

    /// Override the search endpoint (full URL)
    pub fn with_search_url(mut self, url: impl Into<String>) -> Self {
        self.search_url = url.into();
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_template(mut self, template: QueryTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn with_gate(mut self, gate: Arc<dyn RateGate>) -> Self {
        self.gate = gate;
        self
    }

    /// Render a sub-query in Scopus advanced-search syntax
    pub fn render_query(&self, query: &SubQuery) -> String {
        let mut clauses = vec![format!("TITLE-ABS-KEY({})", query.term)];

        for group in self.template.active_groups() {
            clauses.push(format!("TITLE-ABS-KEY({})", group.join(" OR ")));
        }

        match (query.year, self.template.min_year) {
            (Some(year), _) => clauses.push(format!("PUBYEAR = {}", year)),
            (None, Some(min)) => clauses.push(format!("PUBYEAR > {}", min - 1)),
            (None, None) => {}
        }

        clauses.join(" AND ")
    }

    /// Decode a search page into its raw entries.
    ///
    /// An empty result set comes back as a single entry carrying an `error`
    /// field; such placeholders are discarded.
    fn parse_page(body: &str) -> Result<Vec<Value>, SourceError> {
        let page: SearchPage = serde_json::from_str(body)?;
        Ok(page
            .search_results
            .map(|r| r.entry)
            .unwrap_or_default()
            .into_iter()
            .filter(|e| e.get("error").is_none())
            .collect())
    }
}

#[async_trait]
impl SourceAdapter for ScopusSource {
    type State = OffsetState;
    type Entry = Value;

    fn source_type(&self) -> SourceType {
        SourceType::Scopus
    }

    fn initial_state(&self) -> OffsetState {
        OffsetState {
            offset: 0,
            page_size: self.page_size,
        }
    }

    async fn fetch_page(
        &self,
        query: &SubQuery,
        state: OffsetState,
        cap: usize,
    ) -> Result<Page<Value, OffsetState>, SourceError> {
        if state.offset >= cap {
            return Ok(Page::last(Vec::new()));
        }

        let search = self.render_query(query);
        let count = state.page_size.to_string();
        let start = state.offset.to_string();
        tracing::info!(
            "Fetching Scopus records {} to {}",
            state.offset + 1,
            state.offset + state.page_size
        );
        tracing::debug!("Scopus query: {}", search);

        self.gate.wait().await;
        let body = send_text(
            self.client
                .get(&self.search_url)
                .header("X-ELS-APIKey", self.api_key.as_str())
                .header(reqwest::header::ACCEPT, "application/json")
                .query(&[
                    ("query", search.as_str()),
                    ("count", count.as_str()),
                    ("start", start.as_str()),
                    ("sort", "-citedby-count"),
                    ("view", "STANDARD"),
                ]),
        )
        .await?;

        let entries = Self::parse_page(&body)?;
        if entries.is_empty() {
            return Ok(Page::last(Vec::new()));
        }

        let next = OffsetState {
            offset: state.offset + state.page_size,
            ..state
        };
        if next.offset < cap {
            Ok(Page::more(entries, next))
        } else {
            Ok(Page::last(entries))
        }
    }

    fn normalize(&self, entry: Value, query: &SubQuery) -> Option<Record> {
        let entry: Entry = match serde_json::from_value(entry) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Skipping Scopus entry with unexpected shape: {}", e);
                return None;
            }
        };
        let eid = non_blank(entry.eid.as_deref())?;

        let year = entry
            .cover_date
            .as_deref()
            .map(|d| d.trim().chars().take(4).collect::<String>());
        let citations = entry
            .cited_by_count
            .as_ref()
            .and_then(parse_count)
            .unwrap_or(0);

        Some(
            RecordBuilder::new(eid, SourceType::Scopus)
                .title(entry.title.as_deref())
                .authors(entry.creator.as_deref())
                .year(year)
                .source_name(entry.publication_name.as_deref())
                .doi(entry.doi.as_deref())
                .citations(Citations::Count(citations))
                .abstract_text(entry.description.as_deref())
                .origin_tag(query.label())
                .build(),
        )
    }
}

// ===== Scopus API Types =====

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(rename = "search-results", default)]
    search_results: Option<SearchResults>,
}

#[derive(Debug, Deserialize)]
struct SearchResults {
    #[serde(default)]
    entry: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct Entry {
    #[serde(default, deserialize_with = "lenient")]
    eid: Option<String>,
    #[serde(rename = "dc:title", default, deserialize_with = "lenient")]
    title: Option<String>,
    #[serde(rename = "dc:creator", default, deserialize_with = "lenient")]
    creator: Option<String>,
    #[serde(rename = "prism:coverDate", default, deserialize_with = "lenient")]
    cover_date: Option<String>,
    #[serde(rename = "prism:publicationName", default, deserialize_with = "lenient")]
    publication_name: Option<String>,
    #[serde(rename = "prism:doi", default, deserialize_with = "lenient")]
    doi: Option<String>,
    #[serde(rename = "citedby-count", default)]
    cited_by_count: Option<Value>,
    #[serde(rename = "dc:description", default, deserialize_with = "lenient")]
    description: Option<String>,
}
