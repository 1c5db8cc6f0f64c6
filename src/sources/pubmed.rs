//! PubMed research source implementation using E-utilities API.
//!
//! Two-phase protocol: `esearch` returns the PMIDs matching a sub-query
//! (bounded by `retmax`), then `efetch` retrieves the full articles in
//! batches of [`PUBMED_BATCH_SIZE`].

use async_trait::async_trait;
use std::sync::Arc;

use crate::models::{
    non_blank, Citations, QueryTemplate, Record, RecordBuilder, SourceType, SubQuery,
};
use crate::sources::{Page, SourceAdapter, SourceError};
use crate::utils::xml::{parse_document, XmlElement};
use crate::utils::{dedup_ids, send_text, FixedDelay, HttpClient, RateGate, PUBMED_DELAY};

/// PubMed E-utilities API base URL
const PUBMED_EUTILS_BASE: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

/// Number of PMIDs requested per `efetch` call
pub const PUBMED_BATCH_SIZE: usize = 50;

/// Pagination state for the search-then-fetch protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchState {
    /// PMIDs not retrieved yet
    Search,
    /// PMIDs known; `next` is the index of the first unfetched one
    Chunks { ids: Vec<String>, next: usize },
}

/// PubMed research source
///
/// Uses NCBI E-utilities API for searching and fetching PubMed records.
#[derive(Debug, Clone)]
pub struct PubMedSource {
    client: HttpClient,
    base_url: String,
    template: QueryTemplate,
    batch_size: usize,
    gate: Arc<dyn RateGate>,
}

impl PubMedSource {
    /// Create a new PubMed source
    pub fn new(client: HttpClient) -> Self {
        Self {
            client,
            base_url: PUBMED_EUTILS_BASE.to_string(),
            template: QueryTemplate::default(),
            batch_size: PUBMED_BATCH_SIZE,
            gate: Arc::new(FixedDelay::new(PUBMED_DELAY)),
        }
    }

    /// Point the adapter at another E-utilities host (mirrors, test servers)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Keyword groups combined with every sub-query term
    pub fn with_template(mut self, template: QueryTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_gate(mut self, gate: Arc<dyn RateGate>) -> Self {
        self.gate = gate;
        self
    }

    /// Render a sub-query in PubMed's field-qualified boolean syntax
    pub fn render_query(&self, query: &SubQuery) -> String {
        let mut clauses = vec![format!("(\"{}\")", query.term)];

        for group in self.template.active_groups() {
            let alternatives = group
                .iter()
                .map(|t| format!("\"{}\"", t))
                .collect::<Vec<_>>()
                .join(" OR ");
            clauses.push(format!("({})", alternatives));
        }

        let date_range = match (query.year, self.template.min_year) {
            (Some(year), _) => Some((year.to_string(), year.to_string())),
            (None, Some(min)) => Some((min.to_string(), "3000".to_string())),
            (None, None) => None,
        };
        if let Some((from, to)) = date_range {
            clauses.push(format!(
                "(\"{}\"[Date - Publication] : \"{}\"[Date - Publication])",
                from, to
            ));
        }

        clauses.join(" AND ")
    }

    /// Phase 1: the PMIDs matching `query`, at most `retmax` of them
    async fn search_ids(
        &self,
        query: &SubQuery,
        retmax: usize,
    ) -> Result<Vec<String>, SourceError> {
        let term = self.render_query(query);
        let retmax = retmax.to_string();
        tracing::debug!("PubMed esearch: {}", term);

        self.gate.wait().await;
        let xml = send_text(
            self.client
                .get(&format!("{}/esearch.fcgi", self.base_url))
                .query(&[
                    ("db", "pubmed"),
                    ("term", term.as_str()),
                    ("retmax", retmax.as_str()),
                    ("retmode", "xml"),
                ]),
        )
        .await?;

        Self::parse_search_response(&xml)
    }

    /// Parse E-utilities search response XML
    fn parse_search_response(xml: &str) -> Result<Vec<String>, SourceError> {
        let root = parse_document(xml)?;
        let ids = root
            .descendants_named("Id")
            .filter_map(|id| non_blank(Some(id.text())))
            .collect();
        Ok(dedup_ids(ids))
    }

    /// Phase 2: full article records for one batch of PMIDs
    async fn fetch_batch(&self, ids: &[String]) -> Result<Vec<XmlElement>, SourceError> {
        let id_list = ids.join(",");

        self.gate.wait().await;
        let xml = send_text(
            self.client
                .get(&format!("{}/efetch.fcgi", self.base_url))
                .query(&[("db", "pubmed"), ("id", id_list.as_str()), ("retmode", "xml")]),
        )
        .await?;

        Self::parse_fetch_response(&xml)
    }

    /// Parse E-utilities fetch response XML into one element per article
    fn parse_fetch_response(xml: &str) -> Result<Vec<XmlElement>, SourceError> {
        Ok(parse_document(xml)?.into_children_named("PubmedArticle"))
    }

    /// "Forename Lastname" for every author that has both parts
    fn author_names(article: &XmlElement) -> Vec<String> {
        article
            .descendants_named("Author")
            .filter_map(|author| {
                let last = non_blank(author.child("LastName").map(|e| e.text()))?;
                let fore = non_blank(author.child("ForeName").map(|e| e.text()))?;
                Some(format!("{} {}", fore, last))
            })
            .collect()
    }

    /// DOI from the article's electronic location, else from the id list
    fn doi(article: &XmlElement) -> Option<String> {
        let elocation = article
            .descendants_named("ELocationID")
            .find(|e| e.attr("EIdType") == Some("doi"));
        let article_id = || {
            article
                .descendants_named("ArticleId")
                .find(|e| e.attr("IdType") == Some("doi"))
        };

        elocation
            .and_then(|e| non_blank(Some(e.text())))
            .or_else(|| article_id().and_then(|e| non_blank(Some(e.text()))))
    }

    fn abstract_text(article: &XmlElement) -> Option<String> {
        let parts: Vec<String> = article
            .descendants_named("AbstractText")
            .map(|e| e.text())
            .filter(|t| !t.is_empty())
            .collect();
        (!parts.is_empty()).then(|| parts.join(" "))
    }

    fn publication_year(article: &XmlElement) -> Option<String> {
        article
            .descendants_named("PubDate")
            .find_map(|date| date.child("Year"))
            .map(|year| year.text())
    }
}

#[async_trait]
impl SourceAdapter for PubMedSource {
    type State = BatchState;
    type Entry = XmlElement;

    fn source_type(&self) -> SourceType {
        SourceType::PubMed
    }

    fn initial_state(&self) -> BatchState {
        BatchState::Search
    }

    async fn fetch_page(
        &self,
        query: &SubQuery,
        state: BatchState,
        cap: usize,
    ) -> Result<Page<XmlElement, BatchState>, SourceError> {
        match state {
            BatchState::Search => {
                let mut ids = self.search_ids(query, cap).await?;
                ids.truncate(cap);
                tracing::info!("Retrieved {} PMIDs for '{}'", ids.len(), query);

                if ids.is_empty() {
                    Ok(Page::last(Vec::new()))
                } else {
                    Ok(Page::more(Vec::new(), BatchState::Chunks { ids, next: 0 }))
                }
            }
            BatchState::Chunks { ids, next } => {
                let end = (next + self.batch_size).min(ids.len());
                let Some(batch) = ids.get(next..end).filter(|b| !b.is_empty()) else {
                    return Ok(Page::last(Vec::new()));
                };
                tracing::info!(
                    "Fetching PubMed records {} to {} of {}",
                    next + 1,
                    end,
                    ids.len()
                );
                let articles = self.fetch_batch(batch).await?;

                if end < ids.len() {
                    Ok(Page::more(articles, BatchState::Chunks { ids, next: end }))
                } else {
                    Ok(Page::last(articles))
                }
            }
        }
    }

    fn normalize(&self, article: XmlElement, query: &SubQuery) -> Option<Record> {
        let pmid = non_blank(article.descendant("PMID").map(|e| e.text()))?;

        Some(
            RecordBuilder::new(pmid, SourceType::PubMed)
                .title(article.descendant("ArticleTitle").map(|e| e.text()))
                .authors(Self::author_names(&article))
                .year(Self::publication_year(&article))
                .source_name(article.descendant("Title").map(|e| e.text()))
                .doi(Self::doi(&article))
                .citations(Citations::Unknown)
                .abstract_text(Self::abstract_text(&article))
                .origin_tag(query.label())
                .build(),
        )
    }
}
