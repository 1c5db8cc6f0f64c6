//! Drives a source adapter through every sub-query of a run.
//!
//! Each sub-query is paginated through an explicit state machine:
//!
//! ```text
//! Fetching(state) --page, next=Some--> Fetching(next)
//! Fetching(state) --page, next=None--> Exhausted
//! Fetching(state) --error------------> Abandoned(error)
//! ```
//!
//! Records from every page are normalized, passed through the run's
//! [`Deduplicator`] and appended to the [`ResultSet`] in first-seen order.
//! An abandoned sub-query keeps whatever its earlier pages produced.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::models::{Record, SourceType, SubQuery};
use crate::sources::{SourceAdapter, SourceError};
use crate::utils::Deduplicator;

/// Default per-sub-query record cap
pub const DEFAULT_CAP: usize = 800;

/// What to do when a page body cannot be decoded
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ParseFailurePolicy {
    /// Abandon the sub-query like any other failed request
    #[default]
    Abandon,

    /// Stop the whole run
    Fatal,
}

/// Errors that end a run early
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("{source_id}: undecodable response for '{query}': {message}")]
    FatalParse {
        source_id: String,
        query: String,
        message: String,
    },
}

/// Pagination state of one sub-query
#[derive(Debug)]
enum FetchState<S> {
    Fetching(S),
    Exhausted,
    Abandoned(SourceError),
}

/// Ordered, duplicate-free records accumulated over a run
#[derive(Debug, Default)]
pub struct ResultSet {
    records: Vec<Record>,
    dedup: Deduplicator,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record unless its identifier was already admitted
    pub fn push(&mut self, record: Record) -> bool {
        if !self.dedup.admit(&record) {
            return false;
        }
        self.records.push(record);
        true
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    pub fn identifiers(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.identifier.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// How a sub-query's pagination ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubQueryStatus {
    Completed,
    Abandoned(String),
}

impl std::fmt::Display for SubQueryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubQueryStatus::Completed => f.write_str("completed"),
            SubQueryStatus::Abandoned(reason) => write!(f, "abandoned: {}", reason),
        }
    }
}

/// Per-sub-query counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubQueryOutcome {
    pub label: String,

    /// Pages successfully fetched
    pub pages: usize,

    /// Raw entries seen across those pages
    pub entries: usize,

    /// Entries the normalizer rejected
    pub dropped: usize,

    /// Records already admitted earlier in the run
    pub duplicates: usize,

    /// Records added to the result set
    pub admitted: usize,

    pub status: SubQueryStatus,
}

impl SubQueryOutcome {
    fn new(label: String) -> Self {
        Self {
            label,
            pages: 0,
            entries: 0,
            dropped: 0,
            duplicates: 0,
            admitted: 0,
            status: SubQueryStatus::Completed,
        }
    }

    pub fn is_abandoned(&self) -> bool {
        matches!(self.status, SubQueryStatus::Abandoned(_))
    }
}

/// Result of a complete run
#[derive(Debug)]
pub struct RunReport {
    pub source: SourceType,
    pub results: ResultSet,
    pub outcomes: Vec<SubQueryOutcome>,
}

impl RunReport {
    pub fn records(&self) -> &[Record] {
        self.results.records()
    }

    /// Number of sub-queries that ended early
    pub fn abandoned(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_abandoned()).count()
    }
}

/// Sequential harvest over a list of sub-queries
#[derive(Debug, Clone)]
pub struct Pipeline {
    cap: usize,
    parse_failure: ParseFailurePolicy,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(DEFAULT_CAP)
    }
}

impl Pipeline {
    /// Create a pipeline with a per-sub-query record cap
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            parse_failure: ParseFailurePolicy::default(),
        }
    }

    pub fn parse_failure(mut self, policy: ParseFailurePolicy) -> Self {
        self.parse_failure = policy;
        self
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Run every sub-query in order against one adapter
    pub async fn run<A: SourceAdapter>(
        &self,
        adapter: &A,
        sub_queries: &[SubQuery],
    ) -> Result<RunReport, PipelineError> {
        let mut results = ResultSet::new();
        let mut outcomes = Vec::with_capacity(sub_queries.len());

        info!(
            "Harvesting {} sub-queries from {} (cap {})",
            sub_queries.len(),
            adapter.name(),
            self.cap
        );

        for query in sub_queries {
            let outcome = self.run_sub_query(adapter, query, &mut results).await?;
            info!(
                "{}: {} pages, {} admitted ({})",
                query, outcome.pages, outcome.admitted, outcome.status
            );
            outcomes.push(outcome);
        }

        info!("{}: {} unique records", adapter.name(), results.len());

        Ok(RunReport {
            source: adapter.source_type(),
            results,
            outcomes,
        })
    }

    async fn run_sub_query<A: SourceAdapter>(
        &self,
        adapter: &A,
        query: &SubQuery,
        results: &mut ResultSet,
    ) -> Result<SubQueryOutcome, PipelineError> {
        let mut outcome = SubQueryOutcome::new(query.label());
        let mut state = FetchState::Fetching(adapter.initial_state());

        loop {
            state = match state {
                FetchState::Fetching(current) => {
                    debug!(
                        "{} '{}': requesting page {}",
                        adapter.id(),
                        query,
                        outcome.pages + 1
                    );
                    match adapter.fetch_page(query, current, self.cap).await {
                        Ok(page) => {
                            outcome.pages += 1;
                            outcome.entries += page.entries.len();
                            for entry in page.entries {
                                let Some(record) = adapter.normalize(entry, query) else {
                                    outcome.dropped += 1;
                                    continue;
                                };
                                if results.push(record) {
                                    outcome.admitted += 1;
                                } else {
                                    outcome.duplicates += 1;
                                }
                            }
                            match page.next {
                                Some(next) if outcome.entries < self.cap => {
                                    FetchState::Fetching(next)
                                }
                                Some(_) => {
                                    debug!(
                                        "{} '{}': cap of {} reached",
                                        adapter.id(),
                                        query,
                                        self.cap
                                    );
                                    FetchState::Exhausted
                                }
                                None => FetchState::Exhausted,
                            }
                        }
                        Err(err)
                            if err.is_parse() && self.parse_failure == ParseFailurePolicy::Fatal =>
                        {
                            return Err(PipelineError::FatalParse {
                                source_id: adapter.id().to_string(),
                                query: query.to_string(),
                                message: err.to_string(),
                            });
                        }
                        Err(err) => FetchState::Abandoned(err),
                    }
                }
                FetchState::Exhausted => {
                    outcome.status = SubQueryStatus::Completed;
                    break;
                }
                FetchState::Abandoned(err) => {
                    warn!(
                        "{} '{}': abandoned after {} pages: {}",
                        adapter.id(),
                        query,
                        outcome.pages,
                        err
                    );
                    outcome.status = SubQueryStatus::Abandoned(err.to_string());
                    break;
                }
            };
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{MockEntry, MockPage, MockSource};

    fn ids(report: &RunReport) -> Vec<&str> {
        report.results.identifiers()
    }

    #[tokio::test]
    async fn test_overlapping_terms_are_merged_in_order() {
        let source = MockSource::new()
            .with_pages("x", vec![MockPage::ids(&["1", "2"]), MockPage::ids(&["3"])])
            .with_pages("y", vec![MockPage::ids(&["2", "4"])]);

        let report = Pipeline::new(10)
            .run(&source, &SubQuery::from_terms(["x", "y"]))
            .await
            .unwrap();

        assert_eq!(ids(&report), vec!["1", "2", "3", "4"]);
        assert_eq!(report.outcomes[0].pages, 2);
        assert_eq!(report.outcomes[1].duplicates, 1);
        assert_eq!(report.outcomes[1].admitted, 1);
        assert_eq!(report.records()[3].origin_tag, "y");
    }

    #[tokio::test]
    async fn test_failure_keeps_earlier_pages() {
        let source = MockSource::new()
            .with_pages("x", vec![MockPage::ids(&["1", "2"]), MockPage::Status(500)])
            .with_pages("y", vec![MockPage::ids(&["3"])]);

        let report = Pipeline::new(10)
            .run(&source, &SubQuery::from_terms(["x", "y"]))
            .await
            .unwrap();

        assert_eq!(ids(&report), vec!["1", "2", "3"]);
        assert!(report.outcomes[0].is_abandoned());
        assert_eq!(report.outcomes[0].pages, 1);
        assert_eq!(report.outcomes[1].status, SubQueryStatus::Completed);
        assert_eq!(report.abandoned(), 1);
    }

    #[tokio::test]
    async fn test_empty_sub_query_is_not_an_error() {
        let source = MockSource::new().with_pages("empty", vec![MockPage::Entries(vec![])]);

        let report = Pipeline::new(10)
            .run(&source, &SubQuery::from_terms(["empty", "unscripted"]))
            .await
            .unwrap();

        assert!(report.results.is_empty());
        assert_eq!(report.abandoned(), 0);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_no_sub_queries() {
        let source = MockSource::new();
        let report = Pipeline::default().run(&source, &[]).await.unwrap();
        assert!(report.outcomes.is_empty());
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn test_unidentified_entries_are_dropped() {
        let source = MockSource::new().with_pages(
            "x",
            vec![MockPage::Entries(vec![
                MockEntry::new("1"),
                MockEntry::unidentified(),
            ])],
        );

        let report = Pipeline::new(10)
            .run(&source, &[SubQuery::term("x")])
            .await
            .unwrap();

        assert_eq!(ids(&report), vec!["1"]);
        assert_eq!(report.outcomes[0].entries, 2);
        assert_eq!(report.outcomes[0].dropped, 1);
    }

    #[tokio::test]
    async fn test_parse_failure_abandons_by_default() {
        let source = MockSource::new()
            .with_pages("x", vec![MockPage::ids(&["1"]), MockPage::Malformed])
            .with_pages("y", vec![MockPage::ids(&["2"])]);

        let report = Pipeline::new(10)
            .run(&source, &SubQuery::from_terms(["x", "y"]))
            .await
            .unwrap();

        assert_eq!(ids(&report), vec!["1", "2"]);
        assert!(report.outcomes[0].is_abandoned());
    }

    #[tokio::test]
    async fn test_parse_failure_fatal_policy() {
        let source = MockSource::new()
            .with_pages("x", vec![MockPage::ids(&["1"]), MockPage::Malformed])
            .with_pages("y", vec![MockPage::ids(&["2"])]);

        let result = Pipeline::new(10)
            .parse_failure(ParseFailurePolicy::Fatal)
            .run(&source, &SubQuery::from_terms(["x", "y"]))
            .await;

        assert!(matches!(result, Err(PipelineError::FatalParse { .. })));
        // "y" is never requested
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_fatal_policy_ignores_status_errors() {
        let source = MockSource::new()
            .with_pages("x", vec![MockPage::Status(429)])
            .with_pages("y", vec![MockPage::ids(&["2"])]);

        let report = Pipeline::new(10)
            .parse_failure(ParseFailurePolicy::Fatal)
            .run(&source, &SubQuery::from_terms(["x", "y"]))
            .await
            .unwrap();

        assert_eq!(ids(&report), vec!["2"]);
    }

    #[tokio::test]
    async fn test_one_call_per_scripted_page() {
        let pages = (0..5)
            .map(|i: usize| {
                let id = i.to_string();
                MockPage::ids(&[id.as_str()])
            })
            .collect::<Vec<_>>();
        let source = MockSource::new().with_pages("x", pages);

        let report = Pipeline::new(10)
            .run(&source, &[SubQuery::term("x")])
            .await
            .unwrap();

        assert_eq!(source.calls(), 5);
        assert_eq!(report.results.len(), 5);
    }

    #[tokio::test]
    async fn test_cap_stops_paging() {
        let source = MockSource::new().with_pages(
            "x",
            vec![
                MockPage::ids(&["1", "2"]),
                MockPage::ids(&["3", "4"]),
                MockPage::ids(&["5", "6"]),
            ],
        );

        let report = Pipeline::new(3)
            .run(&source, &[SubQuery::term("x")])
            .await
            .unwrap();

        // the page that crosses the cap is kept whole
        assert_eq!(ids(&report), vec!["1", "2", "3", "4"]);
        assert_eq!(source.calls(), 2);
        assert_eq!(report.outcomes[0].status, SubQueryStatus::Completed);
    }

    #[test]
    fn test_result_set_push() {
        use crate::models::RecordBuilder;

        let mut set = ResultSet::new();
        assert!(set.push(RecordBuilder::new("a", SourceType::PubMed).build()));
        assert!(!set.push(RecordBuilder::new("a", SourceType::PubMed).build()));
        assert!(set.push(RecordBuilder::new("b", SourceType::PubMed).build()));
        assert_eq!(set.identifiers(), vec!["a", "b"]);
    }

    #[test]
    fn test_policy_serde() {
        let policy: ParseFailurePolicy = serde_json::from_str("\"fatal\"").unwrap();
        assert_eq!(policy, ParseFailurePolicy::Fatal);
        assert_eq!(ParseFailurePolicy::default(), ParseFailurePolicy::Abandon);
    }
}
