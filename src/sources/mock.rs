//! Mock source for testing purposes.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::models::{Record, RecordBuilder, SourceType, SubQuery};
use crate::sources::{Page, SourceAdapter, SourceError};

/// A scripted raw entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockEntry {
    pub id: Option<String>,
    pub title: String,
}

impl MockEntry {
    pub fn new(id: &str) -> Self {
        Self {
            id: Some(id.to_string()),
            title: format!("Record {}", id),
        }
    }

    /// An entry the normalizer has to drop
    pub fn unidentified() -> Self {
        Self {
            id: None,
            title: "Unidentified".to_string(),
        }
    }
}

/// One scripted response
#[derive(Debug, Clone)]
pub enum MockPage {
    Entries(Vec<MockEntry>),
    Status(u16),
    Malformed,
}

impl MockPage {
    /// A page of well-formed entries with the given identifiers
    pub fn ids(ids: &[&str]) -> Self {
        MockPage::Entries(ids.iter().map(|id| MockEntry::new(id)).collect())
    }
}

/// A source that replays scripted pages keyed by sub-query term.
///
/// The state is the index of the next page; the last scripted page is
/// terminal. Unknown terms produce a single empty, terminal page.
#[derive(Debug, Default)]
pub struct MockSource {
    scripts: HashMap<String, Vec<MockPage>>,
    calls: AtomicUsize,
}

impl MockSource {
    /// Create a new mock source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the pages returned for a term
    pub fn with_pages(mut self, term: &str, pages: Vec<MockPage>) -> Self {
        self.scripts.insert(term.to_string(), pages);
        self
    }

    /// Number of `fetch_page` calls made so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceAdapter for MockSource {
    type State = usize;
    type Entry = MockEntry;

    fn source_type(&self) -> SourceType {
        SourceType::Scopus
    }

    fn id(&self) -> &str {
        "mock"
    }

    fn name(&self) -> &str {
        "Mock Source"
    }

    fn initial_state(&self) -> usize {
        0
    }

    async fn fetch_page(
        &self,
        query: &SubQuery,
        state: usize,
        _cap: usize,
    ) -> Result<Page<MockEntry, usize>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let pages = match self.scripts.get(&query.term) {
            Some(pages) => pages,
            None => return Ok(Page::last(Vec::new())),
        };

        match pages.get(state) {
            Some(MockPage::Entries(entries)) if state + 1 < pages.len() => {
                Ok(Page::more(entries.clone(), state + 1))
            }
            Some(MockPage::Entries(entries)) => Ok(Page::last(entries.clone())),
            Some(MockPage::Status(status)) => Err(SourceError::Status {
                status: *status,
                body: "scripted failure".to_string(),
            }),
            Some(MockPage::Malformed) => Err(SourceError::Parse("scripted garbage".to_string())),
            None => Ok(Page::last(Vec::new())),
        }
    }

    fn normalize(&self, entry: MockEntry, query: &SubQuery) -> Option<Record> {
        let id = entry.id?;
        Some(
            RecordBuilder::new(id, SourceType::Scopus)
                .title(Some(entry.title))
                .origin_tag(query.label())
                .build(),
        )
    }
}
