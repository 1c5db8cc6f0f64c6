//! Record model: the common schema every source is normalized into.

use serde::{Deserialize, Serialize};

/// Sentinel written for any field a source did not provide.
pub const NOT_AVAILABLE: &str = "N/A";

/// The database a record was retrieved from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    PubMed,
    OpenAlex,
    Scopus,
}

impl SourceType {
    /// Returns the display name of the source
    pub fn name(&self) -> &'static str {
        match self {
            SourceType::PubMed => "PubMed",
            SourceType::OpenAlex => "OpenAlex",
            SourceType::Scopus => "Scopus",
        }
    }

    /// Returns the source identifier (used in file names and config keys)
    pub fn id(&self) -> &'static str {
        match self {
            SourceType::PubMed => "pubmed",
            SourceType::OpenAlex => "openalex",
            SourceType::Scopus => "scopus",
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Citation count as reported by the source.
///
/// PubMed never reports citations, so its records carry `Unknown` ("N/A");
/// OpenAlex and Scopus default to `Count(0)` when the field is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Citations {
    Count(u64),
    Unknown,
}

impl std::fmt::Display for Citations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Citations::Count(n) => write!(f, "{}", n),
            Citations::Unknown => f.write_str(NOT_AVAILABLE),
        }
    }
}

/// A bibliographic record in the common schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Source-native identifier (PMID, OpenAlex work URL, Scopus EID); the dedup key
    pub identifier: String,

    pub title: String,

    /// Comma-joined author names
    pub authors: String,

    pub year: String,

    /// Journal / venue name
    pub source_name: String,

    pub doi: String,

    pub citations: Citations,

    pub r#abstract: String,

    /// Label of the sub-query that produced this record
    pub origin_tag: String,

    /// Landing page; only the OpenAlex output schema carries it
    pub url: String,

    /// Database the record came from
    pub source: SourceType,
}

impl Record {
    /// Create a record with every optional field set to the "N/A" sentinel
    pub fn new(identifier: String, source: SourceType) -> Self {
        let na = || NOT_AVAILABLE.to_string();
        Self {
            identifier,
            title: na(),
            authors: na(),
            year: na(),
            source_name: na(),
            doi: na(),
            citations: Citations::Unknown,
            r#abstract: na(),
            origin_tag: na(),
            url: na(),
            source,
        }
    }

    /// Author names as a vector
    pub fn author_list(&self) -> Vec<&str> {
        if self.authors == NOT_AVAILABLE {
            return Vec::new();
        }
        self.authors
            .split(", ")
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Whether an abstract was recovered for this record
    pub fn has_abstract(&self) -> bool {
        self.r#abstract != NOT_AVAILABLE
    }
}

/// Trim a candidate value, treating blank strings as absent.
pub(crate) fn non_blank<S: AsRef<str>>(value: Option<S>) -> Option<String> {
    value.and_then(|v| {
        let v = v.as_ref().trim();
        (!v.is_empty()).then(|| v.to_string())
    })
}

/// Builder used by the normalizers.
///
/// Setters take `Option`s so absent source fields fall through to the sentinel.
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    record: Record,
}

impl RecordBuilder {
    /// Create a builder for a record with the given identifier
    pub fn new(identifier: impl Into<String>, source: SourceType) -> Self {
        Self {
            record: Record::new(identifier.into(), source),
        }
    }

    pub fn title<S: AsRef<str>>(mut self, title: Option<S>) -> Self {
        if let Some(title) = non_blank(title) {
            self.record.title = title;
        }
        self
    }

    /// Set authors from a list of already formatted names
    pub fn authors<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = names
            .into_iter()
            .filter_map(|n| non_blank(Some(n)))
            .collect::<Vec<_>>()
            .join(", ");
        if !joined.is_empty() {
            self.record.authors = joined;
        }
        self
    }

    pub fn year<S: AsRef<str>>(mut self, year: Option<S>) -> Self {
        if let Some(year) = non_blank(year) {
            self.record.year = year;
        }
        self
    }

    pub fn source_name<S: AsRef<str>>(mut self, name: Option<S>) -> Self {
        if let Some(name) = non_blank(name) {
            self.record.source_name = name;
        }
        self
    }

    pub fn doi<S: AsRef<str>>(mut self, doi: Option<S>) -> Self {
        if let Some(doi) = non_blank(doi) {
            self.record.doi = doi;
        }
        self
    }

    pub fn citations(mut self, citations: Citations) -> Self {
        self.record.citations = citations;
        self
    }

    pub fn abstract_text<S: AsRef<str>>(mut self, text: Option<S>) -> Self {
        if let Some(text) = non_blank(text) {
            self.record.r#abstract = text;
        }
        self
    }

    pub fn origin_tag(mut self, tag: impl Into<String>) -> Self {
        self.record.origin_tag = tag.into();
        self
    }

    pub fn url<S: AsRef<str>>(mut self, url: Option<S>) -> Self {
        if let Some(url) = non_blank(url) {
            self.record.url = url;
        }
        self
    }

    /// Build the Record
    pub fn build(self) -> Record {
        self.record
    }
}
