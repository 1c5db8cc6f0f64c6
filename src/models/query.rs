//! Sub-query and query template models.

use serde::{Deserialize, Serialize};

/// One independently paginated search: a term, optionally pinned to a year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubQuery {
    /// Search term (or base query for year-split runs)
    pub term: String,

    /// Publication year this sub-query is restricted to
    pub year: Option<i32>,
}

impl SubQuery {
    /// A sub-query for a single search term
    pub fn term(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            year: None,
        }
    }

    /// A sub-query for one year of a base query
    pub fn for_year(base_query: impl Into<String>, year: i32) -> Self {
        Self {
            term: base_query.into(),
            year: Some(year),
        }
    }

    /// One sub-query per term, in the given order
    pub fn from_terms<I, S>(terms: I) -> Vec<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        terms.into_iter().map(Self::term).collect()
    }

    /// One sub-query per year of the inclusive range `from..=to`
    pub fn year_range(base_query: &str, from: i32, to: i32) -> Vec<Self> {
        (from..=to).map(|y| Self::for_year(base_query, y)).collect()
    }

    /// Tag recorded on every record this sub-query produces
    pub fn label(&self) -> String {
        match self.year {
            Some(year) => year.to_string(),
            None => self.term.clone(),
        }
    }
}

impl std::fmt::Display for SubQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.year {
            Some(year) => write!(f, "{} ({})", self.term, year),
            None => f.write_str(&self.term),
        }
    }
}

/// Keyword groups every sub-query is combined with.
///
/// Terms within a group are OR'd, groups are AND'd with the sub-query term.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryTemplate {
    #[serde(default)]
    pub groups: Vec<Vec<String>>,

    /// Earliest publication year to include
    #[serde(default)]
    pub min_year: Option<i32>,
}

impl QueryTemplate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a group of alternative keywords
    pub fn group<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups.push(terms.into_iter().map(Into::into).collect());
        self
    }

    pub fn min_year(mut self, year: i32) -> Self {
        self.min_year = Some(year);
        self
    }

    /// Non-empty groups, blank terms removed
    pub fn active_groups(&self) -> impl Iterator<Item = Vec<&str>> {
        self.groups
            .iter()
            .map(|g| {
                g.iter()
                    .map(|t| t.trim())
                    .filter(|t| !t.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|g| !g.is_empty())
    }
}
