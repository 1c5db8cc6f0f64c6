//! CSV export of a run's records.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::models::{Record, SourceType};
use crate::pipeline::RunReport;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Errors that can occur while writing output
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Column layout of an output file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputSchema {
    /// `EID,...,Abstract,TechTerm`: records carry the sub-query that found them
    Tagged,

    /// `ID,...,Abstract,URL`: records carry their landing page
    Linked,
}

impl OutputSchema {
    pub fn for_source(source: SourceType) -> Self {
        match source {
            SourceType::PubMed | SourceType::Scopus => OutputSchema::Tagged,
            SourceType::OpenAlex => OutputSchema::Linked,
        }
    }

    pub fn headers(&self) -> [&'static str; 9] {
        match self {
            OutputSchema::Tagged => [
                "EID", "Title", "Authors", "Year", "Source", "DOI", "Citations", "Abstract",
                "TechTerm",
            ],
            OutputSchema::Linked => [
                "ID", "Title", "Authors", "Year", "Source", "DOI", "Citations", "Abstract", "URL",
            ],
        }
    }

    pub fn row(&self, record: &Record) -> [String; 9] {
        let last = match self {
            OutputSchema::Tagged => record.origin_tag.clone(),
            OutputSchema::Linked => record.url.clone(),
        };
        [
            record.identifier.clone(),
            record.title.clone(),
            record.authors.clone(),
            record.year.clone(),
            record.source_name.clone(),
            record.doi.clone(),
            record.citations.to_string(),
            record.r#abstract.clone(),
            last,
        ]
    }

    /// Whether files in this layout start with a byte-order mark
    pub fn with_bom(&self) -> bool {
        matches!(self, OutputSchema::Linked)
    }
}

/// Write records to `path`, header row first
pub fn write_csv(path: &Path, schema: OutputSchema, records: &[Record]) -> Result<(), OutputError> {
    let mut file = File::create(path)?;
    if schema.with_bom() {
        file.write_all(UTF8_BOM)?;
    }

    let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(file);
    wtr.write_record(schema.headers())?;
    for record in records {
        wtr.write_record(schema.row(record))?;
    }
    wtr.flush()?;

    Ok(())
}

/// File name for a run's output
///
/// PubMed and Scopus files are numbered by record count; OpenAlex files are
/// named after the base query.
pub fn default_file_name(source: SourceType, count: usize, base_query: &str) -> String {
    match source {
        SourceType::PubMed => format!("pubmed_{}.csv", count),
        SourceType::Scopus => format!("scopus_{}.csv", count),
        SourceType::OpenAlex => format!("{}.csv", base_query.trim().replace(' ', "_")),
    }
}

/// Write a run's records into `dir`, creating it if needed, and return the path
pub fn write_run(dir: &Path, report: &RunReport, base_query: &str) -> Result<PathBuf, OutputError> {
    std::fs::create_dir_all(dir)?;

    let records = report.records();
    let path = dir.join(default_file_name(report.source, records.len(), base_query));
    write_csv(&path, OutputSchema::for_source(report.source), records)?;

    info!("Saved {} records to {}", records.len(), path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Citations, RecordBuilder};
    use tempfile::TempDir;

    fn sample() -> Record {
        RecordBuilder::new("2-s2.0-1", SourceType::Scopus)
            .title(Some("Deep learning, revisited"))
            .authors(["Smith J."])
            .year(Some("2021"))
            .citations(Citations::Count(7))
            .origin_tag("diagnosis")
            .build()
    }

    #[test]
    fn test_tagged_csv() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");

        write_csv(&path, OutputSchema::Tagged, &[sample()]).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(
            lines.next().unwrap(),
            "EID,Title,Authors,Year,Source,DOI,Citations,Abstract,TechTerm"
        );
        assert_eq!(
            lines.next().unwrap(),
            "2-s2.0-1,\"Deep learning, revisited\",Smith J.,2021,N/A,N/A,7,N/A,diagnosis"
        );
        assert!(lines.next().is_none());
    }

    #[test]
    fn test_linked_csv_has_bom() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        let record = RecordBuilder::new("https://openalex.org/W1", SourceType::OpenAlex)
            .url(Some("https://example.org/w1"))
            .build();

        write_csv(&path, OutputSchema::Linked, &[record]).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(UTF8_BOM));
        let text = String::from_utf8(bytes[UTF8_BOM.len()..].to_vec()).unwrap();
        assert!(text.starts_with("ID,Title,"));
        assert!(text.contains("https://example.org/w1"));
    }

    #[test]
    fn test_empty_run_still_has_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.csv");

        write_csv(&path, OutputSchema::Tagged, &[]).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 1);
    }

    #[test]
    fn test_default_file_names() {
        assert_eq!(default_file_name(SourceType::PubMed, 42, "x"), "pubmed_42.csv");
        assert_eq!(default_file_name(SourceType::Scopus, 0, "x"), "scopus_0.csv");
        assert_eq!(
            default_file_name(SourceType::OpenAlex, 9, "machine learning"),
            "machine_learning.csv"
        );
    }

    #[test]
    fn test_schema_for_source() {
        assert_eq!(OutputSchema::for_source(SourceType::PubMed), OutputSchema::Tagged);
        assert_eq!(OutputSchema::for_source(SourceType::OpenAlex), OutputSchema::Linked);
    }
}
