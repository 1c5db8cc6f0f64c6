//! Integration tests for Research Harvest
//!
//! These tests drive the public API end to end: adapters against local mock
//! servers, the pipeline, and the CSV writer.

use mockito::Matcher;
use research_harvest::config::load_config;
use research_harvest::models::{SourceType, SubQuery};
use research_harvest::output::{self, OutputSchema};
use research_harvest::pipeline::{ParseFailurePolicy, Pipeline, PipelineError};
use research_harvest::sources::{MockPage, MockSource, OpenAlexSource, ScopusSource};
use research_harvest::utils::{HttpClient, NoDelay};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

fn scopus(url: &str) -> ScopusSource {
    ScopusSource::new(HttpClient::new().unwrap(), "integration-key")
        .unwrap()
        .with_search_url(url)
        .with_gate(Arc::new(NoDelay))
}

fn scopus_page(eids: &[&str]) -> String {
    let entries: Vec<_> = eids
        .iter()
        .map(|eid| {
            json!({
                "eid": eid,
                "dc:title": format!("Title {}", eid),
                "dc:creator": "Doe J.",
                "prism:coverDate": "2022-05-01",
                "citedby-count": "3"
            })
        })
        .collect();
    json!({"search-results": {"entry": entries}}).to_string()
}

fn openalex_page(ids: &[&str]) -> String {
    let results: Vec<_> = ids
        .iter()
        .map(|id| {
            json!({
                "id": format!("https://openalex.org/{}", id),
                "title": format!("Work {}", id),
                "primary_location": {"landing_page_url": format!("https://example.org/{}", id)}
            })
        })
        .collect();
    json!({"meta": {"next_cursor": null}, "results": results}).to_string()
}

#[tokio::test]
async fn test_merged_run_written_to_csv() {
    let source = MockSource::new()
        .with_pages("x", vec![MockPage::ids(&["1", "2"]), MockPage::ids(&["3"])])
        .with_pages("y", vec![MockPage::ids(&["2", "4"])]);

    let report = Pipeline::new(10)
        .run(&source, &SubQuery::from_terms(["x", "y"]))
        .await
        .unwrap();
    assert_eq!(report.results.identifiers(), vec!["1", "2", "3", "4"]);

    let dir = TempDir::new().unwrap();
    let path = output::write_run(&dir.path().join("out"), &report, "").unwrap();
    assert_eq!(path.file_name().and_then(|n| n.to_str()), Some("scopus_4.csv"));

    let content = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 5);
    assert_eq!(lines[0], OutputSchema::Tagged.headers().join(","));
    assert!(lines[4].starts_with("4,Record 4,"));
    assert!(lines[4].ends_with(",y"));
}

#[tokio::test]
async fn test_scopus_failure_abandons_only_that_term() {
    let mut server = mockito::Server::new_async().await;
    let _ok = server
        .mock("GET", "/search")
        .match_query(Matcher::UrlEncoded(
            "query".into(),
            "TITLE-ABS-KEY(actuator)".into(),
        ))
        .with_body(scopus_page(&["2-s2.0-1", "2-s2.0-2"]))
        .create_async()
        .await;
    let _down = server
        .mock("GET", "/search")
        .match_query(Matcher::UrlEncoded("query".into(), "TITLE-ABS-KEY(sensor)".into()))
        .with_status(503)
        .create_async()
        .await;

    let source = scopus(&format!("{}/search", server.url()));
    let report = Pipeline::new(25)
        .run(&source, &SubQuery::from_terms(["actuator", "sensor"]))
        .await
        .unwrap();

    assert_eq!(report.results.identifiers(), vec!["2-s2.0-1", "2-s2.0-2"]);
    assert!(!report.outcomes[0].is_abandoned());
    assert!(report.outcomes[1].is_abandoned());
    assert_eq!(report.abandoned(), 1);

    let record = &report.records()[0];
    assert_eq!(record.year, "2022");
    assert_eq!(record.origin_tag, "actuator");
    assert_eq!(record.citations.to_string(), "3");
}

#[tokio::test]
async fn test_scopus_fatal_parse_policy() {
    let mut server = mockito::Server::new_async().await;
    let _garbage = server
        .mock("GET", "/search")
        .match_query(Matcher::Any)
        .with_body("<html>maintenance</html>")
        .create_async()
        .await;

    let source = scopus(&format!("{}/search", server.url()));
    let queries = SubQuery::from_terms(["actuator"]);

    let abandoned = Pipeline::new(25).run(&source, &queries).await.unwrap();
    assert!(abandoned.outcomes[0].is_abandoned());

    let fatal = Pipeline::new(25)
        .parse_failure(ParseFailurePolicy::Fatal)
        .run(&source, &queries)
        .await;
    assert!(matches!(fatal, Err(PipelineError::FatalParse { .. })));
}

#[tokio::test]
async fn test_openalex_years_deduplicated() {
    let mut server = mockito::Server::new_async().await;
    let mut mocks = Vec::new();
    for (year, ids) in [(2020, ["W1", "W2"]), (2021, ["W2", "W3"])] {
        let mock = server
            .mock("GET", "/works")
            .match_query(Matcher::UrlEncoded(
                "filter".into(),
                format!(
                    "title.search:soft robotics,\
                     from_publication_date:{year}-01-01,to_publication_date:{year}-12-31"
                ),
            ))
            .with_body(openalex_page(&ids))
            .expect(1)
            .create_async()
            .await;
        mocks.push(mock);
    }

    let source = OpenAlexSource::new(HttpClient::new().unwrap())
        .with_base_url(server.url())
        .with_email(None)
        .with_gate(Arc::new(NoDelay));
    let queries = SubQuery::year_range("soft robotics", 2020, 2021);

    let report = Pipeline::new(1500).run(&source, &queries).await.unwrap();
    assert_eq!(report.source, SourceType::OpenAlex);
    assert_eq!(
        report.results.identifiers(),
        vec![
            "https://openalex.org/W1",
            "https://openalex.org/W2",
            "https://openalex.org/W3"
        ]
    );
    assert_eq!(report.outcomes[1].duplicates, 1);
    for mock in mocks {
        mock.assert_async().await;
    }

    let dir = TempDir::new().unwrap();
    let path = output::write_run(dir.path(), &report, "soft robotics").unwrap();
    assert_eq!(
        path.file_name().and_then(|n| n.to_str()),
        Some("soft_robotics.csv")
    );

    let bytes = std::fs::read(&path).unwrap();
    assert!(bytes.starts_with(b"\xEF\xBB\xBF"));
    let text = String::from_utf8_lossy(&bytes);
    assert!(text.contains("https://example.org/W3"));
}

#[test]
fn test_config_drives_sub_queries() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("research-harvest.toml");
    std::fs::write(
        &path,
        r#"
[query]
terms = ["actuator", "sensor"]
base_query = "soft robotics"
year_from = 2019
year_to = 2021
"#,
    )
    .unwrap();

    let config = load_config(Some(path.as_path())).unwrap();

    assert_eq!(
        config.sub_queries(SourceType::PubMed).unwrap(),
        SubQuery::from_terms(["actuator", "sensor"])
    );
    let years = config.sub_queries(SourceType::OpenAlex).unwrap();
    assert_eq!(
        years.iter().map(|q| q.label()).collect::<Vec<_>>(),
        vec!["2019", "2020", "2021"]
    );
}
