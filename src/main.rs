use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use research_harvest::config::{
    default_config_path, find_config_file, load_config, save_config, Config, CONFIG_FILE_NAME,
};
use research_harvest::models::SourceType;
use research_harvest::output;
use research_harvest::pipeline::{ParseFailurePolicy, Pipeline, RunReport};
use research_harvest::sources::SourceAdapter;
use research_harvest::utils::HttpClient;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(feature = "source-openalex")]
use research_harvest::sources::OpenAlexSource;
#[cfg(feature = "source-pubmed")]
use research_harvest::sources::PubMedSource;
#[cfg(feature = "source-scopus")]
use research_harvest::sources::ScopusSource;

/// Research Harvest - Collect bibliographic records from PubMed, OpenAlex and Scopus
#[derive(Parser, Debug)]
#[command(name = "research-harvest")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Collect deduplicated bibliographic records into CSV", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (-v, -vv)
    #[arg(long, short, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Configuration file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory the CSV file is written to
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    /// Request timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// What to do with an undecodable page
    #[arg(long, value_enum, global = true)]
    parse_failure: Option<ParseFailurePolicy>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Search PubMed, one sub-query per term
    #[cfg(feature = "source-pubmed")]
    Pubmed {
        /// Search terms (overrides query.terms)
        terms: Vec<String>,

        /// Identifiers requested per term
        #[arg(long)]
        cap: Option<usize>,

        /// Earliest publication year
        #[arg(long)]
        min_year: Option<i32>,
    },

    /// Search OpenAlex titles, one sub-query per publication year
    #[cfg(feature = "source-openalex")]
    Openalex {
        /// Title query (overrides query.base_query)
        query: Option<String>,

        /// First year (inclusive)
        #[arg(long)]
        from: Option<i32>,

        /// Last year (inclusive)
        #[arg(long)]
        to: Option<i32>,

        /// Records per year
        #[arg(long)]
        cap: Option<usize>,

        /// Contact e-mail for the polite pool
        #[arg(long)]
        mailto: Option<String>,
    },

    /// Search Scopus, one sub-query per term
    #[cfg(feature = "source-scopus")]
    Scopus {
        /// Search terms (overrides query.terms)
        terms: Vec<String>,

        /// Records per term
        #[arg(long)]
        cap: Option<usize>,

        /// Earliest publication year
        #[arg(long)]
        min_year: Option<i32>,
    },

    /// Write a default configuration file
    InitConfig {
        /// Destination (defaults to the per-user config file)
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = find_config_file(cli.config.as_deref());
    let mut config = match &config_path {
        Some(path) => load_config(Some(path.as_path()))
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => load_config(None)?,
    };

    let log_level = match cli.verbose {
        0 => config.logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    let env_filter = if cli.quiet { "error" } else { log_level };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| format!("research_harvest={}", env_filter)),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Some(path) = &config_path {
        tracing::info!("Using config file: {}", path.display());
    }

    if let Some(dir) = cli.output_dir {
        config.output.directory = dir;
    }
    if let Some(timeout) = cli.timeout {
        config.limits.timeout_secs = timeout;
    }
    if let Some(policy) = cli.parse_failure {
        config.pipeline.parse_failure = policy;
    }

    match cli.command {
        #[cfg(feature = "source-pubmed")]
        Commands::Pubmed {
            terms,
            cap,
            min_year,
        } => {
            apply_term_overrides(&mut config, terms, min_year);
            if let Some(cap) = cap {
                config.limits.pubmed_cap = cap;
            }
            let adapter = pubmed_source(&config)?;
            harvest(&adapter, &config, cli.quiet).await
        }

        #[cfg(feature = "source-openalex")]
        Commands::Openalex {
            query,
            from,
            to,
            cap,
            mailto,
        } => {
            if query.is_some() {
                config.query.base_query = query;
            }
            if let Some(from) = from {
                config.query.year_from = from;
            }
            if let Some(to) = to {
                config.query.year_to = to;
            }
            if let Some(cap) = cap {
                config.limits.openalex_cap = cap;
            }
            if mailto.is_some() {
                config.endpoints.openalex_mailto = mailto;
            }
            config.validate()?;
            let adapter = openalex_source(&config)?;
            harvest(&adapter, &config, cli.quiet).await
        }

        #[cfg(feature = "source-scopus")]
        Commands::Scopus {
            terms,
            cap,
            min_year,
        } => {
            apply_term_overrides(&mut config, terms, min_year);
            if let Some(cap) = cap {
                config.limits.scopus_cap = cap;
            }
            let adapter = scopus_source(&config)?;
            harvest(&adapter, &config, cli.quiet).await
        }

        Commands::InitConfig { path, force } => init_config(path, force),
    }
}

#[cfg(any(feature = "source-pubmed", feature = "source-scopus"))]
fn apply_term_overrides(config: &mut Config, terms: Vec<String>, min_year: Option<i32>) {
    if !terms.is_empty() {
        config.query.terms = terms;
    }
    if min_year.is_some() {
        config.query.min_year = min_year;
    }
}

fn http_client(config: &Config) -> Result<HttpClient> {
    Ok(HttpClient::with_timeout(config.limits.timeout())?)
}

#[cfg(feature = "source-pubmed")]
fn pubmed_source(config: &Config) -> Result<PubMedSource> {
    let mut source = PubMedSource::new(http_client(config)?)
        .with_template(config.query.template())
        .with_batch_size(config.limits.pubmed_batch_size)
        .with_gate(config.rate_limits.gate(SourceType::PubMed));
    if let Some(url) = &config.endpoints.pubmed {
        source = source.with_base_url(url.clone());
    }
    Ok(source)
}

#[cfg(feature = "source-openalex")]
fn openalex_source(config: &Config) -> Result<OpenAlexSource> {
    let mut source = OpenAlexSource::new(http_client(config)?)
        .with_page_size(config.limits.openalex_page_size)
        .with_gate(config.rate_limits.gate(SourceType::OpenAlex));
    if let Some(url) = &config.endpoints.openalex {
        source = source.with_base_url(url.clone());
    }
    if let Some(mailto) = &config.endpoints.openalex_mailto {
        source = source.with_email(Some(mailto.clone()));
    }
    Ok(source)
}

#[cfg(feature = "source-scopus")]
fn scopus_source(config: &Config) -> Result<ScopusSource> {
    let key = config.scopus_api_key()?;
    let mut source = ScopusSource::new(http_client(config)?, key)?
        .with_template(config.query.template())
        .with_page_size(config.limits.scopus_page_size)
        .with_gate(config.rate_limits.gate(SourceType::Scopus));
    if let Some(url) = &config.endpoints.scopus {
        source = source.with_search_url(url.clone());
    }
    Ok(source)
}

async fn harvest<A: SourceAdapter>(adapter: &A, config: &Config, quiet: bool) -> Result<()> {
    let source = adapter.source_type();
    let sub_queries = config.sub_queries(source)?;

    let pipeline = Pipeline::new(config.limits.cap(source))
        .parse_failure(config.pipeline.parse_failure);
    let report = pipeline.run(adapter, &sub_queries).await?;

    let base_query = config.query.base_query.as_deref().unwrap_or_default();
    let path = output::write_run(&config.output.directory, &report, base_query)?;

    if !quiet {
        print_summary(&report, &path);
    }
    Ok(())
}

fn print_summary(report: &RunReport, path: &Path) {
    use comfy_table::{Attribute, Cell, Table};

    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(vec![
        "Sub-query",
        "Pages",
        "Entries",
        "Admitted",
        "Duplicates",
        "Dropped",
        "Status",
    ]);

    for outcome in &report.outcomes {
        let label = if outcome.label.chars().count() > 40 {
            format!("{}...", outcome.label.chars().take(37).collect::<String>())
        } else {
            outcome.label.clone()
        };

        table.add_row(vec![
            Cell::new(label).add_attribute(Attribute::Bold),
            Cell::new(outcome.pages),
            Cell::new(outcome.entries),
            Cell::new(outcome.admitted),
            Cell::new(outcome.duplicates),
            Cell::new(outcome.dropped),
            Cell::new(outcome.status.to_string()),
        ]);
    }

    println!("{table}");
    println!(
        "{}: {} unique records saved to {}",
        report.source,
        report.records().len(),
        path.display()
    );
}

fn init_config(path: Option<PathBuf>, force: bool) -> Result<()> {
    let path = path
        .or_else(default_config_path)
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));

    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }

    let mut config = Config::default();
    // Keys stay in the environment unless written in by hand
    config.api_keys.scopus = None;
    save_config(&config, &path)?;

    println!("Wrote default configuration to {}", path.display());
    Ok(())
}
