//! Paper Curator Ingestion
//!
//! Runs one ingestion pass over a day (or date range) of arXiv submissions:
//! 1. Fetches metadata for the configured category
//! 2. Downloads and parses each PDF
//! 3. Upserts the paper into the database
//! 4. Indexes it for keyword search
//!
//! ```bash
//! ingestion                        # yesterday (UTC)
//! ingestion --date 20240115 --max-results 20
//! ingestion --from 20240101 --to 20240107 --skip-pdfs
//! ingestion --id 1706.03762
//! ```

mod arxiv;
mod errors;
mod pdf;
mod processor;

use anyhow::Context;
use chrono::{Duration, NaiveDate, Utc};
use clap::Parser;
use paper_curator_common::{
    config::AppConfig, db::DbPool, search::create_search_engine, telemetry, VERSION,
};
use tracing::{error, info, warn};

use crate::arxiv::ArxivClient;
use crate::pdf::PdfParser;
use crate::processor::{IngestionOptions, IngestionProcessor};

const DATE_FORMAT: &str = "%Y%m%d";

#[derive(Debug, Parser)]
#[command(name = "ingestion", version, about = "Fetch, parse, store and index arXiv papers")]
struct Cli {
    /// Single submission day, YYYYMMDD. Defaults to yesterday (UTC).
    #[arg(long, value_parser = parse_date, conflicts_with_all = ["from", "to"])]
    date: Option<NaiveDate>,

    /// Start of the submission window, YYYYMMDD
    #[arg(long, value_parser = parse_date)]
    from: Option<NaiveDate>,

    /// End of the submission window, YYYYMMDD
    #[arg(long, value_parser = parse_date)]
    to: Option<NaiveDate>,

    /// Ingest a single paper by arXiv id instead of a date window
    #[arg(long, conflicts_with_all = ["date", "from", "to"])]
    id: Option<String>,

    /// Overrides `arxiv.max_results`
    #[arg(long)]
    max_results: Option<u32>,

    /// Store metadata only
    #[arg(long)]
    skip_pdfs: bool,

    /// Do not write to the search index
    #[arg(long)]
    skip_index: bool,

    /// Drop and recreate the search index before the run
    #[arg(long)]
    recreate_index: bool,
}

fn parse_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|e| format!("expected YYYYMMDD, got {:?}: {}", value, e))
}

impl Cli {
    /// Submission window as `YYYYMMDD` strings
    fn date_window(&self, today: NaiveDate) -> (Option<String>, Option<String>) {
        let fmt = |d: NaiveDate| d.format(DATE_FORMAT).to_string();

        if self.from.is_some() || self.to.is_some() {
            return (self.from.map(fmt), self.to.map(fmt));
        }

        let day = self.date.unwrap_or(today - Duration::days(1));
        (Some(fmt(day)), Some(fmt(day)))
    }

    fn options(&self, config: &AppConfig, today: NaiveDate) -> IngestionOptions {
        let (from_date, to_date) = self.date_window(today);
        IngestionOptions {
            max_results: self.max_results.unwrap_or(config.arxiv.max_results),
            from_date,
            to_date,
            process_pdfs: !self.skip_pdfs,
            store_to_db: true,
            index_to_search: !self.skip_index,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;
    let _telemetry = telemetry::init_tracing(&config.observability, "paper-ingestion")?;

    let options = cli.options(&config, Utc::now().date_naive());
    info!(
        version = VERSION,
        category = %config.arxiv.search_category,
        from = ?options.from_date,
        to = ?options.to_date,
        max_results = options.max_results,
        "Starting Paper Curator ingestion"
    );

    let db = DbPool::new(&config.database).await?;
    db.init_schema().await?;

    let search = create_search_engine(&config.opensearch)?;
    if options.index_to_search {
        match search.ensure_index(cli.recreate_index).await {
            Ok(true) => info!(index = %config.opensearch.index_name, "Search index created"),
            Ok(false) => info!(index = %config.opensearch.index_name, "Search index present"),
            Err(e) => warn!(error = %e, "Search index not ready, indexing will fail per paper"),
        }
    }

    let arxiv = ArxivClient::new(&config.arxiv, config.max_pdf_bytes())?;
    let parser = PdfParser::new(&config.pdf_parser);
    let processor = IngestionProcessor::new(
        arxiv,
        parser,
        db.clone(),
        search,
        config.opensearch.max_text_size,
    );

    let result = match &cli.id {
        Some(arxiv_id) => processor.ingest_paper_by_id(arxiv_id, &options).await,
        None => processor.fetch_and_process_papers(&options).await,
    };
    db.close().await?;

    match result {
        Ok(report) => {
            info!(
                report = %serde_json::to_string(&report)?,
                "Ingestion finished"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Ingestion aborted");
            Err(e.into())
        }
    }
}
