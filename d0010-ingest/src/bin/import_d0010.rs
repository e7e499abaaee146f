//! Import D0010 flow files named on the command line.
//!
//! Usage: `import_d0010 [--dry-run] <file>...`
//!
//! Prints one JSON summary per file and exits non-zero if any file was
//! aborted.

use anyhow::Result;
use d0010_ingest::{
    config::AppConfig,
    observability,
    pipeline::{ImportStatus, Importer},
    repository::PgRepository,
    sources::PathListSource,
};
use readings_client::db::schema;
use sqlx::postgres::PgPoolOptions;

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let mut dry_run = false;
    let mut paths = Vec::new();
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--dry-run" | "-n" => dry_run = true,
            flag if flag.starts_with('-') => anyhow::bail!("unknown option '{flag}'"),
            _ => paths.push(arg),
        }
    }
    if paths.is_empty() {
        anyhow::bail!("usage: import_d0010 [--dry-run] <file>...");
    }

    let cfg = AppConfig::load()?;

    let pool = PgPoolOptions::new()
        .max_connections(cfg.database.max_connections)
        .connect(&cfg.database.uri)
        .await?;
    if !dry_run {
        schema::migrate(&pool).await?;
    }

    let repository = PgRepository::new(pool, cfg.database.max_retries, cfg.database.retry_backoff());
    let importer = Importer::new(repository, cfg.import.settings()?);

    tracing::info!(files = paths.len(), dry_run, "importing flow files");
    let summaries = importer.import_source(&PathListSource::new(paths), dry_run).await;

    let mut aborted = 0usize;
    for summary in &summaries {
        println!("{}", serde_json::to_string_pretty(summary)?);
        if summary.status == ImportStatus::Aborted {
            aborted += 1;
        }
    }

    let imported: u64 = summaries.iter().map(|s| s.readings_imported).sum();
    tracing::info!(files = summaries.len(), readings = imported, aborted, "import finished");

    if aborted > 0 {
        anyhow::bail!("{aborted} file(s) aborted");
    }
    Ok(())
}
