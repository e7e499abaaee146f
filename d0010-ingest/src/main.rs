use anyhow::Result;
use d0010_ingest::{
    config::AppConfig,
    metrics_server, observability,
    pipeline::Importer,
    repository::PgRepository,
    sources::{inbox_dir, InboxDirSource},
};
use readings_client::db::schema;
use sqlx::postgres::PgPoolOptions;

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cfg = AppConfig::load()?;

    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let inbox = cfg
        .import
        .inbox_dir
        .clone()
        .ok_or_else(|| anyhow::anyhow!("import.inbox_dir must be set to run the inbox service"))?;
    let archive_dir = cfg.import.archive_dir.clone();
    // Files that can never import, such as non-UTF-8 input.
    let failed_dir = archive_dir.as_ref().unwrap_or(&inbox).join("failed");
    let extension = cfg.import.file_extension.clone().filter(|e| !e.is_empty());

    let pool = PgPoolOptions::new()
        .max_connections(cfg.database.max_connections)
        .connect(&cfg.database.uri)
        .await?;
    schema::migrate(&pool).await?;

    let repository = PgRepository::new(pool, cfg.database.max_retries, cfg.database.retry_backoff());
    let importer = Importer::new(repository, cfg.import.settings()?);
    let source = InboxDirSource::new(&inbox, extension);

    tracing::info!(inbox = %inbox.display(), "watching inbox for D0010 flow files");

    let mut ticker = tokio::time::interval(cfg.import.poll_interval());
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown requested");
                break;
            }
        }

        let summaries = importer.import_source(&source, false).await;
        for summary in summaries {
            println!("{}", serde_json::to_string(&summary)?);

            let path = inbox.join(&summary.filename);
            let Some(target_dir) = inbox_dir::destination(&summary, archive_dir.as_deref(), &failed_dir) else {
                continue;
            };
            match inbox_dir::archive(&path, &target_dir).await {
                Ok(target) => tracing::debug!(filename = %summary.filename, target = %target.display(), "moved out of inbox"),
                Err(e) => tracing::error!(filename = %summary.filename, error = %e, "failed to move flow file out of inbox"),
            }
        }
    }

    Ok(())
}
