mod config;

use anyhow::{anyhow, Context, Result};
use config::ServiceConfig;
use dotenv::dotenv;
use futures_util::future::join_all;
use oddsline_rust_core::{
    ClmApiClient, EventCatalog, FileGameDirectory, GameDirectory, HttpPageSource,
    OddsApi, OddsPipeline, PageSource, SubmissionClient,
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn build_submitter(config: &ServiceConfig) -> Result<Arc<SubmissionClient>> {
    let api: Arc<dyn OddsApi> = Arc::new(ClmApiClient::new(config.clm_config()));
    let path = &config.game_ledger_path;
    let directory: Arc<dyn GameDirectory> = Arc::new(
        FileGameDirectory::open(path)
            .with_context(|| format!("Failed to open game ledger {}", path.display()))?,
    );
    info!("Using game ledger {}", path.display());

    Ok(Arc::new(
        SubmissionClient::new(api, directory).with_retry(config.retry_policy()),
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    info!("Starting odds scraper...");

    let config = ServiceConfig::from_env()?;
    let catalog = EventCatalog::load_or_builtin(config.event_catalog_path.as_deref())
        .context("Failed to load event catalog")?;
    info!(
        "Loaded {} events across {:?}",
        catalog.len(),
        catalog.sports()
    );

    let source: Arc<dyn PageSource> = Arc::new(HttpPageSource::new(config.http_timeout));
    let (cancel_tx, cancel_rx) = watch::channel(false);

    let mut pipeline = OddsPipeline::new(source)
        .with_run_timeout(config.run_timeout)
        .with_cancellation(cancel_rx);
    if let Some(dir) = &config.export_dir {
        pipeline = pipeline.with_export_dir(dir.clone());
    }
    if config.dry_run {
        info!("DRY_RUN enabled; payloads are built but not submitted");
    } else {
        pipeline = pipeline.with_submitter(build_submitter(&config)?);
    }

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling runs");
            let _ = cancel_tx.send(true);
        }
    });

    let runs = catalog.events.iter().map(|event| pipeline.run(event));
    let results = join_all(runs).await;

    let mut failed = 0;
    for (event, result) in catalog.events.iter().zip(results) {
        match result {
            Ok(report) => {
                let summary = serde_json::to_string(&report)
                    .unwrap_or_else(|e| format!("<unserializable report: {}>", e));
                info!(
                    sport = %event.sport,
                    tournament = %event.tournament,
                    "Run report: {}",
                    summary
                );
            }
            Err(e) => {
                failed += 1;
                error!(
                    sport = %event.sport,
                    tournament = %event.tournament,
                    kind = e.kind(),
                    retryable = e.is_retryable(),
                    "Run failed: {}",
                    e
                );
            }
        }
    }

    info!(
        "Finished {} runs ({} failed)",
        catalog.len(),
        failed
    );
    if failed > 0 {
        return Err(anyhow!("{} of {} runs failed", failed, catalog.len()));
    }
    Ok(())
}
