mod utils;

pub mod browser;
pub mod calendar;
pub mod config;
pub mod runner;
pub mod scoring;
pub mod sensing;
pub mod store;
pub mod suspicious;

use anyhow::{Context, Result};
use chrono::Local;
use log::{info, warn};

use config::ConfigStore;
use runner::{new_run_id, ItemJob, RunController, RunSettings};
use store::{read_json, DataDirs};
use suspicious::DiagnosticsSink;

/// One full run over `items.json` under the data root.
pub fn run() -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let dirs = DataDirs::from_env();
    dirs.ensure()?;
    info!("slotwatch starting data_root={}", dirs.root().display());

    let config = ConfigStore::new(&dirs.config_path())?.current();
    let jobs: Vec<ItemJob> = read_json(&dirs.items_path())
        .with_context(|| format!("items list missing at {}", dirs.items_path().display()))?;

    let run_id = new_run_id();
    let mut settings = RunSettings::new(run_id.clone(), config.clone(), Local::now().date_naive())
        .with_stop_flag(dirs.stop_flag());
    if config.debug.suspicious.enabled {
        settings = settings.with_diagnostics(DiagnosticsSink::new(
            dirs.suspicious_dir(&run_id),
            config.debug.suspicious.clone(),
        ));
    }

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime.block_on(async move {
        let factory = browser::open_backend(config.auto.headful).await?;
        let mut controller = RunController::new();
        controller.start_run(factory.clone(), jobs, settings, dirs)?;

        let interrupt = controller.cancel_token().map(|token| {
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received, finishing items in flight");
                    token.cancel();
                }
            })
        });
        let outcome = controller.wait().await;
        if let Some(watcher) = interrupt {
            watcher.abort();
        }

        if let Err(err) = factory.shutdown().await {
            warn!("browser shutdown failed: {err:#}");
        }

        let report = outcome?;
        if let Some(report) = report {
            for (pos, item) in report.ranked().take(10).enumerate() {
                info!(
                    "#{} {} rank_raw={:.3} rank_lower={:.3} big={:.3} pct={:.2}",
                    pos + 1,
                    item.result.job.id,
                    item.scores.rank_score_raw,
                    item.scores.rank_score_lower,
                    item.scores.big_score,
                    item.rank_percentile.unwrap_or_default()
                );
            }
        }
        Ok(())
    })
}
