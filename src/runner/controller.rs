use anyhow::{bail, Context, Result};
use log::info;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::finalize::{finalize_run, RunReport};
use super::pool::scrape_items;
use super::{ItemJob, RunSettings};
use crate::sensing::SurfaceFactory;
use crate::store::DataDirs;

/// Scrapes every job, then scores and persists the batch.
///
/// A blocked-by-site abort returns before anything is written, so a
/// partial batch never reaches history.
pub async fn execute_run(
    factory: Arc<dyn SurfaceFactory>,
    jobs: Vec<ItemJob>,
    settings: Arc<RunSettings>,
    dirs: DataDirs,
    cancel: CancellationToken,
) -> Result<RunReport> {
    info!(
        "run start run_id={} items={} concurrency={}",
        settings.run_id,
        jobs.len(),
        settings.config.auto.concurrency
    );
    let results = scrape_items(factory, jobs, Arc::clone(&settings), cancel).await?;

    tokio::task::spawn_blocking(move || finalize_run(&dirs, &settings, results))
        .await
        .context("finalize task failed to join")?
}

/// Owns at most one background run.
pub struct RunController {
    handle: Option<JoinHandle<Result<RunReport>>>,
    cancel_token: Option<CancellationToken>,
}

impl Default for RunController {
    fn default() -> Self {
        Self::new()
    }
}

impl RunController {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn start_run(
        &mut self,
        factory: Arc<dyn SurfaceFactory>,
        jobs: Vec<ItemJob>,
        settings: RunSettings,
        dirs: DataDirs,
    ) -> Result<()> {
        if self.is_active() {
            bail!("run already active");
        }

        let cancel_token = CancellationToken::new();
        let token_clone = cancel_token.clone();
        let handle = tokio::spawn(execute_run(
            factory,
            jobs,
            Arc::new(settings),
            dirs,
            token_clone,
        ));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    /// Token of the active run, for wiring external stop signals.
    pub fn cancel_token(&self) -> Option<CancellationToken> {
        self.cancel_token.clone()
    }

    /// Waits for the run to finish on its own.
    pub async fn wait(&mut self) -> Result<Option<RunReport>> {
        self.cancel_token = None;
        match self.handle.take() {
            Some(handle) => handle
                .await
                .context("run task failed to join")?
                .map(Some),
            None => Ok(None),
        }
    }

    /// Stops new items from starting and waits for the ones in flight.
    /// The collected results are still finalized.
    pub async fn stop_run(&mut self) -> Result<Option<RunReport>> {
        if let Some(token) = self.cancel_token.take() {
            info!("run stop requested");
            token.cancel();
        }
        self.wait().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn idle_controller_stops_cleanly() {
        let mut controller = RunController::new();
        assert!(!controller.is_active());
        assert!(controller.stop_run().await.unwrap().is_none());
        assert!(controller.wait().await.unwrap().is_none());
    }
}
