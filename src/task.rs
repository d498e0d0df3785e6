//! Background execution of a complete manifest run.
//!
//! A run reads the order table from the store, computes the manifest, clears the
//! destination and appends the manifest. It executes on tokio's blocking pool so an
//! interactive caller stays responsive, and publishes its status on a watch channel.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};
use utoipa::ToSchema;

use crate::allocator::AllocationError;
use crate::model::MalformedRowError;
use crate::orchestrator::{RunConfig, RunError, RunReport, run_table};
use crate::store::{ManifestSink, StoreError, TableSource};

/// Observable state of a run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    Started,
    Finished { rows_written: usize, shortages: usize },
    Unfinished { reason: String },
}

/// Why a run produced no usable result.
#[derive(Debug, Error)]
pub enum RunFailure {
    #[error("reading the order table failed: {0}")]
    Source(#[source] StoreError),
    #[error("order table is invalid: {0}")]
    Malformed(#[source] MalformedRowError),
    #[error("allocation failed: {0}")]
    Allocation(#[source] AllocationError),
    #[error("writing the manifest failed: {0}")]
    Sink(#[source] StoreError),
    #[error("run aborted: {0}")]
    Aborted(String),
}

impl From<RunError> for RunFailure {
    fn from(err: RunError) -> Self {
        match err {
            RunError::Malformed(err) => RunFailure::Malformed(err),
            RunError::Allocation(err) => RunFailure::Allocation(err),
        }
    }
}

/// Executes a run synchronously on the current thread.
///
/// The destination is only cleared once the manifest has been computed, so a failed
/// allocation leaves the previous manifest in place.
pub fn execute_run<S>(store: &S, config: &RunConfig) -> Result<RunReport, RunFailure>
where
    S: TableSource + ManifestSink + ?Sized,
{
    let table = store.fetch_rows().map_err(RunFailure::Source)?;
    let report = run_table(&table, config)?;

    store.clear().map_err(RunFailure::Sink)?;
    store
        .append(&report.manifest_cells())
        .map_err(RunFailure::Sink)?;
    Ok(report)
}

/// Handle to a run executing in the background.
pub struct RunHandle {
    status: watch::Receiver<RunStatus>,
    join: JoinHandle<Result<RunReport, RunFailure>>,
}

impl RunHandle {
    /// Receiver that observes every status change.
    pub fn subscribe(&self) -> watch::Receiver<RunStatus> {
        self.status.clone()
    }

    /// Waits for the run to end.
    pub async fn wait(self) -> Result<RunReport, RunFailure> {
        match self.join.await {
            Ok(outcome) => outcome,
            Err(err) => Err(RunFailure::Aborted(err.to_string())),
        }
    }
}

/// Publishes the final status of a run, also when the run unwinds.
struct StatusPublisher {
    tx: watch::Sender<RunStatus>,
    published: bool,
}

impl StatusPublisher {
    fn publish(mut self, status: RunStatus) {
        self.tx.send_replace(status);
        self.published = true;
    }
}

impl Drop for StatusPublisher {
    fn drop(&mut self) {
        if !self.published {
            error!("❌ Manifest run aborted");
            self.tx.send_replace(RunStatus::Unfinished {
                reason: "run aborted before completion".to_string(),
            });
        }
    }
}

/// Starts a run on the blocking pool.
///
/// Must be called from within a tokio runtime.
pub fn spawn_run<S>(store: Arc<S>, config: RunConfig) -> RunHandle
where
    S: TableSource + ManifestSink + Send + Sync + 'static,
{
    let (tx, rx) = watch::channel(RunStatus::Started);
    info!("📦 Manifest run started");

    let publisher = StatusPublisher { tx, published: false };
    let join = tokio::task::spawn_blocking(move || {
        let outcome = execute_run(store.as_ref(), &config);
        let status = match &outcome {
            Ok(report) => {
                info!(
                    rows = report.manifest.len(),
                    orders = report.orders.len(),
                    "✅ Manifest run finished"
                );
                RunStatus::Finished {
                    rows_written: report.manifest.len(),
                    shortages: report.shortages().count(),
                }
            }
            Err(err) => {
                error!("❌ Manifest run failed: {err}");
                RunStatus::Unfinished {
                    reason: err.to_string(),
                }
            }
        };
        publisher.publish(status);
        outcome
    });

    RunHandle { status: rx, join }
}
