//! Caller-facing print service.
//!
//! [`PrintService`] is the requester side of the status channel. It spawns
//! the [`PrintDaemon`] on the current tokio runtime and exposes the public
//! operations:
//!
//! - [`PrintService::print`] - submit a spec, await the final artifact
//! - [`PrintService::queue_print`] - submit a spec, get the job id
//!   immediately and monitor separately
//! - [`PrintService::job_status`] - the snapshot stream of one job, usable
//!   by late subscribers
//! - [`PrintService::jobs_status`] - latest snapshot of every known job
//! - [`PrintService::cancel_job`] - stop a job with a terminal cancelled
//!   snapshot
//! - [`PrintService::register_projection`] - register a projection before
//!   specs reference it
//!
//! # Example
//!
//! ```ignore
//! use mapprint::service::PrintService;
//!
//! let service = PrintService::start(Default::default())?;
//! let artifact = service.print(spec).await?;
//! std::fs::write("map.png", &artifact)?;
//! service.shutdown().await;
//! ```

mod daemon;

pub use daemon::{
    DaemonConfig, PrintDaemon, DEFAULT_FETCH_CONCURRENCY, DEFAULT_HTTP_TIMEOUT,
    DEFAULT_REQUEST_CHANNEL_CAPACITY, DEFAULT_WMS_CELL_PX,
};

use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::coordinator::JobHandle;
use crate::error::PrintError;
use crate::exchange::{JobRequest, JobStatusStream};
use crate::job::{JobId, JobStatus, JobStatusSnapshot};
use crate::projection::{ProjectionDefinition, ProjectionRegistry};
use crate::provider::{AsyncHttpClient, ReqwestClient};
use crate::spec::PrintSpec;

/// The job registry and dispatch facade.
pub struct PrintService {
    request_tx: mpsc::Sender<JobRequest>,
    jobs: Arc<DashMap<JobId, JobHandle>>,
    projections: Arc<ProjectionRegistry>,
    shutdown: CancellationToken,
    daemon: JoinHandle<()>,
}

impl PrintService {
    /// Starts a service with the default HTTP client and a fresh builtin
    /// projection registry.
    ///
    /// Must be called within a tokio runtime.
    pub fn start(config: DaemonConfig) -> Result<Self, PrintError> {
        let client = ReqwestClient::with_timeout(config.http_timeout)
            .map_err(|e| PrintError::ChannelError(e.to_string()))?;
        Ok(Self::with_parts(
            config,
            Arc::new(ProjectionRegistry::with_builtins()),
            Arc::new(client),
        ))
    }

    /// Starts a service with an injected registry and HTTP client.
    ///
    /// Must be called within a tokio runtime.
    pub fn with_parts(
        config: DaemonConfig,
        projections: Arc<ProjectionRegistry>,
        client: Arc<dyn AsyncHttpClient>,
    ) -> Self {
        let jobs: Arc<DashMap<JobId, JobHandle>> = Arc::new(DashMap::new());
        let (daemon, request_tx) =
            PrintDaemon::new(&config, Arc::clone(&projections), client, Arc::clone(&jobs));
        let shutdown = CancellationToken::new();
        let daemon = tokio::spawn(daemon.run(shutdown.clone()));

        Self {
            request_tx,
            jobs,
            projections,
            shutdown,
            daemon,
        }
    }

    /// Submits a spec and returns its job id as soon as the job exists.
    ///
    /// Spec validation and projection resolution failures reject this call;
    /// no job is created for them.
    pub async fn queue_print(&self, spec: PrintSpec) -> Result<JobId, PrintError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.request_tx
            .send(JobRequest {
                spec,
                reply: reply_tx,
            })
            .await
            .map_err(|_| PrintError::ChannelError("print daemon is not running".to_string()))?;
        reply_rx
            .await
            .map_err(|_| PrintError::ChannelError("print daemon dropped the request".to_string()))?
    }

    /// Submits a spec and waits for the finished artifact.
    ///
    /// Resolves only once every layer has fully loaded and the composited
    /// image is encoded. Fails with [`PrintError::Cancelled`] if the job is
    /// cancelled first. A job stalled by a failed layer never resolves
    /// until it is cancelled.
    pub async fn print(&self, spec: PrintSpec) -> Result<Bytes, PrintError> {
        let id = self.queue_print(spec).await?;
        let mut stream = self.job_status(id)?;
        while let Some(snapshot) = stream.next().await {
            match snapshot.status {
                JobStatus::Finished => {
                    return snapshot.artifact.ok_or_else(|| {
                        PrintError::ChannelError(
                            "finished snapshot carried no artifact".to_string(),
                        )
                    });
                }
                JobStatus::Cancelled => return Err(PrintError::Cancelled(id)),
                JobStatus::Pending | JobStatus::Ongoing => {}
            }
        }
        Err(PrintError::ChannelError(
            "status stream ended before the job finished".to_string(),
        ))
    }

    /// Returns the status stream of one job.
    ///
    /// A late subscriber immediately observes the latest snapshot, then
    /// every subsequent one through the terminal snapshot.
    pub fn job_status(&self, id: JobId) -> Result<JobStatusStream, PrintError> {
        self.jobs
            .get(&id)
            .map(|handle| JobStatusStream::new(handle.status.clone()))
            .ok_or(PrintError::UnknownJob(id))
    }

    /// Returns the latest snapshot of every known job, ordered by id.
    pub fn jobs_status(&self) -> Vec<JobStatusSnapshot> {
        let mut snapshots: Vec<JobStatusSnapshot> =
            self.jobs.iter().map(|entry| entry.value().latest()).collect();
        snapshots.sort_by_key(|snapshot| snapshot.id);
        snapshots
    }

    /// Cancels a job: stops its fetches, discards partial state and emits a
    /// terminal cancelled snapshot (distinct from finished, no artifact).
    ///
    /// Cancelling an already-terminal job is a no-op.
    pub fn cancel_job(&self, id: JobId) -> Result<(), PrintError> {
        let handle = self.jobs.get(&id).ok_or(PrintError::UnknownJob(id))?;
        handle.cancel.cancel();
        Ok(())
    }

    /// Registers a projection so later specs can reference it.
    pub fn register_projection(&self, definition: &ProjectionDefinition) -> Result<(), PrintError> {
        self.projections.register(definition)
    }

    /// Returns the shared projection registry.
    pub fn projections(&self) -> Arc<ProjectionRegistry> {
        Arc::clone(&self.projections)
    }

    /// Drops registry entries for jobs that reached a terminal state.
    ///
    /// Retention is the embedder's policy; nothing is evicted
    /// automatically. Returns the number of jobs removed.
    pub fn remove_finished(&self) -> usize {
        let before = self.jobs.len();
        self.jobs.retain(|_, handle| !handle.latest().is_terminal());
        before - self.jobs.len()
    }

    /// Gracefully shuts the service down, cancelling running jobs.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if self.daemon.await.is_err() {
            warn!("print daemon task ended abnormally");
        }
    }
}

impl std::fmt::Debug for PrintService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrintService")
            .field("jobs", &self.jobs.len())
            .finish()
    }
}
