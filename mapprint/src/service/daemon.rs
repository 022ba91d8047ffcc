//! Print daemon: the control loop on the rendering side of the channel.
//!
//! The [`PrintDaemon`] owns the [`JobCoordinator`] and receives
//! [`JobRequest`]s from producers via an mpsc channel. Each request is
//! validated and turned into a running job (or rejected); the new job's
//! handle is published in the shared registry map before the request's
//! reply resolves, so a caller holding the id can always subscribe.
//!
//! # Example
//!
//! ```ignore
//! use mapprint::service::{DaemonConfig, PrintDaemon};
//!
//! let (daemon, request_tx) = PrintDaemon::new(config, projections, client, jobs);
//! let shutdown = CancellationToken::new();
//! tokio::spawn(daemon.run(shutdown.clone()));
//!
//! request_tx.send(request).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::coordinator::{JobCoordinator, JobHandle};
use crate::exchange::JobRequest;
use crate::job::{JobId, JobSequence};
use crate::projection::ProjectionRegistry;
use crate::provider::AsyncHttpClient;

/// Default capacity of the request channel.
pub const DEFAULT_REQUEST_CHANNEL_CAPACITY: usize = 64;

/// Default number of fetch workers per job.
pub const DEFAULT_FETCH_CONCURRENCY: usize = 8;

/// Default cell size for tiled WMS requests, in pixels.
pub const DEFAULT_WMS_CELL_PX: u32 = 256;

/// Default HTTP request timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for the print daemon.
#[derive(Clone, Debug)]
pub struct DaemonConfig {
    /// Request channel capacity.
    pub request_channel_capacity: usize,

    /// Fetch workers per job.
    pub fetch_concurrency: usize,

    /// Cell size for tiled WMS requests, in pixels.
    pub wms_cell_px: u32,

    /// HTTP request timeout for the default client.
    pub http_timeout: Duration,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            request_channel_capacity: DEFAULT_REQUEST_CHANNEL_CAPACITY,
            fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
            wms_cell_px: DEFAULT_WMS_CELL_PX,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

/// The print daemon.
///
/// Owns the coordinator and drains the request channel as a long-lived
/// background task.
pub struct PrintDaemon {
    coordinator: JobCoordinator,
    request_rx: mpsc::Receiver<JobRequest>,
    jobs: Arc<DashMap<JobId, JobHandle>>,
}

impl PrintDaemon {
    /// Creates a daemon with its request channel.
    ///
    /// Returns the daemon and a sender that can be cloned for producers.
    /// Created job handles are published into `jobs`.
    pub fn new(
        config: &DaemonConfig,
        projections: Arc<ProjectionRegistry>,
        client: Arc<dyn AsyncHttpClient>,
        jobs: Arc<DashMap<JobId, JobHandle>>,
    ) -> (Self, mpsc::Sender<JobRequest>) {
        let (request_tx, request_rx) = mpsc::channel(config.request_channel_capacity.max(1));
        let coordinator = JobCoordinator::new(
            projections,
            client,
            JobSequence::new(),
            config.fetch_concurrency,
            config.wms_cell_px,
        );
        (
            Self {
                coordinator,
                request_rx,
                jobs,
            },
            request_tx,
        )
    }

    /// Runs the control loop until shutdown or until every sender is gone.
    ///
    /// On shutdown, running jobs are cancelled so their subscribers observe
    /// a terminal snapshot instead of a severed stream.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!("print daemon started");
        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    debug!("print daemon shutdown requested");
                    break;
                }

                request = self.request_rx.recv() => {
                    let Some(JobRequest { spec, reply }) = request else {
                        debug!("request channel closed");
                        break;
                    };
                    let result = self.coordinator.create_job(spec).map(|handle| {
                        let id = handle.id;
                        // Publish before replying so the id is always
                        // subscribable once the caller holds it.
                        self.jobs.insert(id, handle);
                        id
                    });
                    if reply.send(result).is_err() {
                        debug!("requester gone before job reply");
                    }
                }
            }
        }

        for entry in self.jobs.iter() {
            entry.value().cancel.cancel();
        }
        info!("print daemon stopped");
    }
}

impl std::fmt::Debug for PrintDaemon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrintDaemon")
            .field("jobs", &self.jobs.len())
            .finish()
    }
}
