//! Job coordination.
//!
//! [`JobCoordinator::create_job`] validates the spec, builds the frame
//! state (both failures reject the call before any job state exists),
//! allocates the job id and spawns the job's machinery: one renderer task
//! per layer, a pool of fetch workers draining the shared tile queue, and
//! one aggregator task that owns all mutable job state.
//!
//! # Aggregation
//!
//! Every renderer reports into one mpsc channel, so all progress
//! recomputation for a job is serialized on the aggregator loop; no two
//! recomputations race. On each event the aggregator either:
//!
//! - composites and encodes the artifact when every layer is complete,
//!   emitting the job's single finished snapshot and stopping, or
//! - emits an ongoing snapshot carrying the mean of per-layer progress,
//!   rounded to 4 decimals, clamped non-decreasing and capped below 1.
//!
//! Snapshots travel over a `watch` channel: hot, replay-latest, so a
//! subscriber attaching mid-job immediately sees the latest snapshot and
//! then every subsequent one through the terminal snapshot.
//!
//! # Cancellation
//!
//! Cancelling a job stops the fetch workers, clears the tile queue
//! (renderers observe their outcome channels closing and exit without a
//! final event) and emits a terminal cancelled snapshot, distinct from
//! finished and carrying no artifact.

use std::sync::Arc;

use image::RgbaImage;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::compose;
use crate::error::PrintError;
use crate::frame::{build_frame_state, FrameState};
use crate::job::{aggregate_progress, JobId, JobSequence, JobStatus, JobStatusSnapshot};
use crate::layer::{spawn_layer_renderer, LayerEvent};
use crate::projection::ProjectionRegistry;
use crate::provider::AsyncHttpClient;
use crate::spec::PrintSpec;
use crate::tile::spawn_fetch_workers;

/// Handle to one running (or finished) job.
///
/// Holds the replay-latest status channel and the job's cancellation
/// token. Cheap to clone; the registry keeps one per job.
#[derive(Debug, Clone)]
pub struct JobHandle {
    /// Job id.
    pub id: JobId,
    /// Replay-latest snapshot channel.
    pub status: watch::Receiver<JobStatusSnapshot>,
    /// Cancels the job when triggered.
    pub cancel: CancellationToken,
}

impl JobHandle {
    /// Returns the latest snapshot.
    pub fn latest(&self) -> JobStatusSnapshot {
        self.status.borrow().clone()
    }
}

/// Creates jobs and spawns their machinery.
pub struct JobCoordinator {
    projections: Arc<ProjectionRegistry>,
    client: Arc<dyn AsyncHttpClient>,
    sequence: JobSequence,
    fetch_concurrency: usize,
    wms_cell_px: u32,
}

impl JobCoordinator {
    /// Creates a coordinator.
    ///
    /// # Arguments
    ///
    /// * `projections` - Shared projection registry
    /// * `client` - HTTP client used by every job's fetch workers
    /// * `sequence` - Job id allocator
    /// * `fetch_concurrency` - Fetch workers per job
    /// * `wms_cell_px` - Cell size for tiled WMS requests
    pub fn new(
        projections: Arc<ProjectionRegistry>,
        client: Arc<dyn AsyncHttpClient>,
        sequence: JobSequence,
        fetch_concurrency: usize,
        wms_cell_px: u32,
    ) -> Self {
        Self {
            projections,
            client,
            sequence,
            fetch_concurrency,
            wms_cell_px,
        }
    }

    /// Creates a job from a spec and starts it.
    ///
    /// Validation and frame-state construction happen first; their failures
    /// reject the call and no job is created. On success the job is already
    /// running when the handle is returned and its snapshot stream starts
    /// at `pending`.
    ///
    /// Must be called within a tokio runtime.
    pub fn create_job(&self, spec: PrintSpec) -> Result<JobHandle, PrintError> {
        spec.validate()?;
        let frame = build_frame_state(&spec, &self.projections)?;

        let id = self.sequence.next_id();
        let cancel = CancellationToken::new();
        let (status_tx, status_rx) = watch::channel(JobStatusSnapshot::pending(id, spec.clone()));

        let layer_count = spec.layers.len();
        let (event_tx, event_rx) = mpsc::channel::<LayerEvent>(layer_count * 2 + 4);

        spawn_fetch_workers(
            Arc::clone(&frame.tile_queue),
            Arc::clone(&self.client),
            self.fetch_concurrency,
            cancel.clone(),
        );

        for (layer_index, layer) in spec.layers.iter().enumerate() {
            spawn_layer_renderer(
                layer_index,
                layer.clone(),
                frame.clone(),
                event_tx.clone(),
                self.wms_cell_px,
            );
        }
        drop(event_tx);

        info!(job = %id, layers = layer_count, "print job created");
        tokio::spawn(run_job(
            id,
            spec,
            frame,
            event_rx,
            status_tx,
            cancel.clone(),
        ));

        Ok(JobHandle {
            id,
            status: status_rx,
            cancel,
        })
    }
}

impl std::fmt::Debug for JobCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobCoordinator")
            .field("fetch_concurrency", &self.fetch_concurrency)
            .field("wms_cell_px", &self.wms_cell_px)
            .finish()
    }
}

/// The aggregator loop: owns all mutable state of one job.
async fn run_job(
    id: JobId,
    spec: PrintSpec,
    frame: FrameState,
    mut events: mpsc::Receiver<LayerEvent>,
    status_tx: watch::Sender<JobStatusSnapshot>,
    cancel: CancellationToken,
) {
    let layer_count = spec.layers.len();
    let opacities: Vec<f64> = spec.layers.iter().map(|l| l.opacity()).collect();

    let mut layer_progress = vec![0.0f64; layer_count];
    let mut rasters: Vec<Option<RgbaImage>> = (0..layer_count).map(|_| None).collect();
    let mut stalled = false;
    let mut last_emitted = 0.0f64;

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                let discarded = frame.tile_queue.clear();
                frame.tile_queue.close();
                status_tx.send_replace(JobStatusSnapshot {
                    id,
                    spec: spec.clone(),
                    progress: last_emitted,
                    status: JobStatus::Cancelled,
                    stalled,
                    artifact: None,
                });
                info!(job = %id, discarded, "print job cancelled");
                return;
            }

            event = events.recv() => {
                let Some(event) = event else {
                    warn!(job = %id, "layer event channel closed before completion");
                    if stalled {
                        // A stalled job stays observable (latest snapshot
                        // keeps its stall flag) until cancelled externally.
                        cancel.cancelled().await;
                        frame.tile_queue.clear();
                        frame.tile_queue.close();
                        status_tx.send_replace(JobStatusSnapshot {
                            id,
                            spec: spec.clone(),
                            progress: last_emitted,
                            status: JobStatus::Cancelled,
                            stalled,
                            artifact: None,
                        });
                        info!(job = %id, "stalled print job cancelled");
                    }
                    return;
                };

                if event.failed {
                    stalled = true;
                    warn!(
                        job = %id,
                        layer = event.layer_index,
                        "layer failed to load, job will stall"
                    );
                } else {
                    layer_progress[event.layer_index] = event.progress;
                    if let Some(raster) = event.raster {
                        rasters[event.layer_index] = Some(raster);
                    }
                }

                let all_ready = layer_progress.iter().all(|p| *p >= 1.0)
                    && rasters.iter().all(|r| r.is_some());

                if all_ready {
                    let layers: Vec<RgbaImage> =
                        rasters.iter_mut().filter_map(|raster| raster.take()).collect();
                    let opacities = opacities.clone();
                    let (width, height) = (frame.width_px, frame.height_px);
                    let encoded = tokio::task::spawn_blocking(move || {
                        compose::compose_and_encode(width, height, layers, opacities)
                    })
                    .await;

                    let artifact = match encoded {
                        Ok(Ok(bytes)) => bytes,
                        Ok(Err(e)) => {
                            error!(job = %id, error = %e, "artifact encoding failed");
                            stalled = true;
                            emit_ongoing(&status_tx, id, &spec, last_emitted, stalled);
                            continue;
                        }
                        Err(e) => {
                            error!(job = %id, error = %e, "compose task failed");
                            stalled = true;
                            emit_ongoing(&status_tx, id, &spec, last_emitted, stalled);
                            continue;
                        }
                    };

                    status_tx.send_replace(JobStatusSnapshot {
                        id,
                        spec: spec.clone(),
                        progress: 1.0,
                        status: JobStatus::Finished,
                        stalled: false,
                        artifact: Some(artifact),
                    });
                    frame.tile_queue.close();
                    info!(job = %id, "print job finished");
                    return;
                }

                let aggregated = aggregate_progress(&layer_progress);
                last_emitted = last_emitted.max(aggregated);
                emit_ongoing(&status_tx, id, &spec, last_emitted, stalled);
            }
        }
    }
}

fn emit_ongoing(
    status_tx: &watch::Sender<JobStatusSnapshot>,
    id: JobId,
    spec: &PrintSpec,
    progress: f64,
    stalled: bool,
) {
    status_tx.send_replace(JobStatusSnapshot {
        id,
        spec: spec.clone(),
        progress,
        status: JobStatus::Ongoing,
        stalled,
        artifact: None,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MockHttpClient;
    use crate::spec::{Layer, OutputSize};
    use bytes::Bytes;
    use std::io::Cursor;

    fn tile_png(rgba: [u8; 4]) -> Bytes {
        let img = RgbaImage::from_pixel(256, 256, image::Rgba(rgba));
        let mut buffer = Cursor::new(Vec::new());
        img.write_to(&mut buffer, image::ImageFormat::Png).unwrap();
        Bytes::from(buffer.into_inner())
    }

    fn coordinator(client: Arc<MockHttpClient>) -> JobCoordinator {
        JobCoordinator::new(
            Arc::new(ProjectionRegistry::with_builtins()),
            client,
            JobSequence::new(),
            4,
            256,
        )
    }

    fn xyz_spec() -> PrintSpec {
        PrintSpec {
            layers: vec![Layer::Xyz {
                url: "https://tiles.example.com/{z}/{x}/{y}.png".to_string(),
                opacity: 1.0,
            }],
            size: OutputSize::pixels(800.0, 600.0),
            center: [12.0, 48.0],
            dpi: 200.0,
            scale: 40_000_000.0,
            projection: "EPSG:3857".to_string(),
            projection_definition: None,
        }
    }

    #[tokio::test]
    async fn test_job_runs_to_finished() {
        let client = Arc::new(MockHttpClient::new(tile_png([0, 128, 255, 255])));
        let coordinator = coordinator(client);
        let handle = coordinator.create_job(xyz_spec()).unwrap();

        let mut status = handle.status.clone();
        let mut progress_seen = Vec::new();
        loop {
            let snapshot = status.borrow_and_update().clone();
            progress_seen.push(snapshot.progress);
            if snapshot.is_terminal() {
                assert_eq!(snapshot.status, JobStatus::Finished);
                assert_eq!(snapshot.progress, 1.0);
                assert!(snapshot.artifact.is_some());
                break;
            }
            status.changed().await.unwrap();
        }
        // Non-decreasing, terminal last.
        for window in progress_seen.windows(2) {
            assert!(window[1] >= window[0]);
        }
    }

    #[tokio::test]
    async fn test_invalid_spec_creates_no_job() {
        let client = Arc::new(MockHttpClient::new(tile_png([0, 0, 0, 255])));
        let coordinator = coordinator(Arc::clone(&client));
        let mut spec = xyz_spec();
        spec.layers.clear();
        assert!(matches!(
            coordinator.create_job(spec),
            Err(PrintError::InvalidSpec(_))
        ));
        assert_eq!(client.request_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_projection_creates_no_job() {
        let client = Arc::new(MockHttpClient::new(tile_png([0, 0, 0, 255])));
        let coordinator = coordinator(Arc::clone(&client));
        let mut spec = xyz_spec();
        spec.projection = "EPSG:999999".to_string();
        assert!(matches!(
            coordinator.create_job(spec),
            Err(PrintError::UnknownProjection(_))
        ));
        assert_eq!(client.request_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_job_emits_terminal_cancelled() {
        let client = Arc::new(
            MockHttpClient::new(tile_png([1, 2, 3, 255]))
                .with_delay(std::time::Duration::from_secs(60)),
        );
        let coordinator = coordinator(client);
        let handle = coordinator.create_job(xyz_spec()).unwrap();

        handle.cancel.cancel();

        let mut status = handle.status.clone();
        loop {
            let snapshot = status.borrow_and_update().clone();
            if snapshot.is_terminal() {
                assert_eq!(snapshot.status, JobStatus::Cancelled);
                assert!(snapshot.artifact.is_none());
                assert!(snapshot.progress < 1.0);
                break;
            }
            status.changed().await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_failing_layer_stalls_job() {
        let client = Arc::new(MockHttpClient::failing(
            crate::provider::ProviderError::Http("unreachable".to_string()),
        ));
        let coordinator = coordinator(client);
        let handle = coordinator.create_job(xyz_spec()).unwrap();

        let mut status = handle.status.clone();
        loop {
            status.changed().await.unwrap();
            let snapshot = status.borrow_and_update().clone();
            assert!(snapshot.progress < 1.0);
            if snapshot.stalled {
                assert_eq!(snapshot.status, JobStatus::Ongoing);
                break;
            }
        }
    }

    #[tokio::test]
    async fn test_ids_strictly_increase() {
        let client = Arc::new(MockHttpClient::new(tile_png([9, 9, 9, 255])));
        let coordinator = coordinator(client);
        let a = coordinator.create_job(xyz_spec()).unwrap();
        let b = coordinator.create_job(xyz_spec()).unwrap();
        let c = coordinator.create_job(xyz_spec()).unwrap();
        assert!(a.id < b.id && b.id < c.id);
    }
}
