//! Layer renderers.
//!
//! One renderer task runs per layer of a job. It plans the layer's fetches,
//! enqueues them on the job's shared tile queue, draws arriving images onto
//! a canvas at the output size and reports `(progress, raster)` pairs to
//! the job coordinator: `(0, None)` first, then one event per completed
//! fetch, terminating exactly once at `(1, Some(raster))`.
//!
//! An untiled WMS layer is a single GetMap request, so it reports exactly
//! two states: `(0, None)` then `(1, raster)`.
//!
//! Failure policy: an individual fetch failure degrades the layer (its spot
//! stays transparent) but still counts toward progress. Only when every
//! fetch of the layer failed does the renderer emit a failure event instead
//! of completing; the coordinator then flags the job as stalled and the
//! layer never reaches full progress.

use image::RgbaImage;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::frame::FrameState;
use crate::provider::{WmsSource, XyzTemplate};
use crate::spec::Layer;
use crate::tile::{
    canvas_grid, mercator_coverage, FetchOutcome, PixelRect, PlannedFetch, QueuedFetch,
};

/// Progress report from one layer renderer to the job coordinator.
#[derive(Debug)]
pub struct LayerEvent {
    /// Index of the layer within the job's spec.
    pub layer_index: usize,
    /// Fraction of the layer's fetches completed, in `[0, 1]`.
    pub progress: f64,
    /// The finished layer canvas; present only on the final event of a
    /// successfully loaded layer.
    pub raster: Option<RgbaImage>,
    /// True when the layer failed irrecoverably (every fetch failed).
    pub failed: bool,
}

/// Plans the fetches one layer needs for the given frame.
///
/// Tiled sources produce one fetch per tile; an untiled WMS layer produces
/// a single fetch covering the whole canvas.
pub fn plan_layer_fetches(layer: &Layer, frame: &FrameState, wms_cell_px: u32) -> Vec<PlannedFetch> {
    match layer {
        Layer::Xyz { url, .. } => {
            let template = match XyzTemplate::new(url.clone()) {
                Ok(template) => template,
                Err(e) => {
                    debug!(error = %e, "XYZ template rejected at planning");
                    return Vec::new();
                }
            };
            mercator_coverage(frame)
                .into_iter()
                .map(|tile| PlannedFetch {
                    url: template.tile_url(tile.coord),
                    dest: tile.dest,
                    distance: tile.distance,
                })
                .collect()
        }
        Layer::Wms {
            url,
            layer: layer_name,
            tiled,
            ..
        } => {
            let source = WmsSource::new(url.clone(), layer_name.clone());
            let srs = frame.projection.code();
            if *tiled {
                canvas_grid(frame, wms_cell_px)
                    .into_iter()
                    .map(|(extent, dest, distance)| PlannedFetch {
                        url: source.get_map_url(&extent, dest.width, dest.height, srs),
                        dest,
                        distance,
                    })
                    .collect()
            } else {
                let dest = PixelRect {
                    x: 0,
                    y: 0,
                    width: frame.width_px,
                    height: frame.height_px,
                };
                vec![PlannedFetch {
                    url: source.get_map_url(
                        &frame.extent,
                        frame.width_px,
                        frame.height_px,
                        srs,
                    ),
                    dest,
                    distance: 0.0,
                }]
            }
        }
    }
}

/// Spawns the renderer task for one layer.
///
/// The renderer owns its canvas and outcome channel; the coordinator owns
/// the accumulated progress history. The task ends after its final event,
/// or silently when the job is torn down underneath it (outcome or event
/// channel closed).
pub fn spawn_layer_renderer(
    layer_index: usize,
    layer: Layer,
    frame: FrameState,
    events: mpsc::Sender<LayerEvent>,
    wms_cell_px: u32,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let planned = plan_layer_fetches(&layer, &frame, wms_cell_px);
        let required = planned.len();
        if required == 0 {
            // Nothing fetchable (bad template); the layer can never load.
            let _ = events
                .send(LayerEvent {
                    layer_index,
                    progress: 0.0,
                    raster: None,
                    failed: true,
                })
                .await;
            return;
        }

        if events
            .send(LayerEvent {
                layer_index,
                progress: 0.0,
                raster: None,
                failed: false,
            })
            .await
            .is_err()
        {
            return;
        }

        let (outcome_tx, mut outcome_rx) = mpsc::channel::<FetchOutcome>(required);
        for fetch in planned {
            frame.tile_queue.enqueue(QueuedFetch::new(
                fetch.url,
                fetch.dest,
                fetch.distance,
                outcome_tx.clone(),
            ));
        }
        drop(outcome_tx);

        let mut canvas = RgbaImage::new(frame.width_px, frame.height_px);
        let mut completed = 0usize;
        let mut failures = 0usize;
        let mut last_progress = 0.0f64;

        while completed < required {
            let Some(outcome) = outcome_rx.recv().await else {
                // Queue cleared during cancellation; exit without a final
                // event.
                trace!(layer = layer_index, "outcome channel closed, renderer exiting");
                return;
            };
            completed += 1;

            match outcome.result {
                Ok(bytes) => match image::load_from_memory(&bytes) {
                    Ok(decoded) => crate::compose::draw_into(&mut canvas, &decoded, &outcome.dest),
                    Err(e) => {
                        failures += 1;
                        debug!(layer = layer_index, error = %e, "fetched image failed to decode");
                    }
                },
                Err(e) => {
                    failures += 1;
                    debug!(layer = layer_index, error = %e, "fetch failed");
                }
            }

            if completed < required {
                last_progress = completed as f64 / required as f64;
                if events
                    .send(LayerEvent {
                        layer_index,
                        progress: last_progress,
                        raster: None,
                        failed: false,
                    })
                    .await
                    .is_err()
                {
                    return;
                }
            }
        }

        let event = if failures == required {
            // Total failure: the layer never reaches full progress.
            LayerEvent {
                layer_index,
                progress: last_progress,
                raster: None,
                failed: true,
            }
        } else {
            LayerEvent {
                layer_index,
                progress: 1.0,
                raster: Some(canvas),
                failed: false,
            }
        };
        let _ = events.send(event).await;
    })
}
