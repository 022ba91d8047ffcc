//! Frame state: the resolved viewport of one print job.
//!
//! A [`FrameState`] is built exactly once per job, before any layer renderer
//! starts, and is immutable for the rest of the job. It resolves the spec's
//! projection (registering an inline definition first if the code is
//! unknown), converts scale and DPI into a resolution in projection units
//! per pixel, projects the geographic center, and computes the extent that
//! exactly contains the requested output at that resolution with rotation 0.
//!
//! All layer renderers of a job share the frame's tile queue so that fetch
//! prioritization (center of viewport first) is coordinated job-wide.

use std::sync::Arc;

use crate::error::PrintError;
use crate::projection::{Projection, ProjectionRegistry};
use crate::spec::PrintSpec;
use crate::tile::TileQueue;

/// Inches per meter, the constant linking scale denominators to DPI.
pub const INCHES_PER_METER: f64 = 39.3701;

/// Axis-aligned rectangle in projected coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent {
    /// Minimum x (west edge).
    pub min_x: f64,
    /// Minimum y (south edge).
    pub min_y: f64,
    /// Maximum x (east edge).
    pub max_x: f64,
    /// Maximum y (north edge).
    pub max_y: f64,
}

impl Extent {
    /// Builds the extent centered on `center` spanning `width_px` x
    /// `height_px` pixels at `resolution` units per pixel.
    pub fn for_view(center: (f64, f64), resolution: f64, width_px: u32, height_px: u32) -> Self {
        let half_w = width_px as f64 * resolution / 2.0;
        let half_h = height_px as f64 * resolution / 2.0;
        Self {
            min_x: center.0 - half_w,
            min_y: center.1 - half_h,
            max_x: center.0 + half_w,
            max_y: center.1 + half_h,
        }
    }

    /// Extent width in projection units.
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Extent height in projection units.
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Extent center.
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }
}

/// Resolved viewport parameters shared by all layer renderers of one job.
#[derive(Debug, Clone)]
pub struct FrameState {
    /// Resolved projection of the job.
    pub projection: Arc<Projection>,
    /// Geographic center retained from the spec (lon, lat degrees).
    pub lon_lat_center: [f64; 2],
    /// Projected center in native units.
    pub center: (f64, f64),
    /// Resolution in projection units per output pixel.
    pub resolution: f64,
    /// Projected extent containing the output exactly.
    pub extent: Extent,
    /// Output width in pixels.
    pub width_px: u32,
    /// Output height in pixels.
    pub height_px: u32,
    /// Shared fetch queue for every layer renderer of this job.
    pub tile_queue: Arc<TileQueue>,
}

/// Builds the frame state for a spec.
///
/// Fails with [`PrintError::UnknownProjection`] if the projection cannot be
/// resolved (registering the spec's inline definition first when one is
/// supplied) and with [`PrintError::InvalidSpec`] if the size does not
/// convert to positive pixels. No job state exists until this succeeds.
pub fn build_frame_state(
    spec: &PrintSpec,
    projections: &ProjectionRegistry,
) -> Result<FrameState, PrintError> {
    let projection = projections.resolve(&spec.projection, spec.projection_definition.as_ref())?;
    let (width_px, height_px) = spec.size.to_pixels(spec.dpi)?;

    let resolution = spec.scale / spec.dpi / INCHES_PER_METER / projection.meters_per_unit();
    let center = projection.from_lon_lat(spec.center[0], spec.center[1]);
    let extent = Extent::for_view(center, resolution, width_px, height_px);

    Ok(FrameState {
        projection,
        lon_lat_center: spec.center,
        center,
        resolution,
        extent,
        width_px,
        height_px,
        tile_queue: TileQueue::new(),
    })
}
