//! Tile planning and the per-job fetch queue.
//!
//! The grid functions turn a frame's extent into the concrete set of tile
//! or image fetches a layer needs, each with a destination rectangle on the
//! output canvas and a distance from the viewport center. [`TileQueue`] sequences
//! those fetches job-wide so that the center of the viewport loads first
//! regardless of which layer a fetch belongs to.

mod grid;
mod queue;

pub use grid::{
    canvas_grid, mercator_coverage, zoom_for_resolution, MercatorTile, MAX_TILE_ZOOM,
    TILE_SIZE_PX,
};
pub use queue::{spawn_fetch_workers, FetchOutcome, QueuedFetch, TileQueue};

/// XYZ tile coordinate (Web Mercator grid, origin top-left).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCoord {
    /// Column, increasing eastward.
    pub x: u32,
    /// Row, increasing southward.
    pub y: u32,
    /// Zoom level.
    pub z: u8,
}

/// Destination rectangle on the output canvas, in pixels.
///
/// The origin may be negative and the rectangle may extend past the canvas;
/// drawing clips to the canvas bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    /// Left edge in canvas pixels.
    pub x: i64,
    /// Top edge in canvas pixels.
    pub y: i64,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl PixelRect {
    /// Center of the rectangle in canvas pixels.
    pub fn center(&self) -> (f64, f64) {
        (
            self.x as f64 + self.width as f64 / 2.0,
            self.y as f64 + self.height as f64 / 2.0,
        )
    }

    /// Euclidean distance from this rectangle's center to a point.
    pub fn distance_to(&self, point: (f64, f64)) -> f64 {
        let (cx, cy) = self.center();
        ((cx - point.0).powi(2) + (cy - point.1).powi(2)).sqrt()
    }
}

/// One planned fetch of a layer: a URL plus where its pixels land.
#[derive(Debug, Clone)]
pub struct PlannedFetch {
    /// Fully expanded request URL.
    pub url: String,
    /// Where the fetched image is drawn on the layer canvas.
    pub dest: PixelRect,
    /// Distance from the viewport center in canvas pixels, for queue
    /// prioritization.
    pub distance: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_rect_center() {
        let rect = PixelRect {
            x: 10,
            y: 20,
            width: 100,
            height: 50,
        };
        assert_eq!(rect.center(), (60.0, 45.0));
    }

    #[test]
    fn test_pixel_rect_distance() {
        let rect = PixelRect {
            x: 0,
            y: 0,
            width: 10,
            height: 10,
        };
        assert!((rect.distance_to((5.0, 5.0))).abs() < 1e-9);
        assert!((rect.distance_to((8.0, 9.0)) - 5.0).abs() < 1e-9);
    }
}
