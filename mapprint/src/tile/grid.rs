//! Tile coverage math.
//!
//! XYZ layers live on the standard Web Mercator tile grid, so their
//! coverage is computed in EPSG:3857 meters around the job's geographic
//! center, independent of the frame's own projection. Tiled WMS layers have
//! no fixed grid; the output canvas is simply cut into cells and each cell
//! becomes one GetMap request in the frame projection.

use crate::frame::{Extent, FrameState};
use crate::projection::TransformKind;
use crate::tile::{PixelRect, TileCoord};

/// Pixel size of a Web Mercator tile.
pub const TILE_SIZE_PX: u32 = 256;

/// Deepest zoom level considered when matching a resolution.
pub const MAX_TILE_ZOOM: u8 = 19;

/// Half the Web Mercator world width in meters.
const HALF_WORLD: f64 = 20_037_508.342_789_244;

/// Ground resolution of zoom 0 in meters per pixel (world width / 256).
const ZOOM0_RESOLUTION: f64 = 2.0 * HALF_WORLD / TILE_SIZE_PX as f64;

/// One XYZ tile intersecting the viewport.
#[derive(Debug, Clone)]
pub struct MercatorTile {
    /// Tile coordinate.
    pub coord: TileCoord,
    /// Destination rectangle on the output canvas.
    pub dest: PixelRect,
    /// Distance from the canvas center in pixels.
    pub distance: f64,
}

/// Picks the tile zoom level whose ground resolution is closest to the
/// requested resolution (in meters per pixel).
pub fn zoom_for_resolution(meters_per_pixel: f64) -> u8 {
    if meters_per_pixel <= 0.0 {
        return MAX_TILE_ZOOM;
    }
    let zoom = (ZOOM0_RESOLUTION / meters_per_pixel).log2().round();
    zoom.clamp(0.0, MAX_TILE_ZOOM as f64) as u8
}

/// Computes the XYZ tiles covering the frame's viewport.
///
/// The coverage is computed on the Web Mercator grid around the frame's
/// geographic center at the frame's ground resolution. When the frame
/// projection is not Web Mercator the tiles are placed by ground distance
/// rather than reprojected pixel-by-pixel; raster reprojection is out of
/// scope.
pub fn mercator_coverage(frame: &FrameState) -> Vec<MercatorTile> {
    let meters_per_pixel = frame.resolution * frame.projection.meters_per_unit();
    let zoom = zoom_for_resolution(meters_per_pixel);
    let tiles_across = 1u32 << zoom;

    let mercator = TransformKind::web_mercator();
    let center = mercator.forward(frame.lon_lat_center[0], frame.lon_lat_center[1]);
    let extent = Extent::for_view(center, meters_per_pixel, frame.width_px, frame.height_px);

    let tile_span = ZOOM0_RESOLUTION / f64::from(tiles_across) * TILE_SIZE_PX as f64;
    let canvas_center = (frame.width_px as f64 / 2.0, frame.height_px as f64 / 2.0);

    let col_of = |x: f64| ((x + HALF_WORLD) / tile_span).floor();
    let row_of = |y: f64| ((HALF_WORLD - y) / tile_span).floor();

    let max_index = f64::from(tiles_across - 1);
    let first_col = col_of(extent.min_x).clamp(0.0, max_index) as u32;
    let last_col = col_of(extent.max_x - 1e-9).clamp(0.0, max_index) as u32;
    let first_row = row_of(extent.max_y).clamp(0.0, max_index) as u32;
    let last_row = row_of(extent.min_y + 1e-9).clamp(0.0, max_index) as u32;

    // Edges are rounded independently, with the same expression for a
    // tile's right edge and its neighbor's left edge, so adjacent tiles
    // share exact pixel boundaries and the canvas shows no seams.
    let x_edge = |col: u32| {
        ((-HALF_WORLD + f64::from(col) * tile_span - extent.min_x) / meters_per_pixel).round()
            as i64
    };
    let y_edge = |row: u32| {
        ((extent.max_y - (HALF_WORLD - f64::from(row) * tile_span)) / meters_per_pixel).round()
            as i64
    };

    let mut tiles = Vec::new();
    for y in first_row..=last_row {
        for x in first_col..=last_col {
            let (left, right) = (x_edge(x), x_edge(x + 1));
            let (top, bottom) = (y_edge(y), y_edge(y + 1));

            let dest = PixelRect {
                x: left,
                y: top,
                width: (right - left).max(1) as u32,
                height: (bottom - top).max(1) as u32,
            };
            tiles.push(MercatorTile {
                coord: TileCoord { x, y, z: zoom },
                distance: dest.distance_to(canvas_center),
                dest,
            });
        }
    }
    tiles
}

/// Cuts the output canvas into cells of at most `cell_px` pixels.
///
/// Returns each cell's extent in the frame projection together with its
/// destination rectangle; used for tiled WMS requests.
pub fn canvas_grid(frame: &FrameState, cell_px: u32) -> Vec<(Extent, PixelRect, f64)> {
    let cell_px = cell_px.max(1);
    let canvas_center = (frame.width_px as f64 / 2.0, frame.height_px as f64 / 2.0);

    let mut cells = Vec::new();
    let mut py = 0u32;
    while py < frame.height_px {
        let cell_h = cell_px.min(frame.height_px - py);
        let mut px = 0u32;
        while px < frame.width_px {
            let cell_w = cell_px.min(frame.width_px - px);
            let extent = Extent {
                min_x: frame.extent.min_x + f64::from(px) * frame.resolution,
                max_x: frame.extent.min_x + f64::from(px + cell_w) * frame.resolution,
                min_y: frame.extent.max_y - f64::from(py + cell_h) * frame.resolution,
                max_y: frame.extent.max_y - f64::from(py) * frame.resolution,
            };
            let dest = PixelRect {
                x: i64::from(px),
                y: i64::from(py),
                width: cell_w,
                height: cell_h,
            };
            cells.push((extent, dest, dest.distance_to(canvas_center)));
            px += cell_w;
        }
        py += cell_h;
    }
    cells
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::ProjectionRegistry;
    use crate::spec::{Layer, OutputSize, PrintSpec};

    fn frame(scale: f64) -> FrameState {
        let registry = ProjectionRegistry::with_builtins();
        let spec = PrintSpec {
            layers: vec![Layer::Xyz {
                url: "https://tiles.example.com/{z}/{x}/{y}.png".to_string(),
                opacity: 1.0,
            }],
            size: OutputSize::pixels(800.0, 600.0),
            center: [12.0, 48.0],
            dpi: 200.0,
            scale,
            projection: "EPSG:3857".to_string(),
            projection_definition: None,
        };
        crate::frame::build_frame_state(&spec, &registry).unwrap()
    }

    #[test]
    fn test_zoom_for_resolution() {
        // Zoom 0 resolution maps to zoom 0.
        assert_eq!(zoom_for_resolution(ZOOM0_RESOLUTION), 0);
        // Halving the resolution increases the zoom by one.
        assert_eq!(zoom_for_resolution(ZOOM0_RESOLUTION / 2.0), 1);
        assert_eq!(zoom_for_resolution(ZOOM0_RESOLUTION / 4.0), 2);
        // Far beyond the deepest level clamps.
        assert_eq!(zoom_for_resolution(0.001), MAX_TILE_ZOOM);
    }

    #[test]
    fn test_coverage_spans_canvas() {
        let frame = frame(40_000_000.0);
        let tiles = mercator_coverage(&frame);
        assert!(!tiles.is_empty());

        // Union of destination rectangles covers the whole canvas.
        let min_x = tiles.iter().map(|t| t.dest.x).min().unwrap();
        let min_y = tiles.iter().map(|t| t.dest.y).min().unwrap();
        let max_x = tiles
            .iter()
            .map(|t| t.dest.x + i64::from(t.dest.width))
            .max()
            .unwrap();
        let max_y = tiles
            .iter()
            .map(|t| t.dest.y + i64::from(t.dest.height))
            .max()
            .unwrap();
        assert!(min_x <= 0 && min_y <= 0);
        assert!(max_x >= i64::from(frame.width_px));
        assert!(max_y >= i64::from(frame.height_px));
    }

    #[test]
    fn test_coverage_tiles_share_zoom_and_are_unique() {
        let frame = frame(40_000_000.0);
        let tiles = mercator_coverage(&frame);
        let zoom = tiles[0].coord.z;
        assert!(tiles.iter().all(|t| t.coord.z == zoom));

        let mut coords: Vec<_> = tiles.iter().map(|t| t.coord).collect();
        coords.sort_by_key(|c| (c.y, c.x));
        coords.dedup();
        assert_eq!(coords.len(), tiles.len());
    }

    #[test]
    fn test_center_tile_is_closest() {
        let frame = frame(40_000_000.0);
        let tiles = mercator_coverage(&frame);
        let closest = tiles
            .iter()
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
            .unwrap();
        // The closest tile's rectangle contains the canvas center.
        let (cx, cy) = (frame.width_px as f64 / 2.0, frame.height_px as f64 / 2.0);
        assert!(closest.dest.x as f64 <= cx);
        assert!(closest.dest.y as f64 <= cy);
        assert!(closest.dest.x as f64 + f64::from(closest.dest.width) >= cx);
        assert!(closest.dest.y as f64 + f64::from(closest.dest.height) >= cy);
    }

    #[test]
    fn test_canvas_grid_partitions_output() {
        let frame = frame(40_000_000.0);
        let cells = canvas_grid(&frame, 256);
        // 800x600 at 256 px cells: 4 columns x 3 rows.
        assert_eq!(cells.len(), 12);

        let area: u64 = cells
            .iter()
            .map(|(_, d, _)| u64::from(d.width) * u64::from(d.height))
            .sum();
        assert_eq!(area, 800 * 600);

        // Cell extents sit inside the frame extent.
        for (extent, _, _) in &cells {
            assert!(extent.min_x >= frame.extent.min_x - 1e-6);
            assert!(extent.max_x <= frame.extent.max_x + 1e-6);
            assert!(extent.min_y >= frame.extent.min_y - 1e-6);
            assert!(extent.max_y <= frame.extent.max_y + 1e-6);
        }
    }

    #[test]
    fn test_canvas_grid_single_cell_for_small_output() {
        let registry = ProjectionRegistry::with_builtins();
        let spec = PrintSpec {
            layers: vec![Layer::Xyz {
                url: "https://tiles.example.com/{z}/{x}/{y}.png".to_string(),
                opacity: 1.0,
            }],
            size: OutputSize::pixels(100.0, 80.0),
            center: [0.0, 0.0],
            dpi: 96.0,
            scale: 1_000_000.0,
            projection: "EPSG:3857".to_string(),
            projection_definition: None,
        };
        let frame = crate::frame::build_frame_state(&spec, &registry).unwrap();
        let cells = canvas_grid(&frame, 256);
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].1.width, 100);
        assert_eq!(cells[0].1.height, 80);
    }
}
