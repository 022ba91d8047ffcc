//! WMS GetMap request URLs.
//!
//! # URL Pattern
//!
//! `{base}?SERVICE=WMS&VERSION=1.1.1&REQUEST=GetMap&LAYERS={layer}&...`
//!
//! Requests use WMS 1.1.1: the `SRS` parameter and an always-lon/lat BBOX
//! axis order, which every mainstream server accepts and which sidesteps
//! the 1.3.0 per-CRS axis-order rules.

use crate::frame::Extent;

/// Builds GetMap URLs for one WMS layer.
#[derive(Debug, Clone)]
pub struct WmsSource {
    base_url: String,
    layer: String,
}

impl WmsSource {
    /// Creates a source for `layer` served at `base_url`.
    pub fn new(base_url: impl Into<String>, layer: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            layer: layer.into(),
        }
    }

    /// Builds the GetMap URL for a bounding box rendered at
    /// `width` x `height` pixels in the given SRS.
    pub fn get_map_url(&self, extent: &Extent, width: u32, height: u32, srs: &str) -> String {
        let separator = if self.base_url.contains('?') { '&' } else { '?' };
        format!(
            "{base}{separator}SERVICE=WMS&VERSION=1.1.1&REQUEST=GetMap&LAYERS={layer}&STYLES=\
             &SRS={srs}&BBOX={min_x},{min_y},{max_x},{max_y}&WIDTH={width}&HEIGHT={height}\
             &FORMAT=image/png&TRANSPARENT=TRUE",
            base = self.base_url,
            separator = separator,
            layer = self.layer,
            srs = srs,
            min_x = extent.min_x,
            min_y = extent.min_y,
            max_x = extent.max_x,
            max_y = extent.max_y,
            width = width,
            height = height,
        )
    }
}
