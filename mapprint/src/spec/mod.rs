//! Print specification types.
//!
//! A [`PrintSpec`] declares everything a print job needs: the layers to
//! render (bottom to top), the output size, the geographic center, DPI,
//! scale denominator and projection. Specs are immutable once submitted and
//! are retained verbatim on every status snapshot of the job they start.
//!
//! # Example
//!
//! ```
//! use mapprint::spec::{Layer, OutputSize, PrintSpec};
//!
//! let spec = PrintSpec {
//!     layers: vec![Layer::Xyz {
//!         url: "https://{a-c}.tile.openstreetmap.org/{z}/{x}/{y}.png".to_string(),
//!         opacity: 1.0,
//!     }],
//!     size: OutputSize::pixels(800.0, 600.0),
//!     center: [12.0, 48.0],
//!     dpi: 200.0,
//!     scale: 40_000_000.0,
//!     projection: "EPSG:3857".to_string(),
//!     projection_definition: None,
//! };
//! assert!(spec.validate().is_ok());
//! ```

mod size;

pub use size::{OutputSize, SizeUnit};

use serde::{Deserialize, Serialize};

use crate::error::PrintError;
use crate::projection::ProjectionDefinition;

fn default_opacity() -> f64 {
    1.0
}

/// One renderable map source contributing pixels to a job's output.
///
/// Layers are rendered bottom to top in spec order: later layers are drawn
/// over earlier ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Layer {
    /// A Web Map Service layer, requested either as a single GetMap image
    /// covering the whole output or as a grid of tiles.
    #[serde(rename = "WMS")]
    Wms {
        /// Base URL of the WMS endpoint.
        url: String,
        /// Layer name passed as the `LAYERS` parameter.
        layer: String,
        /// Opacity from 0 (hidden) to 1 (fully visible).
        #[serde(default = "default_opacity")]
        opacity: f64,
        /// Whether to request the layer as tiles instead of one image.
        #[serde(default)]
        tiled: bool,
    },

    /// An XYZ tile layer. The URL template may contain `{x}`, `{y}`, `{z}`
    /// and subdomain-rotation tokens such as `{a-c}`.
    #[serde(rename = "XYZ")]
    Xyz {
        /// URL template for individual tiles.
        url: String,
        /// Opacity from 0 (hidden) to 1 (fully visible).
        #[serde(default = "default_opacity")]
        opacity: f64,
    },
}

impl Layer {
    /// Returns the layer opacity.
    pub fn opacity(&self) -> f64 {
        match self {
            Layer::Wms { opacity, .. } | Layer::Xyz { opacity, .. } => *opacity,
        }
    }
}

/// A declarative map-print request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintSpec {
    /// Layers to render, bottom to top.
    pub layers: Vec<Layer>,

    /// Output size; `[width, height]` in pixels or `[width, height, unit]`.
    pub size: OutputSize,

    /// Longitude and latitude of the map center, in degrees.
    pub center: [f64; 2],

    /// Dots per inch; 96 for a screen, 300 for a detailed print.
    pub dpi: f64,

    /// Scale denominator (e.g. 40_000_000 for 1:40M).
    pub scale: f64,

    /// Projection code, e.g. `EPSG:3857`.
    pub projection: String,

    /// Optional inline definition registered before the projection is
    /// resolved, for codes the registry does not know yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projection_definition: Option<ProjectionDefinition>,
}

impl PrintSpec {
    /// Validates the spec.
    ///
    /// Checks the invariants that must hold before a job may be created:
    /// non-empty layer list, positive size, positive dpi and scale, and
    /// opacity within `[0, 1]` for every layer.
    pub fn validate(&self) -> Result<(), PrintError> {
        if self.layers.is_empty() {
            return Err(PrintError::InvalidSpec("layer list is empty".to_string()));
        }
        if self.size.width <= 0.0 || self.size.height <= 0.0 {
            return Err(PrintError::InvalidSpec(format!(
                "output size must be positive, got {}x{}",
                self.size.width, self.size.height
            )));
        }
        if self.dpi <= 0.0 {
            return Err(PrintError::InvalidSpec(format!(
                "dpi must be positive, got {}",
                self.dpi
            )));
        }
        if self.scale <= 0.0 {
            return Err(PrintError::InvalidSpec(format!(
                "scale must be positive, got {}",
                self.scale
            )));
        }
        for (index, layer) in self.layers.iter().enumerate() {
            let opacity = layer.opacity();
            if !(0.0..=1.0).contains(&opacity) {
                return Err(PrintError::InvalidSpec(format!(
                    "layer {} opacity {} is outside [0, 1]",
                    index, opacity
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn osm_spec() -> PrintSpec {
        PrintSpec {
            layers: vec![Layer::Xyz {
                url: "https://{a-c}.tile.openstreetmap.org/{z}/{x}/{y}.png".to_string(),
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

    #[test]
    fn test_valid_spec() {
        assert!(osm_spec().validate().is_ok());
    }

    #[test]
    fn test_empty_layers_rejected() {
        let mut spec = osm_spec();
        spec.layers.clear();
        assert!(matches!(
            spec.validate(),
            Err(PrintError::InvalidSpec(_))
        ));
    }

    #[test]
    fn test_non_positive_size_rejected() {
        let mut spec = osm_spec();
        spec.size = OutputSize::pixels(0.0, 600.0);
        assert!(spec.validate().is_err());

        spec.size = OutputSize::pixels(800.0, -1.0);
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_out_of_range_opacity_rejected() {
        let mut spec = osm_spec();
        spec.layers = vec![Layer::Xyz {
            url: "https://tiles.example.com/{z}/{x}/{y}.png".to_string(),
            opacity: 1.5,
        }];
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_wms_layer_defaults() {
        let json = r#"{
            "type": "WMS",
            "url": "https://ows.mundialis.de/services/service",
            "layer": "TOPO-OSM-WMS"
        }"#;
        let layer: Layer = serde_json::from_str(json).unwrap();
        match layer {
            Layer::Wms {
                opacity, tiled, ..
            } => {
                assert_eq!(opacity, 1.0);
                assert!(!tiled);
            }
            _ => panic!("expected WMS layer"),
        }
    }

    #[test]
    fn test_spec_roundtrip() {
        let spec = osm_spec();
        let json = serde_json::to_string(&spec).unwrap();
        let back: PrintSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back.layers.len(), 1);
        assert_eq!(back.center, [12.0, 48.0]);
        assert_eq!(back.projection, "EPSG:3857");
    }

    #[test]
    fn test_spec_from_preset_json() {
        // Mirrors the shape a browser client would submit.
        let json = r#"{
            "layers": [
                {"type": "XYZ", "url": "https://{a-c}.tile.openstreetmap.org/{z}/{x}/{y}.png"}
            ],
            "size": [800, 600],
            "center": [12, 48],
            "dpi": 200,
            "scale": 40000000,
            "projection": "EPSG:3857"
        }"#;
        let spec: PrintSpec = serde_json::from_str(json).unwrap();
        assert!(spec.validate().is_ok());
        assert_eq!(spec.layers[0].opacity(), 1.0);
        assert_eq!(spec.size.unit, SizeUnit::Px);
    }
}
