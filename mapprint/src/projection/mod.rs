//! Projection registry.
//!
//! Process-wide, append-only registry of coordinate reference systems. It is
//! seeded with the built-in Web Mercator and geographic projections and can
//! be extended at runtime with proj4-style definitions via [`ProjectionRegistry::register`].
//! Registration is idempotent: registering a code that already exists is a
//! no-op and never mutates the existing entry.
//!
//! The registry is handed around as `Arc<ProjectionRegistry>` rather than
//! living in a global, so multiple orchestrators in one process do not share
//! state unless they choose to, and tests can build throwaway registries.
//!
//! # Example
//!
//! ```
//! use mapprint::projection::{ProjectionDefinition, ProjectionRegistry};
//!
//! let registry = ProjectionRegistry::with_builtins();
//! let mercator = registry.get("EPSG:3857").unwrap();
//! let (x, y) = mercator.from_lon_lat(12.0, 48.0);
//! assert!(x > 1_300_000.0 && y > 6_000_000.0);
//!
//! registry
//!     .register(&ProjectionDefinition {
//!         name: "EPSG:2154".to_string(),
//!         proj4_definition: "+proj=lcc +lat_1=49 +lat_2=44 +lat_0=46.5 +lon_0=3 \
//!                            +x_0=700000 +y_0=6600000 +ellps=GRS80 +units=m"
//!             .to_string(),
//!         bbox: [-9.86, 41.15, 10.38, 51.56],
//!     })
//!     .unwrap();
//! assert!(registry.get("EPSG:2154").is_some());
//! ```

mod proj4;

pub use proj4::{Ellipsoid, TransformKind};

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::PrintError;

/// Meters per degree at the authalic sphere, used as the meters-per-unit of
/// geographic (degree-based) projections.
pub const METERS_PER_DEGREE: f64 = 2.0 * std::f64::consts::PI * 6_370_997.0 / 360.0;

/// A projection definition submitted through the public API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionDefinition {
    /// Projection name as `prefix:code`, e.g. `EPSG:2154`.
    pub name: String,
    /// proj4-style definition string.
    pub proj4_definition: String,
    /// Validity extent as `[min_lon, min_lat, max_lon, max_lat]` degrees.
    pub bbox: [f64; 4],
}

/// A resolved projection: forward transform plus unit metadata.
#[derive(Debug)]
pub struct Projection {
    code: String,
    transform: TransformKind,
    meters_per_unit: f64,
    bbox: Option<[f64; 4]>,
}

impl Projection {
    /// Returns the projection code, e.g. `EPSG:3857`.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Returns meters per native projection unit.
    pub fn meters_per_unit(&self) -> f64 {
        self.meters_per_unit
    }

    /// Returns the validity extent in degrees, if one was registered.
    pub fn bbox(&self) -> Option<[f64; 4]> {
        self.bbox
    }

    /// Projects geographic coordinates (degrees) to native units.
    pub fn from_lon_lat(&self, lon: f64, lat: f64) -> (f64, f64) {
        self.transform.forward(lon, lat)
    }
}

/// Append-only map of projection code to resolved projection.
pub struct ProjectionRegistry {
    inner: RwLock<HashMap<String, Arc<Projection>>>,
}

impl ProjectionRegistry {
    /// Creates a registry seeded with the built-in projections:
    /// `EPSG:3857` (and its `EPSG:900913` alias) and `EPSG:4326`/`CRS:84`.
    pub fn with_builtins() -> Self {
        let mut map = HashMap::new();
        for code in ["EPSG:3857", "EPSG:900913"] {
            map.insert(
                code.to_string(),
                Arc::new(Projection {
                    code: code.to_string(),
                    transform: TransformKind::web_mercator(),
                    meters_per_unit: 1.0,
                    bbox: Some([-180.0, -85.06, 180.0, 85.06]),
                }),
            );
        }
        for code in ["EPSG:4326", "CRS:84"] {
            map.insert(
                code.to_string(),
                Arc::new(Projection {
                    code: code.to_string(),
                    transform: TransformKind::LonLat,
                    meters_per_unit: METERS_PER_DEGREE,
                    bbox: Some([-180.0, -90.0, 180.0, 90.0]),
                }),
            );
        }
        Self {
            inner: RwLock::new(map),
        }
    }

    /// Looks up a projection by code.
    pub fn get(&self, code: &str) -> Option<Arc<Projection>> {
        self.inner.read().get(code).cloned()
    }

    /// Registers a projection from a proj4-style definition.
    ///
    /// Idempotent: if the code is already registered this is a no-op and the
    /// existing entry is left untouched. Fails with
    /// [`PrintError::UnknownProjection`] when the definition cannot be
    /// parsed or uses a projection family the crate cannot transform.
    pub fn register(&self, definition: &ProjectionDefinition) -> Result<(), PrintError> {
        if self.inner.read().contains_key(&definition.name) {
            return Ok(());
        }
        let (transform, meters_per_unit) = proj4::parse(&definition.proj4_definition)
            .map_err(|e| {
                PrintError::UnknownProjection(format!("{}: {}", definition.name, e))
            })?;
        let projection = Arc::new(Projection {
            code: definition.name.clone(),
            transform,
            meters_per_unit,
            bbox: Some(definition.bbox),
        });
        // Double-checked under the write lock so concurrent registration of
        // the same code keeps the first entry.
        let mut map = self.inner.write();
        map.entry(definition.name.clone()).or_insert(projection);
        debug!(code = %definition.name, "projection registered");
        Ok(())
    }

    /// Resolves a projection code, registering `inline` first if the code is
    /// unknown and a definition was supplied.
    ///
    /// This is the Frame State Builder's entry point: it fails with
    /// [`PrintError::UnknownProjection`] before any job state exists.
    pub fn resolve(
        &self,
        code: &str,
        inline: Option<&ProjectionDefinition>,
    ) -> Result<Arc<Projection>, PrintError> {
        if let Some(projection) = self.get(code) {
            return Ok(projection);
        }
        if let Some(definition) = inline {
            if definition.name == code {
                self.register(definition)?;
                if let Some(projection) = self.get(code) {
                    return Ok(projection);
                }
            }
        }
        Err(PrintError::UnknownProjection(code.to_string()))
    }
}

impl Default for ProjectionRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for ProjectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectionRegistry")
            .field("codes", &self.inner.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lambert93() -> ProjectionDefinition {
        ProjectionDefinition {
            name: "EPSG:2154".to_string(),
            proj4_definition: "+proj=lcc +lat_1=49 +lat_2=44 +lat_0=46.5 +lon_0=3 \
                               +x_0=700000 +y_0=6600000 +ellps=GRS80 +units=m +no_defs"
                .to_string(),
            bbox: [-9.86, 41.15, 10.38, 51.56],
        }
    }

    #[test]
    fn test_builtins_present() {
        let registry = ProjectionRegistry::with_builtins();
        assert!(registry.get("EPSG:3857").is_some());
        assert!(registry.get("EPSG:900913").is_some());
        assert!(registry.get("EPSG:4326").is_some());
        assert!(registry.get("CRS:84").is_some());
        assert!(registry.get("EPSG:999999").is_none());
    }

    #[test]
    fn test_register_and_resolve() {
        let registry = ProjectionRegistry::with_builtins();
        registry.register(&lambert93()).unwrap();

        let projection = registry.resolve("EPSG:2154", None).unwrap();
        assert_eq!(projection.code(), "EPSG:2154");
        assert_eq!(projection.meters_per_unit(), 1.0);

        // Projecting the projection origin lands exactly on the false origin.
        let (x, y) = projection.from_lon_lat(3.0, 46.5);
        assert!((x - 700_000.0).abs() < 1e-6, "x = {}", x);
        assert!((y - 6_600_000.0).abs() < 1e-6, "y = {}", y);
    }

    #[test]
    fn test_register_is_idempotent() {
        let registry = ProjectionRegistry::with_builtins();
        registry.register(&lambert93()).unwrap();
        let first = registry.get("EPSG:2154").unwrap();

        let mut second = lambert93();
        second.proj4_definition = "+proj=longlat".to_string();
        registry.register(&second).unwrap();

        // The original entry survives re-registration.
        let after = registry.get("EPSG:2154").unwrap();
        assert!(Arc::ptr_eq(&first, &after));
    }

    #[test]
    fn test_resolve_with_inline_definition() {
        let registry = ProjectionRegistry::with_builtins();
        let projection = registry
            .resolve("EPSG:2154", Some(&lambert93()))
            .unwrap();
        assert_eq!(projection.code(), "EPSG:2154");
        // Subsequent resolves hit the registered entry.
        assert!(registry.get("EPSG:2154").is_some());
    }

    #[test]
    fn test_resolve_unknown_fails() {
        let registry = ProjectionRegistry::with_builtins();
        let err = registry.resolve("EPSG:999999", None).unwrap_err();
        assert!(matches!(err, PrintError::UnknownProjection(_)));
    }

    #[test]
    fn test_unparseable_definition_fails() {
        let registry = ProjectionRegistry::with_builtins();
        let definition = ProjectionDefinition {
            name: "EPSG:27700".to_string(),
            proj4_definition: "+proj=somethingelse +units=m".to_string(),
            bbox: [-8.82, 49.79, 1.92, 60.94],
        };
        let err = registry.register(&definition).unwrap_err();
        assert!(matches!(err, PrintError::UnknownProjection(_)));
    }

    #[test]
    fn test_degree_projection_meters_per_unit() {
        let registry = ProjectionRegistry::with_builtins();
        let wgs84 = registry.get("EPSG:4326").unwrap();
        assert!((wgs84.meters_per_unit() - METERS_PER_DEGREE).abs() < 1e-9);
        // Geographic projection passes coordinates through.
        assert_eq!(wgs84.from_lon_lat(12.0, 48.0), (12.0, 48.0));
    }
}
