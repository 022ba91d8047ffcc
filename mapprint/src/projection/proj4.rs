//! Minimal proj4 definition parsing and forward transforms.
//!
//! Supports the projection families print specs actually reference:
//! `longlat`, `merc` (spherical Web Mercator), `tmerc` (ellipsoidal
//! transverse Mercator, which covers the UTM zones) and `lcc` (ellipsoidal
//! Lambert conformal conic, one or two standard parallels). Forward
//! transforms only; the orchestrator never needs the inverse.
//!
//! Formulas follow Snyder, "Map Projections: A Working Manual" (USGS
//! Professional Paper 1395), chapters 7, 8 and 15.

use std::collections::HashMap;
use std::f64::consts::FRAC_PI_4;
use std::fmt;

use super::METERS_PER_DEGREE;

/// Web Mercator sphere radius (WGS84 semi-major axis).
const WEB_MERCATOR_RADIUS: f64 = 6_378_137.0;

/// Errors from parsing a proj4 definition string.
#[derive(Debug)]
pub(crate) enum Proj4Error {
    /// The definition has no `+proj=` parameter.
    MissingProj,
    /// The `+proj=` family is not supported.
    UnsupportedProj(String),
    /// A numeric parameter failed to parse.
    BadNumber(String, String),
    /// The named ellipsoid is not known.
    UnknownEllipsoid(String),
    /// The `+units=` value is not known.
    UnknownUnits(String),
}

impl fmt::Display for Proj4Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Proj4Error::MissingProj => write!(f, "definition has no +proj parameter"),
            Proj4Error::UnsupportedProj(p) => write!(f, "unsupported projection '+proj={}'", p),
            Proj4Error::BadNumber(key, value) => {
                write!(f, "parameter +{}={} is not a number", key, value)
            }
            Proj4Error::UnknownEllipsoid(e) => write!(f, "unknown ellipsoid '{}'", e),
            Proj4Error::UnknownUnits(u) => write!(f, "unknown units '{}'", u),
        }
    }
}

impl std::error::Error for Proj4Error {}

/// Reference ellipsoid as semi-major axis and flattening.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ellipsoid {
    /// Semi-major axis in meters.
    pub a: f64,
    /// Flattening (0 for a sphere).
    pub f: f64,
}

impl Ellipsoid {
    /// WGS84 ellipsoid.
    pub const WGS84: Ellipsoid = Ellipsoid {
        a: 6_378_137.0,
        f: 1.0 / 298.257_223_563,
    };

    /// GRS80 ellipsoid.
    pub const GRS80: Ellipsoid = Ellipsoid {
        a: 6_378_137.0,
        f: 1.0 / 298.257_222_101,
    };

    /// First eccentricity squared.
    fn e2(&self) -> f64 {
        self.f * (2.0 - self.f)
    }

    /// First eccentricity.
    fn e(&self) -> f64 {
        self.e2().sqrt()
    }
}

/// Forward transform of a projection.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformKind {
    /// Geographic coordinates pass through in degrees.
    LonLat,

    /// Spherical Mercator on the given radius.
    Mercator {
        /// Sphere radius in meters.
        radius: f64,
    },

    /// Ellipsoidal transverse Mercator.
    TransverseMercator {
        /// Reference ellipsoid.
        ellipsoid: Ellipsoid,
        /// Central meridian scale factor.
        k0: f64,
        /// Latitude of origin, degrees.
        lat0: f64,
        /// Central meridian, degrees.
        lon0: f64,
        /// False easting, meters.
        x0: f64,
        /// False northing, meters.
        y0: f64,
    },

    /// Ellipsoidal Lambert conformal conic.
    LambertConformalConic {
        /// Reference ellipsoid.
        ellipsoid: Ellipsoid,
        /// First standard parallel, degrees.
        lat1: f64,
        /// Second standard parallel, degrees.
        lat2: f64,
        /// Latitude of false origin, degrees.
        lat0: f64,
        /// Central meridian, degrees.
        lon0: f64,
        /// False easting, meters.
        x0: f64,
        /// False northing, meters.
        y0: f64,
    },
}

impl TransformKind {
    /// The standard EPSG:3857 transform.
    pub fn web_mercator() -> Self {
        TransformKind::Mercator {
            radius: WEB_MERCATOR_RADIUS,
        }
    }

    /// Projects geographic coordinates (degrees) to native units.
    pub fn forward(&self, lon: f64, lat: f64) -> (f64, f64) {
        match self {
            TransformKind::LonLat => (lon, lat),
            TransformKind::Mercator { radius } => {
                let x = radius * lon.to_radians();
                let y = radius * (FRAC_PI_4 + lat.to_radians() / 2.0).tan().ln();
                (x, y)
            }
            TransformKind::TransverseMercator {
                ellipsoid,
                k0,
                lat0,
                lon0,
                x0,
                y0,
            } => tmerc_forward(*ellipsoid, *k0, *lat0, *lon0, *x0, *y0, lon, lat),
            TransformKind::LambertConformalConic {
                ellipsoid,
                lat1,
                lat2,
                lat0,
                lon0,
                x0,
                y0,
            } => lcc_forward(*ellipsoid, *lat1, *lat2, *lat0, *lon0, *x0, *y0, lon, lat),
        }
    }
}

/// Meridian arc length from the equator to latitude `phi` (Snyder 3-21).
fn meridian_arc(ellipsoid: Ellipsoid, phi: f64) -> f64 {
    let e2 = ellipsoid.e2();
    let e4 = e2 * e2;
    let e6 = e4 * e2;
    ellipsoid.a
        * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * phi
            - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * phi).sin()
            + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * phi).sin()
            - (35.0 * e6 / 3072.0) * (6.0 * phi).sin())
}

/// Transverse Mercator forward transform (Snyder 8-9 .. 8-13).
#[allow(clippy::too_many_arguments)]
fn tmerc_forward(
    ellipsoid: Ellipsoid,
    k0: f64,
    lat0: f64,
    lon0: f64,
    x0: f64,
    y0: f64,
    lon: f64,
    lat: f64,
) -> (f64, f64) {
    let phi = lat.to_radians();
    let e2 = ellipsoid.e2();
    let ep2 = e2 / (1.0 - e2);
    let sin_phi = phi.sin();
    let cos_phi = phi.cos();
    let tan_phi = phi.tan();

    let n = ellipsoid.a / (1.0 - e2 * sin_phi * sin_phi).sqrt();
    let t = tan_phi * tan_phi;
    let c = ep2 * cos_phi * cos_phi;
    let a = (lon - lon0).to_radians() * cos_phi;
    let a2 = a * a;
    let a3 = a2 * a;
    let a4 = a3 * a;
    let a5 = a4 * a;
    let a6 = a5 * a;

    let m = meridian_arc(ellipsoid, phi);
    let m0 = meridian_arc(ellipsoid, lat0.to_radians());

    let x = k0
        * n
        * (a + (1.0 - t + c) * a3 / 6.0
            + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * ep2) * a5 / 120.0)
        + x0;
    let y = k0
        * (m - m0
            + n * tan_phi
                * (a2 / 2.0
                    + (5.0 - t + 9.0 * c + 4.0 * c * c) * a4 / 24.0
                    + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * ep2) * a6 / 720.0))
        + y0;
    (x, y)
}

/// Isometric colatitude term t(phi) (Snyder 15-9).
fn lcc_t(e: f64, phi: f64) -> f64 {
    let sin_phi = phi.sin();
    (FRAC_PI_4 - phi / 2.0).tan() / ((1.0 - e * sin_phi) / (1.0 + e * sin_phi)).powf(e / 2.0)
}

/// m(phi) = cos(phi) / sqrt(1 - e^2 sin^2 phi) (Snyder 14-15).
fn lcc_m(e2: f64, phi: f64) -> f64 {
    let sin_phi = phi.sin();
    phi.cos() / (1.0 - e2 * sin_phi * sin_phi).sqrt()
}

/// Lambert conformal conic forward transform (Snyder 15-1 .. 15-10).
#[allow(clippy::too_many_arguments)]
fn lcc_forward(
    ellipsoid: Ellipsoid,
    lat1: f64,
    lat2: f64,
    lat0: f64,
    lon0: f64,
    x0: f64,
    y0: f64,
    lon: f64,
    lat: f64,
) -> (f64, f64) {
    let e2 = ellipsoid.e2();
    let e = ellipsoid.e();
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let phi0 = lat0.to_radians();
    let phi = lat.to_radians();

    let m1 = lcc_m(e2, phi1);
    let t1 = lcc_t(e, phi1);

    let n = if (lat1 - lat2).abs() < 1e-10 {
        phi1.sin()
    } else {
        let m2 = lcc_m(e2, phi2);
        let t2 = lcc_t(e, phi2);
        (m1.ln() - m2.ln()) / (t1.ln() - t2.ln())
    };

    let f_big = m1 / (n * t1.powf(n));
    let rho = ellipsoid.a * f_big * lcc_t(e, phi).powf(n);
    let rho0 = ellipsoid.a * f_big * lcc_t(e, phi0).powf(n);
    let theta = n * (lon - lon0).to_radians();

    let x = x0 + rho * theta.sin();
    let y = y0 + rho0 - rho * theta.cos();
    (x, y)
}

/// Parses a proj4 definition string into a transform and meters-per-unit.
pub(crate) fn parse(definition: &str) -> Result<(TransformKind, f64), Proj4Error> {
    let mut params: HashMap<&str, &str> = HashMap::new();
    for token in definition.split_whitespace() {
        let token = token.trim_start_matches('+');
        match token.split_once('=') {
            Some((key, value)) => params.insert(key, value),
            None => params.insert(token, ""),
        };
    }

    let proj = params.get("proj").copied().ok_or(Proj4Error::MissingProj)?;

    let number = |key: &str, default: f64| -> Result<f64, Proj4Error> {
        match params.get(key) {
            Some(value) => value
                .parse::<f64>()
                .map_err(|_| Proj4Error::BadNumber(key.to_string(), value.to_string())),
            None => Ok(default),
        }
    };

    let ellipsoid = match params.get("ellps").copied() {
        Some("WGS84") | None => {
            // Explicit +a/+b or +a/+rf override the named ellipsoid.
            let a = number("a", Ellipsoid::WGS84.a)?;
            let f = if params.contains_key("rf") {
                1.0 / number("rf", 1.0)?
            } else if params.contains_key("b") {
                let b = number("b", a)?;
                (a - b) / a
            } else if params.contains_key("a") && !params.contains_key("ellps") {
                // A bare +a with no +b/+rf describes a sphere.
                0.0
            } else {
                Ellipsoid::WGS84.f
            };
            Ellipsoid { a, f }
        }
        Some("GRS80") => Ellipsoid::GRS80,
        Some("sphere") => Ellipsoid {
            a: number("a", 6_370_997.0)?,
            f: 0.0,
        },
        Some(other) => return Err(Proj4Error::UnknownEllipsoid(other.to_string())),
    };

    let meters_per_unit = if proj == "longlat" {
        METERS_PER_DEGREE
    } else if params.contains_key("to_meter") {
        number("to_meter", 1.0)?
    } else {
        match params.get("units").copied() {
            Some("m") | None => 1.0,
            Some("km") => 1000.0,
            Some("ft") => 0.3048,
            Some("us-ft") => 1200.0 / 3937.0,
            Some(other) => return Err(Proj4Error::UnknownUnits(other.to_string())),
        }
    };

    let k0 = if params.contains_key("k_0") {
        number("k_0", 1.0)?
    } else {
        number("k", 1.0)?
    };
    let lat0 = number("lat_0", 0.0)?;
    let lon0 = number("lon_0", 0.0)?;
    let x0 = number("x_0", 0.0)?;
    let y0 = number("y_0", 0.0)?;

    let transform = match proj {
        "longlat" => TransformKind::LonLat,
        "merc" => TransformKind::Mercator {
            radius: ellipsoid.a,
        },
        "tmerc" | "utm" => {
            let lon0 = if proj == "utm" {
                // UTM zones are parameterized by zone number.
                let zone = number("zone", 30.0)?;
                zone * 6.0 - 183.0
            } else {
                lon0
            };
            let k0 = if proj == "utm" { 0.9996 } else { k0 };
            let x0 = if proj == "utm" { 500_000.0 } else { x0 };
            TransformKind::TransverseMercator {
                ellipsoid,
                k0,
                lat0,
                lon0,
                x0,
                y0,
            }
        }
        "lcc" => {
            let lat1 = number("lat_1", lat0)?;
            let lat2 = number("lat_2", lat1)?;
            TransformKind::LambertConformalConic {
                ellipsoid,
                lat1,
                lat2,
                lat0,
                lon0,
                x0,
                y0,
            }
        }
        other => return Err(Proj4Error::UnsupportedProj(other.to_string())),
    };

    Ok((transform, meters_per_unit))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Half the Web Mercator world width, an exact published constant.
    const MERCATOR_HALF_WORLD: f64 = 20_037_508.342_789_244;

    #[test]
    fn test_web_mercator_antimeridian() {
        let merc = TransformKind::web_mercator();
        let (x, _) = merc.forward(180.0, 0.0);
        assert!((x - MERCATOR_HALF_WORLD).abs() < 1e-6, "x = {}", x);
    }

    #[test]
    fn test_web_mercator_equator_and_symmetry() {
        let merc = TransformKind::web_mercator();
        let (x, y) = merc.forward(0.0, 0.0);
        assert_eq!((x, y), (0.0, 0.0));

        let (_, y_north) = merc.forward(0.0, 48.0);
        let (_, y_south) = merc.forward(0.0, -48.0);
        assert!((y_north + y_south).abs() < 1e-6);
    }

    #[test]
    fn test_web_mercator_is_square_at_max_latitude() {
        // At +/-85.05112878 degrees the projected world is a square.
        let merc = TransformKind::web_mercator();
        let (_, y) = merc.forward(0.0, 85.051_128_78);
        assert!((y - MERCATOR_HALF_WORLD).abs() < 1.0, "y = {}", y);
    }

    #[test]
    fn test_parse_longlat() {
        let (transform, mpu) = parse("+proj=longlat +datum=WGS84 +no_defs").unwrap();
        assert_eq!(transform, TransformKind::LonLat);
        assert!((mpu - METERS_PER_DEGREE).abs() < 1e-9);
    }

    #[test]
    fn test_parse_missing_proj() {
        assert!(matches!(parse("+units=m"), Err(Proj4Error::MissingProj)));
    }

    #[test]
    fn test_parse_unsupported_family() {
        assert!(matches!(
            parse("+proj=stere +lat_0=90"),
            Err(Proj4Error::UnsupportedProj(_))
        ));
    }

    #[test]
    fn test_tmerc_origin_maps_to_false_origin() {
        // UTM zone 31N expressed as tmerc parameters.
        let (transform, _) = parse(
            "+proj=tmerc +lat_0=0 +lon_0=3 +k=0.9996 +x_0=500000 +y_0=0 +ellps=WGS84 +units=m",
        )
        .unwrap();
        let (x, y) = transform.forward(3.0, 0.0);
        assert!((x - 500_000.0).abs() < 1e-6);
        assert!(y.abs() < 1e-6);
    }

    #[test]
    fn test_utm_shorthand_matches_tmerc() {
        let (utm, _) = parse("+proj=utm +zone=31 +ellps=WGS84").unwrap();
        let (tmerc, _) = parse(
            "+proj=tmerc +lat_0=0 +lon_0=3 +k=0.9996 +x_0=500000 +y_0=0 +ellps=WGS84",
        )
        .unwrap();
        let (xu, yu) = utm.forward(4.5, 50.0);
        let (xt, yt) = tmerc.forward(4.5, 50.0);
        assert!((xu - xt).abs() < 1e-9);
        assert!((yu - yt).abs() < 1e-9);
    }

    #[test]
    fn test_tmerc_east_of_meridian_increases_x() {
        let (transform, _) = parse("+proj=utm +zone=31 +ellps=WGS84").unwrap();
        let (x_west, _) = transform.forward(2.0, 50.0);
        let (x_east, _) = transform.forward(4.0, 50.0);
        assert!(x_east > x_west);
    }

    #[test]
    fn test_lcc_origin_maps_to_false_origin() {
        // Lambert-93 (EPSG:2154).
        let (transform, _) = parse(
            "+proj=lcc +lat_1=49 +lat_2=44 +lat_0=46.5 +lon_0=3 \
             +x_0=700000 +y_0=6600000 +ellps=GRS80 +units=m",
        )
        .unwrap();
        let (x, y) = transform.forward(3.0, 46.5);
        assert!((x - 700_000.0).abs() < 1e-6, "x = {}", x);
        assert!((y - 6_600_000.0).abs() < 1e-6, "y = {}", y);
    }

    #[test]
    fn test_lcc_axes_orientation() {
        let (transform, _) = parse(
            "+proj=lcc +lat_1=49 +lat_2=44 +lat_0=46.5 +lon_0=3 \
             +x_0=700000 +y_0=6600000 +ellps=GRS80 +units=m",
        )
        .unwrap();
        let (x_paris, y_paris) = transform.forward(2.3522, 48.8566);
        // Paris is west of the central meridian and north of the origin.
        assert!(x_paris < 700_000.0);
        assert!(y_paris > 6_600_000.0);
        // And lands in the well-known Lambert-93 coordinate neighborhood.
        assert!((600_000.0..710_000.0).contains(&x_paris), "x = {}", x_paris);
        assert!(
            (6_840_000.0..6_880_000.0).contains(&y_paris),
            "y = {}",
            y_paris
        );
    }

    #[test]
    fn test_lcc_single_parallel() {
        let (transform, _) = parse("+proj=lcc +lat_1=45 +lat_0=45 +lon_0=0 +ellps=WGS84").unwrap();
        let (x, y) = transform.forward(0.0, 45.0);
        assert!(x.abs() < 1e-6);
        assert!(y.abs() < 1e-6);
    }

    #[test]
    fn test_units_and_to_meter() {
        let (_, mpu) = parse("+proj=merc +units=km").unwrap();
        assert_eq!(mpu, 1000.0);
        let (_, mpu) = parse("+proj=merc +to_meter=0.3048").unwrap();
        assert_eq!(mpu, 0.3048);
        assert!(matches!(
            parse("+proj=merc +units=furlong"),
            Err(Proj4Error::UnknownUnits(_))
        ));
    }
}
