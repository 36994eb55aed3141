//! Geometry codec for geofence shapes.
//!
//! Normalises raw point lists and circles into closed rings and computes
//! a deterministic content hash over the coordinate sequence. The hash
//! gates external writes: identical geometry must always produce the
//! same fingerprint so the sync services can skip redundant calls.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Number of segments used to approximate a circle as a polygon.
const CIRCLE_SEGMENTS: usize = 32;

/// Metres per degree of latitude (WGS84 mean).
const METRES_PER_DEGREE: f64 = 111_320.0;

/// Coordinates are rounded to this many decimal places before hashing
/// and duplicate detection (six places is roughly 0.11 m at the
/// equator, below device resolution).
const COORDINATE_PRECISION: f64 = 1e6;

/// A WGS84 coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    fn rounded(self) -> (f64, f64) {
        (
            (self.lat * COORDINATE_PRECISION).round() / COORDINATE_PRECISION,
            (self.lng * COORDINATE_PRECISION).round() / COORDINATE_PRECISION,
        )
    }
}

/// Raw geofence geometry as captured by the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum GeofenceShape {
    /// Arbitrary point list; may or may not already be closed.
    Polygon { points: Vec<GeoPoint> },
    /// Circle approximated as an N-gon during normalisation.
    Circle { center: GeoPoint, radius_m: f64 },
}

/// Errors raised while normalising geometry.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    /// The shape contained no usable points.
    #[error("geofence shape must contain at least one point")]
    EmptyShape,
    /// A circle was declared with a non-positive radius.
    #[error("circle radius must be positive, got {radius_m}")]
    InvalidRadius { radius_m: f64 },
}

/// Deterministic fingerprint of a normalised ring.
///
/// # Examples
/// ```
/// use frota_backend::domain::geometry::{GeoPoint, GeofenceShape, geometry_hash, normalize_polygon};
///
/// let shape = GeofenceShape::Polygon {
///     points: vec![
///         GeoPoint::new(-23.5, -46.6),
///         GeoPoint::new(-23.5, -46.5),
///         GeoPoint::new(-23.4, -46.5),
///     ],
/// };
/// let ring = normalize_polygon(&shape, None).expect("valid shape");
/// assert_eq!(geometry_hash(&ring), geometry_hash(&ring));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GeometryHash(String);

impl GeometryHash {
    /// Borrow the hex digest.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for GeometryHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalise a shape into a closed ring.
///
/// Circles become closed `CIRCLE_SEGMENTS`-gons. Adjacent duplicate
/// points (at hash precision) are removed, the ring is closed by
/// repeating the first point, and when `max_points` is set an
/// over-long ring is proportionally down-sampled to `max_points + 1`
/// including the closing point. `None` means unlimited, and limits
/// below 3 cannot bound a ring so they are ignored.
pub fn normalize_polygon(
    shape: &GeofenceShape,
    max_points: Option<usize>,
) -> Result<Vec<GeoPoint>, GeometryError> {
    let mut ring = match shape {
        GeofenceShape::Polygon { points } => {
            if points.is_empty() {
                return Err(GeometryError::EmptyShape);
            }
            dedupe_adjacent(points)
        }
        GeofenceShape::Circle { center, radius_m } => circle_ring(*center, *radius_m)?,
    };

    // Drop a pre-existing closing point so the limit applies to the
    // open ring; closure is re-added below.
    if ring.len() > 1 && ring[0].rounded() == ring[ring.len() - 1].rounded() {
        ring.pop();
    }

    if let Some(limit) = max_points {
        if limit >= 3 && ring.len() > limit {
            ring = downsample(&ring, limit);
        }
    }

    let first = ring[0];
    ring.push(first);
    Ok(ring)
}

/// Hash a ring's coordinate sequence.
///
/// Order-sensitive SHA-256 over the rounded coordinates; identical
/// rings always produce the same digest and sub-precision float noise
/// does not change it.
pub fn geometry_hash(ring: &[GeoPoint]) -> GeometryHash {
    let mut hasher = Sha256::new();
    for point in ring {
        let (lat, lng) = point.rounded();
        hasher.update(format!("{lat:.6};{lng:.6}|").as_bytes());
    }
    GeometryHash(hex::encode(hasher.finalize()))
}

fn dedupe_adjacent(points: &[GeoPoint]) -> Vec<GeoPoint> {
    let mut out: Vec<GeoPoint> = Vec::with_capacity(points.len());
    for point in points {
        if out.last().map(|last| last.rounded()) == Some(point.rounded()) {
            continue;
        }
        out.push(*point);
    }
    out
}

fn circle_ring(center: GeoPoint, radius_m: f64) -> Result<Vec<GeoPoint>, GeometryError> {
    if !radius_m.is_finite() || radius_m <= 0.0 {
        return Err(GeometryError::InvalidRadius { radius_m });
    }
    let lat_step = radius_m / METRES_PER_DEGREE;
    let lng_step = radius_m / (METRES_PER_DEGREE * center.lat.to_radians().cos().abs().max(1e-6));

    let mut points = Vec::with_capacity(CIRCLE_SEGMENTS);
    for segment in 0..CIRCLE_SEGMENTS {
        let theta = 2.0 * std::f64::consts::PI * segment as f64 / CIRCLE_SEGMENTS as f64;
        points.push(GeoPoint::new(
            center.lat + lat_step * theta.cos(),
            center.lng + lng_step * theta.sin(),
        ));
    }
    Ok(points)
}

fn downsample(ring: &[GeoPoint], limit: usize) -> Vec<GeoPoint> {
    (0..limit).map(|i| ring[i * ring.len() / limit]).collect()
}
