// crates/tvws-core/src/core/geo.rs
// ============================================================================
// Module: TVWS Geometry
// Description: WGS-84 points, polygons, and containment/distance tests.
// Purpose: Answer point-in-region and protection-distance questions.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Geometry works directly on latitude/longitude degrees. Polygons unwrap their
//! longitudes relative to the first vertex when constructed, so a ring that
//! crosses the antimeridian (for example 179 to -179) becomes a contiguous
//! ring spanning 179 to 181. Containment then tests the query longitude and its
//! +/-360 aliases against that unwrapped ring.
//!
//! Containment is closed: points on an edge or vertex are inside. The test is a
//! pure function of its inputs and never depends on evaluation order, so a
//! vertex resolves to the same answer on every call.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Mean Earth radius in kilometres (IUGG).
pub const EARTH_RADIUS_KM: f64 = 6371.0088;

/// Tolerance in degrees for on-boundary classification.
const BOUNDARY_EPSILON_DEG: f64 = 1e-9;

/// Minimum number of distinct vertices in a polygon ring.
const MIN_POLYGON_VERTICES: usize = 3;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Geometry validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeoError {
    /// Latitude outside [-90, 90] or not finite.
    #[error("latitude out of range: {0}")]
    Latitude(String),
    /// Longitude outside [-180, 180] or not finite.
    #[error("longitude out of range: {0}")]
    Longitude(String),
    /// Polygon has too few vertices.
    #[error("polygon requires at least 3 distinct vertices, got {0}")]
    TooFewVertices(usize),
}

// ============================================================================
// SECTION: Points
// ============================================================================

/// WGS-84 coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees, positive north.
    pub latitude: f64,
    /// Longitude in degrees, positive east.
    pub longitude: f64,
}

impl GeoPoint {
    /// Creates a point without validation.
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Validates coordinate ranges.
    ///
    /// # Errors
    ///
    /// Returns [`GeoError`] when either coordinate is non-finite or out of range.
    pub fn validate(&self) -> Result<(), GeoError> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(GeoError::Latitude(self.latitude.to_string()));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(GeoError::Longitude(self.longitude.to_string()));
        }
        Ok(())
    }

    /// Great-circle distance in kilometres (haversine).
    #[must_use]
    pub fn distance_km(&self, other: &Self) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let dlat = lat2 - lat1;
        let dlon = wrap_longitude_delta(other.longitude - self.longitude).to_radians();
        let half_chord = (dlat / 2.0).sin().powi(2)
            + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * half_chord.sqrt().clamp(0.0, 1.0).asin()
    }
}

/// Normalizes a longitude difference into [-180, 180].
fn wrap_longitude_delta(delta: f64) -> f64 {
    let mut value = delta % 360.0;
    if value > 180.0 {
        value -= 360.0;
    } else if value < -180.0 {
        value += 360.0;
    }
    value
}

// ============================================================================
// SECTION: Bounding Box
// ============================================================================

/// Axis-aligned bounding box over unwrapped longitudes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    /// Southern edge.
    pub min_latitude: f64,
    /// Northern edge.
    pub max_latitude: f64,
    /// Western edge (may be below -180 or above 180 after unwrapping).
    pub min_longitude: f64,
    /// Eastern edge (may be below -180 or above 180 after unwrapping).
    pub max_longitude: f64,
}

impl BoundingBox {
    /// Box area in square degrees, used only for ordering.
    #[must_use]
    pub fn area(&self) -> f64 {
        (self.max_latitude - self.min_latitude) * (self.max_longitude - self.min_longitude)
    }

    /// Returns true when the coordinate lies inside or on the box.
    #[must_use]
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        latitude >= self.min_latitude - BOUNDARY_EPSILON_DEG
            && latitude <= self.max_latitude + BOUNDARY_EPSILON_DEG
            && longitude >= self.min_longitude - BOUNDARY_EPSILON_DEG
            && longitude <= self.max_longitude + BOUNDARY_EPSILON_DEG
    }
}

// ============================================================================
// SECTION: Polygon
// ============================================================================

/// Simple polygon ring with antimeridian-safe containment.
///
/// Serializes as the ordered vertex list it was built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<GeoPoint>", into = "Vec<GeoPoint>")]
pub struct Polygon {
    /// Vertices as supplied, without a closing duplicate.
    vertices: Vec<GeoPoint>,
    /// Vertices with longitudes unwrapped relative to the first vertex.
    unwrapped: Vec<GeoPoint>,
    /// Bounding box over the unwrapped ring.
    bounds: BoundingBox,
}

impl Polygon {
    /// Builds a polygon from a vertex ring. A closing vertex equal to the first
    /// one is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`GeoError`] for invalid coordinates or fewer than three vertices.
    pub fn new(mut vertices: Vec<GeoPoint>) -> Result<Self, GeoError> {
        for vertex in &vertices {
            vertex.validate()?;
        }
        if vertices.len() > 1 && vertices.first() == vertices.last() {
            vertices.pop();
        }
        if vertices.len() < MIN_POLYGON_VERTICES {
            return Err(GeoError::TooFewVertices(vertices.len()));
        }
        let unwrapped = unwrap_ring(&vertices);
        let bounds = bounds_of(&unwrapped);
        Ok(Self { vertices, unwrapped, bounds })
    }

    /// Returns the vertices as supplied.
    #[must_use]
    pub fn vertices(&self) -> &[GeoPoint] {
        &self.vertices
    }

    /// Returns the bounding box over unwrapped longitudes.
    #[must_use]
    pub const fn bounds(&self) -> BoundingBox {
        self.bounds
    }

    /// Returns true when `point` is inside the polygon or on its boundary.
    #[must_use]
    pub fn contains(&self, point: &GeoPoint) -> bool {
        [point.longitude, point.longitude + 360.0, point.longitude - 360.0]
            .into_iter()
            .filter(|longitude| self.bounds.contains(point.latitude, *longitude))
            .any(|longitude| self.contains_unwrapped(point.latitude, longitude))
    }

    /// Shortest distance in kilometres from `point` to the polygon boundary.
    ///
    /// Uses a local equirectangular projection centred on `point`, which is
    /// accurate for the tens-of-kilometres separations used in protection.
    #[must_use]
    pub fn distance_km_to_boundary(&self, point: &GeoPoint) -> f64 {
        let km_per_deg = EARTH_RADIUS_KM.to_radians();
        let lon_scale = point.latitude.to_radians().cos();
        let projected: Vec<(f64, f64)> = self
            .vertices
            .iter()
            .map(|vertex| {
                let dx = wrap_longitude_delta(vertex.longitude - point.longitude)
                    * lon_scale
                    * km_per_deg;
                let dy = (vertex.latitude - point.latitude) * km_per_deg;
                (dx, dy)
            })
            .collect();
        ring_edges(&projected)
            .map(|(a, b)| segment_distance((0.0, 0.0), a, b))
            .fold(f64::INFINITY, f64::min)
    }

    /// Closed containment test on the unwrapped ring.
    fn contains_unwrapped(&self, latitude: f64, longitude: f64) -> bool {
        let ring: Vec<(f64, f64)> =
            self.unwrapped.iter().map(|vertex| (vertex.longitude, vertex.latitude)).collect();
        let target = (longitude, latitude);
        if ring_edges(&ring).any(|(a, b)| segment_distance(target, a, b) <= BOUNDARY_EPSILON_DEG)
        {
            return true;
        }
        let mut inside = false;
        for (a, b) in ring_edges(&ring) {
            let (ax, ay) = a;
            let (bx, by) = b;
            if (ay > latitude) != (by > latitude) {
                let crossing = (bx - ax) * (latitude - ay) / (by - ay) + ax;
                if longitude < crossing {
                    inside = !inside;
                }
            }
        }
        inside
    }
}

impl TryFrom<Vec<GeoPoint>> for Polygon {
    type Error = GeoError;

    fn try_from(value: Vec<GeoPoint>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Polygon> for Vec<GeoPoint> {
    fn from(value: Polygon) -> Self {
        value.vertices
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Unwraps ring longitudes so consecutive vertices differ by at most 180 degrees.
fn unwrap_ring(vertices: &[GeoPoint]) -> Vec<GeoPoint> {
    let mut unwrapped: Vec<GeoPoint> = Vec::with_capacity(vertices.len());
    for vertex in vertices {
        let longitude = match unwrapped.last() {
            Some(previous) => {
                previous.longitude + wrap_longitude_delta(vertex.longitude - previous.longitude)
            }
            None => vertex.longitude,
        };
        unwrapped.push(GeoPoint::new(vertex.latitude, longitude));
    }
    unwrapped
}

/// Computes the bounding box of a non-empty ring.
fn bounds_of(ring: &[GeoPoint]) -> BoundingBox {
    let mut bounds = BoundingBox {
        min_latitude: f64::INFINITY,
        max_latitude: f64::NEG_INFINITY,
        min_longitude: f64::INFINITY,
        max_longitude: f64::NEG_INFINITY,
    };
    for vertex in ring {
        bounds.min_latitude = bounds.min_latitude.min(vertex.latitude);
        bounds.max_latitude = bounds.max_latitude.max(vertex.latitude);
        bounds.min_longitude = bounds.min_longitude.min(vertex.longitude);
        bounds.max_longitude = bounds.max_longitude.max(vertex.longitude);
    }
    bounds
}

/// Iterates the closed edges of a ring, including last-to-first.
fn ring_edges(ring: &[(f64, f64)]) -> impl Iterator<Item = ((f64, f64), (f64, f64))> + '_ {
    ring.iter().zip(ring.iter().cycle().skip(1)).map(|(a, b)| (*a, *b))
}

/// Planar distance from `point` to segment `a`-`b`.
fn segment_distance(point: (f64, f64), a: (f64, f64), b: (f64, f64)) -> f64 {
    let (px, py) = point;
    let (ax, ay) = a;
    let (bx, by) = b;
    let (dx, dy) = (bx - ax, by - ay);
    let length_sq = dx * dx + dy * dy;
    let t = if length_sq > 0.0 {
        (((px - ax) * dx + (py - ay) * dy) / length_sq).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let (cx, cy) = (ax + t * dx, ay + t * dy);
    (px - cx).hypot(py - cy)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
