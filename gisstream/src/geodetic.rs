//! Geodetic primitives: validated angles, points, bounds and ring tests.
//!
//! All coordinates are WGS-84 geographic degrees. Following the ESRI
//! shapefile convention used throughout this crate, a ring whose vertices
//! run clockwise bounds an exterior; counter-clockwise bounds a hole.

use crate::error::{GisError, Result};
use std::fmt;

/// Longitude in decimal degrees, -180..=180.
#[derive(Copy, Clone, PartialEq, PartialOrd, Debug, Default)]
pub struct Longitude(f64);

/// Latitude in decimal degrees, -90..=90.
#[derive(Copy, Clone, PartialEq, PartialOrd, Debug, Default)]
pub struct Latitude(f64);

impl Longitude {
    pub fn new(degrees: f64) -> Result<Self> {
        if degrees.is_finite() && (-180.0..=180.0).contains(&degrees) {
            Ok(Longitude(degrees))
        } else {
            Err(GisError::InvalidCoordinate(format!(
                "longitude {degrees} outside [-180,180]"
            )))
        }
    }

    pub fn degrees(self) -> f64 {
        self.0
    }
}

impl Latitude {
    pub fn new(degrees: f64) -> Result<Self> {
        if degrees.is_finite() && (-90.0..=90.0).contains(&degrees) {
            Ok(Latitude(degrees))
        } else {
            Err(GisError::InvalidCoordinate(format!(
                "latitude {degrees} outside [-90,90]"
            )))
        }
    }

    pub fn degrees(self) -> f64 {
        self.0
    }
}

impl fmt::Display for Longitude {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for Latitude {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A 2D geographic point.
#[derive(Copy, Clone, PartialEq, Debug, Default)]
pub struct Geodetic2DPoint {
    pub lon: Longitude,
    pub lat: Latitude,
}

impl Geodetic2DPoint {
    pub fn new(lon: f64, lat: f64) -> Result<Self> {
        Ok(Geodetic2DPoint {
            lon: Longitude::new(lon)?,
            lat: Latitude::new(lat)?,
        })
    }
}

/// A 3D geographic point with an elevation in meters.
#[derive(Copy, Clone, PartialEq, Debug, Default)]
pub struct Geodetic3DPoint {
    pub lon: Longitude,
    pub lat: Latitude,
    pub elevation: f64,
}

impl Geodetic3DPoint {
    pub fn new(lon: f64, lat: f64, elevation: f64) -> Result<Self> {
        Ok(Geodetic3DPoint {
            lon: Longitude::new(lon)?,
            lat: Latitude::new(lat)?,
            elevation,
        })
    }
}

/// A geometry vertex, either 2D or 3D.
#[derive(Copy, Clone, PartialEq, Debug)]
pub enum GeoPoint {
    TwoD(Geodetic2DPoint),
    ThreeD(Geodetic3DPoint),
}

impl GeoPoint {
    /// Validated constructor from raw degrees and an optional elevation.
    pub fn new(lon: f64, lat: f64, elevation: Option<f64>) -> Result<Self> {
        match elevation {
            Some(e) => Ok(GeoPoint::ThreeD(Geodetic3DPoint::new(lon, lat, e)?)),
            None => Ok(GeoPoint::TwoD(Geodetic2DPoint::new(lon, lat)?)),
        }
    }

    pub fn lon(&self) -> f64 {
        match self {
            GeoPoint::TwoD(p) => p.lon.degrees(),
            GeoPoint::ThreeD(p) => p.lon.degrees(),
        }
    }

    pub fn lat(&self) -> f64 {
        match self {
            GeoPoint::TwoD(p) => p.lat.degrees(),
            GeoPoint::ThreeD(p) => p.lat.degrees(),
        }
    }

    pub fn elevation(&self) -> Option<f64> {
        match self {
            GeoPoint::TwoD(_) => None,
            GeoPoint::ThreeD(p) => Some(p.elevation),
        }
    }

    pub fn is_3d(&self) -> bool {
        matches!(self, GeoPoint::ThreeD(_))
    }
}

impl From<Geodetic2DPoint> for GeoPoint {
    fn from(p: Geodetic2DPoint) -> Self {
        GeoPoint::TwoD(p)
    }
}

impl From<Geodetic3DPoint> for GeoPoint {
    fn from(p: Geodetic3DPoint) -> Self {
        GeoPoint::ThreeD(p)
    }
}

/// Geographic bounding box in degrees.
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct GeoBounds {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl GeoBounds {
    pub fn from_point(p: &GeoPoint) -> Self {
        GeoBounds {
            min_lon: p.lon(),
            min_lat: p.lat(),
            max_lon: p.lon(),
            max_lat: p.lat(),
        }
    }

    pub fn from_points(points: &[GeoPoint]) -> Option<Self> {
        let mut iter = points.iter();
        let mut bounds = GeoBounds::from_point(iter.next()?);
        for p in iter {
            bounds.extend(p);
        }
        Some(bounds)
    }

    pub fn extend(&mut self, p: &GeoPoint) {
        self.min_lon = self.min_lon.min(p.lon());
        self.min_lat = self.min_lat.min(p.lat());
        self.max_lon = self.max_lon.max(p.lon());
        self.max_lat = self.max_lat.max(p.lat());
    }

    pub fn merge(&mut self, other: &GeoBounds) {
        self.min_lon = self.min_lon.min(other.min_lon);
        self.min_lat = self.min_lat.min(other.min_lat);
        self.max_lon = self.max_lon.max(other.max_lon);
        self.max_lat = self.max_lat.max(other.max_lat);
    }

    pub fn contains(&self, p: &GeoPoint) -> bool {
        p.lon() >= self.min_lon
            && p.lon() <= self.max_lon
            && p.lat() >= self.min_lat
            && p.lat() <= self.max_lat
    }

    pub fn contains_bounds(&self, other: &GeoBounds) -> bool {
        other.min_lon >= self.min_lon
            && other.max_lon <= self.max_lon
            && other.min_lat >= self.min_lat
            && other.max_lat <= self.max_lat
    }
}

/// Twice the signed area of a ring, positive for clockwise vertex order.
///
/// As per ESRI's Shapefile 1998 whitepaper, the neighborhood to the right of
/// an observer walking along the ring in vertex order is the interior, so
/// exterior rings are clockwise and holes are counter-clockwise.
pub fn signed_area(points: &[GeoPoint]) -> f64 {
    let mut area = points
        .windows(2)
        .map(|pts| (pts[1].lon() - pts[0].lon()) * (pts[1].lat() + pts[0].lat()))
        .sum::<f64>();
    // Implied closing edge when the source stores n-1 vertices.
    if let (Some(first), Some(last)) = (points.first(), points.last()) {
        if first != last {
            area += (first.lon() - last.lon()) * (first.lat() + last.lat());
        }
    }
    area / 2.0
}

/// Whether the ring's vertices run clockwise (exterior winding).
pub fn is_clockwise(points: &[GeoPoint]) -> bool {
    signed_area(points) >= 0.0
}

/// Even-odd point-in-ring test. The ring may be stored open or closed.
pub fn point_in_ring(ring: &[GeoPoint], p: &GeoPoint) -> bool {
    let n = ring.len();
    if n < 3 {
        return false;
    }
    let (px, py) = (p.lon(), p.lat());
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = (ring[i].lon(), ring[i].lat());
        let (xj, yj) = (ring[j].lon(), ring[j].lat());
        if ((yi > py) != (yj > py)) && px < (xj - xi) * (py - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}
