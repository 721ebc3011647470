//! Tagged-variant geometry model.
//!
//! Geometries carry the KML rendering attributes (`altitudeMode`,
//! `tessellate`, `extrude`) next to their coordinates. Construction
//! validates the structural invariants: a [Line] needs at least two points,
//! a [LinearRing] at least four with implied closure, a [Polygon] exactly
//! one outer ring.

use crate::error::{GisError, Result};
use crate::geodetic::{GeoBounds, GeoPoint};

/// KML altitude interpretation.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum AltitudeMode {
    ClampToGround,
    RelativeToGround,
    Absolute,
}

impl AltitudeMode {
    /// Lenient parse of the KML lexical value. Unknown values yield `None`.
    pub fn parse(value: &str) -> Option<AltitudeMode> {
        match value.trim() {
            "clampToGround" => Some(AltitudeMode::ClampToGround),
            "relativeToGround" => Some(AltitudeMode::RelativeToGround),
            "absolute" => Some(AltitudeMode::Absolute),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AltitudeMode::ClampToGround => "clampToGround",
            AltitudeMode::RelativeToGround => "relativeToGround",
            AltitudeMode::Absolute => "absolute",
        }
    }
}

/// Rendering attributes shared by all geometry variants.
#[derive(Copy, Clone, PartialEq, Debug, Default)]
pub struct GeomAttrs {
    pub altitude_mode: Option<AltitudeMode>,
    pub tessellate: Option<bool>,
    pub extrude: Option<bool>,
}

#[derive(Clone, PartialEq, Debug)]
pub struct Point {
    pub center: GeoPoint,
    pub attrs: GeomAttrs,
}

impl Point {
    pub fn new(center: GeoPoint) -> Self {
        Point {
            center,
            attrs: GeomAttrs::default(),
        }
    }
}

#[derive(Clone, PartialEq, Debug)]
pub struct Line {
    pub points: Vec<GeoPoint>,
    pub attrs: GeomAttrs,
}

impl Line {
    pub fn new(points: Vec<GeoPoint>) -> Result<Self> {
        if points.len() < 2 {
            return Err(GisError::UnsupportedGeometry(format!(
                "line needs at least 2 points, got {}",
                points.len()
            )));
        }
        Ok(Line {
            points,
            attrs: GeomAttrs::default(),
        })
    }
}

/// A closed ring. The closing vertex may be stored or implied: when the
/// first and last stored points differ, closure is implicit.
#[derive(Clone, PartialEq, Debug)]
pub struct LinearRing {
    pub points: Vec<GeoPoint>,
    pub attrs: GeomAttrs,
}

impl LinearRing {
    pub fn new(points: Vec<GeoPoint>) -> Result<Self> {
        if points.len() < 4 && !(points.len() == 3 && points.first() != points.last()) {
            return Err(GisError::UnsupportedGeometry(format!(
                "ring needs at least 4 points, got {}",
                points.len()
            )));
        }
        Ok(LinearRing {
            points,
            attrs: GeomAttrs::default(),
        })
    }

    /// Builds a ring without the vertex-count check. Inner polygon
    /// boundaries from sloppy sources are accepted as-is.
    pub fn new_unchecked(points: Vec<GeoPoint>) -> Self {
        LinearRing {
            points,
            attrs: GeomAttrs::default(),
        }
    }

    pub fn is_clockwise(&self) -> bool {
        crate::geodetic::is_clockwise(&self.points)
    }

    pub fn reverse(&mut self) {
        self.points.reverse();
    }

    pub fn contains_point(&self, p: &GeoPoint) -> bool {
        crate::geodetic::point_in_ring(&self.points, p)
    }
}

#[derive(Clone, PartialEq, Debug)]
pub struct Polygon {
    pub outer: LinearRing,
    pub inners: Vec<LinearRing>,
    pub attrs: GeomAttrs,
}

impl Polygon {
    pub fn new(outer: LinearRing, inners: Vec<LinearRing>) -> Self {
        Polygon {
            outer,
            inners,
            attrs: GeomAttrs::default(),
        }
    }
}

#[derive(Clone, PartialEq, Debug)]
pub struct MultiPoint {
    pub points: Vec<Point>,
    pub attrs: GeomAttrs,
}

#[derive(Clone, PartialEq, Debug)]
pub struct MultiLine {
    pub lines: Vec<Line>,
    pub attrs: GeomAttrs,
}

#[derive(Clone, PartialEq, Debug)]
pub struct MultiPolygons {
    pub polygons: Vec<Polygon>,
    pub attrs: GeomAttrs,
}

/// Heterogeneous collection of geometries.
#[derive(Clone, PartialEq, Debug)]
pub struct GeometryBag {
    pub geometries: Vec<Geometry>,
    pub attrs: GeomAttrs,
}

/// A textured 3D model anchored at a geographic location.
#[derive(Clone, PartialEq, Debug)]
pub struct Model {
    pub location: Option<GeoPoint>,
    pub attrs: GeomAttrs,
}

#[derive(Clone, PartialEq, Debug)]
pub enum Geometry {
    Point(Point),
    Line(Line),
    LinearRing(LinearRing),
    Polygon(Polygon),
    MultiPoint(MultiPoint),
    MultiLine(MultiLine),
    MultiPolygons(MultiPolygons),
    GeometryBag(GeometryBag),
    Model(Model),
}

impl Geometry {
    pub fn num_points(&self) -> usize {
        match self {
            Geometry::Point(_) => 1,
            Geometry::Line(l) => l.points.len(),
            Geometry::LinearRing(r) => r.points.len(),
            Geometry::Polygon(p) => {
                p.outer.points.len() + p.inners.iter().map(|r| r.points.len()).sum::<usize>()
            }
            Geometry::MultiPoint(mp) => mp.points.len(),
            Geometry::MultiLine(ml) => ml.lines.iter().map(|l| l.points.len()).sum(),
            Geometry::MultiPolygons(mp) => mp
                .polygons
                .iter()
                .map(|p| {
                    p.outer.points.len() + p.inners.iter().map(|r| r.points.len()).sum::<usize>()
                })
                .sum(),
            Geometry::GeometryBag(bag) => bag.geometries.iter().map(Geometry::num_points).sum(),
            Geometry::Model(m) => usize::from(m.location.is_some()),
        }
    }

    pub fn is_3d(&self) -> bool {
        let mut any3d = false;
        self.for_each_point(&mut |p| any3d |= p.is_3d());
        any3d
    }

    pub fn bounding_box(&self) -> Option<GeoBounds> {
        let mut bounds: Option<GeoBounds> = None;
        self.for_each_point(&mut |p| match bounds.as_mut() {
            Some(b) => b.extend(p),
            None => bounds = Some(GeoBounds::from_point(p)),
        });
        bounds
    }

    /// Visits every vertex in document order.
    pub fn for_each_point(&self, f: &mut dyn FnMut(&GeoPoint)) {
        match self {
            Geometry::Point(p) => f(&p.center),
            Geometry::Line(l) => l.points.iter().for_each(&mut *f),
            Geometry::LinearRing(r) => r.points.iter().for_each(&mut *f),
            Geometry::Polygon(p) => {
                p.outer.points.iter().for_each(&mut *f);
                for inner in &p.inners {
                    inner.points.iter().for_each(&mut *f);
                }
            }
            Geometry::MultiPoint(mp) => mp.points.iter().for_each(|p| f(&p.center)),
            Geometry::MultiLine(ml) => {
                for line in &ml.lines {
                    line.points.iter().for_each(&mut *f);
                }
            }
            Geometry::MultiPolygons(mp) => {
                for poly in &mp.polygons {
                    poly.outer.points.iter().for_each(&mut *f);
                    for inner in &poly.inners {
                        inner.points.iter().for_each(&mut *f);
                    }
                }
            }
            Geometry::GeometryBag(bag) => {
                for g in &bag.geometries {
                    g.for_each_point(f);
                }
            }
            Geometry::Model(m) => {
                if let Some(loc) = &m.location {
                    f(loc);
                }
            }
        }
    }

    pub fn attrs(&self) -> &GeomAttrs {
        match self {
            Geometry::Point(g) => &g.attrs,
            Geometry::Line(g) => &g.attrs,
            Geometry::LinearRing(g) => &g.attrs,
            Geometry::Polygon(g) => &g.attrs,
            Geometry::MultiPoint(g) => &g.attrs,
            Geometry::MultiLine(g) => &g.attrs,
            Geometry::MultiPolygons(g) => &g.attrs,
            Geometry::GeometryBag(g) => &g.attrs,
            Geometry::Model(g) => &g.attrs,
        }
    }

    pub fn attrs_mut(&mut self) -> &mut GeomAttrs {
        match self {
            Geometry::Point(g) => &mut g.attrs,
            Geometry::Line(g) => &mut g.attrs,
            Geometry::LinearRing(g) => &mut g.attrs,
            Geometry::Polygon(g) => &mut g.attrs,
            Geometry::MultiPoint(g) => &mut g.attrs,
            Geometry::MultiLine(g) => &mut g.attrs,
            Geometry::MultiPolygons(g) => &mut g.attrs,
            Geometry::GeometryBag(g) => &mut g.attrs,
            Geometry::Model(g) => &mut g.attrs,
        }
    }
}
