//! Classification of a flat ring list into nested polygons.
//!
//! Shapefile polygon records store all rings of all polygons in one flat
//! part array. Winding tells outer from inner (clockwise is exterior, see
//! [`crate::geodetic::is_clockwise`]); containment decides which exterior
//! each hole belongs to.

use crate::geodetic::GeoBounds;
use crate::geometry::{LinearRing, Polygon};
use log::warn;

struct Holder {
    outer: LinearRing,
    bounds: Option<GeoBounds>,
    inners: Vec<LinearRing>,
}

impl Holder {
    fn new(outer: LinearRing) -> Self {
        let bounds = GeoBounds::from_points(&outer.points);
        Holder {
            outer,
            bounds,
            inners: Vec::new(),
        }
    }

    fn contains(&self, ring: &LinearRing) -> bool {
        let Some(first) = ring.points.first() else {
            return false;
        };
        match &self.bounds {
            Some(b) if !b.contains(first) => false,
            _ => self.outer.contains_point(first),
        }
    }
}

/// Nests `rings` into polygons.
///
/// Walks the rings in order: every clockwise ring opens a new polygon;
/// every counter-clockwise ring is attached to the first earlier polygon
/// whose outer ring contains its first vertex. Inners that match no earlier
/// polygon are retried against all polygons after the walk; any still
/// unmatched are promoted to standalone polygons with their winding
/// reversed.
pub fn nest_rings(rings: Vec<LinearRing>) -> Vec<Polygon> {
    let mut holders: Vec<Holder> = Vec::new();
    let mut deferred: Vec<LinearRing> = Vec::new();

    for ring in rings {
        if ring.points.is_empty() {
            continue;
        }
        if ring.is_clockwise() {
            holders.push(Holder::new(ring));
        } else {
            match holders.iter_mut().find(|h| h.contains(&ring)) {
                Some(holder) => holder.inners.push(ring),
                None => deferred.push(ring),
            }
        }
    }

    for ring in deferred {
        match holders.iter().position(|h| h.contains(&ring)) {
            Some(i) => holders[i].inners.push(ring),
            None => {
                warn!("inner ring contained by no outer ring, promoting to polygon");
                let mut promoted = ring;
                promoted.reverse();
                holders.push(Holder::new(promoted));
            }
        }
    }

    holders
        .into_iter()
        .map(|h| Polygon::new(h.outer, h.inners))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geodetic::GeoPoint;

    fn ring(coords: &[(f64, f64)]) -> LinearRing {
        LinearRing::new_unchecked(
            coords
                .iter()
                .map(|&(lon, lat)| GeoPoint::new(lon, lat, None).unwrap())
                .collect(),
        )
    }

    // Clockwise square in lon/lat space: (0,0) -> (0,s) -> (s,s) -> (s,0).
    fn cw_square(x: f64, y: f64, s: f64) -> LinearRing {
        ring(&[(x, y), (x, y + s), (x + s, y + s), (x + s, y), (x, y)])
    }

    fn ccw_square(x: f64, y: f64, s: f64) -> LinearRing {
        let mut r = cw_square(x, y, s);
        r.reverse();
        r
    }

    #[test]
    fn hole_attaches_to_enclosing_outer() {
        let polys = nest_rings(vec![cw_square(0.0, 0.0, 10.0), ccw_square(2.0, 2.0, 2.0)]);
        assert_eq!(polys.len(), 1);
        assert_eq!(polys[0].inners.len(), 1);
        assert!(polys[0].outer.is_clockwise());
        assert!(!polys[0].inners[0].is_clockwise());
    }

    #[test]
    fn two_outers_make_two_polygons() {
        let polys = nest_rings(vec![cw_square(0.0, 0.0, 5.0), cw_square(20.0, 20.0, 5.0)]);
        assert_eq!(polys.len(), 2);
        assert!(polys.iter().all(|p| p.inners.is_empty()));
    }

    #[test]
    fn hole_before_its_outer_is_deferred_then_attached() {
        let polys = nest_rings(vec![
            ccw_square(2.0, 2.0, 2.0),
            cw_square(0.0, 0.0, 10.0),
        ]);
        assert_eq!(polys.len(), 1);
        assert_eq!(polys[0].inners.len(), 1);
    }

    #[test]
    fn hole_attaches_to_first_containing_outer() {
        let polys = nest_rings(vec![
            cw_square(0.0, 0.0, 10.0),
            cw_square(20.0, 0.0, 10.0),
            ccw_square(22.0, 2.0, 2.0),
        ]);
        assert_eq!(polys.len(), 2);
        assert!(polys[0].inners.is_empty());
        assert_eq!(polys[1].inners.len(), 1);
    }

    #[test]
    fn orphan_inner_is_promoted_reversed() {
        let polys = nest_rings(vec![ccw_square(0.0, 0.0, 5.0)]);
        assert_eq!(polys.len(), 1);
        assert!(polys[0].outer.is_clockwise());
        assert!(polys[0].inners.is_empty());
    }
}
