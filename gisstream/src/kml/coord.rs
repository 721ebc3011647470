//! Permissive `<coordinates>` tokenizer.
//!
//! Whitespace separates tuples and commas separate components inside a
//! tuple, but real-world documents also put commas *between* tuples. A
//! whitespace token with more than three comma components is therefore
//! regrouped three at a time: `1,2,3,4,5,6` parses as two 3D tuples.

use crate::geodetic::GeoPoint;
use log::warn;

/// Parses a KML coordinate string into vertices. Tuples that do not parse
/// or fall outside the valid longitude/latitude ranges are dropped with a
/// warning; parsing always continues.
pub(crate) fn parse_coordinates(text: &str) -> Vec<GeoPoint> {
    let mut points = Vec::new();
    for token in text.split_whitespace() {
        let components: Vec<&str> = token.split(',').collect();
        if components.len() > 3 {
            for chunk in components.chunks(3) {
                push_tuple(&mut points, chunk);
            }
        } else {
            push_tuple(&mut points, &components);
        }
    }
    points
}

fn push_tuple(points: &mut Vec<GeoPoint>, components: &[&str]) {
    let mut values = [0.0f64; 3];
    let mut count = 0;
    for (i, raw) in components.iter().enumerate().take(3) {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        match raw.parse::<f64>() {
            Ok(v) => {
                values[i] = v;
                count = i + 1;
            }
            Err(_) => {
                warn!("dropping coordinate tuple with non-numeric component `{raw}`");
                return;
            }
        }
    }
    if count == 0 {
        return;
    }
    let elevation = if count >= 3 { Some(values[2]) } else { None };
    match GeoPoint::new(values[0], values[1], elevation) {
        Ok(p) => points.push(p),
        Err(e) => warn!("dropping out-of-range coordinate tuple: {e}"),
    }
}
