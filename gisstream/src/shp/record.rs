//! Per-record geometry decoding.
//!
//! Record bodies are buffered so that a truncated Z or M section can be
//! tolerated: missing Z values default to 0, missing M values are ignored,
//! and the record is still emitted (with a warning).

use crate::error::{GisError, Result};
use crate::geodetic::GeoPoint;
use crate::geometry::{Geometry, Line, LinearRing, MultiLine, MultiPoint, MultiPolygons, Point};
use crate::shp::header::ShapeType;
use crate::shp::ring::nest_rings;
use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use log::warn;
use std::io::{Cursor, Read};
use std::mem::size_of;

/// Header of a shape record, preceding every record body.
pub(crate) struct RecordHeader {
    #[allow(dead_code)]
    pub record_number: i32,
    /// Body size in 16-bit words.
    pub content_length: i32,
}

impl RecordHeader {
    pub(crate) const SIZE: usize = 2 * size_of::<i32>();

    pub fn read_from<T: Read>(source: &mut T) -> Result<RecordHeader> {
        let record_number = source.read_i32::<BigEndian>()?;
        let content_length = source.read_i32::<BigEndian>()?;
        Ok(RecordHeader {
            record_number,
            content_length,
        })
    }
}

/// Decodes one buffered record body. Returns `None` for NULL records.
pub(crate) fn decode_record(body: &[u8], file_type: ShapeType) -> Result<Option<Geometry>> {
    let mut cur = Cursor::new(body);
    let code = cur.read_i32::<LittleEndian>()?;
    if code == ShapeType::NullShape.code() {
        return Ok(None);
    }
    let shape_type =
        ShapeType::from_code(code).ok_or(GisError::UnsupportedShapeType(code))?;
    if shape_type != file_type {
        return Err(GisError::malformed(
            "shapefile",
            format!("record shape type {shape_type} differs from file type {file_type}"),
        ));
    }

    let geom = match shape_type {
        ShapeType::Point | ShapeType::PointZ | ShapeType::PointM => {
            read_point(&mut cur, shape_type)?
        }
        ShapeType::MultiPoint | ShapeType::MultiPointZ | ShapeType::MultiPointM => {
            read_multipoint(&mut cur, shape_type)?
        }
        ShapeType::MultiLine | ShapeType::MultiLineZ | ShapeType::MultiLineM => {
            let parts = MultiPartShape::read(&mut cur, shape_type)?;
            parts.into_lines()?
        }
        ShapeType::Polygon | ShapeType::PolygonZ | ShapeType::PolygonM => {
            let parts = MultiPartShape::read(&mut cur, shape_type)?;
            parts.into_polygons()?
        }
        ShapeType::NullShape => unreachable!(),
    };
    Ok(Some(geom))
}

fn remaining(cur: &Cursor<&[u8]>) -> usize {
    cur.get_ref().len().saturating_sub(cur.position() as usize)
}

fn read_point(cur: &mut Cursor<&[u8]>, shape_type: ShapeType) -> Result<Geometry> {
    let x = cur.read_f64::<LittleEndian>()?;
    let y = cur.read_f64::<LittleEndian>()?;
    let z = if shape_type.has_z() {
        if remaining(cur) >= size_of::<f64>() {
            Some(cur.read_f64::<LittleEndian>()?)
        } else {
            warn!("point record ends before its Z value, defaulting to 0");
            Some(0.0)
        }
    } else {
        None
    };
    // The trailing M value, when present, is not part of the model.
    Ok(Geometry::Point(Point::new(GeoPoint::new(x, y, z)?)))
}

fn read_multipoint(cur: &mut Cursor<&[u8]>, shape_type: ShapeType) -> Result<Geometry> {
    skip_bbox(cur)?;
    let num_points = read_count(cur, "point count")?;
    let coords = read_xy(cur, num_points)?;
    let z_values = if shape_type.has_z() {
        read_dim_values(cur, num_points)
    } else {
        Vec::new()
    };

    let mut points = Vec::with_capacity(num_points);
    for (idx, (x, y)) in coords.into_iter().enumerate() {
        let z = z_values.get(idx).copied();
        points.push(Point::new(GeoPoint::new(x, y, z)?));
    }
    Ok(Geometry::MultiPoint(MultiPoint {
        points,
        attrs: Default::default(),
    }))
}

/// The shared layout of polyline and polygon records: a part-offset table
/// over one flat vertex array, with optional Z and M sections.
struct MultiPartShape {
    /// Part start offsets plus a trailing sentinel equal to the number of
    /// points, so each part is `parts_index[i]..parts_index[i+1]`.
    parts_index: Vec<usize>,
    coords: Vec<(f64, f64)>,
    z_values: Vec<f64>,
}

impl MultiPartShape {
    fn read(cur: &mut Cursor<&[u8]>, shape_type: ShapeType) -> Result<MultiPartShape> {
        skip_bbox(cur)?;
        let num_parts = read_count(cur, "part count")?;
        let num_points = read_count(cur, "point count")?;

        let mut parts_index = Vec::with_capacity(num_parts + 1);
        for _ in 0..num_parts {
            let ofs = read_count(cur, "part offset")?;
            if ofs > num_points {
                return Err(GisError::malformed(
                    "shapefile",
                    format!("part offset {ofs} beyond point count {num_points}"),
                ));
            }
            parts_index.push(ofs);
        }
        parts_index.push(num_points);

        let coords = read_xy(cur, num_points)?;
        let z_values = if shape_type.has_z() {
            read_dim_values(cur, num_points)
        } else {
            Vec::new()
        };

        Ok(MultiPartShape {
            parts_index,
            coords,
            z_values,
        })
    }

    fn part_points(&self, part: usize) -> Result<Vec<GeoPoint>> {
        let (start, end) = (self.parts_index[part], self.parts_index[part + 1]);
        let mut points = Vec::with_capacity(end.saturating_sub(start));
        for ofs in start..end {
            let (x, y) = self.coords[ofs];
            let z = self.z_values.get(ofs).copied();
            points.push(GeoPoint::new(x, y, z)?);
        }
        Ok(points)
    }

    fn num_parts(&self) -> usize {
        self.parts_index.len() - 1
    }

    fn into_lines(self) -> Result<Geometry> {
        let mut lines = Vec::with_capacity(self.num_parts());
        for part in 0..self.num_parts() {
            let points = self.part_points(part)?;
            if points.is_empty() {
                continue;
            }
            lines.push(Line::new(points)?);
        }
        if lines.len() == 1 {
            let mut lines = lines;
            Ok(Geometry::Line(lines.remove(0)))
        } else {
            Ok(Geometry::MultiLine(MultiLine {
                lines,
                attrs: Default::default(),
            }))
        }
    }

    fn into_polygons(self) -> Result<Geometry> {
        let mut rings = Vec::with_capacity(self.num_parts());
        for part in 0..self.num_parts() {
            let points = self.part_points(part)?;
            if points.is_empty() {
                continue;
            }
            rings.push(LinearRing::new_unchecked(points));
        }
        let mut polygons = nest_rings(rings);
        if polygons.is_empty() {
            return Err(GisError::UnsupportedGeometry(
                "polygon record with no rings".to_string(),
            ));
        }
        if polygons.len() == 1 {
            Ok(Geometry::Polygon(polygons.remove(0)))
        } else {
            Ok(Geometry::MultiPolygons(MultiPolygons {
                polygons,
                attrs: Default::default(),
            }))
        }
    }
}

fn skip_bbox(cur: &mut Cursor<&[u8]>) -> Result<()> {
    for _ in 0..4 {
        cur.read_f64::<LittleEndian>()?;
    }
    Ok(())
}

fn read_count(cur: &mut Cursor<&[u8]>, what: &str) -> Result<usize> {
    let n = cur.read_i32::<LittleEndian>()?;
    usize::try_from(n)
        .map_err(|_| GisError::malformed("shapefile", format!("negative {what}: {n}")))
}

fn read_xy(cur: &mut Cursor<&[u8]>, num_points: usize) -> Result<Vec<(f64, f64)>> {
    let mut coords = Vec::with_capacity(num_points);
    for _ in 0..num_points {
        let x = cur.read_f64::<LittleEndian>()?;
        let y = cur.read_f64::<LittleEndian>()?;
        coords.push((x, y));
    }
    Ok(coords)
}

/// Reads a Z (or M) section: a min/max range followed by one value per
/// point. A short buffer fills the tail with zeros instead of failing.
fn read_dim_values(cur: &mut Cursor<&[u8]>, num_points: usize) -> Vec<f64> {
    let mut values = Vec::with_capacity(num_points);
    let mut truncated = false;
    for _ in 0..2 {
        if remaining(cur) >= size_of::<f64>() {
            let _ = cur.read_f64::<LittleEndian>();
        } else {
            truncated = true;
        }
    }
    for _ in 0..num_points {
        if !truncated && remaining(cur) >= size_of::<f64>() {
            match cur.read_f64::<LittleEndian>() {
                Ok(v) => values.push(v),
                Err(_) => {
                    truncated = true;
                    values.push(0.0);
                }
            }
        } else {
            truncated = true;
            values.push(0.0);
        }
    }
    if truncated {
        warn!("record ends before all Z/M values, missing values default to 0");
    }
    values
}
