//! Shapefile main-file header.

use crate::error::{GisError, Result};
use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use std::fmt;
use std::io::Read;

pub(crate) const HEADER_SIZE: usize = 100;
const FILE_CODE: i32 = 9994;
const VERSION: i32 = 1000;
/// Unused reserved words between the file code and the length field.
const SIZE_OF_SKIP: usize = std::mem::size_of::<i32>() * 5;

/// Min/max extent over x, y, z and m as stored in the header.
#[derive(Copy, Clone, PartialEq, Debug, Default)]
pub struct BBoxZM {
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
    pub z_min: f64,
    pub z_max: f64,
    pub m_min: f64,
    pub m_max: f64,
}

/// The 100-byte shapefile header. Fields before byte 36 are big-endian,
/// everything after is little-endian.
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct Header {
    /// Total file length (header + records) in 16-bit words.
    pub file_length: i32,
    pub shape_type: ShapeType,
    pub bbox: BBoxZM,
}

impl Header {
    pub fn read_from<T: Read>(source: &mut T) -> Result<Header> {
        let file_code = source.read_i32::<BigEndian>()?;
        if file_code != FILE_CODE {
            return Err(GisError::malformed(
                "shapefile",
                format!("invalid file code {file_code}, expected {FILE_CODE}"),
            ));
        }

        let mut skip = [0u8; SIZE_OF_SKIP];
        source.read_exact(&mut skip)?;

        let file_length = source.read_i32::<BigEndian>()?;
        let version = source.read_i32::<LittleEndian>()?;
        if version != VERSION {
            return Err(GisError::malformed(
                "shapefile",
                format!("invalid version {version}, expected {VERSION}"),
            ));
        }
        let shape_type = ShapeType::read_from(source)?;

        let mut bbox = BBoxZM::default();
        bbox.x_min = source.read_f64::<LittleEndian>()?;
        bbox.y_min = source.read_f64::<LittleEndian>()?;
        bbox.x_max = source.read_f64::<LittleEndian>()?;
        bbox.y_max = source.read_f64::<LittleEndian>()?;
        bbox.z_min = source.read_f64::<LittleEndian>()?;
        bbox.z_max = source.read_f64::<LittleEndian>()?;
        bbox.m_min = source.read_f64::<LittleEndian>()?;
        bbox.m_max = source.read_f64::<LittleEndian>()?;

        Ok(Header {
            file_length,
            shape_type,
            bbox,
        })
    }
}

/// Shape type codes. The base code plus 10 is the Z form, plus 20 the
/// measured form.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum ShapeType {
    NullShape = 0,
    Point = 1,
    MultiLine = 3,
    Polygon = 5,
    MultiPoint = 8,

    PointZ = 11,
    MultiLineZ = 13,
    PolygonZ = 15,
    MultiPointZ = 18,

    PointM = 21,
    MultiLineM = 23,
    PolygonM = 25,
    MultiPointM = 28,
}

impl ShapeType {
    pub(crate) fn read_from<T: Read>(source: &mut T) -> Result<ShapeType> {
        let code = source.read_i32::<LittleEndian>()?;
        Self::from_code(code).ok_or(GisError::UnsupportedShapeType(code))
    }

    pub fn from_code(code: i32) -> Option<ShapeType> {
        match code {
            0 => Some(ShapeType::NullShape),
            1 => Some(ShapeType::Point),
            3 => Some(ShapeType::MultiLine),
            5 => Some(ShapeType::Polygon),
            8 => Some(ShapeType::MultiPoint),
            11 => Some(ShapeType::PointZ),
            13 => Some(ShapeType::MultiLineZ),
            15 => Some(ShapeType::PolygonZ),
            18 => Some(ShapeType::MultiPointZ),
            21 => Some(ShapeType::PointM),
            23 => Some(ShapeType::MultiLineM),
            25 => Some(ShapeType::PolygonM),
            28 => Some(ShapeType::MultiPointM),
            _ => None,
        }
    }

    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn has_z(self) -> bool {
        matches!(
            self,
            ShapeType::PointZ
                | ShapeType::MultiLineZ
                | ShapeType::PolygonZ
                | ShapeType::MultiPointZ
        )
    }

    pub fn has_m(self) -> bool {
        self.has_z()
            || matches!(
                self,
                ShapeType::PointM
                    | ShapeType::MultiLineM
                    | ShapeType::PolygonM
                    | ShapeType::MultiPointM
            )
    }
}

impl fmt::Display for ShapeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ShapeType::NullShape => "NullShape",
            ShapeType::Point => "Point",
            ShapeType::MultiLine => "MultiLine",
            ShapeType::Polygon => "Polygon",
            ShapeType::MultiPoint => "MultiPoint",
            ShapeType::PointZ => "PointZ",
            ShapeType::MultiLineZ => "MultiLineZ",
            ShapeType::PolygonZ => "PolygonZ",
            ShapeType::MultiPointZ => "MultiPointZ",
            ShapeType::PointM => "PointM",
            ShapeType::MultiLineM => "MultiLineM",
            ShapeType::PolygonM => "PolygonM",
            ShapeType::MultiPointM => "MultiPointM",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;
    use std::io::{Cursor, Seek, SeekFrom};

    fn header_bytes(file_code: i32, version: i32, shape_type: i32) -> Cursor<Vec<u8>> {
        let mut src = Cursor::new(vec![]);
        src.write_i32::<BigEndian>(file_code).unwrap();
        for _ in 0..5 {
            src.write_i32::<BigEndian>(0).unwrap();
        }
        src.write_i32::<BigEndian>(50).unwrap();
        src.write_i32::<LittleEndian>(version).unwrap();
        src.write_i32::<LittleEndian>(shape_type).unwrap();
        for _ in 0..8 {
            src.write_f64::<LittleEndian>(0.0).unwrap();
        }
        src.seek(SeekFrom::Start(0)).unwrap();
        src
    }

    #[test]
    fn wrong_file_code() {
        let mut src = header_bytes(42, 1000, 1);
        assert!(Header::read_from(&mut src).is_err());
    }

    #[test]
    fn wrong_version() {
        let mut src = header_bytes(9994, 999, 1);
        assert!(Header::read_from(&mut src).is_err());
    }

    #[test]
    fn unsupported_shape_type() {
        let mut src = header_bytes(9994, 1000, 31);
        assert!(matches!(
            Header::read_from(&mut src),
            Err(GisError::UnsupportedShapeType(31))
        ));
    }

    #[test]
    fn valid_header() {
        let mut src = header_bytes(9994, 1000, 5);
        let hdr = Header::read_from(&mut src).unwrap();
        assert_eq!(hdr.shape_type, ShapeType::Polygon);
        assert_eq!(hdr.file_length, 50);
    }

    #[test]
    fn z_and_m_flags() {
        assert!(ShapeType::PolygonZ.has_z());
        assert!(ShapeType::PolygonZ.has_m());
        assert!(ShapeType::PointM.has_m());
        assert!(!ShapeType::PointM.has_z());
        assert!(!ShapeType::MultiPoint.has_m());
        assert_eq!(ShapeType::from_code(60), None);
    }
}
