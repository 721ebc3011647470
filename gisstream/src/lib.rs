//! Event-driven streaming of vector GIS documents.
//!
//! GisStream reads and writes GIS documents (features, geometries,
//! schemas, styles, containers) behind a single sequential object model:
//! a consumer repeatedly calls [`GisInputStream::read`] and receives the
//! next [Event] in document order, or `None` at end of stream. Output
//! streams mirror this with [`GisOutputStream::write`].
//!
//! Supported formats: OGC KML (streaming pull-parse with sloppy-input
//! recovery) and ESRI shapefiles (`.shp`/`.dbf`/`.prj`, including
//! outer/inner polygon ring reconstruction).
//!
//! ## Reading a KML document
//!
//! ```rust
//! use gisstream::kml::{KmlReader, KmlReaderOptions};
//! use gisstream::{Event, GisInputStream};
//!
//! # fn main() -> gisstream::error::Result<()> {
//! let doc = r#"<kml xmlns="http://www.opengis.net/kml/2.2">
//!   <Placemark><name>A</name><Point><coordinates>10,20</coordinates></Point></Placemark>
//! </kml>"#;
//! let mut reader = KmlReader::from_reader(doc.as_bytes(), &KmlReaderOptions::default())?;
//! while let Some(event) = reader.read()? {
//!     if let Event::Feature(feature) = event {
//!         println!("{:?}", feature.name);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
mod events;
pub mod feature;
pub mod geodetic;
pub mod geometry;
pub mod kml;
pub mod shp;

pub use events::{DocumentFormat, DocumentStart, Event, EventQueue, GisInputStream, GisOutputStream};
pub use feature::{
    AtomHeader, ContainerEnd, ContainerStart, ContainerType, Element, Feature, FeatureKind,
    FieldType, NetworkLinkControl, Row, Schema, SimpleField, Style, StyleMap, StyleRef, Value,
};
pub use geodetic::{GeoBounds, GeoPoint, Geodetic2DPoint, Geodetic3DPoint, Latitude, Longitude};
pub use geometry::{AltitudeMode, GeomAttrs, Geometry};

/// Options for the external CSV adapter. The core only declares the
/// configuration surface; the adapter itself lives outside this crate.
#[derive(Debug, Clone)]
pub struct CsvOptions {
    /// URI of a schema describing the columns, when known up front.
    pub schema_uri: Option<String>,
    pub line_delimiter: Option<String>,
    pub value_delimiter: char,
    pub quote: char,
}

impl Default for CsvOptions {
    fn default() -> Self {
        CsvOptions {
            schema_uri: None,
            line_delimiter: None,
            value_delimiter: ',',
            quote: '"',
        }
    }
}
