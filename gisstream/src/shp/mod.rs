//! ESRI shapefile input stream.
//!
//! Consumes the co-located `<name>.shp` (binary geometry), `<name>.dbf`
//! (attributes) and optional `<name>.prj` (projection WKT) files. A fourth
//! optional sibling, `<name>.shm`, carries style as a KML style fragment.
//! The stream surfaces any sidecar styles first, then the dBase schema,
//! then one [Feature] per record with the geometry from the `.shp` record
//! and the attribute values from the matching `.dbf` row.

mod dbf;
mod header;
mod prj;
mod record;
mod ring;

pub use header::{BBoxZM, Header, ShapeType};
pub use ring::nest_rings;

use crate::error::{GisError, Result};
use crate::events::{Event, EventQueue, GisInputStream};
use crate::feature::{Feature, FeatureKind, Schema};
use crate::kml::{KmlReader, KmlReaderOptions};
use crate::shp::record::{decode_record, RecordHeader};
use log::warn;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

/// Schema filter predicate: return `false` to suppress a schema and every
/// feature carrying it.
pub type SchemaAccepter = Box<dyn Fn(&Schema) -> bool>;

#[derive(Debug, Default, Clone)]
pub struct ShpReaderOptions {
    /// Fail instead of warn when the `.prj` names a datum other than
    /// WGS-84.
    pub strict_prj_check: bool,
}

/// Shapefile input stream over any byte source positioned at the file
/// header. Use [`ShpReader::from_path`] for the usual sibling-file layout.
pub struct ShpReader<R: Read> {
    source: Option<R>,
    header: Header,
    schema: Option<Schema>,
    dbf_records: VecDeque<dbase::Record>,
    queue: EventQueue,
    schemas: Vec<Schema>,
    schema_accepter: Option<SchemaAccepter>,
    schema_pending: bool,
    schema_rejected: bool,
    /// Bytes of the `.shp` consumed so far.
    pos: usize,
    /// Total `.shp` size in bytes, from the header's word count.
    end: usize,
    closed: bool,
}

impl<R: Read> ShpReader<R> {
    /// Reads the file header and prepares a stream without attributes.
    pub fn new(mut source: R) -> Result<Self> {
        let header = Header::read_from(&mut source)?;
        let end = header.file_length as usize * 2;
        Ok(ShpReader {
            source: Some(source),
            header,
            schema: None,
            dbf_records: VecDeque::new(),
            queue: EventQueue::new(),
            schemas: Vec::new(),
            schema_accepter: None,
            schema_pending: false,
            schema_rejected: false,
            pos: header::HEADER_SIZE,
            end,
            closed: false,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Attaches a dBase table: its columns become the schema and its rows
    /// the per-record attribute values.
    pub fn attach_dbf<T: Read + std::io::Seek>(
        &mut self,
        mut dbf: dbase::Reader<T>,
        schema_uri: &str,
    ) -> Result<()> {
        let schema = dbf::schema_from_dbf(schema_uri, dbf.fields());
        self.dbf_records = dbf.read()?.into();
        self.schemas.push(schema.clone());
        self.schema = Some(schema);
        self.schema_pending = true;
        Ok(())
    }

    pub fn set_schema_accepter(&mut self, accepter: SchemaAccepter) {
        self.schema_accepter = Some(accepter);
    }

    /// Queues sidecar styles for emission ahead of the schema and the
    /// features.
    pub fn attach_styles(&mut self, styles: Vec<Event>) {
        for event in styles {
            if matches!(event, Event::Style(_) | Event::StyleMap(_)) {
                self.queue.push_back(event);
            }
        }
    }

    fn next_feature(&mut self) -> Result<Option<Event>> {
        loop {
            if self.pos >= self.end {
                return Ok(None);
            }
            let source = self.source.as_mut().ok_or(GisError::StreamClosed)?;
            let hdr = match RecordHeader::read_from(source) {
                Ok(hdr) => hdr,
                // End of file exactly at a record boundary is normal
                // termination even when the header word count says more.
                Err(GisError::Io(e)) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
                Err(e) => return Err(e),
            };
            if hdr.content_length < 2 {
                return Err(GisError::malformed(
                    "shapefile",
                    format!("record content length {} too small", hdr.content_length),
                ));
            }
            let mut body = vec![0u8; hdr.content_length as usize * 2];
            source.read_exact(&mut body)?;
            self.pos += RecordHeader::SIZE + body.len();

            // Keep attribute rows aligned with records even when one is
            // skipped.
            let dbf_record = self.dbf_records.pop_front();

            match decode_record(&body, self.header.shape_type) {
                Ok(geometry) => {
                    let mut feature = Feature::new(FeatureKind::Placemark);
                    feature.geometry = geometry;
                    if let (Some(schema), Some(record)) = (&self.schema, &dbf_record) {
                        feature.row.schema_uri = Some(schema.uri().to_string());
                        for field in schema.fields() {
                            feature
                                .row
                                .set(field.name.clone(), dbf::field_value(record, &field.name));
                        }
                    }
                    return Ok(Some(Event::Feature(Box::new(feature))));
                }
                Err(e @ (GisError::InvalidCoordinate(_) | GisError::UnsupportedGeometry(_))) => {
                    warn!("skipping shapefile record: {e}");
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Reads a `.shm` style sidecar: a KML fragment whose `Style` and
/// `StyleMap` elements apply to the shapefile's features.
fn read_shm_styles(path: &Path) -> Result<Vec<Event>> {
    let mut reader = KmlReader::from_path(path, &KmlReaderOptions::default())?;
    let mut styles = Vec::new();
    while let Some(event) = reader.read()? {
        if matches!(event, Event::Style(_) | Event::StyleMap(_)) {
            styles.push(event);
        }
    }
    Ok(styles)
}

impl ShpReader<BufReader<File>> {
    /// Opens `<name>.shp` along with its `.dbf`, `.prj` and `.shm`
    /// siblings when present. The `.prj` datum check warns (or fails,
    /// under `strict_prj_check`) on non-WGS-84 data but never converts.
    pub fn from_path<P: AsRef<Path>>(path: P, options: &ShpReaderOptions) -> Result<Self> {
        let shp_path = path.as_ref().to_path_buf();
        let dbf_path = shp_path.with_extension("dbf");
        let prj_path = shp_path.with_extension("prj");
        let shm_path = shp_path.with_extension("shm");

        let source = BufReader::new(File::open(&shp_path)?);
        let mut reader = Self::new(source)?;

        if prj_path.exists() {
            let wkt = std::fs::read_to_string(&prj_path)?;
            match prj::geogcs_name(&wkt) {
                Some(name) if prj::is_wgs84(&name) => {}
                Some(name) if options.strict_prj_check => {
                    return Err(GisError::Configuration(format!(
                        "projection is {name}, expected WGS-84"
                    )));
                }
                Some(name) => warn!("projection is {name}, expected WGS-84; proceeding"),
                None => warn!("no GEOGCS entry in {}", prj_path.display()),
            }
        }

        if shm_path.exists() {
            // Style is optional; a broken sidecar never fails the stream.
            match read_shm_styles(&shm_path) {
                Ok(styles) => reader.attach_styles(styles),
                Err(e) => warn!("ignoring style sidecar {}: {e}", shm_path.display()),
            }
        }

        if dbf_path.exists() {
            let stem = shp_path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "shapefile".to_string());
            let dbf = dbase::Reader::from_path(&dbf_path)?;
            reader.attach_dbf(dbf, &format!("#{stem}"))?;
        }
        Ok(reader)
    }
}

impl<R: Read> GisInputStream for ShpReader<R> {
    fn read(&mut self) -> Result<Option<Event>> {
        if self.closed {
            return Err(GisError::StreamClosed);
        }
        if let Some(event) = self.queue.read_saved() {
            return Ok(Some(event));
        }
        if self.schema_rejected {
            return Ok(None);
        }
        if self.schema_pending {
            self.schema_pending = false;
            if let Some(schema) = &self.schema {
                if let Some(accepter) = &self.schema_accepter {
                    if !accepter(schema) {
                        self.schema_rejected = true;
                        return Ok(None);
                    }
                }
                return Ok(Some(Event::Schema(schema.clone())));
            }
        }
        self.next_feature()
    }

    fn pushback(&mut self, event: Event) {
        self.queue.push_front(event);
    }

    fn close(&mut self) {
        self.closed = true;
        self.source = None;
        self.dbf_records.clear();
        self.queue.clear();
    }

    fn schemas(&self) -> &[Schema] {
        &self.schemas
    }
}
