//! Error and Result types.
use thiserror::Error;

/// Fatal stream errors.
///
/// Recoverable record-level problems (bad coordinate, degenerate ring,
/// unknown altitude mode, malformed timestamp or color) never surface here;
/// they are logged at warn level and the offending record is skipped or the
/// field falls back to its documented default.
#[derive(Error, Debug)]
pub enum GisError {
    #[error("I/O error `{0}`")]
    Io(#[from] std::io::Error),
    /// Unrecoverable framing or signature problem in the source document.
    #[error("malformed {format}: {detail}")]
    Malformed { format: &'static str, detail: String },
    #[error("coordinate out of range: {0}")]
    InvalidCoordinate(String),
    #[error("unsupported shape type code `{0}`")]
    UnsupportedShapeType(i32),
    #[error("unsupported geometry: {0}")]
    UnsupportedGeometry(String),
    #[error("stream is closed")]
    StreamClosed,
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error("XML error `{0}`")]
    Xml(#[from] quick_xml::Error),
    #[error("dBase error `{0}`")]
    Dbase(#[from] dbase::Error),
}

impl GisError {
    pub(crate) fn malformed(format: &'static str, detail: impl Into<String>) -> Self {
        GisError::Malformed {
            format,
            detail: detail.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, GisError>;
