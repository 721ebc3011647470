//! KML input and output streams.

mod color;
mod coord;
mod reader;
mod time;
mod writer;

pub use reader::KmlReader;
pub use writer::KmlWriter;

/// Namespace URIs of the KML families parsed normally. An unregistered
/// KML-shaped default namespace on the root element is added on first
/// sight so later elements are recognized.
pub(crate) const KML_NAMESPACES: &[&str] = &[
    "http://www.opengis.net/kml/2.2",
    "http://www.opengis.net/kml/2.3",
    "http://www.opengis.net/kml/3.0",
    "http://earth.google.com/kml/2.0",
    "http://earth.google.com/kml/2.1",
    "http://earth.google.com/kml/2.2",
];

/// Google's KML extension namespace family (`gx:`).
pub(crate) const GX_NAMESPACE_PREFIX: &str = "http://www.google.com/kml/ext/";

/// Namespaces preserved as foreign elements (atom and friends).
pub(crate) const W3_NAMESPACE_PREFIX: &str = "http://www.w3.org/";

/// xAL is published under an OASIS urn, not www.w3.org.
pub(crate) const XAL_NAMESPACE_PREFIX: &str = "urn:oasis:names:tc:ciq:xsdschema:xAL:";

/// Whether a declared namespace URI is preserved as foreign elements.
pub(crate) fn is_foreign_namespace(uri: &str) -> bool {
    uri.starts_with(W3_NAMESPACE_PREFIX) || uri.starts_with(XAL_NAMESPACE_PREFIX)
}

/// How an element's namespace is treated.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub(crate) enum NsClass {
    /// Parsed normally.
    Kml,
    /// Captured as foreign elements, except `gx:altitudeMode` which folds
    /// into the KML altitude mode.
    Gx,
    /// Preserved as foreign elements on the parent feature.
    Foreign,
    /// Skipped.
    Other,
}

#[derive(Debug, Clone)]
pub struct KmlReaderOptions {
    /// Document encoding. Only UTF-8 (and its ASCII subset) is supported.
    pub encoding: String,
    /// Accepted for configuration symmetry; resolving linked documents is
    /// the collaborator's job, the reader only surfaces NetworkLink
    /// features.
    pub follow_network_links: bool,
}

impl Default for KmlReaderOptions {
    fn default() -> Self {
        KmlReaderOptions {
            encoding: "UTF-8".to_string(),
            follow_network_links: false,
        }
    }
}
