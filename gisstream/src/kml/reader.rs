//! Streaming KML pull-parser.
//!
//! The parser walks the XML event stream and turns it into GIS events,
//! buffering look-ahead in an [EventQueue]: KML allows `Style`, `StyleMap`
//! and `Schema` elements inside the feature that references them, but
//! consumers want them first, so inline definitions are queued ahead of
//! their feature. Container properties are read ahead of the
//! `ContainerStart` they belong to for the same reason.
//!
//! Element-level problems (bad coordinates, unknown altitude modes,
//! unparsable colors or timestamps) are logged and skipped; only malformed
//! XML is fatal.

use crate::error::{GisError, Result};
use crate::events::{DocumentFormat, DocumentStart, Event, EventQueue, GisInputStream};
use crate::feature::{
    BalloonStyle, ContainerEnd, ContainerStart, ContainerType, Element, Feature, FeatureKind,
    FieldType, IconStyle, LabelStyle, LineStyle, ListStyle, NetworkLinkControl, PolyStyle, Schema,
    SimpleField, Style, StyleMap, StyleRef, Value,
};
use crate::geodetic::GeoPoint;
use crate::geometry::{
    AltitudeMode, GeomAttrs, Geometry, GeometryBag, Line, LinearRing, Model, MultiPoint, Point,
    Polygon,
};
use crate::kml::color::parse_color;
use crate::kml::coord::parse_coordinates;
use crate::kml::time::parse_kml_time;
use crate::kml::{
    is_foreign_namespace, KmlReaderOptions, NsClass, GX_NAMESPACE_PREFIX, KML_NAMESPACES,
};
use log::{debug, warn};
use quick_xml::events::{BytesStart, Event as XmlEvent};
use quick_xml::Reader as XmlReader;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Schema filter predicate: return `false` to suppress a schema and every
/// feature carrying it.
pub type SchemaAccepter = Box<dyn Fn(&Schema) -> bool>;

/// An element name split into prefix and local part, with its attributes
/// decoded.
struct Tag {
    prefix: Option<String>,
    local: String,
    attrs: Vec<(String, String)>,
}

/// Splits a raw qualified name into prefix and local part.
fn split_qname(raw: &[u8]) -> (Option<String>, String) {
    let raw = String::from_utf8_lossy(raw).into_owned();
    match raw.split_once(':') {
        Some((p, l)) => (Some(p.to_string()), l.to_string()),
        None => (None, raw),
    }
}

impl Tag {
    fn of(e: &BytesStart) -> Tag {
        let (prefix, local) = split_qname(e.name().as_ref());
        let mut attrs = Vec::new();
        for a in e.attributes().flatten() {
            let key = String::from_utf8_lossy(a.key.as_ref()).into_owned();
            let value = a
                .unescape_value()
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| String::from_utf8_lossy(&a.value).into_owned());
            attrs.push((key, value));
        }
        Tag {
            prefix,
            local,
            attrs,
        }
    }

    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

fn feature_kind(local: &str) -> Option<FeatureKind> {
    match local {
        "Placemark" => Some(FeatureKind::Placemark),
        "NetworkLink" => Some(FeatureKind::NetworkLink),
        "GroundOverlay" => Some(FeatureKind::GroundOverlay),
        "ScreenOverlay" => Some(FeatureKind::ScreenOverlay),
        "PhotoOverlay" => Some(FeatureKind::PhotoOverlay),
        _ => None,
    }
}

fn is_geometry_tag(local: &str) -> bool {
    matches!(
        local,
        "Point" | "LineString" | "LinearRing" | "Polygon" | "MultiGeometry" | "Model"
    )
}

fn parse_kml_bool(text: &str) -> Option<bool> {
    match text.trim() {
        "1" | "true" => Some(true),
        "0" | "false" => Some(false),
        _ => None,
    }
}

/// KML input stream.
pub struct KmlReader<R: BufRead> {
    xml: XmlReader<R>,
    queue: EventQueue,
    schemas: Vec<Schema>,
    /// Schemas by URI, for typing `SchemaData` values.
    schema_by_uri: HashMap<String, Schema>,
    /// Schema `parent` aliases: element name -> aliased feature tag.
    aliases: HashMap<String, String>,
    /// Prefix -> namespace URI; the default namespace is keyed by `""`.
    namespaces: HashMap<String, String>,
    kml_namespaces: HashSet<String>,
    open_containers: Vec<ContainerType>,
    schema_accepter: Option<SchemaAccepter>,
    rejected_schemas: HashSet<String>,
    started: bool,
    finished: bool,
    closed: bool,
}

impl KmlReader<BufReader<File>> {
    pub fn from_path<P: AsRef<Path>>(path: P, options: &KmlReaderOptions) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file), options)
    }
}

impl<R: BufRead> KmlReader<R> {
    pub fn from_reader(source: R, options: &KmlReaderOptions) -> Result<Self> {
        let enc = options.encoding.as_str();
        if !enc.eq_ignore_ascii_case("utf-8") && !enc.eq_ignore_ascii_case("us-ascii") {
            return Err(GisError::Configuration(format!(
                "unsupported encoding `{enc}`"
            )));
        }
        let mut xml = XmlReader::from_reader(source);
        xml.config_mut().trim_text(true);
        xml.config_mut().check_end_names = true;
        Ok(KmlReader {
            xml,
            queue: EventQueue::new(),
            schemas: Vec::new(),
            schema_by_uri: HashMap::new(),
            aliases: HashMap::new(),
            namespaces: HashMap::new(),
            kml_namespaces: KML_NAMESPACES.iter().map(|s| (*s).to_string()).collect(),
            open_containers: Vec::new(),
            schema_accepter: None,
            rejected_schemas: HashSet::new(),
            started: false,
            finished: false,
            closed: false,
        })
    }

    pub fn set_schema_accepter(&mut self, accepter: SchemaAccepter) {
        self.schema_accepter = Some(accepter);
    }

    // --- XML plumbing ---

    fn read_xml<'b>(&mut self, buf: &'b mut Vec<u8>) -> Result<XmlEvent<'b>> {
        buf.clear();
        self.xml
            .read_event_into(buf)
            .map_err(|e| GisError::malformed("KML", e.to_string()))
    }

    fn register_namespaces(&mut self, tag: &Tag) {
        for (key, value) in &tag.attrs {
            if key == "xmlns" {
                self.namespaces.insert(String::new(), value.clone());
                // A KML-shaped default namespace outside the preloaded set
                // is registered on first sight.
                if value.contains("/kml") && !value.contains("/kml/ext") {
                    self.kml_namespaces.insert(value.clone());
                }
            } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                self.namespaces.insert(prefix.to_string(), value.clone());
            }
        }
    }

    fn classify(&self, prefix: Option<&str>) -> NsClass {
        let uri = match prefix {
            Some(p) => self.namespaces.get(p),
            None => self.namespaces.get(""),
        };
        match uri {
            Some(u) if self.kml_namespaces.contains(u) => NsClass::Kml,
            Some(u) if u.starts_with(GX_NAMESPACE_PREFIX) => NsClass::Gx,
            Some(u) if is_foreign_namespace(u) => NsClass::Foreign,
            // The conventional atom/xal prefixes stay foreign whatever URI
            // they were declared under.
            Some(_) => match prefix {
                Some("atom" | "xal") => NsClass::Foreign,
                _ => NsClass::Other,
            },
            // Sloppy documents omit declarations; fall back on conventional
            // prefixes and treat unprefixed elements as KML.
            None => match prefix {
                None => NsClass::Kml,
                Some("gx") => NsClass::Gx,
                Some("atom" | "xal") => NsClass::Foreign,
                Some(_) => NsClass::Other,
            },
        }
    }

    fn classify_tag(&self, tag: &Tag) -> NsClass {
        self.classify(tag.prefix.as_deref())
    }

    /// Collects the text content of the current element, consuming its end
    /// tag. Nested markup contributes its text.
    fn read_text(&mut self) -> Result<String> {
        let mut buf = Vec::new();
        let mut text = String::new();
        let mut depth = 1usize;
        loop {
            match self.read_xml(&mut buf)? {
                XmlEvent::Start(_) => depth += 1,
                XmlEvent::End(_) => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                XmlEvent::Text(t) => {
                    let piece = t
                        .unescape()
                        .map(|c| c.into_owned())
                        .unwrap_or_else(|_| String::from_utf8_lossy(&t).into_owned());
                    text.push_str(&piece);
                }
                XmlEvent::CData(t) => text.push_str(&String::from_utf8_lossy(&t)),
                XmlEvent::Eof => break,
                _ => {}
            }
        }
        Ok(text)
    }

    /// Consumes the rest of the current element without producing anything.
    fn skip_subtree(&mut self) -> Result<()> {
        let mut buf = Vec::new();
        let mut depth = 1usize;
        loop {
            match self.read_xml(&mut buf)? {
                XmlEvent::Start(_) => depth += 1,
                XmlEvent::End(_) => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                XmlEvent::Eof => break,
                _ => {}
            }
        }
        Ok(())
    }

    /// Flattens the simple descendants of the current element into a
    /// name -> text map. Used for Region, LookAt/Camera, Link and
    /// NetworkLinkControl, whose nested values are all leaf text.
    fn read_kv_subtree(&mut self, is_empty: bool) -> Result<HashMap<String, String>> {
        let mut map = HashMap::new();
        if is_empty {
            return Ok(map);
        }
        let mut buf = Vec::new();
        let mut depth = 1usize;
        let mut current: Option<String> = None;
        loop {
            match self.read_xml(&mut buf)? {
                XmlEvent::Start(e) => {
                    depth += 1;
                    current = Some(Tag::of(&e).local);
                }
                XmlEvent::Text(t) => {
                    if let Some(key) = &current {
                        let text = t
                            .unescape()
                            .map(|c| c.into_owned())
                            .unwrap_or_else(|_| String::from_utf8_lossy(&t).into_owned());
                        map.insert(key.clone(), text.trim().to_string());
                    }
                }
                XmlEvent::End(_) => {
                    current = None;
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                XmlEvent::Eof => break,
                _ => {}
            }
        }
        Ok(map)
    }

    /// Captures a foreign-namespace sub-tree verbatim.
    fn capture_element(&mut self, tag: &Tag, is_empty: bool) -> Result<Element> {
        let mut element = Element::new(tag.local.clone());
        element.prefix = tag.prefix.clone();
        element.namespace = match tag.prefix.as_deref() {
            Some(p) => self.namespaces.get(p).cloned(),
            None => self.namespaces.get("").cloned(),
        };
        element.attributes = tag.attrs.clone();
        if is_empty {
            return Ok(element);
        }
        let mut buf = Vec::new();
        loop {
            match self.read_xml(&mut buf)? {
                XmlEvent::Start(e) => {
                    let child_tag = Tag::of(&e);
                    let child = self.capture_element(&child_tag, false)?;
                    element.children.push(child);
                }
                XmlEvent::Empty(e) => {
                    let child_tag = Tag::of(&e);
                    let child = self.capture_element(&child_tag, true)?;
                    element.children.push(child);
                }
                XmlEvent::Text(t) => {
                    let piece = t
                        .unescape()
                        .map(|c| c.into_owned())
                        .unwrap_or_else(|_| String::from_utf8_lossy(&t).into_owned());
                    element.text.push_str(&piece);
                }
                XmlEvent::CData(t) => element.text.push_str(&String::from_utf8_lossy(&t)),
                XmlEvent::End(_) | XmlEvent::Eof => break,
                _ => {}
            }
        }
        Ok(element)
    }

    // --- document-level parsing ---

    /// Pulls XML until at least one GIS event is queued or the document
    /// ends.
    fn advance(&mut self) -> Result<()> {
        let mut buf = Vec::new();
        loop {
            if self.queue.has_saved() || self.finished {
                return Ok(());
            }
            match self.read_xml(&mut buf)? {
                XmlEvent::Start(e) => {
                    let tag = Tag::of(&e);
                    self.register_namespaces(&tag);
                    self.ensure_started();
                    if tag.local == "kml" && self.classify_tag(&tag) == NsClass::Kml {
                        continue;
                    }
                    self.dispatch_structural(&tag, false)?;
                }
                XmlEvent::Empty(e) => {
                    let tag = Tag::of(&e);
                    self.register_namespaces(&tag);
                    self.ensure_started();
                    if tag.local == "kml" && self.classify_tag(&tag) == NsClass::Kml {
                        continue;
                    }
                    self.dispatch_structural(&tag, true)?;
                }
                XmlEvent::End(e) => {
                    let (prefix, local) = split_qname(e.name().as_ref());
                    if matches!(local.as_str(), "Document" | "Folder")
                        && self.classify(prefix.as_deref()) == NsClass::Kml
                        && self.open_containers.pop().is_some()
                    {
                        self.queue.push_back(Event::ContainerEnd(ContainerEnd));
                    }
                }
                XmlEvent::Comment(c) => {
                    if self.started {
                        let text = String::from_utf8_lossy(&c).into_owned();
                        self.queue.push_back(Event::Comment(text));
                    }
                }
                XmlEvent::Eof => {
                    self.finished = true;
                    // Unclosed containers in sloppy input still get their
                    // matching end events.
                    while self.open_containers.pop().is_some() {
                        self.queue.push_back(Event::ContainerEnd(ContainerEnd));
                    }
                }
                _ => {}
            }
        }
    }

    fn ensure_started(&mut self) {
        if !self.started {
            self.started = true;
            self.queue.push_back(Event::DocumentStart(DocumentStart {
                format: DocumentFormat::Kml,
            }));
        }
    }

    /// Handles an element that produces document-level events.
    fn dispatch_structural(&mut self, tag: &Tag, is_empty: bool) -> Result<()> {
        match self.classify_tag(tag) {
            NsClass::Kml => match tag.local.as_str() {
                "Document" => self.handle_container(ContainerType::Document, tag, is_empty),
                "Folder" => self.handle_container(ContainerType::Folder, tag, is_empty),
                "Style" => {
                    let style = self.parse_style(tag, is_empty)?;
                    self.queue.push_back(Event::Style(style));
                    Ok(())
                }
                "StyleMap" => {
                    let map = self.parse_style_map(tag, is_empty)?;
                    self.queue.push_back(Event::StyleMap(map));
                    Ok(())
                }
                "Schema" => self.parse_schema(tag, is_empty),
                "NetworkLinkControl" => {
                    let values = self.read_kv_subtree(is_empty)?;
                    self.queue
                        .push_back(Event::NetworkLinkControl(NetworkLinkControl { values }));
                    Ok(())
                }
                "kml" => Ok(()),
                local => {
                    let kind = feature_kind(local).or_else(|| {
                        self.aliases
                            .get(local)
                            .and_then(|target| feature_kind(target))
                    });
                    if let Some(kind) = kind {
                        let (side_events, feature) = self.parse_feature(kind, tag, is_empty)?;
                        for event in side_events {
                            self.queue.push_back(event);
                        }
                        self.queue.push_back(Event::Feature(Box::new(feature)));
                        Ok(())
                    } else {
                        debug!("skipping unrecognized KML element <{local}>");
                        if !is_empty {
                            self.skip_subtree()?;
                        }
                        Ok(())
                    }
                }
            },
            NsClass::Gx | NsClass::Foreign => {
                let element = self.capture_element(tag, is_empty)?;
                self.queue.push_back(Event::Element(element));
                Ok(())
            }
            NsClass::Other => {
                debug!("skipping element <{}> in unhandled namespace", tag.local);
                if !is_empty {
                    self.skip_subtree()?;
                }
                Ok(())
            }
        }
    }

    /// Opens a container: its simple properties are read ahead so the
    /// ContainerStart carries them, then the first structural child (if
    /// any) is dispatched behind it.
    fn handle_container(
        &mut self,
        container_type: ContainerType,
        tag: &Tag,
        is_empty: bool,
    ) -> Result<()> {
        let mut start = ContainerStart::new(container_type);
        start.id = tag.attr("id").map(str::to_string);

        if is_empty {
            self.queue.push_back(Event::ContainerStart(start));
            self.queue.push_back(Event::ContainerEnd(ContainerEnd));
            return Ok(());
        }

        let mut buf = Vec::new();
        loop {
            match self.read_xml(&mut buf)? {
                XmlEvent::Start(e) => {
                    let child = Tag::of(&e);
                    self.register_namespaces(&child);
                    if self.classify_tag(&child) == NsClass::Kml {
                        match child.local.as_str() {
                            "name" => start.name = Some(self.read_text()?),
                            "description" => start.description = Some(self.read_text()?),
                            "visibility" => {
                                start.visibility = parse_kml_bool(&self.read_text()?);
                            }
                            "open" => start.open = parse_kml_bool(&self.read_text()?),
                            "styleUrl" => {
                                start.style_url = Some(self.read_text()?.trim().to_string());
                            }
                            local if self.is_structural(local) => {
                                self.queue.push_back(Event::ContainerStart(start));
                                self.open_containers.push(container_type);
                                return self.dispatch_structural(&child, false);
                            }
                            local => {
                                debug!("skipping container element <{local}>");
                                self.skip_subtree()?;
                            }
                        }
                    } else {
                        self.queue.push_back(Event::ContainerStart(start));
                        self.open_containers.push(container_type);
                        return self.dispatch_structural(&child, false);
                    }
                }
                XmlEvent::Empty(e) => {
                    let child = Tag::of(&e);
                    self.register_namespaces(&child);
                    if self.classify_tag(&child) == NsClass::Kml && !self.is_structural(&child.local)
                    {
                        continue;
                    }
                    self.queue.push_back(Event::ContainerStart(start));
                    self.open_containers.push(container_type);
                    return self.dispatch_structural(&child, true);
                }
                XmlEvent::End(_) => {
                    self.queue.push_back(Event::ContainerStart(start));
                    self.queue.push_back(Event::ContainerEnd(ContainerEnd));
                    return Ok(());
                }
                XmlEvent::Comment(c) => {
                    let text = String::from_utf8_lossy(&c).into_owned();
                    self.queue.push_back(Event::ContainerStart(start));
                    self.open_containers.push(container_type);
                    self.queue.push_back(Event::Comment(text));
                    return Ok(());
                }
                XmlEvent::Eof => {
                    self.finished = true;
                    self.queue.push_back(Event::ContainerStart(start));
                    self.queue.push_back(Event::ContainerEnd(ContainerEnd));
                    return Ok(());
                }
                _ => {}
            }
        }
    }

    fn is_structural(&self, local: &str) -> bool {
        matches!(
            local,
            "Document" | "Folder" | "Style" | "StyleMap" | "Schema" | "NetworkLinkControl"
        ) || feature_kind(local).is_some()
            || self.aliases.contains_key(local)
    }

    // --- feature parsing ---

    /// Parses one feature sub-tree. Inline styles come back as side events
    /// to be emitted ahead of the feature itself.
    fn parse_feature(
        &mut self,
        kind: FeatureKind,
        tag: &Tag,
        is_empty: bool,
    ) -> Result<(Vec<Event>, Feature)> {
        let mut feature = Feature::new(kind);
        feature.id = tag.attr("id").map(str::to_string);
        let mut side_events = Vec::new();
        if is_empty {
            return Ok((side_events, feature));
        }

        let mut buf = Vec::new();
        loop {
            match self.read_xml(&mut buf)? {
                XmlEvent::Start(e) => {
                    let child = Tag::of(&e);
                    self.register_namespaces(&child);
                    self.handle_feature_child(&mut feature, &mut side_events, &child, false)?;
                }
                XmlEvent::Empty(e) => {
                    let child = Tag::of(&e);
                    self.register_namespaces(&child);
                    self.handle_feature_child(&mut feature, &mut side_events, &child, true)?;
                }
                XmlEvent::End(_) => break,
                XmlEvent::Eof => break,
                _ => {}
            }
        }
        Ok((side_events, feature))
    }

    fn handle_feature_child(
        &mut self,
        feature: &mut Feature,
        side_events: &mut Vec<Event>,
        child: &Tag,
        is_empty: bool,
    ) -> Result<()> {
        match self.classify_tag(child) {
            NsClass::Kml => self.handle_kml_property(feature, side_events, child, is_empty),
            NsClass::Gx | NsClass::Foreign => {
                let element = self.capture_element(child, is_empty)?;
                feature.elements.push(element);
                Ok(())
            }
            NsClass::Other => {
                if !is_empty {
                    self.skip_subtree()?;
                }
                Ok(())
            }
        }
    }

    /// Shared feature property handling.
    fn handle_kml_property(
        &mut self,
        feature: &mut Feature,
        side_events: &mut Vec<Event>,
        child: &Tag,
        is_empty: bool,
    ) -> Result<()> {
        if is_empty {
            // Empty property elements carry no information.
            return Ok(());
        }
        match child.local.as_str() {
            "name" => feature.name = Some(self.read_text()?),
            "description" => feature.description = Some(self.read_text()?),
            "visibility" => feature.visibility = parse_kml_bool(&self.read_text()?),
            "open" => feature.open = parse_kml_bool(&self.read_text()?),
            "address" => feature.address = Some(self.read_text()?),
            "phoneNumber" => feature.phone_number = Some(self.read_text()?),
            "Snippet" | "snippet" => feature.snippet = Some(self.read_text()?),
            "styleUrl" => feature.style_url = Some(self.read_text()?.trim().to_string()),
            "Style" => {
                let style = self.parse_style(child, false)?;
                if let Some(id) = &style.id {
                    feature.style_url = Some(format!("#{id}"));
                }
                side_events.push(Event::Style(style));
            }
            "StyleMap" => {
                let map = self.parse_style_map(child, false)?;
                if let Some(id) = &map.id {
                    feature.style_url = Some(format!("#{id}"));
                }
                side_events.push(Event::StyleMap(map));
            }
            "Region" => feature.region = Some(self.read_kv_subtree(false)?),
            "TimeStamp" => {
                let values = self.read_kv_subtree(false)?;
                if let Some(when) = values.get("when") {
                    match parse_kml_time(when) {
                        Some(t) => {
                            feature.start_time = Some(t);
                            feature.end_time = Some(t);
                        }
                        None => warn!("unparsable TimeStamp value `{when}`"),
                    }
                }
            }
            "TimeSpan" => {
                let values = self.read_kv_subtree(false)?;
                for (key, slot) in [
                    ("begin", &mut feature.start_time),
                    ("end", &mut feature.end_time),
                ] {
                    if let Some(raw) = values.get(key) {
                        match parse_kml_time(raw) {
                            Some(t) => *slot = Some(t),
                            None => warn!("unparsable TimeSpan {key} `{raw}`"),
                        }
                    }
                }
            }
            kind @ ("LookAt" | "Camera") => {
                let mut values = self.read_kv_subtree(false)?;
                values.insert("__kind".to_string(), kind.to_string());
                feature.view_group = Some(values);
            }
            "ExtendedData" => self.parse_extended_data(feature)?,
            "Metadata" => self.parse_metadata(feature)?,
            "Link" | "Url" if feature.kind == FeatureKind::NetworkLink => {
                let values = self.read_kv_subtree(false)?;
                feature.link = values.get("href").cloned();
            }
            local if is_geometry_tag(local) => {
                let geometry = self.parse_geometry(child, false)?;
                if feature.geometry.is_some() && geometry.is_some() {
                    warn!("feature has more than one geometry, keeping the first");
                } else if feature.geometry.is_none() {
                    feature.geometry = geometry;
                }
            }
            local => {
                debug!("skipping unrecognized feature element <{local}>");
                self.skip_subtree()?;
            }
        }
        Ok(())
    }

    /// Legacy `Metadata` wrapper: children are preserved as foreign
    /// elements.
    fn parse_metadata(&mut self, feature: &mut Feature) -> Result<()> {
        let mut buf = Vec::new();
        loop {
            match self.read_xml(&mut buf)? {
                XmlEvent::Start(e) => {
                    let tag = Tag::of(&e);
                    let element = self.capture_element(&tag, false)?;
                    feature.elements.push(element);
                }
                XmlEvent::Empty(e) => {
                    let tag = Tag::of(&e);
                    let element = self.capture_element(&tag, true)?;
                    feature.elements.push(element);
                }
                XmlEvent::End(_) | XmlEvent::Eof => break,
                _ => {}
            }
        }
        Ok(())
    }

    fn parse_extended_data(&mut self, feature: &mut Feature) -> Result<()> {
        let mut buf = Vec::new();
        loop {
            match self.read_xml(&mut buf)? {
                XmlEvent::Start(e) => {
                    let tag = Tag::of(&e);
                    match (self.classify_tag(&tag), tag.local.as_str()) {
                        (NsClass::Kml, "Data") => {
                            let name = tag.attr("name").map(str::to_string);
                            let value = self.parse_data_value()?;
                            match name {
                                Some(name) => feature.row.set(name, Value::String(value)),
                                None => debug!("skipping <Data> without a name"),
                            }
                        }
                        (NsClass::Kml, "SchemaData") => {
                            self.parse_schema_data(feature, &tag)?;
                        }
                        (NsClass::Kml, local) => {
                            debug!("skipping ExtendedData element <{local}>");
                            self.skip_subtree()?;
                        }
                        _ => {
                            let element = self.capture_element(&tag, false)?;
                            feature.elements.push(element);
                        }
                    }
                }
                XmlEvent::Empty(e) => {
                    let tag = Tag::of(&e);
                    if self.classify_tag(&tag) != NsClass::Kml {
                        let element = self.capture_element(&tag, true)?;
                        feature.elements.push(element);
                    }
                }
                XmlEvent::End(_) | XmlEvent::Eof => break,
                _ => {}
            }
        }
        Ok(())
    }

    /// Reads `<Data>`: the value child text, ignoring displayName.
    fn parse_data_value(&mut self) -> Result<String> {
        let mut buf = Vec::new();
        let mut value = String::new();
        loop {
            match self.read_xml(&mut buf)? {
                XmlEvent::Start(e) => {
                    let tag = Tag::of(&e);
                    if tag.local == "value" {
                        value = self.read_text()?;
                    } else {
                        self.skip_subtree()?;
                    }
                }
                XmlEvent::End(_) | XmlEvent::Eof => break,
                _ => {}
            }
        }
        Ok(value)
    }

    /// Reads `<SchemaData>`. When several are present on one feature the
    /// last reference wins.
    fn parse_schema_data(&mut self, feature: &mut Feature, tag: &Tag) -> Result<()> {
        let schema_url = tag.attr("schemaUrl").map(str::to_string);
        if let Some(url) = &schema_url {
            feature.row.schema_uri = Some(url.clone());
        }
        let schema = schema_url.as_ref().and_then(|u| self.schema_by_uri.get(u)).cloned();
        let mut buf = Vec::new();
        loop {
            match self.read_xml(&mut buf)? {
                XmlEvent::Start(e) => {
                    let child = Tag::of(&e);
                    if child.local == "SimpleData" {
                        let name = child.attr("name").map(str::to_string);
                        let text = self.read_text()?;
                        if let Some(name) = name {
                            let value = schema
                                .as_ref()
                                .and_then(|s| s.field(&name))
                                .map_or_else(
                                    || Value::String(text.clone()),
                                    |f| Value::from_typed_str(f.field_type, &text),
                                );
                            feature.row.set(name, value);
                        }
                    } else {
                        debug!("skipping SchemaData element <{}>", child.local);
                        self.skip_subtree()?;
                    }
                }
                XmlEvent::End(_) | XmlEvent::Eof => break,
                _ => {}
            }
        }
        Ok(())
    }

    // --- schema parsing ---

    fn parse_schema(&mut self, tag: &Tag, is_empty: bool) -> Result<()> {
        let name = tag.attr("name").map(str::to_string);
        let id = tag.attr("id").map(str::to_string);
        let parent = tag.attr("parent").map(str::to_string);
        let uri = match (&id, &name) {
            (Some(id), _) => format!("#{id}"),
            (None, Some(name)) => format!("urn:schema:{name}"),
            (None, None) => "urn:schema:anonymous".to_string(),
        };
        let mut schema = Schema::new(uri);
        schema.name = name.clone();

        if !is_empty {
            let mut buf = Vec::new();
            loop {
                match self.read_xml(&mut buf)? {
                    XmlEvent::Start(e) => {
                        let child = Tag::of(&e);
                        if child.local == "SimpleField" {
                            let field = self.parse_simple_field(&child, false)?;
                            self.add_schema_field(&mut schema, field);
                        } else {
                            debug!("skipping Schema element <{}>", child.local);
                            self.skip_subtree()?;
                        }
                    }
                    XmlEvent::Empty(e) => {
                        let child = Tag::of(&e);
                        if child.local == "SimpleField" {
                            let field = self.parse_simple_field(&child, true)?;
                            self.add_schema_field(&mut schema, field);
                        }
                    }
                    XmlEvent::End(_) | XmlEvent::Eof => break,
                    _ => {}
                }
            }
        }

        // A `parent` attribute aliases a user-chosen element name to a
        // standard feature, consulted when an unknown element turns up
        // inside a Document.
        if let (Some(alias), Some(target)) = (&name, &parent) {
            if feature_kind(target).is_some() {
                self.aliases.insert(alias.clone(), target.clone());
            }
        }

        if let Some(accepter) = &self.schema_accepter {
            if !accepter(&schema) {
                debug!("schema `{}` rejected by accepter", schema.uri());
                self.rejected_schemas.insert(schema.uri().to_string());
                return Ok(());
            }
        }
        self.schema_by_uri
            .insert(schema.uri().to_string(), schema.clone());
        self.schemas.push(schema.clone());
        self.queue.push_back(Event::Schema(schema));
        Ok(())
    }

    fn add_schema_field(&mut self, schema: &mut Schema, field: Option<SimpleField>) {
        if let Some(field) = field {
            if let Err(e) = schema.add_field(field) {
                warn!("{e}");
            }
        }
    }

    fn parse_simple_field(&mut self, tag: &Tag, is_empty: bool) -> Result<Option<SimpleField>> {
        let name = tag.attr("name").map(str::to_string);
        let type_attr = tag.attr("type").unwrap_or("string");
        let field_type = FieldType::parse(type_attr).unwrap_or_else(|| {
            warn!("unknown SimpleField type `{type_attr}`, treating as string");
            FieldType::String
        });
        let mut alias = None;
        if !is_empty {
            let mut buf = Vec::new();
            loop {
                match self.read_xml(&mut buf)? {
                    XmlEvent::Start(e) => {
                        let child = Tag::of(&e);
                        if child.local == "displayName" {
                            alias = Some(self.read_text()?);
                        } else {
                            self.skip_subtree()?;
                        }
                    }
                    XmlEvent::End(_) | XmlEvent::Eof => break,
                    _ => {}
                }
            }
        }
        let Some(name) = name else {
            debug!("skipping SimpleField without a name");
            return Ok(None);
        };
        let mut field = SimpleField::new(name, field_type);
        field.alias_name = alias;
        Ok(Some(field))
    }

    // --- style parsing ---

    fn parse_style(&mut self, tag: &Tag, is_empty: bool) -> Result<Style> {
        let mut style = Style::new(tag.attr("id").map(str::to_string));
        if is_empty {
            return Ok(style);
        }
        let mut buf = Vec::new();
        loop {
            match self.read_xml(&mut buf)? {
                XmlEvent::Start(e) => {
                    let child = Tag::of(&e);
                    match child.local.as_str() {
                        "IconStyle" => {
                            let m = self.read_kv_subtree(false)?;
                            style.icon = Some(IconStyle {
                                color: kv_color(&m, "color"),
                                scale: kv_f64(&m, "scale"),
                                heading: kv_f64(&m, "heading"),
                                href: m.get("href").cloned(),
                            });
                        }
                        "LineStyle" => {
                            let m = self.read_kv_subtree(false)?;
                            style.line = Some(LineStyle {
                                color: kv_color(&m, "color"),
                                width: kv_f64(&m, "width"),
                            });
                        }
                        "PolyStyle" => {
                            let m = self.read_kv_subtree(false)?;
                            style.poly = Some(PolyStyle {
                                color: kv_color(&m, "color"),
                                fill: m.get("fill").and_then(|v| parse_kml_bool(v)),
                                outline: m.get("outline").and_then(|v| parse_kml_bool(v)),
                            });
                        }
                        "LabelStyle" => {
                            let m = self.read_kv_subtree(false)?;
                            style.label = Some(LabelStyle {
                                color: kv_color(&m, "color"),
                                scale: kv_f64(&m, "scale"),
                            });
                        }
                        "BalloonStyle" => {
                            let m = self.read_kv_subtree(false)?;
                            style.balloon = Some(BalloonStyle {
                                bg_color: kv_color(&m, "bgColor"),
                                text_color: kv_color(&m, "textColor"),
                                text: m.get("text").cloned(),
                                display_mode: m.get("displayMode").cloned(),
                            });
                        }
                        "ListStyle" => {
                            let m = self.read_kv_subtree(false)?;
                            style.list = Some(ListStyle {
                                bg_color: kv_color(&m, "bgColor"),
                                list_item_type: m.get("listItemType").cloned(),
                            });
                        }
                        local => {
                            debug!("skipping Style element <{local}>");
                            self.skip_subtree()?;
                        }
                    }
                }
                XmlEvent::End(_) | XmlEvent::Eof => break,
                _ => {}
            }
        }
        Ok(style)
    }

    fn parse_style_map(&mut self, tag: &Tag, is_empty: bool) -> Result<StyleMap> {
        let mut map = StyleMap {
            id: tag.attr("id").map(str::to_string),
            ..StyleMap::default()
        };
        if is_empty {
            return Ok(map);
        }
        let mut buf = Vec::new();
        loop {
            match self.read_xml(&mut buf)? {
                XmlEvent::Start(e) => {
                    let child = Tag::of(&e);
                    if child.local == "Pair" {
                        self.parse_style_pair(&mut map)?;
                    } else {
                        debug!("skipping StyleMap element <{}>", child.local);
                        self.skip_subtree()?;
                    }
                }
                XmlEvent::End(_) | XmlEvent::Eof => break,
                _ => {}
            }
        }
        Ok(map)
    }

    fn parse_style_pair(&mut self, map: &mut StyleMap) -> Result<()> {
        let mut key = "normal".to_string();
        let mut style_ref: Option<StyleRef> = None;
        let mut buf = Vec::new();
        loop {
            match self.read_xml(&mut buf)? {
                XmlEvent::Start(e) => {
                    let child = Tag::of(&e);
                    match child.local.as_str() {
                        "key" => key = self.read_text()?.trim().to_string(),
                        "styleUrl" => {
                            style_ref = Some(StyleRef::Url(self.read_text()?.trim().to_string()));
                        }
                        "Style" => {
                            let style = self.parse_style(&child, false)?;
                            style_ref = Some(StyleRef::Inline(Box::new(style)));
                        }
                        local => {
                            debug!("skipping Pair element <{local}>");
                            self.skip_subtree()?;
                        }
                    }
                }
                XmlEvent::End(_) | XmlEvent::Eof => break,
                _ => {}
            }
        }
        match key.as_str() {
            "normal" => map.normal = style_ref,
            "highlight" => map.highlight = style_ref,
            other => warn!("unknown StyleMap key `{other}`"),
        }
        Ok(())
    }

    // --- geometry parsing ---

    fn parse_geometry(&mut self, tag: &Tag, is_empty: bool) -> Result<Option<Geometry>> {
        if is_empty {
            return Ok(None);
        }
        match tag.local.as_str() {
            "Point" | "LineString" | "LinearRing" => self.parse_coordinate_geometry(&tag.local),
            "Polygon" => self.parse_polygon(),
            "MultiGeometry" => self.parse_multi_geometry(),
            "Model" => self.parse_model(),
            local => {
                debug!("skipping unrecognized geometry <{local}>");
                self.skip_subtree()?;
                Ok(None)
            }
        }
    }

    /// Reads the shared attribute elements of a geometry. Returns `true`
    /// when the child was consumed.
    fn parse_geom_attr(
        &mut self,
        child: &Tag,
        attrs: &mut GeomAttrs,
        gx_altitude: &mut Option<AltitudeMode>,
    ) -> Result<bool> {
        match (self.classify_tag(child), child.local.as_str()) {
            (NsClass::Kml, "altitudeMode") => {
                let text = self.read_text()?;
                match AltitudeMode::parse(&text) {
                    Some(mode) => attrs.altitude_mode = Some(mode),
                    None => warn!("unknown altitudeMode `{}`", text.trim()),
                }
                Ok(true)
            }
            (NsClass::Gx, "altitudeMode") => {
                let text = self.read_text()?;
                *gx_altitude = AltitudeMode::parse(&text);
                Ok(true)
            }
            (NsClass::Kml, "extrude") => {
                attrs.extrude = parse_kml_bool(&self.read_text()?);
                Ok(true)
            }
            (NsClass::Kml, "tessellate") => {
                attrs.tessellate = parse_kml_bool(&self.read_text()?);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn parse_coordinate_geometry(&mut self, local: &str) -> Result<Option<Geometry>> {
        let mut attrs = GeomAttrs::default();
        let mut gx_altitude = None;
        let mut points: Vec<GeoPoint> = Vec::new();
        let mut buf = Vec::new();
        loop {
            match self.read_xml(&mut buf)? {
                XmlEvent::Start(e) => {
                    let child = Tag::of(&e);
                    if self.parse_geom_attr(&child, &mut attrs, &mut gx_altitude)? {
                        continue;
                    }
                    if child.local == "coordinates" {
                        points = parse_coordinates(&self.read_text()?);
                    } else {
                        debug!("skipping geometry element <{}>", child.local);
                        self.skip_subtree()?;
                    }
                }
                XmlEvent::End(_) | XmlEvent::Eof => break,
                _ => {}
            }
        }
        // The KML altitude mode wins over gx: when both are present.
        if attrs.altitude_mode.is_none() {
            attrs.altitude_mode = gx_altitude;
        }
        Ok(coerce_by_count(local, points, attrs))
    }

    fn parse_polygon(&mut self) -> Result<Option<Geometry>> {
        let mut attrs = GeomAttrs::default();
        let mut gx_altitude = None;
        let mut outer: Vec<GeoPoint> = Vec::new();
        let mut inners: Vec<Vec<GeoPoint>> = Vec::new();
        let mut buf = Vec::new();
        loop {
            match self.read_xml(&mut buf)? {
                XmlEvent::Start(e) => {
                    let child = Tag::of(&e);
                    if self.parse_geom_attr(&child, &mut attrs, &mut gx_altitude)? {
                        continue;
                    }
                    match child.local.as_str() {
                        "outerBoundaryIs" => {
                            if let Some(ring) = self.parse_boundary()?.into_iter().next() {
                                outer = ring;
                            }
                        }
                        "innerBoundaryIs" => inners.extend(self.parse_boundary()?),
                        local => {
                            debug!("skipping Polygon element <{local}>");
                            self.skip_subtree()?;
                        }
                    }
                }
                XmlEvent::End(_) | XmlEvent::Eof => break,
                _ => {}
            }
        }
        if attrs.altitude_mode.is_none() {
            attrs.altitude_mode = gx_altitude;
        }
        if outer.len() >= 4 {
            // Inner rings with fewer than four points are accepted as-is.
            let inner_rings = inners
                .into_iter()
                .filter(|r| !r.is_empty())
                .map(LinearRing::new_unchecked)
                .collect();
            let mut polygon = Polygon::new(LinearRing::new_unchecked(outer), inner_rings);
            polygon.attrs = attrs;
            Ok(Some(Geometry::Polygon(polygon)))
        } else {
            // Degenerate outer boundary collapses like a bare ring would.
            Ok(coerce_by_count("LinearRing", outer, attrs))
        }
    }

    /// Reads an outer/inner boundary wrapper, returning the coordinate
    /// list of every ring inside it.
    fn parse_boundary(&mut self) -> Result<Vec<Vec<GeoPoint>>> {
        let mut rings = Vec::new();
        let mut buf = Vec::new();
        let mut depth = 1usize;
        loop {
            match self.read_xml(&mut buf)? {
                XmlEvent::Start(e) => {
                    let child = Tag::of(&e);
                    if child.local == "coordinates" {
                        rings.push(parse_coordinates(&self.read_text()?));
                    } else {
                        depth += 1;
                    }
                }
                XmlEvent::End(_) => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                XmlEvent::Eof => break,
                _ => {}
            }
        }
        Ok(rings)
    }

    fn parse_multi_geometry(&mut self) -> Result<Option<Geometry>> {
        let mut children: Vec<Geometry> = Vec::new();
        let mut buf = Vec::new();
        loop {
            match self.read_xml(&mut buf)? {
                XmlEvent::Start(e) => {
                    let child = Tag::of(&e);
                    if is_geometry_tag(&child.local) {
                        if let Some(geometry) = self.parse_geometry(&child, false)? {
                            children.push(geometry);
                        }
                    } else {
                        debug!("skipping MultiGeometry element <{}>", child.local);
                        self.skip_subtree()?;
                    }
                }
                XmlEvent::End(_) | XmlEvent::Eof => break,
                _ => {}
            }
        }
        if children.is_empty() {
            return Ok(None);
        }
        if children.len() == 1 {
            return Ok(children.pop());
        }
        // All-points collections become a MultiPoint; anything mixed stays
        // a heterogeneous bag.
        if children.iter().all(|g| matches!(g, Geometry::Point(_))) {
            let points = children
                .into_iter()
                .map(|g| match g {
                    Geometry::Point(p) => p,
                    _ => unreachable!(),
                })
                .collect();
            Ok(Some(Geometry::MultiPoint(MultiPoint {
                points,
                attrs: GeomAttrs::default(),
            })))
        } else {
            Ok(Some(Geometry::GeometryBag(GeometryBag {
                geometries: children,
                attrs: GeomAttrs::default(),
            })))
        }
    }

    fn parse_model(&mut self) -> Result<Option<Geometry>> {
        let mut attrs = GeomAttrs::default();
        let mut gx_altitude = None;
        let mut location = None;
        let mut buf = Vec::new();
        loop {
            match self.read_xml(&mut buf)? {
                XmlEvent::Start(e) => {
                    let child = Tag::of(&e);
                    if self.parse_geom_attr(&child, &mut attrs, &mut gx_altitude)? {
                        continue;
                    }
                    if child.local == "Location" {
                        let values = self.read_kv_subtree(false)?;
                        let lon = values.get("longitude").and_then(|v| v.parse::<f64>().ok());
                        let lat = values.get("latitude").and_then(|v| v.parse::<f64>().ok());
                        let alt = values.get("altitude").and_then(|v| v.parse::<f64>().ok());
                        if let (Some(lon), Some(lat)) = (lon, lat) {
                            match GeoPoint::new(lon, lat, alt) {
                                Ok(p) => location = Some(p),
                                Err(e) => warn!("dropping Model location: {e}"),
                            }
                        }
                    } else {
                        self.skip_subtree()?;
                    }
                }
                XmlEvent::End(_) | XmlEvent::Eof => break,
                _ => {}
            }
        }
        if attrs.altitude_mode.is_none() {
            attrs.altitude_mode = gx_altitude;
        }
        Ok(Some(Geometry::Model(Model { location, attrs })))
    }
}

fn kv_color(map: &HashMap<String, String>, key: &str) -> Option<crate::feature::Color> {
    let raw = map.get(key)?;
    let color = parse_color(raw);
    if color.is_none() {
        warn!("unparsable color `{raw}`");
    }
    color
}

fn kv_f64(map: &HashMap<String, String>, key: &str) -> Option<f64> {
    map.get(key).and_then(|v| v.parse::<f64>().ok())
}

/// Degenerate-shape coercion shared by bare geometries and polygon
/// boundaries: too few points for the declared shape yield the closest
/// shape the points support.
fn coerce_by_count(local: &str, points: Vec<GeoPoint>, attrs: GeomAttrs) -> Option<Geometry> {
    let n = points.len();
    match local {
        "Point" => {
            if n > 1 {
                warn!("Point with {n} coordinate tuples, keeping the first");
            }
            points.into_iter().next().map(|p| {
                let mut point = Point::new(p);
                point.attrs = attrs;
                Geometry::Point(point)
            })
        }
        "LineString" => match n {
            0 => {
                warn!("LineString without coordinates");
                None
            }
            1 => {
                warn!("LineString with a single point, emitting Point");
                coerce_by_count("Point", points, attrs)
            }
            _ => Line::new(points).ok().map(|mut line| {
                line.attrs = attrs;
                Geometry::Line(line)
            }),
        },
        "LinearRing" => match n {
            0 => {
                warn!("LinearRing without coordinates");
                None
            }
            1 => {
                warn!("LinearRing with a single point, emitting Point");
                coerce_by_count("Point", points, attrs)
            }
            2 | 3 => {
                warn!("LinearRing with {n} points, emitting Line");
                Line::new(points).ok().map(|mut line| {
                    line.attrs = attrs;
                    Geometry::Line(line)
                })
            }
            _ => {
                let mut ring = LinearRing::new_unchecked(points);
                ring.attrs = attrs;
                Some(Geometry::LinearRing(ring))
            }
        },
        _ => None,
    }
}

impl<R: BufRead> GisInputStream for KmlReader<R> {
    fn read(&mut self) -> Result<Option<Event>> {
        if self.closed {
            return Err(GisError::StreamClosed);
        }
        loop {
            while let Some(event) = self.queue.read_saved() {
                // Features carrying a rejected schema are suppressed along
                // with it.
                if let Event::Feature(f) = &event {
                    if f.schema_uri()
                        .is_some_and(|uri| self.rejected_schemas.contains(uri))
                    {
                        continue;
                    }
                }
                return Ok(Some(event));
            }
            if self.finished {
                return Ok(None);
            }
            self.advance()?;
        }
    }

    fn pushback(&mut self, event: Event) {
        self.queue.push_front(event);
    }

    fn close(&mut self) {
        self.closed = true;
        self.queue.clear();
    }

    fn schemas(&self) -> &[Schema] {
        &self.schemas
    }
}
