//! KML output stream.
//!
//! Serializes the same event sequence the readers produce. Events must
//! arrive in document order; `close()` balances whatever scopes are still
//! open.

use crate::error::Result;
use crate::events::{Event, GisOutputStream};
use crate::feature::{
    ContainerStart, Element, Feature, FeatureKind, NetworkLinkControl, Row, Schema, Style,
    StyleMap, StyleRef,
};
use crate::geodetic::GeoPoint;
use crate::geometry::{GeomAttrs, Geometry, Line, LinearRing, Polygon};
use chrono::{DateTime, Utc};
use log::debug;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event as XmlEvent};
use quick_xml::Writer as XmlWriter;
use std::collections::HashMap;
use std::io::Write;

const KML_NS: &str = "http://www.opengis.net/kml/2.2";

const LATLON_BOX_KEYS: &[&str] = &[
    "north",
    "south",
    "east",
    "west",
    "minAltitude",
    "maxAltitude",
    "altitudeMode",
];
const LOD_KEYS: &[&str] = &[
    "minLodPixels",
    "maxLodPixels",
    "minFadeExtent",
    "maxFadeExtent",
];
const VIEW_KEYS: &[&str] = &[
    "longitude",
    "latitude",
    "altitude",
    "heading",
    "tilt",
    "roll",
    "range",
    "altitudeMode",
];

/// KML output stream over any writer.
pub struct KmlWriter<W: Write> {
    xml: XmlWriter<W>,
    /// End tags still owed, innermost last.
    open: Vec<&'static str>,
    started: bool,
    closed: bool,
}

impl<W: Write> KmlWriter<W> {
    pub fn new(sink: W) -> Self {
        KmlWriter {
            xml: XmlWriter::new(sink),
            open: Vec::new(),
            started: false,
            closed: false,
        }
    }

    fn ensure_started(&mut self) -> Result<()> {
        if !self.started {
            self.started = true;
            self.xml
                .write_event(XmlEvent::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
            let mut kml = BytesStart::new("kml");
            kml.push_attribute(("xmlns", KML_NS));
            self.xml.write_event(XmlEvent::Start(kml))?;
        }
        Ok(())
    }

    fn start(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<()> {
        let mut tag = BytesStart::new(name);
        for (k, v) in attrs {
            tag.push_attribute((*k, *v));
        }
        self.xml.write_event(XmlEvent::Start(tag))?;
        Ok(())
    }

    fn end(&mut self, name: &str) -> Result<()> {
        self.xml.write_event(XmlEvent::End(BytesEnd::new(name)))?;
        Ok(())
    }

    fn simple(&mut self, name: &str, text: &str) -> Result<()> {
        self.start(name, &[])?;
        self.xml.write_event(XmlEvent::Text(BytesText::new(text)))?;
        self.end(name)
    }

    fn simple_bool(&mut self, name: &str, value: Option<bool>) -> Result<()> {
        if let Some(v) = value {
            self.simple(name, if v { "1" } else { "0" })?;
        }
        Ok(())
    }

    fn simple_opt(&mut self, name: &str, value: Option<&str>) -> Result<()> {
        if let Some(v) = value {
            self.simple(name, v)?;
        }
        Ok(())
    }

    // --- event writers ---

    fn write_container_start(&mut self, c: &ContainerStart) -> Result<()> {
        let tag = c.container_type.tag();
        match &c.id {
            Some(id) => self.start(tag, &[("id", id.as_str())])?,
            None => self.start(tag, &[])?,
        }
        self.open.push(tag);
        self.simple_opt("name", c.name.as_deref())?;
        self.simple_bool("visibility", c.visibility)?;
        self.simple_bool("open", c.open)?;
        self.simple_opt("description", c.description.as_deref())?;
        self.simple_opt("styleUrl", c.style_url.as_deref())?;
        Ok(())
    }

    fn write_schema(&mut self, schema: &Schema) -> Result<()> {
        let mut attrs: Vec<(&str, &str)> = Vec::new();
        if let Some(name) = &schema.name {
            attrs.push(("name", name.as_str()));
        }
        let id = schema.uri().strip_prefix('#');
        if let Some(id) = id {
            attrs.push(("id", id));
        }
        self.start("Schema", &attrs)?;
        for field in schema.fields() {
            self.start(
                "SimpleField",
                &[
                    ("type", field.field_type.as_str()),
                    ("name", field.name.as_str()),
                ],
            )?;
            if let Some(alias) = &field.alias_name {
                self.simple("displayName", alias)?;
            }
            self.end("SimpleField")?;
        }
        self.end("Schema")
    }

    fn write_style(&mut self, style: &Style) -> Result<()> {
        match &style.id {
            Some(id) => self.start("Style", &[("id", id.as_str())])?,
            None => self.start("Style", &[])?,
        }
        if let Some(icon) = &style.icon {
            self.start("IconStyle", &[])?;
            if let Some(c) = icon.color {
                self.simple("color", &c.to_kml())?;
            }
            if let Some(s) = icon.scale {
                self.simple("scale", &s.to_string())?;
            }
            if let Some(h) = icon.heading {
                self.simple("heading", &h.to_string())?;
            }
            if let Some(href) = &icon.href {
                self.start("Icon", &[])?;
                self.simple("href", href)?;
                self.end("Icon")?;
            }
            self.end("IconStyle")?;
        }
        if let Some(line) = &style.line {
            self.start("LineStyle", &[])?;
            if let Some(c) = line.color {
                self.simple("color", &c.to_kml())?;
            }
            if let Some(w) = line.width {
                self.simple("width", &w.to_string())?;
            }
            self.end("LineStyle")?;
        }
        if let Some(poly) = &style.poly {
            self.start("PolyStyle", &[])?;
            if let Some(c) = poly.color {
                self.simple("color", &c.to_kml())?;
            }
            self.simple_bool("fill", poly.fill)?;
            self.simple_bool("outline", poly.outline)?;
            self.end("PolyStyle")?;
        }
        if let Some(label) = &style.label {
            self.start("LabelStyle", &[])?;
            if let Some(c) = label.color {
                self.simple("color", &c.to_kml())?;
            }
            if let Some(s) = label.scale {
                self.simple("scale", &s.to_string())?;
            }
            self.end("LabelStyle")?;
        }
        if let Some(balloon) = &style.balloon {
            self.start("BalloonStyle", &[])?;
            if let Some(c) = balloon.bg_color {
                self.simple("bgColor", &c.to_kml())?;
            }
            if let Some(c) = balloon.text_color {
                self.simple("textColor", &c.to_kml())?;
            }
            self.simple_opt("text", balloon.text.as_deref())?;
            self.simple_opt("displayMode", balloon.display_mode.as_deref())?;
            self.end("BalloonStyle")?;
        }
        if let Some(list) = &style.list {
            self.start("ListStyle", &[])?;
            if let Some(c) = list.bg_color {
                self.simple("bgColor", &c.to_kml())?;
            }
            self.simple_opt("listItemType", list.list_item_type.as_deref())?;
            self.end("ListStyle")?;
        }
        self.end("Style")
    }

    fn write_style_map(&mut self, map: &StyleMap) -> Result<()> {
        match &map.id {
            Some(id) => self.start("StyleMap", &[("id", id.as_str())])?,
            None => self.start("StyleMap", &[])?,
        }
        for (key, style_ref) in [("normal", &map.normal), ("highlight", &map.highlight)] {
            if let Some(style_ref) = style_ref {
                self.start("Pair", &[])?;
                self.simple("key", key)?;
                match style_ref {
                    StyleRef::Url(url) => self.simple("styleUrl", url)?,
                    StyleRef::Inline(style) => self.write_style(style)?,
                }
                self.end("Pair")?;
            }
        }
        self.end("StyleMap")
    }

    fn write_feature(&mut self, feature: &Feature) -> Result<()> {
        let tag = feature.kind.tag();
        match &feature.id {
            Some(id) => self.start(tag, &[("id", id.as_str())])?,
            None => self.start(tag, &[])?,
        }
        self.simple_opt("name", feature.name.as_deref())?;
        self.simple_bool("visibility", feature.visibility)?;
        self.simple_bool("open", feature.open)?;
        self.simple_opt("address", feature.address.as_deref())?;
        self.simple_opt("phoneNumber", feature.phone_number.as_deref())?;
        self.simple_opt("Snippet", feature.snippet.as_deref())?;
        self.simple_opt("description", feature.description.as_deref())?;
        self.write_view_group(feature)?;
        self.write_time(feature.start_time, feature.end_time)?;
        self.simple_opt("styleUrl", feature.style_url.as_deref())?;
        self.write_region(feature)?;
        self.write_extended_data(&feature.row)?;
        if feature.kind == FeatureKind::NetworkLink {
            if let Some(href) = &feature.link {
                self.start("Link", &[])?;
                self.simple("href", href)?;
                self.end("Link")?;
            }
        }
        if let Some(geometry) = &feature.geometry {
            self.write_geometry(geometry)?;
        }
        for element in &feature.elements {
            self.write_element(element)?;
        }
        self.end(tag)
    }

    fn write_view_group(&mut self, feature: &Feature) -> Result<()> {
        let Some(view) = &feature.view_group else {
            return Ok(());
        };
        let kind = match view.get("__kind").map(String::as_str) {
            Some("Camera") => "Camera",
            _ => "LookAt",
        };
        self.start(kind, &[])?;
        self.write_known_then_rest(view, VIEW_KEYS, &["__kind"])?;
        self.end(kind)
    }

    fn write_region(&mut self, feature: &Feature) -> Result<()> {
        let Some(region) = &feature.region else {
            return Ok(());
        };
        self.start("Region", &[])?;
        if LATLON_BOX_KEYS.iter().any(|k| region.contains_key(*k)) {
            self.start("LatLonAltBox", &[])?;
            self.write_known_then_rest(region, LATLON_BOX_KEYS, LOD_KEYS)?;
            self.end("LatLonAltBox")?;
        }
        if LOD_KEYS.iter().any(|k| region.contains_key(*k)) {
            self.start("Lod", &[])?;
            for key in LOD_KEYS {
                if let Some(v) = region.get(*key) {
                    self.simple(key, v)?;
                }
            }
            self.end("Lod")?;
        }
        self.end("Region")
    }

    /// Writes `known` keys in order, then the remainder sorted for stable
    /// output, skipping `exclude`.
    fn write_known_then_rest(
        &mut self,
        map: &HashMap<String, String>,
        known: &[&str],
        exclude: &[&str],
    ) -> Result<()> {
        for key in known {
            if let Some(v) = map.get(*key) {
                self.simple(key, v)?;
            }
        }
        let mut rest: Vec<_> = map
            .iter()
            .filter(|(k, _)| {
                !known.contains(&k.as_str())
                    && !exclude.contains(&k.as_str())
                    && !k.starts_with("__")
            })
            .collect();
        rest.sort();
        for (k, v) in rest {
            self.simple(k, v)?;
        }
        Ok(())
    }

    fn write_time(
        &mut self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let fmt = |t: DateTime<Utc>| t.format("%Y-%m-%dT%H:%M:%SZ").to_string();
        match (start, end) {
            (Some(s), Some(e)) if s == e => {
                self.start("TimeStamp", &[])?;
                self.simple("when", &fmt(s))?;
                self.end("TimeStamp")?;
            }
            (None, None) => {}
            (s, e) => {
                self.start("TimeSpan", &[])?;
                if let Some(s) = s {
                    self.simple("begin", &fmt(s))?;
                }
                if let Some(e) = e {
                    self.simple("end", &fmt(e))?;
                }
                self.end("TimeSpan")?;
            }
        }
        Ok(())
    }

    fn write_extended_data(&mut self, row: &Row) -> Result<()> {
        if row.is_empty() {
            return Ok(());
        }
        self.start("ExtendedData", &[])?;
        if let Some(uri) = &row.schema_uri {
            self.start("SchemaData", &[("schemaUrl", uri.as_str())])?;
            for (name, value) in row.entries() {
                self.start("SimpleData", &[("name", name)])?;
                self.xml
                    .write_event(XmlEvent::Text(BytesText::new(&value.to_string())))?;
                self.end("SimpleData")?;
            }
            self.end("SchemaData")?;
        } else {
            for (name, value) in row.entries() {
                self.start("Data", &[("name", name)])?;
                self.simple("value", &value.to_string())?;
                self.end("Data")?;
            }
        }
        self.end("ExtendedData")
    }

    fn write_row(&mut self, row: &Row) -> Result<()> {
        self.start("Placemark", &[])?;
        self.write_extended_data(row)?;
        self.end("Placemark")
    }

    // --- geometry ---

    fn write_geom_attrs(&mut self, attrs: &GeomAttrs) -> Result<()> {
        self.simple_bool("extrude", attrs.extrude)?;
        self.simple_bool("tessellate", attrs.tessellate)?;
        if let Some(mode) = attrs.altitude_mode {
            self.simple("altitudeMode", mode.as_str())?;
        }
        Ok(())
    }

    fn coordinates_text(points: &[GeoPoint]) -> String {
        points
            .iter()
            .map(|p| match p.elevation() {
                Some(alt) => format!("{},{},{}", p.lon(), p.lat(), alt),
                None => format!("{},{}", p.lon(), p.lat()),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn write_coordinates(&mut self, points: &[GeoPoint]) -> Result<()> {
        self.simple("coordinates", &Self::coordinates_text(points))
    }

    fn write_line(&mut self, tag: &str, line: &Line) -> Result<()> {
        self.start(tag, &[])?;
        self.write_geom_attrs(&line.attrs)?;
        self.write_coordinates(&line.points)?;
        self.end(tag)
    }

    fn write_ring(&mut self, ring: &LinearRing) -> Result<()> {
        self.start("LinearRing", &[])?;
        self.write_geom_attrs(&ring.attrs)?;
        self.write_coordinates(&ring.points)?;
        self.end("LinearRing")
    }

    fn write_polygon(&mut self, polygon: &Polygon) -> Result<()> {
        self.start("Polygon", &[])?;
        self.write_geom_attrs(&polygon.attrs)?;
        self.start("outerBoundaryIs", &[])?;
        self.write_ring(&polygon.outer)?;
        self.end("outerBoundaryIs")?;
        for inner in &polygon.inners {
            self.start("innerBoundaryIs", &[])?;
            self.write_ring(inner)?;
            self.end("innerBoundaryIs")?;
        }
        self.end("Polygon")
    }

    fn write_geometry(&mut self, geometry: &Geometry) -> Result<()> {
        match geometry {
            Geometry::Point(p) => {
                self.start("Point", &[])?;
                self.write_geom_attrs(&p.attrs)?;
                self.write_coordinates(std::slice::from_ref(&p.center))?;
                self.end("Point")
            }
            Geometry::Line(l) => self.write_line("LineString", l),
            Geometry::LinearRing(r) => self.write_ring(r),
            Geometry::Polygon(p) => self.write_polygon(p),
            Geometry::MultiPoint(mp) => {
                self.start("MultiGeometry", &[])?;
                for point in &mp.points {
                    self.write_geometry(&Geometry::Point(point.clone()))?;
                }
                self.end("MultiGeometry")
            }
            Geometry::MultiLine(ml) => {
                self.start("MultiGeometry", &[])?;
                for line in &ml.lines {
                    self.write_line("LineString", line)?;
                }
                self.end("MultiGeometry")
            }
            Geometry::MultiPolygons(mp) => {
                self.start("MultiGeometry", &[])?;
                for polygon in &mp.polygons {
                    self.write_polygon(polygon)?;
                }
                self.end("MultiGeometry")
            }
            Geometry::GeometryBag(bag) => {
                self.start("MultiGeometry", &[])?;
                for child in &bag.geometries {
                    self.write_geometry(child)?;
                }
                self.end("MultiGeometry")
            }
            Geometry::Model(m) => {
                self.start("Model", &[])?;
                self.write_geom_attrs(&m.attrs)?;
                if let Some(loc) = &m.location {
                    self.start("Location", &[])?;
                    self.simple("longitude", &loc.lon().to_string())?;
                    self.simple("latitude", &loc.lat().to_string())?;
                    if let Some(alt) = loc.elevation() {
                        self.simple("altitude", &alt.to_string())?;
                    }
                    self.end("Location")?;
                }
                self.end("Model")
            }
        }
    }

    fn write_element(&mut self, element: &Element) -> Result<()> {
        let name = match &element.prefix {
            Some(prefix) => format!("{prefix}:{}", element.name),
            None => element.name.clone(),
        };
        let mut tag = BytesStart::new(name.as_str());
        for (k, v) in &element.attributes {
            tag.push_attribute((k.as_str(), v.as_str()));
        }
        self.xml.write_event(XmlEvent::Start(tag))?;
        if !element.text.is_empty() {
            self.xml
                .write_event(XmlEvent::Text(BytesText::new(&element.text)))?;
        }
        for child in &element.children {
            self.write_element(child)?;
        }
        self.xml
            .write_event(XmlEvent::End(BytesEnd::new(name.as_str())))?;
        Ok(())
    }

    fn write_network_link_control(&mut self, nlc: &NetworkLinkControl) -> Result<()> {
        self.start("NetworkLinkControl", &[])?;
        let mut keys: Vec<_> = nlc.values.iter().collect();
        keys.sort();
        for (k, v) in keys {
            self.simple(k, v)?;
        }
        self.end("NetworkLinkControl")
    }
}

impl<W: Write> GisOutputStream for KmlWriter<W> {
    fn write(&mut self, event: &Event) -> Result<()> {
        if !matches!(event, Event::DocumentStart(_)) {
            self.ensure_started()?;
        }
        match event {
            Event::DocumentStart(_) => self.ensure_started(),
            Event::ContainerStart(c) => self.write_container_start(c),
            Event::ContainerEnd(_) => {
                if let Some(tag) = self.open.pop() {
                    self.end(tag)?;
                }
                Ok(())
            }
            Event::Schema(s) => self.write_schema(s),
            Event::Style(s) => self.write_style(s),
            Event::StyleMap(m) => self.write_style_map(m),
            Event::Feature(f) => self.write_feature(f),
            Event::Row(r) => self.write_row(r),
            Event::Element(e) => self.write_element(e),
            Event::NetworkLinkControl(nlc) => self.write_network_link_control(nlc),
            Event::Comment(text) => {
                self.xml
                    .write_event(XmlEvent::Comment(BytesText::new(text)))?;
                Ok(())
            }
            Event::AtomHeader(_) => {
                // Atom metadata has no KML representation.
                debug!("dropping AtomHeader event on KML output");
                Ok(())
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        while let Some(tag) = self.open.pop() {
            self.end(tag)?;
        }
        if self.started {
            self.end("kml")?;
        }
        Ok(())
    }
}
