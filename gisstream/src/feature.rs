//! Feature, schema and style model.

use crate::error::{GisError, Result};
use crate::geometry::Geometry;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;

/// Field data types, matching the KML `<SimpleField type=...>` vocabulary
/// plus the dBase-only kinds.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum FieldType {
    String,
    Int,
    Short,
    Float,
    Double,
    Bool,
    Date,
    Oid,
    Geometry,
    Long,
}

impl FieldType {
    /// Parse a KML `SimpleField` type attribute. Legacy `wstring` maps to
    /// string. Unknown names yield `None`.
    pub fn parse(value: &str) -> Option<FieldType> {
        match value.trim() {
            "string" | "wstring" => Some(FieldType::String),
            "int" | "uint" => Some(FieldType::Int),
            "short" | "ushort" => Some(FieldType::Short),
            "float" => Some(FieldType::Float),
            "double" => Some(FieldType::Double),
            "bool" => Some(FieldType::Bool),
            "long" => Some(FieldType::Long),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Int => "int",
            FieldType::Short => "short",
            FieldType::Float => "float",
            FieldType::Double => "double",
            FieldType::Bool => "bool",
            FieldType::Date => "date",
            FieldType::Oid => "oid",
            FieldType::Geometry => "geometry",
            FieldType::Long => "long",
        }
    }
}

/// A typed, ordered field of a [Schema].
#[derive(Clone, PartialEq, Debug)]
pub struct SimpleField {
    pub name: String,
    pub alias_name: Option<String>,
    pub field_type: FieldType,
    pub length: Option<u32>,
    pub precision: Option<u32>,
    /// Position within the owning schema.
    pub index: usize,
}

impl SimpleField {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        SimpleField {
            name: name.into(),
            alias_name: None,
            field_type,
            length: None,
            precision: None,
            index: 0,
        }
    }
}

/// An ordered, uniquely named field set identified by a URI.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct Schema {
    uri: String,
    pub name: Option<String>,
    fields: Vec<SimpleField>,
    by_name: HashMap<String, usize>,
}

impl Schema {
    /// `uri` is `#localId` for document-local schemas or a `urn:` form for
    /// schemas without an id.
    pub fn new(uri: impl Into<String>) -> Self {
        Schema {
            uri: uri.into(),
            name: None,
            fields: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Appends a field, preserving insertion order. Duplicate names fail.
    pub fn add_field(&mut self, mut field: SimpleField) -> Result<()> {
        if self.by_name.contains_key(&field.name) {
            return Err(GisError::Configuration(format!(
                "duplicate field `{}` in schema `{}`",
                field.name, self.uri
            )));
        }
        field.index = self.fields.len();
        self.by_name.insert(field.name.clone(), field.index);
        self.fields.push(field);
        Ok(())
    }

    pub fn field(&self, name: &str) -> Option<&SimpleField> {
        self.by_name.get(name).map(|&i| &self.fields[i])
    }

    pub fn fields(&self) -> &[SimpleField] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A typed attribute value.
#[derive(Clone, PartialEq, Debug)]
pub enum Value {
    String(String),
    Int(i32),
    Short(i16),
    Float(f32),
    Double(f64),
    Bool(bool),
    Date(DateTime<Utc>),
    Long(i64),
    Null,
}

impl Value {
    /// Interprets raw text per the field type. Text that does not parse is
    /// kept as a string so sloppy documents lose nothing.
    pub fn from_typed_str(field_type: FieldType, raw: &str) -> Value {
        let trimmed = raw.trim();
        match field_type {
            FieldType::Int | FieldType::Oid => trimmed
                .parse::<i32>()
                .map_or_else(|_| Value::String(raw.to_string()), Value::Int),
            FieldType::Short => trimmed
                .parse::<i16>()
                .map_or_else(|_| Value::String(raw.to_string()), Value::Short),
            FieldType::Long => trimmed
                .parse::<i64>()
                .map_or_else(|_| Value::String(raw.to_string()), Value::Long),
            FieldType::Float => trimmed
                .parse::<f32>()
                .map_or_else(|_| Value::String(raw.to_string()), Value::Float),
            FieldType::Double => trimmed
                .parse::<f64>()
                .map_or_else(|_| Value::String(raw.to_string()), Value::Double),
            FieldType::Bool => match trimmed {
                "1" | "true" | "TRUE" | "True" => Value::Bool(true),
                "0" | "false" | "FALSE" | "False" => Value::Bool(false),
                _ => Value::String(raw.to_string()),
            },
            _ => Value::String(raw.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Short(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Date(v) => write!(f, "{}", v.format("%Y-%m-%dT%H:%M:%SZ")),
            Value::Long(v) => write!(f, "{v}"),
            Value::Null => Ok(()),
        }
    }
}

/// A geometry-less record: ordered field/value pairs plus an optional
/// schema reference.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct Row {
    pub schema_uri: Option<String>,
    values: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Row::default()
    }

    /// Sets a field value, replacing any earlier value for the same name
    /// while keeping its original position.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        if let Some(slot) = self.values.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.values.push((name, value));
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Kinds of KML features the readers recognize.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum FeatureKind {
    Placemark,
    NetworkLink,
    GroundOverlay,
    ScreenOverlay,
    PhotoOverlay,
}

impl FeatureKind {
    pub fn tag(&self) -> &'static str {
        match self {
            FeatureKind::Placemark => "Placemark",
            FeatureKind::NetworkLink => "NetworkLink",
            FeatureKind::GroundOverlay => "GroundOverlay",
            FeatureKind::ScreenOverlay => "ScreenOverlay",
            FeatureKind::PhotoOverlay => "PhotoOverlay",
        }
    }
}

/// A named record with optional geometry, attribute values, styling and
/// time information. Ownership passes to the consumer on `read()`.
#[derive(Clone, PartialEq, Debug)]
pub struct Feature {
    pub kind: FeatureKind,
    pub id: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub snippet: Option<String>,
    pub address: Option<String>,
    pub phone_number: Option<String>,
    pub visibility: Option<bool>,
    pub open: Option<bool>,
    pub style_url: Option<String>,
    pub geometry: Option<Geometry>,
    /// Camera or LookAt parameters, keyed by their element names. The
    /// `__kind` entry records which of the two it was.
    pub view_group: Option<HashMap<String, String>>,
    /// Region box and level-of-detail parameters, keyed by element name.
    pub region: Option<HashMap<String, String>>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// NetworkLink target document.
    pub link: Option<String>,
    pub row: Row,
    /// Foreign-namespace XML preserved verbatim.
    pub elements: Vec<Element>,
}

impl Feature {
    pub fn new(kind: FeatureKind) -> Self {
        Feature {
            kind,
            id: None,
            name: None,
            description: None,
            snippet: None,
            address: None,
            phone_number: None,
            visibility: None,
            open: None,
            style_url: None,
            geometry: None,
            view_group: None,
            region: None,
            start_time: None,
            end_time: None,
            link: None,
            row: Row::new(),
            elements: Vec::new(),
        }
    }

    pub fn schema_uri(&self) -> Option<&str> {
        self.row.schema_uri.as_deref()
    }
}

/// Container scope type.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ContainerType {
    Folder,
    Document,
}

impl ContainerType {
    pub fn tag(&self) -> &'static str {
        match self {
            ContainerType::Folder => "Folder",
            ContainerType::Document => "Document",
        }
    }
}

/// Opens a hierarchical scope. Every ContainerStart is matched by exactly
/// one [ContainerEnd] at the same nesting depth.
#[derive(Clone, PartialEq, Debug)]
pub struct ContainerStart {
    pub container_type: ContainerType,
    pub id: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub visibility: Option<bool>,
    pub open: Option<bool>,
    pub style_url: Option<String>,
}

impl ContainerStart {
    pub fn new(container_type: ContainerType) -> Self {
        ContainerStart {
            container_type,
            id: None,
            name: None,
            description: None,
            visibility: None,
            open: None,
            style_url: None,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct ContainerEnd;

/// A color in KML's `aabbggrr` notation.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Color {
    pub alpha: u8,
    pub blue: u8,
    pub green: u8,
    pub red: u8,
}

impl Color {
    /// Serializes back to the 8-digit `aabbggrr` form.
    pub fn to_kml(&self) -> String {
        format!(
            "{:02x}{:02x}{:02x}{:02x}",
            self.alpha, self.blue, self.green, self.red
        )
    }
}

#[derive(Clone, PartialEq, Debug, Default)]
pub struct IconStyle {
    pub color: Option<Color>,
    pub scale: Option<f64>,
    pub heading: Option<f64>,
    pub href: Option<String>,
}

#[derive(Clone, PartialEq, Debug, Default)]
pub struct LineStyle {
    pub color: Option<Color>,
    pub width: Option<f64>,
}

#[derive(Clone, PartialEq, Debug, Default)]
pub struct PolyStyle {
    pub color: Option<Color>,
    pub fill: Option<bool>,
    pub outline: Option<bool>,
}

#[derive(Clone, PartialEq, Debug, Default)]
pub struct LabelStyle {
    pub color: Option<Color>,
    pub scale: Option<f64>,
}

#[derive(Clone, PartialEq, Debug, Default)]
pub struct BalloonStyle {
    pub bg_color: Option<Color>,
    pub text_color: Option<Color>,
    pub text: Option<String>,
    pub display_mode: Option<String>,
}

#[derive(Clone, PartialEq, Debug, Default)]
pub struct ListStyle {
    pub bg_color: Option<Color>,
    pub list_item_type: Option<String>,
}

/// A set of sub-styles.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct Style {
    pub id: Option<String>,
    pub icon: Option<IconStyle>,
    pub line: Option<LineStyle>,
    pub poly: Option<PolyStyle>,
    pub label: Option<LabelStyle>,
    pub balloon: Option<BalloonStyle>,
    pub list: Option<ListStyle>,
}

impl Style {
    pub fn new(id: Option<String>) -> Self {
        Style {
            id,
            ..Style::default()
        }
    }
}

/// Target of a [StyleMap] pair: a reference or an inline style.
#[derive(Clone, PartialEq, Debug)]
pub enum StyleRef {
    Url(String),
    Inline(Box<Style>),
}

/// Maps the `normal` and `highlight` states to styles.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct StyleMap {
    pub id: Option<String>,
    pub normal: Option<StyleRef>,
    pub highlight: Option<StyleRef>,
}

/// An XML sub-tree in a non-KML namespace, preserved verbatim.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct Element {
    /// Namespace prefix as written in the source, e.g. `atom` or `gx`.
    pub prefix: Option<String>,
    pub namespace: Option<String>,
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Element {
            name: name.into(),
            ..Element::default()
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Header of an Atom feed, produced by the external Atom adapter and
/// transported unchanged by the core.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct AtomHeader {
    pub id: Option<String>,
    pub title: Option<String>,
    pub updated: Option<DateTime<Utc>>,
    pub links: Vec<String>,
}

/// Shallow view of a KML `<NetworkLinkControl>` element.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct NetworkLinkControl {
    /// Simple child elements, e.g. `minRefreshPeriod` or the Update
    /// `targetHref`, keyed by element name.
    pub values: HashMap<String, String>,
}
