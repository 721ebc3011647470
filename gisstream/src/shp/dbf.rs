//! dBase attribute table integration.
//!
//! The `.dbf` companion drives the schema: its column headers become
//! [SimpleField]s and each row supplies the attribute values for the
//! matching `.shp` record.

use crate::feature::{FieldType, Schema, SimpleField, Value};
use chrono::{DateTime, NaiveDate, Utc};
use dbase::{FieldValue, Record};

/// Builds the schema from the dBase column headers. `uri` follows the
/// `#name` convention derived from the shapefile base name.
pub(crate) fn schema_from_dbf(uri: &str, fields: &[dbase::FieldInfo]) -> Schema {
    let mut schema = Schema::new(uri);
    for info in fields.iter().filter(|f| f.name() != "DeletionFlag") {
        let field_type = match info.field_type() {
            dbase::FieldType::Character | dbase::FieldType::Memo => FieldType::String,
            dbase::FieldType::Numeric | dbase::FieldType::Double | dbase::FieldType::Currency => {
                FieldType::Double
            }
            dbase::FieldType::Float => FieldType::Float,
            dbase::FieldType::Integer => FieldType::Int,
            dbase::FieldType::Logical => FieldType::Bool,
            dbase::FieldType::Date | dbase::FieldType::DateTime => FieldType::Date,
            _ => FieldType::String,
        };
        // Duplicate column names cannot occur in a well-formed table; a
        // sloppy one keeps the first column.
        let _ = schema.add_field(SimpleField::new(info.name(), field_type));
    }
    schema
}

/// Converts one dBase cell into a model value.
pub(crate) fn convert_value(value: &FieldValue) -> Value {
    match value {
        FieldValue::Character(Some(v)) => Value::String(v.clone()),
        FieldValue::Character(None) => Value::Null,
        FieldValue::Numeric(Some(v)) => Value::Double(*v),
        FieldValue::Numeric(None) => Value::Null,
        FieldValue::Logical(Some(v)) => Value::Bool(*v),
        FieldValue::Logical(None) => Value::Null,
        FieldValue::Float(Some(v)) => Value::Float(*v),
        FieldValue::Float(None) => Value::Null,
        FieldValue::Integer(v) => Value::Int(*v),
        FieldValue::Double(v) => Value::Double(*v),
        FieldValue::Currency(v) => Value::Double(*v),
        FieldValue::Date(Some(d)) => date_value(d),
        FieldValue::Date(None) => Value::Null,
        FieldValue::Memo(v) => Value::String(v.clone()),
        other => Value::String(other.to_string()),
    }
}

fn date_value(d: &dbase::Date) -> Value {
    match NaiveDate::from_ymd_opt(d.year() as i32, d.month(), d.day()) {
        Some(date) => match date.and_hms_opt(0, 0, 0) {
            Some(dt) => Value::Date(DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc)),
            None => Value::String(format!("{d:?}")),
        },
        None => Value::String(format!("{d:?}")),
    }
}

/// Looks up the record's value for one schema field.
pub(crate) fn field_value(record: &Record, name: &str) -> Value {
    record.get(name).map_or(Value::Null, convert_value)
}
