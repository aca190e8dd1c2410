//! Untyped property maps exchanged between handlers and typed entities.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};

use crate::ast::Value;
use crate::ast::values::DATETIME_FORMAT;
use crate::error::{RelmapError, RelmapResult};

/// A single-valued relation as stored on a typed entity.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Related<T> {
    #[default]
    Unset,
    Null,
    /// Only the key is known
    Id(i64),
    Loaded(Box<T>),
}

impl<T> Related<T> {
    pub fn loaded(value: T) -> Self {
        Related::Loaded(Box::new(value))
    }

    pub fn is_set(&self) -> bool {
        !matches!(self, Related::Unset)
    }

    pub fn as_loaded(&self) -> Option<&T> {
        match self {
            Related::Loaded(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_loaded_mut(&mut self) -> Option<&mut T> {
        match self {
            Related::Loaded(value) => Some(value),
            _ => None,
        }
    }
}

impl<T: super::Entity> Related<T> {
    /// Key of the related entity, loaded or not.
    pub fn id(&self) -> Option<i64> {
        match self {
            Related::Id(id) => Some(*id),
            Related::Loaded(value) => value.id(),
            Related::Unset | Related::Null => None,
        }
    }

    pub fn to_record(&self) -> RelatedRecord {
        match self {
            Related::Unset | Related::Null => RelatedRecord::Null,
            Related::Id(id) => RelatedRecord::Id(*id),
            Related::Loaded(value) => RelatedRecord::Loaded(Box::new(value.to_record())),
        }
    }

    pub fn from_record(record: &RelatedRecord) -> RelmapResult<Self> {
        Ok(match record {
            RelatedRecord::Null => Related::Null,
            RelatedRecord::Id(id) => Related::Id(*id),
            RelatedRecord::Loaded(record) => Related::loaded(T::from_record(record)?),
        })
    }
}

/// A single-valued relation inside a [`Record`].
#[derive(Debug, Clone, PartialEq)]
pub enum RelatedRecord {
    Null,
    Id(i64),
    Loaded(Box<Record>),
}

impl RelatedRecord {
    pub fn id(&self) -> Option<i64> {
        match self {
            RelatedRecord::Null => None,
            RelatedRecord::Id(id) => Some(*id),
            RelatedRecord::Loaded(record) => record.id,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Value(Value),
    Related(RelatedRecord),
}

/// Property map of one entity instance. Absent properties are unset.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    pub id: Option<i64>,
    subtype: Option<String>,
    fields: BTreeMap<String, FieldValue>,
    many: BTreeMap<String, BTreeMap<i64, Record>>,
    extras: BTreeMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(id: Option<i64>) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    pub fn set(&mut self, property: &str, value: impl Into<Value>) {
        self.fields
            .insert(property.to_string(), FieldValue::Value(value.into()));
    }

    pub fn set_related(&mut self, property: &str, related: RelatedRecord) {
        self.fields
            .insert(property.to_string(), FieldValue::Related(related));
    }

    pub fn set_many(&mut self, property: &str, members: BTreeMap<i64, Record>) {
        self.many.insert(property.to_string(), members);
    }

    pub fn unset(&mut self, property: &str) {
        self.fields.remove(property);
        self.many.remove(property);
    }

    pub fn field(&self, property: &str) -> Option<&FieldValue> {
        self.fields.get(property)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_set(&self, property: &str) -> bool {
        self.fields.contains_key(property) || self.many.contains_key(property)
    }

    /// Scalar value of a property.
    pub fn value(&self, property: &str) -> Option<&Value> {
        match self.fields.get(property) {
            Some(FieldValue::Value(v)) => Some(v),
            _ => None,
        }
    }

    pub fn related(&self, property: &str) -> Option<&RelatedRecord> {
        match self.fields.get(property) {
            Some(FieldValue::Related(r)) => Some(r),
            _ => None,
        }
    }

    /// Typed read of a scalar property. Unset reads as `Ok(None)`.
    pub fn get<T: FromValue>(&self, property: &str) -> RelmapResult<Option<T>> {
        match self.value(property) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => T::from_value(v).map(Some).ok_or_else(|| {
                RelmapError::hydration(format!(
                    "Cannot convert property '{}' from {:?}",
                    property, v
                ))
            }),
        }
    }

    /// Like [`Record::get`] for optional properties: `Null` is a value.
    pub fn get_opt<T: FromValue>(&self, property: &str) -> RelmapResult<Option<Option<T>>> {
        match self.value(property) {
            None => Ok(None),
            Some(Value::Null) => Ok(Some(None)),
            Some(_) => self.get(property).map(Some),
        }
    }

    pub fn many(&self, property: &str) -> Option<&BTreeMap<i64, Record>> {
        self.many.get(property)
    }

    /// Members of a many-valued property, creating the empty map if needed.
    pub fn many_mut(&mut self, property: &str) -> &mut BTreeMap<i64, Record> {
        self.many.entry(property.to_string()).or_default()
    }

    pub fn subtype(&self) -> Option<&str> {
        self.subtype.as_deref()
    }

    pub fn set_subtype(&mut self, subtype: impl Into<String>) {
        self.subtype = Some(subtype.into());
    }

    /// Custom select values that do not map to a property.
    pub fn extra(&self, name: &str) -> Option<&Value> {
        self.extras.get(name)
    }

    pub fn set_extra(&mut self, name: &str, value: Value) {
        self.extras.insert(name.to_string(), value);
    }

    pub fn extras(&self) -> &BTreeMap<String, Value> {
        &self.extras
    }

    /// Copy without many-valued members, used for inverse back-links.
    pub fn shallow(&self) -> Record {
        Record {
            id: self.id,
            subtype: self.subtype.clone(),
            fields: self.fields.clone(),
            many: BTreeMap::new(),
            extras: BTreeMap::new(),
        }
    }
}

/// Conversion from a driver value, with the coercions hydration needs.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Option<Self>;
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Option<Self> {
        Some(value.clone())
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_i64()
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_i64().and_then(|n| i32::try_from(n).ok())
    }
}

impl FromValue for u32 {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_i64().and_then(|n| u32::try_from(n).ok())
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_bool()
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Float(f) => Some(*f),
            Value::Int(n) => Some(*n as f64),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl FromValue for f32 {
    fn from_value(value: &Value) -> Option<Self> {
        f64::from_value(value).map(|f| f as f32)
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Json(serde_json::Value::String(s)) => Some(s.clone()),
            other => other.to_text(),
        }
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::DateTime(dt) => Some(*dt),
            Value::Date(d) => d.and_hms_opt(0, 0, 0),
            Value::String(s) => NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
                .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
                .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
                .ok(),
            Value::Int(ts) => chrono::DateTime::from_timestamp(*ts, 0).map(|dt| dt.naive_utc()),
            _ => None,
        }
    }
}

impl FromValue for NaiveDate {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Date(d) => Some(*d),
            Value::DateTime(dt) => Some(dt.date()),
            Value::String(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d").ok(),
            _ => None,
        }
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Json(j) => Some(j.clone()),
            Value::String(s) => serde_json::from_str(s).ok(),
            Value::Null => Some(serde_json::Value::Null),
            other => Some(other.to_json()),
        }
    }
}
