//! Atomic values and the structured document model.
//!
//! [`Atom`] is the writer-facing set of atomic value types. [`Value`] is the
//! wire-facing document model actually held by collections: dates collapse to
//! their integer encodings, date-times to epoch milliseconds, enums to their
//! names. [`Doc`] is an ordered field list, the unit of storage.

use std::cmp::Ordering;
use std::fmt;

use time::{Date, Month, OffsetDateTime, Time};

use crate::error::{CoreError, SerialError};
use crate::tid::TemporalId;

/// Minute-of-day without seconds, wire form `HHMM`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocalMinute {
    hour: u8,
    minute: u8,
}

impl LocalMinute {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(Self { hour, minute })
        } else {
            None
        }
    }

    pub fn hour(self) -> u8 {
        self.hour
    }

    pub fn minute(self) -> u8 {
        self.minute
    }

    pub fn to_iso_int(self) -> i32 {
        i32::from(self.hour) * 100 + i32::from(self.minute)
    }

    pub fn from_iso_int(value: i32) -> Option<Self> {
        if value < 0 {
            return None;
        }
        Self::new((value / 100) as u8, (value % 100) as u8)
    }
}

impl fmt::Display for LocalMinute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// ISO integer encoding `YYYYMMDD`.
pub fn date_to_iso_int(date: Date) -> i32 {
    date.year() * 10_000 + i32::from(u8::from(date.month())) * 100 + i32::from(date.day())
}

pub fn date_from_iso_int(value: i32) -> Option<Date> {
    let year = value / 10_000;
    let month = Month::try_from(((value / 100) % 100) as u8).ok()?;
    let day = (value % 100) as u8;
    Date::from_calendar_date(year, month, day).ok()
}

/// ISO integer encoding `HHMMSSfff` (millisecond resolution).
pub fn time_to_iso_int(value: Time) -> i32 {
    i32::from(value.hour()) * 10_000_000
        + i32::from(value.minute()) * 100_000
        + i32::from(value.second()) * 1_000
        + i32::from(value.millisecond())
}

pub fn time_from_iso_int(value: i32) -> Option<Time> {
    if value < 0 {
        return None;
    }
    let hour = (value / 10_000_000) as u8;
    let minute = ((value / 100_000) % 100) as u8;
    let second = ((value / 1_000) % 100) as u8;
    let milli = (value % 1_000) as u16;
    Time::from_hms_milli(hour, minute, second, milli).ok()
}

/// Milliseconds since the Unix epoch.
pub fn datetime_to_millis(value: OffsetDateTime) -> i64 {
    (value.unix_timestamp_nanos() / 1_000_000) as i64
}

pub fn datetime_from_millis(millis: i64) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000).ok()
}

/// Atomic value as seen by the tree writer.
#[derive(Clone, Debug, PartialEq)]
pub enum Atom {
    String(String),
    Double(f64),
    Bool(bool),
    Int(i32),
    Long(i64),
    Date(Date),
    Time(Time),
    Minute(LocalMinute),
    DateTime(OffsetDateTime),
    /// Enum value: declared type full name plus variant name.
    Enum {
        type_name: &'static str,
        name: String,
    },
    Tid(TemporalId),
    Bytes(Vec<u8>),
}

impl Atom {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Atom::String(_) => "string",
            Atom::Double(_) => "double",
            Atom::Bool(_) => "bool",
            Atom::Int(_) => "int",
            Atom::Long(_) => "long",
            Atom::Date(_) => "date",
            Atom::Time(_) => "time",
            Atom::Minute(_) => "minute",
            Atom::DateTime(_) => "datetime",
            Atom::Enum { .. } => "enum",
            Atom::Tid(_) => "tid",
            Atom::Bytes(_) => "bytes",
        }
    }

    /// Collapse to the wire-facing document value.
    pub fn to_wire(&self) -> Value {
        match self {
            Atom::String(s) => Value::String(s.clone()),
            Atom::Double(d) => Value::Double(*d),
            Atom::Bool(b) => Value::Bool(*b),
            Atom::Int(i) => Value::Int(*i),
            Atom::Long(l) => Value::Long(*l),
            Atom::Date(d) => Value::Int(date_to_iso_int(*d)),
            Atom::Time(t) => Value::Int(time_to_iso_int(*t)),
            Atom::Minute(m) => Value::Int(m.to_iso_int()),
            Atom::DateTime(dt) => Value::DateTime(datetime_to_millis(*dt)),
            Atom::Enum { name, .. } => Value::String(name.clone()),
            Atom::Tid(t) => Value::Tid(*t),
            Atom::Bytes(b) => Value::Bytes(b.clone()),
        }
    }
}

/// Wire-facing document value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    String(String),
    Int(i32),
    Long(i64),
    Double(f64),
    Bool(bool),
    /// Milliseconds since the Unix epoch.
    DateTime(i64),
    Tid(TemporalId),
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    Doc(Doc),
}

impl Value {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::String(_) => "string",
            Value::Int(_) => "int",
            Value::Long(_) => "long",
            Value::Double(_) => "double",
            Value::Bool(_) => "bool",
            Value::DateTime(_) => "datetime",
            Value::Tid(_) => "tid",
            Value::Bytes(_) => "bytes",
            Value::Array(_) => "array",
            Value::Doc(_) => "document",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_tid(&self) -> Option<TemporalId> {
        match self {
            Value::Tid(t) => Some(*t),
            _ => None,
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Long(_) | Value::Double(_) => 2,
            Value::String(_) => 3,
            Value::DateTime(_) => 4,
            Value::Tid(_) => 5,
            Value::Bytes(_) => 6,
            Value::Array(_) => 7,
            Value::Doc(_) => 8,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(f64::from(*i)),
            Value::Long(l) => Some(*l as f64),
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// Total order across all wire values, used by sort stages and range
    /// operators. Numbers compare numerically regardless of width; otherwise
    /// values order by type rank first, then within-type.
    pub fn canonical_cmp(&self, other: &Value) -> Ordering {
        if let (Some(a), Some(b)) = (self.as_f64(), other.as_f64()) {
            return a.total_cmp(&b);
        }
        let rank = self.type_rank().cmp(&other.type_rank());
        if rank != Ordering::Equal {
            return rank;
        }
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::DateTime(a), Value::DateTime(b)) => a.cmp(b),
            (Value::Tid(a), Value::Tid(b)) => a.cmp(b),
            (Value::Bytes(a), Value::Bytes(b)) => a.cmp(b),
            (Value::Array(a), Value::Array(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    let ord = x.canonical_cmp(y);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            (Value::Doc(a), Value::Doc(b)) => {
                for ((an, av), (bn, bv)) in a.iter().zip(b.iter()) {
                    let ord = an.cmp(bn).then_with(|| av.canonical_cmp(bv));
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            _ => Ordering::Equal,
        }
    }
}

/// Ordered field list: the unit of storage and of filter encoding.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Doc {
    fields: Vec<(String, Value)>,
}

impl Doc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field. Callers are responsible for name uniqueness.
    pub fn push(&mut self, name: impl Into<String>, value: Value) {
        self.fields.push((name.into(), value));
    }

    /// Prepend a field, used for header fields (`_id`, `_dataset`).
    pub fn push_front(&mut self, name: impl Into<String>, value: Value) {
        self.fields.insert(0, (name.into(), value));
    }

    /// Replace an existing field or append.
    pub fn set(&mut self, name: &str, value: Value) {
        if let Some(slot) = self.fields.iter_mut().find(|(n, _)| n == name) {
            slot.1 = value;
        } else {
            self.push(name, value);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Field lookup for pipeline stages: absent fields read as null.
    pub fn get_or_null(&self, name: &str) -> &Value {
        self.get(name).unwrap_or(&Value::Null)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, Value)> {
        self.fields.iter()
    }

    pub fn into_fields(self) -> Vec<(String, Value)> {
        self.fields
    }

    /// The stored discriminator: last segment of a chain array, or the
    /// scalar name itself.
    pub fn discriminator(&self) -> Result<&str, CoreError> {
        match self.get("_t") {
            Some(Value::String(name)) => Ok(name),
            Some(Value::Array(chain)) => chain
                .last()
                .and_then(Value::as_str)
                .ok_or_else(|| SerialError::MissingDiscriminator.into()),
            _ => Err(SerialError::MissingDiscriminator.into()),
        }
    }
}

impl FromIterator<(String, Value)> for Doc {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime, time};

    #[test]
    fn iso_int_encodings_round_trip() {
        let d = date!(2003 - 05 - 01);
        assert_eq!(date_to_iso_int(d), 20030501);
        assert_eq!(date_from_iso_int(20030501), Some(d));

        let t = time!(10:15:30.500);
        assert_eq!(time_to_iso_int(t), 101_530_500);
        assert_eq!(time_from_iso_int(101_530_500), Some(t));

        let m = LocalMinute::new(10, 15).unwrap();
        assert_eq!(m.to_iso_int(), 1015);
        assert_eq!(LocalMinute::from_iso_int(1015), Some(m));
        assert!(LocalMinute::new(24, 0).is_none());
    }

    #[test]
    fn datetime_millis_round_trip() {
        let dt = datetime!(2003-05-01 10:15:00 UTC);
        let millis = datetime_to_millis(dt);
        assert_eq!(datetime_from_millis(millis), Some(dt));
    }

    #[test]
    fn numbers_compare_numerically_across_widths() {
        assert_eq!(
            Value::Int(7).canonical_cmp(&Value::Long(7)),
            Ordering::Equal
        );
        assert_eq!(
            Value::Long(7).canonical_cmp(&Value::Double(7.5)),
            Ordering::Less
        );
    }

    #[test]
    fn null_sorts_below_everything() {
        for value in [
            Value::Bool(false),
            Value::Int(i32::MIN),
            Value::String(String::new()),
            Value::Tid(TemporalId::EMPTY),
        ] {
            assert_eq!(Value::Null.canonical_cmp(&value), Ordering::Less);
        }
    }

    #[test]
    fn doc_set_replaces_in_place() {
        let mut doc = Doc::new();
        doc.push("a", Value::Int(1));
        doc.push("b", Value::Int(2));
        doc.set("a", Value::Int(3));
        assert_eq!(doc.get("a"), Some(&Value::Int(3)));
        assert_eq!(doc.len(), 2);
    }

    #[test]
    fn discriminator_reads_scalar_and_chain() {
        let mut scalar = Doc::new();
        scalar.push("_t", Value::String("BaseSample".into()));
        assert_eq!(scalar.discriminator().unwrap(), "BaseSample");

        let mut chain = Doc::new();
        chain.push(
            "_t",
            Value::Array(vec![
                Value::String("BaseSample".into()),
                Value::String("DerivedSample".into()),
            ]),
        );
        assert_eq!(chain.discriminator().unwrap(), "DerivedSample");

        assert!(Doc::new().discriminator().is_err());
    }
}
