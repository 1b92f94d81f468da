//! Object model: data objects, records, field values.
//!
//! Every type the store can persist implements [`DataObject`]: named field
//! access through [`FieldValue`], cloning, and downcast hooks. Records add
//! the storage header (id, dataset). The reflection registry holds the
//! per-type metadata; the object itself answers field reads and writes, so
//! inherited fields resolve through base-struct delegation without
//! back-pointers into the registry.

use std::any::Any;
use std::fmt;

use time::{Date, OffsetDateTime, Time};

use crate::error::{CoreError, MetaError};
use crate::meta::FieldKind;
use crate::tid::TemporalId;
use crate::value::{Atom, LocalMinute};

/// Full name of the typed-record root. Base chains of record types terminate
/// here; the direct descendant of this root names the storage collection.
pub const RECORD_ROOT: &str = "strata::record::Record";

/// A reflectable value object.
pub trait DataObject: Any + Send + Sync + fmt::Debug {
    /// Registered full type name.
    fn type_name(&self) -> &'static str;

    /// Read a field by name. `None` means the type has no such field;
    /// a present-but-unset field reads as [`FieldValue::Null`].
    fn get_field(&self, name: &str) -> Option<FieldValue>;

    /// Write a field by name.
    fn set_field(&mut self, name: &str, value: FieldValue) -> Result<(), CoreError>;

    fn clone_data(&self) -> Box<dyn DataObject>;

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;

    /// View as a record when the type carries the storage header.
    /// Keys and embeddable elements return `None`.
    fn as_record(&self) -> Option<&dyn Record> {
        None
    }

    fn as_record_mut(&mut self) -> Option<&mut dyn Record> {
        None
    }
}

/// Compile-time link between a concrete type and its registered full name,
/// used by the typed store APIs.
pub trait Reflect: DataObject + Default {
    const TYPE_NAME: &'static str;
}

/// Downcast a boxed data object to a concrete type.
pub fn downcast<T: DataObject>(object: Box<dyn DataObject>) -> Result<Box<T>, Box<dyn DataObject>> {
    if object.as_any().is::<T>() {
        match object.into_any().downcast::<T>() {
            Ok(concrete) => Ok(concrete),
            Err(_) => unreachable!("type id checked above"),
        }
    } else {
        Err(object)
    }
}

/// A persisted record: a data object with the storage header.
pub trait Record: DataObject {
    fn id(&self) -> TemporalId;
    fn set_id(&mut self, id: TemporalId);
    fn data_set(&self) -> TemporalId;
    fn set_data_set(&mut self, data_set: TemporalId);

    /// Key carried verbatim instead of projected from key fields.
    /// Tombstones use this; ordinary records return `None`.
    fn explicit_key(&self) -> Option<String> {
        None
    }
}

/// Field value as exchanged between objects, serializers, and queries.
#[derive(Debug)]
pub enum FieldValue {
    Null,
    Atom(Atom),
    List(Vec<FieldValue>),
    /// Nested key object; serializes as its string projection.
    Key(Box<dyn DataObject>),
    /// Nested data object; serializes as a sub-document.
    Data(Box<dyn DataObject>),
}

impl Clone for FieldValue {
    fn clone(&self) -> Self {
        match self {
            FieldValue::Null => FieldValue::Null,
            FieldValue::Atom(atom) => FieldValue::Atom(atom.clone()),
            FieldValue::List(items) => FieldValue::List(items.clone()),
            FieldValue::Key(object) => FieldValue::Key(object.clone_data()),
            FieldValue::Data(object) => FieldValue::Data(object.clone_data()),
        }
    }
}

impl FieldValue {
    pub fn kind_name(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::Atom(atom) => atom.kind_name(),
            FieldValue::List(_) => "list",
            FieldValue::Key(_) => "key",
            FieldValue::Data(_) => "data",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn from_opt<T: FieldAtom>(value: &Option<T>) -> FieldValue {
        match value {
            Some(v) => FieldValue::Atom(v.to_atom()),
            None => FieldValue::Null,
        }
    }

    pub fn from_list<T: FieldAtom>(values: &[T]) -> FieldValue {
        FieldValue::List(values.iter().map(|v| FieldValue::Atom(v.to_atom())).collect())
    }

    pub fn from_opt_data<T: DataObject + Clone>(value: &Option<T>) -> FieldValue {
        match value {
            Some(v) => FieldValue::Data(Box::new(v.clone())),
            None => FieldValue::Null,
        }
    }

    pub fn from_opt_key<T: DataObject + Clone>(value: &Option<T>) -> FieldValue {
        match value {
            Some(v) => FieldValue::Key(Box::new(v.clone())),
            None => FieldValue::Null,
        }
    }

    pub fn from_data_list<T: DataObject + Clone>(values: &[T]) -> FieldValue {
        FieldValue::List(
            values
                .iter()
                .map(|v| FieldValue::Data(Box::new(v.clone())))
                .collect(),
        )
    }

    fn mismatch(self, type_name: &str, field: &str, expected: String) -> CoreError {
        MetaError::FieldValue {
            type_name: type_name.to_string(),
            field: field.to_string(),
            expected,
            got: self.kind_name().to_string(),
        }
        .into()
    }

    pub fn into_opt<T: FieldAtom>(
        self,
        type_name: &str,
        field: &str,
    ) -> Result<Option<T>, CoreError> {
        match self {
            FieldValue::Null => Ok(None),
            FieldValue::Atom(atom) => match T::from_atom(atom.clone()) {
                Some(v) => Ok(Some(v)),
                None => Err(FieldValue::Atom(atom).mismatch(
                    type_name,
                    field,
                    T::kind().describe(),
                )),
            },
            other => Err(other.mismatch(type_name, field, T::kind().describe())),
        }
    }

    pub fn into_list<T: FieldAtom>(self, type_name: &str, field: &str) -> Result<Vec<T>, CoreError> {
        match self {
            FieldValue::Null => Ok(Vec::new()),
            FieldValue::List(items) => items
                .into_iter()
                .map(|item| match item {
                    FieldValue::Atom(atom) => T::from_atom(atom.clone()).ok_or_else(|| {
                        FieldValue::Atom(atom).mismatch(type_name, field, T::kind().describe())
                    }),
                    other => Err(other.mismatch(type_name, field, T::kind().describe())),
                })
                .collect(),
            other => Err(other.mismatch(type_name, field, "list".to_string())),
        }
    }

    pub fn into_opt_object<T: DataObject>(
        self,
        type_name: &str,
        field: &str,
    ) -> Result<Option<T>, CoreError> {
        match self {
            FieldValue::Null => Ok(None),
            FieldValue::Data(object) | FieldValue::Key(object) => match downcast::<T>(object) {
                Ok(boxed) => Ok(Some(*boxed)),
                Err(object) => Err(MetaError::FieldValue {
                    type_name: type_name.to_string(),
                    field: field.to_string(),
                    expected: std::any::type_name::<T>().to_string(),
                    got: object.type_name().to_string(),
                }
                .into()),
            },
            other => Err(other.mismatch(type_name, field, std::any::type_name::<T>().to_string())),
        }
    }

    pub fn into_object_list<T: DataObject>(
        self,
        type_name: &str,
        field: &str,
    ) -> Result<Vec<T>, CoreError> {
        match self {
            FieldValue::Null => Ok(Vec::new()),
            FieldValue::List(items) => items
                .into_iter()
                .map(|item| {
                    item.into_opt_object::<T>(type_name, field)?.ok_or_else(|| {
                        FieldValue::Null.mismatch(
                            type_name,
                            field,
                            std::any::type_name::<T>().to_string(),
                        )
                    })
                })
                .collect(),
            other => Err(other.mismatch(type_name, field, "list".to_string())),
        }
    }
}

/// Conversion between a Rust field type and its atomic wire form.
pub trait FieldAtom: Sized + 'static {
    fn kind() -> FieldKind;
    fn to_atom(&self) -> Atom;
    /// Lenient on wire widenings (int for date encodings, string for ids);
    /// `None` on anything else.
    fn from_atom(atom: Atom) -> Option<Self>;
}

impl FieldAtom for String {
    fn kind() -> FieldKind {
        FieldKind::String
    }

    fn to_atom(&self) -> Atom {
        Atom::String(self.clone())
    }

    fn from_atom(atom: Atom) -> Option<Self> {
        match atom {
            Atom::String(s) => Some(s),
            _ => None,
        }
    }
}

impl FieldAtom for i32 {
    fn kind() -> FieldKind {
        FieldKind::Int
    }

    fn to_atom(&self) -> Atom {
        Atom::Int(*self)
    }

    fn from_atom(atom: Atom) -> Option<Self> {
        match atom {
            Atom::Int(i) => Some(i),
            Atom::Long(l) => i32::try_from(l).ok(),
            _ => None,
        }
    }
}

impl FieldAtom for i64 {
    fn kind() -> FieldKind {
        FieldKind::Long
    }

    fn to_atom(&self) -> Atom {
        Atom::Long(*self)
    }

    fn from_atom(atom: Atom) -> Option<Self> {
        match atom {
            Atom::Long(l) => Some(l),
            Atom::Int(i) => Some(i64::from(i)),
            _ => None,
        }
    }
}

impl FieldAtom for f64 {
    fn kind() -> FieldKind {
        FieldKind::Double
    }

    fn to_atom(&self) -> Atom {
        Atom::Double(*self)
    }

    fn from_atom(atom: Atom) -> Option<Self> {
        match atom {
            Atom::Double(d) => Some(d),
            Atom::Int(i) => Some(f64::from(i)),
            Atom::Long(l) => Some(l as f64),
            _ => None,
        }
    }
}

impl FieldAtom for bool {
    fn kind() -> FieldKind {
        FieldKind::Bool
    }

    fn to_atom(&self) -> Atom {
        Atom::Bool(*self)
    }

    fn from_atom(atom: Atom) -> Option<Self> {
        match atom {
            Atom::Bool(b) => Some(b),
            _ => None,
        }
    }
}

impl FieldAtom for Date {
    fn kind() -> FieldKind {
        FieldKind::Date
    }

    fn to_atom(&self) -> Atom {
        Atom::Date(*self)
    }

    fn from_atom(atom: Atom) -> Option<Self> {
        match atom {
            Atom::Date(d) => Some(d),
            Atom::Int(i) => crate::value::date_from_iso_int(i),
            _ => None,
        }
    }
}

impl FieldAtom for Time {
    fn kind() -> FieldKind {
        FieldKind::Time
    }

    fn to_atom(&self) -> Atom {
        Atom::Time(*self)
    }

    fn from_atom(atom: Atom) -> Option<Self> {
        match atom {
            Atom::Time(t) => Some(t),
            Atom::Int(i) => crate::value::time_from_iso_int(i),
            _ => None,
        }
    }
}

impl FieldAtom for LocalMinute {
    fn kind() -> FieldKind {
        FieldKind::Minute
    }

    fn to_atom(&self) -> Atom {
        Atom::Minute(*self)
    }

    fn from_atom(atom: Atom) -> Option<Self> {
        match atom {
            Atom::Minute(m) => Some(m),
            Atom::Int(i) => LocalMinute::from_iso_int(i),
            _ => None,
        }
    }
}

impl FieldAtom for OffsetDateTime {
    fn kind() -> FieldKind {
        FieldKind::DateTime
    }

    fn to_atom(&self) -> Atom {
        Atom::DateTime(*self)
    }

    fn from_atom(atom: Atom) -> Option<Self> {
        match atom {
            Atom::DateTime(dt) => Some(dt),
            Atom::Long(millis) => crate::value::datetime_from_millis(millis),
            _ => None,
        }
    }
}

impl FieldAtom for TemporalId {
    fn kind() -> FieldKind {
        FieldKind::Tid
    }

    fn to_atom(&self) -> Atom {
        Atom::Tid(*self)
    }

    fn from_atom(atom: Atom) -> Option<Self> {
        match atom {
            Atom::Tid(t) => Some(t),
            Atom::String(s) => TemporalId::parse(&s).ok(),
            _ => None,
        }
    }
}

impl FieldAtom for Vec<u8> {
    fn kind() -> FieldKind {
        FieldKind::Bytes
    }

    fn to_atom(&self) -> Atom {
        Atom::Bytes(self.clone())
    }

    fn from_atom(atom: Atom) -> Option<Self> {
        match atom {
            Atom::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

/// Declare a unit enum persisted by variant name.
///
/// Generates `as_str`/`parse`, `Display`, and the [`FieldAtom`] impl mapping
/// the enum to [`Atom::Enum`] on the wire.
#[macro_export]
macro_rules! atom_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident ($full_name:literal) {
            $($variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        $vis enum $name {
            $($variant),+
        }

        impl $name {
            pub const FULL_NAME: &'static str = $full_name;

            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }

            pub fn parse(value: &str) -> Option<Self> {
                match value {
                    $($text => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl $crate::record::FieldAtom for $name {
            fn kind() -> $crate::meta::FieldKind {
                $crate::meta::FieldKind::Enum(Self::FULL_NAME)
            }

            fn to_atom(&self) -> $crate::value::Atom {
                $crate::value::Atom::Enum {
                    type_name: Self::FULL_NAME,
                    name: self.as_str().to_string(),
                }
            }

            fn from_atom(atom: $crate::value::Atom) -> Option<Self> {
                match atom {
                    $crate::value::Atom::Enum { name, .. } => Self::parse(&name),
                    $crate::value::Atom::String(name) => Self::parse(&name),
                    _ => None,
                }
            }
        }
    };
}

/// Generate the clone/downcast plumbing of a [`DataObject`] impl. Use inside
/// an `impl DataObject for T` block after the field accessors; pass `record`
/// for types that implement [`Record`] so the record view resolves.
#[macro_export]
macro_rules! data_object_body {
    (record) => {
        $crate::data_object_body!();

        fn as_record(&self) -> Option<&dyn $crate::record::Record> {
            Some(self)
        }

        fn as_record_mut(&mut self) -> Option<&mut dyn $crate::record::Record> {
            Some(self)
        }
    };
    () => {
        fn clone_data(&self) -> Box<dyn $crate::record::DataObject> {
            Box::new(self.clone())
        }

        fn as_any(&self) -> &dyn ::std::any::Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any {
            self
        }

        fn into_any(self: Box<Self>) -> Box<dyn ::std::any::Any> {
            self
        }
    };
}

/// Tombstone: hides prior versions of a key from reads without physical
/// deletion. Saved into the collection of the record type it shadows, with
/// the shadowed key carried verbatim.
#[derive(Clone, Debug, Default)]
pub struct DeletedRecordData {
    pub id: TemporalId,
    pub data_set: TemporalId,
    pub key: Option<String>,
}

pub const DELETED_RECORD_TYPE: &str = "strata::record::DeletedRecordData";

impl DeletedRecordData {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            id: TemporalId::EMPTY,
            data_set: TemporalId::EMPTY,
            key: Some(key.into()),
        }
    }
}

impl DataObject for DeletedRecordData {
    fn type_name(&self) -> &'static str {
        DELETED_RECORD_TYPE
    }

    fn get_field(&self, _name: &str) -> Option<FieldValue> {
        None
    }

    fn set_field(&mut self, name: &str, _value: FieldValue) -> Result<(), CoreError> {
        Err(MetaError::UnknownField {
            type_name: DELETED_RECORD_TYPE.to_string(),
            field: name.to_string(),
        }
        .into())
    }

    crate::data_object_body!(record);
}

impl Reflect for DeletedRecordData {
    const TYPE_NAME: &'static str = DELETED_RECORD_TYPE;
}

impl Record for DeletedRecordData {
    fn id(&self) -> TemporalId {
        self.id
    }

    fn set_id(&mut self, id: TemporalId) {
        self.id = id;
    }

    fn data_set(&self) -> TemporalId {
        self.data_set
    }

    fn set_data_set(&mut self, data_set: TemporalId) {
        self.data_set = data_set;
    }

    fn explicit_key(&self) -> Option<String> {
        self.key.clone()
    }
}

/// Register the tombstone type with a registry.
pub fn declare(registry: &crate::meta::Registry) {
    registry.register(crate::meta::TypeDecl::record(DELETED_RECORD_TYPE, || {
        Box::new(DeletedRecordData::default())
    }));
}

#[cfg(test)]
mod tests {
    use super::*;

    atom_enum! {
        /// Test enum.
        pub enum Flavor("strata::record::tests::Flavor") {
            Plain => "Plain",
            Spicy => "Spicy",
        }
    }

    #[test]
    fn atom_enum_round_trips() {
        assert_eq!(Flavor::parse("Spicy"), Some(Flavor::Spicy));
        assert_eq!(Flavor::Spicy.as_str(), "Spicy");
        assert_eq!(Flavor::parse("Mild"), None);
        let atom = Flavor::Plain.to_atom();
        assert_eq!(Flavor::from_atom(atom), Some(Flavor::Plain));
        assert_eq!(
            Flavor::from_atom(Atom::String("Spicy".into())),
            Some(Flavor::Spicy)
        );
    }

    #[test]
    fn field_value_conversions() {
        let value = FieldValue::from_opt(&Some(42i32));
        assert_eq!(value.clone().into_opt::<i32>("T", "f").unwrap(), Some(42));
        // Long narrows into int when it fits.
        assert_eq!(
            FieldValue::Atom(Atom::Long(7)).into_opt::<i32>("T", "f").unwrap(),
            Some(7)
        );
        assert!(FieldValue::Atom(Atom::Bool(true))
            .into_opt::<i32>("T", "f")
            .is_err());
        assert_eq!(
            FieldValue::Null.into_opt::<String>("T", "f").unwrap(),
            None
        );
    }

    #[test]
    fn tombstone_carries_its_key() {
        let tombstone = DeletedRecordData::new("Key1");
        assert_eq!(tombstone.explicit_key().as_deref(), Some("Key1"));
        assert!(tombstone.get_field("key").is_none());
    }
}
