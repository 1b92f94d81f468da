//! Reflection registry: runtime type/field/attribute metadata.
//!
//! The registry is the single source of truth for how a type serializes:
//! declared fields in order, the base chain behind the `_t` discriminator,
//! the key type behind `_key`, and attribute-driven codec overrides. Types
//! declare themselves once (idempotently) and the store reads metadata from
//! the registry ever after.

mod class_map;
mod registry;

pub use class_map::ClassMapSettings;
pub use registry::{IndexDecl, Registry, TypeDecl, TypeInfo};

use crate::error::CoreError;
use crate::record::{DataObject, FieldValue};
use crate::value::{Atom, Doc, Value};
use crate::writer::TreeWriter;

/// Declared kind of a reflected field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Int,
    Long,
    Double,
    Bool,
    Date,
    Time,
    Minute,
    DateTime,
    /// Enum persisted by variant name; carries the declared full type name.
    Enum(&'static str),
    Tid,
    Bytes,
    /// Nested key of the named key type; persists as a key string.
    Key(&'static str),
    /// Nested data object of the named type; persists as a sub-document.
    Data(&'static str),
    /// Homogeneous list of the element kind. Lists of lists are rejected.
    List(Box<FieldKind>),
}

impl FieldKind {
    pub fn list(element: FieldKind) -> Self {
        FieldKind::List(Box::new(element))
    }

    pub fn describe(&self) -> String {
        match self {
            FieldKind::String => "string".to_string(),
            FieldKind::Int => "int".to_string(),
            FieldKind::Long => "long".to_string(),
            FieldKind::Double => "double".to_string(),
            FieldKind::Bool => "bool".to_string(),
            FieldKind::Date => "date".to_string(),
            FieldKind::Time => "time".to_string(),
            FieldKind::Minute => "minute".to_string(),
            FieldKind::DateTime => "datetime".to_string(),
            FieldKind::Enum(name) => format!("enum {name}"),
            FieldKind::Tid => "tid".to_string(),
            FieldKind::Bytes => "bytes".to_string(),
            FieldKind::Key(name) => format!("key {name}"),
            FieldKind::Data(name) => format!("data {name}"),
            FieldKind::List(element) => format!("list of {}", element.describe()),
        }
    }
}

/// Registered kind of a reflected type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypeKind {
    /// Persistable record with the storage header.
    Record,
    /// Key type; projects to the `;`-delimited key string.
    Key,
    /// Embeddable data element without a storage header.
    Element,
}

/// One declared field.
#[derive(Clone, Debug)]
pub struct FieldInfo {
    pub name: &'static str,
    pub kind: FieldKind,
}

/// A declared method: invoked by name against a live object.
pub type MethodFn = fn(&mut dyn DataObject, &Registry) -> Result<(), CoreError>;

#[derive(Clone, Debug)]
pub struct MethodInfo {
    pub name: &'static str,
    pub invoke: MethodFn,
}

pub type CtorFn = fn() -> Box<dyn DataObject>;

/// Custom class serializer: replaces the default tree walk for the type.
pub type SerializeClassFn =
    fn(&dyn DataObject, &Registry, &mut dyn TreeWriter) -> Result<(), CoreError>;

/// Custom class deserializer: replaces the default document replay.
pub type DeserializeClassFn = fn(&mut dyn DataObject, &Doc, &Registry) -> Result<(), CoreError>;

/// Custom field serializer for one declared field.
pub type SerializeFieldFn =
    fn(&dyn DataObject, &FieldInfo, &Registry, &mut dyn TreeWriter) -> Result<(), CoreError>;

/// Custom field deserializer for one declared field.
pub type DeserializeFieldFn =
    fn(&mut dyn DataObject, &FieldInfo, &Value, &Registry) -> Result<(), CoreError>;

/// Wire form of a value appearing on the right-hand side of a query operator.
pub type FilterAtomFn = fn(&FieldValue) -> Option<Atom>;

/// Declared attribute on a registered type.
#[derive(Clone, Debug)]
pub enum Attr {
    /// Declared index: comma-separated field names, `-` prefix descending.
    IndexElements {
        definition: String,
        name: Option<String>,
    },
    SerializeClass(SerializeClassFn),
    DeserializeClass(DeserializeClassFn),
    SerializeField {
        field: &'static str,
        encode: SerializeFieldFn,
    },
    DeserializeField {
        field: &'static str,
        decode: DeserializeFieldFn,
    },
    FilterTokenAtom(FilterAtomFn),
}
