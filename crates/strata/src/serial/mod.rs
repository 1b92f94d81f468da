//! Reflection-driven serialization.
//!
//! Outbound, a record walks its registry metadata into a [`TreeWriter`]
//! backend: [`DocWriter`] builds the storage document, [`JsonWriter`] a JSON
//! value. Inbound, a stored document is replayed as writer events into a
//! [`DataWriter`] that reconstructs the typed object, or a [`TupleWriter`]
//! that fills a projection row.

mod data_writer;
mod doc_writer;
mod json_writer;
mod record;
mod tuple_writer;

pub use data_writer::DataWriter;
pub use doc_writer::DocWriter;
pub use json_writer::JsonWriter;
pub use record::{
    deserialize_record, record_to_doc, record_to_json, replay_doc, serialize_record,
};
pub use tuple_writer::TupleWriter;

use serde::{Deserialize, Serialize};

use strata_core::error::{CoreError, SerialError};
use strata_core::value::{datetime_from_millis, Atom, Value};

/// How the `_t` discriminator is stored.
///
/// Hierarchical is the default; scalar stores only the concrete mapped name.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscriminatorConvention {
    #[default]
    Hierarchical,
    Scalar,
}

/// Document fields that are storage metadata, not reflected fields.
pub(crate) const META_FIELDS: [&str; 5] = ["_id", "_t", "_d", "_dataset", "_key"];

pub(crate) fn is_meta_field(name: &str) -> bool {
    META_FIELDS.contains(&name)
}

/// Lift a wire value back to the writer-facing atom.
pub(crate) fn wire_atom(element: &str, value: &Value) -> Result<Atom, CoreError> {
    match value {
        Value::String(s) => Ok(Atom::String(s.clone())),
        Value::Int(i) => Ok(Atom::Int(*i)),
        Value::Long(l) => Ok(Atom::Long(*l)),
        Value::Double(d) => Ok(Atom::Double(*d)),
        Value::Bool(b) => Ok(Atom::Bool(*b)),
        Value::DateTime(millis) => datetime_from_millis(*millis)
            .map(Atom::DateTime)
            .ok_or_else(|| {
                SerialError::ValueKind {
                    element: element.to_string(),
                    expected: "datetime milliseconds",
                    got: millis.to_string(),
                }
                .into()
            }),
        Value::Tid(t) => Ok(Atom::Tid(*t)),
        Value::Bytes(b) => Ok(Atom::Bytes(b.clone())),
        other => Err(SerialError::ValueKind {
            element: element.to_string(),
            expected: "atomic value",
            got: other.kind_name().to_string(),
        }
        .into()),
    }
}
