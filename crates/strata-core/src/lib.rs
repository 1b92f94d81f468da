//! Core domain types for strata
//!
//! Module hierarchy follows type dependency order:
//! - effect: error metadata (retry/side-effect knowledge)
//! - error: core capability errors
//! - tid: temporal identifiers and the monotonic generator
//! - value: atomic values and the structured document model
//! - writer: tree-writer contract and shared state machine
//! - record: data-object model, records, tombstone
//! - meta: reflection registry (types, fields, attributes, class map)
//! - key: logical key strings (projection and parse)
//! - dataset: dataset records and the visible-dataset set

#![forbid(unsafe_code)]

pub mod dataset;
pub mod effect;
pub mod error;
pub mod key;
pub mod meta;
pub mod record;
pub mod tid;
pub mod value;
pub mod writer;

pub use dataset::{
    DataSetData, DataSetDetailData, DataSetDetailKey, DataSetKey, DataSetLookup, COMMON_DATA_SET,
    DATA_SET_DETAIL_KEY_TYPE, DATA_SET_DETAIL_TYPE, DATA_SET_KEY_TYPE, DATA_SET_TYPE,
};
pub use effect::{Effect, Transience};
pub use error::{CoreError, InvalidTid, KeyError, MetaError, SerialError};
pub use key::{key_string, parse_key_string, record_key_string, KEY_DELIMITER};
pub use meta::{
    Attr, ClassMapSettings, CtorFn, FieldInfo, FieldKind, IndexDecl, MethodFn, MethodInfo,
    Registry, TypeDecl, TypeInfo, TypeKind,
};
pub use record::{
    downcast, DataObject, DeletedRecordData, FieldAtom, FieldValue, Record, Reflect,
    DELETED_RECORD_TYPE, RECORD_ROOT,
};
pub use tid::{TemporalId, TidGenerator};
pub use value::{Atom, Doc, LocalMinute, Value};
pub use writer::{TreeWriter, WriterStack};

/// Register the built-in record family (datasets, details, tombstone).
pub fn declare_core_types(registry: &Registry) {
    dataset::declare(registry);
    record::declare(registry);
}
