//! Query cursors: forward-only, single-consumer, with temporal skip rules.
//!
//! The pipeline already returns one document per logical key; the cursor
//! makes the invariants explicit on the iteration side. Tombstones and
//! dynamically mismatched types are skipped, never surfaced — a derived type
//! registered after the query was composed must not fail the scan.

use std::marker::PhantomData;
use std::sync::Arc;

use strata_core::meta::Registry;
use strata_core::record::{downcast, DataObject, FieldValue, Record, Reflect};
use strata_core::value::{Doc, Value};
use strata_core::DELETED_RECORD_TYPE;

use crate::error::{Error, Result};
use crate::serial::{deserialize_record, replay_doc, TupleWriter};
use crate::storage::DocCursor;

/// Untyped record stream.
pub struct RecordCursor {
    docs: DocCursor,
    registry: Arc<Registry>,
    type_name: String,
    tombstone_mapped: String,
    current_key: Option<String>,
}

impl RecordCursor {
    pub(crate) fn new(docs: DocCursor, registry: Arc<Registry>, type_name: String) -> Self {
        let tombstone_mapped = registry
            .get(DELETED_RECORD_TYPE)
            .map(|info| info.mapped_name.clone())
            .unwrap_or_else(|| "DeletedRecord".to_string());
        Self {
            docs,
            registry,
            type_name,
            tombstone_mapped,
            current_key: None,
        }
    }

    /// Returns the next visible document, applying the skip rules; `None`
    /// when the stream is exhausted.
    fn next_doc(&mut self) -> Result<Option<Doc>> {
        while let Some(doc) = self.docs.next().transpose()? {
            // Every document marks its key as seen, winners and skipped
            // alike; a duplicate key can only be an older version.
            let key = doc.get("_key").and_then(Value::as_str).map(str::to_string);
            if key.is_some() && key == self.current_key {
                tracing::warn!(key = ?key, "duplicate key in query stream, skipping");
                continue;
            }
            self.current_key = key;

            let Ok(mapped) = doc.discriminator() else {
                tracing::warn!("document without discriminator in query stream, skipping");
                continue;
            };
            if mapped == self.tombstone_mapped {
                continue;
            }
            let Some(info) = self.registry.get_mapped(mapped) else {
                tracing::warn!(mapped, "unregistered discriminator in query stream, skipping");
                continue;
            };
            if !self.registry.is_subtype_of(info.full_name, &self.type_name) {
                continue;
            }
            return Ok(Some(doc));
        }
        Ok(None)
    }
}

impl Iterator for RecordCursor {
    type Item = Result<Box<dyn DataObject>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_doc() {
            Ok(Some(doc)) => Some(deserialize_record(&doc, &self.registry).map_err(Error::from)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

/// Typed view over the same stream.
pub struct TypedCursor<T> {
    inner: RecordCursor,
    _marker: PhantomData<fn() -> T>,
}

impl<T> TypedCursor<T> {
    pub(crate) fn new(inner: RecordCursor) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }
}

impl<T: Reflect + Record> Iterator for TypedCursor<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.inner.next()? {
                Ok(object) => match downcast::<T>(object) {
                    Ok(record) => return Some(Ok(*record)),
                    // Subtype of the queried name but not T itself; the
                    // untyped cursor already vetted the hierarchy, so skip.
                    Err(_) => continue,
                },
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Projection stream: each document fills one tuple of the selected fields.
pub struct TupleCursor {
    inner: RecordCursor,
    fields: Vec<String>,
}

impl TupleCursor {
    pub(crate) fn new(inner: RecordCursor, fields: Vec<String>) -> Self {
        Self { inner, fields }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }
}

impl Iterator for TupleCursor {
    type Item = Result<Vec<FieldValue>>;

    fn next(&mut self) -> Option<Self::Item> {
        let doc = match self.inner.next_doc() {
            Ok(Some(doc)) => doc,
            Ok(None) => return None,
            Err(e) => return Some(Err(e)),
        };
        let mut writer = TupleWriter::new(self.fields.clone());
        if let Err(e) = replay_doc(&doc, &self.inner.registry, &mut writer) {
            return Some(Err(e.into()));
        }
        Some(Ok(writer.into_tuple()))
    }
}
