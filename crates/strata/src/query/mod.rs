//! Typed temporal queries.
//!
//! A query targets one record hierarchy as visible from one dataset. For
//! every logical key in the visible set it returns exactly one record: the
//! latest visible non-tombstone whose discriminator satisfies the queried
//! type. User filters and orderings slot into the fixed pipeline.

mod cursor;
mod pipeline;
mod token;

pub use cursor::{RecordCursor, TupleCursor, TypedCursor};
pub use token::{FilterToken, Operator};

pub(crate) use pipeline::build_stages;

use std::marker::PhantomData;
use std::sync::Arc;

use strata_core::record::{Record, Reflect};
use strata_core::tid::TemporalId;
use strata_core::value::Doc;

use crate::error::Result;
use crate::source::DataSource;
use crate::storage::Collection as _;

/// Untyped query builder.
pub struct Query {
    source: Arc<DataSource>,
    data_set: TemporalId,
    type_name: String,
    filters: Vec<FilterToken>,
    sorts: Vec<(String, i32)>,
    limit: Option<usize>,
}

impl Query {
    pub(crate) fn new(source: Arc<DataSource>, data_set: TemporalId, type_name: &str) -> Self {
        Self {
            source,
            data_set,
            type_name: type_name.to_string(),
            filters: Vec::new(),
            sorts: Vec::new(),
            limit: None,
        }
    }

    pub fn data_set(&self) -> TemporalId {
        self.data_set
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Append a filter token; tokens combine with AND.
    pub fn filter(mut self, token: FilterToken) -> Self {
        self.filters.push(token);
        self
    }

    pub fn sort_by(mut self, field: impl Into<String>) -> Self {
        self.sorts.push((field.into(), 1));
        self
    }

    pub fn sort_by_desc(mut self, field: impl Into<String>) -> Self {
        self.sorts.push((field.into(), -1));
        self
    }

    /// Subsequent ordering key; same as `sort_by`, named for call sites that
    /// read better with an explicit secondary key.
    pub fn then_by(self, field: impl Into<String>) -> Self {
        self.sort_by(field)
    }

    pub fn then_by_desc(self, field: impl Into<String>) -> Self {
        self.sort_by_desc(field)
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn encoded_filters(&self) -> Result<Vec<Doc>> {
        self.filters
            .iter()
            .map(|token| token::encode_token(token, self.source.registry(), &self.type_name))
            .collect()
    }

    fn validated_sorts(&self) -> Result<Vec<(String, i32)>> {
        for (field, _) in &self.sorts {
            token::validate_field(self.source.registry(), &self.type_name, field)?;
        }
        Ok(self.sorts.clone())
    }

    /// Run the pipeline and return the record stream.
    pub fn cursor(&self) -> Result<RecordCursor> {
        let lookup = self.source.lookup(self.data_set)?;
        let stages = build_stages(
            &lookup,
            self.source.registry(),
            &self.type_name,
            &self.encoded_filters()?,
            &self.validated_sorts()?,
            self.limit,
            None,
        )?;
        let collection = self.source.collection_for(&self.type_name)?;
        let docs = collection.aggregate(&stages)?;
        Ok(RecordCursor::new(
            docs,
            self.source.registry().clone(),
            self.type_name.clone(),
        ))
    }

    pub fn first_or_null(&self) -> Result<Option<Box<dyn strata_core::record::DataObject>>> {
        self.cursor()?.next().transpose()
    }

    /// Project to the listed fields; each result row is one tuple. Fields
    /// must resolve on the queried hierarchy.
    pub fn select(&self, fields: &[&str]) -> Result<TupleCursor> {
        for field in fields {
            token::validate_field(self.source.registry(), &self.type_name, field)?;
        }
        // `_key` and `_t` ride along for the cursor-side skip rules.
        let mut projected: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
        for meta in ["_key", "_t"] {
            if !projected.iter().any(|f| f == meta) {
                projected.push(meta.to_string());
            }
        }

        let lookup = self.source.lookup(self.data_set)?;
        let stages = build_stages(
            &lookup,
            self.source.registry(),
            &self.type_name,
            &self.encoded_filters()?,
            &self.validated_sorts()?,
            self.limit,
            Some(&projected),
        )?;
        let collection = self.source.collection_for(&self.type_name)?;
        let docs = collection.aggregate(&stages)?;
        let inner = RecordCursor::new(
            docs,
            self.source.registry().clone(),
            self.type_name.clone(),
        );
        Ok(TupleCursor::new(
            inner,
            fields.iter().map(|f| f.to_string()).collect(),
        ))
    }

    /// Typed view of this query.
    pub fn typed<T: Reflect + Record>(self) -> TypedQuery<T> {
        TypedQuery {
            inner: self,
            _marker: PhantomData,
        }
    }
}

/// Query with a statically known record type.
pub struct TypedQuery<T> {
    inner: Query,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Reflect + Record> TypedQuery<T> {
    pub(crate) fn new(source: Arc<DataSource>, data_set: TemporalId) -> Self {
        Query::new(source, data_set, T::TYPE_NAME).typed()
    }

    pub fn filter(mut self, token: FilterToken) -> Self {
        self.inner = self.inner.filter(token);
        self
    }

    pub fn sort_by(mut self, field: impl Into<String>) -> Self {
        self.inner = self.inner.sort_by(field);
        self
    }

    pub fn sort_by_desc(mut self, field: impl Into<String>) -> Self {
        self.inner = self.inner.sort_by_desc(field);
        self
    }

    pub fn then_by(mut self, field: impl Into<String>) -> Self {
        self.inner = self.inner.then_by(field);
        self
    }

    pub fn then_by_desc(mut self, field: impl Into<String>) -> Self {
        self.inner = self.inner.then_by_desc(field);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.inner = self.inner.limit(limit);
        self
    }

    pub fn cursor(&self) -> Result<TypedCursor<T>> {
        Ok(TypedCursor::new(self.inner.cursor()?))
    }

    pub fn first_or_null(&self) -> Result<Option<T>> {
        self.cursor()?.next().transpose()
    }

    pub fn select(&self, fields: &[&str]) -> Result<TupleCursor> {
        self.inner.select(fields)
    }
}
