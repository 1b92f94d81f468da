//! Context: current dataset bound to a data source.
//!
//! Every operation forwards to the data source, supplying the current
//! dataset when the caller does not name one. Mutating the current dataset
//! is not thread-safe; reads through a fixed context are.

use std::sync::Arc;

use strata_core::record::{Record, Reflect};
use strata_core::tid::TemporalId;

use crate::error::Result;
use crate::query::{Query, TypedQuery};
use crate::source::DataSource;

#[derive(Clone)]
pub struct Context {
    source: Arc<DataSource>,
    data_set: TemporalId,
}

impl Context {
    /// Bind a source with the root as current dataset.
    pub fn new(source: Arc<DataSource>) -> Self {
        Self {
            source,
            data_set: TemporalId::EMPTY,
        }
    }

    pub fn source(&self) -> &Arc<DataSource> {
        &self.source
    }

    pub fn data_set(&self) -> TemporalId {
        self.data_set
    }

    pub fn set_data_set(&mut self, data_set: TemporalId) {
        self.data_set = data_set;
    }

    /// This context with another current dataset.
    pub fn with_data_set(&self, data_set: TemporalId) -> Self {
        Self {
            source: self.source.clone(),
            data_set,
        }
    }

    pub fn save(&self, record: &mut dyn Record) -> Result<TemporalId> {
        self.source.save(record, self.data_set)
    }

    pub fn save_many(&self, records: &mut [&mut dyn Record]) -> Result<Vec<TemporalId>> {
        self.source.save_many(records, self.data_set)
    }

    pub fn load_or_null<T: Reflect + Record>(&self, id: TemporalId) -> Result<Option<T>> {
        self.source.load_or_null_as::<T>(id)
    }

    pub fn load<T: Reflect + Record>(&self, id: TemporalId) -> Result<T> {
        let object = self.source.load(T::TYPE_NAME, id)?;
        crate::source::downcast_record::<T>(object, id)
    }

    pub fn reload_or_null<T: Reflect + Record>(&self, key: &str) -> Result<Option<T>> {
        self.source.reload_or_null_as::<T>(key, self.data_set)
    }

    pub fn delete_record<T: Reflect + Record>(&self, key: &str) -> Result<()> {
        self.source.delete_record(T::TYPE_NAME, key, self.data_set)
    }

    pub fn query<T: Reflect + Record>(&self) -> TypedQuery<T> {
        TypedQuery::new(self.source.clone(), self.data_set)
    }

    pub fn query_type(&self, type_name: &str) -> Query {
        self.source.get_query(self.data_set, type_name)
    }

    pub fn create_data_set(
        &self,
        data_set_id: &str,
        parents: &[TemporalId],
    ) -> Result<TemporalId> {
        self.source
            .create_data_set(data_set_id, parents, self.data_set)
    }

    pub fn get_data_set(&self, data_set_id: &str) -> Result<TemporalId> {
        self.source.get_data_set(data_set_id, self.data_set)
    }

    pub fn get_data_set_or_empty(&self, data_set_id: &str) -> Result<TemporalId> {
        self.source.get_data_set_or_empty(data_set_id, self.data_set)
    }
}
