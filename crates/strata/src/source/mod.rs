//! Data source core: save, point reads, temporal reloads, tombstone
//! deletes, dataset management, and environment gating.
//!
//! One data source owns a database handle, the monotonic id generator, and
//! the per-dataset lookup cache. Saves serialize through the reflection
//! registry into the record root's collection; reads compose the temporal
//! query pipeline.

mod db_name;
mod lookup;

pub use db_name::{DbName, EnvKind};

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use thiserror::Error;

use strata_core::dataset::{DataSetData, DataSetDetailData, COMMON_DATA_SET, DATA_SET_TYPE};
use strata_core::effect::{Effect, Transience};
use strata_core::key::record_key_string;
use strata_core::meta::Registry;
use strata_core::record::{downcast, DataObject, DeletedRecordData, Record, Reflect};
use strata_core::tid::{TemporalId, TidGenerator};
use strata_core::value::{Doc, Value};

use crate::error::{Error, Result};
use crate::query::Query;
use crate::serial::{deserialize_record, record_to_doc, DiscriminatorConvention};
use crate::storage::{Collection, DataStore, Stage};

/// Data source failure: validation, gating, and missing-entity states.
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum SourceError {
    #[error("database name `{raw}` is invalid: {reason}")]
    DbName { raw: String, reason: String },
    #[error("environment `{env}` does not permit {operation}")]
    EnvForbidden {
        env: String,
        operation: &'static str,
    },
    #[error("data source is read-only")]
    SourceReadOnly,
    #[error("dataset `{data_set}` is read-only")]
    ReadOnly { data_set: String },
    #[error("record of type `{type_name}` produced an empty key")]
    EmptyKey { type_name: String },
    #[error("dataset `{name}` not found")]
    MissingDataSet { name: String },
    #[error("record `{id}` not found")]
    MissingRecord { id: String },
    #[error("record `{id}` has type `{actual}`, which is not a subtype of `{expected}`")]
    TypeMismatch {
        id: String,
        actual: String,
        expected: String,
    },
    #[error("dataset imports form a cycle at `{id}`")]
    DataSetCycle { id: String },
    #[error("filter references unknown field `{field}` of `{type_name}`")]
    UnknownFilterField { type_name: String, field: String },
}

impl SourceError {
    pub fn transience(&self) -> Transience {
        Transience::Permanent
    }

    pub fn effect(&self) -> Effect {
        Effect::None
    }
}

/// Handle to one database: storage, registry, id generator, lookup cache.
pub struct DataSource {
    store: Arc<dyn DataStore>,
    db: DbName,
    registry: Arc<Registry>,
    convention: DiscriminatorConvention,
    read_only: bool,
    cutoff_time: Option<TemporalId>,
    generator: Mutex<TidGenerator>,
    lookups: Mutex<HashMap<TemporalId, Arc<strata_core::dataset::DataSetLookup>>>,
}

impl DataSource {
    pub fn new(store: Arc<dyn DataStore>, db: DbName, registry: Arc<Registry>) -> Self {
        strata_core::declare_core_types(&registry);
        Self {
            store,
            db,
            registry,
            convention: DiscriminatorConvention::default(),
            read_only: false,
            cutoff_time: None,
            generator: Mutex::new(TidGenerator::new()),
            lookups: Mutex::new(HashMap::new()),
        }
    }

    /// Reject every mutating operation on this source.
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Global cutoff: records with `id >= cutoff` are invisible everywhere.
    /// Combines with per-dataset cutoffs by taking the earlier value.
    pub fn with_cutoff(mut self, cutoff_time: Option<TemporalId>) -> Self {
        self.cutoff_time = cutoff_time;
        self
    }

    pub fn with_convention(mut self, convention: DiscriminatorConvention) -> Self {
        self.convention = convention;
        self
    }

    pub fn db(&self) -> &DbName {
        &self.db
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub(crate) fn convention(&self) -> DiscriminatorConvention {
        self.convention
    }

    pub(crate) fn global_cutoff(&self) -> Option<TemporalId> {
        self.cutoff_time
    }

    /// Next strictly monotonic id. Serializes concurrent saves on the
    /// generator mutex.
    pub fn generate_ordered_id(&self) -> TemporalId {
        self.generator.lock().expect("generator lock").next_id()
    }

    pub(crate) fn collection_for(&self, type_name: &str) -> Result<Arc<dyn Collection>> {
        let name = self.registry.collection_of(type_name)?;
        Ok(self.store.collection(&name))
    }

    /// Fail unless the target dataset (and the source itself) accepts writes.
    fn check_writable(&self, target: TemporalId) -> Result<()> {
        if self.read_only {
            return Err(SourceError::SourceReadOnly.into());
        }
        if let Some(detail) = self.get_data_set_detail_or_null(target)? {
            if detail.read_only == Some(true) {
                return Err(SourceError::ReadOnly {
                    data_set: target.to_string(),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Persist a record into the target dataset. Assigns a fresh monotonic
    /// id, stamps the dataset, computes `_key`, and writes the document to
    /// the record root's collection.
    pub fn save(&self, record: &mut dyn Record, target: TemporalId) -> Result<TemporalId> {
        self.save_to_collection(record, target, None)
    }

    pub fn save_many(
        &self,
        records: &mut [&mut dyn Record],
        target: TemporalId,
    ) -> Result<Vec<TemporalId>> {
        records
            .iter_mut()
            .map(|record| self.save(&mut **record, target))
            .collect()
    }

    fn save_to_collection(
        &self,
        record: &mut dyn Record,
        target: TemporalId,
        collection: Option<&str>,
    ) -> Result<TemporalId> {
        self.check_writable(target)?;
        let key = record_key_string(record, &self.registry)?;
        if key.is_empty() {
            return Err(SourceError::EmptyKey {
                type_name: record.type_name().to_string(),
            }
            .into());
        }

        let id = self.generate_ordered_id();
        record.set_id(id);
        record.set_data_set(target);

        let mut doc = record_to_doc(record, &self.registry, self.convention)?;
        doc.push_front("_dataset", Value::Tid(target));
        doc.push_front("_id", Value::Tid(id));

        let collection = match collection {
            Some(name) => self.store.collection(name),
            None => self.collection_for(record.type_name())?,
        };
        collection.insert(doc)?;
        tracing::debug!(
            id = %id,
            key = %key,
            data_set = %target,
            collection = collection.name(),
            "record saved"
        );

        // Details change visibility rules; drop memoized lookups.
        if record.type_name() == strata_core::dataset::DATA_SET_DETAIL_TYPE {
            self.lookups.lock().expect("lookup cache lock").clear();
        }
        Ok(id)
    }

    /// Point read by id. Returns `None` for missing records and tombstones;
    /// a record of a foreign type is a type-mismatch error.
    pub fn load_or_null(
        &self,
        type_name: &str,
        id: TemporalId,
    ) -> Result<Option<Box<dyn DataObject>>> {
        let collection = self.collection_for(type_name)?;
        let mut filter = Doc::new();
        let mut op = Doc::new();
        op.push("$eq", Value::Tid(id));
        filter.push("_id", Value::Doc(op));
        let mut cursor = collection.aggregate(&[Stage::Match(filter), Stage::Limit(1)])?;
        let Some(doc) = cursor.next().transpose()? else {
            return Ok(None);
        };
        let mapped = doc.discriminator()?.to_string();
        let info = self.registry.require_mapped(&mapped)?;
        if info.full_name == strata_core::record::DELETED_RECORD_TYPE {
            return Ok(None);
        }
        if !self.registry.is_subtype_of(info.full_name, type_name) {
            return Err(SourceError::TypeMismatch {
                id: id.to_string(),
                actual: info.full_name.to_string(),
                expected: type_name.to_string(),
            }
            .into());
        }
        Ok(Some(deserialize_record(&doc, &self.registry)?))
    }

    /// Strict point read.
    pub fn load(&self, type_name: &str, id: TemporalId) -> Result<Box<dyn DataObject>> {
        self.load_or_null(type_name, id)?
            .ok_or_else(|| Error::from(SourceError::MissingRecord { id: id.to_string() }))
    }

    pub fn load_or_null_as<T: Reflect + Record>(&self, id: TemporalId) -> Result<Option<T>> {
        match self.load_or_null(T::TYPE_NAME, id)? {
            Some(object) => Ok(Some(downcast_record::<T>(object, id)?)),
            None => Ok(None),
        }
    }

    /// Latest record visible from the dataset for the logical key, or `None`
    /// when the key is absent or its winner is a tombstone.
    pub fn reload_or_null(
        &self,
        type_name: &str,
        key: &str,
        data_set: TemporalId,
    ) -> Result<Option<Box<dyn DataObject>>> {
        let lookup = self.lookup(data_set)?;
        self.reload_with_lookup(&lookup, type_name, key)
    }

    pub(crate) fn reload_with_lookup(
        &self,
        lookup: &strata_core::dataset::DataSetLookup,
        type_name: &str,
        key: &str,
    ) -> Result<Option<Box<dyn DataObject>>> {
        let mut key_filter = Doc::new();
        let mut op = Doc::new();
        op.push("$eq", Value::String(key.to_string()));
        key_filter.push("_key", Value::Doc(op));
        let stages = crate::query::build_stages(
            lookup,
            &self.registry,
            type_name,
            &[key_filter],
            &[],
            Some(1),
            None,
        )?;
        let collection = self.collection_for(type_name)?;
        let mut cursor = collection.aggregate(&stages)?;
        match cursor.next().transpose()? {
            Some(doc) => Ok(Some(deserialize_record(&doc, &self.registry)?)),
            None => Ok(None),
        }
    }

    pub fn reload_or_null_as<T: Reflect + Record>(
        &self,
        key: &str,
        data_set: TemporalId,
    ) -> Result<Option<T>> {
        match self.reload_or_null(T::TYPE_NAME, key, data_set)? {
            Some(object) => Ok(Some(downcast_record::<T>(object, TemporalId::EMPTY)?)),
            None => Ok(None),
        }
    }

    /// Write a tombstone hiding the key from reads in the target dataset and
    /// its importers. Prior versions stay on disk.
    pub fn delete_record(&self, type_name: &str, key: &str, target: TemporalId) -> Result<()> {
        let collection_name = self.registry.collection_of(type_name)?;
        let mut tombstone = DeletedRecordData::new(key);
        self.save_to_collection(&mut tombstone, target, Some(&collection_name))?;
        Ok(())
    }

    /// Query builder for the type's hierarchy, visible from the dataset.
    pub fn get_query(self: &Arc<Self>, data_set: TemporalId, type_name: &str) -> Query {
        Query::new(self.clone(), data_set, type_name)
    }

    /// Create a named dataset whose record lives in `parent_of_data_set`.
    pub fn create_data_set(
        &self,
        data_set_id: &str,
        parents: &[TemporalId],
        parent_of_data_set: TemporalId,
    ) -> Result<TemporalId> {
        let mut record = DataSetData::new(data_set_id);
        record.parents = parents.to_vec();
        self.save(&mut record, parent_of_data_set)
    }

    /// Create the canonical `Common` dataset at the root.
    pub fn create_common(&self) -> Result<TemporalId> {
        self.create_data_set(COMMON_DATA_SET, &[], TemporalId::EMPTY)
    }

    /// Resolve a dataset name to its id; missing datasets are an error.
    pub fn get_data_set(&self, data_set_id: &str, source: TemporalId) -> Result<TemporalId> {
        match self.get_data_set_or_empty(data_set_id, source)? {
            id if id.is_empty() => Err(SourceError::MissingDataSet {
                name: data_set_id.to_string(),
            }
            .into()),
            id => Ok(id),
        }
    }

    /// Resolve a dataset name to its id, or [`TemporalId::EMPTY`] when the
    /// name is not defined in the visible set.
    pub fn get_data_set_or_empty(
        &self,
        data_set_id: &str,
        source: TemporalId,
    ) -> Result<TemporalId> {
        match self.reload_or_null(DATA_SET_TYPE, data_set_id, source)? {
            Some(object) => {
                let record = downcast::<DataSetData>(object)
                    .map_err(|o| foreign_type(o.type_name(), DATA_SET_TYPE))?;
                Ok(record.id)
            }
            None => Ok(TemporalId::EMPTY),
        }
    }

    /// Detail record describing the dataset, resolved through the dataset's
    /// own visible set (details live in the parent).
    pub fn get_data_set_detail_or_null(
        &self,
        data_set: TemporalId,
    ) -> Result<Option<DataSetDetailData>> {
        let lookup = self.lookup(data_set)?;
        self.detail_with_lookup(&lookup, data_set)
    }

    /// Ensure every index declared on the type's hierarchy exists.
    pub fn ensure_indexes(&self, type_name: &str) -> Result<()> {
        let collection = self.collection_for(type_name)?;
        for declaration in self.registry.index_declarations(type_name)? {
            collection.ensure_index(&declaration.elements, &declaration.name)?;
        }
        Ok(())
    }

    /// Drop the underlying database. Permitted only for DEV, USER, and TEST
    /// environment tags.
    pub fn delete_db(&self) -> Result<()> {
        if !self.db.env().allows_drop() {
            return Err(SourceError::EnvForbidden {
                env: self.db.env().to_string(),
                operation: "delete_db",
            }
            .into());
        }
        tracing::info!(db = %self.db, "dropping database");
        self.store.drop_db()?;
        self.lookups.lock().expect("lookup cache lock").clear();
        Ok(())
    }
}

pub(crate) fn downcast_record<T: Reflect + Record>(
    object: Box<dyn DataObject>,
    id: TemporalId,
) -> Result<T> {
    let actual = object.type_name();
    match downcast::<T>(object) {
        Ok(boxed) => Ok(*boxed),
        Err(_) => Err(SourceError::TypeMismatch {
            id: id.to_string(),
            actual: actual.to_string(),
            expected: T::TYPE_NAME.to_string(),
        }
        .into()),
    }
}

fn foreign_type(actual: &str, expected: &str) -> Error {
    SourceError::TypeMismatch {
        id: String::new(),
        actual: actual.to_string(),
        expected: expected.to_string(),
    }
    .into()
}
