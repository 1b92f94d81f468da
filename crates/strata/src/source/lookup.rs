//! Visible-dataset set construction.
//!
//! `V(D)` is the transitive closure of `D` through dataset parents, plus the
//! root. Traversal is memoized per data source and keyed by dataset id;
//! dataset records are immutable, so cached entries never go stale — a
//! change to imports mints a new dataset id. Detail cutoffs tighten members
//! by taking the earlier value.

use std::collections::HashSet;
use std::sync::Arc;

use strata_core::dataset::{
    DataSetData, DataSetDetailData, DataSetLookup, DATA_SET_DETAIL_TYPE, DATA_SET_TYPE,
};
use strata_core::record::{downcast, DataObject};
use strata_core::tid::TemporalId;
use strata_core::value::{Doc, Value};

use crate::error::Result;
use crate::serial::deserialize_record;
use crate::storage::{Collection, Stage};

use super::{DataSource, SourceError};

impl DataSource {
    /// Memoized visible-dataset set for the dataset.
    pub(crate) fn lookup(&self, data_set: TemporalId) -> Result<Arc<DataSetLookup>> {
        if let Some(hit) = self
            .lookups
            .lock()
            .expect("lookup cache lock")
            .get(&data_set)
        {
            return Ok(hit.clone());
        }
        let mut visiting = HashSet::new();
        self.build_lookup(data_set, &mut visiting)
    }

    fn build_lookup(
        &self,
        data_set: TemporalId,
        visiting: &mut HashSet<TemporalId>,
    ) -> Result<Arc<DataSetLookup>> {
        if let Some(hit) = self
            .lookups
            .lock()
            .expect("lookup cache lock")
            .get(&data_set)
        {
            return Ok(hit.clone());
        }
        if !visiting.insert(data_set) {
            return Err(SourceError::DataSetCycle {
                id: data_set.to_string(),
            }
            .into());
        }

        let mut lookup = DataSetLookup::new(data_set);
        if !data_set.is_empty() {
            let record = self.load_data_set_record(data_set)?;
            for parent in &record.parents {
                let parent_lookup = self.build_lookup(*parent, visiting)?;
                lookup.merge_import(&parent_lookup);
            }
            if let Some(detail) = self.detail_with_lookup(&lookup, data_set)? {
                if let Some(cutoff) = detail.cutoff_time {
                    lookup.apply_cutoff(data_set, cutoff);
                }
                if let Some(cutoff) = detail.imports_cutoff_time {
                    lookup.apply_imports_cutoff(cutoff);
                }
            }
        }
        if let Some(global) = self.global_cutoff() {
            lookup.apply_global_cutoff(global);
        }
        visiting.remove(&data_set);

        let lookup = Arc::new(lookup);
        self.lookups
            .lock()
            .expect("lookup cache lock")
            .insert(data_set, lookup.clone());
        Ok(lookup)
    }

    /// Load a dataset record by id, bypassing visibility (the id is the
    /// authority here).
    fn load_data_set_record(&self, data_set: TemporalId) -> Result<DataSetData> {
        let collection = self.collection_for(DATA_SET_TYPE)?;
        let mut filter = Doc::new();
        let mut op = Doc::new();
        op.push("$eq", Value::Tid(data_set));
        filter.push("_id", Value::Doc(op));
        let mut cursor = collection.aggregate(&[Stage::Match(filter), Stage::Limit(1)])?;
        let doc = cursor
            .next()
            .transpose()?
            .ok_or_else(|| SourceError::MissingDataSet {
                name: data_set.to_string(),
            })?;
        let object = deserialize_record(&doc, self.registry())?;
        downcast::<DataSetData>(object).map(|boxed| *boxed).map_err(|object| {
            SourceError::TypeMismatch {
                id: data_set.to_string(),
                actual: object.type_name().to_string(),
                expected: DATA_SET_TYPE.to_string(),
            }
            .into()
        })
    }

    /// Detail record for the dataset, queried through the (possibly still
    /// partial) lookup: details live in the described dataset's parent.
    pub(crate) fn detail_with_lookup(
        &self,
        lookup: &DataSetLookup,
        data_set: TemporalId,
    ) -> Result<Option<DataSetDetailData>> {
        let key = data_set.to_string();
        match self.reload_with_lookup(lookup, DATA_SET_DETAIL_TYPE, &key)? {
            Some(object) => {
                let detail = downcast::<DataSetDetailData>(object).map_err(|object| {
                    crate::error::Error::from(SourceError::TypeMismatch {
                        id: key,
                        actual: object.type_name().to_string(),
                        expected: DATA_SET_DETAIL_TYPE.to_string(),
                    })
                })?;
                Ok(Some(*detail))
            }
            None => Ok(None),
        }
    }
}
