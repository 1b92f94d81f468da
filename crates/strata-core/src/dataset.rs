//! Dataset records and the visible-dataset set.
//!
//! Datasets are ordinary records: named containers linked by an imports DAG.
//! A dataset record lives in the *parent* dataset that declared it (the root
//! `Common` dataset by convention); the root itself is
//! [`TemporalId::EMPTY`]. Per-dataset overrides (read-only flag, cutoffs)
//! live in detail records keyed by the described dataset's id.

use std::collections::BTreeMap;

use crate::error::CoreError;
use crate::meta::{FieldKind, Registry, TypeDecl};
use crate::record::{DataObject, FieldValue, Record, Reflect};
use crate::tid::TemporalId;

/// Canonical name of the root-adjacent common dataset.
pub const COMMON_DATA_SET: &str = "Common";

pub const DATA_SET_TYPE: &str = "strata::dataset::DataSetData";
pub const DATA_SET_KEY_TYPE: &str = "strata::dataset::DataSetKey";
pub const DATA_SET_DETAIL_TYPE: &str = "strata::dataset::DataSetDetailData";
pub const DATA_SET_DETAIL_KEY_TYPE: &str = "strata::dataset::DataSetDetailKey";

/// Key of a dataset record: the human-readable dataset name.
#[derive(Clone, Debug, Default)]
pub struct DataSetKey {
    pub data_set_id: Option<String>,
}

impl DataSetKey {
    pub fn new(data_set_id: impl Into<String>) -> Self {
        Self {
            data_set_id: Some(data_set_id.into()),
        }
    }
}

impl DataObject for DataSetKey {
    fn type_name(&self) -> &'static str {
        DATA_SET_KEY_TYPE
    }

    fn get_field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "data_set_id" => Some(FieldValue::from_opt(&self.data_set_id)),
            _ => None,
        }
    }

    fn set_field(&mut self, name: &str, value: FieldValue) -> Result<(), CoreError> {
        match name {
            "data_set_id" => {
                self.data_set_id = value.into_opt(DATA_SET_KEY_TYPE, name)?;
                Ok(())
            }
            _ => Err(unknown_field(DATA_SET_KEY_TYPE, name)),
        }
    }

    crate::data_object_body!();
}

impl Reflect for DataSetKey {
    const TYPE_NAME: &'static str = DATA_SET_KEY_TYPE;
}

/// A named dataset and its direct imports.
#[derive(Clone, Debug, Default)]
pub struct DataSetData {
    pub id: TemporalId,
    pub data_set: TemporalId,
    /// Human-readable name; the key field.
    pub data_set_id: Option<String>,
    /// Direct imports, in declaration order.
    pub parents: Vec<TemporalId>,
}

impl DataSetData {
    pub fn new(data_set_id: impl Into<String>) -> Self {
        Self {
            data_set_id: Some(data_set_id.into()),
            ..Self::default()
        }
    }
}

impl DataObject for DataSetData {
    fn type_name(&self) -> &'static str {
        DATA_SET_TYPE
    }

    fn get_field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "data_set_id" => Some(FieldValue::from_opt(&self.data_set_id)),
            "parents" => Some(FieldValue::from_list(&self.parents)),
            _ => None,
        }
    }

    fn set_field(&mut self, name: &str, value: FieldValue) -> Result<(), CoreError> {
        match name {
            "data_set_id" => {
                self.data_set_id = value.into_opt(DATA_SET_TYPE, name)?;
                Ok(())
            }
            "parents" => {
                self.parents = value.into_list(DATA_SET_TYPE, name)?;
                Ok(())
            }
            _ => Err(unknown_field(DATA_SET_TYPE, name)),
        }
    }

    crate::data_object_body!(record);
}

impl Reflect for DataSetData {
    const TYPE_NAME: &'static str = DATA_SET_TYPE;
}

impl Record for DataSetData {
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
}

/// Key of a detail record: the described dataset's id.
#[derive(Clone, Debug, Default)]
pub struct DataSetDetailKey {
    pub data_set_id: Option<TemporalId>,
}

impl DataSetDetailKey {
    pub fn new(data_set_id: TemporalId) -> Self {
        Self {
            data_set_id: Some(data_set_id),
        }
    }
}

impl DataObject for DataSetDetailKey {
    fn type_name(&self) -> &'static str {
        DATA_SET_DETAIL_KEY_TYPE
    }

    fn get_field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "data_set_id" => Some(FieldValue::from_opt(&self.data_set_id)),
            _ => None,
        }
    }

    fn set_field(&mut self, name: &str, value: FieldValue) -> Result<(), CoreError> {
        match name {
            "data_set_id" => {
                self.data_set_id = value.into_opt(DATA_SET_DETAIL_KEY_TYPE, name)?;
                Ok(())
            }
            _ => Err(unknown_field(DATA_SET_DETAIL_KEY_TYPE, name)),
        }
    }

    crate::data_object_body!();
}

impl Reflect for DataSetDetailKey {
    const TYPE_NAME: &'static str = DATA_SET_DETAIL_KEY_TYPE;
}

/// Per-dataset overrides, stored in the parent of the dataset they describe.
#[derive(Clone, Debug, Default)]
pub struct DataSetDetailData {
    pub id: TemporalId,
    pub data_set: TemporalId,
    /// The described dataset; the key field.
    pub data_set_id: Option<TemporalId>,
    /// When set, every mutating operation targeting the dataset is rejected.
    pub read_only: Option<bool>,
    /// Records of the described dataset with `id >= cutoff_time` are
    /// invisible to reads.
    pub cutoff_time: Option<TemporalId>,
    /// Cutoff applied to imported datasets, but not the dataset itself.
    pub imports_cutoff_time: Option<TemporalId>,
}

impl DataSetDetailData {
    pub fn new(data_set_id: TemporalId) -> Self {
        Self {
            data_set_id: Some(data_set_id),
            ..Self::default()
        }
    }
}

impl DataObject for DataSetDetailData {
    fn type_name(&self) -> &'static str {
        DATA_SET_DETAIL_TYPE
    }

    fn get_field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "data_set_id" => Some(FieldValue::from_opt(&self.data_set_id)),
            "read_only" => Some(FieldValue::from_opt(&self.read_only)),
            "cutoff_time" => Some(FieldValue::from_opt(&self.cutoff_time)),
            "imports_cutoff_time" => Some(FieldValue::from_opt(&self.imports_cutoff_time)),
            _ => None,
        }
    }

    fn set_field(&mut self, name: &str, value: FieldValue) -> Result<(), CoreError> {
        match name {
            "data_set_id" => {
                self.data_set_id = value.into_opt(DATA_SET_DETAIL_TYPE, name)?;
                Ok(())
            }
            "read_only" => {
                self.read_only = value.into_opt(DATA_SET_DETAIL_TYPE, name)?;
                Ok(())
            }
            "cutoff_time" => {
                self.cutoff_time = value.into_opt(DATA_SET_DETAIL_TYPE, name)?;
                Ok(())
            }
            "imports_cutoff_time" => {
                self.imports_cutoff_time = value.into_opt(DATA_SET_DETAIL_TYPE, name)?;
                Ok(())
            }
            _ => Err(unknown_field(DATA_SET_DETAIL_TYPE, name)),
        }
    }

    crate::data_object_body!(record);
}

impl Reflect for DataSetDetailData {
    const TYPE_NAME: &'static str = DATA_SET_DETAIL_TYPE;
}

impl Record for DataSetDetailData {
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
}

fn unknown_field(type_name: &str, field: &str) -> CoreError {
    crate::error::MetaError::UnknownField {
        type_name: type_name.to_string(),
        field: field.to_string(),
    }
    .into()
}

/// Register the dataset family with a registry.
pub fn declare(registry: &Registry) {
    registry.register(
        TypeDecl::key(DATA_SET_KEY_TYPE, || Box::new(DataSetKey::default()))
            .field("data_set_id", FieldKind::String),
    );
    registry.register(
        TypeDecl::record(DATA_SET_TYPE, || Box::new(DataSetData::default()))
            .key_type(DATA_SET_KEY_TYPE)
            .field("data_set_id", FieldKind::String)
            .field("parents", FieldKind::list(FieldKind::Tid)),
    );
    registry.register(
        TypeDecl::key(DATA_SET_DETAIL_KEY_TYPE, || {
            Box::new(DataSetDetailKey::default())
        })
        .field("data_set_id", FieldKind::Tid),
    );
    registry.register(
        TypeDecl::record(DATA_SET_DETAIL_TYPE, || {
            Box::new(DataSetDetailData::default())
        })
        .key_type(DATA_SET_DETAIL_KEY_TYPE)
        .field("data_set_id", FieldKind::Tid)
        .field("read_only", FieldKind::Bool)
        .field("cutoff_time", FieldKind::Tid)
        .field("imports_cutoff_time", FieldKind::Tid),
    );
}

/// The set of datasets visible to reads executed in one dataset, with the
/// per-dataset cutoffs that truncate them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DataSetLookup {
    data_set: TemporalId,
    sets: Vec<TemporalId>,
    cutoffs: BTreeMap<TemporalId, TemporalId>,
}

impl DataSetLookup {
    /// A fresh lookup always contains the dataset itself and the root.
    pub fn new(data_set: TemporalId) -> Self {
        let mut sets = vec![data_set];
        if !data_set.is_empty() {
            sets.push(TemporalId::EMPTY);
        }
        Self {
            data_set,
            sets,
            cutoffs: BTreeMap::new(),
        }
    }

    pub fn data_set(&self) -> TemporalId {
        self.data_set
    }

    pub fn sets(&self) -> &[TemporalId] {
        &self.sets
    }

    pub fn contains(&self, id: TemporalId) -> bool {
        self.sets.contains(&id)
    }

    pub fn cutoffs(&self) -> &BTreeMap<TemporalId, TemporalId> {
        &self.cutoffs
    }

    pub fn cutoff_of(&self, id: TemporalId) -> Option<TemporalId> {
        self.cutoffs.get(&id).copied()
    }

    pub fn add(&mut self, id: TemporalId) {
        if !self.contains(id) {
            self.sets.push(id);
        }
    }

    /// Union with an imported dataset's lookup: duplicate sets collapse,
    /// cutoffs combine by taking the earlier value.
    pub fn merge_import(&mut self, import: &DataSetLookup) {
        for id in &import.sets {
            self.add(*id);
        }
        for (id, cutoff) in &import.cutoffs {
            self.apply_cutoff(*id, *cutoff);
        }
    }

    /// Tighten the cutoff for one dataset; the earlier value wins.
    pub fn apply_cutoff(&mut self, id: TemporalId, cutoff: TemporalId) {
        self.cutoffs
            .entry(id)
            .and_modify(|existing| {
                if cutoff < *existing {
                    *existing = cutoff;
                }
            })
            .or_insert(cutoff);
    }

    /// Cutoff over every member except the owning dataset itself
    /// (`imports_cutoff_time` semantics).
    pub fn apply_imports_cutoff(&mut self, cutoff: TemporalId) {
        let members: Vec<TemporalId> = self
            .sets
            .iter()
            .copied()
            .filter(|id| *id != self.data_set)
            .collect();
        for id in members {
            self.apply_cutoff(id, cutoff);
        }
    }

    /// Cutoff over every member, including the owning dataset (the data
    /// source's global cutoff).
    pub fn apply_global_cutoff(&mut self, cutoff: TemporalId) {
        let members: Vec<TemporalId> = self.sets.clone();
        for id in members {
            self.apply_cutoff(id, cutoff);
        }
    }
}
