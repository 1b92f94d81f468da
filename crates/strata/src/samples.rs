//! Sample record family for tests and the CLI demo.
//!
//! `BaseSampleData` / `DerivedSampleData` / `OtherDerivedSampleData` share
//! the `BaseSample` collection and cover every atomic field kind, lists,
//! nested elements, and nested keys.

use time::{Date, OffsetDateTime, Time};

use strata_core::atom_enum;
use strata_core::error::{CoreError, MetaError};
use strata_core::meta::{Attr, FieldKind, Registry, TypeDecl};
use strata_core::record::{DataObject, FieldValue, Record, Reflect};
use strata_core::tid::TemporalId;
use strata_core::value::LocalMinute;

pub const BASE_SAMPLE_KEY_TYPE: &str = "strata::samples::BaseSampleKey";
pub const BASE_SAMPLE_TYPE: &str = "strata::samples::BaseSampleData";
pub const ELEMENT_SAMPLE_TYPE: &str = "strata::samples::ElementSampleData";
pub const DERIVED_SAMPLE_TYPE: &str = "strata::samples::DerivedSampleData";
pub const OTHER_DERIVED_SAMPLE_TYPE: &str = "strata::samples::OtherDerivedSampleData";

atom_enum! {
    /// Enum persisted by variant name.
    pub enum SampleEnum("strata::samples::SampleEnum") {
        Empty => "Empty",
        EnumValue1 => "EnumValue1",
        EnumValue2 => "EnumValue2",
    }
}

fn unknown_field(type_name: &str, field: &str) -> CoreError {
    MetaError::UnknownField {
        type_name: type_name.to_string(),
        field: field.to_string(),
    }
    .into()
}

/// Declared method: drops the mutable version counter.
fn clear_version(object: &mut dyn DataObject, _registry: &Registry) -> Result<(), CoreError> {
    object.set_field("version", FieldValue::Null)
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct BaseSampleKey {
    pub record_id: Option<String>,
    pub record_index: Option<i32>,
}

impl BaseSampleKey {
    pub fn new(record_id: impl Into<String>, record_index: i32) -> Self {
        Self {
            record_id: Some(record_id.into()),
            record_index: Some(record_index),
        }
    }
}

impl DataObject for BaseSampleKey {
    fn type_name(&self) -> &'static str {
        BASE_SAMPLE_KEY_TYPE
    }

    fn get_field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "record_id" => Some(FieldValue::from_opt(&self.record_id)),
            "record_index" => Some(FieldValue::from_opt(&self.record_index)),
            _ => None,
        }
    }

    fn set_field(&mut self, name: &str, value: FieldValue) -> Result<(), CoreError> {
        match name {
            "record_id" => {
                self.record_id = value.into_opt(BASE_SAMPLE_KEY_TYPE, name)?;
                Ok(())
            }
            "record_index" => {
                self.record_index = value.into_opt(BASE_SAMPLE_KEY_TYPE, name)?;
                Ok(())
            }
            _ => Err(unknown_field(BASE_SAMPLE_KEY_TYPE, name)),
        }
    }

    strata_core::data_object_body!();
}

impl Reflect for BaseSampleKey {
    const TYPE_NAME: &'static str = BASE_SAMPLE_KEY_TYPE;
}

/// Root of the sample hierarchy; owns the `BaseSample` collection.
#[derive(Clone, Debug, Default)]
pub struct BaseSampleData {
    pub id: TemporalId,
    pub data_set: TemporalId,
    pub record_id: Option<String>,
    pub record_index: Option<i32>,
    pub version: Option<i32>,
    pub double_element: Option<f64>,
    pub local_date_element: Option<Date>,
    pub local_time_element: Option<Time>,
    pub local_minute_element: Option<LocalMinute>,
    pub local_date_time_element: Option<OffsetDateTime>,
    pub enum_value: Option<SampleEnum>,
}

impl BaseSampleData {
    pub fn new(record_id: impl Into<String>, record_index: i32) -> Self {
        Self {
            record_id: Some(record_id.into()),
            record_index: Some(record_index),
            ..Self::default()
        }
    }

    pub fn key(&self) -> BaseSampleKey {
        BaseSampleKey {
            record_id: self.record_id.clone(),
            record_index: self.record_index,
        }
    }
}

impl DataObject for BaseSampleData {
    fn type_name(&self) -> &'static str {
        BASE_SAMPLE_TYPE
    }

    fn get_field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "record_id" => Some(FieldValue::from_opt(&self.record_id)),
            "record_index" => Some(FieldValue::from_opt(&self.record_index)),
            "version" => Some(FieldValue::from_opt(&self.version)),
            "double_element" => Some(FieldValue::from_opt(&self.double_element)),
            "local_date_element" => Some(FieldValue::from_opt(&self.local_date_element)),
            "local_time_element" => Some(FieldValue::from_opt(&self.local_time_element)),
            "local_minute_element" => Some(FieldValue::from_opt(&self.local_minute_element)),
            "local_date_time_element" => Some(FieldValue::from_opt(&self.local_date_time_element)),
            "enum_value" => Some(FieldValue::from_opt(&self.enum_value)),
            _ => None,
        }
    }

    fn set_field(&mut self, name: &str, value: FieldValue) -> Result<(), CoreError> {
        match name {
            "record_id" => self.record_id = value.into_opt(BASE_SAMPLE_TYPE, name)?,
            "record_index" => self.record_index = value.into_opt(BASE_SAMPLE_TYPE, name)?,
            "version" => self.version = value.into_opt(BASE_SAMPLE_TYPE, name)?,
            "double_element" => self.double_element = value.into_opt(BASE_SAMPLE_TYPE, name)?,
            "local_date_element" => {
                self.local_date_element = value.into_opt(BASE_SAMPLE_TYPE, name)?
            }
            "local_time_element" => {
                self.local_time_element = value.into_opt(BASE_SAMPLE_TYPE, name)?
            }
            "local_minute_element" => {
                self.local_minute_element = value.into_opt(BASE_SAMPLE_TYPE, name)?
            }
            "local_date_time_element" => {
                self.local_date_time_element = value.into_opt(BASE_SAMPLE_TYPE, name)?
            }
            "enum_value" => self.enum_value = value.into_opt(BASE_SAMPLE_TYPE, name)?,
            _ => return Err(unknown_field(BASE_SAMPLE_TYPE, name)),
        }
        Ok(())
    }

    strata_core::data_object_body!(record);
}

impl Reflect for BaseSampleData {
    const TYPE_NAME: &'static str = BASE_SAMPLE_TYPE;
}

impl Record for BaseSampleData {
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

/// Embeddable element without a storage header.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ElementSampleData {
    pub data_element_name: Option<String>,
    pub double_element: Option<f64>,
}

impl DataObject for ElementSampleData {
    fn type_name(&self) -> &'static str {
        ELEMENT_SAMPLE_TYPE
    }

    fn get_field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "data_element_name" => Some(FieldValue::from_opt(&self.data_element_name)),
            "double_element" => Some(FieldValue::from_opt(&self.double_element)),
            _ => None,
        }
    }

    fn set_field(&mut self, name: &str, value: FieldValue) -> Result<(), CoreError> {
        match name {
            "data_element_name" => {
                self.data_element_name = value.into_opt(ELEMENT_SAMPLE_TYPE, name)?
            }
            "double_element" => self.double_element = value.into_opt(ELEMENT_SAMPLE_TYPE, name)?,
            _ => return Err(unknown_field(ELEMENT_SAMPLE_TYPE, name)),
        }
        Ok(())
    }

    strata_core::data_object_body!();
}

impl Reflect for ElementSampleData {
    const TYPE_NAME: &'static str = ELEMENT_SAMPLE_TYPE;
}

/// Derived record: base fields via embedding, plus lists, nested element,
/// nested key, and the remaining atomic kinds.
#[derive(Clone, Debug, Default)]
pub struct DerivedSampleData {
    pub base: BaseSampleData,
    pub derived_string_element: Option<String>,
    pub long_element: Option<i64>,
    pub bool_element: Option<bool>,
    pub bytes_element: Option<Vec<u8>>,
    pub string_list: Vec<String>,
    pub double_list: Vec<f64>,
    pub data_element: Option<ElementSampleData>,
    pub data_element_list: Vec<ElementSampleData>,
    pub key_element: Option<BaseSampleKey>,
}

impl DerivedSampleData {
    pub fn new(record_id: impl Into<String>, record_index: i32) -> Self {
        Self {
            base: BaseSampleData::new(record_id, record_index),
            ..Self::default()
        }
    }
}

impl DataObject for DerivedSampleData {
    fn type_name(&self) -> &'static str {
        DERIVED_SAMPLE_TYPE
    }

    fn get_field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "derived_string_element" => Some(FieldValue::from_opt(&self.derived_string_element)),
            "long_element" => Some(FieldValue::from_opt(&self.long_element)),
            "bool_element" => Some(FieldValue::from_opt(&self.bool_element)),
            "bytes_element" => Some(FieldValue::from_opt(&self.bytes_element)),
            "string_list" => Some(FieldValue::from_list(&self.string_list)),
            "double_list" => Some(FieldValue::from_list(&self.double_list)),
            "data_element" => Some(FieldValue::from_opt_data(&self.data_element)),
            "data_element_list" => Some(FieldValue::from_data_list(&self.data_element_list)),
            "key_element" => Some(FieldValue::from_opt_key(&self.key_element)),
            _ => self.base.get_field(name),
        }
    }

    fn set_field(&mut self, name: &str, value: FieldValue) -> Result<(), CoreError> {
        match name {
            "derived_string_element" => {
                self.derived_string_element = value.into_opt(DERIVED_SAMPLE_TYPE, name)?
            }
            "long_element" => self.long_element = value.into_opt(DERIVED_SAMPLE_TYPE, name)?,
            "bool_element" => self.bool_element = value.into_opt(DERIVED_SAMPLE_TYPE, name)?,
            "bytes_element" => self.bytes_element = value.into_opt(DERIVED_SAMPLE_TYPE, name)?,
            "string_list" => self.string_list = value.into_list(DERIVED_SAMPLE_TYPE, name)?,
            "double_list" => self.double_list = value.into_list(DERIVED_SAMPLE_TYPE, name)?,
            "data_element" => {
                self.data_element = value.into_opt_object(DERIVED_SAMPLE_TYPE, name)?
            }
            "data_element_list" => {
                self.data_element_list = value.into_object_list(DERIVED_SAMPLE_TYPE, name)?
            }
            "key_element" => self.key_element = value.into_opt_object(DERIVED_SAMPLE_TYPE, name)?,
            _ => return self.base.set_field(name, value),
        }
        Ok(())
    }

    strata_core::data_object_body!(record);
}

impl Reflect for DerivedSampleData {
    const TYPE_NAME: &'static str = DERIVED_SAMPLE_TYPE;
}

impl Record for DerivedSampleData {
    fn id(&self) -> TemporalId {
        self.base.id
    }

    fn set_id(&mut self, id: TemporalId) {
        self.base.id = id;
    }

    fn data_set(&self) -> TemporalId {
        self.base.data_set
    }

    fn set_data_set(&mut self, data_set: TemporalId) {
        self.base.data_set = data_set;
    }
}

/// Second derived record in the same collection.
#[derive(Clone, Debug, Default)]
pub struct OtherDerivedSampleData {
    pub base: BaseSampleData,
    pub other_string_element: Option<String>,
}

impl OtherDerivedSampleData {
    pub fn new(record_id: impl Into<String>, record_index: i32) -> Self {
        Self {
            base: BaseSampleData::new(record_id, record_index),
            ..Self::default()
        }
    }
}

impl DataObject for OtherDerivedSampleData {
    fn type_name(&self) -> &'static str {
        OTHER_DERIVED_SAMPLE_TYPE
    }

    fn get_field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "other_string_element" => Some(FieldValue::from_opt(&self.other_string_element)),
            _ => self.base.get_field(name),
        }
    }

    fn set_field(&mut self, name: &str, value: FieldValue) -> Result<(), CoreError> {
        match name {
            "other_string_element" => {
                self.other_string_element = value.into_opt(OTHER_DERIVED_SAMPLE_TYPE, name)?;
                Ok(())
            }
            _ => self.base.set_field(name, value),
        }
    }

    strata_core::data_object_body!(record);
}

impl Reflect for OtherDerivedSampleData {
    const TYPE_NAME: &'static str = OTHER_DERIVED_SAMPLE_TYPE;
}

impl Record for OtherDerivedSampleData {
    fn id(&self) -> TemporalId {
        self.base.id
    }

    fn set_id(&mut self, id: TemporalId) {
        self.base.id = id;
    }

    fn data_set(&self) -> TemporalId {
        self.base.data_set
    }

    fn set_data_set(&mut self, data_set: TemporalId) {
        self.base.data_set = data_set;
    }
}

/// Register the sample family with a registry.
pub fn declare(registry: &Registry) {
    registry.register(
        TypeDecl::key(BASE_SAMPLE_KEY_TYPE, || Box::new(BaseSampleKey::default()))
            .field("record_id", FieldKind::String)
            .field("record_index", FieldKind::Int),
    );
    registry.register(
        TypeDecl::record(BASE_SAMPLE_TYPE, || Box::new(BaseSampleData::default()))
            .key_type(BASE_SAMPLE_KEY_TYPE)
            .field("record_id", FieldKind::String)
            .field("record_index", FieldKind::Int)
            .field("version", FieldKind::Int)
            .field("double_element", FieldKind::Double)
            .field("local_date_element", FieldKind::Date)
            .field("local_time_element", FieldKind::Time)
            .field("local_minute_element", FieldKind::Minute)
            .field("local_date_time_element", FieldKind::DateTime)
            .field("enum_value", FieldKind::Enum(SampleEnum::FULL_NAME))
            .method("clear_version", clear_version)
            .attr(Attr::IndexElements {
                definition: "record_id, -record_index".to_string(),
                name: None,
            }),
    );
    registry.register(
        TypeDecl::element(ELEMENT_SAMPLE_TYPE, || {
            Box::new(ElementSampleData::default())
        })
        .field("data_element_name", FieldKind::String)
        .field("double_element", FieldKind::Double),
    );
    registry.register(
        TypeDecl::record(DERIVED_SAMPLE_TYPE, || Box::new(DerivedSampleData::default()))
            .base(BASE_SAMPLE_TYPE)
            .field("derived_string_element", FieldKind::String)
            .field("long_element", FieldKind::Long)
            .field("bool_element", FieldKind::Bool)
            .field("bytes_element", FieldKind::Bytes)
            .field("string_list", FieldKind::list(FieldKind::String))
            .field("double_list", FieldKind::list(FieldKind::Double))
            .field("data_element", FieldKind::Data(ELEMENT_SAMPLE_TYPE))
            .field(
                "data_element_list",
                FieldKind::list(FieldKind::Data(ELEMENT_SAMPLE_TYPE)),
            )
            .field("key_element", FieldKind::Key(BASE_SAMPLE_KEY_TYPE))
            .attr(Attr::IndexElements {
                definition: "-version".to_string(),
                name: Some("recent_versions".to_string()),
            }),
    );
    registry.register(
        TypeDecl::record(OTHER_DERIVED_SAMPLE_TYPE, || {
            Box::new(OtherDerivedSampleData::default())
        })
        .base(BASE_SAMPLE_TYPE)
        .field("other_string_element", FieldKind::String),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_method_invokes_against_a_live_record() {
        let registry = Registry::new();
        declare(&registry);

        let method = registry
            .method_of(BASE_SAMPLE_TYPE, "clear_version")
            .unwrap()
            .expect("declared method");
        let mut record = BaseSampleData::new("A", 1);
        record.version = Some(4);
        (method.invoke)(&mut record, &registry).unwrap();
        assert_eq!(record.version, None);

        // Derived records inherit the method through the base chain.
        assert!(registry
            .method_of(DERIVED_SAMPLE_TYPE, "clear_version")
            .unwrap()
            .is_some());
    }

    #[test]
    fn derived_field_access_delegates_to_the_base() {
        let mut derived = DerivedSampleData::new("A", 1);
        derived
            .set_field("version", FieldValue::from_opt(&Some(9)))
            .unwrap();
        assert_eq!(derived.base.version, Some(9));
        assert!(derived.get_field("record_id").is_some());
        assert!(derived.get_field("nope").is_none());
    }
}
