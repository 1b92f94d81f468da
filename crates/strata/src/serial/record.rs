//! Record (de)serialization driven by registry metadata.

use std::sync::Arc;

use strata_core::error::{CoreError, SerialError};
use strata_core::key::{key_string, record_key_string};
use strata_core::meta::{Attr, FieldInfo, Registry, TypeInfo};
use strata_core::record::{DataObject, FieldValue, Record};
use strata_core::value::{Atom, Doc, Value};
use strata_core::writer::TreeWriter;

use super::{wire_atom, DataWriter, DiscriminatorConvention, DocWriter, JsonWriter};

/// Serialize a record into any tree writer: document, `_key`, fields.
pub fn serialize_record(
    record: &dyn Record,
    registry: &Registry,
    writer: &mut dyn TreeWriter,
) -> Result<(), CoreError> {
    let info = registry.require(record.type_name())?;
    writer.start_document(info.full_name)?;
    if let Some(custom) = find_class_serializer(registry, &info)? {
        custom(record as &dyn DataObject, registry, writer)?;
    } else {
        writer.start_dict(info.full_name)?;
        let key = record_key_string(record, registry)?;
        writer.write_value_element("_key", Atom::String(key))?;
        write_fields(record as &dyn DataObject, &info, registry, writer)?;
        writer.end_dict(info.full_name)?;
    }
    writer.end_document(info.full_name)?;
    Ok(())
}

/// Serialize a record to its storage document (no `_id`/`_dataset` header;
/// the data source stamps those on save).
pub fn record_to_doc(
    record: &dyn Record,
    registry: &Arc<Registry>,
    convention: DiscriminatorConvention,
) -> Result<Doc, CoreError> {
    let mut writer = DocWriter::new(registry.clone(), convention);
    serialize_record(record, registry, &mut writer)?;
    writer.into_doc()
}

/// Serialize a record to JSON with the full type name as root key.
pub fn record_to_json(
    record: &dyn Record,
    registry: &Arc<Registry>,
    convention: DiscriminatorConvention,
) -> Result<serde_json::Value, CoreError> {
    let mut writer = JsonWriter::new(registry.clone(), convention);
    serialize_record(record, registry, &mut writer)?;
    writer.into_json()
}

fn find_class_serializer(
    registry: &Registry,
    info: &TypeInfo,
) -> Result<Option<strata_core::meta::SerializeClassFn>, CoreError> {
    for attr in registry.attrs_of(info.full_name, true)? {
        if let Attr::SerializeClass(f) = attr {
            return Ok(Some(f));
        }
    }
    Ok(None)
}

fn find_field_serializer(
    registry: &Registry,
    info: &TypeInfo,
    field: &str,
) -> Result<Option<strata_core::meta::SerializeFieldFn>, CoreError> {
    for attr in registry.attrs_of(info.full_name, true)? {
        if let Attr::SerializeField { field: name, encode } = attr {
            if name == field {
                return Ok(Some(encode));
            }
        }
    }
    Ok(None)
}

/// Write a nested data object: its own dict with discriminator, no `_key`.
fn write_object(
    object: &dyn DataObject,
    registry: &Registry,
    writer: &mut dyn TreeWriter,
) -> Result<(), CoreError> {
    let info = registry.require(object.type_name())?;
    if let Some(custom) = find_class_serializer(registry, &info)? {
        return custom(object, registry, writer);
    }
    writer.start_dict(info.full_name)?;
    write_fields(object, &info, registry, writer)?;
    writer.end_dict(info.full_name)?;
    Ok(())
}

/// Declared fields in declaration order, root type first.
fn write_fields(
    object: &dyn DataObject,
    info: &TypeInfo,
    registry: &Registry,
    writer: &mut dyn TreeWriter,
) -> Result<(), CoreError> {
    let mut chain = registry.base_chain(info.full_name)?;
    chain.reverse();
    for declaring in chain {
        for field in &declaring.fields {
            if field.name == "_t" || field.name == "_key" {
                continue;
            }
            if let Some(custom) = find_field_serializer(registry, info, field.name)? {
                custom(object, field, registry, writer)?;
                continue;
            }
            let value = object.get_field(field.name).unwrap_or(FieldValue::Null);
            write_field(field, value, registry, writer)?;
        }
    }
    Ok(())
}

fn write_field(
    field: &FieldInfo,
    value: FieldValue,
    registry: &Registry,
    writer: &mut dyn TreeWriter,
) -> Result<(), CoreError> {
    match value {
        // Null fields are omitted entirely.
        FieldValue::Null => Ok(()),
        FieldValue::Atom(atom) => writer.write_value_element(field.name, atom),
        FieldValue::Key(key) => {
            let text = key_string(key.as_ref(), registry)?;
            writer.write_value_element(field.name, Atom::String(text))
        }
        FieldValue::Data(object) => {
            writer.start_element(field.name)?;
            write_object(object.as_ref(), registry, writer)?;
            writer.end_element(field.name)
        }
        FieldValue::List(items) => {
            writer.start_element(field.name)?;
            writer.start_array()?;
            for item in items {
                writer.start_array_item()?;
                match item {
                    FieldValue::Null => writer.write_null()?,
                    FieldValue::Atom(atom) => writer.write_value(atom)?,
                    FieldValue::Key(key) => {
                        let text = key_string(key.as_ref(), registry)?;
                        writer.write_value(Atom::String(text))?;
                    }
                    FieldValue::Data(object) => {
                        write_object(object.as_ref(), registry, writer)?;
                    }
                    FieldValue::List(_) => {
                        return Err(SerialError::NestedList {
                            element: field.name.to_string(),
                        }
                        .into())
                    }
                }
                writer.end_array_item()?;
            }
            writer.end_array()?;
            writer.end_element(field.name)
        }
    }
}

/// Replay a stored document as writer events into any tree writer. The root
/// type and every nested dict type resolve through the `_t` discriminator.
pub fn replay_doc(
    doc: &Doc,
    registry: &Registry,
    writer: &mut dyn TreeWriter,
) -> Result<(), CoreError> {
    let mapped = doc.discriminator()?;
    let full_name = registry.require_mapped(mapped)?.full_name;
    writer.start_document(full_name)?;
    replay_dict(doc, registry, writer)?;
    writer.end_document(full_name)?;
    Ok(())
}

fn replay_dict(
    doc: &Doc,
    registry: &Registry,
    writer: &mut dyn TreeWriter,
) -> Result<(), CoreError> {
    let mapped = doc.discriminator()?;
    let full_name = registry.require_mapped(mapped)?.full_name;
    writer.start_dict(full_name)?;
    for (name, value) in doc.iter() {
        if name == "_t" {
            continue;
        }
        writer.start_element(name)?;
        replay_value(name, value, registry, writer)?;
        writer.end_element(name)?;
    }
    writer.end_dict(full_name)?;
    Ok(())
}

fn replay_value(
    element: &str,
    value: &Value,
    registry: &Registry,
    writer: &mut dyn TreeWriter,
) -> Result<(), CoreError> {
    match value {
        // Stored documents omit nulls; tolerate one by writing nothing.
        Value::Null => Ok(()),
        Value::Doc(doc) => replay_dict(doc, registry, writer),
        Value::Array(items) => {
            writer.start_array()?;
            for item in items {
                writer.start_array_item()?;
                match item {
                    Value::Null => writer.write_null()?,
                    Value::Doc(doc) => replay_dict(doc, registry, writer)?,
                    atom => writer.write_value(wire_atom(element, atom)?)?,
                }
                writer.end_array_item()?;
            }
            writer.end_array()
        }
        atom => writer.write_value(wire_atom(element, atom)?),
    }
}

/// Deserialize a stored document into the type named by its discriminator.
/// The storage header (`_id`, `_dataset`) lands on the record view.
pub fn deserialize_record(
    doc: &Doc,
    registry: &Arc<Registry>,
) -> Result<Box<dyn DataObject>, CoreError> {
    let mapped = doc.discriminator()?;
    let info = registry.require_mapped(mapped)?;

    let mut object = if let Some(custom) = find_class_deserializer(registry, &info)? {
        let mut object = info.construct();
        custom(object.as_mut(), doc, registry)?;
        object
    } else {
        let mut writer = DataWriter::new(registry.clone());
        replay_doc(doc, registry, &mut writer)?;
        writer.into_result()?
    };

    for attr in registry.attrs_of(info.full_name, true)? {
        if let Attr::DeserializeField { field, decode } = attr {
            if let Some((_, field_info)) = registry.field_of(info.full_name, field)? {
                decode(object.as_mut(), &field_info, doc.get_or_null(field), registry)?;
            }
        }
    }

    if let Some(record) = object.as_record_mut() {
        if let Some(id) = doc.get("_id").and_then(Value::as_tid) {
            record.set_id(id);
        }
        if let Some(data_set) = doc.get("_dataset").and_then(Value::as_tid) {
            record.set_data_set(data_set);
        }
    }
    Ok(object)
}

fn find_class_deserializer(
    registry: &Registry,
    info: &TypeInfo,
) -> Result<Option<strata_core::meta::DeserializeClassFn>, CoreError> {
    for attr in registry.attrs_of(info.full_name, true)? {
        if let Attr::DeserializeClass(f) = attr {
            return Ok(Some(f));
        }
    }
    Ok(None)
}
