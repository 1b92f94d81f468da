//! Logical key strings.
//!
//! A record's logical key is the `;`-joined projection of its key type's
//! declared fields, in declaration order. Nested key fields embed their own
//! projection into the same stream, so the string is flat and the delimiter
//! is reserved. Null fields render as empty substrings. The projection is
//! stable across processes for the same field values.

use std::collections::VecDeque;

use crate::error::{CoreError, KeyError};
use crate::meta::{FieldKind, Registry, TypeInfo};
use crate::record::{DataObject, FieldValue, Record};
use crate::tid::TemporalId;
use crate::value::Atom;

pub const KEY_DELIMITER: char = ';';

/// Key string of a record, projected through its declared key type.
///
/// Tombstones and other records carrying an explicit key bypass projection.
pub fn record_key_string(record: &dyn Record, registry: &Registry) -> Result<String, CoreError> {
    if let Some(explicit) = record.explicit_key() {
        return Ok(explicit);
    }
    let type_name = record.type_name();
    let key_type = registry.key_type_of(type_name)?.ok_or_else(|| KeyError::NoKeyType {
        type_name: type_name.to_string(),
    })?;
    let key_info = registry.require(key_type)?;
    let mut parts = Vec::new();
    append_fields(record as &dyn DataObject, &key_info, registry, &mut parts)?;
    Ok(parts.join(";"))
}

/// Key string of a key object itself.
pub fn key_string(key: &dyn DataObject, registry: &Registry) -> Result<String, CoreError> {
    let key_info = registry.require(key.type_name())?;
    let mut parts = Vec::new();
    append_fields(key, &key_info, registry, &mut parts)?;
    Ok(parts.join(";"))
}

fn append_fields(
    source: &dyn DataObject,
    key_info: &TypeInfo,
    registry: &Registry,
    parts: &mut Vec<String>,
) -> Result<(), CoreError> {
    for field in &key_info.fields {
        match &field.kind {
            FieldKind::Key(nested) => {
                let nested_info = registry.require(nested)?;
                match source.get_field(field.name) {
                    Some(FieldValue::Key(object)) | Some(FieldValue::Data(object)) => {
                        append_fields(object.as_ref(), &nested_info, registry, parts)?;
                    }
                    // Absent or null nested key: emit the default instance's
                    // projection so the string keeps its shape.
                    None | Some(FieldValue::Null) => {
                        let placeholder = nested_info.construct();
                        append_fields(placeholder.as_ref(), &nested_info, registry, parts)?;
                    }
                    Some(other) => {
                        return Err(unsupported(key_info, field.name, Some(other)));
                    }
                }
            }
            FieldKind::String | FieldKind::Int | FieldKind::Long | FieldKind::Tid => {
                match source.get_field(field.name) {
                    None | Some(FieldValue::Null) => parts.push(String::new()),
                    Some(FieldValue::Atom(atom)) => parts.push(atom_text(key_info, field.name, atom)?),
                    Some(other) => return Err(unsupported(key_info, field.name, Some(other))),
                }
            }
            _ => return Err(unsupported(key_info, field.name, None)),
        }
    }
    Ok(())
}

fn atom_text(key_info: &TypeInfo, field: &'static str, atom: Atom) -> Result<String, CoreError> {
    match atom {
        Atom::String(s) => Ok(s),
        Atom::Int(i) => Ok(i.to_string()),
        Atom::Long(l) => Ok(l.to_string()),
        Atom::Tid(t) => Ok(t.to_string()),
        _ => Err(unsupported(key_info, field, None)),
    }
}

fn unsupported(key_info: &TypeInfo, field: &str, _value: Option<FieldValue>) -> CoreError {
    KeyError::UnsupportedKind {
        type_name: key_info.full_name.to_string(),
        field: field.to_string(),
    }
    .into()
}

/// Parse a key string into a key object, consuming tokens in declaration
/// order and recursing into nested key fields over the same stream.
pub fn parse_key_string(
    target: &mut dyn DataObject,
    text: &str,
    registry: &Registry,
) -> Result<(), CoreError> {
    let info = registry.require(target.type_name())?;
    let mut tokens: VecDeque<&str> = text.split(KEY_DELIMITER).collect();
    fill_fields(target, &info, registry, &mut tokens)?;
    if !tokens.is_empty() {
        return Err(KeyError::TrailingTokens {
            type_name: info.full_name.to_string(),
            raw: tokens.into_iter().collect::<Vec<_>>().join(";"),
        }
        .into());
    }
    Ok(())
}

fn fill_fields(
    target: &mut dyn DataObject,
    info: &TypeInfo,
    registry: &Registry,
    tokens: &mut VecDeque<&str>,
) -> Result<(), CoreError> {
    for field in &info.fields {
        match &field.kind {
            FieldKind::Key(nested) => {
                let nested_info = registry.require(nested)?;
                let mut object = nested_info.construct();
                fill_fields(object.as_mut(), &nested_info, registry, tokens)?;
                target.set_field(field.name, FieldValue::Key(object))?;
            }
            kind @ (FieldKind::String | FieldKind::Int | FieldKind::Long | FieldKind::Tid) => {
                let token = tokens.pop_front().ok_or_else(|| KeyError::MissingToken {
                    type_name: info.full_name.to_string(),
                    field: field.name.to_string(),
                })?;
                let value = parse_token(info, field.name, kind, token)?;
                target.set_field(field.name, value)?;
            }
            _ => {
                return Err(KeyError::UnsupportedKind {
                    type_name: info.full_name.to_string(),
                    field: field.name.to_string(),
                }
                .into())
            }
        }
    }
    Ok(())
}

fn parse_token(
    info: &TypeInfo,
    field: &'static str,
    kind: &FieldKind,
    token: &str,
) -> Result<FieldValue, CoreError> {
    if token.is_empty() {
        return Ok(FieldValue::Null);
    }
    let bad = || {
        CoreError::from(KeyError::Token {
            type_name: info.full_name.to_string(),
            field: field.to_string(),
            raw: token.to_string(),
        })
    };
    let atom = match kind {
        FieldKind::String => Atom::String(token.to_string()),
        FieldKind::Int => Atom::Int(token.parse::<i32>().map_err(|_| bad())?),
        FieldKind::Long => Atom::Long(token.parse::<i64>().map_err(|_| bad())?),
        FieldKind::Tid => Atom::Tid(TemporalId::parse(token).map_err(|_| bad())?),
        _ => return Err(bad()),
    };
    Ok(FieldValue::Atom(atom))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MetaError;
    use crate::meta::TypeDecl;

    const SIMPLE_KEY: &str = "strata::key::tests::SimpleKey";
    const OUTER_KEY: &str = "strata::key::tests::OuterKey";

    #[derive(Clone, Debug, Default, PartialEq)]
    struct SimpleKey {
        record_id: Option<String>,
        record_index: Option<i32>,
    }

    impl DataObject for SimpleKey {
        fn type_name(&self) -> &'static str {
            SIMPLE_KEY
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
                    self.record_id = value.into_opt(SIMPLE_KEY, name)?;
                    Ok(())
                }
                "record_index" => {
                    self.record_index = value.into_opt(SIMPLE_KEY, name)?;
                    Ok(())
                }
                _ => Err(MetaError::UnknownField {
                    type_name: SIMPLE_KEY.to_string(),
                    field: name.to_string(),
                }
                .into()),
            }
        }

        crate::data_object_body!();
    }

    #[derive(Clone, Debug, Default)]
    struct OuterKey {
        prefix: Option<String>,
        inner: Option<SimpleKey>,
        marker: Option<TemporalId>,
    }

    impl DataObject for OuterKey {
        fn type_name(&self) -> &'static str {
            OUTER_KEY
        }

        fn get_field(&self, name: &str) -> Option<FieldValue> {
            match name {
                "prefix" => Some(FieldValue::from_opt(&self.prefix)),
                "inner" => Some(FieldValue::from_opt_key(&self.inner)),
                "marker" => Some(FieldValue::from_opt(&self.marker)),
                _ => None,
            }
        }

        fn set_field(&mut self, name: &str, value: FieldValue) -> Result<(), CoreError> {
            match name {
                "prefix" => {
                    self.prefix = value.into_opt(OUTER_KEY, name)?;
                    Ok(())
                }
                "inner" => {
                    self.inner = value.into_opt_object(OUTER_KEY, name)?;
                    Ok(())
                }
                "marker" => {
                    self.marker = value.into_opt(OUTER_KEY, name)?;
                    Ok(())
                }
                _ => Err(MetaError::UnknownField {
                    type_name: OUTER_KEY.to_string(),
                    field: name.to_string(),
                }
                .into()),
            }
        }

        crate::data_object_body!();
    }

    fn registry() -> Registry {
        let registry = Registry::new();
        registry.register(
            TypeDecl::key(SIMPLE_KEY, || Box::new(SimpleKey::default()))
                .field("record_id", FieldKind::String)
                .field("record_index", FieldKind::Int),
        );
        registry.register(
            TypeDecl::key(OUTER_KEY, || Box::new(OuterKey::default()))
                .field("prefix", FieldKind::String)
                .field("inner", FieldKind::Key(SIMPLE_KEY))
                .field("marker", FieldKind::Tid),
        );
        registry
    }

    #[test]
    fn simple_key_round_trips() {
        let registry = registry();
        let key = SimpleKey {
            record_id: Some("Key1".to_string()),
            record_index: Some(42),
        };
        let text = key_string(&key, &registry).unwrap();
        assert_eq!(text, "Key1;42");

        let mut parsed = SimpleKey::default();
        parse_key_string(&mut parsed, &text, &registry).unwrap();
        assert_eq!(parsed, key);
    }

    #[test]
    fn null_fields_render_empty_and_parse_back_null() {
        let registry = registry();
        let key = SimpleKey {
            record_id: Some("A".to_string()),
            record_index: None,
        };
        let text = key_string(&key, &registry).unwrap();
        assert_eq!(text, "A;");

        let mut parsed = SimpleKey::default();
        parse_key_string(&mut parsed, &text, &registry).unwrap();
        assert_eq!(parsed.record_index, None);
    }

    #[test]
    fn nested_key_embeds_into_the_same_stream() {
        let registry = registry();
        let tid = TemporalId::from_bytes([1; 16]);
        let key = OuterKey {
            prefix: Some("p".to_string()),
            inner: Some(SimpleKey {
                record_id: Some("Key1".to_string()),
                record_index: Some(7),
            }),
            marker: Some(tid),
        };
        let text = key_string(&key, &registry).unwrap();
        assert_eq!(text, format!("p;Key1;7;{tid}"));

        let mut parsed = OuterKey::default();
        parse_key_string(&mut parsed, &text, &registry).unwrap();
        assert_eq!(parsed.prefix.as_deref(), Some("p"));
        assert_eq!(
            parsed.inner,
            Some(SimpleKey {
                record_id: Some("Key1".to_string()),
                record_index: Some(7),
            })
        );
        assert_eq!(parsed.marker, Some(tid));
    }

    #[test]
    fn absent_nested_key_keeps_the_shape() {
        let registry = registry();
        let key = OuterKey {
            prefix: Some("p".to_string()),
            inner: None,
            marker: None,
        };
        let text = key_string(&key, &registry).unwrap();
        // Placeholder projection preserves the inner key's two slots.
        assert_eq!(text, "p;;;");
    }

    #[test]
    fn parse_rejects_bad_and_trailing_tokens() {
        let registry = registry();
        let mut key = SimpleKey::default();
        assert!(parse_key_string(&mut key, "A;not_an_int", &registry).is_err());
        assert!(parse_key_string(&mut key, "A;1;extra", &registry).is_err());
        assert!(parse_key_string(&mut key, "A", &registry).is_err());
    }
}
