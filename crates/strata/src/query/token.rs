//! Filter tokens and their wire encoding.

use strata_core::error::SerialError;
use strata_core::key::key_string;
use strata_core::meta::{Attr, Registry};
use strata_core::record::{DataObject as _, FieldAtom, FieldValue};
use strata_core::value::{Doc, Value};

use crate::error::{Error, Result};
use crate::source::SourceError;

/// Comparison operator of one filter condition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    Nin,
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Eq => "$eq",
            Operator::Ne => "$ne",
            Operator::Lt => "$lt",
            Operator::Lte => "$lte",
            Operator::Gt => "$gt",
            Operator::Gte => "$gte",
            Operator::In => "$in",
            Operator::Nin => "$nin",
        }
    }
}

/// One node of a filter tree.
#[derive(Clone, Debug)]
pub enum FilterToken {
    Op {
        field: String,
        op: Operator,
        value: FieldValue,
    },
    And(Vec<FilterToken>),
    Or(Vec<FilterToken>),
}

impl FilterToken {
    /// Raw constructor; the typed helpers below cover the atomic cases.
    pub fn op(field: impl Into<String>, op: Operator, value: FieldValue) -> Self {
        FilterToken::Op {
            field: field.into(),
            op,
            value,
        }
    }

    pub fn eq(field: impl Into<String>, value: impl FieldAtom) -> Self {
        Self::op(field, Operator::Eq, FieldValue::Atom(value.to_atom()))
    }

    pub fn ne(field: impl Into<String>, value: impl FieldAtom) -> Self {
        Self::op(field, Operator::Ne, FieldValue::Atom(value.to_atom()))
    }

    pub fn lt(field: impl Into<String>, value: impl FieldAtom) -> Self {
        Self::op(field, Operator::Lt, FieldValue::Atom(value.to_atom()))
    }

    pub fn lte(field: impl Into<String>, value: impl FieldAtom) -> Self {
        Self::op(field, Operator::Lte, FieldValue::Atom(value.to_atom()))
    }

    pub fn gt(field: impl Into<String>, value: impl FieldAtom) -> Self {
        Self::op(field, Operator::Gt, FieldValue::Atom(value.to_atom()))
    }

    pub fn gte(field: impl Into<String>, value: impl FieldAtom) -> Self {
        Self::op(field, Operator::Gte, FieldValue::Atom(value.to_atom()))
    }

    pub fn is_in(
        field: impl Into<String>,
        values: impl IntoIterator<Item = impl FieldAtom>,
    ) -> Self {
        Self::op(
            field,
            Operator::In,
            FieldValue::List(
                values
                    .into_iter()
                    .map(|value| FieldValue::Atom(value.to_atom()))
                    .collect(),
            ),
        )
    }

    pub fn not_in(
        field: impl Into<String>,
        values: impl IntoIterator<Item = impl FieldAtom>,
    ) -> Self {
        Self::op(
            field,
            Operator::Nin,
            FieldValue::List(
                values
                    .into_iter()
                    .map(|value| FieldValue::Atom(value.to_atom()))
                    .collect(),
            ),
        )
    }

    pub fn and(tokens: impl IntoIterator<Item = FilterToken>) -> Self {
        FilterToken::And(tokens.into_iter().collect())
    }

    pub fn or(tokens: impl IntoIterator<Item = FilterToken>) -> Self {
        FilterToken::Or(tokens.into_iter().collect())
    }
}

/// Fields the store writes itself; always legal in filters and sorts.
fn is_header_field(field: &str) -> bool {
    matches!(field, "_id" | "_dataset" | "_key" | "_t")
}

/// Whether the field resolves on the queried type or any of its registered
/// descendants (records of the whole hierarchy flow through one query).
pub(crate) fn validate_field(registry: &Registry, type_name: &str, field: &str) -> Result<()> {
    if is_header_field(field) {
        return Ok(());
    }
    if registry.field_of(type_name, field)?.is_some() {
        return Ok(());
    }
    for derived in registry.derived_types(type_name) {
        if registry.field_of(derived.full_name, field)?.is_some() {
            return Ok(());
        }
    }
    Err(SourceError::UnknownFilterField {
        type_name: type_name.to_string(),
        field: field.to_string(),
    }
    .into())
}

/// Encode a filter tree to its wire document.
pub(crate) fn encode_token(
    token: &FilterToken,
    registry: &Registry,
    type_name: &str,
) -> Result<Doc> {
    match token {
        FilterToken::Op { field, op, value } => {
            validate_field(registry, type_name, field)?;
            let mut operator = Doc::new();
            operator.push(op.as_str(), encode_operand(value, registry, field)?);
            let mut doc = Doc::new();
            doc.push(field.clone(), Value::Doc(operator));
            Ok(doc)
        }
        FilterToken::And(tokens) => encode_list("$and", tokens, registry, type_name),
        FilterToken::Or(tokens) => encode_list("$or", tokens, registry, type_name),
    }
}

fn encode_list(
    node: &str,
    tokens: &[FilterToken],
    registry: &Registry,
    type_name: &str,
) -> Result<Doc> {
    let encoded: Vec<Value> = tokens
        .iter()
        .map(|token| encode_token(token, registry, type_name).map(Value::Doc))
        .collect::<Result<_>>()?;
    let mut doc = Doc::new();
    doc.push(node, Value::Array(encoded));
    Ok(doc)
}

/// Operand encoding: atoms use their wire types, enums their names, keys
/// their string projection, collections become arrays. Data objects are
/// legal only with a registered filter-token encoder.
fn encode_operand(value: &FieldValue, registry: &Registry, field: &str) -> Result<Value> {
    match value {
        FieldValue::Null => Ok(Value::Null),
        FieldValue::Atom(atom) => Ok(atom.to_wire()),
        FieldValue::Key(key) => Ok(Value::String(key_string(key.as_ref(), registry)?)),
        FieldValue::List(items) => {
            let encoded: Vec<Value> = items
                .iter()
                .map(|item| encode_operand(item, registry, field))
                .collect::<Result<_>>()?;
            Ok(Value::Array(encoded))
        }
        FieldValue::Data(object) => {
            for attr in registry.attrs_of(object.type_name(), true)? {
                if let Attr::FilterTokenAtom(encode) = attr {
                    if let Some(atom) = encode(value) {
                        return Ok(atom.to_wire());
                    }
                }
            }
            Err(Error::from(strata_core::CoreError::from(
                SerialError::ValueKind {
                    element: field.to_string(),
                    expected: "filter-encodable operand",
                    got: object.type_name().to_string(),
                },
            )))
        }
    }
}
