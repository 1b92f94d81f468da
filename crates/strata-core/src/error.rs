//! Core capability errors (identifiers, keys, metadata, serialization).
//!
//! These are bounded and stable: core errors represent domain/refusal states,
//! not library implementation details.

use thiserror::Error;

use crate::effect::{Effect, Transience};

/// Invalid temporal identifier text or bytes.
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum InvalidTid {
    #[error("temporal id `{raw}` has length {len}, expected 32 hex chars")]
    Length { raw: String, len: usize },
    #[error("temporal id `{raw}` contains non-hex characters")]
    Hex { raw: String },
    #[error("temporal id byte slice has length {len}, expected 16")]
    ByteLength { len: usize },
}

/// Key projection or parse failure.
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum KeyError {
    #[error("field `{field}` of key `{type_name}` has a kind unsupported in keys")]
    UnsupportedKind { type_name: String, field: String },
    #[error("key string for `{type_name}` ended before field `{field}`")]
    MissingToken { type_name: String, field: String },
    #[error("token `{raw}` does not parse as field `{field}` of key `{type_name}`")]
    Token {
        type_name: String,
        field: String,
        raw: String,
    },
    #[error("record of type `{type_name}` produced an empty key")]
    Empty { type_name: String },
    #[error("key string for `{type_name}` has trailing tokens `{raw}`")]
    TrailingTokens { type_name: String, raw: String },
    #[error("type `{type_name}` declares no key type")]
    NoKeyType { type_name: String },
}

/// Reflection registry failure.
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum MetaError {
    #[error("type `{name}` is not registered")]
    UnknownType { name: String },
    #[error("no registered type maps to name `{name}`")]
    UnknownMappedName { name: String },
    #[error("type `{type_name}` has no field `{field}`")]
    UnknownField { type_name: String, field: String },
    #[error("field `{field}` of `{type_name}` expects {expected}, got {got}")]
    FieldValue {
        type_name: String,
        field: String,
        expected: String,
        got: String,
    },
    #[error("index definition `{definition}` is invalid: {reason}")]
    IndexDefinition { definition: String, reason: String },
}

/// Tree writer / serializer contract violation or data mismatch.
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum SerialError {
    #[error("call `{call}` is not valid in writer state `{state}`")]
    State { call: &'static str, state: String },
    #[error("`{call}` named `{got}` but the open frame is `{expected}`")]
    NameMismatch {
        call: &'static str,
        expected: String,
        got: String,
    },
    #[error("document for `{type_name}` carries unknown element `{element}`")]
    UnknownElement { type_name: String, element: String },
    #[error("element `{element}` expects {expected}, got {got}")]
    ValueKind {
        element: String,
        expected: &'static str,
        got: String,
    },
    #[error("element `{element}` nests an array inside an array")]
    NestedList { element: String },
    #[error("projection expects {expected} fields, document supplied {got}")]
    TupleArity { expected: usize, got: usize },
    #[error("document carries no type discriminator")]
    MissingDiscriminator,
}

/// Canonical error enum for the core capability.
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum CoreError {
    #[error(transparent)]
    Tid(#[from] InvalidTid),
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error(transparent)]
    Meta(#[from] MetaError),
    #[error(transparent)]
    Serial(#[from] SerialError),
}

impl CoreError {
    pub fn transience(&self) -> Transience {
        // Core errors are pure domain/input failures.
        Transience::Permanent
    }

    pub fn effect(&self) -> Effect {
        Effect::None
    }
}
