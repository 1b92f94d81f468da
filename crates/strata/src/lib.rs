//! strata: a temporal, hierarchical record store over an abstract document
//! collection.
//!
//! Records live in named datasets linked by an imports DAG; reads walk the
//! DAG with cutoff-time visibility and return one winning record per logical
//! key. Identifiers are time-prefixed and strictly monotonic per source.
//! Serialization is reflection-driven: the registry in `strata-core` maps
//! types to documents with inheritance-chain discriminators.
//!
//! Module hierarchy:
//! - error: crate-level error wrapper
//! - storage: collection/cursor contract and the in-memory engine
//! - serial: tree-writer backends and record (de)serialization
//! - source: data source core (saves, reads, datasets, gating)
//! - query: temporal query pipeline and cursors
//! - context: current-dataset facade
//! - config / telemetry: TOML config and tracing setup
//! - samples: sample record family for tests and the demo
//! - cli: command-line surface

#![forbid(unsafe_code)]

pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod query;
pub mod samples;
pub mod serial;
pub mod source;
pub mod storage;
pub mod telemetry;

pub use context::Context;
pub use error::{Error, Result};
pub use query::{FilterToken, Operator, Query, RecordCursor, TupleCursor, TypedCursor, TypedQuery};
pub use serial::DiscriminatorConvention;
pub use source::{DataSource, DbName, EnvKind, SourceError};
pub use storage::{Collection, DataStore, MemoryStore, Stage, StorageError};

pub use strata_core as core;
