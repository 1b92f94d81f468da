//! Store-level errors.
//!
//! Thin wrapper over canonical capability errors, not a "god error": the
//! core capability (`strata-core`), the data source, and the storage
//! backend each keep their own bounded enums.

use thiserror::Error;

use strata_core::effect::{Effect, Transience};
use strata_core::CoreError;

use crate::config::ConfigError;
use crate::source::SourceError;
use crate::storage::StorageError;

pub type Result<T> = std::result::Result<T, Error>;

/// Crate-level convenience error.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    pub fn transience(&self) -> Transience {
        match self {
            Error::Core(e) => e.transience(),
            Error::Source(e) => e.transience(),
            Error::Storage(e) => e.transience(),
            Error::Config(e) => e.transience(),
        }
    }

    pub fn effect(&self) -> Effect {
        match self {
            Error::Core(e) => e.effect(),
            Error::Source(e) => e.effect(),
            Error::Storage(e) => e.effect(),
            Error::Config(e) => e.effect(),
        }
    }
}
