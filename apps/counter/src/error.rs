use std::fmt::{Display, Formatter, Result as FmtResult};

use db_infra::DbInfraError;
use thiserror::Error;

/// Classification of the storage fault behind a failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageFault {
    /// Connection could not be established or acquired from the pool
    Unavailable,
    Timeout,
    /// Locked by a competing writer past the busy timeout
    Busy,
    /// Serialisation failure or deadlock
    Conflict,
    Constraint,
    Other,
}

impl Display for StorageFault {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let s = match self {
            StorageFault::Unavailable => "unavailable",
            StorageFault::Timeout => "timeout",
            StorageFault::Busy => "busy",
            StorageFault::Conflict => "conflict",
            StorageFault::Constraint => "constraint",
            StorageFault::Other => "other",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug)]
pub enum CounterError {
    /// The counter table could not be created or has an incompatible shape.
    #[error("Schema error ({fault}): {detail}")]
    Schema { fault: StorageFault, detail: String },
    /// Appending the next value failed; nothing was persisted.
    #[error("Write error ({fault}): {detail}")]
    Write { fault: StorageFault, detail: String },
    #[error("Read error ({fault}): {detail}")]
    Read { fault: StorageFault, detail: String },
    #[error("Configuration error: {detail}")]
    Config { detail: String },
}

impl CounterError {
    pub fn schema(fault: StorageFault, detail: impl Into<String>) -> Self {
        Self::Schema {
            fault,
            detail: detail.into(),
        }
    }

    pub fn write(fault: StorageFault, detail: impl Into<String>) -> Self {
        Self::Write {
            fault,
            detail: detail.into(),
        }
    }

    pub fn read(fault: StorageFault, detail: impl Into<String>) -> Self {
        Self::Read {
            fault,
            detail: detail.into(),
        }
    }

    pub fn config(detail: impl Into<String>) -> Self {
        Self::Config {
            detail: detail.into(),
        }
    }

    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            CounterError::Schema { .. } => "SCHEMA_ERROR",
            CounterError::Write { .. } => "WRITE_ERROR",
            CounterError::Read { .. } => "READ_ERROR",
            CounterError::Config { .. } => "CONFIG_ERROR",
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            CounterError::Schema { detail, .. }
            | CounterError::Write { detail, .. }
            | CounterError::Read { detail, .. }
            | CounterError::Config { detail } => detail,
        }
    }

    /// Storage fault classification; `None` for configuration errors.
    pub fn fault(&self) -> Option<StorageFault> {
        match self {
            CounterError::Schema { fault, .. }
            | CounterError::Write { fault, .. }
            | CounterError::Read { fault, .. } => Some(*fault),
            CounterError::Config { .. } => None,
        }
    }
}

impl From<DbInfraError> for CounterError {
    fn from(e: DbInfraError) -> Self {
        CounterError::config(e.message())
    }
}
