use std::{path::PathBuf, str::Utf8Error, string::FromUtf8Error};
use thiserror::Error;
use tuple_spill_sort::SpillSortError;

pub type TupleResult<T> = std::result::Result<T, TupleError>;

#[derive(Debug, Error)]
pub enum TupleError {
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Utf8(#[from] Utf8Error),
    #[error(transparent)]
    FromUtf8(#[from] FromUtf8Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    SpillSort(#[from] SpillSortError),

    // Configuration-time errors
    #[error("Invalid configuration: {message}")]
    Config { message: String },
    #[error("Invalid schema text '{text}': {reason}")]
    SchemaSyntax { text: String, reason: String },
    #[error("Invalid sort criteria '{text}': {reason}")]
    CriteriaSyntax { text: String, reason: String },
    #[error("No source schemas configured")]
    NoSources,
    #[error("Schema '{schema}' is declared more than once")]
    DuplicateSchema { schema: String },
    #[error("Field '{field}' is declared more than once in schema '{schema}'")]
    DuplicateField { schema: String, field: String },
    #[error("Field name '{field}' in schema '{schema}' is reserved")]
    ReservedField { schema: String, field: String },
    #[error("Unknown schema '{schema}'")]
    UnknownSchema { schema: String },
    #[error("Field '{field}' is missing from schema '{schema}'")]
    MissingField { schema: String, field: String },
    #[error("Field '{field}' has inconsistent type across schemas: '{left}' vs '{right}'")]
    InconsistentFieldType {
        field: String,
        left: String,
        right: String,
    },
    #[error("Field '{field}' is repeated in sort criteria")]
    RepeatedCriteriaField { field: String },
    #[error("Group-by fields [{group_by}] are not a prefix of the common sort order [{order}]")]
    GroupByNotPrefix { group_by: String, order: String },
    #[error("Specific order of schema '{schema}' references common field '{field}'")]
    SpecificOrderOnCommonField { schema: String, field: String },
    #[error("Rollup requires an explicit common sort order")]
    RollupWithoutOrder,
    #[error("Rollup field '{field}' is not a group-by field")]
    RollupFieldNotGrouped { field: String },
    #[error("Custom partition fields cannot be combined with rollup")]
    PartitionWithRollup,
    #[error("Alias '{alias}' in schema '{schema}' is invalid: {reason}")]
    InvalidAlias {
        schema: String,
        alias: String,
        reason: String,
    },
    #[error("No {kind} registered under '{name}'")]
    UnregisteredName { kind: &'static str, name: String },
    #[error("Default value of field '{field}' does not match type '{field_type}'")]
    InvalidDefault { field: String, field_type: String },

    // Record-time errors
    #[error("Field '{field}' expects type '{expected}', got '{actual}'")]
    TypeMismatch {
        field: String,
        expected: String,
        actual: String,
    },
    #[error("Field '{field}' is not nullable but has no value")]
    NullNotAllowed { field: String },
    #[error("Ordinal {ordinal} out of range for enum '{name}' ({size} symbols)")]
    EnumOrdinalOutOfRange {
        name: String,
        ordinal: i64,
        size: usize,
    },
    #[error("Unknown symbol '{symbol}' for enum '{name}'")]
    UnknownEnumSymbol { name: String, symbol: String },
    #[error("Truncated record: needed {needed} bytes at offset {offset}, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },
    #[error("Malformed variable-length integer at offset {offset}")]
    MalformedVarint { offset: usize },
    #[error("Object payload for class '{class}' could not be handled: {reason}")]
    ObjectSerialization { class: String, reason: String },
    #[error("Unknown source id {id} ({sources} sources configured)")]
    UnknownSourceId { id: i64, sources: usize },

    // Input files
    #[error("Invalid gzip header: {}", path.display())]
    InvalidGzipHeader { path: PathBuf },
    #[error("{}:{line}: {reason}", path.display())]
    InvalidTsvLine {
        path: PathBuf,
        line: usize,
        reason: String,
    },
}

impl TupleError {
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn missing_field(schema: impl Into<String>, field: impl Into<String>) -> Self {
        Self::MissingField {
            schema: schema.into(),
            field: field.into(),
        }
    }

    pub fn object(class: impl Into<String>, reason: impl ToString) -> Self {
        Self::ObjectSerialization {
            class: class.into(),
            reason: reason.to_string(),
        }
    }

    /// True for errors raised while building a job, before any record is read.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Config { .. }
                | Self::SchemaSyntax { .. }
                | Self::CriteriaSyntax { .. }
                | Self::NoSources
                | Self::DuplicateSchema { .. }
                | Self::DuplicateField { .. }
                | Self::ReservedField { .. }
                | Self::UnknownSchema { .. }
                | Self::MissingField { .. }
                | Self::InconsistentFieldType { .. }
                | Self::RepeatedCriteriaField { .. }
                | Self::GroupByNotPrefix { .. }
                | Self::SpecificOrderOnCommonField { .. }
                | Self::RollupWithoutOrder
                | Self::RollupFieldNotGrouped { .. }
                | Self::PartitionWithRollup
                | Self::InvalidAlias { .. }
                | Self::UnregisteredName { .. }
                | Self::InvalidDefault { .. }
        )
    }
}

#[macro_export]
macro_rules! tuple_error {
    ($($arg:tt)*) => {
        $crate::error::TupleError::message(format!($($arg)*))
    };
}
