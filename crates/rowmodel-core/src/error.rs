//! Error types for rowmodel operations.

use crate::value::Value;
use std::fmt;

/// The primary error type for all rowmodel operations.
#[derive(Debug)]
pub enum Error {
    /// Model configuration errors (e.g. no primary key where one is required)
    Config(ConfigError),
    /// A before hook rejected the operation
    HookFailed(HookFailed),
    /// UPDATE/DELETE did not affect exactly one row
    NoExistingObject(NoExistingObject),
    /// A value could not be typecast to its column type
    InvalidValue(InvalidValue),
    /// Explicit rollback signal raised inside a transaction block
    Rollback,
    /// Validation errors
    Validation(ValidationError),
    /// Mass assignment touched a column that is not settable
    MassAssignment(MassAssignmentError),
    /// Refresh found no row for the record
    NotFound(String),
    /// Query execution errors reported by the connection
    Query(QueryError),
    /// Serialization/deserialization errors
    Serde(String),
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
}

/// Which lifecycle hook rejected an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    Validation,
    Save,
    Insert,
    Update,
    Destroy,
}

impl HookKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            HookKind::Validation => "before_validation",
            HookKind::Save => "before_save",
            HookKind::Insert => "before_insert",
            HookKind::Update => "before_update",
            HookKind::Destroy => "before_destroy",
        }
    }
}

#[derive(Debug)]
pub struct HookFailed {
    pub hook: HookKind,
}

#[derive(Debug)]
pub struct NoExistingObject {
    /// The statement that was expected to affect one row
    pub sql: String,
    /// Rows actually affected
    pub affected: u64,
}

#[derive(Debug)]
pub struct InvalidValue {
    pub column: Option<String>,
    /// Target column type name
    pub expected: &'static str,
    /// The value that failed to typecast
    pub value: Value,
    pub message: String,
}

#[derive(Debug)]
pub struct MassAssignmentError {
    pub column: String,
}

#[derive(Debug)]
pub struct QueryError {
    pub sql: Option<String>,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

/// Validation error for field-level and model-level validation.
#[derive(Debug, Clone, Default)]
pub struct ValidationError {
    /// The errors grouped by field name (or "__model__" for model-level)
    pub errors: Vec<FieldValidationError>,
}

/// A single validation error for a field.
#[derive(Debug, Clone)]
pub struct FieldValidationError {
    /// The field name that failed validation
    pub field: String,
    /// Human-readable error message
    pub message: String,
}

impl ValidationError {
    /// Create a new empty validation error container.
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    /// Check if there are any validation errors.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Add a field validation error.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Add a model-level validation error.
    pub fn add_model_error(&mut self, message: impl Into<String>) {
        self.add("__model__", message);
    }

    /// Messages recorded for one field.
    pub fn on(&self, field: &str) -> Vec<&str> {
        self.errors
            .iter()
            .filter(|e| e.field == field)
            .map(|e| e.message.as_str())
            .collect()
    }

    /// Convert to Result, returning Ok(()) if no errors, Err(self) otherwise.
    pub fn into_result(self) -> std::result::Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl Error {
    /// Shorthand for a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(ConfigError {
            message: message.into(),
        })
    }

    /// Shorthand for a driver-level query error.
    pub fn query(sql: Option<&str>, message: impl Into<String>) -> Self {
        Error::Query(QueryError {
            sql: sql.map(str::to_string),
            message: message.into(),
            source: None,
        })
    }

    /// Is this the explicit rollback signal?
    pub fn is_rollback(&self) -> bool {
        matches!(self, Error::Rollback)
    }

    /// Is this a before-hook rejection?
    pub fn is_hook_failure(&self) -> bool {
        matches!(self, Error::HookFailed(_))
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            Error::NoExistingObject(e) => Some(&e.sql),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::HookFailed(e) => write!(f, "{}", e),
            Error::NoExistingObject(e) => write!(f, "{}", e),
            Error::InvalidValue(e) => write!(f, "Invalid value: {}", e),
            Error::Rollback => write!(f, "Transaction rolled back"),
            Error::Validation(e) => write!(f, "Validation error: {}", e),
            Error::MassAssignment(e) => write!(f, "{}", e),
            Error::NotFound(msg) => write!(f, "{}", msg),
            Error::Query(e) => write!(f, "Query error: {}", e),
            Error::Serde(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Query(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Validation(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for HookFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "the {} hook failed", self.hook.as_str())
    }
}

impl fmt::Display for NoExistingObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Attempt to modify a record that doesn't exist: {} affected {} rows",
            self.sql, self.affected
        )
    }
}

impl fmt::Display for InvalidValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(f, "column '{}' expected {}: {}", col, self.expected, self.message)
        } else {
            write!(f, "expected {}: {}", self.expected, self.message)
        }
    }
}

impl fmt::Display for MassAssignmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "method {}= doesn't exist or access is restricted to it",
            self.column
        )
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sql) = &self.sql {
            write!(f, "{} ({})", self.message, sql)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.errors.is_empty() {
            write!(f, "validation passed")
        } else if self.errors.len() == 1 {
            let err = &self.errors[0];
            write!(f, "validation error on '{}': {}", err.field, err.message)
        } else {
            writeln!(f, "validation errors:")?;
            for err in &self.errors {
                writeln!(f, "  - {}: {}", err.field, err.message)?;
            }
            Ok(())
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<HookFailed> for Error {
    fn from(err: HookFailed) -> Self {
        Error::HookFailed(err)
    }
}

impl From<NoExistingObject> for Error {
    fn from(err: NoExistingObject) -> Self {
        Error::NoExistingObject(err)
    }
}

impl From<InvalidValue> for Error {
    fn from(err: InvalidValue) -> Self {
        Error::InvalidValue(err)
    }
}

impl From<MassAssignmentError> for Error {
    fn from(err: MassAssignmentError) -> Self {
        Error::MassAssignment(err)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<ValidationError> for Error {
    fn from(err: ValidationError) -> Self {
        Error::Validation(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serde(err.to_string())
    }
}

/// Result type alias for rowmodel operations.
pub type Result<T> = std::result::Result<T, Error>;
