//! Core types and traits for rowmodel.
//!
//! This crate provides the foundations the record layer is built on:
//!
//! - `Value` and `Row` for dynamically-typed column data
//! - `Error` and `Result` shared by every rowmodel crate
//! - `ColumnType`/`ColumnSchema` column metadata
//! - `Connection` trait for drivers and the `Database` handle that owns
//!   transaction state
//! - `typecast` for coercing assigned values to their column types
//! - `MockConnection`, a SQL-recording driver for tests

pub mod connection;
pub mod error;
pub mod mock;
pub mod row;
pub mod typecast;
pub mod types;
pub mod value;

pub use connection::{Connection, DEFAULT_SERVER, Database, TimestampRepr};
pub use error::{
    ConfigError, Error, FieldValidationError, HookFailed, HookKind, InvalidValue,
    MassAssignmentError, NoExistingObject, QueryError, Result, ValidationError,
};
pub use mock::MockConnection;
pub use row::{ColumnInfo, Row};
pub use typecast::{TypecastOptions, typecast};
pub use types::{ColumnSchema, ColumnType, DbSchema};
pub use value::Value;
