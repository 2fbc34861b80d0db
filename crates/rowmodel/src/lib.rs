//! rowmodel - active-record style persistence of single rows.
//!
//! A [`Model`] describes a table: its primary key, recognized columns,
//! column types, mass-assignment policy, hooks and behavior settings. A
//! [`Record`] is one row of that table. Records track which columns
//! changed, typecast assigned values to their column types, and decide on
//! save whether to INSERT or UPDATE.
//!
//! - Attribute store: [`Record::get`], [`Record::assign`],
//!   [`Record::changed_columns`], [`Record::modified`]
//! - Primary key: [`Record::pk`], [`Record::pk_hash`], [`Record::this`]
//! - Mass assignment: [`Record::set`] and its `_all`/`_only`/`_except`/
//!   `_fields` variants, filtered by [`ColumnPolicy`]
//! - Persistence: [`Record::save`], [`Record::save_changes`],
//!   [`Record::update`], [`Record::destroy`], [`Record::refresh`],
//!   [`Record::lock`]
//!
//! # Quick Start
//!
//! ```
//! use rowmodel::prelude::*;
//! use std::sync::Arc;
//!
//! let mock = Arc::new(MockConnection::new());
//! mock.on_fetch("FROM items", vec![Row::from_pairs([("id", 1), ("x", 1)])]);
//!
//! let items = Model::builder(Database::new(mock.clone()), "items")
//!     .schema("id", ColumnSchema::new(ColumnType::Integer))
//!     .schema("x", ColumnSchema::new(ColumnType::Integer))
//!     .build();
//!
//! let mut item = items.new_record([("x", "1")]).unwrap();
//! item.save().unwrap();
//! assert_eq!(
//!     mock.sqls(),
//!     vec![
//!         "BEGIN",
//!         "INSERT INTO items (x) VALUES (1)",
//!         "SELECT * FROM items WHERE (id = 1) LIMIT 1",
//!         "COMMIT",
//!     ]
//! );
//! assert!(!item.is_new());
//! ```

pub mod column_policy;
pub mod hooks;
pub mod model;
pub mod persistence;
pub mod record;

pub use column_policy::{ColumnPolicy, SetMode};
pub use hooks::{HookSet, Hooks, NoHooks};
pub use model::{Model, ModelBuilder, ModelSettings, PrimaryKey, Setting, VirtualSetter};
pub use persistence::{DestroyOptions, SaveOptions};
pub use record::Record;

pub use rowmodel_core::{
    ColumnSchema, ColumnType, ConfigError, Connection, DEFAULT_SERVER, Database, DbSchema, Error,
    FieldValidationError, HookFailed, HookKind, InvalidValue, MassAssignmentError,
    MockConnection, NoExistingObject, QueryError, Result, Row, TimestampRepr, TypecastOptions,
    ValidationError, Value, typecast,
};
pub use rowmodel_query::{BinaryOp, Dataset, Expr, ValueMap};

/// Everything needed to define models and work with records.
pub mod prelude {
    pub use crate::{
        ColumnSchema, ColumnType, Database, DestroyOptions, Error, HookSet, Hooks,
        MockConnection, Model, PrimaryKey, Record, Result, Row, SaveOptions, Setting,
        TimestampRepr, Value,
    };
    pub use rowmodel_query::{Dataset, Expr};
}
