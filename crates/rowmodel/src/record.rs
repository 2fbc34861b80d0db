//! Records: one in-memory row of a model.
//!
//! A [`Record`] holds the current column values, the dirty set
//! (`changed_columns`), the new/existing state and per-record setting
//! overrides. Assignment goes through the typecasting layer; loading from
//! storage does not. Persistence lives in [`crate::persistence`].

use crate::column_policy::SetMode;
use crate::model::{Model, PrimaryKey, Setting};
use rowmodel_core::{
    Error, MassAssignmentError, Result, TypecastOptions, ValidationError, Value, typecast,
};
use rowmodel_query::{Dataset, Expr, ValueMap};
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// One row of a model, new or loaded.
#[derive(Debug, Clone)]
pub struct Record {
    pub(crate) model: Arc<Model>,
    pub(crate) values: ValueMap,
    pub(crate) changed_columns: Vec<String>,
    pub(crate) is_new: bool,
    pub(crate) modified: bool,
    pub(crate) was_new: bool,
    pub(crate) columns_updated: Option<ValueMap>,
    pub(crate) server: Option<String>,
    pub(crate) errors: ValidationError,
    overrides: [Option<bool>; Setting::COUNT],
}

impl Record {
    /// An empty new record.
    pub fn new(model: Arc<Model>) -> Self {
        Self {
            model,
            values: ValueMap::new(),
            changed_columns: Vec::new(),
            is_new: true,
            modified: false,
            was_new: false,
            columns_updated: None,
            server: None,
            errors: ValidationError::new(),
            overrides: [None; Setting::COUNT],
        }
    }

    /// An existing record holding `values` as read from storage.
    pub(crate) fn loaded(model: Arc<Model>, values: ValueMap) -> Self {
        let mut record = Self::new(model);
        record.values = values;
        record.is_new = false;
        record
    }

    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    // ==================== Attribute store ====================

    /// Stored value for `column`.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    /// Store `value` as is: no typecasting and no dirty tracking.
    pub fn set_value(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(column.into(), value.into());
    }

    /// Typecast `value` for `column` and store it, marking the column
    /// changed when the stored value differs from the typecast result.
    ///
    /// ```
    /// use rowmodel::{ColumnSchema, ColumnType, Database, MockConnection, Model, Value};
    /// use std::sync::Arc;
    ///
    /// let db = Database::new(Arc::new(MockConnection::new()));
    /// let items = Model::builder(db, "items")
    ///     .schema("x", ColumnSchema::new(ColumnType::Integer))
    ///     .build();
    /// let mut record = items.load([("id", 1), ("x", 1)]);
    /// record.assign("x", "1").unwrap();
    /// assert!(record.changed_columns().is_empty());
    /// record.assign("x", "2").unwrap();
    /// assert_eq!(record.changed_columns(), ["x"]);
    /// assert_eq!(record.get("x"), Some(&Value::Integer(2)));
    /// ```
    pub fn assign(&mut self, column: &str, value: impl Into<Value>) -> Result<()> {
        let value = typecast(
            column,
            self.model.schema_for(column),
            value.into(),
            &self.typecast_options(),
        )?;
        if self.values.get(column) == Some(&value) {
            return Ok(());
        }
        if !self.changed_columns.iter().any(|c| c == column) {
            self.changed_columns.push(column.to_string());
        }
        self.values.insert(column.to_string(), value);
        Ok(())
    }

    pub fn values(&self) -> &ValueMap {
        &self.values
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Columns changed since the last load or save, in first-change order.
    pub fn changed_columns(&self) -> &[String] {
        &self.changed_columns
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// New, explicitly marked modified, or carrying changed columns.
    pub fn modified(&self) -> bool {
        self.is_new || self.modified || !self.changed_columns.is_empty()
    }

    /// Report `modified()` as true until the next save.
    pub fn mark_modified(&mut self) -> &mut Self {
        self.modified = true;
        self
    }

    /// True while the after hooks of an insert run.
    pub fn was_new(&self) -> bool {
        self.was_new
    }

    /// The values of the UPDATE being saved, while its after hooks run.
    pub fn columns_updated(&self) -> Option<&ValueMap> {
        self.columns_updated.as_ref()
    }

    /// Validation errors from the last save or [`Record::is_valid`] call.
    pub fn errors(&self) -> &ValidationError {
        &self.errors
    }

    // ==================== Settings ====================

    /// Effective value of `setting`: the record override if set, else the
    /// model's current default.
    pub fn setting(&self, setting: Setting) -> bool {
        self.overrides[setting.index()].unwrap_or_else(|| self.model.setting(setting))
    }

    /// Override `setting` for this record only.
    pub fn set_setting(&mut self, setting: Setting, value: bool) -> &mut Self {
        self.overrides[setting.index()] = Some(value);
        self
    }

    /// Route this record's statements to `server` instead of the model's.
    pub fn set_server(&mut self, server: impl Into<String>) -> &mut Self {
        self.server = Some(server.into());
        self
    }

    fn typecast_options(&self) -> TypecastOptions {
        TypecastOptions {
            enabled: self.setting(Setting::TypecastOnAssignment),
            raise_on_failure: self.setting(Setting::RaiseOnTypecastFailure),
            empty_string_to_nil: self.setting(Setting::TypecastEmptyStringToNil),
            timestamp_repr: self.model.db().timestamp_repr(),
        }
    }

    // ==================== Primary key ====================

    fn key_columns(&self) -> Result<&[String]> {
        match self.model.primary_key() {
            PrimaryKey::None => Err(Error::config(
                "No primary key is associated with this model",
            )),
            key => Ok(key.columns()),
        }
    }

    fn value_or_null(&self, column: &str) -> Value {
        self.values.get(column).cloned().unwrap_or(Value::Null)
    }

    /// Primary key value; an array for composite keys.
    pub fn pk(&self) -> Result<Value> {
        let columns = self.key_columns()?;
        Ok(match self.model.primary_key() {
            PrimaryKey::Composite(_) => {
                Value::Array(columns.iter().map(|c| self.value_or_null(c)).collect())
            }
            _ => self.value_or_null(&columns[0]),
        })
    }

    /// Primary key columns mapped to their values, in declaration order.
    pub fn pk_hash(&self) -> Result<ValueMap> {
        Ok(self
            .key_columns()?
            .iter()
            .map(|c| (c.clone(), self.value_or_null(c)))
            .collect())
    }

    /// Primary key, if every key column holds a non-null value.
    fn present_pk(&self) -> Option<Value> {
        let pk = self.pk().ok()?;
        let present = match &pk {
            Value::Null => false,
            Value::Array(parts) => parts.iter().all(|v| !v.is_null()),
            _ => true,
        };
        present.then_some(pk)
    }

    /// Dataset selecting exactly this record's row.
    ///
    /// ```
    /// use rowmodel::{Database, MockConnection, Model};
    /// use std::sync::Arc;
    ///
    /// let db = Database::new(Arc::new(MockConnection::new()));
    /// let items = Model::builder(db, "items").composite_primary_key(&["x", "y"]).build();
    /// let record = items.load([("x", 4), ("y", 5)]);
    /// assert_eq!(
    ///     record.this().unwrap().select_sql(),
    ///     "SELECT * FROM items WHERE ((x = 4) AND (y = 5)) LIMIT 1"
    /// );
    /// ```
    pub fn this(&self) -> Result<Dataset> {
        let filter = Expr::matching(self.pk_hash()?).ok_or_else(|| {
            Error::config("No primary key is associated with this model")
        })?;
        Ok(self.dataset().filter(filter).limit(1))
    }

    /// The model dataset with this record's server routing applied.
    pub(crate) fn dataset(&self) -> Dataset {
        let ds = self.model.dataset().clone();
        match &self.server {
            Some(server) => ds.server(server.clone()),
            None => ds,
        }
    }

    // ==================== Mass assignment ====================

    /// Assign every settable key; see [`SetMode::Default`].
    pub fn set<K, V, I>(&mut self, params: I) -> Result<&mut Self>
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.set_restricted(params, SetMode::Default)
    }

    /// Assign every key that names a column or virtual setter.
    pub fn set_all<K, V, I>(&mut self, params: I) -> Result<&mut Self>
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.set_restricted(params, SetMode::All)
    }

    /// Assign only the keys listed in `columns`.
    pub fn set_only<K, V, I>(&mut self, params: I, columns: &[&str]) -> Result<&mut Self>
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.set_restricted(params, SetMode::Only(columns))
    }

    /// Assign every key except those listed in `columns`.
    pub fn set_except<K, V, I>(&mut self, params: I, columns: &[&str]) -> Result<&mut Self>
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.set_restricted(params, SetMode::Except(columns))
    }

    /// Assign exactly `fields` from `params`, skipping fields `params` lacks.
    ///
    /// The column policy is not consulted, so primary-key columns can be
    /// set this way.
    pub fn set_fields<K, V, I>(&mut self, params: I, fields: &[&str]) -> Result<&mut Self>
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut params: ValueMap = params
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        for field in fields {
            if let Some(value) = params.shift_remove(*field) {
                self.dispatch(field, value)?;
            }
        }
        Ok(self)
    }

    fn set_restricted<K, V, I>(&mut self, params: I, mode: SetMode<'_>) -> Result<&mut Self>
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let strict = self.setting(Setting::StrictParamSetting);
        for (key, value) in params {
            let key = key.into();
            let is_column = self.model.has_column(&key);
            let is_setter = is_column || self.model.virtual_setter(&key).is_some();
            let is_pk = is_column && self.model.primary_key().contains(&key);
            if !self
                .model
                .column_policy()
                .permits(&key, mode, is_setter, is_pk)
            {
                if strict {
                    return Err(MassAssignmentError { column: key }.into());
                }
                tracing::debug!(column = %key, "Ignoring non-settable mass-assignment key");
                continue;
            }
            self.dispatch(&key, value.into())?;
        }
        Ok(self)
    }

    fn dispatch(&mut self, key: &str, value: Value) -> Result<()> {
        match self.model.virtual_setter(key) {
            Some(setter) => setter(self, value),
            None => self.assign(key, value),
        }
    }

    // ==================== Identity ====================

    /// Same model and equal, non-null primary keys.
    pub fn identity_eq(&self, other: &Record) -> bool {
        if self.model.id() != other.model.id() {
            return false;
        }
        match (self.present_pk(), other.present_pk()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    // ==================== Marshalling ====================

    /// Serialize the record state to JSON.
    pub fn marshal(&self) -> Result<String> {
        let state = MarshalledRecord {
            values: self.values.clone(),
            is_new: self.is_new,
            changed_columns: self.changed_columns.clone(),
            modified: self.modified,
        };
        Ok(serde_json::to_string(&state)?)
    }
}

#[derive(Serialize, Deserialize)]
struct MarshalledRecord {
    values: ValueMap,
    is_new: bool,
    changed_columns: Vec<String>,
    modified: bool,
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.model.id() == other.model.id() && self.values == other.values
    }
}

impl Eq for Record {}

impl Hash for Record {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.model.id().hash(state);
        if let Some(pk) = self.present_pk() {
            pk.hash(state);
            return;
        }
        let mut entries: Vec<_> = self.values.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries.hash(state);
    }
}

// ==================== Constructors ====================

impl Model {
    /// A new record with `params` mass-assigned through `set`.
    ///
    /// The assignments do not count as changes.
    pub fn new_record<K, V, I>(self: &Arc<Self>, params: I) -> Result<Record>
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut record = Record::new(Arc::clone(self));
        record.set(params)?;
        record.changed_columns.clear();
        Ok(record)
    }

    /// Like [`Model::new_record`], then runs `init` on the record.
    pub fn new_record_with<K, V, I, F>(self: &Arc<Self>, params: I, init: F) -> Result<Record>
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
        F: FnOnce(&mut Record) -> Result<()>,
    {
        let mut record = self.new_record(params)?;
        init(&mut record)?;
        Ok(record)
    }

    /// An existing record with trusted values; no typecasting or filtering.
    pub fn load<K, V, I>(self: &Arc<Self>, values: I) -> Record
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Record::loaded(
            Arc::clone(self),
            values
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Build and save a new record. `None` when the save failed silently.
    pub fn create<K, V, I>(self: &Arc<Self>, params: I) -> Result<Option<Record>>
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.create_with(params, |_| Ok(()))
    }

    /// Like [`Model::create`], running `init` before the save.
    pub fn create_with<K, V, I, F>(self: &Arc<Self>, params: I, init: F) -> Result<Option<Record>>
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
        F: FnOnce(&mut Record) -> Result<()>,
    {
        let mut record = self.new_record_with(params, init)?;
        let saved = record.save()?.is_some();
        Ok(saved.then_some(record))
    }

    /// Fetch the record whose primary key is `pk`.
    ///
    /// Composite keys take a `Value::Array` in declaration order.
    pub fn find(self: &Arc<Self>, pk: impl Into<Value>) -> Result<Option<Record>> {
        let columns = self.primary_key().columns();
        if columns.is_empty() {
            return Err(Error::config(
                "No primary key is associated with this model",
            ));
        }
        let parts = match pk.into() {
            Value::Array(parts) if columns.len() > 1 => parts,
            single => vec![single],
        };
        let filter = Expr::matching(columns.iter().cloned().zip(parts))
            .ok_or_else(|| Error::config("Primary key value is empty"))?;
        let row = self.dataset().clone().filter(filter).limit(1).first()?;
        Ok(row.map(|values| Record::loaded(Arc::clone(self), values)))
    }

    /// Restore a record produced by [`Record::marshal`].
    pub fn unmarshal(self: &Arc<Self>, json: &str) -> Result<Record> {
        let state: MarshalledRecord = serde_json::from_str(json)?;
        let mut record = Record::new(Arc::clone(self));
        record.values = state.values;
        record.is_new = state.is_new;
        record.changed_columns = state.changed_columns;
        record.modified = state.modified;
        Ok(record)
    }
}
