//! Saving, destroying and re-reading records.
//!
//! `save` runs validation, then (optionally inside a transaction) the
//! before hooks, the INSERT or UPDATE and the after hooks. A rejected
//! before hook aborts before any SQL runs and surfaces as
//! [`Error::HookFailed`] or as `Ok(None)`, depending on the failure policy.
//! A rejection still rolls back the transaction the save opened, but never
//! one the caller opened.

use crate::model::Setting;
use crate::record::Record;
use rowmodel_core::{
    Error, HookFailed, HookKind, NoExistingObject, Result, ValidationError, Value,
};
use rowmodel_query::{Dataset, ValueMap};
use std::sync::Arc;

/// Per-call options for [`Record::save_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveOptions {
    /// Run the validation hooks first.
    pub validate: bool,
    /// Overrides [`Setting::UseTransactions`].
    pub transaction: Option<bool>,
    /// Overrides [`Setting::RaiseOnSaveFailure`].
    pub raise_on_failure: Option<bool>,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            validate: true,
            transaction: None,
            raise_on_failure: None,
        }
    }
}

impl SaveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    pub fn transaction(mut self, transaction: bool) -> Self {
        self.transaction = Some(transaction);
        self
    }

    pub fn raise_on_failure(mut self, raise: bool) -> Self {
        self.raise_on_failure = Some(raise);
        self
    }
}

/// Per-call options for [`Record::destroy_with`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DestroyOptions {
    pub transaction: Option<bool>,
    pub raise_on_failure: Option<bool>,
}

impl DestroyOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transaction(mut self, transaction: bool) -> Self {
        self.transaction = Some(transaction);
        self
    }

    pub fn raise_on_failure(mut self, raise: bool) -> Self {
        self.raise_on_failure = Some(raise);
        self
    }
}

/// Which values an UPDATE writes.
#[derive(Debug, Clone)]
enum UpdateColumns {
    /// Every value except unchanged primary-key columns.
    All,
    /// Changed columns, as of after the `before_update` hook.
    Changed,
    /// Exactly these columns.
    Only(Vec<String>),
}

fn hook_failed(hook: HookKind) -> Error {
    tracing::debug!(hook = hook.as_str(), "Hook rejected the operation");
    HookFailed { hook }.into()
}

/// Turn a hook rejection into a silent failure when not raising.
fn checked_save_failure(raise: bool, result: Result<bool>) -> Result<bool> {
    match result {
        Err(err) if !raise && err.is_hook_failure() => {
            tracing::info!(error = %err, "Save failed silently");
            Ok(false)
        }
        other => other,
    }
}

impl Record {
    // ==================== Save ====================

    /// Save every column. Returns `None` when the save failed silently.
    ///
    /// ```
    /// use rowmodel::{Database, MockConnection, Model};
    /// use std::sync::Arc;
    ///
    /// let mock = Arc::new(MockConnection::new());
    /// let items = Model::builder(Database::new(mock.clone()), "items")
    ///     .columns(&["id", "x"])
    ///     .build();
    /// let mut record = items.load([("id", 3), ("x", 1)]);
    /// record.save().unwrap();
    /// assert_eq!(
    ///     mock.sqls(),
    ///     vec!["BEGIN", "UPDATE items SET x = 1 WHERE (id = 3)", "COMMIT"]
    /// );
    /// ```
    pub fn save(&mut self) -> Result<Option<&mut Self>> {
        self.save_with(None, SaveOptions::default())
    }

    /// Save, updating only `columns` for an existing record.
    pub fn save_columns(&mut self, columns: &[&str]) -> Result<Option<&mut Self>> {
        self.save_with(Some(columns), SaveOptions::default())
    }

    /// Save with explicit columns and options.
    pub fn save_with(
        &mut self,
        columns: Option<&[&str]>,
        opts: SaveOptions,
    ) -> Result<Option<&mut Self>> {
        let columns = columns.map_or(UpdateColumns::All, |cols| {
            UpdateColumns::Only(cols.iter().map(|c| (*c).to_string()).collect())
        });
        Ok(self.checked_save(&columns, opts)?.then_some(self))
    }

    /// Save only changed columns; `None` without touching storage when the
    /// record is not modified.
    pub fn save_changes(&mut self) -> Result<Option<&mut Self>> {
        self.save_changes_with(SaveOptions::default())
    }

    pub fn save_changes_with(&mut self, opts: SaveOptions) -> Result<Option<&mut Self>> {
        if !self.modified() {
            return Ok(None);
        }
        Ok(self.checked_save(&UpdateColumns::Changed, opts)?.then_some(self))
    }

    fn raise_on_failure(&self, opt: Option<bool>) -> bool {
        opt.unwrap_or_else(|| self.setting(Setting::RaiseOnSaveFailure))
    }

    #[tracing::instrument(
        level = "debug",
        skip(self, columns, opts),
        fields(table = %self.model.table(), new = self.is_new)
    )]
    fn checked_save(&mut self, columns: &UpdateColumns, opts: SaveOptions) -> Result<bool> {
        let raise = self.raise_on_failure(opts.raise_on_failure);
        if opts.validate && !self.run_validation(raise)? {
            return Ok(false);
        }
        let saved = self
            .checked_transaction(opts.transaction, |record| record.save_core(columns))
            .map(|outcome| outcome.is_some());
        checked_save_failure(raise, saved)
    }

    /// Run `f`, inside a transaction on the record's server when `opt` (or
    /// the record setting) asks for one. `Ok(None)` means the rollback
    /// signal was swallowed.
    fn checked_transaction<T>(
        &mut self,
        opt: Option<bool>,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<Option<T>> {
        if opt.unwrap_or_else(|| self.setting(Setting::UseTransactions)) {
            let db = Arc::clone(self.model.db());
            let ds = self.dataset();
            db.transaction(ds.server_name(), || f(self))
        } else {
            f(self).map(Some)
        }
    }

    fn save_core(&mut self, columns: &UpdateColumns) -> Result<()> {
        let result = self.save_steps(columns);
        self.was_new = false;
        self.columns_updated = None;
        result
    }

    fn save_steps(&mut self, columns: &UpdateColumns) -> Result<()> {
        let hooks = Arc::clone(self.model.hooks());
        if !hooks.before_save(self)? {
            return Err(hook_failed(HookKind::Save));
        }

        if self.is_new {
            if !hooks.before_insert(self)? {
                return Err(hook_failed(HookKind::Insert));
            }
            self.was_new = true;
            self.insert_row()?;
            self.modified = false;
            hooks.after_insert(self)?;
        } else {
            if !hooks.before_update(self)? {
                return Err(hook_failed(HookKind::Update));
            }
            let values = self.update_values(columns);
            self.update_row(&values)?;
            match columns {
                UpdateColumns::Only(saved) => self.changed_columns.retain(|c| !saved.contains(c)),
                UpdateColumns::All | UpdateColumns::Changed => self.changed_columns.clear(),
            }
            self.columns_updated = Some(values);
            self.modified = false;
            hooks.after_update(self)?;
        }

        hooks.after_save(self)
    }

    fn update_values(&self, columns: &UpdateColumns) -> ValueMap {
        let pk = self.model.primary_key();
        let keep = |column: &String| match columns {
            UpdateColumns::All => !pk.contains(column) || self.changed_columns.contains(column),
            UpdateColumns::Changed => self.changed_columns.contains(column),
            UpdateColumns::Only(saved) => saved.contains(column),
        };
        self.values
            .iter()
            .filter(|(column, _)| keep(*column))
            .map(|(column, value)| (column.clone(), value.clone()))
            .collect()
    }

    fn insert_values(&self) -> ValueMap {
        let pk = self.model.primary_key();
        let unrestricted = self.model.column_policy().primary_key_unrestricted();
        self.values
            .iter()
            .filter(|(column, value)| !pk.contains(column) || (unrestricted && !value.is_null()))
            .map(|(column, value)| (column.clone(), value.clone()))
            .collect()
    }

    fn insert_row(&mut self) -> Result<()> {
        let ds = self.dataset();
        let values = self.insert_values();

        if ds.supports_insert_select() {
            let row = ds.insert_select(&values)?.ok_or_else(|| {
                Error::NotFound(format!("INSERT into {} returned no row", ds.table()))
            })?;
            self.values = row;
            self.is_new = false;
            self.changed_columns.clear();
            return Ok(());
        }

        let id = ds.insert(&values)?;
        if let Some(column) = self.model.autoincrementing_primary_key() {
            if !id.is_null() && self.values.get(column).is_none_or(Value::is_null) {
                tracing::debug!(column, id = %id, "Assigned generated primary key");
                self.values.insert(column.to_string(), id);
            }
        }
        self.is_new = false;

        if !self.model.primary_key().is_none() && self.model.refresh_after_insert() {
            let this = self.this()?;
            self.refresh_from(&this)
        } else {
            self.changed_columns.clear();
            Ok(())
        }
    }

    fn update_row(&self, values: &ValueMap) -> Result<()> {
        let ds = self.this()?;
        let affected = ds.update(values)?;
        self.check_modification(affected, || ds.update_sql(values))
    }

    fn check_modification(&self, affected: u64, sql: impl FnOnce() -> String) -> Result<()> {
        if affected == 1 {
            return Ok(());
        }
        let sql = sql();
        if self.setting(Setting::RequireModification) {
            return Err(NoExistingObject { sql, affected }.into());
        }
        tracing::warn!(sql = %sql, affected, "Statement did not modify exactly one row");
        Ok(())
    }

    // ==================== Validation ====================

    /// Run the validation hooks, storing any errors on the record.
    pub fn is_valid(&mut self) -> Result<bool> {
        self.run_validation(false)
    }

    fn run_validation(&mut self, raise: bool) -> Result<bool> {
        let hooks = Arc::clone(self.model.hooks());
        self.errors = ValidationError::new();
        if !hooks.before_validation(self)? {
            return checked_save_failure(raise, Err(hook_failed(HookKind::Validation)));
        }
        let mut errors = ValidationError::new();
        hooks.validate(self, &mut errors);
        hooks.after_validation(self)?;
        if errors.is_empty() {
            return Ok(true);
        }
        self.errors = errors.clone();
        if raise {
            Err(Error::Validation(errors))
        } else {
            tracing::debug!(errors = %errors, "Validation failed");
            Ok(false)
        }
    }

    // ==================== Mass update ====================

    /// `set` followed by `save_changes`.
    pub fn update<K, V, I>(&mut self, params: I) -> Result<Option<&mut Self>>
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.set(params)?;
        self.save_changes()
    }

    /// `set_all` followed by `save_changes`.
    pub fn update_all<K, V, I>(&mut self, params: I) -> Result<Option<&mut Self>>
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.set_all(params)?;
        self.save_changes()
    }

    /// `set_only` followed by `save_changes`.
    pub fn update_only<K, V, I>(&mut self, params: I, columns: &[&str]) -> Result<Option<&mut Self>>
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.set_only(params, columns)?;
        self.save_changes()
    }

    /// `set_except` followed by `save_changes`.
    pub fn update_except<K, V, I>(
        &mut self,
        params: I,
        columns: &[&str],
    ) -> Result<Option<&mut Self>>
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.set_except(params, columns)?;
        self.save_changes()
    }

    /// `set_fields` followed by `save_changes`.
    pub fn update_fields<K, V, I>(
        &mut self,
        params: I,
        fields: &[&str],
    ) -> Result<Option<&mut Self>>
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.set_fields(params, fields)?;
        self.save_changes()
    }

    // ==================== Destroy ====================

    /// Run the destroy hooks and delete the row.
    pub fn destroy(&mut self) -> Result<Option<&mut Self>> {
        self.destroy_with(DestroyOptions::default())
    }

    #[tracing::instrument(level = "debug", skip(self, opts), fields(table = %self.model.table()))]
    pub fn destroy_with(&mut self, opts: DestroyOptions) -> Result<Option<&mut Self>> {
        let raise = self.raise_on_failure(opts.raise_on_failure);
        let destroyed = self
            .checked_transaction(opts.transaction, Self::destroy_core)
            .map(|outcome| outcome.is_some());
        Ok(checked_save_failure(raise, destroyed)?.then_some(self))
    }

    fn destroy_core(&mut self) -> Result<()> {
        let hooks = Arc::clone(self.model.hooks());
        if !hooks.before_destroy(self)? {
            return Err(hook_failed(HookKind::Destroy));
        }
        self.delete_row()?;
        hooks.after_destroy(self)
    }

    /// Delete the row without hooks or a transaction.
    pub fn delete(&mut self) -> Result<&mut Self> {
        self.delete_row()?;
        Ok(self)
    }

    fn delete_row(&self) -> Result<()> {
        let ds = self.this()?;
        let affected = ds.delete()?;
        self.check_modification(affected, || ds.delete_sql())
    }

    // ==================== Reading back ====================

    /// Whether the row exists. New records answer `false` without a query.
    pub fn exists(&self) -> Result<bool> {
        if self.is_new {
            return Ok(false);
        }
        self.this()?.exists()
    }

    /// Replace the values with the stored row and clear changed columns.
    pub fn refresh(&mut self) -> Result<&mut Self> {
        let this = self.this()?;
        self.refresh_from(&this)?;
        Ok(self)
    }

    /// Alias for [`Record::refresh`].
    pub fn reload(&mut self) -> Result<&mut Self> {
        self.refresh()
    }

    /// Refresh under `FOR UPDATE`. New records are left untouched.
    pub fn lock(&mut self) -> Result<&mut Self> {
        if !self.is_new {
            let this = self.this()?.for_update();
            self.refresh_from(&this)?;
        }
        Ok(self)
    }

    fn refresh_from(&mut self, ds: &Dataset) -> Result<()> {
        let row = ds
            .first()?
            .ok_or_else(|| Error::NotFound(format!("Record not found in {}", ds.table())))?;
        self.values = row;
        self.changed_columns.clear();
        Ok(())
    }
}
