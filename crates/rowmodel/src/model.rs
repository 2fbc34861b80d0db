//! Model metadata shared by every record of one table.
//!
//! A [`Model`] is built once with [`ModelBuilder`] and shared as
//! `Arc<Model>`. It owns the table dataset, primary key, recognized
//! columns, column schema, mass-assignment policy, lifecycle hooks and a
//! block of runtime-mutable [`ModelSettings`].

use crate::column_policy::ColumnPolicy;
use crate::hooks::{Hooks, NoHooks};
use crate::record::Record;
use indexmap::IndexMap;
use rowmodel_core::{ColumnSchema, Database, DbSchema, Result, Value};
use rowmodel_query::Dataset;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

static NEXT_MODEL_ID: AtomicU64 = AtomicU64::new(1);

/// Boolean behaviors configurable per model and overridable per record.
///
/// All default to `true`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Setting {
    /// Wrap save and destroy in a transaction.
    UseTransactions,
    /// UPDATE and DELETE must affect exactly one row.
    RequireModification,
    /// Surface hook rejections and validation failures as errors instead
    /// of returning `None`.
    RaiseOnSaveFailure,
    /// Reject non-settable mass-assignment keys instead of dropping them.
    StrictParamSetting,
    /// Typecast values passed to [`Record::assign`].
    TypecastOnAssignment,
    /// Surface typecast failures instead of storing the raw value.
    RaiseOnTypecastFailure,
    /// Treat `""` as NULL for non-string columns.
    TypecastEmptyStringToNil,
}

impl Setting {
    pub const COUNT: usize = 7;

    pub const ALL: [Setting; Self::COUNT] = [
        Setting::UseTransactions,
        Setting::RequireModification,
        Setting::RaiseOnSaveFailure,
        Setting::StrictParamSetting,
        Setting::TypecastOnAssignment,
        Setting::RaiseOnTypecastFailure,
        Setting::TypecastEmptyStringToNil,
    ];

    pub(crate) const fn index(self) -> usize {
        self as usize
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Setting::UseTransactions => "use_transactions",
            Setting::RequireModification => "require_modification",
            Setting::RaiseOnSaveFailure => "raise_on_save_failure",
            Setting::StrictParamSetting => "strict_param_setting",
            Setting::TypecastOnAssignment => "typecast_on_assignment",
            Setting::RaiseOnTypecastFailure => "raise_on_typecast_failure",
            Setting::TypecastEmptyStringToNil => "typecast_empty_string_to_nil",
        }
    }
}

/// Model-level defaults for every [`Setting`].
///
/// Changes are visible to existing records that have no per-record
/// override, since records read these lazily.
#[derive(Debug)]
pub struct ModelSettings {
    flags: [AtomicBool; Setting::COUNT],
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            flags: std::array::from_fn(|_| AtomicBool::new(true)),
        }
    }
}

impl ModelSettings {
    pub fn get(&self, setting: Setting) -> bool {
        self.flags[setting.index()].load(Ordering::Acquire)
    }

    pub fn set(&self, setting: Setting, value: bool) {
        self.flags[setting.index()].store(value, Ordering::Release);
    }

    fn snapshot(&self) -> Self {
        Self {
            flags: std::array::from_fn(|i| AtomicBool::new(self.get(Setting::ALL[i]))),
        }
    }
}

/// Primary key declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimaryKey {
    /// No primary key; key-based operations fail with a configuration error.
    None,
    Single(String),
    /// Ordered key columns.
    Composite(Vec<String>),
}

impl PrimaryKey {
    /// Key columns in declaration order.
    pub fn columns(&self) -> &[String] {
        match self {
            PrimaryKey::None => &[],
            PrimaryKey::Single(column) => std::slice::from_ref(column),
            PrimaryKey::Composite(columns) => columns,
        }
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns().iter().any(|c| c == column)
    }

    pub fn is_none(&self) -> bool {
        matches!(self, PrimaryKey::None)
    }
}

/// Setter for a column-like name that is not a stored column.
pub type VirtualSetter = Arc<dyn Fn(&mut Record, Value) -> Result<()> + Send + Sync>;

/// Table metadata and behavior shared by all records of a model.
pub struct Model {
    id: u64,
    name: String,
    dataset: Dataset,
    primary_key: PrimaryKey,
    columns: Vec<String>,
    db_schema: DbSchema,
    policy: ColumnPolicy,
    hooks: Arc<dyn Hooks>,
    refresh_after_insert: bool,
    autoincrementing_primary_key: Option<String>,
    virtual_setters: IndexMap<String, VirtualSetter>,
    settings: ModelSettings,
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.name)
            .field("table", &self.dataset.table())
            .field("primary_key", &self.primary_key)
            .field("columns", &self.columns)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Model {
    /// Start building a model over `table` with primary key `id`.
    ///
    /// ```
    /// use rowmodel::{Database, MockConnection, Model};
    /// use std::sync::Arc;
    ///
    /// let db = Database::new(Arc::new(MockConnection::new()));
    /// let items = Model::builder(db, "items").columns(&["id", "x", "y"]).build();
    /// assert_eq!(items.table(), "items");
    /// assert_eq!(items.primary_key().columns(), ["id"]);
    /// ```
    pub fn builder(db: Arc<Database>, table: &str) -> ModelBuilder {
        ModelBuilder::new(Dataset::new(db, table))
    }

    /// A builder for a child model that inherits this model's metadata,
    /// hooks and current settings.
    pub fn subclass(&self) -> ModelBuilder {
        ModelBuilder {
            model: Model {
                id: 0,
                name: self.name.clone(),
                dataset: self.dataset.clone(),
                primary_key: self.primary_key.clone(),
                columns: self.columns.clone(),
                db_schema: self.db_schema.clone(),
                policy: self.policy.clone(),
                hooks: Arc::clone(&self.hooks),
                refresh_after_insert: self.refresh_after_insert,
                autoincrementing_primary_key: self.autoincrementing_primary_key.clone(),
                virtual_setters: self.virtual_setters.clone(),
                settings: self.settings.snapshot(),
            },
        }
    }

    /// Identity of this model; distinct for every built model.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        self.dataset.table()
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn db(&self) -> &Arc<Database> {
        self.dataset.db()
    }

    pub fn primary_key(&self) -> &PrimaryKey {
        &self.primary_key
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn db_schema(&self) -> &DbSchema {
        &self.db_schema
    }

    /// Schema for `column`, if the model knows its type.
    pub fn schema_for(&self, column: &str) -> Option<&ColumnSchema> {
        self.db_schema.get(column)
    }

    pub fn column_policy(&self) -> &ColumnPolicy {
        &self.policy
    }

    pub fn hooks(&self) -> &Arc<dyn Hooks> {
        &self.hooks
    }

    /// Whether an insert without `RETURNING` support re-reads the row.
    pub fn refresh_after_insert(&self) -> bool {
        self.refresh_after_insert
    }

    /// The column that receives the key returned by INSERT.
    ///
    /// Defaults to the single primary-key column; composite keys have none
    /// unless configured.
    pub fn autoincrementing_primary_key(&self) -> Option<&str> {
        if let Some(column) = &self.autoincrementing_primary_key {
            return Some(column);
        }
        match &self.primary_key {
            PrimaryKey::Single(column) => Some(column),
            _ => None,
        }
    }

    pub(crate) fn virtual_setter(&self, name: &str) -> Option<VirtualSetter> {
        self.virtual_setters.get(name).cloned()
    }

    pub fn settings(&self) -> &ModelSettings {
        &self.settings
    }

    /// Shorthand for `settings().get(setting)`.
    pub fn setting(&self, setting: Setting) -> bool {
        self.settings.get(setting)
    }

    /// Change a model-level default.
    pub fn set_setting(&self, setting: Setting, value: bool) {
        self.settings.set(setting, value);
    }
}

/// Builder for [`Model`].
pub struct ModelBuilder {
    model: Model,
}

impl std::fmt::Debug for ModelBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelBuilder")
            .field("model", &self.model)
            .finish()
    }
}

impl ModelBuilder {
    fn new(dataset: Dataset) -> Self {
        Self {
            model: Model {
                id: 0,
                name: dataset.table().to_string(),
                dataset,
                primary_key: PrimaryKey::Single("id".to_string()),
                columns: Vec::new(),
                db_schema: DbSchema::new(),
                policy: ColumnPolicy::new(),
                hooks: Arc::new(NoHooks),
                refresh_after_insert: true,
                autoincrementing_primary_key: None,
                virtual_setters: IndexMap::new(),
                settings: ModelSettings::default(),
            },
        }
    }

    /// Display name; defaults to the table name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.model.name = name.into();
        self
    }

    /// Recognized columns, in order.
    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.model.columns = columns.iter().map(|c| (*c).to_string()).collect();
        self
    }

    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.model.primary_key = PrimaryKey::Single(column.into());
        self
    }

    pub fn composite_primary_key(mut self, columns: &[&str]) -> Self {
        self.model.primary_key =
            PrimaryKey::Composite(columns.iter().map(|c| (*c).to_string()).collect());
        self
    }

    pub fn no_primary_key(mut self) -> Self {
        self.model.primary_key = PrimaryKey::None;
        self
    }

    /// Declare the type of `column`, registering the column if needed.
    pub fn schema(mut self, column: &str, schema: ColumnSchema) -> Self {
        if !self.model.has_column(column) {
            self.model.columns.push(column.to_string());
        }
        self.model.db_schema.insert(column.to_string(), schema);
        self
    }

    /// Limit plain `set` to these columns.
    pub fn allowed_columns(mut self, columns: &[&str]) -> Self {
        self.model.policy = self.model.policy.allow(columns);
        self
    }

    /// Exclude these columns from plain `set`.
    pub fn restricted_columns(mut self, columns: &[&str]) -> Self {
        self.model.policy = self.model.policy.restrict(columns);
        self
    }

    pub fn unrestrict_primary_key(mut self) -> Self {
        self.model.policy = self.model.policy.unrestrict_primary_key(true);
        self
    }

    pub fn hooks(mut self, hooks: impl Hooks + 'static) -> Self {
        self.model.hooks = Arc::new(hooks);
        self
    }

    pub fn refresh_after_insert(mut self, refresh: bool) -> Self {
        self.model.refresh_after_insert = refresh;
        self
    }

    pub fn autoincrementing_primary_key(mut self, column: impl Into<String>) -> Self {
        self.model.autoincrementing_primary_key = Some(column.into());
        self
    }

    /// Register a setter that mass assignment dispatches `name` to.
    pub fn virtual_setter(
        mut self,
        name: impl Into<String>,
        setter: impl Fn(&mut Record, Value) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.model
            .virtual_setters
            .insert(name.into(), Arc::new(setter));
        self
    }

    pub fn setting(self, setting: Setting, value: bool) -> Self {
        self.model.settings.set(setting, value);
        self
    }

    /// Route the model's statements to `server`.
    pub fn server(mut self, server: impl Into<String>) -> Self {
        self.model.dataset = self.model.dataset.server(server);
        self
    }

    /// Replace the model's base dataset.
    pub fn dataset(mut self, dataset: Dataset) -> Self {
        self.model.dataset = dataset;
        self
    }

    pub fn build(mut self) -> Arc<Model> {
        self.model.id = NEXT_MODEL_ID.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            model = %self.model.name,
            table = %self.model.dataset.table(),
            "Built model"
        );
        Arc::new(self.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowmodel_core::{ColumnType, MockConnection};

    fn db() -> Arc<Database> {
        Database::new(Arc::new(MockConnection::new()))
    }

    #[test]
    fn builder_defaults() {
        let model = Model::builder(db(), "items").build();
        assert_eq!(model.name(), "items");
        assert_eq!(model.primary_key(), &PrimaryKey::Single("id".into()));
        assert_eq!(model.autoincrementing_primary_key(), Some("id"));
        assert!(model.refresh_after_insert());
        for setting in Setting::ALL {
            assert!(model.setting(setting), "{} should default on", setting.as_str());
        }
    }

    #[test]
    fn composite_keys_have_no_autoincrementing_column() {
        let model = Model::builder(db(), "items")
            .composite_primary_key(&["x", "y"])
            .build();
        assert_eq!(model.primary_key().columns(), ["x", "y"]);
        assert_eq!(model.autoincrementing_primary_key(), None);

        let model = Model::builder(db(), "items")
            .composite_primary_key(&["x", "y"])
            .autoincrementing_primary_key("y")
            .build();
        assert_eq!(model.autoincrementing_primary_key(), Some("y"));
    }

    #[test]
    fn schema_registers_columns() {
        let model = Model::builder(db(), "items")
            .columns(&["id"])
            .schema("x", ColumnSchema::new(ColumnType::Integer))
            .build();
        assert_eq!(model.columns(), ["id", "x"]);
        assert_eq!(
            model.schema_for("x").map(|s| s.ty),
            Some(ColumnType::Integer)
        );
        assert!(model.schema_for("id").is_none());
    }

    #[test]
    fn subclass_copies_current_settings_with_new_identity() {
        let parent = Model::builder(db(), "items").columns(&["id", "x"]).build();
        parent.set_setting(Setting::RaiseOnSaveFailure, false);
        let child = parent.subclass().name("Child").build();

        assert_ne!(parent.id(), child.id());
        assert_eq!(child.columns(), parent.columns());
        assert!(!child.setting(Setting::RaiseOnSaveFailure));

        child.set_setting(Setting::UseTransactions, false);
        assert!(parent.setting(Setting::UseTransactions));
    }

    #[test]
    fn server_routing_lives_on_the_dataset() {
        let model = Model::builder(db(), "items").server("s1").build();
        assert_eq!(model.dataset().server_name(), "s1");
    }
}
