//! Lifecycle hooks run around save and destroy.
//!
//! `before_*` hooks return `Ok(false)` to reject the operation; the
//! rejection surfaces as [`Error::HookFailed`](rowmodel_core::Error) or as a
//! silent `None` depending on the record's failure policy. Returning an
//! error (including [`Error::Rollback`](rowmodel_core::Error)) propagates it
//! unchanged.

use crate::record::Record;
use rowmodel_core::{Result, ValidationError};

/// Hooks invoked by [`Record`] persistence operations.
///
/// Every method has a no-op default, so implementors override only what
/// they need.
///
/// # Example
///
/// ```
/// use rowmodel::{Hooks, Record, Result};
///
/// struct Stamp;
///
/// impl Hooks for Stamp {
///     fn before_update(&self, record: &mut Record) -> Result<bool> {
///         record.assign("updated", true)?;
///         Ok(true)
///     }
/// }
/// ```
#[allow(unused_variables)]
pub trait Hooks: Send + Sync {
    /// Runs before validation; `false` fails validation.
    fn before_validation(&self, record: &mut Record) -> Result<bool> {
        Ok(true)
    }

    /// Record validation errors for `record`.
    fn validate(&self, record: &Record, errors: &mut ValidationError) {}

    fn after_validation(&self, record: &mut Record) -> Result<()> {
        Ok(())
    }

    fn before_save(&self, record: &mut Record) -> Result<bool> {
        Ok(true)
    }

    fn before_insert(&self, record: &mut Record) -> Result<bool> {
        Ok(true)
    }

    /// Runs before the UPDATE column set is computed, so assignments made
    /// here are saved.
    fn before_update(&self, record: &mut Record) -> Result<bool> {
        Ok(true)
    }

    fn before_destroy(&self, record: &mut Record) -> Result<bool> {
        Ok(true)
    }

    /// Runs after the row is inserted; `record.was_new()` is true.
    fn after_insert(&self, record: &mut Record) -> Result<()> {
        Ok(())
    }

    /// Runs after the UPDATE; `record.columns_updated()` holds its values.
    fn after_update(&self, record: &mut Record) -> Result<()> {
        Ok(())
    }

    fn after_save(&self, record: &mut Record) -> Result<()> {
        Ok(())
    }

    fn after_destroy(&self, record: &mut Record) -> Result<()> {
        Ok(())
    }
}

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl Hooks for NoHooks {}

type BeforeHook = Box<dyn Fn(&mut Record) -> Result<bool> + Send + Sync>;
type AfterHook = Box<dyn Fn(&mut Record) -> Result<()> + Send + Sync>;
type ValidateHook = Box<dyn Fn(&Record, &mut ValidationError) + Send + Sync>;

/// Closure-backed [`Hooks`], for models assembled at runtime.
///
/// ```
/// use rowmodel::HookSet;
///
/// let hooks = HookSet::new()
///     .before_save(|_| Ok(false))
///     .validate(|record, errors| {
///         if record.get("name").is_none() {
///             errors.add("name", "is required");
///         }
///     });
/// ```
#[derive(Default)]
pub struct HookSet {
    before_validation: Option<BeforeHook>,
    validate: Option<ValidateHook>,
    after_validation: Option<AfterHook>,
    before_save: Option<BeforeHook>,
    before_insert: Option<BeforeHook>,
    before_update: Option<BeforeHook>,
    before_destroy: Option<BeforeHook>,
    after_insert: Option<AfterHook>,
    after_update: Option<AfterHook>,
    after_save: Option<AfterHook>,
    after_destroy: Option<AfterHook>,
}

impl std::fmt::Debug for HookSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookSet")
            .field("before_save", &self.before_save.is_some())
            .field("before_insert", &self.before_insert.is_some())
            .field("before_update", &self.before_update.is_some())
            .field("before_destroy", &self.before_destroy.is_some())
            .finish_non_exhaustive()
    }
}

impl HookSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn before_validation(
        mut self,
        f: impl Fn(&mut Record) -> Result<bool> + Send + Sync + 'static,
    ) -> Self {
        self.before_validation = Some(Box::new(f));
        self
    }

    pub fn validate(
        mut self,
        f: impl Fn(&Record, &mut ValidationError) + Send + Sync + 'static,
    ) -> Self {
        self.validate = Some(Box::new(f));
        self
    }

    pub fn after_validation(
        mut self,
        f: impl Fn(&mut Record) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.after_validation = Some(Box::new(f));
        self
    }

    pub fn before_save(
        mut self,
        f: impl Fn(&mut Record) -> Result<bool> + Send + Sync + 'static,
    ) -> Self {
        self.before_save = Some(Box::new(f));
        self
    }

    pub fn before_insert(
        mut self,
        f: impl Fn(&mut Record) -> Result<bool> + Send + Sync + 'static,
    ) -> Self {
        self.before_insert = Some(Box::new(f));
        self
    }

    pub fn before_update(
        mut self,
        f: impl Fn(&mut Record) -> Result<bool> + Send + Sync + 'static,
    ) -> Self {
        self.before_update = Some(Box::new(f));
        self
    }

    pub fn before_destroy(
        mut self,
        f: impl Fn(&mut Record) -> Result<bool> + Send + Sync + 'static,
    ) -> Self {
        self.before_destroy = Some(Box::new(f));
        self
    }

    pub fn after_insert(
        mut self,
        f: impl Fn(&mut Record) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.after_insert = Some(Box::new(f));
        self
    }

    pub fn after_update(
        mut self,
        f: impl Fn(&mut Record) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.after_update = Some(Box::new(f));
        self
    }

    pub fn after_save(
        mut self,
        f: impl Fn(&mut Record) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.after_save = Some(Box::new(f));
        self
    }

    pub fn after_destroy(
        mut self,
        f: impl Fn(&mut Record) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.after_destroy = Some(Box::new(f));
        self
    }
}

fn run_before(hook: Option<&BeforeHook>, record: &mut Record) -> Result<bool> {
    hook.map_or(Ok(true), |f| f(record))
}

fn run_after(hook: Option<&AfterHook>, record: &mut Record) -> Result<()> {
    hook.map_or(Ok(()), |f| f(record))
}

impl Hooks for HookSet {
    fn before_validation(&self, record: &mut Record) -> Result<bool> {
        run_before(self.before_validation.as_ref(), record)
    }

    fn validate(&self, record: &Record, errors: &mut ValidationError) {
        if let Some(f) = &self.validate {
            f(record, errors);
        }
    }

    fn after_validation(&self, record: &mut Record) -> Result<()> {
        run_after(self.after_validation.as_ref(), record)
    }

    fn before_save(&self, record: &mut Record) -> Result<bool> {
        run_before(self.before_save.as_ref(), record)
    }

    fn before_insert(&self, record: &mut Record) -> Result<bool> {
        run_before(self.before_insert.as_ref(), record)
    }

    fn before_update(&self, record: &mut Record) -> Result<bool> {
        run_before(self.before_update.as_ref(), record)
    }

    fn before_destroy(&self, record: &mut Record) -> Result<bool> {
        run_before(self.before_destroy.as_ref(), record)
    }

    fn after_insert(&self, record: &mut Record) -> Result<()> {
        run_after(self.after_insert.as_ref(), record)
    }

    fn after_update(&self, record: &mut Record) -> Result<()> {
        run_after(self.after_update.as_ref(), record)
    }

    fn after_save(&self, record: &mut Record) -> Result<()> {
        run_after(self.after_save.as_ref(), record)
    }

    fn after_destroy(&self, record: &mut Record) -> Result<()> {
        run_after(self.after_destroy.as_ref(), record)
    }
}
