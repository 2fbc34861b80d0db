//! Mass-assignment column filtering.

/// Which columns a mass-assignment call may touch, before the model's
/// allow/deny lists are consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetMode<'a> {
    /// `set`: the allowed columns if configured, else every setter minus
    /// the restricted columns.
    Default,
    /// `set_all`: every setter.
    All,
    /// `set_only`: only the listed columns.
    Only(&'a [&'a str]),
    /// `set_except`: every setter except the listed columns.
    Except(&'a [&'a str]),
}

/// Declarative allow/deny rules consulted by every mass-assignment entry
/// point.
///
/// Primary-key columns are removed after the mode and lists are applied,
/// unless `unrestrict_primary_key` is set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnPolicy {
    allowed: Option<Vec<String>>,
    restricted: Vec<String>,
    unrestrict_primary_key: bool,
}

impl ColumnPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit plain `set` to these columns.
    pub fn allow(mut self, columns: &[&str]) -> Self {
        self.allowed = Some(columns.iter().map(|c| (*c).to_string()).collect());
        self
    }

    /// Exclude these columns from plain `set`.
    pub fn restrict(mut self, columns: &[&str]) -> Self {
        self.restricted = columns.iter().map(|c| (*c).to_string()).collect();
        self
    }

    /// Let mass assignment and INSERT include primary-key columns.
    pub fn unrestrict_primary_key(mut self, unrestrict: bool) -> Self {
        self.unrestrict_primary_key = unrestrict;
        self
    }

    pub fn allowed(&self) -> Option<&[String]> {
        self.allowed.as_deref()
    }

    pub fn restricted(&self) -> &[String] {
        &self.restricted
    }

    pub fn primary_key_unrestricted(&self) -> bool {
        self.unrestrict_primary_key
    }

    /// Whether `column` may be assigned under `mode`.
    ///
    /// `is_setter` says whether the model knows the column (or a virtual
    /// setter of that name); `is_primary_key` whether it is part of the key.
    pub fn permits(
        &self,
        column: &str,
        mode: SetMode<'_>,
        is_setter: bool,
        is_primary_key: bool,
    ) -> bool {
        if !is_setter {
            return false;
        }
        let listed = match mode {
            SetMode::All => true,
            SetMode::Only(columns) => columns.contains(&column),
            SetMode::Except(columns) => !columns.contains(&column),
            SetMode::Default => match &self.allowed {
                Some(allowed) => allowed.iter().any(|c| c == column),
                None => !self.restricted.iter().any(|c| c == column),
            },
        };
        listed && (!is_primary_key || self.unrestrict_primary_key)
    }
}
