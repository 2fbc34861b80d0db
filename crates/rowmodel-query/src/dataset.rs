//! Datasets: a table plus filter state that renders and runs SQL.

use crate::expr::{Expr, literal};
use indexmap::IndexMap;
use rowmodel_core::{DEFAULT_SERVER, Database, Result, Row, Value};
use std::sync::Arc;

/// Column to value mapping, in statement order.
pub type ValueMap = IndexMap<String, Value>;

/// A query builder/executor bound to one table.
///
/// Datasets are cheap to clone; every builder method returns a new
/// dataset with the extra restriction applied.
///
/// # Example
///
/// ```
/// use rowmodel_core::{Database, MockConnection};
/// use rowmodel_query::{Dataset, Expr};
/// use std::sync::Arc;
///
/// let db = Database::new(Arc::new(MockConnection::new()));
/// let ds = Dataset::new(db, "items").filter(Expr::col("id").eq(3)).limit(1);
/// assert_eq!(ds.select_sql(), "SELECT * FROM items WHERE (id = 3) LIMIT 1");
/// assert_eq!(ds.delete_sql(), "DELETE FROM items WHERE (id = 3)");
/// ```
#[derive(Debug, Clone)]
pub struct Dataset {
    db: Arc<Database>,
    table: String,
    filter: Option<Expr>,
    limit: Option<u64>,
    for_update: bool,
    server: String,
}

impl Dataset {
    /// Create an unfiltered dataset for `table`.
    pub fn new(db: Arc<Database>, table: impl Into<String>) -> Self {
        Self {
            db,
            table: table.into(),
            filter: None,
            limit: None,
            for_update: false,
            server: DEFAULT_SERVER.to_string(),
        }
    }

    pub fn db(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Server/shard token statements are routed to.
    pub fn server_name(&self) -> &str {
        &self.server
    }

    /// Add a WHERE condition, ANDed with any existing one.
    pub fn filter(mut self, expr: Expr) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(expr),
            None => expr,
        });
        self
    }

    /// Limit the number of rows selected.
    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    /// Select rows with a pessimistic lock (`FOR UPDATE`).
    pub fn for_update(mut self) -> Self {
        self.for_update = true;
        self
    }

    /// Route statements to `name` instead of the default server.
    pub fn server(mut self, name: impl Into<String>) -> Self {
        self.server = name.into();
        self
    }

    pub fn supports_insert_select(&self) -> bool {
        self.db.connection().supports_insert_select()
    }

    // ==================== SQL Generation ====================

    fn where_sql(&self) -> String {
        self.filter
            .as_ref()
            .map(|f| format!(" WHERE {}", f.build()))
            .unwrap_or_default()
    }

    fn select_sql_with(&self, columns: &str) -> String {
        let mut sql = format!("SELECT {columns} FROM {}{}", self.table, self.where_sql());
        if let Some(n) = self.limit {
            sql.push_str(&format!(" LIMIT {n}"));
        }
        if self.for_update {
            sql.push_str(" FOR UPDATE");
        }
        sql
    }

    /// `SELECT` statement for this dataset.
    pub fn select_sql(&self) -> String {
        self.select_sql_with("*")
    }

    /// Existence check statement: `SELECT 1 ... LIMIT 1`.
    pub fn exists_sql(&self) -> String {
        self.clone().limit(1).select_sql_with("1")
    }

    /// `INSERT` statement for `values`; `DEFAULT VALUES` when empty.
    pub fn insert_sql(&self, values: &ValueMap) -> String {
        if values.is_empty() {
            return format!("INSERT INTO {} DEFAULT VALUES", self.table);
        }
        let columns: Vec<&str> = values.keys().map(String::as_str).collect();
        let literals: Vec<String> = values.values().map(literal).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table,
            columns.join(", "),
            literals.join(", ")
        )
    }

    /// `INSERT ... RETURNING *` statement for `values`.
    pub fn insert_select_sql(&self, values: &ValueMap) -> String {
        format!("{} RETURNING *", self.insert_sql(values))
    }

    /// `UPDATE` statement for `values`. Limits do not apply to updates.
    ///
    /// With no values, the columns the filter matches on are assigned to
    /// themselves, so the statement still reports the matched row count
    /// without changing data.
    pub fn update_sql(&self, values: &ValueMap) -> String {
        let set_clauses: Vec<String> = if values.is_empty() {
            self.filter
                .as_ref()
                .map(Expr::equality_columns)
                .unwrap_or_default()
                .into_iter()
                .map(|column| format!("{column} = {column}"))
                .collect()
        } else {
            values
                .iter()
                .map(|(column, value)| format!("{column} = {}", literal(value)))
                .collect()
        };
        format!(
            "UPDATE {} SET {}{}",
            self.table,
            set_clauses.join(", "),
            self.where_sql()
        )
    }

    /// `DELETE` statement. Limits do not apply to deletes.
    pub fn delete_sql(&self) -> String {
        format!("DELETE FROM {}{}", self.table, self.where_sql())
    }

    // ==================== Execution ====================

    /// Insert `values` and return the identifying value the driver reports.
    #[tracing::instrument(level = "debug", skip(self, values), fields(table = %self.table))]
    pub fn insert(&self, values: &ValueMap) -> Result<Value> {
        let sql = self.insert_sql(values);
        tracing::trace!(sql = %sql, server = %self.server, "Executing INSERT");
        self.db.connection().execute_insert(&sql, &self.server)
    }

    /// Insert `values` and return the inserted row, for connections that
    /// support `RETURNING`.
    #[tracing::instrument(level = "debug", skip(self, values), fields(table = %self.table))]
    pub fn insert_select(&self, values: &ValueMap) -> Result<Option<ValueMap>> {
        let sql = self.insert_select_sql(values);
        tracing::trace!(sql = %sql, server = %self.server, "Executing INSERT RETURNING");
        let rows = self.db.connection().fetch_rows(&sql, &self.server)?;
        Ok(rows.into_iter().next().map(Row::into_map))
    }

    /// Update matching rows and return the affected count.
    #[tracing::instrument(level = "debug", skip(self, values), fields(table = %self.table))]
    pub fn update(&self, values: &ValueMap) -> Result<u64> {
        let sql = self.update_sql(values);
        tracing::trace!(sql = %sql, server = %self.server, "Executing UPDATE");
        self.db.connection().execute_dui(&sql, &self.server)
    }

    /// Delete matching rows and return the affected count.
    #[tracing::instrument(level = "debug", skip(self), fields(table = %self.table))]
    pub fn delete(&self) -> Result<u64> {
        let sql = self.delete_sql();
        tracing::trace!(sql = %sql, server = %self.server, "Executing DELETE");
        self.db.connection().execute_dui(&sql, &self.server)
    }

    /// Fetch every matching row.
    pub fn all(&self) -> Result<Vec<ValueMap>> {
        let sql = self.select_sql();
        tracing::trace!(sql = %sql, server = %self.server, "Executing SELECT");
        let rows = self.db.connection().fetch_rows(&sql, &self.server)?;
        Ok(rows.into_iter().map(Row::into_map).collect())
    }

    /// Fetch the first matching row.
    pub fn first(&self) -> Result<Option<ValueMap>> {
        Ok(self.clone().limit(1).all()?.into_iter().next())
    }

    /// Whether any row matches.
    pub fn exists(&self) -> Result<bool> {
        let sql = self.exists_sql();
        tracing::trace!(sql = %sql, server = %self.server, "Executing existence check");
        let rows = self.db.connection().fetch_rows(&sql, &self.server)?;
        Ok(!rows.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowmodel_core::MockConnection;

    fn dataset() -> (Arc<MockConnection>, Dataset) {
        let mock = Arc::new(MockConnection::new());
        let db = Database::new(mock.clone());
        (mock, Dataset::new(db, "items"))
    }

    fn values<const N: usize>(pairs: [(&str, Value); N]) -> ValueMap {
        pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    #[test]
    fn test_insert_sql() {
        let (_, ds) = dataset();
        assert_eq!(
            ds.insert_sql(&values([("x", 1.into()), ("y", "a".into())])),
            "INSERT INTO items (x, y) VALUES (1, 'a')"
        );
        assert_eq!(
            ds.insert_sql(&ValueMap::new()),
            "INSERT INTO items DEFAULT VALUES"
        );
        assert_eq!(
            ds.insert_select_sql(&values([("x", 1.into())])),
            "INSERT INTO items (x) VALUES (1) RETURNING *"
        );
    }

    #[test]
    fn test_update_and_delete_ignore_limit() {
        let (_, ds) = dataset();
        let ds = ds.filter(Expr::col("id").eq(3)).limit(1);
        assert_eq!(
            ds.update_sql(&values([("x", 1.into()), ("y", Value::Null)])),
            "UPDATE items SET x = 1, y = NULL WHERE (id = 3)"
        );
        assert_eq!(ds.delete_sql(), "DELETE FROM items WHERE (id = 3)");
    }

    #[test]
    fn test_empty_update_reassigns_filter_columns() {
        let (mock, ds) = dataset();
        let ds = ds.filter(Expr::matching([("x", 4), ("y", 5)]).unwrap());
        assert_eq!(
            ds.update_sql(&ValueMap::new()),
            "UPDATE items SET x = x, y = y WHERE ((x = 4) AND (y = 5))"
        );

        mock.push_affected(0);
        assert_eq!(ds.update(&ValueMap::new()).unwrap(), 0);
        assert_eq!(
            mock.sqls(),
            vec!["UPDATE items SET x = x, y = y WHERE ((x = 4) AND (y = 5))"]
        );
    }

    #[test]
    fn test_select_modifiers() {
        let (_, ds) = dataset();
        let ds = ds.filter(Expr::col("x").eq(4)).filter(Expr::col("y").eq(5));
        assert_eq!(
            ds.select_sql(),
            "SELECT * FROM items WHERE ((x = 4) AND (y = 5))"
        );
        assert_eq!(
            ds.exists_sql(),
            "SELECT 1 FROM items WHERE ((x = 4) AND (y = 5)) LIMIT 1"
        );
        assert_eq!(
            ds.clone().limit(1).for_update().select_sql(),
            "SELECT * FROM items WHERE ((x = 4) AND (y = 5)) LIMIT 1 FOR UPDATE"
        );
    }

    #[test]
    fn test_execution_routes_to_server() {
        let (mock, ds) = dataset();
        mock.push_insert_id(7);
        let ds = ds.server("s1");
        assert_eq!(ds.insert(&values([("x", 1.into())])).unwrap(), Value::Integer(7));
        assert_eq!(ds.delete().unwrap(), 1);
        assert_eq!(
            mock.executed(),
            vec![
                ("INSERT INTO items (x) VALUES (1)".to_string(), "s1".to_string()),
                ("DELETE FROM items".to_string(), "s1".to_string()),
            ]
        );
    }

    #[test]
    fn test_first_and_exists() {
        let (mock, ds) = dataset();
        let ds = ds.filter(Expr::col("id").eq(1));
        assert_eq!(ds.first().unwrap(), None);
        assert!(!ds.exists().unwrap());

        mock.on_fetch("FROM items", vec![Row::from_pairs([("id", 1), ("x", 2)])]);
        let row = ds.first().unwrap().unwrap();
        assert_eq!(row["x"], Value::Integer(2));
        assert!(ds.exists().unwrap());
        assert_eq!(
            mock.sqls(),
            vec![
                "SELECT * FROM items WHERE (id = 1) LIMIT 1",
                "SELECT 1 FROM items WHERE (id = 1) LIMIT 1",
                "SELECT * FROM items WHERE (id = 1) LIMIT 1",
                "SELECT 1 FROM items WHERE (id = 1) LIMIT 1",
            ]
        );
    }

    #[test]
    fn test_insert_select_returns_row() {
        let (mock, ds) = dataset();
        mock.set_insert_select(true);
        mock.on_fetch("RETURNING", vec![Row::from_pairs([("id", 5), ("x", 1)])]);
        assert!(ds.supports_insert_select());
        let row = ds.insert_select(&values([("x", 1.into())])).unwrap().unwrap();
        assert_eq!(row["id"], Value::Integer(5));
    }
}
