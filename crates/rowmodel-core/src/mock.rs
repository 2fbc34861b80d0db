//! In-memory connection that records SQL instead of executing it.
//!
//! `MockConnection` is the test double for every layer above the driver:
//! it records each statement with its server token and answers with
//! scripted insert keys, affected-row counts and rows.

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::row::Row;
use crate::value::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct MockState {
    executed: Vec<(String, String)>,
    insert_ids: VecDeque<Value>,
    affected: VecDeque<u64>,
    /// `(sql substring, rows)`; later rules take precedence.
    fetch_rules: Vec<(String, Vec<Row>)>,
    default_rows: Vec<Row>,
    failures: Vec<(String, String)>,
}

/// A scripted connection.
///
/// Without scripting, inserts return key `1`, updates and deletes affect
/// one row, and queries return no rows.
///
/// # Example
///
/// ```
/// use rowmodel_core::{Connection, MockConnection, Row, Value};
///
/// let conn = MockConnection::new();
/// conn.on_fetch("FROM items", vec![Row::from_pairs([("id", 1)])]);
/// let rows = conn.fetch_rows("SELECT * FROM items LIMIT 1", "default").unwrap();
/// assert_eq!(rows[0].get_by_name("id"), Some(&Value::Integer(1)));
/// assert_eq!(conn.sqls(), vec!["SELECT * FROM items LIMIT 1"]);
/// ```
#[derive(Debug, Default)]
pub struct MockConnection {
    state: Mutex<MockState>,
    insert_select: AtomicBool,
}

impl MockConnection {
    /// Create a connection with default answers.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue the key returned by the next INSERT.
    pub fn push_insert_id(&self, id: impl Into<Value>) {
        self.state().insert_ids.push_back(id.into());
    }

    /// Queue the affected-row count returned by the next UPDATE or DELETE.
    pub fn push_affected(&self, count: u64) {
        self.state().affected.push_back(count);
    }

    /// Answer queries containing `pattern` with `rows`.
    pub fn on_fetch(&self, pattern: impl Into<String>, rows: Vec<Row>) {
        self.state().fetch_rules.push((pattern.into(), rows));
    }

    /// Rows returned by queries that match no `on_fetch` rule.
    pub fn set_default_rows(&self, rows: Vec<Row>) {
        self.state().default_rows = rows;
    }

    /// Fail every statement containing `pattern` with a query error.
    pub fn fail_on(&self, pattern: impl Into<String>, message: impl Into<String>) {
        self.state().failures.push((pattern.into(), message.into()));
    }

    /// Toggle `INSERT ... RETURNING` support.
    pub fn set_insert_select(&self, enabled: bool) {
        self.insert_select.store(enabled, Ordering::Release);
    }

    /// Every statement executed so far, in order.
    pub fn sqls(&self) -> Vec<String> {
        self.state()
            .executed
            .iter()
            .map(|(sql, _)| sql.clone())
            .collect()
    }

    /// Every `(statement, server)` pair executed so far, in order.
    pub fn executed(&self) -> Vec<(String, String)> {
        self.state().executed.clone()
    }

    /// Forget executed statements. Scripted answers are kept.
    pub fn reset(&self) {
        self.state().executed.clear();
    }

    fn record(&self, sql: &str, server: &str) -> Result<()> {
        let mut state = self.state();
        state.executed.push((sql.to_string(), server.to_string()));
        if let Some((_, message)) = state.failures.iter().find(|(p, _)| sql.contains(p.as_str())) {
            return Err(Error::query(Some(sql), message.clone()));
        }
        Ok(())
    }
}

impl Connection for MockConnection {
    fn execute(&self, sql: &str, server: &str) -> Result<()> {
        self.record(sql, server)
    }

    fn execute_insert(&self, sql: &str, server: &str) -> Result<Value> {
        self.record(sql, server)?;
        Ok(self
            .state()
            .insert_ids
            .pop_front()
            .unwrap_or(Value::Integer(1)))
    }

    fn execute_dui(&self, sql: &str, server: &str) -> Result<u64> {
        self.record(sql, server)?;
        Ok(self.state().affected.pop_front().unwrap_or(1))
    }

    fn fetch_rows(&self, sql: &str, server: &str) -> Result<Vec<Row>> {
        self.record(sql, server)?;
        let state = self.state();
        let rows = state
            .fetch_rules
            .iter()
            .rev()
            .find(|(pattern, _)| sql.contains(pattern.as_str()))
            .map_or_else(|| state.default_rows.clone(), |(_, rows)| rows.clone());
        Ok(rows)
    }

    fn supports_insert_select(&self) -> bool {
        self.insert_select.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::DEFAULT_SERVER;

    #[test]
    fn records_statements_with_server() {
        let conn = MockConnection::new();
        conn.execute("BEGIN", DEFAULT_SERVER).unwrap();
        conn.execute_dui("DELETE FROM items WHERE (id = 1)", "s1").unwrap();
        assert_eq!(
            conn.executed(),
            vec![
                ("BEGIN".to_string(), "default".to_string()),
                ("DELETE FROM items WHERE (id = 1)".to_string(), "s1".to_string()),
            ]
        );
        conn.reset();
        assert!(conn.sqls().is_empty());
    }

    #[test]
    fn scripted_answers_then_defaults() {
        let conn = MockConnection::new();
        conn.push_insert_id(10);
        conn.push_affected(0);
        assert_eq!(conn.execute_insert("INSERT", DEFAULT_SERVER).unwrap(), Value::Integer(10));
        assert_eq!(conn.execute_insert("INSERT", DEFAULT_SERVER).unwrap(), Value::Integer(1));
        assert_eq!(conn.execute_dui("UPDATE", DEFAULT_SERVER).unwrap(), 0);
        assert_eq!(conn.execute_dui("UPDATE", DEFAULT_SERVER).unwrap(), 1);
    }

    #[test]
    fn later_fetch_rules_win() {
        let conn = MockConnection::new();
        conn.on_fetch("items", vec![Row::from_pairs([("x", 1)])]);
        conn.on_fetch("(id = 2)", vec![Row::from_pairs([("x", 2)])]);
        let rows = conn
            .fetch_rows("SELECT * FROM items WHERE (id = 2) LIMIT 1", DEFAULT_SERVER)
            .unwrap();
        assert_eq!(rows[0].get_by_name("x"), Some(&Value::Integer(2)));
        let rows = conn.fetch_rows("SELECT * FROM other", DEFAULT_SERVER).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn failures_are_recorded_and_raised() {
        let conn = MockConnection::new();
        conn.fail_on("BOOM", "exploded");
        let err = conn.execute("BOOM", DEFAULT_SERVER).unwrap_err();
        assert_eq!(err.sql(), Some("BOOM"));
        assert_eq!(conn.sqls(), vec!["BOOM"]);
    }
}
