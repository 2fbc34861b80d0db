//! Database connection traits.
//!
//! This module defines the two collaborators every dataset talks to:
//!
//! - [`Connection`] - the driver: executes SQL text, returns rows, affected
//!   counts or generated keys
//! - [`Database`] - a shared handle over a connection that owns transaction
//!   state, the default server token and the timestamp representation used
//!   by typecasting

use crate::error::{Error, Result};
use crate::row::Row;
use crate::value::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

/// Server/shard token used when a dataset has no explicit routing.
pub const DEFAULT_SERVER: &str = "default";

/// A database connection capable of executing SQL text.
///
/// Every call carries the server/shard token the statement is routed to.
/// Implementations must be `Send + Sync` so models can be shared.
///
/// # Example
///
/// ```rust,ignore
/// let affected = conn.execute_dui("DELETE FROM items WHERE (id = 1)", DEFAULT_SERVER)?;
/// let rows = conn.fetch_rows("SELECT * FROM items WHERE (id = 1) LIMIT 1", DEFAULT_SERVER)?;
/// ```
pub trait Connection: Send + Sync {
    /// Execute a statement whose result is not needed (BEGIN, COMMIT, DDL).
    fn execute(&self, sql: &str, server: &str) -> Result<()>;

    /// Execute an INSERT and return the identifying value it produced.
    fn execute_insert(&self, sql: &str, server: &str) -> Result<Value>;

    /// Execute an UPDATE or DELETE and return the number of affected rows.
    fn execute_dui(&self, sql: &str, server: &str) -> Result<u64>;

    /// Execute a query and return all rows.
    fn fetch_rows(&self, sql: &str, server: &str) -> Result<Vec<Row>>;

    /// Whether `INSERT ... RETURNING *` is available, letting a save use the
    /// returned row instead of refreshing.
    fn supports_insert_select(&self) -> bool {
        false
    }
}

/// Concrete representation used for datetime columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum TimestampRepr {
    /// `Value::Timestamp` with no offset; offset-bearing input is
    /// converted to UTC.
    #[default]
    Naive = 0,
    /// `Value::TimestampTz`; offset-less input is taken as UTC.
    Zoned = 1,
}

impl TimestampRepr {
    const fn from_u8(raw: u8) -> Self {
        match raw {
            1 => TimestampRepr::Zoned,
            _ => TimestampRepr::Naive,
        }
    }
}

/// Shared database handle.
///
/// Models hold an `Arc<Database>`; every model bound to the same handle
/// shares its timestamp representation. Transaction state is tracked per
/// thread and per server, so a block opened on one thread is never joined
/// by another.
pub struct Database {
    conn: Arc<dyn Connection>,
    open_transactions: Mutex<HashSet<TransactionKey>>,
    timestamp_repr: AtomicU8,
}

type TransactionKey = (ThreadId, String);

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("open_transactions", &self.open_transactions().len())
            .field("timestamp_repr", &self.timestamp_repr())
            .finish_non_exhaustive()
    }
}

/// Releases the transaction slot on every exit path of the outermost block.
struct TransactionScope<'a> {
    db: &'a Database,
    key: TransactionKey,
}

impl Drop for TransactionScope<'_> {
    fn drop(&mut self) {
        self.db.open_transactions().remove(&self.key);
    }
}

fn transaction_key(server: &str) -> TransactionKey {
    (thread::current().id(), server.to_string())
}

impl Database {
    /// Wrap a connection in a new shared handle.
    pub fn new(conn: Arc<dyn Connection>) -> Arc<Self> {
        Arc::new(Self {
            conn,
            open_transactions: Mutex::new(HashSet::new()),
            timestamp_repr: AtomicU8::new(TimestampRepr::default() as u8),
        })
    }

    /// The underlying connection.
    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.conn
    }

    fn open_transactions(&self) -> MutexGuard<'_, HashSet<TransactionKey>> {
        self.open_transactions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Execute a statement on the default server.
    pub fn run(&self, sql: &str) -> Result<()> {
        self.run_on(DEFAULT_SERVER, sql)
    }

    /// Execute a statement on `server`.
    pub fn run_on(&self, server: &str, sql: &str) -> Result<()> {
        tracing::trace!(sql = %sql, server = %server, "Executing statement");
        self.conn.execute(sql, server)
    }

    /// Whether the current thread has a transaction block open on `server`.
    pub fn in_transaction(&self, server: &str) -> bool {
        self.open_transactions().contains(&transaction_key(server))
    }

    /// Current datetime representation for typecasting.
    pub fn timestamp_repr(&self) -> TimestampRepr {
        TimestampRepr::from_u8(self.timestamp_repr.load(Ordering::Acquire))
    }

    /// Switch the datetime representation for every subsequent typecast
    /// through this handle.
    pub fn set_timestamp_repr(&self, repr: TimestampRepr) {
        self.timestamp_repr.store(repr as u8, Ordering::Release);
    }

    /// Run `f` inside a transaction on `server`.
    ///
    /// If the current thread already has a transaction open on `server`,
    /// `f` joins it: no nested BEGIN is issued and any error propagates to
    /// the enclosing block, which decides whether to roll back. Blocks on
    /// other threads or other servers are independent.
    ///
    /// The outermost block issues BEGIN, then COMMIT when `f` succeeds or
    /// ROLLBACK when it fails. [`Error::Rollback`] is swallowed and reported
    /// as `Ok(None)`; every other error is returned after the rollback.
    #[tracing::instrument(level = "debug", skip(self, f))]
    pub fn transaction<T>(
        &self,
        server: &str,
        f: impl FnOnce() -> Result<T>,
    ) -> Result<Option<T>> {
        let key = transaction_key(server);
        if self.open_transactions().contains(&key) {
            tracing::trace!("Joining open transaction");
            return f().map(Some);
        }

        self.conn.execute("BEGIN", server)?;
        self.open_transactions().insert(key.clone());
        let _scope = TransactionScope { db: self, key };

        match f() {
            Ok(value) => {
                self.conn.execute("COMMIT", server)?;
                Ok(Some(value))
            }
            Err(Error::Rollback) => {
                tracing::debug!("Rollback requested inside transaction");
                self.conn.execute("ROLLBACK", server)?;
                Ok(None)
            }
            Err(err) => {
                tracing::debug!(error = %err, "Rolling back transaction");
                if let Err(rollback_err) = self.conn.execute("ROLLBACK", server) {
                    tracing::warn!(error = %rollback_err, "ROLLBACK failed");
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockConnection;
    use std::sync::Barrier;

    fn db() -> (Arc<MockConnection>, Arc<Database>) {
        let mock = Arc::new(MockConnection::new());
        let db = Database::new(mock.clone());
        (mock, db)
    }

    #[test]
    fn commits_on_success() {
        let (mock, db) = db();
        let out = db.transaction(DEFAULT_SERVER, || db.run("BLAH").map(|()| 5)).unwrap();
        assert_eq!(out, Some(5));
        assert_eq!(mock.sqls(), vec!["BEGIN", "BLAH", "COMMIT"]);
        assert!(!db.in_transaction(DEFAULT_SERVER));
    }

    #[test]
    fn rolls_back_and_reraises_errors() {
        let (mock, db) = db();
        let err = db
            .transaction(DEFAULT_SERVER, || -> Result<()> { Err(Error::config("boom")) })
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(mock.sqls(), vec!["BEGIN", "ROLLBACK"]);
        assert!(!db.in_transaction(DEFAULT_SERVER));
    }

    #[test]
    fn swallows_rollback_signal() {
        let (mock, db) = db();
        let out = db
            .transaction(DEFAULT_SERVER, || -> Result<()> { Err(Error::Rollback) })
            .unwrap();
        assert_eq!(out, None);
        assert_eq!(mock.sqls(), vec!["BEGIN", "ROLLBACK"]);
    }

    #[test]
    fn nested_blocks_join_the_outer_transaction() {
        let (mock, db) = db();
        db.transaction(DEFAULT_SERVER, || {
            let inner =
                db.transaction(DEFAULT_SERVER, || -> Result<()> { Err(Error::config("inner")) });
            assert!(inner.is_err());
            db.run("BLAH")
        })
        .unwrap();
        assert_eq!(mock.sqls(), vec!["BEGIN", "BLAH", "COMMIT"]);
    }

    #[test]
    fn nested_rollback_signal_rolls_back_outer() {
        let (mock, db) = db();
        let out = db
            .transaction(DEFAULT_SERVER, || {
                db.run("BLAH")?;
                db.transaction(DEFAULT_SERVER, || -> Result<()> { Err(Error::Rollback) })?;
                db.run("NEVER")
            })
            .unwrap();
        assert_eq!(out, None);
        assert_eq!(mock.sqls(), vec!["BEGIN", "BLAH", "ROLLBACK"]);
    }

    #[test]
    fn transactions_are_scoped_to_their_server() {
        let (mock, db) = db();
        db.transaction("s1", || {
            assert!(db.in_transaction("s1"));
            assert!(!db.in_transaction(DEFAULT_SERVER));
            db.transaction("s1", || db.run_on("s1", "BLAH"))?;
            db.transaction("s2", || db.run_on("s2", "BLAH"))
        })
        .unwrap();
        assert_eq!(
            mock.executed(),
            [
                ("BEGIN", "s1"),
                ("BLAH", "s1"),
                ("BEGIN", "s2"),
                ("BLAH", "s2"),
                ("COMMIT", "s2"),
                ("COMMIT", "s1"),
            ]
            .map(|(sql, server)| (sql.to_string(), server.to_string()))
        );
        assert!(!db.in_transaction("s1"));
    }

    #[test]
    fn other_threads_do_not_join_an_open_transaction() {
        let (mock, db) = db();
        let opened = Barrier::new(2);
        let finished = Barrier::new(2);

        thread::scope(|s| {
            s.spawn(|| {
                db.transaction(DEFAULT_SERVER, || {
                    opened.wait();
                    finished.wait();
                    Ok(())
                })
                .unwrap();
            });

            opened.wait();
            assert!(!db.in_transaction(DEFAULT_SERVER));
            let err = db
                .transaction(DEFAULT_SERVER, || -> Result<()> {
                    db.run("FAIL")?;
                    Err(Error::config("boom"))
                })
                .unwrap_err();
            assert!(matches!(err, Error::Config(_)));
            finished.wait();
        });

        assert_eq!(
            mock.sqls(),
            vec!["BEGIN", "BEGIN", "FAIL", "ROLLBACK", "COMMIT"]
        );
    }

    #[test]
    fn timestamp_repr_switch_is_shared() {
        let (_mock, db) = db();
        assert_eq!(db.timestamp_repr(), TimestampRepr::Naive);
        db.set_timestamp_repr(TimestampRepr::Zoned);
        assert_eq!(db.timestamp_repr(), TimestampRepr::Zoned);
    }
}
