//! SQL expressions for dataset filters.
//!
//! Expressions render to SQL text with values inlined as literals. Every
//! comparison is parenthesized, so a primary-key filter renders as
//! `(id = 3)` and a composite one as `((x = 4) AND (y = 5))`.

use rowmodel_core::Value;
use rowmodel_core::value::format_float;
use std::fmt::Write;

/// A SQL expression usable in a WHERE clause.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Unqualified column reference
    Column(String),

    /// Literal value, rendered inline
    Literal(Value),

    /// Binary operation (`a = b`, `a AND b`)
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    And,
}

impl BinaryOp {
    /// Get the SQL representation of this operator.
    pub const fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::And => "AND",
        }
    }
}

impl Expr {
    // ==================== Constructors ====================

    /// Create a column reference expression.
    pub fn col(name: impl Into<String>) -> Self {
        Expr::Column(name.into())
    }

    /// AND together every `(column, value)` equality, in the given order.
    ///
    /// Returns `None` for an empty iterator.
    pub fn matching<K, V, I>(pairs: I) -> Option<Self>
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        pairs
            .into_iter()
            .map(|(k, v)| Expr::col(k).eq(Expr::Literal(v.into())))
            .reduce(|acc, expr| acc.and(expr))
    }

    // ==================== Operators ====================

    fn binary(self, op: BinaryOp, other: impl Into<Expr>) -> Self {
        Expr::Binary {
            left: Box::new(self),
            op,
            right: Box::new(other.into()),
        }
    }

    /// Equal to (=). Comparing with a NULL literal renders `IS NULL`.
    pub fn eq(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Eq, other)
    }

    /// Logical AND
    pub fn and(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::And, other)
    }

    /// Columns compared for equality in this expression's AND chain, in
    /// order.
    pub fn equality_columns(&self) -> Vec<&str> {
        let mut operands = Vec::new();
        self.collect_operands(BinaryOp::And, &mut operands);
        operands
            .into_iter()
            .filter_map(|e| match e {
                Expr::Binary {
                    left,
                    op: BinaryOp::Eq,
                    ..
                } => match left.as_ref() {
                    Expr::Column(name) => Some(name.as_str()),
                    _ => None,
                },
                _ => None,
            })
            .collect()
    }

    // ==================== SQL Generation ====================

    /// Build SQL text for this expression.
    pub fn build(&self) -> String {
        match self {
            Expr::Column(name) => name.clone(),
            Expr::Literal(value) => literal(value),
            Expr::Binary {
                left,
                op: BinaryOp::And,
                right,
            } => {
                let mut operands = Vec::new();
                left.collect_operands(BinaryOp::And, &mut operands);
                right.collect_operands(BinaryOp::And, &mut operands);
                let joined = operands
                    .iter()
                    .map(|e| e.build())
                    .collect::<Vec<_>>()
                    .join(" AND ");
                format!("({joined})")
            }
            Expr::Binary {
                left,
                op: BinaryOp::Eq,
                right,
            } => match right.as_ref() {
                Expr::Literal(Value::Null) => format!("({} IS NULL)", left.build()),
                _ => format!("({} = {})", left.build(), right.build()),
            },
        }
    }

    /// Flatten a chain of the same logical operator so `a AND b AND c`
    /// renders with one set of parentheses.
    fn collect_operands<'a>(&'a self, op: BinaryOp, out: &mut Vec<&'a Expr>) {
        match self {
            Expr::Binary {
                left,
                op: inner,
                right,
            } if *inner == op => {
                left.collect_operands(op, out);
                right.collect_operands(op, out);
            }
            other => out.push(other),
        }
    }
}

/// Render a value as an inline SQL literal.
///
/// ```
/// use rowmodel_query::expr::literal;
/// use rowmodel_core::Value;
///
/// assert_eq!(literal(&Value::from("it's")), "'it''s'");
/// assert_eq!(literal(&Value::from(1.0)), "1.0");
/// assert_eq!(literal(&Value::Null), "NULL");
/// ```
pub fn literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "'t'".to_string(),
        Value::Bool(false) => "'f'".to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Float(f) => format_float(*f),
        Value::Decimal(d) => d.clone(),
        Value::Text(s) => quote(s),
        Value::Bytes(bytes) => {
            let mut hex = String::with_capacity(bytes.len() * 2 + 3);
            hex.push_str("X'");
            for b in bytes {
                let _ = write!(hex, "{b:02x}");
            }
            hex.push('\'');
            hex
        }
        Value::Date(d) => format!("'{}'", d.format("%Y-%m-%d")),
        Value::Time(t) => format!("'{}'", t.format("%H:%M:%S%.f")),
        Value::Timestamp(ts) => format!("'{}'", ts.format("%Y-%m-%d %H:%M:%S%.f")),
        Value::TimestampTz(ts) => format!("'{}'", ts.format("%Y-%m-%d %H:%M:%S%.f%:z")),
        Value::Json(j) => quote(&j.to_string()),
        Value::Array(items) => {
            let inner: Vec<_> = items.iter().map(literal).collect();
            format!("({})", inner.join(", "))
        }
        Value::Map(_) => quote(&value.to_string()),
    }
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

// Conversion into Expr
impl From<Value> for Expr {
    fn from(v: Value) -> Self {
        Expr::Literal(v)
    }
}

impl From<&str> for Expr {
    fn from(s: &str) -> Self {
        Expr::Literal(Value::Text(s.to_string()))
    }
}

impl From<i32> for Expr {
    fn from(n: i32) -> Self {
        Expr::Literal(Value::from(n))
    }
}

impl From<i64> for Expr {
    fn from(n: i64) -> Self {
        Expr::Literal(Value::Integer(n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};

    // ==================== Comparison Tests ====================

    #[test]
    fn test_eq_is_parenthesized() {
        assert_eq!(Expr::col("id").eq(3).build(), "(id = 3)");
        assert_eq!(Expr::col("name").eq("a").build(), "(name = 'a')");
    }

    #[test]
    fn test_eq_null_renders_is_null() {
        assert_eq!(Expr::col("id").eq(Value::Null).build(), "(id IS NULL)");
    }

    // ==================== Logical Tests ====================

    #[test]
    fn test_and_chain_is_flat() {
        let expr = Expr::col("x").eq(4).and(Expr::col("y").eq(5));
        assert_eq!(expr.build(), "((x = 4) AND (y = 5))");

        let three = Expr::matching([("a", 1), ("b", 2), ("c", 3)]).unwrap();
        assert_eq!(three.build(), "((a = 1) AND (b = 2) AND (c = 3))");
    }

    #[test]
    fn test_equality_columns_follow_and_chain() {
        let three = Expr::matching([("a", 1), ("b", 2), ("c", 3)]).unwrap();
        assert_eq!(three.equality_columns(), ["a", "b", "c"]);
        assert_eq!(Expr::col("id").eq(Value::Null).equality_columns(), ["id"]);
        assert!(Expr::col("id").equality_columns().is_empty());
    }

    #[test]
    fn test_matching_single_and_empty() {
        assert_eq!(Expr::matching([("id", 1)]).unwrap().build(), "(id = 1)");
        assert!(Expr::matching(Vec::<(&str, Value)>::new()).is_none());
    }

    // ==================== Literal Tests ====================

    #[test]
    fn test_literals() {
        assert_eq!(literal(&Value::Bool(true)), "'t'");
        assert_eq!(literal(&Value::Bool(false)), "'f'");
        assert_eq!(literal(&Value::from(-7)), "-7");
        assert_eq!(literal(&Value::from(1.3)), "1.3");
        assert_eq!(literal(&Value::Decimal("1.5".into())), "1.5");
        assert_eq!(literal(&Value::from(vec![0xde_u8, 0xad])), "X'dead'");
        assert_eq!(
            literal(&Value::Array(vec![Value::from(1), Value::from("a")])),
            "(1, 'a')"
        );
    }

    #[test]
    fn test_temporal_literals() {
        let date = NaiveDate::from_ymd_opt(2007, 10, 21).unwrap();
        let time = NaiveTime::from_hms_opt(10, 20, 30).unwrap();
        assert_eq!(literal(&Value::from(date)), "'2007-10-21'");
        assert_eq!(literal(&Value::from(time)), "'10:20:30'");
        assert_eq!(
            literal(&Value::from(date.and_time(time))),
            "'2007-10-21 10:20:30'"
        );
    }
}
