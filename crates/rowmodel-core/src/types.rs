//! Column type descriptors consulted by the typecasting layer.

use indexmap::IndexMap;

/// Declared type of a column, as reported by the schema metadata provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Float,
    Decimal,
    Boolean,
    String,
    Blob,
    Date,
    Time,
    DateTime,
    /// A type the typecasting layer does not know; values pass through.
    Other,
}

impl ColumnType {
    /// Get the type name used in error messages.
    pub const fn name(&self) -> &'static str {
        match self {
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Decimal => "decimal",
            ColumnType::Boolean => "boolean",
            ColumnType::String => "string",
            ColumnType::Blob => "blob",
            ColumnType::Date => "date",
            ColumnType::Time => "time",
            ColumnType::DateTime => "datetime",
            ColumnType::Other => "other",
        }
    }

    /// String and blob columns keep the empty string as a real value.
    pub const fn keeps_empty_string(&self) -> bool {
        matches!(self, ColumnType::String | ColumnType::Blob)
    }

    /// Map a database type name to a column type.
    pub fn from_sql_name(name: &str) -> Self {
        let lower = name.trim().to_ascii_lowercase();
        let base = lower.split('(').next().unwrap_or("").trim();
        match base {
            "integer" | "int" | "bigint" | "smallint" | "tinyint" | "serial" | "bigserial" => {
                ColumnType::Integer
            }
            "float" | "real" | "double" | "double precision" => ColumnType::Float,
            "decimal" | "numeric" => ColumnType::Decimal,
            "boolean" | "bool" => ColumnType::Boolean,
            "varchar" | "char" | "text" | "string" | "character varying" => ColumnType::String,
            "blob" | "bytea" | "binary" | "varbinary" => ColumnType::Blob,
            "date" => ColumnType::Date,
            "time" => ColumnType::Time,
            "datetime" | "timestamp" | "timestamptz" => ColumnType::DateTime,
            _ => ColumnType::Other,
        }
    }
}

/// Schema entry for one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSchema {
    pub ty: ColumnType,
    /// `None` means nullability is unknown and NULL is accepted.
    pub allow_null: Option<bool>,
}

impl ColumnSchema {
    pub const fn new(ty: ColumnType) -> Self {
        Self {
            ty,
            allow_null: None,
        }
    }

    pub const fn nullable(mut self, allow_null: bool) -> Self {
        self.allow_null = Some(allow_null);
        self
    }

    /// True only when the schema explicitly forbids NULL.
    pub const fn rejects_null(&self) -> bool {
        matches!(self.allow_null, Some(false))
    }
}

/// Ordered column name to schema mapping for one table.
pub type DbSchema = IndexMap<String, ColumnSchema>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sql_names_map_to_column_types() {
        assert_eq!(ColumnType::from_sql_name("INTEGER"), ColumnType::Integer);
        assert_eq!(ColumnType::from_sql_name("varchar(255)"), ColumnType::String);
        assert_eq!(ColumnType::from_sql_name("numeric(10, 2)"), ColumnType::Decimal);
        assert_eq!(ColumnType::from_sql_name("timestamp"), ColumnType::DateTime);
        assert_eq!(ColumnType::from_sql_name("point"), ColumnType::Other);
    }

    #[test]
    fn nullability_defaults_to_unknown() {
        let schema = ColumnSchema::new(ColumnType::Integer);
        assert!(!schema.rejects_null());
        assert!(schema.nullable(false).rejects_null());
        assert!(!schema.nullable(true).rejects_null());
    }

    #[test]
    fn only_string_and_blob_keep_empty_strings() {
        assert!(ColumnType::String.keeps_empty_string());
        assert!(ColumnType::Blob.keeps_empty_string());
        assert!(!ColumnType::Integer.keeps_empty_string());
        assert!(!ColumnType::Boolean.keeps_empty_string());
    }
}
