/// Records, Bind Parameters and Identifiers
///
/// Input types for the data operations. Values are always bound to
/// placeholders; table and column names are always quoted. Nothing the caller
/// passes in is spliced into SQL text unquoted.

use crate::core::{DbError, Result};
use rusqlite::Statement;
use std::collections::BTreeMap;

pub use rusqlite::types::Value;

/// A row to insert: column name mapped to value.
///
/// Columns are kept in name order so that two records with the same column
/// set always produce the same column list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    values: BTreeMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Record::default()
    }

    /// Builder-style setter.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    /// Sets a column, returning the previous value if there was one.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(column.into(), value.into())
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.values.values()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// True when both records have exactly the same columns.
    pub fn same_columns(&self, other: &Record) -> bool {
        self.values.keys().eq(other.values.keys())
    }
}

impl From<BTreeMap<String, Value>> for Record {
    fn from(values: BTreeMap<String, Value>) -> Self {
        Record { values }
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Record {
            values: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Bind parameters for `execute_query`.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Params {
    /// The statement takes no parameters
    #[default]
    None,
    /// Values for `?` / `?N` placeholders, in order
    Positional(Vec<Value>),
    /// Values for `:name`, `@name` or `$name` placeholders
    Named(Vec<(String, Value)>),
}

impl Params {
    pub fn positional<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Params::Positional(values.into_iter().map(Into::into).collect())
    }

    pub fn named<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Params::Named(values.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    pub fn len(&self) -> usize {
        match self {
            Params::None => 0,
            Params::Positional(values) => values.len(),
            Params::Named(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Binds these parameters to a prepared statement.
    ///
    /// The statement must expect exactly as many parameters as are supplied,
    /// and every named parameter must exist in the statement. A name given
    /// without its sigil is looked up as `:name`.
    pub(crate) fn bind(&self, stmt: &mut Statement<'_>) -> Result<()> {
        let expected = stmt.parameter_count();
        if expected != self.len() {
            return Err(DbError::InvalidInput(format!(
                "statement expects {} parameters, got {}",
                expected,
                self.len()
            )));
        }

        match self {
            Params::None => {}
            Params::Positional(values) => {
                for (i, value) in values.iter().enumerate() {
                    bind_value(stmt, i + 1, value)?;
                }
            }
            Params::Named(values) => {
                for (name, value) in values {
                    let index = resolve_named(stmt, name)?.ok_or_else(|| {
                        DbError::InvalidInput(format!("statement has no parameter named {}", name))
                    })?;
                    bind_value(stmt, index, value)?;
                }
            }
        }
        Ok(())
    }
}

impl From<Vec<Value>> for Params {
    fn from(values: Vec<Value>) -> Self {
        Params::Positional(values)
    }
}

fn bind_value(stmt: &mut Statement<'_>, index: usize, value: &Value) -> Result<()> {
    stmt.raw_bind_parameter(index, value)
        .map_err(|source| DbError::Query { source })
}

fn resolve_named(stmt: &Statement<'_>, name: &str) -> Result<Option<usize>> {
    let index = if name.starts_with(&[':', '@', '$'][..]) {
        stmt.parameter_index(name)
    } else {
        stmt.parameter_index(&format!(":{}", name))
    };
    index.map_err(|source| DbError::Query { source })
}

/// Quotes a single identifier for use in SQL text.
///
/// Embedded double quotes are doubled, so the result always names exactly
/// one identifier no matter what it contains.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Validates and quotes a column name.
pub fn quote_column(name: &str) -> Result<String> {
    validate_identifier(name, "column")?;
    Ok(quote_identifier(name))
}

/// Validates and quotes a table name, optionally schema-qualified as
/// `schema.table`.
pub fn quote_table(name: &str) -> Result<String> {
    match name.split_once('.') {
        Some((schema, table)) => {
            validate_identifier(schema, "schema")?;
            validate_identifier(table, "table")?;
            Ok(format!("{}.{}", quote_identifier(schema), quote_identifier(table)))
        }
        None => {
            validate_identifier(name, "table")?;
            Ok(quote_identifier(name))
        }
    }
}

fn validate_identifier(name: &str, kind: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(DbError::InvalidInput(format!("empty {} name", kind)));
    }
    if name.contains('\0') {
        return Err(DbError::InvalidInput(format!("{} name contains a NUL byte", kind)));
    }
    Ok(())
}
