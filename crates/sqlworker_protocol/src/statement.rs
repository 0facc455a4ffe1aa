//! Statements and result sets.

use crate::value::Value;
use serde::{Deserialize, Serialize};

/// How the engine returns rows for a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// Execute and return no rows.
    Run,
    /// Return every row.
    #[default]
    All,
    /// Return every row as positional values.
    Values,
    /// Return only the first row.
    Get,
}

/// One SQL statement with positional parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    /// SQL text. May hold several statements; see the engine for rules.
    pub sql: String,
    /// Positional parameters bound to `?` placeholders.
    pub params: Vec<Value>,
    /// Row return method.
    pub method: Method,
}

impl Statement {
    /// Creates a statement with no parameters.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
            method: Method::All,
        }
    }

    /// Appends one positional parameter.
    #[must_use]
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }

    /// Replaces all parameters.
    #[must_use]
    pub fn with_params(mut self, params: Vec<Value>) -> Self {
        self.params = params;
        self
    }

    /// Sets the row return method.
    #[must_use]
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }
}

impl From<&str> for Statement {
    fn from(sql: &str) -> Self {
        Statement::new(sql)
    }
}

impl From<String> for Statement {
    fn from(sql: String) -> Self {
        Statement::new(sql)
    }
}

/// Columns and rows produced by one statement.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResultSet {
    /// Column names in select order.
    pub columns: Vec<String>,
    /// Rows; each has one value per column.
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    /// Creates an empty, well-formed result.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns true if there are no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns the index of a column by name.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Returns a view over row `index`.
    #[must_use]
    pub fn record(&self, index: usize) -> Option<Record<'_>> {
        self.rows.get(index).map(|values| Record {
            columns: &self.columns,
            values,
        })
    }

    /// Iterates rows as named records.
    pub fn records(&self) -> impl Iterator<Item = Record<'_>> + '_ {
        self.rows.iter().map(move |values| Record {
            columns: &self.columns,
            values,
        })
    }

    /// Collects one column across all rows.
    #[must_use]
    pub fn column(&self, name: &str) -> Vec<Value> {
        match self.column_index(name) {
            Some(idx) => self
                .rows
                .iter()
                .map(|row| row.get(idx).cloned().unwrap_or(Value::Null))
                .collect(),
            None => Vec::new(),
        }
    }
}

/// A row viewed by column name.
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    columns: &'a [String],
    values: &'a [Value],
}

impl<'a> Record<'a> {
    /// Returns the value of a column by name.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&'a Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|idx| self.values.get(idx))
    }

    /// Returns the positional values.
    #[must_use]
    pub fn values(&self) -> &'a [Value] {
        self.values
    }

    /// Iterates `(column, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a Value)> + 'a {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn groceries() -> ResultSet {
        ResultSet {
            columns: vec!["id".into(), "name".into()],
            rows: vec![
                vec![Value::Integer(1), Value::Text("bread".into())],
                vec![Value::Integer(2), Value::Text("milk".into())],
            ],
        }
    }

    #[test]
    fn statement_builder() {
        let stmt = Statement::new("SELECT * FROM t WHERE id = ?")
            .bind(5i64)
            .with_method(Method::Get);
        assert_eq!(stmt.params, vec![Value::Integer(5)]);
        assert_eq!(stmt.method, Method::Get);
        assert_eq!(Statement::new("x").method, Method::All);
    }

    #[test]
    fn records_by_name() {
        let rs = groceries();
        let names: Vec<_> = rs
            .records()
            .map(|r| r.get("name").and_then(Value::as_str).unwrap().to_string())
            .collect();
        assert_eq!(names, ["bread", "milk"]);
        assert_eq!(rs.record(1).unwrap().get("id"), Some(&Value::Integer(2)));
        assert!(rs.record(1).unwrap().get("missing").is_none());
        assert!(rs.record(2).is_none());
    }

    #[test]
    fn column_projection() {
        let rs = groceries();
        assert_eq!(rs.column("id"), vec![Value::Integer(1), Value::Integer(2)]);
        assert!(rs.column("nope").is_empty());
    }

    #[test]
    fn empty_is_well_formed() {
        let rs = ResultSet::empty();
        assert!(rs.is_empty());
        assert!(rs.columns.is_empty());
        assert_eq!(rs.records().count(), 0);
    }
}
