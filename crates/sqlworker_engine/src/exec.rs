//! Statement execution.

use crate::convert::{from_sql, to_sql};
use crate::error::{WorkerError, WorkerResult};
use rusqlite::fallible_iterator::FallibleIterator;
use rusqlite::{params_from_iter, Batch, Connection};
use sqlworker_protocol::{Method, ResultSet, Statement, Value};
use tracing::debug;

/// Runs every SQL statement in `statement.sql` in order and returns the
/// result set of the last one.
///
/// At most one statement may declare parameters; it receives
/// `statement.params`, the others run without bindings.
pub(crate) fn run_statement(
    conn: &Connection,
    statement: &Statement,
    verbose: bool,
) -> WorkerResult<ResultSet> {
    if verbose {
        debug!(sql = %statement.sql, params = statement.params.len(), "executing");
    }

    let mut batch = Batch::new(conn, &statement.sql);
    let mut bound = false;
    let mut last = ResultSet::empty();

    while let Some(mut prepared) = batch.next()? {
        let params: &[Value] = if prepared.parameter_count() > 0 {
            if bound {
                return Err(WorkerError::MultipleParameterized);
            }
            bound = true;
            &statement.params
        } else {
            &[]
        };
        last = collect(&mut prepared, params, statement.method)?;
    }

    if !bound && !statement.params.is_empty() {
        return Err(WorkerError::UnusedParameters);
    }
    Ok(last)
}

fn collect(
    prepared: &mut rusqlite::Statement<'_>,
    params: &[Value],
    method: Method,
) -> WorkerResult<ResultSet> {
    let columns: Vec<String> = prepared
        .column_names()
        .into_iter()
        .map(String::from)
        .collect();
    let width = columns.len();

    let mut rows = prepared.query(params_from_iter(params.iter().map(to_sql)))?;
    let mut out: Vec<Vec<Value>> = Vec::new();

    // Step to the end even when rows are discarded so every side effect of
    // the statement (e.g. `INSERT ... RETURNING`) is applied.
    while let Some(row) = rows.next()? {
        let keep = match method {
            Method::Run => false,
            Method::Get => out.is_empty(),
            Method::All | Method::Values => true,
        };
        if !keep {
            continue;
        }
        let mut values = Vec::with_capacity(width);
        for idx in 0..width {
            values.push(from_sql(row.get_ref(idx)?));
        }
        out.push(values);
    }

    Ok(ResultSet { columns, rows: out })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn groceries() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE groceries (id INTEGER PRIMARY KEY, name TEXT NOT NULL, qty INTEGER);",
        )
        .unwrap();
        conn
    }

    #[test]
    fn select_returns_columns_and_rows() {
        let conn = groceries();
        conn.execute_batch("INSERT INTO groceries (name, qty) VALUES ('bread', 1), ('eggs', 12);")
            .unwrap();

        let result = run_statement(
            &conn,
            &Statement::new("SELECT name, qty FROM groceries ORDER BY id"),
            false,
        )
        .unwrap();

        assert_eq!(result.columns, vec!["name", "qty"]);
        assert_eq!(result.len(), 2);
        assert_eq!(result.rows[1], vec![Value::from("eggs"), Value::Integer(12)]);
    }

    #[test]
    fn returning_reports_generated_ids() {
        let conn = groceries();
        let insert = Statement::new("INSERT INTO groceries (name) VALUES (?), (?) RETURNING id")
            .bind("milk")
            .bind("tea");

        let result = run_statement(&conn, &insert, false).unwrap();
        assert_eq!(
            result.rows,
            vec![vec![Value::Integer(1)], vec![Value::Integer(2)]]
        );
    }

    #[test]
    fn multi_statement_returns_last_result() {
        let conn = groceries();
        let sql = "INSERT INTO groceries (name) VALUES ('a'); \
                   INSERT INTO groceries (name) VALUES ('b'); \
                   SELECT count(*) AS n FROM groceries";

        let result = run_statement(&conn, &Statement::new(sql), false).unwrap();
        assert_eq!(result.columns, vec!["n"]);
        assert_eq!(result.rows, vec![vec![Value::Integer(2)]]);
    }

    #[test]
    fn one_parameterized_statement_receives_params() {
        let conn = groceries();
        let sql = "INSERT INTO groceries (name) VALUES ('plain'); \
                   INSERT INTO groceries (name, qty) VALUES (?, ?); \
                   SELECT name, qty FROM groceries WHERE qty IS NOT NULL";
        let statement = Statement::new(sql).bind("apples").bind(3);

        let result = run_statement(&conn, &statement, false).unwrap();
        assert_eq!(result.rows, vec![vec![Value::from("apples"), Value::Integer(3)]]);
    }

    #[test]
    fn two_parameterized_statements_are_rejected() {
        let conn = groceries();
        let sql = "INSERT INTO groceries (name) VALUES (?); \
                   INSERT INTO groceries (name) VALUES (?)";
        let statement = Statement::new(sql).bind("a");

        let err = run_statement(&conn, &statement, false).unwrap_err();
        assert!(matches!(err, WorkerError::MultipleParameterized));
    }

    #[test]
    fn params_without_placeholders_are_rejected() {
        let conn = groceries();
        let statement = Statement::new("SELECT 1").bind(5);

        let err = run_statement(&conn, &statement, false).unwrap_err();
        assert!(matches!(err, WorkerError::UnusedParameters));
    }

    #[test]
    fn get_keeps_first_row_only() {
        let conn = groceries();
        conn.execute_batch("INSERT INTO groceries (name) VALUES ('x'), ('y');")
            .unwrap();

        let result = run_statement(
            &conn,
            &Statement::new("SELECT name FROM groceries ORDER BY id").with_method(Method::Get),
            false,
        )
        .unwrap();
        assert_eq!(result.rows, vec![vec![Value::from("x")]]);
    }

    #[test]
    fn run_discards_rows_but_applies_changes() {
        let conn = groceries();
        let insert = Statement::new("INSERT INTO groceries (name) VALUES ('z') RETURNING id")
            .with_method(Method::Run);

        let result = run_statement(&conn, &insert, false).unwrap();
        assert!(result.is_empty());

        let count: i64 = conn
            .query_row("SELECT count(*) FROM groceries", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn empty_sql_yields_empty_result() {
        let conn = groceries();
        let result = run_statement(&conn, &Statement::new("  ;  "), false).unwrap();
        assert!(result.is_empty());
        assert!(result.columns.is_empty());
    }

    #[test]
    fn syntax_errors_surface_as_sqlite_errors() {
        let conn = groceries();
        let err = run_statement(&conn, &Statement::new("SELEC nope"), false).unwrap_err();
        assert!(matches!(err, WorkerError::Sqlite(_)));
    }
}
