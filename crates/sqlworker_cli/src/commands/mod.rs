//! CLI command implementations.

pub mod batch;
pub mod delete;
pub mod exec;
pub mod export;
pub mod import;
pub mod info;

use sqlworker_client::{ResultSet, Value};

/// Parses a command-line parameter into a SQL value.
///
/// `null` maps to `NULL`, `x'0aff'` to a blob; anything that parses as an
/// integer or real becomes one, the rest is text.
pub fn parse_value(raw: &str) -> Result<Value, String> {
    if raw.eq_ignore_ascii_case("null") {
        return Ok(Value::Null);
    }
    if let Some(digits) = raw
        .strip_prefix("x'")
        .or_else(|| raw.strip_prefix("X'"))
        .and_then(|rest| rest.strip_suffix('\''))
    {
        return hex::decode(digits)
            .map(Value::Blob)
            .map_err(|_| format!("invalid blob literal: x'{digits}'"));
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Ok(Value::Integer(i));
    }
    if let Ok(f) = raw.parse::<f64>() {
        return Ok(Value::Real(f));
    }
    Ok(Value::Text(raw.to_string()))
}

/// Renders a value the way the text output shows it.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Blob(bytes) => format!("x'{}'", hex::encode(bytes)),
        other => other.to_string(),
    }
}

/// Prints a result as an aligned text table.
pub fn print_table(result: &ResultSet) {
    if result.columns.is_empty() {
        println!("(no rows)");
        return;
    }

    let cells: Vec<Vec<String>> = result
        .rows
        .iter()
        .map(|row| row.iter().map(display_value).collect())
        .collect();

    let mut widths: Vec<usize> = result.columns.iter().map(String::len).collect();
    for row in &cells {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let line = |values: &[String]| {
        values
            .iter()
            .zip(&widths)
            .map(|(v, w)| format!("{v:<w$}"))
            .collect::<Vec<_>>()
            .join(" | ")
    };

    println!("{}", line(&result.columns));
    println!(
        "{}",
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-")
    );
    for row in &cells {
        println!("{}", line(row));
    }
    println!("({} row{})", cells.len(), if cells.len() == 1 { "" } else { "s" });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_parameters() {
        assert_eq!(parse_value("NULL").unwrap(), Value::Null);
        assert_eq!(parse_value("42").unwrap(), Value::Integer(42));
        assert_eq!(parse_value("-1.5").unwrap(), Value::Real(-1.5));
        assert_eq!(parse_value("bread").unwrap(), Value::from("bread"));
        assert_eq!(
            parse_value("x'00ff'").unwrap(),
            Value::Blob(vec![0x00, 0xff])
        );
    }

    #[test]
    fn rejects_bad_blob_literals() {
        assert!(parse_value("x'abc'").is_err());
        assert!(parse_value("x'zz'").is_err());
    }

    #[test]
    fn displays_values() {
        assert_eq!(display_value(&Value::Null), "NULL");
        assert_eq!(display_value(&Value::Blob(vec![1, 171])), "x'01ab'");
        assert_eq!(display_value(&Value::Integer(7)), "7");
    }
}
