//! Conversions between protocol values and SQLite values.

use rusqlite::types::{Value as SqlValue, ValueRef};
use sqlworker_protocol::Value;

pub(crate) fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Integer(i) => SqlValue::Integer(*i),
        Value::Real(f) => SqlValue::Real(*f),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Blob(b) => SqlValue::Blob(b.clone()),
    }
}

pub(crate) fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Real(f),
        ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Blob(bytes.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rusqlite::Connection;

    fn arb_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<i64>().prop_map(Value::Integer),
            // NaN does not survive SQLite (it becomes NULL)
            any::<f64>()
                .prop_filter("finite", |f| f.is_finite())
                .prop_map(Value::Real),
            ".{0,16}".prop_map(Value::Text),
            proptest::collection::vec(any::<u8>(), 0..16).prop_map(Value::Blob),
        ]
    }

    proptest! {
        #[test]
        fn values_survive_sqlite(value in arb_value()) {
            let conn = Connection::open_in_memory().unwrap();
            let back = conn
                .query_row("SELECT ?", [to_sql(&value)], |row| Ok(from_sql(row.get_ref(0)?)))
                .unwrap();
            prop_assert_eq!(back, value);
        }
    }
}
