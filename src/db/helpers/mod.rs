use rusqlite::types::{Value as SqlValue, ValueRef};
use serde_json::{Number, Value as JsonValue};

/// Converts a JSON scalar into a bindable SQL value.
pub fn json_to_sql(value: &JsonValue) -> Option<SqlValue> {
    match value {
        JsonValue::String(text) => Some(SqlValue::Text(text.clone())),
        JsonValue::Bool(flag) => Some(SqlValue::Integer(i64::from(*flag))),
        JsonValue::Number(number) => match number.as_i64() {
            Some(int) => Some(SqlValue::Integer(int)),
            None => number.as_f64().map(SqlValue::Real),
        },
        JsonValue::Null | JsonValue::Array(_) | JsonValue::Object(_) => None,
    }
}

/// Converts a result cell into JSON. Non-finite reals become null.
pub fn sql_to_json(value: ValueRef<'_>) -> JsonValue {
    match value {
        ValueRef::Null => JsonValue::Null,
        ValueRef::Integer(int) => JsonValue::from(int),
        ValueRef::Real(real) => Number::from_f64(real)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            JsonValue::String(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

/// Renders an error with its full context chain on one line.
pub fn describe(err: &anyhow::Error) -> String {
    format!("{err:#}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_scalars_bind() {
        assert_eq!(json_to_sql(&json!("F")), Some(SqlValue::Text("F".into())));
        assert_eq!(json_to_sql(&json!(30)), Some(SqlValue::Integer(30)));
        assert_eq!(json_to_sql(&json!(2.5)), Some(SqlValue::Real(2.5)));
        assert_eq!(json_to_sql(&json!(true)), Some(SqlValue::Integer(1)));
        assert_eq!(json_to_sql(&json!(null)), None);
        assert_eq!(json_to_sql(&json!([1])), None);
    }

    #[test]
    fn cells_marshal() {
        assert_eq!(sql_to_json(ValueRef::Null), JsonValue::Null);
        assert_eq!(sql_to_json(ValueRef::Integer(7)), json!(7));
        assert_eq!(sql_to_json(ValueRef::Real(1.5)), json!(1.5));
        assert_eq!(sql_to_json(ValueRef::Real(f64::NAN)), JsonValue::Null);
        assert_eq!(sql_to_json(ValueRef::Text(b"WA")), json!("WA"));
    }
}
