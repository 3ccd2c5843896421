use querygate_contracts::EngineValue;
use rust_decimal::prelude::ToPrimitive;
use serde_json::{Map, Number, Value};

/// Converts an engine value tree into plain JSON: decimals become floats,
/// temporal leaves become ISO-8601 strings, containers keep their shape.
pub fn to_json_safe(value: &EngineValue) -> Value {
    match value {
        EngineValue::Null => Value::Null,
        EngineValue::Bool(v) => Value::Bool(*v),
        EngineValue::Int(v) => Value::Number((*v).into()),
        EngineValue::Float(v) => float(*v),
        EngineValue::Decimal(v) => v.to_f64().map(float).unwrap_or(Value::Null),
        EngineValue::Date(v) => Value::String(v.format("%Y-%m-%d").to_string()),
        EngineValue::DateTime(v) => Value::String(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
        EngineValue::Timestamp(v) => Value::String(v.to_rfc3339()),
        EngineValue::Text(v) => Value::String(v.clone()),
        EngineValue::List(items) => Value::Array(items.iter().map(to_json_safe).collect()),
        EngineValue::Map(entries) => Value::Object(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), to_json_safe(v)))
                .collect::<Map<String, Value>>(),
        ),
    }
}

// JSON has no NaN or infinity.
fn float(v: f64) -> Value {
    Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null)
}
