use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;

pub const DEFAULT_TENANT_ID: i64 = 1;
pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default, alias = "tenant_id")]
    pub company_id: Option<i64>,
    #[serde(default, alias = "session_token")]
    pub thread_id: Option<String>,
}

impl ChatRequest {
    pub fn tenant_id(&self) -> i64 {
        self.company_id.unwrap_or(DEFAULT_TENANT_ID)
    }
}

/// Value tree returned by the engines. Decimal and temporal leaves are kept
/// typed until the response is serialized.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Timestamp(DateTime<FixedOffset>),
    Text(String),
    List(Vec<EngineValue>),
    Map(BTreeMap<String, EngineValue>),
}

impl EngineValue {
    /// Decodes the engine wire form. Typed leaves travel as single-key objects:
    /// `{"$decimal": "1.50"}`, `{"$date": "2024-01-31"}`, `{"$datetime": "..."}`.
    pub fn from_wire(value: Value) -> Result<Self, String> {
        Ok(match value {
            Value::Null => EngineValue::Null,
            Value::Bool(v) => EngineValue::Bool(v),
            Value::Number(n) => match n.as_i64() {
                Some(v) => EngineValue::Int(v),
                None => EngineValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(v) => EngineValue::Text(v),
            Value::Array(items) => EngineValue::List(
                items
                    .into_iter()
                    .map(EngineValue::from_wire)
                    .collect::<Result<_, _>>()?,
            ),
            Value::Object(map) => {
                if map.len() == 1 {
                    if let Some((tag, Value::String(raw))) = map.iter().next() {
                        if let Some(typed) = typed_leaf(tag, raw)? {
                            return Ok(typed);
                        }
                    }
                }
                EngineValue::Map(
                    map.into_iter()
                        .map(|(k, v)| EngineValue::from_wire(v).map(|v| (k, v)))
                        .collect::<Result<_, _>>()?,
                )
            }
        })
    }

    /// Null, an empty sequence, an empty mapping or empty text.
    pub fn is_empty(&self) -> bool {
        match self {
            EngineValue::Null => true,
            EngineValue::Text(v) => v.is_empty(),
            EngineValue::List(v) => v.is_empty(),
            EngineValue::Map(v) => v.is_empty(),
            _ => false,
        }
    }
}

fn typed_leaf(tag: &str, raw: &str) -> Result<Option<EngineValue>, String> {
    match tag {
        "$decimal" => Decimal::from_str(raw)
            .or_else(|_| Decimal::from_scientific(raw))
            .map(|v| Some(EngineValue::Decimal(v)))
            .map_err(|e| format!("invalid $decimal {raw:?}: {e}")),
        "$date" => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(|v| Some(EngineValue::Date(v)))
            .map_err(|e| format!("invalid $date {raw:?}: {e}")),
        "$datetime" => {
            if let Ok(v) = DateTime::parse_from_rfc3339(raw) {
                return Ok(Some(EngineValue::Timestamp(v)));
            }
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
                .map(|v| Some(EngineValue::DateTime(v)))
                .map_err(|e| format!("invalid $datetime {raw:?}: {e}"))
        }
        _ => Ok(None),
    }
}

impl<'de> Deserialize<'de> for EngineValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        EngineValue::from_wire(value).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineResult {
    #[serde(default)]
    pub natural_response: Option<String>,
    #[serde(default)]
    pub sql_query: Option<String>,
    #[serde(default)]
    pub results: Option<EngineValue>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub summary_text: Option<String>,
    #[serde(default, alias = "thread_id")]
    pub session_token: Option<String>,
    #[serde(default, deserialize_with = "null_as_false")]
    pub is_clarification: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChartResult {
    #[serde(default)]
    pub sql_query: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub chart_config: Option<EngineValue>,
    #[serde(default)]
    pub results: Option<EngineValue>,
}

fn null_as_false<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedResponse {
    pub message: String,
    pub natural_response: String,
    pub summary_text: String,
    pub sql: String,
    pub error: Option<String>,
    #[serde(rename = "company_id")]
    pub tenant_id: i64,
    #[serde(rename = "thread_id")]
    pub session_token: Option<String>,
    pub is_clarification: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartResponse {
    pub sql: String,
    pub error: Option<String>,
    pub chart_config: Option<Value>,
    pub results: Option<Value>,
    pub company_id: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    ChatQuery,
    ChartGeneration,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditStatus {
    Success,
    ClarificationNeeded,
    Error,
    Failure,
}

impl AuditStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditStatus::Success => "SUCCESS",
            AuditStatus::ClarificationNeeded => "CLARIFICATION_NEEDED",
            AuditStatus::Error => "ERROR",
            AuditStatus::Failure => "FAILURE",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogsResponse {
    pub logs: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}
