//! CRM entity types

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Every list/detail response is wrapped in `{ "data": ... }`
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
}

/// A sales lead as returned by the CRM
///
/// Keys the CRM sends that are not modelled here (`cf_*` custom fields,
/// `tabs`, ...) are kept verbatim in `custom_fields`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: i64,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub pipeline_id: i64,

    #[serde(default)]
    pub stages_id: i64,

    #[serde(default)]
    pub user_id: Option<i64>,

    /// Monetary budget as the CRM renders it, usually a decimal string
    #[serde(default, deserialize_with = "lenient_string")]
    pub budget: String,

    /// When the lead entered its current stage (unix seconds)
    #[serde(default)]
    pub arrived_stage_at: Option<i64>,

    #[serde(default)]
    pub contacts: Vec<Contact>,

    #[serde(default)]
    pub companies: Vec<Company>,

    #[serde(flatten)]
    pub custom_fields: Map<String, Value>,
}

impl Lead {
    /// View of the whole lead as a JSON tree, for path lookups
    pub fn as_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: i64,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub id: i64,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Accept a string, a number or null and keep it as a string
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    })
}
