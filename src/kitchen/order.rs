//! Order payloads as pushed by the backend.
//!
//! The backend of record speaks Spanish field names (`mesa`, `detalles`, ...);
//! those are what we serialize. The English camelCase names are accepted on
//! input as aliases. Unknown fields are ignored.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SyncError;

/// Backend-assigned order identity. Opaque: compared, hashed, printed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OrderId {
    Number(i64),
    Text(String),
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderId::Number(n) => write!(f, "{n}"),
            OrderId::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for OrderId {
    fn from(value: i64) -> Self {
        OrderId::Number(value)
    }
}

impl From<&str> for OrderId {
    fn from(value: &str) -> Self {
        OrderId::Text(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    #[serde(rename = "PENDIENTE", alias = "pending")]
    Pending,
    #[serde(rename = "EN_PROCESO", alias = "in_progress")]
    InProgress,
    #[serde(rename = "LISTO", alias = "ready")]
    Ready,
    #[serde(rename = "ENTREGADO", alias = "delivered")]
    Delivered,
    #[serde(rename = "FACTURADO", alias = "billed")]
    Billed,
    #[serde(rename = "CANCELADO", alias = "cancelled")]
    Cancelled,
    #[serde(other, rename = "DESCONOCIDO")]
    Unknown,
}

impl OrderStatus {
    /// Value the backend expects in the `estado` query parameter.
    pub const fn as_wire(&self) -> &'static str {
        match self {
            Self::Pending => "PENDIENTE",
            Self::InProgress => "EN_PROCESO",
            Self::Ready => "LISTO",
            Self::Delivered => "ENTREGADO",
            Self::Billed => "FACTURADO",
            Self::Cancelled => "CANCELADO",
            Self::Unknown => "DESCONOCIDO",
        }
    }

    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::InProgress | Self::Ready)
    }
}

/// Per-line change marker set by the waiter's edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LineStatus {
    #[serde(rename = "NORMAL", alias = "normal")]
    Normal,
    #[serde(rename = "EDITADO", alias = "edited")]
    Edited,
    #[serde(rename = "AGREGADO", alias = "added")]
    Added,
    #[serde(rename = "CANCELADO", alias = "cancelled")]
    Cancelled,
    #[serde(other, rename = "DESCONOCIDO")]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(rename = "plato", alias = "dishName")]
    pub dish_name: String,
    #[serde(
        rename = "cantidad",
        alias = "quantity",
        default = "default_quantity",
        deserialize_with = "quantity_or_default"
    )]
    pub quantity: u32,
    #[serde(rename = "precio", alias = "unitPrice", default, skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<f64>,
    #[serde(rename = "notas", alias = "note", default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(rename = "estado", alias = "statusTag", default, skip_serializing_if = "Option::is_none")]
    pub status_tag: Option<LineStatus>,
}

impl LineItem {
    pub fn new(dish_name: impl Into<String>, quantity: u32) -> Self {
        Self {
            id: None,
            dish_name: dish_name.into(),
            quantity,
            unit_price: None,
            note: None,
            status_tag: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    #[serde(rename = "mesa", alias = "table", deserialize_with = "string_or_number")]
    pub table: String,
    #[serde(
        rename = "hora",
        alias = "createdAt",
        default,
        deserialize_with = "flexible_datetime",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<NaiveDateTime>,
    #[serde(rename = "estado", alias = "status", default, skip_serializing_if = "Option::is_none")]
    pub status: Option<OrderStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
    #[serde(rename = "facturado", alias = "billed", default, deserialize_with = "null_as_false")]
    pub billed: bool,
    #[serde(rename = "detalles", alias = "lineItems", default)]
    pub line_items: Vec<LineItem>,
}

impl Order {
    /// Decode and validate one pushed frame.
    pub fn from_frame(text: &str) -> Result<Self, SyncError> {
        let order: Order = serde_json::from_str(text).map_err(SyncError::malformed)?;
        order.validate()?;
        Ok(order)
    }

    /// Reject orders the kitchen board cannot show.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.line_items.is_empty() {
            return Err(SyncError::MalformedPayload(format!(
                "order {} has no line items",
                self.id
            )));
        }
        if let Some(item) = self.line_items.iter().find(|item| item.quantity == 0) {
            return Err(SyncError::MalformedPayload(format!(
                "order {} has zero quantity for {}",
                self.id, item.dish_name
            )));
        }
        Ok(())
    }

    pub fn created_on(&self, day: NaiveDate) -> bool {
        self.created_at.map(|at| at.date() == day).unwrap_or(false)
    }
}

/// Payload for creating an order; the backend assigns id and timestamp.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewOrder {
    #[serde(rename = "mesa")]
    pub table: String,
    #[serde(rename = "detalles")]
    pub line_items: Vec<LineItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
}

fn default_quantity() -> u32 {
    1
}

fn quantity_or_default<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<u32>::deserialize(deserializer)?.unwrap_or_else(default_quantity))
}

fn null_as_false<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

/// Accepts ISO local date-times, RFC 3339 (converted to UTC) and the
/// `[y, m, d, h, min, s, nanos]` array form some JSON mappers emit.
pub(crate) fn flexible_datetime<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(s) => parse_datetime(&s)
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("invalid timestamp: {s}"))),
        Value::Array(parts) => {
            let nums: Vec<i64> = parts.iter().filter_map(Value::as_i64).collect();
            if nums.len() != parts.len() || nums.len() < 5 {
                return Err(de::Error::custom("invalid timestamp array"));
            }
            let date = NaiveDate::from_ymd_opt(nums[0] as i32, nums[1] as u32, nums[2] as u32);
            let time = date.and_then(|d| {
                d.and_hms_nano_opt(
                    nums[3] as u32,
                    nums[4] as u32,
                    nums.get(5).copied().unwrap_or(0) as u32,
                    nums.get(6).copied().unwrap_or(0) as u32,
                )
            });
            time.map(Some)
                .ok_or_else(|| de::Error::custom("invalid timestamp array"))
        }
        other => Err(de::Error::custom(format!("invalid timestamp: {other}"))),
    }
}

fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    if let Ok(at) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Some(at.naive_utc());
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M"))
        .ok()
}
