use chrono::{NaiveDate, NaiveDateTime};
use reqwest::Method;
use serde::{Deserialize, Deserializer, Serialize};

use super::client::{optional, ApiClient};
use crate::error::ApiError;
use crate::kitchen::order::flexible_datetime;

const REGISTER_PATH: &str = "/api/caja";
const QUERY_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// One business day of the cash register.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(rename = "fecha", default, deserialize_with = "flexible_datetime")]
    pub business_day: Option<NaiveDateTime>,
    #[serde(rename = "abierta", default, deserialize_with = "null_as_false")]
    pub open: bool,
    #[serde(rename = "horaApertura", default, deserialize_with = "flexible_datetime")]
    pub opened_at: Option<NaiveDateTime>,
    #[serde(rename = "horaCierre", default, deserialize_with = "flexible_datetime")]
    pub closed_at: Option<NaiveDateTime>,
    #[serde(rename = "totalVentas", default, deserialize_with = "null_as_zero")]
    pub total_sales: f64,
    #[serde(rename = "observaciones", default)]
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
struct CloseRequest<'a> {
    #[serde(rename = "observaciones")]
    notes: &'a str,
    #[serde(rename = "totalVentas")]
    total_sales: f64,
}

/// REST access to the cash register.
#[derive(Debug, Clone)]
pub struct CashRegister {
    api: ApiClient,
}

impl CashRegister {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub async fn current(&self) -> Result<RegisterState, ApiError> {
        self.api.get_json(&format!("{REGISTER_PATH}/estado")).await
    }

    pub async fn is_open(&self) -> Result<bool, ApiError> {
        self.api.get_json(&format!("{REGISTER_PATH}/abierta")).await
    }

    pub async fn open(&self) -> Result<RegisterState, ApiError> {
        let state: RegisterState = self
            .api
            .send_json::<(), _>(Method::POST, &format!("{REGISTER_PATH}/abrir"), None)
            .await?;
        tracing::info!("cash register opened");
        Ok(state)
    }

    pub async fn close(&self, notes: &str, total_sales: f64) -> Result<RegisterState, ApiError> {
        let state: RegisterState = self
            .api
            .send_json(
                Method::POST,
                &format!("{REGISTER_PATH}/cerrar"),
                Some(&CloseRequest { notes, total_sales }),
            )
            .await?;
        tracing::info!("cash register closed with sales {total_sales:.2}");
        Ok(state)
    }

    pub async fn history(&self) -> Result<Vec<RegisterState>, ApiError> {
        self.api.get_json(&format!("{REGISTER_PATH}/historial")).await
    }

    pub async fn in_range(
        &self,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<Vec<RegisterState>, ApiError> {
        let path = format!(
            "{REGISTER_PATH}/rango?fechaInicio={}&fechaFin={}",
            urlencoding::encode(&from.format(QUERY_DATETIME_FORMAT).to_string()),
            urlencoding::encode(&to.format(QUERY_DATETIME_FORMAT).to_string()),
        );
        self.api.get_json(&path).await
    }

    /// The register for a calendar day, or `None` if it was never opened.
    pub async fn for_day(&self, day: NaiveDate) -> Result<Option<RegisterState>, ApiError> {
        let start = day.and_hms_opt(0, 0, 0).unwrap_or_default();
        let path = format!(
            "{REGISTER_PATH}/fecha/{}",
            urlencoding::encode(&start.format(QUERY_DATETIME_FORMAT).to_string())
        );
        optional(self.api.get_json(&path).await)
    }
}

fn null_as_false<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

fn null_as_zero<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0))
}
