use chrono::NaiveDate;
use reqwest::Method;

use super::client::{optional, ApiClient};
use crate::error::ApiError;
use crate::kitchen::order::{NewOrder, Order, OrderId, OrderStatus};

const ORDERS_PATH: &str = "/api/pedidos";

/// REST access to orders on the backend of record.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    api: ApiClient,
}

impl OrderRepository {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub async fn create(&self, order: &NewOrder) -> Result<Order, ApiError> {
        let created: Order = self
            .api
            .send_json(Method::POST, ORDERS_PATH, Some(order))
            .await?;
        tracing::info!("created order {} for table {}", created.id, created.table);
        Ok(created)
    }

    pub async fn list(&self) -> Result<Vec<Order>, ApiError> {
        self.api.get_json(ORDERS_PATH).await
    }

    /// `None` when the backend has no order with this id.
    pub async fn get(&self, id: &OrderId) -> Result<Option<Order>, ApiError> {
        optional(self.api.get_json(&order_path(id)).await)
    }

    pub async fn for_table(&self, table: &str) -> Result<Vec<Order>, ApiError> {
        let path = format!("{ORDERS_PATH}/mesa/{}", urlencoding::encode(table));
        self.api.get_json(&path).await
    }

    pub async fn active(&self) -> Result<Vec<Order>, ApiError> {
        self.api.get_json(&format!("{ORDERS_PATH}/activos")).await
    }

    /// Orders placed on `day`. The backend has no date filter, so this
    /// filters the full list locally; orders without a timestamp are skipped.
    pub async fn for_day(&self, day: NaiveDate) -> Result<Vec<Order>, ApiError> {
        let orders = self.list().await?;
        Ok(orders
            .into_iter()
            .filter(|order| order.created_on(day))
            .collect())
    }

    pub async fn update(&self, id: &OrderId, order: &Order) -> Result<Order, ApiError> {
        self.api
            .send_json(Method::PUT, &order_path(id), Some(order))
            .await
    }

    pub async fn mark_billed(&self, id: &OrderId) -> Result<Order, ApiError> {
        let path = format!("{}/facturar", order_path(id));
        self.api.send_json::<(), _>(Method::PUT, &path, None).await
    }

    pub async fn update_status(&self, id: &OrderId, status: OrderStatus) -> Result<Order, ApiError> {
        let path = format!("{}/estado?estado={}", order_path(id), status.as_wire());
        self.api.send_json::<(), _>(Method::PUT, &path, None).await
    }

    pub async fn delete(&self, id: &OrderId) -> Result<(), ApiError> {
        self.api.send_empty(Method::DELETE, &order_path(id)).await
    }
}

fn order_path(id: &OrderId) -> String {
    format!("{ORDERS_PATH}/{}", urlencoding::encode(&id.to_string()))
}
