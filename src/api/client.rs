use std::time::Duration;

use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::SyncConfig;
use crate::error::ApiError;

/// Shared HTTP plumbing for the backend's REST resources.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let base_url = base_url.into().trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(ApiError::Request("base url cannot be empty".to_string()));
        }
        Ok(Self {
            base_url,
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|error| ApiError::Request(error.to_string()))?,
        })
    }

    pub fn from_config(config: &SyncConfig) -> Result<Self, ApiError> {
        Self::new(config.base_url(), config.request_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, format!("{}{}", self.base_url, path))
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.request(Method::GET, path).send().await?;
        decode(path, response).await
    }

    pub(crate) async fn send_json<B, T>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut builder = self.request(method, path);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let response = builder.send().await?;
        decode(path, response).await
    }

    /// For endpoints whose success response has no body.
    pub(crate) async fn send_empty(&self, method: Method, path: &str) -> Result<(), ApiError> {
        let response = self.request(method, path).send().await?;
        check(path, response).await.map(|_| ())
    }
}

async fn check(path: &str, response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Err(ApiError::NotFound(path.to_string()));
    }
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        tracing::warn!("{path} returned status {}: {message}", status.as_u16());
        return Err(ApiError::Status {
            status: status.as_u16(),
            message,
        });
    }
    Ok(response)
}

async fn decode<T: DeserializeOwned>(path: &str, response: Response) -> Result<T, ApiError> {
    let response = check(path, response).await?;
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|error| {
        tracing::debug!("{path} response parse failed: {error}; body={body}");
        ApiError::InvalidResponse(format!("failed to parse {path} response: {error}"))
    })
}

/// Turn a missing resource into `None` for lookup-style endpoints.
pub(crate) fn optional<T>(result: Result<T, ApiError>) -> Result<Option<T>, ApiError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(ApiError::NotFound(_)) => Ok(None),
        Err(error) => Err(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_base_url() {
        let client = ApiClient::new(" http://localhost:8080/ ", Duration::from_secs(5)).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080");
        assert!(ApiClient::new("  ", Duration::from_secs(5)).is_err());
    }

    #[test]
    fn optional_maps_not_found_only() {
        assert_eq!(optional::<u8>(Err(ApiError::NotFound("/x".into()))).unwrap(), None);
        assert_eq!(optional(Ok(3u8)).unwrap(), Some(3));
        assert!(optional::<u8>(Err(ApiError::Timeout("slow".into()))).is_err());
    }
}
