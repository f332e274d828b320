use std::{sync::Arc, time::Duration};

use log::*;
use reqwest::{header::HeaderMap, Client, Method};
use serde::{de::DeserializeOwned, Serialize};

use crate::GatewayApiError;

/// A JSON-over-HTTP client bound to one service's base URL and default headers.
#[derive(Clone)]
pub struct RestClient {
    base_url: String,
    client: Arc<Client>,
}

impl RestClient {
    pub fn new(base_url: &str, headers: HeaderMap, timeout: Duration) -> Result<Self, GatewayApiError> {
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayApiError::Initialization(e.to_string()))?;
        Ok(Self { base_url: base_url.trim_end_matches('/').to_string(), client: Arc::new(client) })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Sends the request and returns the response body as text. Non-2xx responses become
    /// [`GatewayApiError::QueryError`].
    pub async fn send<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, &str)],
        body: Option<B>,
    ) -> Result<String, GatewayApiError> {
        let url = self.url(path);
        trace!("Sending REST query: {method} {url}");
        let mut req = self.client.request(method, url);
        if !params.is_empty() {
            req = req.query(params);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }
        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                GatewayApiError::Timeout(e.to_string())
            } else {
                GatewayApiError::RequestError(e.to_string())
            }
        })?;
        let status = response.status();
        let text = response.text().await.map_err(|e| GatewayApiError::RequestError(e.to_string()))?;
        if status.is_success() {
            trace!("REST query successful. {status}");
            Ok(text)
        } else {
            debug!("REST query failed. {status}: {text}");
            Err(GatewayApiError::from_status(status.as_u16(), text))
        }
    }

    pub async fn rest_query<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, &str)],
        body: Option<B>,
    ) -> Result<T, GatewayApiError> {
        let text = self.send(method, path, params, body).await?;
        serde_json::from_str(&text).map_err(|e| GatewayApiError::JsonError(e.to_string()))
    }
}
