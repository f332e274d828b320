use std::time::Duration;

use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Method,
};
use serde_json::Value;

use crate::{
    config::MidtransConfig,
    helpers::{constant_time_eq, midtrans_signature},
    rest::RestClient,
    GatewayApiError,
    MidtransCharge,
    MidtransChargeResponse,
    MidtransRefund,
    MidtransRefundResponse,
    MidtransStatusResponse,
};

/// Upper bound on any single Midtrans request. Callers impose tighter deadlines per operation.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Client for the Midtrans Core API.
///
/// Every method returns the parsed response together with the raw body, which the store keeps for audit.
#[derive(Clone)]
pub struct MidtransApi {
    config: MidtransConfig,
    rest: RestClient,
}

impl MidtransApi {
    pub fn new(config: MidtransConfig) -> Result<Self, GatewayApiError> {
        if config.server_key.is_empty() {
            return Err(GatewayApiError::Initialization("The Midtrans server key is empty".to_string()));
        }
        let mut headers = HeaderMap::with_capacity(3);
        // Basic auth with the server key as user name and an empty password
        let credentials = base64::encode(format!("{}:", config.server_key.reveal()));
        let val = HeaderValue::from_str(&format!("Basic {credentials}"))
            .map_err(|e| GatewayApiError::Initialization(e.to_string()))?;
        headers.insert("Authorization", val);
        headers.insert("Accept", HeaderValue::from_static("application/json"));
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        let rest = RestClient::new(&config.base_url, headers, REQUEST_TIMEOUT)?;
        Ok(Self { config, rest })
    }

    pub fn is_production(&self) -> bool {
        self.config.is_production
    }

    async fn post_for<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: Value,
    ) -> Result<(T, String), GatewayApiError> {
        let raw = self.rest.send(Method::POST, path, &[], Some(body)).await?;
        let parsed = serde_json::from_str::<T>(&raw).map_err(|e| GatewayApiError::JsonError(e.to_string()))?;
        Ok((parsed, raw))
    }

    pub async fn charge(&self, charge: &MidtransCharge) -> Result<(MidtransChargeResponse, String), GatewayApiError> {
        charge.validate()?;
        debug!("💳️ Creating {} charge for {} ({})", charge.method, charge.order_id, charge.gross_amount);
        let (response, raw) = self.post_for::<MidtransChargeResponse>("/v2/charge", charge.to_body()).await?;
        response.check()?;
        info!(
            "💳️ Charge for {} created. Transaction {}",
            charge.order_id,
            response.transaction_id.as_deref().unwrap_or("(none)")
        );
        Ok((response, raw))
    }

    pub async fn transaction_status(&self, order_id: &str) -> Result<(MidtransStatusResponse, String), GatewayApiError> {
        let path = format!("/v2/{order_id}/status");
        trace!("💳️ Polling status of {order_id}");
        let raw = self.rest.send::<()>(Method::GET, &path, &[], None).await?;
        let response =
            serde_json::from_str::<MidtransStatusResponse>(&raw).map_err(|e| GatewayApiError::JsonError(e.to_string()))?;
        response.check()?;
        Ok((response, raw))
    }

    pub async fn refund(
        &self,
        order_id: &str,
        refund: &MidtransRefund,
    ) -> Result<(MidtransRefundResponse, String), GatewayApiError> {
        if refund.amount <= 0 {
            return Err(GatewayApiError::InvalidRequest(format!("Refund amount must be positive: {}", refund.amount)));
        }
        let path = format!("/v2/{order_id}/refund");
        let body = serde_json::to_value(refund).map_err(|e| GatewayApiError::JsonError(e.to_string()))?;
        debug!("💸️ Requesting refund {} of {} for {order_id}", refund.refund_key, refund.amount);
        let (response, raw) = self.post_for::<MidtransRefundResponse>(&path, body).await?;
        response.check()?;
        info!("💸️ Refund {} for {order_id} accepted", refund.refund_key);
        Ok((response, raw))
    }

    pub fn signature(&self, order_id: &str, status_code: &str, gross_amount: &str) -> String {
        midtrans_signature(order_id, status_code, gross_amount, self.config.server_key.reveal())
    }

    /// Checks a notification's `signature_key` against the one computed with our server key.
    pub fn verify_signature(&self, order_id: &str, status_code: &str, gross_amount: &str, signature: &str) -> bool {
        let expected = self.signature(order_id, status_code, gross_amount);
        constant_time_eq(&expected, &signature.to_ascii_lowercase())
    }
}
