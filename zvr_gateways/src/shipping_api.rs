use std::time::Duration;

use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Method,
};

use crate::{
    config::ShippingConfig,
    rest::RestClient,
    shipping_objects::{RatesResponse, TrackingResponse},
    CourierRate,
    GatewayApiError,
    RateQuery,
    TrackingEntry,
    WaybillOrder,
    WaybillReceipt,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the courier aggregator: pickup bookings, tracking and rate quotes.
#[derive(Clone)]
pub struct ShippingApi {
    rest: RestClient,
}

impl ShippingApi {
    pub fn new(config: ShippingConfig) -> Result<Self, GatewayApiError> {
        let mut headers = HeaderMap::with_capacity(2);
        let val = HeaderValue::from_str(&format!("Bearer {}", config.api_key.reveal()))
            .map_err(|e| GatewayApiError::Initialization(e.to_string()))?;
        headers.insert("Authorization", val);
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        let rest = RestClient::new(&config.base_url, headers, REQUEST_TIMEOUT)?;
        Ok(Self { rest })
    }

    /// Books a pickup and returns the receipt. A receipt without a waybill number is treated as a failure, since the
    /// order cannot ship without one.
    pub async fn create_waybill(&self, order: &WaybillOrder) -> Result<WaybillReceipt, GatewayApiError> {
        debug!("🚚️ Booking {} {} pickup for {}", order.courier_company, order.courier_type, order.reference_id);
        let receipt = self.rest.rest_query::<WaybillReceipt, _>(Method::POST, "/v1/orders", &[], Some(order)).await?;
        if receipt.courier.waybill_id.as_deref().map_or(true, str::is_empty) {
            return Err(GatewayApiError::JsonError(format!("Booking {} has no waybill number", receipt.id)));
        }
        info!("🚚️ Pickup for {} booked as {}", order.reference_id, receipt.id);
        Ok(receipt)
    }

    pub async fn tracking(&self, courier: &str, waybill_id: &str) -> Result<Vec<TrackingEntry>, GatewayApiError> {
        let path = format!("/v1/trackings/{waybill_id}/couriers/{courier}");
        let response = self.rest.rest_query::<TrackingResponse, ()>(Method::GET, &path, &[], None).await?;
        Ok(response.history)
    }

    pub async fn rates(&self, query: &RateQuery) -> Result<Vec<CourierRate>, GatewayApiError> {
        let response =
            self.rest.rest_query::<RatesResponse, _>(Method::POST, "/v1/rates/couriers", &[], Some(query)).await?;
        trace!("🚚️ {} rates quoted for {}", response.pricing.len(), query.couriers);
        Ok(response.pricing)
    }
}
