use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::GatewayError;
use crate::db_types::{CustomerInfo, Rupiah};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaybillRequest {
    pub order_code: String,
    pub courier: String,
    pub courier_service: Option<String>,
    pub recipient: CustomerInfo,
    pub address: String,
    pub item_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Waybill {
    pub tracking_number: String,
    pub etd: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingEvent {
    pub timestamp: DateTime<Utc>,
    pub status: String,
    pub description: String,
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateRequest {
    pub destination: String,
    pub weight_grams: i64,
    pub courier: String,
    pub courier_service: Option<String>,
}

#[allow(async_fn_in_trait)]
pub trait ShippingGateway {
    async fn create_waybill(&self, request: &WaybillRequest) -> Result<Waybill, GatewayError>;

    async fn fetch_tracking(&self, courier: &str, tracking_number: &str) -> Result<Vec<TrackingEvent>, GatewayError>;

    async fn quote_rate(&self, request: &RateRequest) -> Result<Rupiah, GatewayError>;
}
