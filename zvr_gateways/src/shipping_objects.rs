use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaybillItem {
    pub name: String,
    pub quantity: i64,
}

/// A pickup booking. The courier assigns the waybill number (resi) in its reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaybillOrder {
    pub reference_id: String,
    pub courier_company: String,
    pub courier_type: String,
    pub destination_contact_name: String,
    pub destination_contact_phone: String,
    pub destination_contact_email: String,
    pub destination_address: String,
    pub items: Vec<WaybillItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaybillReceipt {
    pub id: String,
    pub courier: WaybillCourier,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaybillCourier {
    pub waybill_id: Option<String>,
    pub company: Option<String>,
    #[serde(rename = "type")]
    pub courier_type: Option<String>,
    pub duration: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingEntry {
    pub note: String,
    pub status: String,
    pub updated_at: DateTime<Utc>,
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct TrackingResponse {
    #[serde(default)]
    pub history: Vec<TrackingEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateQuery {
    pub destination_address: String,
    /// Comma separated courier codes, e.g. `jne,sicepat`.
    pub couriers: String,
    pub weight_grams: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourierRate {
    pub courier_code: String,
    pub courier_service_code: String,
    pub price: i64,
    pub duration: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct RatesResponse {
    #[serde(default)]
    pub pricing: Vec<CourierRate>,
}
