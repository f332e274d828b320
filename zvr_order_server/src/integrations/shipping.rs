use log::*;
use zvr_gateways::{CourierRate, RateQuery, ShippingApi, WaybillItem, WaybillOrder};
use zvr_order_engine::{
    collaborators::{GatewayError, RateRequest, ShippingGateway, TrackingEvent, Waybill, WaybillRequest},
    db_types::Rupiah,
};

use super::map_gateway_error;

const DEFAULT_COURIER_SERVICE: &str = "reg";

/// The courier aggregator as the engine's shipping gateway.
#[derive(Clone)]
pub struct ShippingClient {
    api: ShippingApi,
}

impl ShippingClient {
    pub fn new(api: ShippingApi) -> Self {
        Self { api }
    }
}

pub fn waybill_order(request: &WaybillRequest) -> WaybillOrder {
    WaybillOrder {
        reference_id: request.order_code.clone(),
        courier_company: request.courier.to_lowercase(),
        courier_type: request.courier_service.clone().unwrap_or_else(|| DEFAULT_COURIER_SERVICE.to_string()),
        destination_contact_name: request.recipient.name.clone(),
        destination_contact_phone: request.recipient.phone.clone(),
        destination_contact_email: request.recipient.email.clone(),
        destination_address: request.address.clone(),
        items: vec![WaybillItem { name: format!("Order {}", request.order_code), quantity: request.item_count }],
    }
}

/// The quoted rate for the requested courier and service. Without a service, the cheapest of the courier's services.
pub fn select_rate(rates: &[CourierRate], courier: &str, service: Option<&str>) -> Option<i64> {
    rates
        .iter()
        .filter(|r| r.courier_code.eq_ignore_ascii_case(courier))
        .filter(|r| service.map_or(true, |s| r.courier_service_code.eq_ignore_ascii_case(s)))
        .map(|r| r.price)
        .min()
}

impl ShippingGateway for ShippingClient {
    async fn create_waybill(&self, request: &WaybillRequest) -> Result<Waybill, GatewayError> {
        let receipt = self.api.create_waybill(&waybill_order(request)).await.map_err(map_gateway_error)?;
        let tracking_number = receipt.courier.waybill_id.filter(|w| !w.trim().is_empty()).ok_or_else(|| {
            GatewayError::InvalidResponse(format!("Booking {} for {} has no waybill number", receipt.id, request.order_code))
        })?;
        Ok(Waybill { tracking_number, etd: receipt.courier.duration })
    }

    async fn fetch_tracking(&self, courier: &str, tracking_number: &str) -> Result<Vec<TrackingEvent>, GatewayError> {
        let history = self.api.tracking(courier, tracking_number).await.map_err(map_gateway_error)?;
        trace!("🚚️ {} tracking entries for {tracking_number}", history.len());
        Ok(history
            .into_iter()
            .map(|e| TrackingEvent {
                timestamp: e.updated_at,
                status: e.status,
                description: e.note,
                location: e.location,
            })
            .collect())
    }

    async fn quote_rate(&self, request: &RateRequest) -> Result<Rupiah, GatewayError> {
        let query = RateQuery {
            destination_address: request.destination.clone(),
            couriers: request.courier.to_lowercase(),
            weight_grams: request.weight_grams,
        };
        let rates = self.api.rates(&query).await.map_err(map_gateway_error)?;
        select_rate(&rates, &request.courier, request.courier_service.as_deref()).map(Rupiah::from).ok_or_else(|| {
            GatewayError::Permanent {
                status: 404,
                message: format!(
                    "No rate for {}/{}",
                    request.courier,
                    request.courier_service.as_deref().unwrap_or("-")
                ),
            }
        })
    }
}

#[cfg(test)]
mod test {
    use zvr_order_engine::db_types::CustomerInfo;

    use super::*;

    fn rate(courier: &str, service: &str, price: i64) -> CourierRate {
        CourierRate {
            courier_code: courier.into(),
            courier_service_code: service.into(),
            price,
            duration: Some("1 - 2 days".into()),
        }
    }

    #[test]
    fn rate_selection() {
        let rates = vec![rate("jne", "reg", 15_000), rate("jne", "yes", 28_000), rate("sicepat", "reg", 13_000)];
        assert_eq!(select_rate(&rates, "JNE", Some("YES")), Some(28_000));
        assert_eq!(select_rate(&rates, "jne", None), Some(15_000));
        assert_eq!(select_rate(&rates, "jne", Some("oke")), None);
        assert_eq!(select_rate(&rates, "pos", None), None);
    }

    #[test]
    fn waybill_booking() {
        let request = WaybillRequest {
            order_code: "ZVR-20240603-1A2B3C4D".into(),
            courier: "JNE".into(),
            courier_service: None,
            recipient: CustomerInfo { name: "Sari".into(), email: "sari@example.com".into(), phone: "0812".into() },
            address: "Jl. Braga No. 12, Bandung".into(),
            item_count: 3,
        };
        let order = waybill_order(&request);
        assert_eq!(order.courier_company, "jne");
        assert_eq!(order.courier_type, "reg");
        assert_eq!(order.items[0].quantity, 3);
        assert_eq!(order.destination_contact_email, "sari@example.com");
    }
}
