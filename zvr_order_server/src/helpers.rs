use actix_web::HttpRequest;
use log::*;
use regex::Regex;
use zvr_order_engine::{
    collaborators::{with_deadline, RateRequest, ShippingGateway, StaticRateFallback},
    db_types::{NewOrderItem, Rupiah},
    EngineError,
};

use crate::errors::ServerError;

pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";
const MAX_IDEMPOTENCY_KEY_LENGTH: usize = 128;
/// Parcel weight assumed per unit when quoting shipping. The catalog carries no weights.
pub const DEFAULT_ITEM_WEIGHT_GRAMS: i64 = 500;

/// Extracts the `Idempotency-Key` header.
pub fn idempotency_key(req: &HttpRequest) -> Result<String, ServerError> {
    let key = req
        .headers()
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or(ServerError::MissingIdempotencyKey)?;
    if key.len() > MAX_IDEMPOTENCY_KEY_LENGTH {
        return Err(ServerError::InvalidRequestBody(format!(
            "{IDEMPOTENCY_KEY_HEADER} must be at most {MAX_IDEMPOTENCY_KEY_LENGTH} characters"
        )));
    }
    Ok(key.to_string())
}

/// `sari@example.com` becomes `s***@example.com`.
pub fn mask_email(email: &str) -> String {
    let Ok(re) = Regex::new(r"^(?P<first>[^@])[^@]*@(?P<domain>.+)$") else {
        return "***".to_string();
    };
    match re.captures(email.trim()) {
        Some(caps) => format!("{}***@{}", &caps["first"], &caps["domain"]),
        None => "***".to_string(),
    }
}

/// Keeps the first letter of each word.
pub fn mask_name(name: &str) -> String {
    name.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(c) => format!("{c}***"),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Keeps the last four digits.
pub fn mask_phone(phone: &str) -> String {
    let digits = phone.chars().filter(char::is_ascii_digit).collect::<Vec<_>>();
    if digits.len() <= 4 {
        return "****".to_string();
    }
    let tail = digits[digits.len() - 4..].iter().collect::<String>();
    format!("****{tail}")
}

pub fn parcel_weight(items: &[NewOrderItem]) -> i64 {
    items.iter().map(|i| i.quantity.max(0)).sum::<i64>() * DEFAULT_ITEM_WEIGHT_GRAMS
}

/// Prices shipping for a checkout. The shipping gateway is asked first; if it cannot quote in time, the flat rate for
/// the courier is used instead.
pub async fn quote_shipping<S: ShippingGateway>(
    shipping: &S,
    fallback: &StaticRateFallback,
    request: &RateRequest,
    deadline: std::time::Duration,
) -> Result<Rupiah, EngineError> {
    match with_deadline(deadline, shipping.quote_rate(request)).await {
        Ok(rate) if !rate.is_negative() => return Ok(rate),
        Ok(rate) => warn!("🚚️ The shipping gateway quoted a negative rate ({rate}). Using the flat rate."),
        Err(e) => warn!("🚚️ Could not get a shipping quote for {}: {e}. Using the flat rate.", request.courier),
    }
    fallback.rate(&request.courier, request.courier_service.as_deref()).ok_or_else(|| {
        EngineError::ValidationError(format!(
            "Shipping with {}/{} is not available",
            request.courier,
            request.courier_service.as_deref().unwrap_or("-")
        ))
    })
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use actix_web::test::TestRequest;
    use zvr_order_engine::test_utils::StubShippingGateway;

    use super::*;

    #[test]
    fn masking() {
        assert_eq!(mask_email("sari@example.com"), "s***@example.com");
        assert_eq!(mask_email("not-an-email"), "***");
        assert_eq!(mask_name("Sari Wulandari"), "S*** W***");
        assert_eq!(mask_phone("0812-3456-7890"), "****7890");
        assert_eq!(mask_phone("123"), "****");
    }

    #[test]
    fn idempotency_header() {
        let req = TestRequest::default().insert_header((IDEMPOTENCY_KEY_HEADER, " rfd-001 ")).to_http_request();
        assert_eq!(idempotency_key(&req).unwrap(), "rfd-001");
        let req = TestRequest::default().to_http_request();
        assert!(matches!(idempotency_key(&req), Err(ServerError::MissingIdempotencyKey)));
        let long = "k".repeat(200);
        let req = TestRequest::default().insert_header((IDEMPOTENCY_KEY_HEADER, long)).to_http_request();
        assert!(matches!(idempotency_key(&req), Err(ServerError::InvalidRequestBody(_))));
    }

    #[tokio::test]
    async fn shipping_falls_back_to_flat_rates() {
        let shipping = StubShippingGateway::new();
        let fallback = StaticRateFallback::default();
        let request = RateRequest {
            destination: "Jl. Braga No. 12, Bandung".into(),
            weight_grams: 1000,
            courier: "jne".into(),
            courier_service: Some("yes".into()),
        };
        let rate = quote_shipping(&shipping, &fallback, &request, Duration::from_secs(1)).await.unwrap();
        assert_eq!(rate, Rupiah::from(28_000));
        let request = RateRequest { courier: "gosend".into(), ..request };
        let err = quote_shipping(&shipping, &fallback, &request, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, EngineError::ValidationError(_)));
    }

    #[test]
    fn weights() {
        let items = vec![
            NewOrderItem { product_id: 1, variant_id: None, quantity: 2 },
            NewOrderItem { product_id: 2, variant_id: Some(4), quantity: 1 },
        ];
        assert_eq!(parcel_weight(&items), 1500);
    }
}
