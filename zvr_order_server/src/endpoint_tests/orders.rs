use actix_web::{http::StatusCode, web, web::ServiceConfig};
use chrono::{TimeZone, Utc};
use zvr_order_engine::{
    db_types::{Order, OrderCode, OrderItem, OrderStatusType, Rupiah},
    events::EventProducers,
    state_machine::InvalidTransition,
    EngineError,
    OrderFlowApi,
};

use super::helpers::{get_request, json, post_request, ADMIN};
use crate::{
    endpoint_tests::mocks::MockOrderManager,
    routes::{CancelOrderRoute, OrderByCodeRoute, PackOrderRoute},
};

const CODE: &str = "ZVR-20240603-1A2B3C4D";

#[actix_web::test]
async fn strangers_see_a_masked_order() {
    let _ = env_logger::try_init().ok();
    let (status, body) = get_request(&[], &format!("/orders/{CODE}"), configure).await;
    assert_eq!(status, StatusCode::OK);
    let view = json(&body);
    assert_eq!(view["masked"], true);
    assert_eq!(view["customer_email"], "s***@example.com");
    assert_eq!(view["customer_name"], "S*** W***");
    assert_eq!(view["customer_phone"], "****7890");
    assert!(view["shipping_address"].is_null());
    assert!(view["resi"].is_null());
    assert_eq!(view["total_amount"], 115_000);
    assert_eq!(view["items"].as_array().map(Vec::len), Some(1));
}

#[actix_web::test]
async fn the_order_email_unlocks_the_full_view() {
    let _ = env_logger::try_init().ok();
    let path = format!("/orders/{CODE}?email=SARI@example.com");
    let (status, body) = get_request(&[], &path, configure).await;
    assert_eq!(status, StatusCode::OK);
    let view = json(&body);
    assert_eq!(view["masked"], false);
    assert_eq!(view["customer_email"], "sari@example.com");
    assert_eq!(view["resi"], "JNE0001");

    let path = format!("/orders/{CODE}?email=budi@example.com");
    let (_, body) = get_request(&[], &path, configure).await;
    assert_eq!(json(&body)["masked"], true);
}

#[actix_web::test]
async fn owners_and_admins_see_the_full_order() {
    let _ = env_logger::try_init().ok();
    let path = format!("/orders/{CODE}");
    let (_, body) = get_request(&[("X-Customer-Id", "7")], &path, configure).await;
    assert_eq!(json(&body)["masked"], false);
    let (_, body) = get_request(&[("X-Customer-Id", "8")], &path, configure).await;
    assert_eq!(json(&body)["masked"], true);
    let (_, body) = get_request(&ADMIN, &path, configure).await;
    assert_eq!(json(&body)["shipping_address"], "Jl. Braga No. 12, Bandung 40111");
}

#[actix_web::test]
async fn malformed_order_codes() {
    let _ = env_logger::try_init().ok();
    let (status, body) = get_request(&[], "/orders/ZVR-123", configure).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body)["error"], "validation_error");
}

#[actix_web::test]
async fn unknown_orders() {
    let _ = env_logger::try_init().ok();
    let (status, body) = get_request(&[], "/orders/ZVR-20240603-FFFFFFFF", configure).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json(&body)["error"], "not_found");
}

#[actix_web::test]
async fn admin_routes_need_the_admin_key() {
    let _ = env_logger::try_init().ok();
    let path = format!("/admin/orders/{CODE}/pack");
    let (status, body) = post_request(&[], &path, None, configure).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json(&body)["error"], "unauthorized");

    let (status, _) = post_request(&[("Authorization", "Bearer not-the-key")], &path, None, configure).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = post_request(&[("X-Customer-Id", "7")], &path, None, configure).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json(&body)["error"], "forbidden");
}

#[actix_web::test]
async fn cancelling_a_shipped_order_is_a_conflict() {
    let _ = env_logger::try_init().ok();
    let path = format!("/admin/orders/{CODE}/cancel");
    let body = serde_json::json!({ "reason": "customer changed their mind" });
    let (status, body) = post_request(&ADMIN, &path, Some(body), configure).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let body = json(&body);
    assert_eq!(body["error"], "state_conflict");
    assert_eq!(body["details"]["from"], "SHIPPED");
    assert_eq!(body["details"]["to"], "CANCELLED");
}

fn configure(cfg: &mut ServiceConfig) {
    let mut orders = MockOrderManager::new();
    orders.expect_fetch_order().returning(|code| Ok((code.as_str() == CODE).then(sample_order)));
    orders.expect_fetch_order_items().returning(|_| Ok(vec![sample_item()]));
    orders.expect_transition_order().returning(|_, change| {
        Err(EngineError::InvalidTransition(InvalidTransition::new(OrderStatusType::Shipped, change.to)))
    });
    let api = OrderFlowApi::new(orders, EventProducers::default());
    cfg.service(OrderByCodeRoute::<MockOrderManager>::new())
        .service(PackOrderRoute::<MockOrderManager>::new())
        .service(CancelOrderRoute::<MockOrderManager>::new())
        .app_data(web::Data::new(api));
}

fn sample_order() -> Order {
    let created_at = Utc.with_ymd_and_hms(2024, 6, 3, 10, 0, 0).unwrap();
    Order {
        id: 1,
        order_code: OrderCode::new(CODE),
        user_id: Some(7),
        customer_name: "Sari Wulandari".into(),
        customer_email: "sari@example.com".into(),
        customer_phone: "0812-3456-7890".into(),
        shipping_address: "Jl. Braga No. 12, Bandung 40111".into(),
        courier: Some("jne".into()),
        courier_service: Some("reg".into()),
        subtotal: Rupiah::from(100_000),
        shipping_cost: Rupiah::from(15_000),
        tax: Rupiah::zero(),
        discount: Rupiah::zero(),
        total_amount: Rupiah::from(115_000),
        status: OrderStatusType::Shipped,
        stock_reserved: false,
        resi: Some("JNE0001".into()),
        paid_at: Some(created_at),
        shipped_at: Some(created_at),
        delivered_at: None,
        completed_at: None,
        cancelled_at: None,
        refund_status: None,
        refund_amount: Rupiah::zero(),
        refunded_at: None,
        created_at,
        updated_at: created_at,
    }
}

fn sample_item() -> OrderItem {
    OrderItem {
        id: 1,
        order_id: 1,
        product_id: 3,
        variant_id: None,
        product_name: "Linen shirt".into(),
        product_image: None,
        quantity: 2,
        price_per_unit: Rupiah::from(50_000),
        subtotal: Rupiah::from(100_000),
    }
}
