use std::sync::Arc;

use actix_web::{http::StatusCode, web, web::ServiceConfig};
use chrono::Duration;
use serde_json::json as body;
use zvr_order_engine::{
    collaborators::StaticRateFallback,
    db_types::{OrderStatusType, Rupiah},
    events::EventProducers,
    test_utils::{
        catalog::{product_stock, seed_product},
        prepare_env::new_test_db,
        MockClock,
        RecordingMailer,
        StubPaymentGateway,
        StubShippingGateway,
    },
    JobConfig,
    JobsApi,
    OrderFlowApi,
    PaymentApi,
    RefundApi,
    SqliteDatabase,
};

use super::helpers::{get_request, json, post_raw, post_request, ADMIN};
use crate::{
    config::ServerOptions,
    helpers::IDEMPOTENCY_KEY_HEADER,
    routes::{
        CheckoutRoute,
        CreatePaymentRoute,
        CreateRefundRoute,
        OrderRefundsRoute,
        PaymentWebhookRoute,
        ProcessRefundRoute,
        RunExpiryJobRoute,
        SyncLogsRoute,
    },
};

type Db = SqliteDatabase;
type Gateway = StubPaymentGateway;
type Mail = RecordingMailer;

/// The full stack against a throwaway database, with stand-ins for the gateways.
struct TestServer {
    clock: MockClock,
    db: Db,
    orders: OrderFlowApi<Db>,
    payments: PaymentApi<Db, Gateway, Mail>,
    refunds: RefundApi<Db, Gateway>,
    jobs: Arc<JobsApi<Db, Gateway, Mail>>,
}

impl TestServer {
    async fn new() -> Self {
        let clock = MockClock::default();
        let db = new_test_db(clock.clone()).await;
        let producers = EventProducers::default();
        let gateway = StubPaymentGateway::new();
        let orders = OrderFlowApi::new(db.clone(), producers.clone());
        let payments = PaymentApi::new(db.clone(), gateway.clone(), RecordingMailer::new(), producers.clone());
        let refunds = RefundApi::new(db.clone(), gateway, producers);
        let jobs = Arc::new(JobsApi::new(db.clone(), orders.clone(), payments.clone(), JobConfig::default()));
        Self { clock, db, orders, payments, refunds, jobs }
    }

    fn configure(&self) -> impl FnOnce(&mut ServiceConfig) {
        let orders = self.orders.clone();
        let payments = self.payments.clone();
        let refunds = self.refunds.clone();
        let jobs = Arc::clone(&self.jobs);
        move |cfg: &mut ServiceConfig| {
            cfg.app_data(web::Data::new(orders))
                .app_data(web::Data::new(payments))
                .app_data(web::Data::new(refunds))
                .app_data(web::Data::from(jobs))
                .app_data(web::Data::new(StubShippingGateway::new()))
                .app_data(web::Data::new(StaticRateFallback::default()))
                .app_data(web::Data::new(ServerOptions::default()))
                .service(CheckoutRoute::<Db, StubShippingGateway>::new())
                .service(CreatePaymentRoute::<Db, Gateway, Mail>::new())
                .service(PaymentWebhookRoute::<Db, Gateway, Mail>::new())
                .service(CreateRefundRoute::<Db, Gateway>::new())
                .service(ProcessRefundRoute::<Db, Gateway>::new())
                .service(OrderRefundsRoute::<Db, Gateway>::new())
                .service(RunExpiryJobRoute::<Db, Gateway, Mail>::new())
                .service(SyncLogsRoute::<Db, Gateway, Mail>::new());
        }
    }

    /// Checks out two shirts with JNE REG. The shipping stub cannot quote, so the flat rate of 15,000 applies.
    async fn checkout(&self, product_id: i64) -> (String, i64) {
        let request = body!({
            "customer": { "name": "Sari Wulandari", "email": "sari@example.com", "phone": "081234567890" },
            "shipping_address": "Jl. Braga No. 12, Bandung 40111",
            "courier": "jne",
            "courier_service": "reg",
            "items": [{ "product_id": product_id, "quantity": 2 }],
        });
        let (status, body) = post_request(&[], "/checkout", Some(request), self.configure()).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        let body = json(&body);
        let code = body["order_code"].as_str().map(String::from).unwrap_or_default();
        (code, body["total_amount"].as_i64().unwrap_or_default())
    }

    async fn pay(&self, code: &str, total: i64) {
        let request = body!({ "order_id": code, "method": "bca_va" });
        let (status, body) = post_request(&[], "/payments/create", Some(request), self.configure()).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        let external_id = json(&body)["external_id"].as_str().map(String::from).unwrap_or_default();
        let notification =
            StubPaymentGateway::webhook(&external_id, "settlement", &format!("tx-{external_id}"), Rupiah::from(total));
        let notification = serde_json::to_value(notification).unwrap();
        let (status, body) = post_request(&[], "/webhook/payment", Some(notification), self.configure()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body)["success"], true, "{body}");
    }

    async fn status(&self, code: &str) -> OrderStatusType {
        self.orders.fetch_order(&code.parse().unwrap()).await.unwrap().status
    }
}

#[actix_web::test]
async fn checkout_then_pay_by_webhook() {
    let _ = env_logger::try_init().ok();
    let srv = TestServer::new().await;
    let shirt = seed_product(&srv.db, "Linen shirt", 50_000, 10).await;
    let (code, total) = srv.checkout(shirt).await;
    assert_eq!(total, 115_000);
    assert_eq!(product_stock(&srv.db, shirt).await, 8);
    assert_eq!(srv.status(&code).await, OrderStatusType::Pending);
    srv.pay(&code, total).await;
    assert_eq!(srv.status(&code).await, OrderStatusType::Paid);
}

#[actix_web::test]
async fn checkout_without_stock() {
    let _ = env_logger::try_init().ok();
    let srv = TestServer::new().await;
    let shirt = seed_product(&srv.db, "Linen shirt", 50_000, 1).await;
    let request = body!({
        "customer": { "name": "Sari Wulandari", "email": "sari@example.com", "phone": "081234567890" },
        "shipping_address": "Jl. Braga No. 12, Bandung 40111",
        "courier": "jne",
        "items": [{ "product_id": shirt, "quantity": 2 }],
    });
    let (status, body) = post_request(&[], "/checkout", Some(request), srv.configure()).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let body = json(&body);
    assert_eq!(body["details"]["requested"], 2);
    assert_eq!(body["details"]["available"], 1);
    assert_eq!(product_stock(&srv.db, shirt).await, 1);
}

#[actix_web::test]
async fn the_webhook_always_answers_ok() {
    let _ = env_logger::try_init().ok();
    let srv = TestServer::new().await;
    let (status, body) = post_raw("/webhook/payment", "this is not json", srv.configure()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["success"], false);

    let mut forged = StubPaymentGateway::webhook("PAY-unknown", "settlement", "tx-1", Rupiah::from(10_000));
    forged.signature_key = "forged".into();
    let forged = serde_json::to_value(forged).unwrap();
    let (status, body) = post_request(&[], "/webhook/payment", Some(forged), srv.configure()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["success"], false);

    let unknown = StubPaymentGateway::webhook("PAY-unknown", "settlement", "tx-1", Rupiah::from(10_000));
    let unknown = serde_json::to_value(unknown).unwrap();
    let (status, body) = post_request(&[], "/webhook/payment", Some(unknown), srv.configure()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["success"], false);

    let (status, body) = get_request(&ADMIN, "/admin/sync-logs?unresolved=true", srv.configure()).await;
    assert_eq!(status, StatusCode::OK);
    assert!(json(&body).as_array().is_some_and(|logs| !logs.is_empty()), "{body}");
}

#[actix_web::test]
async fn refund_requests_are_idempotent() {
    let _ = env_logger::try_init().ok();
    let srv = TestServer::new().await;
    let shirt = seed_product(&srv.db, "Linen shirt", 50_000, 10).await;
    let (code, total) = srv.checkout(shirt).await;
    srv.pay(&code, total).await;

    let request = body!({
        "order_code": code,
        "refund_type": "PARTIAL",
        "reason": "DAMAGED_ITEM",
        "reason_detail": "torn seam",
        "shipping_refund": 0,
        "items_refund": 20000,
    });
    let (status, body) = post_request(&ADMIN, "/admin/refunds", Some(request.clone()), srv.configure()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body)["error"], "validation_error");

    let headers = [ADMIN[0], ADMIN[1], (IDEMPOTENCY_KEY_HEADER, "rfd-0001")];
    let (status, first) = post_request(&headers, "/admin/refunds", Some(request.clone()), srv.configure()).await;
    assert_eq!(status, StatusCode::CREATED, "{first}");
    let first = json(&first);
    assert_eq!(first["created"], true);
    let (status, second) = post_request(&headers, "/admin/refunds", Some(request), srv.configure()).await;
    assert_eq!(status, StatusCode::OK);
    let second = json(&second);
    assert_eq!(second["created"], false);
    assert_eq!(second["refund"]["id"], first["refund"]["id"]);

    let path = format!("/admin/refunds/{}/process", first["refund"]["id"]);
    let (status, body) = post_request(&ADMIN, &path, None, srv.configure()).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let body = json(&body);
    assert_eq!(body["order_refund_amount"], 20_000);
    assert_eq!(body["order_refunded"], false);

    let (status, body) = get_request(&ADMIN, &format!("/admin/orders/{code}/refunds"), srv.configure()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body).as_array().map(Vec::len), Some(1));
}

#[actix_web::test]
async fn the_expiry_job_can_be_run_by_hand() {
    let _ = env_logger::try_init().ok();
    let srv = TestServer::new().await;
    let shirt = seed_product(&srv.db, "Linen shirt", 50_000, 10).await;
    let (code, _) = srv.checkout(shirt).await;
    srv.clock.advance(Duration::hours(25));

    let (status, body) = post_request(&[("X-Customer-Id", "7")], "/admin/jobs/expire/run", None, srv.configure()).await;
    assert_eq!(status, StatusCode::FORBIDDEN, "{body}");

    let (status, body) = post_request(&ADMIN, "/admin/jobs/expire/run", None, srv.configure()).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let body = json(&body);
    assert_eq!(body["outcome"], "completed");
    assert_eq!(body["result"]["expired"][0], code.as_str());
    assert_eq!(srv.status(&code).await, OrderStatusType::Expired);
    assert_eq!(product_stock(&srv.db, shirt).await, 10);
}
