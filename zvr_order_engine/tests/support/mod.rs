#![allow(dead_code)]

use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite};
use zvr_order_engine::{
    collaborators::TransactionStatus,
    db_types::{Actor, Order, OrderCode, OrderStatusType, PaymentMethod, Rupiah},
    events::EventProducers,
    test_utils::{
        catalog::{checkout, seed_product},
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

pub type Payments = PaymentApi<SqliteDatabase, StubPaymentGateway, RecordingMailer>;
pub type Refunds = RefundApi<SqliteDatabase, StubPaymentGateway>;
pub type Jobs = JobsApi<SqliteDatabase, StubPaymentGateway, RecordingMailer>;

pub struct TestSystem {
    pub clock: MockClock,
    pub db: SqliteDatabase,
    pub gateway: StubPaymentGateway,
    pub shipping: StubShippingGateway,
    pub mailer: RecordingMailer,
    pub orders: OrderFlowApi<SqliteDatabase>,
    pub payments: Payments,
    pub refunds: Refunds,
    pub jobs: Jobs,
}

impl TestSystem {
    pub async fn new() -> Self {
        Self::with_producers(EventProducers::default()).await
    }

    pub async fn with_producers(producers: EventProducers) -> Self {
        let clock = MockClock::default();
        let db = new_test_db(clock.clone()).await;
        let gateway = StubPaymentGateway::new();
        let shipping = StubShippingGateway::new();
        let mailer = RecordingMailer::new();
        let orders = OrderFlowApi::new(db.clone(), producers.clone());
        let payments = PaymentApi::new(db.clone(), gateway.clone(), mailer.clone(), producers.clone());
        let refunds = RefundApi::new(db.clone(), gateway.clone(), producers);
        let jobs = JobsApi::new(db.clone(), orders.clone(), payments.clone(), JobConfig::default());
        Self { clock, db, gateway, shipping, mailer, orders, payments, refunds, jobs }
    }

    pub async fn tear_down(self) {
        let url = self.db.url().to_string();
        self.db.pool().close().await;
        if let Err(e) = Sqlite::drop_database(&url).await {
            warn!("🚀️ Could not remove test database {url}: {e}");
        }
    }

    /// A product priced at 50,000 with 10 in stock.
    pub async fn seed_shirt(&self) -> i64 {
        seed_product(&self.db, "Linen shirt", 50_000, 10).await
    }

    /// Two shirts and 15,000 shipping: 115,000 in total.
    pub async fn place_order(&self, product_id: i64) -> Order {
        let detail = self
            .orders
            .create_order(checkout(&[(product_id, None, 2)], 15_000), &Actor::Customer(1))
            .await
            .expect("Error creating order");
        detail.order
    }

    pub async fn open_payment(&self, code: &OrderCode) -> String {
        let instructions =
            self.payments.open_payment(code, PaymentMethod::BcaVa).await.expect("Error opening payment");
        instructions.external_id
    }

    /// Delivers a signed settlement webhook for the payment.
    pub async fn settle(&self, external_id: &str, amount: Rupiah) {
        let notification = StubPaymentGateway::webhook(external_id, "settlement", &format!("tx-{external_id}"), amount);
        let outcome = self.payments.handle_webhook(&notification, "{}").await;
        assert!(outcome.is_handled(), "settlement was not handled: {outcome:?}");
    }

    pub async fn paid_order(&self, product_id: i64) -> Order {
        let order = self.place_order(product_id).await;
        let external_id = self.open_payment(&order.order_code).await;
        self.settle(&external_id, order.total_amount).await;
        self.order(&order.order_code).await
    }

    /// A paid order taken through packing and shipping to DELIVERED.
    pub async fn delivered_order(&self, product_id: i64) -> Order {
        let order = self.paid_order(product_id).await;
        let code = &order.order_code;
        let admin = admin();
        self.orders.mark_packing(code, &admin).await.expect("Error packing");
        let resi = format!("JNE{}", order.id);
        self.orders.mark_shipped_with_resi(code, &resi, &admin).await.expect("Error shipping");
        let result = self.orders.mark_delivered(code, &admin).await.expect("Error delivering");
        assert_eq!(result.order.status, OrderStatusType::Delivered);
        result.order
    }

    pub async fn order(&self, code: &OrderCode) -> Order {
        self.orders.fetch_order(code).await.expect("Error fetching order")
    }

    pub fn settlement(transaction_id: &str) -> TransactionStatus {
        TransactionStatus {
            transaction_status: "settlement".into(),
            transaction_id: Some(transaction_id.into()),
            fraud_status: Some("accept".into()),
            raw: "{}".into(),
        }
    }
}

pub fn admin() -> Actor {
    Actor::Admin("ops@zvr.id".into())
}
