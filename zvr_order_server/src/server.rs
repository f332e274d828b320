use std::{sync::Arc, time::Duration};

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use log::*;
use zvr_gateways::{MailerApi, MidtransApi, ShippingApi};
use zvr_order_engine::{
    collaborators::StaticRateFallback,
    events::EventProducers,
    JobsApi,
    OrderFlowApi,
    PaymentApi,
    RefundApi,
    SqliteDatabase,
};

use crate::{
    auth::AdminKey,
    config::ServerConfig,
    errors::ServerError,
    integrations::{create_event_handlers, MailerClient, MidtransGateway, ShippingClient},
    routes::{
        health,
        CancelOrderRoute,
        CancelRefundRoute,
        CheckoutRoute,
        CompleteOrderRoute,
        CreatePaymentRoute,
        CreateRefundRoute,
        DeliverOrderRoute,
        MarkOrderPaidRoute,
        MarkRefundCompletedRoute,
        OrderByCodeRoute,
        OrderHistoryRoute,
        OrderRefundsRoute,
        PackOrderRoute,
        PaymentWebhookRoute,
        ProcessRefundRoute,
        RefundDetailRoute,
        RejectRefundRoute,
        RetryRefundRoute,
        RunExpiryJobRoute,
        RunReconcileJobRoute,
        RunSyncJobRoute,
        ShipOrderRoute,
        SyncLogsRoute,
        SyncOrderPaymentRoute,
    },
    workers::{start_expiry_worker, start_payment_sync_worker, start_reconciliation_worker, ServerJobs},
};

const DB_MAX_CONNECTIONS: u32 = 25;

type Db = SqliteDatabase;
type Gateway = MidtransGateway;
type Mail = MailerClient;
type Ship = ShippingClient;

/// The engine APIs, bound to the production backend and clients. Every HTTP worker gets a clone.
#[derive(Clone)]
pub struct ServerApis {
    pub orders: OrderFlowApi<Db>,
    pub payments: PaymentApi<Db, Gateway, Mail>,
    pub refunds: RefundApi<Db, Gateway>,
    pub jobs: Arc<ServerJobs>,
    pub shipping: Ship,
}

impl ServerApis {
    pub fn new(
        config: &ServerConfig,
        db: Db,
        producers: EventProducers,
        gateway: Gateway,
        mailer: Mail,
        shipping: Ship,
    ) -> Self {
        let orders = OrderFlowApi::new(db.clone(), producers.clone()).with_config(config.order_flow);
        let payments = PaymentApi::new(db.clone(), gateway.clone(), mailer, producers.clone())
            .with_deadlines(config.deadlines);
        let refunds = RefundApi::new(db.clone(), gateway, producers).with_deadlines(config.deadlines);
        let jobs = Arc::new(JobsApi::new(db, orders.clone(), payments.clone(), config.jobs));
        Self { orders, payments, refunds, jobs, shipping }
    }
}

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, DB_MAX_CONNECTIONS)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.migrate().await?;
    let gateway = MidtransApi::new(config.midtrans.clone()).map_err(|e| ServerError::InitializeError(e.to_string()))?;
    if !gateway.is_production() {
        warn!("💻️ The payment gateway is in sandbox mode");
    }
    let shipping = ShippingApi::new(config.shipping.clone()).map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let mailer = MailerApi::new(config.mailer.clone()).map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let handlers = create_event_handlers();
    let producers = handlers.producers();
    handlers.start_handlers().await;
    let apis = ServerApis::new(
        &config,
        db,
        producers,
        MidtransGateway::new(gateway),
        MailerClient::new(mailer),
        ShippingClient::new(shipping),
    );
    if config.disable_workers {
        warn!("🕰️ Background workers are disabled. Run the jobs through the /admin/jobs routes.");
    } else {
        let _expiry = start_expiry_worker(Arc::clone(&apis.jobs));
        let _sync = start_payment_sync_worker(Arc::clone(&apis.jobs));
        let _reconcile = start_reconciliation_worker(Arc::clone(&apis.jobs));
    }
    let srv = create_server_instance(config, apis)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn create_server_instance(config: ServerConfig, apis: ServerApis) -> Result<Server, ServerError> {
    let admin_key = AdminKey(config.admin_api_key.clone());
    let options = config.options();
    let fallback = StaticRateFallback::default();
    let srv = HttpServer::new(move || {
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("zvr::access_log"))
            .configure(extractor_config)
            .app_data(web::Data::new(admin_key.clone()))
            .app_data(web::Data::new(options))
            .app_data(web::Data::new(fallback.clone()))
            .app_data(web::Data::new(apis.orders.clone()))
            .app_data(web::Data::new(apis.payments.clone()))
            .app_data(web::Data::new(apis.refunds.clone()))
            .app_data(web::Data::from(Arc::clone(&apis.jobs)))
            .app_data(web::Data::new(apis.shipping.clone()))
            .service(health)
            .service(CheckoutRoute::<Db, Ship>::new())
            .service(OrderByCodeRoute::<Db>::new())
            .service(CreatePaymentRoute::<Db, Gateway, Mail>::new())
            .service(PaymentWebhookRoute::<Db, Gateway, Mail>::new())
            .service(PackOrderRoute::<Db>::new())
            .service(ShipOrderRoute::<Db, Ship>::new())
            .service(DeliverOrderRoute::<Db>::new())
            .service(CompleteOrderRoute::<Db>::new())
            .service(CancelOrderRoute::<Db>::new())
            .service(MarkOrderPaidRoute::<Db>::new())
            .service(OrderHistoryRoute::<Db>::new())
            .service(SyncOrderPaymentRoute::<Db, Gateway, Mail>::new())
            .service(OrderRefundsRoute::<Db, Gateway>::new())
            .service(CreateRefundRoute::<Db, Gateway>::new())
            .service(RefundDetailRoute::<Db, Gateway>::new())
            .service(ProcessRefundRoute::<Db, Gateway>::new())
            .service(RetryRefundRoute::<Db, Gateway>::new())
            .service(MarkRefundCompletedRoute::<Db, Gateway>::new())
            .service(RejectRefundRoute::<Db, Gateway>::new())
            .service(CancelRefundRoute::<Db, Gateway>::new())
            .service(RunExpiryJobRoute::<Db, Gateway, Mail>::new())
            .service(RunSyncJobRoute::<Db, Gateway, Mail>::new())
            .service(RunReconcileJobRoute::<Db, Gateway, Mail>::new())
            .service(SyncLogsRoute::<Db, Gateway, Mail>::new())
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}

/// Body, path and query extraction failures are reported in the standard error envelope.
pub fn extractor_config(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default().error_handler(|e, _| ServerError::InvalidRequestBody(e.to_string()).into()),
    )
    .app_data(web::PathConfig::default().error_handler(|e, _| ServerError::InvalidRequestPath(e.to_string()).into()))
    .app_data(
        web::QueryConfig::default().error_handler(|e, _| ServerError::InvalidRequestBody(e.to_string()).into()),
    );
}
