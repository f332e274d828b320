//! Request handler definitions
//!
//! Define each route and its handler here. Handlers are generic over the engine backend and the external
//! collaborators, so they can be exercised against mocks and stubs; the `route!` macro binds the generics when the
//! route is mounted.
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause the
//! current worker to stop processing new requests. Every database and gateway call below is asynchronous for this
//! reason. Never add a blocking call to a handler.
use actix_web::{get, web, HttpRequest, HttpResponse, Responder};
use log::*;
use serde_json::json;
use zvr_order_engine::{
    collaborators::{Mailer, PaymentGateway, RateRequest, ShippingGateway, StaticRateFallback, WebhookNotification},
    db_types::{NewOrder, OrderCode, Rupiah, SyncSource},
    payment_objects::WebhookOutcome,
    traits::{JobManagement, OrderManagement, PaymentManagement, RefundManagement},
    JobsApi,
    OrderFlowApi,
    PaymentApi,
    RefundApi,
};

use crate::{
    auth::{Principal, Role},
    config::ServerOptions,
    data_objects::{
        CancelParams,
        CheckoutRequest,
        CheckoutResponse,
        CloseRefundParams,
        CreatePaymentRequest,
        JsonResponse,
        NoteParams,
        OrderQuery,
        OrderView,
        ReconcileParams,
        RefundOutcomeResponse,
        RefundRequest,
        RefundResponse,
        ShipParams,
        SyncLogQuery,
        TransitionResponse,
    },
    errors::ServerError,
    helpers::{idempotency_key, parcel_weight, quote_shipping},
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal requires [$($roles:expr),+]) => {
        paste::paste! {
            pub struct [<$name:camel Route>];

            impl [<$name:camel Route>] {
                #[allow(clippy::new_without_default)]
                pub fn new() -> Self {
                    Self
                }
            }

            impl actix_web::dev::HttpServiceFactory for [<$name:camel Route>] {
                fn register(self, config: &mut actix_web::dev::AppService) {
                    let res = actix_web::Resource::new($path)
                        .name(stringify!($name))
                        .guard(actix_web::guard::$method())
                        .to($name)
                        .wrap($crate::middleware::AclMiddlewareFactory::new(&[$($roles),+]));
                    actix_web::dev::HttpServiceFactory::register(res, config);
                }
            }
        }
    };

    ($name:ident => $method:ident $path:literal impl $($bounds:ident),+) => {
        $crate::route!(@generic $name => $method $path [$($bounds),+] []);
    };

    ($name:ident => $method:ident $path:literal impl $($bounds:ident),+ where requires [$($roles:expr),+]) => {
        $crate::route!(@generic $name => $method $path [$($bounds),+] [$($roles),+]);
    };

    (@generic $name:ident => $method:ident $path:literal [$($bounds:ident),+] [$($roles:expr),*]) => {
        paste::paste! {
            pub struct [<$name:camel Route>]<$([<T $bounds>],)+>($(core::marker::PhantomData<fn() -> [<T $bounds>]>,)+);

            impl<$([<T $bounds>],)+> [<$name:camel Route>]<$([<T $bounds>],)+> {
                #[allow(clippy::new_without_default)]
                pub fn new() -> Self {
                    Self($(core::marker::PhantomData::<fn() -> [<T $bounds>]>,)+)
                }
            }

            impl<$([<T $bounds>],)+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds>],)+>
            where
                $([<T $bounds>]: $bounds + 'static,)+
            {
                fn register(self, config: &mut actix_web::dev::AppService) {
                    let res = actix_web::Resource::new($path)
                        .name(stringify!($name))
                        .guard(actix_web::guard::$method())
                        .to($name::<$([<T $bounds>],)+>);
                    $crate::route!(@register res config [$($roles),*]);
                }
            }
        }
    };

    (@register $res:ident $config:ident []) => {
        actix_web::dev::HttpServiceFactory::register($res, $config);
    };

    (@register $res:ident $config:ident [$($roles:expr),+]) => {
        let $res = $res.wrap($crate::middleware::AclMiddlewareFactory::new(&[$($roles),+]));
        actix_web::dev::HttpServiceFactory::register($res, $config);
    };
}

/// Backends that can run the background jobs.
pub trait JobBackend: JobManagement + PaymentManagement {}

impl<T: JobManagement + PaymentManagement> JobBackend for T {}

#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

fn parse_order_code(code: &str) -> Result<OrderCode, ServerError> {
    code.parse::<OrderCode>().map_err(|e| ServerError::InvalidRequestPath(e.to_string()))
}

//----------------------------------------------   Checkout  ----------------------------------------------------
route!(checkout => Post "/checkout" impl OrderManagement, ShippingGateway);
/// Creates an order from the cart, reserving stock for every line. Shipping is quoted here, so the total returned is
/// what the customer will be charged.
pub async fn checkout<B: OrderManagement, S: ShippingGateway>(
    principal: Principal,
    body: web::Json<CheckoutRequest>,
    api: web::Data<OrderFlowApi<B>>,
    shipping: web::Data<S>,
    fallback: web::Data<StaticRateFallback>,
    options: web::Data<ServerOptions>,
) -> Result<HttpResponse, ServerError> {
    let request = body.into_inner();
    debug!("💻️ POST checkout with {} lines, shipping by {}", request.items.len(), request.courier);
    let rate_request = RateRequest {
        destination: request.shipping_address.clone(),
        weight_grams: parcel_weight(&request.items),
        courier: request.courier.clone(),
        courier_service: request.courier_service.clone(),
    };
    let shipping_cost =
        quote_shipping(shipping.get_ref(), fallback.get_ref(), &rate_request, options.deadlines.shipping).await?;
    let order = NewOrder {
        user_id: principal.user_id(),
        customer: request.customer,
        shipping_address: request.shipping_address,
        courier: Some(request.courier),
        courier_service: request.courier_service,
        items: request.items,
        shipping_cost,
        tax_rate_bps: options.tax_rate_bps,
        discount: Rupiah::zero(),
    };
    let detail = api.create_order(order, &principal.actor()).await?;
    let response = CheckoutResponse { order_code: detail.order.order_code, total_amount: detail.order.total_amount };
    Ok(HttpResponse::Created().json(response))
}

//----------------------------------------------   Orders  ----------------------------------------------------
route!(order_by_code => Get "/orders/{code}" impl OrderManagement);
/// The full order is shown to its owner, to admins, and to anyone who supplies the order's email address. Everyone
/// else gets a masked view.
pub async fn order_by_code<B: OrderManagement>(
    principal: Principal,
    path: web::Path<String>,
    query: web::Query<OrderQuery>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let code = parse_order_code(&path)?;
    debug!("💻️ GET order {code}");
    let detail = api.fetch_order_detail(&code).await?;
    let by_email = query.email.as_deref().is_some_and(|email| detail.order.is_owned_by_email(email));
    let view = if by_email || principal.can_view(&detail.order) {
        OrderView::full(detail)
    } else {
        trace!("💻️ Caller is not entitled to the full view of {code}");
        OrderView::masked(detail)
    };
    Ok(HttpResponse::Ok().json(view))
}

//----------------------------------------------   Payments  ----------------------------------------------------
route!(create_payment => Post "/payments/create" impl PaymentManagement, PaymentGateway, Mailer);
pub async fn create_payment<B: PaymentManagement, G: PaymentGateway, M: Mailer>(
    body: web::Json<CreatePaymentRequest>,
    api: web::Data<PaymentApi<B, G, M>>,
) -> Result<HttpResponse, ServerError> {
    let CreatePaymentRequest { order_id, method } = body.into_inner();
    debug!("💻️ POST create payment for {order_id} via {method}");
    let instructions = api.open_payment(&order_id, method).await?;
    Ok(HttpResponse::Created().json(instructions))
}

route!(payment_webhook => Post "/webhook/payment" impl PaymentManagement, PaymentGateway, Mailer);
/// The gateway's notification callback. This always answers 200: a failure response would only make the gateway
/// redeliver, so failures are logged and recorded for reconciliation instead.
pub async fn payment_webhook<B: PaymentManagement, G: PaymentGateway, M: Mailer>(
    body: web::Bytes,
    api: web::Data<PaymentApi<B, G, M>>,
) -> HttpResponse {
    let raw = String::from_utf8_lossy(&body);
    trace!("💻️ Received payment webhook: {raw}");
    let notification = match serde_json::from_str::<WebhookNotification>(&raw) {
        Ok(n) => n,
        Err(e) => {
            warn!("💻️ Could not read the payment notification. {e}");
            api.record_unreadable_webhook(&e.to_string()).await;
            return HttpResponse::Ok().json(JsonResponse::failure("Notification could not be read."));
        },
    };
    let outcome = api.handle_webhook(&notification, &raw).await;
    let message = match &outcome {
        WebhookOutcome::Handled(change) => {
            debug!("💻️ Notification for {} handled: {change:?}", notification.order_id);
            return HttpResponse::Ok().json(JsonResponse::success("Notification received."));
        },
        WebhookOutcome::InvalidSignature => "Invalid signature.".to_string(),
        WebhookOutcome::UnknownPayment(id) => format!("Unknown payment {id}."),
        WebhookOutcome::Failed(e) => format!("Notification could not be applied. {e}"),
    };
    HttpResponse::Ok().json(JsonResponse::failure(message))
}

//----------------------------------------------   Admin: orders  ----------------------------------------------------
route!(pack_order => Post "/admin/orders/{code}/pack" impl OrderManagement where requires [Role::Admin]);
pub async fn pack_order<B: OrderManagement>(
    principal: Principal,
    path: web::Path<String>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let code = parse_order_code(&path)?;
    debug!("💻️ POST pack order {code}");
    let result = api.mark_packing(&code, &principal.actor()).await?;
    Ok(HttpResponse::Ok().json(TransitionResponse::from(result)))
}

route!(ship_order => Post "/admin/orders/{code}/ship" impl OrderManagement, ShippingGateway where requires [Role::Admin]);
/// Ships a packed order. If no tracking number is given, a waybill is booked with the shipping gateway.
pub async fn ship_order<B: OrderManagement, S: ShippingGateway>(
    principal: Principal,
    path: web::Path<String>,
    body: Option<web::Json<ShipParams>>,
    api: web::Data<OrderFlowApi<B>>,
    shipping: web::Data<S>,
    options: web::Data<ServerOptions>,
) -> Result<HttpResponse, ServerError> {
    let code = parse_order_code(&path)?;
    let resi = body.and_then(|b| b.into_inner().resi);
    debug!("💻️ POST ship order {code} with resi {}", resi.as_deref().unwrap_or("(from waybill)"));
    let result = api
        .ship_order(&code, resi.as_deref(), &principal.actor(), shipping.get_ref(), options.deadlines.shipping)
        .await?;
    Ok(HttpResponse::Ok().json(TransitionResponse::from(result)))
}

route!(deliver_order => Post "/admin/orders/{code}/deliver" impl OrderManagement where requires [Role::Admin]);
pub async fn deliver_order<B: OrderManagement>(
    principal: Principal,
    path: web::Path<String>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let code = parse_order_code(&path)?;
    debug!("💻️ POST deliver order {code}");
    let result = api.mark_delivered(&code, &principal.actor()).await?;
    Ok(HttpResponse::Ok().json(TransitionResponse::from(result)))
}

route!(complete_order => Post "/admin/orders/{code}/complete" impl OrderManagement where requires [Role::Admin]);
pub async fn complete_order<B: OrderManagement>(
    principal: Principal,
    path: web::Path<String>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let code = parse_order_code(&path)?;
    debug!("💻️ POST complete order {code}");
    let result = api.mark_completed(&code, &principal.actor()).await?;
    Ok(HttpResponse::Ok().json(TransitionResponse::from(result)))
}

route!(cancel_order => Post "/admin/orders/{code}/cancel" impl OrderManagement where requires [Role::Admin]);
pub async fn cancel_order<B: OrderManagement>(
    principal: Principal,
    path: web::Path<String>,
    body: Option<web::Json<CancelParams>>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let code = parse_order_code(&path)?;
    let reason = body.and_then(|b| b.into_inner().reason);
    debug!("💻️ POST cancel order {code}. Reason: {}", reason.as_deref().unwrap_or("none given"));
    let result = api.cancel(&code, &principal.actor(), reason.as_deref()).await?;
    Ok(HttpResponse::Ok().json(TransitionResponse::from(result)))
}

route!(mark_order_paid => Post "/admin/orders/{code}/mark-paid" impl OrderManagement where requires [Role::Admin]);
/// For payments received outside the gateway. The note is kept in the order history.
pub async fn mark_order_paid<B: OrderManagement>(
    principal: Principal,
    path: web::Path<String>,
    body: web::Json<NoteParams>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let code = parse_order_code(&path)?;
    let NoteParams { note } = body.into_inner();
    if note.trim().is_empty() {
        return Err(ServerError::InvalidRequestBody("A note is required".to_string()));
    }
    info!("💻️ POST mark order {code} as paid by {}", principal.actor());
    let result = api.mark_paid(&code, &principal.actor(), &note).await?;
    Ok(HttpResponse::Ok().json(TransitionResponse::from(result)))
}

route!(order_history => Get "/admin/orders/{code}/history" impl OrderManagement where requires [Role::Admin]);
pub async fn order_history<B: OrderManagement>(
    path: web::Path<String>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let code = parse_order_code(&path)?;
    let history = api.history(&code).await?;
    Ok(HttpResponse::Ok().json(history))
}

route!(sync_order_payment => Post "/admin/orders/{code}/sync-payment" impl PaymentManagement, PaymentGateway, Mailer where requires [Role::Admin]);
/// Pulls the gateway's view of the order's latest payment and applies it.
pub async fn sync_order_payment<B: PaymentManagement, G: PaymentGateway, M: Mailer>(
    path: web::Path<String>,
    api: web::Data<PaymentApi<B, G, M>>,
) -> Result<HttpResponse, ServerError> {
    let code = parse_order_code(&path)?;
    debug!("💻️ POST sync payment for {code}");
    let result = api.sync_payment(&code, SyncSource::Manual).await?;
    Ok(HttpResponse::Ok().json(json!({
        "order_code": result.order.order_code,
        "order_status": result.order.status,
        "payment_status": result.payment.status,
        "change": format!("{:?}", result.change),
    })))
}

route!(order_refunds => Get "/admin/orders/{code}/refunds" impl RefundManagement, PaymentGateway where requires [Role::Admin]);
pub async fn order_refunds<B: RefundManagement, G: PaymentGateway>(
    path: web::Path<String>,
    api: web::Data<RefundApi<B, G>>,
) -> Result<HttpResponse, ServerError> {
    let code = parse_order_code(&path)?;
    let refunds = api.refunds_for_order(&code).await?;
    Ok(HttpResponse::Ok().json(refunds))
}

//----------------------------------------------   Admin: refunds  ----------------------------------------------------
route!(create_refund => Post "/admin/refunds" impl RefundManagement, PaymentGateway where requires [Role::Admin]);
/// Records a refund request. Repeating the request with the same `Idempotency-Key` returns the original refund with a
/// 200 instead of a 201.
pub async fn create_refund<B: RefundManagement, G: PaymentGateway>(
    req: HttpRequest,
    principal: Principal,
    body: web::Json<RefundRequest>,
    api: web::Data<RefundApi<B, G>>,
) -> Result<HttpResponse, ServerError> {
    let key = idempotency_key(&req)?;
    let request = body.into_inner();
    debug!("💻️ POST {} refund for {} (key {key})", request.refund_type, request.order_code);
    let created = api.create_refund(request.into_new_refund(key, principal.actor())).await?;
    let response = RefundResponse::from(created);
    if response.created {
        Ok(HttpResponse::Created().json(response))
    } else {
        Ok(HttpResponse::Ok().json(response))
    }
}

route!(refund_detail => Get "/admin/refunds/{id}" impl RefundManagement, PaymentGateway where requires [Role::Admin]);
pub async fn refund_detail<B: RefundManagement, G: PaymentGateway>(
    path: web::Path<i64>,
    api: web::Data<RefundApi<B, G>>,
) -> Result<HttpResponse, ServerError> {
    let detail = api.refund_detail(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(detail))
}

route!(process_refund => Post "/admin/refunds/{id}/process" impl RefundManagement, PaymentGateway where requires [Role::Admin]);
pub async fn process_refund<B: RefundManagement, G: PaymentGateway>(
    principal: Principal,
    path: web::Path<i64>,
    api: web::Data<RefundApi<B, G>>,
) -> Result<HttpResponse, ServerError> {
    let id = path.into_inner();
    debug!("💻️ POST process refund {id}");
    let result = api.process_refund(id, &principal.actor()).await?;
    Ok(HttpResponse::Ok().json(RefundOutcomeResponse::from(result)))
}

route!(retry_refund => Post "/admin/refunds/{id}/retry" impl RefundManagement, PaymentGateway where requires [Role::Admin]);
pub async fn retry_refund<B: RefundManagement, G: PaymentGateway>(
    principal: Principal,
    path: web::Path<i64>,
    api: web::Data<RefundApi<B, G>>,
) -> Result<HttpResponse, ServerError> {
    let id = path.into_inner();
    debug!("💻️ POST retry refund {id}");
    let result = api.retry_refund(id, &principal.actor()).await?;
    Ok(HttpResponse::Ok().json(RefundOutcomeResponse::from(result)))
}

route!(mark_refund_completed => Post "/admin/refunds/{id}/mark-completed" impl RefundManagement, PaymentGateway where requires [Role::Admin]);
pub async fn mark_refund_completed<B: RefundManagement, G: PaymentGateway>(
    principal: Principal,
    path: web::Path<i64>,
    body: web::Json<NoteParams>,
    api: web::Data<RefundApi<B, G>>,
) -> Result<HttpResponse, ServerError> {
    let id = path.into_inner();
    info!("💻️ POST mark refund {id} completed by {}", principal.actor());
    let result = api.mark_manually_completed(id, &principal.actor(), &body.note).await?;
    Ok(HttpResponse::Ok().json(RefundOutcomeResponse::from(result)))
}

route!(reject_refund => Post "/admin/refunds/{id}/reject" impl RefundManagement, PaymentGateway where requires [Role::Admin]);
pub async fn reject_refund<B: RefundManagement, G: PaymentGateway>(
    principal: Principal,
    path: web::Path<i64>,
    body: web::Json<CloseRefundParams>,
    api: web::Data<RefundApi<B, G>>,
) -> Result<HttpResponse, ServerError> {
    let id = path.into_inner();
    debug!("💻️ POST reject refund {id}");
    let refund = api.reject_refund(id, &principal.actor(), &body.reason).await?;
    Ok(HttpResponse::Ok().json(refund))
}

route!(cancel_refund => Post "/admin/refunds/{id}/cancel" impl RefundManagement, PaymentGateway where requires [Role::Admin]);
pub async fn cancel_refund<B: RefundManagement, G: PaymentGateway>(
    principal: Principal,
    path: web::Path<i64>,
    body: web::Json<CloseRefundParams>,
    api: web::Data<RefundApi<B, G>>,
) -> Result<HttpResponse, ServerError> {
    let id = path.into_inner();
    debug!("💻️ POST cancel refund {id}");
    let refund = api.cancel_refund(id, &principal.actor(), &body.reason).await?;
    Ok(HttpResponse::Ok().json(refund))
}

//----------------------------------------------   Admin: jobs  ----------------------------------------------------
route!(run_expiry_job => Post "/admin/jobs/expire/run" impl JobBackend, PaymentGateway, Mailer where requires [Role::Admin]);
pub async fn run_expiry_job<B: JobBackend, G: PaymentGateway, M: Mailer>(
    api: web::Data<JobsApi<B, G, M>>,
) -> Result<HttpResponse, ServerError> {
    info!("💻️ Order expiry sweep triggered by hand");
    let outcome = api.run_expiry_sweep().await?;
    Ok(HttpResponse::Ok().json(outcome))
}

route!(run_sync_job => Post "/admin/jobs/sync/run" impl JobBackend, PaymentGateway, Mailer where requires [Role::Admin]);
pub async fn run_sync_job<B: JobBackend, G: PaymentGateway, M: Mailer>(
    api: web::Data<JobsApi<B, G, M>>,
) -> Result<HttpResponse, ServerError> {
    info!("💻️ Payment sync sweep triggered by hand");
    let outcome = api.run_payment_sync_sweep().await?;
    Ok(HttpResponse::Ok().json(outcome))
}

route!(run_reconcile_job => Post "/admin/jobs/reconcile/run" impl JobBackend, PaymentGateway, Mailer where requires [Role::Admin]);
/// Runs the reconciliation regardless of the time-of-day window.
pub async fn run_reconcile_job<B: JobBackend, G: PaymentGateway, M: Mailer>(
    body: Option<web::Json<ReconcileParams>>,
    api: web::Data<JobsApi<B, G, M>>,
) -> Result<HttpResponse, ServerError> {
    let date = body.and_then(|b| b.into_inner().date);
    info!("💻️ Reconciliation triggered by hand for {}", date.map(|d| d.to_string()).unwrap_or("yesterday".into()));
    let outcome = api.run_daily_reconciliation(date).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

route!(sync_logs => Get "/admin/sync-logs" impl PaymentManagement, PaymentGateway, Mailer where requires [Role::Admin]);
pub async fn sync_logs<B: PaymentManagement, G: PaymentGateway, M: Mailer>(
    query: web::Query<SyncLogQuery>,
    api: web::Data<PaymentApi<B, G, M>>,
) -> Result<HttpResponse, ServerError> {
    let logs = api.sync_logs(query.unresolved).await?;
    Ok(HttpResponse::Ok().json(logs))
}
