use chrono::Duration;
use cucumber::{given, then, when};
use zvr_order_engine::{
    db_types::{
        Actor,
        EmailStatus,
        MovementType,
        OrderStatusType,
        PaymentStatus,
        RefundReason,
        RefundStatus,
        RefundType,
        Rupiah,
    },
    test_utils::{
        catalog::{checkout, product_stock},
        StubPaymentGateway,
    },
    traits::NewRefund,
    zvr_api::payment_objects::WebhookOutcome,
    EngineError,
    ErrorKind,
};

use crate::{cucumber::StoreWorld, support::admin};

//--------------------------------------         Orders          -------------------------------------------------------

#[when(expr = "a customer orders {int} of {string} with shipping {int}")]
async fn customer_orders(world: &mut StoreWorld, quantity: i64, name: String, shipping: i64) {
    let product = world.product(&name);
    let detail = world
        .sys()
        .orders
        .create_order(checkout(&[(product, None, quantity)], shipping), &Actor::Customer(1))
        .await
        .expect("Error creating order");
    world.order_code = Some(detail.order.order_code);
}

async fn pay_for_order(world: &mut StoreWorld) {
    open_payment_for_order(world).await;
    let total = world.order().await.total_amount;
    world.sys().settle(world.external_id(), total).await;
}

async fn open_payment_for_order(world: &mut StoreWorld) {
    let external_id = world.sys().open_payment(world.code()).await;
    world.external_id = Some(external_id);
}

#[given("the order has been paid")]
async fn order_is_paid(world: &mut StoreWorld) {
    pay_for_order(world).await;
}

#[given("the order has been delivered")]
async fn order_is_delivered(world: &mut StoreWorld) {
    pay_for_order(world).await;
    let sys = world.sys();
    let code = world.code();
    sys.orders.mark_packing(code, &admin()).await.expect("Error packing");
    sys.orders.mark_shipped_with_resi(code, "JNE0042424242", &admin()).await.expect("Error shipping");
    sys.orders.mark_delivered(code, &admin()).await.expect("Error delivering");
}

#[when("two admins cancel the order at the same time")]
async fn racing_cancellations(world: &mut StoreWorld) {
    let sys = world.sys();
    let code = world.code();
    let alice = Actor::Admin("alice@zvr.id".into());
    let bob = Actor::Admin("bob@zvr.id".into());
    let (a, b) = tokio::join!(
        sys.orders.cancel(code, &alice, Some("duplicate order")),
        sys.orders.cancel(code, &bob, Some("out of stock"))
    );
    world.race = vec![a, b];
}

#[then(expr = "the order total is {int}")]
async fn order_total(world: &mut StoreWorld, total: i64) {
    assert_eq!(world.order().await.total_amount, Rupiah::from(total));
}

#[then(expr = "the order status is {word}")]
async fn order_status(world: &mut StoreWorld, status: String) {
    let expected = status.parse::<OrderStatusType>().expect("Not an order status");
    assert_eq!(world.order().await.status, expected);
}

#[then(expr = "the stock of {string} is {int}")]
async fn stock_level(world: &mut StoreWorld, name: String, stock: i64) {
    let product = world.product(&name);
    assert_eq!(product_stock(&world.sys().db, product).await, stock);
}

#[then("the order no longer reserves stock")]
async fn stock_not_reserved(world: &mut StoreWorld) {
    assert!(!world.order().await.stock_reserved);
}

#[then("exactly one cancellation succeeds and the other is a state conflict")]
async fn one_cancellation_wins(world: &mut StoreWorld) {
    let wins = world.race.iter().filter(|r| r.is_ok()).count();
    assert_eq!(wins, 1, "Expected exactly one winner: {:?}", world.race);
    let loser = world.race.iter().find_map(|r| r.as_ref().err()).expect("Expected a failed cancellation");
    assert_eq!(loser.kind(), ErrorKind::StateConflict);
    assert!(matches!(loser, EngineError::InvalidTransition(_)));
}

#[then(expr = "the order has {int} RELEASE movement(s)")]
async fn release_movements(world: &mut StoreWorld, count: usize) {
    let movements = world.sys().orders.stock_movements_for_order(world.code()).await.expect("Error fetching ledger");
    let releases = movements.iter().filter(|m| m.movement_type == MovementType::Release).count();
    assert_eq!(releases, count);
}

//--------------------------------------        Payments         -------------------------------------------------------

#[when("a payment is opened for the order")]
async fn open_payment(world: &mut StoreWorld) {
    open_payment_for_order(world).await;
}

#[when(expr = "the gateway sends a {string} webhook with transaction {string}")]
async fn gateway_webhook(world: &mut StoreWorld, status: String, transaction_id: String) {
    let total = world.order().await.total_amount;
    let notification = StubPaymentGateway::webhook(world.external_id(), &status, &transaction_id, total);
    let outcome = world.sys().payments.handle_webhook(&notification, "{}").await;
    assert!(!matches!(outcome, WebhookOutcome::InvalidSignature | WebhookOutcome::Failed(_)), "{outcome:?}");
}

#[given(expr = "the gateway reports {string} with transaction {string} for the payment")]
async fn gateway_reports(world: &mut StoreWorld, status: String, transaction_id: String) {
    world.sys().gateway.set_status(world.external_id(), &status, Some(&transaction_id));
}

#[then(expr = "the payment status is {word}")]
async fn payment_status(world: &mut StoreWorld, status: String) {
    let expected = status.parse::<PaymentStatus>().expect("Not a payment status");
    let payment =
        world.sys().payments.payment_for_order(world.code()).await.expect("Error fetching payment").expect("No payment");
    assert_eq!(payment.status, expected);
}

#[then(expr = "the {word} email has been logged {int} time(s)")]
async fn email_logged(world: &mut StoreWorld, template: String, count: usize) {
    let log = world.sys().payments.email_log(world.code()).await.expect("Error fetching email log");
    let sent = log.iter().filter(|e| e.template_key == template && e.status == EmailStatus::Sent).count();
    assert_eq!(sent, count);
}

#[then("no email has been sent")]
async fn no_email(world: &mut StoreWorld) {
    assert!(world.sys().mailer.sent().is_empty());
}

#[then("a sync log records a resolved mismatch")]
async fn resolved_mismatch(world: &mut StoreWorld) {
    let logs = world.sys().payments.sync_logs(false).await.expect("Error fetching sync logs");
    assert!(logs.iter().any(|l| l.has_mismatch && l.resolved), "{logs:?}");
}

//--------------------------------------         Refunds         -------------------------------------------------------

fn partial_refund(world: &StoreWorld, items: i64, shipping: i64, key: &str) -> NewRefund {
    NewRefund {
        order_code: world.code().clone(),
        refund_type: RefundType::Partial,
        reason: RefundReason::DamagedItem,
        reason_detail: None,
        idempotency_key: key.to_string(),
        shipping_refund: Some(Rupiah::from(shipping)),
        items_refund: Some(Rupiah::from(items)),
        items: vec![],
        requested_by: admin(),
    }
}

#[when(expr = "a partial refund of {int} for items and {int} for shipping is requested with key {string}")]
async fn request_refund(world: &mut StoreWorld, items: i64, shipping: i64, key: String) {
    let request = partial_refund(world, items, shipping, &key);
    let created = world.sys().refunds.create_refund(request).await.expect("Error creating refund");
    world.refund = Some(created.refund);
}

#[when("the refund is processed")]
async fn process_refund(world: &mut StoreWorld) {
    let id = world.refund.as_ref().expect("No refund requested").id;
    let result = world.sys().refunds.process_refund(id, &admin()).await.expect("Error processing refund");
    world.refund = Some(result.refund);
}

#[then(expr = "the refund status is {word}")]
async fn refund_status(world: &mut StoreWorld, status: String) {
    let expected = status.parse::<RefundStatus>().expect("Not a refund status");
    assert_eq!(world.refund.as_ref().expect("No refund requested").status, expected);
}

#[then(expr = "the order refund amount is {int}")]
async fn order_refund_amount(world: &mut StoreWorld, amount: i64) {
    assert_eq!(world.order().await.refund_amount, Rupiah::from(amount));
}

#[then(expr = "requesting {int} for items and {int} for shipping with key {string} again returns the same refund")]
async fn same_refund_again(world: &mut StoreWorld, items: i64, shipping: i64, key: String) {
    let request = partial_refund(world, items, shipping, &key);
    let again = world.sys().refunds.create_refund(request).await.expect("Error repeating refund");
    assert!(!again.created);
    assert_eq!(Some(again.refund.id), world.refund.as_ref().map(|r| r.id));
}

//--------------------------------------          Jobs           -------------------------------------------------------

#[when(expr = "the clock moves forward by {int} hours and {int} second(s)")]
async fn advance_hours(world: &mut StoreWorld, hours: i64, seconds: i64) {
    world.sys().clock.advance(Duration::hours(hours) + Duration::seconds(seconds));
}

#[when(expr = "the clock moves forward by {int} minutes")]
async fn advance_minutes(world: &mut StoreWorld, minutes: i64) {
    world.sys().clock.advance(Duration::minutes(minutes));
}

#[when("the expiry sweep runs")]
async fn expiry_sweep(world: &mut StoreWorld) {
    let outcome = world.sys().jobs.run_expiry_sweep().await.expect("Expiry sweep failed");
    assert!(!outcome.is_skipped());
}

#[when("the payment sync sweep runs")]
async fn sync_sweep(world: &mut StoreWorld) {
    let outcome = world.sys().jobs.run_payment_sync_sweep().await.expect("Payment sync sweep failed");
    assert!(!outcome.is_skipped());
}
