use std::fmt::Debug;

use chrono::Duration;
use log::*;

use crate::{
    collaborators::{
        with_deadline,
        ChargeItem,
        ChargeRequest,
        Mailer,
        PaymentGateway,
        TemplateVariables,
        WebhookNotification,
        ORDER_PAID_TEMPLATE,
    },
    db_types::{
        CustomerInfo,
        EmailLog,
        EmailStatus,
        NewSyncLog,
        Order,
        OrderCode,
        OrderItem,
        OrderStatusType,
        Payment,
        PaymentMethod,
        PaymentSyncLog,
        SyncSource,
    },
    errors::EngineError,
    events::{EventProducers, OrderAnnulledEvent, OrderPaidEvent},
    helpers::sync_backoff,
    traits::{PaymentManagement, PaymentUpdateResult},
    zvr_api::{
        config::GatewayDeadlines,
        payment_objects::{PaymentInstructions, WebhookOutcome},
    },
};

/// `PaymentApi` coordinates payments between the store and the payment gateway.
///
/// Every gateway call is made outside the database transactions of the backend: the payment slot is reserved and
/// committed first, the gateway is called under a deadline, and the result is applied in a fresh transaction under the
/// order lock.
///
/// Settlements that move an order to PAID trigger the "payment received" email. The email log guarantees that it is
/// sent at most once per order, however many times the settlement is reported.
pub struct PaymentApi<B, G, M> {
    db: B,
    gateway: G,
    mailer: M,
    producers: EventProducers,
    deadlines: GatewayDeadlines,
}

impl<B, G, M> Debug for PaymentApi<B, G, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentApi ({:?})", self.deadlines)
    }
}

impl<B: Clone, G: Clone, M: Clone> Clone for PaymentApi<B, G, M> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            gateway: self.gateway.clone(),
            mailer: self.mailer.clone(),
            producers: self.producers.clone(),
            deadlines: self.deadlines,
        }
    }
}

impl<B, G, M> PaymentApi<B, G, M> {
    pub fn new(db: B, gateway: G, mailer: M, producers: EventProducers) -> Self {
        Self { db, gateway, mailer, producers, deadlines: GatewayDeadlines::default() }
    }

    pub fn with_deadlines(mut self, deadlines: GatewayDeadlines) -> Self {
        self.deadlines = deadlines;
        self
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }
}

impl<B, G, M> PaymentApi<B, G, M>
where
    B: PaymentManagement,
    G: PaymentGateway,
    M: Mailer,
{
    /// Opens a payment for a PENDING order and creates the gateway charge for it.
    ///
    /// A charge the gateway refuses outright closes the payment as FAILED so that another can be opened. If the
    /// gateway cannot be reached the payment stays PENDING; the sync sweep will find out what the gateway did with it.
    pub async fn open_payment(&self, code: &OrderCode, method: PaymentMethod) -> Result<PaymentInstructions, EngineError> {
        let (order, payment) = self.db.reserve_payment(code, method).await?;
        let items = self.db.fetch_order_items(order.id).await?;
        let request = charge_request(&order, &payment, &items);
        match with_deadline(self.deadlines.charge, self.gateway.create_charge(&request)).await {
            Ok(charge) => {
                let payment = self.db.attach_charge(payment.id, &charge).await?;
                info!("💳️ Payment {} opened for order {code} via {method}", payment.external_id);
                Ok(PaymentInstructions::new(order.order_code, &payment))
            },
            Err(e) if !e.is_transient() => {
                warn!("💳️ Gateway refused the charge for order {code}: {e}");
                self.db.reject_charge(payment.id, &e.to_string()).await?;
                Err(e.into())
            },
            Err(e) => {
                warn!(
                    "💳️ Charge for payment {} did not complete: {e}. It stays PENDING until the next status sync.",
                    payment.external_id
                );
                Err(e.into())
            },
        }
    }

    /// Handles a gateway notification. This never fails: anything that goes wrong is logged and written to the
    /// payment sync log for later reconciliation.
    pub async fn handle_webhook(&self, notification: &WebhookNotification, raw: &str) -> WebhookOutcome {
        if !self.gateway.verify_webhook_signature(notification) {
            warn!("💳️ Webhook for {} has an invalid signature. Ignoring it.", notification.order_id);
            return WebhookOutcome::InvalidSignature;
        }
        let payment = match self.db.fetch_payment_by_external_id(&notification.order_id).await {
            Ok(Some(p)) => p,
            Ok(None) => {
                warn!("💳️ Webhook refers to unknown payment {}", notification.order_id);
                let log = NewSyncLog::default()
                    .with_gateway_status(notification.transaction_status.as_str())
                    .with_error(format!("unknown payment {}", notification.order_id));
                self.log_webhook_failure(log).await;
                return WebhookOutcome::UnknownPayment(notification.order_id.clone());
            },
            Err(e) => {
                error!("💳️ Could not look up payment {} for a webhook: {e}", notification.order_id);
                let log = NewSyncLog::default()
                    .with_gateway_status(notification.transaction_status.as_str())
                    .with_error(e.to_string());
                self.log_webhook_failure(log).await;
                return WebhookOutcome::Failed(e.to_string());
            },
        };
        let status = notification.to_transaction_status(raw);
        match self.db.apply_gateway_status(payment.id, &status, SyncSource::Webhook).await {
            Ok(result) => {
                self.after_update(&result).await;
                WebhookOutcome::Handled(result.change)
            },
            Err(e) => {
                error!("💳️ Could not apply webhook {} to payment {}: {e}", status.transaction_status, payment.external_id);
                let log = NewSyncLog::for_payment(&payment)
                    .with_gateway_status(status.transaction_status.as_str())
                    .with_error(e.to_string());
                self.log_webhook_failure(log).await;
                WebhookOutcome::Failed(e.to_string())
            },
        }
    }

    /// Records a notification body that could not be parsed at all.
    pub async fn record_unreadable_webhook(&self, error: &str) {
        warn!("💳️ Received an unreadable webhook: {error}");
        let log = NewSyncLog::default().with_error(format!("unreadable notification: {error}"));
        self.log_webhook_failure(log).await;
    }

    async fn log_webhook_failure(&self, log: NewSyncLog) {
        if let Err(e) = self.db.insert_sync_log(SyncSource::Webhook, log).await {
            error!("💳️ Could not record the webhook failure either: {e}");
        }
    }

    /// Pulls the gateway status of the order's latest payment and applies it.
    pub async fn sync_payment(&self, code: &OrderCode, source: SyncSource) -> Result<PaymentUpdateResult, EngineError> {
        let payment = self
            .payment_for_order(code)
            .await?
            .ok_or_else(|| EngineError::PaymentNotFound(format!("for order {code}")))?;
        self.sync(&payment, source).await
    }

    /// Pulls the gateway status of a single payment and applies it. A failed poll is counted against the payment and
    /// the next poll is pushed back.
    pub async fn sync(&self, payment: &Payment, source: SyncSource) -> Result<PaymentUpdateResult, EngineError> {
        let status = with_deadline(self.deadlines.status, self.gateway.get_transaction_status(&payment.external_id)).await;
        match status {
            Ok(status) => {
                let result = self.db.apply_gateway_status(payment.id, &status, source).await?;
                self.after_update(&result).await;
                Ok(result)
            },
            Err(e) => {
                let attempt = payment.sync_retry_count + 1;
                let next_sync_at = self.db.now() + sync_backoff(attempt);
                warn!(
                    "💳️ Status poll {attempt} for payment {} failed: {e}. Next poll after {next_sync_at}",
                    payment.external_id
                );
                self.db.record_sync_failure(payment.id, &e.to_string(), source, Some(next_sync_at)).await?;
                Err(e.into())
            },
        }
    }

    /// Expires the payment, and its order, once the gateway's expiry time plus `grace` has passed.
    pub async fn expire_payment(&self, payment_id: i64, grace: Duration) -> Result<PaymentUpdateResult, EngineError> {
        let result = self.db.expire_payment(payment_id, grace).await?;
        self.after_update(&result).await;
        Ok(result)
    }

    pub async fn payment_for_order(&self, code: &OrderCode) -> Result<Option<Payment>, EngineError> {
        let order = self.db.fetch_order(code).await?.ok_or_else(|| EngineError::OrderNotFound(code.to_string()))?;
        self.db.fetch_latest_payment_for_order(order.id).await
    }

    pub async fn sync_logs(&self, unresolved_only: bool) -> Result<Vec<PaymentSyncLog>, EngineError> {
        self.db.fetch_sync_logs(unresolved_only).await
    }

    pub async fn email_log(&self, code: &OrderCode) -> Result<Vec<EmailLog>, EngineError> {
        let order = self.db.fetch_order(code).await?.ok_or_else(|| EngineError::OrderNotFound(code.to_string()))?;
        self.db.fetch_email_log(order.id).await
    }

    async fn after_update(&self, result: &PaymentUpdateResult) {
        match result.order_transition {
            Some((_, OrderStatusType::Paid)) => {
                self.send_paid_email(&result.order).await;
                let event = OrderPaidEvent::new(result.order.clone(), Some(result.payment.clone()));
                self.producers.publish_order_paid(event).await;
            },
            Some((_, to)) if to.releases_stock() => {
                self.producers.publish_order_annulled(OrderAnnulledEvent::new(result.order.clone())).await;
            },
            _ => {},
        }
    }

    /// Sends the payment received email unless it was sent, or attempted, before. Failures are recorded in the email
    /// log and never propagate.
    async fn send_paid_email(&self, order: &Order) {
        let entry = match self.db.claim_email(order.id, ORDER_PAID_TEMPLATE, &order.customer_email).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                debug!("💳️ The payment email for order {} was already sent", order.order_code);
                return;
            },
            Err(e) => {
                error!("💳️ Could not claim the payment email for order {}: {e}", order.order_code);
                return;
            },
        };
        let variables = paid_email_variables(order);
        let sent = with_deadline(
            self.deadlines.mail,
            self.mailer.send(ORDER_PAID_TEMPLATE, &order.customer_email, &variables),
        )
        .await;
        let update = match sent {
            Ok(()) => {
                info!("💳️ Payment email sent for order {}", order.order_code);
                self.db.update_email_status(entry.id, EmailStatus::Sent, None).await
            },
            Err(e) => {
                warn!("💳️ Payment email for order {} was not sent: {e}", order.order_code);
                self.db.update_email_status(entry.id, EmailStatus::Failed, Some(&e.to_string())).await
            },
        };
        if let Err(e) = update {
            error!("💳️ Could not update email log entry {}: {e}", entry.id);
        }
    }
}

fn charge_request(order: &Order, payment: &Payment, items: &[OrderItem]) -> ChargeRequest {
    let mut lines = items
        .iter()
        .map(|i| ChargeItem {
            id: i.variant_id.map(|v| format!("{}-{v}", i.product_id)).unwrap_or_else(|| i.product_id.to_string()),
            name: i.product_name.clone(),
            price: i.price_per_unit,
            quantity: i.quantity,
        })
        .collect::<Vec<_>>();
    // The gateway checks that the lines add up to the gross amount.
    let extra = [("shipping", "Shipping", order.shipping_cost), ("tax", "Tax", order.tax)];
    for (id, name, amount) in extra {
        if amount.is_positive() {
            lines.push(ChargeItem { id: id.into(), name: name.into(), price: amount, quantity: 1 });
        }
    }
    if order.discount.is_positive() {
        let price = -order.discount;
        lines.push(ChargeItem { id: "discount".into(), name: "Discount".into(), price, quantity: 1 });
    }
    ChargeRequest {
        external_id: payment.external_id.clone(),
        order_code: order.order_code.to_string(),
        amount: payment.amount,
        method: payment.method,
        customer: CustomerInfo {
            name: order.customer_name.clone(),
            email: order.customer_email.clone(),
            phone: order.customer_phone.clone(),
        },
        items: lines,
    }
}

fn paid_email_variables(order: &Order) -> TemplateVariables {
    let mut vars = TemplateVariables::new();
    vars.insert("order_code".into(), order.order_code.to_string());
    vars.insert("customer_name".into(), order.customer_name.clone());
    vars.insert("total_amount".into(), order.total_amount.to_string());
    if let Some(paid_at) = order.paid_at {
        vars.insert("paid_at".into(), paid_at.to_rfc3339());
    }
    vars
}

#[cfg(test)]
mod test {
    use chrono::Utc;

    use super::*;
    use crate::db_types::{OrderRefundStatus, PaymentStatus, Rupiah};

    fn order() -> Order {
        let now = Utc::now();
        Order {
            id: 1,
            order_code: OrderCode::new("ZVR-20240101-0A1B2C3D"),
            user_id: None,
            customer_name: "Sari".into(),
            customer_email: "sari@example.com".into(),
            customer_phone: "0812".into(),
            shipping_address: "Jl. Merdeka 1".into(),
            courier: Some("jne".into()),
            courier_service: Some("reg".into()),
            subtotal: Rupiah::from(100_000),
            shipping_cost: Rupiah::from(15_000),
            tax: Rupiah::from(0),
            discount: Rupiah::from(5_000),
            total_amount: Rupiah::from(110_000),
            status: OrderStatusType::Pending,
            stock_reserved: true,
            resi: None,
            paid_at: None,
            shipped_at: None,
            delivered_at: None,
            completed_at: None,
            cancelled_at: None,
            refund_status: None::<OrderRefundStatus>,
            refund_amount: Rupiah::from(0),
            refunded_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn payment() -> Payment {
        let now = Utc::now();
        Payment {
            id: 7,
            order_id: 1,
            external_id: "ZVR-20240101-0A1B2C3D".into(),
            method: PaymentMethod::BcaVa,
            status: PaymentStatus::Pending,
            amount: Rupiah::from(110_000),
            transaction_id: None,
            fraud_status: None,
            va_number: None,
            qr_code_url: None,
            raw_response: None,
            expiry_time: None,
            paid_at: None,
            sync_retry_count: 0,
            next_sync_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn charge_lines_add_up_to_the_total() {
        let items = vec![OrderItem {
            id: 1,
            order_id: 1,
            product_id: 3,
            variant_id: Some(9),
            product_name: "Linen shirt".into(),
            product_image: None,
            quantity: 2,
            price_per_unit: Rupiah::from(50_000),
            subtotal: Rupiah::from(100_000),
        }];
        let request = charge_request(&order(), &payment(), &items);
        let sum: Rupiah = request.items.iter().map(|i| i.price * i.quantity).sum();
        assert_eq!(sum, request.amount);
        assert_eq!(request.items.len(), 3);
        assert_eq!(request.items[0].id, "3-9");
        assert_eq!(request.external_id, "ZVR-20240101-0A1B2C3D");
    }

    #[test]
    fn email_variables() {
        let vars = paid_email_variables(&order());
        assert_eq!(vars["order_code"], "ZVR-20240101-0A1B2C3D");
        assert!(!vars.contains_key("paid_at"));
    }
}
