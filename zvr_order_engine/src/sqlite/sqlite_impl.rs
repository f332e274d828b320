//! `SqliteDatabase` is the SQLite backend of the order engine.
//!
//! It implements every trait in [`crate::traits`]. Each trait method is one transaction; methods that mutate an order
//! take the order lock as their first statement.
use std::{fmt::Debug, sync::Arc};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use log::*;
use sqlx::{SqliteConnection, SqlitePool};

use super::db::{
    db_url,
    email_log,
    history,
    job_locks,
    new_pool,
    order_items,
    order_items::PricedItem,
    orders,
    orders::OrderTotals,
    payments,
    payments::PaymentStatusUpdate,
    reconciliation,
    refunds,
    refunds::{RefundItemRecord, RefundRecord},
    stock,
    sync_log,
};
use crate::{
    collaborators::{ChargeResponse, PaymentOutcome, TransactionStatus},
    db_types::{
        Actor,
        EmailLog,
        EmailStatus,
        MovementType,
        NewOrder,
        NewSyncLog,
        Order,
        OrderCode,
        OrderItem,
        OrderRefundStatus,
        OrderStatusType,
        Payment,
        PaymentMethod,
        PaymentStatus,
        PaymentSyncLog,
        ReconciliationLog,
        Refund,
        RefundCode,
        RefundItem,
        RefundStatus,
        RefundType,
        Rupiah,
        StatusHistoryEntry,
        StockKey,
        StockMovement,
        SyncSource,
    },
    errors::{is_unique_violation, EngineError},
    helpers::{derive_breakdown, new_order_code, new_refund_code, BreakdownRequest, Clock, SystemClock},
    state_machine::{
        can_transition_order,
        check_order_transition,
        check_refund_transition,
        is_refundable,
        resi_is_writable,
        timestamp_column,
        InvalidTransition,
    },
    traits::{
        JobManagement,
        NewRefund,
        OrderManagement,
        PaymentChange,
        PaymentManagement,
        PaymentUpdateResult,
        ReconciliationTotals,
        RefundCompletedResult,
        RefundCompletion,
        RefundCreated,
        RefundManagement,
        StatusChange,
        StockLedgerReport,
        TransitionResult,
    },
};

const MAX_CODE_ATTEMPTS: usize = 5;

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("🗃️ Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool, clock: Arc::new(SystemClock) })
    }

    /// Replaces the clock used for every timestamp this backend writes.
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Brings the schema up to date. Safe to call on every start-up.
    pub async fn migrate(&self) -> Result<(), EngineError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| EngineError::DatabaseError(format!("Migration failed. {e}")))?;
        info!("🗃️ Database migrations complete");
        Ok(())
    }
}

//--------------------------------------   Shared transaction steps   --------------------------------------------------

/// Applies one state-machine edge to an order whose lock is already held.
async fn transition_locked(
    order: Order,
    change: &StatusChange,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<TransitionResult, EngineError> {
    let from = order.status;
    check_order_transition(from, change.to)?;
    let released = if change.to.releases_stock() {
        let released = stock::restore_for_order(&order, now, conn).await?;
        let payment_status = match change.to {
            OrderStatusType::Expired => PaymentStatus::Expired,
            OrderStatusType::Failed => PaymentStatus::Failed,
            _ => PaymentStatus::Cancelled,
        };
        let closed = payments::close_open_payments(order.id, payment_status, now, conn).await?;
        if closed > 0 {
            debug!("🗃️ Closed {closed} open payment(s) of order {} as {payment_status}", order.order_code);
        }
        released
    } else {
        vec![]
    };
    let updated = orders::update_status(order.id, change.to, timestamp_column(change.to), now, conn).await?;
    history::append_order_history(
        order.id,
        Some(from.as_str()),
        change.to.as_str(),
        &change.actor,
        change.reason.as_deref(),
        now,
        conn,
    )
    .await?;
    info!("🗃️ Order {} moved from {from} to {} by {}", updated.order_code, change.to, change.actor);
    Ok(TransitionResult { from, order: updated, released })
}

async fn lock_payment(
    payment_id: i64,
    conn: &mut SqliteConnection,
) -> Result<(Order, Payment), EngineError> {
    let not_found = || EngineError::PaymentNotFound(payment_id.to_string());
    let order = orders::lock_order_for_payment(payment_id, conn).await?.ok_or_else(not_found)?;
    let payment = payments::fetch_payment(payment_id, conn).await?.ok_or_else(not_found)?;
    Ok((order, payment))
}

async fn lock_refund(refund_id: i64, conn: &mut SqliteConnection) -> Result<(Order, Refund), EngineError> {
    let not_found = || EngineError::RefundNotFound(refund_id.to_string());
    let order = orders::lock_order_for_refund(refund_id, conn).await?.ok_or_else(not_found)?;
    let refund = refunds::fetch_refund(refund_id, conn).await?.ok_or_else(not_found)?;
    Ok((order, refund))
}

fn validate_new_order(order: &NewOrder) -> Result<(), EngineError> {
    let invalid = |msg: &str| -> Result<(), EngineError> { Err(EngineError::ValidationError(msg.to_string())) };
    if order.items.is_empty() {
        return invalid("An order needs at least one item");
    }
    if order.items.iter().any(|i| i.quantity <= 0) {
        return invalid("Item quantities must be positive");
    }
    if order.customer.name.trim().is_empty() || order.customer.email.trim().is_empty() {
        return invalid("Customer name and email are required");
    }
    if order.shipping_address.trim().is_empty() {
        return invalid("A shipping address is required");
    }
    if order.shipping_cost.is_negative() || order.discount.is_negative() {
        return invalid("Shipping cost and discount cannot be negative");
    }
    Ok(())
}

impl OrderManagement for SqliteDatabase {
    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    async fn create_order(&self, order: NewOrder, actor: &Actor) -> Result<(Order, Vec<OrderItem>), EngineError> {
        validate_new_order(&order)?;
        let now = self.now();
        // Catalog rows are always locked in stock-key order
        let mut lines = order.items.clone();
        lines.sort_by_key(|l| l.stock_key());
        let mut tx = self.pool.begin().await?;
        let mut priced = Vec::with_capacity(lines.len());
        for line in &lines {
            let key = line.stock_key();
            let reserved = stock::take_stock(key, line.quantity, &mut tx).await?;
            let price = reserved.variant.as_ref().and_then(|v| v.price).unwrap_or(reserved.product.price);
            let product_name = match &reserved.variant {
                Some(v) => format!("{} - {}", reserved.product.name, v.name),
                None => reserved.product.name.clone(),
            };
            let subtotal = price
                .checked_mul(line.quantity)
                .ok_or_else(|| EngineError::ValidationError(format!("Line total for {key} is too large")))?;
            let item = PricedItem {
                product_id: key.product_id,
                variant_id: key.variant_id,
                product_name,
                product_image: reserved.product.image_url.clone(),
                quantity: line.quantity,
                price_per_unit: price,
                subtotal,
            };
            priced.push((item, reserved.balance_after));
        }
        let subtotal = priced
            .iter()
            .try_fold(Rupiah::zero(), |acc, (item, _)| acc.checked_add(item.subtotal))
            .ok_or_else(|| EngineError::ValidationError("Order subtotal is too large".to_string()))?;
        let totals = OrderTotals::calculate(subtotal, order.shipping_cost, order.tax_rate_bps, order.discount)
            .ok_or_else(|| EngineError::ValidationError("The discount exceeds the order amount".to_string()))?;
        let mut attempt = 1;
        let created = loop {
            let code = new_order_code(now);
            match orders::insert_order(&code, &order, &totals, now, &mut tx).await {
                Ok(created) => break created,
                Err(e) if is_unique_violation(&e) && attempt < MAX_CODE_ATTEMPTS => {
                    warn!("🗃️ Order code {code} is taken. Generating another one.");
                    attempt += 1;
                },
                Err(e) => return Err(e.into()),
            }
        };
        let mut items = Vec::with_capacity(priced.len());
        for (item, balance_after) in &priced {
            let key = StockKey::new(item.product_id, item.variant_id);
            let saved = order_items::insert_item(created.id, item, &mut tx).await?;
            stock::record_movement(
                key,
                Some(created.id),
                None,
                MovementType::Reserve,
                item.quantity,
                *balance_after,
                now,
                &mut tx,
            )
            .await?;
            items.push(saved);
        }
        history::append_order_history(
            created.id,
            None,
            OrderStatusType::Pending.as_str(),
            actor,
            None,
            now,
            &mut tx,
        )
        .await?;
        tx.commit().await?;
        info!(
            "🗃️ Order {} created with {} line(s) for {}",
            created.order_code,
            items.len(),
            created.total_amount
        );
        Ok((created, items))
    }

    async fn fetch_order(&self, code: &OrderCode) -> Result<Option<Order>, EngineError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_code(code, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_order_by_id(&self, id: i64) -> Result<Option<Order>, EngineError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_id(id, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_order_items(&self, order_id: i64) -> Result<Vec<OrderItem>, EngineError> {
        let mut conn = self.pool.acquire().await?;
        let items = order_items::fetch_items(order_id, &mut conn).await?;
        Ok(items)
    }

    async fn transition_order(&self, code: &OrderCode, change: StatusChange) -> Result<TransitionResult, EngineError> {
        let now = self.now();
        let mut tx = self.pool.begin().await?;
        let order = orders::lock_order_by_code(code, &mut tx)
            .await?
            .ok_or_else(|| EngineError::OrderNotFound(code.to_string()))?;
        let result = transition_locked(order, &change, now, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn set_resi(&self, code: &OrderCode, resi: &str, _actor: &Actor) -> Result<Order, EngineError> {
        let resi = resi.trim();
        if resi.is_empty() {
            return Err(EngineError::ValidationError("The tracking number cannot be empty".to_string()));
        }
        let now = self.now();
        let mut tx = self.pool.begin().await?;
        let order = orders::lock_order_by_code(code, &mut tx)
            .await?
            .ok_or_else(|| EngineError::OrderNotFound(code.to_string()))?;
        let order = write_resi(order, resi, now, &mut tx).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn ship_with_resi(&self, code: &OrderCode, resi: &str, actor: &Actor) -> Result<TransitionResult, EngineError> {
        let resi = resi.trim();
        if resi.is_empty() {
            return Err(EngineError::ValidationError("A tracking number is required to ship".to_string()));
        }
        let now = self.now();
        let mut tx = self.pool.begin().await?;
        let order = orders::lock_order_by_code(code, &mut tx)
            .await?
            .ok_or_else(|| EngineError::OrderNotFound(code.to_string()))?;
        check_order_transition(order.status, OrderStatusType::Shipped)?;
        let order = write_resi(order, resi, now, &mut tx).await?;
        let change = StatusChange::new(OrderStatusType::Shipped, actor.clone()).with_reason(format!("resi {resi}"));
        let result = transition_locked(order, &change, now, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn order_history(&self, order_id: i64) -> Result<Vec<StatusHistoryEntry>, EngineError> {
        let mut conn = self.pool.acquire().await?;
        let entries = history::fetch_order_history(order_id, &mut conn).await?;
        Ok(entries)
    }

    async fn stock_movements_for_order(&self, order_id: i64) -> Result<Vec<StockMovement>, EngineError> {
        let mut conn = self.pool.acquire().await?;
        let movements = stock::movements_for_order(order_id, &mut conn).await?;
        Ok(movements)
    }

    async fn stock_ledger(&self, key: StockKey) -> Result<StockLedgerReport, EngineError> {
        let mut tx = self.pool.begin().await?;
        let (current_stock, initial_stock) =
            stock::current_stock(key, &mut tx).await?.ok_or(EngineError::ProductNotFound(key))?;
        let totals = stock::movement_totals(key, &mut tx).await?;
        tx.commit().await?;
        let sum_of = |kind: MovementType| totals.iter().filter(|(t, _)| *t == kind).map(|(_, q)| *q).sum::<i64>();
        let reserved = sum_of(MovementType::Reserve);
        let deducted = sum_of(MovementType::Deduct);
        let released = sum_of(MovementType::Release);
        let expected_stock = initial_stock - reserved - deducted + released;
        Ok(StockLedgerReport { key, initial_stock, reserved, deducted, released, expected_stock, current_stock })
    }

    async fn fetch_expirable_orders(&self, created_before: DateTime<Utc>, limit: i64) -> Result<Vec<Order>, EngineError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::fetch_pending_created_before(created_before, limit, &mut conn).await?;
        Ok(orders)
    }
}

async fn write_resi(
    order: Order,
    resi: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Order, EngineError> {
    if !resi_is_writable(order.status) {
        return Err(EngineError::ResiLocked(order.status));
    }
    if orders::resi_in_use(resi, order.id, conn).await? {
        return Err(EngineError::DuplicateResi(resi.to_string()));
    }
    match orders::set_resi(order.id, resi, now, conn).await {
        Ok(order) => Ok(order),
        Err(e) if is_unique_violation(&e) => Err(EngineError::DuplicateResi(resi.to_string())),
        Err(e) => Err(e.into()),
    }
}

//--------------------------------------          Payments           ---------------------------------------------------

/// The order status a gateway outcome drives an open payment's order to, if any.
fn order_target(outcome: PaymentOutcome) -> Option<OrderStatusType> {
    match outcome {
        PaymentOutcome::Settled => Some(OrderStatusType::Paid),
        PaymentOutcome::Cancelled | PaymentOutcome::Failed => Some(OrderStatusType::Failed),
        PaymentOutcome::Expired => Some(OrderStatusType::Expired),
        PaymentOutcome::Challenged | PaymentOutcome::Pending => None,
    }
}

impl PaymentManagement for SqliteDatabase {
    async fn reserve_payment(&self, code: &OrderCode, method: PaymentMethod) -> Result<(Order, Payment), EngineError> {
        let now = self.now();
        let mut tx = self.pool.begin().await?;
        let order = orders::lock_order_by_code(code, &mut tx)
            .await?
            .ok_or_else(|| EngineError::OrderNotFound(code.to_string()))?;
        if order.status != OrderStatusType::Pending {
            return Err(EngineError::OrderNotPayable { code: order.order_code, status: order.status });
        }
        if payments::fetch_open_for_order(order.id, &mut tx).await?.is_some() {
            return Err(EngineError::PaymentAlreadyExists(order.order_code));
        }
        let attempt = payments::count_for_order(order.id, &mut tx).await? + 1;
        let external_id = payments::external_id_for(&order.order_code, attempt);
        let payment = match payments::insert_payment(order.id, &external_id, method, order.total_amount, now, &mut tx)
            .await
        {
            Ok(p) => p,
            Err(e) if is_unique_violation(&e) => return Err(EngineError::PaymentAlreadyExists(order.order_code)),
            Err(e) => return Err(e.into()),
        };
        tx.commit().await?;
        debug!("🗃️ Payment {external_id} reserved for order {} ({method})", order.order_code);
        Ok((order, payment))
    }

    async fn attach_charge(&self, payment_id: i64, charge: &ChargeResponse) -> Result<Payment, EngineError> {
        let now = self.now();
        let mut tx = self.pool.begin().await?;
        let (_, payment) = lock_payment(payment_id, &mut tx).await?;
        let payment = payments::attach_charge(payment.id, charge, now, &mut tx).await?;
        tx.commit().await?;
        Ok(payment)
    }

    async fn reject_charge(&self, payment_id: i64, error: &str) -> Result<Payment, EngineError> {
        let now = self.now();
        let mut tx = self.pool.begin().await?;
        let (order, payment) = lock_payment(payment_id, &mut tx).await?;
        if !payment.status.is_open() {
            return Ok(payment);
        }
        let payment =
            payments::update_status(payment.id, PaymentStatus::Failed, &PaymentStatusUpdate::default(), now, &mut tx)
                .await?;
        tx.commit().await?;
        warn!("🗃️ Charge for order {} was refused: {error}. Order remains {}", order.order_code, order.status);
        Ok(payment)
    }

    async fn fetch_payment(&self, id: i64) -> Result<Option<Payment>, EngineError> {
        let mut conn = self.pool.acquire().await?;
        let payment = payments::fetch_payment(id, &mut conn).await?;
        Ok(payment)
    }

    async fn fetch_payment_by_external_id(&self, external_id: &str) -> Result<Option<Payment>, EngineError> {
        let mut conn = self.pool.acquire().await?;
        let payment = payments::fetch_by_external_id(external_id, &mut conn).await?;
        Ok(payment)
    }

    async fn fetch_latest_payment_for_order(&self, order_id: i64) -> Result<Option<Payment>, EngineError> {
        let mut conn = self.pool.acquire().await?;
        let payment = payments::fetch_latest_for_order(order_id, &mut conn).await?;
        Ok(payment)
    }

    async fn apply_gateway_status(
        &self,
        payment_id: i64,
        status: &TransactionStatus,
        source: SyncSource,
    ) -> Result<PaymentUpdateResult, EngineError> {
        let now = self.now();
        let mut tx = self.pool.begin().await?;
        let (order, before) = lock_payment(payment_id, &mut tx).await?;
        let outcome = PaymentOutcome::from_gateway(&status.transaction_status, status.fraud_status.as_deref());
        let target = outcome.payment_status();
        let update = PaymentStatusUpdate {
            transaction_id: status.transaction_id.as_deref(),
            fraud_status: status.fraud_status.as_deref(),
            raw_response: Some(status.raw.as_str()),
            paid_at: (target == PaymentStatus::Success).then_some(now),
        };
        let gateway_label = status.transaction_status.as_str();
        let from_job = matches!(source, SyncSource::Job | SyncSource::Manual);

        let result = if before.status == target {
            let same_transaction = status.transaction_id.is_some() && status.transaction_id == before.transaction_id;
            let payment = if target.is_open() && before.transaction_id.is_none() && status.transaction_id.is_some() {
                payments::update_status(before.id, target, &update, now, &mut tx).await?
            } else {
                before.clone()
            };
            let change = if same_transaction && !target.is_open() {
                PaymentChange::Duplicate
            } else {
                PaymentChange::Unchanged
            };
            if from_job {
                let log = NewSyncLog::for_payment(&before).with_gateway_status(gateway_label);
                sync_log::insert_sync_log(source, &log, now, &mut tx).await?;
            }
            PaymentUpdateResult { payment, order, change, order_transition: None }
        } else if !before.status.is_open() && !(target == PaymentStatus::Success && order.status == OrderStatusType::Pending) {
            if target == PaymentStatus::Success {
                let payment = payments::update_status(before.id, target, &update, now, &mut tx).await?;
                let log = NewSyncLog::for_payment(&before).with_gateway_status(gateway_label).mismatch();
                sync_log::insert_sync_log(source, &log, now, &mut tx).await?;
                error!(
                    "🗃️ Payment {} settled after it was closed as {}. Order {} is {} and was left alone. Manual \
                     reconciliation is needed.",
                    before.external_id, before.status, order.order_code, order.status
                );
                PaymentUpdateResult { payment, order, change: PaymentChange::LateSettlement, order_transition: None }
            } else {
                if from_job {
                    let log = NewSyncLog::for_payment(&before).with_gateway_status(gateway_label);
                    sync_log::insert_sync_log(source, &log, now, &mut tx).await?;
                }
                debug!(
                    "🗃️ Ignoring {gateway_label} for payment {}, which is already {}",
                    before.external_id, before.status
                );
                PaymentUpdateResult { payment: before.clone(), order, change: PaymentChange::Stale, order_transition: None }
            }
        } else {
            let payment = payments::update_status(before.id, target, &update, now, &mut tx).await?;
            let mut change = PaymentChange::Applied { from: before.status, to: target };
            let mut order_transition = None;
            let mut order = order;
            match order_target(outcome) {
                Some(to) if can_transition_order(order.status, to) => {
                    let reason = format!("payment {} reported {gateway_label}", payment.external_id);
                    let status_change = StatusChange::new(to, Actor::System).with_reason(reason);
                    let moved = transition_locked(order, &status_change, now, &mut tx).await?;
                    if to == OrderStatusType::Paid {
                        payments::close_open_payments(moved.order.id, PaymentStatus::Cancelled, now, &mut tx).await?;
                    }
                    order_transition = Some((moved.from, to));
                    order = moved.order;
                },
                Some(to) if to == OrderStatusType::Paid => {
                    change = PaymentChange::LateSettlement;
                    let log = NewSyncLog::for_payment(&before).with_gateway_status(gateway_label).mismatch();
                    sync_log::insert_sync_log(source, &log, now, &mut tx).await?;
                    error!(
                        "🗃️ Payment {} settled but order {} is {}. Manual reconciliation is needed.",
                        payment.external_id, order.order_code, order.status
                    );
                },
                Some(to) => {
                    warn!(
                        "🗃️ Payment {} is now {target} but order {} cannot move from {} to {to}",
                        payment.external_id, order.order_code, order.status
                    );
                },
                None => {},
            }
            if from_job && change != PaymentChange::LateSettlement {
                sync_log::resolve_for_payment(before.id, &mut tx).await?;
                let log = NewSyncLog::for_payment(&before).with_gateway_status(gateway_label).mismatch().resolved();
                sync_log::insert_sync_log(source, &log, now, &mut tx).await?;
            }
            PaymentUpdateResult { payment, order, change, order_transition }
        };
        tx.commit().await?;
        debug!("🗃️ Gateway status {gateway_label} for payment {} via {source}: {:?}", before.external_id, result.change);
        Ok(result)
    }

    async fn expire_payment(&self, payment_id: i64, grace: Duration) -> Result<PaymentUpdateResult, EngineError> {
        let now = self.now();
        let mut tx = self.pool.begin().await?;
        let (order, payment) = lock_payment(payment_id, &mut tx).await?;
        let due = payment.expiry_time.map(|t| now > t + grace).unwrap_or(false);
        if payment.status != PaymentStatus::Pending || !due {
            trace!("🗃️ Payment {} is {} and not due for expiry", payment.external_id, payment.status);
            return Ok(PaymentUpdateResult { payment, order, change: PaymentChange::Unchanged, order_transition: None });
        }
        let from = payment.status;
        let payment =
            payments::update_status(payment.id, PaymentStatus::Expired, &PaymentStatusUpdate::default(), now, &mut tx)
                .await?;
        let (order, order_transition) = if can_transition_order(order.status, OrderStatusType::Expired) {
            let reason = format!("payment {} expired", payment.external_id);
            let change = StatusChange::new(OrderStatusType::Expired, Actor::System).with_reason(reason);
            let moved = transition_locked(order, &change, now, &mut tx).await?;
            (moved.order, Some((moved.from, OrderStatusType::Expired)))
        } else {
            (order, None)
        };
        tx.commit().await?;
        info!("🗃️ Payment {} expired", payment.external_id);
        let change = PaymentChange::Applied { from, to: PaymentStatus::Expired };
        Ok(PaymentUpdateResult { payment, order, change, order_transition })
    }

    async fn record_sync_failure(
        &self,
        payment_id: i64,
        error: &str,
        source: SyncSource,
        next_sync_at: Option<DateTime<Utc>>,
    ) -> Result<Payment, EngineError> {
        let now = self.now();
        let mut tx = self.pool.begin().await?;
        let payment = payments::record_sync_failure(payment_id, next_sync_at, &mut tx).await?;
        let log = NewSyncLog::for_payment(&payment).with_error(error);
        sync_log::insert_sync_log(source, &log, now, &mut tx).await?;
        tx.commit().await?;
        Ok(payment)
    }

    async fn fetch_stale_payments(
        &self,
        updated_before: DateTime<Utc>,
        max_attempts: i64,
        limit: i64,
    ) -> Result<Vec<Payment>, EngineError> {
        let now = self.now();
        let mut conn = self.pool.acquire().await?;
        let payments = payments::fetch_stale(updated_before, now, max_attempts, limit, &mut conn).await?;
        Ok(payments)
    }

    async fn insert_sync_log(&self, source: SyncSource, log: NewSyncLog) -> Result<PaymentSyncLog, EngineError> {
        let now = self.now();
        let mut conn = self.pool.acquire().await?;
        let entry = sync_log::insert_sync_log(source, &log, now, &mut conn).await?;
        Ok(entry)
    }

    async fn fetch_sync_logs(&self, unresolved_only: bool) -> Result<Vec<PaymentSyncLog>, EngineError> {
        let mut conn = self.pool.acquire().await?;
        let logs = sync_log::fetch_sync_logs(unresolved_only, &mut conn).await?;
        Ok(logs)
    }

    async fn claim_email(
        &self,
        order_id: i64,
        template_key: &str,
        recipient: &str,
    ) -> Result<Option<EmailLog>, EngineError> {
        let now = self.now();
        let mut conn = self.pool.acquire().await?;
        let entry = email_log::claim(order_id, template_key, recipient, now, &mut conn).await?;
        Ok(entry)
    }

    async fn update_email_status(&self, id: i64, status: EmailStatus, error: Option<&str>) -> Result<(), EngineError> {
        let mut conn = self.pool.acquire().await?;
        email_log::update_status(id, status, error, &mut conn).await?;
        Ok(())
    }

    async fn fetch_email_log(&self, order_id: i64) -> Result<Vec<EmailLog>, EngineError> {
        let mut conn = self.pool.acquire().await?;
        let entries = email_log::fetch_for_order(order_id, &mut conn).await?;
        Ok(entries)
    }
}

//--------------------------------------           Refunds           ---------------------------------------------------

/// True if `request` describes the same refund as `existing`. Amounts are only compared when given explicitly.
fn same_refund_request(existing: &Refund, order_id: i64, request: &NewRefund) -> bool {
    existing.order_id == order_id &&
        existing.refund_type == request.refund_type &&
        existing.reason == request.reason &&
        request.shipping_refund.map_or(true, |v| v == existing.shipping_refund) &&
        request.items_refund.map_or(true, |v| v == existing.items_refund)
}

/// True if the requested item lines match the ones already stored, ignoring order. Line amounts are only compared
/// when given explicitly.
fn same_refund_items(existing: &[RefundItem], request: &NewRefund) -> bool {
    if existing.len() != request.items.len() {
        return false;
    }
    let mut stored = existing.iter().collect::<Vec<_>>();
    stored.sort_by_key(|i| (i.order_item_id, i.quantity));
    let mut requested = request.items.iter().collect::<Vec<_>>();
    requested.sort_by_key(|i| (i.order_item_id, i.quantity));
    stored.iter().zip(requested).all(|(s, r)| {
        s.order_item_id == r.order_item_id &&
            s.quantity == r.quantity &&
            r.refund_amount.map_or(true, |v| v == s.refund_amount)
    })
}

impl RefundManagement for SqliteDatabase {
    async fn create_refund(&self, request: NewRefund) -> Result<RefundCreated, EngineError> {
        let key = request.idempotency_key.trim().to_string();
        if key.is_empty() {
            return Err(EngineError::ValidationError("An idempotency key is required".to_string()));
        }
        let now = self.now();
        let mut tx = self.pool.begin().await?;
        let order = orders::lock_order_by_code(&request.order_code, &mut tx)
            .await?
            .ok_or_else(|| EngineError::OrderNotFound(request.order_code.to_string()))?;
        if let Some(existing) = refunds::fetch_by_idempotency_key(&key, &mut tx).await? {
            if !same_refund_request(&existing, order.id, &request) {
                return Err(EngineError::IdempotencyConflict(key));
            }
            let items = refunds::fetch_items(existing.id, &mut tx).await?;
            if !same_refund_items(&items, &request) {
                return Err(EngineError::IdempotencyConflict(key));
            }
            tx.rollback().await?;
            debug!("🗃️ Refund {} already exists for key {key}", existing.refund_code);
            return Ok(RefundCreated { refund: existing, items, created: false });
        }
        if !is_refundable(order.status, request.requested_by.is_admin()) {
            return Err(EngineError::OrderNotRefundable { code: order.order_code, status: order.status });
        }

        let order_lines = order_items::fetch_items(order.id, &mut tx).await?;
        let mut item_records: Vec<RefundItemRecord> = Vec::with_capacity(request.items.len());
        for line in &request.items {
            let item = order_lines.iter().find(|i| i.id == line.order_item_id).ok_or_else(|| {
                EngineError::ValidationError(format!("Item {} is not part of order {}", line.order_item_id, order.order_code))
            })?;
            let earlier_lines = item_records.iter().filter(|r| r.order_item_id == item.id).collect::<Vec<_>>();
            let claimed = refunds::claimed_quantity(item.id, &mut tx).await? +
                earlier_lines.iter().map(|r| r.quantity).sum::<i64>();
            if line.quantity <= 0 || line.quantity > item.quantity - claimed {
                return Err(EngineError::ValidationError(format!(
                    "Cannot refund {} of item {}: {} ordered, {claimed} already refunded",
                    line.quantity, item.id, item.quantity
                )));
            }
            let line_cap = item.price_per_unit.checked_mul(line.quantity).unwrap_or(item.subtotal).min(item.subtotal);
            let amount = line.refund_amount.unwrap_or(line_cap);
            if amount.is_negative() || amount > line_cap {
                return Err(EngineError::ValidationError(format!(
                    "Refund of {amount} for {} unit(s) of item {} exceeds their value of {line_cap}",
                    line.quantity, item.id
                )));
            }
            let already = refunds::claimed_amount(item.id, &mut tx).await? +
                earlier_lines.iter().map(|r| r.refund_amount).sum::<Rupiah>();
            if already + amount > item.subtotal {
                return Err(EngineError::ValidationError(format!(
                    "Refund of {amount} for item {} exceeds its unrefunded value: {already} of {} already refunded",
                    item.id, item.subtotal
                )));
            }
            item_records.push(RefundItemRecord {
                order_item_id: item.id,
                product_id: item.product_id,
                variant_id: item.variant_id,
                quantity: line.quantity,
                refund_amount: amount,
            });
        }
        let lines_total =
            (!item_records.is_empty()).then(|| item_records.iter().map(|r| r.refund_amount).sum::<Rupiah>());

        let committed = refunds::committed_total_for_order(order.id, &mut tx).await?;
        let outstanding = order.total_amount - committed;
        let shipping_already_refunded = refunds::committed_shipping_for_order(order.id, &mut tx).await?;
        let breakdown = derive_breakdown(BreakdownRequest {
            refund_type: request.refund_type,
            shipping_refund: request.shipping_refund,
            items_refund: request.items_refund,
            lines_total,
            order_shipping_cost: order.shipping_cost,
            shipping_already_refunded,
            outstanding,
        })?;
        let refund_amount = breakdown.refund_amount();
        if refund_amount > outstanding {
            return Err(EngineError::RefundExceedsBalance { requested: refund_amount, available: outstanding });
        }
        let payment_id = payments::fetch_settled_for_order(order.id, &mut tx).await?.map(|p| p.id);
        let record = RefundRecord {
            order_id: order.id,
            payment_id,
            refund_type: request.refund_type,
            reason: request.reason,
            reason_detail: request.reason_detail.clone(),
            original_amount: order.total_amount,
            refund_amount,
            shipping_refund: breakdown.shipping_refund,
            items_refund: breakdown.items_refund,
            idempotency_key: key,
            requested_by: request.requested_by.to_string(),
        };
        let mut attempt = 1;
        let refund = loop {
            let code = new_refund_code(now);
            match refunds::insert_refund(&code, &record, now, &mut tx).await {
                Ok(refund) => break refund,
                Err(e) if is_unique_violation(&e) && attempt < MAX_CODE_ATTEMPTS => {
                    warn!("🗃️ Refund code {code} is taken. Generating another one.");
                    attempt += 1;
                },
                Err(e) => return Err(e.into()),
            }
        };
        let mut items = Vec::with_capacity(item_records.len());
        for record in &item_records {
            items.push(refunds::insert_refund_item(refund.id, record, &mut tx).await?);
        }
        let reason = format!("requested by {}", request.requested_by);
        history::append_refund_history(
            refund.id,
            None,
            RefundStatus::Pending.as_str(),
            &Actor::System,
            Some(&reason),
            now,
            &mut tx,
        )
        .await?;
        tx.commit().await?;
        info!(
            "🗃️ Refund {} of {} ({}) created for order {}",
            refund.refund_code, refund.refund_amount, refund.refund_type, order.order_code
        );
        Ok(RefundCreated { refund, items, created: true })
    }

    async fn fetch_refund(&self, id: i64) -> Result<Option<Refund>, EngineError> {
        let mut conn = self.pool.acquire().await?;
        let refund = refunds::fetch_refund(id, &mut conn).await?;
        Ok(refund)
    }

    async fn fetch_refund_by_code(&self, code: &RefundCode) -> Result<Option<Refund>, EngineError> {
        let mut conn = self.pool.acquire().await?;
        let refund = refunds::fetch_by_code(code, &mut conn).await?;
        Ok(refund)
    }

    async fn fetch_refund_items(&self, refund_id: i64) -> Result<Vec<RefundItem>, EngineError> {
        let mut conn = self.pool.acquire().await?;
        let items = refunds::fetch_items(refund_id, &mut conn).await?;
        Ok(items)
    }

    async fn refunds_for_order(&self, order_id: i64) -> Result<Vec<Refund>, EngineError> {
        let mut conn = self.pool.acquire().await?;
        let refunds = refunds::fetch_for_order(order_id, &mut conn).await?;
        Ok(refunds)
    }

    async fn refund_history(&self, refund_id: i64) -> Result<Vec<StatusHistoryEntry>, EngineError> {
        let mut conn = self.pool.acquire().await?;
        let entries = history::fetch_refund_history(refund_id, &mut conn).await?;
        Ok(entries)
    }

    async fn begin_refund_processing(
        &self,
        refund_id: i64,
        allowed_from: &[RefundStatus],
        actor: &Actor,
    ) -> Result<(Refund, Order, Option<Payment>), EngineError> {
        let now = self.now();
        let mut tx = self.pool.begin().await?;
        let (order, refund) = lock_refund(refund_id, &mut tx).await?;
        if !allowed_from.contains(&refund.status) {
            return Err(InvalidTransition::new(refund.status, RefundStatus::Processing).into());
        }
        check_refund_transition(refund.status, RefundStatus::Processing)?;
        let actor_label = actor.to_string();
        let updated = refunds::set_status(refund.id, RefundStatus::Processing, Some(&actor_label), now, &mut tx).await?;
        history::append_refund_history(
            refund.id,
            Some(refund.status.as_str()),
            RefundStatus::Processing.as_str(),
            actor,
            None,
            now,
            &mut tx,
        )
        .await?;
        let payment = match refund.payment_id {
            Some(id) => payments::fetch_payment(id, &mut tx).await?,
            None => None,
        };
        tx.commit().await?;
        debug!("🗃️ Refund {} is now PROCESSING (was {})", updated.refund_code, refund.status);
        Ok((updated, order, payment))
    }

    async fn complete_refund(
        &self,
        refund_id: i64,
        completion: RefundCompletion,
        actor: &Actor,
    ) -> Result<RefundCompletedResult, EngineError> {
        let now = self.now();
        let mut tx = self.pool.begin().await?;
        let (order, refund) = lock_refund(refund_id, &mut tx).await?;
        check_refund_transition(refund.status, RefundStatus::Completed)?;
        let actor_label = actor.to_string();
        let (gateway_refund_id, gateway_response, reason) = match &completion {
            RefundCompletion::Gateway { gateway_refund_id, response } => {
                let responses = refunds::append_response(refund.gateway_response.as_deref(), response, now);
                (Some(gateway_refund_id.as_str()), Some(responses), format!("gateway refund {gateway_refund_id}"))
            },
            RefundCompletion::Manual { note } => {
                if note.trim().is_empty() {
                    return Err(EngineError::ValidationError("A note is required for manual completion".to_string()));
                }
                (None, None, note.trim().to_string())
            },
        };
        let completed = refunds::mark_completed(
            refund.id,
            gateway_refund_id,
            gateway_response.as_deref(),
            &actor_label,
            now,
            &mut tx,
        )
        .await?;
        history::append_refund_history(
            refund.id,
            Some(refund.status.as_str()),
            RefundStatus::Completed.as_str(),
            actor,
            Some(&reason),
            now,
            &mut tx,
        )
        .await?;

        let refunded = refunds::completed_total_for_order(order.id, &mut tx).await?;
        let fully_refunded = refunded >= order.total_amount;
        let refund_status = if fully_refunded { OrderRefundStatus::Full } else { OrderRefundStatus::Partial };
        let order = orders::record_refund(order.id, refunded, refund_status, now, &mut tx).await?;

        let mut restocked = Vec::new();
        if completed.refund_type == RefundType::ItemOnly {
            for item in refunds::fetch_items(refund.id, &mut tx).await? {
                if item.stock_restored {
                    continue;
                }
                let movement =
                    stock::release(item.stock_key(), item.quantity, order.id, Some(refund.id), now, &mut tx).await?;
                refunds::mark_item_restored(item.id, now, &mut tx).await?;
                restocked.push(movement);
            }
        }

        let (order, order_refunded) = if fully_refunded && can_transition_order(order.status, OrderStatusType::Refunded)
        {
            let change = StatusChange::new(OrderStatusType::Refunded, actor.clone())
                .with_reason(format!("refund {}", completed.refund_code));
            let moved = transition_locked(order, &change, now, &mut tx).await?;
            (moved.order, true)
        } else {
            (order, false)
        };
        tx.commit().await?;
        info!(
            "🗃️ Refund {} completed. Order {} has {} refunded ({refund_status})",
            completed.refund_code, order.order_code, order.refund_amount
        );
        Ok(RefundCompletedResult { refund: completed, order, order_refunded, restocked })
    }

    async fn record_refund_failure(
        &self,
        refund_id: i64,
        error: &str,
        response: Option<&str>,
        transient: bool,
        actor: &Actor,
    ) -> Result<Refund, EngineError> {
        let now = self.now();
        let mut tx = self.pool.begin().await?;
        let (_, refund) = lock_refund(refund_id, &mut tx).await?;
        let target = if transient { RefundStatus::Processing } else { RefundStatus::Failed };
        check_refund_transition(refund.status, target)?;
        let responses = response.map(|r| refunds::append_response(refund.gateway_response.as_deref(), r, now));
        let updated =
            refunds::record_failure(refund.id, target, error, transient, responses.as_deref(), now, &mut tx).await?;
        history::append_refund_history(
            refund.id,
            Some(refund.status.as_str()),
            target.as_str(),
            actor,
            Some(error),
            now,
            &mut tx,
        )
        .await?;
        tx.commit().await?;
        warn!("🗃️ Refund {} attempt failed ({target}): {error}", updated.refund_code);
        Ok(updated)
    }

    async fn close_refund(
        &self,
        refund_id: i64,
        to: RefundStatus,
        actor: &Actor,
        reason: &str,
    ) -> Result<Refund, EngineError> {
        if !matches!(to, RefundStatus::Rejected | RefundStatus::Cancelled) {
            return Err(EngineError::ValidationError(format!("A refund cannot be closed as {to}")));
        }
        let now = self.now();
        let mut tx = self.pool.begin().await?;
        let (_, refund) = lock_refund(refund_id, &mut tx).await?;
        check_refund_transition(refund.status, to)?;
        let actor_label = actor.to_string();
        let updated = refunds::set_status(refund.id, to, Some(&actor_label), now, &mut tx).await?;
        history::append_refund_history(
            refund.id,
            Some(refund.status.as_str()),
            to.as_str(),
            actor,
            Some(reason),
            now,
            &mut tx,
        )
        .await?;
        tx.commit().await?;
        info!("🗃️ Refund {} is now {to}", updated.refund_code);
        Ok(updated)
    }
}

//--------------------------------------            Jobs             ---------------------------------------------------
impl JobManagement for SqliteDatabase {
    async fn try_acquire_job_lock(&self, name: &str, holder: &str, ttl: Duration) -> Result<bool, EngineError> {
        let now = self.now();
        let mut conn = self.pool.acquire().await?;
        let acquired = job_locks::try_acquire(name, holder, now, now + ttl, &mut conn).await?;
        trace!("🗃️ Job lock {name} for {holder}: {acquired}");
        Ok(acquired)
    }

    async fn release_job_lock(&self, name: &str, holder: &str) -> Result<(), EngineError> {
        let mut conn = self.pool.acquire().await?;
        job_locks::release(name, holder, &mut conn).await?;
        Ok(())
    }

    async fn start_reconciliation(
        &self,
        date: NaiveDate,
        stale_before: DateTime<Utc>,
    ) -> Result<Option<ReconciliationLog>, EngineError> {
        let now = self.now();
        let mut conn = self.pool.acquire().await?;
        let log = reconciliation::start(date, now, stale_before, &mut conn).await?;
        Ok(log)
    }

    async fn compute_reconciliation(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<ReconciliationTotals, EngineError> {
        let mut tx = self.pool.begin().await?;
        let totals = reconciliation::compute(start, end, &mut tx).await?;
        tx.commit().await?;
        Ok(totals)
    }

    async fn finish_reconciliation(
        &self,
        id: i64,
        totals: &ReconciliationTotals,
    ) -> Result<ReconciliationLog, EngineError> {
        let now = self.now();
        let mut conn = self.pool.acquire().await?;
        let log = reconciliation::finish(id, totals, now, &mut conn).await?;
        Ok(log)
    }

    async fn fail_reconciliation(&self, id: i64, error: &str) -> Result<ReconciliationLog, EngineError> {
        let now = self.now();
        let mut conn = self.pool.acquire().await?;
        let log = reconciliation::fail(id, error, now, &mut conn).await?;
        Ok(log)
    }

    async fn fetch_reconciliation(&self, date: NaiveDate) -> Result<Option<ReconciliationLog>, EngineError> {
        let mut conn = self.pool.acquire().await?;
        let log = reconciliation::fetch(date, &mut conn).await?;
        Ok(log)
    }
}
