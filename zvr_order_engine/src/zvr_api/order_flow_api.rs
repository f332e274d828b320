use std::{fmt::Debug, time::Duration as StdDuration};

use log::*;

use crate::{
    collaborators::{with_deadline, ShippingGateway, WaybillRequest},
    db_types::{
        Actor,
        CustomerInfo,
        NewOrder,
        Order,
        OrderCode,
        OrderItem,
        OrderStatusType,
        StatusHistoryEntry,
        StockKey,
        StockMovement,
    },
    errors::EngineError,
    events::{EventProducers, OrderAnnulledEvent, OrderPaidEvent},
    state_machine::check_order_transition,
    traits::{OrderManagement, StatusChange, StockLedgerReport, TransitionResult},
    zvr_api::{
        config::OrderFlowConfig,
        order_objects::{ExpirySummary, OrderDetail},
    },
};

/// `OrderFlowApi` drives orders through their lifecycle: checkout with stock reservation, state-machine transitions,
/// shipping, and the expiry of unpaid orders.
pub struct OrderFlowApi<B> {
    db: B,
    producers: EventProducers,
    config: OrderFlowConfig,
}

impl<B> Debug for OrderFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi ({:?})", self.config)
    }
}

impl<B: Clone> Clone for OrderFlowApi<B> {
    fn clone(&self) -> Self {
        Self { db: self.db.clone(), producers: self.producers.clone(), config: self.config }
    }
}

impl<B> OrderFlowApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers, config: OrderFlowConfig::default() }
    }

    pub fn with_config(mut self, config: OrderFlowConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &OrderFlowConfig {
        &self.config
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B> OrderFlowApi<B>
where B: OrderManagement
{
    /// Creates an order from a checkout, reserving stock for every line. Nothing is written if any line cannot be
    /// reserved.
    pub async fn create_order(&self, order: NewOrder, actor: &Actor) -> Result<OrderDetail, EngineError> {
        let (order, items) = self.db.create_order(order, actor).await?;
        debug!("📦️ Checkout complete. Order {} awaits payment of {}", order.order_code, order.total_amount);
        Ok(OrderDetail { order, items })
    }

    pub async fn fetch_order(&self, code: &OrderCode) -> Result<Order, EngineError> {
        self.db.fetch_order(code).await?.ok_or_else(|| EngineError::OrderNotFound(code.to_string()))
    }

    pub async fn fetch_order_detail(&self, code: &OrderCode) -> Result<OrderDetail, EngineError> {
        let order = self.fetch_order(code).await?;
        let items = self.db.fetch_order_items(order.id).await?;
        Ok(OrderDetail { order, items })
    }

    pub async fn fetch_items(&self, code: &OrderCode) -> Result<Vec<OrderItem>, EngineError> {
        let order = self.fetch_order(code).await?;
        self.db.fetch_order_items(order.id).await
    }

    /// Moves the order to `to`. See [`OrderManagement::transition_order`] for the side effects.
    pub async fn transition(
        &self,
        code: &OrderCode,
        to: OrderStatusType,
        actor: &Actor,
        reason: Option<&str>,
    ) -> Result<TransitionResult, EngineError> {
        let mut change = StatusChange::new(to, actor.clone());
        if let Some(reason) = reason {
            change = change.with_reason(reason);
        }
        let result = self.db.transition_order(code, change).await?;
        self.notify(&result).await;
        Ok(result)
    }

    async fn notify(&self, result: &TransitionResult) {
        match result.order.status {
            OrderStatusType::Paid => {
                self.producers.publish_order_paid(OrderPaidEvent::new(result.order.clone(), None)).await;
            },
            status if status.releases_stock() => {
                debug!("📦️ Notifying order annulled hook subscribers");
                self.producers.publish_order_annulled(OrderAnnulledEvent::new(result.order.clone())).await;
            },
            _ => {},
        }
    }

    /// Marks an order paid without a gateway settlement, e.g. after a confirmed bank transfer.
    pub async fn mark_paid(&self, code: &OrderCode, actor: &Actor, reason: &str) -> Result<TransitionResult, EngineError> {
        self.transition(code, OrderStatusType::Paid, actor, Some(reason)).await
    }

    pub async fn mark_packing(&self, code: &OrderCode, actor: &Actor) -> Result<TransitionResult, EngineError> {
        self.transition(code, OrderStatusType::Packing, actor, None).await
    }

    /// Writes the tracking number and moves the order to SHIPPED atomically.
    pub async fn mark_shipped_with_resi(
        &self,
        code: &OrderCode,
        resi: &str,
        actor: &Actor,
    ) -> Result<TransitionResult, EngineError> {
        self.db.ship_with_resi(code, resi, actor).await
    }

    pub async fn mark_delivered(&self, code: &OrderCode, actor: &Actor) -> Result<TransitionResult, EngineError> {
        self.transition(code, OrderStatusType::Delivered, actor, None).await
    }

    pub async fn mark_completed(&self, code: &OrderCode, actor: &Actor) -> Result<TransitionResult, EngineError> {
        self.transition(code, OrderStatusType::Completed, actor, None).await
    }

    pub async fn cancel(&self, code: &OrderCode, actor: &Actor, reason: Option<&str>) -> Result<TransitionResult, EngineError> {
        self.transition(code, OrderStatusType::Cancelled, actor, reason).await
    }

    pub async fn expire(&self, code: &OrderCode) -> Result<TransitionResult, EngineError> {
        self.transition(code, OrderStatusType::Expired, &Actor::System, Some("unpaid past the order TTL")).await
    }

    pub async fn fail(&self, code: &OrderCode, reason: &str) -> Result<TransitionResult, EngineError> {
        self.transition(code, OrderStatusType::Failed, &Actor::System, Some(reason)).await
    }

    pub async fn mark_refunded(&self, code: &OrderCode, actor: &Actor) -> Result<TransitionResult, EngineError> {
        self.transition(code, OrderStatusType::Refunded, actor, None).await
    }

    pub async fn set_resi(&self, code: &OrderCode, resi: &str, actor: &Actor) -> Result<Order, EngineError> {
        let order = self.db.set_resi(code, resi, actor).await?;
        info!("📦️ Tracking number {resi} assigned to order {code}");
        Ok(order)
    }

    /// Ships a PACKING order. Without a tracking number, a waybill is requested from the shipping gateway first; that
    /// call happens before any lock is taken.
    pub async fn ship_order<S: ShippingGateway>(
        &self,
        code: &OrderCode,
        resi: Option<&str>,
        actor: &Actor,
        shipping: &S,
        deadline: StdDuration,
    ) -> Result<TransitionResult, EngineError> {
        let resi = match resi.map(str::trim).filter(|r| !r.is_empty()) {
            Some(resi) => resi.to_string(),
            None => {
                let order = self.fetch_order(code).await?;
                check_order_transition(order.status, OrderStatusType::Shipped)?;
                let items = self.db.fetch_order_items(order.id).await?;
                let request = waybill_request(&order, &items)?;
                let waybill = with_deadline(deadline, shipping.create_waybill(&request)).await?;
                info!("🚚️ Waybill {} issued for order {code}", waybill.tracking_number);
                waybill.tracking_number
            },
        };
        self.mark_shipped_with_resi(code, &resi, actor).await
    }

    pub async fn history(&self, code: &OrderCode) -> Result<Vec<StatusHistoryEntry>, EngineError> {
        let order = self.fetch_order(code).await?;
        self.db.order_history(order.id).await
    }

    pub async fn stock_movements_for_order(&self, code: &OrderCode) -> Result<Vec<StockMovement>, EngineError> {
        let order = self.fetch_order(code).await?;
        self.db.stock_movements_for_order(order.id).await
    }

    /// Recomputes the stock of a SKU from its movement ledger and compares it with the stored level.
    pub async fn verify_stock_ledger(&self, key: StockKey) -> Result<StockLedgerReport, EngineError> {
        let report = self.db.stock_ledger(key).await?;
        if !report.is_consistent() {
            error!(
                "📦️ Stock ledger for {key} is inconsistent. Expected {} but found {}",
                report.expected_stock, report.current_stock
            );
        }
        Ok(report)
    }

    /// Expires up to one batch of PENDING orders older than the order TTL, oldest first.
    pub async fn expire_stale_orders(&self) -> Result<ExpirySummary, EngineError> {
        let cutoff = self.db.now() - self.config.order_ttl;
        let candidates = self.db.fetch_expirable_orders(cutoff, self.config.expiry_batch_size).await?;
        let mut summary = ExpirySummary::default();
        for order in candidates {
            match self.expire(&order.order_code).await {
                Ok(_) => summary.expired.push(order.order_code),
                Err(EngineError::InvalidTransition(e)) => {
                    debug!("📦️ Order {} was not expired: {e}", order.order_code);
                    summary.skipped += 1;
                },
                Err(e) => {
                    warn!("📦️ Could not expire order {}: {e}", order.order_code);
                    summary.errors += 1;
                },
            }
        }
        if !summary.expired.is_empty() {
            info!("📦️ Expired {} unpaid order(s)", summary.expired.len());
        }
        Ok(summary)
    }
}

fn waybill_request(order: &Order, items: &[OrderItem]) -> Result<WaybillRequest, EngineError> {
    let courier = order
        .courier
        .clone()
        .ok_or_else(|| EngineError::ValidationError(format!("Order {} has no courier", order.order_code)))?;
    Ok(WaybillRequest {
        order_code: order.order_code.to_string(),
        courier,
        courier_service: order.courier_service.clone(),
        recipient: CustomerInfo {
            name: order.customer_name.clone(),
            email: order.customer_email.clone(),
            phone: order.customer_phone.clone(),
        },
        address: order.shipping_address.clone(),
        item_count: items.iter().map(|i| i.quantity).sum(),
    })
}
