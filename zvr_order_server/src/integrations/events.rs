use log::*;
use zvr_order_engine::events::{
    EventHandlers,
    EventHooks,
    OrderAnnulledEvent,
    OrderPaidEvent,
    RefundCompletedEvent,
};

pub const EVENT_BUFFER_SIZE: usize = 25;

/// The server's subscribers to engine events.
///
/// Delivery to the customer (the payment received email) happens inside the engine, so these hooks only keep an
/// audit trail in the log:
///
/// 1. OrderPaidEvent - logs the order and the payment that settled it, if any.
/// 2. OrderAnnulledEvent - logs cancelled, failed and expired orders along with the status they ended in.
/// 3. RefundCompletedEvent - logs the refund and the order's running refund total.
pub fn create_event_handlers() -> EventHandlers {
    let mut hooks = EventHooks::default();
    hooks.on_order_paid(|ev| {
        let OrderPaidEvent { order, payment } = ev;
        Box::pin(async move {
            match payment {
                Some(p) => info!(
                    "📬️ Order {} paid. {} received via {} (payment {})",
                    order.order_code, p.amount, p.method, p.external_id
                ),
                None => info!("📬️ Order {} marked as paid by hand. Total {}", order.order_code, order.total_amount),
            }
        })
    });
    hooks.on_order_annulled(|ev| {
        let OrderAnnulledEvent { order, status } = ev;
        Box::pin(async move {
            info!("📬️ Order {} is now {status}. Its reserved stock has been released.", order.order_code);
        })
    });
    hooks.on_refund_completed(|ev| {
        let RefundCompletedEvent { refund, order } = ev;
        Box::pin(async move {
            info!(
                "📬️ Refund {} of {} for order {} completed. Refunded so far: {} of {}",
                refund.refund_code, refund.refund_amount, order.order_code, order.refund_amount, order.total_amount
            );
        })
    });
    EventHandlers::new(EVENT_BUFFER_SIZE, hooks)
}
