use std::fmt::Debug;

use log::*;
use serde_json::json;

use crate::{
    collaborators::{with_deadline, GatewayError, GatewayRefundRequest, PaymentGateway},
    db_types::{Actor, Order, OrderCode, Payment, Refund, RefundCode, RefundStatus, StatusHistoryEntry},
    errors::EngineError,
    events::{EventProducers, RefundCompletedEvent},
    state_machine::InvalidTransition,
    traits::{NewRefund, RefundCompletedResult, RefundCompletion, RefundCreated, RefundManagement},
    zvr_api::{config::GatewayDeadlines, refund_objects::RefundDetail},
};

/// `RefundApi` manages refund requests from creation through the gateway call to completion.
///
/// Refunds move through their own state machine: PENDING → PROCESSING → COMPLETED or FAILED, with manual completion,
/// rejection and cancellation as operator paths. The gateway refund is always requested with the refund's idempotency
/// key, so a retried call cannot refund twice.
pub struct RefundApi<B, G> {
    db: B,
    gateway: G,
    producers: EventProducers,
    deadlines: GatewayDeadlines,
}

impl<B, G> Debug for RefundApi<B, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RefundApi ({:?})", self.deadlines)
    }
}

impl<B: Clone, G: Clone> Clone for RefundApi<B, G> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            gateway: self.gateway.clone(),
            producers: self.producers.clone(),
            deadlines: self.deadlines,
        }
    }
}

impl<B, G> RefundApi<B, G> {
    pub fn new(db: B, gateway: G, producers: EventProducers) -> Self {
        Self { db, gateway, producers, deadlines: GatewayDeadlines::default() }
    }

    pub fn with_deadlines(mut self, deadlines: GatewayDeadlines) -> Self {
        self.deadlines = deadlines;
        self
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B, G> RefundApi<B, G>
where
    B: RefundManagement,
    G: PaymentGateway,
{
    /// Records a refund request. Repeating a request with the same idempotency key returns the original refund.
    pub async fn create_refund(&self, request: NewRefund) -> Result<RefundCreated, EngineError> {
        if request.idempotency_key.trim().is_empty() {
            return Err(EngineError::ValidationError("An idempotency key is required".to_string()));
        }
        let created = self.db.create_refund(request).await?;
        if created.created {
            info!(
                "💸️ Refund {} of {} requested ({})",
                created.refund.refund_code, created.refund.refund_amount, created.refund.refund_type
            );
        } else {
            debug!("💸️ Returning existing refund {} for a repeated request", created.refund.refund_code);
        }
        Ok(created)
    }

    /// Sends a PENDING refund to the gateway.
    ///
    /// If the gateway cannot be reached, or fails temporarily, the refund stays in PROCESSING and may be retried.
    /// A definitive refusal moves it to FAILED. Either way the gateway error is returned.
    pub async fn process_refund(&self, id: i64, actor: &Actor) -> Result<RefundCompletedResult, EngineError> {
        let (refund, order, payment) = self.db.begin_refund_processing(id, &[RefundStatus::Pending], actor).await?;
        self.call_gateway(refund, order, payment, actor).await
    }

    /// Sends a FAILED refund, or one left in PROCESSING by a temporary gateway failure, to the gateway again.
    pub async fn retry_refund(&self, id: i64, actor: &Actor) -> Result<RefundCompletedResult, EngineError> {
        let refund = self.fetch_refund(id).await?;
        let allowed: &[RefundStatus] = match refund.status {
            RefundStatus::Failed => &[RefundStatus::Failed],
            RefundStatus::Processing if refund.last_error_transient => &[RefundStatus::Processing],
            status => return Err(InvalidTransition::new(status, RefundStatus::Processing).into()),
        };
        let (refund, order, payment) = self.db.begin_refund_processing(id, allowed, actor).await?;
        info!("💸️ Retrying refund {}", refund.refund_code);
        self.call_gateway(refund, order, payment, actor).await
    }

    async fn call_gateway(
        &self,
        refund: Refund,
        order: Order,
        payment: Option<Payment>,
        actor: &Actor,
    ) -> Result<RefundCompletedResult, EngineError> {
        let Some(payment) = payment else {
            let msg = format!("Order {} has no settled payment to refund against", order.order_code);
            warn!("💸️ {msg}. Refund {} needs manual completion.", refund.refund_code);
            self.db.record_refund_failure(refund.id, &msg, None, false, actor).await?;
            return Err(EngineError::ValidationError(msg));
        };
        let request = GatewayRefundRequest {
            external_id: payment.external_id.clone(),
            amount: refund.refund_amount,
            reason: refund.reason_detail.clone().unwrap_or_else(|| refund.reason.to_string()),
            refund_key: refund.idempotency_key.clone(),
        };
        match with_deadline(self.deadlines.refund, self.gateway.create_refund(&request)).await {
            Ok(response) => {
                let completion =
                    RefundCompletion::Gateway { gateway_refund_id: response.gateway_refund_id, response: response.raw };
                self.complete(refund.id, completion, actor).await
            },
            Err(e) => {
                let transient = e.is_transient();
                warn!(
                    "💸️ Gateway refund for {} failed ({}): {e}",
                    refund.refund_code,
                    if transient { "retriable" } else { "permanent" }
                );
                let status = match &e {
                    GatewayError::Permanent { status, .. } => Some(*status),
                    _ => None,
                };
                let response = json!({ "error": e.to_string(), "status": status, "transient": transient }).to_string();
                self.db.record_refund_failure(refund.id, &e.to_string(), Some(&response), transient, actor).await?;
                Err(e.into())
            },
        }
    }

    /// Completes a refund that was paid out off the gateway, e.g. by bank transfer. The note is recorded in the
    /// refund history; all other effects are those of a gateway refund.
    pub async fn mark_manually_completed(
        &self,
        id: i64,
        actor: &Actor,
        note: &str,
    ) -> Result<RefundCompletedResult, EngineError> {
        if note.trim().is_empty() {
            return Err(EngineError::ValidationError("A note is required for manual completion".to_string()));
        }
        self.complete(id, RefundCompletion::Manual { note: note.to_string() }, actor).await
    }

    async fn complete(
        &self,
        id: i64,
        completion: RefundCompletion,
        actor: &Actor,
    ) -> Result<RefundCompletedResult, EngineError> {
        let result = self.db.complete_refund(id, completion, actor).await?;
        info!("💸️ Refund {} completed by {actor}", result.refund.refund_code);
        let event = RefundCompletedEvent::new(result.refund.clone(), result.order.clone());
        self.producers.publish_refund_completed(event).await;
        Ok(result)
    }

    pub async fn reject_refund(&self, id: i64, actor: &Actor, reason: &str) -> Result<Refund, EngineError> {
        self.db.close_refund(id, RefundStatus::Rejected, actor, reason).await
    }

    pub async fn cancel_refund(&self, id: i64, actor: &Actor, reason: &str) -> Result<Refund, EngineError> {
        self.db.close_refund(id, RefundStatus::Cancelled, actor, reason).await
    }

    pub async fn fetch_refund(&self, id: i64) -> Result<Refund, EngineError> {
        self.db.fetch_refund(id).await?.ok_or_else(|| EngineError::RefundNotFound(format!("#{id}")))
    }

    pub async fn fetch_refund_by_code(&self, code: &RefundCode) -> Result<Refund, EngineError> {
        self.db.fetch_refund_by_code(code).await?.ok_or_else(|| EngineError::RefundNotFound(code.to_string()))
    }

    pub async fn refund_detail(&self, id: i64) -> Result<RefundDetail, EngineError> {
        let refund = self.fetch_refund(id).await?;
        let items = self.db.fetch_refund_items(id).await?;
        let history = self.db.refund_history(id).await?;
        Ok(RefundDetail { refund, items, history })
    }

    pub async fn refunds_for_order(&self, code: &OrderCode) -> Result<Vec<Refund>, EngineError> {
        let order = self.db.fetch_order(code).await?.ok_or_else(|| EngineError::OrderNotFound(code.to_string()))?;
        self.db.refunds_for_order(order.id).await
    }

    pub async fn history(&self, id: i64) -> Result<Vec<StatusHistoryEntry>, EngineError> {
        self.db.refund_history(id).await
    }
}
