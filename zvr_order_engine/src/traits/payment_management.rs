use chrono::{DateTime, Utc};

use crate::{
    collaborators::{ChargeResponse, TransactionStatus},
    db_types::{
        EmailLog,
        EmailStatus,
        NewSyncLog,
        Order,
        OrderCode,
        Payment,
        PaymentMethod,
        PaymentSyncLog,
        SyncSource,
    },
    errors::EngineError,
    traits::{data_objects::PaymentUpdateResult, OrderManagement},
};

#[allow(async_fn_in_trait)]
pub trait PaymentManagement: OrderManagement {
    /// Under the order lock, checks that the order is PENDING with no open payment, and inserts a PENDING payment for
    /// the full order total. The returned payment's `external_id` is what the gateway charge must be created with.
    async fn reserve_payment(&self, code: &OrderCode, method: PaymentMethod) -> Result<(Order, Payment), EngineError>;

    /// Records the gateway's charge details against a reserved payment.
    async fn attach_charge(&self, payment_id: i64, charge: &ChargeResponse) -> Result<Payment, EngineError>;

    /// The gateway refused the charge outright. The payment is marked FAILED; the order stays PENDING so a new payment
    /// can be opened.
    async fn reject_charge(&self, payment_id: i64, error: &str) -> Result<Payment, EngineError>;

    async fn fetch_payment(&self, id: i64) -> Result<Option<Payment>, EngineError>;

    async fn fetch_payment_by_external_id(&self, external_id: &str) -> Result<Option<Payment>, EngineError>;

    async fn fetch_latest_payment_for_order(&self, order_id: i64) -> Result<Option<Payment>, EngineError>;

    /// Applies a gateway status to the payment and its order under the order lock. Replays of the same transaction
    /// are detected and change nothing. Sync-log rows for `JOB` and `MANUAL` sources, and for any mismatch, are written
    /// in the same transaction.
    async fn apply_gateway_status(
        &self,
        payment_id: i64,
        status: &TransactionStatus,
        source: SyncSource,
    ) -> Result<PaymentUpdateResult, EngineError>;

    /// Expires the payment and its order if the payment is still PENDING and `now > expiry_time + grace`.
    async fn expire_payment(&self, payment_id: i64, grace: chrono::Duration) -> Result<PaymentUpdateResult, EngineError>;

    /// Counts a failed gateway poll and schedules the next one.
    async fn record_sync_failure(
        &self,
        payment_id: i64,
        error: &str,
        source: SyncSource,
        next_sync_at: Option<DateTime<Utc>>,
    ) -> Result<Payment, EngineError>;

    /// Open payments not touched since `updated_before` whose next poll is due and that have retries left.
    async fn fetch_stale_payments(
        &self,
        updated_before: DateTime<Utc>,
        max_attempts: i64,
        limit: i64,
    ) -> Result<Vec<Payment>, EngineError>;

    async fn insert_sync_log(&self, source: SyncSource, log: NewSyncLog) -> Result<PaymentSyncLog, EngineError>;

    async fn fetch_sync_logs(&self, unresolved_only: bool) -> Result<Vec<PaymentSyncLog>, EngineError>;

    /// Claims the right to send `template_key` for the order. Returns `None` if it was claimed before.
    async fn claim_email(
        &self,
        order_id: i64,
        template_key: &str,
        recipient: &str,
    ) -> Result<Option<EmailLog>, EngineError>;

    async fn update_email_status(&self, id: i64, status: EmailStatus, error: Option<&str>) -> Result<(), EngineError>;

    async fn fetch_email_log(&self, order_id: i64) -> Result<Vec<EmailLog>, EngineError>;
}
