use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::GatewayError;
use crate::db_types::{CustomerInfo, PaymentMethod, PaymentStatus, Rupiah};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeItem {
    pub id: String,
    pub name: String,
    pub price: Rupiah,
    pub quantity: i64,
}

/// Snapshot of the order sent to the gateway when opening a charge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeRequest {
    /// The id the gateway will know this payment by. Webhooks refer back to it.
    pub external_id: String,
    pub order_code: String,
    pub amount: Rupiah,
    pub method: PaymentMethod,
    pub customer: CustomerInfo,
    pub items: Vec<ChargeItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeResponse {
    pub transaction_id: String,
    pub transaction_status: String,
    pub va_number: Option<String>,
    pub qr_code_url: Option<String>,
    pub expiry_time: Option<DateTime<Utc>>,
    pub raw: String,
}

/// The gateway's authoritative view of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionStatus {
    pub transaction_status: String,
    pub transaction_id: Option<String>,
    pub fraud_status: Option<String>,
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayRefundRequest {
    pub external_id: String,
    pub amount: Rupiah,
    pub reason: String,
    /// Forwarded to the gateway so that a repeated call cannot refund twice.
    pub refund_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayRefundResponse {
    pub gateway_refund_id: String,
    pub status: String,
    pub raw: String,
}

/// An HTTP notification from the gateway, as received.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookNotification {
    /// The payment's external id.
    pub order_id: String,
    pub transaction_status: String,
    pub transaction_id: Option<String>,
    pub fraud_status: Option<String>,
    pub status_code: String,
    pub gross_amount: String,
    pub signature_key: String,
    pub payment_type: Option<String>,
}

impl WebhookNotification {
    pub fn to_transaction_status(&self, raw: &str) -> TransactionStatus {
        TransactionStatus {
            transaction_status: self.transaction_status.clone(),
            transaction_id: self.transaction_id.clone(),
            fraud_status: self.fraud_status.clone(),
            raw: raw.to_string(),
        }
    }
}

/// What a gateway transaction status means for the local payment and order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    /// Funds captured. Payment SUCCESS, order PAID.
    Settled,
    /// Captured but held for fraud review. Nothing changes until the gateway decides.
    Challenged,
    Pending,
    /// Denied or cancelled. Payment CANCELLED, order FAILED.
    Cancelled,
    Expired,
    Failed,
}

impl PaymentOutcome {
    pub fn from_gateway(transaction_status: &str, fraud_status: Option<&str>) -> Self {
        match (transaction_status, fraud_status) {
            ("capture", Some("challenge")) => PaymentOutcome::Challenged,
            ("capture" | "settlement", None | Some("accept")) => PaymentOutcome::Settled,
            ("capture" | "settlement", Some(_)) => PaymentOutcome::Failed,
            ("pending", _) => PaymentOutcome::Pending,
            ("deny" | "cancel", _) => PaymentOutcome::Cancelled,
            ("expire", _) => PaymentOutcome::Expired,
            _ => PaymentOutcome::Failed,
        }
    }

    /// The payment status this outcome drives the local payment to.
    pub fn payment_status(&self) -> PaymentStatus {
        match self {
            PaymentOutcome::Settled => PaymentStatus::Success,
            PaymentOutcome::Challenged | PaymentOutcome::Pending => PaymentStatus::Pending,
            PaymentOutcome::Cancelled => PaymentStatus::Cancelled,
            PaymentOutcome::Expired => PaymentStatus::Expired,
            PaymentOutcome::Failed => PaymentStatus::Failed,
        }
    }
}

/// The payment provider. One provider is active at a time.
#[allow(async_fn_in_trait)]
pub trait PaymentGateway {
    async fn create_charge(&self, request: &ChargeRequest) -> Result<ChargeResponse, GatewayError>;

    async fn get_transaction_status(&self, external_id: &str) -> Result<TransactionStatus, GatewayError>;

    async fn create_refund(&self, request: &GatewayRefundRequest) -> Result<GatewayRefundResponse, GatewayError>;

    /// Checks the signature carried by a webhook against the shared secret.
    fn verify_webhook_signature(&self, notification: &WebhookNotification) -> bool;
}

#[cfg(test)]
mod test {
    use super::{PaymentOutcome::*, *};

    #[test]
    fn provider_status_mapping() {
        assert_eq!(PaymentOutcome::from_gateway("settlement", None), Settled);
        assert_eq!(PaymentOutcome::from_gateway("settlement", Some("accept")), Settled);
        assert_eq!(PaymentOutcome::from_gateway("capture", Some("accept")), Settled);
        assert_eq!(PaymentOutcome::from_gateway("capture", Some("challenge")), Challenged);
        assert_eq!(PaymentOutcome::from_gateway("capture", Some("deny")), Failed);
        assert_eq!(PaymentOutcome::from_gateway("pending", None), Pending);
        assert_eq!(PaymentOutcome::from_gateway("deny", None), Cancelled);
        assert_eq!(PaymentOutcome::from_gateway("cancel", None), Cancelled);
        assert_eq!(PaymentOutcome::from_gateway("expire", None), Expired);
        assert_eq!(PaymentOutcome::from_gateway("refund", None), Failed);
        assert_eq!(Challenged.payment_status(), PaymentStatus::Pending);
        assert_eq!(Cancelled.payment_status(), PaymentStatus::Cancelled);
    }
}
