use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{OrderCode, Payment, PaymentMethod, PaymentStatus, Rupiah},
    traits::PaymentChange,
};

/// What the customer needs to complete a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentInstructions {
    pub order_code: OrderCode,
    pub external_id: String,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub amount: Rupiah,
    pub transaction_id: Option<String>,
    pub va_number: Option<String>,
    pub qr_code_url: Option<String>,
    pub expiry_time: Option<DateTime<Utc>>,
}

impl PaymentInstructions {
    pub fn new(order_code: OrderCode, payment: &Payment) -> Self {
        Self {
            order_code,
            external_id: payment.external_id.clone(),
            method: payment.method,
            status: payment.status,
            amount: payment.amount,
            transaction_id: payment.transaction_id.clone(),
            va_number: payment.va_number.clone(),
            qr_code_url: payment.qr_code_url.clone(),
            expiry_time: payment.expiry_time,
        }
    }
}

/// How a webhook delivery was handled. The gateway is acknowledged with a success response in every case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// The signature did not verify. Nothing was changed.
    InvalidSignature,
    /// No payment is known by the notification's id.
    UnknownPayment(String),
    Handled(PaymentChange),
    /// Applying the notification failed. The failure was logged for reconciliation.
    Failed(String),
}

impl WebhookOutcome {
    pub fn is_handled(&self) -> bool {
        matches!(self, WebhookOutcome::Handled(_))
    }
}
