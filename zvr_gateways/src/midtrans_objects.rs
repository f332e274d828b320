use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    helpers::{parse_gross_amount, parse_midtrans_time},
    GatewayApiError,
};

/// Midtrans truncates item names beyond this length.
const MAX_ITEM_NAME: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MidtransMethod {
    BcaVa,
    BriVa,
    MandiriVa,
    PermataVa,
    BniVa,
    Qris,
    Gopay,
    CreditCard,
}

impl MidtransMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            MidtransMethod::BcaVa => "bca_va",
            MidtransMethod::BriVa => "bri_va",
            MidtransMethod::MandiriVa => "mandiri_va",
            MidtransMethod::PermataVa => "permata_va",
            MidtransMethod::BniVa => "bni_va",
            MidtransMethod::Qris => "qris",
            MidtransMethod::Gopay => "gopay",
            MidtransMethod::CreditCard => "credit_card",
        }
    }

    /// The `payment_type` and method-specific section of a charge body.
    fn charge_fields(&self, order_id: &str) -> (&'static str, Option<(&'static str, Value)>) {
        match self {
            MidtransMethod::BcaVa => ("bank_transfer", Some(("bank_transfer", json!({ "bank": "bca" })))),
            MidtransMethod::BriVa => ("bank_transfer", Some(("bank_transfer", json!({ "bank": "bri" })))),
            MidtransMethod::BniVa => ("bank_transfer", Some(("bank_transfer", json!({ "bank": "bni" })))),
            MidtransMethod::PermataVa => ("bank_transfer", Some(("bank_transfer", json!({ "bank": "permata" })))),
            MidtransMethod::MandiriVa => {
                ("echannel", Some(("echannel", json!({ "bill_info1": "Payment for", "bill_info2": order_id }))))
            },
            MidtransMethod::Qris => ("qris", Some(("qris", json!({ "acquirer": "gopay" })))),
            MidtransMethod::Gopay => ("gopay", None),
            MidtransMethod::CreditCard => ("credit_card", Some(("credit_card", json!({ "secure": true })))),
        }
    }
}

impl Display for MidtransMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MidtransMethod {
    type Err = GatewayApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bca_va" => Ok(MidtransMethod::BcaVa),
            "bri_va" => Ok(MidtransMethod::BriVa),
            "mandiri_va" => Ok(MidtransMethod::MandiriVa),
            "permata_va" => Ok(MidtransMethod::PermataVa),
            "bni_va" => Ok(MidtransMethod::BniVa),
            "qris" => Ok(MidtransMethod::Qris),
            "gopay" => Ok(MidtransMethod::Gopay),
            "credit_card" => Ok(MidtransMethod::CreditCard),
            s => Err(GatewayApiError::InvalidRequest(format!("Unsupported payment method {s}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerDetails {
    pub first_name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDetails {
    pub id: String,
    pub price: i64,
    pub quantity: i64,
    pub name: String,
}

/// A Core API charge. `order_id` is the id Midtrans knows the transaction by; every later status poll, refund and
/// notification refers to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidtransCharge {
    pub order_id: String,
    pub gross_amount: i64,
    pub method: MidtransMethod,
    pub customer: CustomerDetails,
    pub items: Vec<ItemDetails>,
}

impl MidtransCharge {
    /// Midtrans rejects a charge whose item lines do not add up to the gross amount.
    pub fn validate(&self) -> Result<(), GatewayApiError> {
        if self.gross_amount <= 0 {
            return Err(GatewayApiError::InvalidRequest(format!("gross_amount must be positive: {}", self.gross_amount)));
        }
        if !self.items.is_empty() {
            let sum = self.items.iter().try_fold(0i64, |acc, i| i.price.checked_mul(i.quantity)?.checked_add(acc));
            if sum != Some(self.gross_amount) {
                return Err(GatewayApiError::InvalidRequest(format!(
                    "Item lines add up to {sum:?}, not {}",
                    self.gross_amount
                )));
            }
        }
        Ok(())
    }

    pub fn to_body(&self) -> Value {
        let (payment_type, section) = self.method.charge_fields(&self.order_id);
        let items = self
            .items
            .iter()
            .map(|i| {
                let name = i.name.chars().take(MAX_ITEM_NAME).collect::<String>();
                json!({ "id": i.id, "price": i.price, "quantity": i.quantity, "name": name })
            })
            .collect::<Vec<Value>>();
        let mut body = json!({
            "payment_type": payment_type,
            "transaction_details": { "order_id": self.order_id, "gross_amount": self.gross_amount },
            "customer_details": self.customer,
            "item_details": items,
        });
        if let Some((key, value)) = section {
            body[key] = value;
        }
        body
    }
}

/// Midtrans reports failures in the body's `status_code`, sometimes with an HTTP 200.
fn check_status_code(status_code: &str, message: Option<&str>) -> Result<(), GatewayApiError> {
    let status = status_code
        .parse::<u16>()
        .map_err(|_| GatewayApiError::JsonError(format!("Invalid status_code {status_code}")))?;
    if (200..300).contains(&status) {
        Ok(())
    } else {
        Err(GatewayApiError::from_status(status, message.unwrap_or("no message")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaNumber {
    pub bank: String,
    pub va_number: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MidtransAction {
    pub name: String,
    pub method: Option<String>,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MidtransChargeResponse {
    pub status_code: String,
    pub status_message: Option<String>,
    pub transaction_id: Option<String>,
    pub order_id: Option<String>,
    pub gross_amount: Option<String>,
    pub transaction_status: Option<String>,
    pub fraud_status: Option<String>,
    #[serde(default)]
    pub va_numbers: Vec<VaNumber>,
    pub permata_va_number: Option<String>,
    pub bill_key: Option<String>,
    pub biller_code: Option<String>,
    #[serde(default)]
    pub actions: Vec<MidtransAction>,
    pub expiry_time: Option<String>,
}

impl MidtransChargeResponse {
    pub fn check(&self) -> Result<(), GatewayApiError> {
        check_status_code(&self.status_code, self.status_message.as_deref())
    }

    /// The number the customer pays into. Mandiri bills are shown as `biller_code-bill_key`.
    pub fn va_number(&self) -> Option<String> {
        if let Some(va) = self.va_numbers.first() {
            return Some(va.va_number.clone());
        }
        if let Some(va) = &self.permata_va_number {
            return Some(va.clone());
        }
        match (&self.biller_code, &self.bill_key) {
            (Some(code), Some(key)) => Some(format!("{code}-{key}")),
            _ => None,
        }
    }

    pub fn qr_code_url(&self) -> Option<String> {
        self.actions.iter().find(|a| a.name == "generate-qr-code").map(|a| a.url.clone())
    }

    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        self.expiry_time.as_deref().and_then(parse_midtrans_time)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MidtransStatusResponse {
    pub status_code: String,
    pub status_message: Option<String>,
    pub transaction_id: Option<String>,
    pub order_id: Option<String>,
    pub gross_amount: Option<String>,
    pub payment_type: Option<String>,
    pub transaction_status: Option<String>,
    pub fraud_status: Option<String>,
    pub settlement_time: Option<String>,
}

impl MidtransStatusResponse {
    pub fn check(&self) -> Result<(), GatewayApiError> {
        check_status_code(&self.status_code, self.status_message.as_deref())?;
        if self.transaction_status.is_none() {
            return Err(GatewayApiError::JsonError("Status response has no transaction_status".to_string()));
        }
        Ok(())
    }

    pub fn gross_amount_value(&self) -> Option<i64> {
        self.gross_amount.as_deref().and_then(parse_gross_amount)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MidtransRefund {
    pub refund_key: String,
    pub amount: i64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MidtransRefundResponse {
    pub status_code: String,
    pub status_message: Option<String>,
    pub transaction_id: Option<String>,
    pub order_id: Option<String>,
    pub refund_key: Option<String>,
    pub refund_amount: Option<String>,
    pub refund_chargeback_id: Option<i64>,
    pub transaction_status: Option<String>,
}

impl MidtransRefundResponse {
    pub fn check(&self) -> Result<(), GatewayApiError> {
        check_status_code(&self.status_code, self.status_message.as_deref())
    }

    /// Midtrans identifies a refund by its chargeback id when it reports one, otherwise by our refund key.
    pub fn refund_id(&self) -> Option<String> {
        self.refund_chargeback_id.map(|id| id.to_string()).or_else(|| self.refund_key.clone())
    }
}
