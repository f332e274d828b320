//! Data types persisted by the order engine.
//!
//! Every status enum is stored as an upper-case string, and serializes the same way over the wire.
use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;
pub use zvr_common::Rupiah;

#[derive(Debug, Clone, Error)]
#[error("Invalid value: {0}")]
pub struct ConversionError(pub String);

/// Implements `as_str`, `Display` and `FromStr` for a fieldless enum using the given string table.
macro_rules! string_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $s),+
                }
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ConversionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok($name::$variant),)+
                    s => Err(ConversionError(format!("{s} is not a valid {}", stringify!($name)))),
                }
            }
        }
    };
}

//--------------------------------------   OrderStatusType     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatusType {
    /// Created, stock reserved, awaiting payment.
    Pending,
    /// Payment settled.
    Paid,
    Packing,
    Shipped,
    Delivered,
    Completed,
    /// Cancelled by the customer or an admin before fulfilment.
    Cancelled,
    /// The payment failed terminally.
    Failed,
    /// Not paid within the order TTL.
    Expired,
    /// Fully refunded after delivery.
    Refunded,
}

string_enum!(OrderStatusType {
    Pending => "PENDING",
    Paid => "PAID",
    Packing => "PACKING",
    Shipped => "SHIPPED",
    Delivered => "DELIVERED",
    Completed => "COMPLETED",
    Cancelled => "CANCELLED",
    Failed => "FAILED",
    Expired => "EXPIRED",
    Refunded => "REFUNDED",
});

impl OrderStatusType {
    pub const ALL: [OrderStatusType; 10] = [
        OrderStatusType::Pending,
        OrderStatusType::Paid,
        OrderStatusType::Packing,
        OrderStatusType::Shipped,
        OrderStatusType::Delivered,
        OrderStatusType::Completed,
        OrderStatusType::Cancelled,
        OrderStatusType::Failed,
        OrderStatusType::Expired,
        OrderStatusType::Refunded,
    ];

    /// Statuses that release reserved stock when entered.
    pub fn releases_stock(&self) -> bool {
        matches!(self, OrderStatusType::Cancelled | OrderStatusType::Failed | OrderStatusType::Expired)
    }

    pub fn is_terminal(&self) -> bool {
        crate::state_machine::allowed_order_transitions(*self).is_empty()
    }
}

//--------------------------------------   OrderRefundStatus   ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderRefundStatus {
    Partial,
    Full,
}

string_enum!(OrderRefundStatus { Partial => "PARTIAL", Full => "FULL" });

//--------------------------------------        OrderCode        -------------------------------------------------------
/// The customer-facing order identifier, `ZVR-YYYYMMDD-XXXXXXXX`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct OrderCode(pub String);

impl OrderCode {
    pub const LENGTH: usize = 21;

    pub fn new<S: Into<String>>(code: S) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_well_formed(code: &str) -> bool {
        Regex::new(r"^ZVR-\d{8}-[0-9A-F]{8}$").map(|re| re.is_match(code)).unwrap_or(false)
    }
}

impl FromStr for OrderCode {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if Self::is_well_formed(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(ConversionError(format!("{s} is not a valid order code")))
        }
    }
}

impl Display for OrderCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

//--------------------------------------        RefundCode       -------------------------------------------------------
/// The customer-facing refund identifier, `RFD-YYYYMMDD-XXXX`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct RefundCode(pub String);

impl RefundCode {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for RefundCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<S: Into<String>> From<S> for RefundCode {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

//--------------------------------------          Actor          -------------------------------------------------------
/// Whoever caused a state change. Recorded verbatim in the history tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Actor {
    System,
    Admin(String),
    Customer(i64),
}

impl Actor {
    pub fn is_admin(&self) -> bool {
        matches!(self, Actor::Admin(_))
    }
}

impl Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Actor::System => f.write_str("system"),
            Actor::Admin(email) => write!(f, "admin:{email}"),
            Actor::Customer(id) => write!(f, "customer:{id}"),
        }
    }
}

//--------------------------------------     Catalog & Stock     -------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub image_url: Option<String>,
    pub price: Rupiah,
    pub stock: i64,
    pub initial_stock: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct ProductVariant {
    pub id: i64,
    pub product_id: i64,
    pub name: String,
    pub price: Option<Rupiah>,
    pub stock: i64,
    pub initial_stock: i64,
}

/// A single line of a stock-keeping unit: a product, or a specific variant of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StockKey {
    pub product_id: i64,
    pub variant_id: Option<i64>,
}

impl StockKey {
    pub fn new(product_id: i64, variant_id: Option<i64>) -> Self {
        Self { product_id, variant_id }
    }
}

impl Display for StockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.variant_id {
            Some(v) => write!(f, "product #{} (variant #{v})", self.product_id),
            None => write!(f, "product #{}", self.product_id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementType {
    Reserve,
    Release,
    Deduct,
}

string_enum!(MovementType { Reserve => "RESERVE", Release => "RELEASE", Deduct => "DEDUCT" });

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: i64,
    pub product_id: i64,
    pub variant_id: Option<i64>,
    pub order_id: Option<i64>,
    pub refund_id: Option<i64>,
    pub movement_type: MovementType,
    pub quantity: i64,
    pub balance_after: i64,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------          Orders         -------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerInfo {
    pub name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderItem {
    pub product_id: i64,
    pub variant_id: Option<i64>,
    pub quantity: i64,
}

impl NewOrderItem {
    pub fn stock_key(&self) -> StockKey {
        StockKey::new(self.product_id, self.variant_id)
    }
}

/// A checkout request that has been validated and priced for shipping. Item prices are snapshotted from the catalog
/// inside the creating transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub user_id: Option<i64>,
    pub customer: CustomerInfo,
    pub shipping_address: String,
    pub courier: Option<String>,
    pub courier_service: Option<String>,
    pub items: Vec<NewOrderItem>,
    pub shipping_cost: Rupiah,
    /// Tax rate in basis points applied to the item subtotal.
    pub tax_rate_bps: i64,
    pub discount: Rupiah,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_code: OrderCode,
    pub user_id: Option<i64>,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub shipping_address: String,
    pub courier: Option<String>,
    pub courier_service: Option<String>,
    pub subtotal: Rupiah,
    pub shipping_cost: Rupiah,
    pub tax: Rupiah,
    pub discount: Rupiah,
    pub total_amount: Rupiah,
    pub status: OrderStatusType,
    pub stock_reserved: bool,
    pub resi: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub refund_status: Option<OrderRefundStatus>,
    pub refund_amount: Rupiah,
    pub refunded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// The amount that can still be refunded against this order.
    pub fn refundable_balance(&self) -> Rupiah {
        self.total_amount - self.refund_amount
    }

    /// Returns true if `email` matches the customer email on the order, ignoring case.
    pub fn is_owned_by_email(&self, email: &str) -> bool {
        self.customer_email.eq_ignore_ascii_case(email.trim())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub variant_id: Option<i64>,
    pub product_name: String,
    pub product_image: Option<String>,
    pub quantity: i64,
    pub price_per_unit: Rupiah,
    pub subtotal: Rupiah,
}

impl OrderItem {
    pub fn stock_key(&self) -> StockKey {
        StockKey::new(self.product_id, self.variant_id)
    }
}

/// One row of either the order or the refund status history.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub id: i64,
    pub from_status: Option<String>,
    pub to_status: String,
    pub actor: String,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------         Payments        -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Success,
    Failed,
    Expired,
    Cancelled,
}

string_enum!(PaymentStatus {
    Pending => "PENDING",
    Processing => "PROCESSING",
    Success => "SUCCESS",
    Failed => "FAILED",
    Expired => "EXPIRED",
    Cancelled => "CANCELLED",
});

impl PaymentStatus {
    pub fn is_open(&self) -> bool {
        matches!(self, PaymentStatus::Pending | PaymentStatus::Processing)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    BcaVa,
    BniVa,
    BriVa,
    MandiriVa,
    PermataVa,
    Qris,
    Gopay,
    CreditCard,
}

string_enum!(PaymentMethod {
    BcaVa => "bca_va",
    BniVa => "bni_va",
    BriVa => "bri_va",
    MandiriVa => "mandiri_va",
    PermataVa => "permata_va",
    Qris => "qris",
    Gopay => "gopay",
    CreditCard => "credit_card",
});

impl PaymentMethod {
    pub fn is_virtual_account(&self) -> bool {
        matches!(
            self,
            PaymentMethod::BcaVa
                | PaymentMethod::BniVa
                | PaymentMethod::BriVa
                | PaymentMethod::MandiriVa
                | PaymentMethod::PermataVa
        )
    }

    /// The bank code used by the gateway for virtual account charges.
    pub fn bank(&self) -> Option<&'static str> {
        match self {
            PaymentMethod::BcaVa => Some("bca"),
            PaymentMethod::BniVa => Some("bni"),
            PaymentMethod::BriVa => Some("bri"),
            PaymentMethod::MandiriVa => Some("mandiri"),
            PaymentMethod::PermataVa => Some("permata"),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Payment {
    pub id: i64,
    pub order_id: i64,
    /// The id this payment is known by at the gateway. Unique across all payments.
    pub external_id: String,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub amount: Rupiah,
    pub transaction_id: Option<String>,
    pub fraud_status: Option<String>,
    pub va_number: Option<String>,
    pub qr_code_url: Option<String>,
    pub raw_response: Option<String>,
    pub expiry_time: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub sync_retry_count: i64,
    pub next_sync_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncSource {
    Webhook,
    Job,
    Manual,
}

string_enum!(SyncSource { Webhook => "WEBHOOK", Job => "JOB", Manual => "MANUAL" });

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct PaymentSyncLog {
    pub id: i64,
    pub payment_id: Option<i64>,
    pub order_id: Option<i64>,
    pub source: SyncSource,
    pub local_status: Option<String>,
    pub gateway_status: Option<String>,
    pub has_mismatch: bool,
    pub resolved: bool,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewSyncLog {
    pub payment_id: Option<i64>,
    pub order_id: Option<i64>,
    pub local_status: Option<String>,
    pub gateway_status: Option<String>,
    pub has_mismatch: bool,
    pub resolved: bool,
    pub error: Option<String>,
}

impl NewSyncLog {
    pub fn for_payment(payment: &Payment) -> Self {
        Self {
            payment_id: Some(payment.id),
            order_id: Some(payment.order_id),
            local_status: Some(payment.status.to_string()),
            ..Default::default()
        }
    }

    pub fn with_gateway_status<S: Into<String>>(mut self, status: S) -> Self {
        self.gateway_status = Some(status.into());
        self
    }

    pub fn with_error<S: Into<String>>(mut self, error: S) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn mismatch(mut self) -> Self {
        self.has_mismatch = true;
        self
    }

    pub fn resolved(mut self) -> Self {
        self.resolved = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmailStatus {
    Pending,
    Sent,
    Failed,
}

string_enum!(EmailStatus { Pending => "PENDING", Sent => "SENT", Failed => "FAILED" });

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct EmailLog {
    pub id: i64,
    pub order_id: i64,
    pub template_key: String,
    pub recipient: String,
    pub status: EmailStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------          Refunds        -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefundType {
    Full,
    Partial,
    ShippingOnly,
    ItemOnly,
}

string_enum!(RefundType {
    Full => "FULL",
    Partial => "PARTIAL",
    ShippingOnly => "SHIPPING_ONLY",
    ItemOnly => "ITEM_ONLY",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefundReason {
    DamagedItem,
    WrongItem,
    NotAsDescribed,
    MissingItem,
    LateDelivery,
    CustomerRequest,
    DuplicatePayment,
    OutOfStock,
    Other,
}

string_enum!(RefundReason {
    DamagedItem => "DAMAGED_ITEM",
    WrongItem => "WRONG_ITEM",
    NotAsDescribed => "NOT_AS_DESCRIBED",
    MissingItem => "MISSING_ITEM",
    LateDelivery => "LATE_DELIVERY",
    CustomerRequest => "CUSTOMER_REQUEST",
    DuplicatePayment => "DUPLICATE_PAYMENT",
    OutOfStock => "OUT_OF_STOCK",
    Other => "OTHER",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefundStatus {
    Pending,
    Processing,
    Partial,
    Completed,
    Failed,
    Rejected,
    Cancelled,
}

string_enum!(RefundStatus {
    Pending => "PENDING",
    Processing => "PROCESSING",
    Partial => "PARTIAL",
    Completed => "COMPLETED",
    Failed => "FAILED",
    Rejected => "REJECTED",
    Cancelled => "CANCELLED",
});

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Refund {
    pub id: i64,
    pub refund_code: RefundCode,
    pub order_id: i64,
    pub payment_id: Option<i64>,
    pub refund_type: RefundType,
    pub reason: RefundReason,
    pub reason_detail: Option<String>,
    pub original_amount: Rupiah,
    pub refund_amount: Rupiah,
    pub shipping_refund: Rupiah,
    pub items_refund: Rupiah,
    pub status: RefundStatus,
    pub gateway_refund_id: Option<String>,
    /// JSON array of every gateway response received for this refund
    pub gateway_response: Option<String>,
    pub idempotency_key: String,
    pub requested_by: String,
    pub processed_by: Option<String>,
    pub last_error: Option<String>,
    pub last_error_transient: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct RefundItem {
    pub id: i64,
    pub refund_id: i64,
    pub order_item_id: i64,
    pub product_id: i64,
    pub variant_id: Option<i64>,
    pub quantity: i64,
    pub refund_amount: Rupiah,
    pub stock_restored: bool,
    pub stock_restored_at: Option<DateTime<Utc>>,
}

impl RefundItem {
    pub fn stock_key(&self) -> StockKey {
        StockKey::new(self.product_id, self.variant_id)
    }
}

//--------------------------------------      Reconciliation     -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReconciliationStatus {
    Running,
    Completed,
    Failed,
}

string_enum!(ReconciliationStatus { Running => "RUNNING", Completed => "COMPLETED", Failed => "FAILED" });

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct ReconciliationLog {
    pub id: i64,
    pub reconciliation_date: NaiveDate,
    pub status: ReconciliationStatus,
    pub orders_created: i64,
    pub orders_paid: i64,
    pub order_revenue: Rupiah,
    pub payments_settled: Rupiah,
    pub refunds_completed: Rupiah,
    pub net_revenue: Rupiah,
    pub mismatch_count: i64,
    pub details: Option<String>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}
