use std::fmt::Display;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use zvr_order_engine::{
    db_types::{
        Actor,
        CustomerInfo,
        NewOrderItem,
        Order,
        OrderCode,
        OrderItem,
        OrderRefundStatus,
        OrderStatusType,
        PaymentMethod,
        Refund,
        RefundItem,
        RefundReason,
        RefundType,
        Rupiah,
    },
    order_objects::OrderDetail,
    traits::{NewRefund, NewRefundItem, RefundCompletedResult, RefundCreated, TransitionResult},
};

use crate::helpers::{mask_email, mask_name, mask_phone};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}

//--------------------------------------        Checkout        --------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub customer: CustomerInfo,
    pub shipping_address: String,
    pub courier: String,
    #[serde(default)]
    pub courier_service: Option<String>,
    pub items: Vec<NewOrderItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutResponse {
    pub order_code: OrderCode,
    pub total_amount: Rupiah,
}

//--------------------------------------         Orders         --------------------------------------------------------
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderQuery {
    pub email: Option<String>,
}

/// An order as shown to a caller. Unless the caller is entitled to the full record, contact details are masked and
/// the shipping address and tracking number are withheld.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderView {
    pub order_code: OrderCode,
    pub status: OrderStatusType,
    pub masked: bool,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub shipping_address: Option<String>,
    pub courier: Option<String>,
    pub courier_service: Option<String>,
    pub resi: Option<String>,
    pub subtotal: Rupiah,
    pub shipping_cost: Rupiah,
    pub tax: Rupiah,
    pub discount: Rupiah,
    pub total_amount: Rupiah,
    pub refund_status: Option<OrderRefundStatus>,
    pub refund_amount: Rupiah,
    pub paid_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub items: Vec<OrderItem>,
}

impl OrderView {
    pub fn full(detail: OrderDetail) -> Self {
        let OrderDetail { order, items } = detail;
        Self {
            order_code: order.order_code,
            status: order.status,
            masked: false,
            customer_name: order.customer_name,
            customer_email: order.customer_email,
            customer_phone: order.customer_phone,
            shipping_address: Some(order.shipping_address),
            courier: order.courier,
            courier_service: order.courier_service,
            resi: order.resi,
            subtotal: order.subtotal,
            shipping_cost: order.shipping_cost,
            tax: order.tax,
            discount: order.discount,
            total_amount: order.total_amount,
            refund_status: order.refund_status,
            refund_amount: order.refund_amount,
            paid_at: order.paid_at,
            shipped_at: order.shipped_at,
            delivered_at: order.delivered_at,
            created_at: order.created_at,
            items,
        }
    }

    pub fn masked(detail: OrderDetail) -> Self {
        let mut view = Self::full(detail);
        view.masked = true;
        view.customer_name = mask_name(&view.customer_name);
        view.customer_email = mask_email(&view.customer_email);
        view.customer_phone = mask_phone(&view.customer_phone);
        view.shipping_address = None;
        view.resi = None;
        view
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShipParams {
    /// The courier's tracking number. If omitted, a waybill is booked with the shipping gateway.
    pub resi: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CancelParams {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionResponse {
    pub order_code: OrderCode,
    pub from: OrderStatusType,
    pub status: OrderStatusType,
    pub resi: Option<String>,
    /// Number of stock movements written to put reserved units back.
    pub released: usize,
}

impl From<TransitionResult> for TransitionResponse {
    fn from(result: TransitionResult) -> Self {
        Self {
            order_code: result.order.order_code,
            from: result.from,
            status: result.order.status,
            resi: result.order.resi,
            released: result.released.len(),
        }
    }
}

//--------------------------------------        Payments        --------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePaymentRequest {
    /// The order code, e.g. `ZVR-20240603-1A2B3C4D`.
    pub order_id: OrderCode,
    pub method: PaymentMethod,
}

//--------------------------------------         Refunds        --------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundRequest {
    pub order_code: OrderCode,
    pub refund_type: RefundType,
    pub reason: RefundReason,
    #[serde(default)]
    pub reason_detail: Option<String>,
    #[serde(default)]
    pub shipping_refund: Option<Rupiah>,
    #[serde(default)]
    pub items_refund: Option<Rupiah>,
    #[serde(default)]
    pub items: Vec<NewRefundItem>,
}

impl RefundRequest {
    pub fn into_new_refund(self, idempotency_key: String, requested_by: Actor) -> NewRefund {
        NewRefund {
            order_code: self.order_code,
            refund_type: self.refund_type,
            reason: self.reason,
            reason_detail: self.reason_detail,
            idempotency_key,
            shipping_refund: self.shipping_refund,
            items_refund: self.items_refund,
            items: self.items,
            requested_by,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundResponse {
    pub refund: Refund,
    pub items: Vec<RefundItem>,
    /// False when the idempotency key matched an earlier request.
    pub created: bool,
}

impl From<RefundCreated> for RefundResponse {
    fn from(value: RefundCreated) -> Self {
        Self { refund: value.refund, items: value.items, created: value.created }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundOutcomeResponse {
    pub refund: Refund,
    pub order_code: OrderCode,
    pub order_status: OrderStatusType,
    pub order_refund_amount: Rupiah,
    pub order_refunded: bool,
    /// Units put back into stock by this refund.
    pub restocked: i64,
}

impl From<RefundCompletedResult> for RefundOutcomeResponse {
    fn from(result: RefundCompletedResult) -> Self {
        let RefundCompletedResult { refund, order, order_refunded, restocked } = result;
        let Order { order_code, status, refund_amount, .. } = order;
        Self {
            refund,
            order_code,
            order_status: status,
            order_refund_amount: refund_amount,
            order_refunded,
            restocked: restocked.iter().map(|m| m.quantity).sum(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteParams {
    pub note: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseRefundParams {
    pub reason: String,
}

//--------------------------------------          Jobs          --------------------------------------------------------
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconcileParams {
    /// The business day to reconcile. Defaults to yesterday.
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncLogQuery {
    #[serde(default)]
    pub unresolved: bool,
}
