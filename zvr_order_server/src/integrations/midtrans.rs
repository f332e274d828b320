use log::*;
use zvr_gateways::{CustomerDetails, ItemDetails, MidtransApi, MidtransCharge, MidtransMethod, MidtransRefund};
use zvr_order_engine::collaborators::{
    ChargeRequest,
    ChargeResponse,
    GatewayError,
    GatewayRefundRequest,
    GatewayRefundResponse,
    PaymentGateway,
    TransactionStatus,
    WebhookNotification,
};

use super::map_gateway_error;

/// The Midtrans Core API as the engine's payment gateway.
#[derive(Clone)]
pub struct MidtransGateway {
    api: MidtransApi,
}

impl MidtransGateway {
    pub fn new(api: MidtransApi) -> Self {
        Self { api }
    }
}

pub fn midtrans_charge(request: &ChargeRequest) -> Result<MidtransCharge, GatewayError> {
    let method = request.method.as_str().parse::<MidtransMethod>().map_err(map_gateway_error)?;
    let items = request
        .items
        .iter()
        .map(|i| ItemDetails { id: i.id.clone(), price: i.price.value(), quantity: i.quantity, name: i.name.clone() })
        .collect();
    Ok(MidtransCharge {
        order_id: request.external_id.clone(),
        gross_amount: request.amount.value(),
        method,
        customer: CustomerDetails {
            first_name: request.customer.name.clone(),
            email: request.customer.email.clone(),
            phone: request.customer.phone.clone(),
        },
        items,
    })
}

impl PaymentGateway for MidtransGateway {
    async fn create_charge(&self, request: &ChargeRequest) -> Result<ChargeResponse, GatewayError> {
        let charge = midtrans_charge(request)?;
        let (response, raw) = self.api.charge(&charge).await.map_err(map_gateway_error)?;
        let transaction_id = response.transaction_id.clone().ok_or_else(|| {
            GatewayError::InvalidResponse(format!("Charge for {} has no transaction id", request.external_id))
        })?;
        Ok(ChargeResponse {
            transaction_id,
            transaction_status: response.transaction_status.clone().unwrap_or_else(|| "pending".to_string()),
            va_number: response.va_number(),
            qr_code_url: response.qr_code_url(),
            expiry_time: response.expiry(),
            raw,
        })
    }

    async fn get_transaction_status(&self, external_id: &str) -> Result<TransactionStatus, GatewayError> {
        let (response, raw) = self.api.transaction_status(external_id).await.map_err(map_gateway_error)?;
        let transaction_status = response
            .transaction_status
            .ok_or_else(|| GatewayError::InvalidResponse(format!("No transaction status for {external_id}")))?;
        Ok(TransactionStatus {
            transaction_status,
            transaction_id: response.transaction_id,
            fraud_status: response.fraud_status,
            raw,
        })
    }

    async fn create_refund(&self, request: &GatewayRefundRequest) -> Result<GatewayRefundResponse, GatewayError> {
        let refund = MidtransRefund {
            refund_key: request.refund_key.clone(),
            amount: request.amount.value(),
            reason: request.reason.clone(),
        };
        let (response, raw) = self.api.refund(&request.external_id, &refund).await.map_err(map_gateway_error)?;
        let gateway_refund_id = response.refund_id().ok_or_else(|| {
            GatewayError::InvalidResponse(format!("Refund {} was accepted without an id", request.refund_key))
        })?;
        Ok(GatewayRefundResponse {
            gateway_refund_id,
            status: response.transaction_status.unwrap_or_else(|| "refund".to_string()),
            raw,
        })
    }

    fn verify_webhook_signature(&self, notification: &WebhookNotification) -> bool {
        let valid = self.api.verify_signature(
            &notification.order_id,
            &notification.status_code,
            &notification.gross_amount,
            &notification.signature_key,
        );
        if !valid {
            debug!("💳️ Signature mismatch on the notification for {}", notification.order_id);
        }
        valid
    }
}
