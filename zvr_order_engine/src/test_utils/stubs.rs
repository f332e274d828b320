use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
};

use chrono::{DateTime, Utc};

use crate::{
    collaborators::{
        ChargeRequest,
        ChargeResponse,
        GatewayError,
        GatewayRefundRequest,
        GatewayRefundResponse,
        Mailer,
        PaymentGateway,
        RateRequest,
        ShippingGateway,
        TemplateVariables,
        TrackingEvent,
        TransactionStatus,
        Waybill,
        WaybillRequest,
        WebhookNotification,
    },
    db_types::Rupiah,
};

const STUB_SERVER_KEY: &str = "stub-server-key";

#[derive(Debug, Default)]
struct GatewayState {
    charges: Vec<ChargeRequest>,
    charge_errors: VecDeque<GatewayError>,
    expiry_time: Option<DateTime<Utc>>,
    statuses: HashMap<String, Result<TransactionStatus, GatewayError>>,
    refunds: Vec<GatewayRefundRequest>,
    refund_results: VecDeque<Result<(), GatewayError>>,
}

/// An in-memory payment gateway. Charges succeed and refunds complete unless a failure has been queued.
#[derive(Debug, Clone, Default)]
pub struct StubPaymentGateway {
    state: Arc<Mutex<GatewayState>>,
}

impl StubPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// The gateway expiry time reported for new charges.
    pub fn set_expiry_time(&self, expiry_time: DateTime<Utc>) {
        self.state.lock().unwrap().expiry_time = Some(expiry_time);
    }

    pub fn fail_next_charge(&self, error: GatewayError) {
        self.state.lock().unwrap().charge_errors.push_back(error);
    }

    /// What `get_transaction_status` reports for the payment from now on.
    pub fn set_status(&self, external_id: &str, transaction_status: &str, transaction_id: Option<&str>) {
        let status = TransactionStatus {
            transaction_status: transaction_status.to_string(),
            transaction_id: transaction_id.map(String::from),
            fraud_status: None,
            raw: format!(r#"{{"order_id":"{external_id}","transaction_status":"{transaction_status}"}}"#),
        };
        self.state.lock().unwrap().statuses.insert(external_id.to_string(), Ok(status));
    }

    pub fn fail_status(&self, external_id: &str, error: GatewayError) {
        self.state.lock().unwrap().statuses.insert(external_id.to_string(), Err(error));
    }

    pub fn fail_next_refund(&self, error: GatewayError) {
        self.state.lock().unwrap().refund_results.push_back(Err(error));
    }

    pub fn charges(&self) -> Vec<ChargeRequest> {
        self.state.lock().unwrap().charges.clone()
    }

    pub fn refund_calls(&self) -> Vec<GatewayRefundRequest> {
        self.state.lock().unwrap().refunds.clone()
    }

    pub fn signature_for(notification: &WebhookNotification) -> String {
        format!(
            "{}:{}:{}:{STUB_SERVER_KEY}",
            notification.order_id, notification.status_code, notification.gross_amount
        )
    }

    /// A correctly signed notification for the payment.
    pub fn webhook(external_id: &str, transaction_status: &str, transaction_id: &str, amount: Rupiah) -> WebhookNotification {
        let mut notification = WebhookNotification {
            order_id: external_id.to_string(),
            transaction_status: transaction_status.to_string(),
            transaction_id: Some(transaction_id.to_string()),
            fraud_status: None,
            status_code: "200".to_string(),
            gross_amount: format!("{}.00", amount.value()),
            signature_key: String::new(),
            payment_type: Some("bank_transfer".to_string()),
        };
        notification.signature_key = Self::signature_for(&notification);
        notification
    }
}

impl PaymentGateway for StubPaymentGateway {
    async fn create_charge(&self, request: &ChargeRequest) -> Result<ChargeResponse, GatewayError> {
        let mut state = self.state.lock().unwrap();
        if let Some(e) = state.charge_errors.pop_front() {
            return Err(e);
        }
        state.charges.push(request.clone());
        Ok(ChargeResponse {
            transaction_id: format!("tx-{}", request.external_id),
            transaction_status: "pending".to_string(),
            va_number: request.method.is_virtual_account().then(|| "8808123456789012".to_string()),
            qr_code_url: (!request.method.is_virtual_account()).then(|| "https://qr.example/abc".to_string()),
            expiry_time: state.expiry_time,
            raw: format!(r#"{{"order_id":"{}","transaction_status":"pending"}}"#, request.external_id),
        })
    }

    async fn get_transaction_status(&self, external_id: &str) -> Result<TransactionStatus, GatewayError> {
        let state = self.state.lock().unwrap();
        match state.statuses.get(external_id) {
            Some(result) => result.clone(),
            None => Err(GatewayError::Permanent { status: 404, message: format!("{external_id} not found") }),
        }
    }

    async fn create_refund(&self, request: &GatewayRefundRequest) -> Result<GatewayRefundResponse, GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.refunds.push(request.clone());
        state.refund_results.pop_front().unwrap_or(Ok(()))?;
        Ok(GatewayRefundResponse {
            gateway_refund_id: format!("gr-{}", request.refund_key),
            status: "refund".to_string(),
            raw: format!(r#"{{"refund_key":"{}","status_code":"200"}}"#, request.refund_key),
        })
    }

    fn verify_webhook_signature(&self, notification: &WebhookNotification) -> bool {
        notification.signature_key == Self::signature_for(notification)
    }
}

#[derive(Debug, Default)]
struct ShippingState {
    waybills: Vec<WaybillRequest>,
    errors: VecDeque<GatewayError>,
}

/// Issues tracking numbers `STUB0001`, `STUB0002`, ...
#[derive(Debug, Clone, Default)]
pub struct StubShippingGateway {
    state: Arc<Mutex<ShippingState>>,
}

impl StubShippingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, error: GatewayError) {
        self.state.lock().unwrap().errors.push_back(error);
    }

    pub fn waybill_requests(&self) -> Vec<WaybillRequest> {
        self.state.lock().unwrap().waybills.clone()
    }
}

impl ShippingGateway for StubShippingGateway {
    async fn create_waybill(&self, request: &WaybillRequest) -> Result<Waybill, GatewayError> {
        let mut state = self.state.lock().unwrap();
        if let Some(e) = state.errors.pop_front() {
            return Err(e);
        }
        state.waybills.push(request.clone());
        Ok(Waybill { tracking_number: format!("STUB{:04}", state.waybills.len()), etd: Some("2-3".to_string()) })
    }

    async fn fetch_tracking(&self, _courier: &str, _tracking_number: &str) -> Result<Vec<TrackingEvent>, GatewayError> {
        Ok(Vec::new())
    }

    async fn quote_rate(&self, _request: &RateRequest) -> Result<Rupiah, GatewayError> {
        Err(GatewayError::Transient("rates unavailable".to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMail {
    pub template_key: String,
    pub recipient: String,
    pub variables: TemplateVariables,
}

#[derive(Debug, Default)]
struct MailerState {
    sent: Vec<SentMail>,
    fail: bool,
}

/// Records every message it is asked to send.
#[derive(Debug, Clone, Default)]
pub struct RecordingMailer {
    state: Arc<Mutex<MailerState>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every send fails with a transient error while set.
    pub fn set_failing(&self, fail: bool) {
        self.state.lock().unwrap().fail = fail;
    }

    pub fn sent(&self) -> Vec<SentMail> {
        self.state.lock().unwrap().sent.clone()
    }
}

impl Mailer for RecordingMailer {
    async fn send(&self, template_key: &str, recipient: &str, variables: &TemplateVariables) -> Result<(), GatewayError> {
        let mut state = self.state.lock().unwrap();
        if state.fail {
            return Err(GatewayError::Transient("mail server unavailable".to_string()));
        }
        state.sent.push(SentMail {
            template_key: template_key.to_string(),
            recipient: recipient.to_string(),
            variables: variables.clone(),
        });
        Ok(())
    }
}
