//! # External collaborators
//!
//! The engine talks to three external services through narrow traits. Concrete HTTP clients live outside the engine;
//! tests use the stubs in `test_utils`.
//!
//! * [`PaymentGateway`] creates charges and refunds, reports transaction status and verifies webhook signatures.
//! * [`ShippingGateway`] issues waybills, quotes rates and fetches tracking events.
//! * [`Mailer`] sends transactional email from a template key.
//!
//! Every call the engine makes through these traits is wrapped in a deadline (see [`with_deadline`]); a missed deadline
//! is reported as [`GatewayError::Timeout`] and treated as retriable.
use std::{future::Future, time::Duration};

use thiserror::Error;

mod mailer;
mod payment_gateway;
mod rates;
mod shipping_gateway;

pub use mailer::{Mailer, TemplateVariables, ORDER_PAID_TEMPLATE};
pub use payment_gateway::{
    ChargeItem,
    ChargeRequest,
    ChargeResponse,
    GatewayRefundRequest,
    GatewayRefundResponse,
    PaymentGateway,
    PaymentOutcome,
    TransactionStatus,
    WebhookNotification,
};
pub use rates::StaticRateFallback;
pub use shipping_gateway::{RateRequest, ShippingGateway, TrackingEvent, Waybill, WaybillRequest};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("The call did not complete within {0:?}")]
    Timeout(Duration),
    #[error("Temporary failure: {0}")]
    Transient(String),
    #[error("Request rejected with status {status}: {message}")]
    Permanent { status: u16, message: String },
    #[error("Could not interpret the response: {0}")]
    InvalidResponse(String),
}

impl GatewayError {
    /// Whether the same call may succeed if repeated later. An unreadable response is retriable, since the remote side
    /// may have acted on the request.
    pub fn is_transient(&self) -> bool {
        !matches!(self, GatewayError::Permanent { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, GatewayError::Timeout(_))
    }
}

/// Runs `fut`, giving up with [`GatewayError::Timeout`] once `deadline` has elapsed.
pub async fn with_deadline<T, F>(deadline: Duration, fut: F) -> Result<T, GatewayError>
where F: Future<Output = Result<T, GatewayError>> {
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(GatewayError::Timeout(deadline)),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn deadline_expires() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, GatewayError>(1)
        };
        let result = with_deadline(Duration::from_millis(10), slow).await;
        assert_eq!(result, Err(GatewayError::Timeout(Duration::from_millis(10))));
        let fast = async { Ok::<_, GatewayError>(2) };
        assert_eq!(with_deadline(Duration::from_millis(100), fast).await, Ok(2));
    }

    #[test]
    fn transience() {
        assert!(GatewayError::Transient("503".into()).is_transient());
        assert!(GatewayError::InvalidResponse("eof".into()).is_transient());
        assert!(!GatewayError::Permanent { status: 400, message: "no".into() }.is_transient());
    }
}
