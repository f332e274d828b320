//! Adapters that bind the HTTP clients in `zvr_gateways` to the engine's collaborator traits, and the server's event
//! hooks.
mod events;
mod mailer;
mod midtrans;
mod shipping;

pub use events::{create_event_handlers, EVENT_BUFFER_SIZE};
pub use mailer::MailerClient;
pub use midtrans::MidtransGateway;
pub use shipping::ShippingClient;
use zvr_gateways::GatewayApiError;
use zvr_order_engine::collaborators::GatewayError;

/// Client errors, classified the way the engine decides whether to retry.
pub fn map_gateway_error(e: GatewayApiError) -> GatewayError {
    let transient = e.is_transient();
    match e {
        GatewayApiError::Timeout(msg) | GatewayApiError::RequestError(msg) => GatewayError::Transient(msg),
        GatewayApiError::JsonError(msg) => GatewayError::InvalidResponse(msg),
        GatewayApiError::QueryError { status, message } if transient => {
            GatewayError::Transient(format!("{status}: {message}"))
        },
        GatewayApiError::QueryError { status, message } => GatewayError::Permanent { status, message },
        GatewayApiError::InvalidRequest(message) => GatewayError::Permanent { status: 400, message },
        GatewayApiError::Initialization(message) => GatewayError::Permanent { status: 0, message },
    }
}
