use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use log::error;
use serde_json::{json, Value};
use thiserror::Error;
use zvr_order_engine::{EngineError, ErrorKind};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("Could not read request path: {0}")]
    InvalidRequestPath(String),
    #[error("The Idempotency-Key header is required")]
    MissingIdempotencyKey,
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("Authentication Error. {0}")]
    AuthenticationError(#[from] AuthError),
    #[error("{0}")]
    EngineError(#[from] EngineError),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
}

impl ServerError {
    /// The `error` field of the response envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequestBody(_) | Self::InvalidRequestPath(_) | Self::MissingIdempotencyKey => {
                "validation_error"
            },
            Self::AuthenticationError(AuthError::InsufficientPermissions(_)) => "forbidden",
            Self::AuthenticationError(_) => "unauthorized",
            Self::EngineError(e) => match e.kind() {
                ErrorKind::Validation => "validation_error",
                ErrorKind::NotFound => "not_found",
                ErrorKind::StateConflict => "state_conflict",
                ErrorKind::IdempotencyConflict => "idempotency_conflict",
                ErrorKind::GatewayTransient if e.is_gateway_timeout() => "gateway_timeout",
                ErrorKind::GatewayTransient | ErrorKind::GatewayPermanent => "gateway_error",
                ErrorKind::Internal => "internal_error",
            },
            Self::InitializeError(_) | Self::IOError(_) | Self::ConfigurationError(_) | Self::Unspecified(_) => {
                "internal_error"
            },
        }
    }

    /// Structured context for the caller, where the error carries any.
    pub fn details(&self) -> Option<Value> {
        let Self::EngineError(e) = self else {
            return None;
        };
        match e {
            EngineError::InsufficientStock { key, requested, available } => Some(json!({
                "product_id": key.product_id,
                "variant_id": key.variant_id,
                "requested": requested,
                "available": available,
            })),
            EngineError::InvalidTransition(t) => Some(json!({ "from": t.from, "to": t.to })),
            EngineError::RefundExceedsBalance { requested, available } => {
                Some(json!({ "requested": requested, "available": available }))
            },
            EngineError::OrderNotPayable { code, status } | EngineError::OrderNotRefundable { code, status } => {
                Some(json!({ "order_code": code, "status": status }))
            },
            _ => None,
        }
    }
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::InvalidRequestPath(_) => StatusCode::BAD_REQUEST,
            Self::MissingIdempotencyKey => StatusCode::BAD_REQUEST,
            Self::AuthenticationError(e) => match e {
                AuthError::MissingCredentials => StatusCode::UNAUTHORIZED,
                AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
                AuthError::PoorlyFormattedHeader(_) => StatusCode::UNAUTHORIZED,
                AuthError::InsufficientPermissions(_) => StatusCode::FORBIDDEN,
            },
            Self::EngineError(e) => match e.kind() {
                ErrorKind::Validation => StatusCode::BAD_REQUEST,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::StateConflict => StatusCode::CONFLICT,
                ErrorKind::IdempotencyConflict => StatusCode::CONFLICT,
                ErrorKind::GatewayTransient if e.is_gateway_timeout() => StatusCode::GATEWAY_TIMEOUT,
                ErrorKind::GatewayTransient => StatusCode::BAD_GATEWAY,
                ErrorKind::GatewayPermanent => StatusCode::BAD_GATEWAY,
                ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            error!("💻️ {self}");
        }
        let mut body = json!({ "error": self.kind(), "message": self.to_string() });
        if let Some(details) = self.details() {
            body["details"] = details;
        }
        HttpResponse::build(status).insert_header(ContentType::json()).body(body.to_string())
    }
}

#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("This route requires credentials.")]
    MissingCredentials,
    #[error("The supplied credentials are not valid.")]
    InvalidCredentials,
    #[error("The authorization header is not in the correct format. {0}")]
    PoorlyFormattedHeader(String),
    #[error("Insufficient Permissions. {0}")]
    InsufficientPermissions(String),
}
