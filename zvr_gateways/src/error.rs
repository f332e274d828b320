use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayApiError {
    #[error("Could not initialize client: {0}")]
    Initialization(String),
    #[error("Could not reach the service: {0}")]
    RequestError(String),
    #[error("The service did not answer in time: {0}")]
    Timeout(String),
    #[error("Could not deserialize JSON: {0}")]
    JsonError(String),
    #[error("Query failed. Error {status}. {message}")]
    QueryError { status: u16, message: String },
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl GatewayApiError {
    /// Whether repeating the same request later may succeed. Throttling and server-side failures are retriable;
    /// anything else the service rejected is not.
    pub fn is_transient(&self) -> bool {
        match self {
            GatewayApiError::RequestError(_) | GatewayApiError::Timeout(_) | GatewayApiError::JsonError(_) => true,
            GatewayApiError::QueryError { status, .. } => *status >= 500 || *status == 429 || *status == 408,
            GatewayApiError::Initialization(_) | GatewayApiError::InvalidRequest(_) => false,
        }
    }

    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        GatewayApiError::QueryError { status, message: message.into() }
    }
}
