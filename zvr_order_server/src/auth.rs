//! Request-boundary identification of the caller.
//!
//! Sessions are managed upstream of this server. By the time a request arrives here it carries at most:
//! * `Authorization: Bearer <key>`: the admin API key. The optional `X-Admin-Email` header names the operator, and is
//!   what the history tables record as the actor.
//! * `X-Customer-Id: <id>`: the signed-in customer, as vouched for by the session layer.
//!
//! Both are parsed exactly once into a [`Principal`], which handlers receive as an extractor. Nothing past this module
//! looks at those headers.
use std::future::{ready, Ready};

use actix_web::{dev::Payload, http::header::HeaderMap, web, FromRequest, HttpMessage, HttpRequest};
use log::*;
use zvr_common::Secret;
use zvr_order_engine::db_types::{Actor, Order};

use crate::errors::{AuthError, ServerError};

pub const ADMIN_EMAIL_HEADER: &str = "X-Admin-Email";
pub const CUSTOMER_ID_HEADER: &str = "X-Customer-Id";
const DEFAULT_ADMIN_NAME: &str = "api";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Customer,
    Admin,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    Anonymous,
    Customer { id: i64 },
    Admin { email: String },
}

impl Principal {
    pub fn has_role(&self, role: Role) -> bool {
        matches!((self, role), (Principal::Admin { .. }, _) | (Principal::Customer { .. }, Role::Customer))
    }

    /// The actor recorded against changes this principal makes.
    pub fn actor(&self) -> Actor {
        match self {
            Principal::Anonymous => Actor::System,
            Principal::Customer { id } => Actor::Customer(*id),
            Principal::Admin { email } => Actor::Admin(email.clone()),
        }
    }

    pub fn user_id(&self) -> Option<i64> {
        match self {
            Principal::Customer { id } => Some(*id),
            _ => None,
        }
    }

    /// Admins see every order in full; customers see their own.
    pub fn can_view(&self, order: &Order) -> bool {
        match self {
            Principal::Admin { .. } => true,
            Principal::Customer { id } => order.user_id == Some(*id),
            Principal::Anonymous => false,
        }
    }
}

/// The admin API key, as app data.
#[derive(Clone, Debug)]
pub struct AdminKey(pub Secret<String>);

impl AdminKey {
    pub fn new<S: Into<String>>(key: S) -> Self {
        Self(Secret::new(key.into()))
    }

    fn matches(&self, candidate: &str) -> bool {
        let expected = self.0.reveal().as_bytes();
        let candidate = candidate.as_bytes();
        // An unset key never matches
        !expected.is_empty()
            && expected.len() == candidate.len()
            && expected.iter().zip(candidate).fold(0u8, |acc, (a, b)| acc | (a ^ b)) == 0
    }
}

/// Works out who is calling from the request headers.
pub fn parse_principal(headers: &HeaderMap, admin_key: Option<&AdminKey>) -> Result<Principal, AuthError> {
    if let Some(value) = headers.get("Authorization") {
        let value = value.to_str().map_err(|e| AuthError::PoorlyFormattedHeader(e.to_string()))?;
        let token = value
            .strip_prefix("Bearer ")
            .map(str::trim)
            .ok_or_else(|| AuthError::PoorlyFormattedHeader("Expected a Bearer token".to_string()))?;
        let Some(admin_key) = admin_key else {
            warn!("💻️ No admin key is configured. Rejecting bearer credentials.");
            return Err(AuthError::InvalidCredentials);
        };
        if !admin_key.matches(token) {
            debug!("💻️ Bearer token does not match the admin key");
            return Err(AuthError::InvalidCredentials);
        }
        let email = headers
            .get(ADMIN_EMAIL_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_ADMIN_NAME);
        return Ok(Principal::Admin { email: email.to_string() });
    }
    if let Some(value) = headers.get(CUSTOMER_ID_HEADER) {
        let id = value
            .to_str()
            .ok()
            .and_then(|s| s.trim().parse::<i64>().ok())
            .filter(|id| *id > 0)
            .ok_or_else(|| AuthError::PoorlyFormattedHeader(format!("{CUSTOMER_ID_HEADER} must be a positive id")))?;
        return Ok(Principal::Customer { id });
    }
    Ok(Principal::Anonymous)
}

/// The principal stored by the ACL middleware, or one parsed from the request.
pub fn principal_from_request(req: &HttpRequest) -> Result<Principal, AuthError> {
    if let Some(principal) = req.extensions().get::<Principal>() {
        return Ok(principal.clone());
    }
    let key = req.app_data::<web::Data<AdminKey>>().map(|k| k.get_ref());
    parse_principal(req.headers(), key)
}

impl FromRequest for Principal {
    type Error = ServerError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(principal_from_request(req).map_err(ServerError::from))
    }
}
