//! Access control middleware for the order server.
//! This middleware can be placed on any route or service.
//!
//! It identifies the caller from the request headers (see [`crate::auth`]) and checks the resulting principal against
//! the roles required by the route. If the caller has every required role, the principal is stored in the request
//! extensions and the request continues. Otherwise a 401 (no or bad credentials) or 403 (wrong role) response is
//! returned.

use std::{pin::Pin, rc::Rc};

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error,
    HttpMessage,
};
use futures::{
    future::{ok, Ready},
    Future,
};
use log::*;

use crate::{
    auth::{principal_from_request, Principal, Role},
    errors::{AuthError, ServerError},
};

pub struct AclMiddlewareFactory {
    required_roles: Vec<Role>,
}

impl AclMiddlewareFactory {
    pub fn new(required_roles: &[Role]) -> Self {
        AclMiddlewareFactory { required_roles: required_roles.to_vec() }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AclMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = AclMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AclMiddlewareService { required_roles: self.required_roles.clone(), service: Rc::new(service) })
    }
}

pub struct AclMiddlewareService<S> {
    required_roles: Vec<Role>,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for AclMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let required_roles = self.required_roles.clone();
        Box::pin(async move {
            let principal = principal_from_request(req.request()).map_err(ServerError::from)?;
            if principal == Principal::Anonymous {
                debug!("💻️ Unauthenticated request to {}", req.path());
                return Err(ServerError::from(AuthError::MissingCredentials).into());
            }
            if !required_roles.iter().all(|role| principal.has_role(*role)) {
                debug!("💻️ {principal:?} may not access {}", req.path());
                let needed = required_roles.iter().map(|r| format!("{r:?}")).collect::<Vec<_>>().join(", ");
                return Err(ServerError::from(AuthError::InsufficientPermissions(format!("Requires {needed}"))).into());
            }
            req.extensions_mut().insert(principal);
            service.call(req).await
        })
    }
}
