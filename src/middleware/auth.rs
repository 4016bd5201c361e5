use crate::error::ApiError;
use crate::models::user::AuthenticatedUser;
use crate::utils::jwt::{TokenError, TokenService};
use actix_web::{
    body::{BoxBody, EitherBody},
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::AUTHORIZATION,
    Error, HttpMessage, ResponseError,
};
use futures_util::future::LocalBoxFuture;
use std::future::{ready, Ready};
use std::sync::Arc;
use tracing::debug;

pub const MISSING_TOKEN_MESSAGE: &str = "Not logged in or token missing";
pub const INVALID_TOKEN_MESSAGE: &str = "Token is invalid or expired, please log in again";

/// Rejects requests without a valid bearer token; otherwise attaches an
/// `AuthenticatedUser` to the request extensions.
#[derive(Clone)]
pub struct AuthMiddleware {
    tokens: Arc<TokenService>,
}

impl AuthMiddleware {
    pub fn new(tokens: Arc<TokenService>) -> Self {
        AuthMiddleware { tokens }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B, BoxBody>>;
    type Error = Error;
    type InitError = ();
    type Transform = AuthMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthMiddlewareService {
            service,
            tokens: self.tokens.clone(),
        }))
    }
}

pub struct AuthMiddlewareService<S> {
    service: S,
    tokens: Arc<TokenService>,
}

/// Token from an `Authorization: Bearer <token>` header, if that is what was sent.
fn bearer_token(req: &ServiceRequest) -> Option<String> {
    let header_str = req.headers().get(AUTHORIZATION)?.to_str().ok()?;
    let token = header_str.strip_prefix("Bearer ")?;
    if token.is_empty() {
        return None;
    }
    Some(token.to_string())
}

fn reject<B>(req: ServiceRequest, err: ApiError) -> ServiceResponse<EitherBody<B, BoxBody>> {
    let (req, _pl) = req.into_parts();
    ServiceResponse::new(req, err.error_response()).map_into_right_body()
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B, BoxBody>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let token = match bearer_token(&req) {
            Some(t) => t,
            None => {
                let res = reject(req, ApiError::Unauthorized(MISSING_TOKEN_MESSAGE.to_string()));
                return Box::pin(async move { Ok(res) });
            }
        };

        let claims = match self.tokens.verify(&token) {
            Ok(claims) => claims,
            Err(e) => {
                // Expired and invalid look the same from outside
                match e {
                    TokenError::Expired => debug!(path = %req.path(), "Rejected expired token"),
                    _ => debug!(path = %req.path(), "Rejected invalid token"),
                }
                let res = reject(req, ApiError::Unauthorized(INVALID_TOKEN_MESSAGE.to_string()));
                return Box::pin(async move { Ok(res) });
            }
        };

        req.extensions_mut().insert(AuthenticatedUser {
            user_id: claims.sub,
        });

        let fut = self.service.call(req);
        Box::pin(async move {
            let res = fut.await?;
            Ok(res.map_into_left_body())
        })
    }
}
