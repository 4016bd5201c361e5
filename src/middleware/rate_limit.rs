use crate::error::ApiError;
use actix_web::{
    body::{BoxBody, MessageBody},
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, ResponseError,
};
use futures_util::future::LocalBoxFuture;
use governor::{clock::DefaultClock, state::keyed::DashMapStateStore, Quota, RateLimiter};
use std::future::{ready, Ready};
use std::net::{IpAddr, Ipv4Addr};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Idle client entries are dropped once per this many checked requests.
const PRUNE_EVERY: u64 = 1024;

type IpLimiter = RateLimiter<IpAddr, DashMapStateStore<IpAddr>, DefaultClock>;

/// Per-client-IP request budget for the credential endpoints.
#[derive(Clone)]
pub struct RateLimitMiddleware {
    limiter: Arc<IpLimiter>,
    checked: Arc<AtomicU64>,
}

impl RateLimitMiddleware {
    pub fn new(requests_per_minute: u32) -> Self {
        let per_minute = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);
        RateLimitMiddleware {
            limiter: Arc::new(RateLimiter::dashmap(Quota::per_minute(per_minute))),
            checked: Arc::new(AtomicU64::new(0)),
        }
    }
}

/// Forget clients whose budget has fully refilled.
fn prune(limiter: &IpLimiter) {
    limiter.retain_recent();
    limiter.shrink_to_fit();
    debug!(clients = limiter.len(), "Pruned rate limiter state");
}

impl<S, B> Transform<S, ServiceRequest> for RateLimitMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type InitError = ();
    type Transform = RateLimitMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitMiddlewareService {
            service,
            limiter: self.limiter.clone(),
            checked: self.checked.clone(),
        }))
    }
}

pub struct RateLimitMiddlewareService<S> {
    service: S,
    limiter: Arc<IpLimiter>,
    checked: Arc<AtomicU64>,
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        // Test requests and unix sockets have no peer; they share one bucket
        let ip = req
            .peer_addr()
            .map(|addr| addr.ip())
            .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));

        if self.checked.fetch_add(1, Ordering::Relaxed) % PRUNE_EVERY == PRUNE_EVERY - 1 {
            prune(&self.limiter);
        }

        if self.limiter.check_key(&ip).is_err() {
            warn!(ip = %ip, path = %req.path(), "Rate limit exceeded");
            let (req, _pl) = req.into_parts();
            let res = ApiError::TooManyRequests.error_response();
            return Box::pin(async move { Ok(ServiceResponse::new(req, res)) });
        }

        let fut = self.service.call(req);
        Box::pin(async move {
            let res = fut.await?;
            Ok(res.map_into_boxed_body())
        })
    }
}
