//! Origin allow-list in front of the router.

use axum::http::{header::ORIGIN, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use std::collections::HashSet;
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower_service::Service;
use tracing::warn;

/// Rejects requests whose `Origin` header is not allowed with 403. Requests
/// without an `Origin` header (curl, scripts) pass through.
#[derive(Clone)]
pub struct OriginCheckService<S> {
    inner: S,
    allowed_origins: Arc<HashSet<String>>,
}

impl<S> OriginCheckService<S> {
    pub fn new(inner: S, allowed_origins: impl IntoIterator<Item = String>) -> Self {
        Self {
            inner,
            allowed_origins: Arc::new(allowed_origins.into_iter().collect()),
        }
    }
}

impl<B, S> Service<Request<B>> for OriginCheckService<S>
where
    B: Send + 'static,
    S: Service<Request<B>, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let allowed_origins = self.allowed_origins.clone();
        let mut inner = self.inner.clone();
        Box::pin(async move {
            if let Some(origin) = req.headers().get(ORIGIN).and_then(|v| v.to_str().ok()) {
                if !allowed_origins.contains(origin) {
                    warn!(origin = %origin, "Rejected request from disallowed origin");
                    return Ok((StatusCode::FORBIDDEN, "Forbidden").into_response());
                }
            }
            inner.call(req).await
        })
    }
}
