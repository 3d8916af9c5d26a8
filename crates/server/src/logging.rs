//! Per-request access logging and counters (spec.md §1: "request-logging
//! middleware" lives outside the gateway's core). Grounded on the
//! teacher's `tracing.rs` `Layer`/`Service` shape, stripped of distributed
//! tracing — this only logs and counts, at the ambient `log::debug!`
//! level SPEC_FULL §12 carries over from the teacher's idiom.

use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Instant,
};

use axum::{body::Body, extract::MatchedPath};
use http::{Request, Response};
use tower::Layer;

use crate::metrics::Metrics;

/// Layer wrapping every request with access logging and metric counting.
#[derive(Clone)]
pub struct RequestLoggingLayer {
    metrics: Arc<Metrics>,
}

impl RequestLoggingLayer {
    /// Build a layer that records into `metrics`.
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self { metrics }
    }
}

impl<Service> Layer<Service> for RequestLoggingLayer
where
    Service: Send + Clone,
{
    type Service = RequestLoggingService<Service>;

    fn layer(&self, next: Service) -> Self::Service {
        RequestLoggingService { next, metrics: self.metrics.clone() }
    }
}

/// The wrapped service.
#[derive(Clone)]
pub struct RequestLoggingService<Service> {
    next: Service,
    metrics: Arc<Metrics>,
}

impl<Service, ReqBody> tower::Service<Request<ReqBody>> for RequestLoggingService<Service>
where
    Service: tower::Service<Request<ReqBody>, Response = Response<Body>> + Send + Clone + 'static,
    Service::Future: Send,
    ReqBody: Send + 'static,
{
    type Response = Response<Body>;
    type Error = Service::Error;
    type Future = Pin<Box<dyn Future<Output = std::result::Result<Response<Body>, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        self.next.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let path = req.extensions().get::<MatchedPath>().map(|matched| matched.as_str().to_owned()).unwrap_or_else(|| req.uri().path().to_owned());
        let method = req.method().to_string();
        let started = Instant::now();
        let mut next = self.next.clone();
        let metrics = self.metrics.clone();

        Box::pin(async move {
            let response = next.call(req).await?;
            let status = response.status();
            let elapsed = started.elapsed();

            metrics.record(status.is_client_error() || status.is_server_error());
            log::debug!("{method} {path} {} {:?}", status.as_u16(), elapsed);

            Ok(response)
        })
    }
}
