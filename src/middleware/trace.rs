//! Per-request tracing span.

use std::sync::Arc;
use std::time::Instant;

use tracing::{Instrument, info, info_span, warn};

use crate::context::Context;
use crate::layer::Layer;
use crate::service::{BoxFuture, BoxedService, Service, ServiceResult};

/// Opens an `http.request` span with the method and path, and logs the
/// status and latency (or the error) when the inner chain finishes.
///
/// Put it outermost so the span covers every other layer.
#[derive(Clone, Copy, Debug, Default)]
pub struct TraceLayer;

impl Layer for TraceLayer {
    fn layer(&self, inner: BoxedService) -> BoxedService {
        Arc::new(Traced { inner })
    }
}

struct Traced {
    inner: BoxedService,
}

impl Service for Traced {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, ServiceResult> {
        let span = match ctx.request() {
            Some(req) => info_span!("http.request", method = %req.method(), path = req.path()),
            None => info_span!("http.request", method = "-", path = "-"),
        };
        Box::pin(
            async move {
                let started = Instant::now();
                let result = self.inner.call(ctx).await;
                let latency_us = started.elapsed().as_micros() as u64;
                match &result {
                    Ok(res) => info!(status = res.status_code().as_u16(), latency_us, "request completed"),
                    Err(err) => warn!(error = %err, latency_us, "request failed"),
                }
                result
            }
            .instrument(span),
        )
    }
}
