//! Error recovery.
//!
//! [`ExceptionLayer`] is the only place a failed chain is turned back into a
//! response. Without one, an error travels up to the [`View`](crate::View)
//! and becomes a bare 500.

use std::sync::Arc;

use http::StatusCode;
use serde_json::Map;
use tracing::{debug, error};

use crate::context::{Context, EXCEPTION_KEY};
use crate::envelope::{self, INTERNAL_ERROR_MESSAGE};
use crate::error::{Code, Error};
use crate::layer::Layer;
use crate::service::{BoxFuture, BoxedService, Service, ServiceResult};

/// Catches the inner chain's error, stores it in the context and answers
/// with the handler service.
///
/// ```rust
/// use plait::middleware::ExceptionLayer;
/// use plait::{Layer, Response, sync_service};
///
/// // default handler, default key
/// let layer = ExceptionLayer::new();
///
/// // custom handler reading the error from a custom key
/// let layer = ExceptionLayer::new()
///     .key("failure")
///     .handler(sync_service(|ctx| {
///         let err = ctx.get::<plait::Error>("failure")?;
///         Ok(Response::text(err.to_string()))
///     }));
/// ```
#[derive(Clone)]
pub struct ExceptionLayer {
    handler: Option<BoxedService>,
    key: Arc<str>,
}

impl ExceptionLayer {
    /// Stores the error under [`EXCEPTION_KEY`] and answers with [`ExceptionHandler`].
    pub fn new() -> Self {
        Self { handler: None, key: Arc::from(EXCEPTION_KEY) }
    }

    /// Replaces the handler. Compose layers into it with
    /// [`into_service`](crate::into_service) first if needed.
    pub fn handler(mut self, handler: BoxedService) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Changes the key the error is stored under. The default handler
    /// follows the key; a custom handler must read it itself.
    pub fn key(mut self, key: &str) -> Self {
        self.key = Arc::from(key);
        self
    }
}

impl Default for ExceptionLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl Layer for ExceptionLayer {
    fn layer(&self, inner: BoxedService) -> BoxedService {
        let handler = self.handler.clone()
            .unwrap_or_else(|| Arc::new(ExceptionHandler::new(&self.key)));
        Arc::new(Catch { handler, key: self.key.clone(), inner })
    }
}

struct Catch {
    handler: BoxedService,
    key: Arc<str>,
    inner: BoxedService,
}

impl Service for Catch {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, ServiceResult> {
        Box::pin(async move {
            let err = match self.inner.call(ctx).await {
                Ok(response) => return Ok(response),
                Err(err) => err,
            };
            match err.status() {
                None => error!(error = %err, "request failed"),
                Some(s) if s.is_server_error() => error!(error = %err, status = s.as_u16(), "request failed"),
                Some(s) => debug!(error = %err, status = s.as_u16(), "request rejected"),
            }
            // Without a data facet there is nowhere to put it; keep the original.
            let Ok(data) = ctx.data_mut() else {
                error!(error = %err, "no context to store the caught error in");
                return Err(err);
            };
            data.insert(&*self.key, err);
            self.handler.call(ctx).await
        })
    }
}

// ── Default handler ───────────────────────────────────────────────────────────

/// Renders the stored error as an envelope.
///
/// - status: the failure's explicit status, else `500`
/// - code: the failure's explicit code, else the status number
/// - details: the failure's explicit details, else `{}`
/// - message: the error text, except for status `500` where it is always
///   `"internal server error"`
pub struct ExceptionHandler {
    key: Arc<str>,
}

impl ExceptionHandler {
    pub fn new(key: &str) -> Self {
        Self { key: Arc::from(key) }
    }

    /// Builds the envelope for one error.
    pub fn render(err: &Error) -> crate::Response {
        let status = err.status().unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let code = err.code().cloned().unwrap_or_else(|| Code::from(status));
        let empty = Map::new();
        let details = err.details().unwrap_or(&empty);
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            INTERNAL_ERROR_MESSAGE.to_owned()
        } else {
            err.to_string()
        };
        envelope::error(status, &message, &code, details)
    }
}

impl Service for ExceptionHandler {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, ServiceResult> {
        let result = ctx.get::<Error>(&self.key).map(Self::render);
        Box::pin(std::future::ready(result))
    }
}
