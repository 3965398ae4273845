//! Plain request handlers.
//!
//! A handler is the framework-native shape: a [`Request`] in, a [`Response`]
//! out, no context in between. The adapters here convert both ways, so
//! handlers written against the request alone, and decorators over such
//! handlers, can join a layer chain:
//!
//! ```text
//! from_handler(h)      handler            → service   (h gets the context's request)
//! into_handler(s)      service            → handler   (s resumes the caller's context)
//! handler_layer(d)     handler decorator  → layer     (from_handler(d(into_handler(s))))
//! ```
//!
//! While a [`from_handler`] service runs its handler, the context is parked
//! for the task. A handler built by [`into_handler`] and awaited on that task
//! resumes it, so values written on either side of the handler boundary stay
//! visible and an error from the inner service comes back out unchanged.
//! Anywhere else an [`into_handler`] handler runs on a fresh, empty context
//! and answers an escaped error with a bare 500, like a [`View`](crate::View).

use std::future::Future;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use http::StatusCode;
use tracing::{error, warn};

use crate::context::{Context, Data, enter_context};
use crate::error::Error;
use crate::layer::Layer;
use crate::request::Request;
use crate::response::Response;
use crate::service::{BoxFuture, BoxedService, Service, ServiceResult};

/// A type-erased request handler shared by every request that reaches it.
pub type BoxedHandler = Arc<dyn Fn(Request) -> BoxFuture<'static, Response> + Send + Sync>;

/// Wraps an async function from request to response.
///
/// ```rust
/// use plait::{Response, handler_fn};
///
/// let hello = handler_fn(|req| async move { Response::text(format!("hello {}", req.path())) });
/// ```
pub fn handler_fn<F, Fut>(f: F) -> BoxedHandler
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    Arc::new(move |req| Box::pin(f(req)))
}

// ── Parking ───────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Parked {
    ctx: Option<Context>,
    error: Option<Error>,
}

type Slot = Arc<Mutex<Parked>>;

tokio::task_local! {
    static PARKED: Slot;
}

fn lock(slot: &Slot) -> MutexGuard<'_, Parked> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Adapters ──────────────────────────────────────────────────────────────────

/// A service that hands the context's request to `handler`.
pub fn from_handler(handler: BoxedHandler) -> BoxedService {
    Arc::new(FromHandler(handler))
}

struct FromHandler(BoxedHandler);

impl Service for FromHandler {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, ServiceResult> {
        Box::pin(async move {
            let req = ctx.require_request()?.clone();
            let slot: Slot = Arc::new(Mutex::new(Parked { ctx: Some(mem::take(ctx)), error: None }));
            let res = PARKED.scope(Arc::clone(&slot), (self.0)(req)).await;

            let parked = mem::take(&mut *lock(&slot));
            match parked.ctx {
                Some(resumed) => *ctx = resumed,
                None => warn!("handler did not hand the request context back"),
            }
            match parked.error {
                Some(err) => Err(err),
                None => Ok(res),
            }
        })
    }
}

/// A handler that runs `service`.
///
/// The request it receives replaces the context's request, so a decorator
/// that rewrites the request is seen by everything downstream.
pub fn into_handler(service: BoxedService) -> BoxedHandler {
    Arc::new(move |req: Request| {
        let service = Arc::clone(&service);
        Box::pin(async move {
            let resumed = PARKED
                .try_with(Arc::clone)
                .ok()
                .and_then(|slot| {
                    let ctx = lock(&slot).ctx.take()?;
                    Some((slot, ctx))
                });

            let Some((slot, ctx)) = resumed else {
                let mut ctx = enter_context(&Data::new()).set_request(req);
                return service.call(&mut ctx).await.unwrap_or_else(|err| {
                    error!(error = %err, "unhandled service error");
                    Response::status(StatusCode::INTERNAL_SERVER_ERROR)
                });
            };

            let mut ctx = ctx.set_request(req);
            let result = service.call(&mut ctx).await;
            let mut parked = lock(&slot);
            parked.ctx = Some(ctx);
            result.unwrap_or_else(|err| {
                parked.error = Some(err);
                Response::status(StatusCode::INTERNAL_SERVER_ERROR)
            })
        })
    })
}

/// Turns a decorator over handlers into a layer.
///
/// The decorator sees the inner chain as a handler: it may inspect or
/// rewrite the request, answer without calling it, or decorate its response.
/// An error raised by the inner chain skips the decorator's response and
/// propagates as the layer's own error.
///
/// ```rust
/// use std::sync::Arc;
///
/// use http::StatusCode;
/// use plait::{BoxedHandler, Response, handler_fn, handler_layer};
///
/// let require_key = handler_layer(|inner: BoxedHandler| {
///     handler_fn(move |req| {
///         let inner = Arc::clone(&inner);
///         async move {
///             if req.header("x-api-key").is_none() {
///                 return Response::status(StatusCode::UNAUTHORIZED);
///             }
///             inner(req).await
///         }
///     })
/// });
/// ```
pub fn handler_layer<D>(decorator: D) -> HandlerLayer<D>
where
    D: Fn(BoxedHandler) -> BoxedHandler + Send + Sync + 'static,
{
    HandlerLayer(decorator)
}

/// See [`handler_layer`].
pub struct HandlerLayer<D>(D);

impl<D> Layer for HandlerLayer<D>
where
    D: Fn(BoxedHandler) -> BoxedHandler + Send + Sync + 'static,
{
    fn layer(&self, inner: BoxedService) -> BoxedService {
        from_handler((self.0)(into_handler(inner)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Failure;
    use crate::method::Method;
    use crate::middleware::ExceptionLayer;
    use crate::service::sync_service;

    fn ctx_for(target: &str) -> Context {
        enter_context(&Data::new().with("seed", 7_u32)).set_request(Request::new(Method::Get, target))
    }

    /// Writes `seen`, echoes `seed`.
    fn echo_seed() -> BoxedService {
        sync_service(|ctx| {
            let seed = *ctx.get::<u32>("seed")?;
            ctx.insert("seen", true)?;
            Ok(Response::text(seed.to_string()))
        })
    }

    fn identity(inner: BoxedHandler) -> BoxedHandler {
        inner
    }

    #[tokio::test]
    async fn from_handler_passes_the_context_request() {
        let svc = from_handler(handler_fn(|req| async move { Response::text(req.path().to_owned()) }));
        let mut ctx = ctx_for("/books?limit=1");
        let res = svc.call(&mut ctx).await.unwrap();
        assert_eq!(res.body(), b"/books");
        assert_eq!(ctx.get::<u32>("seed").unwrap(), &7);
    }

    #[tokio::test]
    async fn from_handler_needs_a_request() {
        let svc = from_handler(handler_fn(|_req| async { Response::text("unreachable") }));
        let mut ctx = enter_context(&Data::new());
        assert!(matches!(svc.call(&mut ctx).await, Err(Error::MissingRequest)));
    }

    #[tokio::test]
    async fn standalone_handler_uses_a_fresh_context() {
        let handler = into_handler(sync_service(|ctx| {
            assert!(ctx.find::<u32>("seed").is_none());
            ctx.insert("scratch", 1_u8)?;
            Ok(Response::text(ctx.require_request()?.path().to_owned()))
        }));
        let res = handler(Request::new(Method::Get, "/ping")).await;
        assert_eq!(res.body(), b"/ping");

        let failing = into_handler(sync_service(|_ctx| Err(Failure::new("secret").into())));
        let res = failing(Request::new(Method::Get, "/")).await;
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(res.body().is_empty());
    }

    #[tokio::test]
    async fn round_trip_keeps_the_context() {
        let svc = from_handler(into_handler(echo_seed()));
        let mut ctx = ctx_for("/");
        let res = svc.call(&mut ctx).await.unwrap();
        assert_eq!(res.body(), b"7");
        assert_eq!(ctx.get::<bool>("seen").unwrap(), &true);
        assert_eq!(ctx.get::<u32>("seed").unwrap(), &7);
    }

    #[tokio::test]
    async fn errors_cross_the_boundary_unchanged() {
        let svc = ExceptionLayer::new().layer(handler_layer(identity).layer(sync_service(|_ctx| {
            Err(Failure::new("short and stout").with_status_u16(418).into())
        })));
        let mut ctx = ctx_for("/");
        let res = svc.call(&mut ctx).await.unwrap();
        assert_eq!(res.status_code(), StatusCode::IM_A_TEAPOT);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["message"], "short and stout");
    }

    #[tokio::test]
    async fn decorators_short_circuit_rewrite_and_decorate() {
        let require_key = handler_layer(|inner: BoxedHandler| {
            handler_fn(move |req: Request| {
                let inner = Arc::clone(&inner);
                async move {
                    if req.header("x-key").is_none() {
                        return Response::status(StatusCode::UNAUTHORIZED);
                    }
                    let mut res = inner(req.with_header("x-checked", "yes")).await;
                    res.headers.push(("x-decorated".to_owned(), "yes".to_owned()));
                    res
                }
            })
        });
        let svc = require_key.layer(sync_service(|ctx| {
            let checked = ctx.require_request()?.header("x-checked").unwrap_or("no").to_owned();
            Ok(Response::text(checked))
        }));

        let mut ctx = ctx_for("/");
        assert_eq!(svc.call(&mut ctx).await.unwrap().status_code(), StatusCode::UNAUTHORIZED);

        let req = Request::new(Method::Get, "/").with_header("x-key", "k");
        let mut ctx = enter_context(&Data::new()).set_request(req);
        let res = svc.call(&mut ctx).await.unwrap();
        assert_eq!(res.body(), b"yes");
        assert_eq!(res.header("x-decorated"), Some("yes"));
        assert_eq!(ctx.require_request().unwrap().header("x-checked"), Some("yes"));
    }

    #[tokio::test]
    async fn nested_handler_layers_resume_their_own_context() {
        let svc = crate::layer::into_service(
            crate::layers![handler_layer(identity), handler_layer(identity)],
            echo_seed(),
        );
        let mut ctx = ctx_for("/");
        assert_eq!(svc.call(&mut ctx).await.unwrap().body(), b"7");
        assert!(ctx.find::<bool>("seen").is_some());
    }
}
