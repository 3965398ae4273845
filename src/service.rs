//! Service trait and type erasure.
//!
//! # How services are stored
//!
//! Layers wrap services of *different* concrete types, and a composed chain
//! must be storable in a router next to every other chain. So every service
//! is hidden behind one trait object, [`BoxedService`] = `Arc<dyn Service>`.
//!
//! The chain from user code to vtable call is:
//!
//! ```text
//! |ctx| Box::pin(async move { … })       ← user writes this
//!        ↓ service_fn(…)
//! Arc::new(ServiceFn(closure))           ← heap-allocated wrapper
//!        ↓  stored as BoxedService = Arc<dyn Service>
//! service.call(&mut ctx)  per request    ← one vtable dispatch
//!        ↓
//! BoxFuture<'_, Result<Response, Error>>
//! ```
//!
//! The future borrows both the service and the context for as long as it
//! runs, so a layer can read the context, await the inner service, and then
//! write the context again without any cloning.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::Context;
use crate::error::Error;
use crate::response::Response;

/// A heap-allocated, type-erased future borrowed for `'a`.
///
/// `Send` lets tokio move a request's future across worker threads.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What every service produces.
pub type ServiceResult = Result<Response, Error>;

/// A function from the request [`Context`] to a response.
///
/// Implement it on a struct when the service holds configuration (every
/// built-in layer does), or use [`service_fn`] / [`sync_service`] for
/// closures.
pub trait Service: Send + Sync + 'static {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, ServiceResult>;
}

/// A type-erased service shared by every request that reaches it.
pub type BoxedService = Arc<dyn Service>;

impl<S: Service + ?Sized> Service for Arc<S> {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, ServiceResult> {
        (**self).call(ctx)
    }
}

// ── Closure adapters ──────────────────────────────────────────────────────────

/// Wraps an async closure.
///
/// ```rust
/// use plait::{Response, service_fn};
///
/// let hello = service_fn(|ctx| Box::pin(async move {
///     let who = ctx.find::<String>("name").cloned().unwrap_or_default();
///     Ok(Response::text(format!("hello {who}")))
/// }));
/// ```
pub fn service_fn<F>(f: F) -> BoxedService
where
    F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, ServiceResult> + Send + Sync + 'static,
{
    Arc::new(ServiceFn(f))
}

/// Wraps a closure that produces its response without awaiting anything.
pub fn sync_service<F>(f: F) -> BoxedService
where
    F: Fn(&mut Context) -> ServiceResult + Send + Sync + 'static,
{
    Arc::new(SyncFn(f))
}

struct ServiceFn<F>(F);

impl<F> Service for ServiceFn<F>
where
    F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, ServiceResult> + Send + Sync + 'static,
{
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, ServiceResult> {
        (self.0)(ctx)
    }
}

struct SyncFn<F>(F);

impl<F> Service for SyncFn<F>
where
    F: Fn(&mut Context) -> ServiceResult + Send + Sync + 'static,
{
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, ServiceResult> {
        Box::pin(std::future::ready((self.0)(ctx)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Data, enter_context};

    #[tokio::test]
    async fn async_closure_reads_and_writes_context() {
        let svc = service_fn(|ctx| Box::pin(async move {
            let n = ctx.find::<u32>("n").copied().unwrap_or(0);
            ctx.insert("n", n + 1)?;
            Ok(Response::text(n.to_string()))
        }));

        let mut ctx = enter_context(&Data::new().with("n", 41_u32));
        let res = svc.call(&mut ctx).await.unwrap();
        assert_eq!(res.body(), b"41");
        assert_eq!(*ctx.get::<u32>("n").unwrap(), 42);
    }

    #[tokio::test]
    async fn sync_closure_propagates_errors() {
        let svc = sync_service(|ctx| {
            ctx.get::<String>("missing")?;
            Ok(Response::text("unreachable"))
        });

        let mut ctx = enter_context(&Data::new());
        assert!(matches!(svc.call(&mut ctx).await, Err(Error::MissingKey(_))));
    }
}
