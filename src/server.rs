//! HTTP server and graceful shutdown.
//!
//! Bodies are collected in full before routing, then the request goes
//! through [`Router::dispatch`]. Methods outside [`Method`] get `405`; a
//! body over the configured limit gets `413`.
//!
//! On SIGTERM or Ctrl-C the server stops accepting, lets in-flight
//! connections finish, and returns from [`Server::serve`].

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Incoming};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::error::Error;
use crate::method::Method;
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;

/// Default cap on a request body: 2.5 MiB.
pub const DEFAULT_BODY_LIMIT: usize = 2_621_440;

/// The HTTP server.
pub struct Server {
    addr: SocketAddr,
    body_limit: usize,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    ///
    /// ```rust,no_run
    /// use plait::Server;
    /// let server = Server::bind("0.0.0.0:3000")?;
    /// # Ok::<(), plait::Error>(())
    /// ```
    pub fn bind(addr: &str) -> Result<Self, Error> {
        let addr: SocketAddr = addr.parse().map_err(|_| Error::InvalidAddr(addr.to_owned()))?;
        Ok(Self { addr, body_limit: DEFAULT_BODY_LIMIT })
    }

    /// Largest request body accepted, in bytes. Larger bodies get `413`.
    pub fn body_limit(mut self, bytes: usize) -> Self {
        self.body_limit = bytes;
        self
    }

    /// Starts accepting connections and dispatching them through `router`.
    ///
    /// Returns only after a full graceful shutdown (SIGTERM or Ctrl-C,
    /// followed by all in-flight requests completing).
    pub async fn serve(self, router: Router) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr).await?;

        let router = Arc::new(router);
        let body_limit = self.body_limit;

        info!(addr = %self.addr, body_limit, "plait listening");

        // Every connection task, so shutdown can wait for them.
        let mut tasks = tokio::task::JoinSet::new();

        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                // Shutdown first: stop accepting even with connections queued.
                biased;

                () = &mut shutdown => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!(error = %e, "accept failed");
                            continue;
                        }
                    };

                    let router = Arc::clone(&router);
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // Called once per request on the connection.
                        let svc = service_fn(move |req: hyper::Request<Incoming>| {
                            let router = Arc::clone(&router);
                            async move { dispatch(router, req, remote_addr, body_limit).await }
                        });

                        // HTTP/1.1 or HTTP/2, whichever the client speaks.
                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(peer = %remote_addr, error = %e, "connection failed");
                        }
                    });
                }

                // Reap finished tasks.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        // Drain.
        while tasks.join_next().await.is_some() {}

        info!("plait stopped");
        Ok(())
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Routes one request and produces one response.
///
/// Never fails: every problem becomes a response, so hyper sees no errors.
async fn dispatch<B>(
    router: Arc<Router>,
    req: hyper::Request<B>,
    remote_addr: SocketAddr,
    body_limit: usize,
) -> Result<http::Response<Full<Bytes>>, Infallible>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (parts, body) = req.into_parts();

    let Ok(method) = Method::try_from(&parts.method) else {
        debug!(peer = %remote_addr, method = %parts.method, "method not allowed");
        return Ok(Response::status(StatusCode::METHOD_NOT_ALLOWED).into_inner());
    };

    let body = match Limited::new(body, body_limit).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.is::<LengthLimitError>() => {
            debug!(peer = %remote_addr, limit = body_limit, "request body too large");
            return Ok(Response::status(StatusCode::PAYLOAD_TOO_LARGE).into_inner());
        }
        Err(e) => {
            error!(peer = %remote_addr, error = %Error::Body(e), "failed to read request body");
            return Ok(Response::status(StatusCode::BAD_REQUEST).into_inner());
        }
    };

    let response = router.dispatch(Request::from_parts(method, &parts, body)).await;
    Ok(response.into_inner())
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first shutdown signal the process receives.
///
/// SIGTERM and Ctrl-C on Unix, Ctrl-C elsewhere. A handler that cannot be
/// installed is logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::sync_service;

    fn router() -> Arc<Router> {
        let echo = sync_service(|ctx| Ok(Response::text(ctx.require_request()?.body().len().to_string())));
        Arc::new(Router::new().route("/echo", echo))
    }

    fn post(body: &'static [u8]) -> hyper::Request<Full<Bytes>> {
        hyper::Request::builder()
            .method("POST")
            .uri("/echo?x=1")
            .body(Full::new(Bytes::from_static(body)))
            .unwrap()
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:4000".parse().unwrap()
    }

    #[tokio::test]
    async fn bodies_within_the_limit_reach_the_router() {
        let res = dispatch(router(), post(b"12345678"), peer(), 8).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.into_body().collect().await.unwrap().to_bytes(), "8");
    }

    #[tokio::test]
    async fn oversized_bodies_get_413() {
        let res = dispatch(router(), post(b"123456789"), peer(), 8).await.unwrap();
        assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn unknown_methods_get_405() {
        let req = hyper::Request::builder()
            .method(http::Method::from_bytes(b"PURGE").unwrap())
            .uri("/echo")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let res = dispatch(router(), req, peer(), DEFAULT_BODY_LIMIT).await.unwrap();
        assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[test]
    fn bind_rejects_bad_addresses() {
        assert!(matches!(Server::bind("not an address"), Err(Error::InvalidAddr(_))));
        assert_eq!(Server::bind("127.0.0.1:0").unwrap().body_limit(1).body_limit, 1);
    }
}
