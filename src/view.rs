//! The request boundary.
//!
//! A [`View`] owns one composed service. For every request it establishes a
//! fresh [`Context`], seeds it with initial data, runs the service and drops
//! the context again, whichever way the service finished.

use std::fmt;
use std::sync::Arc;

use http::StatusCode;
use tracing::error;

use crate::context::{Data, enter_context};
use crate::request::Request;
use crate::response::Response;
use crate::service::{BoxedService, Service};

type InitialData = Arc<dyn Fn(&Request) -> Data + Send + Sync>;

/// A mounted service.
///
/// By default the initial data holds every route parameter as a `String`
/// under its own name, so `pk_filterer("pk")` finds `/books/{pk}`.
#[derive(Clone)]
pub struct View {
    service: BoxedService,
    initial: InitialData,
}

impl View {
    pub fn new(service: BoxedService) -> Self {
        Self { service, initial: Arc::new(route_params) }
    }

    /// Replaces how the initial data is built from the request.
    pub fn with_initial_data<F>(mut self, initial: F) -> Self
    where
        F: Fn(&Request) -> Data + Send + Sync + 'static,
    {
        self.initial = Arc::new(initial);
        self
    }

    /// Runs the service for one request.
    ///
    /// An error that escapes the service is logged and answered with a bare
    /// 500; nothing about it reaches the client.
    pub async fn call(&self, req: Request) -> Response {
        let initial = (self.initial)(&req);
        let mut ctx = enter_context(&initial).set_request(req);
        match self.service.call(&mut ctx).await {
            Ok(res) => res,
            Err(err) => {
                error!(error = %err, "unhandled service error");
                Response::status(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}

fn route_params(req: &Request) -> Data {
    req.params()
        .iter()
        .fold(Data::new(), |data, (k, v)| data.with(k.as_str(), v.clone()))
}

impl From<BoxedService> for View {
    fn from(service: BoxedService) -> Self {
        Self::new(service)
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View").finish_non_exhaustive()
    }
}
