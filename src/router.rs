//! Radix-tree request router.
//!
//! One tree keyed by path. A route owns a [`View`]; method dispatch is the
//! composed service's job (see [`method_layer`](crate::middleware::method_layer)).

use std::collections::HashMap;
use std::sync::Arc;

use matchit::Router as MatchitRouter;

use crate::envelope;
use crate::request::Request;
use crate::response::Response;
use crate::service::BoxedService;
use crate::view::View;

/// The application router.
///
/// Build it once at startup; pass it to [`Server::serve`](crate::Server::serve).
/// Each [`Router::route`] call returns `self` so registrations chain naturally.
pub struct Router {
    routes: MatchitRouter<Arc<View>>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: MatchitRouter::new() }
    }

    /// Mounts `service` at `path` behind a default [`View`].
    ///
    /// Path parameters use `{name}` syntax and land in the context as
    /// `String`s under the same name:
    ///
    /// ```rust
    /// # use plait::{Response, Router, sync_service};
    /// # let book = sync_service(|_ctx| Ok(Response::text("")));
    /// # let books = book.clone();
    /// Router::new()
    ///     .route("/books",      books)
    ///     .route("/books/{pk}", book);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid pattern or conflicts with a route
    /// already registered.
    pub fn route(self, path: &str, service: BoxedService) -> Self {
        self.route_view(path, View::new(service))
    }

    /// Mounts a configured [`View`] at `path`.
    pub fn route_view(mut self, path: &str, view: View) -> Self {
        self.routes
            .insert(path, Arc::new(view))
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    pub(crate) fn lookup(&self, path: &str) -> Option<(Arc<View>, HashMap<String, String>)> {
        let matched = self.routes.at(path).ok()?;
        let view = Arc::clone(matched.value);
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((view, params))
    }

    /// Routes one request to its view; `404` envelope when nothing matches.
    pub async fn dispatch(&self, mut req: Request) -> Response {
        match self.lookup(req.path()) {
            Some((view, params)) => {
                req.params = params;
                view.call(req).await
            }
            None => envelope::not_found(),
        }
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}
