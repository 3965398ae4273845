//! # plait
//!
//! Request handling as composable layers around terminal services, with an
//! explicit per-request context and generic CRUD services.
//!
//! ## The model
//!
//! - A [`Service`] takes `&mut Context` and produces a [`Response`] (or an
//!   [`Error`]).
//! - A [`Layer`] wraps a service in another service. `layers![a, b, c]`
//!   wraps so that `a` runs first and `c` sits next to the service.
//! - A [`View`] is the request boundary: it creates the [`Context`], runs the
//!   chain and drops the context, turning escaped errors into a bare 500.
//! - [`crud`] builds detail/list/create/update/delete services from small
//!   filter, serialize and mutate stages.
//! - [`envelope`] renders the fixed-shape JSON error bodies.
//! - [`from_handler`], [`into_handler`] and [`handler_layer`] bridge plain
//!   `Request -> Response` handlers and their decorators into a chain.
//!
//! Persistence, authentication backends and form validation stay outside:
//! they plug in through [`crud::Collection`], [`middleware::Authenticator`]
//! and [`crud::Form`].
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use plait::middleware::{ExceptionLayer, TraceLayer, method_layer};
//! use plait::envelope::not_found_service;
//! use plait::{Method, Response, Router, Server, into_service, layers, sync_service};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), plait::Error> {
//!     let list = sync_service(|_ctx| Ok(Response::json(b"[]".to_vec())));
//!     let books = into_service(
//!         layers![
//!             TraceLayer,
//!             ExceptionLayer::new(),
//!             method_layer(Method::Get, list),
//!         ],
//!         not_found_service(),
//!     );
//!
//!     let app = Router::new().route("/books", books);
//!     Server::bind("0.0.0.0:3000")?.serve(app).await
//! }
//! ```

mod context;
mod error;
mod handler;
mod layer;
mod method;
mod request;
mod response;
mod router;
mod server;
mod service;
mod view;

pub mod crud;
pub mod envelope;
pub mod middleware;

pub use context::{Context, Data, EXCEPTION_KEY, META_KEY, USER_KEY, Value, enter_context};
pub use error::{Code, Error, Failure};
pub use handler::{BoxedHandler, HandlerLayer, from_handler, handler_fn, handler_layer, into_handler};
pub use layer::{BoxedLayer, Layer, LayerFn, Layers, into_service, layer_fn, layers, noop_layer};
pub use method::Method;
pub use request::Request;
pub use response::{ContentType, Response, ResponseBuilder};
pub use router::Router;
pub use server::{DEFAULT_BODY_LIMIT, Server};
pub use service::{BoxFuture, BoxedService, Service, ServiceResult, service_fn, sync_service};
pub use view::View;
