//! Standard layers.
//!
//! Middleware intercepts requests and responses and is the right place for
//! cross-cutting concerns. Every layer here is a plain wrapper; composed
//! layers form a straight chain, never a graph:
//!
//! - [`ExceptionLayer`]: turns a failed inner chain into a JSON envelope
//! - [`case_layer`] / [`method_layer`]: branch to another service
//! - [`AuthenticationLayer`]: resolve the user into the context
//! - [`permission_layer`], [`is_authenticated_layer`], [`has_permissions_layer`]: 403 gates
//!   (the `_at` variants read the user from a custom key)
//! - [`TraceLayer`]: per-request span with method, path, status, latency
//!
//! A chain answers with exactly one response: the terminal service's, or
//! the one produced by the single layer that short-circuited.

mod auth;
mod case;
mod exception;
mod trace;

pub use auth::{
    AnonymousUser, AuthenticationLayer, Authenticator, Credentials, Principal, Rule, User,
    has_permissions_layer, has_permissions_layer_at, is_authenticated_layer, is_authenticated_layer_at,
    permission_layer, rules,
};
pub use case::{CaseLayer, Condition, case_layer, method_layer};
pub use exception::{ExceptionHandler, ExceptionLayer};
pub use trace::TraceLayer;
