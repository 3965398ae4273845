//! Per-request context.
//!
//! Every service receives the request's [`Context`] as `&mut Context`. It
//! holds two things:
//!
//! - the **data facet**: a string-keyed map of arbitrary values that layers
//!   write and downstream services read (the authenticated user, a caught
//!   error, list metadata, route parameters);
//! - the **request slot**: the inbound [`Request`].
//!
//! The data facet only exists once the context has been *entered*. The
//! [`View`](crate::View) does that for every request:
//!
//! ```rust
//! use plait::{Data, enter_context};
//!
//! let initial = Data::new().with("pk", "42".to_owned());
//! let mut ctx = enter_context(&initial);
//! ctx.insert("seen", true).unwrap();
//!
//! assert_eq!(ctx.get::<String>("pk").unwrap(), "42");
//! assert!(initial.find::<bool>("seen").is_none()); // the copy is private
//! ```
//!
//! One request, one context. The context is owned by the view for the
//! duration of the call and dropped when the call returns, whether the chain
//! succeeded or failed, so nothing leaks into the next request.

use std::any::{Any, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::Error;
use crate::request::Request;

/// Key under which [`ExceptionLayer`](crate::middleware::ExceptionLayer) stores the caught error.
pub const EXCEPTION_KEY: &str = "__exception__";

/// Key under which [`AuthenticationLayer`](crate::middleware::AuthenticationLayer) stores the user.
pub const USER_KEY: &str = "__user__";

/// Key under which CRUD filterers record list metadata (e.g. the total count).
pub const META_KEY: &str = "__meta__";

/// A shared, type-erased context value.
pub type Value = Arc<dyn Any + Send + Sync>;

// ── Data ──────────────────────────────────────────────────────────────────────

/// A string-keyed map of type-erased values.
///
/// Cloning is shallow: the map is copied, the values are shared.
#[derive(Clone, Default)]
pub struct Data(HashMap<String, Value>);

impl Data {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with<T: Any + Send + Sync>(mut self, key: impl Into<String>, value: T) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) -> Option<Value> {
        self.0.insert(key.into(), Arc::new(value))
    }

    /// Inserts an already shared value without re-wrapping it.
    pub fn insert_value(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    /// Returns the value under `key` if it is present and is a `T`.
    pub fn find<T: Any>(&self, key: &str) -> Option<&T> {
        self.0.get(key).and_then(|v| (**v).downcast_ref::<T>())
    }

    pub fn value(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.keys().collect();
        keys.sort_unstable();
        f.debug_set().entries(keys).finish()
    }
}

// ── Context ───────────────────────────────────────────────────────────────────

/// The per-request context passed to every service.
#[derive(Default)]
pub struct Context {
    request: Option<Request>,
    data: Option<Data>,
}

/// Establishes a context whose data facet is a shallow copy of `initial`.
///
/// The returned context is the scope: drop it (or call [`Context::leave`])
/// and the facet is gone.
pub fn enter_context(initial: &Data) -> Context {
    Context { request: None, data: Some(initial.clone()) }
}

impl Context {
    /// A context with no data facet and no request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches the inbound request. Returns `self` for chaining.
    pub fn set_request(mut self, request: Request) -> Self {
        self.request = Some(request);
        self
    }

    pub fn request(&self) -> Option<&Request> {
        self.request.as_ref()
    }

    pub fn require_request(&self) -> Result<&Request, Error> {
        self.request.as_ref().ok_or(Error::MissingRequest)
    }

    /// Whether a data facet is currently established.
    pub fn exists(&self) -> bool {
        self.data.is_some()
    }

    pub fn data(&self) -> Result<&Data, Error> {
        self.data.as_ref().ok_or(Error::NoContext)
    }

    pub fn data_mut(&mut self) -> Result<&mut Data, Error> {
        self.data.as_mut().ok_or(Error::NoContext)
    }

    /// Detaches and returns the data facet, leaving the context unestablished.
    pub fn leave(&mut self) -> Option<Data> {
        self.data.take()
    }

    /// Strict read: the key must be present and hold a `T`.
    pub fn get<T: Any>(&self, key: &str) -> Result<&T, Error> {
        let value = self.data()?
            .value(key)
            .ok_or_else(|| Error::MissingKey(key.to_owned()))?;
        (**value).downcast_ref::<T>().ok_or_else(|| Error::WrongType {
            key: key.to_owned(),
            expected: type_name::<T>(),
        })
    }

    /// Lenient read: `None` when unestablished, absent, or of another type.
    pub fn find<T: Any>(&self, key: &str) -> Option<&T> {
        self.data.as_ref()?.find(key)
    }

    pub fn insert<T: Any + Send + Sync>(
        &mut self,
        key: impl Into<String>,
        value: T,
    ) -> Result<Option<Value>, Error> {
        Ok(self.data_mut()?.insert(key, value))
    }

    pub fn remove(&mut self, key: &str) -> Result<Option<Value>, Error> {
        Ok(self.data_mut()?.remove(key))
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("request", &self.request.as_ref().map(|r| (r.method(), r.path())))
            .field("data", &self.data)
            .finish()
    }
}
