//! Layer composition.
//!
//! A [`Layer`] turns one service into another. A stack of layers is applied
//! so that the **first-listed layer is outermost**: it sees the request first
//! and the response last.
//!
//! ```text
//! layers![L1, L2, L3].layer(S)   ==   L1(L2(L3(S)))
//!
//! request  ──▶ L1 ─▶ L2 ─▶ L3 ─▶ S
//! response ◀── L1 ◀─ L2 ◀─ L3 ◀─┘
//! ```
//!
//! ```rust
//! use http::StatusCode;
//! use plait::middleware::{ExceptionLayer, TraceLayer};
//! use plait::{Response, into_service, layers, sync_service};
//!
//! let svc = into_service(
//!     layers![TraceLayer, ExceptionLayer::new()],
//!     sync_service(|_ctx| Ok(Response::status(StatusCode::NO_CONTENT))),
//! );
//! ```

use std::sync::Arc;

use crate::service::BoxedService;

/// Wraps a service in another service.
pub trait Layer: Send + Sync + 'static {
    fn layer(&self, inner: BoxedService) -> BoxedService;
}

/// A type-erased layer.
pub type BoxedLayer = Arc<dyn Layer>;

impl<L: Layer + ?Sized> Layer for Arc<L> {
    fn layer(&self, inner: BoxedService) -> BoxedService {
        (**self).layer(inner)
    }
}

// ── Layers ────────────────────────────────────────────────────────────────────

/// An ordered stack of layers, outermost first. Itself a [`Layer`].
#[derive(Clone, Default)]
pub struct Layers(Vec<BoxedLayer>);

impl Layers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `layer` *inside* every layer already in the stack.
    pub fn push(mut self, layer: impl Layer) -> Self {
        self.0.push(Arc::new(layer));
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Layer for Layers {
    fn layer(&self, inner: BoxedService) -> BoxedService {
        self.0.iter().rev().fold(inner, |service, outer| outer.layer(service))
    }
}

impl FromIterator<BoxedLayer> for Layers {
    fn from_iter<I: IntoIterator<Item = BoxedLayer>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Builds a [`Layers`] stack from already boxed layers, outermost first.
pub fn layers<I>(outers: I) -> Layers
where
    I: IntoIterator<Item = BoxedLayer>,
{
    outers.into_iter().collect()
}

/// Builds a [`Layers`] stack, outermost first.
///
/// `layers![a, b, c]` is `Layers::new().push(a).push(b).push(c)`.
#[macro_export]
macro_rules! layers {
    ($($layer:expr),* $(,)?) => {
        $crate::Layers::new()$(.push($layer))*
    };
}

/// Applies `outers` to `service`.
pub fn into_service(outers: impl Layer, service: BoxedService) -> BoxedService {
    outers.layer(service)
}

// ── Small layers ──────────────────────────────────────────────────────────────

/// A layer that returns the service unchanged.
pub fn noop_layer() -> impl Layer {
    layer_fn(|service| service)
}

/// Wraps a closure `BoxedService -> BoxedService`.
pub fn layer_fn<F>(f: F) -> LayerFn<F>
where
    F: Fn(BoxedService) -> BoxedService + Send + Sync + 'static,
{
    LayerFn(f)
}

/// See [`layer_fn`].
pub struct LayerFn<F>(F);

impl<F> Layer for LayerFn<F>
where
    F: Fn(BoxedService) -> BoxedService + Send + Sync + 'static,
{
    fn layer(&self, inner: BoxedService) -> BoxedService {
        (self.0)(inner)
    }
}
