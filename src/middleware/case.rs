//! Conditional dispatch.

use std::sync::Arc;

use crate::context::Context;
use crate::layer::Layer;
use crate::method::Method;
use crate::service::{BoxFuture, BoxedService, Service, ServiceResult};

/// A predicate over the request context.
pub type Condition = Arc<dyn Fn(&Context) -> bool + Send + Sync>;

/// Sends the request to `branch` when the condition holds, otherwise to the
/// wrapped service. Exactly one of the two runs.
#[derive(Clone)]
pub struct CaseLayer {
    condition: Condition,
    branch: BoxedService,
}

/// Builds a [`CaseLayer`].
///
/// ```rust
/// use plait::middleware::case_layer;
/// use plait::envelope::forbidden_service;
///
/// let read_only = case_layer(|ctx| ctx.find::<bool>("read_only").copied().unwrap_or(false), forbidden_service());
/// ```
pub fn case_layer<F>(condition: F, branch: BoxedService) -> CaseLayer
where
    F: Fn(&Context) -> bool + Send + Sync + 'static,
{
    CaseLayer { condition: Arc::new(condition), branch }
}

/// A [`CaseLayer`] on the request method. A context without a request never
/// matches.
pub fn method_layer(method: Method, branch: BoxedService) -> CaseLayer {
    case_layer(
        move |ctx| ctx.request().is_some_and(|req| req.method() == method),
        branch,
    )
}

impl Layer for CaseLayer {
    fn layer(&self, inner: BoxedService) -> BoxedService {
        Arc::new(Case { layer: self.clone(), inner })
    }
}

struct Case {
    layer: CaseLayer,
    inner: BoxedService,
}

impl Service for Case {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, ServiceResult> {
        if (self.layer.condition)(&*ctx) {
            self.layer.branch.call(ctx)
        } else {
            self.inner.call(ctx)
        }
    }
}
