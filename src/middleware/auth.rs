//! Authentication and permission layers.
//!
//! [`AuthenticationLayer`] resolves a [`User`] through an external
//! [`Authenticator`] and stores it under [`USER_KEY`]. The permission layers
//! read it back and answer `403` when a rule fails.
//!
//! ```rust,ignore
//! let svc = into_service(
//!     layers![
//!         ExceptionLayer::new(),
//!         AuthenticationLayer::new(backend, ["username", "password"]),
//!         is_authenticated_layer(),
//!         has_permissions_layer(["books.add_book"]),
//!     ],
//!     create_book,
//! );
//! ```

use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use tracing::debug;

use crate::context::{Context, USER_KEY};
use crate::envelope::forbidden_service;
use crate::error::Error;
use crate::layer::Layer;
use crate::request::Request;
use crate::service::{BoxFuture, BoxedService, Service, ServiceResult};

use super::case::{CaseLayer, case_layer};

// ── Principal ─────────────────────────────────────────────────────────────────

/// Whoever is making the request.
pub trait Principal: Send + Sync + 'static {
    fn is_authenticated(&self) -> bool {
        true
    }

    fn has_perm(&self, perm: &str) -> bool;

    /// A display name for logs.
    fn name(&self) -> &str {
        ""
    }
}

/// The unauthenticated principal. Holds no permissions.
#[derive(Clone, Copy, Debug, Default)]
pub struct AnonymousUser;

impl Principal for AnonymousUser {
    fn is_authenticated(&self) -> bool {
        false
    }

    fn has_perm(&self, _perm: &str) -> bool {
        false
    }
}

/// A shared principal, as stored in the context.
#[derive(Clone)]
pub struct User(Arc<dyn Principal>);

impl User {
    pub fn new(principal: impl Principal) -> Self {
        Self(Arc::new(principal))
    }

    pub fn anonymous() -> Self {
        Self::new(AnonymousUser)
    }
}

impl Deref for User {
    type Target = dyn Principal;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("name", &self.name())
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}

// ── Authenticator ─────────────────────────────────────────────────────────────

/// Credential values collected from the context, by key.
pub type Credentials = HashMap<String, String>;

/// The external authentication backend.
///
/// Returns `Ok(None)` when the credentials do not identify anyone; errors
/// are reserved for backend failures and propagate up the chain.
pub trait Authenticator: Send + Sync + 'static {
    fn authenticate<'a>(
        &'a self,
        request: Option<&'a Request>,
        credentials: &'a Credentials,
    ) -> BoxFuture<'a, Result<Option<User>, Error>>;
}

/// Resolves the user and stores it in the context, then always continues.
///
/// Each credential key must hold a `String` in the context (route
/// parameters do); a missing key is an error.
#[derive(Clone)]
pub struct AuthenticationLayer {
    authenticator: Arc<dyn Authenticator>,
    credential_keys: Arc<[String]>,
    user_key: Arc<str>,
}

impl AuthenticationLayer {
    pub fn new<I>(authenticator: impl Authenticator, credential_keys: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self {
            authenticator: Arc::new(authenticator),
            credential_keys: credential_keys.into_iter().map(Into::into).collect(),
            user_key: Arc::from(USER_KEY),
        }
    }

    pub fn user_key(mut self, key: &str) -> Self {
        self.user_key = Arc::from(key);
        self
    }
}

impl Layer for AuthenticationLayer {
    fn layer(&self, inner: BoxedService) -> BoxedService {
        Arc::new(Authenticate { layer: self.clone(), inner })
    }
}

struct Authenticate {
    layer: AuthenticationLayer,
    inner: BoxedService,
}

impl Service for Authenticate {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, ServiceResult> {
        Box::pin(async move {
            let credentials = self.layer.credential_keys.iter()
                .map(|key| Ok((key.clone(), ctx.get::<String>(key)?.clone())))
                .collect::<Result<Credentials, Error>>()?;

            let user = self.layer.authenticator
                .authenticate(ctx.request(), &credentials)
                .await?
                .unwrap_or_else(User::anonymous);
            debug!(user = user.name(), authenticated = user.is_authenticated(), "authenticated");

            ctx.insert(&*self.layer.user_key, user)?;
            self.inner.call(ctx).await
        })
    }
}

// ── Permission layers ─────────────────────────────────────────────────────────

/// A permission rule: `true` allows.
pub type Rule = Arc<dyn Fn(&Context) -> bool + Send + Sync>;

/// Answers `403` when any rule returns `false`; otherwise continues.
pub fn permission_layer<I>(rules: I) -> CaseLayer
where
    I: IntoIterator<Item = Rule>,
{
    let rules: Vec<Rule> = rules.into_iter().collect();
    case_layer(
        move |ctx| {
            let denied = rules.iter().any(|rule| !rule(ctx));
            if denied {
                debug!("permission denied");
            }
            denied
        },
        forbidden_service(),
    )
}

/// `403` unless the user under [`USER_KEY`] is authenticated.
pub fn is_authenticated_layer() -> CaseLayer {
    is_authenticated_layer_at(USER_KEY)
}

/// [`is_authenticated_layer`] for a user stored under `user_key`, to pair
/// with [`AuthenticationLayer::user_key`].
pub fn is_authenticated_layer_at(user_key: &str) -> CaseLayer {
    permission_layer([rules::is_authenticated(user_key)])
}

/// `403` unless the user under [`USER_KEY`] holds every permission.
pub fn has_permissions_layer<I>(perms: I) -> CaseLayer
where
    I: IntoIterator,
    I::Item: Into<String>,
{
    has_permissions_layer_at(USER_KEY, perms)
}

/// [`has_permissions_layer`] for a user stored under `user_key`.
pub fn has_permissions_layer_at<I>(user_key: &str, perms: I) -> CaseLayer
where
    I: IntoIterator,
    I::Item: Into<String>,
{
    permission_layer(perms.into_iter().map(|perm| rules::has_perm(user_key, perm)))
}

/// Rule constructors over a user stored at a given key. A missing user
/// fails every rule.
pub mod rules {
    use std::sync::Arc;

    use super::{Rule, User};
    use crate::context::Context;

    pub fn is_authenticated(user_key: &str) -> Rule {
        let key = user_key.to_owned();
        Arc::new(move |ctx: &Context| ctx.find::<User>(&key).is_some_and(|u| u.is_authenticated()))
    }

    pub fn has_perm(user_key: &str, perm: impl Into<String>) -> Rule {
        let key = user_key.to_owned();
        let perm = perm.into();
        Arc::new(move |ctx: &Context| ctx.find::<User>(&key).is_some_and(|u| u.has_perm(&perm)))
    }
}
