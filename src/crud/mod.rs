//! Generic CRUD services.
//!
//! Each builder wires a fixed pipeline out of three kinds of stage:
//!
//! - a [`Filterer`] narrows a collection: it receives the previous stage's
//!   collection (`None` for the first stage) and returns the next one;
//! - a [`Serializer`] turns an instance or a collection into a
//!   content-type/body pair;
//! - a [`Mutator`] writes: it receives the located instance (or `None` when
//!   creating) and either saves it or rejects the request with a response.
//!
//! | builder             | pipeline                                   | success |
//! |---------------------|--------------------------------------------|---------|
//! | [`detail_service`]  | filter → first (404 if none) → serialize   | 200     |
//! | [`list_service`]    | filter → serialize collection              | 200     |
//! | [`create_service`]  | mutate(None) → serialize                   | 201     |
//! | [`update_service`]  | filter → first (404) → mutate → serialize  | 200     |
//! | [`delete_service`]  | filter → first (404) → mutate              | 204     |
//!
//! ```rust,ignore
//! let detail = detail_service(
//!     json_serializer::<Book>(),
//!     vec![all_filterer(move || store.all()), pk_filterer("pk")],
//! );
//! ```

mod filter;
mod mutate;
mod records;
mod serialize;

use std::sync::Arc;

use crate::context::Context;
use crate::envelope;
use crate::error::Error;
use crate::response::Response;
use crate::service::{BoxedService, sync_service};

pub use filter::{Pagination, all_filterer, count_meta_filterer, limit_offset_filterer, pk_filterer};
pub use mutate::{FieldError, FieldErrors, Files, Form, NON_FIELD_ERRORS, UploadedFile, delete_mutator, form_mutator};
pub use records::{Keyed, Records};
pub use serialize::{json_list_serializer, json_serializer};

// ── Collaborator traits ───────────────────────────────────────────────────────

/// A possibly lazy collection of instances, e.g. a query that has not run yet.
///
/// `slice` must stay lazy; only `count`, `first` and `items` evaluate.
pub trait Collection: Send + Sync + 'static {
    type Item: Send + Sync + 'static;

    fn count(&self) -> Result<usize, Error>;

    /// Restricts to at most `limit` instances starting at `offset`.
    fn slice(self, offset: usize, limit: usize) -> Self;

    fn first(self) -> Result<Option<Self::Item>, Error>
    where
        Self: Sized,
    {
        Ok(self.slice(0, 1).items()?.into_iter().next())
    }

    fn items(self) -> Result<Vec<Self::Item>, Error>;
}

/// A collection that can be narrowed by primary key.
pub trait Lookup: Collection {
    fn filter_pk(self, pk: &str) -> Self;
}

// ── Stage types ───────────────────────────────────────────────────────────────

pub type Filterer<C> = Arc<dyn Fn(&mut Context, Option<C>) -> Result<C, Error> + Send + Sync>;

pub type Serializer<T> = Arc<dyn Fn(&Context, T) -> Result<Serialized, Error> + Send + Sync>;

pub type Mutator<T> = Arc<dyn Fn(&mut Context, Option<T>) -> Result<Mutated<T>, Error> + Send + Sync>;

/// A serializer's output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Serialized {
    pub content_type: String,
    pub body: Vec<u8>,
}

/// A mutator's outcome.
#[derive(Debug)]
pub enum Mutated<T> {
    /// The write happened; carries the resulting instance.
    Saved(T),
    /// The write was refused; answer with this response as-is.
    Rejected(Response),
}

/// Threads `None` through every filterer in order.
fn run_filters<C>(ctx: &mut Context, filterers: &[Filterer<C>]) -> Result<C, Error> {
    filterers
        .iter()
        .try_fold(None, |prior, filterer| filterer(ctx, prior).map(Some))?
        .ok_or(Error::EmptyPipeline)
}

// ── Builders ──────────────────────────────────────────────────────────────────

/// `200` with the first filtered instance, `404` when there is none.
pub fn detail_service<C: Collection>(serializer: Serializer<C::Item>, filterers: Vec<Filterer<C>>) -> BoxedService {
    sync_service(move |ctx| {
        let Some(instance) = run_filters(ctx, &filterers)?.first()? else {
            return Ok(envelope::not_found());
        };
        let out = serializer(ctx, instance)?;
        Ok(envelope::ok(&out.content_type, out.body))
    })
}

/// `200` with the whole filtered collection.
pub fn list_service<C: Collection>(serializer: Serializer<C>, filterers: Vec<Filterer<C>>) -> BoxedService {
    sync_service(move |ctx| {
        let instances = run_filters(ctx, &filterers)?;
        let out = serializer(ctx, instances)?;
        Ok(envelope::ok(&out.content_type, out.body))
    })
}

/// `201` with the created instance, or the mutator's rejection.
pub fn create_service<T: Send + 'static>(mutator: Mutator<T>, serializer: Serializer<T>) -> BoxedService {
    sync_service(move |ctx| match mutator(ctx, None)? {
        Mutated::Rejected(response) => Ok(response),
        Mutated::Saved(instance) => {
            let out = serializer(ctx, instance)?;
            Ok(envelope::created(&out.content_type, out.body))
        }
    })
}

/// `200` with the updated instance, `404` when none was found, or the
/// mutator's rejection.
pub fn update_service<C: Collection>(
    mutator: Mutator<C::Item>,
    serializer: Serializer<C::Item>,
    filterers: Vec<Filterer<C>>,
) -> BoxedService {
    sync_service(move |ctx| {
        let Some(instance) = run_filters(ctx, &filterers)?.first()? else {
            return Ok(envelope::not_found());
        };
        match mutator(ctx, Some(instance))? {
            Mutated::Rejected(response) => Ok(response),
            Mutated::Saved(instance) => {
                let out = serializer(ctx, instance)?;
                Ok(envelope::ok(&out.content_type, out.body))
            }
        }
    })
}

/// `204` after the mutator ran, `404` when nothing was found, or the
/// mutator's rejection.
pub fn delete_service<C: Collection>(mutator: Mutator<C::Item>, filterers: Vec<Filterer<C>>) -> BoxedService {
    sync_service(move |ctx| {
        let Some(instance) = run_filters(ctx, &filterers)?.first()? else {
            return Ok(envelope::not_found());
        };
        match mutator(ctx, Some(instance))? {
            Mutated::Rejected(response) => Ok(response),
            Mutated::Saved(_) => Ok(envelope::no_content()),
        }
    })
}
