//! Filterers.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::context::Context;
use crate::error::Error;
use crate::request::Request;

use super::{Collection, Filterer, Lookup};

/// Starts the pipeline from `source`, ignoring any prior collection.
pub fn all_filterer<C, F>(source: F) -> Filterer<C>
where
    C: 'static,
    F: Fn() -> C + Send + Sync + 'static,
{
    Arc::new(move |_ctx: &mut Context, _prior: Option<C>| Ok(source()))
}

/// Narrows to the instance whose primary key is the `String` stored under
/// `key` (typically a route parameter).
pub fn pk_filterer<C: Lookup>(key: &str) -> Filterer<C> {
    let key = key.to_owned();
    Arc::new(move |ctx: &mut Context, prior: Option<C>| {
        let prior = prior.ok_or(Error::EmptyPipeline)?;
        let pk = ctx.get::<String>(&key)?;
        Ok(prior.filter_pk(pk))
    })
}

/// Records the collection's count under `"count"` in the meta map at
/// `meta_key`, keeping whatever else the map already holds. Place it before
/// pagination so the count covers every page.
pub fn count_meta_filterer<C: Collection>(meta_key: &str) -> Filterer<C> {
    let key = meta_key.to_owned();
    Arc::new(move |ctx: &mut Context, prior: Option<C>| {
        let prior = prior.ok_or(Error::EmptyPipeline)?;
        let mut meta = ctx.find::<Map<String, Value>>(&key).cloned().unwrap_or_default();
        meta.insert("count".to_owned(), Value::from(prior.count()?));
        ctx.insert(key.as_str(), meta)?;
        Ok(prior)
    })
}

/// [`Pagination::default`] as a filterer.
pub fn limit_offset_filterer<C: Collection>() -> Filterer<C> {
    Pagination::default().filterer()
}

// ── Pagination ────────────────────────────────────────────────────────────────

/// Offset/limit pagination from query parameters.
///
/// Missing, non-numeric or negative values fall back to the defaults; the
/// limit is clamped to `max_limit`.
///
/// ```rust
/// use plait::crud::Pagination;
/// use plait::{Method, Request};
///
/// let paging = Pagination::default();
/// let req = Request::new(Method::Get, "/books?limit=9000&offset=x");
/// assert_eq!(paging.window(&req), (0, 500));
/// ```
#[derive(Clone, Debug)]
pub struct Pagination {
    pub limit_key: String,
    pub offset_key: String,
    pub default_limit: usize,
    pub max_limit: usize,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit_key: "limit".to_owned(),
            offset_key: "offset".to_owned(),
            default_limit: 10,
            max_limit: 500,
        }
    }
}

impl Pagination {
    /// `(offset, limit)` for one request.
    pub fn window(&self, req: &Request) -> (usize, usize) {
        let read = |key: &str, default: usize| {
            req.query(key)
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(default)
        };
        let limit = read(&self.limit_key, self.default_limit).min(self.max_limit);
        let offset = read(&self.offset_key, 0);
        (offset, limit)
    }

    /// A filterer slicing the prior collection to this request's window.
    /// The slice is lazy; nothing is evaluated here.
    pub fn filterer<C: Collection>(self) -> Filterer<C> {
        Arc::new(move |ctx: &mut Context, prior: Option<C>| {
            let prior = prior.ok_or(Error::EmptyPipeline)?;
            let (offset, limit) = self.window(ctx.require_request()?);
            Ok(prior.slice(offset, limit))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use proptest::prelude::*;

    use super::*;
    use crate::context::{Data, META_KEY, enter_context};
    use crate::crud::{Keyed, Records};
    use crate::method::Method;
    use crate::request::Request;

    #[derive(Clone, Debug, PartialEq)]
    struct Row(u32);

    impl Keyed for Row {
        fn pk(&self) -> String {
            self.0.to_string()
        }
    }

    fn ctx(target: &str) -> Context {
        enter_context(&Data::new()).set_request(Request::new(Method::Get, target))
    }

    fn page(target: &str, rows: Vec<Row>) -> Vec<Row> {
        let mut ctx = ctx(target);
        limit_offset_filterer()(&mut ctx, Some(Records::new(rows))).unwrap().items().unwrap()
    }

    #[test]
    fn limit_and_offset_select_single_items() {
        let rows = vec![Row(0), Row(1)];
        assert_eq!(page("/?limit=1&offset=0", rows.clone()), [Row(0)]);
        assert_eq!(page("/?limit=1&offset=1", rows), [Row(1)]);
    }

    #[test]
    fn defaults_apply_to_garbage_and_absence() {
        let rows: Vec<Row> = (0..30).map(Row).collect();
        assert_eq!(page("/?limit=abc&offset=-4", rows.clone()).len(), 10);
        assert_eq!(page("/", rows.clone())[0], Row(0));
        assert_eq!(page("/?offset=25", rows).len(), 5);
    }

    #[test]
    fn limit_is_capped() {
        let rows: Vec<Row> = (0..600).map(Row).collect();
        assert_eq!(page("/?limit=501", rows).len(), 500);
    }

    #[test]
    fn repeated_keys_use_the_last_value() {
        let paging = Pagination::default();
        assert_eq!(paging.window(&Request::new(Method::Get, "/?limit=1&limit=2")), (0, 2));
        assert_eq!(paging.window(&Request::new(Method::Get, "/?offset=3&offset=x")), (0, 10));
    }

    #[test]
    fn custom_keys_and_bounds() {
        let paging = Pagination { limit_key: "size".into(), offset_key: "from".into(), default_limit: 2, max_limit: 3 };
        assert_eq!(paging.window(&Request::new(Method::Get, "/?size=9&from=4")), (4, 3));
        assert_eq!(paging.window(&Request::new(Method::Get, "/?limit=1")), (0, 2));
    }

    #[test]
    fn pagination_does_not_evaluate_the_collection() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let rows = Records::new((0..100).map(Row).collect::<Vec<_>>())
            .filter(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                true
            });
        let mut ctx = ctx("/?limit=2&offset=3");
        let sliced = limit_offset_filterer()(&mut ctx, Some(rows)).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 0);

        assert_eq!(sliced.items().unwrap(), [Row(3), Row(4)]);
        assert_eq!(seen.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn pagination_needs_a_request() {
        let mut ctx = enter_context(&Data::new());
        let result = limit_offset_filterer()(&mut ctx, Some(Records::new(vec![Row(1)])));
        assert!(matches!(result, Err(Error::MissingRequest)));
    }

    #[test]
    fn count_meta_records_the_pre_slice_count() {
        let mut ctx = ctx("/?limit=1");
        let mut meta = Map::new();
        meta.insert("page".into(), Value::from(1));
        ctx.insert(META_KEY, meta).unwrap();

        let rows = Records::new((0..7).map(Row).collect::<Vec<_>>());
        let counted = count_meta_filterer(META_KEY)(&mut ctx, Some(rows)).unwrap();
        let sliced = limit_offset_filterer()(&mut ctx, Some(counted)).unwrap();

        let meta = ctx.get::<Map<String, Value>>(META_KEY).unwrap();
        assert_eq!(meta["count"], 7);
        assert_eq!(meta["page"], 1);
        assert_eq!(sliced.items().unwrap().len(), 1);
    }

    #[test]
    fn pk_filterer_reads_the_context_key() {
        let mut ctx = enter_context(&Data::new().with("pk", "4".to_owned()));
        let rows = Records::new((0..7).map(Row).collect::<Vec<_>>());
        let found = pk_filterer("pk")(&mut ctx, Some(rows)).unwrap();
        assert_eq!(found.items().unwrap(), [Row(4)]);
    }

    #[test]
    fn non_source_filterers_need_a_prior_collection() {
        let mut ctx = ctx("/");
        assert!(matches!(pk_filterer::<Records<Row>>("pk")(&mut ctx, None), Err(Error::EmptyPipeline)));
    }

    proptest! {
        #[test]
        fn window_is_always_within_bounds(limit in any::<i64>(), offset in any::<i64>(), len in 0usize..1200) {
            let rows: Vec<Row> = (0..len as u32).map(Row).collect();
            let got = page(&format!("/?limit={limit}&offset={offset}"), rows);
            let expected_offset = usize::try_from(offset).unwrap_or(0);
            let expected_limit = usize::try_from(limit).map(|l| l.min(500)).unwrap_or(10);
            let expected = len.saturating_sub(expected_offset).min(expected_limit);
            prop_assert_eq!(got.len(), expected);
            if let Some(first) = got.first() {
                prop_assert_eq!(first.0 as usize, expected_offset);
            }
        }
    }
}
