//! In-memory lazy collection.

use std::fmt;
use std::sync::Arc;

use crate::error::Error;

use super::{Collection, Lookup};

/// Types with a primary key, for [`Lookup::filter_pk`].
pub trait Keyed {
    fn pk(&self) -> String;
}

type Predicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

enum Op<T> {
    Filter(Predicate<T>),
    Window { offset: usize, limit: usize },
}

impl<T> Clone for Op<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Filter(p) => Self::Filter(Arc::clone(p)),
            Self::Window { offset, limit } => Self::Window { offset: *offset, limit: *limit },
        }
    }
}

/// A [`Collection`] over shared rows.
///
/// Filters and slices are recorded, not applied; the rows are only walked
/// by `count`, `first` and `items`, and then only as far as needed. Rows
/// are shared between clones, so building a `Records` per request is cheap.
///
/// ```rust
/// use plait::crud::{Collection, Records};
///
/// let evens = Records::new((0..10).collect::<Vec<u32>>())
///     .filter(|n| n % 2 == 0)
///     .slice(1, 2);
/// assert_eq!(evens.items().unwrap(), [2, 4]);
/// ```
pub struct Records<T> {
    rows: Arc<[T]>,
    ops: Vec<Op<T>>,
}

impl<T> Records<T> {
    pub fn new(rows: impl Into<Arc<[T]>>) -> Self {
        Self { rows: rows.into(), ops: Vec::new() }
    }

    /// Keeps only rows matching `predicate`.
    pub fn filter<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.ops.push(Op::Filter(Arc::new(predicate)));
        self
    }

    fn iter(&self) -> Box<dyn Iterator<Item = &T> + '_> {
        self.ops.iter().fold(Box::new(self.rows.iter()), |rows, op| match op {
            Op::Filter(predicate) => {
                let predicate = Arc::clone(predicate);
                Box::new(rows.filter(move |row| predicate(row)))
            }
            Op::Window { offset, limit } => Box::new(rows.skip(*offset).take(*limit)),
        })
    }
}

impl<T> Clone for Records<T> {
    fn clone(&self) -> Self {
        Self { rows: Arc::clone(&self.rows), ops: self.ops.clone() }
    }
}

impl<T> fmt::Debug for Records<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Records")
            .field("rows", &self.rows.len())
            .field("ops", &self.ops.len())
            .finish()
    }
}

impl<T> Collection for Records<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Item = T;

    fn count(&self) -> Result<usize, Error> {
        Ok(self.iter().count())
    }

    fn slice(mut self, offset: usize, limit: usize) -> Self {
        self.ops.push(Op::Window { offset, limit });
        self
    }

    fn first(self) -> Result<Option<T>, Error> {
        Ok(self.iter().next().cloned())
    }

    fn items(self) -> Result<Vec<T>, Error> {
        Ok(self.iter().cloned().collect())
    }
}

impl<T> Lookup for Records<T>
where
    T: Keyed + Clone + Send + Sync + 'static,
{
    fn filter_pk(self, pk: &str) -> Self {
        let pk = pk.to_owned();
        self.filter(move |row| row.pk() == pk)
    }
}
