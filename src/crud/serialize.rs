//! JSON serializers.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::context::Context;
use crate::response::ContentType;

use super::{Collection, Serialized, Serializer};

/// Serializes one instance as JSON.
pub fn json_serializer<T: Serialize + 'static>() -> Serializer<T> {
    Arc::new(|_ctx: &Context, instance: T| {
        Ok(Serialized {
            content_type: ContentType::Json.as_str().to_owned(),
            body: serde_json::to_vec(&instance)?,
        })
    })
}

/// Serializes a collection as a JSON array.
///
/// When a meta map is stored under `meta_key` (see
/// [`count_meta_filterer`](super::count_meta_filterer)), the array moves
/// under `"results"` next to the meta entries instead:
///
/// ```json
/// {"count": 42, "results": [...]}
/// ```
pub fn json_list_serializer<C>(meta_key: &str) -> Serializer<C>
where
    C: Collection,
    C::Item: Serialize,
{
    let key = meta_key.to_owned();
    Arc::new(move |ctx: &Context, instances: C| {
        let items = instances.items()?;
        let body = match ctx.find::<Map<String, Value>>(&key) {
            Some(meta) => {
                let mut page = meta.clone();
                page.insert("results".to_owned(), serde_json::to_value(&items)?);
                serde_json::to_vec(&page)?
            }
            None => serde_json::to_vec(&items)?,
        };
        Ok(Serialized { content_type: ContentType::Json.as_str().to_owned(), body })
    })
}
