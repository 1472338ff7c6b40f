use crate::{serve::ObjectFilterCtx, Error};
use bytes::Bytes;
use edgehub_filter_core::{Decision, DynamicObject};
use serde::Deserialize;
use serde_json::{Map, Value};

/// Filters the items of a list response body.
///
/// All other fields of the list, including its `metadata`, are preserved. If every item is kept,
/// the original body is returned unchanged.
pub(crate) fn filter_list(ctx: &ObjectFilterCtx<'_>, body: Bytes) -> Result<Bytes, Error> {
    let mut list = serde_json::from_slice::<Map<String, Value>>(&body)
        .map_err(|source| Error::Decode { what: "list", source })?;

    let items = match list.get_mut("items") {
        Some(Value::Array(items)) => std::mem::take(items),
        Some(Value::Null) | None => return Ok(body),
        Some(_) => return Err(Error::Malformed("list items")),
    };

    let total = items.len();
    let mut changed = false;
    let mut kept = Vec::with_capacity(total);
    for item in items {
        let obj = DynamicObject::deserialize(&item)
            .map_err(|source| Error::Decode { what: "list item", source })?;
        match ctx.decide(&obj)? {
            Decision::Keep => kept.push(item),
            Decision::Replace(obj) => {
                changed = true;
                kept.push(serde_json::to_value(&obj).map_err(Error::Encode)?);
            }
            Decision::Drop => changed = true,
        }
    }

    tracing::debug!(total, kept = kept.len(), "Filtered list");
    if !changed {
        return Ok(body);
    }

    list.insert("items".to_string(), Value::Array(kept));
    serde_json::to_vec(&list)
        .map(Bytes::from)
        .map_err(Error::Encode)
}
