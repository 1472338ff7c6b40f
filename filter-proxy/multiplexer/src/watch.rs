use crate::{metrics::Outcome, serve::ObjectFilterCtx, Error};
use ahash::AHashMap;
use bytes::Bytes;
use edgehub_filter_core::{Decision, DynamicObject};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::trace;

/// Filters the events of a single watch stream.
///
/// Tracks the last version of each object forwarded to the caller so that the caller's view of the
/// collection remains consistent as objects start and stop matching the filter.
#[derive(Debug, Default)]
pub(crate) struct WatchFilter {
    forwarded: AHashMap<ObjectKey, Value>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
struct ObjectKey {
    namespace: Option<String>,
    name: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
enum EventType {
    Added,
    Modified,
    Deleted,

    /// Bookmarks, errors, and any event types we don't know about are forwarded as-is.
    #[serde(other, skip_serializing)]
    Other,
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    event: EventType,
    #[serde(default)]
    object: Value,
}

#[derive(Serialize)]
struct Event<'a> {
    #[serde(rename = "type")]
    event: EventType,
    object: &'a Value,
}

// === impl WatchFilter ===

impl WatchFilter {
    /// Processes a single newline-terminated watch event, returning the frame, if any, that should
    /// be forwarded to the caller.
    pub(crate) fn on_frame(
        &mut self,
        ctx: &ObjectFilterCtx<'_>,
        frame: Bytes,
    ) -> Result<Option<Bytes>, Error> {
        let RawEvent { event, object } = serde_json::from_slice(&frame)
            .map_err(|source| Error::Decode { what: "watch event", source })?;
        if event == EventType::Other {
            return Ok(Some(frame));
        }

        let obj = DynamicObject::deserialize(&object)
            .map_err(|source| Error::Decode { what: "watch object", source })?;
        let key = ObjectKey {
            namespace: obj.metadata.namespace.clone(),
            name: obj.metadata.name.clone().unwrap_or_default(),
        };
        let resource_version = obj.metadata.resource_version.clone();
        let decision = ctx.decide(&obj)?;
        trace!(?event, ns = ?key.namespace, name = %key.name, ?decision);

        match (event, decision) {
            (EventType::Deleted, decision) => {
                let Some(last) = self.forwarded.remove(&key) else {
                    return Ok(None);
                };
                match decision {
                    Decision::Keep => Ok(Some(frame)),
                    Decision::Replace(obj) => encode(EventType::Deleted, &to_value(&obj)?).map(Some),
                    Decision::Drop => {
                        encode(EventType::Deleted, &with_version(last, resource_version)).map(Some)
                    }
                }
            }

            (_, Decision::Drop) => {
                let Some(last) = self.forwarded.remove(&key) else {
                    return Ok(None);
                };
                ctx.record(Outcome::SyntheticDelete);
                encode(EventType::Deleted, &with_version(last, resource_version)).map(Some)
            }

            (event, Decision::Keep) => {
                if event == EventType::Added || self.forwarded.contains_key(&key) {
                    self.forwarded.insert(key, object);
                    return Ok(Some(frame));
                }
                // The caller has never seen this object.
                let added = encode(EventType::Added, &object)?;
                self.forwarded.insert(key, object);
                Ok(Some(added))
            }

            (event, Decision::Replace(obj)) => {
                let object = to_value(&obj)?;
                let seen = self.forwarded.insert(key, object.clone()).is_some();
                let event = if seen { event } else { EventType::Added };
                encode(event, &object).map(Some)
            }
        }
    }
}

/// Returns the last forwarded version of an object, updated to the resource version at which it
/// stopped being visible.
fn with_version(mut last: Value, resource_version: Option<String>) -> Value {
    if let Some(rv) = resource_version {
        last["metadata"]["resourceVersion"] = Value::String(rv);
    }
    last
}

fn to_value(obj: &DynamicObject) -> Result<Value, Error> {
    serde_json::to_value(obj).map_err(Error::Encode)
}

fn encode(event: EventType, object: &Value) -> Result<Bytes, Error> {
    let mut buf = serde_json::to_vec(&Event { event, object }).map_err(Error::Encode)?;
    buf.push(b'\n');
    Ok(buf.into())
}
