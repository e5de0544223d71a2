// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Value types that flow through the engine: events, results, the per-scope
//! execution context and the handler registry.

mod context;
mod event;
mod factory;
mod result;

pub use context::EventContext;
pub use event::{
    Event, EventId, ExecutionMode, HandlerLocation, SHUTDOWN_EVENT_TYPE, SHUTDOWN_PRIORITY,
};
pub use factory::{EventFactory, HandlerMeta};
pub use result::{EventResult, FailureKind};

/// Carries a `serde_json::Value` as JSON text in binary formats such as
/// bincode, which cannot encode self-describing values. Human-readable
/// formats get the value as-is.
pub(crate) mod json_text {
    use serde::de::Error as _;
    use serde::ser::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use serde_json::Value;

    pub fn serialize<S: Serializer>(value: &Value, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            return value.serialize(serializer);
        }
        let text = serde_json::to_string(value).map_err(S::Error::custom)?;
        serializer.serialize_str(&text)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Value, D::Error> {
        if deserializer.is_human_readable() {
            return Value::deserialize(deserializer);
        }
        let text = String::deserialize(deserializer)?;
        serde_json::from_str(&text).map_err(D::Error::custom)
    }
}
