// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Explicit handler registry.
//!
//! An `EventFactory` is built once at process start and handed to every
//! component that needs it. Corelet workers run the same registration code as
//! the parent process, so a handler can be resolved on either side of a pipe
//! either by event type or by its stable [`HandlerLocation`] key.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::event::{HandlerLocation, SHUTDOWN_EVENT_TYPE};
use crate::errors::RegistrationError;
use crate::traits::EventHandler;

type HandlerConstructor = Arc<dyn Fn() -> Arc<dyn EventHandler> + Send + Sync>;

/// Metadata describing where a registered handler lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HandlerMeta {
    pub module_path: String,
    pub class_name: String,
    pub event_type: String,
}

impl HandlerMeta {
    pub fn location(&self) -> HandlerLocation {
        HandlerLocation::new(self.module_path.clone(), self.class_name.clone())
    }
}

#[derive(Clone)]
struct Registration {
    meta: HandlerMeta,
    constructor: HandlerConstructor,
}

#[derive(Default)]
pub struct EventFactory {
    by_type: RwLock<HashMap<String, Registration>>,
    by_location: RwLock<HashMap<String, Registration>>,
}

impl EventFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `H` (constructed through `Default`) as the handler for `event_type`.
    pub fn register_event_type<H>(&self, event_type: &str) -> Result<HandlerMeta, RegistrationError>
    where
        H: EventHandler + Default + 'static,
    {
        self.register_event_type_with(event_type, H::default)
    }

    /// Register a constructor closure as the handler factory for `event_type`.
    ///
    /// Re-registering a type replaces the previous handler.
    pub fn register_event_type_with<H, F>(
        &self,
        event_type: &str,
        constructor: F,
    ) -> Result<HandlerMeta, RegistrationError>
    where
        H: EventHandler + 'static,
        F: Fn() -> H + Send + Sync + 'static,
    {
        let event_type = event_type.trim();
        if event_type.is_empty() {
            return Err(RegistrationError::EmptyTypeName);
        }
        if event_type == SHUTDOWN_EVENT_TYPE {
            return Err(RegistrationError::ReservedType(event_type.to_string()));
        }

        let (module_path, class_name) = split_type_name(std::any::type_name::<H>());
        let meta = HandlerMeta {
            module_path,
            class_name,
            event_type: event_type.to_string(),
        };
        let registration = Registration {
            meta: meta.clone(),
            constructor: Arc::new(move || Arc::new(constructor()) as Arc<dyn EventHandler>),
        };

        self.by_location
            .write()
            .insert(meta.location().key(), registration.clone());
        self.by_type.write().insert(meta.event_type.clone(), registration);
        Ok(meta)
    }

    /// Bind `event_type` to the handler registered at `location`, so later
    /// lookups by type resolve directly.
    pub fn register_alias(
        &self,
        event_type: &str,
        location: &HandlerLocation,
    ) -> Result<HandlerMeta, RegistrationError> {
        if event_type.trim().is_empty() {
            return Err(RegistrationError::EmptyTypeName);
        }
        let key = location.key();
        let mut registration = self
            .by_location
            .read()
            .get(&key)
            .cloned()
            .ok_or(RegistrationError::UnknownLocation(key))?;
        registration.meta.event_type = event_type.to_string();
        let meta = registration.meta.clone();
        self.by_type.write().insert(event_type.to_string(), registration);
        Ok(meta)
    }

    pub fn create_handler(&self, event_type: &str) -> Result<Arc<dyn EventHandler>, RegistrationError> {
        let by_type = self.by_type.read();
        let registration = by_type
            .get(event_type)
            .ok_or_else(|| RegistrationError::UnknownEventType(event_type.to_string()))?;
        Ok((registration.constructor)())
    }

    pub fn create_handler_by_location(
        &self,
        location: &HandlerLocation,
    ) -> Result<Arc<dyn EventHandler>, RegistrationError> {
        let key = location.key();
        let by_location = self.by_location.read();
        let registration = by_location
            .get(&key)
            .ok_or(RegistrationError::UnknownLocation(key.clone()))?;
        Ok((registration.constructor)())
    }

    pub fn is_handler_available(&self, event_type: &str) -> bool {
        self.by_type.read().contains_key(event_type)
    }

    pub fn get_handler_meta(&self, event_type: &str) -> Result<HandlerMeta, RegistrationError> {
        self.by_type
            .read()
            .get(event_type)
            .map(|registration| registration.meta.clone())
            .ok_or_else(|| RegistrationError::UnknownEventType(event_type.to_string()))
    }

    /// Registered event types, sorted.
    pub fn event_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.by_type.read().keys().cloned().collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.by_type.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for EventFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventFactory")
            .field("event_types", &self.event_types())
            .finish()
    }
}

/// Split `a::b::Type<c::D>` into (`a::b`, `Type<c::D>`).
fn split_type_name(full: &str) -> (String, String) {
    let generic_start = full.find('<').unwrap_or(full.len());
    match full[..generic_start].rfind("::") {
        Some(split) => (full[..split].to_string(), full[split + 2..].to_string()),
        None => (String::new(), full.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::HandlerError;
    use crate::events::{Event, EventContext};
    use async_trait::async_trait;
    use serde_json::{json, Value};

    #[derive(Default)]
    struct Greeter;

    #[async_trait]
    impl EventHandler for Greeter {
        async fn handle(&self, event: &Event, _ctx: &EventContext) -> Result<Value, HandlerError> {
            Ok(json!({"hello": event.payload()}))
        }

        fn name(&self) -> &'static str {
            "greeter"
        }
    }

    struct Prefixer {
        prefix: String,
    }

    #[async_trait]
    impl EventHandler for Prefixer {
        async fn handle(&self, event: &Event, _ctx: &EventContext) -> Result<Value, HandlerError> {
            Ok(json!(format!("{}{}", self.prefix, event.payload())))
        }

        fn name(&self) -> &'static str {
            "prefixer"
        }
    }

    #[test]
    fn meta_points_at_the_handler_type() {
        let factory = EventFactory::new();
        factory.register_event_type::<Greeter>("greet").unwrap();

        let meta = factory.get_handler_meta("greet").unwrap();
        assert_eq!(meta.class_name, "Greeter");
        assert_eq!(meta.module_path, module_path!());
        assert_eq!(meta.event_type, "greet");
        assert!(factory.is_handler_available("greet"));
    }

    #[test]
    fn closures_register_with_their_handler_type() {
        let factory = EventFactory::new();
        factory
            .register_event_type_with("prefix", || Prefixer { prefix: ">".into() })
            .unwrap();

        assert_eq!(factory.get_handler_meta("prefix").unwrap().class_name, "Prefixer");
        assert!(factory.create_handler("prefix").is_ok());
        assert_eq!(factory.event_types(), vec!["prefix".to_string()]);
    }

    #[test]
    fn unknown_and_invalid_types_are_rejected() {
        let factory = EventFactory::new();
        assert_eq!(
            factory.create_handler("missing").err(),
            Some(RegistrationError::UnknownEventType("missing".into()))
        );
        assert_eq!(
            factory.register_event_type::<Greeter>(" ").err(),
            Some(RegistrationError::EmptyTypeName)
        );
        assert_eq!(
            factory.register_event_type::<Greeter>(SHUTDOWN_EVENT_TYPE).err(),
            Some(RegistrationError::ReservedType(SHUTDOWN_EVENT_TYPE.into()))
        );
        assert!(factory.is_empty());
    }

    #[tokio::test]
    async fn handlers_resolve_by_location_and_alias() {
        let factory = EventFactory::new();
        let meta = factory.register_event_type::<Greeter>("greet").unwrap();
        let location = meta.location();

        let handler = factory.create_handler_by_location(&location).unwrap();
        let event = Event::new("greet", crate::events::ExecutionMode::Thread, json!("bob"));
        let out = handler.handle(&event, &EventContext::new("test")).await.unwrap();
        assert_eq!(out, json!({"hello": "bob"}));

        assert!(!factory.is_handler_available("salute"));
        factory.register_alias("salute", &location).unwrap();
        assert!(factory.is_handler_available("salute"));
        assert_eq!(factory.get_handler_meta("salute").unwrap().class_name, "Greeter");

        let missing = HandlerLocation::new("nowhere", "Ghost");
        assert_eq!(
            factory.register_alias("ghost", &missing).err(),
            Some(RegistrationError::UnknownLocation("nowhere::Ghost".into()))
        );
    }

    #[test]
    fn type_names_split_at_the_last_path_segment() {
        assert_eq!(
            split_type_name("app::handlers::Resize"),
            ("app::handlers".to_string(), "Resize".to_string())
        );
        assert_eq!(
            split_type_name("app::Wrap<core::Inner>"),
            ("app".to_string(), "Wrap<core::Inner>".to_string())
        );
        assert_eq!(split_type_name("Bare"), (String::new(), "Bare".to_string()));
    }
}
