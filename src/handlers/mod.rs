// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Built-in handlers.
//!
//! The CLI registers all of them, and so does every corelet worker it
//! launches, so each type resolves identically on both sides of the pipe.

pub mod command;
pub mod echo;
pub mod fail;
pub mod sleep;
pub mod static_ok;

pub use command::CommandHandler;
pub use echo::EchoHandler;
pub use fail::FailHandler;
pub use sleep::SleepHandler;
pub use static_ok::{StaticOkHandler, WhoAmIHandler};

use crate::errors::RegistrationError;
use crate::events::EventFactory;

/// Event types registered by [`register_builtin_handlers`].
pub const BUILTIN_EVENT_TYPES: [&str; 6] = ["command", "echo", "fail", "ok", "sleep", "whoami"];

pub fn register_builtin_handlers(factory: &EventFactory) -> Result<(), RegistrationError> {
    factory.register_event_type::<CommandHandler>("command")?;
    factory.register_event_type::<EchoHandler>("echo")?;
    factory.register_event_type::<FailHandler>("fail")?;
    factory.register_event_type::<StaticOkHandler>("ok")?;
    factory.register_event_type::<SleepHandler>("sleep")?;
    factory.register_event_type::<WhoAmIHandler>("whoami")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registers_every_builtin_type() {
        let factory = EventFactory::new();
        register_builtin_handlers(&factory).unwrap();

        assert_eq!(factory.event_types(), BUILTIN_EVENT_TYPES.to_vec());
        let meta = factory.get_handler_meta("echo").unwrap();
        assert_eq!(meta.class_name, "EchoHandler");
        assert_eq!(meta.module_path, "the_corelet::handlers::echo");
    }
}
