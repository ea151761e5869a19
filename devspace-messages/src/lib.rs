//! devspace-messages
//!
//! Centralized operator-facing text for workspace provisioning.
//! Provides the message templates shown in alerts, step logs and CLI
//! output, plus the builder used to fill in their `{variable}` slots.

pub mod builder;
pub mod macros;
pub mod messages;

pub use builder::MessageBuilder;
pub use messages::MESSAGES;
