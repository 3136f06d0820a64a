//! Shared types for the ChatGate crates: identities, messages, persisted
//! records, configuration, errors, and structured trace events.

pub mod config;
pub mod error;
pub mod identity;
pub mod message;
pub mod records;
pub mod trace;

pub use error::{Error, Result};
pub use identity::{Identity, IdentityKind, SubjectKey};
pub use message::{Message, Role};
