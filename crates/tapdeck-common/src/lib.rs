//! # Tapdeck Common
//!
//! Shared types and errors for binding physical tags and buttons to media
//! control actions.
//!
//! ## Core Types
//!
//! - [`TagUid`]: normalised hexadecimal tag identifier
//! - [`ActionKind`]: the closed set of executable commands
//! - [`Action`]: an action kind with its validated parameter
//! - [`Binding`] / [`BindingRecord`]: tag → action association and its persisted form
//! - [`LatestResult`]: outcome of the most recent scan

pub mod error;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{ExecutionError, ReadError, RegistryError, Result, TapdeckError, ValidationError};
pub use types::{
    action::{Action, ActionKind, ActionRecord},
    binding::{Binding, BindingRecord, LatestResult},
    tag_uid::TagUid,
};

/// Tapdeck version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Debounce window for tag reads in milliseconds
pub const DEFAULT_TAG_DEBOUNCE_MS: u64 = 1000;

/// Debounce window for button edges in milliseconds
pub const DEFAULT_BUTTON_DEBOUNCE_MS: u64 = 250;
