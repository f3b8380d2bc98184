//! # Tapdeck
//!
//! Binds RFID tags and push buttons to media playback actions.
//!
//! A tag reader worker and a button worker block on their hardware,
//! debounce what they read and dispatch each accepted trigger: registered
//! tags run their bound action against the playback backend, unknown tags
//! only play a failure cue. The binding table is persisted as JSON and
//! managed through a small REST API, which also serves the registration
//! web UI.
//!
//! ## Key Concepts
//!
//! - **Binding**: a tag uid associated with an action and its parameter
//! - **Registry**: the write-through, persisted uid → binding table
//! - **Debounce window**: how long a repeated identical read is ignored
//! - **Latest result**: the most recent accepted scan, for the API
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐   ┌───────────────┐        ┌──────────────────┐
//! │  Tag reader   │   │ Button source │        │     REST API     │
//! │    worker     │   │    worker     │        │ (TapdeckService) │
//! └───────┬───────┘   └───────┬───────┘        └────┬────────┬────┘
//!         │ Debouncer         │ Debouncer/pin       │        │
//! ┌───────┴───────────────────┴───────┐             │        │
//! │             Dispatcher            │─── publish ─┼─► LatestCell
//! └───────┬───────────────┬───────────┘             │
//!         │ lookup        │ execute                 │ register/unregister
//! ┌───────┴───────┐ ┌─────┴─────────────┐    ┌──────┴───────┐
//! │   Registry    │ │ Playback / System │    │   Registry   │
//! │ (JSON on disk)│ │ (Mopidy JSON-RPC) │    │  (same one)  │
//! └───────────────┘ └───────────────────┘    └──────────────┘
//! ```

pub mod api;
pub mod config;
pub mod domain;
pub mod infra;

pub use api::{router, TapdeckService};
pub use config::TapdeckConfig;
pub use domain::debounce::Debouncer;
pub use domain::dispatch::{run_button_worker, run_tag_worker, DispatchStats, Dispatcher};
pub use domain::execute::{execute, ActionContext};
pub use domain::latest::LatestCell;
pub use infra::feedback::{
    CommandFeedback, CommandSystemControl, FeedbackCue, FeedbackPlayer, SilentFeedback,
    SystemControl,
};
pub use infra::hardware::{ButtonEdge, ButtonSource, LineButtonSource, LineTagReader, TagReader};
pub use infra::mopidy::MopidyPlayback;
pub use infra::playback::{LibraryRef, Playback, PlaybackState, RefKind};
pub use infra::registry::{JsonFileSnapshot, MemorySnapshot, Registry, SnapshotStore};

pub use tapdeck_common::VERSION;
