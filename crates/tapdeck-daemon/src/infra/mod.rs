//! Infrastructure adapters
//!
//! Registry persistence, the media backend, hardware drivers and host
//! side effects.

pub mod feedback;
pub mod hardware;
pub mod mopidy;
pub mod playback;
pub mod registry;
