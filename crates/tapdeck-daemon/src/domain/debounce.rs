//! Event debouncing
//!
//! Readers report a resting tag over and over, and switches bounce. A
//! [`Debouncer`] collapses those bursts: a read becomes a trigger only when
//! its identity differs from the previous read or more than the debounce
//! window has passed since that read. Every read moves the window, so a tag
//! resting on the reader triggers once no matter how long it stays.

use std::time::{Duration, Instant};

/// State of one input channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebounceState<T> {
    Idle,
    Settled { identity: T, last_read: Instant },
}

/// Per-channel debounce state machine
#[derive(Debug, Clone)]
pub struct Debouncer<T> {
    window: Duration,
    state: DebounceState<T>,
}

impl<T: PartialEq + Clone> Debouncer<T> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            state: DebounceState::Idle,
        }
    }

    pub fn state(&self) -> &DebounceState<T> {
        &self.state
    }

    /// Feed one raw read at `now`; returns true when it is a new trigger
    pub fn accept(&mut self, identity: &T, now: Instant) -> bool {
        let is_new = match &self.state {
            DebounceState::Idle => true,
            DebounceState::Settled {
                identity: previous,
                last_read,
            } => previous != identity || now.saturating_duration_since(*last_read) > self.window,
        };

        self.state = DebounceState::Settled {
            identity: identity.clone(),
            last_read: now,
        };
        is_new
    }

    /// Forget the settled identity
    pub fn reset(&mut self) {
        self.state = DebounceState::Idle;
    }
}
