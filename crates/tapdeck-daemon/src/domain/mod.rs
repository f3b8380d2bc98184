//! Tapdeck domain logic
//!
//! Debouncing, action execution and dispatch of hardware triggers.

pub mod debounce;
pub mod dispatch;
pub mod execute;
pub mod latest;
