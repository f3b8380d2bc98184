//! Core data types for Tapdeck

pub mod action;
pub mod binding;
pub mod tag_uid;
