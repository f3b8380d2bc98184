//! External surfaces: the query/mutation façade and its REST router

pub mod rest;
pub mod service;

pub use rest::router;
pub use service::TapdeckService;
