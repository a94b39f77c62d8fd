//! farmgate: cached system settings and rate-limited visitor registration
//! in front of a managed backend.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
