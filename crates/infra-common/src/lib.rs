//! # Warden Infra-Common
//!
//! Shared plumbing for the Warden crates: `tracing` subscriber setup and
//! layered configuration loading (file + environment).

pub mod config;
pub mod errors;
pub mod logging;

pub use errors::types::{Error, Result};
