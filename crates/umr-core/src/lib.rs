//! # umr-core
//!
//! Core crate for the UMR plugin runtime. Contains the unified error
//! system, configuration schemas, and the traits through which the
//! runtime talks to host collaborators (validation engine, report
//! generator) without depending on their internals.
//!
//! This crate has **no** internal dependencies on other UMR crates.

pub mod config;
pub mod error;
pub mod result;
pub mod traits;

pub use error::AppError;
pub use result::AppResult;
