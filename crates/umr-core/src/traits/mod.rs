//! Traits defined in `umr-core` and implemented by the host or by plugins.

pub mod report;
pub mod validation;

pub use report::ReportGenerator;
pub use validation::{RuleViolation, Severity, ValidationEngine, ValidationRule};
