//! Hook system: registry, dispatcher, and the closed set of hook events.

pub mod definitions;
pub mod dispatcher;
pub mod registry;

pub use definitions::{HookEvent, HookOutcome};
pub use dispatcher::{DispatchResult, HookDispatcher};
pub use registry::{HookHandler, HookRegistration, HookRegistry};
