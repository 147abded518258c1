//! Report generation collaborator trait.

use async_trait::async_trait;
use serde_json::Value;

use crate::result::AppResult;

/// Host report generator reachable through the plugin API facade.
#[async_trait]
pub trait ReportGenerator: Send + Sync {
    /// Renders `data` in the requested format (e.g. `"json"`, `"text"`).
    async fn generate(&self, data: &Value, format: &str) -> AppResult<String>;
}
