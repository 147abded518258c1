//! CLI command definitions and dispatch.

pub mod config;
pub mod hook;
pub mod plugin;

use clap::{Parser, Subcommand};

use umr_core::config::AppConfig;
use umr_core::error::AppError;
use umr_plugin::PluginManager;

use crate::output::OutputFormat;

/// UMR plugin runtime tools
#[derive(Debug, Parser)]
#[command(name = "umr", version, about, long_about = None)]
pub struct Cli {
    /// Path to the base configuration file (extension optional)
    #[arg(short, long, default_value = "config/default")]
    pub config: String,

    /// Environment overlay loaded from `config/<env>`
    #[arg(short, long, env = "UMR_ENV", default_value = "development")]
    pub env: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Plugin discovery and validation
    Plugin(plugin::PluginArgs),
    /// Hook dispatch
    Hook(hook::HookArgs),
    /// Configuration management
    Config(config::ConfigArgs),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<(), AppError> {
        match &self.command {
            Commands::Plugin(args) => plugin::execute(args, self).await,
            Commands::Hook(args) => hook::execute(args, self).await,
            Commands::Config(args) => config::execute(args, self).await,
        }
    }

    /// Load configuration from the selected file and environment
    pub fn load_config(&self) -> Result<AppConfig, AppError> {
        AppConfig::load(&self.config, &self.env)
    }
}

/// Helper: create a plugin manager with the built-in plugin factories
pub fn build_manager(config: &AppConfig) -> PluginManager {
    tracing::debug!(
        plugin_dirs = ?config.plugins.plugin_dirs,
        auto_activate = config.plugins.auto_activate,
        "Building plugin manager"
    );
    let manager = PluginManager::new(config.plugins.clone());
    plugin_no_eval::register(&manager);
    manager
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    use umr_plugin::PluginStatus;

    #[tokio::test]
    async fn test_manager_knows_the_bundled_plugin() {
        let manager = build_manager(&AppConfig::default());
        let bundled = Path::new(env!("CARGO_MANIFEST_DIR")).join("../plugin-no-eval");

        let id = manager.load_plugin(&bundled).await.unwrap();
        manager.activate_plugin(&id).await.unwrap();
        assert_eq!(manager.registry().status(&id).await, Some(PluginStatus::Active));
        manager.unload_all().await;
    }
}
