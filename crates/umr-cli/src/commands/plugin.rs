//! Plugin discovery and validation commands.

use std::path::PathBuf;

use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;

use umr_core::error::AppError;
use umr_plugin::manifest::load_manifest;
use umr_plugin::{PluginDiscovery, StructureValidator};

use super::Cli;
use crate::output::{self, OutputFormat};

/// Arguments for plugin commands
#[derive(Debug, Args)]
pub struct PluginArgs {
    /// Plugin subcommand
    #[command(subcommand)]
    pub command: PluginCommand,
}

/// Plugin subcommands
#[derive(Debug, Subcommand)]
pub enum PluginCommand {
    /// List plugins found in the configured (or given) directories
    Discover {
        /// Scan these roots instead of the configured ones
        #[arg(short, long)]
        dir: Vec<PathBuf>,
    },
    /// Validate a single plugin directory
    Validate {
        /// Plugin directory
        dir: PathBuf,
    },
    /// Load every discovered plugin and report the outcome
    Load {
        /// Also activate loaded plugins
        #[arg(short, long)]
        activate: bool,
    },
}

/// Discovered plugin row for table output
#[derive(Debug, Serialize, Tabled)]
struct PluginRow {
    /// Plugin id
    id: String,
    /// Version
    version: String,
    /// Validation result
    valid: bool,
    /// Structural security score
    score: u8,
    /// Directory
    path: String,
}

/// Loaded plugin row for table output
#[derive(Debug, Serialize, Tabled)]
struct StatusRow {
    /// Plugin id
    id: String,
    /// Lifecycle status
    status: String,
    /// Last error
    error: String,
}

/// Execute plugin commands
pub async fn execute(args: &PluginArgs, cli: &Cli) -> Result<(), AppError> {
    let config = cli.load_config()?;

    match &args.command {
        PluginCommand::Discover { dir } => {
            let discovery = if dir.is_empty() {
                PluginDiscovery::new(&config.plugins)
            } else {
                PluginDiscovery::with_roots(
                    dir.clone(),
                    StructureValidator::new(&config.plugins),
                    config.plugins.max_concurrency,
                )
            };
            let result = discovery.discover().await;

            let rows: Vec<PluginRow> = result
                .plugins
                .iter()
                .map(|p| PluginRow {
                    id: p.metadata.id.clone(),
                    version: p.metadata.version.clone(),
                    valid: p.valid,
                    score: p.security_score,
                    path: p.path.display().to_string(),
                })
                .collect();
            output::print_list(&rows, cli.format);

            for error in &result.errors {
                output::print_warning(&format!("{}: {}", error.path.display(), error.message));
            }
        }
        PluginCommand::Validate { dir } => {
            let loaded = load_manifest(dir)
                .await?
                .ok_or_else(|| AppError::validation(format!("No plugin manifest in '{}'", dir.display())))?;

            let report = StructureValidator::new(&config.plugins)
                .validate(dir, &loaded.manifest)
                .await;

            if cli.format == OutputFormat::Json {
                output::print_json(&report);
            } else {
                output::print_kv("Plugin", &loaded.manifest.metadata.id);
                output::print_kv("Manifest", &loaded.manifest_path.display().to_string());
                output::print_kv("Security score", &report.security.score.to_string());
                for warning in &report.warnings {
                    output::print_warning(warning);
                }
                for issue in &report.security.issues {
                    output::print_warning(issue);
                }
                for error in &report.errors {
                    output::print_error(error);
                }
            }

            report.into_result(dir)?;
            output::print_success(&format!("Plugin at '{}' is valid", dir.display()));
        }
        PluginCommand::Load { activate } => {
            let mut plugins = config.plugins.clone();
            plugins.auto_load = true;
            plugins.auto_activate = *activate;
            let config = umr_core::config::AppConfig { plugins, ..config };

            let manager = super::build_manager(&config);
            let summary = manager.initialize().await;

            let rows: Vec<StatusRow> = manager
                .get_plugins()
                .await
                .into_iter()
                .map(|p| StatusRow {
                    id: p.metadata.id,
                    status: p.status.to_string(),
                    error: p.error.unwrap_or_default(),
                })
                .collect();
            output::print_list(&rows, cli.format);

            for failure in &summary.failures {
                output::print_error(&format!("{}: {}", failure.path.display(), failure.error));
            }
            manager.unload_all().await;
        }
    }

    Ok(())
}
