//! Configuration management CLI commands.

use clap::{Args, Subcommand};

use umr_core::error::AppError;

use super::Cli;
use crate::output;

/// Arguments for config commands
#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Config subcommand
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Config subcommands
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show,
    /// Validate configuration
    Validate,
    /// Generate a default configuration file
    Generate {
        /// Output file path
        #[arg(short, long, default_value = "config/generated.toml")]
        output: String,
    },
}

/// Execute config commands
pub async fn execute(args: &ConfigArgs, cli: &Cli) -> Result<(), AppError> {
    match &args.command {
        ConfigCommand::Show => {
            let config = cli.load_config()?;
            output::print_item(&config, cli.format);
        }
        ConfigCommand::Validate => match cli.load_config() {
            Ok(config) => {
                output::print_success(&format!("Configuration '{}' is valid", cli.config));
                let dirs: Vec<String> = config
                    .plugins
                    .plugin_dirs
                    .iter()
                    .map(|d| d.display().to_string())
                    .collect();
                output::print_kv("Plugin dirs", &dirs.join(", "));
                output::print_kv("Auto load", &config.plugins.auto_load.to_string());
                output::print_kv("Auto activate", &config.plugins.auto_activate.to_string());
                output::print_kv("Sandboxed", &config.plugins.security.sandboxed.to_string());
                output::print_kv("Log level", &config.logging.level);

                if config.plugins.allow_unsafe {
                    output::print_warning("Plugins requesting unrestricted permissions are accepted");
                }
            }
            Err(e) => {
                output::print_error(&format!("Configuration invalid: {e}"));
                return Err(e);
            }
        },
        ConfigCommand::Generate { output: out_path } => {
            let default_config = include_str!("../../../../config/default.toml");

            if let Some(parent) = std::path::Path::new(out_path).parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| AppError::internal(format!("Failed to create dir: {e}")))?;
            }

            tokio::fs::write(out_path, default_config)
                .await
                .map_err(|e| AppError::internal(format!("Failed to write config: {e}")))?;

            output::print_success(&format!("Default config written to '{out_path}'"));
        }
    }

    Ok(())
}
