//! Hook dispatch commands.

use clap::{Args, Subcommand};
use serde::Serialize;
use serde_json::{Value, json};
use tabled::Tabled;

use umr_core::error::AppError;
use umr_plugin::HookEvent;

use super::Cli;
use crate::output;

/// Arguments for hook commands
#[derive(Debug, Args)]
pub struct HookArgs {
    /// Hook subcommand
    #[command(subcommand)]
    pub command: HookCommand,
}

/// Hook subcommands
#[derive(Debug, Subcommand)]
pub enum HookCommand {
    /// List hook events and their registered handler counts
    Events,
    /// Activate all discovered plugins and dispatch one event
    Run {
        /// Event name, e.g. `validation:before`
        event: String,
        /// JSON payload
        #[arg(short, long, default_value = "{}")]
        data: String,
    },
}

/// Hook event row for table output
#[derive(Debug, Serialize, Tabled)]
struct EventRow {
    /// Event name
    event: String,
    /// Registered handlers
    handlers: usize,
}

/// Execute hook commands
pub async fn execute(args: &HookArgs, cli: &Cli) -> Result<(), AppError> {
    let mut config = cli.load_config()?;
    config.plugins.auto_load = true;
    config.plugins.auto_activate = true;

    let manager = super::build_manager(&config);
    let summary = manager.initialize().await;
    tracing::debug!(
        loaded = summary.loaded.len(),
        activated = summary.activated.len(),
        "Plugins initialized"
    );
    for failure in &summary.failures {
        output::print_warning(&format!("{}: {}", failure.path.display(), failure.error));
    }

    let outcome = match &args.command {
        HookCommand::Events => {
            let mut rows = Vec::with_capacity(HookEvent::ALL.len());
            for event in HookEvent::ALL {
                rows.push(EventRow {
                    event: event.to_string(),
                    handlers: manager.hook_registry().handler_count(event).await,
                });
            }
            output::print_list(&rows, cli.format);
            Ok(())
        }
        HookCommand::Run { event, data } => match parse_request(event, data) {
            Ok((event, payload)) => {
                tracing::info!(hook = %event, "Dispatching hook event");
                let result = manager.dispatch(event, payload).await;
                let failures: Vec<Value> = result
                    .failures
                    .iter()
                    .map(|f| json!({"plugin": f.plugin_id, "reason": f.reason}))
                    .collect();

                let report = json!({
                    "event": event.as_str(),
                    "data": result.data,
                    "executed": result.executed,
                    "stoppedBy": result.stopped_by,
                    "failures": failures,
                });
                output::print_json(&report);
                Ok(())
            }
            Err(e) => Err(e),
        },
    };

    manager.unload_all().await;
    outcome
}

fn parse_request(event: &str, data: &str) -> Result<(HookEvent, Value), AppError> {
    let event = event.parse::<HookEvent>()?;
    let payload = serde_json::from_str(data)
        .map_err(|e| AppError::validation(format!("Invalid JSON payload: {e}")))?;
    Ok((event, payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request() {
        let (event, payload) = parse_request("report:after", r#"{"lines": []}"#).unwrap();
        assert_eq!(event, HookEvent::ReportAfter);
        assert_eq!(payload, json!({"lines": []}));

        assert!(parse_request("report:sideways", "{}").is_err());
        assert!(parse_request("report:after", "{not json").is_err());
    }
}
