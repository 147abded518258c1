//! Integration tests for the plugin lifecycle state machine.

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use async_trait::async_trait;

use umr_core::error::{AppError, ErrorKind};
use umr_core::result::AppResult;
use umr_core::traits::RuleViolation;
use umr_plugin::api::context::PluginContext;
use umr_plugin::manifest::PluginMetadata;
use umr_plugin::plugin::{Plugin, PluginCapabilities};
use umr_plugin::traits::FnRule;
use umr_plugin::{HookEvent, PluginEvent, PluginStatus};

use helpers::{TestHost, TestPlugin, tagger};

fn rule(id: &'static str) -> Arc<FnRule> {
    Arc::new(FnRule::new(id, "test rule", |_| Vec::<RuleViolation>::new()))
}

fn full_capabilities(rule_id: &'static str) -> PluginCapabilities {
    PluginCapabilities::new()
        .with_rule(rule(rule_id))
        .with_hook(HookEvent::ValidationBefore, 5, tagger("v"))
        .with_hook(HookEvent::ReportAfter, 1, tagger("r"))
}

#[tokio::test]
async fn test_round_trip_leaves_nothing_behind() {
    let host = TestHost::new();
    let plugin = TestPlugin::new("alpha").with_capabilities(full_capabilities("alpha-rule"));
    let dir = host.install(&plugin);
    let mut events = host.manager.subscribe();

    let id = host.manager.load_plugin(&dir).await.unwrap();
    assert_eq!(id, "alpha");
    assert_eq!(host.manager.registry().status("alpha").await, Some(PluginStatus::Loaded));

    host.manager.activate_plugin("alpha").await.unwrap();
    let snapshot = host.manager.get_plugin("alpha").await.unwrap();
    assert_eq!(snapshot.status, PluginStatus::Active);
    assert!(snapshot.activated_at.is_some());
    assert_eq!(host.manager.hook_registry().plugin_handler_count("alpha").await, 2);
    assert_eq!(host.manager.rules().owner_of("alpha-rule").await.as_deref(), Some("alpha"));

    host.manager.deactivate_plugin("alpha").await.unwrap();
    let snapshot = host.manager.get_plugin("alpha").await.unwrap();
    assert_eq!(snapshot.status, PluginStatus::Loaded);
    assert!(snapshot.activated_at.is_none());
    assert_eq!(host.manager.hook_registry().plugin_handler_count("alpha").await, 0);
    assert!(host.manager.rules().is_empty().await);

    host.manager.unload_plugin("alpha").await.unwrap();
    assert!(host.manager.get_plugin("alpha").await.is_none());
    assert!(host.manager.get_plugins().await.is_empty());

    assert_eq!(plugin.calls(), vec!["load", "activate", "deactivate", "unload"]);

    let mut names = Vec::new();
    while let Ok(event) = events.try_recv() {
        names.push(event.name());
    }
    assert_eq!(
        names,
        vec!["plugin:loaded", "plugin:activated", "plugin:deactivated", "plugin:unloaded"]
    );
}

#[tokio::test]
async fn test_state_mismatch_leaves_entry_unchanged() {
    let host = TestHost::new();
    let id = host.activate(&TestPlugin::new("beta")).await;
    let before = host.manager.get_plugin(&id).await.unwrap();

    let err = host.manager.activate_plugin(&id).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidState);
    let after = host.manager.get_plugin(&id).await.unwrap();
    assert_eq!(after.status, PluginStatus::Active);
    assert_eq!(after.activated_at, before.activated_at);

    host.manager.deactivate_plugin(&id).await.unwrap();
    let err = host.manager.deactivate_plugin(&id).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidState);
    assert_eq!(host.manager.registry().status(&id).await, Some(PluginStatus::Loaded));

    let err = host.manager.activate_plugin("missing").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
    let err = host.manager.unload_plugin("missing").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[tokio::test]
async fn test_failed_activation_rolls_back_capabilities() {
    let host = TestHost::new();
    let plugin = TestPlugin::new("gamma")
        .with_capabilities(full_capabilities("gamma-rule"))
        .failing_in("activate");
    let dir = host.install(&plugin);
    let mut events = host.manager.subscribe();

    host.manager.load_plugin(&dir).await.unwrap();
    let err = host.manager.activate_plugin("gamma").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Plugin);
    assert!(err.to_string().contains("activate exploded"));

    let snapshot = host.manager.get_plugin("gamma").await.unwrap();
    assert_eq!(snapshot.status, PluginStatus::Error);
    assert!(snapshot.error.unwrap().contains("activate exploded"));
    assert_eq!(host.manager.hook_registry().plugin_handler_count("gamma").await, 0);
    assert!(host.manager.rules().get("gamma-rule").await.is_none());

    let _loaded = events.recv().await.unwrap();
    let error = events.recv().await.unwrap();
    assert_eq!(
        error,
        PluginEvent::Error {
            plugin_id: "gamma".into(),
            error: err.to_string(),
        }
    );

    // Error is terminal until unload
    let err = host.manager.activate_plugin("gamma").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidState);
    host.manager.unload_plugin("gamma").await.unwrap();
    assert!(host.manager.get_plugin("gamma").await.is_none());
}

#[tokio::test]
async fn test_failed_deactivation_moves_to_error() {
    let host = TestHost::new();
    let plugin = TestPlugin::new("delta")
        .with_capabilities(full_capabilities("delta-rule"))
        .failing_in("deactivate");
    host.activate(&plugin).await;

    let err = host.manager.deactivate_plugin("delta").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Plugin);
    assert_eq!(host.manager.registry().status("delta").await, Some(PluginStatus::Error));
    assert_eq!(host.manager.hook_registry().plugin_handler_count("delta").await, 0);
    assert!(host.manager.rules().is_empty().await);
}

#[tokio::test]
async fn test_unload_deactivates_active_plugin() {
    let host = TestHost::new();
    let plugin = TestPlugin::new("eps").with_capabilities(full_capabilities("eps-rule"));
    host.activate(&plugin).await;

    host.manager.unload_plugin("eps").await.unwrap();
    assert_eq!(plugin.calls(), vec!["load", "activate", "deactivate", "unload"]);
    assert!(host.manager.hook_registry().registered_hooks().await.is_empty());
    assert!(host.manager.rules().is_empty().await);
}

#[tokio::test]
async fn test_failed_unload_keeps_entry_in_error() {
    let host = TestHost::new();
    let plugin = TestPlugin::new("zeta").failing_in("unload");
    let dir = host.install(&plugin);
    host.manager.load_plugin(&dir).await.unwrap();

    assert!(host.manager.unload_plugin("zeta").await.is_err());
    assert_eq!(host.manager.registry().status("zeta").await, Some(PluginStatus::Error));

    // A second attempt from the error state removes the plugin
    host.manager.unload_plugin("zeta").await.unwrap();
    assert!(host.manager.get_plugin("zeta").await.is_none());
}

#[tokio::test]
async fn test_load_failures_leave_no_entry() {
    let host = TestHost::new();

    let plugin = TestPlugin::new("eta").failing_in("load");
    let dir = host.install(&plugin);
    let err = host.manager.load_plugin(&dir).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Plugin);
    assert!(host.manager.get_plugin("eta").await.is_none());

    // Manifest present but no factory behind it
    let orphan = helpers::write_plugin_dir(host.root.path(), "orphan", "orphan");
    let err = host.manager.load_plugin(&orphan).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Plugin);

    // Not a plugin directory at all
    let empty = host.root.path().join("empty");
    std::fs::create_dir_all(&empty).unwrap();
    let err = host.manager.load_plugin(&empty).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);

    // Entry point missing
    let broken = helpers::write_plugin_dir(host.root.path(), "broken", "broken");
    std::fs::remove_file(broken.join("index.js")).unwrap();
    let err = host.manager.load_plugin(&broken).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
    assert!(err.message.contains("does not exist"));

    assert!(host.manager.get_plugins().await.is_empty());
}

/// Registers a rule and writes storage through its context in one callback.
#[derive(Debug, Clone)]
struct SelfRegistering {
    id: &'static str,
    stage: &'static str,
    fail: bool,
    outcomes: Arc<std::sync::Mutex<Vec<Result<(), ErrorKind>>>>,
}

impl SelfRegistering {
    fn new(id: &'static str, stage: &'static str, fail: bool) -> Self {
        Self {
            id,
            stage,
            fail,
            outcomes: Arc::default(),
        }
    }

    fn outcomes(&self) -> Vec<Result<(), ErrorKind>> {
        self.outcomes.lock().unwrap().clone()
    }

    async fn run(&self, stage: &'static str, ctx: &PluginContext) -> AppResult<()> {
        if stage != self.stage {
            return Ok(());
        }
        ctx.storage.set("seen", json!(stage));
        let outcome = ctx.api.register_rule(rule("no-eval")).await.map_err(|e| e.kind);
        self.outcomes.lock().unwrap().push(outcome);
        if self.fail {
            return Err(AppError::plugin(format!("{stage} exploded")));
        }
        Ok(())
    }
}

#[async_trait]
impl Plugin for SelfRegistering {
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata::new(self.id, self.id, "1.0.0")
    }

    async fn on_load(&self, ctx: &PluginContext) -> AppResult<()> {
        self.run("load", ctx).await
    }

    async fn on_activate(&self, ctx: &PluginContext) -> AppResult<()> {
        self.run("activate", ctx).await
    }
}

fn install_self_registering(host: &TestHost, plugin: &SelfRegistering) -> std::path::PathBuf {
    let dir = helpers::write_plugin_dir(host.root.path(), plugin.id, plugin.id);
    let template = plugin.clone();
    host.manager
        .register_factory(plugin.id, move || -> Arc<dyn Plugin> { Arc::new(template.clone()) });
    dir
}

#[tokio::test]
async fn test_rules_cannot_be_registered_while_loaded() {
    let host = TestHost::new();
    let early = SelfRegistering::new("early", "load", false);
    let dir = install_self_registering(&host, &early);

    host.manager.load_plugin(&dir).await.unwrap();
    assert_eq!(early.outcomes(), vec![Err(ErrorKind::InvalidState)]);
    assert_eq!(host.manager.registry().status("early").await, Some(PluginStatus::Loaded));
    assert!(host.manager.rules().is_empty().await);
}

#[tokio::test]
async fn test_failed_load_after_api_use_leaks_nothing() {
    let host = TestHost::new();
    let leaky = SelfRegistering::new("leaky", "load", true);
    let dir = install_self_registering(&host, &leaky);

    let err = host.manager.load_plugin(&dir).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Plugin);
    assert!(host.manager.get_plugin("leaky").await.is_none());
    assert!(host.manager.rules().owner_of("no-eval").await.is_none());
    assert!(host.manager.contexts().store().is_empty());

    // Another plugin can still claim the rule id
    let rule_x = TestPlugin::new("rule-x").with_capabilities(PluginCapabilities::new().with_rule(rule("no-eval")));
    host.activate(&rule_x).await;
    assert_eq!(host.manager.rules().owner_of("no-eval").await.as_deref(), Some("rule-x"));
}

#[tokio::test]
async fn test_rules_registered_on_activation_follow_the_lifecycle() {
    let host = TestHost::new();
    let plugin = SelfRegistering::new("dynamic", "activate", false);
    let dir = install_self_registering(&host, &plugin);

    host.manager.load_plugin(&dir).await.unwrap();
    host.manager.activate_plugin("dynamic").await.unwrap();
    assert_eq!(plugin.outcomes(), vec![Ok(())]);
    assert_eq!(host.manager.rules().owner_of("no-eval").await.as_deref(), Some("dynamic"));

    // Retracted on deactivation, and the facade is closed again
    host.manager.deactivate_plugin("dynamic").await.unwrap();
    assert!(host.manager.rules().is_empty().await);
    let ctx = host.context("dynamic").await;
    let err = ctx.api.register_rule(rule("late")).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidState);

    // A failing activation rolls back what it registered through the API
    let failing = SelfRegistering::new("failing", "activate", true);
    let dir = install_self_registering(&host, &failing);
    host.manager.load_plugin(&dir).await.unwrap();
    host.manager.activate_plugin("failing").await.unwrap_err();
    assert_eq!(failing.outcomes(), vec![Ok(())]);
    assert!(host.manager.rules().is_empty().await);
    let ctx = host.context("failing").await;
    assert!(ctx.api.register_rule(rule("late")).await.is_err());
}

#[tokio::test]
async fn test_namespace_separator_in_id_is_refused() {
    let host = TestHost::new();
    let a = host.install(&TestPlugin::new("a"));
    host.manager.load_plugin(&a).await.unwrap();
    let ctx_a = host.context("a").await;

    let nested = helpers::write_plugin_dir(host.root.path(), "a-b", "a:b");
    host.manager
        .register_factory("a:b", || -> Arc<dyn Plugin> { Arc::new(TestPlugin::new("a:b")) });
    let err = host.manager.load_plugin(&nested).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
    assert!(err.message.contains("Invalid plugin id"));
    assert!(host.manager.get_plugin("a:b").await.is_none());

    ctx_a.storage.set("k", json!("a's value"));
    assert_eq!(ctx_a.storage.keys(), vec!["k"]);

    let discovered = host.manager.discover_plugins().await;
    let nested = discovered
        .plugins
        .iter()
        .find(|p| p.metadata.id == "a:b")
        .unwrap();
    assert!(!nested.valid);
}

#[tokio::test]
async fn test_instance_must_match_manifest() {
    let host = TestHost::new();
    let dir = helpers::write_plugin_dir(host.root.path(), "theta", "theta");
    let impostor = TestPlugin::new("someone-else");
    host.manager
        .register_factory("theta", move || -> Arc<dyn umr_plugin::Plugin> { Arc::new(impostor.clone()) });

    let err = host.manager.load_plugin(&dir).await.unwrap_err();
    assert!(err.message.contains("Invalid plugin structure"));
    assert!(host.manager.get_plugins().await.is_empty());
}

#[tokio::test]
async fn test_reload_overwrites_previous_entry() {
    let host = TestHost::new();
    let plugin = TestPlugin::new("iota").with_capabilities(full_capabilities("iota-rule"));
    let dir = host.install(&plugin);

    host.manager.load_plugin(&dir).await.unwrap();
    host.manager.activate_plugin("iota").await.unwrap();
    host.context("iota").await.storage.set("counter", json!(1));

    host.manager.load_plugin(&dir).await.unwrap();

    let plugins = host.manager.get_plugins().await;
    assert_eq!(plugins.len(), 1);
    assert_eq!(plugins[0].status, PluginStatus::Loaded);
    assert_eq!(host.manager.hook_registry().plugin_handler_count("iota").await, 0);
    assert!(host.manager.rules().is_empty().await);
    assert_eq!(host.context("iota").await.storage.get("counter"), None);

    // The fresh entry activates normally
    host.manager.activate_plugin("iota").await.unwrap();
    assert_eq!(host.manager.hook_registry().plugin_handler_count("iota").await, 2);
}

#[tokio::test]
async fn test_hanging_callback_times_out() {
    let host = TestHost::with_config(|config| config.load_timeout_ms = 50);
    let plugin = TestPlugin::new("kappa").hanging_in("activate", Duration::from_secs(5));
    let dir = host.install(&plugin);
    host.manager.load_plugin(&dir).await.unwrap();

    let err = host.manager.activate_plugin("kappa").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Timeout);
    assert_eq!(host.manager.registry().status("kappa").await, Some(PluginStatus::Error));
}

#[tokio::test]
async fn test_concurrent_activation_is_serialized() {
    let host = TestHost::new();
    let plugin = TestPlugin::new("lambda").with_capabilities(full_capabilities("lambda-rule"));
    let dir = host.install(&plugin);
    host.manager.load_plugin(&dir).await.unwrap();

    let (a, b) = tokio::join!(
        host.manager.activate_plugin("lambda"),
        host.manager.activate_plugin("lambda")
    );
    assert!(a.is_ok() != b.is_ok());
    let err = a.err().or(b.err()).unwrap();
    assert_eq!(err.kind, ErrorKind::InvalidState);

    assert_eq!(plugin.calls().iter().filter(|c| *c == "activate").count(), 1);
    assert_eq!(host.manager.hook_registry().plugin_handler_count("lambda").await, 2);
}

#[tokio::test]
async fn test_initialize_and_unload_all() {
    let host = TestHost::with_config(|config| config.auto_activate = true);
    host.install(&TestPlugin::new("mu"));
    host.install(&TestPlugin::new("nu").failing_in("activate"));
    let bad = host.root.path().join("bad");
    std::fs::create_dir_all(&bad).unwrap();
    std::fs::write(bad.join("plugin.json"), r#"{"metadata": {"id": "bad"}}"#).unwrap();

    let summary = host.manager.initialize().await;
    assert_eq!(summary.discovered, 3);
    assert_eq!(summary.loaded, vec!["mu", "nu"]);
    assert_eq!(summary.activated, vec!["mu"]);
    assert_eq!(summary.failures.len(), 2);

    assert_eq!(host.manager.get_active_plugins().await.len(), 1);

    host.manager.unload_all().await;
    assert!(host.manager.get_plugins().await.is_empty());
}
