//! # CLI Command Implementations

use kbase::api::{self, AppState};
use kbase::config::AppConfig;
use kbase_core::{KbError, KnowledgeBaseStore, PipelineStage};
use std::path::Path;
use std::sync::Arc;

fn to_json(value: &impl serde::Serialize) -> Result<String, KbError> {
    serde_json::to_string_pretty(value).map_err(|e| KbError::Config(e.to_string()))
}

/// Start the HTTP server.
pub async fn cmd_server(
    config_path: &Path,
    host: Option<String>,
    port: Option<u16>,
    namespace: Option<String>,
) -> Result<(), KbError> {
    let mut config = AppConfig::load(Some(config_path))?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let store = match namespace {
        Some(ns) => KnowledgeBaseStore::with_namespace(ns),
        None => KnowledgeBaseStore::new(),
    };
    tracing::info!(
        namespace = store.namespace(),
        addr = %config.server.addr(),
        "starting Knowledge Base server"
    );

    let state = AppState::new(Arc::new(store));
    for (capability, id) in config.pipeline.missing_operators(state.dispatcher.registry()) {
        tracing::warn!(
            %capability,
            operator = %id,
            "configured pipeline operator is not registered, pipeline runs will fail"
        );
    }

    api::run_server(&config, state).await
}

/// Print the effective configuration (file plus environment overrides).
pub fn cmd_config(config_path: &Path, json_mode: bool) -> Result<(), KbError> {
    let config = AppConfig::load(Some(config_path))?;
    let rendered = if json_mode {
        to_json(&config)?
    } else {
        config.to_toml()?
    };
    println!("{}", rendered);
    Ok(())
}

/// List the six pipeline stages in execution order.
pub fn cmd_stages(json_mode: bool) -> Result<(), KbError> {
    if json_mode {
        let stages: Vec<serde_json::Value> = PipelineStage::ALL
            .iter()
            .map(|stage| {
                serde_json::json!({
                    "index": stage.index(),
                    "name": stage.name(),
                    "terminal": stage.is_terminal(),
                })
            })
            .collect();
        println!("{}", to_json(&stages)?);
    } else {
        for stage in PipelineStage::ALL {
            println!("  {}", stage);
        }
    }
    Ok(())
}
