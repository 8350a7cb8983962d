//! Process configuration read from the environment by the server binaries.

use medsim_core::{CoreConfig, LlmSettings};
use std::path::PathBuf;

pub const CONVERSATIONS_DIR_VAR: &str = "CONVERSATIONS_DIR";
pub const EVALUATORS_DIR_VAR: &str = "EVALUATORS_DIR";

fn non_blank(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

/// Storage roots from `CONVERSATIONS_DIR` / `EVALUATORS_DIR`, relative defaults otherwise.
pub fn config_from_env() -> CoreConfig {
    CoreConfig::from_overrides(
        non_blank(CONVERSATIONS_DIR_VAR).map(PathBuf::from),
        non_blank(EVALUATORS_DIR_VAR).map(PathBuf::from),
    )
}

pub fn llm_settings_from_env() -> LlmSettings {
    LlmSettings {
        model: non_blank(LlmSettings::MODEL_VAR),
        base_url: non_blank(LlmSettings::BASE_URL_VAR),
        api_key: non_blank(LlmSettings::API_KEY_VAR),
    }
}

/// Log where data lives and how the chat service is configured. The API key itself is never
/// logged.
pub fn log_startup_summary(cfg: &CoreConfig, llm: &LlmSettings) {
    tracing::info!("conversations dir: {}", cfg.conversations_dir().display());
    tracing::info!("evaluators dir: {}", cfg.evaluators_dir().display());
    tracing::info!(
        "chat model: {}",
        llm.model.as_deref().unwrap_or("<not set>")
    );
    tracing::info!(
        "chat base url: {}",
        llm.base_url.as_deref().unwrap_or("<not set>")
    );
    tracing::info!(
        "chat api key: {}",
        if llm.api_key.is_some() { "set" } else { "not set" }
    );

    let missing = llm.missing();
    if !missing.is_empty() {
        tracing::error!(
            "missing chat settings: {}; chat replies will be placeholders",
            missing.join(", ")
        );
    }
}
