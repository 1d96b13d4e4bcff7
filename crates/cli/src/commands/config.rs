use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use compass_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |field: &str, env_vars: &[&str]| {
        field_source(field, env_vars, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line(
        "server.bind_address",
        &config.server.bind_address,
        source("server.bind_address", &["COMPASS_SERVER_BIND_ADDRESS"]),
    ));
    lines.push(render_line(
        "server.port",
        &config.server.port.to_string(),
        source("server.port", &["COMPASS_SERVER_PORT"]),
    ));
    lines.push(render_line(
        "llm.provider",
        config.llm.provider.as_str(),
        source("llm.provider", &["COMPASS_LLM_PROVIDER"]),
    ));
    lines.push(render_line(
        "llm.model",
        &config.llm.model,
        source("llm.model", &["COMPASS_LLM_MODEL"]),
    ));
    lines.push(render_line(
        "llm.base_url",
        config.llm.base_url.as_deref().unwrap_or("<unset>"),
        source("llm.base_url", &["COMPASS_LLM_BASE_URL"]),
    ));
    let llm_api_key = if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" };
    lines.push(render_line(
        "llm.api_key",
        llm_api_key,
        source("llm.api_key", &["COMPASS_LLM_API_KEY"]),
    ));
    lines.push(render_line(
        "llm.region",
        config.llm.region.as_deref().unwrap_or("<unset>"),
        source("llm.region", &["COMPASS_LLM_REGION"]),
    ));
    lines.push(render_line(
        "crew.definition_path",
        &config
            .crew
            .definition_path
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "<embedded default>".to_string()),
        source("crew.definition_path", &["COMPASS_CREW_DEFINITION_PATH"]),
    ));
    lines.push(render_line(
        "crew.default_topic",
        &config.crew.default_topic,
        source("crew.default_topic", &["COMPASS_CREW_DEFAULT_TOPIC", "TOPIC"]),
    ));
    lines.push(render_line(
        "crew.report_path",
        &config.crew.report_path.display().to_string(),
        source("crew.report_path", &["COMPASS_CREW_REPORT_PATH"]),
    ));
    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", &["COMPASS_LOGGING_LEVEL", "COMPASS_LOG_LEVEL"]),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format).to_lowercase(),
        source("logging.format", &["COMPASS_LOGGING_FORMAT", "COMPASS_LOG_FORMAT"]),
    ));

    lines.join("\n")
}

fn render_line(field: &str, value: &str, source: String) -> String {
    format!("- {field} = {value} ({source})")
}

fn field_source(
    field: &str,
    env_vars: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    for var in env_vars {
        if env::var(var).map(|value| !value.trim().is_empty()).unwrap_or(false) {
            return format!("env:{var}");
        }
    }

    if let (Some(doc), Some(path)) = (config_file_doc, config_file_path) {
        if doc_has_field(doc, field) {
            return format!("file:{}", path.display());
        }
    }

    "default".to_string()
}

fn doc_has_field(doc: &Value, dotted_field: &str) -> bool {
    let mut current = doc;
    for segment in dotted_field.split('.') {
        match current.get(segment) {
            Some(next) => current = next,
            None => return false,
        }
    }
    true
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("compass.toml"), PathBuf::from("config/compass.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}
