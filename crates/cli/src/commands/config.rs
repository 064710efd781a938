use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use expensa_core::config::{AppConfig, LoadOptions};
use toml::Value;

/// Environment variables consulted for each config key, in lookup order.
const ENV_KEYS: &[(&str, &[&str])] = &[
    ("database.url", &["EXPENSA_DATABASE_URL"]),
    ("database.max_connections", &["EXPENSA_DATABASE_MAX_CONNECTIONS"]),
    ("database.timeout_secs", &["EXPENSA_DATABASE_TIMEOUT_SECS"]),
    ("server.bind_address", &["EXPENSA_SERVER_BIND_ADDRESS"]),
    ("server.port", &["EXPENSA_SERVER_PORT"]),
    ("server.graceful_shutdown_secs", &["EXPENSA_SERVER_GRACEFUL_SHUTDOWN_SECS"]),
    ("currency.rate_api_base_url", &["EXPENSA_CURRENCY_RATE_API_BASE_URL"]),
    ("currency.api_key", &["EXPENSA_CURRENCY_API_KEY"]),
    ("currency.timeout_ms", &["EXPENSA_CURRENCY_TIMEOUT_MS"]),
    ("currency.fallback", &["EXPENSA_CURRENCY_FALLBACK"]),
    ("logging.level", &["EXPENSA_LOGGING_LEVEL", "EXPENSA_LOG_LEVEL"]),
    ("logging.format", &["EXPENSA_LOGGING_FORMAT", "EXPENSA_LOG_FORMAT"]),
];

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, value) in config.redacted_entries() {
        let env_keys = ENV_KEYS
            .iter()
            .find(|(candidate, _)| *candidate == key)
            .map(|(_, env_keys)| *env_keys)
            .unwrap_or_default();
        lines.push(render_line(
            key,
            &value,
            field_source(key, env_keys, config_file_doc.as_ref(), config_file_path.as_deref()),
        ));
    }

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("expensa.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/expensa.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|env_key| env::var_os(env_key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
