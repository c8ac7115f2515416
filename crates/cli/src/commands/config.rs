use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use voyage_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let api_key = if config.crew.api_key.is_some() { "<redacted>" } else { "<unset>" };
    let fields: Vec<(&str, String, &str)> = vec![
        ("database.url", config.database.url.clone(), "VOYAGE_DATABASE_URL"),
        (
            "database.max_connections",
            config.database.max_connections.to_string(),
            "VOYAGE_DATABASE_MAX_CONNECTIONS",
        ),
        (
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            "VOYAGE_DATABASE_TIMEOUT_SECS",
        ),
        ("crew.provider", format!("{:?}", config.crew.provider), "VOYAGE_CREW_PROVIDER"),
        ("crew.model", config.crew.model.clone(), "VOYAGE_CREW_MODEL"),
        (
            "crew.base_url",
            config.crew.base_url.clone().unwrap_or_else(|| "<unset>".to_string()),
            "VOYAGE_CREW_BASE_URL",
        ),
        ("crew.api_key", api_key.to_string(), "VOYAGE_CREW_API_KEY"),
        ("crew.max_retries", config.crew.max_retries.to_string(), "VOYAGE_CREW_MAX_RETRIES"),
        ("server.bind_address", config.server.bind_address.clone(), "VOYAGE_SERVER_BIND_ADDRESS"),
        (
            "server.health_check_port",
            config.server.health_check_port.to_string(),
            "VOYAGE_SERVER_HEALTH_CHECK_PORT",
        ),
        ("logging.level", config.logging.level.clone(), "VOYAGE_LOGGING_LEVEL"),
        ("logging.format", format!("{:?}", config.logging.format), "VOYAGE_LOGGING_FORMAT"),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, value, env_key) in fields {
        let source = field_source(
            key,
            env_key,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(format!("- {key} = {value} (source: {source})"));
    }

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("voyage.toml"), PathBuf::from("config/voyage.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
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
