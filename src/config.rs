use crate::dataset::FieldNames;
use crate::error::{AppError, Result};
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};

/// Environment variable that overrides the config file location
pub const CONFIG_PATH_ENV: &str = "DWLR_CONFIG";

pub const DEFAULT_CONFIG_PATH: &str = "config/config.yaml";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub dataset: DatasetConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    #[serde(default = "default_port", deserialize_with = "deserialize_port")]
    pub port: u16,
    #[serde(default = "default_cors_permissive")]
    pub cors_permissive: bool,
}

fn default_port() -> u16 {
    8000
}

fn default_cors_permissive() -> bool {
    true
}

/// Custom deserializer that handles port as both number and string
///
/// Accepts:
/// - `port: 8000` (number)
/// - `port: "8000"` (string that parses to number)
/// - `port: ${DWLR_PORT:-8000}` (env var substituted to either)
fn deserialize_port<'de, D>(deserializer: D) -> std::result::Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PortValue {
        Number(u16),
        String(String),
    }

    match PortValue::deserialize(deserializer)? {
        PortValue::Number(n) => Ok(n),
        PortValue::String(s) => s
            .trim()
            .parse::<u16>()
            .map_err(|_| serde::de::Error::custom(format!("Invalid port number: '{}'", s))),
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatasetFormat {
    #[default]
    Auto,
    Csv,
    Json,
}

/// Concrete on-disk layout after resolving `auto`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Csv,
    Json,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatasetConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub format: DatasetFormat,
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: f64,
    #[serde(default)]
    pub fields: FieldNames,
}

/// Fail the load if more than 10% of rows are rejected
fn default_failure_threshold() -> f64 {
    0.10
}

impl DatasetConfig {
    /// Resolve `auto` to a concrete format using the file extension
    pub fn resolved_format(&self) -> Result<SourceFormat> {
        match self.format {
            DatasetFormat::Auto => {
                let ext = self
                    .path
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(|e| e.to_ascii_lowercase());
                match ext.as_deref() {
                    Some("csv") => Ok(SourceFormat::Csv),
                    Some("json") => Ok(SourceFormat::Json),
                    _ => Err(AppError::Config(format!(
                        "Cannot infer dataset format from '{}', set dataset.format to csv or json",
                        self.path.display()
                    ))),
                }
            }
            DatasetFormat::Csv => Ok(SourceFormat::Csv),
            DatasetFormat::Json => Ok(SourceFormat::Json),
        }
    }
}

impl Config {
    /// Load from `$DWLR_CONFIG`, falling back to `config/config.yaml`
    pub fn load_default() -> Result<Self> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load(path)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            AppError::Config(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        // Substitute environment variables
        let expanded = expand_env_vars(content)?;

        let config: Config = serde_yaml::from_str(&expanded)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    ///
    /// Checks for:
    /// - Unexpanded environment variables
    /// - Non-empty host, dataset path and field names
    /// - Non-zero port
    /// - Failure threshold within 0.0..=1.0
    fn validate(&self) -> Result<()> {
        let path = self.dataset.path.to_string_lossy();
        let fields = &self.dataset.fields;
        let fields_to_check = [
            ("server.host", self.server.host.as_str()),
            ("dataset.path", &*path),
            ("dataset.fields.station_id", fields.station_id.as_str()),
            ("dataset.fields.state", fields.state.as_str()),
            ("dataset.fields.district", fields.district.as_str()),
            ("dataset.fields.timestamp", fields.timestamp.as_str()),
            ("dataset.fields.water_level", fields.water_level.as_str()),
        ];

        for (field_name, value) in &fields_to_check {
            if value.contains("${") {
                return Err(AppError::Config(format!(
                    "{} contains an unexpanded environment variable: '{}'",
                    field_name, value
                )));
            }
            if value.trim().is_empty() {
                return Err(AppError::Config(format!("{} cannot be empty", field_name)));
            }
        }

        if self.server.port == 0 {
            return Err(AppError::Config("Server port cannot be 0".to_string()));
        }

        let threshold = self.dataset.failure_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(AppError::Config(format!(
                "dataset.failure_threshold must be between 0.0 and 1.0, got {}",
                threshold
            )));
        }

        if threshold >= 0.5 {
            tracing::warn!(
                "dataset.failure_threshold of {:.0}% will accept heavily corrupted files",
                threshold * 100.0
            );
        }

        Ok(())
    }
}

/// Expand `${VAR}` (required) and `${VAR:-default}` (optional) placeholders
fn expand_env_vars(content: &str) -> Result<String> {
    let re = regex_lite::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
        .map_err(|e| AppError::Config(format!("Invalid placeholder pattern: {}", e)))?;

    let mut result = content.to_string();
    let mut missing_vars = Vec::new();

    for cap in re.captures_iter(content) {
        let var_name = &cap[1];
        let value = match (std::env::var(var_name), cap.get(2)) {
            (Ok(value), _) => value,
            (Err(_), Some(default)) => default.as_str().to_string(),
            (Err(_), None) => {
                missing_vars.push(var_name.to_string());
                continue;
            }
        };
        result = result.replace(&cap[0], &value);
    }

    if !missing_vars.is_empty() {
        return Err(AppError::Config(format!(
            "Missing required environment variable{}: {}\n\n\
             To fix this:\n\
             1. Create a .env file in the project root (copy .env.example)\n\
             2. Set the missing variable{}: export {}=<value>\n\
             3. Or give the placeholder a default: ${{{}:-<value>}}",
            if missing_vars.len() > 1 { "s" } else { "" },
            missing_vars.join(", "),
            if missing_vars.len() > 1 { "s" } else { "" },
            missing_vars[0],
            missing_vars[0]
        )));
    }

    Ok(result)
}
