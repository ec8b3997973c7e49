use serde::Deserialize;
use std::fs;
use std::path::Path;

pub const DEFAULT_LISTEN: &str = "0.0.0.0:5000";
pub const DEFAULT_SECRET_NAME: &str = "brfss-db-credentials";
pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_TEMPLATES_DIR: &str = "templates";

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    pub listen: Option<String>,
    // Name of the secret holding `host`, `username`, `password` and `dbname`.
    pub secret_name: Option<String>,
    // Region of the secret store.
    pub region: Option<String>,
    // Upper bound on establishing a database connection, per request.
    pub connect_timeout_secs: Option<u64>,
    // Directory containing index.html, bmi.html and about.html.
    pub templates_dir: Option<String>,
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let cfg_str = fs::read_to_string(path)?;
        Ok(toml::from_str(&cfg_str)?)
    }

    /// Resolves the configuration source.
    ///
    /// An explicitly named file must load. Without one, `config.toml` is used
    /// when it exists and built-in defaults otherwise.
    pub fn load(explicit_path: Option<&str>) -> anyhow::Result<Self> {
        match explicit_path {
            Some(path) => Self::from_file(path)
                .map_err(|e| anyhow::anyhow!("Failed to load config '{}': {}", path, e)),
            None if Path::new("config.toml").exists() => Self::from_file("config.toml"),
            None => Ok(Self::default()),
        }
    }

    pub fn listen(&self) -> &str {
        self.listen.as_deref().unwrap_or(DEFAULT_LISTEN)
    }

    pub fn secret_name(&self) -> &str {
        self.secret_name.as_deref().unwrap_or(DEFAULT_SECRET_NAME)
    }

    pub fn region(&self) -> &str {
        self.region.as_deref().unwrap_or(DEFAULT_REGION)
    }

    pub fn connect_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(
            self.connect_timeout_secs
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
        )
    }

    pub fn templates_dir(&self) -> &str {
        self.templates_dir.as_deref().unwrap_or(DEFAULT_TEMPLATES_DIR)
    }
}
