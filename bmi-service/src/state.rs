use crate::config::Config;
use crate::secrets::DbCredentials;
use crate::store::{ConnectSettings, Connector, MySqlConnector};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Built once at startup and shared read-only by every request.
pub struct AppState {
    pub connector: Arc<dyn Connector>,
    pub templates_dir: PathBuf,
}

impl AppState {
    pub fn new(connector: Arc<dyn Connector>, templates_dir: impl Into<PathBuf>) -> Self {
        AppState {
            connector,
            templates_dir: templates_dir.into(),
        }
    }

    pub fn from_config(cfg: &Config, creds: &DbCredentials) -> Self {
        let settings = ConnectSettings::new(creds, cfg.connect_timeout());
        debug!(
            "Database connect timeout: {:?}",
            settings.connect_timeout
        );
        info!(
            "Registered database: host='{}' database='{}'",
            settings.host, settings.database
        );

        let templates_dir = cfg.templates_dir();
        debug!("Serving pages from '{}'", templates_dir);

        AppState::new(Arc::new(MySqlConnector::new(settings)), templates_dir)
    }
}
