//! Database credentials loaded from a secret store at startup.

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_secretsmanager::Client;
use serde::Deserialize;
use std::fmt;
use tracing::{debug, info};

#[async_trait]
pub trait SecretProvider: Send + Sync {
    /// Returns the raw string payload of the named secret.
    async fn get_secret(&self, name: &str) -> Result<String>;
}

/// AWS Secrets Manager client wrapper.
///
/// Authentication follows the default AWS provider chain (env vars, profile,
/// instance or task role).
pub struct AwsSecretsManager {
    client: Client,
}

impl AwsSecretsManager {
    pub async fn new(region: &str) -> Self {
        debug!("Initializing Secrets Manager client for region: {}", region);
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()))
            .load()
            .await;
        Self {
            client: Client::new(&sdk_config),
        }
    }
}

#[async_trait]
impl SecretProvider for AwsSecretsManager {
    async fn get_secret(&self, name: &str) -> Result<String> {
        debug!("Fetching secret: {}", name);

        let response = self
            .client
            .get_secret_value()
            .secret_id(name)
            .send()
            .await
            .with_context(|| format!("Failed to access secret '{}'", name))?;

        let secret = response
            .secret_string()
            .with_context(|| format!("Secret '{}' has no string payload", name))?
            .to_string();

        info!("Secret retrieved successfully (length: {} bytes)", secret.len());
        Ok(secret)
    }
}

#[derive(Clone, Deserialize)]
pub struct DbCredentials {
    pub host: String,
    pub username: String,
    pub password: String,
    pub dbname: String,
}

impl DbCredentials {
    pub fn from_secret_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .context("Secret is not a JSON object with host, username, password and dbname")
    }

    pub async fn fetch(provider: &dyn SecretProvider, secret_name: &str) -> Result<Self> {
        let raw = provider.get_secret(secret_name).await?;
        let creds = Self::from_secret_json(&raw)?;
        info!(host = %creds.host, database = %creds.dbname, "Loaded database credentials");
        Ok(creds)
    }
}

impl fmt::Debug for DbCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbCredentials")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("dbname", &self.dbname)
            .finish()
    }
}
