use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub remote: RemoteConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub connection_string: Option<String>,
    pub max_connections: Option<u32>,
}

/// Where the collections owned by other services live, and how patiently to ask.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Per-call deadline in milliseconds
    pub timeout_ms: u64,
    /// Upper bound on concurrent lookups within one aggregation
    pub max_concurrency: usize,
    /// Append `/` to resource URLs
    pub trailing_slash: bool,
    /// Collection name -> base URL of its owning service
    pub collections: HashMap<String, String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            connection_string: None,
            max_connections: Some(20),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            max_concurrency: 8,
            trailing_slash: false,
            collections: HashMap::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, an optional `config` file and `CLINIC__*`
    /// environment variables, in that order of precedence.
    pub fn load() -> anyhow::Result<Self> {
        let mut config = config::Config::builder();

        config = config.add_source(config::Config::try_from(&AppConfig::default())?);

        config = config.add_source(config::File::with_name("config").required(false));

        // e.g. CLINIC__REMOTE__COLLECTIONS__USERS=http://users:8000
        config = config.add_source(
            config::Environment::with_prefix("CLINIC")
                .separator("__")
                .prefix_separator("__"),
        );

        let config = config.build()?;
        let app_config: AppConfig = config.try_deserialize()?;

        Ok(app_config)
    }

    /// Connection string for the durable store, if one is configured.
    pub fn database_url(&self) -> Option<String> {
        self.database
            .connection_string
            .clone()
            .filter(|url| !url.trim().is_empty())
            .or_else(|| std::env::var("DATABASE_URL").ok())
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
