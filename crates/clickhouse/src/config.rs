//! ClickHouse configuration.

use serde::{Deserialize, Serialize};

/// ClickHouse client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickHouseConfig {
    /// ClickHouse HTTP URL
    pub url: String,
    /// Database holding `files_table` and `data_points`
    #[serde(default = "default_database")]
    pub database: String,
    /// Username (optional)
    pub username: Option<String>,
    /// Password (optional)
    pub password: Option<String>,
    /// Wait for `ALTER ... DELETE` mutations to finish before returning
    #[serde(default = "default_sync_mutations")]
    pub sync_mutations: bool,
}

fn default_database() -> String {
    "timeseries".to_string()
}

fn default_sync_mutations() -> bool {
    true
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8123".to_string(),
            database: default_database(),
            username: None,
            password: None,
            sync_mutations: default_sync_mutations(),
        }
    }
}
