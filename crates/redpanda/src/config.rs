//! Redpanda configuration.

use serde::{Deserialize, Serialize};

/// Topic the upload gateway publishes ingestion events to.
pub const FILE_PROCESSING_TOPIC: &str = "file-processing-topic";

/// Consumer group for ingestion workers.
pub const FILE_PROCESSING_GROUP: &str = "file-processing-group";

/// Where a consumer starts when it has no position yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartOffset {
    /// Replay the whole topic; completed files are acknowledged without work.
    Earliest,
    /// Only consume events published after startup.
    Latest,
}

/// Redpanda connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedpandaConfig {
    /// Broker addresses
    pub brokers: Vec<String>,
    /// SASL username (for cloud authentication)
    #[serde(default)]
    pub sasl_username: Option<String>,
    /// SASL password (for cloud authentication)
    #[serde(default)]
    pub sasl_password: Option<String>,
    #[serde(default)]
    pub consumer: ConsumerConfig,
}

impl Default for RedpandaConfig {
    fn default() -> Self {
        Self {
            brokers: vec!["localhost:9092".to_string()],
            sasl_username: None,
            sasl_password: None,
            consumer: ConsumerConfig::default(),
        }
    }
}

impl RedpandaConfig {
    /// Returns the broker list as a comma-separated string.
    pub fn broker_string(&self) -> String {
        self.brokers.join(",")
    }
}

/// Ingestion event consumer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerConfig {
    #[serde(default = "default_group_id")]
    pub group_id: String,
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default)]
    pub partition: i32,
    /// Maximum events returned by one fetch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Maximum time a fetch waits for new events, in milliseconds
    #[serde(default = "default_batch_timeout_ms")]
    pub batch_timeout_ms: u64,
    /// Maximum bytes requested per fetch
    #[serde(default = "default_max_fetch_bytes")]
    pub max_fetch_bytes: i32,
    #[serde(default = "default_start_offset")]
    pub start_offset: StartOffset,
}

fn default_group_id() -> String {
    FILE_PROCESSING_GROUP.to_string()
}

fn default_topic() -> String {
    FILE_PROCESSING_TOPIC.to_string()
}

// Each event is one small (id, path) record and one file's worth of work,
// so fetches stay small.
fn default_batch_size() -> usize {
    16
}

fn default_batch_timeout_ms() -> u64 {
    1000
}

fn default_max_fetch_bytes() -> i32 {
    1024 * 1024
}

fn default_start_offset() -> StartOffset {
    StartOffset::Earliest
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            group_id: default_group_id(),
            topic: default_topic(),
            partition: 0,
            batch_size: default_batch_size(),
            batch_timeout_ms: default_batch_timeout_ms(),
            max_fetch_bytes: default_max_fetch_bytes(),
            start_offset: default_start_offset(),
        }
    }
}
