//! Producer configuration and the binder that fills it from external input.
//!
//! Settings are read from a file and overlaid with `KAFKA_TEMPLATE_*`
//! environment variables. Every option except `bootstrap_servers` has a
//! default, so the smallest useful file is:
//!
//! ```toml
//! [kafka.producer]
//! bootstrap_servers = ["localhost:9092"]
//! ```

use crate::kafka::serializer::Encoding;
use crate::{Error, Result};
use rdkafka::ClientConfig;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;

/// Prefix for raw client properties in a flat key/value mapping.
const PROPERTIES_PREFIX: &str = "properties.";

const VALID_ACKS: [&str; 4] = ["all", "-1", "0", "1"];

/// Keys `from_map` binds, in their snake_case form.
const KNOWN_KEYS: [&str; 11] = [
    "bootstrap_servers",
    "acks",
    "retries",
    "linger_ms",
    "buffer_memory",
    "batch_size",
    "compression_type",
    "key_serializer",
    "value_serializer",
    "client_id",
    "close_timeout_ms",
];

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub kafka: KafkaConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KafkaConfig {
    pub producer: ProducerConfig,
}

/// Options used to build the one producer client a process shares.
///
/// Immutable once built; equal configurations hash equally, which is what
/// [`ProducerRegistry`](crate::ProducerRegistry) keys on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct ProducerConfig {
    /// Initial brokers used to discover the cluster, as `host:port` pairs.
    #[serde(deserialize_with = "list_or_csv")]
    pub bootstrap_servers: Vec<String>,
    #[serde(default = "default_acks")]
    pub acks: String,
    #[serde(default)]
    pub retries: u32,
    #[serde(default)]
    pub linger_ms: u64,
    /// Bytes the client may hold for records waiting to be sent.
    #[serde(default = "default_buffer_memory")]
    pub buffer_memory: u64,
    /// Batch size threshold in bytes. `0` disables batching and is sent to
    /// the client as `1`, the smallest size it accepts.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    #[serde(default)]
    pub compression_type: CompressionType,
    #[serde(default)]
    pub key_serializer: Encoding,
    #[serde(default)]
    pub value_serializer: Encoding,
    #[serde(default)]
    pub client_id: Option<String>,
    /// How long closing the template waits for queued records to flush.
    #[serde(default = "default_close_timeout_ms")]
    pub close_timeout_ms: u64,
    /// Raw client properties applied after the typed options.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CompressionType {
    None,
    #[default]
    Gzip,
    Snappy,
    Lz4,
    Zstd,
}

impl CompressionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompressionType::None => "none",
            CompressionType::Gzip => "gzip",
            CompressionType::Snappy => "snappy",
            CompressionType::Lz4 => "lz4",
            CompressionType::Zstd => "zstd",
        }
    }
}

impl fmt::Display for CompressionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("KAFKA_TEMPLATE")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.kafka.producer.validate()?;
        Ok(config)
    }
}

impl ProducerConfig {
    /// Creates a configuration for the given brokers with every other option
    /// at its default.
    pub fn new<I, S>(bootstrap_servers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            bootstrap_servers: bootstrap_servers.into_iter().map(Into::into).collect(),
            acks: default_acks(),
            retries: 0,
            linger_ms: 0,
            buffer_memory: default_buffer_memory(),
            batch_size: default_batch_size(),
            compression_type: CompressionType::default(),
            key_serializer: Encoding::default(),
            value_serializer: Encoding::default(),
            client_id: None,
            close_timeout_ms: default_close_timeout_ms(),
            properties: BTreeMap::new(),
        }
    }

    /// Binds a flat key/value mapping, such as one collected from a
    /// properties file, onto a configuration.
    ///
    /// Keys are the field names in snake_case (`bootstrap_servers`),
    /// camelCase (`bootstrapServers`) or kebab-case (`bootstrap-servers`).
    /// Keys starting with `properties.` are passed to the client untouched,
    /// e.g. `properties.message.timeout.ms`. Any other key is rejected.
    pub fn from_map<K, V>(map: &HashMap<K, V>) -> Result<Self>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut builder = config::Config::builder();
        let mut raw = BTreeMap::new();

        for (key, value) in map {
            let (key, value) = (key.as_ref(), value.as_ref());
            match key.strip_prefix(PROPERTIES_PREFIX) {
                Some(property) => {
                    raw.insert(property.to_string(), value.to_string());
                }
                None => {
                    let field = normalize_key(key);
                    if !KNOWN_KEYS.contains(&field.as_str()) {
                        return Err(Error::InvalidConfig(format!(
                            "unknown producer option '{}'",
                            key
                        )));
                    }
                    builder = builder.set_override(field, value)?;
                }
            }
        }

        let mut producer: ProducerConfig = builder.build()?.try_deserialize()?;
        producer.properties.extend(raw);
        producer.validate()?;
        Ok(producer)
    }

    pub fn validate(&self) -> Result<()> {
        if self.bootstrap_servers.is_empty() {
            return Err(Error::InvalidConfig(
                "bootstrap_servers must list at least one broker".to_string(),
            ));
        }
        if self.bootstrap_servers.iter().any(|s| s.trim().is_empty()) {
            return Err(Error::InvalidConfig(
                "bootstrap_servers contains an empty entry".to_string(),
            ));
        }
        if !VALID_ACKS.contains(&self.acks.as_str()) {
            return Err(Error::InvalidConfig(format!(
                "acks must be one of {:?}, got '{}'",
                VALID_ACKS, self.acks
            )));
        }
        Ok(())
    }

    pub fn brokers(&self) -> String {
        self.bootstrap_servers.join(",")
    }

    /// Translates the options into librdkafka property names.
    pub fn client_config(&self) -> ClientConfig {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", self.brokers())
            .set("acks", &self.acks)
            .set("retries", self.retries.to_string())
            .set("linger.ms", self.linger_ms.to_string())
            // librdkafka sizes its queue in kilobytes and has no buffer.memory
            .set(
                "queue.buffering.max.kbytes",
                (self.buffer_memory / 1024).max(1).to_string(),
            )
            .set("batch.size", self.batch_size.max(1).to_string())
            .set("compression.type", self.compression_type.as_str());

        if let Some(client_id) = &self.client_id {
            client_config.set("client.id", client_id);
        }

        for (key, value) in &self.properties {
            client_config.set(key, value);
        }

        client_config
    }
}

/// Maps `lingerMs` and `linger-ms` to `linger_ms`.
fn normalize_key(key: &str) -> String {
    let mut normalized = String::with_capacity(key.len() + 4);
    for c in key.trim().chars() {
        if c == '-' {
            normalized.push('_');
        } else if c.is_ascii_uppercase() {
            if !normalized.is_empty() && !normalized.ends_with('_') {
                normalized.push('_');
            }
            normalized.push(c.to_ascii_lowercase());
        } else {
            normalized.push(c);
        }
    }
    normalized
}

fn list_or_csv<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Servers {
        List(Vec<String>),
        Csv(String),
    }

    let servers = match Servers::deserialize(deserializer)? {
        Servers::List(list) => list,
        Servers::Csv(csv) => csv.split(',').map(str::to_string).collect(),
    };

    Ok(servers
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

fn default_acks() -> String {
    "all".to_string()
}

fn default_buffer_memory() -> u64 {
    33_554_432 // 32MB
}

fn default_batch_size() -> u32 {
    16384
}

fn default_close_timeout_ms() -> u64 {
    5000
}
