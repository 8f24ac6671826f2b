//! Error types and result handling for kafka-template.
//!
//! This module defines the main error type [`Error`] and a convenience
//! [`Result`] type alias used throughout the crate.
//!
//! Only startup-time problems travel through [`Error`]. A record that fails to
//! reach the broker is reported by the delivery callback and logged; it never
//! comes back out of [`ProducerTemplate::send`](crate::ProducerTemplate::send).
//!
//! # Example
//!
//! ```rust
//! use kafka_template::{Error, Result};
//!
//! fn check_brokers(brokers: &[String]) -> Result<()> {
//!     if brokers.is_empty() {
//!         return Err(Error::InvalidConfig("bootstrap_servers is empty".to_string()));
//!     }
//!     Ok(())
//! }
//!
//! match check_brokers(&[]) {
//!     Ok(()) => println!("Brokers configured"),
//!     Err(Error::InvalidConfig(msg)) => eprintln!("Invalid config: {}", msg),
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! ```

use thiserror::Error;

/// The main error type for kafka-template operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration could not be loaded or deserialized.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Configuration was loaded but holds values the producer cannot use.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Kafka client error, typically raised while creating the producer.
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    /// A key or value could not be encoded with the configured encoding.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The producer went away before it reported on an awaited record.
    #[error("Delivery report abandoned before the record was acknowledged")]
    DeliveryAbandoned,
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// A convenient Result type alias for kafka-template operations.
///
/// This is equivalent to `std::result::Result<T, kafka_template::Error>`.
pub type Result<T> = std::result::Result<T, Error>;
