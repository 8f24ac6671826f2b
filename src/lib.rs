pub mod config;
pub mod error;
pub mod registry;

pub mod kafka;

pub use config::{CompressionType, Config, ProducerConfig};
pub use error::{Error, Result};
pub use kafka::{DeliveryOutcome, DeliveryReceipt, DeliveryRecord, Encoding, ProducerTemplate};
pub use registry::ProducerRegistry;
