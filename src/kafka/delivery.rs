//! Delivery reports: what the client tells us after a record is acknowledged
//! or given up on.
//!
//! The client invokes [`DeliveryReporter::delivery`] on its own polling
//! thread, once per record. Every report becomes a [`DeliveryOutcome`], is
//! logged exactly once, and is handed to whoever is waiting on a
//! [`DeliveryReceipt`] for that record, if anyone is.

use crate::{Error, Result};
use rdkafka::client::ClientContext;
use rdkafka::config::RDKafkaLogLevel;
use rdkafka::error::KafkaError;
use rdkafka::message::Message;
use rdkafka::producer::{DeliveryResult, ProducerContext};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// Result of one delivery attempt as reported by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered {
        topic: String,
        partition: i32,
        offset: i64,
    },
    Failed {
        topic: String,
        /// Partition the record was headed for, when the client had chosen one.
        partition: Option<i32>,
        error: String,
    },
}

impl DeliveryOutcome {
    pub fn from_result(result: &DeliveryResult<'_>) -> Self {
        match result {
            Ok(message) => DeliveryOutcome::Delivered {
                topic: message.topic().to_string(),
                partition: message.partition(),
                offset: message.offset(),
            },
            Err((err, message)) => DeliveryOutcome::Failed {
                topic: message.topic().to_string(),
                partition: Some(message.partition()).filter(|p| *p >= 0),
                error: err.to_string(),
            },
        }
    }

    pub fn failed(topic: &str, partition: Option<i32>, error: impl ToString) -> Self {
        DeliveryOutcome::Failed {
            topic: topic.to_string(),
            partition,
            error: error.to_string(),
        }
    }

    pub fn topic(&self) -> &str {
        match self {
            DeliveryOutcome::Delivered { topic, .. } | DeliveryOutcome::Failed { topic, .. } => {
                topic
            }
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }

    /// Emits the single log line for this outcome.
    pub fn log(&self) {
        match self {
            DeliveryOutcome::Delivered {
                topic,
                partition,
                offset,
            } => {
                info!(
                    topic = %topic,
                    partition = *partition,
                    offset = *offset,
                    "Delivery acknowledged (topic: {}, partition: {}, offset: {})",
                    topic, partition, offset
                );
            }
            DeliveryOutcome::Failed {
                topic,
                partition,
                error,
            } => {
                error!(
                    topic = %topic,
                    partition = ?partition,
                    error = %error,
                    "Delivery to topic '{}' failed: {}",
                    topic, error
                );
            }
        }
    }
}

/// Per-record delivery opaque. Carries the sender half of a receipt when the
/// caller asked to wait for the outcome.
#[derive(Debug, Default)]
pub struct DeliveryTicket {
    notify: Option<oneshot::Sender<DeliveryOutcome>>,
}

impl DeliveryTicket {
    /// A ticket nobody waits on.
    pub fn detached() -> Box<Self> {
        Box::new(Self { notify: None })
    }

    /// A ticket paired with the receipt that will resolve to its outcome.
    pub fn awaited() -> (Box<Self>, DeliveryReceipt) {
        let (tx, rx) = oneshot::channel();
        (Box::new(Self { notify: Some(tx) }), DeliveryReceipt { rx })
    }

    /// Logs the outcome and wakes the waiting receipt, if any.
    pub fn complete(self, outcome: DeliveryOutcome) {
        outcome.log();
        if let Some(tx) = self.notify {
            // receiver dropped means the caller stopped caring
            let _ = tx.send(outcome);
        }
    }
}

/// Awaitable outcome of a record sent with
/// [`ProducerTemplate::send_awaitable`](crate::ProducerTemplate::send_awaitable).
#[derive(Debug)]
pub struct DeliveryReceipt {
    rx: oneshot::Receiver<DeliveryOutcome>,
}

impl DeliveryReceipt {
    /// Waits for the client's report on the record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeliveryAbandoned`] if the producer was dropped
    /// without reporting on the record.
    pub async fn wait(self) -> Result<DeliveryOutcome> {
        self.rx.await.map_err(|_| Error::DeliveryAbandoned)
    }
}

/// Producer context registered with the client.
///
/// Turns delivery reports into logged [`DeliveryOutcome`]s and routes the
/// client's own diagnostics into `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeliveryReporter;

impl ClientContext for DeliveryReporter {
    fn log(&self, level: RDKafkaLogLevel, fac: &str, log_message: &str) {
        match level {
            RDKafkaLogLevel::Emerg
            | RDKafkaLogLevel::Alert
            | RDKafkaLogLevel::Critical
            | RDKafkaLogLevel::Error => error!(facility = fac, "librdkafka: {}", log_message),
            RDKafkaLogLevel::Warning => warn!(facility = fac, "librdkafka: {}", log_message),
            RDKafkaLogLevel::Notice | RDKafkaLogLevel::Info => {
                info!(facility = fac, "librdkafka: {}", log_message)
            }
            RDKafkaLogLevel::Debug => debug!(facility = fac, "librdkafka: {}", log_message),
        }
    }

    fn error(&self, error: KafkaError, reason: &str) {
        error!(error = %error, "Kafka client error: {}", reason);
    }
}

impl ProducerContext for DeliveryReporter {
    type DeliveryOpaque = Box<DeliveryTicket>;

    fn delivery(&self, delivery_result: &DeliveryResult<'_>, ticket: Self::DeliveryOpaque) {
        ticket.complete(DeliveryOutcome::from_result(delivery_result));
    }
}
