use crate::config::ProducerConfig;
use crate::kafka::delivery::{DeliveryOutcome, DeliveryReceipt, DeliveryReporter, DeliveryTicket};
use crate::Result;
use rdkafka::message::ToBytes;
use rdkafka::producer::{BaseRecord, Producer, ThreadedProducer};
use rdkafka::util::Timeout;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// One record handed to the client. Built per call and not kept afterwards.
#[derive(Debug)]
pub struct DeliveryRecord<'a, K: ?Sized, V: ?Sized> {
    pub topic: &'a str,
    /// `None` lets the client pick a partition from the key, or spread
    /// keyless records itself.
    pub partition: Option<i32>,
    pub key: Option<&'a K>,
    pub value: &'a V,
}

impl<'a, V: ?Sized> DeliveryRecord<'a, (), V> {
    pub fn to(topic: &'a str, value: &'a V) -> Self {
        Self {
            topic,
            partition: None,
            key: None,
            value,
        }
    }
}

/// Fire-and-forget facade over a single shared Kafka producer.
///
/// Sends return as soon as the record is queued. The client delivers it on
/// its own thread and the outcome is logged when the broker answers;
/// callers never see delivery errors through `send`. Use
/// [`send_awaitable`](Self::send_awaitable) when the outcome matters.
///
/// [`flush`](Self::flush), [`close`](Self::close) and dropping the template
/// block the calling thread for up to the flush timeout
/// (`close_timeout_ms` for the latter two). From async code, call them via
/// `tokio::task::spawn_blocking`.
///
/// # Example
///
/// ```no_run
/// use kafka_template::{ProducerConfig, ProducerTemplate};
///
/// # fn example() -> kafka_template::Result<()> {
/// let template = ProducerTemplate::new(&ProducerConfig::new(["localhost:9092"]))?;
///
/// template.send("orders", "payload-bytes");
/// template.send_with("orders", Some("cust-1"), "payload-bytes", None);
///
/// template.close()?;
/// # Ok(())
/// # }
/// ```
pub struct ProducerTemplate {
    inner: ThreadedProducer<DeliveryReporter>,
    config: ProducerConfig,
    closed: bool,
}

impl ProducerTemplate {
    /// Builds the producer client from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the client
    /// rejects one of its properties. Brokers are not contacted here.
    pub fn new(config: &ProducerConfig) -> Result<Self> {
        config.validate()?;

        info!(
            brokers = %config.brokers(),
            acks = %config.acks,
            compression = %config.compression_type,
            client_id = ?config.client_id,
            "Creating Kafka producer"
        );

        let inner: ThreadedProducer<DeliveryReporter> = config
            .client_config()
            .create_with_context(DeliveryReporter)?;

        Ok(Self {
            inner,
            config: config.clone(),
            closed: false,
        })
    }

    pub fn config(&self) -> &ProducerConfig {
        &self.config
    }

    /// Sends `value` to `topic` with no key and a client-chosen partition.
    pub fn send<V>(&self, topic: &str, value: &V)
    where
        V: ToBytes + ?Sized,
    {
        self.submit(DeliveryRecord::to(topic, value), DeliveryTicket::detached());
    }

    /// Sends a record with an optional key and partition.
    pub fn send_with<K, V>(
        &self,
        topic: &str,
        key: Option<&K>,
        value: &V,
        partition: Option<i32>,
    ) where
        K: ToBytes + ?Sized,
        V: ToBytes + ?Sized,
    {
        let record = DeliveryRecord {
            topic,
            partition,
            key,
            value,
        };
        self.submit(record, DeliveryTicket::detached());
    }

    /// Encodes key and value with the configured encodings, then sends.
    ///
    /// A value the encoding rejects is reported like any other failed
    /// delivery: logged, not returned.
    pub fn send_serialized<K, V>(
        &self,
        topic: &str,
        key: Option<&K>,
        value: &V,
        partition: Option<i32>,
    ) where
        K: Serialize + ?Sized,
        V: Serialize + ?Sized,
    {
        let key = match key.map(|k| self.config.key_serializer.encode(k)).transpose() {
            Ok(key) => key,
            Err(e) => return DeliveryOutcome::failed(topic, partition, e).log(),
        };
        let value = match self.config.value_serializer.encode(value) {
            Ok(value) => value,
            Err(e) => return DeliveryOutcome::failed(topic, partition, e).log(),
        };

        self.send_with(topic, key.as_deref(), value.as_slice(), partition)
    }

    /// Sends a record and returns a receipt for its outcome.
    ///
    /// The outcome is logged exactly as for [`send_with`](Self::send_with);
    /// the receipt is an additional way to observe it.
    pub fn send_awaitable<K, V>(
        &self,
        topic: &str,
        key: Option<&K>,
        value: &V,
        partition: Option<i32>,
    ) -> DeliveryReceipt
    where
        K: ToBytes + ?Sized,
        V: ToBytes + ?Sized,
    {
        let (ticket, receipt) = DeliveryTicket::awaited();
        let record = DeliveryRecord {
            topic,
            partition,
            key,
            value,
        };
        self.submit(record, ticket);
        receipt
    }

    fn submit<K, V>(&self, record: DeliveryRecord<'_, K, V>, ticket: Box<DeliveryTicket>)
    where
        K: ToBytes + ?Sized,
        V: ToBytes + ?Sized,
    {
        let mut base: BaseRecord<'_, K, V, Box<DeliveryTicket>> =
            BaseRecord::with_opaque_to(record.topic, ticket).payload(record.value);
        base.key = record.key;
        base.partition = record.partition;

        match self.inner.send(base) {
            Ok(()) => {
                debug!(
                    "Queued record for topic '{}' (partition: {:?}, {} bytes)",
                    record.topic,
                    record.partition,
                    record.value.to_bytes().len()
                );
            }
            Err((err, rejected)) => {
                // never reached the queue, so no report will follow
                rejected.delivery_opaque.complete(DeliveryOutcome::failed(
                    record.topic,
                    record.partition,
                    err,
                ));
            }
        }
    }

    /// Number of records queued or in flight.
    pub fn in_flight_count(&self) -> i32 {
        self.inner.in_flight_count()
    }

    /// Waits until every queued record has been reported on.
    ///
    /// # Errors
    ///
    /// Returns an error if records are still pending when `timeout` runs out.
    pub fn flush(&self, timeout: Duration) -> Result<()> {
        self.inner.flush(Timeout::After(timeout))?;
        Ok(())
    }

    /// Flushes pending records within `close_timeout_ms` and releases the
    /// client.
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        info!("Closing Kafka producer");
        self.flush(Duration::from_millis(self.config.close_timeout_ms))
    }
}

impl Drop for ProducerTemplate {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let timeout = Duration::from_millis(self.config.close_timeout_ms);
        if let Err(e) = self.flush(timeout) {
            warn!(
                pending = self.in_flight_count(),
                "Kafka producer dropped before all records were flushed: {}", e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    fn unreachable_config() -> ProducerConfig {
        let mut config = ProducerConfig::new(["127.0.0.1:1"]);
        config
            .properties
            .insert("message.timeout.ms".to_string(), "1000".to_string());
        config.close_timeout_ms = 100;
        config
    }

    #[test]
    fn test_delivery_record_to_has_no_key_or_partition() {
        let record = DeliveryRecord::to("orders", "payload");
        assert_eq!(record.topic, "orders");
        assert!(record.key.is_none());
        assert!(record.partition.is_none());
    }

    #[test]
    fn test_invalid_config_fails_construction() {
        let mut config = ProducerConfig::new(["localhost:9092"]);
        config.acks = "sometimes".to_string();

        assert!(matches!(
            ProducerTemplate::new(&config),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_unknown_client_property_fails_construction() {
        let mut config = ProducerConfig::new(["localhost:9092"]);
        config
            .properties
            .insert("no.such.property".to_string(), "1".to_string());

        assert!(matches!(ProducerTemplate::new(&config), Err(Error::Kafka(_))));
    }

    #[test]
    fn test_zero_batch_size_builds_a_client() {
        let mut config = ProducerConfig::new(["localhost:9092"]);
        config.batch_size = 0;

        assert!(ProducerTemplate::new(&config).is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_broker_reports_failure() {
        let template = ProducerTemplate::new(&unreachable_config()).unwrap();

        let receipt = template.send_awaitable(
            "orders",
            Some("cust-1"),
            "payload-bytes",
            None,
        );
        let outcome = tokio::time::timeout(Duration::from_secs(30), receipt.wait())
            .await
            .expect("delivery report should arrive")
            .unwrap();

        assert!(!outcome.is_delivered());
        assert_eq!(outcome.topic(), "orders");
    }

    #[test]
    fn test_send_returns_immediately_without_broker() {
        let template = ProducerTemplate::new(&unreachable_config()).unwrap();

        template.send("orders", "payload-bytes");
        template.send_with("orders", Some("cust-1"), "payload-bytes", None);
        assert!(template.in_flight_count() >= 1);
    }
}
