#![allow(dead_code)]

use kafka_template::config::ProducerConfig;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

/// Get test producer configuration from environment variables
pub fn get_test_config() -> ProducerConfig {
    // Use TEST_ prefix for test environment variables
    let brokers: Vec<String> = env::var("TEST_KAFKA_BROKERS")
        .unwrap_or_else(|_| "localhost:9092".to_string())
        .split(',')
        .map(|s| s.trim().to_string())
        .collect();

    let mut config = ProducerConfig::new(brokers);
    config.linger_ms = 0; // Immediate sending for tests
    config.client_id = Some(format!("kafka_template_test_{}", std::process::id()));
    config
}

pub fn test_topic(name: &str) -> String {
    format!("test_{}_{}", std::process::id(), name)
}

/// One event seen by [`CapturedLogs`].
#[derive(Debug, Clone)]
pub struct CapturedEvent {
    pub level: Level,
    pub message: String,
    pub fields: HashMap<String, String>,
}

impl CapturedEvent {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Layer that records every event so tests can assert on log output.
#[derive(Clone, Default)]
pub struct CapturedLogs {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl CapturedLogs {
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn at_level(&self, level: Level) -> Vec<CapturedEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.level == level)
            .collect()
    }
}

impl<S: Subscriber> Layer<S> for CapturedLogs {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let message = visitor.fields.remove("message").unwrap_or_default();
        self.events.lock().unwrap().push(CapturedEvent {
            level: *event.metadata().level(),
            message,
            fields: visitor.fields,
        });
    }
}

#[derive(Default)]
struct FieldVisitor {
    fields: HashMap<String, String>,
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.fields.insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.fields
            .insert(field.name().to_string(), format!("{:?}", value));
    }
}

/// Runs `f` with a capturing subscriber installed on the current thread.
pub fn capture_logs<R>(f: impl FnOnce() -> R) -> (R, CapturedLogs) {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::registry().with(logs.clone());
    let result = tracing::subscriber::with_default(subscriber, f);
    (result, logs)
}

/// Installs a capturing subscriber for the whole process, so events logged
/// on the client's own threads are seen too. Safe to call from every test
/// in a binary; the first call wins.
pub fn capture_global_logs() -> CapturedLogs {
    static GLOBAL: OnceLock<CapturedLogs> = OnceLock::new();
    GLOBAL
        .get_or_init(|| {
            let logs = CapturedLogs::default();
            tracing::subscriber::set_global_default(
                tracing_subscriber::registry().with(logs.clone()),
            )
            .expect("global subscriber already installed");
            logs
        })
        .clone()
}
