use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use kafka_template::{Config, ProducerRegistry};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "kafka-template")]
#[command(about = "Publish a record through a configured Kafka producer", long_about = None)]
struct Args {
    #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
    config: PathBuf,

    #[arg(long, value_enum, default_value_t = LogFormat::Text, help = "Log output format")]
    log_format: LogFormat,

    #[arg(short, long, help = "Verbose logging")]
    verbose: bool,

    #[arg(short, long, help = "Topic to publish to")]
    topic: String,

    #[arg(short, long, help = "Record key")]
    key: Option<String>,

    #[arg(short, long, help = "Target partition (default: chosen by the client)")]
    partition: Option<i32>,

    #[arg(short, long, help = "Wait for the delivery report before exiting")]
    wait: bool,

    /// Record payload
    value: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(args.log_format, args.verbose);

    info!("Starting kafka-template");
    info!("Loading configuration from {:?}", args.config);

    let config = Config::from_file(&args.config)
        .with_context(|| format!("failed to load configuration from {:?}", args.config))?;
    let producer_config = &config.kafka.producer;

    info!(
        kafka_brokers = ?producer_config.bootstrap_servers,
        kafka_acks = %producer_config.acks,
        kafka_retries = producer_config.retries,
        kafka_linger_ms = producer_config.linger_ms,
        kafka_compression = %producer_config.compression_type,
        kafka_client_id = ?producer_config.client_id,
        "Configuration summary"
    );

    let registry = ProducerRegistry::new();
    let template = registry
        .get_or_create(producer_config)
        .context("failed to create Kafka producer")?;

    let key = args.key.as_deref();
    let outcome = if args.wait {
        let receipt =
            template.send_awaitable(&args.topic, key, args.value.as_str(), args.partition);
        // the poll thread keeps reporting while we wait
        Some(receipt.wait().await?)
    } else {
        template.send_with(&args.topic, key, args.value.as_str(), args.partition);
        None
    };

    // closing flushes, which blocks; keep it off the runtime workers
    drop(template);
    if let Err(e) = tokio::task::spawn_blocking(move || registry.close_all()).await? {
        error!("Failed to flush pending records: {}", e);
    }

    if let Some(outcome) = outcome.filter(|o| !o.is_delivered()) {
        bail!("delivery to topic '{}' failed", outcome.topic());
    }

    info!("Done");
    Ok(())
}

/// Delivery reports are the point of this tool, so they stay visible at the
/// default level; `--verbose` adds queueing detail and librdkafka chatter.
fn log_filter(verbose: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new("kafka_template=debug,info")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("kafka_template=info,warn"))
    }
}

fn init_logging(format: LogFormat, verbose: bool) {
    let fmt_layer = match format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_span_list(false)
            .boxed(),
        // delivery callbacks run on the client's poll thread; name it
        LogFormat::Text => tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_names(true)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(log_filter(verbose))
        .with(fmt_layer)
        .init();
}
