//! amqp-publish - publish one message to an AMQP 1.0 broker
//!
//! Prints a single JSON result object on stdout and exits 0 only when the
//! broker confirmed the message. Logs go to stderr.

use amqp_publisher::config::{ConfigError, PublishParams, PublishRequest, TlsSection};
use amqp_publisher::error::PublishError;
use amqp_publisher::observability::init_default_logging;
use amqp_publisher::publisher;
use amqp_publisher::report::PublishReport;
use clap::Parser;
use std::path::PathBuf;
use std::process;
use tracing::{error, info};

/// Publish one message to an AMQP 1.0 broker and wait for its acknowledgment
#[derive(Parser, Debug)]
#[command(name = "amqp-publish")]
#[command(version)]
struct Cli {
    /// TOML parameter file; flags override its values
    #[arg(short, long, value_name = "FILE")]
    params: Option<PathBuf>,

    /// Candidate broker URL, tried in the order given (repeatable)
    #[arg(short, long = "url", value_name = "URL")]
    urls: Vec<String>,

    /// Trusted CA bundle; enables mutual TLS
    #[arg(long, value_name = "FILE")]
    ca: Option<PathBuf>,

    /// Client certificate, required with --ca
    #[arg(long, value_name = "FILE")]
    cert: Option<PathBuf>,

    /// Client private key, required with --ca
    #[arg(long, value_name = "FILE")]
    key: Option<PathBuf>,

    /// Link source name
    #[arg(long)]
    source: Option<String>,

    /// Target address or topic
    #[arg(long)]
    address: Option<String>,

    /// Message body as JSON
    #[arg(long, value_name = "JSON")]
    body: Option<String>,

    /// Seconds to wait for the broker (0 waits forever)
    #[arg(long, env = "AMQP_ACK_TIMEOUT_SECS", value_name = "SECS")]
    ack_timeout_secs: Option<u64>,

    /// Seconds each broker may take to accept the connection
    #[arg(long, env = "AMQP_CONNECT_TIMEOUT_SECS", value_name = "SECS")]
    connect_timeout_secs: Option<u64>,

    /// Verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging(cli.verbose);

    let result = run(cli).await;
    if let Err(e) = &result {
        error!(kind = e.kind(), "Publish failed: {}", e.report_message());
    }

    let report = PublishReport::from_result(&result);
    println!("{}", report.to_json());
    process::exit(report.exit_code());
}

async fn run(cli: Cli) -> Result<(), PublishError> {
    let params = load_params(cli)?;
    let request = PublishRequest::from_params(params)?;

    info!(
        brokers = request.urls.len(),
        tls = request.tls.is_some(),
        address = %request.address,
        "Publishing message"
    );
    publisher::publish(&request).await
}

fn load_params(cli: Cli) -> Result<PublishParams, ConfigError> {
    let base = match &cli.params {
        Some(path) => {
            info!("Loading parameters from: {}", path.display());
            PublishParams::load_from_file(path)?
        }
        None => PublishParams::default(),
    };

    let body = cli
        .body
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .map_err(|e| ConfigError::InvalidParams(format!("body is not valid JSON: {e}")))?;

    let overrides = PublishParams {
        urls: cli.urls,
        source: cli.source,
        address: cli.address,
        ack_timeout_secs: cli.ack_timeout_secs,
        connect_timeout_secs: cli.connect_timeout_secs,
        tls: TlsSection {
            ca: cli.ca,
            cert: cli.cert,
            key: cli.key,
        },
        body,
    };

    Ok(base.merge(overrides))
}
