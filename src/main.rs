//! Outbound - command line entry point
//!
//! Sends one request through the configured proxy rotation and prints the
//! response.

use std::io::Write;

use anyhow::{bail, Context};
use clap::Parser;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use outbound::config::LogConfig;
use outbound::{Config, HttpContext, HttpRequest, ProxyEndpoint};

#[derive(Parser)]
#[command(name = "outbound")]
#[command(about = "Send an HTTP request through the outbound client", long_about = None)]
struct Cli {
    /// Target URL
    url: String,

    /// HTTP method
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,

    /// Extra header, as 'Name: value'
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,

    /// Request body
    #[arg(short, long)]
    data: Option<String>,

    /// Pin the request to this proxy instead of the rotation
    #[arg(long)]
    proxy: Option<String>,

    /// Print client events as JSON lines on stderr
    #[arg(long)]
    events: bool,
}

fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("outbound={}", log.level).into());

    let registry = tracing_subscriber::registry().with(filter);
    if log.format.eq_ignore_ascii_case("pretty") {
        registry
            .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    }
}

fn parse_headers(raw: &[String]) -> anyhow::Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    for entry in raw {
        let Some((name, value)) = entry.split_once(':') else {
            bail!("header '{}' is not in 'Name: value' form", entry);
        };
        let name = HeaderName::from_bytes(name.trim().as_bytes())
            .with_context(|| format!("invalid header name in '{}'", entry))?;
        let value = HeaderValue::from_str(value.trim())
            .with_context(|| format!("invalid header value in '{}'", entry))?;
        headers.append(name, value);
    }
    Ok(headers)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::from_env()?;
    init_tracing(&config.log);

    let method = Method::from_bytes(cli.method.to_uppercase().as_bytes())
        .with_context(|| format!("invalid method '{}'", cli.method))?;
    let headers = parse_headers(&cli.headers)?;

    let context = HttpContext::from_config(config)?;
    let mut events = context.subscribe();

    let mut builder = context.client_builder();
    if let Some(proxy) = &cli.proxy {
        builder = builder.static_proxy(ProxyEndpoint::parse(proxy)?);
    }
    let client = builder.build()?;

    let cancel = CancellationToken::new();
    let request = HttpRequest::parse(method, &cli.url)?
        .with_headers(headers)
        .with_body(cli.data.unwrap_or_default())
        .with_cancellation(cancel.clone());

    let outcome = tokio::select! {
        outcome = client.send_raw_request(request) => outcome,
        _ = signal::ctrl_c() => {
            warn!("Interrupted, cancelling request");
            cancel.cancel();
            Err(outbound::OutboundError::Cancelled)
        }
    };

    if cli.events {
        while let Ok(event) = events.try_recv() {
            eprintln!("{}", serde_json::to_string(&event)?);
        }
    }

    let response = outcome?;
    info!(status = response.status().as_u16(), "Request complete");

    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", response.status())?;
    for (name, value) in response.headers() {
        writeln!(stdout, "{}: {}", name, value.to_str().unwrap_or("<binary>"))?;
    }
    writeln!(stdout)?;
    stdout.write_all(response.body())?;
    stdout.flush()?;

    Ok(())
}
