//! chunkwire-ctl — push a JSON payload through a loopback chunkwire
//! session and print what the receiving side delivered.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;

use chunkwire::{LoopbackChannel, Receiver, Session};
use chunkwire_core::config::ChunkwireConfig;
use chunkwire_core::Payload;

const DEFAULT_NAMESPACE: &str = "CTL";

struct Args {
    namespace: String,
    config: Option<PathBuf>,
    input: Option<PathBuf>,
}

fn print_usage() {
    println!("Usage: chunkwire-ctl [--namespace <ns>] [--config <path>] [<file.json>]");
    println!();
    println!("Reads a JSON object from <file.json> (or stdin), sends it in chunks");
    println!("through an in-process receiver and prints the reassembled payload.");
    println!();
    println!("Options:");
    println!("  --namespace <ns>   Transfer namespace (default: {})", DEFAULT_NAMESPACE);
    println!("  --config <path>    Config file (default: $CHUNKWIRE_CONFIG or XDG path)");
}

fn parse_args() -> Result<Option<Args>> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut parsed = Args {
        namespace: DEFAULT_NAMESPACE.to_string(),
        config: None,
        input: None,
    };

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--namespace" => {
                i += 1;
                parsed.namespace = args.get(i).context("--namespace requires a value")?.clone();
            }
            "--config" => {
                i += 1;
                parsed.config = Some(args.get(i).context("--config requires a value")?.into());
            }
            "help" | "--help" | "-h" => return Ok(None),
            other => parsed.input = Some(PathBuf::from(other)),
        }
        i += 1;
    }
    Ok(Some(parsed))
}

fn read_input(path: Option<&PathBuf>) -> Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display())),
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("failed to read stdin")?;
            Ok(text)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let Some(args) = parse_args()? else {
        print_usage();
        return Ok(());
    };

    let config = match &args.config {
        Some(path) => ChunkwireConfig::load_from(path),
        None => {
            if let Err(e) = ChunkwireConfig::write_default_if_missing() {
                tracing::warn!(error = %e, "failed to write default config");
            }
            ChunkwireConfig::load()
        }
    }
    .unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        ChunkwireConfig::default()
    });

    let text = read_input(args.input.as_ref())?;
    let json: serde_json::Value = serde_json::from_str(&text).context("input is not valid JSON")?;
    let payload = Payload::try_from(json).context("input cannot be sent as a payload")?;

    let receiver = Arc::new(Receiver::from_config(&config).context("invalid receiver config")?);
    let (delivered_tx, mut delivered_rx) = mpsc::unbounded_channel();
    receiver
        .register(&args.namespace, move |payload| {
            let _ = delivered_tx.send(payload.to_json());
        })
        .context("failed to register namespace")?;

    let channel = Arc::new(LoopbackChannel::new(receiver.clone()));
    let session = Session::new(channel, &config);

    tracing::info!(
        namespace = %args.namespace,
        fields = payload.len(),
        "sending payload"
    );
    session
        .send(&args.namespace, &payload)
        .await
        .context("transfer failed")?;

    let delivered = delivered_rx
        .try_recv()
        .context("receiver did not deliver the payload")?;
    println!("{}", serde_json::to_string_pretty(&delivered)?);
    Ok(())
}
