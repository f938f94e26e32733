// Copyright (c) 2025 - Cowboy AI, Inc.
//! Event Log Inspector
//!
//! Prints the persisted history of one aggregate as JSON lines, oldest first.
//! Read-only: it never appends, locks or publishes.
//!
//! Run with: cargo run --bin event-log-inspect -- <aggregate-type> <aggregate-id>
//!
//! Environment:
//! - `NATS_URL` (default: localhost:4222)
//! - `CIM_EVENT_STREAM`, `CIM_EVENT_SUBJECT_PREFIX`
//! - `RUST_LOG` (default: info)

use anyhow::{bail, Context, Result};
use cim_aggregate::config::{init_tracing, CoreConfig};
use cim_aggregate::event_store::{EventStore, NatsEventStore};
use tracing::info;

struct Args {
    aggregate_type: String,
    aggregate_id: String,
    from_version: u64,
}

impl Args {
    fn parse() -> Result<Self> {
        let mut args = std::env::args().skip(1);
        let (Some(aggregate_type), Some(aggregate_id)) = (args.next(), args.next()) else {
            bail!("usage: event-log-inspect <aggregate-type> <aggregate-id> [from-version]");
        };
        let from_version = match args.next() {
            Some(v) => v
                .parse()
                .with_context(|| format!("from-version is not a number: '{}'", v))?,
            None => 0,
        };

        Ok(Self {
            aggregate_type,
            aggregate_id,
            from_version,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args = Args::parse()?;
    let config = CoreConfig::from_env().context("Invalid configuration")?;

    info!(
        servers = ?config.nats.servers,
        stream = %config.event_store.stream_name,
        "Connecting to event log"
    );

    let store = NatsEventStore::connect(&config.nats, config.event_store.clone())
        .await
        .context("Failed to open event store")?;

    let events = store
        .read_from(&args.aggregate_type, &args.aggregate_id, args.from_version)
        .await
        .with_context(|| {
            format!(
                "Failed to read history of {}/{}",
                args.aggregate_type, args.aggregate_id
            )
        })?;

    for event in &events {
        println!("{}", serde_json::to_string(event)?);
    }

    info!(
        aggregate_type = %args.aggregate_type,
        aggregate_id = %args.aggregate_id,
        count = events.len(),
        "Done"
    );

    Ok(())
}
