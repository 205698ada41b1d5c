//! One-shot query: `track-once <tracking_number> [carrier_code]`.
//!
//! Prints the formatted snapshot and its fingerprint. `--import` registers the
//! number upstream first; `--raw` prints the unnormalized body instead.

use anyhow::{Context, Result};
use clap::Parser;

use parcel_tracker::format::format_snapshot;
use parcel_tracker::telemetry::init_tracing;
use parcel_tracker::{query_with_carrier_fallback, snapshot_hash, AppConfig, TrackingApi, UpstreamClient};

/// Query one shipment through the tracking aggregator.
#[derive(Debug, Parser)]
#[command(name = "track-once")]
struct Args {
    /// Register the number upstream before querying.
    #[arg(long)]
    import: bool,

    /// Print the upstream body as-is instead of the normalized snapshot.
    #[arg(long)]
    raw: bool,

    tracking_number: String,

    /// Carrier code; omitted means auto-detect.
    carrier_code: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let Args {
        import,
        raw,
        tracking_number,
        carrier_code,
    } = Args::parse();

    let cfg = AppConfig::load().context("loading configuration")?;
    init_tracing(&cfg.log_level);
    let client = UpstreamClient::from_config(&cfg).context("building upstream client")?;

    if import {
        client
            .import_tracking(&tracking_number, carrier_code.as_deref())
            .await
            .context("import failed")?;
    }

    if raw {
        let body = client
            .query_raw(&tracking_number, carrier_code.as_deref())
            .await
            .context("query failed")?;
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    let snapshot = query_with_carrier_fallback(&client, &tracking_number, carrier_code.as_deref())
        .await
        .context("query failed")?;
    println!("{}", format_snapshot(&snapshot, None, &cfg.display_zone()));
    println!("Fingerprint: {}", snapshot_hash(&snapshot));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_and_positionals_parse_in_any_order() {
        let args = Args::try_parse_from(["track-once", "SPX1", "--raw", "SPXVN", "--import"]).unwrap();
        assert!(args.import);
        assert!(args.raw);
        assert_eq!(args.tracking_number, "SPX1");
        assert_eq!(args.carrier_code.as_deref(), Some("SPXVN"));
    }

    #[test]
    fn tracking_number_is_required() {
        assert!(Args::try_parse_from(["track-once", "--raw"]).is_err());
        let args = Args::try_parse_from(["track-once", "SPX1"]).unwrap();
        assert!(!args.import && !args.raw && args.carrier_code.is_none());
    }
}
