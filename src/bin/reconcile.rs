//! Bulk reconcile between a primary and a secondary DynamoDB table.
//!
//! Stamps every primary item with a `_sync` marker so replication carries
//! it over, then stamps secondary items that never received the marker so
//! they replicate back.

use clap::Parser;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use stream_replicator::dynamodb::DynamoStore;
use stream_replicator::reconcile::Reconciler;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Table name, identical in both regions.
    table: String,

    /// Region of the primary table.
    primary_region: String,

    /// Region of the secondary table.
    secondary_region: String,

    /// Seconds to wait for replication between the two passes.
    #[arg(long, default_value = "20")]
    settle_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    info!(
        table = %args.table,
        primary = %args.primary_region,
        secondary = %args.secondary_region,
        "starting reconcile"
    );

    let primary = Arc::new(DynamoStore::connect(&args.primary_region).await);
    let secondary = Arc::new(DynamoStore::connect(&args.secondary_region).await);

    let report = Reconciler::new(primary, secondary, args.table)
        .with_settle(Duration::from_secs(args.settle_secs))
        .run()
        .await?;

    info!(
        primary_stamped = report.primary_stamped,
        secondary_stamped = report.secondary_stamped,
        "reconcile complete"
    );
    Ok(())
}
