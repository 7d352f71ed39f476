//! Trading-ledger binary: import history, run FIFO matching, log reports.
//!
//! Everything is driven by environment variables (see `config`); the binary
//! is the glue a display layer would otherwise be. Flow: refresh the access
//! token if none is supplied, pull the full order history, run one matching
//! pass under the configured fee rates, then log the monthly results.

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

use trade_ledger::config::LedgerConfig;
use trade_ledger::engine;
use trade_ledger::feed::EsiHistoryClient;
use trade_ledger::ingest;
use trade_ledger::report;
use trade_ledger::storage::Ledger;

#[tokio::main]
async fn main() -> Result<()> {
    // Logging to stdout and to a file next to the database
    let file_appender = tracing_appender::rolling::never(".", "ledger.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("trade_ledger=info".parse().expect("valid log directive"));

    let stdout_layer = fmt::layer().with_writer(std::io::stdout);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    dotenvy::dotenv().ok();
    let config = LedgerConfig::from_env();

    let trader_id: i64 = std::env::var("TRADER_ID")
        .context("TRADER_ID not set")?
        .parse()
        .context("TRADER_ID must be a numeric character id")?;

    info!("📒 Trade ledger starting for trader {}", trader_id);
    info!("   Database: {}", config.db_path);
    info!(
        "   Fee rates: acquisition {:.2}% / disposal {:.2}% / tax {:.2}%",
        config.rates.acquisition_fee_rate,
        config.rates.disposal_fee_rate,
        config.rates.tax_rate
    );

    let mut ledger = Ledger::open(&config.db_path)?;

    if let Some(path) = &config.catalog_path {
        match ledger.import_catalog_file(path) {
            Ok(count) => info!("[CATALOG] {} item names loaded from {}", count, path),
            Err(e) => warn!("[CATALOG] failed to load {}: {:#}", path, e),
        }
    }

    let client = EsiHistoryClient::new(&config.feed_base_url);

    // Prefer a ready access token; otherwise refresh through the SSO.
    let access_token = match std::env::var("ESI_ACCESS_TOKEN") {
        Ok(token) => token,
        Err(_) => {
            let client_id = std::env::var("ESI_CLIENT_ID").context("ESI_CLIENT_ID not set")?;
            let client_secret =
                std::env::var("ESI_CLIENT_SECRET").context("ESI_CLIENT_SECRET not set")?;
            let refresh_token = std::env::var("ESI_REFRESH_TOKEN")
                .context("ESI_REFRESH_TOKEN not set (log in once to obtain one)")?;

            info!("[AUTH] refreshing access token...");
            let grant = client
                .refresh_access_token(&client_id, &client_secret, &refresh_token)
                .await
                .context("refresh ESI access token")?;
            info!("[AUTH] token refreshed, valid until {}", grant.expires_at);
            grant.access_token
        }
    };

    // A failed import is not fatal: whatever landed is durable, and matching
    // can run over it. The next invocation resumes the import for free.
    match ingest::pull_order_history(&client, &mut ledger, trader_id, &access_token).await {
        Ok(run) => info!(
            "[INGEST] done: {} pages, {} new orders, {} duplicates, {} malformed",
            run.pages, run.inserted, run.duplicates, run.malformed
        ),
        Err(e) => warn!("[INGEST] history import incomplete: {} - safe to re-run", e),
    }

    let summary = engine::process_unmatched_orders(&mut ledger, trader_id, config.rates)
        .context("matching run failed")?;
    info!(
        "[MATCH] summary: {} buys / {} sells, +{} units, {} sold, {} sold without purchase",
        summary.buy_orders_processed,
        summary.sell_orders_processed,
        summary.items_added_to_inventory,
        summary.items_sold,
        summary.items_sold_without_purchase
    );

    let months = report::by_month(&ledger, trader_id)?;
    if months.is_empty() {
        info!("[REPORT] no realized sales yet");
    } else {
        info!("[REPORT] monthly results:");
        for row in &months {
            info!(
                "   {} | buys {:>5} | sells {:>5} | revenue {:>16.2} | fees+tax {:>14.2} | net {:>16.2}",
                row.month,
                row.buy_orders,
                row.sell_orders,
                row.sales_revenue,
                row.fees_and_tax,
                row.net_profit
            );
        }
    }

    Ok(())
}
