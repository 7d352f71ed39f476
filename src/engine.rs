//! Transactional driver for the FIFO matching algorithm.
//!
//! Loads a trader's unexhausted orders and open lots, runs the pure matcher
//! from `fifo`, and applies the whole outcome inside one IMMEDIATE
//! transaction: a failure anywhere mid-run leaves the ledger exactly as it
//! was, with every source order still unexhausted, so a retry reprocesses
//! from scratch with no special resume logic.
//!
//! A process-wide lock registry additionally serializes runs per trader;
//! two concurrent runs for the same trader could otherwise stage the same
//! lot consumption twice.

use std::sync::{Arc, Mutex, OnceLock};

use anyhow::{Context, Result};
use rusqlite::TransactionBehavior;
use rustc_hash::FxHashMap;
use tracing::info;

use crate::fees::FeeRates;
use crate::fifo::{self, MatchSummary};
use crate::storage::{self, Ledger};

fn trader_lock(trader_id: i64) -> Arc<Mutex<()>> {
    static LOCKS: OnceLock<Mutex<FxHashMap<i64, Arc<Mutex<()>>>>> = OnceLock::new();
    let registry = LOCKS.get_or_init(|| Mutex::new(FxHashMap::default()));
    let mut map = registry.lock().expect("trader lock registry poisoned");
    map.entry(trader_id)
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone()
}

/// Match all unexhausted orders for `trader_id` under the given fee rates.
///
/// Rates are snapshotted for this run only: changing them later affects
/// future runs, never already-written profit records.
pub fn process_unmatched_orders(
    ledger: &mut Ledger,
    trader_id: i64,
    rates: FeeRates,
) -> Result<MatchSummary> {
    let guard = trader_lock(trader_id);
    let _serialized = guard.lock().expect("trader lock poisoned");

    let tx = ledger
        .conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .context("begin matching transaction")?;

    let orders = storage::load_unmatched_orders(&tx, trader_id).context("load unmatched orders")?;
    if orders.is_empty() {
        info!("[MATCH] trader {}: nothing to process", trader_id);
        return Ok(MatchSummary::default());
    }
    let lots = storage::load_open_lots(&tx, trader_id).context("load open inventory lots")?;

    let outcome = fifo::execute(&orders, lots, rates);

    for (lot_id, quantity, fee) in &outcome.updated_lots {
        storage::update_lot(&tx, *lot_id, *quantity, *fee).context("update partial lot")?;
    }
    storage::delete_lots(&tx, &outcome.consumed_lot_ids).context("delete consumed lots")?;
    for lot in &outcome.new_lots {
        storage::insert_lot(&tx, trader_id, lot).context("insert new lot")?;
    }
    for record in &outcome.profits {
        storage::insert_profit(&tx, trader_id, record).context("insert profit record")?;
    }
    storage::mark_orders_exhausted(&tx, &outcome.exhausted_order_ids)
        .context("mark orders exhausted")?;

    tx.commit().context("commit matching run")?;

    let summary = outcome.summary;
    info!(
        "[MATCH] trader {}: {} buys / {} sells processed, +{} units to inventory, {} sold, {} sold without purchase",
        trader_id,
        summary.buy_orders_processed,
        summary.sell_orders_processed,
        summary.items_added_to_inventory,
        summary.items_sold,
        summary.items_sold_without_purchase
    );
    Ok(summary)
}
