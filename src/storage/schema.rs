//! Database schema creation.

use rusqlite::{Connection, Result};

/// Create all ledger tables and indexes.
///
/// Idempotent: safe to call on every open. Timestamps are stored as UNIX
/// seconds, money as REAL rounded to ISK precision on write.
pub fn create_tables(conn: &Connection) -> Result<()> {
    // Order ledger: one row per feed-reported order, keyed by the feed's
    // own order id so re-ingestion is a natural no-op.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS trade_orders (
            order_id INTEGER PRIMARY KEY,
            trader_id INTEGER NOT NULL,
            type_id INTEGER NOT NULL,
            is_buy_order INTEGER NOT NULL,
            issued_at INTEGER NOT NULL,
            price REAL NOT NULL,
            volume_total INTEGER NOT NULL,
            volume_remain INTEGER NOT NULL,
            volume_effective INTEGER NOT NULL,
            location_id INTEGER NOT NULL,
            region_id INTEGER NOT NULL,
            state TEXT NOT NULL,
            exhausted INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    // Open inventory. Rows only shrink or disappear; the AUTOINCREMENT id
    // doubles as the FIFO tie-breaker for lots sharing a purchase date.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS inventory_lots (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            trader_id INTEGER NOT NULL,
            type_id INTEGER NOT NULL,
            quantity INTEGER NOT NULL,
            purchase_price REAL NOT NULL,
            purchase_order_id INTEGER NOT NULL,
            purchase_date INTEGER NOT NULL,
            acquisition_fee REAL NOT NULL
        )",
        [],
    )?;

    // Realized results, append-only. source_lot_order_id is NULL for sales
    // that had no tracked inventory to match.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS profit_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            trader_id INTEGER NOT NULL,
            type_id INTEGER NOT NULL,
            sell_order_id INTEGER NOT NULL,
            sell_date INTEGER NOT NULL,
            quantity INTEGER NOT NULL,
            purchase_price REAL NOT NULL,
            sell_price REAL NOT NULL,
            acquisition_fee_share REAL NOT NULL,
            disposal_fee REAL NOT NULL,
            tax REAL NOT NULL,
            gross_profit REAL NOT NULL,
            net_profit REAL NOT NULL,
            source_lot_order_id INTEGER
        )",
        [],
    )?;

    // Static item catalog for the by-item report.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS item_types (
            type_id INTEGER PRIMARY KEY,
            name TEXT NOT NULL
        )",
        [],
    )?;

    // Indexes backing the matching scan and the aggregator queries
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_orders_trader_type ON trade_orders(trader_id, type_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_orders_trader_issued ON trade_orders(trader_id, issued_at)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_orders_trader_state ON trade_orders(trader_id, state)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_orders_trader_exhausted ON trade_orders(trader_id, exhausted)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_lots_fifo ON inventory_lots(trader_id, type_id, purchase_date, id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_profits_trader_date ON profit_records(trader_id, sell_date)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_profits_trader_type ON profit_records(trader_id, type_id)",
        [],
    )?;

    Ok(())
}
