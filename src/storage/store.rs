//! Ledger store: open/insert/load operations over SQLite.
//!
//! `Ledger` owns the connection and exposes the write paths used by the
//! ingestion pipeline plus read-only accessors for display layers and tests.
//! The lower-level helpers operate on a plain `Connection` so the matching
//! engine can run them inside its own transaction.

use anyhow::{Context, Result};
use chrono::DateTime;
use rusqlite::{params, Connection};
use tracing::{info, warn};

use super::schema::create_tables;
use super::types::{InventoryLot, ProfitRecord};
use crate::fees::round_isk;
use crate::types::{OrderDto, TradeOrder};

/// Counters returned by one page persist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertOutcome {
    /// Rows actually written.
    pub inserted: usize,
    /// Rows ignored because the order id was already present.
    pub skipped: usize,
}

/// An inventory lot as loaded from the database, keyed by its rowid.
#[derive(Debug, Clone)]
pub struct StoredLot {
    pub id: i64,
    pub lot: InventoryLot,
}

/// Durable store for orders, lots, profit records, and the item catalog.
pub struct Ledger {
    pub(crate) conn: Connection,
}

impl Ledger {
    /// Open (or create) the ledger database at `path`.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("open ledger database at {path}"))?;
        create_tables(&conn).context("create ledger tables")?;
        info!("[LEDGER] Database ready at {}", path);
        Ok(Self { conn })
    }

    /// In-memory ledger, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory ledger")?;
        create_tables(&conn).context("create ledger tables")?;
        Ok(Self { conn })
    }

    /// Borrow the underlying connection for ad-hoc read queries.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Mutable escape hatch for callers that manage their own transactions.
    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Persist one page of feed orders for `trader_id`.
    ///
    /// Insert-or-ignore keyed on the feed's order id: re-ingesting a page
    /// that was already persisted is a no-op, which is what makes a failed
    /// import safe to simply re-run. The whole page commits as one
    /// transaction.
    pub fn insert_orders(&mut self, trader_id: i64, orders: &[OrderDto]) -> Result<InsertOutcome> {
        let tx = self.conn.transaction().context("begin page transaction")?;
        let mut outcome = InsertOutcome::default();
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO trade_orders
                 (order_id, trader_id, type_id, is_buy_order, issued_at, price,
                  volume_total, volume_remain, volume_effective, location_id,
                  region_id, state, exhausted)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, 0)",
            )?;
            for order in orders {
                let changed = stmt.execute(params![
                    order.order_id,
                    trader_id,
                    order.type_id,
                    order.is_buy_order,
                    order.issued.timestamp(),
                    order.price,
                    order.volume_total,
                    order.volume_remain,
                    order.volume_effective(),
                    order.location_id,
                    order.region_id,
                    order.state.to_string(),
                ])?;
                if changed > 0 {
                    outcome.inserted += 1;
                } else {
                    outcome.skipped += 1;
                }
            }
        }
        tx.commit().context("commit page transaction")?;
        Ok(outcome)
    }

    /// Orders not yet visited by the matching engine.
    pub fn unmatched_order_count(&self, trader_id: i64) -> Result<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM trade_orders WHERE trader_id = ?1 AND exhausted = 0",
            [trader_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Open inventory in FIFO consumption order.
    pub fn open_lots(&self, trader_id: i64) -> Result<Vec<StoredLot>> {
        let lots = load_open_lots(&self.conn, trader_id).context("load open lots")?;
        Ok(lots)
    }

    /// All profit records for a trader, oldest first.
    pub fn profit_records(&self, trader_id: i64) -> Result<Vec<ProfitRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT type_id, sell_order_id, sell_date, quantity, purchase_price,
                    sell_price, acquisition_fee_share, disposal_fee, tax,
                    gross_profit, net_profit, source_lot_order_id
             FROM profit_records WHERE trader_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map([trader_id], |row| {
            Ok(ProfitRecord {
                type_id: row.get(0)?,
                sell_order_id: row.get(1)?,
                sell_date: timestamp_to_utc(row.get(2)?),
                quantity: row.get(3)?,
                purchase_price: row.get(4)?,
                sell_price: row.get(5)?,
                acquisition_fee_share: row.get(6)?,
                disposal_fee: row.get(7)?,
                tax: row.get(8)?,
                gross_profit: row.get(9)?,
                net_profit: row.get(10)?,
                source_lot_order_id: row.get(11)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Load or refresh entries in the static item catalog.
    pub fn upsert_item_names(&mut self, entries: &[(i64, String)]) -> Result<usize> {
        let tx = self.conn.transaction().context("begin catalog transaction")?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO item_types (type_id, name) VALUES (?1, ?2)
                 ON CONFLICT(type_id) DO UPDATE SET name = excluded.name",
            )?;
            for (type_id, name) in entries {
                stmt.execute(params![type_id, name])?;
            }
        }
        tx.commit().context("commit catalog transaction")?;
        Ok(entries.len())
    }

    /// Import a `type_id,name` catalog file (one entry per line).
    ///
    /// Unparseable lines (including a header) are skipped with a warning,
    /// never failing the import.
    pub fn import_catalog_file(&mut self, path: &str) -> Result<usize> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read catalog file {path}"))?;

        let mut entries = Vec::new();
        let mut bad = 0usize;
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match line.split_once(',') {
                Some((id, name)) if !name.trim().is_empty() => match id.trim().parse::<i64>() {
                    Ok(type_id) => entries.push((type_id, name.trim().to_string())),
                    Err(_) => bad += 1,
                },
                _ => bad += 1,
            }
        }
        if bad > 0 {
            warn!("[CATALOG] {} unparseable lines skipped in {}", bad, path);
        }
        self.upsert_item_names(&entries)
    }
}

fn timestamp_to_utc(secs: i64) -> chrono::DateTime<chrono::Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or(DateTime::UNIX_EPOCH)
}

/// Unexhausted orders for one trader in global time order, the order the
/// matching engine must visit them in. Ties on the issue timestamp fall back
/// to the order id so runs are deterministic.
pub(crate) fn load_unmatched_orders(
    conn: &Connection,
    trader_id: i64,
) -> rusqlite::Result<Vec<TradeOrder>> {
    let mut stmt = conn.prepare(
        "SELECT order_id, trader_id, type_id, is_buy_order, issued_at, price,
                volume_total, volume_remain, volume_effective, location_id,
                region_id, state, exhausted
         FROM trade_orders
         WHERE trader_id = ?1 AND exhausted = 0
         ORDER BY issued_at ASC, order_id ASC",
    )?;
    let rows = stmt.query_map([trader_id], |row| {
        Ok(TradeOrder {
            order_id: row.get(0)?,
            trader_id: row.get(1)?,
            type_id: row.get(2)?,
            is_buy_order: row.get(3)?,
            issued_at: timestamp_to_utc(row.get(4)?),
            price: row.get(5)?,
            volume_total: row.get(6)?,
            volume_remain: row.get(7)?,
            volume_effective: row.get(8)?,
            location_id: row.get(9)?,
            region_id: row.get(10)?,
            state: row.get(11)?,
            exhausted: row.get(12)?,
        })
    })?;
    rows.collect()
}

/// Open lots for one trader ordered for FIFO consumption:
/// oldest purchase date first, creation order breaking ties.
pub(crate) fn load_open_lots(conn: &Connection, trader_id: i64) -> rusqlite::Result<Vec<StoredLot>> {
    let mut stmt = conn.prepare(
        "SELECT id, type_id, quantity, purchase_price, purchase_order_id,
                purchase_date, acquisition_fee
         FROM inventory_lots
         WHERE trader_id = ?1
         ORDER BY purchase_date ASC, id ASC",
    )?;
    let rows = stmt.query_map([trader_id], |row| {
        Ok(StoredLot {
            id: row.get(0)?,
            lot: InventoryLot {
                type_id: row.get(1)?,
                quantity: row.get(2)?,
                purchase_price: row.get(3)?,
                purchase_order_id: row.get(4)?,
                purchase_date: timestamp_to_utc(row.get(5)?),
                acquisition_fee: row.get(6)?,
            },
        })
    })?;
    rows.collect()
}

pub(crate) fn insert_lot(conn: &Connection, trader_id: i64, lot: &InventoryLot) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO inventory_lots
         (trader_id, type_id, quantity, purchase_price, purchase_order_id,
          purchase_date, acquisition_fee)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            trader_id,
            lot.type_id,
            lot.quantity,
            round_isk(lot.purchase_price),
            lot.purchase_order_id,
            lot.purchase_date.timestamp(),
            round_isk(lot.acquisition_fee),
        ],
    )?;
    Ok(())
}

pub(crate) fn update_lot(
    conn: &Connection,
    lot_id: i64,
    quantity: i64,
    acquisition_fee: f64,
) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE inventory_lots SET quantity = ?2, acquisition_fee = ?3 WHERE id = ?1",
        params![lot_id, quantity, round_isk(acquisition_fee)],
    )?;
    Ok(())
}

pub(crate) fn delete_lots(conn: &Connection, lot_ids: &[i64]) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare_cached("DELETE FROM inventory_lots WHERE id = ?1")?;
    for id in lot_ids {
        stmt.execute([id])?;
    }
    Ok(())
}

pub(crate) fn insert_profit(
    conn: &Connection,
    trader_id: i64,
    record: &ProfitRecord,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO profit_records
         (trader_id, type_id, sell_order_id, sell_date, quantity, purchase_price,
          sell_price, acquisition_fee_share, disposal_fee, tax, gross_profit,
          net_profit, source_lot_order_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            trader_id,
            record.type_id,
            record.sell_order_id,
            record.sell_date.timestamp(),
            record.quantity,
            round_isk(record.purchase_price),
            round_isk(record.sell_price),
            round_isk(record.acquisition_fee_share),
            round_isk(record.disposal_fee),
            round_isk(record.tax),
            round_isk(record.gross_profit),
            round_isk(record.net_profit),
            record.source_lot_order_id,
        ],
    )?;
    Ok(())
}

/// Flag visited orders so no future run reprocesses them. The guard on the
/// current flag value makes the false -> true transition happen exactly once.
pub(crate) fn mark_orders_exhausted(conn: &Connection, order_ids: &[i64]) -> rusqlite::Result<usize> {
    let mut stmt = conn
        .prepare_cached("UPDATE trade_orders SET exhausted = 1 WHERE order_id = ?1 AND exhausted = 0")?;
    let mut changed = 0usize;
    for id in order_ids {
        changed += stmt.execute([id])?;
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OrderState;
    use chrono::Utc;

    fn dto(order_id: i64, is_buy: bool, total: i64, remain: i64) -> OrderDto {
        OrderDto {
            order_id,
            duration: Some(90),
            escrow: None,
            is_buy_order: is_buy,
            is_corporation: false,
            issued: Utc::now(),
            location_id: 60003760,
            min_volume: Some(1),
            price: 10.0,
            range: Some("station".into()),
            region_id: 10000002,
            state: OrderState::Expired,
            type_id: 34,
            volume_remain: remain,
            volume_total: total,
        }
    }

    /// Test: re-inserting the same orders skips every row.
    #[test]
    fn insert_is_idempotent_on_order_id() {
        let mut ledger = Ledger::open_in_memory().unwrap();
        let orders = vec![dto(1, true, 10, 0), dto(2, false, 5, 0)];

        let first = ledger.insert_orders(7, &orders).unwrap();
        assert_eq!(first, InsertOutcome { inserted: 2, skipped: 0 });

        let second = ledger.insert_orders(7, &orders).unwrap();
        assert_eq!(second, InsertOutcome { inserted: 0, skipped: 2 });
        assert_eq!(ledger.unmatched_order_count(7).unwrap(), 2);
    }

    /// Test: exhausting an order is a one-shot transition.
    #[test]
    fn exhausted_flag_flips_once() {
        let mut ledger = Ledger::open_in_memory().unwrap();
        ledger.insert_orders(7, &[dto(1, true, 10, 0)]).unwrap();

        assert_eq!(mark_orders_exhausted(&ledger.conn, &[1]).unwrap(), 1);
        assert_eq!(mark_orders_exhausted(&ledger.conn, &[1]).unwrap(), 0);
        assert_eq!(ledger.unmatched_order_count(7).unwrap(), 0);
    }

    /// Test: money fields are rounded to ISK precision when persisted.
    #[test]
    fn profit_amounts_round_at_persistence() {
        let ledger = Ledger::open_in_memory().unwrap();
        let record = ProfitRecord {
            type_id: 34,
            sell_order_id: 9,
            sell_date: Utc::now(),
            quantity: 3,
            purchase_price: 1.23456,
            sell_price: 2.0,
            acquisition_fee_share: 0.123,
            disposal_fee: 0.456,
            tax: 0.789,
            gross_profit: 2.29632,
            net_profit: 0.92832,
            source_lot_order_id: Some(1),
        };
        insert_profit(&ledger.conn, 7, &record).unwrap();

        let stored = &ledger.profit_records(7).unwrap()[0];
        assert_eq!(stored.purchase_price, 1.23);
        assert_eq!(stored.acquisition_fee_share, 0.12);
        assert_eq!(stored.disposal_fee, 0.46);
        assert_eq!(stored.tax, 0.79);
        assert_eq!(stored.gross_profit, 2.3);
        assert_eq!(stored.net_profit, 0.93);
    }

    /// Test: catalog upserts replace names in place.
    #[test]
    fn catalog_upsert_replaces_names() {
        let mut ledger = Ledger::open_in_memory().unwrap();
        ledger
            .upsert_item_names(&[(34, "Tritanium".to_string())])
            .unwrap();
        ledger
            .upsert_item_names(&[(34, "Tritanium (renamed)".to_string())])
            .unwrap();

        let name: String = ledger
            .conn
            .query_row("SELECT name FROM item_types WHERE type_id = 34", [], |r| r.get(0))
            .unwrap();
        assert_eq!(name, "Tritanium (renamed)");
    }
}
