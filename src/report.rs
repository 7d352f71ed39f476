//! Read-only profit aggregation queries.
//!
//! All three views are snapshot reads over the order ledger and profit
//! records. A trader with no data gets an empty vector, never an error, and
//! reads are safe to run concurrently with ingestion or a matching run.

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveTime};
use rusqlite::{params, Connection};
use rustc_hash::FxHashMap;

use crate::storage::Ledger;

const MONTH_BUCKET: &str = "%Y-%m";
const DAY_BUCKET: &str = "%Y-%m-%d";

/// Aggregated trading results for one calendar month.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyRow {
    /// Calendar month of the sales, as `YYYY-MM`.
    pub month: String,
    /// Distinct buy orders issued in this month.
    pub buy_orders: i64,
    /// Distinct sell orders realized in this month.
    pub sell_orders: i64,
    pub sales_revenue: f64,
    pub fees_and_tax: f64,
    pub net_profit: f64,
}

/// Same shape as [`MonthlyRow`], bucketed by calendar day.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyRow {
    /// Calendar day of the sales, as `YYYY-MM-DD`.
    pub day: String,
    pub buy_orders: i64,
    pub sell_orders: i64,
    pub sales_revenue: f64,
    pub fees_and_tax: f64,
    pub net_profit: f64,
}

/// Per-commodity results over a date range, best net profit first.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemRow {
    pub type_id: i64,
    /// Human-readable name from the static catalog, or a placeholder when
    /// the catalog has no entry.
    pub item_name: String,
    pub buy_orders: i64,
    pub sell_orders: i64,
    pub quantity_sold: i64,
    pub sales_revenue: f64,
    pub fees_and_tax: f64,
    pub net_profit: f64,
}

/// Monthly results for a trader, most recent month first.
pub fn by_month(ledger: &Ledger, trader_id: i64) -> Result<Vec<MonthlyRow>> {
    let conn = &ledger.conn;
    let buys = buy_counts_by_bucket(conn, trader_id, MONTH_BUCKET, None)
        .context("count buy orders per month")?;

    let mut stmt = conn.prepare(
        "SELECT strftime('%Y-%m', sell_date, 'unixepoch') AS bucket,
                COUNT(DISTINCT sell_order_id),
                SUM(quantity * sell_price),
                SUM(acquisition_fee_share + disposal_fee + tax),
                SUM(net_profit)
         FROM profit_records
         WHERE trader_id = ?1
         GROUP BY bucket
         ORDER BY bucket DESC",
    )?;
    let rows = stmt.query_map([trader_id], |row| {
        Ok(MonthlyRow {
            month: row.get(0)?,
            buy_orders: 0,
            sell_orders: row.get(1)?,
            sales_revenue: row.get(2)?,
            fees_and_tax: row.get(3)?,
            net_profit: row.get(4)?,
        })
    })?;

    let mut out = Vec::new();
    for row in rows {
        let mut row = row?;
        row.buy_orders = buys.get(&row.month).copied().unwrap_or(0);
        out.push(row);
    }
    Ok(out)
}

/// Daily results over an inclusive date range, most recent day first.
pub fn by_day(
    ledger: &Ledger,
    trader_id: i64,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<DailyRow>> {
    let conn = &ledger.conn;
    let (start, end) = range_bounds(from, to);
    let buys = buy_counts_by_bucket(conn, trader_id, DAY_BUCKET, Some((start, end)))
        .context("count buy orders per day")?;

    let mut stmt = conn.prepare(
        "SELECT strftime('%Y-%m-%d', sell_date, 'unixepoch') AS bucket,
                COUNT(DISTINCT sell_order_id),
                SUM(quantity * sell_price),
                SUM(acquisition_fee_share + disposal_fee + tax),
                SUM(net_profit)
         FROM profit_records
         WHERE trader_id = ?1 AND sell_date >= ?2 AND sell_date < ?3
         GROUP BY bucket
         ORDER BY bucket DESC",
    )?;
    let rows = stmt.query_map(params![trader_id, start, end], |row| {
        Ok(DailyRow {
            day: row.get(0)?,
            buy_orders: 0,
            sell_orders: row.get(1)?,
            sales_revenue: row.get(2)?,
            fees_and_tax: row.get(3)?,
            net_profit: row.get(4)?,
        })
    })?;

    let mut out = Vec::new();
    for row in rows {
        let mut row = row?;
        row.buy_orders = buys.get(&row.day).copied().unwrap_or(0);
        out.push(row);
    }
    Ok(out)
}

/// Per-item results over an inclusive date range, ordered by net profit
/// descending. Item names come from the static catalog when present.
pub fn by_item(
    ledger: &Ledger,
    trader_id: i64,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<ItemRow>> {
    let conn = &ledger.conn;
    let (start, end) = range_bounds(from, to);

    let mut buys: FxHashMap<i64, i64> = FxHashMap::default();
    {
        let mut stmt = conn.prepare(
            "SELECT type_id, COUNT(*)
             FROM trade_orders
             WHERE trader_id = ?1 AND is_buy_order = 1
               AND issued_at >= ?2 AND issued_at < ?3
             GROUP BY type_id",
        )?;
        let rows = stmt.query_map(params![trader_id, start, end], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (type_id, count) = row?;
            buys.insert(type_id, count);
        }
    }

    let mut stmt = conn.prepare(
        "SELECT p.type_id,
                t.name,
                COUNT(DISTINCT p.sell_order_id),
                SUM(p.quantity),
                SUM(p.quantity * p.sell_price),
                SUM(p.acquisition_fee_share + p.disposal_fee + p.tax),
                SUM(p.net_profit)
         FROM profit_records p
         LEFT JOIN item_types t ON t.type_id = p.type_id
         WHERE p.trader_id = ?1 AND p.sell_date >= ?2 AND p.sell_date < ?3
         GROUP BY p.type_id
         ORDER BY SUM(p.net_profit) DESC",
    )?;
    let rows = stmt.query_map(params![trader_id, start, end], |row| {
        let type_id: i64 = row.get(0)?;
        let name: Option<String> = row.get(1)?;
        Ok(ItemRow {
            type_id,
            item_name: name.unwrap_or_else(|| format!("Type #{type_id}")),
            buy_orders: 0,
            sell_orders: row.get(2)?,
            quantity_sold: row.get(3)?,
            sales_revenue: row.get(4)?,
            fees_and_tax: row.get(5)?,
            net_profit: row.get(6)?,
        })
    })?;

    let mut out = Vec::new();
    for row in rows {
        let mut row = row?;
        row.buy_orders = buys.get(&row.type_id).copied().unwrap_or(0);
        out.push(row);
    }
    Ok(out)
}

/// Distinct buy orders issued per time bucket, optionally range-restricted.
/// `bucket_fmt` is one of this module's strftime constants.
fn buy_counts_by_bucket(
    conn: &Connection,
    trader_id: i64,
    bucket_fmt: &str,
    range: Option<(i64, i64)>,
) -> rusqlite::Result<FxHashMap<String, i64>> {
    let mut counts = FxHashMap::default();
    match range {
        Some((start, end)) => {
            let sql = format!(
                "SELECT strftime('{bucket_fmt}', issued_at, 'unixepoch') AS bucket, COUNT(*)
                 FROM trade_orders
                 WHERE trader_id = ?1 AND is_buy_order = 1
                   AND issued_at >= ?2 AND issued_at < ?3
                 GROUP BY bucket"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![trader_id, start, end], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (bucket, count) = row?;
                counts.insert(bucket, count);
            }
        }
        None => {
            let sql = format!(
                "SELECT strftime('{bucket_fmt}', issued_at, 'unixepoch') AS bucket, COUNT(*)
                 FROM trade_orders
                 WHERE trader_id = ?1 AND is_buy_order = 1
                 GROUP BY bucket"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([trader_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (bucket, count) = row?;
                counts.insert(bucket, count);
            }
        }
    }
    Ok(counts)
}

/// UNIX-second bounds for an inclusive [from, to] day range: start of `from`
/// up to (exclusive) the start of the day after `to`.
fn range_bounds(from: NaiveDate, to: NaiveDate) -> (i64, i64) {
    let start = from.and_time(NaiveTime::MIN).and_utc().timestamp();
    let end = match to.succ_opt() {
        Some(day) => day.and_time(NaiveTime::MIN).and_utc().timestamp(),
        None => i64::MAX,
    };
    (start, end)
}
