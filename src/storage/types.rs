//! Persistent record types for the ledger store.

use chrono::{DateTime, Utc};

/// A discrete quantity of one commodity acquired at a single price and time,
/// tracked until sells consume it completely.
#[derive(Debug, Clone, PartialEq)]
pub struct InventoryLot {
    pub type_id: i64,
    /// Remaining units; only ever decreases. A lot is deleted instead of
    /// being stored at zero.
    pub quantity: i64,
    pub purchase_price: f64,
    /// Buy order this lot was created from.
    pub purchase_order_id: i64,
    pub purchase_date: DateTime<Utc>,
    /// Broker fee still attributable to the remaining quantity.
    pub acquisition_fee: f64,
}

/// One realized sale slice, priced against a single inventory lot.
///
/// Append-only: `gross_profit = quantity * (sell_price - purchase_price)`,
/// `net_profit = gross_profit - acquisition_fee_share - disposal_fee - tax`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfitRecord {
    pub type_id: i64,
    pub sell_order_id: i64,
    pub sell_date: DateTime<Utc>,
    pub quantity: i64,
    pub purchase_price: f64,
    pub sell_price: f64,
    pub acquisition_fee_share: f64,
    pub disposal_fee: f64,
    pub tax: f64,
    pub gross_profit: f64,
    pub net_profit: f64,
    /// Buy order backing the consumed lot; `None` means the sale had no
    /// tracked inventory to match (stock acquired before tracking began).
    pub source_lot_order_id: Option<i64>,
}
