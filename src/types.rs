//! Core type definitions for the trading ledger.
//!
//! This module provides the feed-facing order DTO and the ledger's own view
//! of a persisted order, shared by the ingestion pipeline, the matching
//! engine, and the reporting layer.

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Terminal state of a historical order as reported by the feed.
///
/// The history endpoint only returns orders that have left the book, so the
/// known values are `cancelled` and `expired` (an expired order may have been
/// fully filled). Anything the feed adds later is preserved as `Other`
/// instead of making the whole record undecodable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderState {
    Cancelled,
    Expired,
    #[serde(other)]
    Other,
}

impl std::fmt::Display for OrderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderState::Cancelled => write!(f, "cancelled"),
            OrderState::Expired => write!(f, "expired"),
            OrderState::Other => write!(f, "unknown"),
        }
    }
}

/// One raw order record as decoded from a feed page.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderDto {
    pub order_id: i64,
    /// Order lifetime in days.
    #[serde(default)]
    pub duration: Option<i32>,
    /// Escrow held for buy orders; absent on sells.
    #[serde(default)]
    pub escrow: Option<f64>,
    /// The feed omits this field entirely for sell orders.
    #[serde(default)]
    pub is_buy_order: bool,
    #[serde(default)]
    pub is_corporation: bool,
    pub issued: DateTime<Utc>,
    pub location_id: i64,
    #[serde(default)]
    pub min_volume: Option<i32>,
    pub price: f64,
    #[serde(default)]
    pub range: Option<String>,
    pub region_id: i64,
    pub state: OrderState,
    pub type_id: i64,
    pub volume_remain: i64,
    pub volume_total: i64,
}

impl OrderDto {
    /// Quantity actually filled before the order left the book.
    pub fn volume_effective(&self) -> i64 {
        self.volume_total - self.volume_remain
    }
}

/// A persisted ledger row for one feed-reported order.
///
/// Immutable after ingestion except for `exhausted`, which the matching
/// engine flips false -> true exactly once.
#[derive(Debug, Clone)]
pub struct TradeOrder {
    pub order_id: i64,
    pub trader_id: i64,
    pub type_id: i64,
    pub is_buy_order: bool,
    pub issued_at: DateTime<Utc>,
    pub price: f64,
    pub volume_total: i64,
    pub volume_remain: i64,
    /// `volume_total - volume_remain`, fixed at ingestion time.
    pub volume_effective: i64,
    pub location_id: i64,
    pub region_id: i64,
    pub state: String,
    pub exhausted: bool,
}
