//! SQLite-backed order ledger.
//!
//! One normalized schema scoped by `trader_id` holds the order ledger,
//! inventory lots, profit records, and the static item catalog. All writes
//! from a matching run share a single transaction; ingestion commits one
//! transaction per feed page.

pub mod schema;
mod store;
mod types;

pub use store::{InsertOutcome, Ledger, StoredLot};
pub use types::{InventoryLot, ProfitRecord};

pub(crate) use store::{
    delete_lots, insert_lot, insert_profit, load_open_lots, load_unmatched_orders,
    mark_orders_exhausted, update_lot,
};
