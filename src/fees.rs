//! Pure fee and tax arithmetic.
//!
//! All helpers return unrounded amounts. Rounding to currency precision
//! happens once, at the persistence boundary (see `storage`), so chained
//! computations never accumulate rounding drift.

/// Fee and tax percentages snapshotted for one matching run.
///
/// Rates are supplied by the caller per run and are never stored per order;
/// changing a rate affects future runs only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeeRates {
    /// Broker fee charged when a buy order is placed, in percent.
    pub acquisition_fee_rate: f64,
    /// Broker fee charged when a sell order is placed, in percent.
    pub disposal_fee_rate: f64,
    /// Sales tax charged on sell revenue, in percent.
    pub tax_rate: f64,
}

impl FeeRates {
    /// All-zero rates, mostly useful in tests.
    pub const fn zero() -> Self {
        Self {
            acquisition_fee_rate: 0.0,
            disposal_fee_rate: 0.0,
            tax_rate: 0.0,
        }
    }
}

/// Broker fee for acquiring `quantity` units at `price`.
pub fn acquisition_fee(price: f64, quantity: i64, rate_percent: f64) -> f64 {
    price * quantity as f64 * rate_percent / 100.0
}

/// Broker fee for disposing of `quantity` units at `price`.
pub fn disposal_fee(price: f64, quantity: i64, rate_percent: f64) -> f64 {
    price * quantity as f64 * rate_percent / 100.0
}

/// Sales tax on the revenue from `quantity` units at `price`.
pub fn sales_tax(price: f64, quantity: i64, rate_percent: f64) -> f64 {
    price * quantity as f64 * rate_percent / 100.0
}

/// Round a currency amount to ISK precision (2 decimal places).
pub fn round_isk(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}
