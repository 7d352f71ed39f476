//! System configuration: endpoint constants and environment parsing.

use crate::fees::FeeRates;

/// ESI API base URL
pub const ESI_BASE_URL: &str = "https://esi.evetech.net/latest";

/// SSO token endpoint used to refresh expired access tokens
pub const SSO_TOKEN_URL: &str = "https://login.eveonline.com/v2/oauth/token";

/// Client-side cap on feed requests per second. ESI tolerates more, but a
/// full history import has no reason to burst.
pub const FEED_RATE_LIMIT_PER_SEC: u32 = 5;

/// Default buy-side broker fee percentage
pub const DEFAULT_ACQUISITION_FEE_RATE: f64 = 3.0;

/// Default sell-side broker fee percentage
pub const DEFAULT_DISPOSAL_FEE_RATE: f64 = 3.0;

/// Default sales tax percentage
pub const DEFAULT_TAX_RATE: f64 = 7.5;

/// Runtime settings for the ledger binary, all environment-driven.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// SQLite database path (`LEDGER_DB_PATH`, default `ledger.db`).
    pub db_path: String,
    /// Feed base URL override (`ESI_BASE_URL`).
    pub feed_base_url: String,
    /// Fee/tax percentages passed to each matching run.
    pub rates: FeeRates,
    /// Optional `type_id,name` catalog file (`TYPE_CATALOG_PATH`).
    pub catalog_path: Option<String>,
}

impl LedgerConfig {
    pub fn from_env() -> Self {
        Self {
            db_path: std::env::var("LEDGER_DB_PATH").unwrap_or_else(|_| "ledger.db".to_string()),
            feed_base_url: std::env::var("ESI_BASE_URL")
                .unwrap_or_else(|_| ESI_BASE_URL.to_string()),
            rates: FeeRates {
                acquisition_fee_rate: env_f64("ACQUISITION_FEE_RATE", DEFAULT_ACQUISITION_FEE_RATE),
                disposal_fee_rate: env_f64("DISPOSAL_FEE_RATE", DEFAULT_DISPOSAL_FEE_RATE),
                tax_rate: env_f64("SALES_TAX_RATE", DEFAULT_TAX_RATE),
            },
            catalog_path: std::env::var("TYPE_CATALOG_PATH").ok(),
        }
    }
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
