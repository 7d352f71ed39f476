//! History ingestion pipeline.
//!
//! Walks the feed page by page and lands every order in the ledger through
//! insert-or-ignore. Because duplicates are skipped by construction, the
//! pipeline carries no resume state: a run that dies part-way is recovered
//! by simply running it again.

use tracing::{info, warn};

use crate::feed::{FeedError, HistoryFeed};
use crate::storage::Ledger;

/// Counters for one ingestion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Feed pages processed.
    pub pages: u32,
    /// Orders decoded across all pages.
    pub fetched: usize,
    /// Orders newly written to the ledger.
    pub inserted: usize,
    /// Orders already present and skipped.
    pub duplicates: usize,
    /// Records dropped because they failed to decode.
    pub malformed: u32,
}

/// A failure part-way through an import. Everything persisted before the
/// failing page stays persisted; `partial` says how far the run got.
#[derive(Debug)]
pub enum IngestError {
    /// Transient feed failure; a re-run resumes safely.
    Feed {
        page: u32,
        partial: IngestReport,
        source: FeedError,
    },
    /// Local persistence failure.
    Storage {
        page: u32,
        partial: IngestReport,
        source: anyhow::Error,
    },
}

impl std::fmt::Display for IngestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestError::Feed { page, partial, source } => write!(
                f,
                "history import failed fetching page {page}: {source} \
                 ({} orders from {} earlier pages kept)",
                partial.inserted, partial.pages
            ),
            IngestError::Storage { page, partial, source } => write!(
                f,
                "history import failed persisting page {page}: {source:#} \
                 ({} orders from {} earlier pages kept)",
                partial.inserted, partial.pages
            ),
        }
    }
}

impl std::error::Error for IngestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IngestError::Feed { source, .. } => Some(source),
            IngestError::Storage { .. } => None,
        }
    }
}

/// Pull the full order history for one trader into the ledger.
///
/// Pages for a single trader are inherently sequential (each continuation
/// depends on the previous response), but independent traders can run this
/// concurrently without coordination.
pub async fn pull_order_history<F: HistoryFeed>(
    feed: &F,
    ledger: &mut Ledger,
    trader_id: i64,
    access_token: &str,
) -> Result<IngestReport, IngestError> {
    let mut report = IngestReport::default();
    let mut page = 1u32;

    loop {
        let fetched = match feed.fetch_page(trader_id, access_token, page).await {
            Ok(p) => p,
            Err(source) => {
                warn!(
                    "[INGEST] trader {}: aborting on page {}: {}",
                    trader_id, page, source
                );
                return Err(IngestError::Feed { page, partial: report, source });
            }
        };

        report.malformed += fetched.malformed;
        if fetched.orders.is_empty() && !fetched.has_more {
            break;
        }

        let outcome = match ledger.insert_orders(trader_id, &fetched.orders) {
            Ok(o) => o,
            Err(source) => {
                return Err(IngestError::Storage { page, partial: report, source });
            }
        };

        report.pages += 1;
        report.fetched += fetched.orders.len();
        report.inserted += outcome.inserted;
        report.duplicates += outcome.skipped;

        info!(
            "[INGEST] trader {}: page {}: {} fetched, {} inserted, {} duplicates, {} malformed",
            trader_id,
            page,
            fetched.orders.len(),
            outcome.inserted,
            outcome.skipped,
            fetched.malformed
        );

        if !fetched.has_more {
            break;
        }
        page += 1;
    }

    info!(
        "[INGEST] trader {}: import complete: {} pages, {} orders, {} new, {} duplicates, {} malformed",
        trader_id, report.pages, report.fetched, report.inserted, report.duplicates, report.malformed
    );
    Ok(report)
}
