//! ESI history feed client.
//!
//! Pulls paginated character order history from the EVE Swagger Interface.
//! Pagination follows the `X-Pages` response header; a 404 is the feed's way
//! of saying the pages ran out, so it ends the stream instead of failing it.
//! Requests are paced through a direct rate limiter to stay friendly to the
//! upstream during multi-page imports.

use std::num::NonZeroU32;
use std::time::Duration;

use chrono::{DateTime, Utc};
use governor::{
    clock::DefaultClock,
    middleware::NoOpMiddleware,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use serde::Deserialize;
use tracing::warn;

use crate::config::{FEED_RATE_LIMIT_PER_SEC, SSO_TOKEN_URL};
use crate::types::OrderDto;

/// One page of history plus the continuation signal.
#[derive(Debug, Default)]
pub struct FeedPage {
    pub orders: Vec<OrderDto>,
    pub has_more: bool,
    /// Records on this page that failed to decode and were skipped.
    pub malformed: u32,
}

/// Failures the ingestion pipeline can see from the feed.
#[derive(Debug)]
pub enum FeedError {
    /// Transport-level failure (connect, timeout, body read).
    Transport(reqwest::Error),
    /// Upstream answered with a non-success status other than 404.
    Status { code: u16, body: String },
    /// The page body was not a JSON array at all.
    Decode(String),
}

impl std::fmt::Display for FeedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedError::Transport(e) => write!(f, "feed transport error: {}", e),
            FeedError::Status { code, body } => write!(f, "feed returned HTTP {}: {}", code, body),
            FeedError::Decode(msg) => write!(f, "feed payload decode failed: {}", msg),
        }
    }
}

impl std::error::Error for FeedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FeedError::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for FeedError {
    fn from(e: reqwest::Error) -> Self {
        FeedError::Transport(e)
    }
}

/// A paginated source of historical trade orders.
///
/// Implemented by [`EsiHistoryClient`] for the real feed and by scripted
/// fakes in tests; the ingestion pipeline only sees this contract.
#[allow(async_fn_in_trait)]
pub trait HistoryFeed {
    async fn fetch_page(
        &self,
        trader_id: i64,
        access_token: &str,
        page: u32,
    ) -> Result<FeedPage, FeedError>;
}

/// A refreshed SSO access token and its computed expiry.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Seconds of validity; the SSO default is 20 minutes.
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    1200
}

type FeedRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

/// REST client for the character order-history endpoint.
pub struct EsiHistoryClient {
    pub http: reqwest::Client,
    base_url: String,
    limiter: FeedRateLimiter,
}

impl EsiHistoryClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("Failed to build HTTP client"),
            base_url: base_url.into(),
            limiter: RateLimiter::direct(Quota::per_second(
                NonZeroU32::new(FEED_RATE_LIMIT_PER_SEC).expect("rate limit must be nonzero"),
            )),
        }
    }

    /// Exchange a refresh token for a fresh access token at the SSO.
    pub async fn refresh_access_token(
        &self,
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
    ) -> Result<TokenGrant, FeedError> {
        let resp = self
            .http
            .post(SSO_TOKEN_URL)
            .basic_auth(client_id, Some(client_secret))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            let code = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(FeedError::Status { code, body });
        }

        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| FeedError::Decode(e.to_string()))?;
        Ok(TokenGrant {
            access_token: token.access_token,
            expires_at: Utc::now() + chrono::Duration::seconds(token.expires_in),
        })
    }
}

impl HistoryFeed for EsiHistoryClient {
    async fn fetch_page(
        &self,
        trader_id: i64,
        access_token: &str,
        page: u32,
    ) -> Result<FeedPage, FeedError> {
        self.limiter.until_ready().await;

        let url = format!("{}/characters/{}/orders/history/", self.base_url, trader_id);
        let resp = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .query(&[("page", page)])
            .send()
            .await?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            // Past the last page: graceful end-of-stream, not an error.
            return Ok(FeedPage::default());
        }
        if !resp.status().is_success() {
            let code = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(FeedError::Status { code, body });
        }

        let total_pages: u32 = resp
            .headers()
            .get("x-pages")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(1);

        let raw: Vec<serde_json::Value> = resp
            .json()
            .await
            .map_err(|e| FeedError::Decode(e.to_string()))?;

        let (orders, malformed) = decode_page_records(raw);
        Ok(FeedPage {
            orders,
            has_more: page < total_pages,
            malformed,
        })
    }
}

/// Decode page elements one at a time so a single bad record is skipped and
/// counted instead of poisoning the whole page.
fn decode_page_records(raw: Vec<serde_json::Value>) -> (Vec<OrderDto>, u32) {
    let mut orders = Vec::with_capacity(raw.len());
    let mut malformed = 0u32;
    for value in raw {
        match serde_json::from_value::<OrderDto>(value) {
            Ok(order) => orders.push(order),
            Err(e) => {
                malformed += 1;
                warn!("[FEED] skipping malformed order record: {}", e);
            }
        }
    }
    (orders, malformed)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test: one malformed element is dropped and counted; the rest of the
    /// page decodes normally.
    #[test]
    fn malformed_record_skipped_not_fatal() {
        let raw = vec![
            serde_json::json!({
                "issued": "2024-03-01T00:00:00Z",
                "location_id": 1,
                "order_id": 1,
                "price": 10.0,
                "region_id": 1,
                "state": "expired",
                "type_id": 34,
                "volume_remain": 0,
                "volume_total": 10
            }),
            serde_json::json!({ "order_id": "not-a-number" }),
            serde_json::json!({
                "issued": "2024-03-02T00:00:00Z",
                "location_id": 1,
                "order_id": 2,
                "price": 12.0,
                "region_id": 1,
                "state": "cancelled",
                "type_id": 34,
                "volume_remain": 5,
                "volume_total": 10
            }),
        ];

        let (orders, malformed) = decode_page_records(raw);
        assert_eq!(orders.len(), 2);
        assert_eq!(malformed, 1);
        assert_eq!(orders[1].order_id, 2);
    }

    /// Test: an empty page decodes to an empty, clean result.
    #[test]
    fn empty_page_decodes_cleanly() {
        let (orders, malformed) = decode_page_records(Vec::new());
        assert!(orders.is_empty());
        assert_eq!(malformed, 0);
    }
}
