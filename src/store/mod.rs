pub mod types;

use std::future::Future;

use anyhow::{Context, Result};
use reqwest::{StatusCode, Url};
use tracing::debug;

use crate::error::SourceError;
use types::Row;

/// Rows asked for per request. The server may cap this lower (`max-rows`).
const DEFAULT_PAGE_SIZE: usize = 1000;
/// Column used to keep `limit`/`offset` pages stable across requests.
const DEFAULT_ORDER_BY: &str = "id";

/// A remote store that hands back every row of a named table.
pub trait TableSource: Send + Sync {
    fn fetch_all(&self, table: &str) -> impl Future<Output = Result<Vec<Row>, SourceError>> + Send;
}

/// PostgREST (Supabase) table reader.
pub struct SupabaseSource {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    page_size: usize,
    order_by: Option<String>,
}

impl SupabaseSource {
    pub fn from_env() -> Result<Self> {
        let base_url = dotenv::var("SUPABASE_URL").context("SUPABASE_URL required")?;
        let api_key = dotenv::var("SUPABASE_KEY").context("SUPABASE_KEY required")?;
        let page_size = dotenv::var("SUPABASE_PAGE_SIZE")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_PAGE_SIZE);
        // An empty SUPABASE_ORDER_BY disables ordering for tables without the column.
        let order_by = dotenv::var("SUPABASE_ORDER_BY")
            .unwrap_or_else(|_| DEFAULT_ORDER_BY.to_string());

        Ok(Self::new(base_url, api_key, page_size)?.with_order_by(&order_by))
    }

    pub fn new(base_url: String, api_key: String, page_size: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url,
            api_key,
            page_size: page_size.max(1),
            order_by: Some(DEFAULT_ORDER_BY.to_string()),
        })
    }

    pub fn with_order_by(mut self, column: &str) -> Self {
        let column = column.trim();
        self.order_by = (!column.is_empty()).then(|| column.to_string());
        self
    }

    /// `{base}/rest/v1/{table}` with the table name percent-encoded as one segment.
    fn table_url(&self, table: &str) -> Result<Url, SourceError> {
        let base = self.base_url.trim_end_matches('/');
        let base = if base.ends_with("/rest/v1") {
            base.to_string()
        } else {
            format!("{}/rest/v1", base)
        };
        let mut url = Url::parse(&base).map_err(|_| SourceError::Url(self.base_url.clone()))?;
        url.path_segments_mut()
            .map_err(|_| SourceError::Url(self.base_url.clone()))?
            .push(table);
        Ok(url)
    }

    /// One `limit`/`offset` page plus the table's total row count when the server reports it.
    async fn fetch_page(&self, table: &str, offset: usize) -> Result<Page, SourceError> {
        let mut url = self.table_url(table)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("select", "*");
            if let Some(column) = &self.order_by {
                query.append_pair("order", &format!("{}.asc", column));
            }
            query
                .append_pair("limit", &self.page_size.to_string())
                .append_pair("offset", &offset.to_string());
        }

        let resp = self
            .client
            .get(url)
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Prefer", "count=exact")
            .send()
            .await?;

        let status = resp.status();
        let total = resp
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range_total);
        let text = resp.text().await?;
        if status == StatusCode::NOT_FOUND {
            return Err(SourceError::UnknownTable(table.to_string()));
        }
        if !status.is_success() {
            return Err(SourceError::Status { status, body: text });
        }
        Ok(Page {
            rows: serde_json::from_str(&text)?,
            total,
        })
    }
}

struct Page {
    rows: Vec<Row>,
    total: Option<usize>,
}

/// Total from a PostgREST `Content-Range` header (`0-999/5230`, `*/0`); `None` for `*`.
fn parse_content_range_total(header: &str) -> Option<usize> {
    header.rsplit_once('/')?.1.trim().parse().ok()
}

impl TableSource for SupabaseSource {
    /// Pages until the reported total is reached, or until an empty page when
    /// the server gives no total. A short page alone proves nothing: the
    /// server's `max-rows` may be below our page size.
    async fn fetch_all(&self, table: &str) -> Result<Vec<Row>, SourceError> {
        let mut rows = Vec::new();
        let mut expected = None;
        loop {
            let page = self.fetch_page(table, rows.len()).await?;
            if page.total.is_some() {
                expected = page.total;
            }
            if page.rows.is_empty() {
                break;
            }
            rows.extend(page.rows);
            if expected.is_some_and(|total| rows.len() >= total) {
                break;
            }
        }

        if let Some(total) = expected {
            if rows.len() != total {
                return Err(SourceError::Incomplete {
                    table: table.to_string(),
                    expected: total,
                    received: rows.len(),
                });
            }
        }
        debug!(table, rows = rows.len(), "table fetched");
        Ok(rows)
    }
}
