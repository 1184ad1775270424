use std::time::Duration;

use super::{LookupError, LookupFuture, SearchHit, TitleSearch, scholar_search_url};
use crate::rate_limit::parse_retry_after;

pub const NAME: &str = "Google Scholar";

const SEARCH_URL: &str = "https://serpapi.com/search.json";

/// Words in a SerpAPI error message that mean the account budget is spent.
const QUOTA_KEYWORDS: &[&str] = &["exceed", "limit", "run out", "searches"];

/// Google Scholar through SerpAPI; the web-scale secondary search.
pub struct GoogleScholar {
    api_key: String,
}

impl GoogleScholar {
    pub fn new(api_key: String) -> Self {
        Self { api_key }
    }
}

impl TitleSearch for GoogleScholar {
    fn name(&self) -> &str {
        NAME
    }

    fn is_budgeted(&self) -> bool {
        true
    }

    fn search<'a>(
        &'a self,
        query: &'a str,
        limit: usize,
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> LookupFuture<'a, Vec<SearchHit>> {
        Box::pin(async move {
            let url = format!(
                "{}?engine=google_scholar&q={}&num={}&api_key={}",
                SEARCH_URL,
                urlencoding::encode(query),
                limit.max(1),
                urlencoding::encode(&self.api_key)
            );

            let resp = client.get(&url).timeout(timeout).send().await?;

            let status = resp.status();
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);

            // SerpAPI reports problems in a JSON "error" field, with or
            // without a failing status code.
            let body = resp.text().await?;
            let data: Option<serde_json::Value> = serde_json::from_str(&body).ok();

            if let Some(err) = data.as_ref().and_then(|d| d["error"].as_str()) {
                if is_quota_message(err) {
                    return Err(LookupError::QuotaExceeded(err.to_string()));
                }
                if status.as_u16() == 429 {
                    return Err(LookupError::RateLimited { retry_after });
                }
                // "Google hasn't returned any results" is an empty result set.
                if err.to_lowercase().contains("hasn't returned any results") {
                    return Ok(vec![]);
                }
                return Err(LookupError::Transport(err.to_string()));
            }
            if status.as_u16() == 429 {
                return Err(LookupError::RateLimited { retry_after });
            }
            if !status.is_success() {
                return Err(LookupError::Http {
                    status: status.as_u16(),
                });
            }

            let data = data.ok_or_else(|| LookupError::Parse("body is not JSON".into()))?;
            Ok(parse_organic_results(&data, query, limit))
        })
    }
}

fn is_quota_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    QUOTA_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Candidates from `organic_results`. The reported URL is the Scholar search
/// page for the query so a reviewer lands on the same result list.
fn parse_organic_results(data: &serde_json::Value, query: &str, limit: usize) -> Vec<SearchHit> {
    let search_url = scholar_search_url(query);
    data["organic_results"]
        .as_array()
        .map(|results| {
            results
                .iter()
                .filter_map(|r| r["title"].as_str())
                .take(limit.max(1))
                .map(|title| SearchHit {
                    title: title.to_string(),
                    url: Some(search_url.clone()),
                })
                .collect()
        })
        .unwrap_or_default()
}
