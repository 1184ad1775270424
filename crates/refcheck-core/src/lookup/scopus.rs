use std::time::Duration;

use super::{LookupError, LookupFuture, SearchHit, TitleSearch};
use crate::rate_limit::check_rate_limit_response;

pub const NAME: &str = "Scopus";

const SEARCH_URL: &str = "https://api.elsevier.com/content/search/scopus";

/// Elsevier Scopus search, used as the primary exact-title index.
pub struct Scopus {
    api_key: String,
}

impl Scopus {
    pub fn new(api_key: String) -> Self {
        Self { api_key }
    }
}

impl TitleSearch for Scopus {
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
            let scopus_query = format!("TITLE(\"{}\")", query.replace('"', " "));
            let url = format!(
                "{}?query={}&count={}",
                SEARCH_URL,
                urlencoding::encode(&scopus_query),
                limit.max(1)
            );

            let resp = client
                .get(&url)
                .header("Accept", "application/json")
                .header("X-ELS-APIKey", &self.api_key)
                .timeout(timeout)
                .send()
                .await?;

            check_rate_limit_response(&resp)?;
            let status = resp.status();
            if !status.is_success() {
                return Err(LookupError::Http {
                    status: status.as_u16(),
                });
            }

            let data: serde_json::Value = resp
                .json()
                .await
                .map_err(|e| LookupError::Parse(e.to_string()))?;
            Ok(parse_entries(&data))
        })
    }
}

fn parse_entries(data: &serde_json::Value) -> Vec<SearchHit> {
    data["search-results"]["entry"]
        .as_array()
        .map(|entries| {
            entries
                .iter()
                // A zero-hit search comes back as a single entry carrying only "error".
                .filter(|e| e.get("error").is_none())
                .filter_map(|e| {
                    let title = e["dc:title"].as_str()?;
                    Some(SearchHit {
                        title: title.to_string(),
                        url: e["prism:url"]
                            .as_str()
                            .map(String::from)
                            .or_else(|| Some("https://www.scopus.com".to_string())),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}
