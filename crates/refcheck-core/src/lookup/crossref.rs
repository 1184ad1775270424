use std::time::Duration;

use super::{IdentifierResolver, LookupError, LookupFuture, ResolvedWork};
use crate::rate_limit::check_rate_limit_response;

pub const NAME: &str = "Crossref";

/// DOI resolution through the Crossref REST API.
pub struct Crossref {
    pub mailto: Option<String>,
}

impl Crossref {
    fn user_agent(&self) -> String {
        match &self.mailto {
            Some(email) => format!("refcheck/{} (mailto:{})", env!("CARGO_PKG_VERSION"), email),
            None => format!("refcheck/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl IdentifierResolver for Crossref {
    fn name(&self) -> &str {
        NAME
    }

    fn resolve<'a>(
        &'a self,
        doi: &'a str,
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> LookupFuture<'a, Option<ResolvedWork>> {
        Box::pin(async move {
            let mut url = format!("https://api.crossref.org/works/{}", doi);
            if let Some(ref email) = self.mailto {
                url.push_str(&format!("?mailto={}", urlencoding::encode(email)));
            }

            let resp = client
                .get(&url)
                .header("User-Agent", self.user_agent())
                .timeout(timeout)
                .send()
                .await?;

            check_rate_limit_response(&resp)?;
            let status = resp.status();
            if status.as_u16() == 404 {
                return Ok(None);
            }
            if !status.is_success() {
                return Err(LookupError::Http {
                    status: status.as_u16(),
                });
            }

            let data: serde_json::Value = resp
                .json()
                .await
                .map_err(|e| LookupError::Parse(e.to_string()))?;
            Ok(Some(parse_work(&data)))
        })
    }
}

/// Pull the first title and the canonical URL out of a `/works/{doi}` body.
fn parse_work(data: &serde_json::Value) -> ResolvedWork {
    let message = &data["message"];
    let title = message["title"]
        .as_array()
        .and_then(|a| a.first())
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from);
    let url = message["URL"].as_str().map(String::from);
    ResolvedWork { title, url }
}
