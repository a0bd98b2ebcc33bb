//! Web context assembly for escalated lookups: search the open web for the
//! product, pull pages, and keep only the text fragments that mention pack or
//! UOM information.
//!
//! Failures here are never fatal — an empty snippet list just means the LLM
//! has nothing to work with and the field stays unresolved.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One piece of supporting context pulled from a source page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSnippet {
    pub url: String,
    pub snippet: String,
}

/// Provider of supporting snippets for a lookup query.
pub trait SnippetSource: Send + Sync {
    fn gather(
        &self,
        query: &str,
    ) -> impl std::future::Future<Output = Vec<SourceSnippet>> + Send;
}

fn re_result_link() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| {
        Regex::new(r#"class="result__a"[^>]*href="(http[^"]+)""#).expect("invalid regex")
    })
}

fn re_markup() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| {
        Regex::new(r"(?is)<script.*?</script>|<style.*?</style>|<[^>]+>").expect("invalid regex")
    })
}

fn re_pack_mention() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| {
        Regex::new(concat!(
            r"(?i)\d+\s*/\s*(?:CS|CASE|BX|BOX|PK|PACK|PKG|EA|EACH|UNIT|ROLL|BAG|CT|DZ)\b",
            r"|(?:PK|PACK|PKG)\s*\d+\b",
            r"|(?:CASE|BOX|PACK|PACKAGE|PKG)\s+OF\s+\d+\b",
            r"|\d+\s+PER\s+(?:PACK|CASE|BOX|PACKAGE|PKG|ROLL|BAG)\b",
            r"|\d+\s+(?:EA|EACH|UNIT|PC|PCS)\b",
        ))
        .expect("invalid regex")
    })
}

/// DuckDuckGo-HTML backed implementation.
pub struct WebSnippetSource {
    http: reqwest::Client,
    max_results: usize,
}

impl WebSnippetSource {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("Mozilla/5.0 (compatible; linea/0.4; +internal-use-only)")
            .build()?;
        Ok(Self { http, max_results: 3 })
    }

    async fn search(&self, query: &str) -> Vec<String> {
        let url = match reqwest::Url::parse_with_params(
            "https://html.duckduckgo.com/html/",
            &[("q", format!("{query} pack size UOM"))],
        ) {
            Ok(u) => u,
            Err(e) => {
                debug!("search url build failed: {e}");
                return Vec::new();
            }
        };
        let body = match self.http.get(url).send().await {
            Ok(resp) => match resp.text().await {
                Ok(t) => t,
                Err(e) => {
                    debug!("search body read failed: {e}");
                    return Vec::new();
                }
            },
            Err(e) => {
                debug!("search request failed: {e}");
                return Vec::new();
            }
        };
        re_result_link()
            .captures_iter(&body)
            .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
            .take(self.max_results)
            .collect()
    }

    async fn fetch_page_snippets(&self, url: &str) -> Vec<SourceSnippet> {
        let body = match self.http.get(url).send().await {
            Ok(resp) => match resp.text().await {
                Ok(t) => t,
                Err(e) => {
                    debug!("fetch body read failed for {url}: {e}");
                    return Vec::new();
                }
            },
            Err(e) => {
                debug!("fetch failed for {url}: {e}");
                return Vec::new();
            }
        };
        let text = re_markup().replace_all(&body, " ");
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        extract_snippets(url, &text)
    }
}

impl SnippetSource for WebSnippetSource {
    async fn gather(&self, query: &str) -> Vec<SourceSnippet> {
        let urls = self.search(query).await;
        for url in urls {
            let snippets = self.fetch_page_snippets(&url).await;
            if !snippets.is_empty() {
                // One good page is enough context.
                return snippets;
            }
        }
        Vec::new()
    }
}

/// Pull up to three pack/UOM mentions with surrounding context out of a page.
fn extract_snippets(url: &str, text: &str) -> Vec<SourceSnippet> {
    let mut out = Vec::new();
    for m in re_pack_mention().find_iter(text).take(3) {
        let mut start = m.start().saturating_sub(100);
        while !text.is_char_boundary(start) {
            start -= 1;
        }
        let mut end = (m.end() + 150).min(text.len());
        while !text.is_char_boundary(end) {
            end += 1;
        }
        out.push(SourceSnippet {
            url: url.to_string(),
            snippet: text[start..end].trim().to_string(),
        });
    }
    out
}

/// Fixed snippet list for tests — returns the same context for every query.
pub struct StaticSnippetSource {
    pub snippets: Vec<SourceSnippet>,
}

impl StaticSnippetSource {
    pub fn new(snippets: Vec<SourceSnippet>) -> Self {
        Self { snippets }
    }

    pub fn empty() -> Self {
        Self { snippets: Vec::new() }
    }
}

impl SnippetSource for StaticSnippetSource {
    async fn gather(&self, _query: &str) -> Vec<SourceSnippet> {
        self.snippets.clone()
    }
}
