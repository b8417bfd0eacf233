//! Web search tool and its search collaborator.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::{truncate_chars, ERROR_PREFIX};
use crate::config::SearchConfig;

/// Search-and-summarize backend. Output is passed to the model verbatim.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
        max_response_tokens: usize,
    ) -> anyhow::Result<String>;
}

/// Run a search, turning collaborator failures into text.
pub async fn web_search(provider: &dyn SearchProvider, query: &str, config: &SearchConfig) -> String {
    match provider
        .search(query, config.max_results, config.max_response_tokens)
        .await
    {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!("Web search failed for {:?}: {}", query, e);
            format!("{} Web search failed: {}", ERROR_PREFIX, e)
        }
    }
}

/// Used when no search backend is configured.
#[derive(Debug, Default)]
pub struct DisabledSearch;

#[async_trait]
impl SearchProvider for DisabledSearch {
    async fn search(&self, _query: &str, _max_results: usize, _max_tokens: usize) -> anyhow::Result<String> {
        Err(anyhow::anyhow!(
            "web search is not configured (set BRAVE_API_KEY)"
        ))
    }
}

const BRAVE_ENDPOINT: &str = "https://api.search.brave.com/res/v1/web/search";

#[derive(Debug, Deserialize)]
struct BraveResponse {
    #[serde(default)]
    web: Option<BraveWeb>,
}

#[derive(Debug, Deserialize)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveResult>,
}

#[derive(Debug, Deserialize)]
struct BraveResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    extra_snippets: Vec<String>,
}

/// Brave Search API client.
pub struct BraveSearch {
    http: reqwest::Client,
    api_key: String,
}

impl BraveSearch {
    pub fn new(api_key: impl Into<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("agent-delegate/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl SearchProvider for BraveSearch {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
        max_response_tokens: usize,
    ) -> anyhow::Result<String> {
        let url = format!(
            "{}?q={}&count={}",
            BRAVE_ENDPOINT,
            urlencoding::encode(query),
            max_results.clamp(1, 20)
        );

        let response = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .header("X-Subscription-Token", &self.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow::anyhow!("HTTP error: {}", status));
        }

        let body: BraveResponse = response.json().await?;
        let results = body.web.map(|w| w.results).unwrap_or_default();
        Ok(format_results(query, &results, max_results, max_response_tokens))
    }
}

/// Roughly four characters per token.
fn format_results(
    query: &str,
    results: &[BraveResult],
    max_results: usize,
    max_response_tokens: usize,
) -> String {
    if results.is_empty() {
        return format!("No results found for: {}", query);
    }

    let blocks: Vec<String> = results
        .iter()
        .take(max_results)
        .enumerate()
        .map(|(i, r)| {
            let mut block = format!(
                "{}. **{}**\n{}\nURL: {}",
                i + 1,
                html_decode(&strip_tags(&r.title)),
                html_decode(&strip_tags(&r.description)),
                r.url
            );
            for snippet in &r.extra_snippets {
                block.push_str("\n- ");
                block.push_str(&html_decode(&strip_tags(snippet)));
            }
            block
        })
        .collect();

    truncate_chars(
        &format!("Search results for: {}\n\n{}", query, blocks.join("\n\n")),
        max_response_tokens.saturating_mul(4),
        "\n... [results truncated]",
    )
}

/// Brave wraps matched terms in `<strong>`.
fn strip_tags(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_tag = false;
    for c in s.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

/// Basic HTML entity decoding.
fn html_decode(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}
