use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const TAVILY_ENDPOINT: &str = "https://api.tavily.com/search";

/// A single web search hit. Missing fields are normalized to empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

impl SearchResult {
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        snippet: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            snippet: snippet.into(),
        }
    }

    /// Identity used for deduplication: lowercase url, else lowercase title.
    pub fn dedup_key(&self) -> Option<String> {
        let url = self.url.trim();
        if !url.is_empty() {
            return Some(url.to_lowercase());
        }
        let title = self.title.trim();
        if !title.is_empty() {
            return Some(title.to_lowercase());
        }
        None
    }
}

/// Web search collaborator. Implementations never fail; problems yield no results.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Vec<SearchResult>;
}

pub struct TavilyClient {
    client: reqwest::Client,
    api_key: Option<String>,
    search_depth: String,
    pause: Duration,
}

#[derive(Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyHit>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct TavilyHit {
    title: Option<String>,
    url: Option<String>,
    content: Option<String>,
}

impl From<TavilyHit> for SearchResult {
    fn from(hit: TavilyHit) -> Self {
        SearchResult {
            title: hit.title.unwrap_or_default(),
            url: hit.url.unwrap_or_default(),
            snippet: hit.content.unwrap_or_default(),
        }
    }
}

impl TavilyClient {
    pub fn from_env() -> Result<Self> {
        let api_key = dotenv::var("TAVILY_API_KEY").ok().filter(|k| !k.is_empty());
        if api_key.is_none() {
            warn!("TAVILY_API_KEY not set; web search will return no results");
        }
        let search_depth =
            dotenv::var("TAVILY_SEARCH_DEPTH").unwrap_or_else(|_| "advanced".to_string());
        let pause = crate::config::env_f64("TAVILY_SLEEP_SECS").unwrap_or(1.5);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("Failed to create search HTTP client")?;

        Ok(Self {
            client,
            api_key,
            search_depth,
            pause: Duration::from_secs_f64(pause),
        })
    }

    async fn request(&self, api_key: &str, query: &str, max_results: usize) -> Vec<SearchResult> {
        let body = serde_json::json!({
            "api_key": api_key,
            "query": query,
            "max_results": max_results,
            "search_depth": self.search_depth,
        });

        let resp = match self.client.post(TAVILY_ENDPOINT).json(&body).send().await {
            Ok(resp) => resp,
            Err(e) if e.is_timeout() => {
                warn!(query, "Tavily request timed out");
                return vec![];
            }
            Err(e) => {
                warn!(query, error = %e, "Tavily request failed");
                return vec![];
            }
        };

        let status = resp.status().as_u16();
        tokio::time::sleep(self.pause).await;

        match status {
            200 => {}
            401 => {
                warn!("Tavily rejected the API key (401)");
                return vec![];
            }
            429 => {
                warn!(query, "Tavily rate limit hit (429)");
                return vec![];
            }
            other => {
                warn!(query, status = other, "Tavily returned an error status");
                return vec![];
            }
        }

        match resp.json::<TavilyResponse>().await {
            Ok(parsed) => parse_hits(parsed, max_results),
            Err(e) => {
                warn!(query, error = %e, "Failed to decode Tavily response");
                vec![]
            }
        }
    }
}

fn parse_hits(parsed: TavilyResponse, max_results: usize) -> Vec<SearchResult> {
    parsed
        .results
        .into_iter()
        .take(max_results)
        .map(SearchResult::from)
        .collect()
}

#[async_trait]
impl SearchProvider for TavilyClient {
    async fn search(&self, query: &str, max_results: usize) -> Vec<SearchResult> {
        let Some(api_key) = self.api_key.as_deref() else {
            return vec![];
        };
        let query = query.trim();
        if query.is_empty() || max_results == 0 {
            return vec![];
        }
        let results = self.request(api_key, query, max_results).await;
        debug!(query, count = results.len(), "web search");
        results
    }
}
