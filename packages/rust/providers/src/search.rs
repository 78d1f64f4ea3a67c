//! Source-document search capability.
//!
//! The acquisition stage needs "given a subject, find an official source
//! document URL". The trait keeps stage code independent of the concrete
//! search backend; [`TavilySearch`] talks to a Tavily-style REST endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use pressgang_shared::{PressgangError, Result, SearchConfig};

/// User-Agent string for search requests.
const USER_AGENT: &str = concat!("pressgang/", env!("CARGO_PKG_VERSION"));

/// Results returned per search query.
const MAX_RESULTS: u32 = 5;

/// One candidate source document.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
}

/// Capability: find candidate source documents for a subject.
#[async_trait]
pub trait DocumentSearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>>;
}

/// Tavily-style REST search client.
pub struct TavilySearch {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl TavilySearch {
    /// Build a search client from config and its resolved API key.
    pub fn new(config: &SearchConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PressgangError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key,
        })
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Deserialize)]
struct SearchResult {
    #[serde(default)]
    title: String,
    url: String,
}

#[async_trait]
impl DocumentSearch for TavilySearch {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        let body = serde_json::json!({
            "api_key": self.api_key,
            "query": query,
            "max_results": MAX_RESULTS,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| PressgangError::Network(format!("search request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PressgangError::Network(format!(
                "search endpoint returned HTTP {status}"
            )));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| PressgangError::parse(format!("invalid search response: {e}")))?;

        Ok(parsed
            .results
            .into_iter()
            .map(|r| SearchHit {
                title: r.title,
                url: r.url,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(endpoint: String) -> SearchConfig {
        SearchConfig {
            endpoint,
            api_key_env: "UNUSED".into(),
            timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn parses_search_results() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({
                "query": "nursing license reciprocity texas handbook"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [
                    { "title": "Board handbook", "url": "https://www.bon.texas.gov/handbook.pdf" },
                    { "title": "FAQ", "url": "https://www.bon.texas.gov/faq" }
                ]
            })))
            .mount(&server)
            .await;

        let search = TavilySearch::new(&config(server.uri()), "key".into()).unwrap();
        let hits = search
            .search("nursing license reciprocity texas handbook")
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].url, "https://www.bon.texas.gov/handbook.pdf");
    }

    #[tokio::test]
    async fn empty_results_are_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": []
            })))
            .mount(&server)
            .await;

        let search = TavilySearch::new(&config(server.uri()), "key".into()).unwrap();
        let hits = search.search("anything").await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn http_failure_is_a_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let search = TavilySearch::new(&config(server.uri()), "key".into()).unwrap();
        let err = search.search("anything").await.unwrap_err();
        assert!(err.to_string().contains("403"));
    }
}
