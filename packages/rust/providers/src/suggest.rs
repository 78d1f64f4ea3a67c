//! Subject suggestion client with bounded breadth-first expansion.
//!
//! The suggestion endpoint returns a JSON payload whose second element is
//! an array of completion strings for the query. Expansion fans a seed out
//! through alphabetic suffix queries level by level, with an explicit depth
//! limit and a per-level sleep so the endpoint is never hammered.

use std::collections::HashSet;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use pressgang_shared::{DiscoveryConfig, PressgangError, Result};

/// User-Agent string for suggestion requests.
const USER_AGENT: &str = concat!("pressgang/", env!("CARGO_PKG_VERSION"));

/// Suffixes appended per expansion level.
const EXPANSION_SUFFIXES: [char; 26] = [
    'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's',
    't', 'u', 'v', 'w', 'x', 'y', 'z',
];

/// Client for the suggestion/autocomplete capability.
pub struct SuggestClient {
    client: reqwest::Client,
    endpoint: String,
    level_delay: Duration,
}

impl SuggestClient {
    /// Build a client from discovery configuration.
    pub fn new(config: &DiscoveryConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PressgangError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.suggest_url.clone(),
            level_delay: Duration::from_millis(config.level_delay_ms),
        })
    }

    /// Fetch completion suggestions for a single query.
    pub async fn suggest(&self, query: &str) -> Result<Vec<String>> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query)])
            .send()
            .await
            .map_err(|e| PressgangError::Network(format!("suggest request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PressgangError::Network(format!(
                "suggest endpoint returned HTTP {status}"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| PressgangError::Network(format!("suggest body read failed: {e}")))?;

        parse_suggest_payload(&body)
    }

    /// Breadth-first suffix expansion of a seed query.
    ///
    /// Level 0 queries the seed itself; each further level appends one
    /// alphabetic suffix to every query of the previous level. Results are
    /// deduplicated in first-seen order. A failed query logs and skips
    /// rather than aborting the level.
    #[instrument(skip(self))]
    pub async fn expand(&self, seed: &str, depth: u32) -> Result<Vec<String>> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut collected: Vec<String> = Vec::new();
        let mut frontier: Vec<String> = vec![seed.trim().to_string()];

        for level in 0..=depth {
            for query in &frontier {
                match self.suggest(query).await {
                    Ok(suggestions) => {
                        debug!(level, query = query.as_str(), count = suggestions.len(), "suggestions fetched");
                        for s in suggestions {
                            let s = s.trim().to_string();
                            if !s.is_empty() && seen.insert(s.to_lowercase()) {
                                collected.push(s);
                            }
                        }
                    }
                    Err(e) => {
                        warn!(level, query = query.as_str(), error = %e, "suggest query failed, skipping");
                    }
                }
            }

            if level == depth {
                break;
            }

            frontier = frontier
                .iter()
                .flat_map(|q| {
                    EXPANSION_SUFFIXES
                        .iter()
                        .map(move |suffix| format!("{q} {suffix}"))
                })
                .collect();

            tokio::time::sleep(self.level_delay).await;
        }

        Ok(collected)
    }
}

/// Parse the `["query", ["s1", "s2", ...], ...]` suggestion payload.
fn parse_suggest_payload(body: &str) -> Result<Vec<String>> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| PressgangError::parse(format!("invalid suggest payload: {e}")))?;

    let suggestions = value
        .get(1)
        .and_then(|v| v.as_array())
        .ok_or_else(|| PressgangError::parse("suggest payload missing suggestion array"))?;

    Ok(suggestions
        .iter()
        .filter_map(|v| v.as_str())
        .map(str::to_string)
        .collect())
}
