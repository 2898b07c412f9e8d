// src/search/mod.rs
//! Brave web search capability
//!
//! Wraps the Brave Search web endpoint behind the [`Capability`] interface
//! so the episode loop can dispatch `brave_search` tool calls to it.
//! Rate limiting (HTTP 429) is retried with exponential backoff and jitter.

use crate::env::Capability;
use crate::tools::schema::{function_spec, SchemaBuilder};
use anyhow::{anyhow, bail};
use rand::Rng;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::Duration;

pub const BRAVE_SEARCH_TOOL: &str = "brave_search";
pub const BRAVE_SEARCH_URL: &str = "https://api.search.brave.com/res/v1/web/search";
pub const API_KEY_ENV: &str = "BRAVE_API_KEY";
pub const DEFAULT_MAX_RESULTS: usize = 10;
pub const DEFAULT_REGION: &str = "wt-wt";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const INITIAL_BACKOFF_SECS: f64 = 2.0;
const MAX_BACKOFF_SECS: f64 = 120.0;

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("No BRAVE_API_KEY environment variable found. Please set it to use this function.")]
    MissingApiKey,

    #[error("HTTP error occurred: {0}")]
    Http(#[source] reqwest::Error),

    #[error("An error occurred: {0}")]
    Request(#[source] reqwest::Error),

    #[error("Rate limit still hit after {attempts} retries")]
    RateLimited { attempts: u32 },

    #[error("Failed to parse response JSON: {0}")]
    Decode(String),

    #[error("No results found in the response.")]
    NoResults,
}

/// One ranked web result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    #[serde(rename = "href")]
    pub url: String,
    #[serde(rename = "body")]
    pub snippet: String,
}

/// Map a `xx-yy` region code to the country code Brave expects
pub fn region_to_country(region: &str) -> &'static str {
    match region {
        "xa-ar" | "xa-en" => "SA",
        "ar-es" => "AR",
        "au-en" => "AU",
        "at-de" => "AT",
        "be-fr" | "be-nl" => "BE",
        "br-pt" => "BR",
        "bg-bg" => "BG",
        "ca-en" | "ca-fr" => "CA",
        "ct-ca" => "ES",
        "cl-es" => "CL",
        "cn-zh" => "CN",
        "co-es" => "CO",
        "hr-hr" => "HR",
        "cz-cs" => "CZ",
        "dk-da" => "DK",
        "ee-et" => "EE",
        "fi-fi" => "FI",
        "fr-fr" => "FR",
        "de-de" => "DE",
        "gr-el" => "GR",
        "hk-tzh" => "HK",
        "hu-hu" => "HU",
        "in-en" => "IN",
        "id-id" | "id-en" => "ID",
        "ie-en" => "IE",
        "il-he" => "IL",
        "it-it" => "IT",
        "jp-jp" => "JP",
        "kr-kr" => "KR",
        "lv-lv" => "LV",
        "lt-lt" => "LT",
        "xl-es" | "mx-es" => "MX",
        "my-ms" | "my-en" => "MY",
        "nl-nl" => "NL",
        "nz-en" => "NZ",
        "no-no" => "NO",
        "pe-es" => "PE",
        "ph-en" | "ph-tl" => "PH",
        "pl-pl" => "PL",
        "pt-pt" => "PT",
        "ro-ro" => "RO",
        "ru-ru" => "RU",
        "sg-en" => "SG",
        "sk-sk" => "SK",
        "sl-sl" => "SI",
        "za-en" => "ZA",
        "es-es" => "ES",
        "se-sv" => "SE",
        "ch-de" | "ch-fr" | "ch-it" => "CH",
        "tw-tzh" => "TW",
        "th-th" => "TH",
        "tr-tr" => "TR",
        "ua-uk" => "UA",
        "uk-en" => "GB",
        "us-en" | "ue-es" => "US",
        "ve-es" => "VE",
        "vn-vi" => "VN",
        _ => "ALL",
    }
}

/// Backoff plus uniform jitter in `[0, backoff)`
fn backoff_with_jitter(backoff_secs: f64) -> Duration {
    let jitter = rand::rng().random_range(0.0..backoff_secs);
    Duration::from_secs_f64(backoff_secs + jitter)
}

/// Query string for one request; `count` is left out when `max_results` is `None`
fn query_params(
    keywords: &str,
    max_results: Option<usize>,
    country: &str,
) -> Vec<(&'static str, String)> {
    let mut params = vec![("q", keywords.to_string())];
    if let Some(count) = max_results {
        params.push(("count", count.to_string()));
    }
    params.push(("search_lang", "en".to_string()));
    params.push(("country", country.to_string()));
    params
}

/// Convert a Brave response body into at most `max_results` results, or all of them
pub fn parse_results(
    body: &Value,
    max_results: Option<usize>,
) -> Result<Vec<SearchResult>, SearchError> {
    let results = body
        .get("web")
        .and_then(|web| web.get("results"))
        .and_then(Value::as_array)
        .ok_or(SearchError::NoResults)?;

    let field = |item: &Value, key: &str| {
        item.get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    Ok(results
        .iter()
        .take(max_results.unwrap_or(usize::MAX))
        .map(|item| SearchResult {
            title: field(item, "title"),
            url: field(item, "url"),
            snippet: field(item, "description"),
        })
        .collect())
}

pub struct BraveSearch {
    client: Client,
    api_key: Option<String>,
    endpoint: String,
    max_retries: Option<u32>,
}

impl BraveSearch {
    /// Use `api_key`, or the `BRAVE_API_KEY` environment variable when `None`.
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.or_else(|| std::env::var(API_KEY_ENV).ok()),
            endpoint: BRAVE_SEARCH_URL.to_string(),
            max_retries: None,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Cap 429 retries; unlimited by default
    pub fn with_max_retries(mut self, max_retries: Option<u32>) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn search(
        &self,
        keywords: &str,
        max_results: Option<usize>,
        region: &str,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let api_key = self.api_key.as_deref().ok_or(SearchError::MissingApiKey)?;
        let params = query_params(keywords, max_results, region_to_country(region));

        let mut backoff = INITIAL_BACKOFF_SECS;
        let mut attempts = 0;
        let response = loop {
            let response = self
                .client
                .get(&self.endpoint)
                .header("Accept", "application/json")
                .header("X-Subscription-Token", api_key)
                .query(&params)
                .timeout(REQUEST_TIMEOUT)
                .send()
                .map_err(SearchError::Request)?;

            if response.status() != StatusCode::TOO_MANY_REQUESTS {
                break response.error_for_status().map_err(SearchError::Http)?;
            }
            if self.max_retries.is_some_and(|max| attempts >= max) {
                return Err(SearchError::RateLimited { attempts });
            }
            let wait = backoff_with_jitter(backoff);
            crate::log_warn!(
                "Rate limit hit (429). Retrying in {:.1} seconds...",
                wait.as_secs_f64()
            );
            std::thread::sleep(wait);
            backoff = (backoff * 2.0).min(MAX_BACKOFF_SECS);
            attempts += 1;
        };

        let body: Value = response
            .json()
            .map_err(|e| SearchError::Decode(e.to_string()))?;
        parse_results(&body, max_results)
    }
}

/// Keyword arguments accepted by `brave_search`
#[derive(Debug, PartialEq)]
struct SearchArgs {
    keywords: String,
    max_results: Option<usize>,
    region: String,
}

impl SearchArgs {
    fn from_arguments(arguments: &Map<String, Value>) -> anyhow::Result<Self> {
        let mut keywords = None;
        let mut max_results = Some(DEFAULT_MAX_RESULTS);
        let mut region = DEFAULT_REGION.to_string();

        for (key, value) in arguments {
            match (key.as_str(), value) {
                // an explicit null lifts the result cap
                ("max_results", Value::Null) => max_results = None,
                (_, Value::Null) if key != "keywords" => {}
                ("keywords", Value::String(s)) => keywords = Some(s.clone()),
                ("keywords", _) => bail!("argument 'keywords' must be a string"),
                ("max_results", v) => {
                    let n = v
                        .as_u64()
                        .and_then(|n| usize::try_from(n).ok())
                        .ok_or_else(|| anyhow!("argument 'max_results' must be a non-negative integer"))?;
                    max_results = Some(n);
                }
                ("region", Value::String(s)) => region = s.clone(),
                ("region", _) => bail!("argument 'region' must be a string"),
                (other, _) => bail!("search() got an unexpected keyword argument '{}'", other),
            }
        }

        let keywords =
            keywords.ok_or_else(|| anyhow!("search() missing 1 required argument: 'keywords'"))?;
        Ok(Self {
            keywords,
            max_results,
            region,
        })
    }
}

impl Capability for BraveSearch {
    fn function_spec(&self) -> Value {
        let parameters = SchemaBuilder::object()
            .string_prop("keywords", "The keywords to search for", true)
            .integer_prop(
                "max_results",
                "The maximum number of search results to return",
                false,
            )
            .default_value("max_results", 5)
            .string_prop(
                "region",
                "The region to search in. Examples: 'us-en' for United States, 'uk-en' for United Kingdom, 'wt-wt' for No region",
                false,
            )
            .default_value("region", DEFAULT_REGION)
            .build();
        function_spec(
            BRAVE_SEARCH_TOOL,
            "Search the web using Brave Search API for the provided keywords and region",
            parameters,
        )
    }

    fn call(&self, arguments: &Map<String, Value>) -> anyhow::Result<Value> {
        let args = SearchArgs::from_arguments(arguments)?;
        match self.search(&args.keywords, args.max_results, &args.region) {
            Ok(results) => Ok(serde_json::to_value(results)?),
            Err(e) => {
                crate::log_warn!("brave_search failed for {:?}: {}", args.keywords, e);
                Ok(json!({ "error": e.to_string() }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline() -> BraveSearch {
        BraveSearch {
            client: Client::new(),
            api_key: None,
            endpoint: BRAVE_SEARCH_URL.to_string(),
            max_retries: Some(0),
        }
    }

    fn args(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_region_mapping() {
        assert_eq!(region_to_country("uk-en"), "GB");
        assert_eq!(region_to_country("sl-sl"), "SI");
        assert_eq!(region_to_country("wt-wt"), "ALL");
        assert_eq!(region_to_country("mars-en"), "ALL");
    }

    #[test]
    fn test_parse_results_truncates_and_renames() {
        let body = json!({"web": {"results": [
            {"title": "Rust", "url": "https://rust-lang.org", "description": "A language"},
            {"title": "Crates", "url": "https://crates.io"},
            {"title": "Docs", "url": "https://docs.rs", "description": "API docs"}
        ]}});
        let results = parse_results(&body, Some(2)).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].snippet, "");
        assert_eq!(
            serde_json::to_value(&results[0]).unwrap(),
            json!({"title": "Rust", "href": "https://rust-lang.org", "body": "A language"})
        );
    }

    #[test]
    fn test_parse_results_without_web_section() {
        let err = parse_results(&json!({"query": {}}), Some(5)).unwrap_err();
        assert!(matches!(err, SearchError::NoResults));
        assert_eq!(err.to_string(), "No results found in the response.");
    }

    #[test]
    fn test_search_args_defaults_and_validation() {
        let parsed = SearchArgs::from_arguments(&args(json!({"keywords": "rust"}))).unwrap();
        assert_eq!(
            parsed,
            SearchArgs {
                keywords: "rust".to_string(),
                max_results: Some(DEFAULT_MAX_RESULTS),
                region: DEFAULT_REGION.to_string(),
            }
        );

        let parsed = SearchArgs::from_arguments(&args(
            json!({"keywords": "rust", "max_results": 3, "region": "us-en"}),
        ))
        .unwrap();
        assert_eq!(parsed.max_results, Some(3));
        assert_eq!(parsed.region, "us-en");

        let parsed =
            SearchArgs::from_arguments(&args(json!({"keywords": "rust", "region": null}))).unwrap();
        assert_eq!(parsed.region, DEFAULT_REGION);

        let missing = SearchArgs::from_arguments(&args(json!({"query": "rust"}))).unwrap_err();
        assert!(missing.to_string().contains("unexpected keyword argument 'query'"));
        let missing = SearchArgs::from_arguments(&Map::new()).unwrap_err();
        assert!(missing.to_string().contains("'keywords'"));
        assert!(SearchArgs::from_arguments(&args(json!({"keywords": "x", "max_results": "3"}))).is_err());
        assert!(SearchArgs::from_arguments(&args(json!({"keywords": 1}))).is_err());
    }

    #[test]
    fn test_null_max_results_returns_everything() {
        let parsed =
            SearchArgs::from_arguments(&args(json!({"keywords": "rust", "max_results": null})))
                .unwrap();
        assert_eq!(parsed.max_results, None);

        let params = query_params("rust", None, "US");
        assert!(params.iter().all(|(name, _)| *name != "count"));
        assert_eq!(
            query_params("rust", Some(4), "US"),
            vec![
                ("q", "rust".to_string()),
                ("count", "4".to_string()),
                ("search_lang", "en".to_string()),
                ("country", "US".to_string()),
            ]
        );

        let body = json!({"web": {"results": [
            {"title": "a", "url": "u1"}, {"title": "b", "url": "u2"}, {"title": "c", "url": "u3"}
        ]}});
        assert_eq!(parse_results(&body, None).unwrap().len(), 3);
    }

    #[test]
    fn test_missing_api_key_becomes_error_value() {
        let search = offline();
        assert!(matches!(
            search.search("rust", Some(3), DEFAULT_REGION),
            Err(SearchError::MissingApiKey)
        ));
        let value = search.call(&args(json!({"keywords": "rust"}))).unwrap();
        assert_eq!(
            value,
            json!({"error": "No BRAVE_API_KEY environment variable found. Please set it to use this function."})
        );
    }

    #[test]
    fn test_function_spec() {
        let spec = offline().function_spec();
        assert_eq!(spec["function"]["name"], BRAVE_SEARCH_TOOL);
        let params = &spec["function"]["parameters"];
        assert_eq!(params["required"], json!(["keywords"]));
        assert_eq!(params["properties"]["region"]["default"], DEFAULT_REGION);
    }
}
