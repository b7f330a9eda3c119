use crate::model_client::WebSearchTool;
use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
pub const DEFAULT_API_BASE: &str = "https://api.anthropic.com/v1";
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_RESEARCH_TIMEOUT_SECS: u64 = 300;

pub const DEFAULT_RESEARCH_DOMAINS: &[&str] = &[
    "developer.mozilla.org",
    "docs.python.org",
    "doc.rust-lang.org",
    "nodejs.org",
    "react.dev",
    "w3.org",
    "owasp.org",
    "martinfowler.com",
    "stackoverflow.blog",
    "github.blog",
    "aws.amazon.com",
    "cloud.google.com",
    "learn.microsoft.com",
];

/// Process configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub api_base: String,
    pub max_output_tokens: u32,
    pub thinking_budget_tokens: u32,
    pub max_retries: u32,
    pub generation_timeout: Duration,
    pub research_timeout: Duration,
    pub research_allowed_domains: Vec<String>,
    pub research_max_uses: u32,
    pub bind_addr: String,
}

impl GeneratorConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let research_allowed_domains = match get("RESEARCH_ALLOWED_DOMAINS") {
            Some(list) => list
                .split(',')
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty())
                .collect(),
            None => DEFAULT_RESEARCH_DOMAINS.iter().map(|d| d.to_string()).collect(),
        };

        Ok(Self {
            api_key: get("ANTHROPIC_API_KEY"),
            model: get("ANTHROPIC_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            api_base: get("ANTHROPIC_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            max_output_tokens: parse_or(&get, "MAX_OUTPUT_TOKENS", 16_000)?,
            thinking_budget_tokens: parse_or(&get, "THINKING_BUDGET_TOKENS", 8_000)?,
            max_retries: parse_or(&get, "GENERATION_MAX_RETRIES", DEFAULT_MAX_RETRIES)?.max(1),
            generation_timeout: Duration::from_secs(parse_or(
                &get,
                "GENERATION_TIMEOUT_SECS",
                DEFAULT_TIMEOUT_SECS,
            )?),
            research_timeout: Duration::from_secs(parse_or(
                &get,
                "RESEARCH_TIMEOUT_SECS",
                DEFAULT_RESEARCH_TIMEOUT_SECS,
            )?),
            research_allowed_domains,
            research_max_uses: parse_or(&get, "RESEARCH_MAX_USES", 5)?,
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
        })
    }

    pub fn has_credentials(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn web_search_tool(&self) -> WebSearchTool {
        WebSearchTool {
            allowed_domains: self.research_allowed_domains.clone(),
            max_uses: self.research_max_uses,
        }
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("{} must be a number, got {:?}", key, raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<GeneratorConfig> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        GeneratorConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[]).unwrap();
        assert!(!cfg.has_credentials());
        assert_eq!(cfg.max_retries, 3);
        assert_eq!(cfg.generation_timeout, Duration::from_secs(120));
        assert_eq!(cfg.research_timeout, Duration::from_secs(300));
        assert_eq!(cfg.model, DEFAULT_MODEL);
        assert!(cfg.research_allowed_domains.contains(&"developer.mozilla.org".to_string()));
    }

    #[test]
    fn test_overrides() {
        let cfg = config(&[
            ("ANTHROPIC_API_KEY", "sk-test"),
            ("GENERATION_MAX_RETRIES", "5"),
            ("RESEARCH_TIMEOUT_SECS", "60"),
            ("RESEARCH_ALLOWED_DOMAINS", "example.edu, docs.example.com ,"),
        ])
        .unwrap();

        assert!(cfg.has_credentials());
        assert_eq!(cfg.max_retries, 5);
        assert_eq!(cfg.research_timeout, Duration::from_secs(60));
        assert_eq!(cfg.web_search_tool().allowed_domains, vec!["example.edu", "docs.example.com"]);
    }

    #[test]
    fn test_blank_key_is_missing() {
        assert!(!config(&[("ANTHROPIC_API_KEY", "  ")]).unwrap().has_credentials());
    }

    #[test]
    fn test_malformed_number_is_an_error() {
        let err = config(&[("GENERATION_TIMEOUT_SECS", "soon")]).unwrap_err();
        assert!(err.to_string().contains("GENERATION_TIMEOUT_SECS"));
    }
}
