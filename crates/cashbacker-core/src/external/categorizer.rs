//! Categorizer implementations

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{Categorizer, CollaboratorError, CollaboratorResult};
use crate::config::CategorizerConfig;
use crate::error::Result;

/// Ordered regex rules; the first matching rule wins
pub struct RuleCategorizer {
    rules: Vec<(String, Vec<Regex>)>,
    fallback: String,
}

impl RuleCategorizer {
    pub fn from_config(config: &CategorizerConfig) -> Result<Self> {
        let rules = config
            .rules
            .iter()
            .map(|rule| {
                let patterns = rule
                    .patterns
                    .iter()
                    .map(|p| Regex::new(p))
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok((rule.category.clone(), patterns))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            rules,
            fallback: config.fallback_category.clone(),
        })
    }

    pub fn categorize(&self, description: &str) -> &str {
        self.rules
            .iter()
            .find(|(_, patterns)| patterns.iter().any(|p| p.is_match(description)))
            .map(|(category, _)| category.as_str())
            .unwrap_or(&self.fallback)
    }
}

#[async_trait]
impl Categorizer for RuleCategorizer {
    async fn classify(&self, descriptions: &[String]) -> CollaboratorResult<Vec<String>> {
        Ok(descriptions
            .iter()
            .map(|d| self.categorize(d).to_string())
            .collect())
    }
}

/// Remote categorizer: `POST {host}/classify`
pub struct HttpCategorizer {
    http_client: Client,
    host: String,
}

#[derive(Serialize)]
struct ClassifyRequest<'a> {
    descriptions: &'a [String],
}

#[derive(Deserialize)]
struct ClassifyResponse {
    categories: Vec<String>,
}

impl HttpCategorizer {
    pub fn new(host: &str) -> Self {
        Self {
            http_client: Client::new(),
            host: host.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Categorizer for HttpCategorizer {
    async fn classify(&self, descriptions: &[String]) -> CollaboratorResult<Vec<String>> {
        let response = self
            .http_client
            .post(format!("{}/classify", self.host))
            .json(&ClassifyRequest { descriptions })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(CollaboratorError::Unavailable(format!(
                "categorizer returned {}",
                response.status()
            )));
        }

        let body: ClassifyResponse = response.json().await?;
        if body.categories.len() != descriptions.len() {
            return Err(CollaboratorError::Unavailable(format!(
                "categorizer returned {} categories for {} descriptions",
                body.categories.len(),
                descriptions.len()
            )));
        }
        Ok(body.categories)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, CategoryRule};
    use crate::test_utils::MockBankServer;

    fn rules() -> RuleCategorizer {
        RuleCategorizer::from_config(&AppConfig::embedded().unwrap().categorizer).unwrap()
    }

    #[test]
    fn test_rules_match_catalog() {
        let c = rules();
        assert_eq!(c.categorize("SUPERMARKET #12 bread"), "groceries");
        assert_eq!(c.categorize("Coffee house"), "drinks");
        assert_eq!(c.categorize("iPhone charger"), "electronics");
        assert_eq!(c.categorize("Steam purchase"), "video games");
        assert_eq!(c.categorize("Transfer to savings"), "other");
    }

    #[test]
    fn test_first_rule_wins() {
        let config = CategorizerConfig {
            rules: vec![
                CategoryRule {
                    category: "drinks".to_string(),
                    patterns: vec!["(?i)milk".to_string()],
                },
                CategoryRule {
                    category: "groceries".to_string(),
                    patterns: vec!["(?i)milk".to_string()],
                },
            ],
            ..Default::default()
        };
        let c = RuleCategorizer::from_config(&config).unwrap();
        assert_eq!(c.categorize("Milk 1L"), "drinks");
    }

    #[test]
    fn test_invalid_pattern_is_an_error() {
        let config = CategorizerConfig {
            rules: vec![CategoryRule {
                category: "x".to_string(),
                patterns: vec!["(unclosed".to_string()],
            }],
            ..Default::default()
        };
        assert!(RuleCategorizer::from_config(&config).is_err());
    }

    #[tokio::test]
    async fn test_classify_keeps_order() {
        let c = rules();
        let input = vec!["coffee".to_string(), "bread".to_string()];
        let out = c.classify(&input).await.unwrap();
        assert_eq!(out, vec!["drinks", "groceries"]);
    }

    #[tokio::test]
    async fn test_http_categorizer() {
        let mut server = MockBankServer::start().await;
        let c = HttpCategorizer::new(&server.url());
        let input = vec!["Coffee".to_string(), "Bread".to_string(), "Rent".to_string()];
        let out = c.classify(&input).await.unwrap();
        assert_eq!(out, vec!["drinks", "groceries", "other"]);
        server.stop();
    }

    #[tokio::test]
    async fn test_http_categorizer_unreachable() {
        let c = HttpCategorizer::new("http://127.0.0.1:1");
        let result = c.classify(&["x".to_string()]).await;
        assert!(matches!(result, Err(CollaboratorError::Unavailable(_))));
    }
}
