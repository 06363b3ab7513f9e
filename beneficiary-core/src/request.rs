//! Research request definitions

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single ownership question: who ultimately owns this brand?
///
/// Requests are immutable for the lifetime of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchRequest {
    pub brand: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    /// Free-form caller hints (e.g. "country" -> "DE", "barcode" -> "...")
    #[serde(default)]
    pub hints: BTreeMap<String, String>,
    /// Context from a previous answer the caller wants challenged or refined.
    /// Its presence forces fresh research even when a cached answer exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_up_context: Option<String>,
}

impl ResearchRequest {
    pub fn new(brand: impl Into<String>) -> Self {
        Self {
            brand: brand.into(),
            product_name: None,
            hints: BTreeMap::new(),
            follow_up_context: None,
        }
    }

    pub fn with_product(mut self, product_name: impl Into<String>) -> Self {
        self.product_name = Some(product_name.into());
        self
    }

    pub fn with_hint(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.hints.insert(key.into(), value.into());
        self
    }

    pub fn with_follow_up(mut self, context: impl Into<String>) -> Self {
        self.follow_up_context = Some(context.into());
        self
    }

    /// Normalized brand name used for store keys and self-ownership checks
    pub fn normalized_brand(&self) -> String {
        normalize_name(&self.brand)
    }

    /// Normalized product name, if one was supplied and is not blank
    pub fn normalized_product(&self) -> Option<String> {
        self.product_name
            .as_deref()
            .map(normalize_name)
            .filter(|p| !p.is_empty())
    }

    /// Cache key: normalized brand, optionally suffixed with the normalized product
    pub fn cache_key(&self) -> String {
        match self.normalized_product() {
            Some(product) => format!("{}/{}", self.normalized_brand(), product),
            None => self.normalized_brand(),
        }
    }

    pub fn has_follow_up(&self) -> bool {
        self.follow_up_context
            .as_deref()
            .is_some_and(|c| !c.trim().is_empty())
    }
}

/// Lowercase, strip punctuation, and collapse whitespace
///
/// "  The Coca-Cola  Company " -> "the coca cola company"
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_with_and_without_product() {
        let request = ResearchRequest::new("  Ben & Jerry's ");
        assert_eq!(request.cache_key(), "ben jerry s");

        let request = request.with_product("Chunky Monkey");
        assert_eq!(request.cache_key(), "ben jerry s/chunky monkey");
    }

    #[test]
    fn test_blank_product_is_ignored() {
        let request = ResearchRequest::new("Acme").with_product("   ");
        assert_eq!(request.cache_key(), "acme");
    }

    #[test]
    fn test_blank_follow_up_is_not_a_follow_up() {
        assert!(!ResearchRequest::new("Acme").with_follow_up("  ").has_follow_up());
        assert!(ResearchRequest::new("Acme")
            .with_follow_up("Was it sold in 2023?")
            .has_follow_up());
    }

    #[test]
    fn test_deserialize_minimal_request() {
        let request: ResearchRequest = serde_json::from_str(r#"{"brand":"Acme"}"#).unwrap();
        assert_eq!(request, ResearchRequest::new("Acme"));
    }
}
