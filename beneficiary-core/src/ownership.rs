//! Ownership chain and source definitions

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::request::normalize_name;

/// Authority classification of a source domain (1 = most authoritative)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTier {
    /// Official registry, regulator or stock exchange filing
    Verified,
    /// Major financial press, company investor relations
    HighlyTrusted,
    /// Reputable general press and reference works
    Trusted,
    /// Blogs, forums, anything unclassified
    Unofficial,
}

impl SourceTier {
    /// Numeric tier, 1 through 4
    pub fn rank(&self) -> u8 {
        match self {
            SourceTier::Verified => 1,
            SourceTier::HighlyTrusted => 2,
            SourceTier::Trusted => 3,
            SourceTier::Unofficial => 4,
        }
    }

    pub fn from_rank(rank: u8) -> Option<Self> {
        match rank {
            1 => Some(SourceTier::Verified),
            2 => Some(SourceTier::HighlyTrusted),
            3 => Some(SourceTier::Trusted),
            4 => Some(SourceTier::Unofficial),
            _ => None,
        }
    }

    /// Tiers 1 through 3 count as trusted for corroboration
    pub fn is_trusted(&self) -> bool {
        !matches!(self, SourceTier::Unofficial)
    }
}

impl Default for SourceTier {
    fn default() -> Self {
        SourceTier::Unofficial
    }
}

/// A piece of evidence backing an ownership claim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,
    #[serde(default)]
    pub tier: SourceTier,
    /// How strongly this source supports the claim (0.0 - 1.0)
    #[serde(default)]
    pub confidence: f64,
}

impl SourceRecord {
    pub fn new(url: impl Into<String>, confidence: f64) -> Self {
        Self {
            url: url.into(),
            title: String::new(),
            published_date: None,
            tier: SourceTier::Unofficial,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_tier(mut self, tier: SourceTier) -> Self {
        self.tier = tier;
        self
    }

    pub fn with_published_date(mut self, date: impl Into<String>) -> Self {
        self.published_date = Some(date.into());
        self
    }

    /// Uniqueness key for deduplication
    pub fn key(&self) -> String {
        normalize_url(&self.url)
    }

    /// Host of the source URL without a leading `www.`
    pub fn domain(&self) -> Option<String> {
        domain_of(&self.url)
    }
}

/// Normalize a URL for deduplication
///
/// Lowercases scheme and host, strips `www.`, drops the fragment and any
/// trailing slash on the path. Query strings are kept. Strings that do not
/// parse as URLs are trimmed and lowercased.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    match url::Url::parse(&with_scheme) {
        Ok(parsed) => {
            let host = parsed
                .host_str()
                .map(|h| h.trim_start_matches("www.").to_string())
                .unwrap_or_default();
            let path = parsed.path().trim_end_matches('/');
            let mut normalized = format!("{}{}", host, path);
            if let Some(query) = parsed.query() {
                normalized.push('?');
                normalized.push_str(query);
            }
            normalized
        }
        Err(_) => trimmed.trim_end_matches('/').to_lowercase(),
    }
}

/// Extract the host of a URL, without `www.`
pub fn domain_of(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };
    url::Url::parse(&with_scheme)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_lowercase()))
        .filter(|h| !h.is_empty())
}

/// Deduplicate sources by normalized URL, keeping the first occurrence
pub fn dedup_sources(sources: impl IntoIterator<Item = SourceRecord>) -> Vec<SourceRecord> {
    let mut seen = std::collections::HashSet::new();
    sources
        .into_iter()
        .filter(|s| seen.insert(s.key()))
        .collect()
}

/// Position of an entity in the ownership chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnershipRole {
    Brand,
    Parent,
    UltimateOwner,
}

impl OwnershipRole {
    pub fn display_name(&self) -> &'static str {
        match self {
            OwnershipRole::Brand => "Brand",
            OwnershipRole::Parent => "Parent",
            OwnershipRole::UltimateOwner => "Ultimate Owner",
        }
    }
}

impl fmt::Display for OwnershipRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl std::str::FromStr for OwnershipRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_name(s).as_str() {
            "brand" | "product" | "subject" => Ok(OwnershipRole::Brand),
            "parent" | "parent company" | "subsidiary of" | "intermediate" | "holding" => {
                Ok(OwnershipRole::Parent)
            }
            "ultimate owner" | "ultimateowner" | "ultimate parent" | "ultimate beneficiary"
            | "owner" | "beneficiary" => Ok(OwnershipRole::UltimateOwner),
            _ => Err(format!("Unknown ownership role: {}", s)),
        }
    }
}

/// One link in an ownership chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnershipEntity {
    pub name: String,
    pub role: OwnershipRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default)]
    pub sources: Vec<SourceRecord>,
}

impl OwnershipEntity {
    pub fn new(name: impl Into<String>, role: OwnershipRole) -> Self {
        Self {
            name: name.into(),
            role,
            country: None,
            sources: Vec::new(),
        }
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn with_source(mut self, source: SourceRecord) -> Self {
        self.sources.push(source);
        self
    }

    /// Mean confidence of this entity's sources, 0.0 when it has none
    pub fn mean_source_confidence(&self) -> f64 {
        if self.sources.is_empty() {
            return 0.0;
        }
        self.sources.iter().map(|s| s.confidence).sum::<f64>() / self.sources.len() as f64
    }

    pub fn normalized_name(&self) -> String {
        normalize_name(&self.name)
    }
}

/// Assign roles by position: first is the brand, last the ultimate owner
///
/// A lone entity is taken to be the ultimate owner.
pub fn role_for_position(index: usize, len: usize) -> OwnershipRole {
    if len <= 1 {
        OwnershipRole::UltimateOwner
    } else if index == 0 {
        OwnershipRole::Brand
    } else if index + 1 == len {
        OwnershipRole::UltimateOwner
    } else {
        OwnershipRole::Parent
    }
}
