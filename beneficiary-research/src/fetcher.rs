//! Page fetching and text extraction for the legacy scrape provider

use async_trait::async_trait;
use beneficiary_core::BeneficiaryError;
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::{info, warn};

use crate::client::PageFetcher;

/// Extracted text is capped at this many characters
pub const MAX_PAGE_CHARS: usize = 8000;

const MAX_CONCURRENT_PAGES: usize = 5;

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https?://[a-zA-Z0-9\-._~:/?#\[\]@!$&'()*+,;=%]+").expect("Invalid URL regex")
});

#[derive(Debug, Clone)]
pub struct HttpPageFetcher {
    client: Client,
}

impl HttpPageFetcher {
    pub fn new() -> Result<Self, BeneficiaryError> {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, BeneficiaryError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36")
            .build()
            .map_err(|e| BeneficiaryError::internal(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str) -> Result<String, BeneficiaryError> {
        info!("Fetching page: {}", url);

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                BeneficiaryError::Timeout { timeout_ms: 0 }
            } else {
                BeneficiaryError::network(format!("Failed to fetch {}: {}", url, e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(BeneficiaryError::from_status(
                status.as_u16(),
                format!("Failed to fetch {}", url),
            ));
        }

        let html = response
            .text()
            .await
            .map_err(|e| BeneficiaryError::network(format!("Failed to read {}: {}", url, e)))?;

        Ok(extract_text_from_html(&html))
    }
}

/// Unique, fetchable URLs mentioned in free text
pub fn extract_urls_from_text(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    URL_RE
        .find_iter(text)
        .map(|m| {
            m.as_str()
                .trim_end_matches(|c| matches!(c, '.' | ',' | ')' | ']' | ';' | '\'' | '"'))
                .to_string()
        })
        .filter(|url| !should_skip_url(url))
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

/// Social media, chat and binary links carry no ownership filings
fn should_skip_url(url: &str) -> bool {
    const SKIP: [&str; 14] = [
        "twitter.com",
        "x.com/",
        "facebook.com",
        "instagram.com",
        "tiktok.com",
        "youtube.com/watch",
        "reddit.com",
        "t.me",
        "mailto:",
        ".pdf",
        ".png",
        ".jpg",
        ".jpeg",
        ".gif",
    ];
    let lower = url.to_lowercase();
    SKIP.iter().any(|p| lower.contains(p))
}

/// Readable text from the main content area, falling back to the body
pub fn extract_text_from_html(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut content = String::new();

    for selector_str in ["main", "article", "#content", ".content", "#main"] {
        if let Ok(selector) = Selector::parse(selector_str) {
            for element in document.select(&selector) {
                let cleaned = clean_text(&element.text().collect::<String>());
                if !cleaned.is_empty() {
                    content.push_str(&cleaned);
                    content.push('\n');
                }
            }
        }
        if !content.is_empty() {
            break;
        }
    }

    if content.is_empty() {
        if let Ok(body) = Selector::parse("body") {
            if let Some(element) = document.select(&body).next() {
                content = clean_text(&element.text().collect::<String>());
            }
        }
    }

    truncate_chars(content.trim(), MAX_PAGE_CHARS)
}

fn clean_text(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...\n[Content truncated]", &text[..idx]),
        None => text.to_string(),
    }
}

/// Fetch several pages concurrently; failures are logged and skipped
pub async fn fetch_pages(
    fetcher: Arc<dyn PageFetcher>,
    urls: &[String],
) -> Vec<(String, String)> {
    let futures: Vec<_> = urls
        .iter()
        .take(MAX_CONCURRENT_PAGES)
        .map(|url| {
            let fetcher = Arc::clone(&fetcher);
            let url = url.clone();
            async move {
                match fetcher.fetch(&url).await {
                    Ok(text) if !text.is_empty() => Some((url, text)),
                    Ok(_) => None,
                    Err(e) => {
                        warn!("Failed to fetch {}: {}", url, e);
                        None
                    }
                }
            }
        })
        .collect();

    futures::future::join_all(futures)
        .await
        .into_iter()
        .flatten()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_urls_from_text() {
        let text = "See https://www.sec.gov/filing/123. Also (https://unilever.com/brands) \
                    and https://twitter.com/acme plus https://www.sec.gov/filing/123";
        let urls = extract_urls_from_text(text);
        assert_eq!(
            urls,
            vec![
                "https://www.sec.gov/filing/123".to_string(),
                "https://unilever.com/brands".to_string(),
            ]
        );
    }

    #[test]
    fn test_extract_text_prefers_main() {
        let html = "<html><body><nav>Menu</nav><main><p>Acme is owned by</p>\n<p>Globex Corp</p></main></body></html>";
        assert_eq!(extract_text_from_html(html), "Acme is owned by\nGlobex Corp");
    }

    #[test]
    fn test_extract_text_falls_back_to_body() {
        let html = "<html><body><div>  Subsidiary of Initech  </div></body></html>";
        assert_eq!(extract_text_from_html(html), "Subsidiary of Initech");
    }

    #[test]
    fn test_truncate_is_char_safe() {
        let text = "é".repeat(10);
        let out = truncate_chars(&text, 4);
        assert!(out.starts_with("éééé..."));
        assert_eq!(truncate_chars("short", 10), "short");
    }
}
