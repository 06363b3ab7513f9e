//! Prompt construction for the ownership research providers

use beneficiary_core::ResearchRequest;
use chrono::Utc;

use crate::client::{LlmPrompt, SearchHit};
use crate::providers::ResearchContext;

const RESPONSE_SCHEMA: &str = r#"Respond with valid JSON in this exact format:
{
  "financial_beneficiary": "ultimate owner company name, or Unknown",
  "beneficiary_country": "country of the ultimate owner, or Unknown",
  "ownership_structure_type": "Public | Private | Subsidiary | Cooperative | State-owned | Unknown",
  "confidence_score": 0-100,
  "ownership_flow": [
    {"name": "Brand", "role": "brand", "country": "...", "sources": []},
    {"name": "Parent", "role": "parent", "country": "...", "sources": ["https://..."]},
    {"name": "Ultimate Owner", "role": "ultimate_owner", "country": "...", "sources": ["https://..."]}
  ],
  "sources": ["https://..."],
  "reasoning": "short explanation of the evidence",
  "current_ownership_verified": true
}"#;

const ANALYST_ROLE: &str = "You are a corporate ownership analyst. Your task is to identify the \
ultimate financial beneficiary of a consumer brand: the top-most company or person that owns it \
today. Follow the chain brand -> parent -> ultimate owner. Never name the brand itself as its own \
owner. Prefer recent information; acquisitions and divestitures change ownership. If you are not \
sure, say Unknown and give a low confidence.";

/// Prompt for answering from model knowledge alone
pub fn reasoning_prompt(request: &ResearchRequest, context: &ResearchContext) -> LlmPrompt {
    let system = format!("{}\n\n{}", ANALYST_ROLE, RESPONSE_SCHEMA);
    let user = format!("{}{}", describe_request(request), describe_context(request, context));
    LlmPrompt::new(system, user)
}

/// Prompt for synthesizing an answer from search results
pub fn synthesis_prompt(
    request: &ResearchRequest,
    context: &ResearchContext,
    hits: &[SearchHit],
) -> LlmPrompt {
    let system = format!(
        "{}\n\nBase your answer on the search results provided. Cite the URLs you relied on in \
         `sources` and in each entity's `sources`.\n\n{}",
        ANALYST_ROLE, RESPONSE_SCHEMA
    );

    let results = hits
        .iter()
        .enumerate()
        .map(|(i, hit)| {
            format!(
                "[{}] {}\nURL: {}\nPublished: {}\n{}",
                i + 1,
                if hit.title.is_empty() { "(untitled)" } else { hit.title.as_str() },
                hit.url,
                hit.published_date.as_deref().unwrap_or("unknown"),
                hit.snippet
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    let user = format!(
        "{}{}\n\n## Search Results\n\n{}",
        describe_request(request),
        describe_context(request, context),
        results
    );
    LlmPrompt::new(system, user)
}

/// Prompt for extracting ownership from fetched page text
pub fn extraction_prompt(
    request: &ResearchRequest,
    context: &ResearchContext,
    pages: &[(String, String)],
) -> LlmPrompt {
    let system = format!(
        "{}\n\nExtract the ownership chain from the page contents provided. Only use facts \
         stated in the pages.\n\n{}",
        ANALYST_ROLE, RESPONSE_SCHEMA
    );

    let pages = pages
        .iter()
        .map(|(url, text)| format!("### {}\n{}", url, text))
        .collect::<Vec<_>>()
        .join("\n\n");

    let user = format!(
        "{}{}\n\n## Page Contents\n\n{}",
        describe_request(request),
        describe_context(request, context),
        pages
    );
    LlmPrompt::new(system, user)
}

/// Search queries for one research round; later rounds widen the net
pub fn search_queries(request: &ResearchRequest, round: usize) -> Vec<String> {
    let brand = request.brand.trim();
    let subject = match request.product_name.as_deref().map(str::trim) {
        Some(product) if !product.is_empty() => format!("{} {}", brand, product),
        _ => brand.to_string(),
    };

    match round {
        0 => vec![
            format!("{} parent company owner", subject),
            format!("who owns {} brand", brand),
        ],
        1 => vec![
            format!("{} acquired by", brand),
            format!("{} subsidiary of annual report", brand),
        ],
        _ => vec![format!("{} ultimate beneficial owner holding company", brand)],
    }
}

fn describe_request(request: &ResearchRequest) -> String {
    let mut out = format!(
        "Today is {}.\n\n## Brand\n{}\n",
        Utc::now().format("%Y-%m-%d"),
        request.brand.trim()
    );
    if let Some(product) = request
        .product_name
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
    {
        out.push_str(&format!("\n## Product\n{}\n", product));
    }
    if !request.hints.is_empty() {
        out.push_str("\n## Hints\n");
        for (key, value) in &request.hints {
            out.push_str(&format!("- {}: {}\n", key, value));
        }
    }
    out
}

fn describe_context(request: &ResearchRequest, context: &ResearchContext) -> String {
    let mut out = String::new();
    if !context.related_knowledge.is_empty() {
        out.push_str("\n## Related Prior Findings (may be outdated)\n");
        for line in &context.related_knowledge {
            out.push_str(&format!("- {}\n", line));
        }
    }
    if request.has_follow_up() {
        if let Some(follow_up) = &request.follow_up_context {
            out.push_str(&format!("\n## Follow-up Context\n{}\n", follow_up.trim()));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reasoning_prompt_includes_hints_and_follow_up() {
        let request = ResearchRequest::new("Acme")
            .with_product("Anvil")
            .with_hint("barcode_country", "US")
            .with_follow_up("Was it sold in 2023?");
        let context = ResearchContext {
            related_knowledge: vec!["Acme Rockets -> Globex (82)".into()],
        };
        let prompt = reasoning_prompt(&request, &context);
        assert!(prompt.system.contains("\"financial_beneficiary\""));
        assert!(prompt.user.contains("## Product\nAnvil"));
        assert!(prompt.user.contains("- barcode_country: US"));
        assert!(prompt.user.contains("Acme Rockets -> Globex (82)"));
        assert!(prompt.user.contains("Was it sold in 2023?"));
    }

    #[test]
    fn test_blank_follow_up_is_omitted() {
        let request = ResearchRequest::new("Acme").with_follow_up("   ");
        let prompt = reasoning_prompt(&request, &ResearchContext::default());
        assert!(!prompt.user.contains("Follow-up"));
    }

    #[test]
    fn test_search_queries_vary_by_round() {
        let request = ResearchRequest::new("Acme").with_product("Anvil");
        assert_eq!(search_queries(&request, 0)[0], "Acme Anvil parent company owner");
        assert_ne!(search_queries(&request, 0), search_queries(&request, 1));
        assert_eq!(search_queries(&request, 5).len(), 1);
    }
}
