//! Structured response parsing for LLM output
//!
//! Model output is supposed to be a JSON object but in practice arrives
//! wrapped in prose, inside markdown fences, with bare keys, trailing commas,
//! or as plain sentences. [`StructuredResponseParser::parse`] walks a fixed
//! list of strategies and always hands back a schema-valid
//! [`OwnershipRecord`], falling back to defaults with `parse_error` set.

use std::collections::HashMap;
use std::sync::LazyLock;

use beneficiary_core::{OwnershipRole, UNKNOWN_BENEFICIARY};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Confidence assumed when a response names an owner but no confidence
pub const DEFAULT_CONFIDENCE: u8 = 50;

const BENEFICIARY_KEYS: &[&str] = &[
    "financial_beneficiary",
    "ultimate_owner",
    "beneficiary",
    "owner",
];
const COUNTRY_KEYS: &[&str] = &["beneficiary_country", "country"];
const STRUCTURE_KEYS: &[&str] = &["ownership_structure_type", "structure_type", "ownership_type"];
const CONFIDENCE_KEYS: &[&str] = &["confidence_score", "confidence"];
const FLOW_KEYS: &[&str] = &["ownership_flow", "ownership_chain", "chain"];
const SOURCE_KEYS: &[&str] = &["sources", "source_urls", "references"];
const REASONING_KEYS: &[&str] = &["reasoning", "explanation", "rationale"];
const CURRENT_KEYS: &[&str] = &["current_ownership_verified", "ownership_is_current"];

static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```[A-Za-z]*\s*([\s\S]*?)```").expect("Invalid fence regex"));
static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("Invalid whitespace regex"));
static SINGLE_QUOTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([{,:\[]\s*)'([^'"]*)'"#).expect("Invalid single quote regex")
});
static BARE_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([{,]\s*)([A-Za-z_][A-Za-z0-9_]*)\s*:").expect("Invalid bare key regex")
});
static TRAILING_COMMA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*([}\]])").expect("Invalid trailing comma regex"));
static LEADING_COMMA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([{\[])\s*,").expect("Invalid leading comma regex"));
static DOUBLE_COMMA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*,").expect("Invalid double comma regex"));
static PY_LITERAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(True|False|None)\b").expect("Invalid literal regex"));
static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"https?://[A-Za-z0-9\-._~:/?#\[\]@!$&'()*+,;=%]+"#).expect("Invalid URL regex")
});
static NAME_FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"["']?(?:name|entity|company)["']?\s*[:=]\s*["']([^"'\n]+)["']"#)
        .expect("Invalid name regex")
});
static PROSE_OWNER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:ultimately owned by|ultimate (?:owner|parent|beneficiary)(?: is|:)|owned by|parent company(?: is|:)|subsidiary of)\s+(?:the\s+)?([A-Z0-9][\w&'\-\. ]{0,80}?)\s*(?:[,;\n(]|\.\s|\.$|$)",
    )
    .expect("Invalid owner prose regex")
});
static PROSE_COUNTRY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:headquartered|based|incorporated|registered) in\s+(?:the\s+)?([A-Z][A-Za-z\. ]{1,40}?)\s*(?:[,;\n(]|\.\s|\.$|$)")
        .expect("Invalid country prose regex")
});
static PROSE_CONFIDENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)confidence[^0-9\n]{0,20}(\d{1,3}(?:\.\d+)?)\s*(%)?")
        .expect("Invalid confidence prose regex")
});

/// `key: value` patterns for every scalar key the extractors look for
static SCALAR_FIELD_RES: LazyLock<HashMap<&'static str, Regex>> = LazyLock::new(|| {
    [
        BENEFICIARY_KEYS,
        COUNTRY_KEYS,
        STRUCTURE_KEYS,
        CONFIDENCE_KEYS,
        REASONING_KEYS,
        CURRENT_KEYS,
    ]
    .into_iter()
    .flatten()
    .map(|key| {
        let re = Regex::new(&format!(
            r#"(?i)["']?\b{}\b["']?\s*[:=]\s*(?:"([^"]*)"|'([^']*)'|([^,\n}}\]"]+))"#,
            regex::escape(key)
        ))
        .expect("Invalid scalar field regex");
        (*key, re)
    })
    .collect()
});

/// `key: [` patterns for the array-valued keys
static ARRAY_FIELD_RES: LazyLock<HashMap<&'static str, Regex>> = LazyLock::new(|| {
    [FLOW_KEYS, SOURCE_KEYS]
        .into_iter()
        .flatten()
        .map(|key| {
            let re = Regex::new(&format!(
                r#"(?is)["']?\b{}\b["']?\s*[:=]\s*\["#,
                regex::escape(key)
            ))
            .expect("Invalid array field regex");
            (*key, re)
        })
        .collect()
});

/// Which strategy produced a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseStrategy {
    Direct,
    FencedBlock,
    Cleaned,
    FieldExtraction,
    Template,
    Fallback,
}

/// Why a single strategy did not produce a record
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseFailure {
    #[error("no JSON object found")]
    NoJsonFound,
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    #[error("top-level value is not an object")]
    NotAnObject,
    #[error("required field '{0}' missing or empty")]
    MissingField(&'static str),
}

/// One entity of the ownership flow as the model described it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<OwnershipRole>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default)]
    pub sources: Vec<String>,
}

/// Schema-valid ownership answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnershipRecord {
    pub financial_beneficiary: String,
    pub beneficiary_country: String,
    pub ownership_structure_type: String,
    /// 0 - 100
    pub confidence_score: u8,
    pub ownership_flow: Vec<FlowEntry>,
    pub sources: Vec<String>,
    pub reasoning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_ownership_verified: Option<bool>,
    pub parse_strategy: ParseStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parse_error: Option<String>,
}

impl OwnershipRecord {
    /// All-defaults record returned when nothing could be recovered
    pub fn fallback(error: impl Into<String>) -> Self {
        Self {
            financial_beneficiary: UNKNOWN_BENEFICIARY.to_string(),
            beneficiary_country: UNKNOWN_BENEFICIARY.to_string(),
            ownership_structure_type: UNKNOWN_BENEFICIARY.to_string(),
            confidence_score: 0,
            ownership_flow: Vec::new(),
            sources: Vec::new(),
            reasoning: String::new(),
            current_ownership_verified: None,
            parse_strategy: ParseStrategy::Fallback,
            parse_error: Some(error.into()),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.parse_error.is_some()
    }
}

/// Multi-strategy parser for provider output. Never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuredResponseParser;

impl StructuredResponseParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, raw: &str) -> OwnershipRecord {
        let strategies: [(ParseStrategy, fn(&str) -> Result<Value, ParseFailure>); 5] = [
            (ParseStrategy::Direct, direct_parse),
            (ParseStrategy::FencedBlock, fenced_parse),
            (ParseStrategy::Cleaned, cleaned_parse),
            (ParseStrategy::FieldExtraction, field_extraction),
            (ParseStrategy::Template, template_reconstruction),
        ];

        let mut failures = Vec::with_capacity(strategies.len());
        for (strategy, attempt) in strategies {
            match attempt(raw).and_then(|value| validate(&value, strategy)) {
                Ok(record) => {
                    debug!("Parsed provider response with {:?} strategy", strategy);
                    return record;
                }
                Err(failure) => failures.push(format!("{:?}: {}", strategy, failure)),
            }
        }

        warn!(
            "All parse strategies failed ({} chars of input), using fallback",
            raw.len()
        );
        OwnershipRecord::fallback(failures.join("; "))
    }
}

/// Convenience wrapper around [`StructuredResponseParser::parse`]
pub fn parse_ownership_response(raw: &str) -> OwnershipRecord {
    StructuredResponseParser.parse(raw)
}

/// Text from the first `{` to the last `}`
fn largest_brace_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn parse_object(text: &str) -> Result<Value, ParseFailure> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| ParseFailure::InvalidJson(e.to_string()))?;
    if value.is_object() {
        Ok(value)
    } else {
        Err(ParseFailure::NotAnObject)
    }
}

fn direct_parse(raw: &str) -> Result<Value, ParseFailure> {
    let span = largest_brace_span(raw).ok_or(ParseFailure::NoJsonFound)?;
    parse_object(span)
}

fn fenced_parse(raw: &str) -> Result<Value, ParseFailure> {
    let mut last_failure = ParseFailure::NoJsonFound;
    for captures in FENCE_RE.captures_iter(raw) {
        let body = captures.get(1).map_or("", |m| m.as_str());
        let candidate = largest_brace_span(body).unwrap_or(body);
        match parse_object(candidate) {
            Ok(value) => return Ok(value),
            Err(failure) => last_failure = failure,
        }
    }
    Err(last_failure)
}

/// Repair the usual hand-written-JSON mistakes before parsing
pub fn clean_json_text(text: &str) -> String {
    let cleaned = WHITESPACE_RE.replace_all(text.trim(), " ");
    let cleaned = SINGLE_QUOTE_RE.replace_all(&cleaned, "$1\"$2\"");
    let cleaned = BARE_KEY_RE.replace_all(&cleaned, "$1\"$2\":");
    let cleaned = DOUBLE_COMMA_RE.replace_all(&cleaned, ",");
    let cleaned = TRAILING_COMMA_RE.replace_all(&cleaned, "$1");
    let cleaned = LEADING_COMMA_RE.replace_all(&cleaned, "$1");
    let cleaned = PY_LITERAL_RE.replace_all(&cleaned, |caps: &regex::Captures| {
        match &caps[1] {
            "True" => "true",
            "False" => "false",
            _ => "null",
        }
        .to_string()
    });
    cleaned.into_owned()
}

fn cleaned_parse(raw: &str) -> Result<Value, ParseFailure> {
    let unfenced = FENCE_RE.replace_all(raw, "$1");
    let span = largest_brace_span(&unfenced).ok_or(ParseFailure::NoJsonFound)?;
    parse_object(&clean_json_text(span))
}

fn extract_scalar(text: &str, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        let re = SCALAR_FIELD_RES.get(*key)?;
        let caps = re.captures(text)?;
        let value = caps
            .get(1)
            .or_else(|| caps.get(2))
            .or_else(|| caps.get(3))?
            .as_str()
            .trim()
            .to_string();
        (!value.is_empty() && value != "null").then_some(value)
    })
}

fn extract_array_body<'a>(text: &'a str, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|key| {
        let re = ARRAY_FIELD_RES.get(*key)?;
        let start = re.find(text)?.end();
        let mut depth = 1usize;
        for (offset, ch) in text[start..].char_indices() {
            match ch {
                '[' => depth += 1,
                ']' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(&text[start..start + offset]);
                    }
                }
                _ => {}
            }
        }
        Some(&text[start..])
    })
}

fn extract_urls(text: &str) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    for m in URL_RE.find_iter(text) {
        let url = m
            .as_str()
            .trim_end_matches(['.', ',', ')', ']', '"', '\''])
            .to_string();
        if !urls.contains(&url) {
            urls.push(url);
        }
    }
    urls
}

/// Pull each known key out of malformed but key:value-shaped text
fn field_extraction(raw: &str) -> Result<Value, ParseFailure> {
    let mut object = Map::new();
    let beneficiary =
        extract_scalar(raw, BENEFICIARY_KEYS).ok_or(ParseFailure::MissingField("financial_beneficiary"))?;
    object.insert("financial_beneficiary".into(), Value::String(beneficiary));

    let scalars = [
        ("beneficiary_country", COUNTRY_KEYS),
        ("ownership_structure_type", STRUCTURE_KEYS),
        ("confidence_score", CONFIDENCE_KEYS),
        ("reasoning", REASONING_KEYS),
        ("current_ownership_verified", CURRENT_KEYS),
    ];
    for (field, keys) in scalars {
        if let Some(value) = extract_scalar(raw, keys) {
            object.insert(field.into(), Value::String(value));
        }
    }

    if let Some(body) = extract_array_body(raw, FLOW_KEYS) {
        let names: Vec<Value> = NAME_FIELD_RE
            .captures_iter(body)
            .filter_map(|c| c.get(1))
            .map(|m| Value::String(m.as_str().trim().to_string()))
            .collect();
        object.insert("ownership_flow".into(), Value::Array(names));
    }
    if let Some(body) = extract_array_body(raw, SOURCE_KEYS) {
        let urls = extract_urls(body).into_iter().map(Value::String).collect();
        object.insert("sources".into(), Value::Array(urls));
    }

    Ok(Value::Object(object))
}

/// Overlay whatever prose reveals onto a default record
fn template_reconstruction(raw: &str) -> Result<Value, ParseFailure> {
    let mut object = Map::new();

    let beneficiary = extract_scalar(raw, BENEFICIARY_KEYS).or_else(|| {
        PROSE_OWNER_RE
            .captures(raw)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().trim_end_matches('.').to_string())
    });
    if let Some(beneficiary) = beneficiary {
        object.insert("financial_beneficiary".into(), Value::String(beneficiary));
    }

    let country = extract_scalar(raw, COUNTRY_KEYS).or_else(|| {
        PROSE_COUNTRY_RE
            .captures(raw)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
    });
    if let Some(country) = country {
        object.insert("beneficiary_country".into(), Value::String(country));
    }

    let confidence = PROSE_CONFIDENCE_RE
        .captures(raw)
        .map(|c| {
            let number = c.get(1).map_or("", |m| m.as_str());
            if c.get(2).is_some() {
                format!("{}%", number)
            } else {
                number.to_string()
            }
        })
        .or_else(|| extract_scalar(raw, CONFIDENCE_KEYS));
    if let Some(confidence) = confidence {
        object.insert("confidence_score".into(), Value::String(confidence));
    }

    let urls = extract_urls(raw);
    if !urls.is_empty() {
        object.insert(
            "sources".into(),
            Value::Array(urls.into_iter().map(Value::String).collect()),
        );
    }

    let prose: String = raw.trim().chars().take(2000).collect();
    if !prose.is_empty() {
        object.insert("reasoning".into(), Value::String(prose));
    }

    Ok(Value::Object(object))
}

fn lookup<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| {
        object
            .iter()
            .find(|(k, v)| k.eq_ignore_ascii_case(key) && !v.is_null())
            .map(|(_, v)| v)
    })
}

/// Coerce any scalar into a trimmed string; objects and arrays are rejected
fn coerce_string(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn coerce_array(value: Option<&Value>) -> Vec<Value> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.clone(),
        Some(other) => vec![other.clone()],
    }
}

/// Parse a confidence from a number or text, clamped to 0-100
///
/// Values at or below 1.0 are read as fractions. Words map to fixed scores.
pub fn coerce_confidence(value: &Value) -> Option<u8> {
    let (number, already_scaled) = match value {
        Value::Number(n) => (n.as_f64()?, false),
        Value::String(s) => {
            let text = s.trim().to_lowercase();
            match text.as_str() {
                "very high" => (90.0, true),
                "high" => (80.0, true),
                "medium" | "moderate" => (60.0, true),
                "low" => (35.0, true),
                "very low" => (15.0, true),
                _ => {
                    let is_percent = text.ends_with('%');
                    let parsed: f64 = text.trim_end_matches('%').trim().parse().ok()?;
                    (parsed, is_percent)
                }
            }
        }
        _ => return None,
    };
    if !number.is_finite() {
        return None;
    }
    let scaled = if !already_scaled && number > 0.0 && number <= 1.0 {
        number * 100.0
    } else {
        number
    };
    Some(scaled.clamp(0.0, 100.0).round() as u8)
}

fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "verified" => Some(true),
            "false" | "no" | "unverified" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn coerce_flow_entry(value: &Value) -> Option<FlowEntry> {
    match value {
        Value::Object(entity) => {
            let name = lookup(entity, &["name", "entity", "company"]).and_then(coerce_string)?;
            let role = lookup(entity, &["role", "type", "relationship"])
                .and_then(coerce_string)
                .and_then(|r| r.parse::<OwnershipRole>().ok());
            let country = lookup(entity, &["country", "jurisdiction"]).and_then(coerce_string);
            let sources = coerce_array(lookup(entity, SOURCE_KEYS))
                .iter()
                .filter_map(coerce_source)
                .collect();
            Some(FlowEntry {
                name,
                role,
                country,
                sources,
            })
        }
        other => coerce_string(other).map(|name| FlowEntry {
            name,
            role: None,
            country: None,
            sources: Vec::new(),
        }),
    }
}

fn coerce_source(value: &Value) -> Option<String> {
    match value {
        Value::Object(source) => lookup(source, &["url", "link", "href"]).and_then(coerce_string),
        other => coerce_string(other),
    }
}

/// Check a candidate against the schema and normalize every field
fn validate(value: &Value, strategy: ParseStrategy) -> Result<OwnershipRecord, ParseFailure> {
    let object = value.as_object().ok_or(ParseFailure::NotAnObject)?;

    let financial_beneficiary = lookup(object, BENEFICIARY_KEYS)
        .and_then(coerce_string)
        .ok_or(ParseFailure::MissingField("financial_beneficiary"))?;

    let text_field = |keys: &[&str]| {
        lookup(object, keys)
            .and_then(coerce_string)
            .unwrap_or_else(|| UNKNOWN_BENEFICIARY.to_string())
    };

    let confidence_score = lookup(object, CONFIDENCE_KEYS)
        .and_then(coerce_confidence)
        .unwrap_or(DEFAULT_CONFIDENCE);

    let ownership_flow = coerce_array(lookup(object, FLOW_KEYS))
        .iter()
        .filter_map(coerce_flow_entry)
        .collect();

    let mut sources: Vec<String> = Vec::new();
    for source in coerce_array(lookup(object, SOURCE_KEYS)).iter().filter_map(coerce_source) {
        if !sources.contains(&source) {
            sources.push(source);
        }
    }

    Ok(OwnershipRecord {
        financial_beneficiary,
        beneficiary_country: text_field(COUNTRY_KEYS),
        ownership_structure_type: text_field(STRUCTURE_KEYS),
        confidence_score,
        ownership_flow,
        sources,
        reasoning: lookup(object, REASONING_KEYS)
            .and_then(coerce_string)
            .unwrap_or_default(),
        current_ownership_verified: lookup(object, CURRENT_KEYS).and_then(coerce_bool),
        parse_strategy: strategy,
        parse_error: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> OwnershipRecord {
        StructuredResponseParser::new().parse(raw)
    }

    #[test]
    fn test_direct_json_inside_prose() {
        let raw = r#"Here is my answer: {"financial_beneficiary": "Nestlé S.A.", "beneficiary_country": "Switzerland", "confidence_score": 88, "ownership_flow": [{"name": "KitKat", "role": "brand"}, {"name": "Nestlé S.A.", "role": "ultimate_owner", "country": "Switzerland"}], "sources": ["https://www.nestle.com/brands"]} Hope that helps."#;
        let record = parse(raw);
        assert_eq!(record.parse_strategy, ParseStrategy::Direct);
        assert_eq!(record.financial_beneficiary, "Nestlé S.A.");
        assert_eq!(record.confidence_score, 88);
        assert_eq!(record.ownership_flow.len(), 2);
        assert_eq!(record.ownership_flow[1].role, Some(OwnershipRole::UltimateOwner));
        assert_eq!(record.sources, vec!["https://www.nestle.com/brands".to_string()]);
        assert!(record.parse_error.is_none());
    }

    #[test]
    fn test_fenced_block_after_stray_braces() {
        let raw = "Thinking {not json}\n```json\n{\"financial_beneficiary\": \"Unilever PLC\", \"confidence\": 0.82}\n```";
        let record = parse(raw);
        assert_eq!(record.parse_strategy, ParseStrategy::FencedBlock);
        assert_eq!(record.financial_beneficiary, "Unilever PLC");
        assert_eq!(record.confidence_score, 82);
    }

    #[test]
    fn test_cleaned_parse_repairs_bare_keys_and_commas() {
        let raw = "{financial_beneficiary: 'Mars, Incorporated', confidence_score: 77, sources: ['https://mars.com',], current_ownership_verified: True,}";
        let record = parse(raw);
        assert_eq!(record.parse_strategy, ParseStrategy::Cleaned);
        assert_eq!(record.financial_beneficiary, "Mars, Incorporated");
        assert_eq!(record.confidence_score, 77);
        assert_eq!(record.sources, vec!["https://mars.com".to_string()]);
        assert_eq!(record.current_ownership_verified, Some(true));
    }

    #[test]
    fn test_field_extraction_on_broken_json() {
        let raw = r#"{"financial_beneficiary": "PepsiCo, Inc." "beneficiary_country": "United States" "confidence_score": 91 "sources": ["https://pepsico.com/brands" "https://sec.gov/x"]"#;
        let record = parse(raw);
        assert_eq!(record.parse_strategy, ParseStrategy::FieldExtraction);
        assert_eq!(record.financial_beneficiary, "PepsiCo, Inc.");
        assert_eq!(record.beneficiary_country, "United States");
        assert_eq!(record.confidence_score, 91);
        assert_eq!(record.sources.len(), 2);
    }

    #[test]
    fn test_template_reconstruction_from_prose() {
        let raw = "Lay's is ultimately owned by PepsiCo, which is headquartered in the United States. Confidence: 80%. See https://www.pepsico.com/brands.";
        let record = parse(raw);
        assert_eq!(record.parse_strategy, ParseStrategy::Template);
        assert_eq!(record.financial_beneficiary, "PepsiCo");
        assert_eq!(record.beneficiary_country, "United States");
        assert_eq!(record.confidence_score, 80);
        assert_eq!(record.sources, vec!["https://www.pepsico.com/brands".to_string()]);
        assert!(record.reasoning.starts_with("Lay's"));
    }

    #[test]
    fn test_fallback_sets_parse_error() {
        for raw in ["", "I don't know.", "{}", "[1, 2, 3]", "{{{{", "\u{0}\u{1}"] {
            let record = parse(raw);
            assert_eq!(record.parse_strategy, ParseStrategy::Fallback, "input {:?}", raw);
            assert_eq!(record.financial_beneficiary, "Unknown");
            assert_eq!(record.confidence_score, 0);
            assert!(record.ownership_flow.is_empty());
            assert!(record.parse_error.is_some());
        }
    }

    #[test]
    fn test_numeric_and_array_coercion() {
        let raw = r#"{"financial_beneficiary": 42, "confidence_score": "250", "ownership_flow": "Acme Holdings", "sources": "https://acme.com"}"#;
        let record = parse(raw);
        assert_eq!(record.financial_beneficiary, "42");
        assert_eq!(record.confidence_score, 100);
        assert_eq!(record.ownership_flow[0].name, "Acme Holdings");
        assert_eq!(record.sources, vec!["https://acme.com".to_string()]);
    }

    #[test]
    fn test_missing_confidence_uses_default() {
        let record = parse(r#"{"financial_beneficiary": "Ferrero SpA"}"#);
        assert_eq!(record.confidence_score, DEFAULT_CONFIDENCE);
        assert_eq!(record.beneficiary_country, "Unknown");
    }

    #[test]
    fn test_confidence_coercion() {
        assert_eq!(coerce_confidence(&Value::from(0.5)), Some(50));
        assert_eq!(coerce_confidence(&Value::from(1)), Some(100));
        assert_eq!(coerce_confidence(&Value::from(73)), Some(73));
        assert_eq!(coerce_confidence(&Value::from(-4)), Some(0));
        assert_eq!(coerce_confidence(&Value::from("85%")), Some(85));
        assert_eq!(coerce_confidence(&Value::from("0.5%")), Some(1));
        assert_eq!(coerce_confidence(&Value::from("high")), Some(80));
        assert_eq!(coerce_confidence(&Value::from("soon")), None);
    }

    #[test]
    fn test_parser_never_panics_on_odd_input() {
        let inputs = [
            "{\"financial_beneficiary\":",
            "```\n```",
            "}{",
            "financial_beneficiary = ",
            "owned by",
            "{\"ownership_flow\": [[[[",
            "confidence 999999999999999999999999",
        ];
        for raw in inputs {
            let record = parse(raw);
            assert!(record.confidence_score <= 100);
        }
    }

    #[test]
    fn test_every_field_key_has_a_compiled_pattern() {
        let scalar_keys = [
            BENEFICIARY_KEYS,
            COUNTRY_KEYS,
            STRUCTURE_KEYS,
            CONFIDENCE_KEYS,
            REASONING_KEYS,
            CURRENT_KEYS,
        ];
        for key in scalar_keys.into_iter().flatten() {
            assert!(SCALAR_FIELD_RES.contains_key(key), "no pattern for {}", key);
        }
        for key in [FLOW_KEYS, SOURCE_KEYS].into_iter().flatten() {
            assert!(ARRAY_FIELD_RES.contains_key(key), "no pattern for {}", key);
        }

        let text = "owner: 'Globex Corp', country = Japan, sources: [https://sec.gov/a]";
        assert_eq!(extract_scalar(text, BENEFICIARY_KEYS).as_deref(), Some("Globex Corp"));
        assert_eq!(extract_scalar(text, COUNTRY_KEYS).as_deref(), Some("Japan"));
        assert_eq!(extract_array_body(text, SOURCE_KEYS), Some("https://sec.gov/a"));
    }
}
