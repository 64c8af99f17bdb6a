//! Best-effort mining of free-text oracle output
//!
//! The oracle returns unstructured prose with no contract. Mining is purely
//! lexical: curl blocks, URLs, auth-flow and security-issue mentions, and
//! coarse deobfuscation tags. Failure is classified lexically too — empty
//! output or output carrying "Error" / "not found" is a failed analysis,
//! never an exception. Each pattern is a small independent parser over
//! input that is size-bounded up front, so adversarial output cannot blow
//! up matching time.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

// ─── Patterns ───────────────────────────────────────────────────────

static QUOTED_URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""(https?://[^"]+)""#).expect("quoted url regex"));

static STANDALONE_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"https?://[^\s<>"'{}|\\^`\[\]]+"#).expect("standalone url regex")
});

// ─── Results ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinedEndpoint {
    pub url: String,
    pub curl_command: String,
    /// "claude-analysis" for curl-block finds, "claude-analysis-url" for
    /// standalone URLs wrapped into a synthesized GET
    pub source: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MiningOutcome {
    pub failed: bool,
    /// Raw failure text when `failed`
    pub error: Option<String>,
    pub endpoints: Vec<MinedEndpoint>,
    pub curl_commands: Vec<String>,
    pub auth_flows: Vec<String>,
    pub security_issues: Vec<String>,
    pub deobfuscation_methods: Vec<String>,
}

impl MiningOutcome {
    fn failure(text: &str) -> Self {
        Self {
            failed: true,
            error: Some(text.to_string()),
            ..Self::default()
        }
    }
}

// ─── Mining ─────────────────────────────────────────────────────────

/// Mine structured findings out of oracle prose. `max_input_bytes` bounds
/// the text before any matching; truncation is at a char boundary.
pub fn mine(text: &str, max_input_bytes: usize) -> MiningOutcome {
    if text.trim().is_empty() || text.contains("Error") || text.contains("not found") {
        return MiningOutcome::failure(text);
    }

    let text = bounded(text, max_input_bytes);

    let curl_commands = extract_curl_blocks(text);
    let mut endpoints = Vec::new();
    for block in &curl_commands {
        if let Some(cap) = QUOTED_URL_RE.captures(block) {
            endpoints.push(MinedEndpoint {
                url: cap[1].to_string(),
                curl_command: block.clone(),
                source: "claude-analysis".to_string(),
            });
        }
    }

    // Standalone URLs not already covered by a curl block become GET templates
    for m in STANDALONE_URL_RE.find_iter(text) {
        let url = m.as_str().trim_end_matches(['.', ',']).to_string();
        if !endpoints.iter().any(|e| e.url == url) {
            endpoints.push(MinedEndpoint {
                curl_command: format!("curl -X GET \"{}\"", url),
                url,
                source: "claude-analysis-url".to_string(),
            });
        }
    }

    let auth_flows = [
        ("auth", Some("flow")),
        ("login", Some("process")),
        ("token", Some("authentication")),
    ]
    .iter()
    .flat_map(|(a, b)| anchored_spans(text, a, *b))
    .collect();

    let security_issues = [
        ("security", Some("issue")),
        ("vulnerability", None),
        ("hardcoded", Some("credential")),
        ("insecure", None),
    ]
    .iter()
    .flat_map(|(a, b)| anchored_spans(text, a, *b))
    .collect();

    MiningOutcome {
        failed: false,
        error: None,
        endpoints,
        curl_commands,
        auth_flows,
        security_issues,
        deobfuscation_methods: deobfuscation_tags(text),
    }
}

fn bounded(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut cut = max_bytes;
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }
    &text[..cut]
}

/// Collect "curl ..." blocks: a block starts at a line beginning with `curl`
/// and runs until a blank line, a `#` comment line, or the next block start
fn extract_curl_blocks(text: &str) -> Vec<String> {
    let mut blocks: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("curl ") || trimmed == "curl" {
            if !current.is_empty() {
                blocks.push(current.join("\n").trim().to_string());
            }
            current = vec![line];
        } else if !current.is_empty() {
            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with("Http") {
                blocks.push(current.join("\n").trim().to_string());
                current.clear();
            } else {
                current.push(line);
            }
        }
    }
    if !current.is_empty() {
        blocks.push(current.join("\n").trim().to_string());
    }
    blocks.retain(|b| !b.is_empty());
    blocks
}

/// Capture a span anchored on one or two case-insensitive keywords, running
/// to the next blank line or a line starting with an uppercase letter.
///
/// Matching runs directly over the original text so every offset is a valid
/// byte position in it; lowercasing a copy first would shift offsets for
/// characters whose case fold changes byte length.
fn anchored_spans(text: &str, first: &str, second: Option<&str>) -> Vec<String> {
    let mut spans = Vec::new();
    let mut search_from = 0;

    while let Some(rel) = find_ignore_ascii_case(&text[search_from..], first) {
        let start = search_from + rel;
        let after_first = start + first.len();

        let anchor_end = match second {
            Some(second) => match find_ignore_ascii_case(&text[after_first..], second) {
                Some(rel2) => after_first + rel2 + second.len(),
                None => break,
            },
            None => after_first,
        };

        let end = span_end(text, anchor_end);
        spans.push(text[start..end].trim().to_string());
        search_from = end.max(after_first);
        if search_from >= text.len() {
            break;
        }
    }
    spans
}

/// Byte offset of the first ASCII-case-insensitive occurrence of `needle`.
/// Keywords are ASCII, and ASCII bytes never occur inside multi-byte UTF-8
/// sequences, so a returned offset is always a char boundary in `haystack`.
fn find_ignore_ascii_case(haystack: &str, needle: &str) -> Option<usize> {
    let hay = haystack.as_bytes();
    let pat = needle.as_bytes();
    if pat.is_empty() || hay.len() < pat.len() {
        return None;
    }
    (0..=hay.len() - pat.len()).find(|&i| hay[i..i + pat.len()].eq_ignore_ascii_case(pat))
}

/// End of a span: the next blank line or newline followed by an uppercase
/// letter, else end of input
fn span_end(text: &str, from: usize) -> usize {
    let bytes = text.as_bytes();
    let mut i = from;
    while i < bytes.len() {
        if bytes[i] == b'\n' {
            if i + 1 >= bytes.len() {
                return i;
            }
            let next = bytes[i + 1];
            if next == b'\n' || next.is_ascii_uppercase() {
                return i;
            }
        }
        i += 1;
    }
    text.len()
}

/// Coarse keyword presence mapped to fixed human-readable labels
fn deobfuscation_tags(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    let mut tags = Vec::new();
    if lower.contains("base64") {
        tags.push("Base64 decoding".to_string());
    }
    if lower.contains("decrypt") {
        tags.push("Decryption".to_string());
    }
    if lower.contains("concat") || lower.contains("build") {
        tags.push("String concatenation reversal".to_string());
    }
    tags
}
