//! Endpoint extraction from decompiled source trees
//!
//! Three independent passes over every text-like file: direct URL matches,
//! base64-obfuscated URL candidates, and Retrofit baseUrl × annotation
//! combinations. Extraction is maximally tolerant — unreadable files and
//! undecodable candidates are skipped, never surfaced as errors. Findings
//! are deduplicated process-wide by normalized URL, first occurrence wins.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::TriageResult;

// ─── Patterns ───────────────────────────────────────────────────────

static URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"https?://[\w\-._~:/?#\[\]@!$&'()*+,;=%]+").expect("url regex")
});

static RETROFIT_ANNOTATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"@(?:GET|POST|PUT|PATCH|DELETE|HEAD)\(\s*"([^"]+)"\s*\)"#)
        .expect("annotation regex")
});

static RETROFIT_BASEURL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"baseUrl\(\s*"([^"]+)"\s*\)"#).expect("baseUrl regex"));

/// Base64-alphabet runs long enough to plausibly hold a URL
static BASE64_CANDIDATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Za-z0-9+/]{16,}={0,2}\b").expect("base64 regex"));

/// Extensions scanned for endpoints; everything else is skipped silently
const TEXT_EXTS: &[&str] = &[
    ".java", ".kt", ".smali", ".xml", ".json", ".properties", ".txt", ".js", ".ts", ".jsx",
    ".tsx", ".dart", ".cfg", ".ini", ".gradle",
];

// ─── Findings ───────────────────────────────────────────────────────

/// One deduplicated candidate endpoint with provenance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub url: String,
    pub source_file: String,
    pub line_no: usize,
    /// "direct", "retrofit-annotation", or "base64:<prefix>"
    pub note: String,
}

// ─── Extraction ─────────────────────────────────────────────────────

/// Scan every text-like file under `root` and collect deduplicated endpoint
/// findings. Dedup is by normalized URL across the whole tree; the first
/// occurrence's provenance is kept. Files are visited in sorted order so
/// repeated runs over an unchanged tree give identical results.
pub fn extract(root: &Path) -> Vec<Finding> {
    let mut findings = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for entry in WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.path();
        if !has_text_extension(path) {
            continue;
        }
        let text = match fs::read(path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(err) => {
                tracing::debug!("Skipping unreadable file {}: {}", path.display(), err);
                continue;
            }
        };
        scan_file(path, &text, &mut findings, &mut seen);
    }

    tracing::info!(
        "Extracted {} unique endpoints under {}",
        findings.len(),
        root.display()
    );
    findings
}

fn has_text_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let dotted = format!(".{}", e.to_lowercase());
            TEXT_EXTS.contains(&dotted.as_str())
        })
        .unwrap_or(false)
}

fn scan_file(path: &Path, text: &str, findings: &mut Vec<Finding>, seen: &mut HashSet<String>) {
    let source = path.display().to_string();

    // Pass 1: direct URLs, line-scoped for provenance
    for (line_no, line) in text.lines().enumerate() {
        for m in URL_RE.find_iter(line) {
            push_unique(
                findings,
                seen,
                normalize_url(m.as_str()),
                &source,
                line_no + 1,
                "direct".to_string(),
            );
        }
    }

    // Pass 2: base64 candidates that decode to text containing a URL
    for (line_no, line) in text.lines().enumerate() {
        for m in BASE64_CANDIDATE_RE.find_iter(line) {
            let candidate = m.as_str();
            let Some(decoded) = try_decode_base64(candidate) else {
                continue;
            };
            let prefix: String = candidate.chars().take(16).collect();
            for m2 in URL_RE.find_iter(&decoded) {
                push_unique(
                    findings,
                    seen,
                    normalize_url(m2.as_str()),
                    &source,
                    line_no + 1,
                    format!("base64:{}…", prefix),
                );
            }
        }
    }

    // Pass 3: Retrofit baseUrl × method annotation, file-scoped
    let base_urls: Vec<&str> = RETROFIT_BASEURL_RE
        .captures_iter(text)
        .map(|c| c.get(1).map(|g| g.as_str()).unwrap_or(""))
        .collect();
    let paths: Vec<&str> = RETROFIT_ANNOTATION_RE
        .captures_iter(text)
        .map(|c| c.get(1).map(|g| g.as_str()).unwrap_or(""))
        .collect();
    if !base_urls.is_empty() && !paths.is_empty() {
        let mut combined = combine_base_and_paths(&base_urls, &paths);
        combined.sort();
        for url in combined {
            push_unique(findings, seen, url, &source, 1, "retrofit-annotation".to_string());
        }
    }
}

fn push_unique(
    findings: &mut Vec<Finding>,
    seen: &mut HashSet<String>,
    url: String,
    source: &str,
    line_no: usize,
    note: String,
) {
    if seen.insert(url.clone()) {
        findings.push(Finding {
            url,
            source_file: source.to_string(),
            line_no,
            note,
        });
    }
}

/// Pad to a multiple of 4 and decode; return the lossy UTF-8 text only when
/// it carries an http scheme substring
fn try_decode_base64(candidate: &str) -> Option<String> {
    let mut padded = candidate.to_string();
    let rem = padded.len() % 4;
    if rem != 0 {
        padded.push_str(&"=".repeat(4 - rem));
    }
    let raw = BASE64.decode(padded.as_bytes()).ok()?;
    let decoded = String::from_utf8_lossy(&raw).into_owned();
    if decoded.contains("http://") || decoded.contains("https://") {
        Some(decoded)
    } else {
        None
    }
}

/// Strip trailing quote, bracket, comma and space punctuation
pub fn normalize_url(url: &str) -> String {
    url.trim_end_matches(['"', '\'', ')', ';', ',', ' ', ']', '}'])
        .to_string()
}

/// Cross product of base URLs and annotation paths with single-slash joins.
/// Absolute paths in the annotation position are used verbatim.
fn combine_base_and_paths(base_urls: &[&str], paths: &[&str]) -> Vec<String> {
    let mut out: HashSet<String> = HashSet::new();
    for b in base_urls {
        let b_norm = normalize_url(b);
        for p in paths {
            if p.starts_with("http://") || p.starts_with("https://") {
                out.insert(normalize_url(p));
            } else if !b_norm.ends_with('/') && !p.starts_with('/') {
                out.insert(format!("{}/{}", b_norm, p));
            } else if b_norm.ends_with('/') && p.starts_with('/') {
                out.insert(format!("{}{}", b_norm, p.trim_start_matches('/')));
            } else {
                out.insert(format!("{}{}", b_norm, p));
            }
        }
    }
    out.into_iter().collect()
}

// ─── Curl Output ────────────────────────────────────────────────────

/// Render findings as curl templates, sorted by (url, source_file).
/// Endpoints whose path hints at authentication get a POST template with a
/// JSON payload placeholder.
pub fn render_curl(findings: &[Finding]) -> String {
    let mut sorted: Vec<&Finding> = findings.iter().collect();
    sorted.sort_by(|a, b| (&a.url, &a.source_file).cmp(&(&b.url, &b.source_file)));

    let mut out = String::new();
    out.push_str("# Auto-generated endpoint templates\n");
    out.push_str("# Review, deduplicate logically related endpoints, and fill auth headers.\n\n");
    for (idx, item) in sorted.iter().enumerate() {
        out.push_str(&format!(
            "# {}. Source: {}:{} ({})\n",
            idx + 1,
            item.source_file,
            item.line_no,
            item.note
        ));
        let method = guess_method(&item.url);
        out.push_str(&format!("curl -X {} \"{}\" \\\n", method, item.url));
        if method == "POST" {
            out.push_str("  -H \"Content-Type: application/json\" \\\n");
            out.push_str("  -d '{\"example\":\"payload\"}' \\\n");
        }
        out.push_str("  -H \"Authorization: Bearer [TOKEN]\"\n\n");
    }
    out
}

pub fn write_curl_file(findings: &[Finding], out_path: &Path) -> TriageResult<()> {
    if let Some(parent) = out_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut f = fs::File::create(out_path)?;
    f.write_all(render_curl(findings).as_bytes())?;
    Ok(())
}

fn guess_method(url: &str) -> &'static str {
    let low = url.to_lowercase();
    const POST_HINTS: &[&str] = &["/login", "/auth", "/token", "/signup", "/register"];
    if POST_HINTS.iter().any(|k| low.contains(k)) {
        "POST"
    } else {
        "GET"
    }
}
