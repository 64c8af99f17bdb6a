//! External analysis oracle
//!
//! Deep analysis is delegated to an opaque external CLI that returns free
//! text. This module owns prompt-template resolution, context-block
//! construction from the working directory, and the subprocess invocation
//! itself: streamed line reads under a hard wall-clock timeout with a forced
//! kill on expiry. The returned text carries no schema; `miner` extracts
//! what it can on a best-effort basis.

pub mod miner;

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use walkdir::WalkDir;

use crate::classify::{Category, ClassificationResult};
use crate::config::TriageConfig;
use crate::{TriageError, TriageResult};

// ─── Configuration ──────────────────────────────────────────────────

/// Credentials and invocation parameters for the oracle.
///
/// Credentials are explicit constructor inputs, not ambient environment
/// lookups; a missing key is a configuration error at construction time.
#[derive(Debug, Clone)]
pub struct OracleConfig {
    pub api_key: String,
    pub base_url: Option<String>,
    pub binary: String,
    pub args: Vec<String>,
    pub timeout: Duration,
    pub drain_timeout: Duration,
    pub prompt_roots: Vec<PathBuf>,
}

impl OracleConfig {
    pub fn new(
        api_key: impl Into<String>,
        base_url: Option<String>,
        config: &TriageConfig,
    ) -> TriageResult<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(TriageError::Config(
                "Oracle API key is required but was empty".to_string(),
            ));
        }
        Ok(Self {
            api_key,
            base_url,
            binary: config.oracle_binary.clone(),
            args: config.oracle_args.clone(),
            timeout: Duration::from_secs(config.oracle_timeout_secs),
            drain_timeout: Duration::from_secs(config.oracle_drain_timeout_secs),
            prompt_roots: config.prompt_roots.clone(),
        })
    }
}

// ─── Oracle Seam ────────────────────────────────────────────────────

/// Seam between the pipeline and the external analysis service
pub trait AnalysisOracle {
    /// Run deep analysis for a classified working directory, returning the
    /// oracle's raw free-text output
    fn analyze(
        &self,
        work_dir: &Path,
        classification: &ClassificationResult,
    ) -> TriageResult<String>;
}

/// Production oracle backed by the external CLI binary
pub struct CliOracle {
    config: OracleConfig,
}

impl CliOracle {
    pub fn new(config: OracleConfig) -> Self {
        Self { config }
    }
}

impl AnalysisOracle for CliOracle {
    fn analyze(
        &self,
        work_dir: &Path,
        classification: &ClassificationResult,
    ) -> TriageResult<String> {
        let prompt_path = resolve_prompt(&self.config.prompt_roots, classification.category)?;
        let template = fs::read_to_string(&prompt_path)?;
        let context = build_context(work_dir, classification.category);
        let prompt = build_full_prompt(&template, &context, classification, work_dir);

        tracing::info!(
            "Invoking oracle {} with prompt {} ({} context sections)",
            self.config.binary,
            prompt_path.display(),
            context.sections.len()
        );
        run_with_timeout(&self.config, &prompt)
    }
}

// ─── Prompt Resolution ──────────────────────────────────────────────

fn prompt_file_name(category: Category) -> &'static str {
    match category {
        Category::NativeAndroid => "kotlin_analysis.md",
        Category::Flutter => "flutter_analysis.md",
        Category::ReactNative => "react_native_analysis.md",
        Category::Xamarin | Category::Cordova | Category::Unity => "generic_analysis.md",
    }
}

/// Find the prompt template for a category: first existing root wins, and a
/// missing category-specific template falls back to the generic one
pub fn resolve_prompt(roots: &[PathBuf], category: Category) -> TriageResult<PathBuf> {
    let root = roots
        .iter()
        .find(|r| r.exists())
        .ok_or_else(|| TriageError::Config("No prompt root directory exists".to_string()))?;

    let specific = root.join("analysis").join(prompt_file_name(category));
    if specific.exists() {
        return Ok(specific);
    }
    let generic = root.join("analysis").join("generic_analysis.md");
    if generic.exists() {
        tracing::warn!(
            "Prompt {} missing, falling back to generic",
            specific.display()
        );
        return Ok(generic);
    }
    Err(TriageError::Config(format!(
        "No prompt template for {} under {}",
        category,
        root.display()
    )))
}

// ─── Context Construction ───────────────────────────────────────────

const MANIFEST_LIMIT: usize = 8000;
const CURL_LIMIT: usize = 4000;
const OVERVIEW_MAX_FILES: usize = 50;
const ASSET_MANIFEST_LIMIT: usize = 2000;
const FLUTTER_ASSETS_MAX_FILES: usize = 30;
const BUNDLE_SAMPLE_LIMIT: usize = 5000;
const MAIN_ACTIVITY_LIMIT: usize = 3000;
const STRINGS_XML_LIMIT: usize = 2000;

/// Ordered named context sections passed to the oracle
#[derive(Debug, Default)]
pub struct AnalysisContext {
    pub sections: Vec<(String, String)>,
}

impl AnalysisContext {
    fn push(&mut self, title: &str, body: String) {
        self.sections.push((title.to_string(), body));
    }
}

/// Assemble the context block: manifest excerpt, previously extracted
/// endpoints, a file-structure overview, and category-specific samples.
/// Every read is best-effort; missing files become placeholder notes.
pub fn build_context(work_dir: &Path, category: Category) -> AnalysisContext {
    let mut ctx = AnalysisContext::default();

    let manifest = work_dir.join("decompiled").join("AndroidManifest.xml");
    ctx.push(
        "ANDROID MANIFEST",
        read_truncated(&manifest, MANIFEST_LIMIT).unwrap_or_else(|| "<not found>".to_string()),
    );

    let curl = work_dir.join("curl.txt");
    ctx.push(
        "EXISTING ENDPOINTS",
        read_truncated(&curl, CURL_LIMIT)
            .unwrap_or_else(|| "<none found by endpoint extraction>".to_string()),
    );

    ctx.push("FILE STRUCTURE OVERVIEW", file_structure_overview(work_dir));

    match category {
        Category::Flutter => flutter_context(work_dir, &mut ctx),
        Category::ReactNative => react_native_context(work_dir, &mut ctx),
        Category::NativeAndroid => native_android_context(work_dir, &mut ctx),
        _ => {}
    }

    ctx
}

fn read_truncated(path: &Path, limit: usize) -> Option<String> {
    let bytes = fs::read(path).ok()?;
    let text = String::from_utf8_lossy(&bytes);
    Some(text.chars().take(limit).collect())
}

fn file_structure_overview(work_dir: &Path) -> String {
    let mut lines = Vec::new();
    let decompiled = work_dir.join("decompiled");
    if decompiled.exists() {
        lines.push("=== DECOMPILED STRUCTURE ===".to_string());
        lines.extend(directory_summary(&decompiled, OVERVIEW_MAX_FILES));
    }
    let jadx = work_dir.join("jadx_output");
    if jadx.exists() {
        lines.push("\n=== JADX OUTPUT STRUCTURE ===".to_string());
        lines.extend(directory_summary(&jadx, OVERVIEW_MAX_FILES));
    }
    lines.join("\n")
}

fn directory_summary(dir: &Path, max_files: usize) -> Vec<String> {
    let mut summary = Vec::new();
    let mut count = 0;
    for entry in WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        if count >= max_files {
            summary.push(format!("... (truncated, showing first {} files)", max_files));
            break;
        }
        if let Ok(rel) = entry.path().strip_prefix(dir) {
            summary.push(rel.display().to_string());
            count += 1;
        }
    }
    summary
}

fn flutter_context(work_dir: &Path, ctx: &mut AnalysisContext) {
    let assets = work_dir.join("decompiled").join("assets").join("flutter_assets");
    if !assets.exists() {
        return;
    }
    if let Some(manifest) = read_truncated(&assets.join("AssetManifest.json"), ASSET_MANIFEST_LIMIT)
    {
        ctx.push("FLUTTER ASSET MANIFEST", manifest);
    }
    ctx.push(
        "FLUTTER ASSETS STRUCTURE",
        directory_summary(&assets, FLUTTER_ASSETS_MAX_FILES).join("\n"),
    );
}

fn react_native_context(work_dir: &Path, ctx: &mut AnalysisContext) {
    let assets = work_dir.join("decompiled").join("assets");
    if !assets.exists() {
        return;
    }
    let mut bundles: Vec<PathBuf> = fs::read_dir(&assets)
        .map(|rd| {
            rd.filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| {
                    p.extension()
                        .and_then(|e| e.to_str())
                        .map(|e| e == "bundle" || e == "jsbundle")
                        .unwrap_or(false)
                })
                .collect()
        })
        .unwrap_or_default();
    bundles.sort();
    if let Some(first) = bundles.first() {
        if let Some(sample) = read_truncated(first, BUNDLE_SAMPLE_LIMIT) {
            ctx.push("REACT NATIVE BUNDLE SAMPLE", sample);
        }
        let names: Vec<String> = bundles
            .iter()
            .filter_map(|b| b.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        ctx.push("BUNDLE INFO", format!("Found bundles: {:?}", names));
    }
}

fn native_android_context(work_dir: &Path, ctx: &mut AnalysisContext) {
    let jadx = work_dir.join("jadx_output");
    if jadx.exists() {
        let main = WalkDir::new(&jadx)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .find(|e| {
                let name = e.file_name().to_string_lossy().to_lowercase();
                name.ends_with(".java") && (name.contains("main") || name.contains("activity"))
            });
        if let Some(main) = main {
            if let Some(sample) = read_truncated(main.path(), MAIN_ACTIVITY_LIMIT) {
                ctx.push("MAIN ACTIVITY SAMPLE", sample);
            }
        }
    }

    let strings = WalkDir::new(work_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .find(|e| e.file_type().is_file() && e.file_name() == "strings.xml");
    if let Some(strings) = strings {
        if let Some(sample) = read_truncated(strings.path(), STRINGS_XML_LIMIT) {
            ctx.push("STRINGS.XML SAMPLE", sample);
        }
    }
}

fn build_full_prompt(
    template: &str,
    context: &AnalysisContext,
    classification: &ClassificationResult,
    work_dir: &Path,
) -> String {
    let context_block = context
        .sections
        .iter()
        .map(|(title, body)| format!("=== {} ===\n{}\n", title, body))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "\n{template}\n\n\
         === ANALYSIS TARGET INFORMATION ===\n\n\
         App Type: {category} (Confidence: {confidence})\n\
         Analysis Directory: {work_dir}\n\n\
         {context_block}\n\
         === YOUR TASK ===\n\n\
         Based on the app type ({category}) and the provided context, perform a thorough \
         analysis to find all real API endpoints. Follow the specific strategies outlined \
         in the prompt above for {category} apps.\n\n\
         Focus on:\n\
         1. Finding actual HTTP/HTTPS URLs\n\
         2. Deobfuscating any hidden or encoded URLs\n\
         3. Understanding the authentication flow\n\
         4. Identifying sensitive data handling\n\
         5. Creating working curl commands\n\n\
         Provide your analysis in the format specified in the prompt.\n",
        template = template,
        category = classification.category,
        confidence = classification.confidence,
        work_dir = work_dir.display(),
        context_block = context_block,
    )
}

// ─── Subprocess Invocation ──────────────────────────────────────────

/// Run the oracle binary, streaming stdout line by line under the wall-clock
/// budget. On expiry the child is killed and the stage reports a timeout;
/// the process is never left running.
fn run_with_timeout(config: &OracleConfig, prompt: &str) -> TriageResult<String> {
    let mut cmd = Command::new(&config.binary);
    cmd.args(&config.args)
        .arg(prompt)
        .env("ANTHROPIC_API_KEY", &config.api_key)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(base_url) = &config.base_url {
        cmd.env("ANTHROPIC_BASE_URL", base_url);
    }

    let mut child = cmd.spawn().map_err(|e| {
        TriageError::ExternalTool(format!("Failed to launch {}: {}", config.binary, e))
    })?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| TriageError::ExternalTool("Oracle stdout not captured".to_string()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| TriageError::ExternalTool("Oracle stderr not captured".to_string()))?;

    let (out_tx, out_rx) = mpsc::channel::<String>();
    thread::spawn(move || {
        for line in BufReader::new(stdout).lines().map_while(Result::ok) {
            if out_tx.send(line).is_err() {
                break;
            }
        }
    });
    let (err_tx, err_rx) = mpsc::channel::<String>();
    thread::spawn(move || {
        for line in BufReader::new(stderr).lines().map_while(Result::ok) {
            if err_tx.send(line).is_err() {
                break;
            }
        }
    });

    let deadline = Instant::now() + config.timeout;
    let mut collected: Vec<String> = Vec::new();
    loop {
        let now = Instant::now();
        if now >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(TriageError::Timeout {
                seconds: config.timeout.as_secs(),
            });
        }
        match out_rx.recv_timeout(deadline - now) {
            Ok(line) => {
                tracing::debug!("oracle: {}", line);
                collected.push(line);
            }
            Err(RecvTimeoutError::Timeout) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(TriageError::Timeout {
                    seconds: config.timeout.as_secs(),
                });
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    // Stdout is closed but the child may still be running; keep the wait
    // under the same deadline so the process is never left behind
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(TriageError::Timeout {
                seconds: config.timeout.as_secs(),
            });
        }
        thread::sleep(Duration::from_millis(25));
    };

    // Bounded drain of buffered stderr; the reader thread may still be live
    let mut stderr_lines: Vec<String> = Vec::new();
    while let Ok(line) = err_rx.recv_timeout(config.drain_timeout) {
        stderr_lines.push(line);
    }

    if !status.success() {
        return Err(TriageError::ExternalTool(format!(
            "{} exited with {}: {}",
            config.binary,
            status,
            stderr_lines.join("\n")
        )));
    }

    Ok(collected.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{Confidence, ScoreResult};
    use std::fs;
    use tempfile::TempDir;

    fn classification(category: Category) -> ClassificationResult {
        ClassificationResult {
            category,
            confidence: Confidence::High,
            evidence: vec!["fixture".to_string()],
            rationale: "fixture".to_string(),
            all_scores: vec![ScoreResult {
                category,
                score: 100,
                evidence: vec!["fixture".to_string()],
                rationale: "fixture".to_string(),
            }],
        }
    }

    #[test]
    fn test_empty_api_key_is_config_error() {
        let err = OracleConfig::new("  ", None, &TriageConfig::default()).unwrap_err();
        assert!(matches!(err, TriageError::Config(_)));
    }

    #[test]
    fn test_prompt_resolution_prefers_specific_template() {
        let dir = TempDir::new().unwrap();
        let analysis = dir.path().join("analysis");
        fs::create_dir_all(&analysis).unwrap();
        fs::write(analysis.join("flutter_analysis.md"), "flutter prompt").unwrap();
        fs::write(analysis.join("generic_analysis.md"), "generic prompt").unwrap();

        let roots = vec![PathBuf::from("/nonexistent"), dir.path().to_path_buf()];
        let path = resolve_prompt(&roots, Category::Flutter).unwrap();
        assert!(path.ends_with("analysis/flutter_analysis.md"));

        // Missing specific template falls back to generic
        let path = resolve_prompt(&roots, Category::NativeAndroid).unwrap();
        assert!(path.ends_with("analysis/generic_analysis.md"));
    }

    #[test]
    fn test_prompt_resolution_without_roots_is_config_error() {
        let err = resolve_prompt(&[PathBuf::from("/nonexistent")], Category::Unity).unwrap_err();
        assert!(matches!(err, TriageError::Config(_)));
    }

    #[test]
    fn test_context_includes_manifest_and_overview() {
        let dir = TempDir::new().unwrap();
        let decompiled = dir.path().join("decompiled");
        fs::create_dir_all(&decompiled).unwrap();
        fs::write(decompiled.join("AndroidManifest.xml"), "<manifest/>").unwrap();

        let ctx = build_context(dir.path(), Category::NativeAndroid);
        let titles: Vec<&str> = ctx.sections.iter().map(|(t, _)| t.as_str()).collect();
        assert!(titles.contains(&"ANDROID MANIFEST"));
        assert!(titles.contains(&"FILE STRUCTURE OVERVIEW"));
        let manifest = &ctx.sections[0].1;
        assert_eq!(manifest, "<manifest/>");
    }

    #[test]
    fn test_manifest_excerpt_is_truncated() {
        let dir = TempDir::new().unwrap();
        let decompiled = dir.path().join("decompiled");
        fs::create_dir_all(&decompiled).unwrap();
        fs::write(decompiled.join("AndroidManifest.xml"), "x".repeat(20_000)).unwrap();

        let ctx = build_context(dir.path(), Category::Unity);
        assert_eq!(ctx.sections[0].1.chars().count(), MANIFEST_LIMIT);
    }

    #[test]
    fn test_full_prompt_carries_category_and_task() {
        let dir = TempDir::new().unwrap();
        let ctx = build_context(dir.path(), Category::Flutter);
        let prompt = build_full_prompt("TEMPLATE", &ctx, &classification(Category::Flutter), dir.path());
        assert!(prompt.contains("TEMPLATE"));
        assert!(prompt.contains("App Type: Flutter"));
        assert!(prompt.contains("=== YOUR TASK ==="));
    }

    #[test]
    fn test_child_closing_pipes_but_lingering_is_killed() {
        let config = OracleConfig {
            api_key: "test-key".to_string(),
            base_url: None,
            binary: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                "echo partial; exec >&- 2>&-; sleep 5".to_string(),
            ],
            timeout: Duration::from_millis(300),
            drain_timeout: Duration::from_millis(50),
            prompt_roots: Vec::new(),
        };

        let started = Instant::now();
        let err = run_with_timeout(&config, "ignored").unwrap_err();
        assert!(matches!(err, TriageError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(3));
    }
}
