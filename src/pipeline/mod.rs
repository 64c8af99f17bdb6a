//! Pipeline orchestration
//!
//! Sequences classification, tool selection, endpoint extraction, and the
//! oracle analysis for one working directory, persisting a structured result
//! after each stage. Stages are strictly gated: a failed stage fails the run
//! with that stage's name and nothing downstream executes. A batch driver
//! walks a queue of input artifacts, claiming each through an exclusive
//! marker so re-runs and concurrent runs are no-ops.

pub mod marker;

use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::classify::classify;
use crate::config::TriageConfig;
use crate::extract::{extract, render_curl, Finding};
use crate::oracle::miner::{self, MiningOutcome};
use crate::oracle::AnalysisOracle;
use crate::report::{AnalysisRecord, AnalysisReport};
use crate::strategy::select_strategy;
use crate::{TriageError, TriageResult};

// ─── Stages & Outcome ───────────────────────────────────────────────

/// Pipeline progress, advanced only by successful stage completion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineStage {
    Pending,
    Classified,
    ToolsSelected,
    Analyzed,
    Completed,
    Failed,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Pending => "Pending",
            Self::Classified => "Classified",
            Self::ToolsSelected => "ToolsSelected",
            Self::Analyzed => "Analyzed",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
        };
        write!(f, "{}", name)
    }
}

/// Result of one pipeline attempt
#[derive(Debug)]
pub enum PipelineOutcome {
    Completed(Box<AnalysisReport>),
    /// Input already carried a processed marker; nothing was invoked
    Skipped,
    /// A stage failed; downstream stages did not run
    Failed {
        stage: PipelineStage,
        error: String,
    },
}

/// Persisted shape of a failed run
#[derive(Debug, Serialize, Deserialize)]
struct FailureRecord {
    pipeline_status: String,
    failed_stage: String,
    error: String,
}

// ─── Orchestrator ───────────────────────────────────────────────────

pub struct TriagePipeline {
    config: TriageConfig,
    oracle: Box<dyn AnalysisOracle>,
}

impl TriagePipeline {
    pub fn new(config: TriageConfig, oracle: Box<dyn AnalysisOracle>) -> Self {
        Self { config, oracle }
    }

    /// Run the full pipeline for one prepared working directory.
    ///
    /// The directory must contain `decompiled/` (an absent decompiled tree is
    /// fatal for this application); `jadx_output/` is optional. Per-stage
    /// results are persisted as they are produced.
    pub fn run(&self, work_dir: &Path) -> TriageResult<PipelineOutcome> {
        let decompiled = work_dir.join("decompiled");
        if !decompiled.exists() {
            return Err(TriageError::MissingInput(decompiled));
        }
        let jadx = work_dir.join("jadx_output");

        tracing::info!("Starting analysis pipeline for {}", work_dir.display());

        // Stage 1: classification
        let started = Instant::now();
        let identification = classify(&decompiled, &jadx);
        tracing::info!(
            "Stage 1 done in {:.2}s: {} ({}, {} evidence items)",
            started.elapsed().as_secs_f64(),
            identification.category,
            identification.confidence,
            identification.evidence.len()
        );
        persist_json(&work_dir.join("step1_identification.json"), &identification)?;

        // Stage 2: tool selection, pure function of stage 1
        let plan = select_strategy(identification.category, identification.confidence);
        tracing::info!(
            "Stage 2 done: {} primary tools, {} fallback tools, {} phases",
            plan.primary_tools.len(),
            plan.fallback_tools.len(),
            plan.phases.len()
        );
        persist_json(&work_dir.join("step2_tool_selection.json"), &plan)?;

        // Endpoint extraction runs before the oracle so its output can be
        // offered as context
        let src_root = if jadx.exists() { &jadx } else { &decompiled };
        let findings = extract(src_root);
        let curl_path = work_dir.join("curl.txt");
        if !curl_path.exists() {
            fs::write(&curl_path, render_curl(&findings))?;
        }

        // Stage 3: oracle analysis plus mining of its prose
        let started = Instant::now();
        let raw_analysis = match self.oracle.analyze(work_dir, &identification) {
            Ok(text) => text,
            Err(e) => {
                let error = e.to_string();
                tracing::warn!("Stage 3 failed: {}", error);
                self.persist_failure(work_dir, PipelineStage::Analyzed, &error)?;
                return Ok(PipelineOutcome::Failed {
                    stage: PipelineStage::Analyzed,
                    error,
                });
            }
        };
        let mining = miner::mine(&raw_analysis, self.config.mining_max_input_bytes);
        tracing::info!(
            "Stage 3 done in {:.2}s: {} endpoints, {} curl commands, status {}",
            started.elapsed().as_secs_f64(),
            mining.endpoints.len(),
            mining.curl_commands.len(),
            if mining.failed { "failed" } else { "success" }
        );
        let record = AnalysisRecord {
            raw_analysis,
            mining,
        };
        persist_json(&work_dir.join("step3_analysis.json"), &record)?;

        update_curl_file(&curl_path, &findings, &record.mining)?;

        let report = AnalysisReport::new(identification, plan, record, findings);
        persist_json(&work_dir.join("pipeline_results.json"), &report)?;
        fs::write(work_dir.join("analysis_summary.txt"), report.render_summary())?;

        tracing::info!("Pipeline completed for {}", work_dir.display());
        Ok(PipelineOutcome::Completed(Box::new(report)))
    }

    fn persist_failure(
        &self,
        work_dir: &Path,
        stage: PipelineStage,
        error: &str,
    ) -> TriageResult<()> {
        persist_json(
            &work_dir.join("pipeline_results.json"),
            &FailureRecord {
                pipeline_status: "failed".to_string(),
                failed_stage: stage.to_string(),
                error: error.to_string(),
            },
        )
    }

    /// Attempt every pending input under `data_dir` once. Each input is
    /// claimed through an exclusive marker before processing, so a second
    /// driver racing on the same queue skips what the first one claimed.
    /// Individual failures never abort the batch.
    pub fn process_pending(
        &self,
        data_dir: &Path,
        analysis_dir: &Path,
    ) -> Vec<(PathBuf, TriageResult<PipelineOutcome>)> {
        let mut results = Vec::new();
        for input in scan_inputs(data_dir) {
            let outcome = self.process_input(&input, analysis_dir);
            if let Err(e) = &outcome {
                tracing::warn!("Processing {} failed: {}", input.display(), e);
            }
            results.push((input, outcome));
        }
        results
    }

    fn process_input(
        &self,
        input: &Path,
        analysis_dir: &Path,
    ) -> TriageResult<PipelineOutcome> {
        if !marker::mark_processed(analysis_dir, input)? {
            tracing::info!("Already processed, skipping {}", input.display());
            return Ok(PipelineOutcome::Skipped);
        }
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unknown".to_string());
        self.run(&analysis_dir.join(stem))
    }
}

/// APK and XAPK artifacts directly under the queue directory, sorted
fn scan_inputs(data_dir: &Path) -> Vec<PathBuf> {
    let mut inputs: Vec<PathBuf> = fs::read_dir(data_dir)
        .map(|rd| {
            rd.filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| {
                    p.is_file()
                        && p.extension()
                            .and_then(|e| e.to_str())
                            .map(|e| {
                                let e = e.to_lowercase();
                                e == "apk" || e == "xapk"
                            })
                            .unwrap_or(false)
                })
                .collect()
        })
        .unwrap_or_default();
    inputs.sort();
    inputs
}

// ─── Curl File Maintenance ──────────────────────────────────────────

const ORIGINAL_HEADER: &str = "# === ORIGINAL FINDINGS (from endpoint extraction) ===";
const ENHANCED_HEADER: &str = "# === ENHANCED FINDINGS (from oracle analysis) ===";

/// Rewrite curl.txt with the latest oracle findings while keeping the
/// original extraction section stable: once written, it is carried verbatim
/// through every later rewrite.
fn update_curl_file(
    curl_path: &Path,
    findings: &[Finding],
    mining: &MiningOutcome,
) -> TriageResult<()> {
    let existing = if curl_path.exists() {
        fs::read_to_string(curl_path)?
    } else {
        String::new()
    };

    let original_section = carve_original_section(&existing)
        .unwrap_or_else(|| format!("{}\n{}", ORIGINAL_HEADER, render_curl(findings)));

    let mut out = String::new();
    out.push_str("# Enhanced curl.txt - Generated by the analysis pipeline\n");
    out.push_str(&format!(
        "# Analysis Date: {}\n\n",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    ));
    out.push_str(original_section.trim_end());
    out.push_str("\n\n");

    if mining.curl_commands.is_empty() {
        out.push_str("# No additional endpoints found by oracle analysis\n");
    } else {
        out.push_str(ENHANCED_HEADER);
        out.push('\n');
        for cmd in &mining.curl_commands {
            out.push_str(cmd);
            out.push_str("\n\n");
        }
    }

    fs::write(curl_path, out)?;
    Ok(())
}

/// The previously written original-findings section, header included, up to
/// the next section header or end of file
fn carve_original_section(existing: &str) -> Option<String> {
    let start = existing.find(ORIGINAL_HEADER)?;
    let rest = &existing[start..];
    let end = rest[ORIGINAL_HEADER.len()..]
        .find("\n# === ")
        .map(|i| ORIGINAL_HEADER.len() + i)
        .unwrap_or(rest.len());
    Some(rest[..end].to_string())
}

fn persist_json<T: Serialize>(path: &Path, value: &T) -> TriageResult<()> {
    let file = fs::File::create(path)?;
    serde_json::to_writer_pretty(file, value)?;
    Ok(())
}
