//! # apktriage — APK Reverse-Engineering Triage Engine
//!
//! Offline, deterministic triage of decompiled Android application trees.
//! Given the output of external decompilers (apktool / jadx), the engine:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     TriagePipeline                           │
//! │  ┌───────────┐  ┌──────────┐  ┌──────────┐  ┌────────────┐  │
//! │  │ TreeIndex │  │Classifier│  │ Strategy │  │  Oracle    │  │
//! │  │ (1-pass)  │→ │ (scored) │→ │ Selector │→ │ (external) │  │
//! │  └───────────┘  └──────────┘  └──────────┘  └─────┬──────┘  │
//! │                                                    │         │
//! │  ┌──────────────────┐            ┌────────────────▼──────┐  │
//! │  │ EndpointExtractor│───merge───▶│ Miner → Report → curl │  │
//! │  └──────────────────┘            └───────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Capabilities
//!
//! - **Stack Classification**: additive evidence scoring across six closed
//!   technology categories (Native Android, Flutter, React Native, Xamarin,
//!   Cordova, Unity) with a derived confidence level
//! - **Tool Selection**: static primary/fallback tool plans with phased
//!   analysis strategies, widened when confidence is low
//! - **Endpoint Extraction**: direct URLs, base64-obfuscated URLs, and
//!   Retrofit baseUrl × annotation combinations, normalized and deduplicated
//! - **Oracle Mining**: best-effort lexical mining of free-text analysis
//!   output into curl templates, auth-flow and security-issue mentions
//! - **Idempotent Batch Processing**: write-once processed markers keyed by
//!   input content hash; re-runs are no-ops
//!
//! Decompilation, directory watching, and CLI argument handling live outside
//! this crate.

pub mod classify;
pub mod config;
pub mod extract;
pub mod index;
pub mod oracle;
pub mod pipeline;
pub mod report;
pub mod strategy;

pub use classify::{classify, Category, ClassificationResult, Confidence, ScoreResult};
pub use config::TriageConfig;
pub use extract::{extract, render_curl, write_curl_file, Finding};
pub use index::TreeIndex;
pub use oracle::{AnalysisOracle, CliOracle, OracleConfig};
pub use pipeline::{PipelineOutcome, PipelineStage, TriagePipeline};
pub use report::AnalysisReport;
pub use strategy::{select_strategy, StrategyPlan, ToolDescriptor};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TriageError {
    #[error("Required input directory missing: {0}")]
    MissingInput(PathBuf),

    #[error("External tool failure: {0}")]
    ExternalTool(String),

    #[error("External analysis timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type TriageResult<T> = Result<T, TriageError>;
