//! Merged analysis report — structured JSON plus a human-readable summary
//!
//! One report per application run, assembled after the final pipeline stage
//! and never updated in place; a re-run produces a new report.

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

use crate::classify::{Category, ClassificationResult, Confidence};
use crate::extract::Finding;
use crate::oracle::miner::MiningOutcome;
use crate::strategy::StrategyPlan;

/// Raw oracle output together with what mining recovered from it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub raw_analysis: String,
    pub mining: MiningOutcome,
}

/// Compact roll-up of the whole pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub app_type: String,
    pub confidence: String,
    pub evidence_count: usize,
    pub tools_selected: usize,
    pub analysis_phases: usize,
    pub endpoints_found: usize,
    pub curl_commands_generated: usize,
    pub analysis_status: String,
    pub recommended_next_steps: Vec<String>,
}

/// Complete per-application report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub pipeline_status: String,
    pub identification: ClassificationResult,
    pub tool_selection: StrategyPlan,
    pub analysis: AnalysisRecord,
    /// Extractor findings merged in as supplementary evidence
    pub findings: Vec<Finding>,
    pub summary: PipelineSummary,
}

impl AnalysisReport {
    pub fn new(
        identification: ClassificationResult,
        tool_selection: StrategyPlan,
        analysis: AnalysisRecord,
        findings: Vec<Finding>,
    ) -> Self {
        let endpoints_found = analysis.mining.endpoints.len();
        let analysis_status = if analysis.mining.failed {
            "failed"
        } else {
            "success"
        };
        let summary = PipelineSummary {
            app_type: identification.category.to_string(),
            confidence: identification.confidence.to_string(),
            evidence_count: identification.evidence.len(),
            tools_selected: tool_selection.primary_tools.len(),
            analysis_phases: tool_selection.phases.len(),
            endpoints_found,
            curl_commands_generated: analysis.mining.curl_commands.len(),
            analysis_status: analysis_status.to_string(),
            recommended_next_steps: next_steps(
                identification.category,
                identification.confidence,
                endpoints_found,
            ),
        };
        Self {
            pipeline_status: "completed".to_string(),
            identification,
            tool_selection,
            analysis,
            findings,
            summary,
        }
    }

    /// Render the operator-facing text summary
    pub fn render_summary(&self) -> String {
        let mut out = String::new();
        let s = &self.summary;

        let _ = writeln!(out, "=== STEP-BASED ANALYSIS SUMMARY ===\n");
        let _ = writeln!(
            out,
            "App Type: {} (Confidence: {})",
            s.app_type, s.confidence
        );
        let _ = writeln!(out, "Evidence Points: {}", s.evidence_count);
        let _ = writeln!(out, "Tools Selected: {}", s.tools_selected);
        let _ = writeln!(out, "Analysis Phases: {}", s.analysis_phases);
        let _ = writeln!(out, "Endpoints Found: {}", s.endpoints_found);
        let _ = writeln!(out, "Curl Commands: {}", s.curl_commands_generated);
        let _ = writeln!(out, "Analysis Status: {}\n", s.analysis_status);

        let _ = writeln!(out, "=== IDENTIFICATION EVIDENCE ===");
        for evidence in &self.identification.evidence {
            let _ = writeln!(out, "- {}", evidence);
        }
        let _ = writeln!(out, "\nReasoning: {}\n", self.identification.rationale);

        let _ = writeln!(out, "=== ANALYSIS STRATEGY ===");
        for phase in &self.tool_selection.phases {
            let _ = writeln!(out, "Phase: {}", phase.name);
            let _ = writeln!(out, "  Description: {}", phase.description);
            let _ = writeln!(out, "  Focus: {}\n", phase.focus.join(", "));
        }

        let _ = writeln!(out, "=== KEY FINDINGS ===");
        if self.analysis.mining.curl_commands.is_empty() {
            let _ = writeln!(out, "No endpoints discovered through automated analysis.");
        } else {
            let _ = writeln!(out, "Discovered Endpoints:");
            for cmd in &self.analysis.mining.curl_commands {
                let _ = writeln!(out, "  {}", cmd);
            }
        }

        let _ = writeln!(out, "\n=== RECOMMENDED NEXT STEPS ===");
        for step in &s.recommended_next_steps {
            let _ = writeln!(out, "- {}", step);
        }
        out
    }
}

/// Rule-based next-step recommendations derived from the run's outcome
pub fn next_steps(category: Category, confidence: Confidence, endpoints_found: usize) -> Vec<String> {
    let mut steps: Vec<&str> = Vec::new();

    if confidence == Confidence::Low {
        steps.push("Re-run analysis with manual app type specification");
        steps.push("Try additional decompilation tools");
    }

    match category {
        Category::Flutter if endpoints_found == 0 => {
            steps.push("Use reFlutter for dynamic analysis");
            steps.push("Analyze Dart VM snapshots with specialized tools");
        }
        Category::ReactNative if endpoints_found == 0 => {
            steps.push("Extract and beautify JavaScript bundles manually");
            steps.push("Check for Hermes bytecode compilation");
        }
        Category::NativeAndroid => {
            steps.push("Perform dynamic analysis with Frida");
            steps.push("Check for runtime URL construction");
        }
        _ => {}
    }

    if endpoints_found == 0 {
        steps.push("Perform network traffic analysis");
        steps.push("Check for encrypted or heavily obfuscated endpoints");
    } else {
        steps.push("Test discovered endpoints with authentication");
        steps.push("Perform parameter fuzzing on discovered APIs");
    }

    steps.into_iter().map(String::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ScoreResult;
    use crate::oracle::miner::MinedEndpoint;
    use crate::strategy::select_strategy;

    fn classification() -> ClassificationResult {
        ClassificationResult {
            category: Category::Flutter,
            confidence: Confidence::High,
            evidence: vec!["Found flutter_assets directory".to_string()],
            rationale: "Flutter asset structure present".to_string(),
            all_scores: vec![ScoreResult {
                category: Category::Flutter,
                score: 75,
                evidence: vec!["Found flutter_assets directory".to_string()],
                rationale: "Flutter asset structure present".to_string(),
            }],
        }
    }

    fn mining_with_endpoint() -> MiningOutcome {
        MiningOutcome {
            failed: false,
            error: None,
            endpoints: vec![MinedEndpoint {
                url: "https://api.example.com/v1".to_string(),
                curl_command: "curl -X GET \"https://api.example.com/v1\"".to_string(),
                source: "claude-analysis-url".to_string(),
            }],
            curl_commands: vec!["curl -X GET \"https://api.example.com/v1\"".to_string()],
            auth_flows: vec![],
            security_issues: vec![],
            deobfuscation_methods: vec![],
        }
    }

    #[test]
    fn test_summary_reflects_inputs() {
        let ident = classification();
        let plan = select_strategy(ident.category, ident.confidence);
        let report = AnalysisReport::new(
            ident,
            plan,
            AnalysisRecord {
                raw_analysis: "ok".to_string(),
                mining: mining_with_endpoint(),
            },
            vec![],
        );
        assert_eq!(report.summary.app_type, "Flutter");
        assert_eq!(report.summary.endpoints_found, 1);
        assert_eq!(report.summary.analysis_status, "success");
        assert_eq!(report.pipeline_status, "completed");
    }

    #[test]
    fn test_failed_mining_marks_status_but_completes() {
        let ident = classification();
        let plan = select_strategy(ident.category, ident.confidence);
        let report = AnalysisReport::new(
            ident,
            plan,
            AnalysisRecord {
                raw_analysis: "Error: boom".to_string(),
                mining: MiningOutcome {
                    failed: true,
                    error: Some("Error: boom".to_string()),
                    ..MiningOutcome::default()
                },
            },
            vec![],
        );
        assert_eq!(report.summary.analysis_status, "failed");
        assert_eq!(report.pipeline_status, "completed");
    }

    #[test]
    fn test_next_steps_low_confidence_and_no_endpoints() {
        let steps = next_steps(Category::Flutter, Confidence::Low, 0);
        assert!(steps.contains(&"Re-run analysis with manual app type specification".to_string()));
        assert!(steps.contains(&"Use reFlutter for dynamic analysis".to_string()));
        assert!(steps.contains(&"Perform network traffic analysis".to_string()));
    }

    #[test]
    fn test_next_steps_with_endpoints_suggest_probing() {
        let steps = next_steps(Category::NativeAndroid, Confidence::High, 4);
        assert!(steps.contains(&"Perform dynamic analysis with Frida".to_string()));
        assert!(steps.contains(&"Test discovered endpoints with authentication".to_string()));
        assert!(!steps.contains(&"Perform network traffic analysis".to_string()));
    }

    #[test]
    fn test_rendered_summary_sections() {
        let ident = classification();
        let plan = select_strategy(ident.category, ident.confidence);
        let report = AnalysisReport::new(
            ident,
            plan,
            AnalysisRecord {
                raw_analysis: "ok".to_string(),
                mining: mining_with_endpoint(),
            },
            vec![],
        );
        let text = report.render_summary();
        assert!(text.contains("=== STEP-BASED ANALYSIS SUMMARY ==="));
        assert!(text.contains("App Type: Flutter (Confidence: High)"));
        assert!(text.contains("=== IDENTIFICATION EVIDENCE ==="));
        assert!(text.contains("=== RECOMMENDED NEXT STEPS ==="));
    }
}
