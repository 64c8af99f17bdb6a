//! End-to-end triage over a synthetic decompiled Flutter application
//!
//! Builds a fake apktool/jadx output tree on disk, runs the full pipeline
//! against a stubbed oracle, and checks the persisted artifacts: stage
//! files, the merged report, curl.txt stability across runs, and the
//! processed-marker no-op semantics.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tempfile::TempDir;

use apktriage::classify::ClassificationResult;
use apktriage::{
    classify, extract, AnalysisOracle, Category, Confidence, PipelineOutcome, TriageConfig,
    TriagePipeline, TriageResult,
};

struct ScriptedOracle {
    text: String,
    calls: Arc<AtomicUsize>,
}

impl AnalysisOracle for ScriptedOracle {
    fn analyze(
        &self,
        _work_dir: &Path,
        _classification: &ClassificationResult,
    ) -> TriageResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.text.clone())
    }
}

fn scripted_pipeline(text: &str) -> (TriagePipeline, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let oracle = ScriptedOracle {
        text: text.to_string(),
        calls: calls.clone(),
    };
    (
        TriagePipeline::new(TriageConfig::default(), Box::new(oracle)),
        calls,
    )
}

/// A plausible decompiled Flutter app: assets, one obfuscated URL, and a
/// Retrofit-style service in the jadx tree
fn build_flutter_fixture(root: &Path) {
    let decompiled = root.join("decompiled");
    let flutter_assets = decompiled.join("assets").join("flutter_assets");
    fs::create_dir_all(&flutter_assets).unwrap();
    fs::write(flutter_assets.join("AssetManifest.json"), "{}").unwrap();
    fs::write(flutter_assets.join("FontManifest.json"), "[]").unwrap();
    fs::create_dir_all(decompiled.join("lib").join("arm64-v8a")).unwrap();
    fs::write(
        decompiled.join("lib").join("arm64-v8a").join("libflutter.so"),
        [0u8; 8],
    )
    .unwrap();
    fs::write(
        decompiled.join("AndroidManifest.xml"),
        "<manifest><activity/><service/></manifest>",
    )
    .unwrap();

    let jadx = root.join("jadx_output");
    fs::create_dir_all(&jadx).unwrap();
    fs::write(
        jadx.join("ApiService.java"),
        concat!(
            "class ApiService {\n",
            "  // baseUrl(\"https://api.shop.example/\")\n",
            "  // @GET(\"catalog/{id}\")\n",
            "  String direct = \"https://cdn.shop.example/assets\";\n",
            // base64 of https://hidden.shop.example/token
            "  String enc = \"aHR0cHM6Ly9oaWRkZW4uc2hvcC5leGFtcGxlL3Rva2Vu\";\n",
            "}\n",
        ),
    )
    .unwrap();
}

#[test]
fn classifies_flutter_fixture_with_high_signal() {
    let dir = TempDir::new().unwrap();
    build_flutter_fixture(dir.path());

    let result = classify(
        &dir.path().join("decompiled"),
        &dir.path().join("jadx_output"),
    );
    assert_eq!(result.category, Category::Flutter);
    // assets dir + two manifests + native library
    assert!(result.evidence.len() >= 3);
    assert_eq!(result.confidence, Confidence::High);
}

#[test]
fn extraction_finds_direct_obfuscated_and_annotated_urls() {
    let dir = TempDir::new().unwrap();
    build_flutter_fixture(dir.path());

    let findings = extract(&dir.path().join("jadx_output"));
    let urls: Vec<&str> = findings.iter().map(|f| f.url.as_str()).collect();
    assert!(urls.contains(&"https://cdn.shop.example/assets"));
    assert!(urls.contains(&"https://hidden.shop.example/token"));
    assert!(urls.contains(&"https://api.shop.example/catalog/{id}"));
    // The baseUrl literal itself also surfaces as a direct hit
    assert!(urls.contains(&"https://api.shop.example/"));
}

#[test]
fn extraction_is_idempotent_over_unchanged_tree() {
    let dir = TempDir::new().unwrap();
    build_flutter_fixture(dir.path());

    let root = dir.path().join("jadx_output");
    let first = extract(&root);
    let second = extract(&root);
    assert_eq!(first, second);
}

#[test]
fn pipeline_persists_all_artifacts() {
    let dir = TempDir::new().unwrap();
    build_flutter_fixture(dir.path());
    let (pipeline, _) = scripted_pipeline(
        "Analysis complete.\n\
         curl -X POST \"https://api.shop.example/login\" \\\n  -H \"X: y\"\n\n\
         The auth flow exchanges a device id for a bearer token.\n",
    );

    let outcome = pipeline.run(dir.path()).unwrap();
    let report = match outcome {
        PipelineOutcome::Completed(report) => report,
        other => panic!("expected completion, got {:?}", other),
    };

    for artifact in [
        "step1_identification.json",
        "step2_tool_selection.json",
        "step3_analysis.json",
        "pipeline_results.json",
        "analysis_summary.txt",
        "curl.txt",
    ] {
        assert!(dir.path().join(artifact).exists(), "missing {}", artifact);
    }

    assert_eq!(report.identification.category, Category::Flutter);
    assert_eq!(report.summary.endpoints_found, 1);
    assert_eq!(report.summary.analysis_status, "success");
    assert!(!report.analysis.mining.auth_flows.is_empty());

    let summary = fs::read_to_string(dir.path().join("analysis_summary.txt")).unwrap();
    assert!(summary.contains("App Type: Flutter"));
    assert!(summary.contains("=== RECOMMENDED NEXT STEPS ==="));

    // Stage files round-trip as JSON
    let step1: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join("step1_identification.json")).unwrap())
            .unwrap();
    assert_eq!(step1["category"], "Flutter");
}

#[test]
fn curl_file_keeps_original_findings_across_reruns() {
    let dir = TempDir::new().unwrap();
    build_flutter_fixture(dir.path());
    let (pipeline, _) =
        scripted_pipeline("curl -X GET \"https://api.shop.example/v2/extra\"\n");

    fn original_section(text: &str) -> &str {
        let start = text.find("# === ORIGINAL FINDINGS").unwrap();
        let rest = &text[start..];
        match rest[1..].find("\n# === ") {
            Some(i) => &rest[..i + 1],
            None => rest,
        }
    }

    pipeline.run(dir.path()).unwrap();
    let first = fs::read_to_string(dir.path().join("curl.txt")).unwrap();
    assert!(first.contains("https://cdn.shop.example/assets"));

    pipeline.run(dir.path()).unwrap();
    let second = fs::read_to_string(dir.path().join("curl.txt")).unwrap();
    assert_eq!(original_section(&second), original_section(&first));
    assert!(second.contains("https://api.shop.example/v2/extra"));
}

#[test]
fn processed_marker_prevents_reprocessing() {
    let dir = TempDir::new().unwrap();
    let data = dir.path().join("data");
    let analysis = dir.path().join("analysis");
    fs::create_dir_all(&data).unwrap();
    fs::write(data.join("shop.apk"), b"apk contents").unwrap();
    build_flutter_fixture(&analysis.join("shop"));

    let (pipeline, calls) = scripted_pipeline("curl -X GET \"https://api.shop.example/ping\"\n");

    let first = pipeline.process_pending(&data, &analysis);
    assert_eq!(first.len(), 1);
    assert!(matches!(first[0].1, Ok(PipelineOutcome::Completed(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(analysis.join(".processed").join("shop.apk.done").exists());

    let second = pipeline.process_pending(&data, &analysis);
    assert!(matches!(second[0].1, Ok(PipelineOutcome::Skipped)));
    assert_eq!(calls.load(Ordering::SeqCst), 1, "oracle must not rerun");
}
