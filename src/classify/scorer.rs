//! Per-category evidence scorers
//!
//! Each category has an independently weighted additive rule set. Rules are
//! evaluated unconditionally — absence of one signal never suppresses the
//! others — and a missing path contributes zero rather than an error.

use aho_corasick::AhoCorasick;
use once_cell::sync::Lazy;
use regex::Regex;

use super::{Category, ScoreResult};
use crate::index::TreeIndex;

/// Markers whose presence anywhere rules out a pure native app
const CROSS_PLATFORM_MARKERS: [&str; 5] = [
    "flutter_assets",
    "index.android.bundle",
    "libflutter.so",
    "assemblies",
    "libunity.so",
];

/// Candidate JavaScript bundle locations, checked in order
const BUNDLE_CANDIDATES: [&str; 3] = [
    "assets/index.android.bundle",
    "assets/index.bundle",
    "assets/main.jsbundle",
];

static MANIFEST_ACTIVITY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<activity").unwrap());
static MANIFEST_SERVICE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<service").unwrap());
static MANIFEST_RECEIVER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<receiver").unwrap());

static RN_SIGNATURE_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"react-native",
        r"__reactNative",
        r"ReactNative",
        r"metro.*bundler",
        r"__DEV__.*react",
    ]
    .iter()
    .map(|p| Regex::new(&format!("(?i){p}")).unwrap())
    .collect()
});

static KOTLIN_TOKENS: Lazy<AhoCorasick> = Lazy::new(|| {
    AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build(["kotlin"])
        .unwrap()
});

/// Score one category hypothesis against the indexed trees
pub fn score(category: Category, decompiled: &TreeIndex, jadx: &TreeIndex) -> ScoreResult {
    match category {
        Category::NativeAndroid => score_native(decompiled, jadx),
        Category::Flutter => score_flutter(decompiled),
        Category::ReactNative => score_react_native(decompiled),
        Category::Xamarin => score_xamarin(decompiled),
        Category::Cordova => score_cordova(decompiled),
        Category::Unity => score_unity(decompiled),
    }
}

// ─── Native Android ─────────────────────────────────────────────────

fn score_native(decompiled: &TreeIndex, jadx: &TreeIndex) -> ScoreResult {
    let mut evidence = Vec::new();
    let mut score = 0u32;

    let smali_dirs = decompiled.top_level_dirs_with_prefix("smali");
    if !smali_dirs.is_empty() {
        evidence.push(format!("Found {} smali directories", smali_dirs.len()));
        score += 30;
    }

    let java_files = jadx.count_extension(".java");
    if java_files > 0 {
        evidence.push(format!("Found {} Java files in jadx output", java_files));
        score += 25;
    }

    let kotlin = kotlin_indicators(decompiled, jadx);
    if !kotlin.is_empty() {
        evidence.extend(kotlin);
        score += 15;
    }

    let components = manifest_components(decompiled);
    if !components.is_empty() {
        evidence.extend(components);
        score += 10;
    }

    if !has_cross_platform_markers(decompiled) {
        evidence.push("No cross-platform framework indicators found".to_string());
        score += 20;
    }

    ScoreResult {
        category: Category::NativeAndroid,
        score,
        evidence,
        rationale: "Native Android apps typically have smali bytecode, standard Android \
                    components, and lack cross-platform framework signatures."
            .to_string(),
    }
}

fn kotlin_indicators(decompiled: &TreeIndex, jadx: &TreeIndex) -> Vec<String> {
    let mut indicators = Vec::new();

    // kotlin/ package dirs inside any smali* tree
    let kotlin_dirs = decompiled
        .entries()
        .iter()
        .filter(|e| {
            e.is_dir
                && e.name == "kotlin"
                && e.rel_path
                    .components()
                    .next()
                    .map(|c| c.as_os_str().to_string_lossy().starts_with("smali"))
                    .unwrap_or(false)
        })
        .count();
    if kotlin_dirs > 0 {
        indicators.push(format!(
            "Found Kotlin bytecode in smali ({} directories)",
            kotlin_dirs
        ));
    }

    // Token search over decompiled sources, first hit wins
    let has_reference = jadx
        .entries()
        .iter()
        .filter(|e| !e.is_dir && e.extension == ".java")
        .any(|e| {
            std::fs::read(jadx.root.join(&e.rel_path))
                .map(|bytes| KOTLIN_TOKENS.is_match(&*String::from_utf8_lossy(&bytes)))
                .unwrap_or(false)
        });
    if has_reference {
        indicators.push("Found Kotlin references in decompiled code".to_string());
    }

    indicators
}

fn manifest_components(decompiled: &TreeIndex) -> Vec<String> {
    let manifest_path = decompiled.abs("AndroidManifest.xml");
    let content = match std::fs::read(&manifest_path) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(_) => return Vec::new(),
    };

    let mut components = Vec::new();
    let activities = MANIFEST_ACTIVITY_RE.find_iter(&content).count();
    let services = MANIFEST_SERVICE_RE.find_iter(&content).count();
    let receivers = MANIFEST_RECEIVER_RE.find_iter(&content).count();

    if activities > 0 {
        components.push(format!("Found {} activities in manifest", activities));
    }
    if services > 0 {
        components.push(format!("Found {} services in manifest", services));
    }
    if receivers > 0 {
        components.push(format!("Found {} broadcast receivers in manifest", receivers));
    }
    components
}

fn has_cross_platform_markers(decompiled: &TreeIndex) -> bool {
    let named = decompiled
        .entries()
        .iter()
        .any(|e| CROSS_PLATFORM_MARKERS.contains(&e.name.as_str()));
    named || decompiled.exists("assets/www")
}

// ─── Flutter ────────────────────────────────────────────────────────

fn score_flutter(decompiled: &TreeIndex) -> ScoreResult {
    let mut evidence = Vec::new();
    let mut score = 0u32;

    let has_assets = decompiled.find_dir("flutter_assets").is_some();
    if has_assets {
        evidence.push("Found flutter_assets/ directory".to_string());
        score += 40;

        if decompiled.file_under_dir("flutter_assets", "AssetManifest.json") {
            evidence.push("Found AssetManifest.json".to_string());
            score += 15;
        }
        if decompiled.file_under_dir("flutter_assets", "FontManifest.json") {
            evidence.push("Found FontManifest.json".to_string());
            score += 10;
        }
    }

    // libflutter.so under any ABI directory
    if let Some(lib) = decompiled.entries().iter().find(|e| {
        !e.is_dir
            && e.name == "libflutter.so"
            && e.rel_path
                .components()
                .next()
                .map(|c| c.as_os_str().to_string_lossy() == "lib")
                .unwrap_or(false)
    }) {
        let abi = lib
            .rel_path
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        evidence.push(format!("Found libflutter.so in {}", abi));
        score += 30;
    }

    let snapshots = decompiled.names_containing(&["vm_snapshot"]);
    if !snapshots.is_empty() {
        evidence.push(format!("Found {} VM snapshot files", snapshots.len()));
        score += 20;
    }

    if has_assets {
        let packages: Vec<String> = decompiled
            .entries()
            .iter()
            .filter(|e| {
                e.is_dir
                    && e.rel_path.components().any(|c| {
                        c.as_os_str().to_string_lossy().to_lowercase() == "flutter_assets"
                    })
                    && e.rel_path
                        .parent()
                        .and_then(|p| p.file_name())
                        .map(|n| n.to_string_lossy().to_lowercase() == "packages")
                        .unwrap_or(false)
            })
            .map(|e| e.name.clone())
            .collect();
        if !packages.is_empty() {
            let sample: Vec<&str> = packages.iter().take(5).map(|s| s.as_str()).collect();
            evidence.push(format!("Found Flutter packages: {}", sample.join(", ")));
            score += 10;
        }
    }

    ScoreResult {
        category: Category::Flutter,
        score,
        evidence,
        rationale: "Flutter apps contain flutter_assets/, libflutter.so, and Dart VM snapshots."
            .to_string(),
    }
}

// ─── React Native ───────────────────────────────────────────────────

fn score_react_native(decompiled: &TreeIndex) -> ScoreResult {
    let mut evidence = Vec::new();
    let mut score = 0u32;

    let mut first_bundle = None;
    for candidate in BUNDLE_CANDIDATES {
        if decompiled.exists(candidate) {
            evidence.push(format!("Found JavaScript bundle: {}", candidate));
            score += 35;
            if first_bundle.is_none() {
                first_bundle = Some(decompiled.abs(candidate));
            }
        }
    }

    if let Some(bundle) = first_bundle {
        if let Some(sig) = bundle_signature(&bundle) {
            evidence.push(sig);
            score += 20;
        }
    }

    let rn_files = decompiled.names_containing(&["react", "native"]);
    if !rn_files.is_empty() {
        evidence.push(format!(
            "Found {} React Native library files",
            rn_files.len()
        ));
        score += 15;
    }

    let hermes = decompiled.names_containing(&["hermes"]);
    if !hermes.is_empty() {
        evidence.push(format!("Found {} Hermes-related files", hermes.len()));
        score += 10;
    }

    ScoreResult {
        category: Category::ReactNative,
        score,
        evidence,
        rationale: "React Native apps contain JavaScript bundles and React Native runtime \
                    libraries."
            .to_string(),
    }
}

/// Search the first 10 KiB of a bundle for a runtime signature
fn bundle_signature(bundle: &std::path::Path) -> Option<String> {
    let bytes = std::fs::read(bundle).ok()?;
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(10240)]);
    for re in RN_SIGNATURE_RES.iter() {
        if re.is_match(&head) {
            return Some(format!("Found React Native signature: {}", re.as_str()));
        }
    }
    None
}

// ─── Xamarin ────────────────────────────────────────────────────────

fn score_xamarin(decompiled: &TreeIndex) -> ScoreResult {
    let mut evidence = Vec::new();
    let mut score = 0u32;

    let mono = decompiled.names_containing(&["mono"]);
    if !mono.is_empty() {
        evidence.push(format!("Found {} Mono runtime files", mono.len()));
        score += 30;
    }

    if decompiled.find_dir("assemblies").is_some() {
        evidence.push("Found assemblies/ directory".to_string());
        score += 25;
    }

    let xamarin = decompiled.names_containing(&["xamarin"]);
    if !xamarin.is_empty() {
        evidence.push(format!("Found {} Xamarin-related files", xamarin.len()));
        score += 15;
    }

    ScoreResult {
        category: Category::Xamarin,
        score,
        evidence,
        rationale: "Xamarin apps contain Mono runtime and .NET assemblies.".to_string(),
    }
}

// ─── Cordova ────────────────────────────────────────────────────────

fn score_cordova(decompiled: &TreeIndex) -> ScoreResult {
    let mut evidence = Vec::new();
    let mut score = 0u32;

    if decompiled.exists("assets/www") {
        evidence.push("Found assets/www/ directory".to_string());
        score += 30;

        if decompiled.exists("assets/www/cordova.js") {
            evidence.push("Found cordova.js".to_string());
            score += 25;
        }

        let html = decompiled.count_extension_under("assets/www", ".html");
        if html > 0 {
            evidence.push(format!("Found {} HTML files in www/", html));
            score += 15;
        }
    }

    let plugins = decompiled.names_containing(&["cordova", "plugin"]);
    if !plugins.is_empty() {
        evidence.push(format!("Found {} Cordova plugin files", plugins.len()));
        score += 10;
    }

    ScoreResult {
        category: Category::Cordova,
        score,
        evidence,
        rationale: "Cordova apps contain a www/ directory with HTML/JS content and cordova.js."
            .to_string(),
    }
}

// ─── Unity ──────────────────────────────────────────────────────────

fn score_unity(decompiled: &TreeIndex) -> ScoreResult {
    let mut evidence = Vec::new();
    let mut score = 0u32;

    let libunity = decompiled
        .entries()
        .iter()
        .any(|e| !e.is_dir && e.name == "libunity.so");
    if libunity {
        evidence.push("Found libunity.so".to_string());
        score += 40;
    }

    let bundles = decompiled.count_extension(".unity3d");
    if bundles > 0 {
        evidence.push(format!("Found {} Unity asset bundles", bundles));
        score += 20;
    }

    let unity_files = decompiled.names_containing(&["unity"]);
    if !unity_files.is_empty() {
        evidence.push(format!("Found {} Unity-related files", unity_files.len()));
        score += 15;
    }

    ScoreResult {
        category: Category::Unity,
        score,
        evidence,
        rationale: "Unity apps contain libunity.so and Unity-specific asset files.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn index(dir: &TempDir) -> TreeIndex {
        TreeIndex::build(dir.path())
    }

    fn empty_index() -> TreeIndex {
        TreeIndex::build(std::path::Path::new("/nonexistent/apktriage-scorer"))
    }

    #[test]
    fn test_native_scores_smali_and_manifest() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("smali/com")).unwrap();
        fs::create_dir_all(dir.path().join("smali_classes2")).unwrap();
        fs::write(
            dir.path().join("AndroidManifest.xml"),
            "<activity/><activity/><service/>",
        )
        .unwrap();

        let result = score(Category::NativeAndroid, &index(&dir), &empty_index());
        // smali 30 + manifest 10 + absence bonus 20
        assert_eq!(result.score, 60);
        assert!(result
            .evidence
            .iter()
            .any(|e| e == "Found 2 activities in manifest"));
        assert!(result
            .evidence
            .iter()
            .any(|e| e == "Found 1 services in manifest"));
    }

    #[test]
    fn test_native_absence_bonus_withheld_when_flutter_present() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("smali")).unwrap();
        fs::create_dir_all(dir.path().join("assets/flutter_assets")).unwrap();

        let result = score(Category::NativeAndroid, &index(&dir), &empty_index());
        assert_eq!(result.score, 30);
    }

    #[test]
    fn test_kotlin_reference_search_in_jadx_tree() {
        let app = TempDir::new().unwrap();
        let jadx = TempDir::new().unwrap();
        fs::create_dir_all(jadx.path().join("sources/com/app")).unwrap();
        fs::write(
            jadx.path().join("sources/com/app/Main.java"),
            "import kotlin.jvm.internal.Intrinsics;",
        )
        .unwrap();

        let result = score(
            Category::NativeAndroid,
            &index(&app),
            &TreeIndex::build(jadx.path()),
        );
        assert!(result
            .evidence
            .iter()
            .any(|e| e == "Found Kotlin references in decompiled code"));
        // java 25 + kotlin 15 + absence 20
        assert_eq!(result.score, 60);
    }

    #[test]
    fn test_flutter_full_signal_set() {
        let dir = TempDir::new().unwrap();
        let fa = dir.path().join("assets/flutter_assets");
        fs::create_dir_all(fa.join("packages/url_launcher")).unwrap();
        fs::write(fa.join("AssetManifest.json"), "{}").unwrap();
        fs::write(fa.join("FontManifest.json"), "[]").unwrap();
        fs::create_dir_all(dir.path().join("lib/arm64-v8a")).unwrap();
        fs::write(dir.path().join("lib/arm64-v8a/libflutter.so"), [0u8; 8]).unwrap();
        fs::write(dir.path().join("assets/isolate_vm_snapshot_data"), [0u8; 8]).unwrap();

        let result = score(Category::Flutter, &index(&dir), &empty_index());
        // 40 + 15 + 10 + 30 + 20 + 10
        assert_eq!(result.score, 125);
        assert!(result
            .evidence
            .iter()
            .any(|e| e == "Found libflutter.so in arm64-v8a"));
        assert!(result
            .evidence
            .iter()
            .any(|e| e.starts_with("Found Flutter packages: url_launcher")));
    }

    #[test]
    fn test_react_native_bundle_and_signature() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("assets")).unwrap();
        fs::write(
            dir.path().join("assets/index.android.bundle"),
            "var __DEV__=false; require('react-native');",
        )
        .unwrap();

        let result = score(Category::ReactNative, &index(&dir), &empty_index());
        // bundle 35 + signature 20 (bundle filename itself does not match *react*native*)
        assert_eq!(result.score, 55);
        assert!(result
            .evidence
            .iter()
            .any(|e| e.starts_with("Found React Native signature:")));
    }

    #[test]
    fn test_unity_libunity_also_counts_as_unity_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("libunity.so"), [0u8; 4]).unwrap();

        let result = score(Category::Unity, &index(&dir), &empty_index());
        // 40 named library + 15 *unity* pattern
        assert_eq!(result.score, 55);
    }

    #[test]
    fn test_cordova_www_tree() {
        let dir = TempDir::new().unwrap();
        let www = dir.path().join("assets/www");
        fs::create_dir_all(&www).unwrap();
        fs::write(www.join("cordova.js"), "// cordova").unwrap();
        fs::write(www.join("index.html"), "<html/>").unwrap();

        let result = score(Category::Cordova, &index(&dir), &empty_index());
        // 30 + 25 + 15 (cordova.js does not match *cordova*plugin*)
        assert_eq!(result.score, 70);
    }

    #[test]
    fn test_cordova_js_outside_assets_www_does_not_count() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("assets/www")).unwrap();
        fs::create_dir_all(dir.path().join("res/www")).unwrap();
        fs::write(dir.path().join("res/www/cordova.js"), "// cordova").unwrap();

        let result = score(Category::Cordova, &index(&dir), &empty_index());
        // Only the assets/www directory itself scores
        assert_eq!(result.score, 30);
        assert!(!result.evidence.iter().any(|e| e == "Found cordova.js"));
    }

    #[test]
    fn test_xamarin_signals() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("assemblies")).unwrap();
        fs::write(dir.path().join("lib_monodroid.so"), [0u8; 4]).unwrap();

        let result = score(Category::Xamarin, &index(&dir), &empty_index());
        assert_eq!(result.score, 55);
    }

    #[test]
    fn test_rules_do_not_short_circuit() {
        // Hermes files without any bundle still contribute
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("libhermes.so"), [0u8; 4]).unwrap();

        let result = score(Category::ReactNative, &index(&dir), &empty_index());
        assert_eq!(result.score, 10);
        assert_eq!(result.evidence.len(), 1);
    }
}
