//! Technology-stack classification
//!
//! Runs one evidence scorer per category over the decompiled tree, picks the
//! highest score, and derives a confidence level from the winner's score and
//! evidence count. Scorers are independent and side-effect-free, so they run
//! on rayon threads; the tie-break always follows the fixed `Category::ALL`
//! enumeration order regardless of execution order.

pub mod scorer;

use crate::index::TreeIndex;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ─── Categories ─────────────────────────────────────────────────────

/// The closed set of technology stacks the classifier can assign.
///
/// Unknown stacks do not exist at this level: anything that matches nothing
/// falls through to `NativeAndroid` via the absence-of-cross-platform bonus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    NativeAndroid,
    Flutter,
    ReactNative,
    Xamarin,
    Cordova,
    Unity,
}

impl Category {
    /// Fixed enumeration order — scoring ties break toward the earlier entry
    pub const ALL: [Category; 6] = [
        Category::NativeAndroid,
        Category::Flutter,
        Category::ReactNative,
        Category::Xamarin,
        Category::Cordova,
        Category::Unity,
    ];
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NativeAndroid => write!(f, "Native Android"),
            Self::Flutter => write!(f, "Flutter"),
            Self::ReactNative => write!(f, "React Native"),
            Self::Xamarin => write!(f, "Xamarin"),
            Self::Cordova => write!(f, "Cordova"),
            Self::Unity => write!(f, "Unity"),
        }
    }
}

// ─── Results ────────────────────────────────────────────────────────

/// Confidence in the selected category, derived from fixed thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    /// High: score ≥ 60 and ≥ 3 evidence items.
    /// Medium: score ≥ 30 and ≥ 2 evidence items.
    /// The score gate dominates: 59 points with five evidence items is Medium.
    pub fn derive(score: u32, evidence_count: usize) -> Self {
        if score >= 60 && evidence_count >= 3 {
            Confidence::High
        } else if score >= 30 && evidence_count >= 2 {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "Low"),
            Self::Medium => write!(f, "Medium"),
            Self::High => write!(f, "High"),
        }
    }
}

/// Score plus supporting evidence for one category hypothesis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreResult {
    pub category: Category,
    /// Additive, unbounded, ≥ 0
    pub score: u32,
    /// Human-readable matched signals, in evaluation order
    pub evidence: Vec<String>,
    pub rationale: String,
}

/// Outcome of a full classification run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub category: Category,
    pub confidence: Confidence,
    pub evidence: Vec<String>,
    pub rationale: String,
    /// Every category's raw score, kept for audit
    pub all_scores: Vec<ScoreResult>,
}

// ─── Classification ─────────────────────────────────────────────────

/// Classify a decompiled application tree.
///
/// `decompiled_root` is the apktool-style output; `jadx_root` the optional
/// source-decompiler output. Neither is required to exist — the caller decides
/// whether a missing root is an error. Identical tree contents always produce
/// the identical result.
pub fn classify(decompiled_root: &Path, jadx_root: &Path) -> ClassificationResult {
    let decompiled = TreeIndex::build(decompiled_root);
    let jadx = TreeIndex::build(jadx_root);

    // Scorers are independent; rayon order does not affect the outcome
    // because results are re-collected in Category::ALL order.
    let all_scores: Vec<ScoreResult> = Category::ALL
        .par_iter()
        .map(|&cat| scorer::score(cat, &decompiled, &jadx))
        .collect();

    // First category reaching the maximum wins
    let max = all_scores.iter().map(|s| s.score).max().unwrap_or(0);
    let best = all_scores
        .iter()
        .find(|s| s.score == max)
        .expect("Category::ALL is non-empty");

    let confidence = Confidence::derive(best.score, best.evidence.len());

    tracing::info!(
        "Classified as {} (score {}, {} evidence items, confidence {})",
        best.category,
        best.score,
        best.evidence.len(),
        confidence
    );

    ClassificationResult {
        category: best.category,
        confidence,
        evidence: best.evidence.clone(),
        rationale: best.rationale.clone(),
        all_scores,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_empty_tree_falls_back_to_native() {
        let dir = TempDir::new().unwrap();
        let result = classify(dir.path(), &dir.path().join("no_jadx"));
        assert_eq!(result.category, Category::NativeAndroid);
        assert_eq!(result.confidence, Confidence::Low);
        // Absence of cross-platform markers is itself evidence
        assert_eq!(result.evidence.len(), 1);
    }

    #[test]
    fn test_flutter_assets_alone_selects_flutter() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("flutter_assets")).unwrap();
        fs::write(dir.path().join("flutter_assets/AssetManifest.json"), "{}").unwrap();

        let result = classify(dir.path(), &dir.path().join("no_jadx"));
        assert_eq!(result.category, Category::Flutter);
        assert!(result.evidence.len() >= 2, "evidence: {:?}", result.evidence);
    }

    #[test]
    fn test_all_scores_are_reported_in_enum_order() {
        let dir = TempDir::new().unwrap();
        let result = classify(dir.path(), &dir.path().join("no_jadx"));
        assert_eq!(result.all_scores.len(), Category::ALL.len());
        for (s, cat) in result.all_scores.iter().zip(Category::ALL) {
            assert_eq!(s.category, cat);
        }
    }

    #[test]
    fn test_confidence_thresholds_are_exact() {
        assert_eq!(Confidence::derive(60, 3), Confidence::High);
        assert_eq!(Confidence::derive(59, 5), Confidence::Medium);
        assert_eq!(Confidence::derive(60, 2), Confidence::Medium);
        assert_eq!(Confidence::derive(30, 2), Confidence::Medium);
        assert_eq!(Confidence::derive(29, 4), Confidence::Low);
        assert_eq!(Confidence::derive(95, 1), Confidence::Low);
    }

    #[test]
    fn test_tie_breaks_toward_enumeration_order() {
        // A tree with nothing at all scores 20/0/0/0/0/0; degenerate all-zero
        // ties must still pick the first category.
        let dir = TempDir::new().unwrap();
        // Presence of a cross-platform marker removes Native's absence bonus
        // while adding little elsewhere: libunity.so gives Unity 40+15.
        fs::write(dir.path().join("libunity.so"), [0u8; 4]).unwrap();
        let result = classify(dir.path(), &dir.path().join("no_jadx"));
        assert_eq!(result.category, Category::Unity);
    }

    #[test]
    fn test_deterministic_across_runs() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("smali/com/app")).unwrap();
        fs::write(dir.path().join("AndroidManifest.xml"), "<activity/>").unwrap();
        let a = classify(dir.path(), &dir.path().join("no_jadx"));
        let b = classify(dir.path(), &dir.path().join("no_jadx"));
        assert_eq!(a.category, b.category);
        assert_eq!(a.evidence, b.evidence);
        assert_eq!(
            a.all_scores.iter().map(|s| s.score).collect::<Vec<_>>(),
            b.all_scores.iter().map(|s| s.score).collect::<Vec<_>>()
        );
    }
}
