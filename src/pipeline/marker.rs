//! Write-once idempotency markers for processed inputs
//!
//! One marker per input file under `.processed/<name>.done`. Creation uses an
//! exclusive create so two concurrent runs against the same fresh input
//! cannot both claim it: exactly one create succeeds, the loser sees the
//! marker and skips. The marker records the input's content hash and a
//! timestamp so a re-uploaded, changed artifact is visible to operators.

use chrono::Utc;
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::TriageResult;

pub const PROCESSED_DIR_NAME: &str = ".processed";

/// Marker path for an input file, under the analysis root
pub fn marker_path(analysis_dir: &Path, input: &Path) -> PathBuf {
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unknown".to_string());
    analysis_dir
        .join(PROCESSED_DIR_NAME)
        .join(format!("{}.done", name))
}

pub fn is_processed(analysis_dir: &Path, input: &Path) -> bool {
    marker_path(analysis_dir, input).exists()
}

/// Claim an input by creating its marker exclusively.
///
/// Returns `Ok(true)` when this call created the marker, `Ok(false)` when it
/// already existed (another run claimed the input first). Marker content is
/// the input's SHA-256 and the claim time.
pub fn mark_processed(analysis_dir: &Path, input: &Path) -> TriageResult<bool> {
    let path = marker_path(analysis_dir, input);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            tracing::debug!("Marker already present: {}", path.display());
            return Ok(false);
        }
        Err(e) => return Err(e.into()),
    };

    let digest = match fs::read(input) {
        Ok(bytes) => {
            let mut hasher = Sha256::new();
            hasher.update(&bytes);
            hex::encode(hasher.finalize())
        }
        Err(e) => {
            tracing::warn!("Could not hash {}: {}", input.display(), e);
            "unavailable".to_string()
        }
    };

    writeln!(file, "sha256: {}", digest)?;
    writeln!(file, "processed_at: {}", Utc::now().to_rfc3339())?;
    tracing::info!("Marked processed: {}", path.display());
    Ok(true)
}
