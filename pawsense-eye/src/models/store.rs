//! Model files on disk, with download of the stock detector

use crate::error::VisionError;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Stock YOLOv8n ONNX export
pub const DETECTOR_URL: &str = "https://github.com/ultralytics/assets/releases/download/v8.2.0/yolov8n.onnx";

const MAX_MODEL_SIZE: usize = 500_000_000;
const MIN_MODEL_SIZE: usize = 1024;
const DOWNLOAD_TIMEOUT_SECS: u64 = 600;

/// Ensure the model at `target` exists, downloading it from `url` if not.
/// `checksum` is a hex SHA-256; an empty string skips verification.
pub async fn ensure_model(target: &Path, url: &str, checksum: &str) -> Result<PathBuf, VisionError> {
    if target.exists() {
        info!("Model already present at {:?}", target);
        return Ok(target.to_path_buf());
    }
    if url.is_empty() || url.len() > 2048 {
        return Err(VisionError::Model("Invalid URL".to_string()));
    }
    if !url.starts_with("https://") {
        return Err(VisionError::Model("Only HTTPS URLs are allowed for model downloads".to_string()));
    }

    if let Some(parent) = target.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
            info!("Created model directory: {:?}", parent);
        }
    }

    info!("Downloading model from {}", url);
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
        .build()?;
    let response = client.get(url).send().await?;
    if !response.status().is_success() {
        return Err(VisionError::Model(format!(
            "Failed to download model: HTTP {}",
            response.status()
        )));
    }
    if let Some(len) = response.content_length() {
        if len > MAX_MODEL_SIZE as u64 {
            return Err(VisionError::Model(format!("Model too large: {} bytes", len)));
        }
    }
    let bytes = response.bytes().await?;
    store_model(target, &bytes, checksum)?;
    Ok(target.to_path_buf())
}

/// Verify and atomically write downloaded model bytes
pub fn store_model(target: &Path, bytes: &[u8], checksum: &str) -> Result<(), VisionError> {
    if bytes.len() > MAX_MODEL_SIZE {
        return Err(VisionError::Model(format!(
            "Downloaded model too large: {} bytes (max {} bytes)",
            bytes.len(),
            MAX_MODEL_SIZE
        )));
    }
    if bytes.len() < MIN_MODEL_SIZE {
        return Err(VisionError::Model("Downloaded file too small, likely corrupted".to_string()));
    }

    if !checksum.is_empty() {
        let computed = hex::encode(Sha256::digest(bytes));
        if !computed.eq_ignore_ascii_case(checksum) {
            return Err(VisionError::Model(format!(
                "Checksum mismatch: expected {}, got {}",
                checksum, computed
            )));
        }
        info!("Verified checksum for {:?}", target);
    }

    let temp_path = target.with_extension("tmp");
    fs::write(&temp_path, bytes)?;
    if let Err(e) = fs::rename(&temp_path, target) {
        let _ = fs::remove_file(&temp_path);
        return Err(VisionError::Io(e));
    }
    info!("Model saved to {:?} ({} bytes)", target, bytes.len());
    Ok(())
}
