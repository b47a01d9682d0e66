use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use anyhow::Result;
use tracing::info;
use tokio::fs;

#[derive(Debug, Deserialize, Serialize, PartialEq)]
pub struct StatusResponse {
    pub status: String,
    pub message: String,
}

impl StatusResponse {
    pub fn new(status: &str, message: &str) -> Self {
        Self { status: status.to_string(), message: message.to_string() }
    }
}

/// Reduces an uploaded filename to a safe single path component.
///
/// Keeps ASCII alphanumerics, `.`, `-` and `_`; whitespace and path
/// separators become `_`; everything else is dropped. Leading dots and
/// underscores are stripped so the result can never be hidden or relative.
pub fn sanitize_filename(raw: &str) -> Option<String> {
    let mut cleaned = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
            cleaned.push(c);
        } else if c.is_whitespace() || c == '/' || c == '\\' {
            cleaned.push('_');
        }
    }

    let cleaned = cleaned.trim_start_matches(['.', '_']).to_string();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

pub async fn save_upload(dest_dir: &Path, filename: &str, bytes: &[u8]) -> Result<PathBuf> {
    let dest_path = dest_dir.join(filename);
    info!("Saving upload to {:?} ({} bytes)", dest_path, bytes.len());

    if !dest_dir.exists() {
        fs::create_dir_all(dest_dir).await
            .map_err(|e| anyhow::anyhow!("Failed to create directory: {}", e))?;
    }

    fs::write(&dest_path, bytes).await
        .map_err(|e| anyhow::anyhow!("Failed to write file: {}", e))?;

    Ok(dest_path)
}
