//! Result persistence

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::Result;
use crate::result::ResultRecord;

/// Writes `result` as pretty JSON into `output_dir`, creating it if needed.
///
/// The file is named `<backend>[_<label>]_<unix seconds>.json`.
pub fn save_result_as_json(result: &ResultRecord, output_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(output_dir)?;

    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let file_name = match &result.config.label {
        Some(label) => format!("{}_{}_{stamp}.json", result.backend, sanitize(label)),
        None => format!("{}_{stamp}.json", result.backend),
    };

    let path = output_dir.join(file_name);
    fs::write(&path, serde_json::to_string_pretty(result)?)?;
    Ok(path)
}

fn sanitize(label: &str) -> String {
    label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}
