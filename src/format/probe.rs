use std::path::Path;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, error};

use crate::error::{MediaError, MediaResult};
use super::{resolve, MediaFormat, MediaKind};

/// Container level facts reported by `ffprobe -show_format`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeFormat {
    /// Comma separated demuxer aliases, e.g. `mov,mp4,m4a,3gp,3g2,mj2`.
    pub format_name: String,
    pub duration: Option<f64>,
}

impl ProbeFormat {
    pub fn resolve(&self, kind: MediaKind) -> MediaResult<MediaFormat> {
        resolve(kind, &self.format_name)
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    format: ProbeOutputFormat,
}

#[derive(Debug, Deserialize)]
struct ProbeOutputFormat {
    format_name: String,
    duration: Option<String>,
}

pub(crate) fn parse_probe_output(json: &str) -> MediaResult<ProbeFormat> {
    let output: ProbeOutput = serde_json::from_str(json)
        .map_err(|e| MediaError::ExternalProcess(format!("Unreadable ffprobe output: {}", e)))?;

    Ok(ProbeFormat {
        format_name: output.format.format_name,
        duration: output
            .format
            .duration
            .and_then(|d| d.parse::<f64>().ok())
            .filter(|d| d.is_finite() && *d >= 0.0),
    })
}

/// Inspect a file's container with ffprobe.
pub async fn probe_format(ffprobe: &Path, input: &Path) -> MediaResult<ProbeFormat> {
    debug!("Probing {} with {}", input.display(), ffprobe.display());

    let output = Command::new(ffprobe)
        .args(["-v", "error", "-print_format", "json", "-show_format"])
        .arg(input)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| MediaError::ExternalProcess(format!("Failed to execute ffprobe: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        error!("ffprobe failed on {}: {}", input.display(), stderr);
        return Err(MediaError::ExternalProcess(if stderr.is_empty() {
            format!("ffprobe exited with status: {}", output.status)
        } else {
            stderr
        }));
    }

    parse_probe_output(&String::from_utf8_lossy(&output.stdout))
}

/// Container duration in seconds, if the container reports one.
pub async fn probe_duration(ffprobe: &Path, input: &Path) -> MediaResult<Option<f64>> {
    Ok(probe_format(ffprobe, input).await?.duration)
}
