pub mod audio;
pub mod image;
pub mod video;

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::engine::{run_ffmpeg, FfmpegCommand};
use crate::error::{MediaError, MediaResult};
use crate::format::{probe_duration, probe_format, MediaFormat, MediaKind};
use crate::task::TaskEvent;
use crate::AppContext;

/// Every handler name accepted by [`dispatch`].
pub const HANDLERS: &[&str] = &[
    "audio/convert",
    "audio/extract",
    "audio/echo",
    "audio/equalize",
    "audio/fade",
    "audio/normalize",
    "audio/pitch",
    "audio/reverse",
    "audio/trim",
    "audio/silence-remove",
    "audio/optimize",
    "audio/volume",
    "video/fps",
    "video/compress",
    "video/convert",
    "video/equalize",
    "video/trim",
    "video/volume",
    "video/stabilize",
    "video/noise",
    "video/playback-speed",
    "video/extract-audio",
    "video/remove-audio",
    "video/crop",
    "image/brightness",
    "image/blur",
    "image/saturation",
    "image/sharpen",
    "image/grayscale",
    "image/compress",
    "image/convert",
    "image/resize",
    "image/border",
    "image/noise",
    "image/add-audio",
];

fn params<T: DeserializeOwned>(value: Value) -> MediaResult<T> {
    Ok(serde_json::from_value(value)?)
}

/// Route one request to its operation by handler name.
pub async fn dispatch(ctx: &AppContext, handler: &str, body: Value) -> MediaResult<String> {
    match handler {
        "audio/convert" => audio::convert(ctx, params(body)?).await,
        "audio/extract" => audio::extract(ctx, params(body)?).await,
        "audio/echo" => audio::echo(ctx, params(body)?).await,
        "audio/equalize" => audio::equalize(ctx, params(body)?).await,
        "audio/fade" => audio::fade(ctx, params(body)?).await,
        "audio/normalize" => audio::normalize(ctx, params(body)?).await,
        "audio/pitch" => audio::pitch(ctx, params(body)?).await,
        "audio/reverse" => audio::reverse(ctx, params(body)?).await,
        "audio/trim" => audio::trim(ctx, params(body)?).await,
        "audio/silence-remove" => audio::silence_remove(ctx, params(body)?).await,
        "audio/optimize" => audio::optimize(ctx, params(body)?).await,
        "audio/volume" => audio::volume(ctx, params(body)?).await,

        "video/fps" => video::fps(ctx, params(body)?).await,
        "video/compress" => video::compress(ctx, params(body)?).await,
        "video/convert" => video::convert(ctx, params(body)?).await,
        "video/equalize" => video::equalize(ctx, params(body)?).await,
        "video/trim" => video::trim(ctx, params(body)?).await,
        "video/volume" => video::volume(ctx, params(body)?).await,
        "video/stabilize" => video::stabilize(ctx, params(body)?).await,
        "video/noise" => video::noise(ctx, params(body)?).await,
        "video/playback-speed" => video::playback_speed(ctx, params(body)?).await,
        "video/extract-audio" => video::extract_audio(ctx, params(body)?).await,
        "video/remove-audio" => video::remove_audio(ctx, params(body)?).await,
        "video/crop" => video::crop(ctx, params(body)?).await,

        "image/brightness" => image::brightness(params(body)?).await,
        "image/blur" => image::blur(params(body)?).await,
        "image/saturation" => image::saturation(params(body)?).await,
        "image/sharpen" => image::sharpen(params(body)?).await,
        "image/grayscale" => image::grayscale(params(body)?).await,
        "image/compress" => image::compress(params(body)?).await,
        "image/convert" => image::convert(params(body)?).await,
        "image/resize" => image::resize(params(body)?).await,
        "image/border" => image::border(params(body)?).await,
        "image/noise" => image::noise(ctx, params(body)?).await,
        "image/add-audio" => image::add_audio(ctx, params(body)?).await,

        _ => Err(MediaError::UnknownHandler(handler.to_string())),
    }
}

/// Fields shared by every transcoder backed operation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobTarget {
    pub task_id: String,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    /// Expected output duration in seconds, only used for progress.
    #[serde(default)]
    pub duration: f64,
}

impl JobTarget {
    fn validate(&self) -> MediaResult<()> {
        if self.task_id.trim().is_empty() {
            return Err(MediaError::InvalidArgument("taskId must not be empty".to_string()));
        }
        if self.output_path.as_os_str().is_empty() {
            return Err(MediaError::InvalidArgument("outputPath must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Check the target before anything is spawned for it.
pub(crate) async fn prepare(target: &JobTarget) -> MediaResult<()> {
    target.validate()?;
    ensure_input(&target.input_path).await
}

/// Fail with an IO error when `path` is not there.
pub(crate) async fn ensure_input(path: &Path) -> MediaResult<()> {
    tokio::fs::metadata(path).await.map_err(|e| {
        MediaError::Io(std::io::Error::new(e.kind(), format!("{}: {}", path.display(), e)))
    })?;
    Ok(())
}

/// Probe `path` and resolve it to a canonical format of `kind`.
pub(crate) async fn probe_kind(ctx: &AppContext, path: &Path, kind: MediaKind) -> MediaResult<MediaFormat> {
    let probe = probe_format(&ctx.tools.ffprobe, path).await?;
    let format = probe.resolve(kind)?;
    info!("Probed {} as {} ({})", path.display(), format, probe.format_name);
    Ok(format)
}

/// The caller's expected duration, or the probed one when none was given.
pub(crate) async fn expected_duration(ctx: &AppContext, target: &JobTarget) -> f64 {
    if target.duration > 0.0 {
        return target.duration;
    }
    match probe_duration(&ctx.tools.ffprobe, &target.input_path).await {
        Ok(Some(duration)) => duration,
        Ok(None) => 0.0,
        Err(e) => {
            warn!("[{}] Could not probe duration: {}", target.task_id, e);
            0.0
        }
    }
}

/// Run a built command under the target's task id and report the outcome.
pub(crate) async fn run_job(
    ctx: &AppContext,
    target: &JobTarget,
    operation: &'static str,
    expected: f64,
    command: FfmpegCommand,
    success: &'static str,
) -> MediaResult<String> {
    let manager = &ctx.task_manager;
    let result = run_ffmpeg(
        manager,
        &ctx.tools.ffmpeg,
        &target.task_id,
        operation,
        expected,
        &command,
    )
    .await;

    match result {
        Ok(()) => {
            manager
                .notify(TaskEvent::Completed {
                    task_id: target.task_id.clone(),
                    message: success.to_string(),
                })
                .await;
            Ok(success.to_string())
        }
        // cancellation was already announced by the runner
        Err(MediaError::Cancelled(task_id)) => Err(MediaError::Cancelled(task_id)),
        Err(e) => {
            manager
                .notify(TaskEvent::Failed {
                    task_id: target.task_id.clone(),
                    error: e.to_string(),
                })
                .await;
            Err(e)
        }
    }
}

pub(crate) fn require_range(name: &str, value: f64, min: f64, max: f64) -> MediaResult<f64> {
    if value.is_finite() && value >= min && value <= max {
        Ok(value)
    } else {
        Err(MediaError::InvalidArgument(format!(
            "{} must be between {} and {}, got {}",
            name, min, max, value
        )))
    }
}

#[cfg(test)]
mod tests;
