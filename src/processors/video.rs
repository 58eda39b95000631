use serde::Deserialize;
use tracing::{info, warn};

use crate::engine::FfmpegCommand;
use crate::error::{MediaError, MediaResult};
use crate::format::{compression_for_noise, CodecSpec, MediaFormat, MediaKind, VideoFormat};
use crate::AppContext;

use super::audio::{encode_audio, trim_window, FormatParams, TrimParams, VolumeParams};
use super::{expected_duration, prepare, probe_kind, require_range, run_job, JobTarget};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FpsParams {
    #[serde(flatten)]
    pub target: JobTarget,
    pub fps: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressParams {
    #[serde(flatten)]
    pub target: JobTarget,
    pub noise: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EqualizeParams {
    #[serde(flatten)]
    pub target: JobTarget,
    #[serde(default)]
    pub brightness: f64,
    #[serde(default = "one")]
    pub contrast: f64,
    #[serde(default = "one")]
    pub saturation: f64,
    #[serde(default = "one")]
    pub gamma: f64,
}

fn one() -> f64 {
    1.0
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StabilizeParams {
    #[serde(flatten)]
    pub target: JobTarget,
    #[serde(default = "default_shakiness")]
    pub shakiness: u32,
}

fn default_shakiness() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DenoiseParams {
    #[serde(flatten)]
    pub target: JobTarget,
    pub strength: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeedParams {
    #[serde(flatten)]
    pub target: JobTarget,
    pub speed: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CropParams {
    #[serde(flatten)]
    pub target: JobTarget,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub x: u32,
    #[serde(default)]
    pub y: u32,
}

/// Video and audio filters for one of the supported playback speeds.
///
/// atempo only takes 0.5..=2.0 per stage, so the extreme speeds chain two.
pub fn speed_filters(speed: f64) -> Option<(&'static str, &'static str)> {
    const TABLE: [(f64, &str, &str); 9] = [
        (0.25, "setpts=4.0*PTS", "atempo=0.5,atempo=0.5"),
        (0.5, "setpts=2.0*PTS", "atempo=0.5"),
        (0.75, "setpts=1.3333*PTS", "atempo=0.75"),
        (1.0, "setpts=1.0*PTS", "atempo=1.0"),
        (1.25, "setpts=0.8*PTS", "atempo=1.25"),
        (1.5, "setpts=0.6667*PTS", "atempo=1.5"),
        (2.0, "setpts=0.5*PTS", "atempo=2.0"),
        (3.0, "setpts=0.3333*PTS", "atempo=2.0,atempo=1.5"),
        (4.0, "setpts=0.25*PTS", "atempo=2.0,atempo=2.0"),
    ];

    TABLE
        .iter()
        .find(|(listed, _, _)| (listed - speed).abs() < 1e-9)
        .map(|(_, video, audio)| (*video, *audio))
}

/// hqdn3d luma/chroma spatial and temporal strengths for a 0-100 strength.
pub(crate) fn denoise_filter(strength: f64) -> String {
    let luma_spatial = strength / 100.0 * 10.0;
    let chroma_spatial = luma_spatial * 0.75;
    let luma_tmp = luma_spatial * 1.5;
    let chroma_tmp = luma_tmp * 0.75;
    format!(
        "hqdn3d={:.2}:{:.2}:{:.2}:{:.2}",
        luma_spatial, chroma_spatial, luma_tmp, chroma_tmp
    )
}

pub(crate) fn deshake_filter(shakiness: u32) -> String {
    let range = (shakiness * 6).min(64);
    format!("deshake=rx={r}:ry={r}", r = range)
}

async fn source_format(ctx: &AppContext, target: &JobTarget) -> MediaResult<VideoFormat> {
    match probe_kind(ctx, &target.input_path, MediaKind::Video).await? {
        MediaFormat::Video(format) => Ok(format),
        other => Err(MediaError::UnsupportedFormat(other.to_string())),
    }
}

fn video_only(format: VideoFormat) -> CodecSpec {
    CodecSpec { audio: None, ..format.codec() }
}

/// Re-encode video through `filter`, copying the audio track.
async fn filter_video(
    ctx: &AppContext,
    target: &JobTarget,
    operation: &'static str,
    filter: String,
    success: &'static str,
) -> MediaResult<String> {
    prepare(target).await?;
    let format = source_format(ctx, target).await?;
    let expected = expected_duration(ctx, target).await;

    let command = FfmpegCommand::new(&target.input_path, &target.output_path)
        .video_filter(filter)
        .codec(video_only(format))
        .output_args(["-c:a", "copy"])
        .output_args(format.container_flags())
        .muxer(format.muxer());

    run_job(ctx, target, operation, expected, command, success).await
}

pub async fn fps(ctx: &AppContext, params: FpsParams) -> MediaResult<String> {
    let fps = require_range("fps", params.fps, 1.0, 240.0)?;
    filter_video(ctx, &params.target, "video/fps", format!("fps={}", fps), "Frame rate changed successfully").await
}

pub async fn compress(ctx: &AppContext, params: CompressParams) -> MediaResult<String> {
    let settings = compression_for_noise(params.noise);
    let target = &params.target;
    prepare(target).await?;
    let format = source_format(ctx, target).await?;
    let expected = expected_duration(ctx, target).await;
    info!(
        "[{}] Compressing with crf {} at {}k ({})",
        target.task_id, settings.crf, settings.bitrate_kbps, settings.preset
    );

    let codec = format.codec();
    let mut command = FfmpegCommand::new(&target.input_path, &target.output_path).codec(codec);
    command = if codec.video == Some("libx264") {
        command.output_args(settings.to_args())
    } else {
        // CRF and x264 presets don't carry over, cap the bitrate only
        command.output_args(["-b:v".to_string(), format!("{}k", settings.bitrate_kbps)])
    };
    let command = command
        .output_args(format.container_flags())
        .muxer(format.muxer());

    run_job(ctx, target, "video/compress", expected, command, "Video compressed successfully").await
}

pub async fn convert(ctx: &AppContext, params: FormatParams) -> MediaResult<String> {
    let format = match MediaFormat::parse(MediaKind::Video, &params.format)? {
        MediaFormat::Video(format) => format,
        other => return Err(MediaError::UnsupportedFormat(other.to_string())),
    };
    let target = &params.target;
    prepare(target).await?;
    let expected = expected_duration(ctx, target).await;

    let command = FfmpegCommand::new(&target.input_path, &target.output_path)
        .codec(format.codec())
        .output_args(format.container_flags())
        .muxer(format.muxer());

    run_job(ctx, target, "video/convert", expected, command, "Video converted successfully").await
}

pub async fn equalize(ctx: &AppContext, params: EqualizeParams) -> MediaResult<String> {
    let brightness = require_range("brightness", params.brightness, -1.0, 1.0)?;
    let contrast = require_range("contrast", params.contrast, -1000.0, 1000.0)?;
    let saturation = require_range("saturation", params.saturation, 0.0, 3.0)?;
    let gamma = require_range("gamma", params.gamma, 0.1, 10.0)?;
    let filter = format!(
        "eq=brightness={}:contrast={}:saturation={}:gamma={}",
        brightness, contrast, saturation, gamma
    );
    filter_video(ctx, &params.target, "video/equalize", filter, "Video equalized successfully").await
}

pub async fn trim(ctx: &AppContext, params: TrimParams) -> MediaResult<String> {
    let (start, length) = trim_window(&params.start_time, &params.end_time)?;
    let target = &params.target;
    prepare(target).await?;
    let format = source_format(ctx, target).await?;

    // re-encode, stream copy would cut on keyframes only
    let command = FfmpegCommand::new(&target.input_path, &target.output_path)
        .input_options(["-ss".to_string(), format!("{:.3}", start)])
        .output_args(["-t".to_string(), format!("{:.3}", length)])
        .codec(format.codec())
        .output_args(format.container_flags())
        .muxer(format.muxer());

    run_job(ctx, target, "video/trim", length, command, "Video trimmed successfully").await
}

pub async fn volume(ctx: &AppContext, params: VolumeParams) -> MediaResult<String> {
    let volume = require_range("volume", params.volume, 0.0, 10.0)?;
    let target = &params.target;
    prepare(target).await?;
    let format = source_format(ctx, target).await?;
    let expected = expected_duration(ctx, target).await;

    let audio_codec = format.codec().audio.unwrap_or("aac");
    let command = FfmpegCommand::new(&target.input_path, &target.output_path)
        .audio_filter(format!("volume={}", volume))
        .output_args(["-c:v", "copy", "-c:a", audio_codec])
        .output_args(format.container_flags())
        .muxer(format.muxer());

    run_job(ctx, target, "video/volume", expected, command, "Video volume adjusted successfully").await
}

pub async fn stabilize(ctx: &AppContext, params: StabilizeParams) -> MediaResult<String> {
    if !(1..=10).contains(&params.shakiness) {
        return Err(MediaError::InvalidArgument(format!(
            "shakiness must be between 1 and 10, got {}",
            params.shakiness
        )));
    }
    filter_video(
        ctx,
        &params.target,
        "video/stabilize",
        deshake_filter(params.shakiness),
        "Video stabilized successfully",
    )
    .await
}

pub async fn noise(ctx: &AppContext, params: DenoiseParams) -> MediaResult<String> {
    let strength = require_range("strength", params.strength, 0.0, 100.0)?;
    filter_video(ctx, &params.target, "video/noise", denoise_filter(strength), "Video denoised successfully").await
}

pub async fn playback_speed(ctx: &AppContext, params: SpeedParams) -> MediaResult<String> {
    let target = &params.target;
    prepare(target).await?;
    let format = source_format(ctx, target).await?;
    let expected = expected_duration(ctx, target).await;

    let command = FfmpegCommand::new(&target.input_path, &target.output_path);
    let (command, expected) = match speed_filters(params.speed) {
        Some((video, audio)) => (
            command.video_filter(video).audio_filter(audio).codec(format.codec()),
            expected / params.speed,
        ),
        None => {
            warn!("[{}] Speed {} is not supported, copying streams unchanged", target.task_id, params.speed);
            (command.output_args(["-c", "copy"]), expected)
        }
    };
    let command = command.output_args(format.container_flags()).muxer(format.muxer());

    run_job(ctx, target, "video/playback-speed", expected, command, "Playback speed changed successfully").await
}

pub async fn extract_audio(ctx: &AppContext, params: FormatParams) -> MediaResult<String> {
    encode_audio(ctx, &params.target, &params.format, "video/extract-audio", "Audio extracted successfully").await
}

pub async fn remove_audio(ctx: &AppContext, target: JobTarget) -> MediaResult<String> {
    prepare(&target).await?;
    let format = source_format(ctx, &target).await?;
    let expected = expected_duration(ctx, &target).await;

    let command = FfmpegCommand::new(&target.input_path, &target.output_path)
        .output_args(["-an", "-c:v", "copy"])
        .output_args(format.container_flags())
        .muxer(format.muxer());

    run_job(ctx, &target, "video/remove-audio", expected, command, "Audio removed successfully").await
}

pub async fn crop(ctx: &AppContext, params: CropParams) -> MediaResult<String> {
    if params.width == 0 || params.height == 0 {
        return Err(MediaError::InvalidArgument("crop width and height must be positive".to_string()));
    }
    let filter = format!("crop={}:{}:{}:{}", params.width, params.height, params.x, params.y);
    filter_video(ctx, &params.target, "video/crop", filter, "Video cropped successfully").await
}
