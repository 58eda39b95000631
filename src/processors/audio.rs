use serde::Deserialize;
use tracing::info;

use crate::engine::FfmpegCommand;
use crate::error::{MediaError, MediaResult};
use crate::format::{AudioFormat, MediaFormat, MediaKind};
use crate::utils::TimeValue;
use crate::AppContext;

use super::{expected_duration, prepare, probe_kind, require_range, run_job, JobTarget};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatParams {
    #[serde(flatten)]
    pub target: JobTarget,
    pub format: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModeParams {
    #[serde(flatten)]
    pub target: JobTarget,
    pub mode: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EqualizeParams {
    #[serde(flatten)]
    pub target: JobTarget,
    pub frequency: f64,
    pub width: f64,
    pub gain: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FadeParams {
    #[serde(flatten)]
    pub target: JobTarget,
    #[serde(default)]
    pub fade_in: f64,
    #[serde(default)]
    pub fade_out: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizeParams {
    #[serde(flatten)]
    pub target: JobTarget,
    #[serde(default = "default_loudness")]
    pub target_loudness: f64,
}

fn default_loudness() -> f64 {
    -16.0
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PitchParams {
    #[serde(flatten)]
    pub target: JobTarget,
    pub semitones: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrimParams {
    #[serde(flatten)]
    pub target: JobTarget,
    pub start_time: TimeValue,
    /// Length of the kept segment, not an absolute end point.
    pub end_time: TimeValue,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SilenceRemoveParams {
    #[serde(flatten)]
    pub target: JobTarget,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default = "default_min_silence")]
    pub min_silence: f64,
}

fn default_threshold() -> f64 {
    -50.0
}

fn default_min_silence() -> f64 {
    0.5
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeParams {
    #[serde(flatten)]
    pub target: JobTarget,
    pub volume: f64,
}

// aecho=in_gain:out_gain:delays:decays
pub(crate) fn echo_filter(mode: &str) -> MediaResult<&'static str> {
    match mode {
        "light" => Ok("aecho=0.8:0.9:40:0.3"),
        "medium" => Ok("aecho=0.8:0.88:60|120:0.4|0.3"),
        "heavy" => Ok("aecho=0.8:0.9:500|1000:0.5|0.3"),
        "hall" => Ok("aecho=0.8:0.9:1000:0.3"),
        "canyon" => Ok("aecho=0.8:0.88:1500|2200:0.5|0.35"),
        _ => Err(MediaError::invalid_mode("echo", mode)),
    }
}

pub(crate) fn optimize_filter(mode: &str) -> MediaResult<&'static str> {
    match mode {
        "voice" => Ok("highpass=f=80,lowpass=f=8000,afftdn=nf=-25,\
                       acompressor=threshold=-18dB:ratio=3:attack=20:release=250,\
                       loudnorm=I=-16:TP=-1.5:LRA=11"),
        "music" => Ok("acompressor=threshold=-14dB:ratio=2:attack=10:release=200,\
                       equalizer=f=60:width_type=o:width=2:g=2,\
                       loudnorm=I=-14:TP=-1:LRA=9"),
        "podcast" => Ok("highpass=f=100,afftdn=nf=-20,\
                         acompressor=threshold=-20dB:ratio=4:attack=5:release=100,\
                         loudnorm=I=-16:TP=-1.5:LRA=7"),
        _ => Err(MediaError::invalid_mode("optimize", mode)),
    }
}

/// Shift pitch without changing tempo: resample up by `f`, then slow down by `1/f`.
pub(crate) fn pitch_filter(semitones: f64) -> String {
    let factor = 2f64.powf(semitones / 12.0);
    format!(
        "asetrate=44100*{:.6},aresample=44100,atempo={:.6}",
        factor,
        1.0 / factor
    )
}

pub(crate) fn silence_filter(threshold: f64, min_silence: f64) -> String {
    format!(
        "silenceremove=start_periods=1:start_duration={d}:start_threshold={t}dB:\
         stop_periods=-1:stop_duration={d}:stop_threshold={t}dB",
        d = min_silence,
        t = threshold
    )
}

async fn source_format(ctx: &AppContext, target: &JobTarget) -> MediaResult<AudioFormat> {
    match probe_kind(ctx, &target.input_path, MediaKind::Audio).await? {
        MediaFormat::Audio(format) => Ok(format),
        other => Err(MediaError::UnsupportedFormat(other.to_string())),
    }
}

/// Re-encode with `filters` applied, keeping the input's own container and codec.
async fn apply_filters(
    ctx: &AppContext,
    target: &JobTarget,
    operation: &'static str,
    filters: Vec<String>,
    success: &'static str,
) -> MediaResult<String> {
    prepare(target).await?;
    let expected = expected_duration(ctx, target).await;
    filter_prepared(ctx, target, operation, filters, expected, success).await
}

/// [`apply_filters`] for a target that already passed [`prepare`].
async fn filter_prepared(
    ctx: &AppContext,
    target: &JobTarget,
    operation: &'static str,
    filters: Vec<String>,
    expected: f64,
    success: &'static str,
) -> MediaResult<String> {
    let format = source_format(ctx, target).await?;

    let mut command = FfmpegCommand::new(&target.input_path, &target.output_path);
    for filter in filters {
        command = command.audio_filter(filter);
    }
    let command = command
        .output_args(["-vn"])
        .codec(format.codec())
        .muxer(format.muxer());

    run_job(ctx, target, operation, expected, command, success).await
}

/// Encode the first audio stream of any input into the requested audio format.
pub(crate) async fn encode_audio(
    ctx: &AppContext,
    target: &JobTarget,
    format: &str,
    operation: &'static str,
    success: &'static str,
) -> MediaResult<String> {
    let format = match MediaFormat::parse(MediaKind::Audio, format)? {
        MediaFormat::Audio(format) => format,
        other => return Err(MediaError::UnsupportedFormat(other.to_string())),
    };
    prepare(target).await?;
    let expected = expected_duration(ctx, target).await;

    let command = FfmpegCommand::new(&target.input_path, &target.output_path)
        .output_args(["-vn", "-map", "0:a:0"])
        .codec(format.codec())
        .muxer(format.muxer());

    run_job(ctx, target, operation, expected, command, success).await
}

pub async fn convert(ctx: &AppContext, params: FormatParams) -> MediaResult<String> {
    info!("[{}] Converting audio to {}", params.target.task_id, params.format);
    encode_audio(ctx, &params.target, &params.format, "audio/convert", "Audio converted successfully").await
}

pub async fn extract(ctx: &AppContext, params: FormatParams) -> MediaResult<String> {
    encode_audio(ctx, &params.target, &params.format, "audio/extract", "Audio extracted successfully").await
}

pub async fn echo(ctx: &AppContext, params: ModeParams) -> MediaResult<String> {
    let filter = echo_filter(&params.mode)?;
    apply_filters(ctx, &params.target, "audio/echo", vec![filter.to_string()], "Echo effect applied successfully").await
}

pub async fn equalize(ctx: &AppContext, params: EqualizeParams) -> MediaResult<String> {
    let frequency = require_range("frequency", params.frequency, 20.0, 20000.0)?;
    let width = require_range("width", params.width, 1.0, 20000.0)?;
    let gain = require_range("gain", params.gain, -30.0, 30.0)?;
    let filter = format!("equalizer=f={}:width_type=h:width={}:g={}", frequency, width, gain);
    apply_filters(ctx, &params.target, "audio/equalize", vec![filter], "Audio equalized successfully").await
}

pub async fn fade(ctx: &AppContext, params: FadeParams) -> MediaResult<String> {
    let fade_in = require_range("fadeIn", params.fade_in, 0.0, f64::MAX)?;
    let fade_out = require_range("fadeOut", params.fade_out, 0.0, f64::MAX)?;
    if fade_in == 0.0 && fade_out == 0.0 {
        return Err(MediaError::InvalidArgument("fadeIn or fadeOut must be positive".to_string()));
    }

    prepare(&params.target).await?;
    let duration = expected_duration(ctx, &params.target).await;

    let mut filters = Vec::new();
    if fade_in > 0.0 {
        filters.push(format!("afade=t=in:st=0:d={}", fade_in));
    }
    if fade_out > 0.0 {
        // 淡出起点依赖总时长
        if duration <= 0.0 {
            return Err(MediaError::InvalidArgument(
                "fadeOut needs a known input duration".to_string(),
            ));
        }
        let start = (duration - fade_out).max(0.0);
        filters.push(format!("afade=t=out:st={:.3}:d={}", start, fade_out));
    }

    filter_prepared(
        ctx,
        &params.target,
        "audio/fade",
        filters,
        duration,
        "Fade effect applied successfully",
    )
    .await
}

pub async fn normalize(ctx: &AppContext, params: NormalizeParams) -> MediaResult<String> {
    let loudness = require_range("targetLoudness", params.target_loudness, -70.0, -5.0)?;
    let filter = format!("loudnorm=I={}:TP=-1.5:LRA=11", loudness);
    apply_filters(ctx, &params.target, "audio/normalize", vec![filter], "Audio normalized successfully").await
}

pub async fn pitch(ctx: &AppContext, params: PitchParams) -> MediaResult<String> {
    let semitones = require_range("semitones", params.semitones, -12.0, 12.0)?;
    apply_filters(
        ctx,
        &params.target,
        "audio/pitch",
        vec![pitch_filter(semitones)],
        "Pitch adjusted successfully",
    )
    .await
}

pub async fn reverse(ctx: &AppContext, target: JobTarget) -> MediaResult<String> {
    apply_filters(ctx, &target, "audio/reverse", vec!["areverse".to_string()], "Audio reversed successfully").await
}

pub async fn trim(ctx: &AppContext, params: TrimParams) -> MediaResult<String> {
    let (start, length) = trim_window(&params.start_time, &params.end_time)?;
    let target = &params.target;
    prepare(target).await?;
    let format = source_format(ctx, target).await?;

    let command = FfmpegCommand::new(&target.input_path, &target.output_path)
        .input_options(["-ss".to_string(), format!("{:.3}", start)])
        .output_args(["-t".to_string(), format!("{:.3}", length)])
        .output_args(["-vn"])
        .codec(format.codec())
        .muxer(format.muxer());

    run_job(ctx, target, "audio/trim", length, command, "Audio trimmed successfully").await
}

/// Start offset and kept length in seconds.
pub(crate) fn trim_window(start: &TimeValue, length: &TimeValue) -> MediaResult<(f64, f64)> {
    let start = start
        .seconds()
        .ok_or_else(|| MediaError::InvalidArgument(format!("invalid startTime: {:?}", start)))?;
    let length = length
        .seconds()
        .filter(|length| *length > 0.0)
        .ok_or_else(|| MediaError::InvalidArgument(format!("invalid endTime: {:?}", length)))?;
    Ok((start, length))
}

pub async fn silence_remove(ctx: &AppContext, params: SilenceRemoveParams) -> MediaResult<String> {
    let threshold = require_range("threshold", params.threshold, -100.0, 0.0)?;
    let min_silence = require_range("minSilence", params.min_silence, 0.0, 60.0)?;
    apply_filters(
        ctx,
        &params.target,
        "audio/silence-remove",
        vec![silence_filter(threshold, min_silence)],
        "Silence removed successfully",
    )
    .await
}

pub async fn optimize(ctx: &AppContext, params: ModeParams) -> MediaResult<String> {
    let chain = optimize_filter(&params.mode)?;
    apply_filters(ctx, &params.target, "audio/optimize", vec![chain.to_string()], "Audio optimized successfully").await
}

pub async fn volume(ctx: &AppContext, params: VolumeParams) -> MediaResult<String> {
    let volume = require_range("volume", params.volume, 0.0, 10.0)?;
    apply_filters(
        ctx,
        &params.target,
        "audio/volume",
        vec![format!("volume={}", volume)],
        "Volume adjusted successfully",
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn target() -> JobTarget {
        JobTarget {
            task_id: "audio-test".to_string(),
            input_path: PathBuf::from("/nonexistent/in.wav"),
            output_path: PathBuf::from("/nonexistent/out.wav"),
            duration: 0.0,
        }
    }

    #[test]
    fn test_echo_presets() {
        for mode in ["light", "medium", "heavy", "hall", "canyon"] {
            assert!(echo_filter(mode).unwrap().starts_with("aecho="));
        }
    }

    #[tokio::test]
    async fn test_unknown_echo_mode() {
        let ctx = AppContext::new(Default::default());
        let result = echo(&ctx, ModeParams { target: target(), mode: "cathedral".into() }).await;
        match result {
            Err(MediaError::InvalidMode { kind, mode }) => {
                assert_eq!(kind, "echo");
                assert_eq!(mode, "cathedral");
            }
            other => panic!("expected InvalidMode, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_optimize_mode() {
        let ctx = AppContext::new(Default::default());
        let result = optimize(&ctx, ModeParams { target: target(), mode: "radio".into() }).await;
        assert!(matches!(result, Err(MediaError::InvalidMode { kind: "optimize", .. })));
        assert!(optimize_filter("podcast").unwrap().contains("loudnorm"));
    }

    #[test]
    fn test_pitch_filter_is_coupled() {
        assert_eq!(
            pitch_filter(12.0),
            "asetrate=44100*2.000000,aresample=44100,atempo=0.500000"
        );
        assert_eq!(
            pitch_filter(0.0),
            "asetrate=44100*1.000000,aresample=44100,atempo=1.000000"
        );
    }

    #[test]
    fn test_silence_filter() {
        let filter = silence_filter(-40.0, 0.5);
        assert!(filter.contains("start_threshold=-40dB"));
        assert!(filter.contains("stop_duration=0.5"));
    }

    #[test]
    fn test_trim_window() {
        let (start, length) = trim_window(
            &TimeValue::Timemark("00:00:05".into()),
            &TimeValue::Seconds(10.0),
        )
        .unwrap();
        assert_eq!(start, 5.0);
        assert_eq!(length, 10.0);

        assert!(trim_window(&TimeValue::Seconds(0.0), &TimeValue::Seconds(0.0)).is_err());
        assert!(trim_window(&TimeValue::Timemark("N/A".into()), &TimeValue::Seconds(1.0)).is_err());
    }

    #[tokio::test]
    async fn test_invalid_params_before_io() {
        let ctx = AppContext::new(Default::default());
        let result = equalize(
            &ctx,
            EqualizeParams { target: target(), frequency: 1000.0, width: 200.0, gain: 90.0 },
        )
        .await;
        assert!(matches!(result, Err(MediaError::InvalidArgument(_))));

        let result = fade(&ctx, FadeParams { target: target(), fade_in: 0.0, fade_out: 0.0 }).await;
        assert!(matches!(result, Err(MediaError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_missing_input_is_io_error() {
        let ctx = AppContext::new(Default::default());
        let result = reverse(&ctx, target()).await;
        assert!(matches!(result, Err(MediaError::Io(_))));
        assert!(ctx.task_manager.registry().is_empty());
    }

    #[test]
    fn test_params_defaults() {
        let params: NormalizeParams = serde_json::from_value(serde_json::json!({
            "taskId": "n",
            "inputPath": "a.wav",
            "outputPath": "b.wav"
        }))
        .unwrap();
        assert_eq!(params.target_loudness, -16.0);

        let params: TrimParams = serde_json::from_value(serde_json::json!({
            "taskId": "t",
            "inputPath": "a.wav",
            "outputPath": "b.wav",
            "startTime": "00:00:05",
            "endTime": 10
        }))
        .unwrap();
        assert_eq!(params.end_time.seconds(), Some(10.0));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_fade_probes_input_once_per_fact() {
        use crate::engine::testing::script;
        use crate::engine::ToolPaths;
        use tempfile::TempDir;

        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in.wav");
        std::fs::write(&input, b"RIFF").unwrap();
        let probes = dir.path().join("probes.log");
        let args = dir.path().join("args.log");
        let tools = ToolPaths {
            ffprobe: script(
                dir.path(),
                "ffprobe",
                &format!(
                    "echo probe >> '{}'\necho '{{\"format\":{{\"format_name\":\"wav\",\"duration\":\"60.0\"}}}}'",
                    probes.display()
                ),
            ),
            ffmpeg: script(dir.path(), "ffmpeg", &format!("echo \"$@\" > '{}'", args.display())),
        };
        let ctx = AppContext::new(tools);

        let params = FadeParams {
            target: JobTarget {
                task_id: "fade".to_string(),
                input_path: input,
                output_path: dir.path().join("out.wav"),
                duration: 0.0,
            },
            fade_in: 0.0,
            fade_out: 5.0,
        };
        assert_eq!(fade(&ctx, params).await.unwrap(), "Fade effect applied successfully");

        // one probe for the duration, one for the container format
        let probe_count = std::fs::read_to_string(&probes).unwrap().lines().count();
        assert_eq!(probe_count, 2);
        let ffmpeg_args = std::fs::read_to_string(&args).unwrap();
        assert!(ffmpeg_args.contains("afade=t=out:st=55.000:d=5"), "{}", ffmpeg_args);
    }
}
