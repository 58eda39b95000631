use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};
use rayon::prelude::*;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::engine::FfmpegCommand;
use crate::error::{MediaError, MediaResult};
use crate::format::{probe_duration, ImageFormat, MediaFormat, MediaKind, VideoFormat};
use crate::AppContext;

use super::{ensure_input, prepare, require_range, run_job, JobTarget};

/// Paths for an in-process image operation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageTarget {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactorParams {
    #[serde(flatten)]
    pub target: ImageTarget,
    pub factor: f32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlurParams {
    #[serde(flatten)]
    pub target: ImageTarget,
    pub sigma: f32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharpenParams {
    #[serde(flatten)]
    pub target: ImageTarget,
    pub mode: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressParams {
    #[serde(flatten)]
    pub target: ImageTarget,
    pub quality: u8,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertParams {
    #[serde(flatten)]
    pub target: ImageTarget,
    pub format: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResizeParams {
    #[serde(flatten)]
    pub target: ImageTarget,
    pub width: Option<u32>,
    pub height: Option<u32>,
    #[serde(default = "keep_aspect")]
    pub keep_aspect: bool,
}

fn keep_aspect() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BorderParams {
    #[serde(flatten)]
    pub target: ImageTarget,
    pub size: u32,
    pub color: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoiseParams {
    pub task_id: Option<String>,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub amount: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddAudioParams {
    pub task_id: Option<String>,
    pub input_path: PathBuf,
    pub audio_path: PathBuf,
    pub output_path: PathBuf,
    #[serde(default)]
    pub duration: f64,
}

fn task_id_or_new(task_id: Option<String>) -> String {
    match task_id {
        Some(task_id) if !task_id.trim().is_empty() => task_id,
        _ => {
            let task_id = Uuid::new_v4().to_string();
            info!("No taskId given, using {}", task_id);
            task_id
        }
    }
}

/// Write `img` in `format`, converting the pixel layout to what that encoder accepts.
pub(crate) fn save_image(img: &DynamicImage, path: &Path, format: ImageFormat) -> MediaResult<()> {
    match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(img.to_rgb8()).save_with_format(path, format.to_image_crate())?,
        ImageFormat::Webp | ImageFormat::Gif => {
            DynamicImage::ImageRgba8(img.to_rgba8()).save_with_format(path, format.to_image_crate())?
        }
        _ => img.save_with_format(path, format.to_image_crate())?,
    }
    Ok(())
}

/// Decode the input and hand it to `job` on the blocking pool.
async fn run_blocking<F>(
    target: &ImageTarget,
    operation: &'static str,
    success: &'static str,
    job: F,
) -> MediaResult<String>
where
    F: FnOnce(DynamicImage, &Path) -> MediaResult<()> + Send + 'static,
{
    ensure_input(&target.input_path).await?;
    let input = target.input_path.clone();
    let output = target.output_path.clone();

    tokio::task::spawn_blocking(move || {
        let img = image::open(&input)?;
        job(img, &output)
    })
    .await
    .map_err(|e| MediaError::ExternalProcess(format!("{} worker failed: {}", operation, e)))??;

    info!("{} wrote {}", operation, target.output_path.display());
    Ok(success.to_string())
}

/// Apply `transform` and save in the format named by the output extension.
async fn transform<F>(
    target: &ImageTarget,
    operation: &'static str,
    success: &'static str,
    apply: F,
) -> MediaResult<String>
where
    F: FnOnce(DynamicImage) -> DynamicImage + Send + 'static,
{
    let format = ImageFormat::from_path(&target.output_path)?;
    run_blocking(target, operation, success, move |img, output| {
        save_image(&apply(img), output, format)
    })
    .await
}

pub(crate) fn adjust_brightness(img: DynamicImage, factor: f32) -> DynamicImage {
    let mut rgba = img.to_rgba8();
    rgba.par_chunks_mut(4).for_each(|pixel| {
        for channel in &mut pixel[..3] {
            *channel = (*channel as f32 * factor).round().clamp(0.0, 255.0) as u8;
        }
    });
    DynamicImage::ImageRgba8(rgba)
}

pub(crate) fn adjust_saturation(img: DynamicImage, factor: f32) -> DynamicImage {
    let mut rgba = img.to_rgba8();
    rgba.par_chunks_mut(4).for_each(|pixel| {
        let luma = 0.299 * pixel[0] as f32 + 0.587 * pixel[1] as f32 + 0.114 * pixel[2] as f32;
        for channel in &mut pixel[..3] {
            let value = luma + (*channel as f32 - luma) * factor;
            *channel = value.round().clamp(0.0, 255.0) as u8;
        }
    });
    DynamicImage::ImageRgba8(rgba)
}

/// Unsharp mask (sigma, threshold) per sharpen mode.
pub(crate) fn sharpen_settings(mode: &str) -> MediaResult<(f32, i32)> {
    match mode {
        "light" => Ok((0.5, 2)),
        "medium" => Ok((1.0, 1)),
        "strong" => Ok((2.0, 0)),
        _ => Err(MediaError::invalid_mode("sharpen", mode)),
    }
}

/// Target size for a resize request.
///
/// With `keep_aspect` the image is scaled to fit inside whatever bounds were
/// given; otherwise a missing side keeps its original length.
pub(crate) fn resize_dimensions(
    (width, height): (u32, u32),
    target_width: Option<u32>,
    target_height: Option<u32>,
    keep_aspect: bool,
) -> MediaResult<(u32, u32)> {
    if target_width == Some(0) || target_height == Some(0) {
        return Err(MediaError::InvalidArgument("resize width and height must be positive".to_string()));
    }
    if target_width.is_none() && target_height.is_none() {
        return Err(MediaError::InvalidArgument("resize needs a width or a height".to_string()));
    }

    if !keep_aspect {
        return Ok((target_width.unwrap_or(width), target_height.unwrap_or(height)));
    }

    let scale_w = target_width.map(|w| w as f64 / width as f64);
    let scale_h = target_height.map(|h| h as f64 / height as f64);
    let scale = match (scale_w, scale_h) {
        (Some(w), Some(h)) => w.min(h),
        (Some(w), None) => w,
        (None, Some(h)) => h,
        (None, None) => 1.0,
    };

    let scaled = |side: u32| ((side as f64 * scale).round() as u32).max(1);
    Ok((scaled(width), scaled(height)))
}

pub(crate) fn parse_color(color: &str) -> MediaResult<Rgba<u8>> {
    let invalid = || MediaError::InvalidArgument(format!("color must look like #rrggbb, got {}", color));
    let hex = color.strip_prefix('#').ok_or_else(invalid)?;
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
    Ok(Rgba([channel(0)?, channel(2)?, channel(4)?, 255]))
}

pub(crate) fn add_border(img: DynamicImage, size: u32, color: Rgba<u8>) -> DynamicImage {
    let inner = img.to_rgba8();
    let mut canvas = RgbaImage::from_pixel(inner.width() + size * 2, inner.height() + size * 2, color);
    imageops::overlay(&mut canvas, &inner, size as i64, size as i64);
    DynamicImage::ImageRgba8(canvas)
}

pub async fn brightness(params: FactorParams) -> MediaResult<String> {
    let factor = require_range("factor", params.factor as f64, 0.0, 10.0)? as f32;
    transform(&params.target, "image/brightness", "Image brightness adjusted successfully", move |img| {
        adjust_brightness(img, factor)
    })
    .await
}

pub async fn saturation(params: FactorParams) -> MediaResult<String> {
    let factor = require_range("factor", params.factor as f64, 0.0, 10.0)? as f32;
    transform(&params.target, "image/saturation", "Image saturation adjusted successfully", move |img| {
        adjust_saturation(img, factor)
    })
    .await
}

pub async fn blur(params: BlurParams) -> MediaResult<String> {
    let sigma = require_range("sigma", params.sigma as f64, 0.1, 100.0)? as f32;
    transform(&params.target, "image/blur", "Image blurred successfully", move |img| img.blur(sigma)).await
}

pub async fn sharpen(params: SharpenParams) -> MediaResult<String> {
    let (sigma, threshold) = sharpen_settings(&params.mode)?;
    transform(&params.target, "image/sharpen", "Image sharpened successfully", move |img| {
        img.unsharpen(sigma, threshold)
    })
    .await
}

pub async fn grayscale(target: ImageTarget) -> MediaResult<String> {
    transform(&target, "image/grayscale", "Image converted to grayscale successfully", |img| img.grayscale()).await
}

pub async fn compress(params: CompressParams) -> MediaResult<String> {
    if !(1..=100).contains(&params.quality) {
        return Err(MediaError::InvalidArgument(format!(
            "quality must be between 1 and 100, got {}",
            params.quality
        )));
    }
    let quality = params.quality;
    let format = ImageFormat::from_path(&params.target.output_path)?;

    run_blocking(&params.target, "image/compress", "Image compressed successfully", move |img, output| {
        match format {
            ImageFormat::Jpeg => {
                let mut writer = BufWriter::new(File::create(output)?);
                let encoder = JpegEncoder::new_with_quality(&mut writer, quality);
                DynamicImage::ImageRgb8(img.to_rgb8()).write_with_encoder(encoder)?;
                writer.flush()?;
            }
            ImageFormat::Png => {
                // png 无损, 只能换更高的压缩等级
                let mut writer = BufWriter::new(File::create(output)?);
                let encoder =
                    PngEncoder::new_with_quality(&mut writer, CompressionType::Best, PngFilter::Adaptive);
                img.write_with_encoder(encoder)?;
                writer.flush()?;
            }
            other => save_image(&img, output, other)?,
        }
        Ok(())
    })
    .await
}

pub async fn convert(params: ConvertParams) -> MediaResult<String> {
    let format = match MediaFormat::parse(MediaKind::Image, &params.format)? {
        MediaFormat::Image(format) => format,
        other => return Err(MediaError::UnsupportedFormat(other.to_string())),
    };
    run_blocking(&params.target, "image/convert", "Image converted successfully", move |img, output| {
        save_image(&img, output, format)
    })
    .await
}

pub async fn resize(params: ResizeParams) -> MediaResult<String> {
    if params.width.is_none() && params.height.is_none() {
        return Err(MediaError::InvalidArgument("resize needs a width or a height".to_string()));
    }
    let format = ImageFormat::from_path(&params.target.output_path)?;
    let (width, height, keep) = (params.width, params.height, params.keep_aspect);

    run_blocking(&params.target, "image/resize", "Image resized successfully", move |img, output| {
        let (w, h) = resize_dimensions(img.dimensions(), width, height, keep)?;
        save_image(&img.resize_exact(w, h, FilterType::Lanczos3), output, format)
    })
    .await
}

pub async fn border(params: BorderParams) -> MediaResult<String> {
    let color = parse_color(&params.color)?;
    if params.size == 0 || params.size > 1000 {
        return Err(MediaError::InvalidArgument(format!(
            "border size must be between 1 and 1000, got {}",
            params.size
        )));
    }
    let size = params.size;
    transform(&params.target, "image/border", "Border added successfully", move |img| {
        add_border(img, size, color)
    })
    .await
}

pub async fn noise(ctx: &AppContext, params: NoiseParams) -> MediaResult<String> {
    let amount = require_range("amount", params.amount, 0.0, 100.0)?;
    let format = ImageFormat::from_path(&params.output_path)?;
    let target = JobTarget {
        task_id: task_id_or_new(params.task_id),
        input_path: params.input_path,
        output_path: params.output_path,
        duration: 0.0,
    };
    prepare(&target).await?;

    let command = FfmpegCommand::new(&target.input_path, &target.output_path)
        .video_filter(format!("noise=alls={}:allf=t", amount.round() as u32))
        .codec(format.codec())
        .output_args(["-frames:v", "1", "-update", "1"])
        .muxer(format.muxer());

    run_job(ctx, &target, "image/noise", 0.0, command, "Noise added successfully").await
}

pub async fn add_audio(ctx: &AppContext, params: AddAudioParams) -> MediaResult<String> {
    let target = JobTarget {
        task_id: task_id_or_new(params.task_id),
        input_path: params.input_path,
        output_path: params.output_path,
        duration: params.duration,
    };
    prepare(&target).await?;
    ensure_input(&params.audio_path).await?;

    let expected = if target.duration > 0.0 {
        target.duration
    } else {
        probe_duration(&ctx.tools.ffprobe, &params.audio_path)
            .await
            .ok()
            .flatten()
            .unwrap_or(0.0)
    };

    let container = target
        .output_path
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(|ext| VideoFormat::from_alias(&ext.to_lowercase()))
        .unwrap_or(VideoFormat::Mp4);

    // x264 needs even dimensions
    let command = FfmpegCommand::new(&target.input_path, &target.output_path)
        .input_options(["-loop", "1"])
        .add_input(&params.audio_path)
        .video_filter("scale=trunc(iw/2)*2:trunc(ih/2)*2")
        .output_args([
            "-c:v", "libx264", "-tune", "stillimage", "-pix_fmt", "yuv420p",
            "-c:a", "aac", "-b:a", "192k", "-shortest",
        ])
        .output_args(container.container_flags());

    run_job(ctx, &target, "image/add-audio", expected, command, "Audio added to image successfully").await
}
