pub mod compression;
pub mod probe;

use std::fmt::Display;
use serde::{Deserialize, Serialize};

use crate::error::{MediaError, MediaResult};

pub use compression::{compression_for_noise, CompressionSettings};
pub use probe::{probe_duration, probe_format, ProbeFormat};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
}

impl Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Image => write!(f, "image"),
            MediaKind::Video => write!(f, "video"),
            MediaKind::Audio => write!(f, "audio"),
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Mp3,
    Wav,
    Aac,
    Flac,
    Ogg,
    M4a,
    Opus,
    Wma,
    Amr,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoFormat {
    Mp4,
    Mov,
    Mkv,
    Webm,
    Avi,
    Flv,
    Wmv,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    Webp,
    Gif,
    Bmp,
    Tiff,
}

impl AudioFormat {
    pub const ALL: [AudioFormat; 9] = [
        AudioFormat::Mp3,
        AudioFormat::Wav,
        AudioFormat::Aac,
        AudioFormat::Flac,
        AudioFormat::Ogg,
        AudioFormat::M4a,
        AudioFormat::Opus,
        AudioFormat::Wma,
        AudioFormat::Amr,
    ];

    pub fn from_alias(alias: &str) -> Option<Self> {
        match alias {
            "mp3" => Some(AudioFormat::Mp3),
            "wav" | "wave" => Some(AudioFormat::Wav),
            "aac" | "adts" => Some(AudioFormat::Aac),
            "flac" => Some(AudioFormat::Flac),
            "ogg" | "oga" | "vorbis" => Some(AudioFormat::Ogg),
            "m4a" | "ipod" => Some(AudioFormat::M4a),
            "opus" => Some(AudioFormat::Opus),
            "wma" | "asf" => Some(AudioFormat::Wma),
            "amr" => Some(AudioFormat::Amr),
            _ => None,
        }
    }

    pub fn muxer(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Wav => "wav",
            AudioFormat::Aac => "adts",
            AudioFormat::Flac => "flac",
            AudioFormat::Ogg => "ogg",
            AudioFormat::M4a => "ipod",
            AudioFormat::Opus => "opus",
            AudioFormat::Wma => "asf",
            AudioFormat::Amr => "amr",
        }
    }

    pub fn codec(&self) -> CodecSpec {
        match self {
            AudioFormat::Mp3 => CodecSpec::audio("libmp3lame", &["-b:a", "192k"]),
            AudioFormat::Wav => CodecSpec::audio("pcm_s16le", &[]),
            AudioFormat::Aac => CodecSpec::audio("aac", &["-b:a", "192k"]),
            AudioFormat::Flac => CodecSpec::audio("flac", &[]),
            AudioFormat::Ogg => CodecSpec::audio("libvorbis", &["-q:a", "5"]),
            AudioFormat::M4a => CodecSpec::audio("aac", &["-b:a", "192k"]),
            AudioFormat::Opus => CodecSpec::audio("libopus", &["-b:a", "128k"]),
            AudioFormat::Wma => CodecSpec::audio("wmav2", &["-b:a", "192k"]),
            AudioFormat::Amr => CodecSpec::audio("libopencore_amrnb", &["-ar", "8000", "-ac", "1", "-b:a", "12.2k"]),
        }
    }
}

impl VideoFormat {
    pub const ALL: [VideoFormat; 7] = [
        VideoFormat::Mp4,
        VideoFormat::Mov,
        VideoFormat::Mkv,
        VideoFormat::Webm,
        VideoFormat::Avi,
        VideoFormat::Flv,
        VideoFormat::Wmv,
    ];

    pub fn from_alias(alias: &str) -> Option<Self> {
        match alias {
            "mp4" | "m4v" => Some(VideoFormat::Mp4),
            "mov" | "qt" => Some(VideoFormat::Mov),
            "mkv" | "matroska" => Some(VideoFormat::Mkv),
            "webm" => Some(VideoFormat::Webm),
            "avi" => Some(VideoFormat::Avi),
            "flv" => Some(VideoFormat::Flv),
            "wmv" | "asf" => Some(VideoFormat::Wmv),
            _ => None,
        }
    }

    pub fn muxer(&self) -> &'static str {
        match self {
            VideoFormat::Mp4 => "mp4",
            VideoFormat::Mov => "mov",
            VideoFormat::Mkv => "matroska",
            VideoFormat::Webm => "webm",
            VideoFormat::Avi => "avi",
            VideoFormat::Flv => "flv",
            VideoFormat::Wmv => "asf",
        }
    }

    pub fn codec(&self) -> CodecSpec {
        match self {
            VideoFormat::Mp4 | VideoFormat::Mov => CodecSpec::av("libx264", "aac", &["-pix_fmt", "yuv420p"]),
            VideoFormat::Mkv => CodecSpec::av("libx264", "aac", &[]),
            VideoFormat::Webm => CodecSpec::av("libvpx-vp9", "libopus", &["-row-mt", "1"]),
            VideoFormat::Avi => CodecSpec::av("mpeg4", "libmp3lame", &["-q:v", "5"]),
            VideoFormat::Flv => CodecSpec::av("libx264", "aac", &["-ar", "44100"]),
            VideoFormat::Wmv => CodecSpec::av("wmv2", "wmav2", &["-b:v", "2M"]),
        }
    }

    /// Fragmented output for the QuickTime family, a deeper mux queue for everything else.
    pub fn container_flags(&self) -> Vec<String> {
        match self {
            VideoFormat::Mp4 | VideoFormat::Mov => vec![
                "-movflags".to_string(),
                "frag_keyframe+empty_moov+default_base_moof".to_string(),
            ],
            _ => vec!["-max_muxing_queue_size".to_string(), "9999".to_string()],
        }
    }
}

impl ImageFormat {
    pub const ALL: [ImageFormat; 6] = [
        ImageFormat::Jpeg,
        ImageFormat::Png,
        ImageFormat::Webp,
        ImageFormat::Gif,
        ImageFormat::Bmp,
        ImageFormat::Tiff,
    ];

    pub fn from_alias(alias: &str) -> Option<Self> {
        match alias {
            "jpeg" | "jpg" | "jpeg_pipe" | "mjpeg" => Some(ImageFormat::Jpeg),
            "png" | "png_pipe" | "apng" => Some(ImageFormat::Png),
            "webp" | "webp_pipe" => Some(ImageFormat::Webp),
            "gif" => Some(ImageFormat::Gif),
            "bmp" | "bmp_pipe" => Some(ImageFormat::Bmp),
            "tiff" | "tif" | "tiff_pipe" => Some(ImageFormat::Tiff),
            _ => None,
        }
    }

    pub fn muxer(&self) -> &'static str {
        match self {
            ImageFormat::Gif => "gif",
            _ => "image2",
        }
    }

    pub fn codec(&self) -> CodecSpec {
        match self {
            ImageFormat::Jpeg => CodecSpec::still("mjpeg", &["-q:v", "2"]),
            ImageFormat::Png => CodecSpec::still("png", &[]),
            ImageFormat::Webp => CodecSpec::still("libwebp", &["-quality", "90"]),
            ImageFormat::Gif => CodecSpec::still("gif", &[]),
            ImageFormat::Bmp => CodecSpec::still("bmp", &[]),
            ImageFormat::Tiff => CodecSpec::still("tiff", &[]),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
            ImageFormat::Webp => "webp",
            ImageFormat::Gif => "gif",
            ImageFormat::Bmp => "bmp",
            ImageFormat::Tiff => "tiff",
        }
    }

    /// Format used when handing an image to the `image` crate encoders.
    pub fn to_image_crate(&self) -> image::ImageFormat {
        match self {
            ImageFormat::Jpeg => image::ImageFormat::Jpeg,
            ImageFormat::Png => image::ImageFormat::Png,
            ImageFormat::Webp => image::ImageFormat::WebP,
            ImageFormat::Gif => image::ImageFormat::Gif,
            ImageFormat::Bmp => image::ImageFormat::Bmp,
            ImageFormat::Tiff => image::ImageFormat::Tiff,
        }
    }

    /// Guess the target format from an output path's extension.
    pub fn from_path(path: &std::path::Path) -> MediaResult<Self> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
            .ok_or_else(|| MediaError::UnsupportedFormat(format!("{} has no extension", path.display())))?;
        ImageFormat::from_alias(&extension).ok_or(MediaError::UnsupportedFormat(extension))
    }
}

/// Default codecs and output flags for a canonical format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecSpec {
    pub video: Option<&'static str>,
    pub audio: Option<&'static str>,
    pub options: &'static [&'static str],
}

impl CodecSpec {
    const fn audio(audio: &'static str, options: &'static [&'static str]) -> Self {
        Self { video: None, audio: Some(audio), options }
    }

    const fn av(video: &'static str, audio: &'static str, options: &'static [&'static str]) -> Self {
        Self { video: Some(video), audio: Some(audio), options }
    }

    const fn still(video: &'static str, options: &'static [&'static str]) -> Self {
        Self { video: Some(video), audio: None, options }
    }

    /// Expand into transcoder output arguments.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(video) = self.video {
            args.push("-c:v".to_string());
            args.push(video.to_string());
        }
        if let Some(audio) = self.audio {
            args.push("-c:a".to_string());
            args.push(audio.to_string());
        }
        args.extend(self.options.iter().map(|option| option.to_string()));
        args
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum MediaFormat {
    Audio(AudioFormat),
    Video(VideoFormat),
    Image(ImageFormat),
}

impl MediaFormat {
    pub fn kind(&self) -> MediaKind {
        match self {
            MediaFormat::Audio(_) => MediaKind::Audio,
            MediaFormat::Video(_) => MediaKind::Video,
            MediaFormat::Image(_) => MediaKind::Image,
        }
    }

    pub fn muxer(&self) -> &'static str {
        match self {
            MediaFormat::Audio(format) => format.muxer(),
            MediaFormat::Video(format) => format.muxer(),
            MediaFormat::Image(format) => format.muxer(),
        }
    }

    pub fn codec(&self) -> CodecSpec {
        match self {
            MediaFormat::Audio(format) => format.codec(),
            MediaFormat::Video(format) => format.codec(),
            MediaFormat::Image(format) => format.codec(),
        }
    }

    /// Parse a single requested format name for the given kind.
    pub fn parse(kind: MediaKind, name: &str) -> MediaResult<Self> {
        let alias = name.trim().to_lowercase();
        let parsed = match kind {
            MediaKind::Audio => AudioFormat::from_alias(&alias).map(MediaFormat::Audio),
            MediaKind::Video => VideoFormat::from_alias(&alias).map(MediaFormat::Video),
            MediaKind::Image => ImageFormat::from_alias(&alias).map(MediaFormat::Image),
        };
        parsed.ok_or_else(|| MediaError::UnsupportedFormat(format!("{} format '{}'", kind, name.trim())))
    }
}

impl Display for MediaFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaFormat::Audio(format) => write!(f, "{:?}", format),
            MediaFormat::Video(format) => write!(f, "{:?}", format),
            MediaFormat::Image(format) => write!(f, "{:?}", format),
        }
    }
}

// probe 返回的别名优先级，每种媒体类型一份
const AUDIO_PRIORITY: &[&str] = &["mp3", "wav", "flac", "ogg", "opus", "m4a", "aac", "asf", "amr"];
const VIDEO_PRIORITY: &[&str] = &["mp4", "mov", "matroska", "webm", "avi", "flv", "asf"];
const IMAGE_PRIORITY: &[&str] = &["png_pipe", "jpeg_pipe", "webp_pipe", "gif", "bmp_pipe", "tiff_pipe"];

fn priority(kind: MediaKind) -> &'static [&'static str] {
    match kind {
        MediaKind::Audio => AUDIO_PRIORITY,
        MediaKind::Video => VIDEO_PRIORITY,
        MediaKind::Image => IMAGE_PRIORITY,
    }
}

/// Pick one canonical format out of a probe's comma separated alias list.
///
/// The kind's priority order wins; otherwise the first listed alias is used,
/// and it must name a format of that kind.
pub fn resolve(kind: MediaKind, raw: &str) -> MediaResult<MediaFormat> {
    let aliases: Vec<String> = raw
        .split(',')
        .map(|alias| alias.trim().to_lowercase())
        .filter(|alias| !alias.is_empty())
        .collect();

    if let Some(preferred) = priority(kind)
        .iter()
        .find(|candidate| aliases.iter().any(|alias| alias == *candidate))
    {
        return MediaFormat::parse(kind, preferred);
    }

    match aliases.first() {
        Some(first) => MediaFormat::parse(kind, first),
        None => Err(MediaError::UnsupportedFormat(format!("empty {} format string", kind))),
    }
}
