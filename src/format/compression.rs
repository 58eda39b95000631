use serde::Serialize;

const CRF_AT_ZERO: f64 = 25.0;
const CRF_AT_FULL: f64 = 35.0;
const BITRATE_AT_ZERO: f64 = 4000.0;
const BITRATE_AT_FULL: f64 = 1000.0;

// x264 presets from the fastest we allow to the slowest
const PRESETS: [&str; 5] = ["fast", "medium", "slow", "slower", "veryslow"];

/// Encoder settings picked for a video compression "noise" level.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompressionSettings {
    pub crf: u32,
    pub bitrate_kbps: u32,
    pub preset: &'static str,
}

impl CompressionSettings {
    pub fn to_args(&self) -> Vec<String> {
        vec![
            "-crf".to_string(),
            self.crf.to_string(),
            "-maxrate".to_string(),
            format!("{}k", self.bitrate_kbps),
            "-bufsize".to_string(),
            format!("{}k", self.bitrate_kbps * 2),
            "-preset".to_string(),
            self.preset.to_string(),
        ]
    }
}

/// Linear interpolation between the noise 0 and noise 100 endpoints.
///
/// Noise outside `[0, 100]` is clamped, a non-finite value counts as 0.
pub fn compression_for_noise(noise: f64) -> CompressionSettings {
    let noise = if noise.is_finite() { noise.clamp(0.0, 100.0) } else { 0.0 };
    let t = noise / 100.0;

    let crf = CRF_AT_ZERO + (CRF_AT_FULL - CRF_AT_ZERO) * t;
    let bitrate = BITRATE_AT_ZERO + (BITRATE_AT_FULL - BITRATE_AT_ZERO) * t;
    let preset_index = (t * (PRESETS.len() - 1) as f64).round() as usize;

    CompressionSettings {
        crf: crf.round() as u32,
        bitrate_kbps: bitrate.round() as u32,
        preset: PRESETS[preset_index.min(PRESETS.len() - 1)],
    }
}
