use std::path::{Path, PathBuf};

use crate::format::CodecSpec;

/// Argument builder for one transcoder invocation.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    inputs: Vec<(Vec<String>, PathBuf)>,
    audio_filters: Vec<String>,
    video_filters: Vec<String>,
    output_args: Vec<String>,
    output: PathBuf,
}

impl FfmpegCommand {
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            inputs: vec![(Vec::new(), input.as_ref().to_path_buf())],
            audio_filters: Vec::new(),
            video_filters: Vec::new(),
            output_args: Vec::new(),
            output: output.as_ref().to_path_buf(),
        }
    }

    /// Options placed before the most recently added `-i`, e.g. `-ss` or `-loop 1`.
    pub fn input_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Some((input_options, _)) = self.inputs.last_mut() {
            input_options.extend(options.into_iter().map(Into::into));
        }
        self
    }

    pub fn add_input(mut self, input: impl AsRef<Path>) -> Self {
        self.inputs.push((Vec::new(), input.as_ref().to_path_buf()));
        self
    }

    pub fn audio_filter(mut self, filter: impl Into<String>) -> Self {
        self.audio_filters.push(filter.into());
        self
    }

    pub fn video_filter(mut self, filter: impl Into<String>) -> Self {
        self.video_filters.push(filter.into());
        self
    }

    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn codec(self, codec: CodecSpec) -> Self {
        self.output_args(codec.to_args())
    }

    /// Force the output muxer.
    pub fn muxer(self, muxer: &str) -> Self {
        self.output_args(["-f", muxer])
    }

    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec!["-hide_banner".to_string(), "-y".to_string()];

        for (options, input) in &self.inputs {
            args.extend(options.iter().cloned());
            args.push("-i".to_string());
            args.push(input.to_string_lossy().to_string());
        }

        if !self.video_filters.is_empty() {
            args.push("-vf".to_string());
            args.push(self.video_filters.join(","));
        }
        if !self.audio_filters.is_empty() {
            args.push("-af".to_string());
            args.push(self.audio_filters.join(","));
        }

        args.extend(self.output_args.iter().cloned());
        args.push(self.output.to_string_lossy().to_string());
        args
    }
}
