//! Shell scripts standing in for the transcoder binaries in tests.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use super::ToolPaths;

/// Write an executable `/bin/sh` script called `name` into `dir`.
pub(crate) fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// An ffmpeg running `ffmpeg_body` and an ffprobe that reports a 60s wav.
pub(crate) fn fake_tools(dir: &Path, ffmpeg_body: &str) -> ToolPaths {
    ToolPaths {
        ffmpeg: script(dir, "ffmpeg", ffmpeg_body),
        ffprobe: script(
            dir,
            "ffprobe",
            r#"echo '{"format":{"format_name":"wav","duration":"60.000000"}}'"#,
        ),
    }
}

/// Exits after reporting 15s and then 30s of output.
pub(crate) const REPORTS_HALF: &str = "echo out_time=00:00:15.000000
echo progress=continue
echo out_time=00:00:30.000000
echo progress=end
exit 0";

/// Fails the way a bad input does.
pub(crate) const FAILS: &str = "echo 'in.wav: Invalid data found when processing input' >&2
exit 1";

/// Never finishes on its own.
pub(crate) const HANGS: &str = "exec sleep 30";
