use std::process::Command;

fn main() {
    // git 版本信息，不在仓库中时退回到 unknown
    let git_hash = Command::new("git")
        .args(["describe", "--tags", "--always", "--dirty"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|hash| hash.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rustc-env=GIT_HASH={}", git_hash);

    // 确保 ffmpeg 可用
    let ffmpeg_check = Command::new("ffmpeg").arg("-version").output();
    if ffmpeg_check.is_err() {
        println!("cargo:warning=ffmpeg not found in PATH, media operations will fail at runtime");
    }

    let ffprobe_check = Command::new("ffprobe").arg("-version").output();
    if ffprobe_check.is_err() {
        println!("cargo:warning=ffprobe not found in PATH, format probing will fail at runtime");
    }
}
