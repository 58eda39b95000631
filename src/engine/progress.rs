use crate::utils::parse_timemark;

/// `min(100, elapsed / expected * 100)`.
///
/// `None` when either side is unusable: a non-finite or negative elapsed time,
/// or an expected duration that is not strictly positive.
pub fn progress_percent(elapsed: f64, expected: f64) -> Option<f64> {
    if !elapsed.is_finite() || elapsed < 0.0 || !expected.is_finite() || expected <= 0.0 {
        return None;
    }
    Some((elapsed / expected * 100.0).min(100.0))
}

/// Progress percent carried by one `-progress pipe:1` line, if any.
pub fn progress_from_line(line: &str, expected: f64) -> Option<f64> {
    let (key, value) = line.trim().split_once('=')?;
    if key != "out_time" {
        return None;
    }
    progress_percent(parse_timemark(value)?, expected)
}
