use serde::{Deserialize, Serialize};

/// Parse a transcoder timemark (`HH:MM:SS.ff`, `MM:SS` or plain seconds) into seconds.
///
/// A leading `-` is kept, the transcoder reports slightly negative times at
/// stream start. Returns `None` for anything unparseable such as `N/A`.
pub fn parse_timemark(text: &str) -> Option<f64> {
    let text = text.trim();
    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };

    let parts: Vec<&str> = body.split(':').collect();
    if parts.len() > 3 || parts.iter().any(|part| part.is_empty()) {
        return None;
    }

    let mut seconds = 0.0;
    for part in &parts {
        let value = part.parse::<f64>().ok()?;
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        seconds = seconds * 60.0 + value;
    }

    Some(if negative { -seconds } else { seconds })
}

/// A point in time given either as seconds or as a timemark string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeValue {
    Seconds(f64),
    Timemark(String),
}

impl TimeValue {
    pub fn seconds(&self) -> Option<f64> {
        match self {
            TimeValue::Seconds(seconds) if seconds.is_finite() && *seconds >= 0.0 => Some(*seconds),
            TimeValue::Seconds(_) => None,
            TimeValue::Timemark(text) => parse_timemark(text).filter(|s| *s >= 0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timemark() {
        assert_eq!(parse_timemark("00:00:30.00"), Some(30.0));
        assert_eq!(parse_timemark("01:02:03.5"), Some(3723.5));
        assert_eq!(parse_timemark("02:30"), Some(150.0));
        assert_eq!(parse_timemark("12.25"), Some(12.25));
        assert_eq!(parse_timemark("-00:00:00.5"), Some(-0.5));
    }

    #[test]
    fn test_parse_timemark_malformed() {
        assert_eq!(parse_timemark("N/A"), None);
        assert_eq!(parse_timemark(""), None);
        assert_eq!(parse_timemark("00::10"), None);
        assert_eq!(parse_timemark("1:2:3:4"), None);
        assert_eq!(parse_timemark("nan"), None);
    }

    #[test]
    fn test_time_value() {
        let start: TimeValue = serde_json::from_str("\"00:00:05\"").unwrap();
        let end: TimeValue = serde_json::from_str("10").unwrap();
        assert_eq!(start.seconds(), Some(5.0));
        assert_eq!(end.seconds(), Some(10.0));
        assert_eq!(TimeValue::Seconds(-1.0).seconds(), None);
        assert_eq!(TimeValue::Timemark("soon".into()).seconds(), None);
    }
}
