/// Incremental parser for ffmpeg's `-progress` output
///
/// Lines are `key=value` pairs. `duration` carries the total length in
/// seconds and `out_time_ms` the elapsed time in microseconds. The stderr
/// banner (`Duration: 00:02:00.00, start: ...`) is accepted as well, since
/// ffmpeg itself never prints a `duration` key. Anything else is ignored.
#[derive(Debug, Default)]
pub struct ProgressParser {
    total_seconds: Option<f64>,
}

impl ProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_seconds(&self) -> Option<f64> {
        self.total_seconds
    }

    /// Feed one line; returns a percentage when the line advanced progress
    pub fn feed(&mut self, line: &str) -> Option<f64> {
        let line = line.trim();

        if let Some(rest) = line.strip_prefix("Duration:") {
            if let Some(total) = rest.split(',').next().and_then(parse_timestamp) {
                self.set_total(total);
            }
            return None;
        }

        let (key, value) = line.split_once('=')?;
        match key.trim() {
            "duration" => {
                if let Ok(total) = value.trim().parse::<f64>() {
                    self.set_total(total);
                }
                None
            }
            "out_time_ms" => {
                let total = self.total_seconds?;
                let elapsed = value.trim().parse::<f64>().ok()? / 1_000_000.0;
                Some((elapsed / total * 100.0).clamp(0.0, 100.0))
            }
            _ => None,
        }
    }

    fn set_total(&mut self, total: f64) {
        if total.is_finite() && total > 0.0 {
            self.total_seconds = Some(total);
        }
    }
}

/// Parse `HH:MM:SS.xx` into seconds
fn parse_timestamp(value: &str) -> Option<f64> {
    let mut parts = value.trim().split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// Render a percentage the way it is shown to the user
pub fn format_percent(percent: f64) -> String {
    format!("{:.2}%", percent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_half_way() {
        let mut parser = ProgressParser::new();
        assert_eq!(parser.feed("duration=120.0"), None);
        let percent = parser.feed("out_time_ms=60000000").unwrap();
        assert_eq!(format_percent(percent), "50.00%");
    }

    #[test]
    fn test_malformed_lines_are_ignored() {
        let mut parser = ProgressParser::new();
        assert_eq!(parser.feed("no separator here"), None);
        assert_eq!(parser.feed(""), None);
        assert_eq!(parser.feed("bitrate=128.0kbits/s"), None);
        assert_eq!(parser.feed("duration=abc"), None);
        assert_eq!(parser.total_seconds(), None);
    }

    #[test]
    fn test_no_duration_reports_nothing() {
        let mut parser = ProgressParser::new();
        assert_eq!(parser.feed("out_time_ms=60000000"), None);
        assert_eq!(parser.feed("progress=continue"), None);
    }

    #[test]
    fn test_stderr_banner_duration() {
        let mut parser = ProgressParser::new();
        parser.feed("  Duration: 00:02:00.00, start: 0.025057, bitrate: 128 kb/s");
        assert_eq!(parser.total_seconds(), Some(120.0));
        assert_eq!(parser.feed("out_time_ms=30000000"), Some(25.0));
    }

    #[test]
    fn test_progress_is_clamped() {
        let mut parser = ProgressParser::new();
        parser.feed("duration=10");
        assert_eq!(parser.feed("out_time_ms=12000000"), Some(100.0));
        assert_eq!(parser.feed("out_time_ms=-5"), Some(0.0));
    }

    #[test]
    fn test_zero_duration_is_ignored() {
        let mut parser = ProgressParser::new();
        parser.feed("duration=0");
        assert_eq!(parser.feed("out_time_ms=1000000"), None);
    }
}
