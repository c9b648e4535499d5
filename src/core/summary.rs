use std::time::Duration;

use crate::core::progress::parse_progress_line;

/// Totals from the last statistics line of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeSummary {
    pub final_size_bytes: u64,
    pub duration: Duration,
    pub avg_bitrate_kbps: f32,
}

/// The final statistics line carries `Lsize=` instead of `size=`.
pub fn is_summary_line(line: &str) -> bool {
    line.contains("Lsize=")
}

pub fn parse_summary_line(line: &str) -> Option<EncodeSummary> {
    if !is_summary_line(line) {
        return None;
    }

    let totals = parse_progress_line(line)?;
    Some(EncodeSummary {
        final_size_bytes: totals.size_bytes,
        duration: totals.time,
        avg_bitrate_kbps: totals.bitrate_kbps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_final_line() {
        let line = "frame=  300 fps=118 q=-1.0 Lsize=    1280kB time=00:00:10.00 bitrate=1048.6kbits/s speed=3.94x";
        let summary = parse_summary_line(line).unwrap();
        assert_eq!(summary.final_size_bytes, 1280 * 1024);
        assert_eq!(summary.duration, Duration::from_secs(10));
        assert!((summary.avg_bitrate_kbps - 1048.6).abs() < 0.01);
    }

    #[test]
    fn running_statistics_are_not_summaries() {
        let line = "frame=  120 fps= 60 size=     256kB time=00:00:04.00 bitrate= 524.3kbits/s speed=2x";
        assert!(!is_summary_line(line));
        assert!(parse_summary_line(line).is_none());
    }
}
