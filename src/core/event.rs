use crate::core::job::JobStatus;
use crate::core::metadata::{InputInfo, OutputInfo};
use crate::core::progress::FfmpegProgress;
use crate::core::summary::EncodeSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Progress,
    Input,
    Output,
    Summary,
    Warning,
    Error,
    Noise,
}

/// How a run ended. `fail_trace` holds the tail of stderr for failed runs.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub status: JobStatus,
    pub exit_code: Option<i32>,
    pub fail_trace: Option<String>,
}

impl Completion {
    /// The supervisor went away without reporting an exit status.
    pub fn lost() -> Self {
        Self {
            status: JobStatus::Failed,
            exit_code: None,
            fail_trace: Some("engine supervisor exited without a result".to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Finished
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FfmpegEvent {
    Log(String),
    Statistics(FfmpegProgress),
    Input(InputInfo),
    Output(OutputInfo),
    Summary(EncodeSummary),
    Completed(Completion),
}

pub fn classify_log_line(line: &str) -> LogLevel {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return LogLevel::Noise;
    }

    if trimmed.starts_with("Input #") {
        return LogLevel::Input;
    }
    if trimmed.starts_with("Output #") {
        return LogLevel::Output;
    }
    if trimmed.contains("Lsize=") {
        return LogLevel::Summary;
    }
    if trimmed.contains("time=") && (trimmed.contains("frame=") || trimmed.contains("size=")) {
        return LogLevel::Progress;
    }

    let lower = trimmed.to_ascii_lowercase();
    let noise_prefixes = [
        "ffmpeg version",
        "built with",
        "configuration:",
        "libavutil",
        "libavcodec",
        "libavformat",
        "libavdevice",
        "libavfilter",
        "libswscale",
        "libswresample",
        "libpostproc",
        "using cpu capabilities",
    ];

    if noise_prefixes.iter().any(|prefix| lower.starts_with(prefix)) {
        return LogLevel::Noise;
    }

    if lower.contains("[info]") || lower.contains("x264 [info]") {
        return LogLevel::Noise;
    }

    if lower.contains("error")
        || lower.contains("invalid")
        || lower.contains("no such file")
        || lower.contains("unknown encoder")
        || lower.contains("not found")
    {
        return LogLevel::Error;
    }

    if lower.contains("warning") || lower.contains("deprecated") {
        return LogLevel::Warning;
    }

    LogLevel::Noise
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_banner_sections() {
        assert_eq!(classify_log_line("Input #0, mov,mp4, from 'a.mp4':"), LogLevel::Input);
        assert_eq!(classify_log_line("Output #0, mp4, to 'b.mp4':"), LogLevel::Output);
        assert_eq!(classify_log_line("ffmpeg version 6.1 Copyright"), LogLevel::Noise);
        assert_eq!(classify_log_line("   "), LogLevel::Noise);
    }

    #[test]
    fn classifies_statistics() {
        assert_eq!(
            classify_log_line("frame=  10 fps=0.0 q=0.0 size=0kB time=00:00:00.33 bitrate=0.0kbits/s speed=0.6x"),
            LogLevel::Progress
        );
        assert_eq!(
            classify_log_line("frame= 300 fps=118 Lsize=1280kB time=00:00:10.00 bitrate=1048.6kbits/s"),
            LogLevel::Summary
        );
    }

    #[test]
    fn classifies_failures_and_warnings() {
        assert_eq!(
            classify_log_line("Unknown encoder 'h265_nope'"),
            LogLevel::Error
        );
        assert_eq!(
            classify_log_line("missing.mp4: No such file or directory"),
            LogLevel::Error
        );
        assert_eq!(
            classify_log_line("[swscaler @ 0x55] deprecated pixel format used"),
            LogLevel::Warning
        );
    }

    #[test]
    fn completion_success_tracks_status() {
        let done = Completion {
            status: JobStatus::Finished,
            exit_code: Some(0),
            fail_trace: None,
        };
        assert!(done.is_success());
        let cancelled = Completion {
            status: JobStatus::Cancelled,
            ..done
        };
        assert!(!cancelled.is_success());
    }
}
