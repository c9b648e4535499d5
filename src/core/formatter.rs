use std::time::Duration;

use crate::core::event::Completion;
use crate::core::metadata::{InputInfo, OutputInfo};
use crate::core::probe::MediaInfo;
use crate::core::progress::FfmpegProgress;
use crate::core::summary::EncodeSummary;

const UNKNOWN: &str = "unknown";

fn or_unknown(value: &str) -> String {
    if value.is_empty() {
        UNKNOWN.to_string()
    } else {
        value.to_string()
    }
}

fn resolution(width: u32, height: u32) -> String {
    if width > 0 && height > 0 {
        format!("{width}x{height}")
    } else {
        UNKNOWN.to_string()
    }
}

pub fn format_input_line(info: &InputInfo) -> String {
    let fps = if info.fps > 0.0 {
        format!("{:.2}fps", info.fps)
    } else {
        "unknown fps".to_string()
    };
    let duration = info
        .duration
        .map(format_duration)
        .unwrap_or_else(|| "--:--:--".to_string());
    let bitrate = info
        .bitrate_kbps
        .map(|kbps| format!("{kbps:.1} kb/s"))
        .unwrap_or_else(|| UNKNOWN.to_string());
    format!(
        "Input  : {} ({}/{} {} @ {fps}, duration={duration}, bitrate={bitrate})",
        info.path.as_deref().unwrap_or(UNKNOWN),
        info.container.as_deref().unwrap_or(UNKNOWN),
        or_unknown(&info.codec),
        resolution(info.width, info.height),
    )
}

pub fn format_output_line(info: &OutputInfo) -> String {
    let path = if info.path.is_empty() {
        "output".to_string()
    } else {
        info.path.clone()
    };
    format!(
        "Output : {path} ({}/{} {})",
        or_unknown(&info.container),
        or_unknown(&info.codec),
        resolution(info.width, info.height)
    )
}

pub fn format_summary_line(summary: &EncodeSummary) -> String {
    let size = format_bytes(summary.final_size_bytes);
    let bitrate = if summary.avg_bitrate_kbps > 0.0 {
        format!("{:.1} kbps", summary.avg_bitrate_kbps)
    } else {
        UNKNOWN.to_string()
    };
    let duration = format_duration(summary.duration);
    format!("Final  : size={size} avg_bitrate={bitrate} duration={duration}")
}

pub fn format_progress_line(
    update: &FfmpegProgress,
    total: Option<Duration>,
    percent: Option<u8>,
) -> Option<String> {
    if update.frame == 0 && update.time.is_zero() {
        return None;
    }

    let elapsed = format_duration(update.time);
    let total = total
        .map(format_duration)
        .unwrap_or_else(|| "--:--:--".to_string());
    let percent = percent
        .map(|p| format!("{p:>3}%"))
        .unwrap_or_else(|| " --%".to_string());

    Some(format!(
        "{percent} time={elapsed}/{total} frame={} speed={}x",
        update.frame, update.speed
    ))
}

pub fn format_completion(completion: &Completion, output: &str) -> String {
    if completion.is_success() {
        return format!("Transcode succeeded: {output}");
    }
    let code = completion
        .exit_code
        .map(|code| code.to_string())
        .unwrap_or_else(|| "none".to_string());
    format!(
        "Transcode {} (exit_code={code})",
        completion.status.label().to_ascii_lowercase()
    )
}

/// Multi-line description of a probed file.
pub fn format_media_info(info: &MediaInfo) -> Vec<String> {
    let dims = match (info.width, info.height) {
        (Some(w), Some(h)) => format!("{w} x {h}"),
        _ => UNKNOWN.to_string(),
    };
    let bitrate = info
        .bitrate_kbps
        .map(|kbps| format!("{kbps:.0} kbps"))
        .unwrap_or_else(|| UNKNOWN.to_string());
    let duration = info
        .duration
        .map(|d| format!("{} ({:.1} s)", format_duration(d), d.as_secs_f64()))
        .unwrap_or_else(|| UNKNOWN.to_string());
    let fps = info
        .frame_rate
        .map(|fps| format!("{fps:.2} fps"))
        .unwrap_or_else(|| UNKNOWN.to_string());

    vec![
        format!("File       : {}", info.path),
        format!("Container  : {}", info.container.as_deref().unwrap_or(UNKNOWN)),
        format!(
            "Codecs     : video={} audio={}",
            info.video_codec.as_deref().unwrap_or("none"),
            info.audio_codec.as_deref().unwrap_or("none")
        ),
        format!("Resolution : {dims}"),
        format!("Bitrate    : {bitrate}"),
        format!("Duration   : {duration}"),
        format!("Rotation   : {}°", info.rotation),
        format!("Frame rate : {fps}"),
    ]
}

pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

pub fn format_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;
    let value = bytes as f64;
    if value >= GB {
        format!("{:.2} GB", value / GB)
    } else if value >= MB {
        format!("{:.2} MB", value / MB)
    } else if value >= KB {
        format!("{:.2} KB", value / KB)
    } else {
        format!("{bytes} B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::job::JobStatus;

    #[test]
    fn durations_and_sizes() {
        assert_eq!(format_duration(Duration::from_secs(3723)), "01:02:03");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.00 MB");
    }

    #[test]
    fn progress_line_with_and_without_percent() {
        let update = FfmpegProgress {
            frame: 90,
            time: Duration::from_secs(3),
            speed: 1.5,
            ..FfmpegProgress::default()
        };
        assert_eq!(
            format_progress_line(&update, Some(Duration::from_secs(12)), Some(25)).unwrap(),
            " 25% time=00:00:03/00:00:12 frame=90 speed=1.5x"
        );
        assert_eq!(
            format_progress_line(&update, None, None).unwrap(),
            " --% time=00:00:03/--:--:-- frame=90 speed=1.5x"
        );
        assert!(format_progress_line(&FfmpegProgress::default(), None, None).is_none());
    }

    #[test]
    fn completion_lines() {
        let ok = Completion {
            status: JobStatus::Finished,
            exit_code: Some(0),
            fail_trace: None,
        };
        assert_eq!(format_completion(&ok, "out.mp4"), "Transcode succeeded: out.mp4");
        let failed = Completion {
            status: JobStatus::Failed,
            exit_code: Some(1),
            fail_trace: Some("boom".to_string()),
        };
        assert_eq!(format_completion(&failed, "out.mp4"), "Transcode failed (exit_code=1)");
    }

    #[test]
    fn media_info_lines() {
        let info = MediaInfo {
            path: "clip.mp4".to_string(),
            width: Some(640),
            height: Some(360),
            duration: Some(Duration::from_secs(75)),
            ..MediaInfo::default()
        };
        let lines = format_media_info(&info);
        assert!(lines.contains(&"Resolution : 640 x 360".to_string()));
        assert!(lines.contains(&"Duration   : 00:01:15 (75.0 s)".to_string()));
        assert!(lines.contains(&"Rotation   : 0°".to_string()));
        assert!(lines.contains(&"Bitrate    : unknown".to_string()));
    }
}
