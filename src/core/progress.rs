use std::time::Duration;

/// One statistics tick reported by ffmpeg while encoding.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FfmpegProgress {
    pub frame: u64,
    pub fps: f32,
    pub time: Duration,
    pub bitrate_kbps: f32,
    pub speed: f32,
    pub size_bytes: u64,
}

/// Parse a stderr statistics line such as
/// `frame=  240 fps= 60 q=28.0 size=  512kB time=00:00:08.00 bitrate= 524.3kbits/s speed=2.01x`.
///
/// ffmpeg pads values after `=`, so `key= value` is folded back together.
pub fn parse_progress_line(line: &str) -> Option<FfmpegProgress> {
    if !line.contains("time=") && !line.contains("frame=") {
        return None;
    }

    let mut progress = FfmpegProgress::default();
    let mut seen = false;
    let mut tokens = line.split_whitespace().peekable();

    while let Some(token) = tokens.next() {
        let Some((key, value)) = token.split_once('=') else {
            continue;
        };
        let value = if value.is_empty() {
            match tokens.next_if(|next| !next.contains('=')) {
                Some(next) => next,
                None => continue,
            }
        } else {
            value
        };

        match key {
            "frame" => {
                if let Ok(parsed) = value.parse::<u64>() {
                    progress.frame = parsed;
                    seen = true;
                }
            }
            "fps" => {
                if let Ok(parsed) = value.parse::<f32>() {
                    progress.fps = parsed;
                }
            }
            "time" => {
                if let Some(parsed) = parse_ffmpeg_time(value) {
                    progress.time = parsed;
                    seen = true;
                }
            }
            "bitrate" => {
                if let Some((num, unit)) = split_number_unit(value) {
                    if let Some(kbps) = num.parse::<f32>().ok().and_then(|n| parse_bitrate_to_kbps(n, unit)) {
                        progress.bitrate_kbps = kbps;
                    }
                }
            }
            "speed" => {
                if let Ok(parsed) = value.trim_end_matches('x').parse::<f32>() {
                    progress.speed = parsed;
                }
            }
            "size" | "Lsize" => {
                if let Some((num, unit)) = split_number_unit(value) {
                    if let Some(bytes) = num.parse::<f32>().ok().and_then(|n| parse_size_to_bytes(n, unit)) {
                        progress.size_bytes = bytes;
                    }
                }
            }
            _ => {}
        }
    }

    if seen {
        Some(progress)
    } else {
        None
    }
}

/// Parse `HH:MM:SS(.frac)`, `MM:SS` or plain seconds. `N/A` and negative
/// timestamps yield `None`.
pub fn parse_ffmpeg_time(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() || value.starts_with('-') || value.eq_ignore_ascii_case("N/A") {
        return None;
    }

    let mut seconds = 0.0f64;
    let parts: Vec<&str> = value.split(':').collect();
    if parts.len() > 3 {
        return None;
    }
    for part in &parts {
        let parsed = part.parse::<f64>().ok()?;
        if !parsed.is_finite() || parsed < 0.0 {
            return None;
        }
        seconds = seconds * 60.0 + parsed;
    }

    Some(Duration::from_secs_f64(seconds))
}

pub fn parse_bitrate_to_kbps(value: f32, unit: &str) -> Option<f32> {
    let unit = unit.trim().to_ascii_lowercase();
    let unit = unit
        .trim_end_matches("/s")
        .trim_end_matches("its")
        .trim_end_matches("ps");
    match unit {
        "b" | "bit" => Some(value / 1000.0),
        "k" | "kb" | "kbit" => Some(value),
        "m" | "mb" | "mbit" => Some(value * 1000.0),
        "g" | "gb" | "gbit" => Some(value * 1_000_000.0),
        _ => None,
    }
}

pub fn parse_size_to_bytes(value: f32, unit: &str) -> Option<u64> {
    let multiplier: f64 = match unit.trim().to_ascii_lowercase().as_str() {
        "b" | "" => 1.0,
        "kb" | "kib" => 1024.0,
        "mb" | "mib" => 1024.0 * 1024.0,
        "gb" | "gib" => 1024.0 * 1024.0 * 1024.0,
        _ => return None,
    };
    if value < 0.0 {
        return None;
    }
    Some((value as f64 * multiplier).round() as u64)
}

/// Percentage of `total` covered by `elapsed`, truncated.
///
/// Only defined when both durations are non-zero; clamps at 100.
pub fn percent_complete(elapsed: Duration, total: Duration) -> Option<u8> {
    if elapsed.is_zero() || total.is_zero() {
        return None;
    }
    let ratio = elapsed.as_secs_f64() * 100.0 / total.as_secs_f64();
    Some(ratio.min(100.0) as u8)
}

pub(crate) fn split_number_unit(value: &str) -> Option<(&str, &str)> {
    let trimmed = value.trim();
    let idx = trimmed
        .char_indices()
        .find(|(_, ch)| !(ch.is_ascii_digit() || *ch == '.'))
        .map(|(pos, _)| pos)
        .unwrap_or(trimmed.len());
    if idx == 0 {
        return None;
    }
    Some((&trimmed[..idx], trimmed[idx..].trim()))
}
