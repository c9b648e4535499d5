use std::collections::HashMap;
use std::process::Command;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::core::error::FfxError;

/// What the preview screen shows about a file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MediaInfo {
    pub path: String,
    pub container: Option<String>,
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub bitrate_kbps: Option<f64>,
    pub duration: Option<Duration>,
    pub rotation: i32,
    pub frame_rate: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    duration: Option<String>,
    #[serde(default)]
    tags: HashMap<String, String>,
    #[serde(default)]
    side_data_list: Vec<SideData>,
}

#[derive(Debug, Deserialize)]
struct SideData {
    rotation: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    format_name: Option<String>,
    duration: Option<String>,
    bit_rate: Option<String>,
}

pub fn probe(ffprobe: &str, path: &str) -> Result<MediaInfo, FfxError> {
    debug!(ffprobe, path, "probing media");
    let output = Command::new(ffprobe)
        .args(["-v", "error", "-show_format", "-show_streams", "-of", "json"])
        .arg(path)
        .output()
        .map_err(|e| FfxError::spawn_failed(ffprobe, e))?;

    if !output.status.success() {
        return Err(FfxError::Probe {
            message: format!(
                "{path}: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }

    parse_probe_json(path, &String::from_utf8_lossy(&output.stdout))
}

pub fn parse_probe_json(path: &str, json: &str) -> Result<MediaInfo, FfxError> {
    let parsed: ProbeOutput = serde_json::from_str(json).map_err(|e| FfxError::Probe {
        message: format!("{path}: unreadable ffprobe output: {e}"),
    })?;

    let video = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));
    let audio = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"));
    let format = parsed.format.as_ref();

    let duration = format
        .and_then(|f| f.duration.as_deref())
        .or_else(|| video.and_then(|v| v.duration.as_deref()))
        .and_then(parse_seconds);

    let bitrate_kbps = format
        .and_then(|f| f.bit_rate.as_deref())
        .and_then(|b| b.parse::<f64>().ok())
        .map(|bps| bps / 1000.0);

    Ok(MediaInfo {
        path: path.to_string(),
        container: format.and_then(|f| f.format_name.clone()),
        video_codec: video.and_then(|v| v.codec_name.clone()),
        audio_codec: audio.and_then(|a| a.codec_name.clone()),
        width: video.and_then(|v| v.width),
        height: video.and_then(|v| v.height),
        bitrate_kbps,
        duration,
        rotation: video.map(rotation_of).unwrap_or(0),
        frame_rate: video
            .and_then(|v| v.r_frame_rate.as_deref())
            .and_then(parse_frame_rate),
    })
}

fn rotation_of(stream: &ProbeStream) -> i32 {
    if let Some(rotate) = stream.tags.get("rotate").and_then(|r| r.parse::<i32>().ok()) {
        return rotate;
    }
    stream
        .side_data_list
        .iter()
        .find_map(|sd| sd.rotation)
        .map(|r| r.round() as i32)
        .unwrap_or(0)
}

fn parse_seconds(value: &str) -> Option<Duration> {
    let seconds = value.parse::<f64>().ok()?;
    if !seconds.is_finite() || seconds <= 0.0 {
        return None;
    }
    Some(Duration::from_secs_f64(seconds))
}

/// `30000/1001` style rates; `0/0` means unknown.
fn parse_frame_rate(value: &str) -> Option<f64> {
    let (num, den) = match value.split_once('/') {
        Some((num, den)) => (num.parse::<f64>().ok()?, den.parse::<f64>().ok()?),
        None => (value.parse::<f64>().ok()?, 1.0),
    };
    if den <= 0.0 || num <= 0.0 {
        return None;
    }
    Some(num / den)
}
