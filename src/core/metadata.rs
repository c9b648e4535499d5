use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::core::progress::parse_ffmpeg_time;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct InputInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f32,
    pub codec: String,
    pub duration: Option<Duration>,
    pub container: Option<String>,
    pub path: Option<String>,
    pub bitrate_kbps: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct OutputInfo {
    pub container: String,
    pub codec: String,
    pub width: u32,
    pub height: u32,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamHeader {
    Input(InputInfo),
    Output(OutputInfo),
}

static RE_INPUT_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Input #\d+,\s*(.+),\s*from '([^']+)'").unwrap());
static RE_OUTPUT_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Output #\d+,\s*([^,]+),\s*to '([^']+)'").unwrap());
static RE_DURATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Duration:\s*([0-9:\.]+)").unwrap());
static RE_BITRATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"bitrate:\s*([0-9]*\.?[0-9]+)\s*kb/s").unwrap());
static RE_STREAM_VIDEO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Stream #\d+:\d+.*Video:\s*([^,(]+)").unwrap());
static RE_RESOLUTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{2,5})x(\d{2,5})\b").unwrap());
static RE_FPS: Lazy<Regex> = Lazy::new(|| Regex::new(r"([0-9]*\.?[0-9]+)\s*fps").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Section {
    #[default]
    Other,
    Input,
    Output,
}

/// Collects the `Input #n` / `Output #n` banners ffmpeg prints before
/// encoding starts. Each section is reported once, on its first video stream.
#[derive(Debug, Default)]
pub struct MetadataParser {
    section: Section,
    input: Option<InputInfo>,
    output: Option<OutputInfo>,
}

impl MetadataParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse_line(&mut self, line: &str) -> Option<StreamHeader> {
        let trimmed = line.trim();

        if let Some(cap) = RE_INPUT_HEADER.captures(trimmed) {
            self.section = Section::Input;
            self.input = Some(InputInfo {
                container: cap.get(1).map(|m| m.as_str().trim().to_string()),
                path: cap.get(2).map(|m| m.as_str().to_string()),
                ..InputInfo::default()
            });
            return None;
        }

        if let Some(cap) = RE_OUTPUT_HEADER.captures(trimmed) {
            self.section = Section::Output;
            self.output = Some(OutputInfo {
                container: cap[1].trim().to_string(),
                path: cap[2].to_string(),
                ..OutputInfo::default()
            });
            // Audio-only inputs never hit a video stream line.
            return self.input.take().map(StreamHeader::Input);
        }

        match self.section {
            Section::Input => self.parse_input_detail(trimmed),
            Section::Output => self.parse_output_detail(trimmed),
            Section::Other => None,
        }
    }

    fn parse_input_detail(&mut self, line: &str) -> Option<StreamHeader> {
        let pending = self.input.as_mut()?;

        if let Some(cap) = RE_DURATION.captures(line) {
            pending.duration = parse_ffmpeg_time(&cap[1]);
            pending.bitrate_kbps = RE_BITRATE
                .captures(line)
                .and_then(|cap| cap[1].parse::<f32>().ok());
            return None;
        }

        let codec = RE_STREAM_VIDEO.captures(line)?[1].trim().to_string();
        let (width, height) = parse_resolution(line);
        pending.codec = codec;
        pending.width = width;
        pending.height = height;
        pending.fps = RE_FPS
            .captures(line)
            .and_then(|cap| cap[1].parse::<f32>().ok())
            .unwrap_or(0.0);

        self.input.take().map(StreamHeader::Input)
    }

    fn parse_output_detail(&mut self, line: &str) -> Option<StreamHeader> {
        let pending = self.output.as_mut()?;
        let codec = RE_STREAM_VIDEO.captures(line)?[1].trim().to_string();
        let (width, height) = parse_resolution(line);
        pending.codec = codec;
        pending.width = width;
        pending.height = height;

        self.section = Section::Other;
        self.output.take().map(StreamHeader::Output)
    }
}

fn parse_resolution(line: &str) -> (u32, u32) {
    RE_RESOLUTION
        .captures(line)
        .and_then(|cap| {
            let w = cap[1].parse::<u32>().ok()?;
            let h = cap[2].parse::<u32>().ok()?;
            Some((w, h))
        })
        .unwrap_or((0, 0))
}
