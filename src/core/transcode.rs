use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::command::{CommandSpec, Open, Sealed};
use crate::core::error::FfxError;
use crate::core::event::{Completion, FfmpegEvent};
use crate::core::job::Job;
use crate::core::probe;
use crate::core::progress::{percent_complete, FfmpegProgress};
use crate::core::runner::{self, TranscodeHandle};

/// Encoding parameters for one job. Defaults produce a small 360p H.264/AAC
/// file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeSettings {
    pub video_codec: String,
    pub audio_codec: String,
    pub video_bitrate: String,
    pub audio_bitrate: String,
    pub width: i32,
    pub height: i32,
    pub frame_rate: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,
}

impl Default for TranscodeSettings {
    fn default() -> Self {
        Self {
            video_codec: "h264".to_string(),
            audio_codec: "aac".to_string(),
            video_bitrate: "1M".to_string(),
            audio_bitrate: "128k".to_string(),
            width: 640,
            height: 360,
            frame_rate: 30,
            duration: None,
            preset: None,
        }
    }
}

impl TranscodeSettings {
    /// Everything except the output path, in canonical order.
    pub fn to_open_spec(&self, input: &str, extra_args: &[String]) -> CommandSpec<Open> {
        let mut spec = CommandSpec::create()
            .input(input)
            .video_codec(&self.video_codec)
            .audio_codec(&self.audio_codec)
            .video_bitrate(&self.video_bitrate)
            .audio_bitrate(&self.audio_bitrate)
            .resolution(self.width, self.height)
            .frame_rate(self.frame_rate);

        if let Some(preset) = &self.preset {
            spec = spec.preset(preset);
        }
        if let Some(duration) = &self.duration {
            spec = spec.duration(duration);
        }

        spec.args(extra_args.iter().cloned())
    }

    pub fn to_spec(&self, input: &str, output: &str, extra_args: &[String]) -> CommandSpec<Sealed> {
        self.to_open_spec(input, extra_args).output(output)
    }
}

pub(crate) fn timestamp_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

/// Reserve `<dir>/output_<millis>.<ext>`, creating `dir` if needed.
pub fn allocate_output(dir: &Path, extension: &str) -> Result<PathBuf, FfxError> {
    fs::create_dir_all(dir)?;
    Ok(dir.join(format!("output_{}.{extension}", timestamp_millis())))
}

/// A started transcode: the engine handle plus what is needed to turn
/// statistics into a percentage and to clean up afterwards.
#[derive(Debug)]
pub struct RunningTranscode {
    pub handle: TranscodeHandle,
    pub total: Option<Duration>,
    pub output: PathBuf,
    pub job: Job,
    /// Set for paths from [`allocate_output`]; only those are removed when
    /// the run does not succeed.
    pub owns_output: bool,
}

/// `-` and `scheme:...` inputs are streams or URLs, not files on disk.
/// Single-letter schemes are left alone so `C:\clip.mp4` stays a path.
fn is_local_input(input: &str) -> bool {
    if input == "-" {
        return false;
    }
    match input.split_once(':') {
        Some((scheme, _)) => {
            scheme.len() < 2
                || !scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => true,
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Validate `spec`, probe the source duration and start the engine.
///
/// A failed probe only costs the percentage display; the run still starts.
pub fn start(
    ffmpeg: &str,
    ffprobe: &str,
    spec: &CommandSpec<Sealed>,
) -> Result<RunningTranscode, FfxError> {
    spec.validate()?;

    let input = spec.input_path().unwrap_or_default();
    let total = if is_local_input(input) {
        if !Path::new(input).exists() {
            return Err(FfxError::InvalidCommand {
                message: format!("input not found: {input}"),
            });
        }
        if same_file(Path::new(input), Path::new(spec.output_path())) {
            return Err(FfxError::InvalidCommand {
                message: format!("output would overwrite the input: {input}"),
            });
        }
        match probe::probe(ffprobe, input) {
            Ok(info) => info.duration,
            Err(err) => {
                warn!(%err, "could not read source duration, progress will be indeterminate");
                None
            }
        }
    } else {
        debug!(input, "streamed input, skipping probe");
        None
    };

    info!(command = %spec.render_shell(), "starting transcode");
    let mut job = Job::new();
    let handle = runner::spawn(ffmpeg, spec.to_args())?;
    job.start();

    Ok(RunningTranscode {
        handle,
        total,
        output: PathBuf::from(spec.output_path()),
        job,
        owns_output: false,
    })
}

impl RunningTranscode {
    /// Mark the output as ours to delete if the run fails.
    pub fn owning_output(mut self) -> Self {
        self.owns_output = true;
        self
    }

    pub fn percent(&self, progress: &FfmpegProgress) -> Option<u8> {
        percent_complete(progress.time, self.total?)
    }

    /// Prefer the probed duration, fall back to the one ffmpeg prints for
    /// its input.
    pub fn observe(&mut self, event: &FfmpegEvent) {
        if let FfmpegEvent::Input(info) = event {
            if self.total.is_none() {
                self.total = info.duration;
            }
        }
    }

    /// Record the outcome. An owned output of an unsuccessful run is deleted;
    /// a path the caller chose is left alone.
    pub fn finish(&mut self, completion: &Completion) {
        self.job.finish(completion.status);
        if completion.is_success() {
            info!(job = self.job.id, output = %self.output.display(), "transcode finished");
            return;
        }

        if self.owns_output && self.output.exists() {
            if let Err(err) = fs::remove_file(&self.output) {
                warn!(%err, output = %self.output.display(), "failed to remove partial output");
            }
        }
    }

    /// Block until the engine exits, handing every event to `on_event`.
    pub fn wait_with<F>(mut self, mut on_event: F) -> (Job, Completion)
    where
        F: FnMut(&RunningTranscode, &FfmpegEvent),
    {
        while let Some(event) = self.handle.next_event() {
            self.observe(&event);
            on_event(&self, &event);
            if let FfmpegEvent::Completed(completion) = event {
                self.finish(&completion);
                return (self.job, completion);
            }
        }

        let completion = Completion::lost();
        self.finish(&completion);
        (self.job, completion)
    }

    /// Cancel the engine and wait for it to go away.
    pub fn abort(self) -> (Job, Completion) {
        self.handle.cancel();
        self.wait_with(|_, _| {})
    }
}
