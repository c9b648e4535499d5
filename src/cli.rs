use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

use crate::config::AppConfig;
use crate::core::command::{CommandSpec, SpecState};
use crate::core::error::FfxError;
use crate::core::event::{Completion, FfmpegEvent};
use crate::core::export::export_to_library;
use crate::core::formatter::{
    format_completion, format_input_line, format_media_info, format_output_line,
    format_progress_line, format_summary_line,
};
use crate::core::job::Job;
use crate::core::probe;
use crate::core::transcode::{self, RunningTranscode, TranscodeSettings};
use crate::tui;

#[derive(Debug, Parser)]
#[command(name = "ffbuilder", version, about = "Build and run ffmpeg transcode commands")]
pub struct Cli {
    /// TOML config file (default: <config dir>/ffbuilder/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print the ffmpeg arguments for a job without running it
    Render(RenderArgs),
    /// Run a transcode and show its progress
    Transcode(TranscodeArgs),
    /// Show media information for a file
    Probe(ProbeArgs),
    /// Copy a file into the video library
    Export(ExportArgs),
    /// List x264 speed presets
    Presets,
    /// Print the effective configuration
    Config,
}

/// `WIDTHxHEIGHT`. Values are not range checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSize {
    pub width: i32,
    pub height: i32,
}

impl FromStr for FrameSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{s}'"))?;
        let width = w.trim().parse::<i32>().map_err(|e| format!("width: {e}"))?;
        let height = h.trim().parse::<i32>().map_err(|e| format!("height: {e}"))?;
        Ok(Self { width, height })
    }
}

#[derive(Debug, Args)]
pub struct JobArgs {
    #[arg(short = 'i', long = "input")]
    pub input: String,
    #[arg(short = 'o', long = "output")]
    pub output: Option<String>,
    #[arg(long = "vcodec")]
    pub video_codec: Option<String>,
    #[arg(long = "acodec")]
    pub audio_codec: Option<String>,
    #[arg(long = "vbitrate")]
    pub video_bitrate: Option<String>,
    #[arg(long = "abitrate")]
    pub audio_bitrate: Option<String>,
    #[arg(long = "size", value_name = "WxH", allow_hyphen_values = true)]
    pub size: Option<FrameSize>,
    #[arg(long = "fps", allow_hyphen_values = true)]
    pub frame_rate: Option<i32>,
    /// Trim the output (HH:MM:SS)
    #[arg(short = 't', long = "duration")]
    pub duration: Option<String>,
    #[arg(long = "preset")]
    pub preset: Option<String>,
    /// Extra ffmpeg arguments, placed before the output path
    #[arg(last = true)]
    pub extra_args: Vec<String>,
}

impl JobArgs {
    /// Flags override the configured defaults field by field.
    pub fn settings(&self, base: &TranscodeSettings) -> TranscodeSettings {
        let mut settings = base.clone();
        if let Some(codec) = &self.video_codec {
            settings.video_codec = codec.clone();
        }
        if let Some(codec) = &self.audio_codec {
            settings.audio_codec = codec.clone();
        }
        if let Some(rate) = &self.video_bitrate {
            settings.video_bitrate = rate.clone();
        }
        if let Some(rate) = &self.audio_bitrate {
            settings.audio_bitrate = rate.clone();
        }
        if let Some(size) = self.size {
            settings.width = size.width;
            settings.height = size.height;
        }
        if let Some(fps) = self.frame_rate {
            settings.frame_rate = fps;
        }
        if self.duration.is_some() {
            settings.duration = self.duration.clone();
        }
        if self.preset.is_some() {
            settings.preset = self.preset.clone();
        }
        settings
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RenderFormat {
    /// Tokens joined with single spaces
    Plain,
    /// Shell-quoted, ready to paste after `ffmpeg`
    Shell,
    /// JSON array of tokens
    Json,
}

#[derive(Debug, Args)]
pub struct RenderArgs {
    #[command(flatten)]
    pub job: JobArgs,
    #[arg(long, value_enum, default_value_t = RenderFormat::Plain)]
    pub format: RenderFormat,
}

#[derive(Debug, Args)]
pub struct TranscodeArgs {
    #[command(flatten)]
    pub job: JobArgs,
    /// Print progress lines instead of the full-screen view
    #[arg(long)]
    pub no_tui: bool,
    /// Copy the result into the video library when done
    #[arg(long)]
    pub export: bool,
}

#[derive(Debug, Args)]
pub struct ProbeArgs {
    #[arg(short = 'i', long = "input")]
    pub input: String,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    pub file: PathBuf,
    /// Library root (default: the user's Videos directory)
    #[arg(long)]
    pub library: Option<PathBuf>,
}

impl Commands {
    pub fn wants_tui(&self) -> bool {
        matches!(self, Commands::Transcode(args) if !args.no_tui) && io::stdout().is_terminal()
    }
}

pub const PRESETS: [&str; 10] = [
    "ultrafast",
    "superfast",
    "veryfast",
    "faster",
    "fast",
    "medium",
    "slow",
    "slower",
    "veryslow",
    "placebo",
];

pub fn render(args: &RenderArgs, base: &TranscodeSettings) -> Result<String, FfxError> {
    let settings = args.job.settings(base);
    let spec = settings.to_open_spec(&args.job.input, &args.job.extra_args);

    match &args.job.output {
        Some(output) => format_spec(&spec.output(output.as_str()), args.format),
        None => format_spec(&spec, args.format),
    }
}

fn format_spec<S: SpecState>(spec: &CommandSpec<S>, format: RenderFormat) -> Result<String, FfxError> {
    Ok(match format {
        RenderFormat::Plain => spec.render(),
        RenderFormat::Shell => spec.render_shell(),
        RenderFormat::Json => serde_json::to_string(spec.tokens()).map_err(|e| FfxError::InvalidCommand {
            message: e.to_string(),
        })?,
    })
}

pub fn execute(command: Commands, config: &AppConfig, use_tui: bool) -> Result<(), FfxError> {
    match command {
        Commands::Render(args) => {
            println!("{}", render(&args, &config.transcode)?);
        }
        Commands::Transcode(args) => run_transcode(args, config, use_tui)?,
        Commands::Probe(args) => {
            let info = probe::probe(&config.engine.ffprobe, &args.input)?;
            for line in format_media_info(&info) {
                println!("{line}");
            }
        }
        Commands::Export(args) => {
            let library = match args.library {
                Some(dir) => dir,
                None => config.library_dir()?,
            };
            let target = export_to_library(&args.file, &library)?;
            println!("Saved to {}", target.display());
        }
        Commands::Presets => {
            for preset in PRESETS {
                println!("{preset}");
            }
        }
        Commands::Config => {
            print!("{}", config.to_toml_string()?);
        }
    }
    Ok(())
}

fn run_transcode(args: TranscodeArgs, config: &AppConfig, use_tui: bool) -> Result<(), FfxError> {
    let settings = args.job.settings(&config.transcode);
    let (output, allocated) = match &args.job.output {
        Some(output) => (output.clone(), false),
        None => (
            transcode::allocate_output(&config.cache_dir(), "mp4")?
                .to_string_lossy()
                .into_owned(),
            true,
        ),
    };
    let spec = settings.to_spec(&args.job.input, &output, &args.job.extra_args);

    let mut running = transcode::start(&config.engine.ffmpeg, &config.engine.ffprobe, &spec)?;
    if allocated {
        running = running.owning_output();
    }
    let (_job, completion) = if use_tui {
        tui::run(running, spec.render_shell())?
    } else {
        eprintln!("ffmpeg {}", spec.render_shell());
        wait_plain(running)
    };

    println!("{}", format_completion(&completion, &output));
    if !completion.is_success() {
        return Err(FfxError::ProcessFailed {
            exit_code: completion.exit_code,
            stderr: completion.fail_trace.unwrap_or_default(),
        });
    }

    match probe::probe(&config.engine.ffprobe, &output) {
        Ok(info) => {
            for line in format_media_info(&info) {
                println!("{line}");
            }
        }
        Err(err) => tracing::warn!(%err, "could not inspect output"),
    }

    if args.export {
        let target = export_to_library(Path::new(&output), &config.library_dir()?)?;
        println!("Saved to {}", target.display());
    }

    Ok(())
}

fn wait_plain(running: RunningTranscode) -> (Job, Completion) {
    let mut stderr = io::stderr();
    let mut drew_progress = false;

    let result = running.wait_with(|run, event| match event {
        FfmpegEvent::Statistics(update) => {
            if let Some(line) = format_progress_line(update, run.total, run.percent(update)) {
                let _ = write!(stderr, "\r{line}");
                let _ = stderr.flush();
                drew_progress = true;
            }
        }
        FfmpegEvent::Input(info) => eprintln!("{}", format_input_line(info)),
        FfmpegEvent::Output(info) => eprintln!("{}", format_output_line(info)),
        FfmpegEvent::Summary(summary) => {
            if drew_progress {
                eprintln!();
                drew_progress = false;
            }
            eprintln!("{}", format_summary_line(summary));
        }
        FfmpegEvent::Log(_) | FfmpegEvent::Completed(_) => {}
    });

    if drew_progress {
        eprintln!();
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Commands {
        Cli::try_parse_from(argv).unwrap().command
    }

    #[test]
    fn frame_size_parses() {
        assert_eq!(
            "640x360".parse::<FrameSize>().unwrap(),
            FrameSize { width: 640, height: 360 }
        );
        assert_eq!(
            "-2X720".parse::<FrameSize>().unwrap(),
            FrameSize { width: -2, height: 720 }
        );
        assert!("640".parse::<FrameSize>().is_err());
        assert!("axb".parse::<FrameSize>().is_err());
    }

    #[test]
    fn render_uses_config_defaults() {
        let Commands::Render(args) = parse(&["ffbuilder", "render", "-i", "in.mp4", "-o", "out.mp4"]) else {
            panic!("expected render");
        };
        assert_eq!(
            render(&args, &TranscodeSettings::default()).unwrap(),
            "-y -i in.mp4 -c:v h264 -c:a aac -b:v 1M -b:a 128k -s 640x360 -r 30 out.mp4"
        );
    }

    #[test]
    fn flags_override_defaults() {
        let Commands::Render(args) = parse(&[
            "ffbuilder", "render", "-i", "in.mp4", "--vcodec", "libx265", "--size", "1280x720",
            "--fps", "24", "-t", "00:00:10", "--preset", "slow", "-o", "out.mkv", "--", "-an",
        ]) else {
            panic!("expected render");
        };
        assert_eq!(
            render(&args, &TranscodeSettings::default()).unwrap(),
            "-y -i in.mp4 -c:v libx265 -c:a aac -b:v 1M -b:a 128k -s 1280x720 -r 24 -preset slow -t 00:00:10 -an out.mkv"
        );
    }

    #[test]
    fn render_without_output_has_no_terminal_path() {
        let Commands::Render(args) = parse(&["ffbuilder", "render", "-i", "in.mp4"]) else {
            panic!("expected render");
        };
        let rendered = render(&args, &TranscodeSettings::default()).unwrap();
        assert!(rendered.ends_with("-r 30"));
    }

    #[test]
    fn render_formats() {
        let Commands::Render(args) = parse(&[
            "ffbuilder", "render", "-i", "my clip.mp4", "-o", "out.mp4", "--format", "json",
        ]) else {
            panic!("expected render");
        };
        let json = render(&args, &TranscodeSettings::default()).unwrap();
        let tokens: Vec<String> = serde_json::from_str(&json).unwrap();
        assert_eq!(tokens[2], "my clip.mp4");
        assert_eq!(tokens.last().map(String::as_str), Some("out.mp4"));

        let Commands::Render(args) = parse(&[
            "ffbuilder", "render", "-i", "my clip.mp4", "-o", "out.mp4", "--format", "shell",
        ]) else {
            panic!("expected render");
        };
        let shell = render(&args, &TranscodeSettings::default()).unwrap();
        assert!(shell.starts_with("-y -i 'my clip.mp4' "));
    }

    #[test]
    fn render_goes_through_the_builder() {
        let Commands::Render(args) = parse(&[
            "ffbuilder", "render", "-i", "my clip.mp4", "--format", "shell",
        ]) else {
            panic!("expected render");
        };
        let spec = TranscodeSettings::default().to_open_spec("my clip.mp4", &[]);
        assert_eq!(render(&args, &TranscodeSettings::default()).unwrap(), spec.render_shell());
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from(["ffbuilder", "presets", "-vv", "--config", "x.toml"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
        assert!(matches!(cli.command, Commands::Presets));
    }

    #[test]
    fn transcode_flags() {
        let Commands::Transcode(args) = parse(&["ffbuilder", "transcode", "-i", "a.mp4", "--no-tui", "--export"]) else {
            panic!("expected transcode");
        };
        assert!(args.no_tui);
        assert!(args.export);
        assert!(args.job.output.is_none());
        assert!(!Commands::Transcode(args).wants_tui());
    }

    #[test]
    fn input_is_required() {
        assert!(Cli::try_parse_from(["ffbuilder", "render", "-o", "out.mp4"]).is_err());
    }
}
