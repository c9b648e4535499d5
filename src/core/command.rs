//! Fluent builder for ffmpeg argument lists.
//!
//! A [`CommandSpec`] is an append-only token log. It starts with the overwrite
//! flag, every setter appends a flag/value pair, and [`CommandSpec::output`]
//! appends the output path and seals the spec so nothing can follow it.

use std::fmt;
use std::marker::PhantomData;

use crate::core::error::FfxError;

const OVERWRITE_FLAG: &str = "-y";
const INPUT_FLAG: &str = "-i";

mod state {
    pub trait Marker {}
    impl Marker for super::Open {}
    impl Marker for super::Sealed {}
}

/// Build state of a [`CommandSpec`].
pub trait SpecState: state::Marker {
    const HAS_OUTPUT: bool;
}

/// The spec still accepts options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Open;

/// The output path has been appended; the spec is read-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sealed;

impl SpecState for Open {
    const HAS_OUTPUT: bool = false;
}

impl SpecState for Sealed {
    const HAS_OUTPUT: bool = true;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec<S: SpecState = Open> {
    tokens: Vec<String>,
    input_index: Option<usize>,
    state: PhantomData<S>,
}

impl CommandSpec<Open> {
    pub fn create() -> Self {
        Self {
            tokens: vec![OVERWRITE_FLAG.to_string()],
            input_index: None,
            state: PhantomData,
        }
    }

    pub fn input(mut self, path: impl Into<String>) -> Self {
        self.tokens.push(INPUT_FLAG.to_string());
        if self.input_index.is_none() {
            self.input_index = Some(self.tokens.len());
        }
        self.tokens.push(path.into());
        self
    }

    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.flag("-c:v", codec)
    }

    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.flag("-c:a", codec)
    }

    /// Video bitrate such as `1M` or `500k`. Units are not checked.
    pub fn video_bitrate(self, rate: impl Into<String>) -> Self {
        self.flag("-b:v", rate)
    }

    pub fn audio_bitrate(self, rate: impl Into<String>) -> Self {
        self.flag("-b:a", rate)
    }

    /// Output frame size. Dimensions are passed through as given, including
    /// zero or negative values.
    pub fn resolution(self, width: i32, height: i32) -> Self {
        self.flag("-s", format!("{width}x{height}"))
    }

    pub fn frame_rate(self, fps: i32) -> Self {
        self.flag("-r", fps.to_string())
    }

    /// Trim the output to `duration` (`HH:MM:SS` or seconds).
    pub fn duration(self, duration: impl Into<String>) -> Self {
        self.flag("-t", duration)
    }

    pub fn preset(self, preset: impl Into<String>) -> Self {
        self.flag("-preset", preset)
    }

    /// Append a raw token, for options without a dedicated setter.
    pub fn arg(mut self, token: impl Into<String>) -> Self {
        self.tokens.push(token.into());
        self
    }

    pub fn args<I, T>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tokens.extend(tokens.into_iter().map(Into::into));
        self
    }

    /// Append the output path as the terminal token.
    pub fn output(mut self, path: impl Into<String>) -> CommandSpec<Sealed> {
        self.tokens.push(path.into());
        CommandSpec {
            tokens: self.tokens,
            input_index: self.input_index,
            state: PhantomData,
        }
    }

    fn flag(mut self, flag: &str, value: impl Into<String>) -> Self {
        self.tokens.push(flag.to_string());
        self.tokens.push(value.into());
        self
    }
}

impl Default for CommandSpec<Open> {
    fn default() -> Self {
        Self::create()
    }
}

impl<S: SpecState> CommandSpec<S> {
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Owned token vector for exec-style invocation.
    pub fn to_args(&self) -> Vec<String> {
        self.tokens.clone()
    }

    /// Join all tokens with single spaces.
    ///
    /// Paths containing whitespace are not quoted; use [`Self::to_args`] to
    /// execute or [`Self::render_shell`] to display a pasteable command.
    pub fn render(&self) -> String {
        self.tokens.join(" ")
    }

    pub fn render_shell(&self) -> String {
        shell_words::join(&self.tokens)
    }

    pub fn has_output(&self) -> bool {
        S::HAS_OUTPUT
    }

    /// Path following the first `-i`, if any.
    pub fn input_path(&self) -> Option<&str> {
        self.input_index
            .and_then(|idx| self.tokens.get(idx))
            .map(String::as_str)
    }
}

impl CommandSpec<Sealed> {
    pub fn output_path(&self) -> &str {
        self.tokens.last().map(String::as_str).unwrap_or_default()
    }

    /// Opt-in check that the spec names a non-empty input and an output
    /// distinct from it.
    ///
    /// Building and rendering never call this.
    pub fn validate(&self) -> Result<(), FfxError> {
        let input = match self.input_path() {
            None => {
                return Err(FfxError::InvalidCommand {
                    message: "no input set".to_string(),
                })
            }
            Some(path) if path.trim().is_empty() => {
                return Err(FfxError::InvalidCommand {
                    message: "input path is empty".to_string(),
                })
            }
            Some(path) => path,
        };

        let output = self.output_path();
        if output.trim().is_empty() {
            return Err(FfxError::InvalidCommand {
                message: "output path is empty".to_string(),
            });
        }
        if output == input {
            return Err(FfxError::InvalidCommand {
                message: format!("output is the same as the input: {output}"),
            });
        }

        Ok(())
    }
}

impl<S: SpecState> fmt::Display for CommandSpec<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo_spec() -> CommandSpec<Sealed> {
        CommandSpec::create()
            .input("in.mp4")
            .video_codec("h264")
            .audio_codec("aac")
            .video_bitrate("1M")
            .audio_bitrate("128k")
            .resolution(640, 360)
            .frame_rate(30)
            .output("out.mp4")
    }

    #[test]
    fn renders_demo_command_exactly() {
        assert_eq!(
            demo_spec().render(),
            "-y -i in.mp4 -c:v h264 -c:a aac -b:v 1M -b:a 128k -s 640x360 -r 30 out.mp4"
        );
    }

    #[test]
    fn create_seeds_overwrite_flag_only() {
        let spec = CommandSpec::create();
        assert_eq!(spec.tokens(), ["-y"]);
        assert_eq!(spec.render(), "-y");
        assert!(!spec.has_output());
        assert_eq!(CommandSpec::<Open>::default(), spec);
    }

    #[test]
    fn input_follows_overwrite_flag() {
        let spec = CommandSpec::create().input("clip.mov");
        assert_eq!(spec.tokens()[0], "-y");
        assert_eq!(spec.tokens()[1], "-i");
        assert_eq!(spec.tokens()[2], "clip.mov");
        assert_eq!(spec.render(), "-y -i clip.mov");
        assert_eq!(spec.input_path(), Some("clip.mov"));
    }

    #[test]
    fn open_spec_never_ends_with_output_path() {
        let spec = CommandSpec::create()
            .input("in.mp4")
            .video_codec("libx264")
            .duration("00:00:10");
        assert!(!spec.has_output());
        assert_eq!(spec.tokens().last().map(String::as_str), Some("00:00:10"));
        assert_eq!(spec.render(), "-y -i in.mp4 -c:v libx264 -t 00:00:10");
    }

    #[test]
    fn resolution_renders_width_by_height() {
        let spec = CommandSpec::create().resolution(640, 360);
        let tokens = spec.tokens();
        let pos = tokens.iter().position(|t| t == "-s").unwrap();
        assert_eq!(tokens[pos + 1], "640x360");
        assert!(spec.render().contains("-s 640x360"));
    }

    #[test]
    fn out_of_range_values_pass_through() {
        let spec = CommandSpec::create().resolution(0, -2).frame_rate(-1);
        assert_eq!(spec.render(), "-y -s 0x-2 -r -1");
    }

    #[test]
    fn render_is_repeatable() {
        let spec = demo_spec();
        let first = spec.render();
        let second = spec.render();
        assert_eq!(first, second);
        assert_eq!(spec.to_string(), first);
    }

    #[test]
    fn setters_keep_call_order() {
        let spec = CommandSpec::create()
            .frame_rate(24)
            .audio_codec("opus")
            .input("a.mkv")
            .video_codec("vp9");
        assert_eq!(spec.render(), "-y -r 24 -c:a opus -i a.mkv -c:v vp9");
    }

    #[test]
    fn duration_and_preset_tokens() {
        let spec = CommandSpec::create()
            .input("in.mp4")
            .preset("veryfast")
            .duration("00:01:30")
            .output("out.mp4");
        assert_eq!(
            spec.render(),
            "-y -i in.mp4 -preset veryfast -t 00:01:30 out.mp4"
        );
    }

    #[test]
    fn raw_args_are_appended_in_place() {
        let spec = CommandSpec::create()
            .input("in.mp4")
            .args(["-vf", "hflip"])
            .arg("-an")
            .output("out.mp4");
        assert_eq!(spec.render(), "-y -i in.mp4 -vf hflip -an out.mp4");
    }

    #[test]
    fn output_seals_the_spec() {
        let spec = demo_spec();
        assert!(spec.has_output());
        assert_eq!(spec.output_path(), "out.mp4");
        assert_eq!(spec.tokens().last().map(String::as_str), Some("out.mp4"));
        assert_eq!(spec.to_args(), spec.tokens().to_vec());
    }

    #[test]
    fn token_array_keeps_paths_with_spaces_whole() {
        let spec = CommandSpec::create()
            .input("my clip.mp4")
            .output("out dir/result.mp4");
        assert_eq!(
            spec.to_args(),
            vec!["-y", "-i", "my clip.mp4", "out dir/result.mp4"]
        );
        assert_eq!(spec.render(), "-y -i my clip.mp4 out dir/result.mp4");
        assert_eq!(
            spec.render_shell(),
            "-y -i 'my clip.mp4' 'out dir/result.mp4'"
        );
    }

    #[test]
    fn input_path_tracks_first_input() {
        let spec = CommandSpec::create()
            .input("first.mp4")
            .input("second.wav")
            .output("out.mp4");
        assert_eq!(spec.input_path(), Some("first.mp4"));
    }

    #[test]
    fn validate_accepts_complete_spec() {
        assert!(demo_spec().validate().is_ok());
    }

    #[test]
    fn validate_rejects_missing_input() {
        let spec = CommandSpec::create().video_codec("h264").output("out.mp4");
        assert!(matches!(
            spec.validate(),
            Err(FfxError::InvalidCommand { .. })
        ));
        assert_eq!(spec.render(), "-y -c:v h264 out.mp4");
    }

    #[test]
    fn validate_rejects_blank_paths() {
        let empty_input = CommandSpec::create().input("").output("out.mp4");
        assert!(empty_input.validate().is_err());

        let empty_output = CommandSpec::create().input("in.mp4").output(" ");
        assert!(empty_output.validate().is_err());
    }

    #[test]
    fn validate_rejects_output_equal_to_input() {
        let spec = CommandSpec::create().input("clip.mp4").output("clip.mp4");
        assert!(matches!(
            spec.validate(),
            Err(FfxError::InvalidCommand { .. })
        ));
    }
}
