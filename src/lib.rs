//! Fluent builder for ffmpeg command lines, plus the runner, probe and
//! progress plumbing used by the `ffbuilder` binary.

pub mod cli;
pub mod config;
pub mod core;
pub mod logging;
pub mod tui;
