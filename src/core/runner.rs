use std::collections::VecDeque;
use std::io::{BufReader, Read};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::core::error::FfxError;
use crate::core::event::{classify_log_line, Completion, FfmpegEvent, LogLevel};
use crate::core::job::JobStatus;
use crate::core::metadata::{MetadataParser, StreamHeader};
use crate::core::progress::{
    parse_bitrate_to_kbps, parse_ffmpeg_time, parse_progress_line, split_number_unit,
    FfmpegProgress,
};
use crate::core::summary::{is_summary_line, parse_summary_line};

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const FAIL_TRACE_LINES: usize = 50;

#[derive(Debug, Clone, Copy)]
enum StreamKind {
    Stdout,
    Stderr,
}

/// Handle to a running engine process.
///
/// Events arrive in order; the last one is always [`FfmpegEvent::Completed`].
#[derive(Debug)]
pub struct TranscodeHandle {
    events: Receiver<FfmpegEvent>,
    cancel: Arc<AtomicBool>,
}

impl TranscodeHandle {
    pub fn try_next(&self) -> Option<FfmpegEvent> {
        self.events.try_recv().ok()
    }

    /// Block for the next event; `None` once the supervisor is gone.
    pub fn next_event(&self) -> Option<FfmpegEvent> {
        self.events.recv().ok()
    }

    /// Ask the supervisor to kill the process. The run then completes with
    /// [`JobStatus::Cancelled`].
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }
}

/// Dropping the handle stops the engine; nobody is left to read its events.
impl Drop for TranscodeHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Start `program` with `args` and supervise it on a background thread.
pub fn spawn(program: &str, args: Vec<String>) -> Result<TranscodeHandle, FfxError> {
    let progress_on_stdout = has_progress_stdout(&args);

    let mut cmd = Command::new(program);
    cmd.args(&args).stdin(Stdio::null()).stderr(Stdio::piped());
    if progress_on_stdout {
        cmd.stdout(Stdio::piped());
    } else {
        cmd.stdout(Stdio::null());
    }

    debug!(program, ?args, "spawning engine");
    let child = cmd.spawn().map_err(|e| FfxError::spawn_failed(program, e))?;
    info!(program, pid = child.id(), "engine started");

    let (event_tx, event_rx) = mpsc::channel::<FfmpegEvent>();
    let cancel = Arc::new(AtomicBool::new(false));
    let cancel_flag = Arc::clone(&cancel);

    thread::spawn(move || supervise(child, event_tx, cancel_flag));

    Ok(TranscodeHandle {
        events: event_rx,
        cancel,
    })
}

fn supervise(mut child: Child, event_tx: Sender<FfmpegEvent>, cancel: Arc<AtomicBool>) {
    let (line_tx, line_rx) = mpsc::channel::<(StreamKind, String)>();
    let mut readers = Vec::new();

    if let Some(stderr) = child.stderr.take() {
        readers.push(spawn_line_reader(StreamKind::Stderr, stderr, line_tx.clone()));
    }
    if let Some(stdout) = child.stdout.take() {
        readers.push(spawn_line_reader(StreamKind::Stdout, stdout, line_tx.clone()));
    }
    drop(line_tx);

    let mut metadata = MetadataParser::new();
    let mut progress_acc = ProgressAccumulator::default();
    let mut tail = StderrTail::new(FAIL_TRACE_LINES);
    let mut cancel_handled = false;
    let mut killed = false;

    loop {
        if !cancel_handled && cancel.load(Ordering::SeqCst) {
            cancel_handled = true;
            killed = kill_if_running(&mut child);
        }

        let (stream, line) = match line_rx.recv_timeout(POLL_INTERVAL) {
            Ok(item) => item,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        match stream {
            StreamKind::Stdout => {
                if let Some(progress) = parse_progress_kv_line(&line, &mut progress_acc) {
                    let _ = event_tx.send(FfmpegEvent::Statistics(progress));
                }
            }
            StreamKind::Stderr => {
                log_engine_line(&line);
                tail.push(&line);
                let _ = event_tx.send(FfmpegEvent::Log(line.clone()));

                if is_summary_line(&line) {
                    if let Some(summary) = parse_summary_line(&line) {
                        let _ = event_tx.send(FfmpegEvent::Summary(summary));
                    }
                    continue;
                }

                if let Some(progress) = parse_progress_line(&line) {
                    let _ = event_tx.send(FfmpegEvent::Statistics(progress));
                    continue;
                }

                match metadata.parse_line(&line) {
                    Some(StreamHeader::Input(info)) => {
                        let _ = event_tx.send(FfmpegEvent::Input(info));
                    }
                    Some(StreamHeader::Output(info)) => {
                        let _ = event_tx.send(FfmpegEvent::Output(info));
                    }
                    None => {}
                }
            }
        }
    }

    for reader in readers {
        let _ = reader.join();
    }

    let completion = match child.wait() {
        Ok(status) if killed && !status.success() => Completion {
            status: JobStatus::Cancelled,
            exit_code: None,
            fail_trace: None,
        },
        Ok(status) if status.success() => Completion {
            status: JobStatus::Finished,
            exit_code: status.code(),
            fail_trace: None,
        },
        Ok(status) => Completion {
            status: JobStatus::Failed,
            exit_code: status.code(),
            fail_trace: Some(tail.joined()),
        },
        Err(err) => Completion {
            status: JobStatus::Failed,
            exit_code: None,
            fail_trace: Some(err.to_string()),
        },
    };

    info!(status = completion.status.label(), exit_code = ?completion.exit_code, "engine exited");
    let _ = event_tx.send(FfmpegEvent::Completed(completion));
}

/// Kill the engine unless it already exited. Returns whether it was killed.
fn kill_if_running(child: &mut Child) -> bool {
    match child.try_wait() {
        Ok(Some(status)) => {
            debug!(?status, "cancel requested after engine exit");
            false
        }
        Ok(None) => {
            info!("cancelling engine");
            match child.kill() {
                Ok(()) => true,
                Err(err) => {
                    warn!(%err, "failed to kill engine");
                    false
                }
            }
        }
        Err(err) => {
            warn!(%err, "failed to poll engine before cancelling");
            false
        }
    }
}

fn log_engine_line(line: &str) {
    match classify_log_line(line) {
        LogLevel::Error => error!(target: "ffbuilder::engine", "{line}"),
        LogLevel::Warning => warn!(target: "ffbuilder::engine", "{line}"),
        LogLevel::Progress => {}
        _ => debug!(target: "ffbuilder::engine", "{line}"),
    }
}

fn spawn_line_reader<R: Read + Send + 'static>(
    stream: StreamKind,
    reader: R,
    sender: Sender<(StreamKind, String)>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut reader = BufReader::new(reader);
        let mut line_buf: Vec<u8> = Vec::new();
        let mut byte = [0u8; 1];

        // ffmpeg redraws statistics with '\r', so both terminators end a line.
        loop {
            match reader.read(&mut byte) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }

            match byte[0] {
                b'\r' | b'\n' => {
                    if let Some(line) = take_line(&mut line_buf) {
                        if sender.send((stream, line)).is_err() {
                            return;
                        }
                    }
                }
                other => line_buf.push(other),
            }
        }

        if let Some(line) = take_line(&mut line_buf) {
            let _ = sender.send((stream, line));
        }
    })
}

fn take_line(buf: &mut Vec<u8>) -> Option<String> {
    if buf.is_empty() {
        return None;
    }
    let line = String::from_utf8_lossy(buf).trim().to_string();
    buf.clear();
    if line.is_empty() {
        None
    } else {
        Some(line)
    }
}

fn has_progress_stdout(args: &[String]) -> bool {
    if args
        .iter()
        .any(|arg| arg.starts_with("-progress=") && arg.contains("pipe:1"))
    {
        return true;
    }

    args.windows(2)
        .any(|pair| pair[0] == "-progress" && pair[1].starts_with("pipe:1"))
}

/// Last `capacity` stderr lines, kept for failure reports.
struct StderrTail {
    lines: VecDeque<String>,
    capacity: usize,
}

impl StderrTail {
    fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, line: &str) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.to_string());
    }

    fn joined(&self) -> String {
        self.lines.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
    }
}

/// Folds the `key=value` blocks written by `-progress pipe:1`; each block ends
/// with a `progress=` line.
#[derive(Default)]
struct ProgressAccumulator {
    frame: Option<u64>,
    fps: Option<f32>,
    time: Option<Duration>,
    bitrate_kbps: Option<f32>,
    speed: Option<f32>,
    size_bytes: Option<u64>,
}

impl ProgressAccumulator {
    fn set_kv(&mut self, key: &str, value: &str) {
        match key {
            "frame" => self.frame = value.parse::<u64>().ok(),
            "fps" => self.fps = value.parse::<f32>().ok(),
            "bitrate" => {
                self.bitrate_kbps = split_number_unit(value).and_then(|(num, unit)| {
                    parse_bitrate_to_kbps(num.parse::<f32>().ok()?, unit)
                });
            }
            "speed" => self.speed = value.trim_end_matches('x').parse::<f32>().ok(),
            "total_size" => self.size_bytes = value.parse::<u64>().ok(),
            "out_time" => self.time = parse_ffmpeg_time(value),
            // Both keys carry microseconds.
            "out_time_us" | "out_time_ms" => {
                if let Ok(parsed) = value.parse::<u64>() {
                    self.time = Some(Duration::from_micros(parsed));
                }
            }
            _ => {}
        }
    }

    fn take(&mut self) -> Option<FfmpegProgress> {
        let acc = std::mem::take(self);
        if acc.frame.is_none() && acc.time.is_none() && acc.size_bytes.is_none() {
            return None;
        }

        Some(FfmpegProgress {
            frame: acc.frame.unwrap_or(0),
            fps: acc.fps.unwrap_or(0.0),
            time: acc.time.unwrap_or(Duration::ZERO),
            bitrate_kbps: acc.bitrate_kbps.unwrap_or(0.0),
            speed: acc.speed.unwrap_or(0.0),
            size_bytes: acc.size_bytes.unwrap_or(0),
        })
    }
}

fn parse_progress_kv_line(line: &str, acc: &mut ProgressAccumulator) -> Option<FfmpegProgress> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    match trimmed.split_once('=') {
        Some(("progress", _)) => acc.take(),
        Some((key, value)) => {
            acc.set_kv(key.trim(), value.trim());
            None
        }
        None => parse_progress_line(trimmed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn drain(handle: TranscodeHandle) -> (Vec<FfmpegEvent>, Completion) {
        let mut events = Vec::new();
        while let Some(event) = handle.next_event() {
            let done = match &event {
                FfmpegEvent::Completed(completion) => Some(completion.clone()),
                _ => None,
            };
            events.push(event);
            if let Some(completion) = done {
                return (events, completion);
            }
        }
        (events, Completion::lost())
    }

    #[test]
    fn detects_progress_pipe() {
        assert!(has_progress_stdout(&strings(&["-progress", "pipe:1", "-y"])));
        assert!(has_progress_stdout(&strings(&["-progress=pipe:1"])));
        assert!(!has_progress_stdout(&strings(&["-y", "-i", "pipe:1"])));
    }

    #[test]
    fn folds_progress_blocks() {
        let mut acc = ProgressAccumulator::default();
        let lines = [
            "frame=90",
            "fps=29.97",
            "bitrate=1024.5kbits/s",
            "total_size=393216",
            "out_time_us=3000000",
            "speed=1.5x",
        ];
        for line in lines {
            assert!(parse_progress_kv_line(line, &mut acc).is_none());
        }
        let progress = parse_progress_kv_line("progress=continue", &mut acc).unwrap();
        assert_eq!(progress.frame, 90);
        assert_eq!(progress.time, Duration::from_secs(3));
        assert_eq!(progress.size_bytes, 393_216);
        assert!((progress.speed - 1.5).abs() < f32::EPSILON);

        // The accumulator is reset between blocks.
        assert!(parse_progress_kv_line("progress=end", &mut acc).is_none());
    }

    #[test]
    fn tail_keeps_last_lines() {
        let mut tail = StderrTail::new(2);
        tail.push("one");
        tail.push("two");
        tail.push("three");
        assert_eq!(tail.joined(), "two\nthree");
    }

    #[test]
    fn missing_binary_is_reported() {
        let err = spawn("ffbuilder-no-such-engine", strings(&["-version"])).unwrap_err();
        assert!(matches!(err, FfxError::BinaryNotFound { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn streams_events_and_failure_trace() {
        let script = "printf 'frame=   12 fps=0.0 size=       0kB time=00:00:01.00 bitrate=0.0kbits/s speed=2x\\r' 1>&2; \
                      echo 'Unknown encoder foo' 1>&2; exit 3";
        let handle = spawn("sh", strings(&["-c", script])).unwrap();

        let (events, completion) = drain(handle);

        assert_eq!(completion.status, JobStatus::Failed);
        assert_eq!(completion.exit_code, Some(3));
        assert!(completion
            .fail_trace
            .as_deref()
            .unwrap_or_default()
            .contains("Unknown encoder foo"));

        assert!(events.iter().any(|event| matches!(
            event,
            FfmpegEvent::Statistics(progress) if progress.time == Duration::from_secs(1)
        )));
        assert!(events
            .iter()
            .any(|event| matches!(event, FfmpegEvent::Log(line) if line == "Unknown encoder foo")));
        assert!(matches!(events.last(), Some(FfmpegEvent::Completed(_))));
    }

    #[cfg(unix)]
    #[test]
    fn successful_exit_finishes() {
        let handle = spawn("sh", strings(&["-c", "exit 0"])).unwrap();
        let (_, completion) = drain(handle);
        assert!(completion.is_success());
        assert_eq!(completion.fail_trace, None);
    }

    #[cfg(unix)]
    #[test]
    fn cancel_kills_the_process() {
        let handle = spawn("sh", strings(&["-c", "exec sleep 30"])).unwrap();
        handle.cancel();
        assert!(handle.is_cancelled());
        let (_, completion) = drain(handle);
        assert_eq!(completion.status, JobStatus::Cancelled);
    }

    #[cfg(unix)]
    #[test]
    fn cancel_after_clean_exit_keeps_finished_status() {
        // The background sleep holds stderr open after the shell exits 0.
        let handle = spawn("sh", strings(&["-c", "sleep 1 1>&2 & exit 0"])).unwrap();
        thread::sleep(Duration::from_millis(300));
        handle.cancel();
        let (_, completion) = drain(handle);
        assert_eq!(completion.status, JobStatus::Finished);
        assert_eq!(completion.exit_code, Some(0));
    }

    #[cfg(unix)]
    #[test]
    fn dropping_the_handle_kills_the_process() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("survived");
        let script = format!("sleep 2; touch '{}'", marker.display());
        let handle = spawn("sh", strings(&["-c", &script])).unwrap();
        drop(handle);
        thread::sleep(Duration::from_millis(2500));
        assert!(!marker.exists());
    }
}
