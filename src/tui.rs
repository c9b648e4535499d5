use std::io;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Terminal;
use tracing::warn;

use crate::core::error::FfxError;
use crate::core::event::{classify_log_line, Completion, FfmpegEvent, LogLevel};
use crate::core::formatter::{
    format_completion, format_duration, format_input_line, format_output_line,
    format_progress_line, format_summary_line,
};
use crate::core::job::{Job, JobStatus};
use crate::core::progress::FfmpegProgress;
use crate::core::transcode::RunningTranscode;

const MAX_HISTORY: usize = 500;
const PROGRESS_LOG_EVERY: u64 = 25;

struct TerminalGuard;

impl TerminalGuard {
    fn enter() -> Result<Self, FfxError> {
        enable_raw_mode()?;
        io::stdout().execute(EnterAlternateScreen)?;
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = io::stdout().execute(LeaveAlternateScreen);
    }
}

#[derive(Debug)]
struct AppState {
    command: String,
    output: String,
    history: Vec<String>,
    progress: Option<FfmpegProgress>,
    percent: Option<u8>,
    total: Option<Duration>,
    status: JobStatus,
    completion: Option<Completion>,
    cancel_requested: bool,
    scroll_offset: usize,
    view_lines: usize,
    tick: u64,
    progress_log_counter: u64,
}

impl AppState {
    fn new(command: String, output: String) -> Self {
        Self {
            command,
            output,
            history: vec!["Transcoding. Esc or Ctrl-C cancels.".to_string()],
            progress: None,
            percent: None,
            total: None,
            status: JobStatus::Running,
            completion: None,
            cancel_requested: false,
            scroll_offset: 0,
            view_lines: 1,
            tick: 0,
            progress_log_counter: 0,
        }
    }

    fn push_history(&mut self, line: impl Into<String>) {
        if self.history.len() >= MAX_HISTORY {
            let drain_count = self.history.len() + 1 - MAX_HISTORY;
            self.history.drain(0..drain_count);
        }
        self.history.push(line.into());
        self.clamp_scroll();
    }

    fn apply(&mut self, running: &RunningTranscode, event: FfmpegEvent) {
        match event {
            FfmpegEvent::Statistics(update) => {
                self.percent = running.percent(&update);
                self.total = running.total;
                if let Some(line) = format_progress_line(&update, running.total, self.percent) {
                    self.progress_log_counter = self.progress_log_counter.wrapping_add(1);
                    if self.progress_log_counter % PROGRESS_LOG_EVERY == 0 {
                        self.push_history(line);
                    }
                }
                self.progress = Some(update);
            }
            FfmpegEvent::Input(info) => {
                self.total = running.total;
                self.push_history(format_input_line(&info));
            }
            FfmpegEvent::Output(info) => self.push_history(format_output_line(&info)),
            FfmpegEvent::Summary(summary) => self.push_history(format_summary_line(&summary)),
            FfmpegEvent::Log(line) => match classify_log_line(&line) {
                LogLevel::Error => self.push_history(format!("error: {line}")),
                LogLevel::Warning => self.push_history(format!("warning: {line}")),
                _ => {}
            },
            FfmpegEvent::Completed(completion) => {
                self.status = completion.status;
                if completion.is_success() {
                    self.percent = Some(100);
                }
                self.push_history(format_completion(&completion, &self.output));
                self.push_history("Press any key to close.");
                self.completion = Some(completion);
            }
        }
    }

    fn set_view_lines(&mut self, lines: usize) {
        self.view_lines = lines.max(1);
        self.clamp_scroll();
    }

    fn scroll_up(&mut self, lines: usize) {
        self.scroll_offset = (self.scroll_offset + lines).min(self.max_scroll());
    }

    fn scroll_down(&mut self, lines: usize) {
        self.scroll_offset = self.scroll_offset.saturating_sub(lines);
    }

    fn max_scroll(&self) -> usize {
        self.history.len().saturating_sub(self.view_lines)
    }

    fn clamp_scroll(&mut self) {
        self.scroll_offset = self.scroll_offset.min(self.max_scroll());
    }
}

/// Full-screen progress view for one transcode. Returns once the run has
/// completed and the user dismissed the view.
///
/// A terminal error stops the engine before it is returned.
pub fn run(mut running: RunningTranscode, command: String) -> Result<(Job, Completion), FfxError> {
    match drive(&mut running, command) {
        Ok(done) => Ok(done),
        Err(err) => {
            stop_unfinished(running);
            Err(err)
        }
    }
}

/// Cancel and reap a run that has not reported completion yet.
fn stop_unfinished(running: RunningTranscode) -> Option<Completion> {
    if running.job.status.is_terminal() {
        return None;
    }
    let (_, completion) = running.abort();
    warn!(status = completion.status.label(), "progress view failed, engine stopped");
    Some(completion)
}

fn drive(running: &mut RunningTranscode, command: String) -> Result<(Job, Completion), FfxError> {
    let _guard = TerminalGuard::enter()?;
    let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;

    let output = running.output.display().to_string();
    let mut app = AppState::new(command, output);

    loop {
        while let Some(event) = running.handle.try_next() {
            running.observe(&event);
            if let FfmpegEvent::Completed(completion) = &event {
                running.finish(completion);
            }
            app.apply(running, event);
        }

        let size = terminal.size()?;
        let history_height = size.height.saturating_sub(9).max(3) as usize;
        app.set_view_lines(history_height.saturating_sub(2).max(1));
        app.tick = app.tick.wrapping_add(1);

        terminal.draw(|frame| {
            let layout = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Length(4),
                    Constraint::Min(3),
                    Constraint::Length(5),
                ])
                .split(frame.size());

            frame.render_widget(render_header(&app, layout[0].width as usize), layout[0]);
            frame.render_widget(
                render_history(&app, layout[1].height as usize, layout[1].width as usize),
                layout[1],
            );
            let command = Paragraph::new(format!("ffmpeg {}", app.command))
                .block(Block::default().title("Command").borders(Borders::ALL))
                .wrap(Wrap { trim: false });
            frame.render_widget(command, layout[2]);
        })?;

        if !event::poll(Duration::from_millis(50))? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        if let Some(completion) = &app.completion {
            return Ok((running.job.clone(), completion.clone()));
        }

        let step = app.view_lines.saturating_sub(1).max(1);
        match key.code {
            KeyCode::Esc | KeyCode::Char('q') => request_cancel(&mut app, running),
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                request_cancel(&mut app, running)
            }
            KeyCode::PageUp => app.scroll_up(step),
            KeyCode::PageDown => app.scroll_down(step),
            KeyCode::Up => app.scroll_up(1),
            KeyCode::Down => app.scroll_down(1),
            KeyCode::Home => app.scroll_offset = app.max_scroll(),
            KeyCode::End => app.scroll_offset = 0,
            _ => {}
        }
    }
}

fn request_cancel(app: &mut AppState, running: &RunningTranscode) {
    if running.handle.is_cancelled() {
        return;
    }
    running.handle.cancel();
    app.cancel_requested = true;
    app.push_history("Cancelling...");
}

fn render_header(app: &AppState, width: usize) -> Paragraph<'static> {
    let status = if app.cancel_requested && !app.status.is_terminal() {
        "Cancelling"
    } else {
        app.status.label()
    };

    let stats = match &app.progress {
        Some(update) => format!(
            "time={}/{} frame={} speed={}x",
            format_duration(update.time),
            app.total
                .map(format_duration)
                .unwrap_or_else(|| "--:--:--".to_string()),
            update.frame,
            update.speed
        ),
        None => "time=--:--:-- frame= speed=".to_string(),
    };

    let bar_width = width.saturating_sub(40).clamp(10, 50);
    let percent = app
        .percent
        .map(|p| format!("{p:>3}%"))
        .unwrap_or_else(|| " --%".to_string());

    let text = vec![
        Line::from(vec![Span::raw("Status: "), Span::raw(status)]),
        Line::from(vec![
            Span::raw(render_progress_bar(app, bar_width)),
            Span::raw(" "),
            Span::raw(percent),
            Span::raw(" "),
            Span::raw(stats),
        ]),
    ];

    Paragraph::new(text)
        .block(Block::default().title("ffbuilder").borders(Borders::ALL))
        .wrap(Wrap { trim: true })
}

fn render_progress_bar(app: &AppState, width: usize) -> String {
    let width = width.max(10);
    let mut bar = String::with_capacity(width + 2);
    bar.push('[');

    if let Some(percent) = app.percent {
        let filled = (percent as usize * width / 100).min(width);
        for idx in 0..width {
            if idx < filled {
                bar.push('=');
            } else if idx == filled {
                bar.push('>');
            } else {
                bar.push(' ');
            }
        }
    } else if app.status.is_terminal() {
        bar.push_str(&" ".repeat(width));
    } else {
        // Unknown source duration: bounce a marker so the view still moves.
        let pos = (app.tick as usize) % width;
        for idx in 0..width {
            bar.push(if idx == pos { '>' } else { ' ' });
        }
    }

    bar.push(']');
    bar
}

fn render_history(app: &AppState, height: usize, width: usize) -> Paragraph<'static> {
    let max_lines = height.saturating_sub(2).max(1);
    let end = app.history.len().saturating_sub(app.scroll_offset);
    let start = end.saturating_sub(max_lines);
    let text_width = width.saturating_sub(2).max(1);
    let lines: Vec<Line> = app.history[start..end]
        .iter()
        .map(|line| Line::from(line.chars().take(text_width * 4).collect::<String>()))
        .collect();

    Paragraph::new(lines)
        .block(Block::default().title("Session").borders(Borders::ALL))
        .wrap(Wrap { trim: false })
}
