use crate::client::busy::StatusBusy;
use crate::client::chunks_map::{ChunksMap, InitError, NavError};
use crate::client::document::UNITS_PER_ROW;
use crate::client::keys::KeyController;
use crate::client::list_renderer::{ListRenderer, StatusInfo};
use crate::telemetry::PerfGuard;
use crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
        KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
    },
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use std::io::{self, IsTerminal, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, trace};

/// Rows moved per mouse wheel notch.
const WHEEL_ROWS: i64 = 3;

#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("terminal error: {0}")]
    Terminal(#[from] io::Error),
    #[error(transparent)]
    Init(#[from] InitError),
    #[error("initialization task failed: {0}")]
    InitTask(#[from] JoinError),
    #[error(transparent)]
    Navigation(#[from] NavError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

/// Owns the directory, the renderer and the terminal; runs the input loop.
pub struct TerminalClient {
    map: ChunksMap,
    busy: Arc<StatusBusy>,
    renderer: ListRenderer,
    render_enabled: bool,
    tui: Option<Terminal<CrosstermBackend<io::Stdout>>>,
    render_interval: Duration,
    settle_quiet: Duration,
    last_error: Option<String>,
}

impl TerminalClient {
    pub fn new(map: ChunksMap, busy: Arc<StatusBusy>) -> Self {
        let render_enabled = io::stdout().is_terminal();
        let rows = (map.viewport().height() / UNITS_PER_ROW) as u16 + 2;
        Self {
            map,
            busy,
            renderer: ListRenderer::new(rows),
            render_enabled,
            tui: None,
            render_interval: Duration::from_millis(16),
            settle_quiet: Duration::from_millis(20),
            last_error: None,
        }
    }

    pub fn with_render(mut self, enabled: bool) -> Self {
        self.render_enabled = enabled;
        self
    }

    pub fn with_settle_quiet(mut self, quiet: Duration) -> Self {
        self.settle_quiet = quiet;
        self
    }

    pub async fn run(mut self) -> Result<(), ClientError> {
        if !self.render_enabled {
            return self.run_headless().await;
        }
        self.setup_tui()?;
        let result = self.event_loop().await;
        let teardown = self.teardown_tui();
        result?;
        teardown
    }

    /// Loads the first segment, selects the first record and prints the
    /// window once.
    async fn run_headless(mut self) -> Result<(), ClientError> {
        self.map.init().await?;
        self.map.first().await?;
        self.refresh();
        let mut stdout = io::stdout();
        for line in self.renderer.visible_lines() {
            writeln!(stdout, "{}", line.trim_end())?;
        }
        stdout.flush()?;
        Ok(())
    }

    async fn event_loop(&mut self) -> Result<(), ClientError> {
        debug!(target = "pager::client", "client loop started");
        let mut settled = self.map.viewport().settle_events(self.settle_quiet);
        let (keys, mut nav_errors) = KeyController::spawn(self.map.clone());

        self.refresh();
        self.render()?;
        let mut init = self.spawn_init();
        let mut initializing = true;

        let mut tick = tokio::time::interval(self.render_interval);
        loop {
            tokio::select! {
                joined = &mut init, if initializing => {
                    initializing = false;
                    joined??;
                    debug!(target = "pager::client", "directory ready");
                }
                _ = tick.tick() => {
                    if self.pump_input(&keys)? == Flow::Quit {
                        break;
                    }
                    self.refresh();
                    if self.renderer.take_dirty() {
                        self.render()?;
                    }
                }
                Some(_) = settled.recv() => {
                    trace!(target = "pager::viewport", top = self.map.viewport().top(), "settled");
                    let map = self.map.clone();
                    tokio::spawn(async move { map.prefetch_visible().await });
                }
                Some(err) = nav_errors.recv() => {
                    self.last_error = Some(err.to_string());
                }
            }
        }
        if initializing {
            init.abort();
        }
        debug!(target = "pager::client", "client loop stopped");
        Ok(())
    }

    /// Loads the root segment off the event loop so ticks keep drawing the
    /// busy status and quit keys stay live while it is pending.
    fn spawn_init(&self) -> JoinHandle<Result<(), InitError>> {
        let map = self.map.clone();
        tokio::spawn(async move { map.init().await })
    }

    fn refresh(&mut self) {
        let viewport = self.map.viewport();
        let status = StatusInfo {
            segment: self.map.get_chunk_by_position(viewport.top()),
            segment_count: self.map.segment_count(),
            loaded: self.map.loaded_count(),
            busy: self.busy.is_active(),
            selected: self.map.selected(),
            message: self.last_error.clone(),
        };
        let rows = self.map.visible_rows(self.renderer.body_height());
        self.renderer.update(rows, status);
    }

    fn render(&mut self) -> Result<(), ClientError> {
        if let Some(tui) = &mut self.tui {
            let _guard = PerfGuard::new("client_render_tui");
            let renderer = &mut self.renderer;
            tui.draw(|frame| renderer.render_frame(frame))?;
        }
        Ok(())
    }

    fn pump_input(&mut self, keys: &KeyController) -> Result<Flow, ClientError> {
        while event::poll(Duration::from_millis(0))? {
            match event::read()? {
                Event::Key(key) if key.kind != KeyEventKind::Release => {
                    if is_quit(&key) {
                        return Ok(Flow::Quit);
                    }
                    if self.handle_scroll_key(&key) {
                        continue;
                    }
                    if keys.handle(&key) {
                        self.last_error = None;
                    }
                }
                Event::Mouse(mouse) => self.handle_mouse(mouse),
                Event::Resize(cols, rows) => self.on_resize(cols, rows),
                _ => {}
            }
        }
        Ok(Flow::Continue)
    }

    fn handle_scroll_key(&mut self, key: &KeyEvent) -> bool {
        if !key.modifiers.contains(KeyModifiers::CONTROL) {
            return false;
        }
        let viewport = self.map.viewport();
        let page = viewport.height() as i64;
        let delta = match key.code {
            KeyCode::Up => -(UNITS_PER_ROW as i64),
            KeyCode::Down => UNITS_PER_ROW as i64,
            KeyCode::PageUp => -page,
            KeyCode::PageDown => page,
            _ => return false,
        };
        viewport.user_scroll_by(delta);
        true
    }

    fn handle_mouse(&mut self, mouse: MouseEvent) {
        let viewport = self.map.viewport();
        match mouse.kind {
            MouseEventKind::ScrollUp => {
                viewport.user_scroll_by(-WHEEL_ROWS * UNITS_PER_ROW as i64)
            }
            MouseEventKind::ScrollDown => {
                viewport.user_scroll_by(WHEEL_ROWS * UNITS_PER_ROW as i64)
            }
            MouseEventKind::Down(MouseButton::Left)
                if (mouse.row as usize) < self.renderer.body_height() =>
            {
                let position = viewport.top() + mouse.row as u64 * UNITS_PER_ROW;
                self.map.select_at(position);
            }
            _ => {}
        }
    }

    fn on_resize(&mut self, cols: u16, rows: u16) {
        self.renderer.on_resize(cols, rows);
        let body = self.renderer.body_height() as u64;
        self.map.viewport().set_height(body * UNITS_PER_ROW);
        self.renderer.mark_dirty();
    }

    fn setup_tui(&mut self) -> Result<(), ClientError> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.hide_cursor().ok();
        if let Ok(area) = terminal.size() {
            self.on_resize(area.width, area.height);
        }
        self.tui = Some(terminal);
        Ok(())
    }

    fn teardown_tui(&mut self) -> Result<(), ClientError> {
        if let Some(mut terminal) = self.tui.take() {
            terminal.show_cursor().ok();
            terminal.clear()?;
        }
        disable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, DisableMouseCapture, LeaveAlternateScreen)?;
        Ok(())
    }
}

fn is_quit(key: &KeyEvent) -> bool {
    match key.code {
        KeyCode::Char(c) if key.modifiers.contains(KeyModifiers::CONTROL) => {
            c.eq_ignore_ascii_case(&'c')
        }
        KeyCode::Char(c) => c.eq_ignore_ascii_case(&'q'),
        KeyCode::Esc => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::chunks_map::MapOptions;
    use crate::client::document::Document;
    use crate::client::viewport::Viewport;
    use crate::source::MemoryChunkSource;

    #[test_timeout::tokio_timeout_test(10)]
    async fn status_shows_busy_while_the_root_segment_loads() {
        let memory = Arc::new(MemoryChunkSource::synthetic(3, 4));
        let gate = memory.gate(0);
        let busy = Arc::new(StatusBusy::new());
        let map = ChunksMap::new(
            memory.clone(),
            Box::new(Document::new()),
            Arc::new(Viewport::new(40)),
            busy.clone(),
            MapOptions {
                segment_count: 3,
                placeholder_extent: 500,
            },
        );
        let mut client = TerminalClient::new(map, busy).with_render(false);

        let init = client.spawn_init();
        while memory.requests(0) == 0 {
            tokio::task::yield_now().await;
        }
        client.refresh();
        assert!(client.renderer.status().busy);
        assert!(client.renderer.take_dirty());

        gate.notify_one();
        init.await.unwrap().unwrap();
        client.refresh();
        assert!(!client.renderer.status().busy);
        assert_eq!(client.renderer.status().loaded, 1);
    }

    #[test]
    fn quit_keys() {
        assert!(is_quit(&KeyEvent::new(KeyCode::Char('q'), KeyModifiers::NONE)));
        assert!(is_quit(&KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)));
        assert!(!is_quit(&KeyEvent::new(KeyCode::Char('c'), KeyModifiers::NONE)));
        assert!(!is_quit(&KeyEvent::new(KeyCode::Down, KeyModifiers::NONE)));
    }
}
