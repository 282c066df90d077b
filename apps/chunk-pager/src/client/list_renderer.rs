use crate::client::chunks_map::Selection;
use crate::client::document::RowView;
use ratatui::Frame;
use ratatui::buffer::Buffer;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Paragraph, Widget};

/// Everything the status line shows.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StatusInfo {
    pub segment: Option<usize>,
    pub segment_count: usize,
    pub loaded: usize,
    pub busy: bool,
    pub selected: Option<Selection>,
    pub message: Option<String>,
}

/// Draws the window rows produced by the document plus two lines of chrome.
pub struct ListRenderer {
    rows: Vec<RowView>,
    status: StatusInfo,
    body_height: usize,
    needs_redraw: bool,
}

impl ListRenderer {
    pub fn new(rows: u16) -> Self {
        let mut renderer = Self {
            rows: Vec::new(),
            status: StatusInfo::default(),
            body_height: 1,
            needs_redraw: true,
        };
        renderer.on_resize(0, rows);
        renderer
    }

    pub fn body_height(&self) -> usize {
        self.body_height
    }

    pub fn on_resize(&mut self, _cols: u16, rows: u16) {
        let usable = (rows.saturating_sub(2) as usize).max(1);
        if usable != self.body_height {
            self.body_height = usable;
            self.mark_dirty();
        }
    }

    pub fn update(&mut self, rows: Vec<RowView>, status: StatusInfo) {
        if rows != self.rows || status != self.status {
            self.rows = rows;
            self.status = status;
            self.mark_dirty();
        }
    }

    pub fn status(&self) -> &StatusInfo {
        &self.status
    }

    pub fn mark_dirty(&mut self) {
        self.needs_redraw = true;
    }

    pub fn take_dirty(&mut self) -> bool {
        let was_dirty = self.needs_redraw;
        self.needs_redraw = false;
        was_dirty
    }

    pub fn render_frame(&mut self, frame: &mut Frame<'_>) {
        let area = frame.area();
        let status_lines = if area.height >= 3 { 2 } else { 1 };
        let body_height = area.height.saturating_sub(status_lines as u16);

        let mut constraints = vec![Constraint::Length(body_height)];
        for _ in 0..status_lines {
            constraints.push(Constraint::Length(1));
        }
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints(constraints)
            .split(area);

        if body_height > 0 {
            frame.render_widget(self.render_body(), chunks[0]);
        }
        if chunks.len() >= 2 {
            frame.render_widget(self.render_status_line(), chunks[1]);
        }
        if status_lines > 1 && chunks.len() >= 3 {
            frame.render_widget(self.render_instructions(), chunks[2]);
        }
        self.needs_redraw = false;
    }

    /// Plain-text rendition of the body, used when no TUI is attached.
    pub fn visible_lines(&self) -> Vec<String> {
        self.rows
            .iter()
            .take(self.body_height)
            .map(|row| match row {
                RowView::Text { text, selected } => {
                    let marker = if *selected { '>' } else { ' ' };
                    format!("{marker} {text}")
                }
                RowView::Placeholder { .. } => "~".to_string(),
                RowView::Gap | RowView::Blank => String::new(),
            })
            .collect()
    }

    fn render_body(&self) -> ListBodyWidget {
        let lines = self
            .rows
            .iter()
            .take(self.body_height)
            .map(line_for_row)
            .collect();
        ListBodyWidget { lines }
    }

    fn render_status_line(&self) -> Paragraph<'_> {
        let status = &self.status;
        let segment = status
            .segment
            .map(|idx| idx.to_string())
            .unwrap_or_else(|| "-".into());
        let selected = status
            .selected
            .map(|sel| format!("{}:{}", sel.chunk, sel.row))
            .unwrap_or_else(|| "none".into());
        let busy = if status.busy { " • loading…" } else { "" };
        let mut text = format!(
            "segment {segment}/{} • loaded {} • selected {selected}{busy}",
            status.segment_count, status.loaded
        );
        if let Some(message) = &status.message {
            text.push_str(" • ");
            text.push_str(message);
        }
        let style = if status.message.is_some() {
            Style::default().fg(Color::Red)
        } else {
            Style::default()
        };
        Paragraph::new(text).style(style).block(Block::default())
    }

    fn render_instructions(&self) -> Paragraph<'_> {
        let text = "↑/↓ record • PgUp/PgDn page • Home/End ends • ctrl+↑/↓ scroll • q quit";
        Paragraph::new(text)
            .style(Style::default().add_modifier(Modifier::DIM))
            .block(Block::default())
    }
}

fn line_for_row(row: &RowView) -> Line<'static> {
    match row {
        RowView::Text { text, selected } => {
            let style = if *selected {
                Style::default()
                    .fg(Color::Black)
                    .bg(Color::Cyan)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            Line::from(Span::styled(format!(" {text}"), style))
        }
        RowView::Placeholder { segment } => Line::from(Span::styled(
            format!(" ⋯ segment {segment}"),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::DIM),
        )),
        RowView::Gap | RowView::Blank => Line::default(),
    }
}

struct ListBodyWidget {
    lines: Vec<Line<'static>>,
}

impl Widget for ListBodyWidget {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let max_rows = area.height as usize;
        let blank = Line::from(" ".repeat(area.width as usize));
        for row in 0..max_rows {
            let line = self.lines.get(row).unwrap_or(&blank);
            buf.set_line(area.x, area.y + row as u16, line, area.width);
        }
    }
}
