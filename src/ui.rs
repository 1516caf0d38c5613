//! Terminal projection of the composer state. Drawing is immediate-mode and
//! idempotent: every call rebuilds the panels from state, so redundant
//! redraws are safe and nothing accumulates between frames. The renderer
//! never mutates the composer; mouse routing reuses the same pure layout
//! math so hit-testing cannot drift from what was drawn.

use crate::composer::Composer;
use crate::keys;
use crate::pattern::Segment;
use crate::textwin::{display_width, prefix_width, window_by_columns};
use crate::types::TypeRegistry;
use anyhow::Result;
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers,
};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, List, ListItem, Paragraph},
    Frame, Terminal,
};
use serde::Deserialize;
use std::io;
use std::time::Duration;

/// Cosmetic palette. The style endpoint may override any entry; a missing or
/// failing endpoint leaves these defaults in place.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Theme {
    pub border: [u8; 3],
    pub title: [u8; 3],
    pub dim: [u8; 3],
    pub text: [u8; 3],
    pub input: [u8; 3],
    pub entity: [u8; 3],
    pub error: [u8; 3],
    pub highlight: [u8; 3],
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            border: [90, 140, 255],
            title: [110, 160, 255],
            dim: [70, 90, 130],
            text: [210, 205, 200],
            input: [255, 220, 100],
            entity: [130, 220, 170],
            error: [255, 90, 90],
            highlight: [45, 60, 95],
        }
    }
}

impl Theme {
    fn color(rgb: [u8; 3]) -> Color {
        Color::Rgb(rgb[0], rgb[1], rgb[2])
    }
}

/// Screen geometry shared between drawing and mouse hit-testing. All rects
/// are the inner (borderless) areas; `pattern_rows` is how many result rows
/// are actually visible.
pub struct Regions {
    pub question: Rect,
    pub status: Rect,
    pub pattern_list: Rect,
    pub pattern_rows: usize,
}

impl Regions {
    /// Which visible pattern row, if any, a terminal cell falls on.
    pub fn pattern_row_at(&self, column: u16, row: u16) -> Option<usize> {
        let area = self.pattern_list;
        if self.pattern_rows == 0
            || column < area.x
            || column >= area.x.saturating_add(area.width)
            || row < area.y
            || row >= area.y.saturating_add(area.height)
        {
            return None;
        }
        let index = (row - area.y) as usize;
        (index < self.pattern_rows).then_some(index)
    }
}

fn layout_chunks(area: Rect) -> [Rect; 3] {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(1),
            Constraint::Min(0),
        ])
        .split(area);
    [chunks[0], chunks[1], chunks[2]]
}

fn inner(rect: Rect) -> Rect {
    Rect {
        x: rect.x.saturating_add(1),
        y: rect.y.saturating_add(1),
        width: rect.width.saturating_sub(2),
        height: rect.height.saturating_sub(2),
    }
}

/// Pure layout pass used by both `draw` and mouse routing.
pub fn compute_regions(area: Rect, composer: &Composer) -> Regions {
    let [question, status, list] = layout_chunks(area);
    let list_inner = inner(list);
    let pattern_rows = if composer.is_pattern_list() {
        composer
            .pattern_results()
            .map(|results| results.len())
            .unwrap_or(0)
            .min(list_inner.height as usize)
    } else {
        0
    };
    Regions {
        question: inner(question),
        status,
        pattern_list: list_inner,
        pattern_rows,
    }
}

/// Horizontal scroll offset that keeps the caret within the central viewport
/// without ever scrolling past either edge.
fn scroll_offset(caret_col: usize, total_cols: usize, view_cols: usize) -> usize {
    if view_cols == 0 || total_cols <= view_cols {
        return 0;
    }
    let centered = caret_col.saturating_sub(view_cols / 2);
    centered.min(total_cols - view_cols)
}

/// Project the segment list into styled spans plus caret and total widths in
/// columns. Entity inputs are sized to their live content plus one pending
/// column so the layout does not jitter while the user types.
fn segment_spans(
    segments: &[Segment],
    active: Option<usize>,
    cursor: usize,
    theme: &Theme,
) -> (Vec<(String, Style)>, usize, usize) {
    let mut spans = Vec::new();
    let mut total = 0;
    let mut caret = None;

    for (index, segment) in segments.iter().enumerate() {
        match segment {
            Segment::Text(text) => {
                if !text.is_empty() {
                    spans.push((text.clone(), Style::default().fg(Theme::color(theme.text))));
                    total += display_width(text);
                }
            }
            Segment::Entity { ty, value } => {
                let width = display_width(value) + 1;
                let is_active = active == Some(index);
                if is_active {
                    caret = Some(total + prefix_width(value, cursor));
                }
                let color = if !value.is_empty() && !ty.validates(value) {
                    Theme::color(theme.error)
                } else {
                    Theme::color(theme.input)
                };
                let mut style = Style::default().fg(color).add_modifier(Modifier::UNDERLINED);
                if is_active {
                    style = style.add_modifier(Modifier::BOLD);
                }
                let mut shown = value.clone();
                for _ in display_width(value)..width {
                    shown.push(' ');
                }
                spans.push((shown, style));
                total += width;
            }
        }
    }

    (spans, caret.unwrap_or(total), total)
}

/// Window styled spans to a column range, excluding straddling glyphs whole.
fn window_spans(spans: &[(String, Style)], start_cols: usize, width_cols: usize) -> Vec<Span<'_>> {
    let mut out = Vec::new();
    let mut to_skip = start_cols;
    let mut remaining = width_cols;
    for (text, style) in spans {
        if remaining == 0 {
            break;
        }
        let width = display_width(text);
        if to_skip >= width {
            to_skip -= width;
            continue;
        }
        let visible = window_by_columns(text, to_skip, remaining);
        to_skip = 0;
        remaining -= display_width(visible).min(remaining);
        if !visible.is_empty() {
            out.push(Span::styled(visible, *style));
        }
    }
    out
}

/// Render one pattern row with entity blanks replaced by their type labels.
fn pattern_line(pattern: &str, registry: &TypeRegistry, theme: &Theme) -> Line<'static> {
    let mut spans = Vec::new();
    for segment in crate::pattern::parse_pattern(pattern, registry) {
        match segment {
            Segment::Text(text) => {
                if !text.is_empty() {
                    spans.push(Span::styled(
                        text,
                        Style::default().fg(Theme::color(theme.text)),
                    ));
                }
            }
            Segment::Entity { ty, .. } => {
                spans.push(Span::styled(
                    ty.display_name,
                    Style::default()
                        .fg(Theme::color(theme.entity))
                        .add_modifier(Modifier::BOLD),
                ));
            }
        }
    }
    Line::from(spans)
}

fn bordered_block<'a>(title: &'a str, theme: &Theme) -> Block<'a> {
    Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(Theme::color(theme.border)))
        .title(Span::styled(
            title,
            Style::default()
                .fg(Theme::color(theme.title))
                .add_modifier(Modifier::BOLD),
        ))
}

/// Project the composer onto the frame: question editor or base input,
/// status row, pattern list, entity list.
pub fn draw(frame: &mut Frame<'_>, composer: &Composer) {
    let theme = composer.theme();
    let [question_area, status_area, list_area] = layout_chunks(frame.size());
    let question_inner = inner(question_area);
    let view_cols = question_inner.width as usize;

    let hint = if composer.is_pattern_locked() {
        " Tab next blank  Esc cancel "
    } else {
        " type to search patterns "
    };
    let question_block = bordered_block(" Question ", theme).title_bottom(Line::from(
        Span::styled(hint, Style::default().fg(Theme::color(theme.dim))),
    ));

    if composer.is_pattern_locked() {
        // Segment editor: static labels plus bounded-width entity inputs.
        let (spans, caret_col, total_cols) = segment_spans(
            composer.segments(),
            composer.active_entity(),
            composer.entity_cursor(),
            theme,
        );
        let offset = scroll_offset(caret_col, total_cols, view_cols);
        let visible = window_spans(&spans, offset, view_cols);
        let editor = Paragraph::new(Line::from(visible)).block(question_block);
        frame.render_widget(editor, question_area);

        let caret_x = (caret_col - offset).min(view_cols) as u16;
        frame.set_cursor(question_inner.x.saturating_add(caret_x), question_inner.y);
    } else {
        // Base input, caret after the last character; long text shows its
        // tail so the caret stays visible.
        let text = composer.raw_text();
        let text_cols = display_width(text);
        let start = text_cols.saturating_sub(view_cols);
        let visible = window_by_columns(text, start, view_cols);
        let input = Paragraph::new(visible)
            .style(Style::default().fg(Theme::color(theme.input)))
            .block(question_block);
        frame.render_widget(input, question_area);

        let caret_x = text_cols.min(view_cols) as u16;
        frame.set_cursor(question_inner.x.saturating_add(caret_x), question_inner.y);
    }

    // Status row: visible only while a lookup is inflight.
    if composer.is_loading() {
        let status = Paragraph::new(format!(" {} looking up...", composer.spinner_frame()))
            .style(Style::default().fg(Theme::color(theme.dim)));
        frame.render_widget(status, status_area);
    }

    if composer.is_pattern_list() {
        let results = composer.pattern_results().unwrap_or_default();
        let items: Vec<ListItem<'_>> = results
            .iter()
            .enumerate()
            .map(|(index, pattern)| {
                let item = ListItem::new(pattern_line(pattern, composer.registry(), theme));
                if composer.highlighted() == Some(index) {
                    item.style(
                        Style::default()
                            .bg(Theme::color(theme.highlight))
                            .add_modifier(Modifier::BOLD),
                    )
                } else {
                    item
                }
            })
            .collect();
        let list = List::new(items).block(bordered_block(" Patterns ", theme));
        frame.render_widget(list, list_area);
    } else if composer.is_entity_list() {
        // Entity autocomplete surface; unreachable until the extension point
        // starts issuing entity searches.
        let hits = composer.entity_results().unwrap_or_default();
        let items: Vec<ListItem<'_>> = hits
            .iter()
            .map(|hit| {
                let label = hit.display_name.clone().unwrap_or_else(|| hit.value.clone());
                ListItem::new(Line::from(Span::styled(
                    label,
                    Style::default().fg(Theme::color(theme.entity)),
                )))
            })
            .collect();
        let list = List::new(items).block(bordered_block(" Entities ", theme));
        frame.render_widget(list, list_area);
    }
}

/// Restore the terminal even when the loop exits through an error.
struct TerminalRestore;

impl Drop for TerminalRestore {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), DisableMouseCapture, LeaveAlternateScreen);
    }
}

fn is_quit_key(key: KeyEvent) -> bool {
    key.modifiers.contains(KeyModifiers::CONTROL)
        && matches!(key.code, KeyCode::Char('c') | KeyCode::Char('q'))
}

/// Configure the terminal, run the event loop, and tear everything down.
pub fn run_app(composer: &mut Composer) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let restore = TerminalRestore;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    composer.mount();
    let result = app_loop(&mut terminal, composer);

    drop(terminal);
    drop(restore);
    result
}

/// Core poll/event/draw loop. Runs each handler to completion; lookups
/// resolve between events via `poll_jobs`.
fn app_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    composer: &mut Composer,
) -> Result<()> {
    terminal.draw(|frame| draw(frame, composer))?;

    loop {
        composer.poll_jobs();

        let loading = composer.is_loading();
        if loading {
            composer.update_spinner();
        }
        let poll_duration = if loading {
            Duration::from_millis(50)
        } else {
            Duration::from_millis(100)
        };

        let mut should_draw = composer.take_redraw_request() || loading;
        let mut should_quit = false;

        if event::poll(poll_duration)? {
            match event::read()? {
                Event::Key(key) => {
                    if key.kind != KeyEventKind::Release {
                        if is_quit_key(key) {
                            should_quit = true;
                        } else {
                            keys::handle_key(composer, key);
                        }
                    }
                    should_draw = true;
                }
                Event::Mouse(mouse) => {
                    let regions = compute_regions(terminal.size()?, composer);
                    keys::route_mouse(composer, mouse, &regions);
                    should_draw = true;
                }
                Event::Resize(_, _) => should_draw = true,
                _ => {}
            }
        }

        if should_draw {
            terminal.draw(|frame| draw(frame, composer))?;
        }

        if should_quit {
            break;
        }
    }
    Ok(())
}
