use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use grain_ledger::{bin_status, BinStatus, FarmSession, FarmSummary, LedgerEntry};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Gauge, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Dashboard,
    BinStatus,
    Records,
}

impl Page {
    pub fn next(&self) -> Self {
        match self {
            Page::Dashboard => Page::BinStatus,
            Page::BinStatus => Page::Records,
            Page::Records => Page::Dashboard,
        }
    }

    pub fn previous(&self) -> Self {
        match self {
            Page::Dashboard => Page::Records,
            Page::BinStatus => Page::Dashboard,
            Page::Records => Page::BinStatus,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Page::Dashboard => "Dashboard",
            Page::BinStatus => "Bin Status",
            Page::Records => "Records",
        }
    }
}

pub struct App {
    session: FarmSession,
    pub current_page: Page,
    pub bins_state: TableState,
    pub records_state: TableState,
    pub message: Option<String>,
}

impl App {
    pub fn new(session: FarmSession) -> Self {
        let mut bins_state = TableState::default();
        if !session.registry().is_empty() {
            bins_state.select(Some(0));
        }

        let mut records_state = TableState::default();
        if !session.log().is_empty() {
            records_state.select(Some(0));
        }

        Self {
            session,
            current_page: Page::Dashboard,
            bins_state,
            records_state,
            message: None,
        }
    }

    pub fn into_session(self) -> FarmSession {
        self.session
    }

    pub fn next_page(&mut self) {
        self.current_page = self.current_page.next();
    }

    pub fn previous_page(&mut self) {
        self.current_page = self.current_page.previous();
    }

    pub fn reload(&mut self) {
        self.message = Some(match self.session.reload() {
            Ok(()) => format!("Reloaded {} bins", self.session.registry().len()),
            Err(e) => format!("Reload failed: {}", e),
        });
        self.clamp_selection();
    }

    fn clamp_selection(&mut self) {
        let bins = self.session.registry().len();
        let records = self.session.log().len();
        clamp(&mut self.bins_state, bins);
        clamp(&mut self.records_state, records);
    }

    /// Records newest first
    pub fn records(&self) -> Vec<LedgerEntry<'_>> {
        let mut entries = self.session.log().entries();
        entries.reverse();
        entries
    }

    fn active_len(&self) -> usize {
        match self.current_page {
            Page::Dashboard => 0,
            Page::BinStatus => self.session.registry().len(),
            Page::Records => self.session.log().len(),
        }
    }

    fn active_state(&mut self) -> &mut TableState {
        match self.current_page {
            Page::Records => &mut self.records_state,
            _ => &mut self.bins_state,
        }
    }

    pub fn next(&mut self) {
        let len = self.active_len();
        if len == 0 {
            return;
        }
        let state = self.active_state();
        let i = match state.selected() {
            Some(i) if i >= len - 1 => 0,
            Some(i) => i + 1,
            None => 0,
        };
        state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let len = self.active_len();
        if len == 0 {
            return;
        }
        let state = self.active_state();
        let i = match state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        state.select(Some(i));
    }
}

fn clamp(state: &mut TableState, len: usize) {
    match state.selected() {
        _ if len == 0 => state.select(None),
        Some(i) if i >= len => state.select(Some(len - 1)),
        None => state.select(Some(0)),
        _ => {}
    }
}

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the app
    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("Error: {:?}", err);
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Tab => {
                    if key.modifiers.contains(KeyModifiers::SHIFT) {
                        app.previous_page();
                    } else {
                        app.next_page();
                    }
                }
                KeyCode::BackTab => app.previous_page(),
                KeyCode::Char('r') => app.reload(),
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header with navigation
            Constraint::Min(0),    // Content area
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    match app.current_page {
        Page::Dashboard => render_dashboard(f, chunks[1], app),
        Page::BinStatus => render_bins(f, chunks[1], app),
        Page::Records => render_records(f, chunks[1], app),
    }

    render_status_bar(f, chunks[2], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let summary = FarmSummary::from_registry(app.session.registry());

    let mut tab_spans = vec![Span::styled(
        "🌾 ",
        Style::default().fg(Color::Yellow),
    )];
    for (i, page) in [Page::Dashboard, Page::BinStatus, Page::Records].iter().enumerate() {
        if i > 0 {
            tab_spans.push(Span::raw(" │ "));
        }

        let style = if *page == app.current_page {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };

        tab_spans.push(Span::styled(page.title().to_string(), style));
    }

    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(
        format!("{} bins", summary.bin_count),
        Style::default().fg(Color::White),
    ));
    tab_spans.push(Span::raw("  "));
    tab_spans.push(Span::styled(
        format!("{:.0} bu stored", summary.total_in_bins),
        Style::default().fg(Color::Green),
    ));

    let header = Paragraph::new(vec![Line::from(tab_spans)])
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));

    f.render_widget(header, area);
}

fn render_dashboard(f: &mut Frame, area: Rect, app: &App) {
    let summary = FarmSummary::from_registry(app.session.registry());

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)])
        .split(area);

    let ratio = if summary.total_capacity > 0.0 {
        (summary.total_in_bins / summary.total_capacity).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title(" Farm Fill "))
        .gauge_style(Style::default().fg(Color::Green))
        .ratio(ratio)
        .label(format!(
            "{:.0} / {:.0} bu",
            summary.total_in_bins, summary.total_capacity
        ));
    f.render_widget(gauge, chunks[0]);

    let header = Row::new(
        ["Variety", "Bushels", "Bins"]
            .iter()
            .map(|h| Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))),
    )
    .style(Style::default().bg(Color::DarkGray));

    let rows = summary.by_variety.iter().map(|v| {
        Row::new(vec![
            Cell::from(v.variety.clone()),
            Cell::from(format!("{:.0}", v.bushels)),
            Cell::from(v.bins.to_string()),
        ])
    });

    let title = if summary.by_variety.is_empty() {
        " Grain by Variety (no grain in bins yet) "
    } else {
        " Grain by Variety "
    };

    let table = Table::new(
        rows,
        [
            Constraint::Length(24),
            Constraint::Length(14),
            Constraint::Length(6),
        ],
    )
    .header(header)
    .block(Block::default().borders(Borders::ALL).title(title));

    f.render_widget(table, chunks[1]);
}

fn fill_color(status: &BinStatus) -> Color {
    if status.over_capacity {
        return Color::Magenta;
    }
    match status.remaining {
        None => Color::Cyan,
        Some(r) if r <= 0.0 => Color::Red,
        Some(_) if status.percent_full >= 90.0 => Color::Yellow,
        Some(_) => Color::Green,
    }
}

fn render_bins(f: &mut Frame, area: Rect, app: &mut App) {
    let header = Row::new(
        ["Bin", "Variety", "Capacity (bu)", "In Bin (bu)", "Remaining (bu)", "Full"]
            .iter()
            .map(|h| Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))),
    )
    .style(Style::default().bg(Color::DarkGray))
    .height(1);

    let rows: Vec<Row> = bin_status(app.session.registry())
        .iter()
        .map(|s| {
            let color = fill_color(s);
            Row::new(vec![
                Cell::from(s.bin.clone()),
                Cell::from(s.variety.clone()),
                Cell::from(format!("{:.0}", s.capacity)),
                Cell::from(format!("{:.0}", s.in_bin)).style(Style::default().fg(color)),
                Cell::from(
                    s.remaining
                        .map(|r| format!("{:.0}", r))
                        .unwrap_or_else(|| "uncapped".to_string()),
                ),
                Cell::from(format!("{:.0}%", s.percent_full)).style(Style::default().fg(color)),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(14),
            Constraint::Length(16),
            Constraint::Length(14),
            Constraint::Length(12),
            Constraint::Length(15),
            Constraint::Length(6),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(" Current Bin Status "),
    )
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.bins_state);
}

fn render_records(f: &mut Frame, area: Rect, app: &mut App) {
    let header = Row::new(
        ["Timestamp", "Kind", "Bin", "Variety", "Bushels", "Truck / Destination", "Notes"]
            .iter()
            .map(|h| Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))),
    )
    .style(Style::default().bg(Color::DarkGray))
    .height(1);

    let rows: Vec<Row> = app
        .records()
        .into_iter()
        .map(|entry| {
            let (color, party, notes) = match entry {
                LedgerEntry::Delivery(d) => (Color::Green, d.truck.clone(), d.notes.clone()),
                LedgerEntry::Unload(u) => (Color::Red, u.destination.clone(), u.notes.clone()),
            };
            Row::new(vec![
                Cell::from(entry.timestamp().to_string()),
                Cell::from(entry.kind()).style(Style::default().fg(color)),
                Cell::from(entry.bin().to_string()),
                Cell::from(entry.variety().to_string()),
                Cell::from(format!("{:.0}", entry.quantity_accepted())).style(Style::default().fg(color)),
                Cell::from(truncate(&party, 20)),
                Cell::from(truncate(&notes, 30)),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(20),
            Constraint::Length(9),
            Constraint::Length(12),
            Constraint::Length(14),
            Constraint::Length(10),
            Constraint::Length(22),
            Constraint::Min(10),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(" Deliveries & Unloads "),
    )
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.records_state);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let mut status_spans = vec![Span::styled(
        format!(" {} ", app.session.store_description()),
        Style::default().fg(Color::Cyan),
    )];

    if let Some(message) = &app.message {
        status_spans.push(Span::raw(" | "));
        status_spans.push(Span::styled(message.clone(), Style::default().fg(Color::Green)));
    }

    status_spans.push(Span::raw(" | "));
    status_spans.push(Span::styled("Tab", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Page | "));
    status_spans.push(Span::styled("↑/↓", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Nav | "));
    status_spans.push(Span::styled("r", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Reload | "));
    status_spans.push(Span::styled("q", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Quit"));

    let status = Paragraph::new(Line::from(status_spans))
        .block(Block::default().borders(Borders::ALL));

    f.render_widget(status, area);
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
