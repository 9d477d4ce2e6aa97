use anyhow::Result;
use chrono::Local;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use nomina_report::{
    suggested_file_name, ConnectionStatus, Debouncer, Notice, NoticeLevel, PendingQuery,
    QueryOutcome, QueryState, ReportKind, Session, Table as DataTable, INDEX_COLUMNS,
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, List, ListItem, ListState, Paragraph, Row, Table, TableState, Wrap},
    Frame, Terminal,
};
use std::collections::VecDeque;
use std::io;
use std::path::PathBuf;
use std::time::{Duration, Instant};

const IDLE_POLL: Duration = Duration::from_millis(250);
const PAGE: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Browse,
    ExportPrompt(String),
}

pub struct App {
    pub session: Session,
    pub report: ReportKind,
    pub measure_index: usize,
    pub group_input: String,
    pub suggestions: Vec<String>,
    pub dropdown_open: bool,
    pub dropdown_state: ListState,
    pub debounce: Debouncer,
    pub table: DataTable,
    pub state: TableState,
    pub column_offset: usize,
    pub mode: Mode,
    pub notices: VecDeque<Notice>,
    pub status: ConnectionStatus,
}

impl App {
    pub fn new(mut session: Session) -> Self {
        let status = session.initialize();
        let suggestions = session.catalog().list_groups();
        let notices = session.take_notices().into();

        Self {
            session,
            report: ReportKind::Perceptions,
            measure_index: 0,
            group_input: String::new(),
            suggestions,
            dropdown_open: false,
            dropdown_state: ListState::default(),
            debounce: Debouncer::default(),
            table: DataTable::empty(),
            state: TableState::default(),
            column_offset: 0,
            mode: Mode::Browse,
            notices,
            status,
        }
    }

    pub fn measure(&self) -> &str {
        let measures = &self.session.report(self.report).measures;
        measures
            .get(self.measure_index)
            .map(String::as_str)
            .unwrap_or_else(|| self.session.report(self.report).default_measure())
    }

    pub fn toggle_report(&mut self) {
        self.report = self.report.next();
        self.measure_index = 0;
    }

    pub fn cycle_measure(&mut self) {
        let count = self.session.report(self.report).measures.len().max(1);
        self.measure_index = (self.measure_index + 1) % count;
    }

    // ------------------------------------------------------------------------
    // Group input & dropdown
    // ------------------------------------------------------------------------

    pub fn on_char(&mut self, c: char, now: Instant) {
        self.group_input.push(c);
        self.refresh_suggestions(now);
    }

    pub fn on_backspace(&mut self, now: Instant) {
        self.group_input.pop();
        self.refresh_suggestions(now);
    }

    /// Re-filter the groups and restart the dropdown timer.
    fn refresh_suggestions(&mut self, now: Instant) {
        self.debounce.cancel();
        self.dropdown_open = false;
        self.suggestions = self.session.catalog().filter_groups(&self.group_input);
        self.dropdown_state.select(None);

        if !self.group_input.trim().is_empty() && !self.suggestions.is_empty() {
            self.debounce.schedule(now);
        }
    }

    /// Poll timers; opens the dropdown once the typing pause has elapsed.
    pub fn tick(&mut self, now: Instant) {
        if self.debounce.fire(now) && !self.suggestions.is_empty() {
            self.dropdown_open = true;
            self.dropdown_state.select(Some(0));
        }
    }

    pub fn next_suggestion(&mut self) {
        let len = self.suggestions.len();
        if len == 0 {
            return;
        }
        let i = match self.dropdown_state.selected() {
            Some(i) if i + 1 < len => i + 1,
            Some(_) => 0,
            None => 0,
        };
        self.dropdown_state.select(Some(i));
    }

    pub fn previous_suggestion(&mut self) {
        let len = self.suggestions.len();
        if len == 0 {
            return;
        }
        let i = match self.dropdown_state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        self.dropdown_state.select(Some(i));
    }

    /// Copy the highlighted suggestion into the input and close the dropdown.
    pub fn accept_suggestion(&mut self) {
        if self.dropdown_open {
            if let Some(group) = self
                .dropdown_state
                .selected()
                .and_then(|i| self.suggestions.get(i))
            {
                self.group_input = group.clone();
            }
        }
        self.close_dropdown();
    }

    pub fn close_dropdown(&mut self) {
        self.dropdown_open = false;
        self.debounce.cancel();
    }

    // ------------------------------------------------------------------------
    // Query & export
    // ------------------------------------------------------------------------

    /// Validate and enter the querying state. The caller draws before
    /// calling [`App::finish_query`].
    pub fn begin_query(&mut self) -> Option<PendingQuery> {
        self.accept_suggestion();
        let measure = self.measure().to_string();
        let pending = self
            .session
            .start_query(self.report, &self.group_input, &measure);
        self.pull_notices();
        pending
    }

    pub fn finish_query(&mut self, pending: PendingQuery) -> QueryOutcome {
        let outcome = self.session.complete_query(pending);
        self.table = self.session.current().to_table();
        self.column_offset = 0;
        self.state
            .select(if self.table.is_empty() { None } else { Some(0) });
        self.pull_notices();
        outcome
    }

    pub fn is_querying(&self) -> bool {
        self.session.state() == QueryState::Querying
    }

    pub fn open_export_prompt(&mut self) {
        if !self.session.has_data() {
            self.notices.push_back(Notice::new(
                NoticeLevel::Warning,
                "Warning",
                "There is no data to export.",
            ));
            return;
        }
        let name = suggested_file_name(
            self.report.title(),
            &self.group_input,
            Local::now().naive_local(),
        );
        self.mode = Mode::ExportPrompt(name);
    }

    pub fn confirm_export(&mut self) {
        if let Mode::ExportPrompt(path) = std::mem::replace(&mut self.mode, Mode::Browse) {
            let path = path.trim();
            if !path.is_empty() {
                self.session.export(&PathBuf::from(path));
                self.pull_notices();
            }
        }
    }

    pub fn reconnect(&mut self) {
        self.status = self.session.initialize();
        self.suggestions = self.session.catalog().filter_groups(&self.group_input);
        self.pull_notices();
    }

    fn pull_notices(&mut self) {
        self.notices.extend(self.session.take_notices());
    }

    // ------------------------------------------------------------------------
    // Result navigation
    // ------------------------------------------------------------------------

    pub fn next(&mut self) {
        let len = self.table.len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(i) => {
                if i >= len - 1 {
                    0
                } else {
                    i + 1
                }
            }
            None => 0,
        };
        self.state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let len = self.table.len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(i) => {
                if i == 0 {
                    len - 1
                } else {
                    i - 1
                }
            }
            None => 0,
        };
        self.state.select(Some(i));
    }

    pub fn page_down(&mut self) {
        let len = self.table.len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(i) => (i + PAGE).min(len - 1),
            None => 0,
        };
        self.state.select(Some(i));
    }

    pub fn page_up(&mut self) {
        if self.table.is_empty() {
            return;
        }
        let i = match self.state.selected() {
            Some(i) => i.saturating_sub(PAGE),
            None => 0,
        };
        self.state.select(Some(i));
    }

    /// Scroll the category columns; index columns stay in place.
    pub fn scroll_columns(&mut self, forward: bool) {
        let scrollable = self.table.columns.len().saturating_sub(INDEX_COLUMNS.len());
        if forward {
            if self.column_offset + 1 < scrollable {
                self.column_offset += 1;
            }
        } else {
            self.column_offset = self.column_offset.saturating_sub(1);
        }
    }

    fn visible_columns(&self) -> Vec<usize> {
        let index = INDEX_COLUMNS.len().min(self.table.columns.len());
        (0..index)
            .chain((index + self.column_offset)..self.table.columns.len())
            .collect()
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

    app.session.shutdown();

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

        let timeout = app
            .debounce
            .time_until(Instant::now())
            .unwrap_or(IDLE_POLL);

        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press && !handle_key(terminal, app, key)? {
                    return Ok(());
                }
            }
        }

        app.tick(Instant::now());
    }
}

/// Returns false when the app should exit.
fn handle_key<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    key: KeyEvent,
) -> io::Result<bool> {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Ok(false);
    }

    // Notices are modal: any key dismisses the front one
    if app.notices.pop_front().is_some() {
        return Ok(true);
    }

    if matches!(app.mode, Mode::ExportPrompt(_)) {
        match key.code {
            KeyCode::Enter => app.confirm_export(),
            KeyCode::Esc => app.mode = Mode::Browse,
            code => {
                if let Mode::ExportPrompt(path) = &mut app.mode {
                    match code {
                        KeyCode::Backspace => {
                            path.pop();
                        }
                        KeyCode::Char(c) => path.push(c),
                        _ => {}
                    }
                }
            }
        }
        return Ok(true);
    }

    let now = Instant::now();
    match key.code {
        KeyCode::Esc => {
            if app.dropdown_open {
                app.close_dropdown();
            } else {
                return Ok(false);
            }
        }
        KeyCode::Enter | KeyCode::F(5) => {
            if !app.is_querying() {
                if let Some(pending) = app.begin_query() {
                    // Show the querying state before blocking on the database
                    terminal.draw(|f| ui(f, app))?;
                    app.finish_query(pending);
                }
            }
        }
        KeyCode::F(2) => app.toggle_report(),
        KeyCode::F(3) => app.cycle_measure(),
        KeyCode::F(4) => app.reconnect(),
        KeyCode::F(6) => app.open_export_prompt(),
        KeyCode::Down if app.dropdown_open => app.next_suggestion(),
        KeyCode::Up if app.dropdown_open => app.previous_suggestion(),
        KeyCode::Down => app.next(),
        KeyCode::Up => app.previous(),
        KeyCode::PageDown => app.page_down(),
        KeyCode::PageUp => app.page_up(),
        KeyCode::Home => {
            if !app.table.is_empty() {
                app.state.select(Some(0));
            }
        }
        KeyCode::End => {
            if !app.table.is_empty() {
                app.state.select(Some(app.table.len() - 1));
            }
        }
        KeyCode::Right => app.scroll_columns(true),
        KeyCode::Left => app.scroll_columns(false),
        KeyCode::Backspace => app.on_backspace(now),
        KeyCode::Char(c) => app.on_char(c, now),
        _ => {}
    }

    Ok(true)
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Status, report and measure
            Constraint::Length(3), // Group input
            Constraint::Min(0),    // Results
            Constraint::Length(3), // Key help
        ])
        .split(f.size());

    render_header(f, chunks[0], app);
    render_group_input(f, chunks[1], app);
    render_table(f, chunks[2], app);
    render_status_bar(f, chunks[3], app);

    if app.dropdown_open {
        render_dropdown(f, chunks[1], chunks[2], app);
    }
    if let Mode::ExportPrompt(path) = &app.mode {
        render_export_prompt(f, path);
    }
    if let Some(notice) = app.notices.front() {
        render_notice(f, notice);
    }
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let (status_text, status_color) = match app.status {
        ConnectionStatus::Connected => ("Connected to database, catalog OK", Color::Green),
        ConnectionStatus::ConnectedCatalogError => ("Connected (catalog error)", Color::Yellow),
        ConnectionStatus::Disconnected => ("DATABASE CONNECTION ERROR", Color::Red),
    };

    let mut spans = vec![
        Span::styled(
            format!("Status: {}", status_text),
            Style::default().fg(status_color),
        ),
        Span::raw("  │  "),
        Span::styled("Report: ", Style::default().fg(Color::DarkGray)),
        Span::styled(
            app.report.title(),
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw("  │  "),
        Span::styled("Measure: ", Style::default().fg(Color::DarkGray)),
        Span::styled(app.measure().to_string(), Style::default().fg(Color::Cyan)),
    ];

    if app.is_querying() {
        spans.push(Span::raw("  │  "));
        spans.push(Span::styled(
            "Querying...",
            Style::default()
                .fg(Color::Magenta)
                .add_modifier(Modifier::BOLD),
        ));
    }

    let header = Paragraph::new(vec![Line::from(spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );

    f.render_widget(header, area);
}

fn render_group_input(f: &mut Frame, area: Rect, app: &App) {
    let line = if app.status == ConnectionStatus::ConnectedCatalogError {
        Line::from(Span::styled(
            "Error: check the catalog spreadsheet",
            Style::default().fg(Color::Yellow),
        ))
    } else {
        Line::from(vec![
            Span::raw(app.group_input.clone()),
            Span::styled("█", Style::default().fg(Color::DarkGray)),
        ])
    };

    let input = Paragraph::new(line).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(format!(" Dependency ({} matches) ", app.suggestions.len())),
    );

    f.render_widget(input, area);
}

fn render_dropdown(f: &mut Frame, input: Rect, results: Rect, app: &mut App) {
    let height = (app.suggestions.len() as u16 + 2).min(results.height.max(3));
    let area = Rect {
        x: input.x + 1,
        y: input.y + input.height - 1,
        width: input.width.saturating_sub(2).min(60),
        height,
    };

    let items: Vec<ListItem> = app
        .suggestions
        .iter()
        .map(|g| ListItem::new(g.as_str()))
        .collect();

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Yellow)),
        )
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("→ ");

    f.render_widget(Clear, area);
    f.render_stateful_widget(list, area, &mut app.dropdown_state);
}

fn column_width(name: &str) -> u16 {
    match name {
        "display_name" => 30,
        "group" | "issuer_id" | "receiver_id" | "transaction_id" | "total" => 16,
        _ => 12,
    }
}

fn render_table(f: &mut Frame, area: Rect, app: &mut App) {
    let visible = app.visible_columns();

    let header_cells = visible.iter().map(|&c| {
        Cell::from(app.table.columns[c].clone()).style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
    });

    let header = Row::new(header_cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1);

    let total_col = app.table.columns.len().saturating_sub(1);
    let rows = app.table.rows.iter().map(|row| {
        let cells = visible.iter().map(|&c| {
            let text = truncate(&row[c].to_string(), column_width(&app.table.columns[c]) as usize);
            let cell = Cell::from(text);
            if c == total_col {
                cell.style(Style::default().fg(Color::Green))
            } else {
                cell
            }
        });
        Row::new(cells).height(1)
    });

    let widths: Vec<Constraint> = visible
        .iter()
        .map(|&c| Constraint::Length(column_width(&app.table.columns[c])))
        .collect();

    let title = if app.table.is_empty() {
        " Results ".to_string()
    } else {
        format!(
            " Results: {} rows, {} categories ",
            app.table.len(),
            app.session.current().categories.len()
        )
    };

    let table = Table::new(rows, widths)
        .header(header)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::White))
                .title(title),
        )
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let selected = app.state.selected().map(|i| i + 1).unwrap_or(0);
    let total = app.table.len();

    let key = |k: &'static str| Span::styled(k, Style::default().fg(Color::Yellow));
    let run_style = if app.session.can_query() {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default().fg(Color::DarkGray)
    };

    let status_spans = vec![
        Span::styled(
            format!(" Row: {}/{} ", selected, total),
            Style::default().fg(Color::Cyan),
        ),
        Span::raw(" | "),
        Span::styled("Enter/F5", run_style),
        Span::raw(" Run | "),
        key("F2"),
        Span::raw(" Report | "),
        key("F3"),
        Span::raw(" Measure | "),
        key("F4"),
        Span::raw(" Reconnect | "),
        key("F6"),
        Span::raw(" Export | "),
        key("↑/↓ ←/→"),
        Span::raw(" Nav | "),
        Span::styled("Esc", Style::default().fg(Color::Red)),
        Span::raw(" Quit"),
    ];

    let status_bar = Paragraph::new(vec![Line::from(status_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

fn render_export_prompt(f: &mut Frame, path: &str) {
    let area = centered_rect(70, 7, f.size());
    let content = vec![
        Line::from(""),
        Line::from(vec![
            Span::styled("  Save as: ", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
            Span::raw(path.to_string()),
            Span::styled("█", Style::default().fg(Color::DarkGray)),
        ]),
        Line::from(""),
        Line::from(Span::styled(
            "  .xlsx writes an Excel workbook, anything else CSV. Enter save, Esc cancel",
            Style::default()
                .fg(Color::DarkGray)
                .add_modifier(Modifier::ITALIC),
        )),
    ];

    let prompt = Paragraph::new(content).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow))
            .title(" Export "),
    );

    f.render_widget(Clear, area);
    f.render_widget(prompt, area);
}

fn render_notice(f: &mut Frame, notice: &Notice) {
    let color = match notice.level {
        NoticeLevel::Info => Color::Green,
        NoticeLevel::Warning => Color::Yellow,
        NoticeLevel::Error => Color::Red,
    };
    let lines = notice.message.lines().count() as u16;
    let area = centered_rect(60, lines + 5, f.size());

    let mut content: Vec<Line> = vec![Line::from("")];
    content.extend(notice.message.lines().map(|l| Line::from(format!("  {}", l))));
    content.push(Line::from(""));
    content.push(Line::from(Span::styled(
        "  Press any key to close",
        Style::default()
            .fg(Color::DarkGray)
            .add_modifier(Modifier::ITALIC),
    )));

    let popup = Paragraph::new(content).wrap(Wrap { trim: false }).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(color))
            .title(format!(" {} ", notice.title)),
    );

    f.render_widget(Clear, area);
    f.render_widget(popup, area);
}

fn centered_rect(width_percent: u16, height: u16, r: Rect) -> Rect {
    let width = r.width * width_percent / 100;
    let height = height.min(r.height);
    Rect {
        x: r.x + (r.width - width) / 2,
        y: r.y + (r.height - height) / 2,
        width,
        height,
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nomina_report::{AppConfig, Catalog, ConnectionManager};
    use rusqlite::Connection;

    const CONFIG: &str = "
[SQL_SERVER]
DRIVER = sqlite
SERVER = .
DATABASE = nomina.db
USERNAME = reader
PASSWORD = secret
ENCRYPT = no
TRUST_SERVER_CERTIFICATE = yes

[PATHS]
CATALOGO_EXCEL_PATH = catalogo.xlsx

[TABLES]
PERCEPCIONES = Percepciones
";

    fn app() -> App {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE Percepciones (
                EmisorRFC TEXT, ReceptorRFC TEXT, UUID TEXT,
                PercepcionClave TEXT, PercepcionImporteGravado REAL
             );
             CREATE TABLE Padron (RFC TEXT, NOMBRE TEXT);
             INSERT INTO Percepciones VALUES
                ('AAA010101AAA', 'X', 'U1', 'BASE', 100),
                ('AAA010101AAA', 'X', 'U1', 'BONUS', 50),
                ('AAA010101AAA', 'Y', 'U2', 'BASE', 70);",
        )
        .unwrap();

        let config = AppConfig::from_ini_str(CONFIG).unwrap();
        let db = ConnectionManager::with_connection(config.sql_server.clone(), conn);
        let catalog = Catalog::from_rows(vec![
            (Some("AAA010101AAA".into()), Some("Secretaria de Finanzas".into())),
            (Some("CCC030303CCC".into()), Some("Secretaria de Salud".into())),
            (Some("DDD040404DDD".into()), Some("Instituto del Deporte".into())),
        ]);
        App::new(Session::from_parts(config, db, catalog))
    }

    #[test]
    fn test_dropdown_opens_after_pause() {
        let mut app = app();
        let start = Instant::now();

        app.on_char('s', start);
        app.on_char('e', start + Duration::from_millis(100));
        app.tick(start + Duration::from_millis(350));
        assert!(!app.dropdown_open);

        app.tick(start + Duration::from_millis(400));
        assert!(app.dropdown_open);
        assert_eq!(app.suggestions, vec!["Secretaria de Finanzas", "Secretaria de Salud"]);
    }

    #[test]
    fn test_no_dropdown_without_matches() {
        let mut app = app();
        let start = Instant::now();

        app.on_char('z', start);
        app.tick(start + Duration::from_secs(1));

        assert!(app.suggestions.is_empty());
        assert!(!app.dropdown_open);
    }

    #[test]
    fn test_backspace_to_empty_restores_all_groups() {
        let mut app = app();
        let start = Instant::now();

        app.on_char('x', start);
        app.on_backspace(start);
        app.tick(start + Duration::from_secs(1));

        assert_eq!(app.suggestions.len(), 3);
        assert!(!app.dropdown_open);
    }

    #[test]
    fn test_accept_suggestion_and_run_query() {
        let mut app = app();
        let start = Instant::now();
        for c in "finan".chars() {
            app.on_char(c, start);
        }
        app.tick(start + Duration::from_secs(1));

        let pending = app.begin_query().unwrap();
        assert_eq!(app.group_input, "Secretaria de Finanzas");
        assert!(app.is_querying());

        assert_eq!(app.finish_query(pending), QueryOutcome::HasData(2));
        assert!(!app.is_querying());
        assert_eq!(app.table.len(), 2);
        assert_eq!(app.state.selected(), Some(0));
        assert_eq!(app.notices.len(), 1);
    }

    #[test]
    fn test_report_and_measure_cycling() {
        let mut app = app();

        assert_eq!(app.measure(), "PercepcionImporteGravado");
        app.cycle_measure();
        assert_eq!(app.measure(), "PercepcionImporteExento");
        app.cycle_measure();
        assert_eq!(app.measure(), "PercepcionImporteGravado");

        app.cycle_measure();
        app.toggle_report();
        assert_eq!(app.report, ReportKind::Deductions);
        assert_eq!(app.measure(), "DeduccionImporte");
    }

    #[test]
    fn test_export_prompt_requires_data() {
        let mut app = app();

        app.open_export_prompt();

        assert_eq!(app.mode, Mode::Browse);
        assert_eq!(app.notices.back().map(|n| n.level), Some(NoticeLevel::Warning));
    }

    #[test]
    fn test_navigation_wraps() {
        let mut app = app();
        app.group_input = "Secretaria de Finanzas".to_string();
        let pending = app.begin_query().unwrap();
        app.finish_query(pending);

        app.next();
        assert_eq!(app.state.selected(), Some(1));
        app.next();
        assert_eq!(app.state.selected(), Some(0));
        app.previous();
        assert_eq!(app.state.selected(), Some(1));
        app.page_up();
        assert_eq!(app.state.selected(), Some(0));
    }

    #[test]
    fn test_column_scroll_keeps_index_columns() {
        let mut app = app();
        app.group_input = "Secretaria de Finanzas".to_string();
        let pending = app.begin_query().unwrap();
        app.finish_query(pending);

        // index columns + BASE, BONUS, total
        app.scroll_columns(true);
        let visible = app.visible_columns();
        assert_eq!(visible[..INDEX_COLUMNS.len()], [0, 1, 2, 3, 4]);
        assert_eq!(visible.len(), INDEX_COLUMNS.len() + 2);

        app.scroll_columns(true);
        app.scroll_columns(true);
        assert_eq!(app.visible_columns().len(), INDEX_COLUMNS.len() + 1);

        app.scroll_columns(false);
        app.scroll_columns(false);
        app.scroll_columns(false);
        assert_eq!(app.column_offset, 0);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("SECRETARÍA", 20), "SECRETARÍA");
        assert_eq!(truncate("SECRETARÍA DE SALUD", 10), "SECRETA...");
    }
}
