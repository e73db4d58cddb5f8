use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use std::io;
use tabular_etl::{
    sales_summary, student_summary, IngestionRun, PriceCategory, Product, ResultStatus,
    SalesSummary, Student, StudentSummary,
};

const PAGE_STEP: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Products,
    Students,
    Summary,
}

impl Page {
    pub fn next(&self) -> Self {
        match self {
            Page::Products => Page::Students,
            Page::Students => Page::Summary,
            Page::Summary => Page::Products,
        }
    }

    pub fn previous(&self) -> Self {
        match self {
            Page::Products => Page::Summary,
            Page::Students => Page::Products,
            Page::Summary => Page::Students,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Page::Products => "Products",
            Page::Students => "Students",
            Page::Summary => "Summary",
        }
    }
}

pub struct App {
    pub products: Vec<Product>,
    pub students: Vec<Student>,
    pub filtered_students: Vec<Student>,
    pub student_filter: Option<ResultStatus>,
    pub runs: Vec<IngestionRun>,
    pub sales: SalesSummary,
    pub results: StudentSummary,
    pub product_state: TableState,
    pub student_state: TableState,
    pub current_page: Page,
    pub show_detail: bool,
}

impl App {
    pub fn new(products: Vec<Product>, students: Vec<Student>, runs: Vec<IngestionRun>) -> Self {
        let sales = sales_summary(&products);
        let results = student_summary(&students);

        let mut product_state = TableState::default();
        if !products.is_empty() {
            product_state.select(Some(0));
        }
        let mut student_state = TableState::default();
        if !students.is_empty() {
            student_state.select(Some(0));
        }

        Self {
            filtered_students: students.clone(),
            products,
            students,
            student_filter: None,
            runs,
            sales,
            results,
            product_state,
            student_state,
            current_page: Page::Products,
            show_detail: false,
        }
    }

    pub fn toggle_detail(&mut self) {
        self.show_detail = !self.show_detail;
    }

    pub fn next_page(&mut self) {
        self.current_page = self.current_page.next();
    }

    pub fn previous_page(&mut self) {
        self.current_page = self.current_page.previous();
    }

    pub fn selected_product(&self) -> Option<&Product> {
        self.product_state.selected().and_then(|i| self.products.get(i))
    }

    pub fn selected_student(&self) -> Option<&Student> {
        self.student_state
            .selected()
            .and_then(|i| self.filtered_students.get(i))
    }

    /// Show only students with the given result; `None` shows everyone.
    pub fn filter_students(&mut self, status: Option<ResultStatus>) {
        self.student_filter = status;
        self.filtered_students = match status {
            Some(status) => self
                .students
                .iter()
                .filter(|s| s.status == status)
                .cloned()
                .collect(),
            None => self.students.clone(),
        };
        let selected = if self.filtered_students.is_empty() {
            None
        } else {
            Some(0)
        };
        self.student_state.select(selected);
    }

    /// Rows on the active page and its selection.
    fn active(&mut self) -> Option<(usize, &mut TableState)> {
        match self.current_page {
            Page::Products => Some((self.products.len(), &mut self.product_state)),
            Page::Students => Some((self.filtered_students.len(), &mut self.student_state)),
            Page::Summary => None,
        }
    }

    pub fn next(&mut self) {
        let Some((len, state)) = self.active() else { return };
        if len == 0 {
            return;
        }
        let i = match state.selected() {
            Some(i) if i + 1 < len => i + 1,
            _ => 0,
        };
        state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let Some((len, state)) = self.active() else { return };
        if len == 0 {
            return;
        }
        let i = match state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        state.select(Some(i));
    }

    pub fn page_down(&mut self) {
        let Some((len, state)) = self.active() else { return };
        if len == 0 {
            return;
        }
        let i = state.selected().map_or(0, |i| (i + PAGE_STEP).min(len - 1));
        state.select(Some(i));
    }

    pub fn page_up(&mut self) {
        let Some((len, state)) = self.active() else { return };
        if len == 0 {
            return;
        }
        let i = state.selected().map_or(0, |i| i.saturating_sub(PAGE_STEP));
        state.select(Some(i));
    }

    pub fn first(&mut self) {
        if let Some((len, state)) = self.active() {
            if len > 0 {
                state.select(Some(0));
            }
        }
    }

    pub fn last(&mut self) {
        if let Some((len, state)) = self.active() {
            if len > 0 {
                state.select(Some(len - 1));
            }
        }
    }
}

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

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
                KeyCode::Enter => app.toggle_detail(),
                KeyCode::Tab => app.next_page(),
                KeyCode::BackTab => app.previous_page(),
                KeyCode::Char('p') if app.current_page == Page::Students => {
                    app.filter_students(Some(ResultStatus::Pass))
                }
                KeyCode::Char('f') if app.current_page == Page::Students => {
                    app.filter_students(Some(ResultStatus::Fail))
                }
                KeyCode::Char('c') => app.filter_students(None),
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                KeyCode::PageDown => app.page_down(),
                KeyCode::PageUp => app.page_up(),
                KeyCode::Home => app.first(),
                KeyCode::End => app.last(),
                KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    app.page_down()
                }
                KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    app.page_up()
                }
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

    let content = if app.show_detail && app.current_page != Page::Summary {
        let content_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
            .split(chunks[1]);
        render_detail_panel(f, content_chunks[1], app);
        content_chunks[0]
    } else {
        chunks[1]
    };

    match app.current_page {
        Page::Products => render_products(f, content, app),
        Page::Students => render_students(f, content, app),
        Page::Summary => render_summary(f, content, app),
    }

    render_status_bar(f, chunks[2], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let pages = [Page::Products, Page::Students, Page::Summary];

    let mut tab_spans = vec![];
    for (i, page) in pages.iter().enumerate() {
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
        format!("Products: {}", app.products.len()),
        Style::default().fg(Color::White),
    ));
    tab_spans.push(Span::raw("  "));
    tab_spans.push(Span::styled(
        format!("Students: {}", app.students.len()),
        Style::default().fg(Color::White),
    ));
    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(
        format!("✓ {}", app.results.passed),
        Style::default().fg(Color::Green),
    ));
    tab_spans.push(Span::raw("  "));
    tab_spans.push(Span::styled(
        format!("✗ {}", app.results.failed),
        Style::default().fg(Color::Red),
    ));

    let header = Paragraph::new(vec![Line::from(tab_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );

    f.render_widget(header, area);
}

fn header_row(titles: &[&'static str]) -> Row<'static> {
    let cells = titles.iter().map(|h| {
        Cell::from(*h).style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
    });
    Row::new(cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1)
}

fn render_products(f: &mut Frame, area: Rect, app: &mut App) {
    let header = header_row(&["PID", "Product", "Category", "USD", "INR", "Class", "Qty", "Return %"]);

    let rows = app.products.iter().map(|p| {
        let color = match p.price_category {
            PriceCategory::Expensive => Color::Magenta,
            PriceCategory::Cheap => Color::Green,
        };

        Row::new(vec![
            Cell::from(p.pid.clone()),
            Cell::from(truncate(&p.product_name, 28)),
            Cell::from(truncate(&p.category, 16)),
            Cell::from(format!("{:.2}", p.price_in_dollar)),
            Cell::from(format!("{:.2}", p.price_in_inr)),
            Cell::from(p.price_category.as_str()).style(Style::default().fg(color)),
            Cell::from(p.quantity.to_string()),
            Cell::from(format!("{:.1}", p.return_rate)),
        ])
        .height(1)
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(10),
            Constraint::Length(30),
            Constraint::Length(18),
            Constraint::Length(10),
            Constraint::Length(12),
            Constraint::Length(10),
            Constraint::Length(6),
            Constraint::Length(9),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Products "),
    )
    .highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.product_state);
}

fn render_students(f: &mut Frame, area: Rect, app: &mut App) {
    let header = header_row(&["SID", "Name", "Mid 1", "Mid 2", "Mid Avg", "Semester", "GPA", "%", "Result"]);

    let rows = app.filtered_students.iter().map(|s| {
        let color = match s.status {
            ResultStatus::Pass => Color::Green,
            ResultStatus::Fail => Color::Red,
        };

        Row::new(vec![
            Cell::from(s.sid.clone()),
            Cell::from(truncate(&s.name, 24)),
            Cell::from(format!("{:.1}", s.mid1)),
            Cell::from(format!("{:.1}", s.mid2)),
            Cell::from(format!("{:.2}", s.mid_avg)),
            Cell::from(format!("{:.1}", s.semester)),
            Cell::from(format!("{:.2}", s.gpa)).style(Style::default().fg(color)),
            Cell::from(format!("{:.1}", s.percentage)),
            Cell::from(s.status.as_str()).style(Style::default().fg(color)),
        ])
        .height(1)
    });

    let title = match app.student_filter {
        Some(status) => format!(" Students ({}) ", status),
        None => " Students ".to_string(),
    };

    let table = Table::new(
        rows,
        [
            Constraint::Length(10),
            Constraint::Length(26),
            Constraint::Length(7),
            Constraint::Length(7),
            Constraint::Length(9),
            Constraint::Length(10),
            Constraint::Length(6),
            Constraint::Length(7),
            Constraint::Length(7),
        ],
    )
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

    f.render_stateful_widget(table, area, &mut app.student_state);
}

fn render_summary(f: &mut Frame, area: Rect, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);

    let label = Style::default().fg(Color::Cyan);
    let mut sales_lines = vec![
        Line::from(vec![
            Span::styled("Total sales:   ", label),
            Span::raw(format!("₹{:.2}", app.sales.total_sales)),
        ]),
        Line::from(vec![
            Span::styled("Avg / product: ", label),
            Span::raw(format!("₹{:.2}", app.sales.avg_sales_per_product)),
        ]),
        Line::from(vec![
            Span::styled("Top seller:    ", label),
            Span::raw(
                app.sales
                    .top_selling
                    .as_ref()
                    .map(|p| format!("{} ({})", p.product_name, p.pid))
                    .unwrap_or_else(|| "-".to_string()),
            ),
        ]),
        Line::from(""),
        Line::from(Span::styled(
            "Sales by category",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )),
    ];
    for category in &app.sales.by_category {
        sales_lines.push(Line::from(format!(
            "  {:<18} ₹{:>14.2}  ({})",
            truncate(&category.category, 18),
            category.sales,
            category.products
        )));
    }

    let sales = Paragraph::new(sales_lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" 📊 Sales "),
    );
    f.render_widget(sales, chunks[0]);

    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(8), Constraint::Min(0)])
        .split(chunks[1]);

    let results = &app.results;
    let result_lines = vec![
        Line::from(vec![
            Span::styled("Pass / Fail:  ", label),
            Span::styled(results.passed.to_string(), Style::default().fg(Color::Green)),
            Span::raw(" / "),
            Span::styled(results.failed.to_string(), Style::default().fg(Color::Red)),
            Span::raw(format!("  ({:.1}% pass)", results.pass_rate * 100.0)),
        ]),
        Line::from(vec![
            Span::styled("Average GPA:  ", label),
            Span::raw(format!("{:.2}", results.average_gpa)),
        ]),
        Line::from(vec![
            Span::styled("Average mid:  ", label),
            Span::raw(format!("{:.2}", results.average_mid)),
        ]),
        Line::from(vec![
            Span::styled("Top student:  ", label),
            Span::raw(
                results
                    .top_student
                    .as_ref()
                    .map(|s| format!("{} ({}, GPA {:.2})", s.name, s.sid, s.gpa))
                    .unwrap_or_else(|| "-".to_string()),
            ),
        ]),
    ];

    let students = Paragraph::new(result_lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" 🎓 Students "),
    );
    f.render_widget(students, right[0]);

    let run_lines: Vec<Line> = app
        .runs
        .iter()
        .map(|run| {
            let (marker, color) = if run.accepted {
                ("✓", Color::Green)
            } else {
                ("✗", Color::Red)
            };
            Line::from(vec![
                Span::styled(format!("{} ", marker), Style::default().fg(color)),
                Span::raw(format!(
                    "{} {:<8} {:>4} → {:<4} ",
                    run.timestamp.format("%m-%d %H:%M"),
                    run.entity,
                    run.rows_in,
                    run.rows_out
                )),
                Span::styled(
                    truncate(run.reason.as_deref().unwrap_or(""), 40),
                    Style::default().fg(Color::DarkGray),
                ),
            ])
        })
        .collect();

    let runs = Paragraph::new(run_lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Recent ingestion runs "),
    );
    f.render_widget(runs, right[1]);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let (selected, total) = match app.current_page {
        Page::Products => (app.product_state.selected(), app.products.len()),
        Page::Students => (app.student_state.selected(), app.filtered_students.len()),
        Page::Summary => (None, 0),
    };

    let mut status_spans = vec![Span::styled(
        format!(" Row: {}/{} ", selected.map(|i| i + 1).unwrap_or(0), total),
        Style::default().fg(Color::Cyan),
    )];

    if let Some(status) = app.student_filter {
        status_spans.push(Span::raw(" | "));
        status_spans.push(Span::styled(
            format!("Filter: {}", status),
            Style::default().fg(Color::Green),
        ));
        status_spans.push(Span::raw(" ("));
        status_spans.push(Span::styled("c", Style::default().fg(Color::Yellow)));
        status_spans.push(Span::raw(" clear)"));
    }

    if app.current_page == Page::Students {
        status_spans.push(Span::raw(" | "));
        status_spans.push(Span::styled("p/f", Style::default().fg(Color::Yellow)));
        status_spans.push(Span::raw(" Pass/Fail"));
    }

    status_spans.push(Span::raw(" | "));
    status_spans.push(Span::styled("Enter", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Details | "));
    status_spans.push(Span::styled("Tab", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Page | "));
    status_spans.push(Span::styled("↑/↓", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Nav | "));
    status_spans.push(Span::styled("PgUp/PgDn", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Fast | "));
    status_spans.push(Span::styled("q", Style::default().fg(Color::Red)));
    status_spans.push(Span::raw(" Quit"));

    let status_bar = Paragraph::new(vec![Line::from(status_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

fn render_detail_panel(f: &mut Frame, area: Rect, app: &App) {
    let label = Style::default().fg(Color::Cyan);
    let field = |name: &str, value: String| {
        Line::from(vec![
            Span::styled(format!("{:<16}", name), label),
            Span::raw(value),
        ])
    };

    let lines = match app.current_page {
        Page::Products => match app.selected_product() {
            Some(p) => vec![
                field("PID", p.pid.clone()),
                field("Product", p.product_name.clone()),
                field("Category", p.category.clone()),
                field("Price (USD)", format!("{:.2}", p.price_in_dollar)),
                field("Price (INR)", format!("{:.2}", p.price_in_inr)),
                field("Price class", p.price_category.to_string()),
                field("Quantity", p.quantity.to_string()),
                field("Return rate", format!("{:.1}%", p.return_rate)),
                field("Sales value", format!("₹{:.2}", p.sales_value())),
                Line::from(""),
                field("User", format!("{} ({})", p.user_name, p.uid)),
                field("Branch", p.branch.clone()),
            ],
            None => vec![Line::from("No product selected")],
        },
        Page::Students => match app.selected_student() {
            Some(s) => vec![
                field("SID", s.sid.clone()),
                field("Name", s.name.clone()),
                field("Mid 1", format!("{:.1}", s.mid1)),
                field("Mid 2", format!("{:.1}", s.mid2)),
                field("Mid average", format!("{:.2}", s.mid_avg)),
                field("Semester", format!("{:.1}", s.semester)),
                field("GPA", format!("{:.2}", s.gpa)),
                field("Percentage", format!("{:.1}%", s.percentage)),
                field("Result", s.status.to_string()),
            ],
            None => vec![Line::from("No student selected")],
        },
        Page::Summary => Vec::new(),
    };

    let panel = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan))
            .title(" Details "),
    );

    f.render_widget(panel, area);
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

    fn student(sid: &str, status: ResultStatus) -> Student {
        Student {
            sid: sid.to_string(),
            name: sid.to_string(),
            mid1: 20.0,
            mid2: 20.0,
            mid_avg: 20.0,
            semester: 50.0,
            gpa: 7.0,
            percentage: 70.0,
            status,
        }
    }

    fn app() -> App {
        App::new(
            Vec::new(),
            vec![
                student("S1", ResultStatus::Pass),
                student("S2", ResultStatus::Fail),
                student("S3", ResultStatus::Pass),
            ],
            Vec::new(),
        )
    }

    #[test]
    fn test_navigation_wraps_on_active_page() {
        let mut app = app();
        app.next_page();
        assert_eq!(app.current_page, Page::Students);

        app.previous();
        assert_eq!(app.selected_student().unwrap().sid, "S3");
        app.next();
        assert_eq!(app.selected_student().unwrap().sid, "S1");

        app.page_down();
        assert_eq!(app.student_state.selected(), Some(2));
        app.page_up();
        assert_eq!(app.student_state.selected(), Some(0));
    }

    #[test]
    fn test_empty_page_has_no_selection() {
        let mut app = app();
        app.next();
        app.last();
        assert!(app.selected_product().is_none());
    }

    #[test]
    fn test_student_filter() {
        let mut app = app();
        app.filter_students(Some(ResultStatus::Fail));
        assert_eq!(app.filtered_students.len(), 1);
        assert_eq!(app.student_state.selected(), Some(0));

        app.filter_students(None);
        assert_eq!(app.filtered_students.len(), 3);
    }

    #[test]
    fn test_truncate_counts_chars() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("Café au lait", 8), "Café ...");
    }
}
