use crate::state::App;
use crate::theme::{self, icons};
use chrono::{DateTime, Local, TimeZone, Utc};
use metis_core::board::TaskBlock;
use metis_core::highlight::HighlightedLine;
use metis_core::history::ChartTable;
use metis_core::sync::Staleness;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols::Marker,
    text::{Line, Span},
    widgets::{
        Axis, Block, Borders, Cell, Chart, Clear, Dataset, GraphType, List, ListItem, Paragraph,
        Row, Table, Wrap,
    },
    Frame,
};

const SUMMARY_HEIGHT: u16 = 10;
const CHART_HEIGHT: u16 = 16;
const MAX_BAR_CELLS: usize = 40;
const SERIES_COLORS: [Color; 4] = [
    Color::Rgb(142, 192, 124),
    Color::Rgb(131, 165, 152),
    Color::Rgb(250, 189, 47),
    Color::Rgb(211, 134, 155),
];

pub fn render(frame: &mut Frame, app: &mut App) {
    let mut constraints = vec![Constraint::Length(2)];
    if app.show_summary {
        constraints.push(Constraint::Length(SUMMARY_HEIGHT));
    }
    if app.show_chart {
        constraints.push(Constraint::Length(CHART_HEIGHT));
    }
    constraints.push(Constraint::Min(3));
    constraints.push(Constraint::Length(1));

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(frame.size());

    let mut next = 0;
    render_header(frame, app, chunks[next]);
    next += 1;
    if app.show_summary {
        render_summary(frame, app, chunks[next]);
        next += 1;
    }
    if app.show_chart {
        render_chart(frame, app.chart.as_ref(), chunks[next]);
        next += 1;
    }
    render_tasks(frame, app, chunks[next]);
    render_footer(frame, app, chunks[next + 1]);

    if app.show_help {
        render_help(frame);
    }
}

fn render_header(frame: &mut Frame, app: &App, area: Rect) {
    let mut first = vec![
        Span::styled(app.board.title().to_string(), theme::HEADER_STYLE),
        Span::raw("  "),
        Span::styled(app.source_label.clone(), theme::MUTED_STYLE),
    ];
    if let Some(key) = app.sync.config().sort_key {
        first.push(Span::styled(
            format!("  sorted by {}", key.label()),
            theme::MUTED_STYLE,
        ));
    }

    let second = match app.sync.staleness() {
        Some(stale) => Line::from(Span::styled(staleness_text(stale), theme::STALE_STYLE)),
        None => Line::from(Span::styled(
            freshness_text(app.board.last_updated(), app.sync.last_success()),
            theme::MUTED_STYLE,
        )),
    };

    frame.render_widget(Paragraph::new(vec![Line::from(first), second]), area);
}

fn freshness_text(last_updated: Option<&str>, fetched: Option<DateTime<Utc>>) -> String {
    let updated = last_updated.unwrap_or("waiting for first snapshot");
    match fetched {
        Some(when) => format!(
            "{updated}  (fetched {})",
            when.with_timezone(&Local).format("%H:%M:%S")
        ),
        None => updated.to_string(),
    }
}

fn staleness_text(stale: &Staleness) -> String {
    let since = stale.since.with_timezone(&Local).format("%H:%M:%S");
    let plural = if stale.failures == 1 { "" } else { "es" };
    format!(
        "STALE since {since} ({} failed fetch{plural}): {}",
        stale.failures,
        ellipsize(&stale.reason, 120)
    )
}

fn render_summary(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default().borders(Borders::ALL).title("Summary");
    let Some(summary) = app.board.summary() else {
        frame.render_widget(
            Paragraph::new("no data yet").style(theme::MUTED_STYLE).block(block),
            area,
        );
        return;
    };
    let rows = summary.rows().into_iter().enumerate().map(|(idx, (label, value))| {
        Row::new(vec![
            Cell::from(label),
            Cell::from(Line::from(value).alignment(ratatui::layout::Alignment::Right)),
        ])
        .style(theme::zebra_row_style(idx))
    });
    let table = Table::new(rows, [Constraint::Length(20), Constraint::Length(18)]).block(block);
    frame.render_widget(table, area);
}

fn render_chart(frame: &mut Frame, chart: Option<&ChartTable>, area: Rect) {
    let block = Block::default().borders(Borders::ALL).title("Trend");
    let Some(chart) = chart.filter(|chart| !chart.rows.is_empty()) else {
        frame.render_widget(
            Paragraph::new("no history in snapshot")
                .style(theme::MUTED_STYLE)
                .block(block),
            area,
        );
        return;
    };

    let series: Vec<Vec<(f64, f64)>> = (0..chart.headers.len().saturating_sub(1))
        .map(|column| chart.series(column))
        .collect();
    let (x_min, mid, x_max) = time_span(chart);
    let y_max = series
        .iter()
        .flatten()
        .map(|(_, value)| *value)
        .fold(0.0_f64, f64::max)
        .max(1.0)
        * 1.1;

    let datasets = series
        .iter()
        .enumerate()
        .map(|(column, data)| {
            Dataset::default()
                .name(chart.headers[column + 1].clone())
                .marker(Marker::Braille)
                .graph_type(GraphType::Line)
                .style(Style::new().fg(SERIES_COLORS[column % SERIES_COLORS.len()]))
                .data(data)
        })
        .collect::<Vec<_>>();

    let x_labels = [x_min, mid, x_max]
        .into_iter()
        .map(|ts| Span::styled(time_label(ts), theme::MUTED_STYLE))
        .collect::<Vec<_>>();
    let y_labels = [0.0, y_max / 2.0, y_max]
        .into_iter()
        .map(|value| Span::styled(format!("{value:.0}"), theme::MUTED_STYLE))
        .collect::<Vec<_>>();

    let widget = Chart::new(datasets)
        .block(block)
        .x_axis(
            Axis::default()
                .bounds([x_min as f64, x_max as f64])
                .labels(x_labels),
        )
        .y_axis(Axis::default().bounds([0.0, y_max]).labels(y_labels));
    frame.render_widget(widget, area);
}

/// First, middle and last timestamp; the span is at least one second wide.
fn time_span(chart: &ChartTable) -> (i64, i64, i64) {
    let first = chart.rows.first().map(|row| row.timestamp).unwrap_or(0);
    let last = chart.rows.last().map(|row| row.timestamp).unwrap_or(0);
    let (first, last) = if last > first {
        (first, last)
    } else if first < i64::MAX {
        (first, first + 1)
    } else {
        (first - 1, first)
    };
    let mid = ((first as i128 + last as i128) / 2) as i64;
    (first, mid, last)
}

fn time_label(ts: i64) -> String {
    Local
        .timestamp_opt(ts, 0)
        .single()
        .map(|when| when.format("%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

fn render_tasks(frame: &mut Frame, app: &mut App, area: Rect) {
    let title = format!("Tasks ({})", app.board.len());
    let block = Block::default().borders(Borders::ALL).title(title);
    if app.board.is_empty() {
        frame.render_widget(
            Paragraph::new("no tasks").style(theme::MUTED_STYLE).block(block),
            area,
        );
        return;
    }

    let inner_width = area.width.saturating_sub(2) as usize;
    let selected = app.selected();
    let items = app
        .board
        .blocks()
        .enumerate()
        .map(|(idx, task)| {
            ListItem::new(task_lines(task, inner_width, selected == Some(idx)))
                .style(theme::zebra_row_style(idx))
        })
        .collect::<Vec<_>>();

    let list = List::new(items)
        .block(block)
        .highlight_style(theme::SELECTED_STYLE);
    frame.render_stateful_widget(list, area, &mut app.list_state);
}

fn task_lines(task: &TaskBlock, width: usize, selected: bool) -> Vec<Line<'static>> {
    let marker = if task.details_expanded {
        icons::EXPANDED
    } else {
        icons::COLLAPSED
    };
    let mut heading = vec![Span::styled(format!("{marker} "), theme::MUTED_STYLE)];
    if !task.type_badge.is_empty() {
        heading.push(Span::styled(
            format!(" {} ", task.type_badge),
            theme::TYPE_BADGE_STYLE,
        ));
        heading.push(Span::raw(" "));
    }
    if !task.tag_badge.is_empty() {
        heading.push(Span::styled(
            task.tag_badge.clone(),
            theme::tag_badge_style(&task.tag_badge),
        ));
        heading.push(Span::raw(" "));
    }
    heading.push(Span::raw(ellipsize(&task.dataset, width.saturating_sub(30).max(12))));
    if !task.status.is_empty() {
        heading.push(Span::styled(
            format!("  {}", task.status),
            Style::new().fg(theme::status_color(&task.status)),
        ));
    }

    let mut lines = vec![Line::from(heading), progress_line(task, width, selected)];
    if task.anomalies.retried_jobs > 0 || task.anomalies.missing_events > 0 {
        lines.push(Line::from(Span::styled(
            format!(
                "  {} {} job(s) retried, {} event(s) missing",
                icons::RETRY,
                task.anomalies.retried_jobs,
                task.anomalies.missing_events
            ),
            theme::WARN_STYLE,
        )));
    }
    if task.details_expanded {
        lines.push(Line::from(vec![
            Span::styled("  catalog ", theme::MUTED_STYLE),
            Span::styled(task.links.display.clone(), theme::LINK_STYLE),
        ]));
        lines.push(Line::from(vec![
            Span::styled("  preview ", theme::MUTED_STYLE),
            Span::styled(task.links.preview.clone(), theme::LINK_STYLE),
        ]));
        lines.extend(task.details.iter().map(detail_line));
    }
    lines
}

fn progress_line(task: &TaskBlock, width: usize, selected: bool) -> Line<'static> {
    let cells = width.saturating_sub(24).clamp(10, MAX_BAR_CELLS);
    let filled = (task.bar.width_pct.clamp(0, 100) as usize * cells) / 100;
    let color = theme::bar_color(task.bar.color);

    let mut spans = vec![
        Span::raw("  "),
        Span::styled("█".repeat(filled), Style::new().fg(color)),
        Span::styled("░".repeat(cells - filled), theme::MUTED_STYLE),
        Span::styled(
            format!(" {:>4}", task.bar.label),
            Style::new().fg(color).add_modifier(Modifier::BOLD),
        ),
    ];
    if selected && !task.bar.hover.is_empty() {
        spans.push(Span::styled(
            format!("  {} jobs", task.bar.hover),
            theme::MUTED_STYLE,
        ));
    }
    if let Some(rate) = &task.bar.rate {
        spans.push(Span::styled(format!("  {rate}"), theme::MUTED_STYLE));
    }
    Line::from(spans)
}

fn detail_line(tokens: &HighlightedLine) -> Line<'static> {
    let mut spans = vec![Span::raw("    ")];
    spans.extend(
        tokens
            .iter()
            .map(|token| Span::styled(token.text.clone(), theme::token_style(token.kind))),
    );
    Line::from(spans)
}

fn render_footer(frame: &mut Frame, app: &App, area: Rect) {
    let hints = "j/k move  enter details  e expand all  s summary  c chart  a/p sort  r refresh  ? help  q quit";
    let line = match &app.status_note {
        Some(note) => Line::from(vec![
            Span::styled(ellipsize(note, area.width as usize / 2), theme::WARN_STYLE),
            Span::raw("  "),
            Span::styled(hints, theme::MUTED_STYLE),
        ]),
        None => Line::from(Span::styled(hints, theme::MUTED_STYLE)),
    };
    frame.render_widget(Paragraph::new(line), area);
}

fn render_help(frame: &mut Frame) {
    let area = centered_rect(60, 60, frame.size());
    let lines = vec![
        Line::from(Span::styled("Keys", theme::HEADER_STYLE)),
        Line::from(""),
        Line::from("  j/k, arrows  move selection"),
        Line::from("  g/G          first / last task"),
        Line::from("  enter        toggle details of the selected task"),
        Line::from("  e            expand or collapse all details"),
        Line::from("  s            toggle summary"),
        Line::from("  c            toggle trend chart"),
        Line::from("  a            sort by dataset name"),
        Line::from("  p            sort by completion"),
        Line::from("  r            refresh now"),
        Line::from("  q, esc       quit"),
    ];
    frame.render_widget(Clear, area);
    frame.render_widget(
        Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title("Help")),
        area,
    );
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100u16.saturating_sub(percent_y)) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100u16.saturating_sub(percent_y)) / 2),
        ])
        .split(area);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100u16.saturating_sub(percent_x)) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100u16.saturating_sub(percent_x)) / 2),
        ])
        .split(vertical[1])[1]
}

fn ellipsize(input: &str, max: usize) -> String {
    if input.chars().count() <= max {
        return input.to_string();
    }
    if max <= 3 {
        return "...".chars().take(max).collect();
    }
    let prefix: String = input.chars().take(max - 3).collect();
    format!("{prefix}...")
}
