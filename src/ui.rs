use std::collections::BTreeSet;
use std::time::{SystemTime, UNIX_EPOCH};

use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, BorderType, Borders, Cell, Clear, Paragraph, Row, Table, Wrap};
use ratatui::Frame;

use crate::app::{App, InputMode, Panel, ThemeMode, STATUS_TTL};
use crate::filters::{selection_text, water_source_text};
use crate::hex::{round1, LEGEND_DOMAIN, LEGEND_STEPS};
use crate::locations::LoadState;
use crate::presets::SearchFocus;

struct Theme {
    accent: Color,
    warn: Color,
    danger: Color,
    dim: Color,
    highlight_fg: Color,
    highlight_bg: Color,
    row_even_bg: Color,
    row_odd_bg: Color,
    header_bg: Color,
    panel_bg: Color,
    legend: [Color; LEGEND_STEPS],
}

pub fn ui(f: &mut Frame, app: &App) {
    let size = f.area();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(1),
            Constraint::Min(10),
            Constraint::Length(1),
        ])
        .split(size);

    render_header(f, chunks[0], app);
    render_alerts(f, chunks[1], app);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(42), Constraint::Percentage(58)])
        .split(chunks[2]);
    render_filters(f, body[0], app);
    render_results_side(f, body[1], app);

    render_footer(f, chunks[3], app);

    match app.input_mode {
        InputMode::Help => render_help_menu(f, size, app),
        InputMode::Edit(_) => render_edit_popup(f, size, app),
        _ => {}
    }
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let theme = theme(app.theme_mode);
    let session = if !app.session.is_known() {
        Span::styled("SESSION --", Style::default().fg(theme.dim))
    } else if app.session.is_authenticated() {
        Span::styled("SIGNED IN", Style::default().fg(Color::Green))
    } else {
        Span::styled("ANONYMOUS", Style::default().fg(theme.warn))
    };

    let activity = match app.loading_label() {
        Some(label) => {
            let spinner = ["|", "/", "-", "\\"][phase_index(200, 4)];
            Span::styled(
                format!("{spinner} {}", label.to_uppercase()),
                Style::default().fg(theme.accent),
            )
        }
        None => Span::styled("IDLE", Style::default().fg(theme.dim)),
    };

    let line = Line::from(vec![
        Span::styled(
            "WATERWATCH",
            Style::default().fg(theme.accent).add_modifier(Modifier::BOLD),
        ),
        Span::raw("  "),
        session,
        Span::raw("  "),
        activity,
        Span::raw("  "),
        Span::styled(
            format!("FORMAT {}", app.search.format().as_str().to_uppercase()),
            Style::default().fg(theme.dim),
        ),
        Span::raw("  "),
        Span::styled(
            format!("ZOOM {}", app.map_zoom),
            Style::default().fg(theme.dim),
        ),
        Span::raw("  "),
        Span::styled(
            format!("THEME {}", app.theme_mode.label()),
            Style::default().fg(theme.dim),
        ),
    ]);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .style(Style::default().bg(theme.header_bg));
    f.render_widget(Paragraph::new(line).block(block), area);
}

fn render_alerts(f: &mut Frame, area: Rect, app: &App) {
    let theme = theme(app.theme_mode);
    let mut spans = Vec::new();
    if let Some(message) = app.validation_message() {
        spans.push(Span::styled(
            format!("INVALID {message}"),
            Style::default().fg(theme.danger).add_modifier(Modifier::BOLD),
        ));
    }
    if app.results_out_of_date() {
        if !spans.is_empty() {
            spans.push(Span::raw("  "));
        }
        spans.push(Span::styled(
            "RESULTS OUT OF DATE (Enter to search)",
            Style::default().fg(theme.warn),
        ));
    }
    if let Some(err) = app.search.last_error() {
        if !spans.is_empty() {
            spans.push(Span::raw("  "));
        }
        spans.push(Span::styled(
            format!("ERR {err}"),
            Style::default().fg(theme.danger),
        ));
    }
    if spans.is_empty() {
        spans.push(Span::styled("OK", Style::default().fg(theme.dim)));
    }
    f.render_widget(
        Paragraph::new(Line::from(spans)).style(Style::default().bg(theme.panel_bg)),
        area,
    );
}

fn render_filters(f: &mut Frame, area: Rect, app: &App) {
    let continents = app.panel_items(Panel::Continents).len() as u16;
    let countries = if app.cascade.country_field_visible() {
        app.panel_items(Panel::Countries).len().max(1) as u16
    } else {
        1
    };
    let slots = app.filters.time_slots.len().max(1) as u16;
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(continents.clamp(1, 8) + 2),
            Constraint::Min(countries.min(10) + 2),
            Constraint::Length(6),
            Constraint::Length(5),
            Constraint::Length(4),
            Constraint::Length(slots + 2),
        ])
        .split(area);

    render_continents(f, rows[0], app);
    render_countries(f, rows[1], app);
    render_checklist(
        f,
        rows[2],
        app,
        Panel::WaterSources,
        &app.panel_items(Panel::WaterSources),
        &app.filters.water_sources,
        water_source_text(&app.filters.water_sources),
    );
    render_temperature(f, rows[3], app);
    render_dates(f, rows[4], app);
    render_time_slots(f, rows[5], app);
}

fn render_continents(f: &mut Frame, area: Rect, app: &App) {
    let theme = theme(app.theme_mode);
    match app.cascade.state() {
        LoadState::Ready => render_checklist(
            f,
            area,
            app,
            Panel::Continents,
            &app.panel_items(Panel::Continents),
            &app.filters.continents,
            selection_text(&app.filters.continents, "continents"),
        ),
        state => {
            let text = match (state, app.cascade.last_error()) {
                (LoadState::Error, Some(err)) => Span::styled(
                    format!("locations unavailable: {err} (R to retry)"),
                    Style::default().fg(theme.danger),
                ),
                (LoadState::Error, None) => Span::styled(
                    "locations unavailable (R to retry)",
                    Style::default().fg(theme.danger),
                ),
                _ => Span::styled("Loading locations…", Style::default().fg(theme.dim)),
            };
            let block = panel_block(app, Panel::Continents, String::new());
            f.render_widget(
                Paragraph::new(Line::from(text))
                    .block(block)
                    .wrap(Wrap { trim: true }),
                area,
            );
        }
    }
}

fn render_countries(f: &mut Frame, area: Rect, app: &App) {
    let theme = theme(app.theme_mode);
    if !app.cascade.country_field_visible() {
        let block = panel_block(app, Panel::Countries, String::new());
        let hint = Span::styled(
            "Select a continent to choose countries",
            Style::default().fg(theme.dim),
        );
        f.render_widget(Paragraph::new(Line::from(hint)).block(block), area);
        return;
    }
    let mut summary = selection_text(&app.filters.countries, "countries");
    if app.cascade.is_settling() {
        summary.push_str(" (settling)");
    }
    render_checklist(
        f,
        area,
        app,
        Panel::Countries,
        &app.panel_items(Panel::Countries),
        &app.filters.countries,
        summary,
    );
}

fn render_checklist(
    f: &mut Frame,
    area: Rect,
    app: &App,
    panel: Panel,
    items: &[String],
    selected: &BTreeSet<String>,
    summary: String,
) {
    let theme = theme(app.theme_mode);
    let focused = app.panel == panel && app.input_mode == InputMode::Normal;
    let cursor = app.cursor(panel);
    let visible = area.height.saturating_sub(2).max(1) as usize;
    let start = scroll_start(cursor, items.len(), visible);

    let lines: Vec<Line> = items
        .iter()
        .enumerate()
        .skip(start)
        .take(visible)
        .map(|(i, item)| {
            let marker = if selected.contains(item) { "[x]" } else { "[ ]" };
            let text = format!(" {marker} {item}");
            if focused && i == cursor {
                Line::from(Span::styled(
                    text,
                    Style::default()
                        .fg(theme.highlight_fg)
                        .bg(theme.highlight_bg)
                        .add_modifier(Modifier::BOLD),
                ))
            } else if selected.contains(item) {
                Line::from(Span::styled(text, Style::default().fg(theme.accent)))
            } else {
                Line::from(Span::styled(text, Style::default().fg(theme.dim)))
            }
        })
        .collect();

    let block = panel_block(app, panel, summary);
    f.render_widget(
        Paragraph::new(lines)
            .block(block)
            .style(Style::default().bg(theme.panel_bg)),
        area,
    );
}

fn render_temperature(f: &mut Frame, area: Rect, app: &App) {
    let theme = theme(app.theme_mode);
    let temp = &app.filters.temperature;
    let (state, state_style) = if temp.enabled {
        ("ON", Style::default().fg(Color::Green))
    } else {
        ("OFF", Style::default().fg(theme.dim))
    };
    let values = app.panel_items(Panel::Temperature);
    let mut lines = vec![Line::from(vec![
        Span::styled("Filter ", Style::default().fg(theme.dim)),
        Span::styled(state, state_style),
        Span::styled(
            format!("  unit {}", temp.unit.label()),
            Style::default().fg(theme.dim),
        ),
    ])];
    for (i, (label, value)) in ["From", "To"].iter().zip(values.iter()).enumerate() {
        lines.push(field_line(app, &theme, Panel::Temperature, i, label, value, temp.enabled));
    }
    let block = panel_block(app, Panel::Temperature, String::new());
    f.render_widget(
        Paragraph::new(lines)
            .block(block)
            .style(Style::default().bg(theme.panel_bg)),
        area,
    );
}

fn render_dates(f: &mut Frame, area: Rect, app: &App) {
    let theme = theme(app.theme_mode);
    let values = app.panel_items(Panel::Dates);
    let lines: Vec<Line> = ["From", "To"]
        .iter()
        .zip(values.iter())
        .enumerate()
        .map(|(i, (label, value))| field_line(app, &theme, Panel::Dates, i, label, value, true))
        .collect();
    let block = panel_block(app, Panel::Dates, String::new());
    f.render_widget(
        Paragraph::new(lines)
            .block(block)
            .style(Style::default().bg(theme.panel_bg)),
        area,
    );
}

fn render_time_slots(f: &mut Frame, area: Rect, app: &App) {
    let theme = theme(app.theme_mode);
    let values = app.panel_items(Panel::TimeSlots);
    let lines: Vec<Line> = if values.is_empty() {
        vec![Line::from(Span::styled(
            "Any time of day (n to add a slot)",
            Style::default().fg(theme.dim),
        ))]
    } else {
        values
            .iter()
            .enumerate()
            .map(|(i, value)| {
                let label = format!("Slot {}", i + 1);
                field_line(app, &theme, Panel::TimeSlots, i, &label, value, true)
            })
            .collect()
    };
    let summary = format!(
        "{}/{}",
        app.filters.time_slots.len(),
        crate::filters::MAX_TIME_SLOTS
    );
    let block = panel_block(app, Panel::TimeSlots, summary);
    f.render_widget(
        Paragraph::new(lines)
            .block(block)
            .style(Style::default().bg(theme.panel_bg)),
        area,
    );
}

fn field_line(
    app: &App,
    theme: &Theme,
    panel: Panel,
    row: usize,
    label: &str,
    value: &str,
    active: bool,
) -> Line<'static> {
    let value = if value.is_empty() { "--" } else { value };
    let text = format!(" {label:<6} {value}");
    let style = if app.panel == panel && app.cursor(panel) == row {
        Style::default()
            .fg(theme.highlight_fg)
            .bg(theme.highlight_bg)
            .add_modifier(Modifier::BOLD)
    } else if active {
        Style::default()
    } else {
        Style::default().fg(theme.dim)
    };
    Line::from(Span::styled(text, style))
}

fn panel_block(app: &App, panel: Panel, summary: String) -> Block<'static> {
    let theme = theme(app.theme_mode);
    let title = if summary.is_empty() {
        panel.title().to_uppercase()
    } else {
        format!("{} · {summary}", panel.title().to_uppercase())
    };
    let border = if app.panel == panel {
        Style::default().fg(theme.accent)
    } else {
        Style::default().fg(theme.dim)
    };
    Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(border)
        .title(title)
}

fn render_results_side(f: &mut Frame, area: Rect, app: &App) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(4),
            Constraint::Min(6),
            Constraint::Length(3),
        ])
        .split(area);

    render_preset_box(f, rows[0], app);
    render_summary(f, rows[1], app);
    render_bins(f, rows[2], app);
    render_legend(f, rows[3], app);

    if app.presets.dropdown_open() {
        let below = Rect {
            x: rows[0].x,
            y: rows[0].y + rows[0].height,
            width: rows[0].width,
            height: area.height.saturating_sub(rows[0].height).min(12),
        };
        render_preset_dropdown(f, below, app);
    }
}

fn render_preset_box(f: &mut Frame, area: Rect, app: &App) {
    let theme = theme(app.theme_mode);
    let focused = app.presets.focus_state() == SearchFocus::Focused;
    let query = app.presets.query();
    let line = if query.is_empty() && !focused {
        Line::from(Span::styled(
            "Search presets (/)",
            Style::default().fg(theme.dim),
        ))
    } else {
        let cursor = if focused && phase_ms(500) { "_" } else { " " };
        Line::from(vec![
            Span::raw(query.to_string()),
            Span::styled(cursor, Style::default().fg(theme.accent)),
        ])
    };
    let border = if focused {
        Style::default().fg(theme.accent)
    } else {
        Style::default().fg(theme.dim)
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(border)
        .title(match app.presets.presets().len() {
            0 => "PRESETS".to_string(),
            n => format!("PRESETS · {n}"),
        });
    f.render_widget(
        Paragraph::new(line)
            .block(block)
            .style(Style::default().bg(theme.panel_bg)),
        area,
    );
}

fn render_preset_dropdown(f: &mut Frame, area: Rect, app: &App) {
    let theme = theme(app.theme_mode);
    let visible = app.presets.visible();
    let mut lines = Vec::new();
    if app.presets.is_loading() {
        lines.push(Line::from(Span::styled(
            "Loading presets…",
            Style::default().fg(theme.dim),
        )));
    } else if let Some(err) = app.presets.last_error() {
        lines.push(Line::from(Span::styled(
            format!("presets unavailable: {err}"),
            Style::default().fg(theme.danger),
        )));
    } else if app.presets.show_no_results() {
        lines.push(Line::from(Span::styled(
            "No presets found",
            Style::default().fg(theme.dim),
        )));
    }
    for (i, preset) in visible.iter().enumerate() {
        let mut spans = vec![Span::raw(format!(" {}", preset.name))];
        if let Some(description) = preset.description.as_deref().filter(|d| !d.is_empty()) {
            spans.push(Span::styled(
                format!("  {}", truncate(description, 40)),
                Style::default().fg(theme.dim),
            ));
        }
        let mut line = Line::from(spans);
        if app.presets.highlighted() == Some(i) {
            line = line.style(
                Style::default()
                    .fg(theme.highlight_fg)
                    .bg(theme.highlight_bg)
                    .add_modifier(Modifier::BOLD),
            );
        }
        lines.push(line);
    }
    if lines.is_empty() {
        return;
    }
    let height = (lines.len() as u16 + 2).min(area.height);
    if height < 3 {
        return;
    }
    let popup = Rect { height, ..area };
    f.render_widget(Clear, popup);
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(theme.accent));
    f.render_widget(
        Paragraph::new(lines)
            .block(block)
            .style(Style::default().bg(theme.panel_bg)),
        popup,
    );
}

fn render_summary(f: &mut Frame, area: Rect, app: &App) {
    let theme = theme(app.theme_mode);
    let mut lines = Vec::new();
    match app.search.summary_text() {
        Some(text) => {
            let style = if app.results_out_of_date() {
                Style::default().fg(theme.dim)
            } else {
                Style::default().fg(theme.accent).add_modifier(Modifier::BOLD)
            };
            lines.push(Line::from(Span::styled(text, style)));
        }
        None => lines.push(Line::from(Span::styled(
            "No search yet. Press Enter to search.",
            Style::default().fg(theme.dim),
        ))),
    }
    lines.push(Line::from(Span::styled(
        format!(
            "{} map points in {} bins",
            app.search.points().len(),
            app.bins.len()
        ),
        Style::default().fg(theme.dim),
    )));
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .title("SUMMARY");
    f.render_widget(
        Paragraph::new(lines)
            .block(block)
            .style(Style::default().bg(theme.panel_bg)),
        area,
    );
}

fn render_bins(f: &mut Frame, area: Rect, app: &App) {
    let theme = theme(app.theme_mode);
    let header = Row::new(
        ["LAT", "LON", "COUNT", "AVG °C", "MIN", "MAX"]
            .into_iter()
            .map(|label| {
                Cell::from(label).style(
                    Style::default()
                        .fg(theme.accent)
                        .bg(theme.header_bg)
                        .add_modifier(Modifier::BOLD),
                )
            }),
    )
    .height(1);

    let visible = area.height.saturating_sub(3).max(1) as usize;
    let cursor = app.cursor(Panel::Results);
    let start = scroll_start(cursor, app.bins.len(), visible);
    let focused = app.panel == Panel::Results;

    let rows = app
        .bins
        .iter()
        .enumerate()
        .skip(start)
        .take(visible)
        .map(|(i, bin)| {
            let mut style = if i % 2 == 0 {
                Style::default().bg(theme.row_even_bg)
            } else {
                Style::default().bg(theme.row_odd_bg)
            };
            if focused && i == cursor {
                style = style
                    .fg(theme.highlight_fg)
                    .bg(theme.highlight_bg)
                    .add_modifier(Modifier::BOLD);
            }
            let swatch = theme.legend[bin.legend_step().min(LEGEND_STEPS - 1)];
            Row::new(vec![
                Cell::from(format!("{:>8.3}", bin.center.lat)),
                Cell::from(format!("{:>8.3}", bin.center.lon)),
                Cell::from(format!("{:>6}", bin.summary.count)),
                Cell::from(format!("{:>6.1}", round1(bin.summary.avg_temp)))
                    .style(Style::default().fg(swatch).add_modifier(Modifier::BOLD)),
                Cell::from(format!("{:>5.1}", round1(bin.summary.min))),
                Cell::from(format!("{:>5.1}", round1(bin.summary.max))),
            ])
            .style(style)
        });

    let widths = [
        Constraint::Length(9),
        Constraint::Length(9),
        Constraint::Length(7),
        Constraint::Length(7),
        Constraint::Length(6),
        Constraint::Length(6),
    ];
    let title = match app.bins.get(cursor) {
        Some(bin) if focused => format!(
            "HEXBINS · {}",
            crate::hex::format_summary(&bin.summary)
        ),
        _ => "HEXBINS".to_string(),
    };
    let table = Table::new(rows, widths)
        .header(header)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(if focused {
                    Style::default().fg(theme.accent)
                } else {
                    Style::default().fg(theme.dim)
                })
                .title(title),
        )
        .style(Style::default().bg(theme.panel_bg));
    f.render_widget(table, area);
}

fn render_legend(f: &mut Frame, area: Rect, app: &App) {
    let theme = theme(app.theme_mode);
    let (low, high) = LEGEND_DOMAIN;
    let step = (high - low) / LEGEND_STEPS as f64;
    let mut spans = Vec::new();
    for (i, color) in theme.legend.iter().enumerate() {
        let from = low + step * i as f64;
        spans.push(Span::styled("██", Style::default().fg(*color)));
        spans.push(Span::styled(
            format!(" {from:.0}+ "),
            Style::default().fg(theme.dim),
        ));
    }
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .title("AVG °C");
    f.render_widget(
        Paragraph::new(Line::from(spans))
            .block(block)
            .style(Style::default().bg(theme.panel_bg)),
        area,
    );
}

fn render_footer(f: &mut Frame, area: Rect, app: &App) {
    let theme = theme(app.theme_mode);
    let help = match app.input_mode {
        InputMode::Normal => {
            "q quit  Tab panel  Space toggle  a all  e edit  Enter search  x export  f format  m map  +/- zoom  / presets  r reset  t theme  ? help"
        }
        InputMode::Edit(_) => "Enter apply  Esc cancel  Ctrl+U clear",
        InputMode::Presets => "Type to filter  Up/Down highlight  Enter apply/search  Tab leave  Esc close",
        InputMode::Help => "Esc close",
    };
    let mut spans = vec![Span::styled(help, Style::default().fg(theme.dim))];
    if let Some(message) = app.status_text() {
        spans.push(Span::raw("  "));
        spans.push(Span::styled(
            message.to_string(),
            Style::default().fg(theme.warn).add_modifier(Modifier::BOLD),
        ));
    }
    if let Some((path, when)) = &app.last_export {
        if let Ok(delta) = SystemTime::now().duration_since(*when) {
            if delta <= STATUS_TTL {
                spans.push(Span::raw("  "));
                spans.push(Span::styled(
                    format!("SAVED {}", path.display()),
                    Style::default().fg(theme.accent).add_modifier(Modifier::BOLD),
                ));
            }
        }
    }
    let paragraph = Paragraph::new(Line::from(spans)).style(Style::default().bg(theme.panel_bg));
    f.render_widget(paragraph, area);
}

fn render_edit_popup(f: &mut Frame, area: Rect, app: &App) {
    let InputMode::Edit(field) = app.input_mode else {
        return;
    };
    let theme = theme(app.theme_mode);
    let popup = centered_rect(60, 5, area);
    f.render_widget(Clear, popup);
    let lines = vec![
        Line::from(vec![
            Span::raw(app.edit_buffer.clone()),
            Span::styled("_", Style::default().fg(theme.accent)),
        ]),
        Line::from(Span::styled(
            "Enter apply • Esc cancel • empty clears",
            Style::default().fg(theme.dim),
        )),
    ];
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .title(field.label());
    f.render_widget(
        Paragraph::new(lines)
            .block(block)
            .style(Style::default().bg(theme.panel_bg)),
        popup,
    );
}

fn render_help_menu(f: &mut Frame, area: Rect, app: &App) {
    let theme = theme(app.theme_mode);
    let popup = centered_rect(70, 26, area);

    f.render_widget(Clear, popup);

    let section = |title: &'static str| {
        Line::from(Span::styled(
            title,
            Style::default().fg(theme.dim).add_modifier(Modifier::BOLD),
        ))
    };
    let lines = vec![
        Line::from(Span::styled(
            "HELP",
            Style::default().fg(theme.accent).add_modifier(Modifier::BOLD),
        )),
        section("Navigation"),
        Line::from("  Tab / S-Tab  Next / previous panel"),
        Line::from("  ↑/↓          Move within a panel"),
        Line::from(""),
        section("Filters"),
        Line::from("  Space        Toggle item (temperature: enable filter)"),
        Line::from("  a            Select all / clear all"),
        Line::from("  e            Edit temperature, date or time slots"),
        Line::from("  u            Toggle °C / °F"),
        Line::from("  n / d        Add / remove time slot"),
        Line::from("  r            Reset all filters"),
        Line::from(""),
        section("Search & Export"),
        Line::from("  Enter        Search with current filters"),
        Line::from("  f            Cycle export format (CSV/XML/JSON/GeoJSON)"),
        Line::from("  x            Export last search"),
        Line::from("  m            Refresh hexbins · +/- zoom"),
        Line::from("  /            Search presets"),
        Line::from("  R            Retry failed location/preset loads"),
        Line::from(""),
        section("Display"),
        Line::from("  t            Cycle theme"),
        Line::from("  q            Quit"),
        Line::from(""),
        Line::from(Span::styled(
            "Press Esc to close",
            Style::default().fg(theme.dim),
        )),
    ];

    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .title("HELP");
    let paragraph = Paragraph::new(lines)
        .block(block)
        .wrap(Wrap { trim: true })
        .style(Style::default().bg(theme.panel_bg));
    f.render_widget(paragraph, popup);
}

fn centered_rect(percent_x: u16, height: u16, area: Rect) -> Rect {
    let height = height.min(area.height.saturating_sub(2)).max(3);
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(1),
            Constraint::Length(height),
            Constraint::Min(1),
        ])
        .split(area);
    let vertical = popup_layout[1];
    let width = (vertical.width * percent_x / 100).max(20);
    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Min(1),
            Constraint::Length(width),
            Constraint::Min(1),
        ])
        .split(vertical);
    horizontal[1]
}

/// First row to draw so that `cursor` stays on screen.
fn scroll_start(cursor: usize, total: usize, visible: usize) -> usize {
    if total <= visible {
        return 0;
    }
    cursor
        .saturating_sub(visible / 2)
        .min(total.saturating_sub(visible))
}

fn truncate(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        return value.to_string();
    }
    let mut out: String = value.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn phase_ms(period_ms: u64) -> bool {
    if period_ms == 0 {
        return true;
    }
    (now_ms() / period_ms) % 2 == 0
}

fn phase_index(period_ms: u64, frames: usize) -> usize {
    if frames == 0 || period_ms == 0 {
        return 0;
    }
    ((now_ms() / period_ms) as usize) % frames
}

fn theme(mode: ThemeMode) -> Theme {
    match mode {
        ThemeMode::Default => Theme {
            accent: Color::Rgb(90, 170, 255),
            warn: Color::Yellow,
            danger: Color::Red,
            dim: Color::DarkGray,
            highlight_fg: Color::Black,
            highlight_bg: Color::Rgb(200, 200, 200),
            row_even_bg: Color::Rgb(20, 20, 24),
            row_odd_bg: Color::Rgb(12, 12, 16),
            header_bg: Color::Rgb(24, 24, 28),
            panel_bg: Color::Rgb(18, 18, 22),
            legend: [
                Color::Rgb(49, 130, 189),
                Color::Rgb(107, 174, 214),
                Color::Rgb(254, 224, 139),
                Color::Rgb(252, 141, 89),
                Color::Rgb(215, 48, 39),
            ],
        },
        ThemeMode::Ocean => Theme {
            accent: Color::Rgb(0, 200, 220),
            warn: Color::Rgb(255, 210, 120),
            danger: Color::LightRed,
            dim: Color::Rgb(70, 110, 130),
            highlight_fg: Color::Black,
            highlight_bg: Color::Rgb(0, 200, 220),
            row_even_bg: Color::Rgb(8, 22, 32),
            row_odd_bg: Color::Rgb(4, 16, 24),
            header_bg: Color::Rgb(10, 30, 42),
            panel_bg: Color::Rgb(6, 20, 30),
            legend: [
                Color::Rgb(8, 64, 129),
                Color::Rgb(43, 140, 190),
                Color::Rgb(123, 204, 196),
                Color::Rgb(204, 235, 197),
                Color::Rgb(240, 249, 232),
            ],
        },
        ThemeMode::Monochrome => Theme {
            accent: Color::White,
            warn: Color::Gray,
            danger: Color::White,
            dim: Color::DarkGray,
            highlight_fg: Color::Black,
            highlight_bg: Color::White,
            row_even_bg: Color::Black,
            row_odd_bg: Color::Rgb(16, 16, 16),
            header_bg: Color::Rgb(24, 24, 24),
            panel_bg: Color::Black,
            legend: [
                Color::Rgb(80, 80, 80),
                Color::Rgb(120, 120, 120),
                Color::Rgb(160, 160, 160),
                Color::Rgb(200, 200, 200),
                Color::Rgb(240, 240, 240),
            ],
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scroll_keeps_cursor_visible() {
        assert_eq!(scroll_start(0, 5, 10), 0);
        assert_eq!(scroll_start(9, 20, 6), 6);
        assert_eq!(scroll_start(19, 20, 6), 14);
    }

    #[test]
    fn truncate_marks_cut_text() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a long description", 6), "a lon…");
    }

    #[test]
    fn centered_rect_fits_area() {
        let area = Rect::new(0, 0, 100, 40);
        let popup = centered_rect(50, 10, area);
        assert_eq!(popup.width, 50);
        assert_eq!(popup.height, 10);
        assert!(popup.x + popup.width <= area.width);
    }
}
