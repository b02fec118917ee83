use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

use crate::app::{App, AppMode, DialogKind, FormField, PickKind};
use crate::attachments::attachment_filename;

pub fn ui(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4),      // SMTP settings
            Constraint::Min(10),        // Message form + images
            Constraint::Percentage(30), // Log
            Constraint::Length(1),      // Status bar
        ])
        .split(f.size());

    render_smtp_settings(f, app, chunks[0]);
    render_message_area(f, app, chunks[1]);
    render_log(f, app, chunks[2]);
    render_status_bar(f, app, chunks[3]);

    match app.mode {
        AppMode::ImagePrompt(kind) => render_image_prompt(f, app, kind),
        AppMode::Confirm => render_confirm(f, app),
        AppMode::Dialog => render_dialog(f, app),
        AppMode::Form | AppMode::Sending => {}
    }
}

fn field_style(app: &App, field: FormField) -> Style {
    if app.focus == field && app.mode == AppMode::Form {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    }
}

fn field_line<'a>(app: &'a App, field: FormField) -> Line<'a> {
    let value = if field == FormField::Password {
        "*".repeat(app.password.chars().count())
    } else {
        app.field(field).to_string()
    };

    let cursor = if app.focus == field && app.mode == AppMode::Form { "█" } else { "" };

    Line::from(vec![
        Span::styled(format!("{}: ", field.label()), Style::default().fg(Color::Gray)),
        Span::styled(value, field_style(app, field)),
        Span::raw(cursor),
    ])
}

fn render_smtp_settings(f: &mut Frame, app: &App, area: Rect) {
    let text = vec![
        Line::from(
            [field_line(app, FormField::SmtpServer), field_line(app, FormField::Port)]
                .into_iter()
                .flat_map(|line| {
                    let mut spans = line.spans;
                    spans.push(Span::raw("   "));
                    spans
                })
                .collect::<Vec<_>>(),
        ),
        Line::from(
            [field_line(app, FormField::Username), field_line(app, FormField::Password)]
                .into_iter()
                .flat_map(|line| {
                    let mut spans = line.spans;
                    spans.push(Span::raw("   "));
                    spans
                })
                .collect::<Vec<_>>(),
        ),
    ];

    let settings = Paragraph::new(text)
        .block(Block::default().title("SMTP (Ctrl+S kaydet)").borders(Borders::ALL));
    f.render_widget(settings, area);
}

fn render_message_area(f: &mut Frame, app: &App, area: Rect) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
        .split(area);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(40), // Recipients
            Constraint::Length(3),      // Subject
            Constraint::Min(3),         // Body
        ])
        .split(columns[0]);

    render_text_box(f, app, FormField::Recipients, rows[0]);
    render_text_box(f, app, FormField::Subject, rows[1]);
    render_text_box(f, app, FormField::Body, rows[2]);
    render_image_panel(f, app, columns[1]);
}

fn render_text_box(f: &mut Frame, app: &App, field: FormField, area: Rect) {
    let mut content = app.field(field).to_string();
    if app.focus == field && app.mode == AppMode::Form {
        content.push('█');
    }

    let border_style = field_style(app, field);
    let widget = Paragraph::new(content)
        .block(
            Block::default()
                .title(field.label())
                .borders(Borders::ALL)
                .border_style(border_style),
        )
        .wrap(Wrap { trim: false });
    f.render_widget(widget, area);
}

fn render_image_panel(f: &mut Frame, app: &App, area: Rect) {
    let mut text = vec![Line::from(app.images.to_string()), Line::from("")];

    match app.images.first_image() {
        Some(path) => text.push(Line::from(format!("1. alıcı: {}", attachment_filename(&path)))),
        None if !app.images.is_none() => {
            text.push(Line::styled("1.png bulunamadı", Style::default().fg(Color::Red)))
        }
        None => {}
    }

    text.extend([
        Line::from(""),
        Line::from("Ctrl+F  Klasör seç"),
        Line::from("Ctrl+O  Tek resim seç"),
        Line::from("Ctrl+X  Temizle"),
        Line::from(""),
        Line::from("F5 / Ctrl+G  Gönder"),
        Line::from("Ctrl+L  Log temizle"),
        Line::from("Esc  Çıkış"),
    ]);

    let panel = Paragraph::new(text)
        .block(Block::default().title("Resim Ayarları").borders(Borders::ALL))
        .wrap(Wrap { trim: true });
    f.render_widget(panel, area);
}

fn render_log(f: &mut Frame, app: &App, area: Rect) {
    let visible = area.height.saturating_sub(2) as usize;
    let start = app.log.len().saturating_sub(visible);

    let lines: Vec<Line> = app.log[start..]
        .iter()
        .map(|line| {
            let style = if line.contains("] Hata -> ") {
                Style::default().fg(Color::Red)
            } else {
                Style::default().fg(Color::Green)
            };
            Line::styled(line.as_str(), style)
        })
        .collect();

    let log = Paragraph::new(lines).block(Block::default().title("Log").borders(Borders::ALL));
    f.render_widget(log, area);
}

fn render_status_bar(f: &mut Frame, app: &App, area: Rect) {
    let text = if let Some(error) = &app.error_message {
        format!("ERROR: {}", error)
    } else if let Some(info) = &app.info_message {
        format!("INFO: {}", info)
    } else {
        format!("Durum: {} | Log: {} satır", app.stage, app.log.len())
    };

    let status = Paragraph::new(text).style(Style::default().bg(Color::Blue).fg(Color::White));
    f.render_widget(status, area);
}

fn render_image_prompt(f: &mut Frame, app: &App, kind: PickKind) {
    let title = match kind {
        PickKind::Folder => "Klasör Seç",
        PickKind::Single => "Tek Resim Seç",
    };

    let area = centered_rect(60, 20, f.size());
    let prompt = Paragraph::new(vec![
        Line::from(format!("{}█", app.prompt_input)),
        Line::from(""),
        Line::styled(
            "Enter: seç  Esc: iptal  Tab: ev dizini",
            Style::default().fg(Color::Gray),
        ),
    ])
    .block(Block::default().title(title).borders(Borders::ALL));

    f.render_widget(Clear, area);
    f.render_widget(prompt, area);
}

fn render_confirm(f: &mut Frame, app: &App) {
    let message = app.confirmation_prompt().unwrap_or_default();

    let area = centered_rect(50, 20, f.size());
    let confirm = Paragraph::new(vec![
        Line::from(message),
        Line::from(""),
        Line::styled("[y] Evet   [n] Hayır", Style::default().add_modifier(Modifier::BOLD)),
    ])
    .block(Block::default().title("Onay").borders(Borders::ALL))
    .wrap(Wrap { trim: true });

    f.render_widget(Clear, area);
    f.render_widget(confirm, area);
}

fn render_dialog(f: &mut Frame, app: &App) {
    let Some(dialog) = &app.dialog else {
        return;
    };

    let color = match dialog.kind {
        DialogKind::Info => Color::Green,
        DialogKind::Warning => Color::Yellow,
        DialogKind::Error => Color::Red,
    };

    let mut text: Vec<Line> = dialog.message.lines().map(Line::from).collect();
    text.push(Line::from(""));
    text.push(Line::styled("Enter: kapat", Style::default().fg(Color::Gray)));

    let area = centered_rect(60, 30, f.size());
    let widget = Paragraph::new(text)
        .block(
            Block::default()
                .title(dialog.title.as_str())
                .borders(Borders::ALL)
                .border_style(Style::default().fg(color)),
        )
        .wrap(Wrap { trim: false });

    f.render_widget(Clear, area);
    f.render_widget(widget, area);
}

// Helper function to create a centered rect
fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
