use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, BorderType, Borders, Clear, Paragraph, Wrap},
};
use crate::app::{App, ChatRole, ConnectionState};
use crate::launcher::{Launcher, LAUNCHER_HEIGHT};

const PANEL_MAX_WIDTH: u16 = 64;

/// Parse a line of text and convert **bold** markdown to styled spans
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut chars = text.chars().peekable();
    let mut current_text = String::new();

    while let Some(c) = chars.next() {
        if c == '*' && chars.peek() == Some(&'*') {
            chars.next();

            // Find closing **
            let mut bold_text = String::new();
            let mut found_close = false;
            while let Some(c) = chars.next() {
                if c == '*' && chars.peek() == Some(&'*') {
                    chars.next();
                    found_close = true;
                    break;
                }
                bold_text.push(c);
            }

            if found_close && !bold_text.is_empty() {
                if !current_text.is_empty() {
                    spans.push(Span::raw(std::mem::take(&mut current_text)));
                }
                spans.push(Span::styled(bold_text, Style::default().add_modifier(Modifier::BOLD)));
            } else {
                // No closing **, treat as literal
                current_text.push_str("**");
                current_text.push_str(&bold_text);
                if found_close {
                    current_text.push_str("**");
                }
            }
        } else {
            current_text.push(c);
        }
    }

    if !current_text.is_empty() {
        spans.push(Span::raw(current_text));
    }

    Line::from(spans)
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    let launcher_area = Launcher::area(area);
    app.launcher_area = Some(launcher_area);

    if app.chat.is_open {
        let width = PANEL_MAX_WIDTH.min(area.width);
        let height = area.height.saturating_sub(LAUNCHER_HEIGHT);
        let panel_area = Rect {
            x: area.x + area.width - width,
            y: area.y,
            width,
            height,
        };
        render_panel(app, frame, panel_area);
    } else {
        app.transcript_area = None;
        app.quick_button_areas.clear();
        render_closed_hint(frame, area);
    }

    frame.render_widget(Launcher::new(app.chat.is_open), launcher_area);
}

fn render_closed_hint(frame: &mut Frame, area: Rect) {
    if area.height == 0 {
        return;
    }
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let hint = Line::from(vec![
        Span::styled(" Enter ", key_style),
        Span::raw(" open chat "),
        Span::styled(" q ", key_style),
        Span::raw(" quit "),
    ]);
    let hint_area = Rect {
        x: area.x,
        y: area.y + area.height - 1,
        width: area.width,
        height: 1,
    };
    frame.render_widget(Paragraph::new(hint), hint_area);
}

fn render_panel(app: &mut App, frame: &mut Frame, area: Rect) {
    frame.render_widget(Clear, area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(Color::Cyan))
        .title(Span::styled(format!(" {} ", app.title), Style::default().fg(Color::Cyan).bold()))
        .title_bottom(Line::from(" Tab buttons · Enter send · Esc close ").right_aligned());
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let buttons_height = if app.quick_buttons.is_empty() { 0 } else { 3 };
    let [header_area, transcript_area, buttons_area, input_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(buttons_height),
        Constraint::Length(3),
    ])
    .areas(inner);

    render_header(app, frame, header_area);
    render_transcript(app, frame, transcript_area);
    render_quick_buttons(app, frame, buttons_area);
    render_input(app, frame, input_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let (badge, color) = match app.connection {
        ConnectionState::Connected => ("● online", Color::Green),
        ConnectionState::Connecting => ("◌ connecting", Color::Yellow),
        ConnectionState::Disconnected => ("○ offline", Color::Red),
    };

    let header = Line::from(vec![
        Span::styled(format!(" {} ", app.subtitle), Style::default().fg(Color::White).bold()),
        Span::styled(badge, Style::default().fg(color)),
    ]);
    frame.render_widget(Paragraph::new(header), area);
}

fn render_transcript(app: &mut App, frame: &mut Frame, area: Rect) {
    app.transcript_area = Some(area);

    // Store transcript dimensions for scroll calculations
    app.chat_height = area.height;
    app.chat_width = area.width;
    if app.follow_tail {
        app.scroll_to_bottom();
    }

    let bot_style = Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD);

    let text = if app.messages.is_empty() && !app.chat.is_typing {
        Text::from(Span::styled(
            "Say hello to start the conversation...",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        let mut lines: Vec<Line> = Vec::new();

        for msg in &app.messages {
            match msg.role {
                ChatRole::User => {
                    lines.push(Line::from(Span::styled(
                        "You:",
                        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                    )));
                    lines.push(Line::from(msg.content.as_str()));
                }
                ChatRole::Bot => {
                    lines.push(Line::from(Span::styled(format!("{}:", app.subtitle), bot_style)));
                    for line in msg.content.lines() {
                        lines.push(parse_markdown_line(line));
                    }
                    if msg.content.is_empty() {
                        lines.push(Line::default());
                    }
                }
            }
            lines.push(Line::default());
        }

        if app.chat.is_typing {
            lines.push(Line::from(Span::styled(format!("{}:", app.subtitle), bot_style)));
            // Animated dots: cycles through ".", "..", "..."
            let dots = ".".repeat((app.animation_frame as usize) + 1);
            lines.push(Line::from(Span::styled(
                format!("typing{}", dots),
                Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
            )));
        }

        Text::from(lines)
    };

    let transcript = Paragraph::new(text)
        .wrap(Wrap { trim: false })
        .scroll((app.scroll, 0));
    frame.render_widget(transcript, area);
}

fn render_quick_buttons(app: &mut App, frame: &mut Frame, area: Rect) {
    app.quick_button_areas.clear();
    if area.height == 0 {
        return;
    }

    let mut x = area.x;
    for (i, button) in app.quick_buttons.iter().enumerate() {
        let label_width = u16::try_from(button.label.chars().count()).unwrap_or(u16::MAX);
        let width = label_width.saturating_add(4);
        if x.saturating_add(width) > area.right() {
            break;
        }
        let button_area = Rect { x, y: area.y, width, height: area.height };

        let selected = app.selected_button == Some(i);
        let style = if selected {
            Style::default().bg(Color::Magenta).fg(Color::White).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Magenta)
        };

        let widget = Paragraph::new(button.label.as_str())
            .centered()
            .style(style)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_type(BorderType::Rounded)
                    .border_style(style),
            );
        frame.render_widget(widget, button_area);
        app.quick_button_areas.push(button_area);

        x = x.saturating_add(width).saturating_add(1);
    }
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let enabled = app.chat.is_enabled;
    let (title, border_color) = if enabled {
        (" Message ", Color::Yellow)
    } else {
        (" Waiting for connection ", Color::DarkGray)
    };

    let input = Paragraph::new(app.input.as_str())
        .style(if enabled { Style::default() } else { Style::default().fg(Color::DarkGray) })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(border_color))
                .title(title),
        );
    frame.render_widget(input, area);

    if enabled && app.selected_button.is_none() && area.width > 2 && area.height > 2 {
        let cursor = u16::try_from(app.input_cursor).unwrap_or(u16::MAX);
        let cursor_x = area.x.saturating_add(1).saturating_add(cursor).min(area.right() - 2);
        frame.set_cursor_position((cursor_x, area.y + 1));
    }
}
