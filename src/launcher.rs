use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Rect},
    style::{Color, Modifier, Style},
    widgets::{Block, BorderType, Borders, Paragraph, Widget},
};

pub const LAUNCHER_WIDTH: u16 = 11;
pub const LAUNCHER_HEIGHT: u16 = 3;

/// The always-visible button that opens and closes the chat panel.
#[derive(Debug, Clone, Copy)]
pub struct Launcher {
    pub is_open: bool,
}

impl Launcher {
    pub fn new(is_open: bool) -> Self {
        Self { is_open }
    }

    pub fn label(&self) -> &'static str {
        if self.is_open {
            "✕ Close"
        } else {
            "✉ Chat"
        }
    }

    /// Bottom-right corner of `area`, clamped to fit.
    pub fn area(container: Rect) -> Rect {
        let width = LAUNCHER_WIDTH.min(container.width);
        let height = LAUNCHER_HEIGHT.min(container.height);
        Rect {
            x: container.x + container.width - width,
            y: container.y + container.height - height,
            width,
            height,
        }
    }
}

impl Widget for Launcher {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let style = if self.is_open {
            Style::default().fg(Color::White).bg(Color::Red).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Black).bg(Color::Cyan).add_modifier(Modifier::BOLD)
        };

        Paragraph::new(self.label())
            .alignment(Alignment::Center)
            .style(style)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_type(BorderType::Rounded)
                    .border_style(style),
            )
            .render(area, buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row_text(buf: &Buffer, y: u16) -> String {
        let width = buf.area.width as usize;
        buf.content()[(y as usize) * width..(y as usize + 1) * width]
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    #[test]
    fn test_closed_and_open_labels() {
        let area = Rect::new(0, 0, LAUNCHER_WIDTH, LAUNCHER_HEIGHT);

        let mut closed = Buffer::empty(area);
        Launcher::new(false).render(area, &mut closed);
        assert!(row_text(&closed, 1).contains("Chat"));

        let mut open = Buffer::empty(area);
        Launcher::new(true).render(area, &mut open);
        assert!(row_text(&open, 1).contains("Close"));
    }

    #[test]
    fn test_area_sits_bottom_right() {
        let area = Launcher::area(Rect::new(0, 0, 80, 24));
        assert_eq!(
            area,
            Rect::new(80 - LAUNCHER_WIDTH, 24 - LAUNCHER_HEIGHT, LAUNCHER_WIDTH, LAUNCHER_HEIGHT)
        );

        let tiny = Launcher::area(Rect::new(0, 0, 5, 2));
        assert_eq!(tiny, Rect::new(0, 0, 5, 2));
    }
}
