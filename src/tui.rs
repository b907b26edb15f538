use std::io::{self, Stderr};
use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyEvent, KeyEventKind, MouseEvent},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use futures_util::StreamExt;
use tokio::sync::mpsc;

use crate::app::ChatAction;
use crate::processor::ChatSurface;
use crate::protocol::QuickButton;
use crate::socket::SocketEvent;

pub type Tui = Terminal<CrosstermBackend<Stderr>>;

#[derive(Debug)]
#[allow(dead_code)]
pub enum AppEvent {
    Key(KeyEvent),
    Mouse(MouseEvent),
    Resize(u16, u16),
    Tick,
    Socket(SocketEvent),
    Chat(ChatAction),
}

pub struct EventHandler {
    rx: mpsc::UnboundedReceiver<AppEvent>,
    tx: mpsc::UnboundedSender<AppEvent>,
}

impl EventHandler {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        // Spawn event reader task
        let tx_events = tx.clone();
        tokio::spawn(async move {
            let mut reader = event::EventStream::new();
            while let Some(evt) = reader.next().await {
                let Ok(evt) = evt else { continue };
                let app_event = match evt {
                    Event::Key(key) => {
                        // Only handle key press events, not release
                        if key.kind == KeyEventKind::Press {
                            Some(AppEvent::Key(key))
                        } else {
                            None
                        }
                    }
                    Event::Mouse(mouse) => Some(AppEvent::Mouse(mouse)),
                    Event::Resize(w, h) => Some(AppEvent::Resize(w, h)),
                    _ => None,
                };

                if let Some(event) = app_event {
                    if tx_events.send(event).is_err() {
                        break;
                    }
                }
            }
        });

        // Spawn tick timer for the typing animation (300ms interval)
        let tx_tick = tx.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_millis(300));
            loop {
                interval.tick().await;
                if tx_tick.send(AppEvent::Tick).is_err() {
                    break;
                }
            }
        });

        Self { rx, tx }
    }

    /// Sender for tasks that feed the run loop.
    pub fn sender(&self) -> mpsc::UnboundedSender<AppEvent> {
        self.tx.clone()
    }

    /// Forward socket events into the run loop.
    pub fn attach_socket(&self, mut socket_rx: mpsc::UnboundedReceiver<SocketEvent>) {
        let tx_socket = self.tx.clone();
        tokio::spawn(async move {
            while let Some(event) = socket_rx.recv().await {
                if tx_socket.send(AppEvent::Socket(event)).is_err() {
                    break;
                }
            }
        });
    }

    pub async fn next(&mut self) -> Option<AppEvent> {
        self.rx.recv().await
    }
}

/// Reply units reach the run loop as chat actions.
impl ChatSurface for mpsc::UnboundedSender<AppEvent> {
    fn add_response_message(&mut self, text: String) {
        let _ = self.send(AppEvent::Chat(ChatAction::AddResponse(text)));
    }

    fn set_quick_buttons(&mut self, buttons: Vec<QuickButton>) {
        let _ = self.send(AppEvent::Chat(ChatAction::SetQuickButtons(buttons)));
    }

    fn set_typing(&mut self, typing: bool) {
        let _ = self.send(AppEvent::Chat(ChatAction::SetTyping(typing)));
    }
}

pub fn init() -> Result<Tui> {
    enable_raw_mode()?;
    execute!(io::stderr(), EnterAlternateScreen)?;

    // Enable mouse capture
    execute!(io::stderr(), crossterm::event::EnableMouseCapture)?;

    let backend = CrosstermBackend::new(io::stderr());
    let terminal = Terminal::new(backend)?;

    Ok(terminal)
}

pub fn restore() -> Result<()> {
    execute!(io::stderr(), crossterm::event::DisableMouseCapture)?;
    execute!(io::stderr(), LeaveAlternateScreen)?;
    disable_raw_mode()?;
    Ok(())
}

/// Install panic hook to restore terminal on panic
pub fn install_panic_hook() {
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let _ = restore();
        tracing::error!("panic: {panic_info}");
        original_hook(panic_info);
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::process_units;
    use crate::protocol::GenericMessage;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn test_sender_surface_emits_chat_actions_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel::<AppEvent>();
        let mut surface = tx;
        let units = vec![
            GenericMessage::Typing(true),
            GenericMessage::text("hi"),
            GenericMessage::Options(vec![QuickButton::new("Yes", "yes")]),
        ];
        process_units(units, &mut surface, &CancellationToken::new()).await;
        drop(surface);

        let mut actions = Vec::new();
        while let Some(event) = rx.recv().await {
            if let AppEvent::Chat(action) = event {
                actions.push(action);
            }
        }
        assert_eq!(
            actions,
            vec![
                ChatAction::SetTyping(true),
                ChatAction::SetTyping(false),
                ChatAction::AddResponse("hi".into()),
                ChatAction::SetQuickButtons(vec![QuickButton::new("Yes", "yes")]),
            ]
        );
    }
}
