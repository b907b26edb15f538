use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;
use tracing::debug;

use crate::app::{App, ConnectionState, LauncherAction};
use crate::processor::MessageProcessor;
use crate::protocol::{GenericMessage, QuickButton};
use crate::socket::{SocketClient, SocketEvent};
use crate::tui::AppEvent;

/// What the controller needs from the connection side.
pub trait ChatLink {
    fn connect(&mut self);
    fn send_user_message(&mut self, text: &str);
    fn send_quick_reply(&mut self, button: &QuickButton);
    fn process_reply(&mut self, units: Vec<GenericMessage>);
    fn cancel_processing(&mut self);
    fn teardown(&mut self);
}

/// Live socket plus reply processor.
pub struct Session {
    endpoint: String,
    socket: SocketClient,
    processor: MessageProcessor,
}

impl Session {
    pub fn new(endpoint: String, socket: SocketClient, processor: MessageProcessor) -> Self {
        Self { endpoint, socket, processor }
    }
}

impl ChatLink for Session {
    fn connect(&mut self) {
        self.socket.connect(&self.endpoint);
    }

    fn send_user_message(&mut self, text: &str) {
        self.socket.send_user_message(text);
    }

    fn send_quick_reply(&mut self, button: &QuickButton) {
        self.socket.send_quick_reply(button);
    }

    fn process_reply(&mut self, units: Vec<GenericMessage>) {
        self.processor.submit(units);
    }

    fn cancel_processing(&mut self) {
        self.processor.cancel_in_flight();
    }

    fn teardown(&mut self) {
        self.socket.teardown();
        if self.processor.is_running() {
            self.processor.shutdown();
        }
    }
}

pub fn handle_event<L: ChatLink>(app: &mut App, link: &mut L, event: AppEvent) {
    match event {
        AppEvent::Key(key) => handle_key(app, link, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, link, mouse),
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => app.tick_animation(),
        AppEvent::Socket(event) => handle_socket_event(app, link, event),
        AppEvent::Chat(action) => {
            // Actions still in flight from a reply cut off by a disconnect.
            if app.connection == ConnectionState::Connected {
                app.apply_chat_action(action);
            } else {
                debug!(?action, "dropping chat action while offline");
            }
        }
    }
}

pub fn handle_socket_event<L: ChatLink>(app: &mut App, link: &mut L, event: SocketEvent) {
    match event {
        SocketEvent::Connecting => app.on_connecting(),
        SocketEvent::Connected => app.on_connected(),
        SocketEvent::Disconnected => {
            // A reply cut off by the reconnect is not resumed.
            link.cancel_processing();
            app.on_disconnected();
        }
        SocketEvent::Generic(units) => {
            debug!(units = units.len(), "queueing reply");
            link.process_reply(units);
        }
        SocketEvent::Typing => {
            app.set_typing(true);
        }
    }
}

fn toggle_launcher<L: ChatLink>(app: &mut App, link: &mut L) {
    if app.toggle_launcher() == LauncherAction::Connect {
        link.connect();
    }
}

fn send_input<L: ChatLink>(app: &mut App, link: &mut L) {
    if let Some(text) = app.submit_input() {
        link.send_user_message(&text);
    }
}

fn click_quick_button<L: ChatLink>(app: &mut App, link: &mut L, index: usize) {
    if let Some(button) = app.click_quick_button(index) {
        link.send_quick_reply(&button);
    }
}

fn handle_key<L: ChatLink>(app: &mut App, link: &mut L, key: KeyEvent) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.quit();
        return;
    }
    if key.code == KeyCode::F(2)
        || (key.code == KeyCode::Char('o') && key.modifiers.contains(KeyModifiers::CONTROL))
    {
        toggle_launcher(app, link);
        return;
    }

    if app.chat.is_open {
        handle_open_key(app, link, key);
    } else {
        handle_closed_key(app, link, key);
    }
}

fn handle_closed_key<L: ChatLink>(app: &mut App, link: &mut L, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.quit(),
        KeyCode::Enter | KeyCode::Char('o') | KeyCode::Char(' ') => toggle_launcher(app, link),
        _ => {}
    }
}

fn handle_open_key<L: ChatLink>(app: &mut App, link: &mut L, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            if app.selected_button.is_some() {
                app.selected_button = None;
            } else {
                toggle_launcher(app, link);
            }
        }
        KeyCode::Enter => match app.selected_button {
            Some(index) => click_quick_button(app, link, index),
            None => send_input(app, link),
        },
        KeyCode::Tab => app.select_next_button(),
        KeyCode::BackTab => app.select_prev_button(),
        KeyCode::PageUp => app.scroll_up(app.chat_height.max(2) / 2),
        KeyCode::PageDown => app.scroll_down(app.chat_height.max(2) / 2),
        KeyCode::Up => app.scroll_up(1),
        KeyCode::Down => app.scroll_down(1),
        KeyCode::Backspace => app.delete_char_before_cursor(),
        KeyCode::Delete => app.delete_char_at_cursor(),
        KeyCode::Left => app.move_cursor_left(),
        KeyCode::Right => app.move_cursor_right(),
        KeyCode::Home => app.move_cursor_home(),
        KeyCode::End => app.move_cursor_end(),
        KeyCode::Char(c) => {
            app.selected_button = None;
            app.insert_char(c);
        }
        _ => {}
    }
}

/// Check if a point is within a rectangle
fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn handle_mouse<L: ChatLink>(app: &mut App, link: &mut L, mouse: MouseEvent) {
    let x = mouse.column;
    let y = mouse.row;

    match mouse.kind {
        MouseEventKind::Down(MouseButton::Left) => {
            if app.launcher_area.is_some_and(|r| point_in_rect(x, y, r)) {
                toggle_launcher(app, link);
                return;
            }
            if !app.chat.is_open {
                return;
            }
            let clicked = app
                .quick_button_areas
                .iter()
                .position(|r| point_in_rect(x, y, *r));
            if let Some(index) = clicked {
                click_quick_button(app, link, index);
            }
        }
        MouseEventKind::ScrollDown => {
            if app.transcript_area.is_some_and(|r| point_in_rect(x, y, r)) {
                app.scroll_down(3);
            }
        }
        MouseEventKind::ScrollUp => {
            if app.transcript_area.is_some_and(|r| point_in_rect(x, y, r)) {
                app.scroll_up(3);
            }
        }
        _ => {}
    }
}
