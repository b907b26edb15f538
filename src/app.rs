use ratatui::layout::Rect;
use crate::protocol::QuickButton;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Bot,
}

/// Result of clicking the launcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LauncherAction {
    /// Panel opened; the socket should be (re)connected.
    Connect,
    /// Panel closed; the connection stays up.
    Closed,
}

/// UI updates produced while draining an agent reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatAction {
    AddResponse(String),
    SetQuickButtons(Vec<QuickButton>),
    SetTyping(bool),
}

/// Panel visibility, input availability and typing indicator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChatUiState {
    pub is_open: bool,
    pub is_enabled: bool,
    pub is_typing: bool,
}

impl ChatUiState {
    /// Returns true only when the indicator actually flips.
    pub fn set_typing(&mut self, typing: bool) -> bool {
        if self.is_typing == typing {
            return false;
        }
        self.is_typing = typing;
        true
    }
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub chat: ChatUiState,
    pub connection: ConnectionState,
    pub typing_toggles: u32,

    // Header
    pub title: String,
    pub subtitle: String,

    // Transcript
    pub messages: Vec<ChatMessage>,
    pub scroll: u16,
    pub follow_tail: bool,
    pub chat_height: u16, // Height of transcript area for scroll calculations
    pub chat_width: u16,  // Width of transcript area for wrap calculations

    // Quick replies
    pub quick_buttons: Vec<QuickButton>,
    pub selected_button: Option<usize>,

    // Input line
    pub input: String,
    pub input_cursor: usize, // cursor position in input, in chars

    // Animation state
    pub animation_frame: u8, // 0-2 for typing dots

    // Areas for mouse hit-testing (updated during render)
    pub launcher_area: Option<Rect>,
    pub transcript_area: Option<Rect>,
    pub quick_button_areas: Vec<Rect>,
}

impl App {
    pub fn new(title: impl Into<String>, subtitle: impl Into<String>) -> Self {
        Self {
            should_quit: false,
            chat: ChatUiState::default(),
            connection: ConnectionState::Disconnected,
            typing_toggles: 0,

            title: title.into(),
            subtitle: subtitle.into(),

            messages: Vec::new(),
            scroll: 0,
            follow_tail: true,
            chat_height: 0,
            chat_width: 0,

            quick_buttons: Vec::new(),
            selected_button: None,

            input: String::new(),
            input_cursor: 0,

            animation_frame: 0,

            launcher_area: None,
            transcript_area: None,
            quick_button_areas: Vec::new(),
        }
    }

    pub fn quit(&mut self) {
        self.should_quit = true;
    }

    // Launcher
    pub fn toggle_launcher(&mut self) -> LauncherAction {
        self.chat.is_open = !self.chat.is_open;
        if self.chat.is_open {
            self.scroll_to_bottom();
            LauncherAction::Connect
        } else {
            LauncherAction::Closed
        }
    }

    // Connection lifecycle
    pub fn on_connecting(&mut self) {
        if self.connection == ConnectionState::Disconnected {
            self.connection = ConnectionState::Connecting;
        }
    }

    pub fn on_connected(&mut self) {
        self.connection = ConnectionState::Connected;
        self.chat.is_enabled = true;
    }

    pub fn on_disconnected(&mut self) {
        self.connection = ConnectionState::Disconnected;
        self.chat.is_enabled = false;
        self.set_typing(false);
    }

    /// The only place the typing indicator changes; redundant toggles are ignored.
    pub fn set_typing(&mut self, typing: bool) -> bool {
        let toggled = self.chat.set_typing(typing);
        if toggled {
            self.typing_toggles += 1;
            if typing {
                self.animation_frame = 0;
            }
            self.scroll_to_bottom();
        }
        toggled
    }

    // Transcript
    pub fn add_response_message(&mut self, text: impl Into<String>) {
        self.push_message(ChatRole::Bot, text.into());
    }

    pub fn add_user_message(&mut self, text: impl Into<String>) {
        self.push_message(ChatRole::User, text.into());
    }

    fn push_message(&mut self, role: ChatRole, content: String) {
        self.messages.push(ChatMessage { role, content });
        self.scroll_to_bottom();
    }

    pub fn set_quick_buttons(&mut self, buttons: Vec<QuickButton>) {
        self.quick_buttons = buttons;
        self.selected_button = None;
    }

    pub fn apply_chat_action(&mut self, action: ChatAction) {
        match action {
            ChatAction::AddResponse(text) => self.add_response_message(text),
            ChatAction::SetQuickButtons(buttons) => self.set_quick_buttons(buttons),
            ChatAction::SetTyping(typing) => {
                self.set_typing(typing);
            }
        }
    }

    /// Takes the typed line if it can be sent, echoing it into the transcript.
    pub fn submit_input(&mut self) -> Option<String> {
        if !self.chat.is_enabled {
            return None;
        }
        let text = self.input.trim().to_string();
        if text.is_empty() {
            return None;
        }
        self.input.clear();
        self.input_cursor = 0;
        self.add_user_message(text.clone());
        Some(text)
    }

    /// Returns the clicked button and echoes its label as a user message.
    pub fn click_quick_button(&mut self, index: usize) -> Option<QuickButton> {
        if !self.chat.is_enabled {
            return None;
        }
        let button = self.quick_buttons.get(index)?.clone();
        self.add_user_message(button.label.clone());
        Some(button)
    }

    // Quick button selection
    pub fn select_next_button(&mut self) {
        let len = self.quick_buttons.len();
        if len > 0 {
            self.selected_button = Some(match self.selected_button {
                Some(i) => (i + 1) % len,
                None => 0,
            });
        }
    }

    pub fn select_prev_button(&mut self) {
        let len = self.quick_buttons.len();
        if len > 0 {
            self.selected_button = Some(match self.selected_button {
                Some(0) | None => len - 1,
                Some(i) => i - 1,
            });
        }
    }

    // Input editing
    pub fn insert_char(&mut self, c: char) {
        let byte_pos = char_to_byte_index(&self.input, self.input_cursor);
        self.input.insert(byte_pos, c);
        self.input_cursor += 1;
    }

    pub fn delete_char_before_cursor(&mut self) {
        if self.input_cursor > 0 {
            self.input_cursor -= 1;
            let byte_pos = char_to_byte_index(&self.input, self.input_cursor);
            self.input.remove(byte_pos);
        }
    }

    pub fn delete_char_at_cursor(&mut self) {
        if self.input_cursor < self.input.chars().count() {
            let byte_pos = char_to_byte_index(&self.input, self.input_cursor);
            self.input.remove(byte_pos);
        }
    }

    pub fn move_cursor_left(&mut self) {
        self.input_cursor = self.input_cursor.saturating_sub(1);
    }

    pub fn move_cursor_right(&mut self) {
        self.input_cursor = (self.input_cursor + 1).min(self.input.chars().count());
    }

    pub fn move_cursor_home(&mut self) {
        self.input_cursor = 0;
    }

    pub fn move_cursor_end(&mut self) {
        self.input_cursor = self.input.chars().count();
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.chat.is_typing {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    // Scrolling
    pub fn scroll_up(&mut self, lines: u16) {
        self.scroll = self.scroll.saturating_sub(lines);
        self.follow_tail = false;
    }

    pub fn scroll_down(&mut self, lines: u16) {
        let max_scroll = self.max_scroll();
        self.scroll = self.scroll.saturating_add(lines).min(max_scroll);
        self.follow_tail = self.scroll >= max_scroll;
    }

    /// Scroll transcript to bottom so the newest line and typing dots are visible
    pub fn scroll_to_bottom(&mut self) {
        self.follow_tail = true;
        self.scroll = self.max_scroll();
    }

    fn max_scroll(&self) -> u16 {
        let visible_height = if self.chat_height > 0 { self.chat_height } else { 20 };
        self.transcript_lines().saturating_sub(visible_height)
    }

    /// Wrapped line count of the transcript as rendered.
    pub fn transcript_lines(&self) -> u16 {
        // Use actual chat width for wrap calculation, default to 50 if not set
        let wrap_width = if self.chat_width > 0 { self.chat_width as usize } else { 50 };

        let mut total_lines: usize = 0;
        for msg in &self.messages {
            total_lines = total_lines.saturating_add(1); // Role line
            for line in msg.content.lines() {
                // Use character count, not byte length, for proper UTF-8 handling
                let char_count = line.chars().count();
                total_lines = total_lines.saturating_add(char_count / wrap_width + 1);
            }
            if msg.content.is_empty() {
                total_lines = total_lines.saturating_add(1);
            }
            total_lines = total_lines.saturating_add(1); // Blank line after message
        }

        if self.chat.is_typing {
            total_lines = total_lines.saturating_add(2); // Bot name + dots
        }
        u16::try_from(total_lines).unwrap_or(u16::MAX)
    }
}

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}
