//! Wire protocol spoken with the agent backend.
//!
//! Envelopes are JSON text frames. The client sends `hello`, `message` and
//! `quickresponse` envelopes; the server answers with `message` envelopes that
//! carry a `generic` list of message units, or a bare `typing` hint.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Channel tag the backend expects on hello and quick-reply envelopes.
pub const SOCKET_CHANNEL: &str = "socket";

/// Envelope-level `type` tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Hello,
    Message,
    QuickResponse,
    Typing,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Hello => "hello",
            MessageType::Message => "message",
            MessageType::QuickResponse => "quickresponse",
            MessageType::Typing => "typing",
        }
    }
}

/// Unit-level `response_type` tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
    Text,
    Option,
    Typing,
    Pause,
}

impl ResponseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseType::Text => "text",
            ResponseType::Option => "option",
            ResponseType::Typing => MessageType::Typing.as_str(),
            ResponseType::Pause => "pause",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "text" => Some(ResponseType::Text),
            "option" => Some(ResponseType::Option),
            "typing" => Some(ResponseType::Typing),
            "pause" => Some(ResponseType::Pause),
            _ => None,
        }
    }
}

/// A clickable quick reply offered by the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuickButton {
    pub label: String,
    pub value: String,
}

impl QuickButton {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

/// Text unit payload: the backend sends either one string or a list of lines.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum TextContent {
    Single(String),
    Lines(Vec<String>),
}

impl TextContent {
    /// Transcript lines in the order they should be appended.
    pub fn into_lines(self) -> Vec<String> {
        match self {
            TextContent::Single(text) => vec![text],
            TextContent::Lines(lines) => lines,
        }
    }
}

/// One unit of an agent reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenericMessage {
    Text(TextContent),
    Options(Vec<QuickButton>),
    Typing(bool),
    /// Show `typing` for `time` milliseconds before the next unit.
    Pause { time: u64, typing: bool },
    /// Unrecognised `response_type`, kept so it can be logged and skipped.
    Unknown(String),
}

impl GenericMessage {
    pub fn text(text: impl Into<String>) -> Self {
        GenericMessage::Text(TextContent::Single(text.into()))
    }

    pub fn pause(time: u64, typing: bool) -> Self {
        GenericMessage::Pause { time, typing }
    }

    /// The `response_type` tag this unit was decoded from.
    pub fn kind(&self) -> &str {
        match self {
            GenericMessage::Text(_) => ResponseType::Text.as_str(),
            GenericMessage::Options(_) => ResponseType::Option.as_str(),
            GenericMessage::Typing(_) => ResponseType::Typing.as_str(),
            GenericMessage::Pause { .. } => ResponseType::Pause.as_str(),
            GenericMessage::Unknown(tag) => tag,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawInput {
    text: String,
}

#[derive(Debug, Deserialize)]
struct RawOptionValue {
    input: RawInput,
}

#[derive(Debug, Deserialize)]
struct RawOption {
    label: String,
    value: RawOptionValue,
}

#[derive(Debug, Deserialize)]
struct RawGeneric {
    response_type: String,
    #[serde(default)]
    text: Option<TextContent>,
    #[serde(default)]
    options: Option<Vec<RawOption>>,
    #[serde(default)]
    time: Option<u64>,
    #[serde(default)]
    typing: Option<bool>,
}

impl From<RawGeneric> for GenericMessage {
    fn from(raw: RawGeneric) -> Self {
        match ResponseType::from_tag(&raw.response_type) {
            Some(ResponseType::Text) => {
                GenericMessage::Text(raw.text.unwrap_or(TextContent::Lines(Vec::new())))
            }
            Some(ResponseType::Option) => GenericMessage::Options(
                raw.options
                    .unwrap_or_default()
                    .into_iter()
                    .map(|option| QuickButton {
                        label: option.label,
                        value: option.value.input.text,
                    })
                    .collect(),
            ),
            Some(ResponseType::Typing) => GenericMessage::Typing(raw.typing.unwrap_or(true)),
            Some(ResponseType::Pause) => GenericMessage::Pause {
                time: raw.time.unwrap_or(0),
                typing: raw.typing.unwrap_or(false),
            },
            None => GenericMessage::Unknown(raw.response_type),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawServerEnvelope {
    #[serde(rename = "type")]
    kind: MessageType,
    #[serde(default)]
    generic: Option<Vec<RawGeneric>>,
}

/// Envelopes the server pushes to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEnvelope {
    Message { generic: Option<Vec<GenericMessage>> },
    Typing,
}

impl ServerEnvelope {
    pub fn parse(text: &str) -> Result<Self> {
        let raw: RawServerEnvelope = serde_json::from_str(text)?;
        match raw.kind {
            MessageType::Message => Ok(ServerEnvelope::Message {
                generic: raw
                    .generic
                    .map(|units| units.into_iter().map(GenericMessage::from).collect()),
            }),
            MessageType::Typing => Ok(ServerEnvelope::Typing),
            other => Err(anyhow!(
                "unexpected server envelope type: {}",
                other.as_str()
            )),
        }
    }
}

/// Envelopes the client sends to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientEnvelope {
    Hello {
        user: String,
        channel: String,
    },
    Message {
        text: String,
        user: String,
    },
    QuickResponse {
        value: String,
        user: String,
        channel: String,
    },
}

impl ClientEnvelope {
    pub fn hello(user: &str) -> Self {
        ClientEnvelope::Hello {
            user: user.to_string(),
            channel: SOCKET_CHANNEL.to_string(),
        }
    }

    pub fn user_message(user: &str, text: &str) -> Self {
        ClientEnvelope::Message {
            text: text.to_string(),
            user: user.to_string(),
        }
    }

    pub fn quick_reply(user: &str, button: &QuickButton) -> Self {
        ClientEnvelope::QuickResponse {
            value: button.value.clone(),
            user: user.to_string(),
            channel: SOCKET_CHANNEL.to_string(),
        }
    }

    pub fn message_type(&self) -> MessageType {
        match self {
            ClientEnvelope::Hello { .. } => MessageType::Hello,
            ClientEnvelope::Message { .. } => MessageType::Message,
            ClientEnvelope::QuickResponse { .. } => MessageType::QuickResponse,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
