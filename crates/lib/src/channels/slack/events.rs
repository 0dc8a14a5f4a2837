//! Inbound Slack payloads, decoded into closed per-source variants.
//!
//! - [`SocketEnvelope`] / [`StreamEvent`]: Socket Mode frames.
//! - [`EventsApiEnvelope`] / [`CallbackEvent`]: Events API HTTP pushes (the inner event shape is
//!   shared with Socket Mode's `events_api` envelopes).
//! - [`AttachmentActionCallback`]: interactive message button presses.
//!
//! Unrecognized kinds decode to an explicit `Unhandled { kind }` variant instead of failing.

use super::api::Conversation;
use crate::message::Sender;
use serde::de::Error as _;
use serde::Deserialize;
use serde_json::Value;

/// A `message` event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MessageEvent {
    #[serde(default)]
    pub channel: String,
    /// Empty for bot messages and most subtypes (edits, thread broadcasts).
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub ts: String,
    #[serde(default)]
    pub thread_ts: String,
    #[serde(default)]
    pub subtype: Option<String>,
}

/// The bot (or a member) joined or left a conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Membership {
    pub channel_id: String,
    /// Present on `channel_joined` / `group_joined`; `member_joined_channel` carries only the id.
    pub channel_name: Option<String>,
    pub user_id: Option<String>,
}

/// Inner event of an `event_callback` (Events API) or `events_api` envelope (Socket Mode).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackEvent {
    Message(MessageEvent),
    MemberJoined(Membership),
    MemberLeft(Membership),
    Unhandled { kind: String },
}

#[derive(Deserialize)]
struct MemberChannelEvent {
    #[serde(default)]
    channel: String,
    #[serde(default)]
    user: String,
}

#[derive(Deserialize)]
struct JoinedEvent {
    channel: Conversation,
}

#[derive(Deserialize)]
struct LeftEvent {
    channel: String,
}

fn non_empty(s: String) -> Option<String> {
    Some(s).filter(|s| !s.is_empty())
}

fn type_of(value: &Value) -> Option<&str> {
    value.get("type").and_then(Value::as_str)
}

impl CallbackEvent {
    pub fn from_value(event: Value) -> Result<Self, serde_json::Error> {
        let kind = type_of(&event)
            .ok_or_else(|| serde_json::Error::missing_field("type"))?
            .to_string();
        Ok(match kind.as_str() {
            "message" => Self::Message(serde_json::from_value(event)?),
            "member_joined_channel" => {
                let ev: MemberChannelEvent = serde_json::from_value(event)?;
                Self::MemberJoined(Membership {
                    channel_id: ev.channel,
                    channel_name: None,
                    user_id: non_empty(ev.user),
                })
            }
            "channel_joined" | "group_joined" => {
                let ev: JoinedEvent = serde_json::from_value(event)?;
                Self::MemberJoined(Membership {
                    channel_id: ev.channel.id,
                    channel_name: non_empty(ev.channel.name),
                    user_id: None,
                })
            }
            "member_left_channel" => {
                let ev: MemberChannelEvent = serde_json::from_value(event)?;
                Self::MemberLeft(Membership {
                    channel_id: ev.channel,
                    channel_name: None,
                    user_id: non_empty(ev.user),
                })
            }
            "channel_left" | "group_left" => {
                let ev: LeftEvent = serde_json::from_value(event)?;
                Self::MemberLeft(Membership {
                    channel_id: ev.channel,
                    ..Membership::default()
                })
            }
            _ => Self::Unhandled { kind },
        })
    }
}

/// Everything the streaming connection can report to its consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A (re)connection was established.
    Connected,
    /// Server handshake frame.
    Hello,
    Message(MessageEvent),
    MemberJoined(Membership),
    MemberLeft(Membership),
    /// A frame could not be decoded.
    ProtocolError(String),
    /// The connection dropped or could not be opened.
    ConnectionError(String),
    InvalidAuth,
    Unhandled { kind: String },
}

impl From<CallbackEvent> for StreamEvent {
    fn from(ev: CallbackEvent) -> Self {
        match ev {
            CallbackEvent::Message(m) => Self::Message(m),
            CallbackEvent::MemberJoined(m) => Self::MemberJoined(m),
            CallbackEvent::MemberLeft(m) => Self::MemberLeft(m),
            CallbackEvent::Unhandled { kind } => Self::Unhandled { kind },
        }
    }
}

/// One Socket Mode frame.
#[derive(Debug, Clone, Deserialize)]
pub struct SocketEnvelope {
    #[serde(default)]
    pub envelope_id: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub reason: Option<String>,
}

impl SocketEnvelope {
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Slack asks the client to reconnect (refresh, link disabled, ...).
    pub fn is_disconnect(&self) -> bool {
        self.kind == "disconnect"
    }

    pub fn into_event(self) -> StreamEvent {
        match self.kind.as_str() {
            "hello" => StreamEvent::Hello,
            "disconnect" => StreamEvent::ConnectionError(format!(
                "disconnect requested: {}",
                self.reason.as_deref().unwrap_or("unknown")
            )),
            "events_api" => match EventsApiEnvelope::from_value(self.payload) {
                Ok(EventsApiEnvelope::EventCallback { event, .. }) => {
                    match CallbackEvent::from_value(event) {
                        Ok(ev) => ev.into(),
                        Err(e) => StreamEvent::ProtocolError(e.to_string()),
                    }
                }
                Ok(EventsApiEnvelope::UrlVerification { .. }) => StreamEvent::Unhandled {
                    kind: "url_verification".to_string(),
                },
                Ok(EventsApiEnvelope::Unhandled { kind, .. }) => StreamEvent::Unhandled { kind },
                Err(e) => StreamEvent::ProtocolError(e.to_string()),
            },
            _ => StreamEvent::Unhandled { kind: self.kind },
        }
    }
}

/// Body of an Events API push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventsApiEnvelope {
    UrlVerification { token: String, challenge: String },
    EventCallback { token: String, event: Value },
    Unhandled { kind: String, token: String },
}

#[derive(Deserialize)]
struct UrlVerification {
    #[serde(default)]
    token: String,
    challenge: String,
}

#[derive(Deserialize)]
struct EventCallbackBody {
    #[serde(default)]
    token: String,
    event: Value,
}

impl EventsApiEnvelope {
    pub fn decode(body: &str) -> Result<Self, serde_json::Error> {
        Self::from_value(serde_json::from_str(body)?)
    }

    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        let kind = type_of(&value)
            .ok_or_else(|| serde_json::Error::missing_field("type"))?
            .to_string();
        Ok(match kind.as_str() {
            "url_verification" => {
                let v: UrlVerification = serde_json::from_value(value)?;
                Self::UrlVerification {
                    token: v.token,
                    challenge: v.challenge,
                }
            }
            "event_callback" => {
                let v: EventCallbackBody = serde_json::from_value(value)?;
                Self::EventCallback {
                    token: v.token,
                    event: v.event,
                }
            }
            _ => Self::Unhandled {
                token: value
                    .get("token")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                kind,
            },
        })
    }

    /// Verification token sent along with the push (empty when absent).
    pub fn token(&self) -> &str {
        match self {
            Self::UrlVerification { token, .. }
            | Self::EventCallback { token, .. }
            | Self::Unhandled { token, .. } => token,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackProfile {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackUser {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub profile: CallbackProfile,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackChannel {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_private: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackAction {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub value: String,
}

/// An `interactive_message` payload: someone pressed a button on an attachment.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AttachmentActionCallback {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub callback_id: String,
    #[serde(default)]
    pub user: CallbackUser,
    #[serde(default)]
    pub channel: CallbackChannel,
    #[serde(default)]
    pub actions: Vec<CallbackAction>,
    #[serde(default)]
    pub message_ts: String,
}

impl AttachmentActionCallback {
    pub fn decode(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }

    /// Value of the first action that carries one.
    pub fn first_action_value(&self) -> Option<&str> {
        self.actions
            .iter()
            .map(|a| a.value.as_str())
            .find(|v| !v.is_empty())
    }

    /// Identity of the presser; first and last name come from the `.`-separated handle.
    pub fn sender(&self) -> Sender {
        let name = &self.user.name;
        let first_name = name.split('.').next().unwrap_or_default();
        let last_name = name.rsplit('.').next().unwrap_or_default();
        Sender {
            id: self.user.id.clone(),
            name: name.clone(),
            email: self.user.profile.email.clone(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
        }
    }
}
