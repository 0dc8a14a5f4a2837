//! Raw Slack event fields → canonical [`Message`].

use super::directory::DirectoryCache;
use crate::message::{Message, MessageKind, Sender, WORKSPACE_TOKEN_ATTR};
use std::sync::Arc;

/// Strip a leading `<@bot_id>` mention (and the whitespace after it).
/// Returns the cleaned text and whether the bot was mentioned.
pub fn remove_bot_mention(text: &str, bot_id: &str) -> (String, bool) {
    if bot_id.is_empty() {
        return (text.to_string(), false);
    }
    let token = format!("<@{}>", bot_id);
    match text.strip_prefix(&token) {
        Some(rest) => (rest.trim_start().to_string(), true),
        None => (text.to_string(), false),
    }
}

/// Classify a channel id by its prefix.
pub fn classify_channel(channel_id: &str) -> MessageKind {
    match channel_id.as_bytes().first() {
        Some(b'D') => MessageKind::Direct,
        Some(b'C') => MessageKind::Channel,
        Some(b'G') => MessageKind::PrivateChannel,
        _ => MessageKind::Unknown,
    }
}

/// Fields read off an incoming event, before normalization.
#[derive(Debug, Clone, Default)]
pub struct RawEvent {
    pub channel_id: String,
    pub text: String,
    pub timestamp: String,
    pub thread_timestamp: String,
    /// Human sender; `None` for bots and integrations or when the profile lookup failed.
    pub sender: Option<Sender>,
    /// Forces the kind instead of classifying by channel prefix (interactive callbacks).
    pub kind: Option<MessageKind>,
    /// Channel name known from the event itself; skips the directory lookup when set.
    pub channel_name: Option<String>,
}

/// Builds canonical messages for one bot identity.
#[derive(Clone)]
pub struct Normalizer {
    bot_id: String,
    directory: Arc<DirectoryCache>,
    workspace_token: Option<String>,
}

impl Normalizer {
    pub fn new(
        bot_id: impl Into<String>,
        directory: Arc<DirectoryCache>,
        workspace_token: Option<String>,
    ) -> Self {
        Self {
            bot_id: bot_id.into(),
            directory,
            workspace_token,
        }
    }

    pub fn bot_id(&self) -> &str {
        &self.bot_id
    }

    pub fn normalize(&self, raw: RawEvent) -> Message {
        let mut msg = Message::new();
        let mut kind = raw.kind.unwrap_or_else(|| classify_channel(&raw.channel_id));
        if kind == MessageKind::Unknown {
            log::debug!(
                "unsupported channel '{}'; message left unpopulated",
                raw.channel_id
            );
            return msg;
        }

        let (input, mentioned) = remove_bot_mention(&raw.text, &self.bot_id);

        if kind != MessageKind::Direct {
            let name = raw
                .channel_name
                .filter(|n| !n.is_empty())
                .or_else(|| self.directory.rooms().name_of(&raw.channel_id));
            match name {
                Some(name) => msg.channel_name = name,
                None => {
                    log::warn!("could not find name of channel '{}'", raw.channel_id);
                    kind = MessageKind::PrivateChannel;
                }
            }
        }

        msg.kind = kind;
        msg.channel_id = raw.channel_id;
        msg.input = input;
        msg.timestamp = raw.timestamp;
        msg.thread_timestamp = raw.thread_timestamp;
        msg.bot_mentioned = mentioned;
        if let Some(token) = &self.workspace_token {
            msg.attributes
                .insert(WORKSPACE_TOKEN_ATTR.to_string(), token.clone());
        }
        if let Some(sender) = &raw.sender {
            msg.set_sender(sender);
        }
        msg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::USER_EMAIL;

    fn normalizer() -> Normalizer {
        let directory = Arc::new(DirectoryCache::new());
        directory.rooms().insert_if_absent("general", "C1");
        Normalizer::new("U123", directory, Some("xoxp-ws".to_string()))
    }

    #[test]
    fn strips_leading_self_mention() {
        assert_eq!(
            remove_bot_mention("<@U123> hello", "U123"),
            ("hello".to_string(), true)
        );
        assert_eq!(
            remove_bot_mention("<@U123>   hi there", "U123"),
            ("hi there".to_string(), true)
        );
    }

    #[test]
    fn other_text_is_unchanged() {
        for text in ["hello <@U123>", "<@U999> hello", "<@U1234> hello", "", " <@U123> x"] {
            assert_eq!(remove_bot_mention(text, "U123"), (text.to_string(), false));
        }
    }

    #[test]
    fn classifies_by_prefix() {
        assert_eq!(classify_channel("D01"), MessageKind::Direct);
        assert_eq!(classify_channel("C01"), MessageKind::Channel);
        assert_eq!(classify_channel("G01"), MessageKind::PrivateChannel);
        assert_eq!(classify_channel("X01"), MessageKind::Unknown);
        assert_eq!(classify_channel(""), MessageKind::Unknown);
    }

    #[test]
    fn channel_message_gets_name_mention_and_sender() {
        let sender = Sender {
            id: "U1".to_string(),
            email: "alice@x.com".to_string(),
            ..Sender::default()
        };
        let msg = normalizer().normalize(RawEvent {
            channel_id: "C1".to_string(),
            text: "<@U123> deploy".to_string(),
            timestamp: "1.0".to_string(),
            thread_timestamp: "0.5".to_string(),
            sender: Some(sender),
            ..RawEvent::default()
        });
        assert_eq!(msg.kind, MessageKind::Channel);
        assert_eq!(msg.channel_name, "general");
        assert_eq!(msg.input, "deploy");
        assert!(msg.bot_mentioned);
        assert_eq!(msg.thread_timestamp, "0.5");
        assert_eq!(msg.vars.get(USER_EMAIL).map(String::as_str), Some("alice@x.com"));
        assert_eq!(
            msg.attributes.get(WORKSPACE_TOKEN_ATTR).map(String::as_str),
            Some("xoxp-ws")
        );
    }

    #[test]
    fn unknown_channel_name_defaults_to_private() {
        let msg = normalizer().normalize(RawEvent {
            channel_id: "C404".to_string(),
            text: "hi".to_string(),
            ..RawEvent::default()
        });
        assert_eq!(msg.kind, MessageKind::PrivateChannel);
        assert!(msg.channel_name.is_empty());
        assert_eq!(msg.input, "hi");
    }

    #[test]
    fn direct_message_without_sender_has_no_user_vars() {
        let msg = normalizer().normalize(RawEvent {
            channel_id: "D1".to_string(),
            text: "ping".to_string(),
            ..RawEvent::default()
        });
        assert_eq!(msg.kind, MessageKind::Direct);
        assert!(msg.channel_name.is_empty());
        assert!(msg.vars.is_empty());
    }

    #[test]
    fn unknown_kind_is_returned_unpopulated() {
        let msg = normalizer().normalize(RawEvent {
            channel_id: "X1".to_string(),
            text: "<@U123> hi".to_string(),
            ..RawEvent::default()
        });
        assert_eq!(msg.kind, MessageKind::Unknown);
        assert!(msg.input.is_empty());
        assert!(msg.channel_id.is_empty());
        assert!(msg.attributes.is_empty());
        assert!(!msg.id.is_empty());
    }
}
