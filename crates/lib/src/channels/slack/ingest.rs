//! Event handling shared by the streaming and webhook sources: cache upkeep and turning
//! messages into canonical envelopes on the inbound queue.

use super::api::SlackApi;
use super::directory::DirectoryCache;
use super::events::{AttachmentActionCallback, CallbackEvent, Membership, MessageEvent};
use super::normalize::{classify_channel, Normalizer, RawEvent};
use crate::message::{Message, MessageKind, Sender};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Writes canonical messages into the shared inbound queue.
#[derive(Clone)]
pub struct Ingestor {
    api: Arc<dyn SlackApi>,
    directory: Arc<DirectoryCache>,
    normalizer: Normalizer,
    inbound_tx: mpsc::UnboundedSender<Message>,
}

impl Ingestor {
    pub fn new(
        api: Arc<dyn SlackApi>,
        directory: Arc<DirectoryCache>,
        normalizer: Normalizer,
        inbound_tx: mpsc::UnboundedSender<Message>,
    ) -> Self {
        Self {
            api,
            directory,
            normalizer,
            inbound_tx,
        }
    }

    pub fn api(&self) -> &dyn SlackApi {
        self.api.as_ref()
    }

    pub fn directory(&self) -> &DirectoryCache {
        &self.directory
    }

    pub fn bot_id(&self) -> &str {
        self.normalizer.bot_id()
    }

    pub async fn handle_callback_event(&self, event: CallbackEvent) {
        match event {
            CallbackEvent::Message(ev) => self.handle_message(ev).await,
            CallbackEvent::MemberJoined(m) => self.handle_member_joined(m).await,
            CallbackEvent::MemberLeft(m) => self.handle_member_left(m),
            CallbackEvent::Unhandled { kind } => {
                log::debug!("ignoring unhandled event kind '{}'", kind)
            }
        }
    }

    /// Normalize and enqueue a message from a human. Messages without a sender or sent by the
    /// bot itself are dropped.
    pub async fn handle_message(&self, ev: MessageEvent) {
        if ev.user.is_empty() || ev.user == self.bot_id() {
            log::debug!(
                "skipping message in {} (subtype {:?}) without a human sender",
                ev.channel,
                ev.subtype
            );
            return;
        }

        let sender = match self.api.user_info(&ev.user).await {
            Ok(user) => Some(Sender::from(&user)),
            Err(e) => {
                log::error!("could not fetch profile of user {}: {}", ev.user, e);
                None
            }
        };

        let msg = self.normalizer.normalize(RawEvent {
            channel_id: ev.channel,
            text: ev.text,
            timestamp: ev.ts,
            thread_timestamp: ev.thread_ts,
            sender,
            ..RawEvent::default()
        });
        self.enqueue(msg);
    }

    /// Add the joined room to the cache. Without a name in the event, ask the platform.
    pub async fn handle_member_joined(&self, m: Membership) {
        let name = match m.channel_name {
            Some(name) => name,
            None => match self.api.conversation_info(&m.channel_id).await {
                Ok(c) if !c.name.is_empty() => c.name,
                Ok(_) => {
                    log::debug!("conversation {} has no name; not cached", m.channel_id);
                    return;
                }
                Err(e) => {
                    log::warn!("could not look up conversation {}: {}", m.channel_id, e);
                    return;
                }
            },
        };
        if self.directory.rooms().insert_if_absent(&name, &m.channel_id) {
            log::debug!("joined channel {}({}); added to lookup", name, m.channel_id);
        }
    }

    /// Drop the room from the cache when the bot itself left. Other members leaving do not
    /// change what the bot can see.
    pub fn handle_member_left(&self, m: Membership) {
        if let Some(user) = m.user_id.as_deref() {
            if user != self.bot_id() {
                return;
            }
        }
        for name in self.directory.rooms().remove_by_id(&m.channel_id) {
            log::debug!("left channel {}({}); removed from lookup", name, m.channel_id);
        }
    }

    /// Build the canonical message for a button press and enqueue it.
    pub fn handle_interactive(&self, cb: &AttachmentActionCallback) {
        let value = cb.first_action_value().unwrap_or_default();
        let kind = match classify_channel(&cb.channel.id) {
            MessageKind::Direct => MessageKind::Direct,
            _ if cb.channel.is_private => MessageKind::PrivateChannel,
            _ => MessageKind::Channel,
        };
        let msg = self.normalizer.normalize(RawEvent {
            channel_id: cb.channel.id.clone(),
            text: format!("<@{}> {}", self.bot_id(), value),
            timestamp: cb.message_ts.clone(),
            thread_timestamp: cb.message_ts.clone(),
            sender: Some(cb.sender()),
            kind: Some(kind),
            channel_name: Some(cb.channel.name.clone()),
        });
        self.enqueue(msg);
    }

    fn enqueue(&self, msg: Message) {
        if msg.kind == MessageKind::Unknown {
            return;
        }
        if self.inbound_tx.send(msg).is_err() {
            log::warn!("inbound queue closed; message dropped");
        }
    }
}
