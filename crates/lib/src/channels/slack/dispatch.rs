//! Outbound dispatch: routed [`Message`] → Slack sends.

use super::api::{PostEphemeral, PostMessage, SlackApi, SlackError, User};
use crate::message::{Attachment, Message};
use std::sync::Arc;

/// Resolves destinations for a routed message and performs the sends.
#[derive(Clone)]
pub struct Dispatcher {
    api: Arc<dyn SlackApi>,
}

impl Dispatcher {
    pub fn new(api: Arc<dyn SlackApi>) -> Self {
        Self { api }
    }

    /// Deliver `msg`. Destinations, in priority order: the sender only (direct-only), then the
    /// room list followed by the user list, otherwise the originating conversation. Multi
    /// destination sends stop at the first failure, which is returned.
    pub async fn send(&self, msg: &Message) -> Result<(), SlackError> {
        if msg.direct_message_only {
            return self.send_direct_only(msg).await;
        }

        let users = if msg.output_to_users.is_empty() {
            Vec::new()
        } else {
            match self.api.list_users().await {
                Ok(users) => users,
                Err(e) => {
                    log::error!("could not fetch users listed in output_to_users: {}", e);
                    Vec::new()
                }
            }
        };

        for room in &msg.output_to_rooms {
            self.post(room, msg.sender_id(), msg).await?;
        }

        for entry in &msg.output_to_users {
            let Some(user_id) = resolve_user_id(entry, &users) else {
                log::error!("could not find user '{}'", entry);
                continue;
            };
            if msg.sender_id() == Some(user_id) {
                log::warn!(
                    "direct_message_only is false but the sender is listed in output_to_users"
                );
            }
            self.send_direct(user_id, msg).await?;
        }

        if msg.output_to_rooms.is_empty() && msg.output_to_users.is_empty() {
            self.post(&msg.channel_id, msg.sender_id(), msg).await?;
        }
        Ok(())
    }

    async fn send_direct_only(&self, msg: &Message) -> Result<(), SlackError> {
        if !msg.output_to_rooms.is_empty() {
            log::warn!(
                "direct_message_only is set; ignoring output_to_rooms {:?}",
                msg.output_to_rooms
            );
        }
        if !msg.output_to_users.is_empty() {
            log::warn!(
                "direct_message_only is set; ignoring output_to_users {:?}",
                msg.output_to_users
            );
        }
        let sender = msg.sender_id().ok_or(SlackError::MissingSender)?;
        self.send_direct(sender, msg).await
    }

    /// Open (or reuse) the IM with `user_id` and post there.
    async fn send_direct(&self, user_id: &str, msg: &Message) -> Result<(), SlackError> {
        let channel = self.api.open_direct_channel(user_id).await?;
        self.post(&channel, Some(user_id), msg).await
    }

    /// The send primitive. Ephemeral posts are shown to `recipient` only.
    async fn post(
        &self,
        channel: &str,
        recipient: Option<&str>,
        msg: &Message,
    ) -> Result<(), SlackError> {
        if msg.is_ephemeral {
            let user = recipient.ok_or(SlackError::MissingSender)?;
            // Ephemeral posts carry the first attachment and nothing else.
            let Some(first) = msg.attachments.first() else {
                log::debug!("ephemeral message {} has no attachment; not sent", msg.id);
                return Ok(());
            };
            return self
                .api
                .post_ephemeral(&PostEphemeral {
                    channel: channel.to_string(),
                    user: user.to_string(),
                    attachments: vec![first.clone()],
                })
                .await;
        }

        let mut attachments = msg.attachments.clone();
        promote_link(&msg.output, &mut attachments);
        self.api
            .post_message(&PostMessage {
                channel: channel.to_string(),
                text: msg.output.clone(),
                thread_ts: Some(msg.thread_timestamp.clone()).filter(|ts| !ts.is_empty()),
                attachments,
                as_user: true,
            })
            .await
    }
}

/// Id of the first user whose email contains `entry`, case-insensitively.
pub fn resolve_user_id<'a>(entry: &str, users: &'a [User]) -> Option<&'a str> {
    let needle = entry.to_lowercase();
    users
        .iter()
        .find(|u| u.profile.email.to_lowercase().contains(&needle))
        .map(|u| u.id.as_str())
}

/// A bare absolute http(s) URL with a host and no whitespace.
pub fn is_valid_url(text: &str) -> bool {
    if text.is_empty() || text.chars().any(char::is_whitespace) {
        return false;
    }
    match url::Url::parse(text) {
        Ok(u) => {
            matches!(u.scheme(), "http" | "https") && u.host_str().is_some_and(|h| !h.is_empty())
        }
        Err(_) => false,
    }
}

/// When `text` is a bare URL, show it as an image: set it on the first attachment, or add one.
pub fn promote_link(text: &str, attachments: &mut Vec<Attachment>) {
    if !is_valid_url(text) {
        return;
    }
    match attachments.first_mut() {
        Some(first) => first.image_url = Some(text.to_string()),
        None => attachments.push(Attachment::image(text)),
    }
}
