//! Slack connector: Socket Mode streaming, Events API and interactive webhooks, outbound
//! dispatch and the directory cache they share.

mod api;
mod directory;
mod dispatch;
mod events;
mod ingest;
mod normalize;
mod socket;
#[cfg(test)]
pub(crate) mod testing;
mod webhook;

pub use api::{
    Conversation, ConversationScope, PostEphemeral, PostMessage, SlackApi, SlackClient,
    SlackError, User, UserGroup, UserProfile, SLACK_API_BASE,
};
pub use directory::{DirectoryCache, DirectoryTable};
pub use dispatch::{is_valid_url, promote_link, resolve_user_id, Dispatcher};
pub use events::{
    AttachmentActionCallback, CallbackEvent, EventsApiEnvelope, Membership, MessageEvent,
    SocketEnvelope, StreamEvent,
};
pub use ingest::Ingestor;
pub use normalize::{classify_channel, remove_bot_mention, Normalizer, RawEvent};
pub use socket::{SocketModeConnection, StreamingAdapter};
pub use webhook::{
    events_router, interactive_router, sanitize_contents, WebhookError, WebhookState,
    EVENTS_HEALTH_PATH, INTERACTIVE_HEALTH_PATH,
};
