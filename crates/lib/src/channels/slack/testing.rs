//! In-memory `SlackApi` used by unit tests: canned directory data, recorded calls and
//! switchable failures.

use super::api::{
    Conversation, ConversationScope, PostEphemeral, PostMessage, SlackApi, SlackError, User,
    UserGroup, UserProfile,
};
use async_trait::async_trait;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ListUsers,
    UserInfo(String),
    ConversationInfo(String),
    OpenDirect(String),
    Post(PostMessage),
    Ephemeral(PostEphemeral),
}

#[derive(Default)]
pub struct FakeSlack {
    pub public_rooms: Vec<Conversation>,
    pub private_rooms: Vec<Conversation>,
    pub users: Vec<User>,
    pub user_groups: Vec<UserGroup>,
    pub fail_public_rooms: bool,
    pub fail_users: bool,
    pub fail_user_info: bool,
    pub fail_conversation_info: bool,
    /// Posts to this channel id fail with `channel_not_found`.
    pub fail_post_to: Option<String>,
    calls: Mutex<Vec<Call>>,
}

fn api_error(method: &str, error: &str) -> SlackError {
    SlackError::Api {
        method: method.to_string(),
        error: error.to_string(),
    }
}

pub fn user(id: &str, name: &str, email: &str) -> User {
    let mut parts = name.split('.');
    User {
        id: id.to_string(),
        name: name.to_string(),
        profile: UserProfile {
            email: email.to_string(),
            first_name: parts.next().unwrap_or_default().to_string(),
            last_name: parts.next_back().unwrap_or_default().to_string(),
        },
    }
}

fn room(id: &str, name: &str, is_private: bool) -> Conversation {
    Conversation {
        id: id.to_string(),
        name: name.to_string(),
        is_private,
    }
}

impl FakeSlack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Workspace with `#general` (C1), private `secret` (G1), two users and one group.
    pub fn with_directory() -> Self {
        Self {
            public_rooms: vec![room("C1", "general", false)],
            private_rooms: vec![room("G1", "secret", true)],
            users: vec![
                user("U1", "alice.smith", "Alice@X.com"),
                user("U2", "bob.jones", "bob@x.com"),
            ],
            user_groups: vec![UserGroup {
                id: "S1".to_string(),
                handle: "ops".to_string(),
            }],
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Channel ids of every standard and ephemeral post, in order.
    pub fn sent_channels(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Post(p) => Some(p.channel),
                Call::Ephemeral(p) => Some(p.channel),
                _ => None,
            })
            .collect()
    }

    pub fn posts(&self) -> Vec<PostMessage> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Post(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn ephemerals(&self) -> Vec<PostEphemeral> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Ephemeral(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl SlackApi for FakeSlack {
    async fn list_conversations(
        &self,
        scope: ConversationScope,
    ) -> Result<Vec<Conversation>, SlackError> {
        match scope {
            ConversationScope::Public if self.fail_public_rooms => {
                Err(api_error("conversations.list", "ratelimited"))
            }
            ConversationScope::Public => Ok(self.public_rooms.clone()),
            ConversationScope::Private => Ok(self.private_rooms.clone()),
        }
    }

    async fn conversation_info(&self, channel_id: &str) -> Result<Conversation, SlackError> {
        self.record(Call::ConversationInfo(channel_id.to_string()));
        if self.fail_conversation_info {
            return Err(api_error("conversations.info", "channel_not_found"));
        }
        self.public_rooms
            .iter()
            .chain(self.private_rooms.iter())
            .find(|c| c.id == channel_id)
            .cloned()
            .ok_or_else(|| api_error("conversations.info", "channel_not_found"))
    }

    async fn list_users(&self) -> Result<Vec<User>, SlackError> {
        self.record(Call::ListUsers);
        if self.fail_users {
            return Err(api_error("users.list", "ratelimited"));
        }
        Ok(self.users.clone())
    }

    async fn user_info(&self, user_id: &str) -> Result<User, SlackError> {
        self.record(Call::UserInfo(user_id.to_string()));
        if self.fail_user_info {
            return Err(api_error("users.info", "user_not_found"));
        }
        self.users
            .iter()
            .find(|u| u.id == user_id)
            .cloned()
            .ok_or_else(|| api_error("users.info", "user_not_found"))
    }

    async fn list_user_groups(&self) -> Result<Vec<UserGroup>, SlackError> {
        Ok(self.user_groups.clone())
    }

    async fn open_direct_channel(&self, user_id: &str) -> Result<String, SlackError> {
        self.record(Call::OpenDirect(user_id.to_string()));
        Ok(format!("D-{}", user_id))
    }

    async fn post_message(&self, message: &PostMessage) -> Result<(), SlackError> {
        self.record(Call::Post(message.clone()));
        if self.fail_post_to.as_deref() == Some(message.channel.as_str()) {
            return Err(api_error("chat.postMessage", "channel_not_found"));
        }
        Ok(())
    }

    async fn post_ephemeral(&self, message: &PostEphemeral) -> Result<(), SlackError> {
        self.record(Call::Ephemeral(message.clone()));
        if self.fail_post_to.as_deref() == Some(message.channel.as_str()) {
            return Err(api_error("chat.postEphemeral", "channel_not_found"));
        }
        Ok(())
    }
}
