//! Slack Web API client: directory fetches, profile lookups, IM open and message posts.
//!
//! The core only talks to Slack through the [`SlackApi`] trait so that ingestion and dispatch
//! can be exercised without the network. [`SlackClient`] is the reqwest-backed implementation.

use crate::message::{Attachment, Sender};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const SLACK_API_BASE: &str = "https://slack.com/api";

/// Page size for cursor-paginated list calls.
const PAGE_LIMIT: u32 = 200;

#[derive(Debug, thiserror::Error)]
pub enum SlackError {
    #[error("slack request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("slack response could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("slack api {method} failed: {error}")]
    Api { method: String, error: String },
    #[error("slack {0} token not configured")]
    MissingToken(&'static str),
    #[error("message has no sender to reply to")]
    MissingSender,
}

impl SlackError {
    /// Slack's error code when the API answered `ok: false`.
    pub fn api_code(&self) -> Option<&str> {
        match self {
            Self::Api { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Which conversations `conversations.list` should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationScope {
    Public,
    Private,
}

impl ConversationScope {
    fn types_param(self) -> &'static str {
        match self {
            Self::Public => "public_channel",
            Self::Private => "private_channel",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Conversation {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_private: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct User {
    pub id: String,
    /// Handle (e.g. `alice.smith`).
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub profile: UserProfile,
}

impl From<&User> for Sender {
    fn from(user: &User) -> Self {
        Sender {
            id: user.id.clone(),
            name: user.name.clone(),
            email: user.profile.email.clone(),
            first_name: user.profile.first_name.clone(),
            last_name: user.profile.last_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UserGroup {
    pub id: String,
    #[serde(default)]
    pub handle: String,
}

/// `chat.postMessage` body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PostMessage {
    pub channel: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    pub as_user: bool,
}

/// `chat.postEphemeral` body: visible only to `user` inside `channel`. Carries attachments only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PostEphemeral {
    pub channel: String,
    pub user: String,
    pub attachments: Vec<Attachment>,
}

/// Platform calls used by ingestion and dispatch.
#[async_trait]
pub trait SlackApi: Send + Sync {
    /// All conversations of the given scope the bot can see.
    async fn list_conversations(
        &self,
        scope: ConversationScope,
    ) -> Result<Vec<Conversation>, SlackError>;

    /// Single conversation by id.
    async fn conversation_info(&self, channel_id: &str) -> Result<Conversation, SlackError>;

    /// Whole user directory.
    async fn list_users(&self) -> Result<Vec<User>, SlackError>;

    /// Single user profile by id.
    async fn user_info(&self, user_id: &str) -> Result<User, SlackError>;

    /// User groups (needs the workspace token).
    async fn list_user_groups(&self) -> Result<Vec<UserGroup>, SlackError>;

    /// Open (or reuse) the IM conversation with a user; returns its channel id.
    async fn open_direct_channel(&self, user_id: &str) -> Result<String, SlackError>;

    async fn post_message(&self, message: &PostMessage) -> Result<(), SlackError>;

    async fn post_ephemeral(&self, message: &PostEphemeral) -> Result<(), SlackError>;
}

#[derive(Debug, Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: String,
}

#[derive(Debug, Deserialize)]
struct ConversationsPage {
    #[serde(default)]
    channels: Vec<Conversation>,
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Deserialize)]
struct UsersPage {
    #[serde(default)]
    members: Vec<User>,
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Deserialize)]
struct ConversationResponse {
    channel: Conversation,
}

#[derive(Debug, Deserialize)]
struct OpenedConversation {
    channel: ConversationId,
}

#[derive(Debug, Deserialize)]
struct ConversationId {
    id: String,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    user: User,
}

#[derive(Debug, Deserialize)]
struct UserGroupsResponse {
    #[serde(default)]
    usergroups: Vec<UserGroup>,
}

#[derive(Debug, Deserialize)]
struct AuthTestResponse {
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct OpenSocketResponse {
    url: String,
}

/// reqwest-backed Slack Web API client.
#[derive(Clone)]
pub struct SlackClient {
    api_base: String,
    bot_token: Option<String>,
    app_token: Option<String>,
    workspace_token: Option<String>,
    client: reqwest::Client,
}

impl SlackClient {
    pub fn new(
        api_base: Option<String>,
        bot_token: Option<String>,
        app_token: Option<String>,
        workspace_token: Option<String>,
    ) -> Self {
        let api_base = api_base
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| SLACK_API_BASE.to_string());
        Self {
            api_base,
            bot_token,
            app_token,
            workspace_token,
            client: reqwest::Client::new(),
        }
    }

    fn bot_token(&self) -> Result<&str, SlackError> {
        self.bot_token
            .as_deref()
            .ok_or(SlackError::MissingToken("bot"))
    }

    /// auth.test: returns the bot's own user id.
    pub async fn auth_test(&self) -> Result<String, SlackError> {
        let token = self.bot_token()?;
        let res: AuthTestResponse = self.post_json("auth.test", token, &json!({})).await?;
        Ok(res.user_id)
    }

    /// apps.connections.open: returns a fresh Socket Mode WebSocket URL (app-level token).
    pub async fn open_socket_url(&self) -> Result<String, SlackError> {
        let token = self
            .app_token
            .as_deref()
            .ok_or(SlackError::MissingToken("app"))?;
        let res: OpenSocketResponse = self
            .post_json("apps.connections.open", token, &json!({}))
            .await?;
        Ok(res.url)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        method: &str,
        token: &str,
        query: &[(&str, String)],
    ) -> Result<T, SlackError> {
        let url = format!("{}/{}", self.api_base, method);
        let res = self
            .client
            .get(&url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await?;
        Self::decode(method, res).await
    }

    async fn post_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: &str,
        token: &str,
        body: &B,
    ) -> Result<T, SlackError> {
        let url = format!("{}/{}", self.api_base, method);
        let res = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;
        Self::decode(method, res).await
    }

    /// Check HTTP status and Slack's `ok` flag, then decode the body.
    async fn decode<T: DeserializeOwned>(
        method: &str,
        res: reqwest::Response,
    ) -> Result<T, SlackError> {
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(SlackError::Api {
                method: method.to_string(),
                error: format!("{} {}", status, body),
            });
        }
        let value: Value = res.json().await?;
        if !value.get("ok").and_then(Value::as_bool).unwrap_or(false) {
            let error = value
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown_error")
                .to_string();
            return Err(SlackError::Api {
                method: method.to_string(),
                error,
            });
        }
        Ok(serde_json::from_value(value)?)
    }
}

#[async_trait]
impl SlackApi for SlackClient {
    async fn list_conversations(
        &self,
        scope: ConversationScope,
    ) -> Result<Vec<Conversation>, SlackError> {
        let token = self.bot_token()?;
        let mut out = Vec::new();
        let mut cursor = String::new();
        loop {
            let mut query = vec![
                ("types", scope.types_param().to_string()),
                ("exclude_archived", "true".to_string()),
                ("limit", PAGE_LIMIT.to_string()),
            ];
            if !cursor.is_empty() {
                query.push(("cursor", cursor.clone()));
            }
            let page: ConversationsPage = self.get("conversations.list", token, &query).await?;
            out.extend(page.channels);
            cursor = page
                .response_metadata
                .map(|m| m.next_cursor)
                .unwrap_or_default();
            if cursor.is_empty() {
                return Ok(out);
            }
        }
    }

    async fn conversation_info(&self, channel_id: &str) -> Result<Conversation, SlackError> {
        let token = self.bot_token()?;
        let res: ConversationResponse = self
            .get(
                "conversations.info",
                token,
                &[("channel", channel_id.to_string())],
            )
            .await?;
        Ok(res.channel)
    }

    async fn list_users(&self) -> Result<Vec<User>, SlackError> {
        let token = self.bot_token()?;
        let mut out = Vec::new();
        let mut cursor = String::new();
        loop {
            let mut query = vec![("limit", PAGE_LIMIT.to_string())];
            if !cursor.is_empty() {
                query.push(("cursor", cursor.clone()));
            }
            let page: UsersPage = self.get("users.list", token, &query).await?;
            out.extend(page.members);
            cursor = page
                .response_metadata
                .map(|m| m.next_cursor)
                .unwrap_or_default();
            if cursor.is_empty() {
                return Ok(out);
            }
        }
    }

    async fn user_info(&self, user_id: &str) -> Result<User, SlackError> {
        let token = self.bot_token()?;
        let res: UserResponse = self
            .get("users.info", token, &[("user", user_id.to_string())])
            .await?;
        Ok(res.user)
    }

    async fn list_user_groups(&self) -> Result<Vec<UserGroup>, SlackError> {
        let token = self
            .workspace_token
            .as_deref()
            .ok_or(SlackError::MissingToken("workspace"))?;
        let res: UserGroupsResponse = self.get("usergroups.list", token, &[]).await?;
        Ok(res.usergroups)
    }

    async fn open_direct_channel(&self, user_id: &str) -> Result<String, SlackError> {
        let token = self.bot_token()?;
        let res: OpenedConversation = self
            .post_json("conversations.open", token, &json!({ "users": user_id }))
            .await?;
        Ok(res.channel.id)
    }

    async fn post_message(&self, message: &PostMessage) -> Result<(), SlackError> {
        let token = self.bot_token()?;
        let _: Value = self.post_json("chat.postMessage", token, message).await?;
        Ok(())
    }

    async fn post_ephemeral(&self, message: &PostEphemeral) -> Result<(), SlackError> {
        let token = self.bot_token()?;
        let _: Value = self.post_json("chat.postEphemeral", token, message).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn client(server: &MockServer) -> SlackClient {
        SlackClient::new(
            Some(server.base_url()),
            Some("xoxb-test".to_string()),
            Some("xapp-test".to_string()),
            None,
        )
    }

    #[tokio::test]
    async fn post_message_sends_bearer_and_json_body() {
        let server = MockServer::start();
        let post = server.mock(|when, then| {
            when.method(POST)
                .path("/chat.postMessage")
                .header("authorization", "Bearer xoxb-test")
                .body_includes("\"channel\":\"C1\"")
                .body_includes("\"thread_ts\":\"1.5\"")
                .body_includes("\"as_user\":true");
            then.status(200).json_body(json!({ "ok": true, "ts": "1.6" }));
        });

        let message = PostMessage {
            channel: "C1".to_string(),
            text: "hello".to_string(),
            thread_ts: Some("1.5".to_string()),
            attachments: Vec::new(),
            as_user: true,
        };
        client(&server).post_message(&message).await.unwrap();
        assert_eq!(post.calls(), 1);
    }

    #[tokio::test]
    async fn ok_false_becomes_api_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/chat.postMessage");
            then.status(200)
                .json_body(json!({ "ok": false, "error": "channel_not_found" }));
        });

        let err = client(&server)
            .post_message(&PostMessage::default())
            .await
            .unwrap_err();
        assert_eq!(err.api_code(), Some("channel_not_found"));
    }

    #[tokio::test]
    async fn ok_body_of_wrong_shape_is_decode_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/users.info");
            then.status(200).json_body(json!({ "ok": true }));
        });

        let err = client(&server).user_info("U1").await.unwrap_err();
        assert!(matches!(err, SlackError::Decode(_)));
        assert_eq!(err.api_code(), None);
    }

    #[tokio::test]
    async fn list_conversations_follows_cursor() {
        let server = MockServer::start();
        // Mocks match in creation order, so the cursor page is registered first.
        let second = server.mock(|when, then| {
            when.method(GET)
                .path("/conversations.list")
                .query_param("cursor", "next1");
            then.status(200).json_body(json!({
                "ok": true,
                "channels": [{ "id": "C2", "name": "random" }],
                "response_metadata": { "next_cursor": "" }
            }));
        });
        let first = server.mock(|when, then| {
            when.method(GET)
                .path("/conversations.list")
                .query_param("types", "public_channel");
            then.status(200).json_body(json!({
                "ok": true,
                "channels": [{ "id": "C1", "name": "general" }],
                "response_metadata": { "next_cursor": "next1" }
            }));
        });

        let rooms = client(&server)
            .list_conversations(ConversationScope::Public)
            .await
            .unwrap();
        let ids: Vec<&str> = rooms.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["C1", "C2"]);
        assert_eq!(first.calls(), 1);
        assert_eq!(second.calls(), 1);
    }

    #[tokio::test]
    async fn open_direct_channel_returns_im_id() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST)
                .path("/conversations.open")
                .json_body(json!({ "users": "U1" }));
            then.status(200)
                .json_body(json!({ "ok": true, "channel": { "id": "D9" } }));
        });

        let id = client(&server).open_direct_channel("U1").await.unwrap();
        assert_eq!(id, "D9");
    }

    #[tokio::test]
    async fn user_info_decodes_profile() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/users.info").query_param("user", "U1");
            then.status(200).json_body(json!({
                "ok": true,
                "user": {
                    "id": "U1",
                    "name": "alice.smith",
                    "profile": {
                        "email": "alice@x.com",
                        "first_name": "Alice",
                        "last_name": "Smith"
                    }
                }
            }));
        });

        let user = client(&server).user_info("U1").await.unwrap();
        let sender = Sender::from(&user);
        assert_eq!(sender.email, "alice@x.com");
        assert_eq!(sender.first_name, "Alice");
        assert_eq!(sender.last_name, "Smith");
    }

    #[tokio::test]
    async fn user_groups_require_workspace_token() {
        let server = MockServer::start();
        let err = client(&server).list_user_groups().await.unwrap_err();
        assert!(matches!(err, SlackError::MissingToken("workspace")));
    }

    #[tokio::test]
    async fn http_failure_is_reported_with_status() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/auth.test");
            then.status(500).body("boom");
        });
        let err = client(&server).auth_test().await.unwrap_err();
        let code = err.api_code().unwrap_or_default().to_string();
        assert!(code.starts_with("500"), "{}", code);
    }
}
