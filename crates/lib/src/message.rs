//! Canonical message envelope: the one shape that crosses ingestion, the rule engine and dispatch.
//!
//! Ingestion fills identity and input fields; the rule engine fills output and routing fields;
//! the dispatcher reads them back to decide where the reply goes.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Reserved variable keys describing the human who sent the message.
/// Written together or not at all.
pub const USER_ID: &str = "_user.id";
pub const USER_EMAIL: &str = "_user.email";
pub const USER_NAME: &str = "_user.name";
pub const USER_FIRST_NAME: &str = "_user.firstname";
pub const USER_LAST_NAME: &str = "_user.lastname";

const USER_KEYS: [&str; 5] = [USER_ID, USER_EMAIL, USER_NAME, USER_FIRST_NAME, USER_LAST_NAME];

/// Attribute key carrying the workspace token, when one is configured.
pub const WORKSPACE_TOKEN_ATTR: &str = "ws_token";

/// Where a message was read from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Not yet classified (or classification failed); such messages are never populated.
    #[default]
    Unknown,
    Direct,
    Channel,
    PrivateChannel,
}

/// Identity of the human who sent a message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sender {
    pub id: String,
    pub name: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

/// Slack legacy attachment (rich content). Absent optionals are omitted on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pretext: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumb_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<AttachmentAction>,
}

impl Attachment {
    /// Attachment that only shows an image.
    pub fn image(url: impl Into<String>) -> Self {
        Self {
            image_url: Some(url.into()),
            ..Self::default()
        }
    }
}

/// Interactive element (e.g. a button) of an attachment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentAction {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub text: String,
    #[serde(rename = "type", default)]
    pub typ: String,
    #[serde(default)]
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
}

/// The canonical message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique id (UUID v4), also used as callback id for interactive attachments.
    pub id: String,
    pub kind: MessageKind,
    pub channel_id: String,
    pub channel_name: String,
    /// Text as received, with the bot's own mention stripped.
    pub input: String,
    /// Reply text set by the rule engine.
    pub output: String,
    pub timestamp: String,
    pub thread_timestamp: String,
    pub bot_mentioned: bool,
    /// Open variable map; see the `USER_*` keys for the reserved entries.
    #[serde(default)]
    pub vars: HashMap<String, String>,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    /// Room ids to broadcast the reply to, in order.
    #[serde(default)]
    pub output_to_rooms: Vec<String>,
    /// User identifiers (emails or parts of emails) to DM the reply to, in order.
    #[serde(default)]
    pub output_to_users: Vec<String>,
    /// When true, the reply only goes to the sender; rooms and users are ignored.
    #[serde(default)]
    pub direct_message_only: bool,
    #[serde(default)]
    pub is_ephemeral: bool,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl Message {
    /// Empty message with a fresh id.
    pub fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            ..Self::default()
        }
    }

    /// Write all reserved user variables from the sender.
    pub fn set_sender(&mut self, sender: &Sender) {
        self.vars.insert(USER_ID.to_string(), sender.id.clone());
        self.vars.insert(USER_EMAIL.to_string(), sender.email.clone());
        self.vars.insert(USER_NAME.to_string(), sender.name.clone());
        self.vars.insert(USER_FIRST_NAME.to_string(), sender.first_name.clone());
        self.vars.insert(USER_LAST_NAME.to_string(), sender.last_name.clone());
    }

    /// Remove every reserved user variable.
    pub fn clear_sender(&mut self) {
        for key in USER_KEYS {
            self.vars.remove(key);
        }
    }

    /// Sender's user id, when the message came from a human.
    pub fn sender_id(&self) -> Option<&str> {
        self.vars
            .get(USER_ID)
            .map(String::as_str)
            .filter(|id| !id.is_empty())
    }

    /// Attach interactive attachments produced by a rule.
    ///
    /// The first attachment's callback id becomes this message's id and its action values get
    /// `${var}` placeholders filled from `vars`. Messages with attachments are sent ephemeral.
    pub fn attach_interactive(&mut self, mut attachments: Vec<Attachment>) {
        let Some(first) = attachments.first_mut() else {
            return;
        };
        first.callback_id = Some(self.id.clone());
        for action in first.actions.iter_mut() {
            action.value = substitute_vars(&action.value, &self.vars);
        }
        self.attachments = attachments;
        self.is_ephemeral = true;
    }
}

/// Replace `${name}` placeholders with values from `vars`. Unknown names are left as they are.
pub fn substitute_vars(template: &str, vars: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let name = &after[..end];
        match vars.get(name) {
            Some(value) => out.push_str(value),
            None => {
                log::warn!("no value for variable '{}' in '{}'", name, template);
                out.push_str(&rest[start..start + 2 + end + 1]);
            }
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}
