//! Built-in rules for trying the bridge out: echo back anything said to the bot.
//!
//! `confirm <what>` answers with an ephemeral Yes/No attachment instead; pressing a button comes
//! back as an interactive callback that is echoed like any other message.

use async_trait::async_trait;
use ferry::message::{Attachment, AttachmentAction, Message, MessageKind};
use ferry::rules::RuleEngine;

pub struct EchoRules;

fn button(name: &str, text: &str, value: &str) -> AttachmentAction {
    AttachmentAction {
        name: name.to_string(),
        text: text.to_string(),
        typ: "button".to_string(),
        value: value.to_string(),
        style: None,
    }
}

#[async_trait]
impl RuleEngine for EchoRules {
    async fn evaluate(&self, message: Message) -> Vec<Message> {
        if !message.bot_mentioned && message.kind != MessageKind::Direct {
            return Vec::new();
        }
        let input = message.input.trim().to_string();
        if input.is_empty() {
            return Vec::new();
        }

        let mut reply = message;
        if let Some(what) = input.strip_prefix("confirm ") {
            let question = format!("Confirm {}?", what);
            reply.output = question.clone();
            reply.attach_interactive(vec![Attachment {
                fallback: Some(question.clone()),
                text: Some(question),
                actions: vec![
                    button("yes", "Yes", &format!("${{_user.name}} confirmed {}", what)),
                    button("no", "No", &format!("${{_user.name}} declined {}", what)),
                ],
                ..Attachment::default()
            }]);
        } else {
            reply.output = input;
        }
        vec![reply]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry::message::{Sender, USER_NAME};

    fn incoming(kind: MessageKind, mentioned: bool, input: &str) -> Message {
        let mut msg = Message::new();
        msg.kind = kind;
        msg.bot_mentioned = mentioned;
        msg.input = input.to_string();
        msg
    }

    #[tokio::test]
    async fn echoes_mentions_and_direct_messages_only() {
        let rules = EchoRules;
        let out = rules
            .evaluate(incoming(MessageKind::Channel, true, "hello"))
            .await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].output, "hello");

        assert_eq!(
            rules
                .evaluate(incoming(MessageKind::Direct, false, "hi"))
                .await[0]
                .output,
            "hi"
        );
        assert!(rules
            .evaluate(incoming(MessageKind::Channel, false, "chatter"))
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn confirm_answers_with_buttons() {
        let mut msg = incoming(MessageKind::Direct, false, "confirm deploy");
        msg.set_sender(&Sender {
            id: "U1".to_string(),
            name: "alice".to_string(),
            ..Sender::default()
        });
        assert_eq!(msg.vars.get(USER_NAME).map(String::as_str), Some("alice"));

        let out = EchoRules.evaluate(msg).await;
        let reply = &out[0];
        assert!(reply.is_ephemeral);
        assert_eq!(reply.attachments[0].callback_id.as_deref(), Some(reply.id.as_str()));
        assert_eq!(reply.attachments[0].text.as_deref(), Some("Confirm deploy?"));
        assert_eq!(reply.attachments[0].actions[0].value, "alice confirmed deploy");
    }
}
