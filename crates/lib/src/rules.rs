//! Rule-engine boundary: consumes canonical messages, produces routed replies.

use crate::message::Message;
use async_trait::async_trait;

/// The bot's rule matcher. For every inbound message it returns zero or more messages with
/// `output` and the routing fields set, ready for dispatch.
#[async_trait]
pub trait RuleEngine: Send + Sync {
    async fn evaluate(&self, message: Message) -> Vec<Message>;
}
