//! Communication channels (Slack).
//!
//! A channel connector turns platform events into canonical [`Message`](crate::message::Message)s
//! on the gateway's inbound queue and delivers routed replies back to the platform.

pub mod slack;
