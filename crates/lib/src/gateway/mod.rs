//! Gateway: runs the Slack bridge.
//!
//! Two webhook listeners (events and interactive) and the Socket Mode task feed one inbound
//! queue; a single loop hands each message to the rule engine and dispatches the replies.

mod server;

pub use server::{run_gateway, run_rule_loop, verify_bot_token};
