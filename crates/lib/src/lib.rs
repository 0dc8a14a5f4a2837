//! Ferry core library: Slack ingestion, message normalization, outbound dispatch and the
//! gateway that ties them to a rule engine.

pub mod channels;
pub mod config;
pub mod gateway;
pub mod init;
pub mod message;
pub mod rules;
