//! Gateway: wires the Slack sources, the inbound queue, the rule engine and the dispatcher.

use crate::channels::slack::{
    events_router, interactive_router, DirectoryCache, Dispatcher, Ingestor, Normalizer,
    SlackApi, SlackClient, SocketModeConnection, StreamingAdapter, WebhookState,
};
use crate::config::{
    self, resolve_app_token, resolve_bot_token, resolve_verification_token,
    resolve_workspace_token, Config,
};
use crate::message::Message;
use crate::rules::RuleEngine;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

fn slack_client(config: &Config) -> Result<SlackClient> {
    let bot_token = resolve_bot_token(config)
        .context("slack bot token not configured (set slack.botToken or SLACK_BOT_TOKEN)")?;
    Ok(SlackClient::new(
        Some(config.slack.api_base.clone()),
        Some(bot_token),
        resolve_app_token(config),
        resolve_workspace_token(config),
    ))
}

/// Call auth.test with the configured bot token. Returns the bot's user id.
pub async fn verify_bot_token(config: &Config) -> Result<String> {
    let client = slack_client(config)?;
    client
        .auth_test()
        .await
        .context("verifying slack bot token (auth.test)")
}

/// Feed every inbound message to the engine and dispatch each reply. Send failures are logged;
/// the loop ends when every producer is gone.
pub async fn run_rule_loop(
    mut inbound_rx: mpsc::UnboundedReceiver<Message>,
    engine: Arc<dyn RuleEngine>,
    dispatcher: Dispatcher,
) {
    while let Some(msg) = inbound_rx.recv().await {
        log::debug!(
            "inbound {:?} message {} from {}",
            msg.kind,
            msg.id,
            msg.channel_id
        );
        for reply in engine.evaluate(msg).await {
            if let Err(e) = dispatcher.send(&reply).await {
                log::error!("problem sending message {}: {}", reply.id, e);
            }
        }
    }
    log::debug!("inbound queue closed; rule loop stopped");
}

async fn bind(host: &str, port: u16) -> Result<TcpListener> {
    let bind_addr = format!("{}:{}", host.trim(), port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    Ok(listener)
}

/// Run the bridge until Ctrl+C / SIGTERM or until a webhook server fails.
pub async fn run_gateway(config: Config, engine: Arc<dyn RuleEngine>) -> Result<()> {
    let client = slack_client(&config)?;
    let bot_id = client
        .auth_test()
        .await
        .context("verifying slack bot token (auth.test)")?;
    log::info!("authenticated as slack bot user {}", bot_id);

    let workspace_token = resolve_workspace_token(&config);
    let api: Arc<dyn SlackApi> = Arc::new(client.clone());
    let directory = Arc::new(DirectoryCache::new());
    let normalizer = Normalizer::new(bot_id, directory.clone(), workspace_token.clone());
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<Message>();
    let ingestor = Ingestor::new(api.clone(), directory.clone(), normalizer, inbound_tx);

    let mut tasks = Vec::new();
    if resolve_app_token(&config).is_some() {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let adapter = StreamingAdapter::new(ingestor.clone(), workspace_token.is_some());
        tasks.push(adapter.start(events_rx));
        let connection = SocketModeConnection::new(client, config.slack.reconnect_delay());
        tasks.push(connection.start(events_tx));
    } else {
        log::warn!(
            "slack app token not configured; socket mode disabled, only webhooks receive events"
        );
        let api = api.clone();
        let fetch_user_groups = workspace_token.is_some();
        tasks.push(tokio::spawn(async move {
            directory.rebuild(api.as_ref(), fetch_user_groups).await;
        }));
    }

    tasks.push(tokio::spawn(run_rule_loop(
        inbound_rx,
        engine,
        Dispatcher::new(api),
    )));

    let state = WebhookState {
        ingestor,
        verification_token: resolve_verification_token(&config),
    };
    if state.verification_token.is_none() {
        log::warn!(
            "slack verification token not configured; only callbacks without a token are accepted"
        );
    }
    let events_path = config::normalize_route_path(&config.slack.events_callback_path);
    let interactions_path = config::normalize_route_path(&config.slack.interactions_callback_path);
    let events_app = events_router(state.clone(), &events_path);
    let interactive_app = interactive_router(state, &interactions_path);

    let events_listener = bind(&config.gateway.bind, config.gateway.events_port).await?;
    log::info!(
        "slack events endpoint listening on {}:{}{}",
        config.gateway.bind,
        config.gateway.events_port,
        events_path
    );
    let interactive_listener = bind(&config.gateway.bind, config.gateway.interactive_port).await?;
    log::info!(
        "slack interactive endpoint listening on {}:{}{}",
        config.gateway.bind,
        config.gateway.interactive_port,
        interactions_path
    );

    let result = tokio::select! {
        r = async { axum::serve(events_listener, events_app).await } => {
            r.context("events server exited")
        }
        r = async { axum::serve(interactive_listener, interactive_app).await } => {
            r.context("interactive server exited")
        }
        _ = shutdown_signal() => {
            log::info!("shutdown signal received");
            Ok(())
        }
    };

    for task in tasks {
        task.abort();
    }
    log::info!("gateway stopped");
    result
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::slack::testing::FakeSlack;
    use async_trait::async_trait;

    struct Shout;

    #[async_trait]
    impl RuleEngine for Shout {
        async fn evaluate(&self, message: Message) -> Vec<Message> {
            if message.input == "ignore" {
                return Vec::new();
            }
            let mut reply = message.clone();
            reply.output = message.input.to_uppercase();
            vec![reply]
        }
    }

    fn inbound(input: &str) -> Message {
        let mut msg = Message::new();
        msg.channel_id = "C1".to_string();
        msg.input = input.to_string();
        msg
    }

    #[tokio::test]
    async fn rule_loop_dispatches_replies_and_survives_send_errors() {
        let mut fake = FakeSlack::new();
        fake.fail_post_to = Some("C-broken".to_string());
        let api = Arc::new(fake);
        let (tx, rx) = mpsc::unbounded_channel();

        let mut broken = inbound("first");
        broken.channel_id = "C-broken".to_string();
        tx.send(broken).unwrap();
        tx.send(inbound("ignore")).unwrap();
        tx.send(inbound("second")).unwrap();
        drop(tx);

        run_rule_loop(rx, Arc::new(Shout), Dispatcher::new(api.clone())).await;

        let texts: Vec<String> = api.posts().into_iter().map(|p| p.text).collect();
        assert_eq!(texts, vec!["FIRST".to_string(), "SECOND".to_string()]);
        assert_eq!(api.sent_channels(), vec!["C-broken".to_string(), "C1".to_string()]);
    }
}
