//! HTTP surface: webhook, verification and picture serving.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::{Json, Query, State};
use serde::Deserialize;
use tokio::task::JoinHandle;
use tower_http::services::ServeDir;
use tracing::{debug, error, info};

use crate::config::BotConfig;
use crate::constants::{EVENT_RECEIVED, PAGE_OBJECT, SWEEP_INTERVAL_MAX_SECONDS};
use crate::error::BotError;
use crate::fetcher::ImageFetcher;
use crate::gateway::SendGateway;
use crate::handler::{ConversationHandler, remove_image};
use crate::messenger::{InboundMessage, WebhookEnvelope};
use crate::store::SessionStore;

#[derive(Clone, Debug)]
pub(crate) struct AppState {
    config: Arc<BotConfig>,
    sessions: SessionStore,
    handler: ConversationHandler,
    gateway: SendGateway,
}

impl AppState {
    fn new(config: BotConfig, client: &reqwest::Client) -> Self {
        let config = Arc::new(config);
        let sessions = SessionStore::new();
        let fetcher = ImageFetcher::new(client.clone(), &config.image_dir);
        Self {
            handler: ConversationHandler::new(config.clone(), sessions.clone(), fetcher),
            gateway: SendGateway::new(client.clone(), config.clone(), sessions.clone()),
            sessions,
            config,
        }
    }

    /// Runs one turn: decide on a reply, then deliver it. Turns for the
    /// same sender run one at a time.
    async fn process_event(&self, sender: &str, message: &InboundMessage) {
        let _turn = self.sessions.lock_sender(sender).await;
        let reply = self.handler.handle(sender, message).await;
        if let Err(err) = self.gateway.send(sender, &reply).await {
            error!("Unable to send message to {}: {}", sender, err);
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
}

async fn root_handler() -> &'static str {
    "Timestamp bot is listening"
}

/// Answers the platform's subscription handshake.
async fn verify_handler(
    State(state): State<AppState>,
    Query(query): Query<VerifyQuery>,
) -> Result<String, BotError> {
    let (Some(mode), Some(token)) = (query.mode, query.verify_token) else {
        return Err(BotError::BadRequest);
    };
    if mode != "subscribe" || token != state.config.verify_token {
        return Err(BotError::Forbidden);
    }
    info!("WEBHOOK_VERIFIED");
    Ok(query.challenge.unwrap_or_default())
}

/// Accepts a delivery and processes its events in the background.
async fn webhook_handler(
    State(state): State<AppState>,
    Json(envelope): Json<WebhookEnvelope>,
) -> Result<&'static str, BotError> {
    if envelope.object != PAGE_OBJECT {
        return Err(BotError::NotFound(format!(
            "webhook object {:?}",
            envelope.object
        )));
    }

    for entry in envelope.entry {
        // the platform only ever puts one event in each entry
        let Some(event) = entry.messaging.into_iter().next() else {
            continue;
        };
        debug!("Webhook event: {:?}", event);
        let Some(sender) = event.sender.map(|sender| sender.id) else {
            debug!("Skipping event without a sender");
            continue;
        };
        if let Some(message) = event.message {
            let state = state.clone();
            tokio::spawn(async move {
                state.process_event(&sender, &message).await;
            });
        } else if let Some(postback) = event.postback {
            debug!("Ignoring postback from {}: {:?}", sender, postback.payload);
        }
    }

    Ok(EVENT_RECEIVED)
}

fn create_router(image_dir: &Path) -> Router<AppState> {
    Router::new()
        .route("/", axum::routing::get(root_handler))
        .route(
            "/webhook",
            axum::routing::get(verify_handler).post(webhook_handler),
        )
        .nest_service("/images", ServeDir::new(image_dir))
}

/// Periodically drops pictures nobody captioned.
fn spawn_session_sweeper(sessions: SessionStore, ttl: Duration) -> JoinHandle<()> {
    let period = ttl.min(Duration::from_secs(SWEEP_INTERVAL_MAX_SECONDS));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            for (sender, path) in sessions.take_expired(ttl).await {
                info!("Discarding uncaptioned picture from {}", sender);
                remove_image(&path).await;
            }
        }
    })
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

/// Starts the webhook server and runs until Ctrl-C.
pub async fn setup_server(config: BotConfig) -> Result<(), anyhow::Error> {
    let client = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()?;
    tokio::fs::create_dir_all(&config.image_dir).await?;

    let addr = format!("{}:{}", config.listen_address, config.port);
    let router = create_router(&config.image_dir);
    let state = AppState::new(config, &client);
    let sweeper = spawn_session_sweeper(state.sessions.clone(), state.config.session_ttl);
    let app = router.with_state(state);

    info!("Starting server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", err);
    }
    sweeper.abort();
    Ok(())
}
