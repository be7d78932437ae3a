//! Delivers replies through the platform's send API.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::config::BotConfig;
use crate::error::BotError;
use crate::handler::{Reply, remove_image};
use crate::messenger::{Participant, SendEnvelope};
use crate::store::SessionStore;

/// Posts replies and cleans up delivered pictures.
#[derive(Clone, Debug)]
pub struct SendGateway {
    client: reqwest::Client,
    config: Arc<BotConfig>,
    sessions: SessionStore,
}

impl SendGateway {
    /// Builds a gateway posting to the configured send API.
    pub fn new(client: reqwest::Client, config: Arc<BotConfig>, sessions: SessionStore) -> Self {
        Self {
            client,
            config,
            sessions,
        }
    }

    /// Sends `reply` to `sender`. Nothing is retried.
    ///
    /// A captioned picture belongs to its reply, so the file is removed
    /// after the attempt whether or not delivery worked.
    #[instrument(level = "debug", skip(self, reply))]
    pub async fn send(&self, sender: &str, reply: &Reply) -> Result<(), BotError> {
        let result = self.deliver(sender, reply).await;
        if let Some(path) = &reply.file {
            self.cleanup(sender, path).await;
        }
        result
    }

    async fn deliver(&self, sender: &str, reply: &Reply) -> Result<(), BotError> {
        let envelope = SendEnvelope {
            recipient: Participant {
                id: sender.to_string(),
            },
            message: &reply.message,
        };
        let response = self
            .client
            .post(self.config.send_api_url.clone())
            .query(&[("access_token", self.config.page_access_token.as_str())])
            .json(&envelope)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BotError::Transport(format!(
                "send API returned {status}: {body}"
            )));
        }
        info!("Message sent to {}", sender);
        Ok(())
    }

    /// Drops the sender's session if it still points at `path`, then
    /// deletes the file. Safe to call more than once.
    pub async fn cleanup(&self, sender: &str, path: &Path) {
        if self.sessions.clear_if(sender, path).await {
            debug!("Cleared session for {}", sender);
        }
        remove_image(path).await;
    }
}
