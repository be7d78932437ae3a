//! CLI parser
use clap::Parser;
use std::num::NonZeroU16;
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::config::BotConfig;
use crate::constants::DEFAULT_SEND_API_URL;
use crate::error::BotError;

#[derive(Parser, Debug)]
/// CLI Options
pub struct CliOptions {
    #[clap(long, help = "Enable debug logging", env = "TIMESTAMPBOT_DEBUG")]
    /// Enable debug logging. Env: TIMESTAMPBOT_DEBUG
    pub debug: bool,
    #[clap(long, short, default_value = "1337", env = "PORT")]
    /// http listener, defaults to `1337`.
    /// Env: PORT
    pub port: NonZeroU16,
    #[clap(long, short, default_value = "0.0.0.0", env = "TIMESTAMPBOT_LISTEN_ADDRESS")]
    /// Listen address, defaults to `0.0.0.0`.
    /// Env: TIMESTAMPBOT_LISTEN_ADDRESS
    pub listen_address: String,
    #[clap(long, short, env = "BASE_URL")]
    /// Public URL the platform uses to reach us, eg `https://bot.example.org`.
    /// Env: BASE_URL
    pub base_url: String,
    #[clap(long, env = "PAGE_ACCESS_TOKEN", hide_env_values = true)]
    /// Page access token for the send API. Env: PAGE_ACCESS_TOKEN
    pub page_access_token: String,
    #[clap(long, env = "VERIFY_TOKEN", hide_env_values = true)]
    /// Token the platform echoes back when verifying the webhook. Env: VERIFY_TOKEN
    pub verify_token: String,
    #[clap(long, short, default_value = "./images", env = "TIMESTAMPBOT_IMAGE_DIR")]
    /// Where pending images live until they are sent back.
    /// Env: TIMESTAMPBOT_IMAGE_DIR
    pub image_dir: PathBuf,
    #[clap(long, default_value = DEFAULT_SEND_API_URL, env = "TIMESTAMPBOT_SEND_API_URL")]
    /// Send API endpoint. Env: TIMESTAMPBOT_SEND_API_URL
    pub send_api_url: String,
    #[clap(long, default_value = "30", env = "TIMESTAMPBOT_HTTP_TIMEOUT_SECS")]
    /// Timeout for outbound HTTP calls. Env: TIMESTAMPBOT_HTTP_TIMEOUT_SECS
    pub http_timeout_secs: u64,
    #[clap(long, default_value = "3600", env = "TIMESTAMPBOT_SESSION_TTL_SECS")]
    /// How long an uncaptioned picture is kept. Env: TIMESTAMPBOT_SESSION_TTL_SECS
    pub session_ttl_secs: u64,
}

impl CliOptions {
    /// Validates the options and builds the runtime configuration.
    pub fn bot_config(&self) -> Result<BotConfig, BotError> {
        let base_url = Url::parse(&self.base_url)
            .map_err(|err| BotError::Config(format!("invalid base url {}: {err}", self.base_url)))?;
        let send_api_url = Url::parse(&self.send_api_url).map_err(|err| {
            BotError::Config(format!("invalid send api url {}: {err}", self.send_api_url))
        })?;
        if self.session_ttl_secs == 0 {
            return Err(BotError::Config(
                "session ttl must be at least one second".to_string(),
            ));
        }

        Ok(BotConfig {
            listen_address: self.listen_address.clone(),
            port: self.port,
            base_url,
            page_access_token: self.page_access_token.clone(),
            verify_token: self.verify_token.clone(),
            image_dir: self.image_dir.clone(),
            send_api_url,
            http_timeout: Duration::from_secs(self.http_timeout_secs),
            session_ttl: Duration::from_secs(self.session_ttl_secs),
        })
    }
}
