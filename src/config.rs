//! Config handling

use std::num::NonZeroU16;
use std::path::PathBuf;
use std::time::Duration;

use tracing::log::LevelFilter;
use url::Url;

/// Runtime configuration shared by every part of the bot.
#[derive(Clone, Debug)]
pub struct BotConfig {
    /// Address the HTTP listener binds to.
    pub listen_address: String,
    /// Port the HTTP listener binds to.
    pub port: NonZeroU16,
    /// Public URL the platform fetches edited pictures from.
    pub base_url: Url,
    /// Credential sent as the `access_token` query parameter.
    pub page_access_token: String,
    /// Expected `hub.verify_token` on webhook verification.
    pub verify_token: String,
    /// Transient storage for pending pictures.
    pub image_dir: PathBuf,
    /// Send API endpoint.
    pub send_api_url: Url,
    /// Timeout applied to every outbound HTTP call.
    pub http_timeout: Duration,
    /// Age after which a pending picture is discarded.
    pub session_ttl: Duration,
}

impl BotConfig {
    /// Public URL of a file in the image directory.
    pub fn image_url(&self, file_name: &str) -> Result<Url, url::ParseError> {
        let mut base = self.base_url.clone();
        // without a trailing slash, join() would replace the last path segment
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }
        base.join(&format!("images/{file_name}"))
    }
}

/// Sets up logging based on the debug flag
pub fn setup_logging(debug: bool) -> Result<(), Box<std::io::Error>> {
    let level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let mut logger = simple_logger::SimpleLogger::new().with_level(level);
    if !debug {
        logger = logger
            .with_module_level("tracing", LevelFilter::Warn)
            .with_module_level("rustls", LevelFilter::Info)
            .with_module_level("hyper_util", LevelFilter::Info)
            .with_module_level("reqwest", LevelFilter::Info)
            .with_module_level("h2", LevelFilter::Info);
    }
    logger.init().map_err(|err| {
        eprintln!("Failed to initialize logger: {}", err);
        Box::new(std::io::Error::other(err))
    })
}

#[cfg(test)]
pub(crate) fn test_config(base_url: &str, send_api_url: &str, image_dir: &std::path::Path) -> BotConfig {
    BotConfig {
        listen_address: "127.0.0.1".to_string(),
        port: NonZeroU16::MIN,
        base_url: Url::parse(base_url).expect("valid base url"),
        page_access_token: "page-token".to_string(),
        verify_token: "verify-me".to_string(),
        image_dir: image_dir.to_path_buf(),
        send_api_url: Url::parse(send_api_url).expect("valid send url"),
        http_timeout: Duration::from_secs(5),
        session_ttl: Duration::from_secs(3600),
    }
}
