//! Downloads attachments into transient storage.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{debug, info, instrument};

use crate::error::BotError;
use crate::images::normalize_to_jpeg;

/// Fetches pictures and stores them as JPEG files named after the message.
#[derive(Clone, Debug)]
pub struct ImageFetcher {
    client: reqwest::Client,
    image_dir: PathBuf,
}

impl ImageFetcher {
    /// Builds a fetcher writing into `image_dir`.
    pub fn new(client: reqwest::Client, image_dir: &Path) -> Self {
        Self {
            client,
            image_dir: image_dir.to_path_buf(),
        }
    }

    /// Where the picture for `message_id` is stored. `None` for an empty id.
    pub fn image_path(&self, message_id: &str) -> Option<PathBuf> {
        image_file_name(message_id).map(|name| self.image_dir.join(name))
    }

    /// Downloads `url`, normalises it to JPEG and writes it to disk.
    ///
    /// Nothing is written when the download fails or the format is rejected.
    #[instrument(level = "debug", skip(self))]
    pub async fn fetch(&self, url: &str, message_id: &str) -> Result<PathBuf, BotError> {
        let path = self.image_path(message_id).ok_or(BotError::BadRequest)?;
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BotError::Transport(format!(
                "image download returned {status}"
            )));
        }
        let bytes = response.bytes().await?;
        debug!("Downloaded {} bytes", bytes.len());

        let normalized = normalize_to_jpeg(&bytes)?;

        tokio::fs::create_dir_all(&self.image_dir).await?;
        replace_file(&path, &normalized.bytes).await?;
        info!(
            "Stored {} picture as {}",
            normalized.source,
            path.display()
        );
        Ok(path)
    }
}

/// File name for a message's picture, or `None` for an empty id.
///
/// `[A-Za-z0-9_-]` are kept, every other byte becomes `.XX` (hex), so
/// distinct ids never share a file.
pub fn image_file_name(message_id: &str) -> Option<String> {
    if message_id.is_empty() {
        return None;
    }
    let mut stem = String::with_capacity(message_id.len());
    for byte in message_id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            stem.push(char::from(byte));
        } else {
            stem.push_str(&format!(".{byte:02X}"));
        }
    }
    Some(format!("{stem}.jpg"))
}

/// Writes `bytes` next to `path` and renames it into place, so readers
/// never see a half-written picture.
pub(crate) async fn replace_file(path: &Path, bytes: &[u8]) -> Result<(), BotError> {
    static TEMP_SEQ: AtomicUsize = AtomicUsize::new(0);
    let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("image");
    let temp = path.with_file_name(format!(".{file_name}.{seq}.tmp"));

    if let Err(err) = tokio::fs::write(&temp, bytes).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(err.into());
    }
    if let Err(err) = tokio::fs::rename(&temp, path).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(err.into());
    }
    Ok(())
}
