//! Decides what to say back to each inbound message.
//!
//! There is no stored state field: a sender is "waiting for a caption"
//! exactly when the [`SessionStore`] has a picture for them.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use crate::compositor::compose_caption;
use crate::config::BotConfig;
use crate::constants::{
    CAPTION_PROMPT_TEXT, FALLBACK_ERROR_TEXT, FORMAT_ERROR_TEXT, WELCOME_TEXT,
};
use crate::error::BotError;
use crate::fetcher::ImageFetcher;
use crate::messenger::{InboundAttachment, InboundMessage, OutboundMessage};
use crate::store::SessionStore;

/// The single reply produced for a turn.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Reply {
    /// What gets sent
    pub message: OutboundMessage,
    /// The captioned picture, cleaned up once the reply is delivered
    pub file: Option<PathBuf>,
}

impl Reply {
    /// A text-only reply.
    pub fn text(text: &str) -> Self {
        Self {
            message: OutboundMessage::text(text),
            file: None,
        }
    }

    /// True when a picture needs cleaning up after delivery.
    pub fn has_file(&self) -> bool {
        self.file.is_some()
    }
}

/// Runs the per-sender conversation.
#[derive(Clone, Debug)]
pub struct ConversationHandler {
    config: Arc<BotConfig>,
    sessions: SessionStore,
    fetcher: ImageFetcher,
}

impl ConversationHandler {
    /// Builds a handler over shared state.
    pub fn new(config: Arc<BotConfig>, sessions: SessionStore, fetcher: ImageFetcher) -> Self {
        Self {
            config,
            sessions,
            fetcher,
        }
    }

    /// Handles one inbound message, always producing exactly one reply.
    #[instrument(level = "debug", skip(self, message), fields(mid = %message.mid))]
    pub async fn handle(&self, sender: &str, message: &InboundMessage) -> Reply {
        if let Some(attachment) = message.attachments.first() {
            return self.accept_upload(sender, &message.mid, attachment).await;
        }

        if let Some(caption) = message.text() {
            match self.apply_caption(sender, caption).await {
                Ok(reply) => return reply,
                Err(BotError::MissingSession(_)) => {}
                Err(err) => {
                    error!("Captioning failed for {}: {}", sender, err);
                    return Reply::text(FALLBACK_ERROR_TEXT);
                }
            }
        }

        info!("Welcoming {}", sender);
        Reply::text(WELCOME_TEXT)
    }

    async fn accept_upload(
        &self,
        sender: &str,
        message_id: &str,
        attachment: &InboundAttachment,
    ) -> Reply {
        let url = match attachment.url() {
            Some(url) if attachment.is_image() => url,
            _ => {
                info!(
                    "Refusing {} attachment from {}",
                    attachment.kind, sender
                );
                return Reply::text(FORMAT_ERROR_TEXT);
            }
        };

        match self.fetcher.fetch(url, message_id).await {
            Ok(path) => {
                if let Some(previous) = self.sessions.set(sender, path.clone()).await
                    && previous != path
                {
                    remove_image(&previous).await;
                }
                info!("Waiting for a caption from {}", sender);
                Reply::text(CAPTION_PROMPT_TEXT)
            }
            Err(BotError::UnsupportedFormat(kind)) => {
                info!("Refusing {} picture from {}", kind, sender);
                Reply::text(FORMAT_ERROR_TEXT)
            }
            Err(err) => {
                error!("Failed to fetch picture for {}: {}", sender, err);
                Reply::text(FALLBACK_ERROR_TEXT)
            }
        }
    }

    /// Stamps `caption` onto the sender's pending picture and points the
    /// reply at it.
    ///
    /// The session is taken before stamping, so a picture is captioned at
    /// most once; from here on the reply owns the file. If stamping fails
    /// the file is deleted.
    pub async fn apply_caption(&self, sender: &str, caption: &str) -> Result<Reply, BotError> {
        let path = self
            .sessions
            .clear(sender)
            .await
            .ok_or_else(|| BotError::MissingSession(sender.to_string()))?;

        match self.captioned_reply(&path, caption).await {
            Ok(reply) => {
                info!("Sending captioned picture to {}", sender);
                Ok(reply)
            }
            Err(err) => {
                remove_image(&path).await;
                Err(err)
            }
        }
    }

    async fn captioned_reply(&self, path: &Path, caption: &str) -> Result<Reply, BotError> {
        compose_caption(path, caption).await?;

        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                BotError::Filesystem(std::io::Error::other(format!(
                    "{} has no usable file name",
                    path.display()
                )))
            })?;
        let url = self.config.image_url(file_name)?;

        Ok(Reply {
            message: OutboundMessage::image(url.as_str()),
            file: Some(path.to_path_buf()),
        })
    }
}

/// Deletes a transient picture. A file that's already gone is fine.
pub(crate) async fn remove_image(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => warn!("Failed to remove {}: {}", path.display(), err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::fetcher::tests::spawn_image_host;
    use crate::images::ImageKind;
    use crate::messenger::{AttachmentLocation, OutboundAttachmentPayload};
    use std::net::SocketAddr;

    struct Fixture {
        handler: ConversationHandler,
        sessions: SessionStore,
        images: SocketAddr,
        _dir: tempfile::TempDir,
        dir: PathBuf,
    }

    async fn fixture() -> Fixture {
        let images = spawn_image_host().await;
        let dir = tempfile::tempdir().expect("tempdir");
        let config = Arc::new(test_config(
            "https://bot.example.org",
            "http://127.0.0.1:1/send",
            dir.path(),
        ));
        let sessions = SessionStore::new();
        let fetcher = ImageFetcher::new(reqwest::Client::new(), dir.path());
        Fixture {
            handler: ConversationHandler::new(config, sessions.clone(), fetcher),
            sessions,
            images,
            dir: dir.path().to_path_buf(),
            _dir: dir,
        }
    }

    fn text(mid: &str, text: &str) -> InboundMessage {
        InboundMessage {
            mid: mid.to_string(),
            text: Some(text.to_string()),
            attachments: Vec::new(),
        }
    }

    fn upload(mid: &str, kind: &str, url: &str) -> InboundMessage {
        InboundMessage {
            mid: mid.to_string(),
            text: None,
            attachments: vec![InboundAttachment {
                kind: kind.to_string(),
                payload: Some(AttachmentLocation {
                    url: Some(url.to_string()),
                }),
            }],
        }
    }

    #[tokio::test]
    async fn text_without_session_gets_welcome() {
        let fx = fixture().await;
        for body in ["hello", "10:45", ""] {
            let reply = fx.handler.handle("alice", &text("m_1", body)).await;
            assert_eq!(reply, Reply::text(WELCOME_TEXT));
        }
        assert!(fx.sessions.is_empty().await);
    }

    #[tokio::test]
    async fn image_upload_creates_session() {
        let fx = fixture().await;
        let message = upload("m_1", "image", &format!("http://{}/photo.jpg", fx.images));
        let reply = fx.handler.handle("alice", &message).await;

        assert_eq!(reply, Reply::text(CAPTION_PROMPT_TEXT));
        assert!(!reply.has_file());
        let path = fx.sessions.get("alice").await.expect("session");
        assert_eq!(path, fx.dir.join("m_1.jpg"));
        let stored = tokio::fs::read(&path).await.expect("stored picture");
        assert_eq!(ImageKind::sniff(&stored), ImageKind::Jpeg);
    }

    #[tokio::test]
    async fn unsupported_pictures_are_refused() {
        let fx = fixture().await;
        let gif = upload("m_1", "image", &format!("http://{}/anim.gif", fx.images));
        assert_eq!(
            fx.handler.handle("alice", &gif).await,
            Reply::text(FORMAT_ERROR_TEXT)
        );

        let video = upload("m_2", "video", &format!("http://{}/photo.jpg", fx.images));
        assert_eq!(
            fx.handler.handle("alice", &video).await,
            Reply::text(FORMAT_ERROR_TEXT)
        );

        let no_url = InboundMessage {
            mid: "m_3".to_string(),
            text: None,
            attachments: vec![InboundAttachment {
                kind: "image".to_string(),
                payload: None,
            }],
        };
        assert_eq!(
            fx.handler.handle("alice", &no_url).await,
            Reply::text(FORMAT_ERROR_TEXT)
        );

        assert!(fx.sessions.get("alice").await.is_none());
        assert!(!fx.dir.join("m_1.jpg").exists());
        assert!(!fx.dir.join("m_2.jpg").exists());
        assert!(!fx.dir.join("m_3.jpg").exists());
    }

    #[tokio::test]
    async fn lookalike_message_ids_keep_senders_apart() {
        let fx = fixture().await;
        fx.handler
            .handle("alice", &upload("m.1", "image", &format!("http://{}/photo.jpg", fx.images)))
            .await;
        fx.handler
            .handle("bob", &upload("m1", "image", &format!("http://{}/photo.png", fx.images)))
            .await;

        let alice = fx.sessions.get("alice").await.expect("alice session");
        let bob = fx.sessions.get("bob").await.expect("bob session");
        assert_ne!(alice, bob);
        // alice still has her own picture, byte for byte
        let stored = tokio::fs::read(&alice).await.expect("alice picture");
        assert_eq!(stored, crate::images::tests::sample_jpeg(200, 150));
    }

    #[tokio::test]
    async fn upload_without_message_id_is_refused() {
        let fx = fixture().await;
        let url = format!("http://{}/photo.jpg", fx.images);
        for sender in ["alice", "bob"] {
            assert_eq!(
                fx.handler.handle(sender, &upload("", "image", &url)).await,
                Reply::text(FALLBACK_ERROR_TEXT)
            );
        }
        assert!(fx.sessions.is_empty().await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_captions_stamp_once() {
        let fx = fixture().await;
        let url = format!("http://{}/photo.jpg", fx.images);
        for round in 0..10 {
            let mid = format!("m_{round}");
            fx.handler.handle("alice", &upload(&mid, "image", &url)).await;

            let first = fx.handler.clone();
            let second = fx.handler.clone();
            let (a, b) = tokio::join!(
                tokio::spawn(async move { first.handle("alice", &text("c_1", "10:45")).await }),
                tokio::spawn(async move { second.handle("alice", &text("c_2", "11:11")).await }),
            );
            let replies = [a.expect("first caption"), b.expect("second caption")];

            let images = replies.iter().filter(|reply| reply.has_file()).count();
            let welcomes = replies
                .iter()
                .filter(|reply| **reply == Reply::text(WELCOME_TEXT))
                .count();
            assert_eq!((images, welcomes), (1, 1), "round {round}: {replies:?}");
        }
    }

    #[tokio::test]
    async fn failed_download_gets_fallback() {
        let fx = fixture().await;
        let gone = upload("m_1", "image", &format!("http://{}/gone.jpg", fx.images));
        assert_eq!(
            fx.handler.handle("alice", &gone).await,
            Reply::text(FALLBACK_ERROR_TEXT)
        );
        assert!(fx.sessions.get("alice").await.is_none());
    }

    #[tokio::test]
    async fn caption_references_session_file() {
        let fx = fixture().await;
        let message = upload("m_1", "image", &format!("http://{}/photo.jpg", fx.images));
        fx.handler.handle("alice", &message).await;
        let before = tokio::fs::read(fx.dir.join("m_1.jpg"))
            .await
            .expect("stored picture");

        let reply = fx.handler.handle("alice", &text("m_2", "10:45")).await;

        assert_eq!(reply.file, Some(fx.dir.join("m_1.jpg")));
        let OutboundMessage::Attachment { attachment } = &reply.message else {
            panic!("expected an attachment reply, got {:?}", reply.message);
        };
        assert_eq!(attachment.kind, "image");
        assert_eq!(
            attachment.payload,
            OutboundAttachmentPayload {
                url: "https://bot.example.org/images/m_1.jpg".to_string(),
                is_reusable: true,
            }
        );
        let after = tokio::fs::read(fx.dir.join("m_1.jpg"))
            .await
            .expect("captioned picture");
        assert_ne!(before, after);
        // the reply owns the file now
        assert!(fx.sessions.get("alice").await.is_none());
    }

    #[tokio::test]
    async fn png_upload_is_stored_as_jpeg() {
        let fx = fixture().await;
        let message = upload("m_1", "image", &format!("http://{}/photo.png", fx.images));
        assert_eq!(
            fx.handler.handle("alice", &message).await,
            Reply::text(CAPTION_PROMPT_TEXT)
        );
        let path = fx.sessions.get("alice").await.expect("session");
        let stored = tokio::fs::read(&path).await.expect("stored picture");
        assert_eq!(ImageKind::sniff(&stored), ImageKind::Jpeg);
    }

    #[tokio::test]
    async fn new_upload_replaces_pending_picture() {
        let fx = fixture().await;
        let url = format!("http://{}/photo.jpg", fx.images);
        fx.handler.handle("alice", &upload("m_1", "image", &url)).await;
        fx.handler.handle("alice", &upload("m_2", "image", &url)).await;

        assert_eq!(fx.sessions.get("alice").await, Some(fx.dir.join("m_2.jpg")));
        assert!(!fx.dir.join("m_1.jpg").exists());
        assert!(fx.dir.join("m_2.jpg").exists());
    }

    #[tokio::test]
    async fn lost_file_gets_fallback_and_drops_session() {
        let fx = fixture().await;
        let url = format!("http://{}/photo.jpg", fx.images);
        fx.handler.handle("alice", &upload("m_1", "image", &url)).await;
        tokio::fs::remove_file(fx.dir.join("m_1.jpg"))
            .await
            .expect("remove picture");

        let reply = fx.handler.handle("alice", &text("m_2", "10:45")).await;
        assert_eq!(reply, Reply::text(FALLBACK_ERROR_TEXT));
        assert!(fx.sessions.get("alice").await.is_none());
    }

    #[tokio::test]
    async fn apply_caption_without_session_is_missing_session() {
        let fx = fixture().await;
        assert!(matches!(
            fx.handler.apply_caption("alice", "10:45").await,
            Err(BotError::MissingSession(sender)) if sender == "alice"
        ));
    }

    #[tokio::test]
    async fn sessions_are_per_sender() {
        let fx = fixture().await;
        let url = format!("http://{}/photo.jpg", fx.images);
        fx.handler.handle("alice", &upload("m_1", "image", &url)).await;

        let reply = fx.handler.handle("bob", &text("m_2", "10:45")).await;
        assert_eq!(reply, Reply::text(WELCOME_TEXT));
    }
}
