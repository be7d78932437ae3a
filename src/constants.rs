//! Shared constants for replies, rendering and the platform API
//!

/// Default send API endpoint.
pub const DEFAULT_SEND_API_URL: &str = "https://graph.facebook.com/v2.6/me/messages";

/// The `object` value of webhook envelopes sent for page subscriptions.
pub const PAGE_OBJECT: &str = "page";

/// Body returned for every accepted webhook delivery.
pub const EVENT_RECEIVED: &str = "EVENT_RECEIVED";

/// Sent to anyone who writes without a pending picture.
pub const WELCOME_TEXT: &str = "Welcome to Timestamp bot. This bot will add a caption to the bottom of a picture you send.\n\nEXAMPLE USAGE:\n[YOUR_PICTURE]\n9:48";

/// Sent once a picture has been stored.
pub const CAPTION_PROMPT_TEXT: &str = "Got it! Now send the caption you want on your picture.";

/// Sent when an attachment isn't a JPEG or PNG picture.
pub const FORMAT_ERROR_TEXT: &str = "Sorry, I can only caption JPEG or PNG pictures.";

/// Sent when anything else goes wrong with a picture.
pub const FALLBACK_ERROR_TEXT: &str =
    "Sorry, something went wrong with your picture. Please send it again.";

/// Horizontal offset of the caption, in pixels.
pub const CAPTION_X_OFFSET: i64 = 80;

/// Caption baseline as a fraction of the image height.
pub const CAPTION_BASELINE_RATIO: f64 = 0.8;

/// Magnification applied to the 8x8 caption glyphs.
pub const CAPTION_GLYPH_SCALE: i64 = 12;

/// Caption fill colour.
pub const CAPTION_COLOR: [u8; 3] = [0xff, 0xff, 0xff];

/// JPEG quality used when re-encoding pictures.
pub const JPEG_QUALITY: u8 = 90;

/// Upper bound on how often the session sweeper wakes up, in seconds.
pub const SWEEP_INTERVAL_MAX_SECONDS: u64 = 60;
