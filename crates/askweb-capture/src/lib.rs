//! # askweb-capture
//!
//! Drives a signed-in browser page through one prompt/response exchange on a
//! web chat product and hands back what the page produced.
//!
//! ## Flow
//!
//! ```text
//! open page ─► locate input ─► write prompt ─► submit ─► poll until stable ─► extract
//! ```
//!
//! Completion is detected by output stability: the page is polled at a fixed
//! interval and the answer is accepted once identical readings repeat for a
//! configured number of ticks with no thinking indicator visible. See
//! [`stability`] for the exact rule.
//!
//! ## Example
//!
//! ```rust,ignore
//! use askweb_capture::{BrowserHandle, Capturer, CapturePolicy, LaunchOptions, Mode, GEMINI};
//! use std::time::Duration;
//!
//! let browser = BrowserHandle::launch(&LaunchOptions::default(), &[]).await?;
//! let page = browser.page(GEMINI.home_url).await?;
//! let capturer = Capturer::new(page, GEMINI, CapturePolicy::default());
//! let result = capturer
//!     .submit_and_wait("What is a monad?", Mode::TextQuery, Duration::from_secs(120))
//!     .await?;
//! println!("{}", result.payload);
//! browser.close().await?;
//! ```

pub mod browser;
pub mod capture;
pub mod driver;
pub mod images;
pub mod script;
pub mod site;
pub mod stability;

#[cfg(test)]
mod fake;

pub use browser::{BrowserHandle, LaunchOptions};
pub use capture::{CapturePolicy, Capturer, Typing};
pub use driver::{Cookie, PageDriver};
pub use images::{ImageBatch, ImageFailure, ImageOptions};
pub use site::{SiteProfile, GEMINI, NOTEBOOKLM};
pub use stability::{StabilityTracker, Tick};

use std::fmt;
use std::path::PathBuf;

/// Error type for capture operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("not authenticated: the page redirected to sign-in")]
    NotAuthenticated,

    #[error("ui element not found: {0}")]
    UiElementNotFound(String),

    #[error("no stable response within {waited_ms}ms")]
    ResponseTimeout {
        waited_ms: u64,
        /// Last reading taken outside a thinking phase, if any.
        partial: Option<String>,
    },

    #[error("failed to save image {index}: {reason}")]
    ImageSaveFailed { index: usize, reason: String },

    #[error("{0}")]
    Unexpected(String),

    #[error("browser error: {0}")]
    Browser(#[from] eoka::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// What the submitted prompt is expected to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    TextQuery,
    ImageGeneration,
}

/// One completed exchange.
#[derive(Debug, Clone)]
pub struct ResponseResult {
    pub prompt: String,
    /// Page the prompt was submitted on.
    pub target: String,
    pub payload: Payload,
}

#[derive(Debug, Clone)]
pub enum Payload {
    Text {
        text: String,
        /// Cited-source labels, in order of first appearance.
        sources: Vec<String>,
    },
    Images(ImageBatch),
}

impl Payload {
    pub fn text(&self) -> Option<&str> {
        match self {
            Payload::Text { text, .. } => Some(text),
            Payload::Images(_) => None,
        }
    }

    pub fn saved_images(&self) -> &[PathBuf] {
        match self {
            Payload::Images(batch) => &batch.saved,
            Payload::Text { .. } => &[],
        }
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Text { text, sources } => {
                write!(f, "{}", text)?;
                if !sources.is_empty() {
                    write!(f, "\n\nSources:")?;
                    for source in sources {
                        write!(f, "\n  - {}", source)?;
                    }
                }
                Ok(())
            }
            Payload::Images(batch) => {
                for (i, path) in batch.saved.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}", path.display())?;
                }
                Ok(())
            }
        }
    }
}
