//! Single-still HTTP frame source.

use image::RgbImage;
use std::io::Read;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Upper bound on a snapshot body; anything larger is rejected unread.
const MAX_SNAPSHOT_BYTES: usize = 8 * 1024 * 1024;

/// Bound on one camera request, connect and read included.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// A failed frame fetch. Every variant is transient: the caller retries on
/// its own cadence, nothing here is fatal.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("camera returned status {0}")]
    Status(u16),
    #[error("transport: {0}")]
    Transport(String),
    #[error("read body: {0}")]
    Read(#[from] std::io::Error),
    #[error("snapshot exceeds {MAX_SNAPSHOT_BYTES} bytes")]
    TooLarge,
    #[error("body is not a decodable image: {0}")]
    Decode(#[from] image::ImageError),
}

/// Startup-time camera configuration error.
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("invalid camera url {url}: {source}")]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },
    #[error("unsupported camera scheme '{0}'; expected http or https")]
    UnsupportedScheme(String),
}

/// Yields one decoded frame per call.
pub trait FrameSource {
    fn fetch(&mut self) -> Result<RgbImage, FetchError>;
}

/// HTTP snapshot camera: one GET per frame against a still-image endpoint.
pub struct SnapshotCamera {
    url: Url,
    agent: ureq::Agent,
}

impl SnapshotCamera {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, CameraError> {
        let url = Url::parse(url).map_err(|source| CameraError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;
        match url.scheme() {
            "http" | "https" => {}
            other => return Err(CameraError::UnsupportedScheme(other.to_string())),
        }

        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Ok(Self { url, agent })
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }
}

impl FrameSource for SnapshotCamera {
    /// Fetch and decode one still. Byte arrival alone is not success: the
    /// body must decode as an image.
    fn fetch(&mut self) -> Result<RgbImage, FetchError> {
        let response = self.agent.get(self.url.as_str()).call().map_err(|e| match e {
            ureq::Error::Status(code, _) => FetchError::Status(code),
            ureq::Error::Transport(t) => FetchError::Transport(t.to_string()),
        })?;

        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(MAX_SNAPSHOT_BYTES as u64 + 1)
            .read_to_end(&mut bytes)?;
        if bytes.len() > MAX_SNAPSHOT_BYTES {
            return Err(FetchError::TooLarge);
        }

        let image = image::load_from_memory(&bytes)?;
        let frame = image.to_rgb8();
        tracing::trace!(
            width = frame.width(),
            height = frame.height(),
            bytes = bytes.len(),
            "snapshot fetched"
        );
        Ok(frame)
    }
}
