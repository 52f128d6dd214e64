//! Remote keyed-store publishing.
//!
//! Each frame's result is written as two independent full overwrites under
//! a configured namespace: one key for detection labels, one for resolved
//! face names. Nothing is merged and no history is kept; the store always
//! holds the latest frame only.

use lookout_core::FrameResult;
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const KEY_DETECTED_OBJECTS: &str = "detected_objects";
pub const KEY_RECOGNIZED_FACES: &str = "recognized_faces";

const PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("invalid store url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("write to key '{key}' failed: {reason}")]
    Write { key: String, reason: String },
}

/// Pushes a frame's result to the shared state store.
pub trait ResultPublisher {
    fn publish(&mut self, result: &FrameResult) -> Result<(), PublishError>;
}

/// HTTP client for a JSON keyed store (Firebase-RTDB-style REST surface:
/// `PUT {base}/{namespace}/{key}.json` replaces the value at that key).
pub struct KeyedStoreClient {
    base: Url,
    namespace: String,
    auth: Option<String>,
    agent: ureq::Agent,
}

impl KeyedStoreClient {
    pub fn new(
        base_url: &str,
        namespace: &str,
        auth: Option<String>,
    ) -> Result<Self, PublishError> {
        let base = Url::parse(base_url).map_err(|e| PublishError::InvalidUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(PublishError::InvalidUrl {
                url: base_url.to_string(),
                reason: format!("unsupported scheme '{}'", base.scheme()),
            });
        }

        let agent = ureq::AgentBuilder::new().timeout(PUBLISH_TIMEOUT).build();
        Ok(Self {
            base,
            namespace: namespace.to_string(),
            auth,
            agent,
        })
    }

    fn key_url(&self, key: &str) -> Result<Url, PublishError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| PublishError::InvalidUrl {
                url: self.base.to_string(),
                reason: "store url cannot carry path segments".to_string(),
            })?
            .pop_if_empty()
            .push(&self.namespace)
            .push(&format!("{key}.json"));
        if let Some(auth) = &self.auth {
            url.query_pairs_mut().append_pair("auth", auth);
        }
        Ok(url)
    }

    fn write_key(&self, key: &str, values: &[String]) -> Result<(), PublishError> {
        let url = self.key_url(key)?;
        self.agent
            .put(url.as_str())
            .send_json(values)
            .map_err(|e| PublishError::Write {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }
}

impl ResultPublisher for KeyedStoreClient {
    /// Two independent overwrites; the second is attempted even when the
    /// first fails. Acknowledgment is not awaited beyond the synchronous
    /// call completing.
    fn publish(&mut self, result: &FrameResult) -> Result<(), PublishError> {
        let objects = self.write_key(KEY_DETECTED_OBJECTS, &result.detected_objects);
        let faces = self.write_key(KEY_RECOGNIZED_FACES, &result.recognized_faces);
        objects.and(faces)
    }
}
