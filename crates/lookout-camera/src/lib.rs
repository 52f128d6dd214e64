//! lookout-camera — frame acquisition from a networked snapshot camera.
//!
//! One HTTP GET per frame against a camera that serves single JPEG/PNG
//! stills (ESP32-CAM style `/capture` endpoints). Every failure mode is
//! transient by contract; retry cadence belongs to the caller.

pub mod snapshot;

pub use snapshot::{CameraError, FetchError, FrameSource, SnapshotCamera, DEFAULT_FETCH_TIMEOUT};
