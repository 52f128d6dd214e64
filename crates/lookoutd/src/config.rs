use std::path::PathBuf;
use std::time::Duration;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Camera snapshot URL.
    pub camera_url: String,
    /// Bound on one camera request.
    pub fetch_timeout: Duration,
    /// Directory of known-identity reference images.
    pub gallery_dir: PathBuf,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Base URL of the remote keyed state store.
    pub store_url: String,
    /// Namespace the two result keys live under.
    pub store_namespace: String,
    /// Optional store auth token, sent as a query parameter.
    pub store_auth: Option<String>,
    /// Maximum embedding distance for a positive identity match.
    pub match_threshold: f32,
    /// When set, the annotated frame is kept here as a JPEG each cycle.
    pub preview_path: Option<PathBuf>,
    /// TrueType font for annotation labels; boxes only when unreadable.
    pub font_path: PathBuf,
    /// Fetch-failure backoff bounds.
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
}

impl Config {
    /// Load configuration from `LOOKOUT_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self {
            camera_url: env_string("LOOKOUT_CAMERA_URL", "http://192.168.1.64/capture"),
            fetch_timeout: Duration::from_secs(env_u64("LOOKOUT_FETCH_TIMEOUT_SECS", 5)),
            gallery_dir: env_path("LOOKOUT_GALLERY_DIR", "known_faces"),
            model_dir: env_path("LOOKOUT_MODEL_DIR", "models"),
            store_url: env_string("LOOKOUT_STORE_URL", "http://127.0.0.1:8799"),
            store_namespace: env_string("LOOKOUT_STORE_NAMESPACE", "smart_glasses"),
            store_auth: std::env::var("LOOKOUT_STORE_AUTH").ok(),
            match_threshold: env_f32(
                "LOOKOUT_MATCH_THRESHOLD",
                lookout_core::DEFAULT_MATCH_THRESHOLD,
            ),
            preview_path: std::env::var("LOOKOUT_PREVIEW_PATH").ok().map(PathBuf::from),
            font_path: env_path(
                "LOOKOUT_FONT_PATH",
                "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
            ),
            backoff_initial: Duration::from_millis(env_u64("LOOKOUT_BACKOFF_INITIAL_MS", 200)),
            backoff_max: Duration::from_millis(env_u64("LOOKOUT_BACKOFF_MAX_MS", 10_000)),
        }
    }

    /// Path to the YOLOv8 detection model.
    pub fn yolo_model_path(&self) -> String {
        self.model_dir
            .join("yolov8n.onnx")
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the SCRFD face detection model.
    pub fn scrfd_model_path(&self) -> String {
        self.model_dir
            .join("det_10g.onnx")
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the ArcFace embedding model.
    pub fn arcface_model_path(&self) -> String {
        self.model_dir
            .join("w600k_r50.onnx")
            .to_string_lossy()
            .into_owned()
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_path(key: &str, default: &str) -> PathBuf {
    std::env::var(key)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(default))
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
