use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod annotate;
mod config;
mod engine;
mod preview;
mod publisher;

use annotate::Annotator;
use config::Config;
use engine::{spawn_engine, Engine, EngineSettings};
use lookout_camera::SnapshotCamera;
use lookout_core::{OnnxFaceAnalyzer, YoloDetector};
use preview::{FilePreview, FrameSink, NullSink};
use publisher::KeyedStoreClient;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("lookoutd starting");
    let config = Config::from_env();

    // Fail-fast initialization: models, gallery, camera, and store client
    // are all built before the loop starts; nothing lives in globals.
    let detector = YoloDetector::load(&config.yolo_model_path())?;
    let mut faces =
        OnnxFaceAnalyzer::load(&config.scrfd_model_path(), &config.arcface_model_path())?;

    let gallery = lookout_core::gallery::load_from_dir(&config.gallery_dir, &mut faces)
        .context("loading identity gallery")?;
    if gallery.is_empty() {
        tracing::warn!(
            dir = %config.gallery_dir.display(),
            "identity gallery is empty; every face will resolve to Unknown"
        );
    }

    let camera = SnapshotCamera::new(&config.camera_url, config.fetch_timeout)?;
    let store = KeyedStoreClient::new(
        &config.store_url,
        &config.store_namespace,
        config.store_auth.clone(),
    )?;
    let annotator = Annotator::new(&config.font_path);
    let preview: Box<dyn FrameSink + Send> = match &config.preview_path {
        Some(path) => Box::new(FilePreview::new(path.clone())),
        None => Box::new(NullSink),
    };

    let stop = Arc::new(AtomicBool::new(false));
    let engine = Engine::new(
        camera,
        detector,
        faces,
        store,
        gallery,
        annotator,
        preview,
        EngineSettings {
            match_threshold: config.match_threshold,
            backoff_initial: config.backoff_initial,
            backoff_max: config.backoff_max,
        },
        stop.clone(),
    );
    let engine_thread = spawn_engine(engine)?;
    tracing::info!(
        camera = %config.camera_url,
        store = %config.store_url,
        namespace = %config.store_namespace,
        "lookoutd ready"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("stop signal received; finishing current cycle");
    stop.store(true, Ordering::Relaxed);
    tokio::task::spawn_blocking(move || {
        let _ = engine_thread.join();
    })
    .await?;
    tracing::info!("lookoutd shut down");

    Ok(())
}
