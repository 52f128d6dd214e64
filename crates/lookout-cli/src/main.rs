use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lookout_camera::{FrameSource, SnapshotCamera};
use lookout_core::{
    EuclideanMatcher, FaceAnalyzer, FrameResult, IdentityGallery, Matcher, ObjectDetector,
    OnnxFaceAnalyzer, YoloDetector,
};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "lookout", about = "Lookout perception diagnostics CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch one snapshot from the camera and save it
    Snapshot {
        /// Camera snapshot URL
        #[arg(long)]
        url: String,
        /// Output image path
        #[arg(long, default_value = "snapshot.jpg")]
        output: PathBuf,
        /// Fetch timeout in seconds
        #[arg(long, default_value_t = 5)]
        timeout_secs: u64,
    },
    /// Load the identity gallery and list its entries
    Gallery {
        /// Directory of reference images
        dir: PathBuf,
        /// Directory containing the ONNX models
        #[arg(long, default_value = "models")]
        model_dir: PathBuf,
    },
    /// Run one full perception cycle and print the result as JSON
    Perceive {
        /// Camera snapshot URL
        #[arg(long)]
        url: String,
        /// Directory containing the ONNX models
        #[arg(long, default_value = "models")]
        model_dir: PathBuf,
        /// Directory of reference images; without it every face is Unknown
        #[arg(long)]
        gallery: Option<PathBuf>,
        /// Maximum embedding distance for a positive match
        #[arg(long, default_value_t = lookout_core::DEFAULT_MATCH_THRESHOLD)]
        threshold: f32,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Snapshot {
            url,
            output,
            timeout_secs,
        } => snapshot(&url, &output, timeout_secs),
        Commands::Gallery { dir, model_dir } => gallery(&dir, &model_dir),
        Commands::Perceive {
            url,
            model_dir,
            gallery,
            threshold,
        } => perceive(&url, &model_dir, gallery.as_deref(), threshold),
    }
}

fn snapshot(url: &str, output: &Path, timeout_secs: u64) -> Result<()> {
    let mut camera = SnapshotCamera::new(url, Duration::from_secs(timeout_secs))?;
    let frame = camera.fetch().context("fetching snapshot")?;
    frame.save(output).context("saving snapshot")?;
    println!(
        "saved {}x{} snapshot to {}",
        frame.width(),
        frame.height(),
        output.display()
    );
    Ok(())
}

fn gallery(dir: &Path, model_dir: &Path) -> Result<()> {
    let mut analyzer = load_face_analyzer(model_dir)?;
    let gallery = lookout_core::gallery::load_from_dir(dir, &mut analyzer)?;

    if gallery.is_empty() {
        println!("no gallery entries in {}", dir.display());
        return Ok(());
    }
    for entry in gallery.entries() {
        println!("{} ({}-dim embedding)", entry.name, entry.embedding.values.len());
    }
    Ok(())
}

fn perceive(url: &str, model_dir: &Path, gallery_dir: Option<&Path>, threshold: f32) -> Result<()> {
    let mut detector = YoloDetector::load(&model_path(model_dir, "yolov8n.onnx"))?;
    let mut analyzer = load_face_analyzer(model_dir)?;

    let gallery = match gallery_dir {
        Some(dir) => lookout_core::gallery::load_from_dir(dir, &mut analyzer)?,
        None => IdentityGallery::default(),
    };

    let mut camera = SnapshotCamera::new(url, Duration::from_secs(5))?;
    let frame = camera.fetch().context("fetching frame")?;

    let detections = detector.detect(&frame)?;
    let observations = analyzer.analyze(&frame)?;

    let matcher = EuclideanMatcher { threshold };
    let result = FrameResult {
        detected_objects: detections.into_iter().map(|d| d.label).collect(),
        recognized_faces: observations
            .iter()
            .map(|obs| matcher.resolve(&obs.embedding, &gallery).display_name().to_string())
            .collect(),
    };

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn load_face_analyzer(model_dir: &Path) -> Result<OnnxFaceAnalyzer> {
    Ok(OnnxFaceAnalyzer::load(
        &model_path(model_dir, "det_10g.onnx"),
        &model_path(model_dir, "w600k_r50.onnx"),
    )?)
}

fn model_path(model_dir: &Path, file: &str) -> String {
    model_dir.join(file).to_string_lossy().into_owned()
}
