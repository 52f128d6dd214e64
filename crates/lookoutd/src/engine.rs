//! The perception loop controller.
//!
//! Drives the perpetual fetch → detect → recognize → match → publish →
//! render cycle on a dedicated OS thread. One frame is in flight at most;
//! nothing is buffered across iterations. Cancellation is cooperative: the
//! stop flag is polled once per iteration, after the render step.

use crate::annotate::Annotator;
use crate::preview::FrameSink;
use crate::publisher::ResultPublisher;
use lookout_camera::FrameSource;
use lookout_core::{
    EuclideanMatcher, FaceAnalyzer, FrameResult, IdentityGallery, Matcher, ObjectDetector,
    DEFAULT_MATCH_THRESHOLD,
};
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

const DEFAULT_BACKOFF_INITIAL: Duration = Duration::from_millis(200);
const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(10);

/// Loop state. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Stopped,
}

/// Tunables the loop takes from daemon configuration.
pub struct EngineSettings {
    pub match_threshold: f32,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            backoff_initial: DEFAULT_BACKOFF_INITIAL,
            backoff_max: DEFAULT_BACKOFF_MAX,
        }
    }
}

/// Capped exponential backoff for fetch failures.
///
/// The loop never gives up on transient failures; the backoff only spaces
/// the retries out.
struct Backoff {
    initial: Duration,
    max: Duration,
    next: Duration,
    failures: u32,
}

impl Backoff {
    fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            next: initial,
            failures: 0,
        }
    }

    fn reset(&mut self) {
        self.next = self.initial;
        self.failures = 0;
    }

    /// The delay to sleep for this failure; doubles up to the cap.
    fn delay(&mut self) -> Duration {
        self.failures += 1;
        let jitter = rand::thread_rng().gen_range(0.75..=1.25);
        let delay = self.next.mul_f32(jitter).min(self.max);
        self.next = (self.next * 2).min(self.max);
        delay
    }
}

/// The loop controller, generic over the four seams so scenarios can run
/// against stubs.
pub struct Engine<S, D, F, P> {
    source: S,
    detector: D,
    faces: F,
    publisher: P,
    gallery: IdentityGallery,
    matcher: EuclideanMatcher,
    annotator: Annotator,
    preview: Box<dyn FrameSink + Send>,
    stop: Arc<AtomicBool>,
    state: LoopState,
    backoff: Backoff,
    cycles: u64,
}

impl<S, D, F, P> Engine<S, D, F, P>
where
    S: FrameSource,
    D: ObjectDetector,
    F: FaceAnalyzer,
    P: ResultPublisher,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: S,
        detector: D,
        faces: F,
        publisher: P,
        gallery: IdentityGallery,
        annotator: Annotator,
        preview: Box<dyn FrameSink + Send>,
        settings: EngineSettings,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            source,
            detector,
            faces,
            publisher,
            gallery,
            matcher: EuclideanMatcher {
                threshold: settings.match_threshold,
            },
            annotator,
            preview,
            stop,
            state: LoopState::Running,
            backoff: Backoff::new(settings.backoff_initial, settings.backoff_max),
            cycles: 0,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Drive the perpetual cycle until the stop flag is observed.
    pub fn run(&mut self) {
        tracing::info!(gallery_entries = self.gallery.len(), "perception loop running");
        while self.state == LoopState::Running {
            self.cycle();
            if self.stop.load(Ordering::Relaxed) {
                self.state = LoopState::Stopped;
            }
        }
        tracing::info!(cycles = self.cycles, "perception loop stopped");
    }

    /// One acquisition → inference → match → publish → render pass.
    ///
    /// An iteration always runs to completion or fails early at the fetch
    /// step; no error here ends the loop.
    fn cycle(&mut self) {
        let mut frame = match self.source.fetch() {
            Ok(frame) => frame,
            Err(e) => {
                let delay = self.backoff.delay();
                tracing::warn!(
                    error = %e,
                    consecutive_failures = self.backoff.failures,
                    delay_ms = delay.as_millis() as u64,
                    "frame fetch failed; retrying"
                );
                std::thread::sleep(delay);
                return;
            }
        };
        self.backoff.reset();

        // The two inference passes are independent; neither sees the
        // other's output.
        let detections = match self.detector.detect(&frame) {
            Ok(detections) => detections,
            Err(e) => {
                tracing::warn!(error = %e, "object detection failed; skipping frame");
                return;
            }
        };
        let observations = match self.faces.analyze(&frame) {
            Ok(observations) => observations,
            Err(e) => {
                tracing::warn!(error = %e, "face analysis failed; skipping frame");
                return;
            }
        };

        let mut recognized = Vec::with_capacity(observations.len());
        for observation in &observations {
            let resolved = self.matcher.resolve(&observation.embedding, &self.gallery);
            let name = resolved.display_name().to_string();
            self.annotator.draw(&mut frame, &observation.region, &name);
            recognized.push(name);
        }
        for detection in &detections {
            self.annotator.draw(&mut frame, &detection.region, &detection.label);
        }

        let result = FrameResult {
            detected_objects: detections.into_iter().map(|d| d.label).collect(),
            recognized_faces: recognized,
        };
        self.cycles += 1;
        tracing::debug!(
            objects = result.detected_objects.len(),
            faces = result.recognized_faces.len(),
            "frame processed"
        );

        if let Err(e) = self.publisher.publish(&result) {
            tracing::warn!(error = %e, "state publish failed; continuing");
        }
        if let Err(e) = self.preview.present(&frame) {
            tracing::warn!(error = %e, "preview render failed; continuing");
        }
    }
}

/// Run the engine on a dedicated OS thread.
pub fn spawn_engine<S, D, F, P>(mut engine: Engine<S, D, F, P>) -> std::io::Result<JoinHandle<()>>
where
    S: FrameSource + Send + 'static,
    D: ObjectDetector + Send + 'static,
    F: FaceAnalyzer + Send + 'static,
    P: ResultPublisher + Send + 'static,
{
    std::thread::Builder::new()
        .name("lookout-engine".into())
        .spawn(move || engine.run())
}
