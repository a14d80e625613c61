use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::Receiver;

use crate::classification::domain::age_classifier::AgeModelLoader;
use crate::classification::domain::age_label::{AgeBucket, AgeLabel};
use crate::pipeline::pipeline_error::PipelineError;
use crate::shared::face::Face;
use crate::shared::orientation::Orientation;

/// Cancellation token shared between a run's consumer and its workers.
#[derive(Clone, Debug, Default)]
pub struct RunControl {
    cancelled: Arc<AtomicBool>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// Result of classifying one face.
#[derive(Clone, Debug, PartialEq)]
pub enum FaceResult {
    Bucketed { label: AgeLabel, bucket: AgeBucket },
    /// No labels, or a top label whose lower bound does not parse.
    Unlabelled { label: Option<AgeLabel> },
    Failed(PipelineError),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClassificationOutcome {
    pub index: usize,
    pub result: FaceResult,
    pub elapsed_ms: f64,
}

/// Runs per-face classification away from the consuming thread.
///
/// This is a port. Outcomes arrive on the returned channel in completion
/// order; the channel disconnects once every job has finished or been
/// skipped because `control` was cancelled.
pub trait ClassificationExecutor: Send {
    fn execute(
        &self,
        faces: Vec<Face>,
        orientation: Orientation,
        loader: Arc<dyn AgeModelLoader>,
        control: &RunControl,
    ) -> Receiver<ClassificationOutcome>;
}

/// Loads the model, classifies `face`, and buckets its top-ranked label.
pub fn classify_face(
    loader: &dyn AgeModelLoader,
    face: &Face,
    orientation: Orientation,
) -> ClassificationOutcome {
    let start = Instant::now();
    let result = classify_inner(loader, face, orientation);
    ClassificationOutcome {
        index: face.index,
        result,
        elapsed_ms: start.elapsed().as_secs_f64() * 1000.0,
    }
}

fn classify_inner(loader: &dyn AgeModelLoader, face: &Face, orientation: Orientation) -> FaceResult {
    let classifier = match loader.load() {
        Ok(c) => c,
        Err(e) => return FaceResult::Failed(PipelineError::ModelLoad(e.to_string())),
    };

    let labels = match classifier.classify(face, orientation) {
        Ok(labels) => labels,
        Err(e) => return FaceResult::Failed(PipelineError::Request(e.to_string())),
    };

    let Some(top) = labels.into_iter().next() else {
        return FaceResult::Unlabelled { label: None };
    };

    match top.bucket() {
        Some(bucket) => FaceResult::Bucketed { label: top, bucket },
        None => FaceResult::Unlabelled { label: Some(top) },
    }
}
