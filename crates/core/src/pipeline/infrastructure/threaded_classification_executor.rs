use std::sync::Arc;
use std::thread;

use crossbeam_channel::Receiver;

use crate::classification::domain::age_classifier::AgeModelLoader;
use crate::pipeline::classification_executor::{
    classify_face, ClassificationExecutor, ClassificationOutcome, RunControl,
};
use crate::shared::face::Face;
use crate::shared::orientation::Orientation;

/// Classifies faces on a small pool of background threads.
///
/// Layout: `job queue → N workers → outcome channel → consumer`
///
/// Workers are detached; the outcome channel disconnects when the last one
/// exits, which is how the consumer learns the run is done.
pub struct ThreadedClassificationExecutor {
    max_workers: usize,
}

impl ThreadedClassificationExecutor {
    pub fn new() -> Self {
        let workers = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::with_workers(workers)
    }

    pub fn with_workers(max_workers: usize) -> Self {
        Self {
            max_workers: max_workers.max(1),
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }
}

impl Default for ThreadedClassificationExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassificationExecutor for ThreadedClassificationExecutor {
    fn execute(
        &self,
        faces: Vec<Face>,
        orientation: Orientation,
        loader: Arc<dyn AgeModelLoader>,
        control: &RunControl,
    ) -> Receiver<ClassificationOutcome> {
        let worker_count = self.max_workers.min(faces.len()).max(1);
        let (job_tx, job_rx) = crossbeam_channel::unbounded::<Face>();
        let (outcome_tx, outcome_rx) = crossbeam_channel::unbounded::<ClassificationOutcome>();

        for face in faces {
            // Receiver is alive until the workers below drop it.
            let _ = job_tx.send(face);
        }
        drop(job_tx);

        log::debug!("Classifying {} faces on {worker_count} workers", job_rx.len());

        for _ in 0..worker_count {
            let job_rx = job_rx.clone();
            let outcome_tx = outcome_tx.clone();
            let loader = loader.clone();
            let control = control.clone();
            thread::spawn(move || {
                for face in job_rx {
                    if control.is_cancelled() {
                        break;
                    }
                    let outcome = classify_face(&*loader, &face, orientation);
                    if outcome_tx.send(outcome).is_err() {
                        break;
                    }
                }
            });
        }

        outcome_rx
    }
}
