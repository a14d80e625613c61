use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, TryRecvError};

use crate::pipeline::classification_executor::RunControl;
use crate::pipeline::detect_ages_use_case::DetectAgesUseCase;
use crate::pipeline::detection_summary::DetectionSummary;
use crate::pipeline::pipeline_error::PipelineError;
use crate::pipeline::pipeline_event::{PipelineEvent, RunOutcome};
use crate::shared::photo::Photo;

struct ActiveRun {
    control: RunControl,
    events: Receiver<PipelineEvent>,
    handle: JoinHandle<RunOutcome>,
}

/// Holds the presented photo and drives detection runs off the caller's
/// thread.
///
/// The caller's thread owns `summary` and updates it only from snapshots
/// carried by events it receives through [`poll`](Self::poll) or
/// [`wait`](Self::wait). Starting a new run or calling
/// [`reset`](Self::reset) cancels the previous one and drops its receiver,
/// so a stale run can never touch the next run's counters.
pub struct AgeDetectionSession {
    use_case: Arc<Mutex<DetectAgesUseCase>>,
    photo: Option<Arc<Photo>>,
    summary: DetectionSummary,
    run: Option<ActiveRun>,
    last_outcome: Option<RunOutcome>,
}

impl AgeDetectionSession {
    pub fn new(use_case: DetectAgesUseCase) -> Self {
        Self {
            use_case: Arc::new(Mutex::new(use_case)),
            photo: None,
            summary: DetectionSummary::new(),
            run: None,
            last_outcome: None,
        }
    }

    /// A freshly taken photo: reset, present it, and start a run.
    pub fn capture(&mut self, photo: Photo) {
        self.present(photo);
    }

    /// A photo picked from storage. Same flow as [`capture`](Self::capture).
    pub fn choose(&mut self, photo: Photo) {
        self.present(photo);
    }

    /// Re-runs detection on the presented photo.
    pub fn detect(&mut self) -> Result<(), PipelineError> {
        let Some(photo) = self.photo.clone() else {
            return Err(PipelineError::NoPhoto);
        };
        self.reset();
        self.start(photo);
        Ok(())
    }

    /// Cancels any in-flight run and zeroes the summary.
    pub fn reset(&mut self) {
        if let Some(run) = self.run.take() {
            log::debug!("Cancelling in-flight run");
            run.control.cancel();
            // Receiver dropped here; the worker's next send fails and it stops.
        }
        self.summary.reset();
        self.last_outcome = None;
    }

    /// Drains pending events without blocking.
    pub fn poll(&mut self) -> Vec<PipelineEvent> {
        let mut events = Vec::new();
        let mut finished = false;
        if let Some(run) = &self.run {
            loop {
                match run.events.try_recv() {
                    Ok(event) => events.push(event),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        finished = true;
                        break;
                    }
                }
            }
        }
        self.apply(&events);
        if finished {
            self.finish();
        }
        events
    }

    /// Blocks until the current run ends and returns everything it emitted.
    pub fn wait(&mut self) -> Vec<PipelineEvent> {
        let events: Vec<PipelineEvent> = match &self.run {
            Some(run) => run.events.iter().collect(),
            None => return Vec::new(),
        };
        self.apply(&events);
        self.finish();
        events
    }

    pub fn summary(&self) -> &DetectionSummary {
        &self.summary
    }

    pub fn photo(&self) -> Option<&Photo> {
        self.photo.as_deref()
    }

    pub fn is_running(&self) -> bool {
        self.run.is_some()
    }

    /// How the most recently completed run ended.
    pub fn last_outcome(&self) -> Option<RunOutcome> {
        self.last_outcome
    }

    fn present(&mut self, photo: Photo) {
        self.reset();
        let photo = Arc::new(photo);
        self.photo = Some(photo.clone());
        self.start(photo);
    }

    fn start(&mut self, photo: Arc<Photo>) {
        let control = RunControl::new();
        let (tx, rx) = crossbeam_channel::unbounded();
        let use_case = self.use_case.clone();
        let worker_control = control.clone();

        let handle = thread::spawn(move || {
            // A poisoned lock only means an earlier run panicked mid-way;
            // the use case itself holds no per-run state.
            let mut use_case = use_case.lock().unwrap_or_else(|p| p.into_inner());
            let mut summary = DetectionSummary::new();
            use_case.execute(&photo, &mut summary, &worker_control, &mut |event| {
                if tx.send(event).is_err() {
                    worker_control.cancel();
                }
            })
        });

        self.run = Some(ActiveRun {
            control,
            events: rx,
            handle,
        });
    }

    fn apply(&mut self, events: &[PipelineEvent]) {
        for event in events {
            if let Some(snapshot) = event.summary() {
                self.summary = snapshot.clone();
            }
        }
    }

    fn finish(&mut self) {
        if let Some(run) = self.run.take() {
            match run.handle.join() {
                Ok(outcome) => self.last_outcome = Some(outcome),
                Err(_) => log::error!("Detection run panicked"),
            }
        }
    }
}

impl Drop for AgeDetectionSession {
    fn drop(&mut self) {
        if let Some(run) = &self.run {
            run.control.cancel();
        }
    }
}
