use std::sync::Arc;
use std::time::Instant;

use crate::classification::domain::age_classifier::AgeModelLoader;
use crate::detection::domain::face_locator::FaceLocator;
use crate::pipeline::classification_executor::{ClassificationExecutor, FaceResult, RunControl};
use crate::pipeline::detection_summary::DetectionSummary;
use crate::pipeline::pipeline_error::PipelineError;
use crate::pipeline::pipeline_event::{PipelineEvent, RunOutcome};
use crate::pipeline::pipeline_logger::PipelineLogger;
use crate::shared::photo::Photo;

/// Locate faces once, classify each one, and fold the results.
///
/// The thread calling [`DetectAgesUseCase::execute`] is the only writer of
/// the summary: classification runs on the executor's workers and each
/// outcome is folded here as it arrives, in whatever order it arrives.
pub struct DetectAgesUseCase {
    locator: Box<dyn FaceLocator>,
    loader: Arc<dyn AgeModelLoader>,
    executor: Box<dyn ClassificationExecutor>,
    logger: Box<dyn PipelineLogger>,
}

impl DetectAgesUseCase {
    pub fn new(
        locator: Box<dyn FaceLocator>,
        loader: Arc<dyn AgeModelLoader>,
        executor: Box<dyn ClassificationExecutor>,
        logger: Box<dyn PipelineLogger>,
    ) -> Self {
        Self {
            locator,
            loader,
            executor,
            logger,
        }
    }

    /// Runs one detection pass over `photo`.
    ///
    /// `summary` is rebuilt from scratch. Every change to it is followed by
    /// an event carrying a snapshot; failures are reported as
    /// [`PipelineEvent::Alert`] and never abort sibling faces.
    pub fn execute(
        &mut self,
        photo: &Photo,
        summary: &mut DetectionSummary,
        control: &RunControl,
        on_event: &mut dyn FnMut(PipelineEvent),
    ) -> RunOutcome {
        summary.reset();
        if control.is_cancelled() {
            on_event(PipelineEvent::Cancelled);
            return RunOutcome::Cancelled;
        }

        let start = Instant::now();
        let located = self.locator.locate(photo);
        self.logger
            .timing("locate", start.elapsed().as_secs_f64() * 1000.0);

        let faces = match located {
            Ok(faces) => faces,
            Err(e) => {
                log::warn!("Face location failed: {e}");
                let err = PipelineError::Locator(e.to_string());
                on_event(PipelineEvent::Alert(err.alert()));
                return RunOutcome::LocatorFailed;
            }
        };

        if faces.is_empty() {
            summary.set_no_faces();
            self.logger.info(&summary.message);
            on_event(PipelineEvent::NoFaces(summary.clone()));
            return RunOutcome::NoFaces;
        }

        let total = faces.len();
        summary.set_faces(total);
        self.logger.metric("faces", total as f64);
        self.logger.info(&summary.message);
        on_event(PipelineEvent::FacesLocated(summary.clone()));

        let outcomes =
            self.executor
                .execute(faces, photo.orientation(), self.loader.clone(), control);

        let mut done = 0;
        for outcome in outcomes {
            if control.is_cancelled() {
                break;
            }
            done += 1;
            self.logger.timing("classify", outcome.elapsed_ms);
            self.logger.progress(done, total);

            match outcome.result {
                FaceResult::Bucketed { label, bucket } => {
                    log::debug!(
                        "Face {} classified as {} ({bucket})",
                        outcome.index,
                        label.identifier
                    );
                    summary.record(bucket);
                    on_event(PipelineEvent::FaceClassified {
                        index: outcome.index,
                        bucket: Some(bucket),
                        summary: summary.clone(),
                    });
                }
                FaceResult::Unlabelled { label } => {
                    log::debug!(
                        "Face {} has no usable age label ({:?}); skipping",
                        outcome.index,
                        label.map(|l| l.identifier)
                    );
                    on_event(PipelineEvent::FaceClassified {
                        index: outcome.index,
                        bucket: None,
                        summary: summary.clone(),
                    });
                }
                FaceResult::Failed(err) => {
                    log::warn!("Face {}: {err}", outcome.index);
                    on_event(PipelineEvent::Alert(err.alert()));
                }
            }
        }

        if control.is_cancelled() {
            log::info!("Run cancelled after {done}/{total} faces");
            on_event(PipelineEvent::Cancelled);
            return RunOutcome::Cancelled;
        }

        self.logger.summary();
        on_event(PipelineEvent::Finished(summary.clone()));
        RunOutcome::Classified {
            faces: total,
            classified: summary.classified(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classification::domain::age_classifier::AgeClassifier;
    use crate::classification::domain::age_label::{AgeBucket, AgeLabel};
    use crate::pipeline::classification_executor::{classify_face, ClassificationOutcome};
    use crate::pipeline::infrastructure::threaded_classification_executor::ThreadedClassificationExecutor;
    use crate::pipeline::pipeline_error::Alert;
    use crate::pipeline::pipeline_logger::NullPipelineLogger;
    use crate::shared::face::{Face, FaceBounds};
    use crate::shared::orientation::Orientation;
    use crate::BoxError;
    use crossbeam_channel::Receiver;
    use rstest::rstest;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    // --- Stubs ---

    enum LocatorReply {
        Faces(usize),
        Fail(&'static str),
    }

    struct StubLocator {
        reply: LocatorReply,
        calls: Arc<AtomicUsize>,
    }

    impl FaceLocator for StubLocator {
        fn locate(&self, photo: &Photo) -> Result<Vec<Face>, BoxError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.reply {
                LocatorReply::Faces(n) => Ok((0..n)
                    .map(|i| {
                        let bounds = FaceBounds::new(0, 0, 2, 2);
                        Face::new(i, photo.crop(&bounds), bounds, 0.9)
                    })
                    .collect()),
                LocatorReply::Fail(msg) => Err(msg.into()),
            }
        }
    }

    /// Per-face scripted behaviour, keyed by face index.
    #[derive(Clone)]
    enum Script {
        Label(&'static str),
        NoLabels,
        RequestError(&'static str),
    }

    struct ScriptedClassifier {
        script: Arc<HashMap<usize, Script>>,
        orientations: Arc<Mutex<Vec<Orientation>>>,
    }

    impl AgeClassifier for ScriptedClassifier {
        fn classify(&self, face: &Face, o: Orientation) -> Result<Vec<AgeLabel>, BoxError> {
            self.orientations.lock().unwrap().push(o);
            match self.script.get(&face.index).cloned() {
                Some(Script::Label(id)) => Ok(vec![AgeLabel::new(id, 0.9)]),
                Some(Script::NoLabels) | None => Ok(vec![]),
                Some(Script::RequestError(msg)) => Err(msg.into()),
            }
        }
    }

    struct ScriptedLoader {
        script: Arc<HashMap<usize, Script>>,
        orientations: Arc<Mutex<Vec<Orientation>>>,
        fail_loads: AtomicUsize,
        loads: AtomicUsize,
    }

    impl ScriptedLoader {
        fn new(script: Vec<Script>) -> Arc<Self> {
            Arc::new(Self {
                script: Arc::new(script.into_iter().enumerate().collect()),
                orientations: Arc::new(Mutex::new(Vec::new())),
                fail_loads: AtomicUsize::new(0),
                loads: AtomicUsize::new(0),
            })
        }

        fn labels(labels: &[&'static str]) -> Arc<Self> {
            Self::new(labels.iter().map(|&l| Script::Label(l)).collect())
        }
    }

    impl AgeModelLoader for ScriptedLoader {
        fn load(&self) -> Result<Box<dyn AgeClassifier>, BoxError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            let remaining = self.fail_loads.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_loads.store(remaining - 1, Ordering::SeqCst);
                return Err("model file missing".into());
            }
            Ok(Box::new(ScriptedClassifier {
                script: self.script.clone(),
                orientations: self.orientations.clone(),
            }))
        }
    }

    /// Classifies inline and delivers outcomes in a fixed permutation.
    struct PermutingExecutor {
        order: Vec<usize>,
    }

    impl ClassificationExecutor for PermutingExecutor {
        fn execute(
            &self,
            faces: Vec<Face>,
            orientation: Orientation,
            loader: Arc<dyn AgeModelLoader>,
            _control: &RunControl,
        ) -> Receiver<ClassificationOutcome> {
            let (tx, rx) = crossbeam_channel::unbounded();
            for &i in &self.order {
                if let Some(face) = faces.iter().find(|f| f.index == i) {
                    tx.send(classify_face(&*loader, face, orientation)).unwrap();
                }
            }
            rx
        }
    }

    /// Cancels the run after the first outcome has been delivered.
    struct CancellingExecutor;

    impl ClassificationExecutor for CancellingExecutor {
        fn execute(
            &self,
            faces: Vec<Face>,
            orientation: Orientation,
            loader: Arc<dyn AgeModelLoader>,
            control: &RunControl,
        ) -> Receiver<ClassificationOutcome> {
            let (tx, rx) = crossbeam_channel::unbounded();
            tx.send(classify_face(&*loader, &faces[0], orientation)).unwrap();
            control.cancel();
            for face in &faces[1..] {
                tx.send(classify_face(&*loader, face, orientation)).unwrap();
            }
            rx
        }
    }

    // --- Helpers ---

    fn photo() -> Photo {
        Photo::new(vec![100; 8 * 8 * 3], 8, 8, Orientation::Right)
    }

    fn locator(reply: LocatorReply) -> (Box<dyn FaceLocator>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Box::new(StubLocator {
                reply,
                calls: calls.clone(),
            }),
            calls,
        )
    }

    fn use_case(
        reply: LocatorReply,
        loader: Arc<ScriptedLoader>,
        executor: Box<dyn ClassificationExecutor>,
    ) -> DetectAgesUseCase {
        let (locator, _) = locator(reply);
        DetectAgesUseCase::new(locator, loader, executor, Box::new(NullPipelineLogger))
    }

    fn run(uc: &mut DetectAgesUseCase) -> (RunOutcome, DetectionSummary, Vec<PipelineEvent>) {
        let mut summary = DetectionSummary::new();
        let mut events = Vec::new();
        let outcome = uc.execute(&photo(), &mut summary, &RunControl::new(), &mut |e| {
            events.push(e)
        });
        (outcome, summary, events)
    }

    fn alerts(events: &[PipelineEvent]) -> Vec<Alert> {
        events
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::Alert(a) => Some(a.clone()),
                _ => None,
            })
            .collect()
    }

    // --- Tests ---

    #[rstest]
    #[case(vec![0, 1, 2])]
    #[case(vec![2, 1, 0])]
    #[case(vec![1, 2, 0])]
    fn test_three_faces_any_order(#[case] order: Vec<usize>) {
        let loader = ScriptedLoader::labels(&["0-2", "25-32", "15-20"]);
        let mut uc = use_case(
            LocatorReply::Faces(3),
            loader,
            Box::new(PermutingExecutor { order }),
        );

        let (outcome, summary, events) = run(&mut uc);

        assert_eq!(
            outcome,
            RunOutcome::Classified {
                faces: 3,
                classified: 3
            }
        );
        assert_eq!((summary.faces, summary.children, summary.adults), (3, 2, 1));
        assert_eq!(
            summary.message,
            "Number of people: 3\nNumber of children: 2\nNumber of adults: 1"
        );
        assert!(matches!(events.last(), Some(PipelineEvent::Finished(_))));
    }

    #[test]
    fn test_threaded_executor_end_to_end() {
        let loader = ScriptedLoader::labels(&["0-2", "25-32", "15-20", "38-43", "4-6"]);
        let mut uc = use_case(
            LocatorReply::Faces(5),
            loader,
            Box::new(ThreadedClassificationExecutor::with_workers(3)),
        );

        let (_, summary, _) = run(&mut uc);

        assert_eq!(summary.children + summary.adults, 5);
        assert_eq!(summary.children, 3);
    }

    #[test]
    fn test_faces_located_published_before_classification() {
        let loader = ScriptedLoader::labels(&["4-6", "25-32"]);
        let mut uc = use_case(
            LocatorReply::Faces(2),
            loader,
            Box::new(PermutingExecutor { order: vec![0, 1] }),
        );

        let (_, _, events) = run(&mut uc);

        match &events[0] {
            PipelineEvent::FacesLocated(s) => {
                assert_eq!(s.faces, 2);
                assert_eq!(s.message, "Number of faces: 2");
                assert_eq!(s.classified(), 0);
            }
            other => panic!("unexpected first event {other:?}"),
        }
    }

    #[test]
    fn test_intermediate_summaries_hold_invariant() {
        let loader = ScriptedLoader::labels(&["4-6", "25-32", "60-100"]);
        let mut uc = use_case(
            LocatorReply::Faces(3),
            loader,
            Box::new(PermutingExecutor {
                order: vec![2, 0, 1],
            }),
        );

        let (_, _, events) = run(&mut uc);

        let snapshots: Vec<&DetectionSummary> = events
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::FaceClassified { summary, .. } => Some(summary),
                _ => None,
            })
            .collect();
        assert_eq!(snapshots.len(), 3);
        for (i, s) in snapshots.iter().enumerate() {
            assert_eq!(s.faces, 3);
            assert_eq!(s.classified(), i + 1);
        }
        // face 2 ("60-100") completed first
        assert_eq!((snapshots[0].children, snapshots[0].adults), (0, 1));
    }

    #[test]
    fn test_no_faces() {
        let loader = ScriptedLoader::labels(&[]);
        let loads_probe = loader.clone();
        let mut uc = use_case(
            LocatorReply::Faces(0),
            loader,
            Box::new(ThreadedClassificationExecutor::with_workers(2)),
        );

        let (outcome, summary, events) = run(&mut uc);

        assert_eq!(outcome, RunOutcome::NoFaces);
        assert_eq!(summary.message, "No faces detected.");
        assert_eq!((summary.faces, summary.children, summary.adults), (0, 0, 0));
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], PipelineEvent::NoFaces(_)));
        assert_eq!(loads_probe.loads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_locator_failure_skips_fan_out() {
        let loader = ScriptedLoader::labels(&["4-6"]);
        let loads_probe = loader.clone();
        let mut uc = use_case(
            LocatorReply::Fail("corrupt image"),
            loader,
            Box::new(ThreadedClassificationExecutor::with_workers(2)),
        );

        let (outcome, summary, events) = run(&mut uc);

        assert_eq!(outcome, RunOutcome::LocatorFailed);
        assert_eq!(summary, DetectionSummary::default());
        assert_eq!(alerts(&events), vec![Alert::new("Error", "corrupt image")]);
        assert_eq!(loads_probe.loads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_locator_called_exactly_once() {
        let (locator, calls) = locator(LocatorReply::Faces(2));
        let mut uc = DetectAgesUseCase::new(
            locator,
            ScriptedLoader::labels(&["4-6", "8-12"]),
            Box::new(PermutingExecutor { order: vec![0, 1] }),
            Box::new(NullPipelineLogger),
        );

        run(&mut uc);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unparsable_label_is_silent() {
        let loader = ScriptedLoader::new(vec![Script::Label("4-6"), Script::Label("unknown")]);
        let mut uc = use_case(
            LocatorReply::Faces(2),
            loader,
            Box::new(PermutingExecutor { order: vec![0, 1] }),
        );

        let (outcome, summary, events) = run(&mut uc);

        assert_eq!(
            outcome,
            RunOutcome::Classified {
                faces: 2,
                classified: 1
            }
        );
        assert_eq!((summary.children, summary.adults), (1, 0));
        assert!(alerts(&events).is_empty());
    }

    #[test]
    fn test_empty_label_list_is_silent() {
        let loader = ScriptedLoader::new(vec![Script::NoLabels]);
        let mut uc = use_case(
            LocatorReply::Faces(1),
            loader,
            Box::new(PermutingExecutor { order: vec![0] }),
        );

        let (_, summary, events) = run(&mut uc);

        assert_eq!(summary.classified(), 0);
        assert!(alerts(&events).is_empty());
    }

    #[test]
    fn test_request_error_does_not_abort_siblings() {
        let loader = ScriptedLoader::new(vec![
            Script::Label("25-32"),
            Script::RequestError("inference failed"),
            Script::Label("0-2"),
        ]);
        let mut uc = use_case(
            LocatorReply::Faces(3),
            loader,
            Box::new(PermutingExecutor {
                order: vec![1, 0, 2],
            }),
        );

        let (_, summary, events) = run(&mut uc);

        assert_eq!((summary.children, summary.adults), (1, 1));
        assert_eq!(alerts(&events), vec![Alert::new("Error", "inference failed")]);
    }

    #[test]
    fn test_model_load_error_is_per_face() {
        let loader = ScriptedLoader::labels(&["25-32", "4-6"]);
        loader.fail_loads.store(1, Ordering::SeqCst);
        let mut uc = use_case(
            LocatorReply::Faces(2),
            loader,
            Box::new(PermutingExecutor { order: vec![0, 1] }),
        );

        let (_, summary, events) = run(&mut uc);

        assert_eq!((summary.children, summary.adults), (1, 0));
        let alerts = alerts(&events);
        assert_eq!(alerts.len(), 1);
        assert_eq!(
            alerts[0].message,
            "Model couldn't be loaded: model file missing"
        );
    }

    #[test]
    fn test_classifier_receives_photo_orientation() {
        let loader = ScriptedLoader::labels(&["4-6"]);
        let orientations = loader.orientations.clone();
        let mut uc = use_case(
            LocatorReply::Faces(1),
            loader,
            Box::new(PermutingExecutor { order: vec![0] }),
        );

        run(&mut uc);

        assert_eq!(*orientations.lock().unwrap(), vec![Orientation::Right]);
    }

    #[test]
    fn test_summary_is_rebuilt_each_run() {
        let loader = ScriptedLoader::labels(&["4-6", "25-32"]);
        let mut uc = use_case(
            LocatorReply::Faces(2),
            loader,
            Box::new(PermutingExecutor { order: vec![0, 1] }),
        );
        let mut summary = DetectionSummary::new();
        let control = RunControl::new();

        uc.execute(&photo(), &mut summary, &control, &mut |_| {});
        uc.execute(&photo(), &mut summary, &control, &mut |_| {});

        assert_eq!((summary.faces, summary.children, summary.adults), (2, 1, 1));
    }

    #[test]
    fn test_cancel_mid_run_stops_folding() {
        let loader = ScriptedLoader::labels(&["4-6", "25-32", "0-2"]);
        let mut uc = use_case(LocatorReply::Faces(3), loader, Box::new(CancellingExecutor));

        let (outcome, summary, events) = run(&mut uc);

        assert_eq!(outcome, RunOutcome::Cancelled);
        assert!(summary.classified() <= 1);
        assert!(matches!(events.last(), Some(PipelineEvent::Cancelled)));
    }

    #[test]
    fn test_pre_cancelled_run_does_nothing() {
        let (locator, calls) = locator(LocatorReply::Faces(2));
        let mut uc = DetectAgesUseCase::new(
            locator,
            ScriptedLoader::labels(&["4-6", "8-12"]),
            Box::new(PermutingExecutor { order: vec![0, 1] }),
            Box::new(NullPipelineLogger),
        );
        let control = RunControl::new();
        control.cancel();
        let mut summary = DetectionSummary::new();
        summary.set_faces(9);

        let outcome = uc.execute(&photo(), &mut summary, &control, &mut |_| {});

        assert_eq!(outcome, RunOutcome::Cancelled);
        assert_eq!(summary, DetectionSummary::default());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_bucket_reported_in_event() {
        let loader = ScriptedLoader::labels(&["25-32"]);
        let mut uc = use_case(
            LocatorReply::Faces(1),
            loader,
            Box::new(PermutingExecutor { order: vec![0] }),
        );

        let (_, _, events) = run(&mut uc);

        assert!(events.iter().any(|e| matches!(
            e,
            PipelineEvent::FaceClassified {
                index: 0,
                bucket: Some(AgeBucket::Adult),
                ..
            }
        )));
    }
}
