use crate::classification::domain::age_label::AgeBucket;
use crate::pipeline::detection_summary::DetectionSummary;
use crate::pipeline::pipeline_error::Alert;

/// Update pushed to the presentation side while a run progresses.
///
/// Summary-carrying events hold a snapshot taken right after the change,
/// so a consumer can replace its copy wholesale.
#[derive(Clone, Debug, PartialEq)]
pub enum PipelineEvent {
    FacesLocated(DetectionSummary),
    NoFaces(DetectionSummary),
    FaceClassified {
        index: usize,
        bucket: Option<AgeBucket>,
        summary: DetectionSummary,
    },
    Alert(Alert),
    Finished(DetectionSummary),
    Cancelled,
}

impl PipelineEvent {
    pub fn summary(&self) -> Option<&DetectionSummary> {
        match self {
            PipelineEvent::FacesLocated(s)
            | PipelineEvent::NoFaces(s)
            | PipelineEvent::Finished(s)
            | PipelineEvent::FaceClassified { summary: s, .. } => Some(s),
            PipelineEvent::Alert(_) | PipelineEvent::Cancelled => None,
        }
    }
}

/// How a single run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    NoFaces,
    LocatorFailed,
    Classified { faces: usize, classified: usize },
    Cancelled,
}
