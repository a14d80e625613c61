use crate::classification::domain::age_label::AgeLabel;
use crate::shared::face::Face;
use crate::shared::orientation::Orientation;
use crate::BoxError;

/// Domain interface for age classification of a single face.
///
/// Returns labels ranked by descending confidence. `orientation` is the
/// source photo's orientation; implementations rotate the face upright
/// before inference.
pub trait AgeClassifier: Send {
    fn classify(&self, face: &Face, orientation: Orientation) -> Result<Vec<AgeLabel>, BoxError>;
}

/// Loads the age model and hands out classifiers backed by it.
///
/// Called once per face. A failed load must not poison later calls so a
/// subsequent run can retry.
pub trait AgeModelLoader: Send + Sync {
    fn load(&self) -> Result<Box<dyn AgeClassifier>, BoxError>;
}
