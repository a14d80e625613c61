use crate::shared::face::Face;
use crate::shared::photo::Photo;
use crate::BoxError;

/// Domain interface for finding and cropping faces.
///
/// An empty vector means no faces were found; `Err` is reserved for real
/// failures (undecodable input, inference errors).
pub trait FaceLocator: Send + Sync {
    fn locate(&self, photo: &Photo) -> Result<Vec<Face>, BoxError>;
}
