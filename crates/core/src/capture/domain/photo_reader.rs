use std::path::Path;

use crate::shared::photo::Photo;
use crate::BoxError;

/// Produces a decoded [`Photo`] from some source.
///
/// Camera and gallery access live outside this crate; implementations
/// here only decode what has already been captured.
pub trait PhotoReader: Send {
    fn read(&self, path: &Path) -> Result<Photo, BoxError>;
}
