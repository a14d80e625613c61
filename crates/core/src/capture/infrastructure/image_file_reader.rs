use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::capture::domain::photo_reader::PhotoReader;
use crate::shared::orientation::Orientation;
use crate::shared::photo::Photo;
use crate::BoxError;

/// Decodes image files with the `image` crate.
///
/// Pixels are kept as stored; the EXIF orientation tag (if any) is carried
/// on the photo so downstream stages can rotate when they need to.
pub struct ImageFileReader {
    orientation_override: Option<Orientation>,
}

impl ImageFileReader {
    pub fn new() -> Self {
        Self {
            orientation_override: None,
        }
    }

    /// Ignore EXIF and tag every photo with `orientation`.
    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation_override = Some(orientation);
        self
    }
}

impl Default for ImageFileReader {
    fn default() -> Self {
        Self::new()
    }
}

impl PhotoReader for ImageFileReader {
    fn read(&self, path: &Path) -> Result<Photo, BoxError> {
        let img = image::open(path)
            .map_err(|e| format!("Failed to decode {}: {e}", path.display()))?
            .to_rgb8();

        let orientation = match self.orientation_override {
            Some(o) => o,
            None => read_exif_orientation(path).unwrap_or_default(),
        };

        log::debug!(
            "Read {} ({}x{}, orientation {orientation})",
            path.display(),
            img.width(),
            img.height()
        );

        Ok(Photo::from_rgb_image(img, orientation))
    }
}

fn read_exif_orientation(path: &Path) -> Option<Orientation> {
    let file = File::open(path).ok()?;
    let mut bufreader = BufReader::new(file);
    let exif = exif::Reader::new()
        .read_from_container(&mut bufreader)
        .ok()?;
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    let value = field.value.get_uint(0)?;
    Some(Orientation::from_exif(value as u16))
}
