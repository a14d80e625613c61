use ndarray::ArrayView3;

use image::RgbImage;

use crate::shared::face::FaceBounds;
use crate::shared::orientation::Orientation;

pub const CHANNELS: u8 = 3;

/// An in-memory photograph: contiguous RGB bytes in row-major order plus
/// the orientation the pixels were captured in.
///
/// Pixel data is stored as captured; call [`Photo::upright`] to get a copy
/// that can be fed to models expecting upright input.
#[derive(Clone, Debug, PartialEq)]
pub struct Photo {
    data: Vec<u8>,
    width: u32,
    height: u32,
    orientation: Orientation,
}

impl Photo {
    pub fn new(data: Vec<u8>, width: u32, height: u32, orientation: Orientation) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (CHANNELS as usize),
            "data length must equal width * height * 3"
        );
        Self {
            data,
            width,
            height,
            orientation,
        }
    }

    pub fn from_rgb_image(img: RgbImage, orientation: Orientation) -> Self {
        let (width, height) = img.dimensions();
        Self::new(img.into_raw(), width, height, orientation)
    }

    pub fn to_rgb_image(&self) -> RgbImage {
        // Length is checked on construction.
        RgbImage::from_raw(self.width, self.height, self.data.clone())
            .unwrap_or_else(|| RgbImage::new(self.width, self.height))
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        CHANNELS
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(
            (
                self.height as usize,
                self.width as usize,
                CHANNELS as usize,
            ),
            &self.data,
        )
        .expect("Photo data length must match dimensions")
    }

    /// Returns a copy with the orientation applied and the tag reset to `Up`.
    pub fn upright(&self) -> Photo {
        if self.orientation == Orientation::Up {
            return self.clone();
        }
        let rotated = self.orientation.apply(&self.to_rgb_image());
        Photo::from_rgb_image(rotated, Orientation::Up)
    }

    /// Copies the pixels inside `bounds`, clamped to the photo.
    ///
    /// The crop keeps this photo's orientation tag.
    pub fn crop(&self, bounds: &FaceBounds) -> Photo {
        let x1 = bounds.x.clamp(0, self.width as i32) as usize;
        let y1 = bounds.y.clamp(0, self.height as i32) as usize;
        let x2 = (bounds.x + bounds.width).clamp(0, self.width as i32) as usize;
        let y2 = (bounds.y + bounds.height).clamp(0, self.height as i32) as usize;

        let crop_w = x2.saturating_sub(x1);
        let crop_h = y2.saturating_sub(y1);
        let stride = self.width as usize * CHANNELS as usize;
        let row_len = crop_w * CHANNELS as usize;

        let mut data = Vec::with_capacity(row_len * crop_h);
        for row in y1..y2 {
            let start = row * stride + x1 * CHANNELS as usize;
            data.extend_from_slice(&self.data[start..start + row_len]);
        }

        Photo::new(data, crop_w as u32, crop_h as u32, self.orientation)
    }
}
