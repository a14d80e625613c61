/// BlazeFace face locator using ONNX Runtime via `ort`.
///
/// Detects on the upright view of the photo, then maps each box back onto
/// the stored pixels so the crop keeps the source orientation.
use std::path::Path;
use std::sync::Mutex;

use crate::detection::domain::face_locator::FaceLocator;
use crate::shared::execution_provider::build_session;
use crate::shared::face::{Face, FaceBounds};
use crate::shared::photo::Photo;
use crate::BoxError;

/// BlazeFace model input resolution.
const INPUT_SIZE: u32 = 128;

pub const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Fraction of the face box added on each side before cropping.
pub const DEFAULT_MARGIN: f64 = 0.2;

/// Boxes smaller than this (in upright pixels) are dropped.
const MIN_FACE_SIZE: i32 = 8;

const NMS_IOU_THRESH: f64 = 0.3;

/// Number of BlazeFace anchors (short-range model).
const NUM_ANCHORS: usize = 896;

pub struct OnnxBlazefaceLocator {
    session: Mutex<ort::session::Session>,
    confidence: f64,
    margin: f64,
    anchors: Vec<[f32; 2]>,
}

impl OnnxBlazefaceLocator {
    pub fn new(model_path: &Path, confidence: f64) -> Result<Self, BoxError> {
        let session = build_session(model_path)?;
        Ok(Self {
            session: Mutex::new(session),
            confidence,
            margin: DEFAULT_MARGIN,
            anchors: generate_anchors(),
        })
    }

    pub fn with_margin(mut self, margin: f64) -> Self {
        self.margin = margin.max(0.0);
        self
    }

    fn run_model(&self, upright: &Photo) -> Result<(Vec<f32>, Vec<f32>), BoxError> {
        let input_tensor = preprocess(upright, INPUT_SIZE);
        let input_value = ort::value::Tensor::from_array(input_tensor)?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| format!("Lock poisoned: {e}"))?;
        let outputs = session.run(ort::inputs![input_value])?;

        // regressors: [1, 896, 16], classificators: [1, 896, 1]
        if outputs.len() < 2 {
            return Err(format!("BlazeFace model expected 2 outputs, got {}", outputs.len()).into());
        }

        let regressors = outputs[0].try_extract_array::<f32>()?;
        let scores = outputs[1].try_extract_array::<f32>()?;
        let reg_data = regressors
            .as_slice()
            .ok_or("Cannot get regressor slice")?
            .to_vec();
        let score_data = scores.as_slice().ok_or("Cannot get score slice")?.to_vec();
        Ok((reg_data, score_data))
    }
}

impl FaceLocator for OnnxBlazefaceLocator {
    fn locate(&self, photo: &Photo) -> Result<Vec<Face>, BoxError> {
        if photo.is_empty() {
            return Err("Photo has no pixels".into());
        }

        let upright = photo.upright();
        let (uw, uh) = (upright.width(), upright.height());
        let (reg_data, score_data) = self.run_model(&upright)?;

        let mut raw_dets = decode(&reg_data, &score_data, &self.anchors, self.confidence, uw, uh);
        let kept = nms(&mut raw_dets, NMS_IOU_THRESH);

        let faces = kept
            .iter()
            .map(|d| {
                let b = FaceBounds::new(
                    d.x1 as i32,
                    d.y1 as i32,
                    (d.x2 - d.x1) as i32,
                    (d.y2 - d.y1) as i32,
                );
                (b, d.score)
            })
            .filter(|(b, _)| b.width >= MIN_FACE_SIZE && b.height >= MIN_FACE_SIZE)
            .enumerate()
            .map(|(index, (b, score))| {
                let square = expand_square(&b, self.margin, uw as i32, uh as i32);
                let bounds = square.to_source(photo.orientation(), photo.width(), photo.height());
                Face::new(index, photo.crop(&bounds), bounds, score as f32)
            })
            .collect::<Vec<_>>();

        log::debug!("BlazeFace kept {} of {} candidates", faces.len(), raw_dets.len());
        Ok(faces)
    }
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

/// Resize photo to `size × size` and normalize to [0,1] NCHW float32.
fn preprocess(photo: &Photo, size: u32) -> ndarray::Array4<f32> {
    let src = photo.as_ndarray();
    let src_h = photo.height() as usize;
    let src_w = photo.width() as usize;
    let s = size as usize;

    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, s, s));

    for y in 0..s {
        let src_y = (((y as f64 + 0.5) * src_h as f64 / s as f64) as usize).min(src_h - 1);
        for x in 0..s {
            let src_x = (((x as f64 + 0.5) * src_w as f64 / s as f64) as usize).min(src_w - 1);
            for c in 0..3 {
                tensor[[0, c, y, x]] = src[[src_y, src_x, c]] as f32 / 255.0;
            }
        }
    }

    tensor
}

/// Two feature maps: 16×16 with 2 anchors per cell, 8×8 with 6.
fn generate_anchors() -> Vec<[f32; 2]> {
    let strides = [(8, 2), (16, 6)];
    let mut anchors = Vec::with_capacity(NUM_ANCHORS);

    for &(stride, num) in &strides {
        let grid_size = INPUT_SIZE as usize / stride;
        for y in 0..grid_size {
            for x in 0..grid_size {
                let cx = (x as f32 + 0.5) / grid_size as f32;
                let cy = (y as f32 + 0.5) / grid_size as f32;
                for _ in 0..num {
                    anchors.push([cx, cy]);
                }
            }
        }
    }

    anchors
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
struct RawDet {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
    score: f64,
}

/// Converts anchor-relative regressions into clamped pixel boxes.
fn decode(
    reg_data: &[f32],
    score_data: &[f32],
    anchors: &[[f32; 2]],
    confidence: f64,
    fw: u32,
    fh: u32,
) -> Vec<RawDet> {
    let mut dets = Vec::new();
    let num_anchors = anchors.len().min(NUM_ANCHORS);

    for (i, &raw_score) in score_data.iter().enumerate().take(num_anchors) {
        let score = sigmoid(raw_score);
        if (score as f64) < confidence {
            continue;
        }

        let reg_offset = i * 16;
        if reg_offset + 4 > reg_data.len() {
            break;
        }

        let anchor = &anchors[i];
        let cx = anchor[0] + reg_data[reg_offset] / INPUT_SIZE as f32;
        let cy = anchor[1] + reg_data[reg_offset + 1] / INPUT_SIZE as f32;
        let w = reg_data[reg_offset + 2] / INPUT_SIZE as f32;
        let h = reg_data[reg_offset + 3] / INPUT_SIZE as f32;

        dets.push(RawDet {
            x1: ((cx - w / 2.0) * fw as f32).max(0.0) as f64,
            y1: ((cy - h / 2.0) * fh as f32).max(0.0) as f64,
            x2: ((cx + w / 2.0) * fw as f32).min(fw as f32) as f64,
            y2: ((cy + h / 2.0) * fh as f32).min(fh as f32) as f64,
            score: score as f64,
        });
    }

    dets
}

fn nms(dets: &mut [RawDet], iou_thresh: f64) -> Vec<RawDet> {
    dets.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<RawDet> = Vec::new();
    for det in dets.iter() {
        if keep.iter().all(|k| bbox_iou(k, det) <= iou_thresh) {
            keep.push(det.clone());
        }
    }
    keep
}

fn bbox_iou(a: &RawDet, b: &RawDet) -> f64 {
    let x1 = a.x1.max(b.x1);
    let y1 = a.y1.max(b.y1);
    let x2 = a.x2.min(b.x2);
    let y2 = a.y2.min(b.y2);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter == 0.0 {
        return 0.0;
    }
    let area_a = (a.x2 - a.x1) * (a.y2 - a.y1);
    let area_b = (b.x2 - b.x1) * (b.y2 - b.y1);
    inter / (area_a + area_b - inter)
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Grows `b` by `margin` on each side, squares it around its center, and
/// clamps to the frame.
fn expand_square(b: &FaceBounds, margin: f64, fw: i32, fh: i32) -> FaceBounds {
    let side = (b.width.max(b.height) as f64 * (1.0 + 2.0 * margin)).round() as i32;
    let cx = b.x + b.width / 2;
    let cy = b.y + b.height / 2;

    let x1 = (cx - side / 2).max(0);
    let y1 = (cy - side / 2).max(0);
    let x2 = (cx - side / 2 + side).min(fw);
    let y2 = (cy - side / 2 + side).min(fh);

    FaceBounds::new(x1, y1, x2 - x1, y2 - y1)
}
