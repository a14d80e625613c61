/// Age classification with an AgeNet-style ONNX model.
///
/// The model takes a 227×227 BGR face, mean-subtracted, and emits one score
/// per entry of [`AGE_LABELS`].
use std::sync::{Arc, Mutex};

use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::classification::domain::age_classifier::{AgeClassifier, AgeModelLoader};
use crate::classification::domain::age_label::{rank, AgeLabel};
use crate::shared::constants::AGE_LABELS;
use crate::shared::execution_provider::build_session;
use crate::shared::face::Face;
use crate::shared::model_resolver::{self, ModelSource};
use crate::shared::orientation::Orientation;
use crate::BoxError;

const INPUT_SIZE: u32 = 227;

/// Per-channel means in B, G, R order.
const BGR_MEAN: [f32; 3] = [104.0, 117.0, 123.0];

type SharedSession = Arc<Mutex<ort::session::Session>>;

/// Resolves and builds the age model session on first use.
///
/// Successful loads are cached; failures are not, so the next call retries.
pub struct OnnxAgeModelLoader {
    source: ModelSource,
    session: Mutex<Option<SharedSession>>,
}

impl OnnxAgeModelLoader {
    pub fn new(source: ModelSource) -> Self {
        Self {
            source,
            session: Mutex::new(None),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.session.lock().map(|s| s.is_some()).unwrap_or(false)
    }
}

impl AgeModelLoader for OnnxAgeModelLoader {
    fn load(&self) -> Result<Box<dyn AgeClassifier>, BoxError> {
        let mut slot = self
            .session
            .lock()
            .map_err(|e| format!("Lock poisoned: {e}"))?;

        let session = match slot.as_ref() {
            Some(session) => session.clone(),
            None => {
                let path = model_resolver::resolve(&self.source, None)?;
                log::info!("Loading age model from {}", path.display());
                let session = Arc::new(Mutex::new(build_session(&path)?));
                *slot = Some(session.clone());
                session
            }
        };

        Ok(Box::new(OnnxAgeClassifier { session }))
    }
}

pub struct OnnxAgeClassifier {
    session: SharedSession,
}

impl AgeClassifier for OnnxAgeClassifier {
    fn classify(&self, face: &Face, orientation: Orientation) -> Result<Vec<AgeLabel>, BoxError> {
        if face.image.is_empty() {
            return Err("Face crop is empty".into());
        }

        let upright = orientation.apply(&face.image.to_rgb_image());
        let input_value = ort::value::Tensor::from_array(preprocess(&upright))?;

        let scores = {
            let mut session = self
                .session
                .lock()
                .map_err(|e| format!("Lock poisoned: {e}"))?;
            let outputs = session.run(ort::inputs![input_value])?;
            let array = outputs[0].try_extract_array::<f32>()?;
            array.iter().copied().collect::<Vec<f32>>()
        };

        to_labels(&scores)
    }
}

/// Resize to 227×227, reorder to BGR, subtract channel means, NCHW layout.
fn preprocess(img: &RgbImage) -> ndarray::Array4<f32> {
    let resized = imageops::resize(img, INPUT_SIZE, INPUT_SIZE, FilterType::Triangle);
    let s = INPUT_SIZE as usize;
    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, s, s));

    for (x, y, pixel) in resized.enumerate_pixels() {
        let [r, g, b] = pixel.0;
        let (x, y) = (x as usize, y as usize);
        tensor[[0, 0, y, x]] = b as f32 - BGR_MEAN[0];
        tensor[[0, 1, y, x]] = g as f32 - BGR_MEAN[1];
        tensor[[0, 2, y, x]] = r as f32 - BGR_MEAN[2];
    }

    tensor
}

/// Pairs scores with label names and ranks them.
///
/// Raw logits are softmax-normalized; outputs that already look like a
/// probability distribution are kept as-is.
fn to_labels(scores: &[f32]) -> Result<Vec<AgeLabel>, BoxError> {
    if scores.len() != AGE_LABELS.len() {
        return Err(format!(
            "Age model returned {} scores, expected {}",
            scores.len(),
            AGE_LABELS.len()
        )
        .into());
    }

    let probabilities = if is_distribution(scores) {
        scores.to_vec()
    } else {
        softmax(scores)
    };

    let mut labels: Vec<AgeLabel> = AGE_LABELS
        .iter()
        .zip(probabilities)
        .map(|(name, p)| AgeLabel::new(*name, p))
        .collect();
    rank(&mut labels);
    Ok(labels)
}

fn is_distribution(scores: &[f32]) -> bool {
    let sum: f32 = scores.iter().sum();
    scores.iter().all(|&s| (0.0..=1.0).contains(&s)) && (sum - 1.0).abs() < 1e-3
}

fn softmax(scores: &[f32]) -> Vec<f32> {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|&s| (s - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}
