use thiserror::Error;

use crate::shared::constants::{MODEL_LOAD_MESSAGE, NO_PHOTO_MESSAGE};

/// User-facing (title, message) pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Alert {
    pub title: String,
    pub message: String,
}

impl Alert {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
        }
    }
}

/// Failures that are surfaced to the user.
///
/// Unparsable age labels are deliberately absent: they are dropped
/// without an alert.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("no photo available")]
    NoPhoto,
    #[error("face location failed: {0}")]
    Locator(String),
    #[error("age model could not be loaded: {0}")]
    ModelLoad(String),
    #[error("age classification failed: {0}")]
    Request(String),
}

impl PipelineError {
    pub fn alert(&self) -> Alert {
        match self {
            PipelineError::NoPhoto => Alert::new("Alert", NO_PHOTO_MESSAGE),
            PipelineError::Locator(desc) | PipelineError::Request(desc) => {
                Alert::new("Error", desc.clone())
            }
            PipelineError::ModelLoad(desc) => {
                Alert::new("Error", format!("{MODEL_LOAD_MESSAGE}: {desc}"))
            }
        }
    }
}
