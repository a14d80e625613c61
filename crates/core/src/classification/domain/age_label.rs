use std::fmt;

use crate::shared::constants::CHILD_AGE_THRESHOLD;

/// One ranked classifier output, e.g. `"25-32"` with confidence 0.71.
#[derive(Clone, Debug, PartialEq)]
pub struct AgeLabel {
    pub identifier: String,
    pub confidence: f32,
}

impl AgeLabel {
    pub fn new(identifier: impl Into<String>, confidence: f32) -> Self {
        Self {
            identifier: identifier.into(),
            confidence,
        }
    }

    /// Lower bound of the `"lo-hi"` range, or `None` if the prefix before
    /// the first `-` is not an integer.
    pub fn lower_bound(&self) -> Option<u32> {
        let prefix = self.identifier.split('-').next()?;
        prefix.parse().ok()
    }

    pub fn bucket(&self) -> Option<AgeBucket> {
        self.lower_bound().map(AgeBucket::from_lower_bound)
    }
}

/// Binary age bucket derived from a label's lower bound.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AgeBucket {
    Child,
    Adult,
}

impl AgeBucket {
    pub fn from_lower_bound(lower: u32) -> Self {
        if lower < CHILD_AGE_THRESHOLD {
            AgeBucket::Child
        } else {
            AgeBucket::Adult
        }
    }
}

impl fmt::Display for AgeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgeBucket::Child => write!(f, "child"),
            AgeBucket::Adult => write!(f, "adult"),
        }
    }
}

/// Sorts labels by descending confidence. NaN confidences sink to the end.
pub fn rank(labels: &mut [AgeLabel]) {
    labels.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or_else(|| a.confidence.is_nan().cmp(&b.confidence.is_nan()))
    });
}
