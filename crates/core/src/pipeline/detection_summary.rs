use crate::classification::domain::age_label::AgeBucket;
use crate::shared::constants::NO_FACES_MESSAGE;

/// Per-run aggregate of located faces and their age buckets.
///
/// Owned by exactly one caller and mutated only from the thread that
/// folds classification outcomes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DetectionSummary {
    pub faces: usize,
    pub children: usize,
    pub adults: usize,
    pub message: String,
}

impl DetectionSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zeroes all counters and clears the message.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn set_no_faces(&mut self) {
        self.reset();
        self.message = NO_FACES_MESSAGE.to_string();
    }

    pub fn set_faces(&mut self, faces: usize) {
        self.reset();
        self.faces = faces;
        self.message = format!("Number of faces: {faces}");
    }

    /// Counts one classified face and re-renders the message.
    pub fn record(&mut self, bucket: AgeBucket) {
        match bucket {
            AgeBucket::Child => self.children += 1,
            AgeBucket::Adult => self.adults += 1,
        }
        self.message = self.render();
    }

    pub fn classified(&self) -> usize {
        self.children + self.adults
    }

    pub fn render(&self) -> String {
        format!(
            "Number of people: {}\nNumber of children: {}\nNumber of adults: {}",
            self.faces, self.children, self.adults
        )
    }
}
