//! Face location and child/adult age classification.
//!
//! Layout follows a ports-and-adapters split: each bounded context has a
//! `domain` module (types and traits) and an `infrastructure` module
//! (ONNX/file-backed implementations). The `pipeline` module orchestrates
//! them.

pub mod capture {
    pub mod domain {
        pub mod photo_reader;
    }
    pub mod infrastructure;
}

pub mod classification {
    pub mod domain {
        pub mod age_classifier;
        pub mod age_label;
    }
    pub mod infrastructure;
}

pub mod detection {
    pub mod domain {
        pub mod face_locator;
    }
    pub mod infrastructure;
}

pub mod pipeline {
    pub mod age_detection_session;
    pub mod classification_executor;
    pub mod detect_ages_use_case;
    pub mod detection_summary;
    pub mod infrastructure;
    pub mod pipeline_error;
    pub mod pipeline_event;
    pub mod pipeline_logger;
}

pub mod shared {
    pub mod constants;
    pub mod execution_provider;
    pub mod face;
    pub mod model_resolver;
    pub mod orientation;
    pub mod photo;
}

/// Error type crossing thread and trait boundaries.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
