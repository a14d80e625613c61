pub const FACE_MODEL_NAME: &str = "blazeface_short_range.onnx";
pub const AGE_MODEL_NAME: &str = "age_net.onnx";

/// Lower age bound below which a face counts as a child.
pub const CHILD_AGE_THRESHOLD: u32 = 20;

/// Label set of the age model, in output-index order.
pub const AGE_LABELS: &[&str] = &[
    "0-2", "4-6", "8-12", "15-20", "25-32", "38-43", "48-53", "60-100",
];

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];

pub const NO_FACES_MESSAGE: &str = "No faces detected.";
pub const NO_PHOTO_MESSAGE: &str = "Choose a correct image.";
pub const MODEL_LOAD_MESSAGE: &str = "Model couldn't be loaded";
