pub mod onnx_age_classifier;
