//! facerec-core — Face detection, embedding and frame annotation.
//!
//! Uses SCRFD for face detection and ArcFace for face embeddings, both
//! running via ONNX Runtime.

pub mod alignment;
pub mod analyzer;
pub mod annotate;
pub mod detector;
pub mod models;
pub mod recognizer;
pub mod types;

pub use analyzer::{FaceAnalyzer, OnnxFaceAnalyzer};
pub use annotate::Annotator;
pub use models::{default_model_dir, ExecutionProvider, ModelPack};
pub use types::{BoundingBox, DetectedFace, Embedding, PixelBox};
