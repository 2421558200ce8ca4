//! Embedding provider: frame in, detected faces with embeddings out.

use crate::detector::{DetectorError, FaceDetector};
use crate::models::{ExecutionProvider, ModelPack};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::DetectedFace;
use image::RgbImage;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Converts an image into the faces it contains.
///
/// Implementations never fail: a missing frame or an internal model error
/// yields an empty list so one bad frame cannot stop a live stream.
pub trait FaceAnalyzer {
    fn compute_embeddings(&mut self, image: Option<&RgbImage>) -> Vec<DetectedFace>;
}

/// SCRFD + ArcFace running on ONNX Runtime.
pub struct OnnxFaceAnalyzer {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxFaceAnalyzer {
    /// Load both models of `pack` from `model_dir`. Fails fast if either is missing.
    pub fn load(
        pack: ModelPack,
        model_dir: &Path,
        provider: ExecutionProvider,
    ) -> Result<Self, AnalyzerError> {
        tracing::info!(pack = %pack, dir = %model_dir.display(), "initializing face analysis models");
        let detector = FaceDetector::load(&pack.detector_path(model_dir), provider)?;
        let recognizer = FaceRecognizer::load(&pack.recognizer_path(model_dir), provider)?;
        tracing::info!(pack = %pack, "face analysis models ready");
        Ok(Self { detector, recognizer })
    }

    /// Detect and embed every face, best detection first.
    pub fn analyze(&mut self, image: &RgbImage) -> Result<Vec<DetectedFace>, AnalyzerError> {
        let boxes = self.detector.detect(image)?;
        let mut faces = Vec::with_capacity(boxes.len());

        for bbox in &boxes {
            if bbox.landmarks.is_none() {
                tracing::debug!(confidence = bbox.confidence, "skipping face without landmarks");
                continue;
            }
            let embedding = self.recognizer.extract(image, bbox)?;
            faces.push(DetectedFace {
                bbox: bbox.to_pixel_box(),
                confidence: bbox.confidence,
                embedding,
            });
        }

        Ok(faces)
    }
}

impl FaceAnalyzer for OnnxFaceAnalyzer {
    fn compute_embeddings(&mut self, image: Option<&RgbImage>) -> Vec<DetectedFace> {
        let Some(image) = image else {
            return Vec::new();
        };
        degrade_to_empty(self.analyze(image))
    }
}

/// Log and swallow an analysis failure.
pub fn degrade_to_empty(result: Result<Vec<DetectedFace>, AnalyzerError>) -> Vec<DetectedFace> {
    result.unwrap_or_else(|err| {
        tracing::warn!(error = %err, "error computing embeddings; treating frame as faceless");
        Vec::new()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Embedding, PixelBox};

    #[test]
    fn test_degrade_to_empty_swallows_errors() {
        let err = AnalyzerError::Detector(DetectorError::EmptyFrame);
        assert!(degrade_to_empty(Err(err)).is_empty());
    }

    #[test]
    fn test_degrade_to_empty_passes_faces_through() {
        let face = DetectedFace {
            bbox: PixelBox { x1: 0, y1: 0, x2: 10, y2: 10 },
            confidence: 0.9,
            embedding: Embedding::new(vec![1.0]),
        };
        assert_eq!(degrade_to_empty(Ok(vec![face])).len(), 1);
    }

    #[test]
    fn test_load_missing_models_fails_fast() {
        let result = OnnxFaceAnalyzer::load(
            ModelPack::BuffaloL,
            Path::new("/nonexistent/facerec/models"),
            ExecutionProvider::Cpu,
        );
        assert!(matches!(
            result,
            Err(AnalyzerError::Detector(DetectorError::ModelNotFound(_)))
        ));
    }
}
