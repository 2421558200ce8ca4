//! Face matching, registration and record management.

use crate::outcome::Outcome;
use facerec_core::annotate::{
    IGNORED_COLOR, MATCH_COLOR, NEAR_MATCH_COLOR, REGISTER_COLOR, UNKNOWN_COLOR,
};
use facerec_core::{Annotator, FaceAnalyzer};
use facerec_store::{FaceStore, SearchHit, StoreError};
use image::{Rgb, RgbImage};
use thiserror::Error;

const PREDICT_BOX_THICKNESS: u32 = 2;
const PREVIEW_BOX_THICKNESS: u32 = 3;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Shared secret gating rename and delete.
    pub admin_password: String,
    /// Score at or above which a search result counts as the same person.
    pub similarity_threshold: f32,
}

/// Label and colour for a recognised (or not) face.
pub fn prediction_label(hit: &SearchHit, threshold: f32) -> (String, Rgb<u8>) {
    if hit.is_match {
        (format!("{} ({:.2})", hit.name, hit.score), MATCH_COLOR)
    } else if !hit.name.is_empty() && hit.score > threshold {
        // Unreachable while is_match means score >= threshold; kept as-is.
        (format!("Unknown (~{} {:.2})", hit.name, hit.score), NEAR_MATCH_COLOR)
    } else {
        ("Unknown".to_string(), UNKNOWN_COLOR)
    }
}

/// The registration workflow, wired to one analyzer and one store.
pub struct FaceService<A, S> {
    analyzer: A,
    store: S,
    annotator: Annotator,
    settings: ServiceSettings,
}

impl<A: FaceAnalyzer, S: FaceStore> FaceService<A, S> {
    pub fn new(analyzer: A, store: S, annotator: Annotator, settings: ServiceSettings) -> Self {
        Self {
            analyzer,
            store,
            annotator,
            settings,
        }
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    /// Annotate every face in `frame` with who it is. The input is not modified.
    pub fn predict_frame(&mut self, frame: &RgbImage) -> Result<RgbImage, ServiceError> {
        let mut out = frame.clone();
        let faces = self.analyzer.compute_embeddings(Some(frame));

        for face in &faces {
            let hit = self.store.search(&face.embedding)?;
            let (label, color) = prediction_label(&hit, self.settings.similarity_threshold);
            self.annotator
                .draw_face(&mut out, face.bbox, &label, color, PREDICT_BOX_THICKNESS);
        }

        Ok(out)
    }

    /// Highlight the face a registration would use; mark the rest as ignored.
    pub fn preview_frame(&mut self, frame: &RgbImage) -> RgbImage {
        let mut out = frame.clone();
        let faces = self.analyzer.compute_embeddings(Some(frame));

        let mut faces = faces.iter();
        if let Some(first) = faces.next() {
            self.annotator
                .draw_face(&mut out, first.bbox, "Face to Register", REGISTER_COLOR, PREVIEW_BOX_THICKNESS);
        }
        for other in faces {
            self.annotator
                .draw_face(&mut out, other.bbox, "Ignored", IGNORED_COLOR, PREVIEW_BOX_THICKNESS);
        }

        out
    }

    /// Register the first face of `snapshot` under `name`.
    pub fn register(&mut self, name: &str, snapshot: Option<&RgbImage>) -> Result<Outcome, ServiceError> {
        let Some(snapshot) = snapshot else {
            return Ok(Outcome::error("No image captured. Please ensure camera is active."));
        };

        let name = name.trim();
        if name.is_empty() {
            return Ok(Outcome::error("Name cannot be empty."));
        }

        if self.store.is_name_taken(name)? {
            return Ok(Outcome::error(format!("Name \"{name}\" is already registered.")));
        }

        let faces = self.analyzer.compute_embeddings(Some(snapshot));
        let Some(face) = faces.first() else {
            return Ok(Outcome::error("No face detected in the snapshot."));
        };

        let existing = self.store.search(&face.embedding)?;
        if existing.is_match {
            tracing::info!(name, existing = %existing.name, score = existing.score, "registration refused: face already known");
            return Ok(Outcome::error(format!(
                "This face seems already registered as \"{}\" (Similarity: {:.2}). Cannot re-register.",
                existing.name, existing.score
            )));
        }

        self.store.insert(name, &face.embedding)?;
        let total = self.store.count()?;
        tracing::info!(name, total, "registered face");

        Ok(Outcome::success(format!(
            "User \"{name}\" registered! Total registered faces: {total}."
        )))
    }

    /// Rename a record after checking the admin password.
    ///
    /// Renaming a name to itself is reported as an `Info` no-op before the
    /// new name is checked for collisions, so it never reads as "already exists".
    pub fn rename(&self, old_name: &str, new_name: &str, password: &str) -> Result<Outcome, ServiceError> {
        if old_name.is_empty() {
            return Ok(Outcome::error("Please select a name to rename."));
        }

        let new_name = new_name.trim();
        if new_name.is_empty() {
            return Ok(Outcome::error("New name cannot be empty."));
        }

        if !self.store.is_name_taken(old_name)? {
            return Ok(Outcome::error(format!("\"{old_name}\" not found (might have been deleted).")));
        }

        if old_name == new_name {
            return Ok(Outcome::info("New name is the same as the old name. No changes made."));
        }

        if self.store.is_name_taken(new_name)? {
            return Ok(Outcome::error(format!("Name \"{new_name}\" already exists.")));
        }

        if password != self.settings.admin_password {
            tracing::warn!(old_name, "rename refused: incorrect password");
            return Ok(Outcome::error("Incorrect password."));
        }

        if self.store.update_name(old_name, new_name)? {
            tracing::info!(old_name, new_name, "renamed face");
            Ok(Outcome::success(format!("Renamed \"{old_name}\" to \"{new_name}\".")))
        } else {
            Ok(Outcome::error(format!("Failed to rename \"{old_name}\" to \"{new_name}\".")))
        }
    }

    /// Delete a record after checking the admin password.
    pub fn delete(&self, name: &str, password: &str) -> Result<Outcome, ServiceError> {
        if name.is_empty() {
            return Ok(Outcome::error("Please select a name to delete."));
        }

        if !self.store.is_name_taken(name)? {
            return Ok(Outcome::error(format!("\"{name}\" not found (might have been deleted).")));
        }

        if password != self.settings.admin_password {
            tracing::warn!(name, "delete refused: incorrect password");
            return Ok(Outcome::error("Incorrect password."));
        }

        if self.store.delete(name)? {
            tracing::info!(name, "deleted face");
            Ok(Outcome::success(format!("Deleted \"{name}\".")))
        } else {
            Ok(Outcome::error(format!("Failed to delete \"{name}\".")))
        }
    }

    pub fn list_names(&self) -> Result<Vec<String>, ServiceError> {
        Ok(self.store.list_names()?)
    }

    pub fn count(&self) -> Result<u64, ServiceError> {
        Ok(self.store.count()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facerec_core::{DetectedFace, Embedding, PixelBox};
    use facerec_store::{SqliteFaceStore, StoreSettings};

    const PASSWORD: &str = "hunter2";

    /// Returns the same faces for every frame it is given.
    struct StubAnalyzer {
        faces: Vec<DetectedFace>,
    }

    impl FaceAnalyzer for StubAnalyzer {
        fn compute_embeddings(&mut self, image: Option<&RgbImage>) -> Vec<DetectedFace> {
            match image {
                Some(_) => self.faces.clone(),
                None => Vec::new(),
            }
        }
    }

    fn face(x: i32, values: &[f32]) -> DetectedFace {
        DetectedFace {
            bbox: PixelBox { x1: x, y1: 60, x2: x + 40, y2: 100 },
            confidence: 0.9,
            embedding: Embedding::new(values.to_vec()),
        }
    }

    fn service(faces: Vec<DetectedFace>) -> FaceService<StubAnalyzer, SqliteFaceStore> {
        let store = SqliteFaceStore::open(StoreSettings::new(
            ":memory:",
            "facerec",
            "faces",
            "vector_index",
            "embedding",
        ))
        .unwrap();
        FaceService::new(
            StubAnalyzer { faces },
            store,
            Annotator::default(),
            ServiceSettings {
                admin_password: PASSWORD.to_string(),
                similarity_threshold: 0.75,
            },
        )
    }

    fn frame() -> RgbImage {
        RgbImage::from_pixel(160, 120, Rgb([0, 0, 0]))
    }

    fn set_faces(svc: &mut FaceService<StubAnalyzer, SqliteFaceStore>, faces: Vec<DetectedFace>) {
        svc.analyzer.faces = faces;
    }

    #[test]
    fn test_register_without_snapshot() {
        let mut svc = service(vec![face(10, &[1.0, 0.0])]);
        let outcome = svc.register("Alice", None).unwrap();
        assert_eq!(outcome.message, "Error: No image captured. Please ensure camera is active.");
        assert!(!outcome.success);
    }

    #[test]
    fn test_register_blank_name_fails_regardless_of_snapshot() {
        for faces in [vec![], vec![face(10, &[1.0, 0.0])]] {
            let mut svc = service(faces);
            for name in ["", "   ", "\t\n"] {
                let outcome = svc.register(name, Some(&frame())).unwrap();
                assert_eq!(outcome.message, "Error: Name cannot be empty.");
            }
        }
    }

    #[test]
    fn test_register_no_face() {
        let mut svc = service(vec![]);
        let outcome = svc.register("Alice", Some(&frame())).unwrap();
        assert_eq!(outcome.message, "Error: No face detected in the snapshot.");
        assert_eq!(svc.count().unwrap(), 0);
    }

    #[test]
    fn test_register_alice() {
        let mut svc = service(vec![face(10, &[1.0, 0.0, 0.0])]);
        let outcome = svc.register("  Alice ", Some(&frame())).unwrap();

        assert!(outcome.success);
        assert_eq!(
            outcome.message,
            "Success: User \"Alice\" registered! Total registered faces: 1."
        );
        assert_eq!(svc.list_names().unwrap(), vec!["Alice"]);
        assert_eq!(svc.count().unwrap(), 1);
    }

    #[test]
    fn test_register_taken_name() {
        let mut svc = service(vec![face(10, &[1.0, 0.0])]);
        svc.register("Alice", Some(&frame())).unwrap();

        set_faces(&mut svc, vec![face(10, &[0.0, 1.0])]);
        let outcome = svc.register("Alice", Some(&frame())).unwrap();
        assert_eq!(outcome.message, "Error: Name \"Alice\" is already registered.");
        assert_eq!(svc.count().unwrap(), 1);
    }

    #[test]
    fn test_register_same_face_under_new_name() {
        let mut svc = service(vec![face(10, &[0.6, 0.8])]);
        assert!(svc.register("Alice", Some(&frame())).unwrap().success);

        let outcome = svc.register("Bob", Some(&frame())).unwrap();
        assert!(!outcome.success);
        assert!(outcome.message.starts_with("Error:"));
        assert_eq!(
            outcome.message,
            "Error: This face seems already registered as \"Alice\" (Similarity: 1.00). Cannot re-register."
        );
        assert_eq!(svc.list_names().unwrap(), vec!["Alice"]);
    }

    #[test]
    fn test_register_uses_first_face_only() {
        let mut svc = service(vec![face(10, &[1.0, 0.0]), face(80, &[0.0, 1.0])]);
        assert!(svc.register("Alice", Some(&frame())).unwrap().success);

        // Second face of the first snapshot was never stored.
        set_faces(&mut svc, vec![face(80, &[0.0, 1.0])]);
        assert!(svc.register("Bob", Some(&frame())).unwrap().success);
        assert_eq!(svc.count().unwrap(), 2);
    }

    #[test]
    fn test_rename_checks_in_order() {
        let mut svc = service(vec![face(10, &[1.0, 0.0])]);
        svc.register("Alice", Some(&frame())).unwrap();
        set_faces(&mut svc, vec![face(10, &[0.0, 1.0])]);
        svc.register("Bob", Some(&frame())).unwrap();

        let msg = |o: Outcome| o.message;
        assert_eq!(msg(svc.rename("", "X", PASSWORD).unwrap()), "Error: Please select a name to rename.");
        assert_eq!(msg(svc.rename("Alice", "  ", PASSWORD).unwrap()), "Error: New name cannot be empty.");
        assert_eq!(
            msg(svc.rename("Zed", "X", PASSWORD).unwrap()),
            "Error: \"Zed\" not found (might have been deleted)."
        );
        assert_eq!(msg(svc.rename("Alice", "Bob", PASSWORD).unwrap()), "Error: Name \"Bob\" already exists.");
        assert_eq!(msg(svc.rename("Alice", "Carol", "wrong").unwrap()), "Error: Incorrect password.");

        let outcome = svc.rename("Alice", " Carol ", PASSWORD).unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.message, "Success: Renamed \"Alice\" to \"Carol\".");
        assert_eq!(svc.list_names().unwrap(), vec!["Bob", "Carol"]);
    }

    #[test]
    fn test_rename_to_same_name_is_info() {
        let mut svc = service(vec![face(10, &[1.0, 0.0])]);
        svc.register("Alice", Some(&frame())).unwrap();

        let outcome = svc.rename("Alice", "Alice", PASSWORD).unwrap();
        assert!(!outcome.success);
        assert!(outcome.message.starts_with("Info:"));
        assert_eq!(svc.list_names().unwrap(), vec!["Alice"]);
        assert_eq!(svc.count().unwrap(), 1);
    }

    #[test]
    fn test_wrong_password_always_fails() {
        let mut svc = service(vec![face(10, &[1.0, 0.0])]);
        svc.register("Alice", Some(&frame())).unwrap();

        for password in ["", "HUNTER2", "hunter2 "] {
            assert_eq!(svc.rename("Alice", "Carol", password).unwrap().message, "Error: Incorrect password.");
            assert_eq!(svc.delete("Alice", password).unwrap().message, "Error: Incorrect password.");
        }
        assert_eq!(svc.list_names().unwrap(), vec!["Alice"]);
    }

    #[test]
    fn test_delete_checks_in_order() {
        let mut svc = service(vec![face(10, &[1.0, 0.0])]);
        svc.register("Alice", Some(&frame())).unwrap();

        assert_eq!(svc.delete("", PASSWORD).unwrap().message, "Error: Please select a name to delete.");
        assert_eq!(
            svc.delete("Bob", PASSWORD).unwrap().message,
            "Error: \"Bob\" not found (might have been deleted)."
        );

        let outcome = svc.delete("Alice", PASSWORD).unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.message, "Success: Deleted \"Alice\".");
        assert_eq!(svc.count().unwrap(), 0);
    }

    #[test]
    fn test_prediction_label_branches() {
        let matched = SearchHit { name: "Alice".into(), score: 0.912, is_match: true };
        assert_eq!(prediction_label(&matched, 0.75), ("Alice (0.91)".to_string(), MATCH_COLOR));

        let near = SearchHit { name: "Alice".into(), score: 0.8, is_match: false };
        assert_eq!(prediction_label(&near, 0.75), ("Unknown (~Alice 0.80)".to_string(), NEAR_MATCH_COLOR));

        let far = SearchHit { name: "Alice".into(), score: 0.6, is_match: false };
        assert_eq!(prediction_label(&far, 0.75), ("Unknown".to_string(), UNKNOWN_COLOR));

        assert_eq!(prediction_label(&SearchHit::none(), 0.75).0, "Unknown");
    }

    #[test]
    fn test_predict_frame_leaves_input_untouched() {
        let mut svc = service(vec![face(40, &[1.0, 0.0])]);
        svc.register("Alice", Some(&frame())).unwrap();

        let input = frame();
        let out = svc.predict_frame(&input).unwrap();
        assert!(input.pixels().all(|p| *p == Rgb([0, 0, 0])));
        assert_eq!(*out.get_pixel(40, 80), MATCH_COLOR);
    }

    #[test]
    fn test_predict_frame_unknown_face() {
        let mut svc = service(vec![face(40, &[1.0, 0.0])]);
        let out = svc.predict_frame(&frame()).unwrap();
        assert_eq!(*out.get_pixel(40, 80), UNKNOWN_COLOR);
    }

    #[test]
    fn test_preview_marks_first_and_ignores_rest() {
        let mut svc = service(vec![face(10, &[1.0, 0.0]), face(100, &[0.0, 1.0])]);
        let out = svc.preview_frame(&frame());
        assert_eq!(*out.get_pixel(10, 80), REGISTER_COLOR);
        assert_eq!(*out.get_pixel(100, 80), IGNORED_COLOR);
        assert_eq!(svc.count().unwrap(), 0);
    }

    #[test]
    fn test_preview_without_faces_is_copy() {
        let mut svc = service(vec![]);
        let input = frame();
        assert_eq!(svc.preview_frame(&input), input);
    }
}
