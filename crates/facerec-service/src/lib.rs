//! facerec-service — The face matching and registration workflow.
//!
//! Combines an embedding provider and a record store: annotates live frames,
//! registers new faces and renames or deletes records behind the admin
//! password. Every user-facing result is an [`Outcome`].

pub mod outcome;
pub mod service;
pub mod session;

pub use outcome::{Outcome, Toast};
pub use service::{prediction_label, FaceService, ServiceError, ServiceSettings};
pub use session::SessionState;
