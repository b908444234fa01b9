//! Result delivery contract between a session and its caller.

use crate::errors::CameraError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Image,
    Video,
}

impl ArtifactKind {
    pub fn extension(self) -> &'static str {
        match self {
            ArtifactKind::Image => "jpg",
            ArtifactKind::Video => "mp4",
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtifactKind::Image => write!(f, "image"),
            ArtifactKind::Video => write!(f, "video"),
        }
    }
}

/// A finished output file. Owned by the caller once delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedArtifact {
    pub path: PathBuf,
    pub kind: ArtifactKind,
    pub request_id: u64,
    pub completed_at: DateTime<Utc>,
}

/// Receives the outcome of every capture request, on the session owner's
/// thread. Exactly one of the two methods fires per request.
pub trait CaptureResultListener: Send {
    fn on_artifact_ready(&mut self, artifact: CapturedArtifact);

    fn on_capture_error(&mut self, error: CameraError);
}

impl<F, G> CaptureResultListener for (F, G)
where
    F: FnMut(CapturedArtifact) + Send,
    G: FnMut(CameraError) + Send,
{
    fn on_artifact_ready(&mut self, artifact: CapturedArtifact) {
        (self.0)(artifact)
    }

    fn on_capture_error(&mut self, error: CameraError) {
        (self.1)(error)
    }
}
