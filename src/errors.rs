use std::path::PathBuf;

use crate::permissions::Capability;

/// Errors produced by capture sessions and camera backends.
///
/// Payloads are plain strings so the error is `Clone + Send` and can travel
/// from a hardware callback thread to the session owner.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CameraError {
    #[error("Permission denied: missing {}", format_capabilities(.missing))]
    PermissionDenied { missing: Vec<Capability> },
    #[error("Camera already bound: {0}")]
    AlreadyBound(String),
    #[error("Camera binding error: {0}")]
    Binding(String),
    #[error("Session is destroyed")]
    SessionDestroyed,
    #[error("Session is not started")]
    NotStarted,
    #[error("Capture error: {0}")]
    Capture(String),
    #[error("Capture cancelled: {0}")]
    Cancelled(String),
    #[error("Capture abandoned by camera backend")]
    Abandoned,
    #[error("Output path already exists: {}", .0.display())]
    NamingCollision(PathBuf),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl CameraError {
    /// Capture and cancellation errors are per-request; the session survives them.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CameraError::Capture(_)
                | CameraError::Cancelled(_)
                | CameraError::Abandoned
                | CameraError::NamingCollision(_)
                | CameraError::Io(_)
                | CameraError::Unsupported(_)
        )
    }
}

impl From<std::io::Error> for CameraError {
    fn from(error: std::io::Error) -> Self {
        CameraError::Io(error.to_string())
    }
}

fn format_capabilities(missing: &[Capability]) -> String {
    missing
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
