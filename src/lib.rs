//! quietcam: headless still and video capture sessions
//!
//! A session binds a hidden preview (used only so exposure and focus settle)
//! plus one capture use case against a camera backend, then takes stills or
//! toggles recordings without any visible surface. Every request ends in
//! exactly one listener call.
//!
//! # Features
//! - Explicit, caller-driven lifecycle (`start` / `stop` / `destroy`)
//! - Torch kept in lockstep with recording state
//! - Hardware completions marshaled onto the session owner's thread
//! - Single-binding claim per camera device
//! - One-shot or recurring stills
//! - `native`: webcam backend over `nokhwa` and the `quietcam-cli` binary
//!
//! # Usage
//! ```rust
//! use quietcam::testing::{CompletionMode, MockCamera, RecordingListener};
//! use quietcam::{CaptureSessionConfig, StaticPermissions, StillCaptureSession};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let listener = RecordingListener::new();
//! let mut session = StillCaptureSession::open(
//!     MockCamera::new(CompletionMode::Immediate),
//!     &StaticPermissions::all_granted(),
//!     CaptureSessionConfig::default(),
//!     dir.path(),
//!     listener.clone(),
//! )
//! .unwrap();
//!
//! session.start().unwrap();
//! session.capture_image().unwrap();
//! session.dispatch_pending();
//! assert_eq!(listener.artifacts().len(), 1);
//! session.destroy().unwrap();
//! ```
pub mod backend;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod lifecycle;
pub mod listener;
pub mod naming;
pub mod permissions;
pub mod session;
pub mod testing;

#[cfg(feature = "native")]
pub mod native;

pub use backend::{BindingRequest, CameraBackend, UseCase};
pub use config::{
    AspectRatio, CaptureFrequency, CaptureSessionConfig, FlashPolicy, Lens, QuietCamConfig,
    Rotation, TargetSize,
};
pub use dispatch::CaptureCompletion;
pub use errors::CameraError;
pub use lifecycle::{LifecycleController, LifecycleState};
pub use listener::{ArtifactKind, CaptureResultListener, CapturedArtifact};
pub use naming::ArtifactNamer;
pub use permissions::{
    Capability, DeviceAccessGuard, PermissionSource, PermissionStatus, StaticPermissions,
    SystemPermissions,
};
pub use session::{RecordingState, StillCaptureSession, VideoCaptureSession};

#[cfg(feature = "native")]
pub use native::NokhwaCamera;

/// Initialize logging for the capture system
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "quietcam=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
    }
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
}
