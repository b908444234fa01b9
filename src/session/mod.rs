/// Builder and read-only accessors shared by both session types. Expects a
/// `core: SessionCore` field.
macro_rules! session_accessors {
    () => {
        /// Replaces the default namer, e.g. with one carrying a file prefix.
        pub fn with_namer(mut self, namer: crate::naming::ArtifactNamer) -> Self {
            self.core.set_namer(namer);
            self
        }

        pub fn state(&self) -> crate::lifecycle::LifecycleState {
            self.core.state()
        }

        pub fn is_bound(&self) -> bool {
            self.core.is_bound()
        }

        /// Requests issued whose outcome has not been delivered yet.
        pub fn pending_requests(&self) -> usize {
            self.core.pending_requests()
        }

        pub fn config(&self) -> &crate::config::CaptureSessionConfig {
            self.core.config()
        }

        pub fn base_dir(&self) -> &std::path::Path {
            self.core.base_dir()
        }

        pub fn session_id(&self) -> uuid::Uuid {
            self.core.id()
        }
    };
}

pub mod still;
pub mod video;

pub use still::StillCaptureSession;
pub use video::{RecordingState, VideoCaptureSession};

use crate::backend::{BindingRequest, CameraBackend, CameraBinding};
use crate::config::CaptureSessionConfig;
use crate::dispatch::{CaptureCompletion, CompletionEvent, CompletionQueue};
use crate::errors::CameraError;
use crate::lifecycle::{LifecycleController, LifecycleState};
use crate::listener::{ArtifactKind, CaptureResultListener, CapturedArtifact};
use crate::naming::ArtifactNamer;
use crate::permissions::{DeviceAccessGuard, PermissionSource};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub(crate) enum Prepared {
    Ready(PathBuf, CaptureCompletion),
    /// Already failed; the error is waiting in the queue.
    Failed(u64),
}

/// State shared by still and video sessions: the binding, the lifecycle,
/// outstanding requests and the listener.
pub(crate) struct SessionCore {
    id: Uuid,
    config: CaptureSessionConfig,
    base_dir: PathBuf,
    namer: ArtifactNamer,
    backend: Arc<dyn CameraBackend>,
    binding: Arc<CameraBinding>,
    lifecycle: LifecycleController,
    completions: CompletionQueue,
    pending: HashMap<u64, ArtifactKind>,
    listener: Box<dyn CaptureResultListener>,
}

impl SessionCore {
    pub(crate) fn open(
        kind: ArtifactKind,
        backend: Arc<dyn CameraBackend>,
        permissions: &dyn PermissionSource,
        config: CaptureSessionConfig,
        base_dir: PathBuf,
        listener: Box<dyn CaptureResultListener>,
    ) -> Result<Self, CameraError> {
        let required = match kind {
            ArtifactKind::Image => crate::permissions::STILL_CAPABILITIES,
            ArtifactKind::Video => crate::permissions::VIDEO_CAPABILITIES,
        };
        let guard = DeviceAccessGuard::new(permissions);
        if !guard.check_access(required) {
            let missing = guard.missing(required);
            log::error!("Refusing to open {} session, missing access: {:?}", kind, missing);
            return Err(CameraError::PermissionDenied { missing });
        }

        config.validate()?;

        let request = match kind {
            ArtifactKind::Image => BindingRequest::still(&config),
            ArtifactKind::Video => BindingRequest::video(&config),
        };
        let binding = Arc::new(CameraBinding::bind(backend.clone(), &request)?);

        let mut lifecycle = LifecycleController::new();
        lifecycle.observe(binding.clone());

        let id = Uuid::new_v4();
        log::info!(
            "Opened {} session {} on {} writing to {}",
            kind,
            id,
            backend.device_key(),
            base_dir.display()
        );

        Ok(Self {
            id,
            config,
            base_dir,
            namer: ArtifactNamer::new(),
            backend,
            binding,
            lifecycle,
            completions: CompletionQueue::new(),
            pending: HashMap::new(),
            listener,
        })
    }

    pub(crate) fn id(&self) -> Uuid {
        self.id
    }

    pub(crate) fn config(&self) -> &CaptureSessionConfig {
        &self.config
    }

    pub(crate) fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub(crate) fn backend(&self) -> &dyn CameraBackend {
        self.backend.as_ref()
    }

    pub(crate) fn set_namer(&mut self, namer: ArtifactNamer) {
        self.namer = namer;
    }

    pub(crate) fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    pub(crate) fn is_bound(&self) -> bool {
        self.binding.is_claimed()
    }

    pub(crate) fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn start(&mut self) -> Result<LifecycleState, CameraError> {
        self.lifecycle.start()
    }

    pub(crate) fn stop(&mut self) -> Result<LifecycleState, CameraError> {
        self.lifecycle.stop()
    }

    pub(crate) fn ensure_capturable(&self) -> Result<(), CameraError> {
        match self.lifecycle.state() {
            LifecycleState::Started => Ok(()),
            LifecycleState::Destroyed => Err(CameraError::SessionDestroyed),
            LifecycleState::Created | LifecycleState::Stopped => Err(CameraError::NotStarted),
        }
    }

    /// Registers a request and picks its output path. When no path can be
    /// produced the request is failed through the queue right away.
    pub(crate) fn prepare_request(&mut self, kind: ArtifactKind) -> Prepared {
        let completion = self.completions.completion();
        let request_id = completion.request_id();
        self.pending.insert(request_id, kind);

        match self.namer.next_path(&self.base_dir, kind) {
            Ok(path) => {
                log::debug!(
                    "Request {} ({}) -> {}",
                    completion.request_id(),
                    kind,
                    path.display()
                );
                Prepared::Ready(path, completion)
            }
            Err(e) => {
                completion.fail(e);
                Prepared::Failed(request_id)
            }
        }
    }

    /// Delivers queued outcomes on the owner thread. With `wait`, blocks up
    /// to that long for the first one and returns 0 if none arrives.
    /// `inspect` sees each event before the listener does.
    pub(crate) fn dispatch(
        &mut self,
        wait: Option<Duration>,
        mut inspect: impl FnMut(&dyn CameraBackend, &CompletionEvent),
    ) -> usize {
        let mut next = match wait {
            Some(timeout) => self.completions.next_timeout(timeout),
            None => self.completions.try_next(),
        };
        let mut delivered = 0;
        while let Some(event) = next {
            inspect(self.backend.as_ref(), &event);
            if self.deliver(event) {
                delivered += 1;
            }
            next = self.completions.try_next();
        }
        delivered
    }

    /// Hands an outcome to the listener. Returns false for requests that were
    /// already delivered or never issued.
    pub(crate) fn deliver(&mut self, event: CompletionEvent) -> bool {
        let Some(kind) = self.pending.remove(&event.request_id) else {
            log::warn!(
                "Session {} dropping outcome for unknown or finished request {}",
                self.id,
                event.request_id
            );
            return false;
        };

        match event.outcome {
            Ok(path) => {
                log::info!("Request {} produced {}", event.request_id, path.display());
                self.listener.on_artifact_ready(CapturedArtifact {
                    path,
                    kind,
                    request_id: event.request_id,
                    completed_at: chrono::Utc::now(),
                });
            }
            Err(e) => {
                log::warn!("Request {} failed: {}", event.request_id, e);
                self.listener.on_capture_error(e);
            }
        }
        true
    }

    /// Releases the binding, delivers outcomes that already arrived and
    /// cancels whatever is still outstanding. Safe to call repeatedly.
    pub(crate) fn tear_down(&mut self) -> Result<(), CameraError> {
        if self.lifecycle.state() == LifecycleState::Destroyed {
            return Ok(());
        }

        let result = self.lifecycle.tear_down().map(|_| ());

        self.dispatch(None, |_, _| {});

        let mut outstanding: Vec<u64> = self.pending.keys().copied().collect();
        outstanding.sort_unstable();
        for request_id in outstanding {
            self.deliver(CompletionEvent {
                request_id,
                outcome: Err(CameraError::Cancelled(
                    "session destroyed before the camera reported".to_string(),
                )),
            });
        }

        log::info!("Session {} destroyed", self.id);
        result
    }
}
