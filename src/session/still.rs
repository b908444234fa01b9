use super::{Prepared, SessionCore};
use crate::backend::CameraBackend;
use crate::config::{CaptureFrequency, CaptureSessionConfig};
use crate::errors::CameraError;
use crate::lifecycle::LifecycleState;
use crate::listener::{ArtifactKind, CaptureResultListener};
use crate::permissions::PermissionSource;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Takes still images through a hidden preview plus an image-capture use case.
///
/// With [`CaptureFrequency::Recurring`] the session also captures on its own
/// while started. Scheduled captures are issued from
/// [`dispatch_pending`](Self::dispatch_pending) and
/// [`wait_for_completion`](Self::wait_for_completion), at most one per call,
/// so a caller that falls behind gets one late still rather than a burst.
pub struct StillCaptureSession {
    core: SessionCore,
    next_due: Option<Instant>,
}

impl StillCaptureSession {
    /// Checks access, claims the device and binds the use cases.
    ///
    /// Fails with [`CameraError::PermissionDenied`] before touching the
    /// backend when camera or storage access is missing.
    pub fn open(
        backend: Arc<dyn CameraBackend>,
        permissions: &dyn PermissionSource,
        config: CaptureSessionConfig,
        base_dir: impl Into<PathBuf>,
        listener: impl CaptureResultListener + 'static,
    ) -> Result<Self, CameraError> {
        let core = SessionCore::open(
            ArtifactKind::Image,
            backend,
            permissions,
            config,
            base_dir.into(),
            Box::new(listener),
        )?;
        Ok(Self {
            core,
            next_due: None,
        })
    }

    session_accessors!();

    /// Activates the camera. A recurring schedule starts with a capture due
    /// right away.
    pub fn start(&mut self) -> Result<LifecycleState, CameraError> {
        let state = self.core.start()?;
        let recurring = matches!(self.core.config().frequency, CaptureFrequency::Recurring(_));
        if recurring && state == LifecycleState::Started {
            self.next_due.get_or_insert_with(Instant::now);
        }
        Ok(state)
    }

    /// Deactivates the camera and suspends any recurring schedule.
    pub fn stop(&mut self) -> Result<LifecycleState, CameraError> {
        let state = self.core.stop()?;
        self.next_due = None;
        Ok(state)
    }

    /// Releases the camera. Outstanding captures end with a delivered
    /// outcome before this returns.
    pub fn destroy(&mut self) -> Result<(), CameraError> {
        self.next_due = None;
        self.core.tear_down()
    }

    /// Requests one still. The outcome reaches the listener from
    /// [`dispatch_pending`](Self::dispatch_pending); the returned id matches
    /// [`crate::CapturedArtifact::request_id`].
    pub fn capture_image(&mut self) -> Result<u64, CameraError> {
        self.core.ensure_capturable()?;

        match self.core.prepare_request(ArtifactKind::Image) {
            Prepared::Ready(path, completion) => {
                let request_id = completion.request_id();
                self.core.backend().take_picture(&path, completion);
                Ok(request_id)
            }
            Prepared::Failed(request_id) => Ok(request_id),
        }
    }

    /// When the next scheduled still is due. `None` for one-shot sessions
    /// and while not started.
    pub fn next_scheduled_capture(&self) -> Option<Instant> {
        self.next_due
    }

    fn run_schedule(&mut self) {
        let CaptureFrequency::Recurring(interval) = self.core.config().frequency else {
            return;
        };
        let now = Instant::now();
        match self.next_due {
            Some(due) if due <= now => self.next_due = Some(now + interval),
            _ => return,
        }
        match self.capture_image() {
            Ok(request_id) => log::debug!("Scheduled still {} issued", request_id),
            Err(e) => log::warn!("Scheduled still skipped: {}", e),
        }
    }

    /// Issues a due scheduled still, then delivers every outcome that has
    /// arrived. Never blocks.
    pub fn dispatch_pending(&mut self) -> usize {
        self.run_schedule();
        self.core.dispatch(None, |_, _| {})
    }

    /// Like [`dispatch_pending`](Self::dispatch_pending), but waits up to
    /// `timeout` for the first outcome.
    pub fn wait_for_completion(&mut self, timeout: Duration) -> usize {
        self.run_schedule();
        self.core.dispatch(Some(timeout), |_, _| {})
    }
}

impl Drop for StillCaptureSession {
    fn drop(&mut self) {
        if let Err(e) = self.destroy() {
            log::warn!("Error destroying still session in drop: {}", e);
        }
    }
}
