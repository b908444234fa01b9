use super::{Prepared, SessionCore};
use crate::backend::CameraBackend;
use crate::config::{CaptureSessionConfig, FlashPolicy};
use crate::errors::CameraError;
use crate::lifecycle::LifecycleState;
use crate::listener::{ArtifactKind, CaptureResultListener};
use crate::permissions::PermissionSource;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RecordingState {
    Idle,
    Recording,
}

/// Records video through a hidden preview plus a record-capable use case.
///
/// [`capture_video`](Self::capture_video) toggles between idle and
/// recording. The torch is lit exactly while a recording runs under
/// [`FlashPolicy::On`].
pub struct VideoCaptureSession {
    core: SessionCore,
    recording: RecordingState,
    active_request: Option<u64>,
    torch: bool,
}

impl VideoCaptureSession {
    /// Same contract as [`crate::StillCaptureSession::open`]; microphone
    /// access is required as well.
    pub fn open(
        backend: Arc<dyn CameraBackend>,
        permissions: &dyn PermissionSource,
        config: CaptureSessionConfig,
        base_dir: impl Into<PathBuf>,
        listener: impl CaptureResultListener + 'static,
    ) -> Result<Self, CameraError> {
        let core = SessionCore::open(
            ArtifactKind::Video,
            backend,
            permissions,
            config,
            base_dir.into(),
            Box::new(listener),
        )?;
        Ok(Self {
            core,
            recording: RecordingState::Idle,
            active_request: None,
            torch: false,
        })
    }

    session_accessors!();

    pub fn start(&mut self) -> Result<LifecycleState, CameraError> {
        self.core.start()
    }

    /// Ends any running recording before the camera is deactivated.
    pub fn stop(&mut self) -> Result<LifecycleState, CameraError> {
        if self.recording == RecordingState::Recording {
            self.finish_recording();
        }
        self.core.stop()
    }

    /// Ends any running recording, turns the torch off and releases the
    /// camera. The recording's outcome is delivered before this returns.
    pub fn destroy(&mut self) -> Result<(), CameraError> {
        if self.recording == RecordingState::Recording {
            self.finish_recording();
        }
        if self.torch {
            self.set_torch(false);
        }
        self.core.tear_down()
    }

    /// Starts a recording when idle, stops it when recording.
    ///
    /// Returns the state after the toggle. A recording that cannot start
    /// leaves the session idle; its error is delivered to the listener.
    pub fn capture_video(&mut self) -> Result<RecordingState, CameraError> {
        self.core.ensure_capturable()?;

        match self.recording {
            RecordingState::Idle => self.begin_recording(),
            RecordingState::Recording => self.finish_recording(),
        }
        Ok(self.recording)
    }

    fn begin_recording(&mut self) {
        let (path, completion) = match self.core.prepare_request(ArtifactKind::Video) {
            Prepared::Ready(path, completion) => (path, completion),
            Prepared::Failed(request_id) => {
                log::warn!("Recording {} could not start", request_id);
                return;
            }
        };

        let torch = self.core.config().flash == FlashPolicy::On;
        self.set_torch(torch);
        self.active_request = Some(completion.request_id());
        self.recording = RecordingState::Recording;
        log::info!("Recording {} started", completion.request_id());
        self.core.backend().start_recording(&path, completion);
    }

    fn finish_recording(&mut self) {
        self.set_torch(false);
        self.core.backend().stop_recording();
        if let Some(request_id) = self.active_request.take() {
            log::info!("Recording {} stop requested", request_id);
        }
        self.recording = RecordingState::Idle;
    }

    fn set_torch(&mut self, enabled: bool) {
        switch_torch(self.core.backend(), &mut self.torch, enabled);
    }

    fn dispatch(&mut self, wait: Option<Duration>) -> usize {
        let active_request = &mut self.active_request;
        let recording = &mut self.recording;
        let torch = &mut self.torch;
        self.core.dispatch(wait, |backend, event| {
            // The camera ended the active recording on its own.
            if *active_request == Some(event.request_id) {
                log::warn!("Recording {} ended by the camera", event.request_id);
                *active_request = None;
                *recording = RecordingState::Idle;
                switch_torch(backend, torch, false);
            }
        })
    }

    /// Delivers every outcome that has arrived. Never blocks.
    pub fn dispatch_pending(&mut self) -> usize {
        self.dispatch(None)
    }

    /// Waits up to `timeout` for one outcome, then drains the rest.
    pub fn wait_for_completion(&mut self, timeout: Duration) -> usize {
        self.dispatch(Some(timeout))
    }

    pub fn recording_state(&self) -> RecordingState {
        self.recording
    }

    pub fn is_torch_on(&self) -> bool {
        self.torch
    }

}

fn switch_torch(backend: &dyn CameraBackend, torch: &mut bool, enabled: bool) {
    if let Err(e) = backend.enable_torch(enabled) {
        log::warn!("Failed to set torch {}: {}", if enabled { "on" } else { "off" }, e);
    }
    *torch = enabled;
}

impl Drop for VideoCaptureSession {
    fn drop(&mut self) {
        if let Err(e) = self.destroy() {
            log::warn!("Error destroying video session in drop: {}", e);
        }
    }
}
