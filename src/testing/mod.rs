//! Hardware-free backend and listener for tests and host integration work.
//!
//! [`MockCamera`] behaves like a device stack: it must be bound and
//! activated before captures succeed, writes small placeholder files, and can
//! complete requests immediately, from a background thread, or only when the
//! test says so.

use crate::backend::{released_before_commit, BindingRequest, CameraBackend, CaptureEpoch};
use crate::dispatch::CaptureCompletion;
use crate::errors::CameraError;
use crate::listener::{CaptureResultListener, CapturedArtifact};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

const IMAGE_PAYLOAD: &[u8] = &[0xFF, 0xD8, 0xFF, 0xD9];
const VIDEO_PAYLOAD: &[u8] = b"quietcam-mock-video";

/// When the mock reports finished requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionMode {
    /// On the calling thread, before the call returns.
    Immediate,
    /// From a freshly spawned thread, after
    /// [`MockCamera::delay_background`] if set.
    Background,
    /// Held until [`MockCamera::release_held`].
    Manual,
}

#[derive(Default)]
struct MockState {
    bound: Option<BindingRequest>,
    active: bool,
    torch: bool,
    torch_history: Vec<bool>,
    bind_calls: usize,
    unbind_calls: usize,
    held: VecDeque<(PathBuf, &'static [u8], CaptureCompletion)>,
    recording: Option<(PathBuf, CaptureCompletion)>,
    picture_failures: VecDeque<String>,
    recording_start_failure: Option<String>,
    bind_failure: Option<String>,
    unbind_failure: Option<String>,
    background_delay: Option<Duration>,
}

pub struct MockCamera {
    device_key: String,
    mode: CompletionMode,
    state: Mutex<MockState>,
    epoch: Arc<CaptureEpoch>,
}

impl MockCamera {
    /// A mock with a unique device key, so parallel tests never share a claim.
    pub fn new(mode: CompletionMode) -> Arc<Self> {
        Self::with_key(format!("mock-{}", uuid::Uuid::new_v4()), mode)
    }

    pub fn with_key(device_key: impl Into<String>, mode: CompletionMode) -> Arc<Self> {
        Arc::new(Self {
            device_key: device_key.into(),
            mode,
            state: Mutex::new(MockState::default()),
            epoch: Arc::new(CaptureEpoch::new()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn fail_next_picture(&self, message: impl Into<String>) {
        self.lock().picture_failures.push_back(message.into());
    }

    pub fn fail_next_recording_start(&self, message: impl Into<String>) {
        self.lock().recording_start_failure = Some(message.into());
    }

    pub fn fail_bind(&self, message: impl Into<String>) {
        self.lock().bind_failure = Some(message.into());
    }

    pub fn fail_unbind(&self, message: impl Into<String>) {
        self.lock().unbind_failure = Some(message.into());
    }

    /// Background completions wait this long before writing their file.
    pub fn delay_background(&self, delay: Duration) {
        self.lock().background_delay = Some(delay);
    }

    /// Completes every held request successfully. Returns how many.
    pub fn release_held(&self) -> usize {
        let held: Vec<_> = self.lock().held.drain(..).collect();
        let count = held.len();
        for (path, payload, completion) in held {
            write_and_complete(&path, payload, completion);
        }
        count
    }

    /// The camera gives up on the running recording.
    pub fn abort_recording(&self, message: impl Into<String>) -> bool {
        let recording = self.lock().recording.take();
        match recording {
            Some((_, completion)) => {
                completion.fail(CameraError::Capture(message.into()));
                true
            }
            None => false,
        }
    }

    pub fn held_requests(&self) -> usize {
        self.lock().held.len()
    }

    pub fn is_recording(&self) -> bool {
        self.lock().recording.is_some()
    }

    pub fn torch_on(&self) -> bool {
        self.lock().torch
    }

    pub fn torch_history(&self) -> Vec<bool> {
        self.lock().torch_history.clone()
    }

    pub fn is_active(&self) -> bool {
        self.lock().active
    }

    pub fn bound_request(&self) -> Option<BindingRequest> {
        self.lock().bound.clone()
    }

    pub fn bind_calls(&self) -> usize {
        self.lock().bind_calls
    }

    pub fn unbind_calls(&self) -> usize {
        self.lock().unbind_calls
    }

    fn finish(&self, path: PathBuf, payload: &'static [u8], completion: CaptureCompletion) {
        match self.mode {
            CompletionMode::Immediate => write_and_complete(&path, payload, completion),
            CompletionMode::Background => {
                let epoch = self.epoch.clone();
                let ticket = epoch.ticket();
                let delay = self.lock().background_delay;
                std::thread::spawn(move || {
                    if let Some(delay) = delay {
                        std::thread::sleep(delay);
                    }
                    match epoch.hold(ticket) {
                        Some(_held) => write_and_complete(&path, payload, completion),
                        None => completion.fail(released_before_commit()),
                    }
                });
            }
            CompletionMode::Manual => self.lock().held.push_back((path, payload, completion)),
        }
    }
}

fn write_and_complete(path: &Path, payload: &[u8], completion: CaptureCompletion) {
    match std::fs::write(path, payload) {
        Ok(()) => completion.succeed(path.to_path_buf()),
        Err(e) => completion.fail(CameraError::Io(format!(
            "Failed to write {}: {}",
            path.display(),
            e
        ))),
    }
}

impl CameraBackend for MockCamera {
    fn device_key(&self) -> String {
        self.device_key.clone()
    }

    fn bind(&self, request: &BindingRequest) -> Result<(), CameraError> {
        let mut state = self.lock();
        state.bind_calls += 1;
        if let Some(message) = state.bind_failure.take() {
            return Err(CameraError::Binding(message));
        }
        if state.bound.is_some() {
            return Err(CameraError::AlreadyBound(self.device_key.clone()));
        }
        state.bound = Some(request.clone());
        Ok(())
    }

    fn unbind_all(&self) -> Result<(), CameraError> {
        self.epoch.advance();
        let (released, result) = {
            let mut state = self.lock();
            state.unbind_calls += 1;
            state.bound = None;
            state.active = false;
            state.torch = false;
            let mut released: Vec<CaptureCompletion> =
                state.held.drain(..).map(|(_, _, completion)| completion).collect();
            released.extend(state.recording.take().map(|(_, completion)| completion));
            let result = match state.unbind_failure.take() {
                Some(message) => Err(CameraError::Binding(message)),
                None => Ok(()),
            };
            (released, result)
        };
        // Outstanding requests report as abandoned once dropped.
        drop(released);
        result
    }

    fn activate(&self) -> Result<(), CameraError> {
        let mut state = self.lock();
        if state.bound.is_none() {
            return Err(CameraError::Binding("no use cases bound".to_string()));
        }
        state.active = true;
        Ok(())
    }

    fn deactivate(&self) -> Result<(), CameraError> {
        self.lock().active = false;
        Ok(())
    }

    fn enable_torch(&self, enabled: bool) -> Result<(), CameraError> {
        let mut state = self.lock();
        if state.bound.is_none() {
            return Err(CameraError::Binding("torch needs a bound camera".to_string()));
        }
        state.torch = enabled;
        state.torch_history.push(enabled);
        Ok(())
    }

    fn take_picture(&self, output: &Path, completion: CaptureCompletion) {
        let refusal = {
            let mut state = self.lock();
            if !state.active {
                Some("camera is not active".to_string())
            } else {
                state.picture_failures.pop_front()
            }
        };
        match refusal {
            Some(message) => completion.fail(CameraError::Capture(message)),
            None => self.finish(output.to_path_buf(), IMAGE_PAYLOAD, completion),
        }
    }

    fn start_recording(&self, output: &Path, completion: CaptureCompletion) {
        let mut state = self.lock();
        let refusal = if !state.active {
            Some("camera is not active".to_string())
        } else if state.recording.is_some() {
            Some("a recording is already running".to_string())
        } else {
            state.recording_start_failure.take()
        };
        match refusal {
            Some(message) => {
                drop(state);
                completion.fail(CameraError::Capture(message));
            }
            None => state.recording = Some((output.to_path_buf(), completion)),
        }
    }

    fn stop_recording(&self) {
        let recording = self.lock().recording.take();
        if let Some((path, completion)) = recording {
            self.finish(path, VIDEO_PAYLOAD, completion);
        }
    }
}

/// One delivered outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Ready(CapturedArtifact),
    Error(CameraError),
}

/// Listener that keeps every outcome for later inspection. Clones share
/// the same log, so keep one and hand the other to the session.
#[derive(Debug, Clone, Default)]
pub struct RecordingListener {
    outcomes: Arc<Mutex<Vec<Outcome>>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outcomes(&self) -> Vec<Outcome> {
        self.outcomes
            .lock()
            .map(|o| o.clone())
            .unwrap_or_default()
    }

    pub fn artifacts(&self) -> Vec<CapturedArtifact> {
        self.outcomes()
            .into_iter()
            .filter_map(|o| match o {
                Outcome::Ready(artifact) => Some(artifact),
                Outcome::Error(_) => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<CameraError> {
        self.outcomes()
            .into_iter()
            .filter_map(|o| match o {
                Outcome::Error(error) => Some(error),
                Outcome::Ready(_) => None,
            })
            .collect()
    }

    fn push(&self, outcome: Outcome) {
        if let Ok(mut outcomes) = self.outcomes.lock() {
            outcomes.push(outcome);
        }
    }
}

impl CaptureResultListener for RecordingListener {
    fn on_artifact_ready(&mut self, artifact: CapturedArtifact) {
        self.push(Outcome::Ready(artifact));
    }

    fn on_capture_error(&mut self, error: CameraError) {
        self.push(Outcome::Error(error));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CaptureSessionConfig;
    use crate::dispatch::CompletionQueue;

    #[test]
    fn refuses_pictures_until_active() {
        let camera = MockCamera::new(CompletionMode::Immediate);
        let dir = tempfile::tempdir().unwrap();
        let mut queue = CompletionQueue::new();

        camera.take_picture(&dir.path().join("a.jpg"), queue.completion());
        assert!(matches!(
            queue.try_next().unwrap().outcome,
            Err(CameraError::Capture(_))
        ));

        camera
            .bind(&BindingRequest::still(&CaptureSessionConfig::default()))
            .unwrap();
        camera.activate().unwrap();
        let path = dir.path().join("b.jpg");
        camera.take_picture(&path, queue.completion());
        assert_eq!(queue.try_next().unwrap().outcome, Ok(path.clone()));
        assert_eq!(std::fs::read(&path).unwrap(), IMAGE_PAYLOAD);
    }

    #[test]
    fn unbind_abandons_held_requests() {
        let camera = MockCamera::new(CompletionMode::Manual);
        let dir = tempfile::tempdir().unwrap();
        let mut queue = CompletionQueue::new();
        camera
            .bind(&BindingRequest::video(&CaptureSessionConfig::default()))
            .unwrap();
        camera.activate().unwrap();

        camera.start_recording(&dir.path().join("v.mp4"), queue.completion());
        assert!(camera.is_recording());
        camera.unbind_all().unwrap();

        assert_eq!(queue.try_next().unwrap().outcome, Err(CameraError::Abandoned));
        assert!(!camera.is_active());
        assert!(!camera.torch_on());
    }

    #[test]
    fn unbind_stops_delayed_background_write() {
        let camera = MockCamera::new(CompletionMode::Background);
        let dir = tempfile::tempdir().unwrap();
        let mut queue = CompletionQueue::new();
        camera
            .bind(&BindingRequest::still(&CaptureSessionConfig::default()))
            .unwrap();
        camera.activate().unwrap();
        camera.delay_background(Duration::from_millis(100));

        let path = dir.path().join("late.jpg");
        camera.take_picture(&path, queue.completion());
        camera.unbind_all().unwrap();

        let event = queue.next_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(event.outcome, Err(CameraError::Cancelled(_))));
        assert!(!path.exists());
    }

    #[test]
    fn second_bind_is_rejected() {
        let camera = MockCamera::new(CompletionMode::Immediate);
        let request = BindingRequest::still(&CaptureSessionConfig::default());
        camera.bind(&request).unwrap();
        assert!(matches!(
            camera.bind(&request),
            Err(CameraError::AlreadyBound(_))
        ));
        assert_eq!(camera.bind_calls(), 2);
    }
}
