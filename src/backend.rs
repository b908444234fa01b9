//! The device camera stack, as seen by a capture session.

use crate::config::{CaptureSessionConfig, FlashPolicy, Lens, Rotation, TargetSize};
use crate::dispatch::CaptureCompletion;
use crate::errors::CameraError;
use crate::lifecycle::{LifecycleObserver, LifecycleState};
use lazy_static::lazy_static;
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Where preview frames go. Sessions never show a preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewSurface {
    /// Frames are produced only so exposure and focus can settle.
    Discard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UseCase {
    Preview { surface: PreviewSurface },
    ImageCapture { flash: FlashPolicy },
    VideoCapture { frame_rate: u32 },
}

/// Everything bound to the hardware for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingRequest {
    pub lens: Lens,
    pub target: Option<TargetSize>,
    pub rotation: Option<Rotation>,
    pub use_cases: Vec<UseCase>,
}

impl BindingRequest {
    pub fn still(config: &CaptureSessionConfig) -> Self {
        Self::with_capture(config, UseCase::ImageCapture { flash: config.flash })
    }

    pub fn video(config: &CaptureSessionConfig) -> Self {
        Self::with_capture(
            config,
            UseCase::VideoCapture {
                frame_rate: config.frame_rate,
            },
        )
    }

    fn with_capture(config: &CaptureSessionConfig, capture: UseCase) -> Self {
        Self {
            lens: config.lens,
            target: config.target,
            rotation: config.rotation,
            use_cases: vec![
                UseCase::Preview {
                    surface: PreviewSurface::Discard,
                },
                capture,
            ],
        }
    }
}

/// A camera stack capable of binding use cases and running captures.
///
/// Capture methods never report synchronously: every outcome, including an
/// immediate refusal, goes through the supplied [`CaptureCompletion`].
pub trait CameraBackend: Send + Sync {
    /// Identifies the physical device for the single-binding claim.
    fn device_key(&self) -> String;

    fn bind(&self, request: &BindingRequest) -> Result<(), CameraError>;

    fn unbind_all(&self) -> Result<(), CameraError>;

    fn activate(&self) -> Result<(), CameraError>;

    fn deactivate(&self) -> Result<(), CameraError>;

    fn enable_torch(&self, enabled: bool) -> Result<(), CameraError>;

    fn take_picture(&self, output: &Path, completion: CaptureCompletion);

    fn start_recording(&self, output: &Path, completion: CaptureCompletion);

    /// Ends the active recording; its completion fires afterwards.
    fn stop_recording(&self);
}

/// Release counter for captures that finish on worker threads.
///
/// A worker takes a [`ticket`](Self::ticket) when the capture is issued and
/// writes its file and reports only while [`hold`](Self::hold) returns a
/// guard. [`advance`](Self::advance) waits for any held guard, so once it
/// returns every finished capture has already queued its outcome and every
/// later one sees a stale ticket.
#[derive(Debug, Default)]
pub struct CaptureEpoch {
    current: Mutex<u64>,
}

impl CaptureEpoch {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, u64> {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn ticket(&self) -> u64 {
        *self.lock()
    }

    pub fn is_current(&self, ticket: u64) -> bool {
        *self.lock() == ticket
    }

    /// Locks out releases while the caller commits, or `None` when the
    /// camera was released after `ticket` was taken.
    pub fn hold(&self, ticket: u64) -> Option<MutexGuard<'_, u64>> {
        let guard = self.lock();
        (*guard == ticket).then_some(guard)
    }

    /// Invalidates every outstanding ticket.
    pub fn advance(&self) {
        *self.lock() += 1;
    }
}

/// Error for captures that lost their camera before they could commit.
pub fn released_before_commit() -> CameraError {
    CameraError::Cancelled("camera released before the capture finished".to_string())
}

lazy_static! {
    static ref CLAIMED_DEVICES: Mutex<HashSet<String>> = Mutex::new(HashSet::new());
}

/// Exclusive hold on a device for the lifetime of one session.
#[derive(Debug)]
pub struct HardwareClaim {
    device_key: String,
}

impl HardwareClaim {
    pub fn acquire(device_key: &str) -> Result<Self, CameraError> {
        let mut claimed = CLAIMED_DEVICES
            .lock()
            .map_err(|_| CameraError::Binding("hardware claim registry poisoned".to_string()))?;
        if !claimed.insert(device_key.to_string()) {
            return Err(CameraError::AlreadyBound(device_key.to_string()));
        }
        log::debug!("Claimed camera {}", device_key);
        Ok(Self {
            device_key: device_key.to_string(),
        })
    }

    pub fn device_key(&self) -> &str {
        &self.device_key
    }
}

impl Drop for HardwareClaim {
    fn drop(&mut self) {
        if let Ok(mut claimed) = CLAIMED_DEVICES.lock() {
            claimed.remove(&self.device_key);
            log::debug!("Released camera {}", self.device_key);
        }
    }
}

/// Bound use cases following a [`crate::lifecycle::LifecycleController`].
pub struct CameraBinding {
    backend: Arc<dyn CameraBackend>,
    claim: Mutex<Option<HardwareClaim>>,
}

impl CameraBinding {
    /// Claims the device and binds `request`. The claim is released again if
    /// binding fails.
    pub fn bind(
        backend: Arc<dyn CameraBackend>,
        request: &BindingRequest,
    ) -> Result<Self, CameraError> {
        let claim = HardwareClaim::acquire(&backend.device_key())?;
        backend.bind(request)?;
        log::info!(
            "Bound {} use cases on {}",
            request.use_cases.len(),
            claim.device_key()
        );
        Ok(Self {
            backend,
            claim: Mutex::new(Some(claim)),
        })
    }

    pub fn is_claimed(&self) -> bool {
        self.claim.lock().map(|c| c.is_some()).unwrap_or(false)
    }
}

impl LifecycleObserver for CameraBinding {
    fn on_transition(&self, _from: LifecycleState, to: LifecycleState) -> Result<(), CameraError> {
        match to {
            LifecycleState::Started => self.backend.activate(),
            LifecycleState::Stopped => self.backend.deactivate(),
            LifecycleState::Destroyed => {
                let result = self.backend.unbind_all();
                // Released whether or not unbinding succeeded.
                if let Ok(mut claim) = self.claim.lock() {
                    claim.take();
                }
                result
            }
            LifecycleState::Created => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claims_are_exclusive_per_device() {
        let key = format!("claim-test-{}", uuid::Uuid::new_v4());
        let first = HardwareClaim::acquire(&key).unwrap();
        assert_eq!(
            HardwareClaim::acquire(&key).unwrap_err(),
            CameraError::AlreadyBound(key.clone())
        );
        drop(first);
        assert!(HardwareClaim::acquire(&key).is_ok());
    }

    #[test]
    fn epoch_rejects_tickets_from_before_release() {
        let epoch = CaptureEpoch::new();
        let ticket = epoch.ticket();
        assert!(epoch.hold(ticket).is_some());

        epoch.advance();
        assert!(!epoch.is_current(ticket));
        assert!(epoch.hold(ticket).is_none());
        assert!(epoch.hold(epoch.ticket()).is_some());
    }

    #[test]
    fn epoch_advance_waits_for_held_commit() {
        let epoch = Arc::new(CaptureEpoch::new());
        let ticket = epoch.ticket();
        let held = epoch.hold(ticket).unwrap();

        let releaser = {
            let epoch = epoch.clone();
            std::thread::spawn(move || epoch.advance())
        };
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert!(!releaser.is_finished());

        drop(held);
        releaser.join().unwrap();
        assert!(!epoch.is_current(ticket));
    }

    #[test]
    fn binding_requests_carry_hidden_preview() {
        let config = CaptureSessionConfig::new(Lens::Front)
            .with_resolution(1080, 1920)
            .with_flash(FlashPolicy::On)
            .with_frame_rate(30);

        let still = BindingRequest::still(&config);
        assert_eq!(
            still.use_cases,
            vec![
                UseCase::Preview {
                    surface: PreviewSurface::Discard
                },
                UseCase::ImageCapture {
                    flash: FlashPolicy::On
                },
            ]
        );

        let video = BindingRequest::video(&config);
        assert_eq!(video.use_cases[1], UseCase::VideoCapture { frame_rate: 30 });
        assert_eq!(video.lens, Lens::Front);
        assert_eq!(
            video.target,
            Some(TargetSize::Resolution {
                width: 1080,
                height: 1920
            })
        );
    }
}
