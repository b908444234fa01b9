//! Camera backend over `nokhwa` for desktop webcams.
//!
//! Stills only: frames are pulled from the stream, the first few are thrown
//! away while exposure settles, and the next one is written as JPEG. There is
//! no torch on these devices and no encoder, so torch requests are ignored
//! and recordings fail with [`CameraError::Unsupported`]. A still that is
//! still in flight when the camera is released is reported as cancelled and
//! never written.

use crate::backend::{released_before_commit, BindingRequest, CameraBackend, CaptureEpoch};
use crate::dispatch::CaptureCompletion;
use crate::errors::CameraError;
use nokhwa::{
    pixel_format::RgbFormat,
    utils::{CameraIndex, RequestedFormat, RequestedFormatType},
    CallbackCamera,
};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Frames discarded before a still is kept.
pub const DEFAULT_WARMUP_FRAMES: usize = 5;

pub struct NokhwaCamera {
    index: u32,
    warmup_frames: usize,
    bound: Mutex<Option<BindingRequest>>,
    camera: Arc<Mutex<Option<CallbackCamera>>>,
    epoch: Arc<CaptureEpoch>,
}

impl NokhwaCamera {
    pub fn new(index: u32) -> Self {
        Self {
            index,
            warmup_frames: DEFAULT_WARMUP_FRAMES,
            bound: Mutex::new(None),
            camera: Arc::new(Mutex::new(None)),
            epoch: Arc::new(CaptureEpoch::new()),
        }
    }

    pub fn with_warmup_frames(mut self, frames: usize) -> Self {
        self.warmup_frames = frames;
        self
    }

    fn open_camera(&self) -> Result<CallbackCamera, CameraError> {
        let requested_format = RequestedFormat::new::<RgbFormat>(RequestedFormatType::None);
        CallbackCamera::new(CameraIndex::Index(self.index), requested_format, |_| {})
            .map_err(|e| CameraError::Binding(format!("Failed to initialize camera: {}", e)))
    }
}

impl CameraBackend for NokhwaCamera {
    fn device_key(&self) -> String {
        format!("nokhwa:{}", self.index)
    }

    fn bind(&self, request: &BindingRequest) -> Result<(), CameraError> {
        let mut bound = self
            .bound
            .lock()
            .map_err(|_| CameraError::Binding("Failed to lock binding".to_string()))?;
        if bound.is_some() {
            return Err(CameraError::AlreadyBound(self.device_key()));
        }
        log::debug!(
            "Binding camera {} (lens {:?} is fixed on this device, size hint {:?})",
            self.index,
            request.lens,
            request.target
        );
        *bound = Some(request.clone());
        Ok(())
    }

    fn unbind_all(&self) -> Result<(), CameraError> {
        // In-flight stills stop polling and never write once this returns.
        self.epoch.advance();
        if let Ok(mut bound) = self.bound.lock() {
            bound.take();
        }
        let mut camera = self
            .camera
            .lock()
            .map_err(|_| CameraError::Binding("Failed to lock camera".to_string()))?;
        if let Some(mut cam) = camera.take() {
            cam.stop_stream().map_err(|e| {
                CameraError::Binding(format!("Failed to stop stream: {}", e))
            })?;
        }
        Ok(())
    }

    fn activate(&self) -> Result<(), CameraError> {
        let mut camera = self
            .camera
            .lock()
            .map_err(|_| CameraError::Binding("Failed to lock camera".to_string()))?;
        if camera.is_none() {
            *camera = Some(self.open_camera()?);
        }
        if let Some(cam) = camera.as_mut() {
            cam.open_stream()
                .map_err(|e| CameraError::Binding(format!("Failed to start stream: {}", e)))?;
        }
        Ok(())
    }

    fn deactivate(&self) -> Result<(), CameraError> {
        let mut camera = self
            .camera
            .lock()
            .map_err(|_| CameraError::Binding("Failed to lock camera".to_string()))?;
        if let Some(cam) = camera.as_mut() {
            cam.stop_stream()
                .map_err(|e| CameraError::Binding(format!("Failed to stop stream: {}", e)))?;
        }
        Ok(())
    }

    fn enable_torch(&self, enabled: bool) -> Result<(), CameraError> {
        log::debug!("Camera {} has no torch, ignoring request ({})", self.index, enabled);
        Ok(())
    }

    fn take_picture(&self, output: &Path, completion: CaptureCompletion) {
        let camera = self.camera.clone();
        let epoch = self.epoch.clone();
        let ticket = epoch.ticket();
        let warmup_frames = self.warmup_frames;
        let output = output.to_path_buf();
        std::thread::Builder::new()
            .name("quietcam-still".to_string())
            .spawn(move || {
                let image = match grab_still(&camera, &epoch, ticket, warmup_frames) {
                    Ok(image) => image,
                    Err(e) => return completion.fail(e),
                };
                let Some(_held) = epoch.hold(ticket) else {
                    return completion.fail(released_before_commit());
                };
                match save_jpeg(image, &output) {
                    Ok(()) => completion.succeed(output),
                    Err(e) => completion.fail(e),
                }
            })
            .map(|_| ())
            .unwrap_or_else(|e| log::error!("Failed to spawn still capture thread: {}", e));
    }

    fn start_recording(&self, _output: &Path, completion: CaptureCompletion) {
        completion.fail(CameraError::Unsupported(
            "video recording needs an encoding camera stack".to_string(),
        ));
    }

    fn stop_recording(&self) {}
}

fn grab_still(
    camera: &Mutex<Option<CallbackCamera>>,
    epoch: &CaptureEpoch,
    ticket: u64,
    warmup_frames: usize,
) -> Result<image::RgbImage, CameraError> {
    let mut guard = camera
        .lock()
        .map_err(|_| CameraError::Capture("Failed to lock camera".to_string()))?;
    let cam = guard
        .as_mut()
        .ok_or_else(|| CameraError::Capture("camera is not active".to_string()))?;

    for _ in 0..warmup_frames {
        if !epoch.is_current(ticket) {
            return Err(released_before_commit());
        }
        cam.poll_frame()
            .map_err(|e| CameraError::Capture(format!("Failed to capture frame: {}", e)))?;
    }
    let frame = cam
        .poll_frame()
        .map_err(|e| CameraError::Capture(format!("Failed to capture frame: {}", e)))?;
    drop(guard);

    let decoded = frame
        .decode_image::<RgbFormat>()
        .map_err(|e| CameraError::Capture(format!("Failed to decode frame: {}", e)))?;
    let (width, height) = (decoded.width(), decoded.height());
    image::RgbImage::from_vec(width, height, decoded.into_raw())
        .ok_or_else(|| CameraError::Capture("Failed to create image from frame data".to_string()))
}

fn save_jpeg(img: image::RgbImage, output: &Path) -> Result<(), CameraError> {
    image::DynamicImage::ImageRgb8(img)
        .save_with_format(output, image::ImageFormat::Jpeg)
        .map_err(|e| CameraError::Io(format!("Failed to save {}: {}", output.display(), e)))?;
    log::info!("Still saved to {}", output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CaptureSessionConfig;
    use crate::dispatch::CompletionQueue;
    use std::time::Duration;

    #[test]
    fn device_key_names_the_index() {
        assert_eq!(NokhwaCamera::new(3).device_key(), "nokhwa:3");
    }

    #[test]
    fn second_bind_is_rejected() {
        let camera = NokhwaCamera::new(0);
        let request = BindingRequest::still(&CaptureSessionConfig::default());
        camera.bind(&request).unwrap();
        assert!(matches!(
            camera.bind(&request),
            Err(CameraError::AlreadyBound(_))
        ));
        camera.unbind_all().unwrap();
        assert!(camera.bind(&request).is_ok());
    }

    #[test]
    fn recording_is_unsupported() {
        let camera = NokhwaCamera::new(0);
        let mut queue = CompletionQueue::new();
        camera.start_recording(Path::new("clip.mp4"), queue.completion());
        assert!(matches!(
            queue.try_next().unwrap().outcome,
            Err(CameraError::Unsupported(_))
        ));
    }

    #[test]
    fn still_without_stream_fails_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let camera = NokhwaCamera::new(0).with_warmup_frames(0);
        let mut queue = CompletionQueue::new();
        let path = dir.path().join("still.jpg");

        camera.take_picture(&path, queue.completion());
        let event = queue.next_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(event.outcome, Err(CameraError::Capture(_))));
        assert!(!path.exists());
    }
}
