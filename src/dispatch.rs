//! Marshals hardware completions onto the session owner's thread.
//!
//! Backends report through a [`CaptureCompletion`] from whatever thread they
//! like. The owning session drains the [`CompletionQueue`] from its own
//! thread, so session state and listeners are only touched there.

use crate::errors::CameraError;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionEvent {
    pub request_id: u64,
    pub outcome: Result<PathBuf, CameraError>,
}

/// One-shot reply handle for a single hardware request.
///
/// Consumed by `succeed` or `fail`. Dropping it unreported sends
/// [`CameraError::Abandoned`], so every request gets exactly one event.
#[derive(Debug)]
pub struct CaptureCompletion {
    request_id: u64,
    sender: Option<Sender<CompletionEvent>>,
}

impl CaptureCompletion {
    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    pub fn succeed(mut self, path: PathBuf) {
        self.send(Ok(path));
    }

    pub fn fail(mut self, error: CameraError) {
        self.send(Err(error));
    }

    fn send(&mut self, outcome: Result<PathBuf, CameraError>) {
        if let Some(sender) = self.sender.take() {
            let event = CompletionEvent {
                request_id: self.request_id,
                outcome,
            };
            if sender.send(event).is_err() {
                log::debug!(
                    "Completion for request {} arrived after its session was dropped",
                    self.request_id
                );
            }
        }
    }
}

impl Drop for CaptureCompletion {
    fn drop(&mut self) {
        if self.sender.is_some() {
            log::warn!("Request {} dropped without an outcome", self.request_id);
            self.send(Err(CameraError::Abandoned));
        }
    }
}

pub struct CompletionQueue {
    sender: Sender<CompletionEvent>,
    receiver: Receiver<CompletionEvent>,
    next_request: u64,
}

impl CompletionQueue {
    pub fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            sender,
            receiver,
            next_request: 1,
        }
    }

    /// Allocates a request id and its reply handle.
    pub fn completion(&mut self) -> CaptureCompletion {
        let request_id = self.next_request;
        self.next_request += 1;
        CaptureCompletion {
            request_id,
            sender: Some(self.sender.clone()),
        }
    }

    pub fn try_next(&self) -> Option<CompletionEvent> {
        self.receiver.try_recv().ok()
    }

    pub fn next_timeout(&self, timeout: Duration) -> Option<CompletionEvent> {
        match self.receiver.recv_timeout(timeout) {
            Ok(event) => Some(event),
            // The queue keeps its own sender, so disconnection cannot happen.
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}

impl Default for CompletionQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_ids_increase() {
        let mut queue = CompletionQueue::new();
        let a = queue.completion();
        let b = queue.completion();
        assert_eq!(a.request_id() + 1, b.request_id());
        a.succeed(PathBuf::from("a.jpg"));
        b.fail(CameraError::Capture("boom".to_string()));

        assert_eq!(queue.try_next().unwrap().outcome, Ok(PathBuf::from("a.jpg")));
        assert_eq!(
            queue.try_next().unwrap().outcome,
            Err(CameraError::Capture("boom".to_string()))
        );
        assert!(queue.try_next().is_none());
    }

    #[test]
    fn dropped_completion_reports_abandoned() {
        let mut queue = CompletionQueue::new();
        let completion = queue.completion();
        let id = completion.request_id();
        drop(completion);

        let event = queue.try_next().unwrap();
        assert_eq!(event.request_id, id);
        assert_eq!(event.outcome, Err(CameraError::Abandoned));
        assert!(queue.try_next().is_none());
    }

    #[test]
    fn completions_cross_threads() {
        let mut queue = CompletionQueue::new();
        let completion = queue.completion();
        std::thread::spawn(move || completion.succeed(PathBuf::from("bg.mp4")))
            .join()
            .unwrap();

        let event = queue.next_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(event.outcome, Ok(PathBuf::from("bg.mp4")));
        assert!(queue.next_timeout(Duration::from_millis(10)).is_none());
    }
}
