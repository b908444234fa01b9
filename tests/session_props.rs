//! Property tests for naming, lifecycle transitions and the recording toggle.

use proptest::prelude::*;
use quietcam::testing::{CompletionMode, MockCamera, RecordingListener};
use quietcam::{
    ArtifactKind, ArtifactNamer, CaptureSessionConfig, FlashPolicy, LifecycleController,
    LifecycleState, RecordingState, StaticPermissions, VideoCaptureSession,
};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy)]
enum LifecycleOp {
    Start,
    Stop,
    TearDown,
}

fn lifecycle_op() -> impl Strategy<Value = LifecycleOp> {
    prop_oneof![
        Just(LifecycleOp::Start),
        Just(LifecycleOp::Stop),
        Just(LifecycleOp::TearDown),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_sequential_paths_are_unique(count in 2usize..40, video in any::<bool>()) {
        let dir = tempfile::tempdir().unwrap();
        let namer = ArtifactNamer::new();
        let kind = if video { ArtifactKind::Video } else { ArtifactKind::Image };

        let mut seen = HashSet::new();
        for _ in 0..count {
            let path = namer.next_path(dir.path(), kind).unwrap();
            prop_assert!(seen.insert(path));
        }
    }

    #[test]
    fn prop_lifecycle_transitions(ops in prop::collection::vec(lifecycle_op(), 1..30)) {
        let mut controller = LifecycleController::new();
        let mut destroyed = false;

        for op in ops {
            let before = controller.state();
            let after = match op {
                LifecycleOp::Start => controller.start().unwrap(),
                LifecycleOp::Stop => controller.stop().unwrap(),
                LifecycleOp::TearDown => controller.tear_down().unwrap(),
            };
            prop_assert_eq!(after, controller.state());

            if destroyed {
                prop_assert_eq!(after, LifecycleState::Destroyed);
                continue;
            }
            match op {
                LifecycleOp::Start => {
                    prop_assert_eq!(after, LifecycleState::Started);
                }
                LifecycleOp::Stop if before == LifecycleState::Created => {
                    prop_assert_eq!(after, LifecycleState::Created);
                }
                LifecycleOp::Stop => {
                    prop_assert_eq!(after, LifecycleState::Stopped);
                }
                LifecycleOp::TearDown => {
                    prop_assert_eq!(after, LifecycleState::Destroyed);
                    destroyed = true;
                }
            }
        }
    }

    #[test]
    fn prop_toggle_alternates_and_torch_follows(toggles in 1usize..16, flash_on in any::<bool>()) {
        let camera = MockCamera::new(CompletionMode::Immediate);
        let dir = tempfile::tempdir().unwrap();
        let listener = RecordingListener::new();
        let flash = if flash_on { FlashPolicy::On } else { FlashPolicy::Off };
        let mut session = VideoCaptureSession::open(
            camera.clone(),
            &StaticPermissions::all_granted(),
            CaptureSessionConfig::default().with_flash(flash),
            dir.path(),
            listener.clone(),
        )
        .unwrap();
        session.start().unwrap();

        for i in 0..toggles {
            let state = session.capture_video().unwrap();
            let expected = if i % 2 == 0 { RecordingState::Recording } else { RecordingState::Idle };
            prop_assert_eq!(state, expected);
            let torch = flash_on && state == RecordingState::Recording;
            prop_assert_eq!(session.is_torch_on(), torch);
            prop_assert_eq!(camera.torch_on(), torch);
        }
        session.dispatch_pending();
        prop_assert_eq!(listener.outcomes().len(), toggles / 2);

        session.destroy().unwrap();
        prop_assert!(!camera.torch_on());
        prop_assert_eq!(listener.outcomes().len(), (toggles + 1) / 2);
        prop_assert!(listener.errors().is_empty());
    }
}

#[test]
fn concurrent_paths_are_unique() {
    let dir = tempfile::tempdir().unwrap();
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let base = dir.path().to_path_buf();
            std::thread::spawn(move || {
                let namer = ArtifactNamer::new();
                (0..25)
                    .map(|_| namer.next_path(&base, ArtifactKind::Image).unwrap())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut seen = HashSet::new();
    for handle in handles {
        for path in handle.join().unwrap() {
            assert!(seen.insert(path));
        }
    }
    assert_eq!(seen.len(), 200);
}
