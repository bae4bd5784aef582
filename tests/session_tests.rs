// SPDX-License-Identifier: MPL-2.0

//! Integration tests for the capture session manager

use camera_session::backends::camera::{
    CameraDevice, Facing, PhotoOptions, QualityPrioritization, RecordingOptions, SimulatedBackend,
};
use camera_session::backends::permissions::{Capability, FixedPermissions, PermissionState};
use camera_session::session::{CaptureResult, CaptureSessionManager, SessionState};
use camera_session::SessionError;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

fn simulated(dir: &Path) -> Arc<SimulatedBackend> {
    Arc::new(
        SimulatedBackend::new()
            .with_output_dir(dir)
            .with_photo_latency(Duration::from_millis(20)),
    )
}

fn slow_simulated(dir: &Path) -> Arc<SimulatedBackend> {
    Arc::new(
        SimulatedBackend::new()
            .with_output_dir(dir)
            .with_photo_latency(Duration::from_millis(300)),
    )
}

fn manager(backend: &Arc<SimulatedBackend>, permissions: FixedPermissions) -> CaptureSessionManager {
    CaptureSessionManager::new(backend.clone(), Arc::new(permissions))
}

/// Manager with everything granted and the back camera bound
async fn ready(backend: &Arc<SimulatedBackend>) -> CaptureSessionManager {
    let session = manager(backend, FixedPermissions::granted());
    session.request_permissions().await;
    session.bind_device(Facing::Back).unwrap();
    session
}

async fn wait_for_state(session: &CaptureSessionManager, state: SessionState) {
    let mut rx = session.subscribe();
    tokio::time::timeout(WAIT, rx.wait_for(|s| s.state == state))
        .await
        .expect("timed out waiting for state")
        .expect("session dropped");
}

fn assert_failed_with(result: &CaptureResult, needle: &str) {
    match result {
        CaptureResult::Failed { reason } => {
            assert!(reason.contains(needle), "unexpected reason: {}", reason)
        }
        other => panic!("expected failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_photo_on_back_camera() {
    let dir = tempfile::tempdir().unwrap();
    let backend = simulated(dir.path());
    let session = manager(&backend, FixedPermissions::granted());

    let permissions = session.request_permissions().await;
    assert!(permissions.all_granted());

    let handle = session.bind_device(Facing::Back).unwrap();
    assert_eq!(handle.facing(), Facing::Back);
    assert_eq!(session.state(), SessionState::Previewing);

    let options = PhotoOptions {
        quality: QualityPrioritization::Quality,
        ..PhotoOptions::default()
    };
    let result = session.take_photo(options).await.unwrap();

    let path = result.path().expect("photo path").to_path_buf();
    assert!(!path.as_os_str().is_empty());
    assert!(path.exists());
    assert!(matches!(result, CaptureResult::PhotoSaved { .. }));
    assert_eq!(session.state(), SessionState::Previewing);
}

#[tokio::test]
async fn test_second_photo_is_busy() {
    let dir = tempfile::tempdir().unwrap();
    let backend = slow_simulated(dir.path());
    let session = ready(&backend).await;

    let first = tokio::spawn({
        let session = session.clone();
        async move { session.take_photo(PhotoOptions::default()).await }
    });
    wait_for_state(&session, SessionState::CapturingPhoto).await;

    assert_eq!(
        session.take_photo(PhotoOptions::default()).await,
        Err(SessionError::Busy)
    );
    assert_eq!(session.state(), SessionState::CapturingPhoto);

    let result = first.await.unwrap().unwrap();
    assert!(matches!(result, CaptureResult::PhotoSaved { .. }));
    assert_eq!(session.state(), SessionState::Previewing);
}

#[tokio::test]
async fn test_photo_failure_returns_to_previewing() {
    let dir = tempfile::tempdir().unwrap();
    let backend = simulated(dir.path());
    let session = ready(&backend).await;

    backend.fail_next_photo("lens cap on");
    let result = session.take_photo(PhotoOptions::default()).await.unwrap();
    assert_failed_with(&result, "lens cap on");
    assert_eq!(session.state(), SessionState::Previewing);

    let retry = session.take_photo(PhotoOptions::default()).await.unwrap();
    assert!(retry.is_success());
    assert_eq!(session.state(), SessionState::Previewing);
}

#[tokio::test]
async fn test_stop_without_recording_is_invalid() {
    let dir = tempfile::tempdir().unwrap();
    let backend = simulated(dir.path());
    let session = manager(&backend, FixedPermissions::granted());

    assert_eq!(
        session.stop_recording(),
        Err(SessionError::InvalidState {
            operation: "stop recording",
            state: SessionState::Idle,
        })
    );
    assert_eq!(session.state(), SessionState::Idle);

    session.request_permissions().await;
    session.bind_device(Facing::Back).unwrap();
    assert!(matches!(
        session.stop_recording(),
        Err(SessionError::InvalidState {
            state: SessionState::Previewing,
            ..
        })
    ));
    assert_eq!(session.state(), SessionState::Previewing);
}

#[tokio::test]
async fn test_photo_without_device_is_invalid() {
    let dir = tempfile::tempdir().unwrap();
    let backend = simulated(dir.path());
    let session = manager(&backend, FixedPermissions::granted());
    session.request_permissions().await;

    assert!(matches!(
        session.take_photo(PhotoOptions::default()).await,
        Err(SessionError::InvalidState {
            state: SessionState::Idle,
            ..
        })
    ));
}

#[tokio::test]
async fn test_teardown_from_every_state() {
    let dir = tempfile::tempdir().unwrap();
    let backend = simulated(dir.path());
    let session = manager(&backend, FixedPermissions::granted());

    // Idle
    session.teardown();
    assert_eq!(session.state(), SessionState::Idle);

    // Previewing
    session.request_permissions().await;
    session.bind_device(Facing::Back).unwrap();
    session.teardown();
    assert_eq!(session.state(), SessionState::Idle);
    assert!(session.device().is_none());
    assert!(backend.open_device().is_none());

    // Recording
    session.bind_device(Facing::Back).unwrap();
    let completion = session.start_recording(RecordingOptions::default()).unwrap();
    session.teardown();
    assert_eq!(session.state(), SessionState::Idle);
    assert_failed_with(&completion.await, "torn down");
    assert!(backend.open_device().is_none());

    // Fresh start afterwards
    session.bind_device(Facing::Back).unwrap();
    assert_eq!(session.state(), SessionState::Previewing);
    let result = session.take_photo(PhotoOptions::default()).await.unwrap();
    assert!(result.is_success());
}

#[tokio::test]
async fn test_teardown_during_photo() {
    let dir = tempfile::tempdir().unwrap();
    let backend = slow_simulated(dir.path());
    let session = ready(&backend).await;

    let photo = tokio::spawn({
        let session = session.clone();
        async move { session.take_photo(PhotoOptions::default()).await }
    });
    wait_for_state(&session, SessionState::CapturingPhoto).await;

    session.teardown();
    assert_eq!(session.state(), SessionState::Idle);

    let result = photo.await.unwrap().unwrap();
    assert!(!result.is_success());
    assert_eq!(session.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_second_recording_is_busy() {
    let dir = tempfile::tempdir().unwrap();
    let backend = simulated(dir.path());
    let session = ready(&backend).await;

    let completion = session.start_recording(RecordingOptions::default()).unwrap();
    assert_eq!(session.state(), SessionState::Recording);

    assert!(matches!(
        session.start_recording(RecordingOptions::default()),
        Err(SessionError::Busy)
    ));
    assert_eq!(session.state(), SessionState::Recording);

    tokio::time::sleep(Duration::from_millis(150)).await;
    session.stop_recording().unwrap();
    // Stop is a request: still recording until the completion lands
    session.stop_recording().unwrap();

    let result = tokio::time::timeout(WAIT, completion).await.unwrap();
    assert!(matches!(result, CaptureResult::VideoSaved { .. }));
    assert!(result.path().unwrap().exists());
    assert_eq!(session.state(), SessionState::Previewing);
}

#[tokio::test]
async fn test_photo_while_recording_is_busy() {
    let dir = tempfile::tempdir().unwrap();
    let backend = simulated(dir.path());
    let session = ready(&backend).await;

    let _completion = session.start_recording(RecordingOptions::default()).unwrap();
    assert_eq!(
        session.take_photo(PhotoOptions::default()).await,
        Err(SessionError::Busy)
    );
    assert_eq!(session.bind_device(Facing::Front), Err(SessionError::Busy));
    assert_eq!(session.state(), SessionState::Recording);
}

#[tokio::test]
async fn test_microphone_denied_blocks_only_recording() {
    let dir = tempfile::tempdir().unwrap();
    let backend = simulated(dir.path());
    let session = manager(
        &backend,
        FixedPermissions::new().with_prompt_answer(Capability::Microphone, PermissionState::Denied),
    );

    let permissions = session.request_permissions().await;
    assert_eq!(permissions.camera, PermissionState::Granted);
    assert_eq!(permissions.microphone, PermissionState::Denied);
    session.bind_device(Facing::Back).unwrap();

    let photo = session.take_photo(PhotoOptions::default()).await.unwrap();
    assert!(photo.is_success());

    assert!(matches!(
        session.start_recording(RecordingOptions::default()),
        Err(SessionError::PermissionDenied(Capability::Microphone))
    ));
    assert_eq!(session.state(), SessionState::Previewing);

    // Video-only recordings do not need the microphone
    let silent = RecordingOptions {
        audio: false,
        ..RecordingOptions::default()
    };
    let _completion = session.start_recording(silent).unwrap();
    assert_eq!(session.state(), SessionState::Recording);
}

#[tokio::test]
async fn test_recording_failure_is_reported_once() {
    let dir = tempfile::tempdir().unwrap();
    let backend = simulated(dir.path());
    let session = ready(&backend).await;

    backend.fail_next_recording_after(2, "sensor unplugged");
    let mut completion = session.start_recording(RecordingOptions::default()).unwrap();
    assert_eq!(session.state(), SessionState::Recording);

    let result = tokio::time::timeout(WAIT, &mut completion).await.unwrap();
    assert_failed_with(&result, "sensor unplugged");
    assert_eq!(session.state(), SessionState::Previewing);
    assert_eq!(completion.try_result(), None);
}

#[tokio::test]
async fn test_max_duration_finishes_recording() {
    let dir = tempfile::tempdir().unwrap();
    let backend = simulated(dir.path());
    let session = ready(&backend).await;

    let options = RecordingOptions {
        audio: true,
        max_duration: Some(Duration::from_millis(120)),
    };
    let completion = session.start_recording(options).unwrap();

    let result = tokio::time::timeout(WAIT, completion).await.unwrap();
    assert!(matches!(result, CaptureResult::VideoSaved { .. }));
    assert_eq!(session.state(), SessionState::Previewing);
}

#[tokio::test]
async fn test_failed_stop_resolves_recording() {
    let dir = tempfile::tempdir().unwrap();
    let backend = simulated(dir.path());
    let session = ready(&backend).await;

    let completion = session.start_recording(RecordingOptions::default()).unwrap();
    backend.fail_next_stop("encoder wedged");

    assert!(matches!(
        session.stop_recording(),
        Err(SessionError::HardwareFailure(_))
    ));
    assert_eq!(session.state(), SessionState::Previewing);
    assert_failed_with(&completion.await, "encoder wedged");
}

#[tokio::test]
async fn test_dismissed_prompt_counts_as_denied() {
    let dir = tempfile::tempdir().unwrap();
    let backend = simulated(dir.path());
    let session = manager(
        &backend,
        FixedPermissions::new().with_prompt_answer(Capability::Camera, PermissionState::Unknown),
    );

    let permissions = session.request_permissions().await;
    assert_eq!(permissions.camera, PermissionState::Denied);
    assert_eq!(session.permissions(), permissions);

    session.bind_device(Facing::Back).unwrap();
    assert_eq!(
        session.take_photo(PhotoOptions::default()).await,
        Err(SessionError::PermissionDenied(Capability::Camera))
    );
    assert_eq!(session.state(), SessionState::Previewing);
}

#[tokio::test]
async fn test_rebinding_invalidates_previous_handle() {
    let dir = tempfile::tempdir().unwrap();
    let backend = simulated(dir.path());
    let session = ready(&backend).await;
    let back = session.device().unwrap();

    let front = session.bind_device(Facing::Front).unwrap();
    assert_ne!(back.id(), front.id());
    assert_eq!(session.device().unwrap().id(), front.id());
    assert_eq!(backend.open_device().unwrap().facing, Facing::Front);

    // Losing the stale device changes nothing
    assert!(!session.device_lost(back.id()));
    assert_eq!(session.state(), SessionState::Previewing);

    assert!(session.device_lost(front.id()));
    assert_eq!(session.state(), SessionState::Idle);
    assert!(backend.open_device().is_none());
}

#[tokio::test]
async fn test_missing_facing_keeps_binding() {
    let dir = tempfile::tempdir().unwrap();
    let backend = simulated(dir.path());
    let session = ready(&backend).await;
    let bound = session.device().unwrap();

    assert_eq!(
        session.bind_device(Facing::External),
        Err(SessionError::NoDeviceFound(Facing::External))
    );
    assert_eq!(session.device(), Some(bound));
    assert_eq!(session.state(), SessionState::Previewing);
}

#[tokio::test]
async fn test_open_failure_leaves_session_idle() {
    let dir = tempfile::tempdir().unwrap();
    let backend = simulated(dir.path());
    let session = manager(&backend, FixedPermissions::granted());
    session.request_permissions().await;

    backend.fail_next_open("held by another app");
    assert!(matches!(
        session.bind_device(Facing::Back),
        Err(SessionError::HardwareFailure(_))
    ));
    assert_eq!(session.state(), SessionState::Idle);
    assert!(session.device().is_none());

    session.bind_device(Facing::Back).unwrap();
    assert_eq!(session.state(), SessionState::Previewing);
}

#[tokio::test]
async fn test_late_completion_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let backend = simulated(dir.path());
    let session = ready(&backend).await;

    let completion = session.start_recording(RecordingOptions::default()).unwrap();
    session.teardown();
    assert_failed_with(&completion.await, "torn down");

    session.bind_device(Facing::Back).unwrap();
    // The cancelled recording reports back in the meantime
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(session.state(), SessionState::Previewing);
}

#[tokio::test]
async fn test_abandoned_photo_still_releases_session() {
    let dir = tempfile::tempdir().unwrap();
    let backend = slow_simulated(dir.path());
    let session = ready(&backend).await;

    let photo = tokio::spawn({
        let session = session.clone();
        async move { session.take_photo(PhotoOptions::default()).await }
    });
    wait_for_state(&session, SessionState::CapturingPhoto).await;
    photo.abort();

    wait_for_state(&session, SessionState::Previewing).await;
    let result = session.take_photo(PhotoOptions::default()).await.unwrap();
    assert!(result.is_success());
}

#[tokio::test]
async fn test_snapshots_follow_changes() {
    let dir = tempfile::tempdir().unwrap();
    let backend = simulated(dir.path());
    let session = manager(&backend, FixedPermissions::granted());
    let mut snapshots = session.subscribe();
    assert_eq!(snapshots.borrow_and_update().state, SessionState::Idle);

    session.request_permissions().await;
    session.bind_device(Facing::Back).unwrap();

    assert!(snapshots.has_changed().unwrap());
    let snapshot = snapshots.borrow_and_update().clone();
    assert_eq!(snapshot.state, SessionState::Previewing);
    assert!(snapshot.permissions.all_granted());
    assert_eq!(snapshot.device_id, session.device().map(|d| d.id()));
    assert_eq!(snapshot.device_name.as_deref(), Some("Simulated Back Camera"));
    assert_eq!(snapshot, session.snapshot());
}

#[tokio::test]
async fn test_dropping_manager_releases_device() {
    let dir = tempfile::tempdir().unwrap();
    let backend = simulated(dir.path());
    let session = ready(&backend).await;
    let completion = session.start_recording(RecordingOptions::default()).unwrap();

    drop(session);
    assert!(backend.open_device().is_none());
    assert_failed_with(&completion.await, "torn down");
}

#[tokio::test]
async fn test_state_settles_after_mixed_operations() {
    let dir = tempfile::tempdir().unwrap();
    let backend = simulated(dir.path());
    let session = ready(&backend).await;

    for round in 0..3 {
        if round == 1 {
            backend.fail_next_photo("flaky sensor");
        }
        let _ = session.take_photo(PhotoOptions::default()).await.unwrap();
        assert_eq!(session.state(), SessionState::Previewing);

        if round == 2 {
            backend.fail_next_recording_start("no buffers");
            assert!(matches!(
                session.start_recording(RecordingOptions::default()),
                Err(SessionError::HardwareFailure(_))
            ));
            assert_eq!(session.state(), SessionState::Previewing);
            continue;
        }

        let completion = session.start_recording(RecordingOptions::default()).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        session.stop_recording().unwrap();
        let _ = tokio::time::timeout(WAIT, completion).await.unwrap();
        assert_eq!(session.state(), SessionState::Previewing);
    }

    session.teardown();
    assert_eq!(session.state(), SessionState::Idle);
}

#[test]
fn test_recording_needs_runtime() {
    let dir = tempfile::tempdir().unwrap();
    let backend = simulated(dir.path());
    let session = manager(&backend, FixedPermissions::granted());
    futures::executor::block_on(session.request_permissions());
    session.bind_device(Facing::Back).unwrap();

    assert!(matches!(
        session.start_recording(RecordingOptions::default()),
        Err(SessionError::HardwareFailure(_))
    ));
    assert_eq!(session.state(), SessionState::Previewing);
}

#[test]
fn test_photo_needs_runtime() {
    let dir = tempfile::tempdir().unwrap();
    let backend = simulated(dir.path());
    let session = manager(&backend, FixedPermissions::granted());
    futures::executor::block_on(session.request_permissions());
    session.bind_device(Facing::Back).unwrap();

    let result = futures::executor::block_on(session.take_photo(PhotoOptions::default()));
    assert!(matches!(result, Err(SessionError::HardwareFailure(_))));
    assert_eq!(session.state(), SessionState::Previewing);
}

#[tokio::test]
async fn test_revoked_microphone_ends_recording() {
    let dir = tempfile::tempdir().unwrap();
    let backend = simulated(dir.path());
    let permissions = Arc::new(FixedPermissions::granted());
    let session = CaptureSessionManager::new(backend.clone(), permissions.clone());
    session.request_permissions().await;
    session.bind_device(Facing::Back).unwrap();

    let completion = session.start_recording(RecordingOptions::default()).unwrap();
    permissions.set_status(Capability::Microphone, PermissionState::Denied);
    let resolved = session.request_permissions().await;

    assert_eq!(resolved.microphone, PermissionState::Denied);
    assert_eq!(session.state(), SessionState::Previewing);
    assert!(!backend.is_recording());
    assert_failed_with(&completion.await, "revoked");

    // The cancelled clip reporting back later changes nothing
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(session.state(), SessionState::Previewing);
}

#[tokio::test]
async fn test_silent_recording_survives_microphone_revocation() {
    let dir = tempfile::tempdir().unwrap();
    let backend = simulated(dir.path());
    let permissions = Arc::new(FixedPermissions::granted());
    let session = CaptureSessionManager::new(backend.clone(), permissions.clone());
    session.request_permissions().await;
    session.bind_device(Facing::Back).unwrap();

    let silent = RecordingOptions {
        audio: false,
        ..RecordingOptions::default()
    };
    let _completion = session.start_recording(silent).unwrap();
    permissions.set_status(Capability::Microphone, PermissionState::Denied);
    session.request_permissions().await;

    assert_eq!(session.state(), SessionState::Recording);
}

#[tokio::test]
async fn test_revoked_camera_discards_photo() {
    let dir = tempfile::tempdir().unwrap();
    let backend = slow_simulated(dir.path());
    let permissions = Arc::new(FixedPermissions::granted());
    let session = CaptureSessionManager::new(backend.clone(), permissions.clone());
    session.request_permissions().await;
    session.bind_device(Facing::Back).unwrap();

    let photo = tokio::spawn({
        let session = session.clone();
        async move { session.take_photo(PhotoOptions::default()).await }
    });
    wait_for_state(&session, SessionState::CapturingPhoto).await;

    permissions.set_status(Capability::Camera, PermissionState::Denied);
    session.request_permissions().await;

    let result = photo.await.unwrap().unwrap();
    assert_failed_with(&result, "revoked");
    assert_eq!(session.state(), SessionState::Previewing);
    assert_eq!(
        session.take_photo(PhotoOptions::default()).await,
        Err(SessionError::PermissionDenied(Capability::Camera))
    );
}

#[test]
fn test_custom_device_list() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(
        SimulatedBackend::new()
            .with_output_dir(dir.path())
            .with_devices(vec![CameraDevice {
                name: "Desk Cam".to_string(),
                path: "sim:desk".to_string(),
                facing: Facing::External,
                driver: None,
            }]),
    );
    let session = manager(&backend, FixedPermissions::granted());

    assert_eq!(session.available_devices().len(), 1);
    assert_eq!(
        session.bind_device(Facing::Back),
        Err(SessionError::NoDeviceFound(Facing::Back))
    );
    let handle = session.bind_device(Facing::External).unwrap();
    assert_eq!(handle.device().name, "Desk Cam");
}
