mod common;

use std::time::{Duration, Instant};

use common::*;
use live_interpreter::api::live_translate::{RemoteEvent, SessionConfig};
use live_interpreter::audio::{AudioFormat, EncodedChunk};
use live_interpreter::{LifecycleState, LiveError, SessionSettings, SessionStatus};

fn ramp(len: usize, offset: i16) -> Vec<i16> {
    (0..len).map(|i| offset.wrapping_add(i as i16)).collect()
}

#[test]
fn captured_frames_reach_the_service_in_order() {
    let (mut controller, devices, transport) = active_controller();
    assert_eq!(controller.state(), LifecycleState::Active);

    // 3 frames of 4096 samples, delivered in uneven device callbacks
    let mut samples = Vec::new();
    for frame in 0..3 {
        samples.extend(std::iter::repeat(frame as i16 + 1).take(4096));
    }
    for block in samples.chunks(1000) {
        devices.capture(block);
    }
    controller.pump(Duration::ZERO);

    let wire = transport.0.borrow();
    assert_eq!(wire.sent.len(), 3);
    for (i, chunk) in wire.sent.iter().enumerate() {
        assert_eq!(chunk.data().len(), 4096 * 2);
        assert_eq!(chunk.format(), AudioFormat::pcm16(16000));
        let first = i16::from_le_bytes([chunk.data()[0], chunk.data()[1]]);
        assert_eq!(first, i as i16 + 1);
    }
    assert_eq!(controller.stats().unwrap().frames_sent, 3);
}

#[test]
fn frames_captured_before_open_are_not_sent() {
    let (mut controller, devices, transport) = controller();
    controller.start(SessionConfig::default()).unwrap();
    assert_eq!(controller.state(), LifecycleState::Connecting);

    devices.capture(&ramp(8192, 0));
    controller.pump(Duration::ZERO);
    assert_eq!(transport.sent(), 0);

    transport.emit(RemoteEvent::Opened);
    controller.pump(Duration::ZERO);
    devices.capture(&ramp(4096, 0));
    controller.pump(Duration::ZERO);
    assert_eq!(transport.sent(), 1);
}

#[test]
fn inbound_chunks_play_back_to_back() {
    let (mut controller, devices, transport) = active_controller();
    devices.set_now(0.0);

    transport.emit(RemoteEvent::Message(speech(0.5)));
    transport.emit(RemoteEvent::Message(speech(0.3)));
    controller.pump(Duration::ZERO);

    let scheduled = devices.scheduled();
    assert_eq!(scheduled.len(), 2);
    assert_eq!(scheduled[0].1, 0.0);
    assert!((scheduled[1].1 - 0.5).abs() < 1e-9);

    let stats = controller.stats().unwrap();
    assert!((stats.playback_cursor - 0.8).abs() < 1e-9);
    assert_eq!(stats.active_sources, 2);
}

#[test]
fn playback_catches_up_after_a_stall() {
    let (mut controller, devices, transport) = active_controller();
    transport.emit(RemoteEvent::Message(speech(0.2)));
    controller.pump(Duration::ZERO);

    devices.set_now(5.0);
    transport.emit(RemoteEvent::Message(speech(0.2)));
    controller.pump(Duration::ZERO);

    let scheduled = devices.scheduled();
    assert_eq!(scheduled[1].1, 5.0);
    let mut previous_end = 0.0;
    for (_, start, duration) in scheduled {
        assert!(start >= previous_end);
        previous_end = start + duration;
    }
}

#[test]
fn finished_sources_leave_the_inventory() {
    let (mut controller, devices, transport) = active_controller();
    transport.emit(RemoteEvent::Message(speech(0.1)));
    controller.pump(Duration::ZERO);
    assert_eq!(controller.stats().unwrap().active_sources, 1);

    let (source, _, _) = devices.scheduled()[0];
    devices.finish(source);
    controller.pump(Duration::ZERO);
    assert_eq!(controller.stats().unwrap().active_sources, 0);
}

#[test]
fn corrupt_chunk_does_not_end_the_session() {
    let (mut controller, devices, transport) = active_controller();

    transport.emit(RemoteEvent::Message(speech(0.25)));
    transport.emit(RemoteEvent::Message(EncodedChunk::new(
        vec![1, 2, 3],
        AudioFormat::pcm16(24000),
    )));
    transport.emit(RemoteEvent::Message(speech(0.25)));
    controller.pump(Duration::ZERO);

    assert_eq!(controller.state(), LifecycleState::Active);
    let scheduled = devices.scheduled();
    assert_eq!(scheduled.len(), 2);
    assert!((scheduled[1].1 - 0.25).abs() < 1e-9);

    let stats = controller.stats().unwrap();
    assert_eq!(stats.chunks_dropped, 1);
    assert_eq!(stats.chunks_scheduled, 2);
}

#[test]
fn remote_error_tears_everything_down() {
    let (mut controller, devices, transport) = active_controller();

    transport.emit(RemoteEvent::Error("connection reset".to_string()));
    controller.pump(Duration::ZERO);

    assert_eq!(controller.state(), LifecycleState::Idle);
    assert!(devices.all_released());
    {
        let log = devices.0.borrow();
        assert_eq!(log.mics_stopped, 1);
        assert_eq!(log.inputs_closed, 1);
        assert_eq!(log.outputs_closed, 1);
    }
    assert_eq!(transport.0.borrow().closes, 1);
    assert_eq!(
        controller.last_error(),
        Some(&LiveError::TransportError("connection reset".to_string()))
    );
    assert!(matches!(controller.status(), SessionStatus::Error(_)));
}

#[test]
fn stop_discards_in_flight_callbacks() {
    let (mut controller, devices, transport) = active_controller();

    // Queued but not yet handled when stop lands
    devices.capture(&ramp(4096 * 2, 0));
    transport.emit(RemoteEvent::Message(speech(0.5)));
    controller.stop();
    assert_eq!(controller.state(), LifecycleState::Idle);

    controller.pump(Duration::ZERO);
    devices.capture(&ramp(4096, 0));
    controller.pump(Duration::ZERO);

    assert_eq!(transport.sent(), 0);
    assert!(devices.scheduled().is_empty());
    assert!(devices.all_released());
    assert_eq!(controller.status(), SessionStatus::Idle);
}

#[test]
fn second_start_is_rejected_without_side_effects() {
    let (mut controller, devices, transport) = active_controller();
    let generation = controller.generation();

    let result = controller.start(SessionConfig::default());
    assert_eq!(result, Err(LiveError::AlreadyActive));
    assert_eq!(controller.state(), LifecycleState::Active);
    assert_eq!(controller.generation(), generation);
    assert_eq!(transport.0.borrow().connects, 1);
    assert_eq!(devices.0.borrow().outputs_opened, 1);

    devices.capture(&ramp(4096, 0));
    controller.pump(Duration::ZERO);
    assert_eq!(transport.sent(), 1);
}

#[test]
fn denied_microphone_releases_partial_acquisition() {
    let (mut controller, devices, transport) = controller();
    devices.0.borrow_mut().deny_microphone = true;

    let result = controller.start(SessionConfig::default());
    assert!(matches!(result, Err(LiveError::PermissionDenied(_))));
    assert_eq!(controller.state(), LifecycleState::Idle);
    assert!(devices.all_released());
    assert_eq!(devices.0.borrow().outputs_opened, 1);
    assert_eq!(transport.0.borrow().connects, 0);
}

#[test]
fn missing_input_device_fails_start() {
    let (mut controller, devices, _transport) = controller();
    devices.0.borrow_mut().fail_input = true;

    let result = controller.start(SessionConfig::default());
    assert!(matches!(result, Err(LiveError::DeviceUnavailable(_))));
    assert!(devices.all_released());
    assert!(matches!(controller.status(), SessionStatus::Error(_)));
}

#[test]
fn refused_connection_fails_start() {
    let (mut controller, devices, transport) = controller();
    transport.0.borrow_mut().refuse = true;

    let result = controller.start(SessionConfig::default());
    assert!(matches!(result, Err(LiveError::ConnectFailed(_))));
    assert_eq!(controller.state(), LifecycleState::Idle);
    assert!(devices.all_released());
}

#[test]
fn error_before_open_is_a_connect_failure() {
    let (mut controller, devices, transport) = controller();
    controller.start(SessionConfig::default()).unwrap();

    transport.emit(RemoteEvent::Error("Connection failed: dns".to_string()));
    controller.pump(Duration::ZERO);

    assert!(matches!(
        controller.last_error(),
        Some(LiveError::ConnectFailed(_))
    ));
    assert!(devices.all_released());
}

#[test]
fn close_before_open_is_a_connect_failure() {
    let (mut controller, _devices, transport) = controller();
    controller.start(SessionConfig::default()).unwrap();

    transport.emit(RemoteEvent::Closed);
    controller.pump(Duration::ZERO);

    assert_eq!(controller.state(), LifecycleState::Idle);
    assert!(matches!(
        controller.last_error(),
        Some(LiveError::ConnectFailed(_))
    ));
}

#[test]
fn graceful_close_is_not_an_error() {
    let (mut controller, devices, transport) = active_controller();

    transport.emit(RemoteEvent::Closed);
    controller.pump(Duration::ZERO);

    assert_eq!(controller.state(), LifecycleState::Idle);
    assert_eq!(controller.status(), SessionStatus::Idle);
    assert!(controller.last_error().is_none());
    assert!(devices.all_released());
}

#[test]
fn unopened_session_times_out() {
    let (mut controller, devices, transport) = controller();
    controller.start(SessionConfig::default()).unwrap();

    controller.check_connect_timeout(Instant::now());
    assert_eq!(controller.state(), LifecycleState::Connecting);

    controller.check_connect_timeout(Instant::now() + Duration::from_secs(16));
    assert_eq!(controller.state(), LifecycleState::Idle);
    assert!(matches!(
        controller.last_error(),
        Some(LiveError::ConnectFailed(_))
    ));
    assert!(devices.all_released());
    assert_eq!(transport.0.borrow().closes, 1);

    // A late open from the abandoned session changes nothing
    transport.emit(RemoteEvent::Opened);
    controller.pump(Duration::ZERO);
    assert_eq!(controller.state(), LifecycleState::Idle);
}

#[test]
fn no_timeout_once_active() {
    let (mut controller, _devices, _transport) = active_controller();
    controller.check_connect_timeout(Instant::now() + Duration::from_secs(3600));
    assert_eq!(controller.state(), LifecycleState::Active);
}

#[test]
fn teardown_continues_past_a_failing_release() {
    let (mut controller, devices, transport) = active_controller();
    devices.0.borrow_mut().fail_output_close = true;

    controller.stop();

    let log = devices.0.borrow();
    assert_eq!(log.mics_stopped, 1);
    assert_eq!(log.inputs_closed, 1);
    assert_eq!(log.outputs_closed, 1);
    assert_eq!(transport.0.borrow().closes, 1);
    assert_eq!(controller.state(), LifecycleState::Idle);
}

#[test]
fn events_from_an_old_session_are_ignored() {
    let (mut controller, devices, transport) = active_controller();
    transport.emit(RemoteEvent::Error("boom".to_string()));
    controller.pump(Duration::ZERO);

    controller.start(SessionConfig::default()).unwrap();
    transport.emit(RemoteEvent::Opened);
    controller.pump(Duration::ZERO);
    assert_eq!(controller.state(), LifecycleState::Active);
    assert!(controller.last_error().is_none());

    transport.emit_from(0, RemoteEvent::Message(speech(0.5)));
    transport.emit_from(0, RemoteEvent::Closed);
    controller.pump(Duration::ZERO);

    assert_eq!(controller.state(), LifecycleState::Active);
    assert!(devices.scheduled().is_empty());
}

#[test]
fn status_updates_follow_the_lifecycle() {
    let (mut controller, _devices, transport) = controller();
    let updates = controller.subscribe();

    controller.start(SessionConfig::default()).unwrap();
    transport.emit(RemoteEvent::Opened);
    controller.pump(Duration::ZERO);
    controller.stop();

    let seen: Vec<SessionStatus> = updates.try_iter().collect();
    assert_eq!(
        seen,
        vec![
            SessionStatus::Connecting,
            SessionStatus::Active,
            SessionStatus::Idle
        ]
    );
}

#[test]
fn toggle_starts_and_stops() {
    let (mut controller, devices, transport) = controller();
    let config = SessionConfig {
        target_language: "Korean".to_string(),
        ..Default::default()
    };

    controller.toggle(config.clone()).unwrap();
    assert_eq!(controller.state(), LifecycleState::Connecting);
    assert_eq!(transport.0.borrow().configs[0], config);

    controller.toggle(config).unwrap();
    assert_eq!(controller.state(), LifecycleState::Idle);
    assert!(devices.all_released());
}

#[test]
fn dropping_the_controller_releases_devices() {
    let (controller, devices, transport) = active_controller();
    drop(controller);
    assert!(devices.all_released());
    assert_eq!(transport.0.borrow().closes, 1);
}

#[test]
fn unusable_settings_are_rejected_before_acquiring() {
    let (mut controller, devices, transport) = controller_with(SessionSettings {
        frame_size: 0,
        ..settings()
    });

    let result = controller.start(SessionConfig::default());
    assert!(matches!(result, Err(LiveError::Config(_))));
    assert_eq!(controller.state(), LifecycleState::Idle);
    assert_eq!(devices.0.borrow().outputs_opened, 0);
    assert_eq!(transport.0.borrow().connects, 0);
}
