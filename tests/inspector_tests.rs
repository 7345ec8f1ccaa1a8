// SPDX-License-Identifier: MPL-2.0

//! Integration tests for capture, analysis reconciliation and teardown

mod common;

use common::{Reply, bay, bay_with, counts, test_config};
use service_bay::app::{BrakeStatus, Message, VideoSourceKind};
use service_bay::backends::camera::Frame;
use service_bay::errors::{AnalysisError, AppError, CaptureError, DeviceError};
use service_bay::sensors::SensorUpdate;
use service_bay::{Config, StationId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

#[tokio::test]
async fn test_capture_without_source_is_rejected() {
    let mut bay = bay(4);
    let result = bay.inspector.update(Message::Capture(StationId::Front));
    assert!(matches!(
        result,
        Err(AppError::Capture(CaptureError::NoSourceSelected))
    ));
    assert!(bay.analyzer.submitted().is_empty());
}

#[tokio::test]
async fn test_remote_capture_before_first_frame() {
    let mut bay = bay(0);
    bay.inspector
        .update(Message::SetSource(VideoSourceKind::RemoteFeed))
        .unwrap();

    let result = bay.inspector.update(Message::Capture(StationId::Left));
    assert!(matches!(
        result,
        Err(AppError::Capture(CaptureError::NoFrameAvailable))
    ));
    assert!(!bay.inspector.state().slots[StationId::Left].busy);
    bay.inspector.shutdown();
}

#[tokio::test]
async fn test_local_cameras_bind_one_stream_per_station() {
    let mut bay = bay(4);
    bay.inspector
        .update(Message::SetSource(VideoSourceKind::LocalCamera))
        .unwrap();
    bay.inspector.settle().await;

    assert_eq!(bay.camera.opened(), 4);
    let snapshot = bay.inspector.subscribe().borrow().clone();
    assert_eq!(snapshot.devices.len(), 4);
    for (_, view) in snapshot.stations.iter() {
        assert!(view.streaming);
        assert!(view.device_error.is_none());
    }
    bay.inspector.shutdown();
}

#[tokio::test]
async fn test_missing_cameras_are_reported_per_station() {
    let mut bay = bay(0);
    bay.inspector
        .update(Message::SetSource(VideoSourceKind::LocalCamera))
        .unwrap();
    bay.inspector.settle().await;

    let snapshot = bay.inspector.subscribe().borrow().clone();
    for (_, view) in snapshot.stations.iter() {
        assert!(!view.streaming);
        assert_eq!(view.device_error, Some(DeviceError::NoDevices));
    }

    let result = bay.inspector.update(Message::Capture(StationId::Brake));
    assert!(matches!(
        result,
        Err(AppError::Capture(CaptureError::NotStreaming(StationId::Brake)))
    ));
    bay.inspector.shutdown();
}

#[tokio::test]
async fn test_fewer_cameras_than_stations_reuse_the_first() {
    let mut bay = bay(2);
    bay.inspector
        .update(Message::SetSource(VideoSourceKind::LocalCamera))
        .unwrap();
    bay.inspector.settle().await;

    // Front, Right and Brake share the first device, which is opened once
    let snapshot = bay.inspector.subscribe().borrow().clone();
    assert_eq!(bay.camera.opened(), 2);
    assert_eq!(
        snapshot.stations[StationId::Brake].device.as_ref(),
        Some(&snapshot.devices[0])
    );
    assert!(snapshot.stations.values().all(|s| s.streaming));
    bay.inspector.shutdown();
}

#[tokio::test]
async fn test_single_camera_serves_every_station() {
    let mut bay = bay(1);
    bay.inspector
        .update(Message::SetSource(VideoSourceKind::LocalCamera))
        .unwrap();
    bay.inspector.settle().await;
    assert_eq!(bay.camera.opened(), 1);

    for station in StationId::ALL {
        bay.inspector.update(Message::Capture(station)).unwrap();
    }
    bay.inspector.settle().await;
    assert_eq!(bay.analyzer.stations(), StationId::ALL.to_vec());

    // The device is released once, when the last station lets go
    bay.inspector
        .update(Message::SetSource(VideoSourceKind::None))
        .unwrap();
    assert_eq!(bay.camera.stopped(), 1);

    bay.inspector
        .update(Message::SetSource(VideoSourceKind::LocalCamera))
        .unwrap();
    bay.inspector.settle().await;
    assert_eq!(bay.camera.opened(), 2);
    let snapshot = bay.inspector.subscribe().borrow().clone();
    assert!(snapshot.stations.values().all(|s| s.streaming));
    bay.inspector.shutdown();
}

#[tokio::test]
async fn test_one_failed_device_leaves_others_streaming() {
    let mut bay = bay(4);
    bay.camera
        .fail_device(2, DeviceError::PermissionDenied("/dev/video4".into()));
    bay.inspector
        .update(Message::SetSource(VideoSourceKind::LocalCamera))
        .unwrap();
    bay.inspector.settle().await;

    let snapshot = bay.inspector.subscribe().borrow().clone();
    let right = &snapshot.stations[StationId::Right];
    assert!(!right.streaming);
    assert!(matches!(
        right.device_error,
        Some(DeviceError::PermissionDenied(_))
    ));
    for station in [StationId::Front, StationId::Left, StationId::Brake] {
        assert!(snapshot.stations[station].streaming);
        assert!(snapshot.stations[station].device_error.is_none());
    }
    assert_eq!(bay.camera.opened(), 3);

    let result = bay.inspector.update(Message::Capture(StationId::Right));
    assert!(matches!(
        result,
        Err(AppError::Capture(CaptureError::NotStreaming(StationId::Right)))
    ));
    bay.inspector.update(Message::Capture(StationId::Left)).unwrap();
    bay.inspector.settle().await;
    assert_eq!(bay.analyzer.stations(), vec![StationId::Left]);

    bay.inspector
        .update(Message::SetSource(VideoSourceKind::None))
        .unwrap();
    assert_eq!(bay.camera.stopped(), 3);
}

#[tokio::test]
async fn test_busy_device_is_reported_on_its_station() {
    let mut bay = bay(4);
    bay.camera
        .fail_device(0, DeviceError::InUse("/dev/video0".into()));
    bay.inspector
        .update(Message::SetSource(VideoSourceKind::LocalCamera))
        .unwrap();
    bay.inspector.settle().await;

    let snapshot = bay.inspector.subscribe().borrow().clone();
    assert!(matches!(
        snapshot.stations[StationId::Front].device_error,
        Some(DeviceError::InUse(_))
    ));
    assert_eq!(snapshot.stations.values().filter(|s| s.streaming).count(), 3);
    bay.inspector.shutdown();
}

#[tokio::test]
async fn test_captures_carry_session_and_persist_flag() {
    let config = Config {
        session_id: Some("svc-7".into()),
        persist_captures: false,
        ..test_config()
    };
    let mut bay = bay_with(config, 4);
    bay.inspector
        .update(Message::SetSource(VideoSourceKind::LocalCamera))
        .unwrap();
    bay.inspector.settle().await;

    bay.inspector.update(Message::Capture(StationId::Right)).unwrap();
    bay.inspector
        .update(Message::UploadImage {
            station: StationId::Brake,
            image: Frame::from(vec![0xFF, 0xD8, 0xFF, 0x01]),
        })
        .unwrap();
    bay.inspector.settle().await;

    let submitted = bay.analyzer.submitted();
    assert_eq!(submitted.len(), 2);
    for request in &submitted {
        assert_eq!(request.session_id.as_deref(), Some("svc-7"));
        assert!(!request.persist);
        assert!(request.manual);
    }
    bay.inspector.shutdown();
}

#[tokio::test]
async fn test_captures_without_session_default_to_persisting() {
    let mut bay = bay(4);
    bay.inspector
        .update(Message::SetSource(VideoSourceKind::LocalCamera))
        .unwrap();
    bay.inspector.settle().await;

    bay.inspector.update(Message::Capture(StationId::Front)).unwrap();
    bay.inspector.settle().await;

    let submitted = bay.analyzer.submitted();
    assert_eq!(submitted[0].session_id, None);
    assert!(submitted[0].persist);
    bay.inspector.shutdown();
}

#[tokio::test]
async fn test_source_switch_stops_every_stream_once() {
    let mut bay = bay(4);
    bay.inspector
        .update(Message::SetSource(VideoSourceKind::LocalCamera))
        .unwrap();
    bay.inspector.settle().await;
    assert_eq!(bay.camera.stopped(), 0);

    bay.inspector
        .update(Message::SetSource(VideoSourceKind::RemoteFeed))
        .unwrap();
    assert_eq!(bay.camera.stopped(), 4);

    bay.inspector
        .update(Message::SetSource(VideoSourceKind::None))
        .unwrap();
    bay.inspector.shutdown();
    assert_eq!(bay.camera.stopped(), 4);
}

#[tokio::test]
async fn test_setup_for_superseded_source_is_released() {
    let mut bay = bay(4);
    bay.inspector
        .update(Message::SetSource(VideoSourceKind::LocalCamera))
        .unwrap();
    // Switch away before the setup result has been applied
    bay.inspector
        .update(Message::SetSource(VideoSourceKind::None))
        .unwrap();
    bay.inspector.settle().await;

    assert_eq!(bay.camera.opened(), 4);
    assert_eq!(bay.camera.stopped(), 4);
    assert_eq!(bay.inspector.state().source.kind(), VideoSourceKind::None);
}

#[tokio::test]
async fn test_next_device_releases_old_stream() {
    let mut bay = bay(4);
    bay.inspector
        .update(Message::SetSource(VideoSourceKind::LocalCamera))
        .unwrap();
    bay.inspector.settle().await;

    bay.inspector
        .update(Message::NextDevice(StationId::Front))
        .unwrap();
    assert_eq!(bay.camera.stopped(), 1);
    bay.inspector.settle().await;

    let snapshot = bay.inspector.subscribe().borrow().clone();
    let front = &snapshot.stations[StationId::Front];
    assert!(front.streaming);
    assert_eq!(front.device.as_ref(), Some(&snapshot.devices[1]));
    // Left already holds that device, so Front shares its stream
    assert_eq!(bay.camera.opened(), 4);
    bay.inspector.shutdown();
}

#[tokio::test]
async fn test_second_capture_while_busy_is_rejected() {
    let mut bay = bay(4);
    let gate = Arc::new(Notify::new());
    bay.analyzer
        .reply(StationId::Front, Reply::Gate(gate.clone(), counts(1, 0, 0)));
    bay.inspector
        .update(Message::SetSource(VideoSourceKind::LocalCamera))
        .unwrap();
    bay.inspector.settle().await;

    bay.inspector.update(Message::Capture(StationId::Front)).unwrap();
    assert!(bay.inspector.state().slots[StationId::Front].busy);

    let second = bay.inspector.update(Message::Capture(StationId::Front));
    assert!(matches!(
        second,
        Err(AppError::Capture(CaptureError::Busy(StationId::Front)))
    ));
    assert_eq!(bay.analyzer.submitted().len(), 1);

    gate.notify_one();
    bay.inspector.settle().await;
    let slot = &bay.inspector.state().slots[StationId::Front];
    assert!(!slot.busy);
    assert_eq!(slot.result.map(|r| r.counts), Some(counts(1, 0, 0)));
    bay.inspector.shutdown();
}

#[tokio::test]
async fn test_failed_analysis_keeps_previous_result() {
    let mut bay = bay(4);
    bay.analyzer
        .reply(StationId::Front, Reply::Succeed(counts(2, 1, 0)));
    bay.inspector
        .update(Message::SetSource(VideoSourceKind::LocalCamera))
        .unwrap();
    bay.inspector.settle().await;

    bay.inspector.update(Message::Capture(StationId::Front)).unwrap();
    bay.inspector.settle().await;
    let first = bay.inspector.state().slots[StationId::Front].clone();
    let total = bay.inspector.state().bill.total;
    assert!(first.result.is_some());

    bay.analyzer
        .reply(StationId::Front, Reply::Fail(AnalysisError::Status(500)));
    bay.inspector.update(Message::Capture(StationId::Front)).unwrap();
    bay.inspector.settle().await;

    let slot = &bay.inspector.state().slots[StationId::Front];
    assert!(!slot.busy);
    assert_eq!(slot.result, first.result);
    assert_eq!(slot.after, first.after);
    assert_eq!(slot.before, first.before);
    assert_eq!(slot.last_error, Some(AnalysisError::Status(500)));
    assert_eq!(bay.inspector.state().bill.total, total);
    bay.inspector.shutdown();
}

#[tokio::test]
async fn test_reset_only_touches_its_station() {
    let mut bay = bay(4);
    bay.analyzer
        .reply(StationId::Front, Reply::Succeed(counts(1, 0, 0)));
    bay.analyzer
        .reply(StationId::Left, Reply::Succeed(counts(0, 1, 0)));
    bay.inspector
        .update(Message::SetSource(VideoSourceKind::LocalCamera))
        .unwrap();
    bay.inspector.settle().await;

    bay.inspector.update(Message::Capture(StationId::Front)).unwrap();
    bay.inspector.update(Message::Capture(StationId::Left)).unwrap();
    bay.inspector.settle().await;
    assert_eq!(bay.inspector.state().bill.total, 300.0 + 500.0 + 500.0);

    bay.inspector.update(Message::Reset(StationId::Front)).unwrap();
    let state = bay.inspector.state();
    assert_eq!(state.slots[StationId::Front], Default::default());
    assert_eq!(
        state.slots[StationId::Left].result.map(|r| r.counts),
        Some(counts(0, 1, 0))
    );
    assert_eq!(state.bill.total, 500.0 + 500.0);
    bay.inspector.shutdown();
}

#[tokio::test]
async fn test_reset_discards_pending_analysis() {
    let mut bay = bay(4);
    let gate = Arc::new(Notify::new());
    bay.analyzer
        .reply(StationId::Right, Reply::Gate(gate.clone(), counts(3, 0, 0)));
    bay.inspector
        .update(Message::SetSource(VideoSourceKind::LocalCamera))
        .unwrap();
    bay.inspector.settle().await;

    bay.inspector.update(Message::Capture(StationId::Right)).unwrap();
    bay.inspector.update(Message::Reset(StationId::Right)).unwrap();
    gate.notify_one();
    bay.inspector.settle().await;

    assert_eq!(bay.inspector.in_flight_count(), 0);
    assert_eq!(
        bay.inspector.state().slots[StationId::Right],
        Default::default()
    );
    bay.inspector.shutdown();
}

#[tokio::test]
async fn test_completions_out_of_order() {
    let mut bay = bay(4);
    let gate = Arc::new(Notify::new());
    bay.analyzer
        .reply(StationId::Front, Reply::Gate(gate.clone(), counts(1, 0, 0)));
    bay.analyzer
        .reply(StationId::Left, Reply::Succeed(counts(0, 2, 0)));
    bay.inspector
        .update(Message::SetSource(VideoSourceKind::LocalCamera))
        .unwrap();
    bay.inspector.settle().await;

    bay.inspector.update(Message::Capture(StationId::Front)).unwrap();
    bay.inspector.update(Message::Capture(StationId::Left)).unwrap();

    while bay.inspector.state().slots[StationId::Left].busy {
        bay.inspector.next_message().await.unwrap().unwrap();
    }
    let state = bay.inspector.state();
    assert!(state.slots[StationId::Front].busy);
    assert!(state.slots[StationId::Front].result.is_none());
    assert_eq!(
        state.slots[StationId::Left].result.map(|r| r.counts),
        Some(counts(0, 2, 0))
    );

    gate.notify_one();
    bay.inspector.settle().await;
    let state = bay.inspector.state();
    assert_eq!(
        state.slots[StationId::Front].result.map(|r| r.counts),
        Some(counts(1, 0, 0))
    );
    assert_eq!(
        state.slots[StationId::Left].result.map(|r| r.counts),
        Some(counts(0, 2, 0))
    );
    bay.inspector.shutdown();
}

#[tokio::test]
async fn test_brake_status_follows_defects() {
    let mut bay = bay(0);
    bay.analyzer
        .reply(StationId::Brake, Reply::Succeed(counts(0, 0, 1)));

    bay.inspector
        .update(Message::UploadImage {
            station: StationId::Brake,
            image: Frame::from(vec![1u8, 2, 3]),
        })
        .unwrap();
    bay.inspector.settle().await;

    let result = bay.inspector.state().slots[StationId::Brake].result.unwrap();
    assert_eq!(result.brake_status, Some(BrakeStatus::Bad));
    // Cracks are not billed
    assert_eq!(bay.inspector.state().bill.total, 500.0);
}

#[tokio::test]
async fn test_upload_works_without_source() {
    let mut bay = bay(0);
    let image = Frame::from(vec![9u8, 9, 9]);
    bay.inspector
        .update(Message::UploadImage {
            station: StationId::Front,
            image: image.clone(),
        })
        .unwrap();
    bay.inspector.settle().await;

    let submitted = bay.analyzer.submitted();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].image, image);
    assert!(submitted[0].manual);
    assert_eq!(
        bay.inspector.state().slots[StationId::Front].before,
        Some(image)
    );
}

#[tokio::test]
async fn test_upload_rejects_empty_image() {
    let mut bay = bay(0);
    let result = bay.inspector.update(Message::UploadImage {
        station: StationId::Front,
        image: Frame::from(Vec::new()),
    });
    assert!(result.is_err());
    assert!(bay.analyzer.submitted().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_slow_analysis_times_out() {
    let config = Config {
        analysis_timeout_secs: 1,
        ..test_config()
    };
    let mut bay = bay_with(config, 0);
    bay.analyzer.reply(
        StationId::Left,
        Reply::Delay(Duration::from_secs(5), counts(1, 1, 1)),
    );

    bay.inspector
        .update(Message::UploadImage {
            station: StationId::Left,
            image: Frame::from(vec![1u8]),
        })
        .unwrap();
    bay.inspector.settle().await;

    let slot = &bay.inspector.state().slots[StationId::Left];
    assert!(!slot.busy);
    assert!(slot.result.is_none());
    assert!(matches!(slot.last_error, Some(AnalysisError::Timeout(_))));
}

#[tokio::test]
async fn test_documented_bill_example() {
    let mut bay = bay(0);
    bay.analyzer
        .reply(StationId::Front, Reply::Succeed(counts(2, 1, 0)));
    bay.analyzer
        .reply(StationId::Left, Reply::Succeed(counts(0, 0, 0)));
    bay.analyzer
        .reply(StationId::Right, Reply::Succeed(counts(1, 0, 0)));
    bay.analyzer
        .reply(StationId::Brake, Reply::Succeed(counts(0, 0, 0)));

    for station in StationId::ALL {
        bay.inspector
            .update(Message::UploadImage {
                station,
                image: Frame::from(vec![1u8, 2]),
            })
            .unwrap();
    }
    bay.inspector.settle().await;
    bay.inspector
        .update(Message::ApplySensorUpdate(SensorUpdate {
            brake_wear_rate: Some(45.5),
            ..Default::default()
        }))
        .unwrap();

    assert!((bay.inspector.state().bill.total - 2810.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_rejections_are_published_as_notice() {
    let bay = bay(0);
    let handle = bay.inspector.handle();
    let mut snapshots = bay.inspector.subscribe();
    let shutdown = tokio_util::sync::CancellationToken::new();
    let task = tokio::spawn(bay.inspector.run(shutdown.clone()));

    assert!(handle.send(Message::Capture(StationId::Front)));
    snapshots.changed().await.unwrap();
    let notice = snapshots.borrow_and_update().notice.clone();
    assert_eq!(
        notice,
        Some(AppError::Capture(CaptureError::NoSourceSelected).to_string())
    );

    shutdown.cancel();
    task.await.unwrap();
}
