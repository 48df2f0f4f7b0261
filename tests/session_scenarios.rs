mod common;

use std::thread;
use std::time::{Duration, Instant};

use common::{inertial, stereo, ScriptedPipeline};
use vio_stream::ingest::{ScriptedSource, StopCounter};
use vio_stream::{
    open_device, Calibration, DeviceConfig, DeviceHandle, DeviceMode, ExitReason, FeatureOptions,
    FeaturePipeline, PipelineMode, Polled, PoseLog, Sample, SessionBuilder, SessionOptions,
    StopReason, StopToken,
};

fn scripted_device(script: Vec<Polled>, stops: &StopCounter) -> DeviceHandle {
    let source = ScriptedSource::new(script).with_stop_counter(stops.clone());
    DeviceHandle::new(Box::new(source), DeviceMode::Raw)
}

fn ready(samples: Vec<Sample>) -> Vec<Polled> {
    samples.into_iter().map(Polled::Ready).collect()
}

fn small_calibration() -> Calibration {
    Calibration {
        fx: 40.0,
        fy: 40.0,
        cx: 16.0,
        cy: 12.0,
        baseline: 0.1,
        width: 32,
        height: 24,
    }
}

fn wait_for(mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting for session");
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn raw_feature_mode_updates_once_per_stereo_sample() {
    let stops = StopCounter::default();
    let script = ready(vec![inertial(1), stereo(2), inertial(3), stereo(4)]);
    let pipeline = FeaturePipeline::with_calibration(small_calibration(), FeatureOptions::default());
    let token = StopToken::new();
    let session = SessionBuilder::new(scripted_device(script, &stops), Box::new(pipeline))
        .stop_token(token.clone())
        .start()
        .expect("start session");
    let snapshot = session.snapshot();

    let runner = thread::spawn(move || session.run());
    wait_for(|| snapshot.update_count() == 2);
    // Script is drained; further polls only see NotReady.
    thread::sleep(Duration::from_millis(20));
    token.request(StopReason::User);
    let report = runner.join().expect("session thread");

    assert_eq!(report.exit, ExitReason::UserStop);
    assert_eq!(report.exit.exit_code(), 0);
    assert_eq!(report.stats.stereo_updates, 2);
    assert_eq!(report.stats.inertial_samples, 2);
    assert_eq!(report.stats.discarded, 2);
    assert_eq!(snapshot.update_count(), 2);
    assert_eq!(snapshot.latest().timestamp, Some(4));
    assert!(snapshot.latest().features.is_some());
    assert_eq!(stops.count(), 1);
}

#[test]
fn pipeline_failure_on_fifth_update_keeps_four_records() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log_path = dir.path().join("poses.txt");
    let stops = StopCounter::default();
    let script = ready((1..=8).map(|i| stereo(i * 10)).collect());
    let pipeline = ScriptedPipeline::new(PipelineMode::Features).failing_at(5);

    let report = SessionBuilder::new(scripted_device(script, &stops), Box::new(pipeline))
        .pose_log(PoseLog::open(&log_path).expect("open pose log"))
        .start()
        .expect("start session")
        .run();

    assert!(matches!(report.exit, ExitReason::PipelineFailed(_)));
    assert_ne!(report.exit.exit_code(), 0);
    assert_eq!(report.stats.stereo_updates, 4);
    assert!(report.device_stopped);
    assert_eq!(stops.count(), 1);

    let contents = std::fs::read_to_string(&log_path).expect("read pose log");
    let stamps: Vec<&str> = contents
        .lines()
        .filter_map(|l| l.split_whitespace().next())
        .collect();
    assert_eq!(stamps, vec!["10", "20", "30", "40"]);
    assert!(contents.lines().all(|l| l.split_whitespace().count() == 8));
}

#[test]
fn read_misses_are_retried_until_a_sample_arrives() {
    let stops = StopCounter::default();
    let mut script: Vec<Polled> = (0..100).map(|_| Polled::NotReady).collect();
    script.push(Polled::Ready(stereo(7)));

    let report = SessionBuilder::new(
        scripted_device(script, &stops),
        Box::new(ScriptedPipeline::new(PipelineMode::Features)),
    )
    .options(SessionOptions {
        stop_after_updates: Some(1),
        ..SessionOptions::default()
    })
    .start()
    .expect("start session")
    .run();

    assert_eq!(report.exit, ExitReason::UserStop);
    assert_eq!(report.stats.not_ready, 100);
    assert_eq!(report.stats.polls, 101);
    assert_eq!(report.stats.stereo_updates, 1);
    assert_eq!(stops.count(), 1);
}

#[test]
fn cooperative_stop_and_interrupt_converge_on_one_device_stop() {
    for round in 0..20 {
        let stops = StopCounter::default();
        let token = StopToken::new();
        let session = SessionBuilder::new(
            scripted_device(Vec::new(), &stops),
            Box::new(ScriptedPipeline::new(PipelineMode::Slam)),
        )
        .stop_token(token.clone())
        .start()
        .expect("start session");
        let runner = thread::spawn(move || session.run());

        let requesters: Vec<_> = [StopReason::User, StopReason::Interrupt]
            .into_iter()
            .map(|reason| {
                let token = token.clone();
                thread::spawn(move || token.request(reason))
            })
            .collect();
        let winners = requesters
            .into_iter()
            .map(|h| h.join().expect("requester"))
            .filter(|won| *won)
            .count();
        let report = runner.join().expect("session thread");

        assert_eq!(winners, 1, "round {round}");
        let expected = match token.reason() {
            Some(StopReason::User) => ExitReason::UserStop,
            Some(StopReason::Interrupt) => ExitReason::Interrupted,
            None => panic!("no stop recorded"),
        };
        assert_eq!(report.exit, expected);
        assert!(report.device_stopped);
        assert_eq!(stops.count(), 1, "round {round}");
    }
}

#[test]
fn snapshot_readers_see_whole_update_cycles() {
    let stops = StopCounter::default();
    let script = ready((1..=2000).map(stereo).collect());
    let session = SessionBuilder::new(
        scripted_device(script, &stops),
        Box::new(ScriptedPipeline::new(PipelineMode::Features)),
    )
    .options(SessionOptions {
        stop_after_updates: Some(2000),
        ..SessionOptions::default()
    })
    .start()
    .expect("start session");
    let snapshot = session.snapshot();

    let reader = thread::spawn(move || {
        let mut last = 0;
        let mut reads = 0u64;
        while last < 2000 {
            let snap = snapshot.latest();
            assert!(snap.update_count >= last, "update count went backwards");
            if let Some(pose) = snap.pose {
                // Pose, timestamp and count come from the same update.
                assert_eq!(Some(pose.timestamp), snap.timestamp);
                assert_eq!(pose.timestamp, snap.update_count);
                assert_eq!(pose.translation.x, snap.update_count as f64);
            }
            last = snap.update_count;
            reads += 1;
        }
        reads
    });

    let report = session.run();
    let reads = reader.join().expect("reader thread");
    assert_eq!(report.stats.stereo_updates, 2000);
    assert!(reads > 0);
}

#[test]
fn synthetic_device_runs_feature_pipeline_end_to_end() {
    let config = DeviceConfig {
        width: 32,
        height: 24,
        realtime: false,
        ..DeviceConfig::default()
    };
    let device = open_device(&config).expect("open synthetic device");
    let pipeline = FeaturePipeline::with_calibration(small_calibration(), FeatureOptions::default());

    let session = SessionBuilder::new(device, Box::new(pipeline))
        .options(SessionOptions {
            stop_after_updates: Some(10),
            ..SessionOptions::default()
        })
        .start()
        .expect("start session");
    let snapshot = session.snapshot();
    let report = session.run();

    assert_eq!(report.exit, ExitReason::UserStop);
    assert_eq!(report.stats.stereo_updates, 10);
    // Feature mode never consumes IMU readings.
    assert_eq!(report.stats.inertial_updates, 0);
    assert_eq!(report.stats.discarded, report.stats.inertial_samples);
    assert!(report.stats.inertial_samples > 0);
    let features = snapshot.latest().features.expect("features published");
    assert!(features.stereo.is_some());
}

#[test]
fn missing_device_is_a_startup_error() {
    let stops = StopCounter::default();
    let source = ScriptedSource::new(Vec::new())
        .with_stop_counter(stops.clone())
        .failing_start();
    let device = DeviceHandle::new(Box::new(source), DeviceMode::Raw);
    let result = SessionBuilder::new(
        device,
        Box::new(ScriptedPipeline::new(PipelineMode::Slam)),
    )
    .start();

    match result {
        Err(err) => {
            assert!(matches!(err, vio_stream::StartupError::Device(_)));
            assert!(err.to_string().contains("device error"));
        }
        Ok(_) => panic!("start should fail without a device"),
    }
    assert_eq!(stops.count(), 0);
}
