//! Integration tests for the per-channel command queue: FIFO ordering,
//! cancellation, validation, fault handling, and the garbled-reply
//! retry, all over the mock transport.

use sinterkit_communication::{
    Command, MockTransport, Motor, MotorController, MotorControllerState, MoveProgram,
};
use sinterkit_core::config::{MotionSettings, MotorSettings};
use sinterkit_core::error::ControlError;
use sinterkit_core::types::ControllerRole;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn fast_motion() -> MotionSettings {
    MotionSettings {
        reply_timeout_ms: 2_000,
        poll_interval_ms: 2,
        max_poll_attempts: 100,
        ..MotionSettings::default()
    }
}

fn test_motor(axis: u8, name: &str) -> Motor {
    Motor::from_settings(&MotorSettings {
        name: name.to_string(),
        port: "mock".to_string(),
        axis,
        role: ControllerRole::Build,
        min_position: -100.0,
        max_position: 100.0,
        home_position: 0.0,
        velocity: 1.0,
    })
}

fn two_axis_controller(mock: &Arc<MockTransport>) -> MotorController {
    MotorController::new(
        "bench",
        Arc::clone(mock) as Arc<dyn sinterkit_communication::Transport>,
        vec![test_motor(1, "z1"), test_motor(2, "z2")],
        fast_motion(),
    )
}

/// Answer status polls with "stage stopped" and leave everything else
/// unanswered.
fn answer_status_polls(mock: &MockTransport) {
    mock.set_responder(|line| line.ends_with("STA?").then(|| "8".to_string()));
}

async fn wait_for_write(mock: &MockTransport, line: &str) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !mock.writes().iter().any(|w| w == line) {
        assert!(Instant::now() < deadline, "never saw {:?} on the wire", line);
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn commands_drain_in_fifo_order_across_axes() {
    let mock = MockTransport::new("bench");
    mock.set_responder(|line| {
        if line.ends_with("STA?") {
            Some("8".to_string())
        } else if line.ends_with("POS?") {
            Some("#10.5".to_string())
        } else {
            None
        }
    });
    let controller = two_axis_controller(&mock);

    let handles = vec![
        controller.enqueue(Command::move_absolute(1, 10.0)),
        controller.enqueue(Command::move_relative(2, 5.0)),
        controller.enqueue(Command::query_position(1)),
        controller.enqueue(Command::move_absolute(2, 15.0)),
        controller.enqueue(Command::move_absolute(1, 20.0)),
    ];
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(
        mock.commands(),
        vec!["1MVA10", "2MVR5", "1POS?", "2MVA15", "1MVA20"]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_enqueues_stay_serialized_and_fifo_per_caller() {
    let mock = MockTransport::new("bench");
    answer_status_polls(&mock);
    let controller = Arc::new(two_axis_controller(&mock));

    // every task enqueues its axis-1 move strictly before its axis-2
    // move; the barrier maximizes contention on the queue
    let barrier = Arc::new(tokio::sync::Barrier::new(8));
    let tasks: Vec<_> = (0..8u32)
        .map(|i| {
            let controller = Arc::clone(&controller);
            let barrier = Arc::clone(&barrier);
            tokio::spawn(async move {
                barrier.wait().await;
                let target = 10.0 + f64::from(i);
                let first = controller.enqueue(Command::move_absolute(1, target));
                let second = controller.enqueue(Command::move_absolute(2, target));
                (first.await, second.await)
            })
        })
        .collect();
    for task in tasks {
        let (first, second) = task.await.unwrap();
        first.unwrap().unwrap();
        second.unwrap().unwrap();
    }

    // every command reached the wire exactly once, and each caller's
    // relative order survived the contention
    let commands = mock.commands();
    assert_eq!(commands.len(), 16);
    for i in 0..8u32 {
        let axis1 = format!("1MVA{}", 10 + i);
        let axis2 = format!("2MVA{}", 10 + i);
        let first = commands.iter().position(|c| *c == axis1).unwrap();
        let second = commands.iter().position(|c| *c == axis2).unwrap();
        assert_eq!(commands.iter().filter(|c| **c == axis1).count(), 1);
        assert_eq!(commands.iter().filter(|c| **c == axis2).count(), 1);
        assert!(first < second, "{} drained after {}", axis1, axis2);
    }
    assert_eq!(controller.queued(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn exhausted_stop_polling_times_out() {
    let mock = MockTransport::new("bench");
    // the stage reports moving forever
    mock.set_responder(|line| line.ends_with("STA?").then(|| "32".to_string()));
    let controller = MotorController::new(
        "bench",
        Arc::clone(&mock) as Arc<dyn sinterkit_communication::Transport>,
        vec![test_motor(1, "z1")],
        MotionSettings {
            reply_timeout_ms: 200,
            poll_interval_ms: 2,
            max_poll_attempts: 5,
            ..MotionSettings::default()
        },
    );

    let err = controller.move_absolute(1, 5.0).await.unwrap_err();
    assert!(err.is_timeout());
    assert!(matches!(
        err,
        sinterkit_core::Error::Control(ControlError::StopTimeout { attempts: 5, .. })
    ));
    // the attempt budget was honored exactly
    assert_eq!(mock.writes().iter().filter(|w| *w == "1STA?").count(), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_all_discards_queued_commands_and_bypasses_the_queue() {
    let mock = MockTransport::new("bench");
    // status polls are answered, the position query is left hanging so
    // the drain worker is pinned on the third command
    answer_status_polls(&mock);
    let controller = two_axis_controller(&mock);

    let h1 = controller.enqueue(Command::move_absolute(1, 10.0));
    let h2 = controller.enqueue(Command::move_relative(2, 5.0));
    let h3 = controller.enqueue(Command::query_position(1));
    let h4 = controller.enqueue(Command::move_absolute(2, 15.0));
    let h5 = controller.enqueue(Command::move_absolute(1, 20.0));

    wait_for_write(&mock, "1POS?").await;
    controller.stop_all().await.unwrap();
    mock.push_reply("#10.5");

    h1.await.unwrap().unwrap();
    h2.await.unwrap().unwrap();
    h3.await.unwrap().unwrap();
    assert!(h4.await.unwrap().unwrap_err().is_cancelled());
    assert!(h5.await.unwrap().unwrap_err().is_cancelled());

    // the fourth and fifth commands never reached the wire
    assert_eq!(mock.commands(), vec!["1MVA10", "2MVR5", "1POS?", "0STP"]);
    assert_eq!(controller.state(), MotorControllerState::Cancelled);

    // cancelled is sticky until re-armed
    assert!(controller
        .submit(Command::query_status(1))
        .await
        .unwrap_err()
        .is_cancelled());
    controller.rearm();
    assert_eq!(controller.state(), MotorControllerState::Idle);
    mock.push_reply("8");
    controller.status(1).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rejected_moves_produce_zero_wire_bytes() {
    let mock = MockTransport::new("bench");
    answer_status_polls(&mock);
    let motor = Motor::from_settings(&MotorSettings {
        name: "build".to_string(),
        port: "mock".to_string(),
        axis: 1,
        role: ControllerRole::Build,
        min_position: 0.0,
        max_position: 50.0,
        home_position: 0.0,
        velocity: 1.0,
    });
    let controller = MotorController::new(
        "bench",
        Arc::clone(&mock) as Arc<dyn sinterkit_communication::Transport>,
        vec![motor],
        fast_motion(),
    );

    controller.home(1).await.unwrap();
    let writes_after_home = mock.writes().len();

    let err = controller.move_absolute(1, -5.0).await.unwrap_err();
    assert!(err.is_validation_error());
    assert_eq!(mock.writes().len(), writes_after_home);
    assert!(!mock.writes().iter().any(|w| w.contains("MVA-5")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn latched_fault_fails_the_move_and_stops_all_axes() {
    let mock = MockTransport::new("bench");
    mock.set_responder(|line| {
        if line.ends_with("STA?") {
            // stopped with the fault bit set
            Some("136".to_string())
        } else if line.ends_with("ERR?") {
            Some("#Error 37 - MVA - Move outside soft limits".to_string())
        } else {
            None
        }
    });
    let controller = two_axis_controller(&mock);

    let err = controller.move_absolute(1, 5.0).await.unwrap_err();
    assert!(err.is_hardware_fault());
    assert!(err.to_string().contains("fault 37"));
    assert!(mock.writes().iter().any(|w| w == "0STP"));
    assert_eq!(controller.state(), MotorControllerState::Cancelled);

    controller.rearm();
    assert_eq!(controller.state(), MotorControllerState::Idle);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn garbled_reply_is_retried_once() {
    let mock = MockTransport::new("bench");
    mock.push_reply("@@garbage@@");
    mock.push_reply("#5.25");
    let controller = two_axis_controller(&mock);

    let position = controller.position(1).await.unwrap();
    assert_eq!(position, 5.25);
    assert_eq!(mock.writes(), vec!["1POS?", "1POS?"]);
    assert_eq!(controller.cached_position(1).unwrap(), 5.25);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn second_garbled_reply_escalates_to_a_transport_error() {
    let mock = MockTransport::new("bench");
    mock.push_reply("@@garbage@@");
    mock.push_reply("!!also garbage!!");
    let controller = two_axis_controller(&mock);

    let err = controller.position(1).await.unwrap_err();
    assert!(matches!(err, sinterkit_core::Error::Transport(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn moves_update_the_cached_position() {
    let mock = MockTransport::new("bench");
    answer_status_polls(&mock);
    let controller = two_axis_controller(&mock);

    controller.move_absolute(1, 12.5).await.unwrap();
    assert_eq!(controller.cached_position(1).unwrap(), 12.5);
    controller.move_relative(1, -2.5).await.unwrap();
    assert_eq!(controller.cached_position(1).unwrap(), 10.0);
    // the other axis is untouched
    assert_eq!(controller.cached_position(2).unwrap(), 0.0);

    // a broadcast relative move shifts every axis from its own cache
    controller.move_all_relative(1.5).await.unwrap();
    assert_eq!(controller.cached_position(1).unwrap(), 11.5);
    assert_eq!(controller.cached_position(2).unwrap(), 1.5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn multi_axis_failures_are_aggregated() {
    let mock = MockTransport::new("bench");
    answer_status_polls(&mock);
    // axis 2 has a tighter envelope than axis 1
    let mut narrow = test_motor(2, "z2");
    narrow.max_position = 10.0;
    let controller = MotorController::new(
        "bench",
        Arc::clone(&mock) as Arc<dyn sinterkit_communication::Transport>,
        vec![test_motor(1, "z1"), narrow],
        fast_motion(),
    );

    let err = controller.move_all_absolute(20.0).await.unwrap_err();
    match err {
        sinterkit_core::Error::MultiAxis { attempted, failures } => {
            assert_eq!(attempted, 2);
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].0, 2);
            assert!(failures[0].1.is_validation_error());
        }
        other => panic!("expected MultiAxis, got {:?}", other),
    }
    // axis 1 was still attempted and completed
    assert!(mock.commands().iter().any(|w| w == "1MVA20"));
    assert!(!mock.commands().iter().any(|w| w == "2MVA20"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn program_recording_reaches_the_wire_verbatim() {
    let mock = MockTransport::new("bench");
    answer_status_polls(&mock);
    let controller = two_axis_controller(&mock);

    let mut program = MoveProgram::new(1, 3);
    program.push(Command::move_absolute(1, 10.0)).unwrap();
    program.push(Command::move_relative(1, -2.5)).unwrap();
    controller.record_program(&program).await.unwrap();

    // the transcript lands untouched: no status polling sneaks in
    // between PGM and END
    assert_eq!(
        mock.writes(),
        vec!["1PGM3", "1MVA10", "1WST", "1MVR-2.5", "1WST", "1END"]
    );

    // replay waits for the stage to stop like any other move
    controller.execute_program(&program).await.unwrap();
    assert!(mock.writes().iter().any(|w| w == "1EXC3"));
    assert!(mock.writes().iter().any(|w| w == "1STA?"));

    controller.erase_program(&program).await.unwrap();
    assert!(mock.writes().iter().any(|w| w == "1ERA3"));

    // an empty program is rejected before anything hits the wire
    let empty = MoveProgram::new(1, 4);
    assert!(controller.record_program(&empty).await.is_err());
    assert!(!mock.writes().iter().any(|w| w == "1PGM4"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_axis_is_rejected_host_side() {
    let mock = MockTransport::new("bench");
    let controller = two_axis_controller(&mock);
    let err = controller.move_absolute(7, 1.0).await.unwrap_err();
    assert!(err.is_validation_error());
    assert!(mock.writes().is_empty());
}
