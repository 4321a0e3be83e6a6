//! End-to-end poll loop scenarios against in-memory games and a recording
//! transport.

use std::sync::Arc;
use std::time::{Duration, Instant};

use adaptive_trigger_dsx_protocol::{
    AudioEditKind, ControllerInstruction, InstructionBatch, RecordingTransport, Trigger,
    TriggerMode,
};
use adaptive_trigger_feedback_mapping::FeedbackConfig;
use adaptive_trigger_service::{
    LatestFrameSlot, Supervisor, SupervisorState, TimingConfig, run_poll_cycle,
};
use adaptive_trigger_telemetry_adapters::mock::{
    MockProcess, MockProcessAttacher, MockProcessProbe, MockSharedMemory,
};
use adaptive_trigger_telemetry_adapters::{
    ProcessMemorySource, SharedMemorySource, assetto_corsa, rbr,
};
use adaptive_trigger_watchdog::{CycleExit, PollWatchdog, StopFlag, WatchdogConfig};

type TestResult = Result<(), Box<dyn std::error::Error>>;

const TICK: Duration = Duration::from_millis(10);

const MODULE_BASE: u64 = 0x0040_0000;
const CAR_INFO_AT: u32 = 0x1000_0000;
const CONTROL_AT: u32 = 0x1100_0000;
const MOVEMENT_AT: u32 = 0x1200_0000;
const WHEELS_AT: u32 = 0x1300_0000;
const WHEEL_LINK: u64 = 0x1500_0000 + 64;

/// RBR at 36 km/h, braking hard with locked fronts.
fn rbr_process() -> MockProcess {
    let p = MockProcess::new(rbr::PROCESS_NAME, 4242, MODULE_BASE);
    p.write_u32(23_460_968, CAR_INFO_AT);
    p.write_u32(8_301_640, CONTROL_AT);
    p.write_u32(9_369_184, MOVEMENT_AT);
    p.write_u32(MODULE_BASE + 4_796_472, 0x1400_0000);
    p.write_u32(0x1400_0000 + 1032, 0x1500_0000);
    p.write_u32(WHEEL_LINK, WHEELS_AT);

    let control = u64::from(CONTROL_AT);
    let car_info = u64::from(CAR_INFO_AT);
    p.write(control + 1832, &[1]);
    p.write_f32(car_info + 16, 4500.0);
    p.write_f32(car_info + 20, 90.0);
    p.write_f32(car_info + 0x140, 42.0);
    p.write_i32(car_info + 0x170, 3);
    // steering, throttle, brake, handbrake, clutch
    for (offset, value) in [(92u64, 0.0f32), (96, 0.0), (100, 0.9), (104, 0.0), (108, 0.0)] {
        p.write_f32(control + 1848 + offset, value);
    }
    for (offset, velocity) in [(448u64, 10.0f32), (452, 0.0), (456, 0.0)] {
        p.write_f32(u64::from(MOVEMENT_AT) + offset, velocity);
    }
    for (offset, speed) in [(988u64, 5.0f32), (1676, 5.0), (2364, 10.0), (3052, 10.0)] {
        p.write_f32(u64::from(WHEELS_AT) + offset, speed);
    }
    p
}

fn put(buf: &mut [u8], offset: usize, bytes: [u8; 4]) {
    if let Some(slot) = buf.get_mut(offset..offset + 4) {
        slot.copy_from_slice(&bytes);
    }
}

/// AC at 60 km/h with the rear wheels spinning at 90 km/h.
fn ac_physics(packet_id: i32) -> Vec<u8> {
    let mut buf = vec![0u8; assetto_corsa::PHYSICS_SIZE];
    put(&mut buf, assetto_corsa::PACKET_ID.offset, packet_id.to_le_bytes());
    put(&mut buf, assetto_corsa::GAS.offset, 0.9f32.to_le_bytes());
    put(&mut buf, assetto_corsa::GEAR.offset, 3i32.to_le_bytes());
    put(&mut buf, assetto_corsa::RPMS.offset, 5000i32.to_le_bytes());
    put(&mut buf, assetto_corsa::SPEED_KMH.offset, 60.0f32.to_le_bytes());
    for (i, kmh) in [60.0f32, 60.0, 90.0, 90.0].into_iter().enumerate() {
        let omega = kmh / 3.6 / assetto_corsa::DEFAULT_TYRE_RADIUS_M;
        put(
            &mut buf,
            assetto_corsa::WHEEL_ANGULAR_SPEED.offset + i * 4,
            omega.to_le_bytes(),
        );
    }
    buf
}

fn is_force_stop(batch: &InstructionBatch) -> bool {
    let [stop, left, right, led] = batch.instructions() else {
        return false;
    };
    matches!(
        stop,
        ControllerInstruction::EditAudio {
            kind: AudioEditKind::Stop,
            ..
        }
    ) && matches!(
        left,
        ControllerInstruction::TriggerUpdate {
            trigger: Trigger::Left,
            mode: TriggerMode::Normal,
            strength: 1,
            ..
        }
    ) && matches!(
        right,
        ControllerInstruction::TriggerUpdate {
            trigger: Trigger::Right,
            mode: TriggerMode::Normal,
            strength: 1,
            ..
        }
    ) && matches!(
        led,
        ControllerInstruction::RgbUpdate {
            red: 0,
            green: 0,
            blue: 0,
            ..
        }
    )
}

fn led_colors(batches: &[InstructionBatch]) -> Vec<(u8, u8, u8)> {
    batches
        .iter()
        .flat_map(InstructionBatch::iter)
        .filter_map(|instruction| match instruction {
            ControllerInstruction::RgbUpdate {
                red, green, blue, ..
            } => Some((*red, *green, *blue)),
            _ => None,
        })
        .collect()
}

async fn drive_to_polling<T: adaptive_trigger_dsx_protocol::ControllerTransport>(
    supervisor: &mut Supervisor<T>,
    now: Instant,
) -> TestResult {
    supervisor.tick(now).await;
    supervisor.tick(now).await;
    if supervisor.state() == SupervisorState::Polling {
        Ok(())
    } else {
        Err(format!("expected Polling, got {}", supervisor.state()).into())
    }
}

#[tokio::test]
async fn broken_pointer_chain_is_a_soft_miss_while_game_runs() -> TestResult {
    let process = rbr_process();
    let source = ProcessMemorySource::new(
        rbr::layout(),
        MockProcessAttacher::new(process.clone()),
        MockProcessProbe::new(true),
    );
    let transport = RecordingTransport::new();
    let slot = Arc::new(LatestFrameSlot::new());
    let mut supervisor = Supervisor::new(
        Box::new(source),
        transport.clone(),
        TimingConfig::default(),
        FeedbackConfig::default(),
    )
    .with_frame_slot(Arc::clone(&slot));

    let start = Instant::now();
    drive_to_polling(&mut supervisor, start).await?;

    // One good frame: front lock under braking engages the left trigger.
    supervisor.tick(start).await;
    let batch = transport.last().ok_or("expected a feedback batch")?;
    let left = batch.triggers_for(Trigger::Left).next().ok_or("left trigger")?;
    assert!(matches!(
        left,
        ControllerInstruction::TriggerUpdate {
            mode: TriggerMode::VibrateTriggerPulse,
            ..
        }
    ));
    assert!(slot.take_latest().is_some());
    transport.take();

    // Wheel chain goes null mid-session.
    process.write_u32(WHEEL_LINK, 0);
    let mut now = start;
    for _ in 0..3 {
        now += TICK;
        supervisor.tick(now).await;
        assert_eq!(supervisor.state(), SupervisorState::Polling);
    }
    assert_eq!(supervisor.consecutive_misses(), 3);
    assert_eq!(supervisor.stats().frames, 1);
    assert_eq!(supervisor.stats().reconnects, 0);
    assert!(!supervisor.is_force_stopped());
    assert!(transport.is_empty());
    assert!(slot.take_latest().is_none());

    // Chain restored: frames flow again on the same connection.
    process.write_u32(WHEEL_LINK, WHEELS_AT);
    supervisor.tick(now + TICK).await;
    assert_eq!(supervisor.stats().frames, 2);
    assert_eq!(supervisor.consecutive_misses(), 0);
    assert_eq!(transport.len(), 1);
    Ok(())
}

#[tokio::test]
async fn telemetry_timeout_force_stops_exactly_once() -> TestResult {
    let shm = MockSharedMemory::new();
    shm.publish(assetto_corsa::PHYSICS_SEGMENT, ac_physics(1));
    let source = SharedMemorySource::new(
        assetto_corsa::layout(),
        shm.clone(),
        MockProcessProbe::new(true),
    );
    let transport = RecordingTransport::new();
    let mut supervisor = Supervisor::new(
        Box::new(source),
        transport.clone(),
        TimingConfig::default(),
        FeedbackConfig::default(),
    );

    let start = Instant::now();
    drive_to_polling(&mut supervisor, start).await?;
    supervisor.tick(start).await;
    assert!(supervisor.feedback_state().rumble.active);
    transport.take();

    // Paused: the packet id stops advancing.
    let mut now = start;
    for _ in 0..80 {
        now += TICK;
        supervisor.tick(now).await;
    }
    assert_eq!(supervisor.state(), SupervisorState::Polling);
    assert!(supervisor.is_force_stopped());
    assert_eq!(supervisor.stats().force_stops, 1);

    let batches = transport.take();
    assert_eq!(batches.len(), 1);
    let batch = batches.first().ok_or("expected the force-stop batch")?;
    assert!(is_force_stop(batch));
    assert!(!supervisor.feedback_state().rumble.active);

    // Unpaused: normal batches resume and the flag clears.
    shm.publish(assetto_corsa::PHYSICS_SEGMENT, ac_physics(2));
    supervisor.tick(now + TICK).await;
    assert!(!supervisor.is_force_stopped());
    let resumed = transport.last().ok_or("expected a feedback batch")?;
    assert!(!is_force_stop(&resumed));
    assert!(supervisor.feedback_state().rumble.active);
    Ok(())
}

#[tokio::test]
async fn leaving_the_stage_turns_the_light_bar_off() -> TestResult {
    let process = rbr_process();
    let source = ProcessMemorySource::new(
        rbr::layout(),
        MockProcessAttacher::new(process.clone()),
        MockProcessProbe::new(true),
    );
    let transport = RecordingTransport::new();
    let mut supervisor = Supervisor::new(
        Box::new(source),
        transport.clone(),
        TimingConfig::default(),
        FeedbackConfig::default(),
    );

    let start = Instant::now();
    drive_to_polling(&mut supervisor, start).await?;
    supervisor.tick(start).await;
    let lit = led_colors(&transport.take());
    assert!(lit.iter().any(|&color| color != (0, 0, 0)));

    // Back to the menus: the game state byte drops to zero.
    process.write(u64::from(CONTROL_AT) + 1832, &[0]);
    let mut now = start;
    for _ in 0..200 {
        now += TICK;
        supervisor.tick(now).await;
    }
    assert_eq!(supervisor.state(), SupervisorState::Polling);

    let batches = transport.take();
    assert_eq!(batches.len(), 1);
    assert_eq!(led_colors(&batches), vec![(0, 0, 0)]);
    Ok(())
}

#[tokio::test]
async fn timeout_before_first_frame_is_not_repeated_after_reconnect() -> TestResult {
    let shm = MockSharedMemory::new();
    shm.publish(assetto_corsa::PHYSICS_SEGMENT, ac_physics(0));
    let source = SharedMemorySource::new(
        assetto_corsa::layout(),
        shm.clone(),
        MockProcessProbe::new(true),
    );
    let transport = RecordingTransport::new();
    let timing = TimingConfig {
        max_consecutive_misses: 60,
        ..TimingConfig::default()
    };
    let mut supervisor = Supervisor::new(
        Box::new(source),
        transport.clone(),
        timing,
        FeedbackConfig::default(),
    );

    let start = Instant::now();
    drive_to_polling(&mut supervisor, start).await?;
    transport.take();

    let mut now = start;
    for _ in 0..60 {
        now += TICK;
        supervisor.tick(now).await;
    }
    assert_eq!(supervisor.state(), SupervisorState::Connecting);
    supervisor.tick(now).await;
    assert_eq!(supervisor.state(), SupervisorState::Polling);
    for _ in 0..60 {
        now += TICK;
        supervisor.tick(now).await;
    }

    assert_eq!(supervisor.stats().force_stops, 1);
    assert_eq!(transport.batches().iter().filter(|b| is_force_stop(b)).count(), 1);
    Ok(())
}

#[tokio::test]
async fn supervised_cycle_resets_controller_on_shutdown() -> TestResult {
    let shm = MockSharedMemory::new();
    shm.publish(assetto_corsa::PHYSICS_SEGMENT, ac_physics(1));
    let probe = MockProcessProbe::new(true);
    let transport = RecordingTransport::new();

    let config = WatchdogConfig::builder()
        .timeout_ms(500)
        .check_interval_ms(20)
        .shutdown_grace_ms(500)
        .build()?;
    let watchdog = Arc::new(PollWatchdog::new(config));
    let shutdown = StopFlag::new();

    let supervisor_task = {
        let watchdog = Arc::clone(&watchdog);
        let shutdown = shutdown.clone();
        let transport = transport.clone();
        tokio::spawn(async move {
            watchdog
                .supervise(&shutdown, move |ctx| {
                    let source = SharedMemorySource::new(
                        assetto_corsa::layout(),
                        shm.clone(),
                        probe.clone(),
                    );
                    let supervisor = Supervisor::new(
                        Box::new(source),
                        transport.clone(),
                        TimingConfig::default(),
                        FeedbackConfig::default(),
                    );
                    run_poll_cycle(ctx, supervisor, None, TICK)
                })
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(150)).await;
    shutdown.request_stop();
    supervisor_task.await??;

    assert_eq!(watchdog.restarts(), 0);
    let last = transport.last().ok_or("expected batches")?;
    let resets_triggers = last.triggers_for(Trigger::Right).all(|i| {
        matches!(
            i,
            ControllerInstruction::TriggerUpdate {
                mode: TriggerMode::Normal,
                ..
            }
        )
    });
    assert!(resets_triggers);
    assert!(last.iter().any(|i| matches!(
        i,
        ControllerInstruction::EditAudio {
            kind: AudioEditKind::Stop,
            ..
        }
    )));
    Ok(())
}

#[tokio::test]
async fn cycle_exit_is_stopped_when_flag_is_already_raised() -> TestResult {
    let shm = MockSharedMemory::new();
    let source = SharedMemorySource::new(
        assetto_corsa::layout(),
        shm,
        MockProcessProbe::new(false),
    );
    let transport = RecordingTransport::new();
    let supervisor = Supervisor::new(
        Box::new(source),
        transport.clone(),
        TimingConfig::default(),
        FeedbackConfig::default(),
    );
    let ctx = adaptive_trigger_watchdog::CycleContext {
        heartbeat: adaptive_trigger_watchdog::Heartbeat::new(),
        stop: StopFlag::new(),
        generation: 0,
    };
    ctx.stop.request_stop();

    let exit = run_poll_cycle(ctx, supervisor, None, TICK).await;
    assert_eq!(exit, CycleExit::Stopped);
    // Only the shutdown reset went out.
    assert_eq!(transport.len(), 1);
    Ok(())
}
