//! Assetto Corsa shared memory layout.
//!
//! AC publishes `SPageFilePhysics` at `Local\acpmf_physics`, refreshed every
//! physics step, and `SPageFileStatic` at `Local\acpmf_static`, written once
//! per session. Both are packed to 4 bytes; `wchar_t` is 2 bytes.
//!
//! Wheel speed is not published directly, so it is derived from
//! `wheelAngularSpeed` (rad/s) and the static `tyreRadius`.

use std::time::Duration;

use adaptive_trigger_telemetry_core::{
    BinaryTelemetryDecoder, DecodedRecord, FieldDescriptor, GameId, TelemetryFrame,
};

use crate::shared_memory::{AuxiliarySegment, SegmentSpec, SharedMemoryLayout};
use crate::NormalizeContext;

pub const PHYSICS_SEGMENT: &str = "Local\\acpmf_physics";
pub const STATIC_SEGMENT: &str = "Local\\acpmf_static";

/// Bytes of `SPageFilePhysics` covered by [`PHYSICS_FIELDS`].
pub const PHYSICS_SIZE: usize = 256;
/// Bytes of `SPageFileStatic` up to and including `tyreRadius`.
pub const STATIC_SIZE: usize = 452;
pub const STATIC_REFRESH: Duration = Duration::from_secs(5);

pub const PROCESS_NAMES: &[&str] = &["acs.exe", "ac.exe", "acr.exe", "AC2-Win64-Shipping.exe"];

pub const DEFAULT_MAX_RPM: f32 = 7000.0;
pub const DEFAULT_TYRE_RADIUS_M: f32 = 0.33;
/// Smaller radii are treated as "static page not written yet".
const MIN_TYRE_RADIUS_M: f32 = 0.05;
const MS_TO_KMH: f32 = 3.6;

pub const PACKET_ID: FieldDescriptor = FieldDescriptor::i32("packetId", 0);
pub const GAS: FieldDescriptor = FieldDescriptor::f32("gas", 4);
pub const BRAKE: FieldDescriptor = FieldDescriptor::f32("brake", 8);
pub const FUEL: FieldDescriptor = FieldDescriptor::f32("fuel", 12);
pub const GEAR: FieldDescriptor = FieldDescriptor::i32("gear", 16);
pub const RPMS: FieldDescriptor = FieldDescriptor::i32("rpms", 20);
pub const STEER_ANGLE: FieldDescriptor = FieldDescriptor::f32("steerAngle", 24);
pub const SPEED_KMH: FieldDescriptor = FieldDescriptor::f32("speedKmh", 28);
pub const VELOCITY: FieldDescriptor = FieldDescriptor::f32("velocity", 32).array(3);
pub const ACC_G: FieldDescriptor = FieldDescriptor::f32("accG", 44).array(3);
pub const WHEEL_SLIP: FieldDescriptor = FieldDescriptor::f32("wheelSlip", 56).array(4);
pub const WHEEL_LOAD: FieldDescriptor = FieldDescriptor::f32("wheelLoad", 72).array(4);
pub const WHEELS_PRESSURE: FieldDescriptor = FieldDescriptor::f32("wheelsPressure", 88).array(4);
pub const WHEEL_ANGULAR_SPEED: FieldDescriptor =
    FieldDescriptor::f32("wheelAngularSpeed", 104).array(4);
pub const TYRE_WEAR: FieldDescriptor = FieldDescriptor::f32("tyreWear", 120).array(4);
pub const TYRE_DIRTY_LEVEL: FieldDescriptor = FieldDescriptor::f32("tyreDirtyLevel", 136).array(4);
pub const TYRE_CORE_TEMPERATURE: FieldDescriptor =
    FieldDescriptor::f32("tyreCoreTemperature", 152).array(4);
pub const CAMBER_RAD: FieldDescriptor = FieldDescriptor::f32("camberRAD", 168).array(4);
pub const SUSPENSION_TRAVEL: FieldDescriptor =
    FieldDescriptor::f32("suspensionTravel", 184).array(4);
pub const DRS: FieldDescriptor = FieldDescriptor::f32("drs", 200);
pub const TC: FieldDescriptor = FieldDescriptor::f32("tc", 204);
pub const HEADING: FieldDescriptor = FieldDescriptor::f32("heading", 208);
pub const PITCH: FieldDescriptor = FieldDescriptor::f32("pitch", 212);
pub const ROLL: FieldDescriptor = FieldDescriptor::f32("roll", 216);
pub const CG_HEIGHT: FieldDescriptor = FieldDescriptor::f32("cgHeight", 220);
pub const CAR_DAMAGE: FieldDescriptor = FieldDescriptor::f32("carDamage", 224).array(5);
pub const NUMBER_OF_TYRES_OUT: FieldDescriptor = FieldDescriptor::i32("numberOfTyresOut", 244);
pub const PIT_LIMITER_ON: FieldDescriptor = FieldDescriptor::i32("pitLimiterOn", 248);
pub const ABS: FieldDescriptor = FieldDescriptor::f32("abs", 252);

pub static PHYSICS_FIELDS: &[FieldDescriptor] = &[
    PACKET_ID,
    GAS,
    BRAKE,
    FUEL,
    GEAR,
    RPMS,
    STEER_ANGLE,
    SPEED_KMH,
    VELOCITY,
    ACC_G,
    WHEEL_SLIP,
    WHEEL_LOAD,
    WHEELS_PRESSURE,
    WHEEL_ANGULAR_SPEED,
    TYRE_WEAR,
    TYRE_DIRTY_LEVEL,
    TYRE_CORE_TEMPERATURE,
    CAMBER_RAD,
    SUSPENSION_TRAVEL,
    DRS,
    TC,
    HEADING,
    PITCH,
    ROLL,
    CG_HEIGHT,
    CAR_DAMAGE,
    NUMBER_OF_TYRES_OUT,
    PIT_LIMITER_ON,
    ABS,
];

pub const NUMBER_OF_SESSIONS: FieldDescriptor = FieldDescriptor::i32("numberOfSessions", 60);
pub const NUM_CARS: FieldDescriptor = FieldDescriptor::i32("numCars", 64);
pub const SECTOR_COUNT: FieldDescriptor = FieldDescriptor::i32("sectorCount", 400);
pub const MAX_TORQUE: FieldDescriptor = FieldDescriptor::f32("maxTorque", 404);
pub const MAX_POWER: FieldDescriptor = FieldDescriptor::f32("maxPower", 408);
pub const MAX_RPM: FieldDescriptor = FieldDescriptor::i32("maxRpm", 412);
pub const MAX_FUEL: FieldDescriptor = FieldDescriptor::f32("maxFuel", 416);
pub const SUSPENSION_MAX_TRAVEL: FieldDescriptor =
    FieldDescriptor::f32("suspensionMaxTravel", 420).array(4);
pub const TYRE_RADIUS: FieldDescriptor = FieldDescriptor::f32("tyreRadius", 436).array(4);

pub static STATIC_FIELDS: &[FieldDescriptor] = &[
    NUMBER_OF_SESSIONS,
    NUM_CARS,
    SECTOR_COUNT,
    MAX_TORQUE,
    MAX_POWER,
    MAX_RPM,
    MAX_FUEL,
    SUSPENSION_MAX_TRAVEL,
    TYRE_RADIUS,
];

pub fn physics_decoder() -> BinaryTelemetryDecoder {
    BinaryTelemetryDecoder::new("ac_physics", PHYSICS_FIELDS, Some(PACKET_ID))
}

pub fn static_decoder() -> BinaryTelemetryDecoder {
    BinaryTelemetryDecoder::new("ac_static", STATIC_FIELDS, None)
}

pub fn layout() -> SharedMemoryLayout {
    SharedMemoryLayout {
        game: GameId::AssettoCorsa,
        process_names: PROCESS_NAMES,
        primary: SegmentSpec {
            name: PHYSICS_SEGMENT,
            size: PHYSICS_SIZE,
            decoder: physics_decoder(),
        },
        auxiliary: Some(AuxiliarySegment {
            segment: SegmentSpec {
                name: STATIC_SEGMENT,
                size: STATIC_SIZE,
                decoder: static_decoder(),
            },
            refresh: STATIC_REFRESH,
        }),
        normalizer: normalize,
    }
}

/// AC gear: 0 = reverse, 1 = neutral, n = gear n-1.
fn map_gear(raw: i32) -> i8 {
    let gear = if raw <= 0 { -1 } else { raw.saturating_sub(1) };
    i8::try_from(gear).unwrap_or(i8::MAX)
}

fn car_max_rpm(static_info: Option<&DecodedRecord>) -> f32 {
    static_info
        .and_then(|info| info.i32(&MAX_RPM))
        .filter(|rpm| *rpm > 0)
        .map_or(DEFAULT_MAX_RPM, |rpm| rpm as f32)
}

fn tyre_radii(static_info: Option<&DecodedRecord>) -> [f32; 4] {
    std::array::from_fn(|i| {
        static_info
            .and_then(|info| info.f32_at(&TYRE_RADIUS, i))
            .filter(|r| *r > MIN_TYRE_RADIUS_M)
            .unwrap_or(DEFAULT_TYRE_RADIUS_M)
    })
}

/// Map a physics record to the canonical frame.
pub fn normalize(record: &DecodedRecord, ctx: &NormalizeContext<'_>) -> TelemetryFrame {
    let radii = tyre_radii(ctx.auxiliary);
    let angular: [f32; 4] = record.f32_array(&WHEEL_ANGULAR_SPEED);
    let mut wheel_speed = [0.0f32; 4];
    for ((speed, omega), radius) in wheel_speed.iter_mut().zip(angular).zip(radii) {
        *speed = omega.abs() * radius * MS_TO_KMH;
    }

    let mut builder = TelemetryFrame::builder(GameId::AssettoCorsa)
        .packet_sequence(ctx.sequence)
        .timestamp_ns(ctx.timestamp_ns)
        .ground_speed_kmh(record.f32(&SPEED_KMH).unwrap_or(0.0))
        .wheel_speed_kmh(wheel_speed)
        .rpm(record.i32(&RPMS).unwrap_or(0) as f32)
        .max_rpm(car_max_rpm(ctx.auxiliary))
        .gear(map_gear(record.i32(&GEAR).unwrap_or(1)))
        .throttle(record.f32(&GAS).unwrap_or(0.0) * 100.0)
        .brake(record.f32(&BRAKE).unwrap_or(0.0) * 100.0)
        .steering(record.f32(&STEER_ANGLE).unwrap_or(0.0));

    let temps: Option<[f32; 4]> = (0..4)
        .map(|i| record.f32_at(&TYRE_CORE_TEMPERATURE, i))
        .collect::<Option<Vec<_>>>()
        .and_then(|v| v.try_into().ok());
    if let Some(temps) = temps {
        builder = builder.tyre_core_temp_c(temps);
    }
    builder.build()
}


#[cfg(test)]
mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn normalize_never_panics_and_stays_in_range(
            data in proptest::collection::vec(any::<u8>(), PHYSICS_SIZE..=PHYSICS_SIZE + 64)
        ) {
            if let Ok(record) = physics_decoder().decode(data) {
                let ctx = NormalizeContext { timestamp_ns: 0, sequence: 0, auxiliary: None };
                let frame = normalize(&record, &ctx);
                prop_assert!((0.0..=100.0).contains(&frame.throttle()));
                prop_assert!((0.0..=100.0).contains(&frame.brake()));
                prop_assert!((-1.0..=1.0).contains(&frame.steering()));
                prop_assert!(frame.ground_speed_kmh() >= 0.0);
                prop_assert!(frame.wheel_speed_kmh().iter().all(|v| v.is_finite() && *v >= 0.0));
            }
        }
    }
}
