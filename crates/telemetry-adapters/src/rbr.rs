//! Richard Burns Rally process memory layout.
//!
//! RBR publishes nothing; the values live in heap blocks reachable from
//! fixed addresses of `RichardBurnsRally_SSE.exe` (32-bit, so every pointer is
//! 4 bytes). Offsets match the RSF build of the game.

use adaptive_trigger_telemetry_core::{
    BinaryTelemetryDecoder, DecodedRecord, FieldDescriptor, GameId, TelemetryFrame,
};

use crate::NormalizeContext;
use crate::process_memory::{GatherField, PointerBlock, PointerChain, ProcessMemoryLayout};

pub const PROCESS_NAME: &str = "RichardBurnsRally_SSE.exe";
pub const PROCESS_NAMES: &[&str] = &[PROCESS_NAME];

pub const MAX_RPM: f32 = 7500.0;
const MS_TO_KMH: f32 = 3.6;
const KELVIN_OFFSET: f32 = 273.15;
/// Readings above this are Kelvin; coolant never gets this hot in Celsius.
const KELVIN_THRESHOLD: f32 = 200.0;

const CAR_INFO: usize = 0;
const CONTROL: usize = 1;
const MOVEMENT: usize = 2;
const WHEELS: usize = 3;

pub static BLOCKS: &[PointerBlock] = &[
    PointerBlock {
        name: "car_info",
        chain: PointerChain::absolute(0x0165_FC68, &[0]),
    },
    PointerBlock {
        name: "control",
        chain: PointerChain::absolute(0x007E_AC48, &[0]),
    },
    PointerBlock {
        name: "movement",
        chain: PointerChain::absolute(0x008E_F660, &[0]),
    },
    PointerBlock {
        name: "wheels",
        chain: PointerChain::module(0x0049_3038, &[0, 1032, 64]),
    },
];

/// Game state byte, relative to the control block.
const OFF_GAME_STATE: u64 = 1832;
/// Start of the pedal/steering inputs, relative to the control block.
const OFF_CONTROLS: u64 = 1848;

// Local record assembled from the blocks above.
pub const GAME_STATE: FieldDescriptor = FieldDescriptor::i32("game_state", 0);
pub const RPM: FieldDescriptor = FieldDescriptor::f32("rpm", 4);
pub const WATER_TEMP: FieldDescriptor = FieldDescriptor::f32("water_temp", 8);
pub const RACE_TIME: FieldDescriptor = FieldDescriptor::f32("race_time", 12);
pub const GEAR: FieldDescriptor = FieldDescriptor::i32("gear", 16);
pub const STEERING: FieldDescriptor = FieldDescriptor::f32("steering", 20);
pub const THROTTLE: FieldDescriptor = FieldDescriptor::f32("throttle", 24);
pub const BRAKE: FieldDescriptor = FieldDescriptor::f32("brake", 28);
pub const HANDBRAKE: FieldDescriptor = FieldDescriptor::f32("handbrake", 32);
pub const CLUTCH: FieldDescriptor = FieldDescriptor::f32("clutch", 36);
pub const VELOCITY: FieldDescriptor = FieldDescriptor::f32("velocity", 40).array(3);
pub const WHEEL_SPEED: FieldDescriptor = FieldDescriptor::f32("wheel_speed", 52).array(4);

pub static LOCAL_FIELDS: &[FieldDescriptor] = &[
    GAME_STATE, RPM, WATER_TEMP, RACE_TIME, GEAR, STEERING, THROTTLE, BRAKE, HANDBRAKE, CLUTCH,
    VELOCITY, WHEEL_SPEED,
];

const fn element(field: FieldDescriptor, index: usize) -> FieldDescriptor {
    FieldDescriptor::f32(field.name, field.offset + index * 4)
}

pub static GATHER: &[GatherField] = &[
    GatherField::new(CONTROL, OFF_GAME_STATE, GAME_STATE).narrow(1),
    GatherField::new(CAR_INFO, 16, RPM),
    GatherField::new(CAR_INFO, 20, WATER_TEMP),
    GatherField::new(CAR_INFO, 0x140, RACE_TIME),
    GatherField::new(CAR_INFO, 0x170, GEAR),
    GatherField::new(CONTROL, OFF_CONTROLS + 92, STEERING),
    GatherField::new(CONTROL, OFF_CONTROLS + 96, THROTTLE),
    GatherField::new(CONTROL, OFF_CONTROLS + 100, BRAKE),
    GatherField::new(CONTROL, OFF_CONTROLS + 104, HANDBRAKE),
    GatherField::new(CONTROL, OFF_CONTROLS + 108, CLUTCH),
    GatherField::new(MOVEMENT, 448, element(VELOCITY, 0)),
    GatherField::new(MOVEMENT, 452, element(VELOCITY, 1)),
    GatherField::new(MOVEMENT, 456, element(VELOCITY, 2)),
    GatherField::new(WHEELS, 988, element(WHEEL_SPEED, 0)),
    GatherField::new(WHEELS, 1676, element(WHEEL_SPEED, 1)),
    GatherField::new(WHEELS, 2364, element(WHEEL_SPEED, 2)),
    GatherField::new(WHEELS, 3052, element(WHEEL_SPEED, 3)),
];

pub fn decoder() -> BinaryTelemetryDecoder {
    BinaryTelemetryDecoder::new("rbr_memory", LOCAL_FIELDS, Some(GAME_STATE))
}

pub fn layout() -> ProcessMemoryLayout {
    ProcessMemoryLayout {
        game: GameId::RichardBurnsRally,
        process_name: PROCESS_NAME,
        blocks: BLOCKS,
        fields: GATHER,
        decoder: decoder(),
        normalizer: normalize,
    }
}

fn water_temp_celsius(raw: f32) -> f32 {
    if raw > KELVIN_THRESHOLD {
        raw - KELVIN_OFFSET
    } else {
        raw
    }
}

/// RBR gear: 0 = reverse, 1 = neutral.
fn map_gear(raw: i32) -> i8 {
    i8::try_from(raw.saturating_sub(1).max(-1)).unwrap_or(i8::MAX)
}

/// Map a gathered record to the canonical frame.
pub fn normalize(record: &DecodedRecord, ctx: &NormalizeContext<'_>) -> TelemetryFrame {
    let velocity: [f32; 3] = record.f32_array(&VELOCITY);
    let ground_speed_ms = velocity.iter().map(|v| v * v).sum::<f32>().sqrt();
    let wheels: [f32; 4] = record.f32_array(&WHEEL_SPEED);
    let percent = |field: &FieldDescriptor| record.f32(field).unwrap_or(0.0) * 100.0;

    let mut builder = TelemetryFrame::builder(GameId::RichardBurnsRally)
        .packet_sequence(ctx.sequence)
        .timestamp_ns(ctx.timestamp_ns)
        .ground_speed_kmh(ground_speed_ms * MS_TO_KMH)
        .wheel_speed_kmh(wheels.map(|w| w * MS_TO_KMH))
        .rpm(record.f32(&RPM).unwrap_or(0.0))
        .max_rpm(MAX_RPM)
        .gear(map_gear(record.i32(&GEAR).unwrap_or(1)))
        .throttle(percent(&THROTTLE))
        .brake(percent(&BRAKE))
        .handbrake(percent(&HANDBRAKE))
        .clutch(percent(&CLUTCH))
        .steering(record.f32(&STEERING).unwrap_or(0.0));

    if let Some(raw) = record.f32(&WATER_TEMP) {
        builder = builder.water_temp_c(water_temp_celsius(raw));
    }
    if let Some(time) = record.f32(&RACE_TIME) {
        builder = builder.race_time_s(time);
    }
    builder.build()
}
