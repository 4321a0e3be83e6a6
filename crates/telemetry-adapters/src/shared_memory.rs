//! Telemetry published by the simulator into named shared memory.
//!
//! The region is re-read in full on every poll; there is no change
//! notification. Only a failing `open` counts as a lost connection. A zero or
//! repeated discriminator is an empty poll.

use std::time::{Duration, Instant};

use adaptive_trigger_telemetry_core::{
    BinaryTelemetryDecoder, ConnectError, ConnectionState, DecodeError, DecodedRecord,
    ErrorLogLimiter, GameId, ReadError, TelemetryFrame, TelemetryResult,
};
use tracing::{debug, info, warn};

use crate::platform::{ProcessProbe, SharedMemoryProvider, SharedMemoryView};
use crate::{NormalizeContext, Normalizer, TelemetrySource};

/// One named segment and the record layout it holds.
#[derive(Debug, Clone)]
pub struct SegmentSpec {
    pub name: &'static str,
    /// Bytes to map; at least `decoder.required_len()`.
    pub size: usize,
    pub decoder: BinaryTelemetryDecoder,
}

/// A slowly changing segment (car or session constants) read on a timer.
#[derive(Debug, Clone)]
pub struct AuxiliarySegment {
    pub segment: SegmentSpec,
    pub refresh: Duration,
}

/// Everything that distinguishes one shared-memory game from another.
#[derive(Debug, Clone)]
pub struct SharedMemoryLayout {
    pub game: GameId,
    pub process_names: &'static [&'static str],
    pub primary: SegmentSpec,
    pub auxiliary: Option<AuxiliarySegment>,
    pub normalizer: Normalizer,
}

/// [`TelemetrySource`] over a named shared memory segment.
pub struct SharedMemorySource<P: SharedMemoryProvider, Q> {
    layout: SharedMemoryLayout,
    provider: P,
    probe: Q,
    state: ConnectionState,
    primary: Option<P::View>,
    auxiliary: Option<P::View>,
    auxiliary_record: Option<DecodedRecord>,
    auxiliary_read_at: Option<Instant>,
    last_discriminator: Option<i32>,
    limiter: ErrorLogLimiter,
}

impl<P, Q> SharedMemorySource<P, Q>
where
    P: SharedMemoryProvider,
    Q: ProcessProbe,
{
    pub fn new(layout: SharedMemoryLayout, provider: P, probe: Q) -> Self {
        Self {
            layout,
            provider,
            probe,
            state: ConnectionState::Disconnected,
            primary: None,
            auxiliary: None,
            auxiliary_record: None,
            auxiliary_read_at: None,
            last_discriminator: None,
            limiter: ErrorLogLimiter::default(),
        }
    }

    pub fn layout(&self) -> &SharedMemoryLayout {
        &self.layout
    }

    /// Latest decoded auxiliary record, if one has been read.
    pub fn auxiliary_record(&self) -> Option<&DecodedRecord> {
        self.auxiliary_record.as_ref()
    }

    fn refresh_auxiliary(&mut self, now: Instant) {
        let Some(aux) = &self.layout.auxiliary else {
            return;
        };
        let due = self
            .auxiliary_read_at
            .is_none_or(|at| now.saturating_duration_since(at) >= aux.refresh);
        if !due {
            return;
        }
        self.auxiliary_read_at = Some(now);

        if self.auxiliary.is_none() {
            match self.provider.open(aux.segment.name, aux.segment.size) {
                Ok(view) => self.auxiliary = Some(view),
                Err(e) => {
                    debug!(segment = aux.segment.name, error = %e, "Auxiliary segment not open yet");
                    return;
                }
            }
        }

        if let Some(view) = &self.auxiliary {
            match read_view(view, &aux.segment.decoder) {
                Ok(record) => self.auxiliary_record = Some(record),
                Err(e) => debug!(segment = aux.segment.name, error = %e, "Auxiliary record unreadable"),
            }
        }
    }
}

fn read_view<V: SharedMemoryView>(
    view: &V,
    decoder: &BinaryTelemetryDecoder,
) -> Result<DecodedRecord, DecodeError> {
    let mut bytes = vec![0u8; view.len()];
    let copied = view.read_into(&mut bytes);
    bytes.truncate(copied);
    decoder.decode(bytes)
}

impl<P, Q> TelemetrySource for SharedMemorySource<P, Q>
where
    P: SharedMemoryProvider,
    Q: ProcessProbe,
{
    fn game(&self) -> GameId {
        self.layout.game
    }

    fn state(&self) -> ConnectionState {
        self.state
    }

    fn is_game_running(&self) -> bool {
        self.probe.is_running(self.layout.process_names)
    }

    fn connect(&mut self) -> Result<(), ConnectError> {
        self.state = ConnectionState::Connecting;
        let segment = &self.layout.primary;
        match self.provider.open(segment.name, segment.size) {
            Ok(view) => {
                self.primary = Some(view);
                self.last_discriminator = None;
                self.auxiliary_read_at = None;
                self.state = ConnectionState::Connected;
                info!(game = %self.layout.game, segment = segment.name, "Shared memory connected");
                Ok(())
            }
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                Err(e)
            }
        }
    }

    fn poll(&mut self) -> TelemetryResult<Option<DecodedRecord>> {
        let now = Instant::now();
        self.refresh_auxiliary(now);

        let view = self.primary.as_ref().ok_or(ReadError::NotConnected)?;
        let decoder = &self.layout.primary.decoder;

        let record = match read_view(view, decoder) {
            Ok(record) => record,
            Err(e) if e.is_no_frame() => return Ok(None),
            Err(e) => {
                let err = ReadError::from(e);
                if let Some(suppressed) = self.limiter.should_log(err.kind(), now) {
                    warn!(decoder = decoder.name(), error = %err, suppressed, "Dropping shared memory frame");
                }
                return Err(err);
            }
        };

        let discriminator = record.discriminator();
        if discriminator.is_some() && discriminator == self.last_discriminator {
            return Ok(None);
        }
        self.last_discriminator = discriminator;
        Ok(Some(record))
    }

    fn normalize(&self, record: &DecodedRecord, timestamp_ns: u64) -> TelemetryFrame {
        let ctx = NormalizeContext {
            timestamp_ns,
            sequence: record
                .discriminator()
                .and_then(|d| u64::try_from(d).ok())
                .unwrap_or(0),
            auxiliary: self.auxiliary_record.as_ref(),
        };
        (self.layout.normalizer)(record, &ctx)
    }

    fn close(&mut self) {
        if self.primary.take().is_some() {
            debug!(game = %self.layout.game, "Shared memory released");
        }
        self.auxiliary = None;
        self.auxiliary_record = None;
        self.auxiliary_read_at = None;
        self.last_discriminator = None;
        self.limiter.reset();
        self.state = ConnectionState::Disconnected;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockProcessProbe, MockSharedMemory};
    use adaptive_trigger_telemetry_core::FieldDescriptor;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    const SEQ: FieldDescriptor = FieldDescriptor::i32("seq", 0);
    const SPEED: FieldDescriptor = FieldDescriptor::f32("speed", 4);
    const FIELDS: &[FieldDescriptor] = &[SEQ, SPEED];
    const LIMIT: FieldDescriptor = FieldDescriptor::f32("limit", 0);
    const AUX_FIELDS: &[FieldDescriptor] = &[LIMIT];

    fn normalize(record: &DecodedRecord, ctx: &NormalizeContext<'_>) -> TelemetryFrame {
        let limit = ctx.auxiliary.and_then(|aux| aux.f32(&LIMIT)).unwrap_or(1.0);
        TelemetryFrame::builder(GameId::AssettoCorsa)
            .packet_sequence(ctx.sequence)
            .timestamp_ns(ctx.timestamp_ns)
            .ground_speed_kmh(record.f32(&SPEED).unwrap_or(0.0))
            .max_rpm(limit)
            .build()
    }

    fn layout(with_aux: bool) -> SharedMemoryLayout {
        SharedMemoryLayout {
            game: GameId::AssettoCorsa,
            process_names: &["test.exe"],
            primary: SegmentSpec {
                name: "primary",
                size: 8,
                decoder: BinaryTelemetryDecoder::new("primary", FIELDS, Some(SEQ)),
            },
            auxiliary: with_aux.then(|| AuxiliarySegment {
                segment: SegmentSpec {
                    name: "aux",
                    size: 4,
                    decoder: BinaryTelemetryDecoder::new("aux", AUX_FIELDS, None),
                },
                refresh: Duration::from_secs(5),
            }),
            normalizer: normalize,
        }
    }

    fn record(seq: i32, speed: f32) -> Vec<u8> {
        let mut bytes = seq.to_le_bytes().to_vec();
        bytes.extend_from_slice(&speed.to_le_bytes());
        bytes
    }

    #[test]
    fn test_connect_fails_without_segment() {
        let mut source = SharedMemorySource::new(
            layout(false),
            MockSharedMemory::new(),
            MockProcessProbe::new(true),
        );
        assert!(matches!(
            source.connect(),
            Err(ConnectError::SegmentUnavailable(_))
        ));
        assert_eq!(source.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_poll_before_connect_is_not_connected() {
        let mut source = SharedMemorySource::new(
            layout(false),
            MockSharedMemory::new(),
            MockProcessProbe::new(true),
        );
        assert_eq!(source.poll(), Err(ReadError::NotConnected));
    }

    #[test]
    fn test_zero_and_repeated_packet_ids_are_empty_polls() -> TestResult {
        let shm = MockSharedMemory::new();
        shm.publish("primary", record(0, 10.0));
        let mut source =
            SharedMemorySource::new(layout(false), shm.clone(), MockProcessProbe::new(true));
        source.connect()?;
        assert_eq!(source.state(), ConnectionState::Connected);

        assert_eq!(source.poll()?, None);

        shm.publish("primary", record(5, 42.0));
        let first = source.poll()?.ok_or("expected a frame")?;
        let frame = source.normalize(&first, 1_000);
        assert_eq!(frame.packet_sequence(), 5);
        assert!((frame.ground_speed_kmh() - 42.0).abs() < f32::EPSILON);

        assert_eq!(source.poll()?, None);

        shm.publish("primary", record(6, 43.0));
        assert!(source.poll()?.is_some());
        Ok(())
    }

    #[test]
    fn test_short_segment_is_decode_error_not_disconnect() -> TestResult {
        let shm = MockSharedMemory::new();
        shm.publish("primary", vec![1, 0, 0, 0]);
        let mut source =
            SharedMemorySource::new(layout(false), shm, MockProcessProbe::new(true));
        source.connect()?;
        let err = source.poll().err().ok_or("expected decode error")?;
        assert!(matches!(err, ReadError::Decode(DecodeError::BufferTooSmall { .. })));
        assert!(!err.is_disconnect());
        assert_eq!(source.state(), ConnectionState::Connected);
        Ok(())
    }

    #[test]
    fn test_auxiliary_record_feeds_normalizer() -> TestResult {
        let shm = MockSharedMemory::new();
        shm.publish("primary", record(1, 20.0));
        shm.publish("aux", 8000.0f32.to_le_bytes().to_vec());
        let mut source = SharedMemorySource::new(layout(true), shm, MockProcessProbe::new(true));
        source.connect()?;

        let rec = source.poll()?.ok_or("expected a frame")?;
        assert!(source.auxiliary_record().is_some());
        let frame = source.normalize(&rec, 0);
        assert!((frame.max_rpm() - 8000.0).abs() < f32::EPSILON);
        Ok(())
    }

    #[test]
    fn test_close_resets_state() -> TestResult {
        let shm = MockSharedMemory::new();
        shm.publish("primary", record(3, 1.0));
        let mut source =
            SharedMemorySource::new(layout(false), shm, MockProcessProbe::new(false));
        source.connect()?;
        assert!(source.poll()?.is_some());
        source.close();
        assert_eq!(source.state(), ConnectionState::Disconnected);
        assert_eq!(source.poll(), Err(ReadError::NotConnected));
        assert!(!source.is_game_running());

        source.connect()?;
        assert!(source.poll()?.is_some(), "same packet id is fresh after reconnect");
        Ok(())
    }
}
