//! Telemetry read directly out of the simulator's address space.
//!
//! A [`PointerChain`] names how to reach one block of game state from a
//! fixed root. Every poll re-walks every chain, because the game reallocates
//! these blocks between stages. The fields of interest are then gathered from
//! the resolved blocks into one local record that the layout decoder reads.

use std::time::Instant;

use adaptive_trigger_telemetry_core::{
    BinaryTelemetryDecoder, ConnectError, ConnectionState, DecodedRecord, ErrorLogLimiter,
    FieldDescriptor, GameId, ReadError, TelemetryFrame, TelemetryResult,
};
use tracing::{debug, info};

use crate::platform::{ProcessAttacher, ProcessMemory, ProcessProbe};
use crate::{NormalizeContext, Normalizer, TelemetrySource};

/// Where a chain starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainRoot {
    /// Fixed virtual address.
    Absolute(u64),
    /// Offset from the main module's load address.
    ModuleOffset(u64),
}

/// A root followed by pointer dereferences.
///
/// Each offset is added to the current address and the 32-bit pointer stored
/// there becomes the next address. The final pointer is the block base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerChain {
    pub root: ChainRoot,
    pub offsets: &'static [u64],
}

impl PointerChain {
    pub const fn absolute(address: u64, offsets: &'static [u64]) -> Self {
        Self {
            root: ChainRoot::Absolute(address),
            offsets,
        }
    }

    pub const fn module(offset: u64, offsets: &'static [u64]) -> Self {
        Self {
            root: ChainRoot::ModuleOffset(offset),
            offsets,
        }
    }

    /// Walk the chain.
    ///
    /// A null link or an unreadable address resolves to `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Only disconnect-class read errors (the process is gone) are returned.
    pub fn resolve<M: ProcessMemory + ?Sized>(&self, memory: &M) -> TelemetryResult<Option<u64>> {
        let mut address = match self.root {
            ChainRoot::Absolute(address) => address,
            ChainRoot::ModuleOffset(offset) => memory.module_base().saturating_add(offset),
        };
        for offset in self.offsets {
            let pointer = match memory.read_u32(address.saturating_add(*offset)) {
                Ok(pointer) => pointer,
                Err(e) if e.is_disconnect() => return Err(e),
                Err(_) => return Ok(None),
            };
            if pointer == 0 {
                return Ok(None);
            }
            address = u64::from(pointer);
        }
        Ok(Some(address))
    }
}

/// A named chain whose target block the gather step reads from.
#[derive(Debug, Clone, Copy)]
pub struct PointerBlock {
    pub name: &'static str,
    pub chain: PointerChain,
}

/// Copy `width` bytes from `block + remote_offset` into the local record
/// at `local.offset`.
#[derive(Debug, Clone, Copy)]
pub struct GatherField {
    /// Index into [`ProcessMemoryLayout::blocks`].
    pub block: usize,
    pub remote_offset: u64,
    pub width: usize,
    pub local: FieldDescriptor,
}

impl GatherField {
    pub const fn new(block: usize, remote_offset: u64, local: FieldDescriptor) -> Self {
        Self {
            block,
            remote_offset,
            width: local.kind.width(),
            local,
        }
    }

    /// Read fewer bytes than the local slot holds; the rest stay zero.
    #[must_use]
    pub const fn narrow(mut self, width: usize) -> Self {
        self.width = width;
        self
    }
}

/// Everything that distinguishes one process-memory game from another.
#[derive(Debug, Clone)]
pub struct ProcessMemoryLayout {
    pub game: GameId,
    pub process_name: &'static str,
    pub blocks: &'static [PointerBlock],
    pub fields: &'static [GatherField],
    /// Decoder over the local record; its discriminator gates validity.
    pub decoder: BinaryTelemetryDecoder,
    pub normalizer: Normalizer,
}

/// [`TelemetrySource`] that chases pointers inside another process.
pub struct ProcessMemorySource<A: ProcessAttacher, Q> {
    layout: ProcessMemoryLayout,
    attacher: A,
    probe: Q,
    state: ConnectionState,
    memory: Option<A::Memory>,
    sequence: u64,
    limiter: ErrorLogLimiter,
}

impl<A, Q> ProcessMemorySource<A, Q>
where
    A: ProcessAttacher,
    Q: ProcessProbe,
{
    pub fn new(layout: ProcessMemoryLayout, attacher: A, probe: Q) -> Self {
        Self {
            layout,
            attacher,
            probe,
            state: ConnectionState::Disconnected,
            memory: None,
            sequence: 0,
            limiter: ErrorLogLimiter::default(),
        }
    }

    pub fn layout(&self) -> &ProcessMemoryLayout {
        &self.layout
    }

    fn soft_miss(&mut self, kind: &'static str, detail: &str) -> TelemetryResult<Option<DecodedRecord>> {
        if let Some(suppressed) = self.limiter.should_log(kind, Instant::now()) {
            debug!(game = %self.layout.game, detail, suppressed, "Process memory soft miss");
        }
        Ok(None)
    }
}

impl<A, Q> TelemetrySource for ProcessMemorySource<A, Q>
where
    A: ProcessAttacher,
    Q: ProcessProbe,
{
    fn game(&self) -> GameId {
        self.layout.game
    }

    fn state(&self) -> ConnectionState {
        self.state
    }

    fn is_game_running(&self) -> bool {
        self.probe.is_running(&[self.layout.process_name])
    }

    fn connect(&mut self) -> Result<(), ConnectError> {
        self.state = ConnectionState::Connecting;
        match self.attacher.attach(self.layout.process_name) {
            Ok(memory) => {
                info!(
                    game = %self.layout.game,
                    pid = memory.pid(),
                    module_base = format_args!("{:#x}", memory.module_base()),
                    "Attached to game process"
                );
                self.memory = Some(memory);
                self.state = ConnectionState::Connected;
                Ok(())
            }
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                Err(e)
            }
        }
    }

    fn poll(&mut self) -> TelemetryResult<Option<DecodedRecord>> {
        let memory = self.memory.as_ref().ok_or(ReadError::NotConnected)?;
        if !memory.is_alive() {
            return Err(ReadError::ProcessExited(self.layout.process_name.to_string()));
        }

        let mut bases = Vec::with_capacity(self.layout.blocks.len());
        for block in self.layout.blocks {
            match block.chain.resolve(memory)? {
                Some(base) => bases.push(base),
                None => return self.soft_miss("chain.unresolved", block.name),
            }
        }

        let mut local = vec![0u8; self.layout.decoder.required_len()];
        for field in self.layout.fields {
            let Some(base) = bases.get(field.block).copied() else {
                return self.soft_miss("chain.bad_block", field.local.name);
            };
            let end = field.local.offset.saturating_add(field.width);
            let Some(slot) = local.get_mut(field.local.offset..end) else {
                return self.soft_miss("gather.bad_slot", field.local.name);
            };
            match memory.read_bytes(base.saturating_add(field.remote_offset), slot) {
                Ok(()) => {}
                Err(e) if e.is_disconnect() => return Err(e),
                Err(_) => return self.soft_miss("gather.read", field.local.name),
            }
        }

        match self.layout.decoder.decode(local) {
            Ok(record) => {
                self.sequence = self.sequence.wrapping_add(1);
                self.limiter.reset();
                Ok(Some(record))
            }
            Err(e) if e.is_no_frame() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn normalize(&self, record: &DecodedRecord, timestamp_ns: u64) -> TelemetryFrame {
        let ctx = NormalizeContext {
            timestamp_ns,
            sequence: self.sequence,
            auxiliary: None,
        };
        (self.layout.normalizer)(record, &ctx)
    }

    fn close(&mut self) {
        if let Some(memory) = self.memory.take() {
            debug!(game = %self.layout.game, pid = memory.pid(), "Released game process");
        }
        self.limiter.reset();
        self.state = ConnectionState::Disconnected;
    }
}
