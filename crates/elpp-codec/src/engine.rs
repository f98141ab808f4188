//! The channel engine: walks a byte stream, reads a 1-byte channel selector,
//! looks it up in a channel map, decodes the associated schema, and invokes
//! the channel's processor with the decoded output vector.
//!
//! The engine holds no mutable state of its own beyond the cursor over the
//! current payload — channel maps are built once at startup and shared
//! read-only across every call to [`Engine::run`], eliminating the "global
//! mutable decoder state" pattern called out in the design notes.

use std::collections::HashMap;

use elpp_types::DecoderError;

use crate::bits::BitReader;
use crate::schema::{decode_schema, Schema};
use crate::primitive::Value;

/// A channel's processor: given the channel's decoded output vector and a
/// mutable processor context, folds the output into the context. Returning
/// `Err` aborts the remainder of the payload (see [`Engine::run`]).
pub type ProcessorFn<C> = Box<dyn Fn(&[Value], &mut C) -> Result<(), DecoderError> + Send + Sync>;

/// A sparse mapping from channel selector byte to `{schema, processor}`.
pub struct ChannelMap<C> {
    entries: HashMap<u8, (Schema, ProcessorFn<C>)>,
}

impl<C> ChannelMap<C> {
    /// Creates an empty channel map.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Registers a channel's schema and processor. Overwrites any prior
    /// registration for the same selector byte.
    pub fn register(&mut self, channel: u8, schema: Schema, processor: ProcessorFn<C>) -> &mut Self {
        self.entries.insert(channel, (schema, processor));
        self
    }

    fn get(&self, channel: u8) -> Option<&(Schema, ProcessorFn<C>)> {
        self.entries.get(&channel)
    }
}

impl<C> Default for ChannelMap<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// The channel/schema engine. Stateless beyond its channel map: every call
/// to [`Engine::run`] gets a fresh cursor over the payload it's given.
pub struct Engine<C> {
    channels: ChannelMap<C>,
}

impl<C> Engine<C> {
    /// Builds an engine over a fixed channel map.
    pub fn new(channels: ChannelMap<C>) -> Self {
        Self { channels }
    }

    /// Runs the CHANNEL/DECODE/DISPATCH state machine over `payload`,
    /// invoking each channel's processor in the order channels appear in
    /// the payload. Returns `Ok(())` once the cursor reaches the end of the
    /// buffer while in the CHANNEL state, or the first error encountered.
    ///
    /// Processors run synchronously on the caller's task; per the
    /// concurrency model they must not block on network I/O themselves —
    /// they may only enqueue work (e.g. push onto a dispatch queue) and
    /// return promptly.
    pub fn run(&self, payload: &[u8], ctx: &mut C) -> Result<(), DecoderError> {
        let mut reader = BitReader::new(payload);
        loop {
            if reader.remaining_bits() == 0 {
                return Ok(());
            }
            let channel_byte = reader.peek_byte()?;
            let (schema, processor) = self
                .channels
                .get(channel_byte)
                .ok_or(DecoderError::ChannelNotFound(channel_byte))?;
            // Consume the channel selector byte itself.
            reader.read_bits(8)?;
            let values = decode_schema(schema, &mut reader)?;
            processor(&values, ctx)?;
            reader.align_to_byte();
        }
    }
}
