//! ELPP: a bit-granular, channel-multiplexed wire codec.
//!
//! This crate implements the four layers described in the design: bit
//! buffer primitives ([`bits`]), primitive codecs ([`primitive`]),
//! composable type schemas ([`schema`]), and the channel engine
//! ([`engine`]) that ties them together into a table-driven decoder.
//!
//! Grounded on the teacher's `crates/types/src/codec.rs` convention of
//! centralizing the wire format in one crate that every consumer shares, so
//! there is exactly one place that defines "what bytes on the wire mean".

#![forbid(unsafe_code)]

pub mod bits;
pub mod engine;
pub mod primitive;
pub mod schema;

pub use bits::{capture_bits, emplace_bits, BitReader, BitWriter};
pub use engine::{ChannelMap, Engine, ProcessorFn};
pub use primitive::{decode_primitive, encode_primitive, PrimitiveKind, Value};
pub use schema::{decode_schema, encode_schema, Schema};
