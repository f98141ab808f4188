//! Shared types, error taxonomy and configuration for the ELPP gateway.
//!
//! This crate sits at the bottom of the dependency graph: the codec,
//! reassembler, TAPOS manager, dispatch queue and HTTP surface crates all
//! depend on it for their identifier newtypes, error enums and config tree,
//! but it depends on nothing else in the workspace.

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod ids;
pub mod tx;

pub use config::{ChainConfig, GatewayConfig, TaposTuning};
pub use error::{DecoderError, DispatchError, ErrorCode, GatewayError, TaposError};
pub use ids::{ChainId, DeviceKey, TrxId};
pub use tx::{DecodeOutcome, PackedTransaction};
