//! Identifier newtypes shared across the gateway's crates.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A blockchain identifier, carried in the low 3 bits of a TAPOS fragment header.
///
/// The wire value is a single byte (`header & 0x7` space is reserved for the
/// transaction id; the chain id occupies its own byte in the TAPOS fragment),
/// but chains in practice number in the low single digits, so `u8` is ample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(pub u8);

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A device's uplink key (e.g. a LoRaWAN `dev_eui`), used to key the
/// per-device in-flight transaction table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceKey(pub String);

impl fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for DeviceKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DeviceKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A transaction id in `0..8`, the low 3 bits of every fragment header.
///
/// Constructing one validates the range so the rest of the reassembler can
/// treat `TrxId` as a trusted index into the 8-slot per-device table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrxId(u8);

impl TrxId {
    /// The size of the transaction-id space (3 bits => 8 slots).
    pub const SPACE: u8 = 8;

    /// Extracts the transaction id from a fragment header byte (low 3 bits).
    pub fn from_header(header: u8) -> Self {
        Self(header & 0x7)
    }

    /// Returns the raw `0..8` value.
    pub fn value(self) -> u8 {
        self.0
    }
}

impl fmt::Display for TrxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
