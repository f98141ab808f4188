//! The reassembler's result shape and the blockchain-ready transaction body
//! it produces once a device's fragments are complete.

use serde::Serialize;

use crate::ids::{ChainId, DeviceKey};

/// The JSON body POSTed to `/v1/chain/send_transaction`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackedTransaction {
    /// Rendered `SIG_K1_...` signatures, one per fragment's signature field.
    pub signatures: Vec<String>,
    /// Always `false` — compression is not implemented by this gateway.
    pub compression: bool,
    /// Always empty — context-free actions are not supported by this gateway.
    pub packed_context_free_data: String,
    /// Hex-encoded `tapos ∥ [context_free_actions_count] ∥ action ∥ data` bytes.
    pub packed_trx: String,
}

/// The closed result of reassembling one uplink payload for one device.
///
/// Modeled as a Rust sum type rather than a dynamic object with optional
/// fields, per the design notes: exactly one of these shapes is produced
/// per decode, and the type system (plus [`crate::error::GatewayError`] for
/// the decode-failed path, carried alongside in a `Result`) enforces that a
/// caller handles every case.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeOutcome {
    /// All four fragments for a transaction id were present; here is the
    /// blockchain-ready body, which chain to dispatch it to, and the
    /// device it came from.
    Complete {
        /// The fully assembled transaction body.
        transaction: PackedTransaction,
        /// Which chain to submit it to.
        chain: ChainId,
        /// The device the transaction was reassembled from.
        device: DeviceKey,
    },
    /// The device asked for current TAPOS reference-block metadata.
    TaposRequest {
        /// Which chain's TAPOS the device wants.
        chain: ChainId,
        /// An opaque request id the device expects echoed back in the downlink.
        req_id: u8,
    },
    /// At least one fragment was decoded but no transaction id completed.
    Incomplete {
        /// A human-readable summary of which fields are still missing, e.g.
        /// `"has tapos, has action, needs data, needs signature"`.
        status: String,
    },
}
