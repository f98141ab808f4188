//! Rendering a raw 65-byte Antelope signature into its `SIG_K1_...` string
//! form: a base58check-style encoding using a RIPEMD160-derived checksum
//! rather than the double-SHA256 checksum of Bitcoin's base58check.
//!
//! Signing itself is out of scope (§1 Non-goals) — inputs arrive already
//! signed; this module only re-renders bytes the device already produced.

use ripemd::{Digest, Ripemd160};

const CURVE_SUFFIX: &[u8] = b"K1";

/// Renders a raw signature (`i: 1, r: 32, s: 32` = 65 bytes) as
/// `"SIG_K1_" + base58(sig ∥ ripemd160(sig ∥ "K1")[:4])`.
pub fn render_sig_k1(sig: &[u8]) -> String {
    let mut hash_input = Vec::with_capacity(sig.len() + CURVE_SUFFIX.len());
    hash_input.extend_from_slice(sig);
    hash_input.extend_from_slice(CURVE_SUFFIX);
    let digest = Ripemd160::digest(&hash_input);

    let mut payload = Vec::with_capacity(sig.len() + 4);
    payload.extend_from_slice(sig);
    payload.extend_from_slice(&digest[..4]);

    format!("SIG_K1_{}", bs58::encode(payload).into_string())
}
