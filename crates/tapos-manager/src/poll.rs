//! The `/v1/chain/get_info` poll: issuing the request, parsing the
//! response, and deriving `ref_block_num`/`ref_block_prefix` from it.
//!
//! Takes the shared `reqwest::Client` by reference rather than constructing
//! one per call.

use elpp_types::{ChainId, TaposError};
use serde::Deserialize;

use crate::pool::ApiHost;
use crate::state::TaposSnapshot;

#[derive(Debug, Deserialize)]
struct GetInfoResponse {
    chain_id: String,
    last_irreversible_block_num: u64,
    last_irreversible_block_id: String,
    #[serde(default)]
    server_version_string: Option<String>,
}

/// Issues `GET <host>/v1/chain/get_info`, validates the chain id, and
/// derives the TAPOS snapshot (§4.5 step 3).
pub async fn poll_get_info(
    client: &reqwest::Client,
    host: &ApiHost,
    chain: ChainId,
    expected_chain_hash: &str,
    now_epoch: u64,
) -> Result<(TaposSnapshot, Option<String>), TaposError> {
    let url = format!("{}/v1/chain/get_info", host.base_url());
    let resp = client
        .get(&url)
        .send()
        .await
        .map_err(|e| TaposError::Transport(e.to_string()))?;

    if !resp.status().is_success() {
        return Err(TaposError::Transport(format!("HTTP {}", resp.status())));
    }

    let body: GetInfoResponse = resp
        .json()
        .await
        .map_err(|e| TaposError::InvalidResponse(e.to_string()))?;

    if !body.chain_id.eq_ignore_ascii_case(expected_chain_hash) {
        return Err(TaposError::ChainIdMismatch {
            chain,
            expected: expected_chain_hash.to_string(),
            got: body.chain_id,
        });
    }

    let block_id_bytes = hex::decode(&body.last_irreversible_block_id)
        .map_err(|e| TaposError::InvalidResponse(format!("last_irreversible_block_id not hex: {e}")))?;
    if block_id_bytes.len() < 12 {
        return Err(TaposError::InvalidResponse(format!(
            "last_irreversible_block_id too short: {} bytes",
            block_id_bytes.len()
        )));
    }
    let ref_block_prefix = u32::from_le_bytes([
        block_id_bytes[8],
        block_id_bytes[9],
        block_id_bytes[10],
        block_id_bytes[11],
    ]);
    let ref_block_num = (body.last_irreversible_block_num & 0xFFFF) as u16;

    Ok((
        TaposSnapshot {
            acq_epoch: now_epoch,
            ref_block_num,
            ref_block_prefix,
        },
        body.server_version_string,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ref_block_prefix_reads_le_u32_at_offset_8() {
        // block id: 4 bytes block height + 28 bytes hash; offset 8..12 of
        // the hash portion carries the prefix per the chain's block-id layout.
        let mut raw = vec![0u8; 32];
        raw[8..12].copy_from_slice(&0xDEADBEEFu32.to_le_bytes());
        let hex_id = hex::encode(&raw);
        let block_id_bytes = hex::decode(&hex_id).unwrap();
        let prefix = u32::from_le_bytes([
            block_id_bytes[8],
            block_id_bytes[9],
            block_id_bytes[10],
            block_id_bytes[11],
        ]);
        assert_eq!(prefix, 0xDEADBEEF);
    }

    #[test]
    fn ref_block_num_masks_to_16_bits() {
        let num: u64 = 0x1_0001_2345;
        assert_eq!((num & 0xFFFF) as u16, 0x2345);
    }
}
