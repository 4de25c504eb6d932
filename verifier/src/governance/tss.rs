//! Actions of the "TSS" governance module, which manages the threshold Schnorr keys that sign
//! version 2 VAAs.

use serde::{Deserialize, Serialize};

use crate::{error::GovernanceError, reader::ByteReader};

pub const APPEND_SCHNORR_KEY: u8 = 1;

/// Full payload size: module, action, key index, key, expiration delay and shard data hash.
pub const APPEND_SCHNORR_KEY_LEN: usize = 32 + 1 + 4 + 32 + 4 + 32;

/// Appends a new Schnorr key and schedules the expiration of the one it replaces.
///
/// This action has no target chain. The payload is
///
/// ```text
/// module [32] | action u8 = 1 | schnorr_key_index u32 | schnorr_key [32] |
/// expiration_delay_seconds u32 | shard_data_hash [32]
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AppendSchnorrKey {
    pub index: u32,
    #[serde(with = "crate::serde_hex")]
    pub key: [u8; 32],
    pub expiration_delay_seconds: u32,
    /// Commitment to the key shards held by the guardians, recorded alongside the key.
    #[serde(with = "crate::serde_hex")]
    pub shard_data_hash: [u8; 32],
}

impl AppendSchnorrKey {
    pub(super) fn decode_fields(r: &mut ByteReader<'_>) -> Result<Self, GovernanceError> {
        Ok(AppendSchnorrKey {
            index: r.read_u32("schnorr_key_index")?,
            key: r.read_array("schnorr_key")?,
            expiration_delay_seconds: r.read_u32("expiration_delay_seconds")?,
            shard_data_hash: r.read_array("shard_data_hash")?,
        })
    }

    pub(super) fn write_fields(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.index.to_be_bytes());
        out.extend_from_slice(&self.key);
        out.extend_from_slice(&self.expiration_delay_seconds.to_be_bytes());
        out.extend_from_slice(&self.shard_data_hash);
    }
}
