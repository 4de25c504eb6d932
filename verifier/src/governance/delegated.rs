use serde::{Deserialize, Serialize};
use wormhole_supported_chains::Chain;

use crate::{error::GovernanceError, reader::ByteReader};

pub const MANAGER_SET_UPDATE: u8 = 1;

/// module (32) + action (1) + target_chain (2) + manager_chain_id (2) + manager_set_index (4)
pub const MIN_PAYLOAD_LEN: usize = 41;

/// Replaces the manager set of `manager_chain_id`. The manager set itself is opaque here; see
/// [`crate::manager_set::Secp256k1MultisigManagerSet`] for the one format in use.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct ManagerSetUpdate {
    pub manager_chain_id: Chain,
    pub new_index: u32,
    #[serde(with = "crate::serde_base64")]
    pub manager_set: Vec<u8>,
}

impl ManagerSetUpdate {
    pub(super) fn decode_fields(r: &mut ByteReader<'_>) -> Result<Self, GovernanceError> {
        Ok(ManagerSetUpdate {
            manager_chain_id: Chain::from(r.read_u16("manager_chain_id")?),
            new_index: r.read_u32("manager_set_index")?,
            manager_set: r.rest().to_vec(),
        })
    }

    pub(super) fn write_fields(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&u16::from(self.manager_chain_id).to_be_bytes());
        out.extend_from_slice(&self.new_index.to_be_bytes());
        out.extend_from_slice(&self.manager_set);
    }
}
