//! Delegated manager sets.
//!
//! Some chains (Dogecoin, for one) cannot verify guardian signatures themselves. Guardians
//! instead delegate custody to a manager set, a multisig native to that chain, and announce each
//! new set through a governance VAA of the "DelegatedManager" module. This module records those
//! announcements: one monotonically increasing index per manager chain.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use wormhole_supported_chains::Chain;

use crate::{
    digest::digest,
    error::{Error, GovernanceError, ManagerSetError, StateError, VerificationError},
    governance::{self, GovernanceAction, ManagerSetUpdate, Module},
    require,
    state::CoreState,
    vaa::{Body, Signature},
    verify::{verify_signatures, Secp256k1Recover},
};

/// A manager set as announced by governance. The set itself is kept opaque.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct ManagerSet {
    pub manager_chain_id: Chain,
    pub index: u32,
    #[serde(with = "crate::serde_base64")]
    pub manager_set: Vec<u8>,
}

impl ManagerSet {
    pub fn decode_multisig(&self) -> Result<Secp256k1MultisigManagerSet, ManagerSetError> {
        Secp256k1MultisigManagerSet::decode(&self.manager_set)
    }
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
struct ManagerChain {
    current_index: u32,
    sets: BTreeMap<u32, ManagerSet>,
}

/// Manager sets of every manager chain, keyed by chain id and index.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct ManagerSetStore {
    chains: BTreeMap<u16, ManagerChain>,
}

impl ManagerSetStore {
    /// 0 for chains that never had a manager set.
    pub fn current_index(&self, chain: Chain) -> u32 {
        self.chains
            .get(&u16::from(chain))
            .map_or(0, |c| c.current_index)
    }

    pub fn get(&self, chain: Chain, index: u32) -> Option<&ManagerSet> {
        self.chains.get(&u16::from(chain))?.sets.get(&index)
    }

    pub fn current(&self, chain: Chain) -> Option<&ManagerSet> {
        self.get(chain, self.current_index(chain))
    }

    /// Stores the next manager set of its chain.
    pub fn store(&mut self, set: ManagerSet) -> Result<(), ManagerSetError> {
        let expected = self.current_index(set.manager_chain_id).wrapping_add(1);
        require!(
            set.index == expected,
            ManagerSetError::InvalidManagerSetIndex {
                expected,
                got: set.index,
            }
        );

        let chain = self.chains.entry(u16::from(set.manager_chain_id)).or_default();
        chain.current_index = set.index;
        chain.sets.insert(set.index, set);
        Ok(())
    }
}

/// The secp256k1 m-of-n multisig manager set:
///
/// ```text
/// type u8 = 1 | m u8 | n u8 | n * compressed public key [33]
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct Secp256k1MultisigManagerSet {
    pub m: u8,
    pub n: u8,
    #[serde(with = "hex_keys")]
    pub public_keys: Vec<[u8; 33]>,
}

impl Secp256k1MultisigManagerSet {
    pub const TYPE: u8 = 1;
    pub const PUBLIC_KEY_LEN: usize = 33;
    const HEADER_LEN: usize = 3;

    pub fn decode(bytes: &[u8]) -> Result<Self, ManagerSetError> {
        require!(
            bytes.len() >= Self::HEADER_LEN,
            ManagerSetError::PayloadTooShort {
                min: Self::HEADER_LEN,
                len: bytes.len(),
            }
        );

        let (kind, m, n) = (bytes[0], bytes[1], bytes[2]);
        require!(
            kind == Self::TYPE,
            ManagerSetError::UnexpectedManagerSetType(kind)
        );
        require!(m >= 1, ManagerSetError::ThresholdZero);
        require!(m <= n, ManagerSetError::ThresholdAboveSize { m, n });

        let expected = Self::HEADER_LEN + usize::from(n) * Self::PUBLIC_KEY_LEN;
        require!(
            bytes.len() == expected,
            ManagerSetError::PayloadLengthMismatch {
                expected,
                len: bytes.len(),
            }
        );

        let public_keys = bytes[Self::HEADER_LEN..]
            .chunks_exact(Self::PUBLIC_KEY_LEN)
            .map(|chunk| {
                let mut key = [0u8; 33];
                key.copy_from_slice(chunk);
                key
            })
            .collect();

        Ok(Secp256k1MultisigManagerSet { m, n, public_keys })
    }

    pub fn validate(&self) -> Result<(), ManagerSetError> {
        require!(self.m >= 1, ManagerSetError::ThresholdZero);
        require!(
            self.m <= self.n,
            ManagerSetError::ThresholdAboveSize {
                m: self.m,
                n: self.n
            }
        );
        require!(
            usize::from(self.n) == self.public_keys.len(),
            ManagerSetError::KeyCountMismatch {
                n: self.n,
                keys: self.public_keys.len(),
            }
        );
        Ok(())
    }

    pub fn encode(&self) -> Result<Vec<u8>, ManagerSetError> {
        self.validate()?;

        let mut out = Vec::with_capacity(Self::HEADER_LEN + self.public_keys.len() * 33);
        out.extend_from_slice(&[Self::TYPE, self.m, self.n]);
        for key in &self.public_keys {
            out.extend_from_slice(key);
        }
        Ok(out)
    }
}

mod hex_keys {
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(keys: &[[u8; 33]], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(keys.iter().map(hex::encode))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<[u8; 33]>, D::Error> {
        Vec::<String>::deserialize(deserializer)?
            .iter()
            .map(|s| crate::serde_hex::parse(s).map_err(D::Error::custom))
            .collect()
    }
}

impl CoreState {
    /// Applies a "DelegatedManager" governance VAA delivered as its parts: the raw body, the
    /// digest the caller computed, and the guardian signatures.
    ///
    /// On success the new manager set is stored and the VAA is recorded as consumed.
    pub fn submit_new_manager_set(
        &mut self,
        vaa_body: &[u8],
        expected_digest: [u8; 32],
        signatures: &[Signature],
        guardian_set_index: u32,
        now: u32,
    ) -> Result<ManagerSet, Error> {
        let digest = digest(vaa_body);
        require!(
            digest.secp256k_hash == expected_digest,
            ManagerSetError::DigestMismatch
        );
        if self.is_consumed(&digest.secp256k_hash) {
            warn!(digest = %hex::encode(digest.secp256k_hash), "manager set vaa replayed");
            return Err(StateError::VaaAlreadyConsumed(digest.secp256k_hash).into());
        }

        let guardian_sets = self.guardian_sets();
        let guardian_set = guardian_sets
            .get(guardian_set_index)
            .ok_or(VerificationError::UnknownGuardianSet(guardian_set_index))?;
        verify_signatures(
            vaa_body,
            signatures,
            guardian_set,
            guardian_sets.current_index(),
            now,
            &Secp256k1Recover,
        )?;

        let body = Body::decode(vaa_body, &self.config().decode_options())
            .map_err(|_| ManagerSetError::InvalidVaaBody)?;
        governance::check_governance_emitter(&body, self.config())?;

        governance::expect_module(&body.payload, Module::DelegatedManager)?;
        let packet = governance::decode_governance(&body.payload)?;
        let update = match &packet.action {
            GovernanceAction::ManagerSetUpdate(update) => update.clone(),
            other => return Err(GovernanceError::InvalidGovernanceAction(other.code()).into()),
        };
        packet.check_target(self.config().chain_id)?;

        let ManagerSetUpdate {
            manager_chain_id,
            new_index,
            manager_set,
        } = update;
        let set = ManagerSet {
            manager_chain_id,
            index: new_index,
            manager_set,
        };
        self.manager_sets_mut().store(set.clone())?;
        self.consume(digest.secp256k_hash)?;

        info!(
            manager_chain = %manager_chain_id,
            index = new_index,
            "manager set updated"
        );
        Ok(set)
    }
}
