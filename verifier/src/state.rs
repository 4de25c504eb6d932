//! The core bridge state: guardian sets, consumed VAAs and everything governance can change.
//!
//! [`CoreState`] is a plain value mutated through `&mut self`, so a single owner is the single
//! writer. [`SharedState`] puts it behind a mutex for callers that submit from several threads;
//! the replay check and the consume then happen under one lock.

use std::{
    collections::BTreeSet,
    sync::{Arc, Mutex, MutexGuard},
};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    config::Config,
    error::{Error, GovernanceError, StateError},
    governance::{self, GovernanceAction, GovernancePacket, Module},
    guardian_set::{GuardianSet, GuardianSetStore},
    manager_set::{ManagerSet, ManagerSetStore},
    require,
    schnorr::{SchnorrKeyRecord, SchnorrKeyStore, VerifiedV2Vaa},
    vaa::Signature,
    verify::{self, Secp256k1Recover, VerifiedVaa},
    Address, GuardianAddress,
};

/// The outcome of a Core governance VAA.
///
/// Guardian set upgrades and fee changes are applied to the state. The others need chain specific
/// execution and are handed back to the caller, already authenticated and marked consumed.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum AppliedAction {
    GuardianSetUpgraded {
        index: u32,
    },
    MessageFeeSet {
        #[serde(with = "crate::serde_hex")]
        fee: [u8; 32],
    },
    ContractUpgrade {
        new_contract: Address,
    },
    TransferFees {
        #[serde(with = "crate::serde_hex")]
        amount: [u8; 32],
        recipient: Address,
    },
    RecoverChainId {
        #[serde(with = "crate::serde_hex")]
        evm_chain_id: [u8; 32],
        new_chain_id: u16,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CoreState {
    config: Config,
    guardian_sets: GuardianSetStore,
    /// `secp256k_hash` of every VAA that changed this state.
    #[serde(with = "hex_set")]
    consumed: BTreeSet<[u8; 32]>,
    #[serde(with = "crate::serde_hex")]
    message_fee: [u8; 32],
    #[serde(default)]
    manager_sets: ManagerSetStore,
    #[serde(default)]
    schnorr_keys: SchnorrKeyStore,
}

impl CoreState {
    /// Starts from guardian set 0 holding `genesis_keys`.
    pub fn new(
        config: Config,
        genesis_keys: Vec<GuardianAddress>,
        now: u32,
    ) -> Result<CoreState, Error> {
        let genesis = GuardianSet::new(0, genesis_keys, now)?;
        Ok(CoreState {
            config,
            guardian_sets: GuardianSetStore::genesis(genesis)?,
            consumed: BTreeSet::new(),
            message_fee: [0; 32],
            manager_sets: ManagerSetStore::default(),
            schnorr_keys: SchnorrKeyStore::default(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn guardian_sets(&self) -> &GuardianSetStore {
        &self.guardian_sets
    }

    /// The message fee as a big-endian uint256.
    pub fn message_fee(&self) -> &[u8; 32] {
        &self.message_fee
    }

    pub fn manager_sets(&self) -> &ManagerSetStore {
        &self.manager_sets
    }

    pub(crate) fn manager_sets_mut(&mut self) -> &mut ManagerSetStore {
        &mut self.manager_sets
    }

    pub fn schnorr_keys(&self) -> &SchnorrKeyStore {
        &self.schnorr_keys
    }

    pub(crate) fn schnorr_keys_mut(&mut self) -> &mut SchnorrKeyStore {
        &mut self.schnorr_keys
    }

    pub fn is_consumed(&self, digest: &[u8; 32]) -> bool {
        self.consumed.contains(digest)
    }

    pub(crate) fn consume(&mut self, digest: [u8; 32]) -> Result<(), StateError> {
        require!(
            self.consumed.insert(digest),
            StateError::VaaAlreadyConsumed(digest)
        );
        Ok(())
    }

    /// Verifies a classic VAA against this state's guardian sets. Read only; replays are not
    /// rejected here.
    pub fn verify_vaa<'a>(&self, raw: &'a [u8], now: u32) -> Result<VerifiedVaa<'a>, Error> {
        verify::verify_vaa(
            raw,
            &self.guardian_sets,
            now,
            &self.config.decode_options(),
            &Secp256k1Recover,
        )
    }

    /// Checks shared by every governance VAA, in order: a quorum of signatures, no replay, the
    /// current guardian set, the governance emitter, a well formed payload and a matching target
    /// chain.
    pub(crate) fn verify_governance<'a>(
        &self,
        raw: &'a [u8],
        now: u32,
    ) -> Result<(VerifiedVaa<'a>, GovernancePacket), Error> {
        let verified = self.verify_vaa(raw, now)?;

        let digest = verified.digest.secp256k_hash;
        if self.is_consumed(&digest) {
            warn!(digest = %hex::encode(digest), "governance vaa replayed");
            return Err(StateError::VaaAlreadyConsumed(digest).into());
        }

        let current = self.guardian_sets.current_index();
        let index = verified.header.guardian_set_index;
        require!(
            index == current,
            StateError::GovernanceSetNotCurrent { index, current }
        );

        governance::check_governance_emitter(&verified.body, &self.config)?;

        let packet = governance::decode_governance(&verified.body.payload)?;
        packet.check_target(self.config.chain_id)?;
        Ok((verified, packet))
    }

    /// Applies a "Core" governance VAA.
    pub fn submit_governance_vaa(&mut self, raw: &[u8], now: u32) -> Result<AppliedAction, Error> {
        let (verified, packet) = self.verify_governance(raw, now)?;
        governance::expect_module(&verified.body.payload, Module::Core)?;

        let applied = match packet.action {
            GovernanceAction::GuardianSetUpgrade { new_index, keys } => {
                let new_set = GuardianSet::new(new_index, keys, now)?;
                self.guardian_sets
                    .install(new_set, now, self.config.guardian_set_expiration)?;
                AppliedAction::GuardianSetUpgraded { index: new_index }
            }
            GovernanceAction::SetMessageFee { fee } => {
                self.message_fee = fee;
                AppliedAction::MessageFeeSet { fee }
            }
            GovernanceAction::ContractUpgrade { new_contract } => {
                AppliedAction::ContractUpgrade { new_contract }
            }
            GovernanceAction::TransferFees { amount, recipient } => {
                AppliedAction::TransferFees { amount, recipient }
            }
            GovernanceAction::RecoverChainId {
                evm_chain_id,
                new_chain_id,
            } => AppliedAction::RecoverChainId {
                evm_chain_id,
                new_chain_id,
            },
            other => return Err(GovernanceError::InvalidGovernanceAction(other.code()).into()),
        };

        self.consume(verified.digest.secp256k_hash)?;
        info!(
            action = ?applied,
            sequence = verified.body.sequence,
            "governance action applied"
        );
        Ok(applied)
    }
}

mod hex_set {
    use std::collections::BTreeSet;

    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(set: &BTreeSet<[u8; 32]>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(set.iter().map(hex::encode))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeSet<[u8; 32]>, D::Error> {
        Vec::<String>::deserialize(deserializer)?
            .iter()
            .map(|s| crate::serde_hex::parse(s).map_err(D::Error::custom))
            .collect()
    }
}

/// A [`CoreState`] shared between threads. Clones share the same state.
#[derive(Debug, Clone)]
pub struct SharedState(Arc<Mutex<CoreState>>);

impl SharedState {
    pub fn new(state: CoreState) -> SharedState {
        SharedState(Arc::new(Mutex::new(state)))
    }

    fn lock(&self) -> Result<MutexGuard<'_, CoreState>, StateError> {
        self.0.lock().map_err(|_| StateError::Poisoned)
    }

    /// Runs `f` with exclusive access to the state.
    pub fn with<R>(&self, f: impl FnOnce(&mut CoreState) -> R) -> Result<R, Error> {
        let mut state = self.lock()?;
        Ok(f(&mut state))
    }

    pub fn snapshot(&self) -> Result<CoreState, Error> {
        Ok(self.lock()?.clone())
    }

    pub fn is_consumed(&self, digest: &[u8; 32]) -> Result<bool, Error> {
        Ok(self.lock()?.is_consumed(digest))
    }

    pub fn verify_vaa<'a>(&self, raw: &'a [u8], now: u32) -> Result<VerifiedVaa<'a>, Error> {
        self.lock()?.verify_vaa(raw, now)
    }

    pub fn verify_v2_vaa<'a>(&self, raw: &'a [u8], now: u32) -> Result<VerifiedV2Vaa<'a>, Error> {
        self.lock()?.verify_v2_vaa(raw, now)
    }

    pub fn submit_governance_vaa(&self, raw: &[u8], now: u32) -> Result<AppliedAction, Error> {
        self.lock()?.submit_governance_vaa(raw, now)
    }

    pub fn submit_new_manager_set(
        &self,
        vaa_body: &[u8],
        expected_digest: [u8; 32],
        signatures: &[Signature],
        guardian_set_index: u32,
        now: u32,
    ) -> Result<ManagerSet, Error> {
        self.lock()?.submit_new_manager_set(
            vaa_body,
            expected_digest,
            signatures,
            guardian_set_index,
            now,
        )
    }

    pub fn append_schnorr_key(&self, raw: &[u8], now: u32) -> Result<SchnorrKeyRecord, Error> {
        self.lock()?.append_schnorr_key(raw, now)
    }
}
