//! Governance payloads, the instructions guardians send to Wormhole contracts themselves.
//!
//! Every payload starts with a 32 byte module name (ASCII, left zero padded) and a one byte
//! action. Most actions then carry the chain they target, with 0 meaning every chain.

use serde::{Deserialize, Serialize};
use tracing::warn;
use wormhole_supported_chains::Chain;

use crate::{
    config::Config, error::GovernanceError, reader::ByteReader, require, vaa::Body, Address,
    GuardianAddress,
};

pub mod core;
pub mod delegated;
pub mod tss;

pub use self::{delegated::ManagerSetUpdate, tss::AppendSchnorrKey};

/// Module name and action code.
pub const HEADER_LEN: usize = 33;

/// Module name, action code and target chain.
pub const TARGETED_HEADER_LEN: usize = HEADER_LEN + 2;

/// "Core", left zero padded.
pub const CORE_MODULE: [u8; 32] = module_name(b"Core");

/// "TSS", left zero padded. Owns the Schnorr keys that sign version 2 VAAs.
pub const TSS_MODULE: [u8; 32] = module_name(b"TSS");

/// "DelegatedManager", left zero padded.
pub const DELEGATED_MANAGER_MODULE: [u8; 32] = module_name(b"DelegatedManager");

const fn module_name(name: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    let offset = 32 - name.len();
    let mut i = 0;
    while i < name.len() {
        out[offset + i] = name[i];
        i += 1;
    }
    out
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Module {
    Core,
    Tss,
    DelegatedManager,
    Other(#[serde(with = "crate::serde_hex")] [u8; 32]),
}

impl Module {
    pub fn from_bytes(bytes: [u8; 32]) -> Module {
        match bytes {
            CORE_MODULE => Module::Core,
            TSS_MODULE => Module::Tss,
            DELEGATED_MANAGER_MODULE => Module::DelegatedManager,
            other => Module::Other(other),
        }
    }

    pub fn to_bytes(self) -> [u8; 32] {
        match self {
            Module::Core => CORE_MODULE,
            Module::Tss => TSS_MODULE,
            Module::DelegatedManager => DELEGATED_MANAGER_MODULE,
            Module::Other(bytes) => bytes,
        }
    }
}

/// A decoded governance instruction.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub enum GovernanceAction {
    /// Core 1: replace the contract with the one identified by `new_contract`.
    ContractUpgrade {
        new_contract: Address,
    },

    /// Core 2: install the next guardian set.
    GuardianSetUpgrade {
        new_index: u32,
        keys: Vec<GuardianAddress>,
    },

    /// Core 3: set the message fee, a big-endian uint256.
    SetMessageFee {
        #[serde(with = "crate::serde_hex")]
        fee: [u8; 32],
    },

    /// Core 4: pay out collected fees.
    TransferFees {
        #[serde(with = "crate::serde_hex")]
        amount: [u8; 32],
        recipient: Address,
    },

    /// Core 5: recover after an EVM hard fork changed the chain's EVM chain id. Carries no target
    /// chain; the EVM chain id plays that role.
    RecoverChainId {
        #[serde(with = "crate::serde_hex")]
        evm_chain_id: [u8; 32],
        new_chain_id: u16,
    },

    /// TSS 1.
    AppendSchnorrKey(AppendSchnorrKey),

    /// DelegatedManager 1.
    ManagerSetUpdate(ManagerSetUpdate),

    /// Any other `(module, action)` pair. `body` is everything after the action byte.
    Unknown {
        module: Module,
        action: u8,
        #[serde(with = "serde_bytes")]
        body: Vec<u8>,
    },
}

impl GovernanceAction {
    pub fn module(&self) -> Module {
        match self {
            GovernanceAction::ContractUpgrade { .. }
            | GovernanceAction::GuardianSetUpgrade { .. }
            | GovernanceAction::SetMessageFee { .. }
            | GovernanceAction::TransferFees { .. }
            | GovernanceAction::RecoverChainId { .. } => Module::Core,
            GovernanceAction::AppendSchnorrKey(_) => Module::Tss,
            GovernanceAction::ManagerSetUpdate(_) => Module::DelegatedManager,
            GovernanceAction::Unknown { module, .. } => *module,
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            GovernanceAction::ContractUpgrade { .. } => core::CONTRACT_UPGRADE,
            GovernanceAction::GuardianSetUpgrade { .. } => core::GUARDIAN_SET_UPGRADE,
            GovernanceAction::SetMessageFee { .. } => core::SET_MESSAGE_FEE,
            GovernanceAction::TransferFees { .. } => core::TRANSFER_FEES,
            GovernanceAction::RecoverChainId { .. } => core::RECOVER_CHAIN_ID,
            GovernanceAction::AppendSchnorrKey(_) => tss::APPEND_SCHNORR_KEY,
            GovernanceAction::ManagerSetUpdate(_) => delegated::MANAGER_SET_UPDATE,
            GovernanceAction::Unknown { action, .. } => *action,
        }
    }

    /// Encodes the action as a governance payload. `target_chain` is dropped for actions whose
    /// wire format has no target field.
    pub fn encode(&self, target_chain: Chain) -> Result<Vec<u8>, GovernanceError> {
        let mut out = Vec::with_capacity(TARGETED_HEADER_LEN + 64);
        out.extend_from_slice(&self.module().to_bytes());
        out.push(self.code());
        if self.has_target() {
            out.extend_from_slice(&u16::from(target_chain).to_be_bytes());
        }

        match self {
            GovernanceAction::AppendSchnorrKey(msg) => msg.write_fields(&mut out),
            GovernanceAction::ManagerSetUpdate(msg) => msg.write_fields(&mut out),
            GovernanceAction::Unknown { body, .. } => out.extend_from_slice(body),
            action => core::write_fields(action, &mut out)?,
        }
        Ok(out)
    }

    /// Whether the wire format carries a target chain after the action byte.
    fn has_target(&self) -> bool {
        !matches!(
            self,
            GovernanceAction::RecoverChainId { .. }
                | GovernanceAction::AppendSchnorrKey(_)
                | GovernanceAction::Unknown { .. }
        )
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct GovernancePacket {
    /// `Chain::Any` for actions that apply everywhere, including those without a target field.
    pub target_chain: Chain,
    pub action: GovernanceAction,
}

impl GovernancePacket {
    pub fn new(target_chain: Chain, action: GovernanceAction) -> GovernancePacket {
        GovernancePacket {
            target_chain,
            action,
        }
    }

    /// Accepts packets for every chain or for `our_chain`.
    pub fn check_target(&self, our_chain: Chain) -> Result<(), GovernanceError> {
        require!(
            self.target_chain == Chain::Any || self.target_chain == our_chain,
            GovernanceError::InvalidTargetChain(self.target_chain)
        );
        Ok(())
    }

    pub fn module(&self) -> Module {
        self.action.module()
    }

    /// Encodes the packet as a VAA payload.
    pub fn encode(&self) -> Result<Vec<u8>, GovernanceError> {
        self.action.encode(self.target_chain)
    }
}

/// Decodes a governance payload.
///
/// Unrecognised `(module, action)` pairs decode to [`GovernanceAction::Unknown`]; deciding
/// whether those are acceptable is up to the caller.
pub fn decode_governance(payload: &[u8]) -> Result<GovernancePacket, GovernanceError> {
    require!(
        payload.len() >= HEADER_LEN,
        GovernanceError::GovernancePayloadTooShort {
            len: payload.len(),
            min: HEADER_LEN,
        }
    );

    let mut r = ByteReader::new(payload);
    let module = Module::from_bytes(r.read_array("module")?);
    let action = r.read_u8("action")?;

    let packet = match (module, action) {
        (Module::Core, core::CONTRACT_UPGRADE..=core::RECOVER_CHAIN_ID) => {
            core::decode(action, payload.len(), &mut r)?
        }
        (Module::Tss, tss::APPEND_SCHNORR_KEY) => GovernancePacket::new(
            Chain::Any,
            GovernanceAction::AppendSchnorrKey(AppendSchnorrKey::decode_fields(&mut r)?),
        ),
        (Module::DelegatedManager, delegated::MANAGER_SET_UPDATE) => {
            require!(
                payload.len() >= delegated::MIN_PAYLOAD_LEN,
                GovernanceError::GovernancePayloadTooShort {
                    len: payload.len(),
                    min: delegated::MIN_PAYLOAD_LEN,
                }
            );
            let target_chain = Chain::from(r.read_u16("target_chain")?);
            GovernancePacket::new(
                target_chain,
                GovernanceAction::ManagerSetUpdate(ManagerSetUpdate::decode_fields(&mut r)?),
            )
        }
        (module, action) => GovernancePacket::new(
            Chain::Any,
            GovernanceAction::Unknown {
                module,
                action,
                body: r.rest().to_vec(),
            },
        ),
    };

    match r.remaining() {
        0 => Ok(packet),
        n => Err(GovernanceError::TrailingBytes(n)),
    }
}

/// Checks that a payload belongs to `expected` without decoding the rest of it.
pub fn expect_module(payload: &[u8], expected: Module) -> Result<(), GovernanceError> {
    require!(
        payload.len() >= 32,
        GovernanceError::GovernancePayloadTooShort {
            len: payload.len(),
            min: HEADER_LEN,
        }
    );
    let mut module = [0u8; 32];
    module.copy_from_slice(&payload[..32]);
    require!(
        Module::from_bytes(module) == expected,
        GovernanceError::InvalidGovernanceModule
    );
    Ok(())
}

/// Governance VAAs are only accepted from the configured emitter.
pub fn check_governance_emitter(body: &Body, config: &Config) -> Result<(), GovernanceError> {
    if body.emitter_chain != config.governance_chain {
        warn!(chain = %body.emitter_chain, "governance vaa from the wrong chain");
        return Err(GovernanceError::InvalidGovernanceChain(body.emitter_chain));
    }
    if body.emitter_address != config.governance_emitter {
        warn!(emitter = %body.emitter_address, "governance vaa from the wrong emitter");
        return Err(GovernanceError::InvalidGovernanceEmitter(body.emitter_address));
    }
    Ok(())
}
