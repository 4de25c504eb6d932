//! Actions of the "Core" governance module, executed by the core bridge contract itself.

use wormhole_supported_chains::Chain;

use super::{GovernanceAction, GovernancePacket, TARGETED_HEADER_LEN};
use crate::{error::GovernanceError, reader::ByteReader, require, Address, GuardianAddress};

pub const CONTRACT_UPGRADE: u8 = 1;
pub const GUARDIAN_SET_UPGRADE: u8 = 2;
pub const SET_MESSAGE_FEE: u8 = 3;
pub const TRANSFER_FEES: u8 = 4;
pub const RECOVER_CHAIN_ID: u8 = 5;

/// Decodes the fields after the action byte. `r` is positioned just past it.
pub(super) fn decode(
    action: u8,
    payload_len: usize,
    r: &mut ByteReader<'_>,
) -> Result<GovernancePacket, GovernanceError> {
    if action == RECOVER_CHAIN_ID {
        let evm_chain_id = r.read_array("evm_chain_id")?;
        let new_chain_id = r.read_u16("new_chain_id")?;
        return Ok(GovernancePacket::new(
            Chain::Any,
            GovernanceAction::RecoverChainId {
                evm_chain_id,
                new_chain_id,
            },
        ));
    }

    require!(
        payload_len >= TARGETED_HEADER_LEN,
        GovernanceError::GovernancePayloadTooShort {
            len: payload_len,
            min: TARGETED_HEADER_LEN,
        }
    );
    let target_chain = Chain::from(r.read_u16("target_chain")?);

    let action = match action {
        CONTRACT_UPGRADE => GovernanceAction::ContractUpgrade {
            new_contract: Address(r.read_array("new_contract")?),
        },
        GUARDIAN_SET_UPGRADE => {
            let new_index = r.read_u32("new_guardian_set_index")?;
            let count = r.read_u8("guardian_count")?;
            let keys = (0..count)
                .map(|_| r.read_array("guardian_key").map(GuardianAddress))
                .collect::<Result<Vec<_>, _>>()?;
            GovernanceAction::GuardianSetUpgrade { new_index, keys }
        }
        SET_MESSAGE_FEE => GovernanceAction::SetMessageFee {
            fee: r.read_array("fee")?,
        },
        TRANSFER_FEES => GovernanceAction::TransferFees {
            amount: r.read_array("amount")?,
            recipient: Address(r.read_array("recipient")?),
        },
        other => return Err(GovernanceError::InvalidGovernanceAction(other)),
    };

    Ok(GovernancePacket::new(target_chain, action))
}

pub(super) fn write_fields(
    action: &GovernanceAction,
    out: &mut Vec<u8>,
) -> Result<(), GovernanceError> {
    match action {
        GovernanceAction::ContractUpgrade { new_contract } => out.extend_from_slice(&new_contract.0),
        GovernanceAction::GuardianSetUpgrade { new_index, keys } => {
            out.extend_from_slice(&new_index.to_be_bytes());
            let count = u8::try_from(keys.len())
                .map_err(|_| GovernanceError::TooManyGuardianKeys(keys.len()))?;
            out.push(count);
            for key in keys {
                out.extend_from_slice(&key.0);
            }
        }
        GovernanceAction::SetMessageFee { fee } => out.extend_from_slice(fee),
        GovernanceAction::TransferFees { amount, recipient } => {
            out.extend_from_slice(amount);
            out.extend_from_slice(&recipient.0);
        }
        GovernanceAction::RecoverChainId {
            evm_chain_id,
            new_chain_id,
        } => {
            out.extend_from_slice(evm_chain_id);
            out.extend_from_slice(&new_chain_id.to_be_bytes());
        }
        GovernanceAction::AppendSchnorrKey(_)
        | GovernanceAction::ManagerSetUpdate(_)
        | GovernanceAction::Unknown { .. } => {}
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use hex_literal::hex;

    use super::*;
    use crate::{
        error::DecodeError,
        governance::{decode_governance, Module, CORE_MODULE},
    };

    #[test]
    fn guardian_set_upgrade() {
        // Upgrade to guardian set 1 with the first two devnet guardians.
        let payload = hex!(
            "00000000000000000000000000000000000000000000000000000000436f7265"
            "02"
            "0000"
            "00000001"
            "02"
            "befa429d57cd18b7f8a4d91a2da9ab4af05d0fbe"
            "88d7d8b32a9105d228100e72dffe2fae0705d31c"
        );

        let packet = decode_governance(&payload).unwrap();
        assert_eq!(Chain::Any, packet.target_chain);
        assert_eq!(Module::Core, packet.module());
        assert_eq!(
            GovernanceAction::GuardianSetUpgrade {
                new_index: 1,
                keys: vec![
                    GuardianAddress(hex!("befa429d57cd18b7f8a4d91a2da9ab4af05d0fbe")),
                    GuardianAddress(hex!("88d7d8b32a9105d228100e72dffe2fae0705d31c")),
                ],
            },
            packet.action
        );
        assert_eq!(&payload[..], packet.encode().unwrap());
    }

    #[test]
    fn guardian_set_upgrade_truncated_keys() {
        let payload = hex!(
            "00000000000000000000000000000000000000000000000000000000436f7265"
            "02"
            "0000"
            "00000001"
            "02"
            "befa429d57cd18b7f8a4d91a2da9ab4af05d0fbe"
        );
        assert!(matches!(
            decode_governance(&payload),
            Err(GovernanceError::Decode(DecodeError::TruncatedInput {
                field: "guardian_key",
                ..
            }))
        ));
    }

    #[test]
    fn contract_upgrade() {
        let packet = GovernancePacket::new(
            Chain::Terra2,
            GovernanceAction::ContractUpgrade {
                new_contract: Address([0x11; 32]),
            },
        );
        let payload = packet.encode().unwrap();
        assert_eq!(TARGETED_HEADER_LEN + 32, payload.len());
        assert_eq!(&[0x00, 0x12], &payload[33..35]);
        assert_eq!(packet, decode_governance(&payload).unwrap());
    }

    #[test]
    fn upgrade_key_count_must_fit_a_byte() {
        let upgrade = |n| {
            GovernancePacket::new(
                Chain::Any,
                GovernanceAction::GuardianSetUpgrade {
                    new_index: 1,
                    keys: vec![GuardianAddress([7; 20]); n],
                },
            )
        };
        let payload = upgrade(255).encode().unwrap();
        assert_eq!(255, payload[TARGETED_HEADER_LEN + 4]);
        assert_eq!(
            Err(GovernanceError::TooManyGuardianKeys(256)),
            upgrade(256).encode()
        );
    }

    #[test]
    fn transfer_fees() {
        let mut amount = [0u8; 32];
        amount[31] = 100;
        let packet = GovernancePacket::new(
            Chain::Any,
            GovernanceAction::TransferFees {
                amount,
                recipient: Address([0x22; 32]),
            },
        );
        assert_eq!(packet, decode_governance(&packet.encode().unwrap()).unwrap());
    }

    #[test]
    fn recover_chain_id_has_no_target() {
        let mut payload = CORE_MODULE.to_vec();
        payload.push(RECOVER_CHAIN_ID);
        let mut evm_chain_id = [0u8; 32];
        evm_chain_id[31] = 1;
        payload.extend_from_slice(&evm_chain_id);
        payload.extend_from_slice(&2u16.to_be_bytes());

        let packet = decode_governance(&payload).unwrap();
        assert_eq!(
            GovernanceAction::RecoverChainId {
                evm_chain_id,
                new_chain_id: 2,
            },
            packet.action
        );
        assert_eq!(Chain::Any, packet.target_chain);
        assert_eq!(payload, packet.encode().unwrap());
    }

    #[test]
    fn missing_target_chain() {
        let mut payload = CORE_MODULE.to_vec();
        payload.extend_from_slice(&[SET_MESSAGE_FEE, 0x00]);
        assert_eq!(
            Err(GovernanceError::GovernancePayloadTooShort { len: 34, min: 35 }),
            decode_governance(&payload)
        );
    }
}
