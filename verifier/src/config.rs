use std::{fs, path::Path};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use wormhole_supported_chains::Chain;

use crate::{Address, GOVERNANCE_EMITTER};

/// How to treat emitter chain ids that [`Chain`] has no name for.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
pub enum ChainPolicy {
    /// Keep the raw id as `Chain::Unknown`.
    #[default]
    PassThrough,
    RejectUnknown,
}

/// Where the payload of an envelope ends.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
pub enum PayloadEncoding {
    /// The payload is everything after the fixed fields. This is the classic wire format.
    #[default]
    Trailing,
    /// The payload is preceded by its length as a big-endian `u32`.
    LengthPrefixed,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    pub chain_policy: ChainPolicy,
    pub payload_encoding: PayloadEncoding,
}

/// Settings of a core verifier instance.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
pub struct Config {
    /// The chain this verifier runs on, used to check governance target chains.
    #[cfg_attr(feature = "schemars", schemars(with = "u16"))]
    pub chain_id: Chain,

    #[cfg_attr(feature = "schemars", schemars(with = "u16"))]
    pub governance_chain: Chain,
    pub governance_emitter: Address,

    /// Seconds a replaced guardian set keeps verifying after an upgrade.
    pub guardian_set_expiration: u32,

    pub chain_policy: ChainPolicy,
    pub payload_encoding: PayloadEncoding,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            chain_id: Chain::Any,
            governance_chain: Chain::Solana,
            governance_emitter: GOVERNANCE_EMITTER,
            guardian_set_expiration: 86400,
            chain_policy: ChainPolicy::default(),
            payload_encoding: PayloadEncoding::default(),
        }
    }
}

impl Config {
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Config> {
        let path = path.as_ref();
        let raw = fs::read(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("invalid config in {}", path.display()))
    }

    pub fn from_json(raw: &[u8]) -> anyhow::Result<Config> {
        serde_json::from_slice(raw).context("failed to parse config")
    }

    pub fn decode_options(&self) -> DecodeOptions {
        DecodeOptions {
            chain_policy: self.chain_policy,
            payload_encoding: self.payload_encoding,
        }
    }

    pub fn is_governance_emitter(&self, chain: Chain, address: &Address) -> bool {
        chain == self.governance_chain && *address == self.governance_emitter
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = Config::from_json(b"{}").unwrap();
        assert_eq!(Config::default(), cfg);
        assert_eq!(Chain::Solana, cfg.governance_chain);
        assert_eq!(86400, cfg.guardian_set_expiration);
        assert!(cfg.is_governance_emitter(Chain::Solana, &GOVERNANCE_EMITTER));
        assert!(!cfg.is_governance_emitter(Chain::Ethereum, &GOVERNANCE_EMITTER));
    }

    #[test]
    fn overrides() {
        let cfg = Config::from_json(
            br#"{
                "chain_id": 2,
                "guardian_set_expiration": 60,
                "chain_policy": "reject_unknown",
                "payload_encoding": "length_prefixed"
            }"#,
        )
        .unwrap();

        assert_eq!(Chain::Ethereum, cfg.chain_id);
        assert_eq!(60, cfg.guardian_set_expiration);
        assert_eq!(
            DecodeOptions {
                chain_policy: ChainPolicy::RejectUnknown,
                payload_encoding: PayloadEncoding::LengthPrefixed,
            },
            cfg.decode_options()
        );
    }

    #[test]
    fn rejects_bad_emitter() {
        let err = Config::from_json(br#"{"governance_emitter": "04"}"#).unwrap_err();
        assert!(format!("{err:#}").contains("failed to parse config"));
    }

    #[test]
    fn missing_file() {
        let err = Config::from_json_file("/nonexistent/verifier.json").unwrap_err();
        assert!(err.to_string().contains("failed to read config file"));
    }

    #[cfg(feature = "schemars")]
    #[test]
    fn schema() {
        let schema = schemars::schema_for!(Config);
        let json = serde_json::to_string(&schema).unwrap();
        assert!(json.contains("guardian_set_expiration"));
    }
}
