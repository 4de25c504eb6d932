//! Chain-agnostic core of the Wormhole VAA protocol.
//!
//! Byte buffers go in, typed results come out. The crate covers:
//!
//! - The VAA envelope codec and the double-keccak digest guardians sign.
//! - Versioned guardian sets and the ordered-signature quorum check.
//! - Governance payload decoding and application through [`CoreState`].
//! - The delegated manager-set and Schnorr key (version 2 VAA) extensions.
//!
//! Persistence, RPC and any chain specific account handling are left to the caller; every store
//! here is serde-serializable so an adapter can save it however its chain requires.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub mod config;
pub mod digest;
pub mod error;
pub mod governance;
pub mod guardian_set;
pub mod manager_set;
pub mod reader;
pub mod schnorr;
pub mod state;
pub mod vaa;
pub mod verify;

pub use config::{ChainPolicy, Config, DecodeOptions, PayloadEncoding};
pub use digest::{digest, Digest};
pub use error::Error;
pub use guardian_set::{GuardianSet, GuardianSetStatus, GuardianSetStore};
pub use state::{AppliedAction, CoreState, SharedState};
pub use vaa::{Body, Header, ParsedVaa, Signature, Vaa};
pub use verify::{RecoverAddress, Secp256k1Recover, VerifiedVaa};
pub use wormhole_supported_chains::Chain;

/// The `GOVERNANCE_EMITTER` is a special address Wormhole guardians trust to observe governance
/// actions from. The value is "0000000000000000000000000000000000000000000000000000000000000004".
pub const GOVERNANCE_EMITTER: Address = Address([
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x04,
]);

/// The 20 byte Ethereum-style address of a guardian key: the last 20 bytes of the keccak256 of
/// the uncompressed public key.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GuardianAddress(pub [u8; 20]);

/// Wormhole specifies addresses as 32 bytes. Addresses that are shorter, for example 20 byte
/// Ethereum addresses, are left zero padded to 32.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(pub [u8; 32]);

macro_rules! hex_newtype {
    ($name:ident, $len:literal) => {
        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                for b in self.0 {
                    write!(f, "{b:02x}")?;
                }

                Ok(())
            }
        }

        impl FromStr for $name {
            type Err = hex::FromHexError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                serde_hex::parse::<$len>(s).map($name)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serde_hex::serialize(&self.0, serializer)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                serde_hex::deserialize(deserializer).map($name)
            }
        }

        #[cfg(feature = "schemars")]
        impl schemars::JsonSchema for $name {
            fn schema_name() -> String {
                stringify!($name).into()
            }

            fn json_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
                String::json_schema(gen)
            }
        }
    };
}

hex_newtype!(GuardianAddress, 20);
hex_newtype!(Address, 32);

impl From<GuardianAddress> for Address {
    fn from(other: GuardianAddress) -> Address {
        let mut out = [0u8; 32];
        out[12..].copy_from_slice(&other.0);
        Address(out)
    }
}

/// Fixed-size byte arrays as hex strings, with or without a `0x` prefix on input.
pub(crate) mod serde_hex {
    use serde::de::Error as _;

    use super::*;

    pub fn parse<const N: usize>(s: &str) -> Result<[u8; N], hex::FromHexError> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let mut out = [0u8; N];
        hex::decode_to_slice(s, &mut out)?;
        Ok(out)
    }

    pub fn serialize<S: Serializer, const N: usize>(
        v: &[u8; N],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(v))
    }

    pub fn deserialize<'de, D: Deserializer<'de>, const N: usize>(
        deserializer: D,
    ) -> Result<[u8; N], D::Error> {
        let s = <String as Deserialize>::deserialize(deserializer)?;
        parse(&s).map_err(D::Error::custom)
    }
}

/// Opaque byte strings as base64, the way CosmWasm's `Binary` appears in JSON.
pub(crate) mod serde_base64 {
    use serde::de::Error as _;

    use super::*;

    pub fn serialize<S: Serializer>(v: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::encode(v))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = <String as Deserialize>::deserialize(deserializer)?;
        base64::decode(s).map_err(D::Error::custom)
    }
}
