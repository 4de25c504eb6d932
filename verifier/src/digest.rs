use serde::{Deserialize, Serialize};
use sha3::{Digest as _, Keccak256};

use crate::error::DecodeError;

/// The digest of a VAA body.
///
/// Guardians sign `secp256k_hash`, the keccak256 of `hash`, because the ECDSA signing
/// primitive they use hashes its input once more. The same value is the replay key that
/// contracts record once a VAA has been processed, so it must never be recomputed any other way.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest {
    /// keccak256 of the body bytes.
    pub hash: [u8; 32],

    /// keccak256 of `hash`.
    pub secp256k_hash: [u8; 32],
}

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// Computes the digest of the raw body bytes of a VAA.
pub fn digest(body: &[u8]) -> Digest {
    let hash = keccak256(body);
    let secp256k_hash = keccak256(&hash);

    Digest {
        hash,
        secp256k_hash,
    }
}

/// Hash to sign for messages that are not VAAs. The prefix keeps these digests apart from
/// VAA digests and from each other.
pub fn message_signing_digest(prefix: &[u8], data: &[u8]) -> Result<[u8; 32], DecodeError> {
    crate::require!(prefix.len() >= 32, DecodeError::PrefixTooShort(prefix.len()));

    let mut h = Keccak256::new();
    h.update(prefix);
    h.update(data);
    Ok(h.finalize().into())
}
