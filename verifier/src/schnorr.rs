//! Threshold Schnorr keys and the version 2 VAAs they sign.
//!
//! A version 2 VAA carries a single Schnorr signature made by the guardians' shared key instead
//! of one ECDSA signature per guardian:
//!
//! ```text
//! version u8 = 2 | schnorr_key_index u32 | r [20] | s [32] | body
//! ```
//!
//! `r` is the Ethereum style address of the nonce commitment `R`. Keys are installed by "TSS"
//! governance VAAs, which are themselves classic, guardian-signed VAAs.

use k256::{
    elliptic_curve::{
        ff::PrimeField, ops::Reduce, point::DecompressPoint, sec1::ToEncodedPoint, subtle::Choice,
    },
    AffinePoint, FieldBytes, ProjectivePoint, Scalar, U256,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    config::DecodeOptions,
    digest::{digest, keccak256, Digest},
    error::{DecodeError, Error, GovernanceError, SchnorrError},
    governance::{self, AppendSchnorrKey, GovernanceAction, Module},
    reader::ByteReader,
    require,
    state::CoreState,
    vaa::Body,
    verify::point_address,
};

/// Half the secp256k1 group order, rounded down. Public key x coordinates must not exceed it.
const HALF_Q: [u8; 32] = [
    0x7f, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0x5d, 0x57, 0x6e, 0x73, 0x57, 0xa4, 0x50, 0x1d, 0xdf, 0xe9, 0x2f, 0x46, 0x68, 0x1b, 0x20, 0xa0,
];

/// A threshold Schnorr public key, packed as `px << 1 | parity` in 32 big-endian bytes.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SchnorrKey(#[serde(with = "crate::serde_hex")] pub [u8; 32]);

impl SchnorrKey {
    /// The x coordinate of the public key.
    pub fn px(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        let mut carry = 0u8;
        for (o, b) in out.iter_mut().zip(self.0) {
            *o = (b >> 1) | carry;
            carry = b << 7;
        }
        out
    }

    /// Whether the y coordinate is odd.
    pub fn parity(&self) -> bool {
        self.0[31] & 1 == 1
    }

    pub fn is_valid(&self) -> bool {
        let px = self.px();
        px != [0; 32] && px <= HALF_Q
    }

    /// Packs a curve point. Returns `None` for points whose x coordinate is above `q / 2`, which
    /// cannot be used as keys.
    pub fn from_point(point: &AffinePoint) -> Option<SchnorrKey> {
        let encoded = point.to_encoded_point(true);
        let bytes = encoded.as_bytes();
        if bytes.len() != 33 {
            return None;
        }

        let mut key = [0u8; 32];
        let mut carry = bytes[0] & 1;
        for i in (0..32).rev() {
            let b = bytes[1 + i];
            key[i] = (b << 1) | carry;
            carry = b >> 7;
        }
        if carry != 0 {
            return None;
        }

        let key = SchnorrKey(key);
        key.is_valid().then_some(key)
    }

    fn point(&self) -> Option<AffinePoint> {
        let x = FieldBytes::clone_from_slice(&self.px());
        Option::from(AffinePoint::decompress(&x, Choice::from(u8::from(self.parity()))))
    }

    /// `keccak256(px || parity || message_hash || r)` reduced modulo the group order.
    pub fn challenge(&self, message_hash: &[u8; 32], r: &[u8; 20]) -> Scalar {
        let mut input = [0u8; 85];
        input[..32].copy_from_slice(&self.px());
        input[32] = u8::from(self.parity());
        input[33..65].copy_from_slice(message_hash);
        input[65..].copy_from_slice(r);
        <Scalar as Reduce<U256>>::reduce_bytes(&FieldBytes::clone_from_slice(&keccak256(&input)))
    }

    /// Checks `address(s·G + e·P) == r`.
    pub fn check_signature(
        &self,
        message_hash: &[u8; 32],
        signature: &SchnorrSignature,
    ) -> Result<(), SchnorrError> {
        let s = signature.scalar().ok_or(SchnorrError::InvalidSignature)?;
        require!(signature.r != [0; 20], SchnorrError::InvalidSignature);
        require!(self.is_valid(), SchnorrError::InvalidSchnorrKey);
        let p = self.point().ok_or(SchnorrError::InvalidSchnorrKey)?;

        let e = self.challenge(message_hash, &signature.r);
        require!(e != Scalar::ZERO, SchnorrError::InvalidSignature);

        let commitment = ProjectivePoint::GENERATOR * s + ProjectivePoint::from(p) * e;
        require!(
            commitment != ProjectivePoint::IDENTITY,
            SchnorrError::SignatureVerificationFailed
        );
        require!(
            point_address(&commitment.to_affine()).0 == signature.r,
            SchnorrError::SignatureVerificationFailed
        );
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SchnorrSignature {
    #[serde(with = "crate::serde_hex")]
    pub r: [u8; 20],
    #[serde(with = "crate::serde_hex")]
    pub s: [u8; 32],
}

impl SchnorrSignature {
    /// `s` as a non-zero scalar below the group order.
    fn scalar(&self) -> Option<Scalar> {
        let s: Option<Scalar> = Scalar::from_repr(FieldBytes::clone_from_slice(&self.s)).into();
        s.filter(|s| *s != Scalar::ZERO)
    }

    /// `s != 0`, `s < q` and `r != 0`.
    pub fn is_valid(&self) -> bool {
        self.scalar().is_some() && self.r != [0; 20]
    }
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SchnorrKeyRecord {
    pub index: u32,
    pub key: SchnorrKey,
    /// Unix time after which the key no longer verifies. 0 while it is the latest key.
    pub expiration_timestamp: u64,
    #[serde(with = "crate::serde_hex")]
    pub shard_data_hash: [u8; 32],
}

impl SchnorrKeyRecord {
    pub fn is_unexpired(&self, now: u64) -> bool {
        self.expiration_timestamp == 0 || self.expiration_timestamp > now
    }
}

/// Every Schnorr key ever appended, in increasing index order.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(try_from = "Vec<SchnorrKeyRecord>", into = "Vec<SchnorrKeyRecord>")]
pub struct SchnorrKeyStore {
    keys: Vec<SchnorrKeyRecord>,
}

impl TryFrom<Vec<SchnorrKeyRecord>> for SchnorrKeyStore {
    type Error = SchnorrError;

    fn try_from(keys: Vec<SchnorrKeyRecord>) -> Result<Self, Self::Error> {
        for pair in keys.windows(2) {
            require!(
                pair[0].index.checked_add(1) == Some(pair[1].index),
                SchnorrError::InvalidNewKeyIndex {
                    latest: pair[0].index,
                    got: pair[1].index,
                }
            );
        }
        require!(
            keys.iter().all(|k| k.key.is_valid()),
            SchnorrError::InvalidSchnorrKey
        );
        Ok(SchnorrKeyStore { keys })
    }
}

impl From<SchnorrKeyStore> for Vec<SchnorrKeyRecord> {
    fn from(store: SchnorrKeyStore) -> Self {
        store.keys
    }
}

impl SchnorrKeyStore {
    pub fn latest(&self) -> Option<&SchnorrKeyRecord> {
        self.keys.last()
    }

    pub fn get(&self, index: u32) -> Option<&SchnorrKeyRecord> {
        self.keys
            .binary_search_by_key(&index, |k| k.index)
            .ok()
            .map(|i| &self.keys[i])
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Appends the key announced by `msg` and schedules the expiration of the previous latest key
    /// at `now + msg.expiration_delay_seconds`. The first key may carry any index; every later one
    /// must be the direct successor of the latest.
    pub fn append(
        &mut self,
        msg: &AppendSchnorrKey,
        now: u32,
    ) -> Result<SchnorrKeyRecord, SchnorrError> {
        let key = SchnorrKey(msg.key);
        require!(key.is_valid(), SchnorrError::InvalidSchnorrKey);

        if let Some(latest) = self.keys.last_mut() {
            require!(
                latest.index.checked_add(1) == Some(msg.index),
                SchnorrError::InvalidNewKeyIndex {
                    latest: latest.index,
                    got: msg.index,
                }
            );
            latest.expiration_timestamp =
                u64::from(now) + u64::from(msg.expiration_delay_seconds);
        }

        let record = SchnorrKeyRecord {
            index: msg.index,
            key,
            expiration_timestamp: 0,
            shard_data_hash: msg.shard_data_hash,
        };
        self.keys.push(record);
        Ok(record)
    }
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct V2Header {
    pub schnorr_key_index: u32,
    pub signature: SchnorrSignature,
}

impl V2Header {
    pub const VERSION: u8 = 2;
    pub const LEN: usize = 57;
}

/// A version 2 VAA split into its header and decoded body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedV2Vaa<'a> {
    pub header: V2Header,
    pub body: Body,
    pub body_bytes: &'a [u8],
}

/// A version 2 VAA whose Schnorr signature checked out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedV2Vaa<'a> {
    pub header: V2Header,
    pub body: Body,
    pub body_bytes: &'a [u8],
    pub digest: Digest,
}

pub fn parse_v2<'a>(raw: &'a [u8], opts: &DecodeOptions) -> Result<ParsedV2Vaa<'a>, Error> {
    let mut r = ByteReader::new(raw);
    let version = r.read_u8("version")?;
    require!(
        version == V2Header::VERSION,
        DecodeError::InvalidVersion(version)
    );
    let schnorr_key_index = r.read_u32("schnorr_key_index")?;
    let signature = SchnorrSignature {
        r: r.read_array("signature_r")?,
        s: r.read_array("signature_s")?,
    };
    require!(signature.is_valid(), SchnorrError::InvalidSignature);

    let body_bytes = r.rest();
    let body = Body::decode(body_bytes, opts)?;

    Ok(ParsedV2Vaa {
        header: V2Header {
            schnorr_key_index,
            signature,
        },
        body,
        body_bytes,
    })
}

/// Parses a version 2 VAA and checks its signature against the key its header names.
pub fn verify_v2_vaa<'a>(
    raw: &'a [u8],
    keys: &SchnorrKeyStore,
    now: u32,
    opts: &DecodeOptions,
) -> Result<VerifiedV2Vaa<'a>, Error> {
    let parsed = parse_v2(raw, opts)?;
    let index = parsed.header.schnorr_key_index;
    let key = keys.get(index).ok_or(SchnorrError::UnknownSchnorrKey(index))?;
    require!(
        key.is_unexpired(u64::from(now)),
        SchnorrError::SchnorrKeyExpired(index)
    );

    let digest = digest(parsed.body_bytes);
    key.key
        .check_signature(&digest.secp256k_hash, &parsed.header.signature)?;

    debug!(
        schnorr_key_index = index,
        digest = %hex::encode(digest.secp256k_hash),
        "schnorr signature verified"
    );

    Ok(VerifiedV2Vaa {
        header: parsed.header,
        body: parsed.body,
        body_bytes: parsed.body_bytes,
        digest,
    })
}

impl CoreState {
    /// Applies a "TSS" governance VAA appending a new Schnorr key.
    pub fn append_schnorr_key(&mut self, raw: &[u8], now: u32) -> Result<SchnorrKeyRecord, Error> {
        let (verified, packet) = self.verify_governance(raw, now)?;
        governance::expect_module(&verified.body.payload, Module::Tss)?;
        let msg = match packet.action {
            GovernanceAction::AppendSchnorrKey(msg) => msg,
            other => return Err(GovernanceError::InvalidGovernanceAction(other.code()).into()),
        };

        let record = self.schnorr_keys_mut().append(&msg, now)?;
        self.consume(verified.digest.secp256k_hash)?;

        info!(
            index = record.index,
            key = %hex::encode(record.key.0),
            expiration_delay = msg.expiration_delay_seconds,
            "schnorr key appended"
        );
        Ok(record)
    }

    pub fn verify_v2_vaa<'a>(&self, raw: &'a [u8], now: u32) -> Result<VerifiedV2Vaa<'a>, Error> {
        verify_v2_vaa(raw, self.schnorr_keys(), now, &self.config().decode_options())
    }
}
