use k256::{
    ecdsa::{RecoveryId, Signature as EcdsaSignature, VerifyingKey},
    elliptic_curve::sec1::ToEncodedPoint,
    AffinePoint,
};
use tracing::debug;

use crate::{
    config::DecodeOptions,
    digest::{digest, keccak256, Digest},
    error::{Error, VerificationError},
    guardian_set::{GuardianSet, GuardianSetStore},
    require,
    vaa::{Body, Header, Signature, Vaa},
    GuardianAddress,
};

/// Recovers the address that produced an ECDSA signature over a 32 byte digest.
///
/// Implementations return `None` when no key can be recovered; the verifier then treats the
/// signature as invalid rather than failing outright.
pub trait RecoverAddress {
    fn recover(&self, digest: &[u8; 32], signature: &[u8; 65]) -> Option<GuardianAddress>;
}

/// secp256k1 public key recovery, as performed by `ecrecover`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Secp256k1Recover;

impl RecoverAddress for Secp256k1Recover {
    fn recover(&self, digest: &[u8; 32], signature: &[u8; 65]) -> Option<GuardianAddress> {
        // Accept both raw (0..=3) and Ethereum style (27..=30) recovery ids.
        let v = match signature[64] {
            v @ 27..=30 => v - 27,
            v => v,
        };
        let recovery_id = RecoveryId::from_byte(v)?;
        let sig = EcdsaSignature::from_slice(&signature[..64]).ok()?;
        let key = VerifyingKey::recover_from_prehash(digest, &sig, recovery_id).ok()?;
        Some(guardian_address(&key))
    }
}

/// The address of a guardian key: the last 20 bytes of the keccak256 of its uncompressed
/// encoding, without the leading tag byte.
pub fn guardian_address(key: &VerifyingKey) -> GuardianAddress {
    point_address(key.as_affine())
}

/// [`guardian_address`] for a bare curve point.
pub fn point_address(point: &AffinePoint) -> GuardianAddress {
    let point = point.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    let mut out = [0u8; 20];
    out.copy_from_slice(&hash[12..]);
    GuardianAddress(out)
}

/// A VAA whose signatures reached quorum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedVaa<'a> {
    pub header: Header,
    pub body: Body,
    pub body_bytes: &'a [u8],
    pub digest: Digest,
}

/// Checks that `signatures` over `body_bytes` reach quorum in `guardian_set`.
///
/// Signatures must be in strictly increasing guardian order and name guardians inside the set;
/// either violation rejects the VAA. A signature that fails to recover, or recovers to another
/// key, only loses its vote. When quorum is missed because of such a signature the first one is
/// reported instead of a bare [`VerificationError::NoQuorum`].
///
/// This does not check for replays; see [`crate::CoreState`].
pub fn verify_signatures(
    body_bytes: &[u8],
    signatures: &[Signature],
    guardian_set: &GuardianSet,
    current_index: u32,
    now: u32,
    recover: &impl RecoverAddress,
) -> Result<Digest, VerificationError> {
    require!(
        !signatures.is_empty(),
        VerificationError::EmptyGuardianSignatures
    );
    require!(
        guardian_set.is_active_for_verification(now, current_index),
        VerificationError::GuardianSetExpired(guardian_set.index)
    );

    let digest = digest(body_bytes);

    let mut last_index: Option<u8> = None;
    let mut valid = 0usize;
    let mut first_failure = None;

    for sig in signatures {
        if last_index.is_some_and(|last| sig.index <= last) {
            return Err(VerificationError::InvalidGuardianIndexNonIncreasing { index: sig.index });
        }
        last_index = Some(sig.index);

        let expected = guardian_set.address_at(sig.index)?;

        match recover.recover(&digest.secp256k_hash, &sig.signature) {
            Some(addr) if addr == *expected => valid += 1,
            Some(addr) => {
                debug!(
                    index = sig.index,
                    recovered = %addr,
                    expected = %expected,
                    "signature does not match guardian"
                );
                first_failure
                    .get_or_insert(VerificationError::InvalidSignature { index: sig.index });
            }
            None => {
                debug!(index = sig.index, "failed to recover guardian key");
                first_failure.get_or_insert(VerificationError::InvalidGuardianKeyRecovery {
                    index: sig.index,
                });
            }
        }
    }

    let required = guardian_set.quorum();
    if valid < required {
        return Err(first_failure.unwrap_or(VerificationError::NoQuorum { valid, required }));
    }

    debug!(
        guardian_set_index = guardian_set.index,
        valid,
        required,
        digest = %hex::encode(digest.secp256k_hash),
        "quorum reached"
    );

    Ok(digest)
}

/// Parses a classic VAA and verifies it against the guardian set its header names.
pub fn verify_vaa<'a>(
    raw: &'a [u8],
    store: &GuardianSetStore,
    now: u32,
    opts: &DecodeOptions,
    recover: &impl RecoverAddress,
) -> Result<VerifiedVaa<'a>, Error> {
    let parsed = Vaa::parse(raw, opts)?;
    let index = parsed.header.guardian_set_index;
    let guardian_set = store
        .get(index)
        .ok_or(VerificationError::UnknownGuardianSet(index))?;

    let digest = verify_signatures(
        parsed.body_bytes,
        &parsed.header.signatures,
        guardian_set,
        store.current_index(),
        now,
        recover,
    )?;

    Ok(VerifiedVaa {
        header: parsed.header,
        body: parsed.body,
        body_bytes: parsed.body_bytes,
        digest,
    })
}

#[cfg(test)]
mod test {
    use hex_literal::hex;
    use k256::ecdsa::SigningKey;

    use super::*;

    const DEVNET_GUARDIAN: [u8; 32] =
        hex!("cfb12303a19cde580bb4dd771639b0d26bc68353645571a8cff516ab2ee113a0");

    fn key(seed: u8) -> SigningKey {
        SigningKey::from_slice(&[seed; 32]).unwrap()
    }

    fn sign(key: &SigningKey, index: u8, body: &[u8]) -> Signature {
        let d = digest(body);
        let (sig, recid) = key.sign_prehash_recoverable(&d.secp256k_hash).unwrap();
        let mut signature = [0u8; 65];
        signature[..64].copy_from_slice(&sig.to_bytes());
        signature[64] = recid.to_byte();
        Signature { index, signature }
    }

    fn guardian_set(keys: &[SigningKey]) -> GuardianSet {
        let addrs = keys.iter().map(|k| guardian_address(k.verifying_key())).collect();
        GuardianSet::new(0, addrs, 0).unwrap()
    }

    #[test]
    fn devnet_address() {
        let key = SigningKey::from_slice(&DEVNET_GUARDIAN).unwrap();
        assert_eq!(
            GuardianAddress(hex!("beFA429d57cD18b7F8A4d91A2da9AB4AF05d0FBe")),
            guardian_address(key.verifying_key())
        );
    }

    #[test]
    fn recovery_id_styles() {
        let key = key(1);
        let sig = sign(&key, 0, b"body");
        let d = digest(b"body").secp256k_hash;
        let expected = guardian_address(key.verifying_key());

        assert_eq!(Some(expected), Secp256k1Recover.recover(&d, &sig.signature));

        let mut eth = sig.signature;
        eth[64] += 27;
        assert_eq!(Some(expected), Secp256k1Recover.recover(&d, &eth));

        let mut bad = sig.signature;
        bad[64] = 4;
        assert_eq!(None, Secp256k1Recover.recover(&d, &bad));
    }

    #[test]
    fn quorum_reached() {
        let keys: Vec<_> = (1..=4).map(key).collect();
        let gs = guardian_set(&keys);
        let body = b"some body bytes";
        let sigs: Vec<_> = (0..3).map(|i| sign(&keys[i], i as u8, body)).collect();

        let d = verify_signatures(body, &sigs, &gs, 0, 0, &Secp256k1Recover).unwrap();
        assert_eq!(digest(body), d);

        assert_eq!(
            Err(VerificationError::NoQuorum {
                valid: 2,
                required: 3
            }),
            verify_signatures(body, &sigs[..2], &gs, 0, 0, &Secp256k1Recover)
        );
    }

    #[test]
    fn empty_signatures() {
        let gs = guardian_set(&[key(1)]);
        assert_eq!(
            Err(VerificationError::EmptyGuardianSignatures),
            verify_signatures(b"x", &[], &gs, 0, 0, &Secp256k1Recover)
        );
    }

    #[test]
    fn ordering() {
        let keys: Vec<_> = (1..=3).map(key).collect();
        let gs = guardian_set(&keys);
        let body = b"ordered";

        let reversed = [sign(&keys[2], 2, body), sign(&keys[1], 1, body)];
        assert_eq!(
            Err(VerificationError::InvalidGuardianIndexNonIncreasing { index: 1 }),
            verify_signatures(body, &reversed, &gs, 0, 0, &Secp256k1Recover)
        );

        let duplicate = [sign(&keys[0], 0, body), sign(&keys[0], 0, body)];
        assert_eq!(
            Err(VerificationError::InvalidGuardianIndexNonIncreasing { index: 0 }),
            verify_signatures(body, &duplicate, &gs, 0, 0, &Secp256k1Recover)
        );

        let out_of_range = [sign(&keys[0], 0, body), sign(&keys[1], 3, body)];
        assert_eq!(
            Err(VerificationError::InvalidGuardianIndexOutOfRange { index: 3, len: 3 }),
            verify_signatures(body, &out_of_range, &gs, 0, 0, &Secp256k1Recover)
        );
    }

    #[test]
    fn wrong_key_is_reported() {
        let keys: Vec<_> = (1..=3).map(key).collect();
        let gs = guardian_set(&keys);
        let body = b"forged";

        // Guardian 1's slot signed by an outsider.
        let sigs = [
            sign(&keys[0], 0, body),
            sign(&key(9), 1, body),
            sign(&keys[2], 2, body),
        ];
        assert_eq!(
            Err(VerificationError::InvalidSignature { index: 1 }),
            verify_signatures(body, &sigs, &gs, 0, 0, &Secp256k1Recover)
        );
    }

    #[test]
    fn unrecoverable_signature_loses_its_vote() {
        let keys: Vec<_> = (1..=4).map(key).collect();
        let gs = guardian_set(&keys);
        let body = b"mostly fine";

        let mut broken = sign(&keys[3], 3, body);
        broken.signature[..32].fill(0);
        let sigs = [
            sign(&keys[0], 0, body),
            sign(&keys[1], 1, body),
            sign(&keys[2], 2, body),
            broken,
        ];

        // Three good votes out of four still reach quorum.
        assert!(verify_signatures(body, &sigs, &gs, 0, 0, &Secp256k1Recover).is_ok());

        assert_eq!(
            Err(VerificationError::InvalidGuardianKeyRecovery { index: 3 }),
            verify_signatures(body, &sigs[1..], &gs, 0, 0, &Secp256k1Recover)
        );
    }

    #[test]
    fn expired_set() {
        let keys = [key(1)];
        let mut gs = guardian_set(&keys);
        gs.expiration_time = 100;
        let sigs = [sign(&keys[0], 0, b"late")];

        assert!(verify_signatures(b"late", &sigs, &gs, 1, 99, &Secp256k1Recover).is_ok());
        assert_eq!(
            Err(VerificationError::GuardianSetExpired(0)),
            verify_signatures(b"late", &sigs, &gs, 1, 100, &Secp256k1Recover)
        );
    }

    struct Fixed(Option<GuardianAddress>);

    impl RecoverAddress for Fixed {
        fn recover(&self, _: &[u8; 32], _: &[u8; 65]) -> Option<GuardianAddress> {
            self.0
        }
    }

    #[test]
    fn pluggable_recovery() {
        let gs = GuardianSet::new(0, vec![GuardianAddress([7; 20])], 0).unwrap();
        let sigs = [Signature::default()];

        assert!(verify_signatures(b"x", &sigs, &gs, 0, 0, &Fixed(Some(GuardianAddress([7; 20])))).is_ok());
        assert_eq!(
            Err(VerificationError::InvalidGuardianKeyRecovery { index: 0 }),
            verify_signatures(b"x", &sigs, &gs, 0, 0, &Fixed(None))
        );
    }
}
