#![allow(dead_code)]

use k256::{ecdsa::SigningKey, ProjectivePoint, Scalar};
use wormhole_verifier::{
    digest,
    governance::GovernancePacket,
    schnorr::{SchnorrKey, SchnorrSignature, V2Header},
    verify::{guardian_address, point_address},
    Body, Chain, Config, CoreState, GuardianAddress, Header, Signature, Vaa, GOVERNANCE_EMITTER,
};

pub const DEVNET_GUARDIAN: [u8; 32] = [
    0xcf, 0xb1, 0x23, 0x03, 0xa1, 0x9c, 0xde, 0x58, 0x0b, 0xb4, 0xdd, 0x77, 0x16, 0x39, 0xb0, 0xd2,
    0x6b, 0xc6, 0x83, 0x53, 0x64, 0x55, 0x71, 0xa8, 0xcf, 0xf5, 0x16, 0xab, 0x2e, 0xe1, 0x13, 0xa0,
];

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub fn guardian_keys(count: u8) -> Vec<SigningKey> {
    (1..=count)
        .map(|seed| SigningKey::from_slice(&[seed; 32]).unwrap())
        .collect()
}

/// Signs VAAs as a guardian set would.
pub struct GuardianKeeper {
    pub index: u32,
    pub guardians: Vec<SigningKey>,
}

impl GuardianKeeper {
    pub fn new(index: u32, guardians: Vec<SigningKey>) -> GuardianKeeper {
        GuardianKeeper { index, guardians }
    }

    pub fn devnet() -> GuardianKeeper {
        GuardianKeeper::new(0, vec![SigningKey::from_slice(&DEVNET_GUARDIAN).unwrap()])
    }

    pub fn addresses(&self) -> Vec<GuardianAddress> {
        self.guardians
            .iter()
            .map(|g| guardian_address(g.verifying_key()))
            .collect()
    }

    pub fn state(&self, config: Config, now: u32) -> CoreState {
        CoreState::new(config, self.addresses(), now).unwrap()
    }

    /// Signatures of every guardian, in index order.
    pub fn sign(&self, body: &[u8]) -> Vec<Signature> {
        let all: Vec<usize> = (0..self.guardians.len()).collect();
        self.sign_with(body, &all)
    }

    pub fn sign_with(&self, body: &[u8], signers: &[usize]) -> Vec<Signature> {
        let d = digest(body);
        signers
            .iter()
            .map(|&i| {
                let (sig, recid) = self.guardians[i]
                    .sign_prehash_recoverable(&d.secp256k_hash)
                    .unwrap();
                let mut signature = [0u8; 65];
                signature[..64].copy_from_slice(&sig.to_bytes());
                signature[64] = recid.to_byte();
                Signature {
                    index: i as u8,
                    signature,
                }
            })
            .collect()
    }

    pub fn vaa(&self, body: &Body) -> Vec<u8> {
        let all: Vec<usize> = (0..self.guardians.len()).collect();
        self.vaa_with(body, &all)
    }

    pub fn vaa_with(&self, body: &Body, signers: &[usize]) -> Vec<u8> {
        Vaa {
            header: Header {
                version: Vaa::VERSION,
                guardian_set_index: self.index,
                signatures: self.sign_with(&body.encode(), signers),
            },
            body: body.clone(),
        }
        .serialize()
        .unwrap()
    }
}

pub fn governance_body(sequence: u64, packet: &GovernancePacket) -> Body {
    Body {
        timestamp: 1,
        nonce: 0,
        emitter_chain: Chain::Solana,
        emitter_address: GOVERNANCE_EMITTER,
        sequence,
        consistency_level: 32,
        payload: packet.encode().unwrap(),
    }
}

/// A secret scalar whose public key can be used as a Schnorr key.
pub fn schnorr_keypair(seed: u64) -> (Scalar, SchnorrKey) {
    (seed..)
        .find_map(|seed| {
            let secret = Scalar::from(seed);
            let point = (ProjectivePoint::GENERATOR * secret).to_affine();
            SchnorrKey::from_point(&point).map(|key| (secret, key))
        })
        .unwrap()
}

pub fn schnorr_sign(secret: &Scalar, key: &SchnorrKey, nonce: u64, body: &[u8]) -> SchnorrSignature {
    let hash = digest(body).secp256k_hash;
    let k = Scalar::from(nonce);
    let r = point_address(&(ProjectivePoint::GENERATOR * k).to_affine()).0;
    let e = key.challenge(&hash, &r);
    let s = k - e * secret;
    let mut s_bytes = [0u8; 32];
    s_bytes.copy_from_slice(&s.to_bytes());
    SchnorrSignature { r, s: s_bytes }
}

pub fn encode_v2(index: u32, signature: &SchnorrSignature, body: &[u8]) -> Vec<u8> {
    let mut out = vec![V2Header::VERSION];
    out.extend_from_slice(&index.to_be_bytes());
    out.extend_from_slice(&signature.r);
    out.extend_from_slice(&signature.s);
    out.extend_from_slice(body);
    out
}
