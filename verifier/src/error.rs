use thiserror::Error;
use wormhole_supported_chains::Chain;

use crate::Address;

/// Ergonomic guard clause for the verifier, returning `$err` converted into the caller's error
/// type when `$expr` does not hold.
#[macro_export]
macro_rules! require {
    ($expr:expr, $err:expr) => {
        if !$expr {
            return Err($err.into());
        }
    };
}

/// Malformed wire input. Nothing here says anything about signatures or policy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("truncated input reading {field} at offset {offset}: needed {needed} bytes, {remaining} remaining")]
    TruncatedInput {
        field: &'static str,
        offset: usize,
        needed: usize,
        remaining: usize,
    },
    #[error("declared payload length {declared} does not match {remaining} remaining bytes")]
    PayloadLengthMismatch { declared: u32, remaining: usize },
    #[error("invalid chain id: {0}")]
    InvalidChainId(u16),
    #[error("invalid version: {0}")]
    InvalidVersion(u8),
    #[error("{0} unexpected trailing bytes")]
    TrailingBytes(usize),
    #[error("too many signatures: {0}")]
    TooManySignatures(usize),
    #[error("message prefix must be at least 32 bytes, got {0}")]
    PrefixTooShort(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationError {
    #[error("no guardian signatures")]
    EmptyGuardianSignatures,
    #[error("guardian set {0} has expired")]
    GuardianSetExpired(u32),
    #[error("unknown guardian set {0}")]
    UnknownGuardianSet(u32),
    #[error("guardian index {index} does not increase")]
    InvalidGuardianIndexNonIncreasing { index: u8 },
    #[error("guardian index {index} out of range for a set of {len} keys")]
    InvalidGuardianIndexOutOfRange { index: u8, len: usize },
    #[error("signature for guardian {index} does not match its key")]
    InvalidSignature { index: u8 },
    #[error("could not recover a key from the signature for guardian {index}")]
    InvalidGuardianKeyRecovery { index: u8 },
    #[error("no quorum: {valid} valid signatures, {required} required")]
    NoQuorum { valid: usize, required: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GovernanceError {
    #[error("governance payload too short: {len} bytes, at least {min} required")]
    GovernancePayloadTooShort { len: usize, min: usize },
    #[error("invalid governance module")]
    InvalidGovernanceModule,
    #[error("invalid governance action {0}")]
    InvalidGovernanceAction(u8),
    #[error("invalid target chain {0}")]
    InvalidTargetChain(Chain),
    #[error("invalid governance chain {0}")]
    InvalidGovernanceChain(Chain),
    #[error("invalid governance emitter {0}")]
    InvalidGovernanceEmitter(Address),
    #[error("guardian set upgrade carries {0} keys, at most 255 can be encoded")]
    TooManyGuardianKeys(usize),
    #[error("{0} unexpected trailing bytes in governance payload")]
    TrailingBytes(usize),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("vaa already consumed: {}", hex::encode(.0))]
    VaaAlreadyConsumed([u8; 32]),
    #[error("invalid guardian set index: expected {expected}, got {got}")]
    InvalidGuardianSetIndex { expected: u32, got: u32 },
    #[error("guardian set has no keys")]
    EmptyGuardianSet,
    #[error("guardian set has {0} keys, at most 256 allowed")]
    GuardianSetTooLarge(usize),
    #[error("governance must be signed by the current guardian set {current}, got {index}")]
    GovernanceSetNotCurrent { index: u32, current: u32 },
    #[error("state lock poisoned")]
    Poisoned,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManagerSetError {
    #[error("digest argument does not match computed digest from vaa body")]
    DigestMismatch,
    #[error("invalid vaa body")]
    InvalidVaaBody,
    #[error("manager set index must increment by 1: expected {expected}, got {got}")]
    InvalidManagerSetIndex { expected: u32, got: u32 },
    #[error("payload too short, expected at least {min} bytes, got {len}")]
    PayloadTooShort { min: usize, len: usize },
    #[error("unexpected manager set type {0}, expected 1")]
    UnexpectedManagerSetType(u8),
    #[error("m must be at least 1")]
    ThresholdZero,
    #[error("m ({m}) cannot be greater than n ({n})")]
    ThresholdAboveSize { m: u8, n: u8 },
    #[error("n ({n}) does not match number of public keys ({keys})")]
    KeyCountMismatch { n: u8, keys: usize },
    #[error("payload length mismatch: expected {expected} bytes, got {len}")]
    PayloadLengthMismatch { expected: usize, len: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchnorrError {
    #[error("invalid schnorr key")]
    InvalidSchnorrKey,
    #[error("new key index {got} is not the direct successor of the latest index {latest}")]
    InvalidNewKeyIndex { latest: u32, got: u32 },
    #[error("unknown schnorr key {0}")]
    UnknownSchnorrKey(u32),
    #[error("schnorr key {0} has expired")]
    SchnorrKeyExpired(u32),
    #[error("signature does not satisfy preconditions")]
    InvalidSignature,
    #[error("signature verification failed")]
    SignatureVerificationFailed,
}

/// Every failure the verifier can report, grouped by concern.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Verification(#[from] VerificationError),
    #[error(transparent)]
    Governance(#[from] GovernanceError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    ManagerSet(#[from] ManagerSetError),
    #[error(transparent)]
    Schnorr(#[from] SchnorrError),
}

impl Error {
    /// Replays are rejected but callers may treat them as "already done".
    pub fn is_already_applied(&self) -> bool {
        matches!(self, Error::State(StateError::VaaAlreadyConsumed(_)))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display() {
        let err = Error::from(StateError::VaaAlreadyConsumed([0xab; 32]));
        assert_eq!(format!("vaa already consumed: {}", "ab".repeat(32)), err.to_string());
        assert!(err.is_already_applied());

        let err = Error::from(VerificationError::NoQuorum {
            valid: 12,
            required: 13,
        });
        assert_eq!("no quorum: 12 valid signatures, 13 required", err.to_string());
        assert!(!err.is_already_applied());

        assert_eq!(
            "m (3) cannot be greater than n (2)",
            ManagerSetError::ThresholdAboveSize { m: 3, n: 2 }.to_string()
        );
    }

    #[test]
    fn require_converts() {
        fn guard(ok: bool) -> Result<(), Error> {
            require!(ok, StateError::EmptyGuardianSet);
            Ok(())
        }

        assert!(guard(true).is_ok());
        assert_eq!(Err(Error::State(StateError::EmptyGuardianSet)), guard(false));
    }
}
