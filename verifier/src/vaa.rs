//! VAA's (Verifiable Action Approvals) are Wormhole's core messaging primitive. They are packets of
//! cross chain data emitted and then signed by the Wormhole guardians.
//!
//! The classic (version 1) wire format is
//!
//! ```text
//! version u8 | guardian_set_index u32 | n u8 | n * (index u8 | r [32] | s [32] | v u8) | body
//! ```
//!
//! and the body is
//!
//! ```text
//! timestamp u32 | nonce u32 | emitter_chain u16 | emitter_address [32] | sequence u64 |
//! consistency_level u8 | payload
//! ```
//!
//! All integers are big-endian. Signatures cover the digest of the body bytes exactly as
//! received, which is why [`Vaa::parse`] hands the raw body back alongside the decoded one.

use serde::{Deserialize, Serialize};
use tracing::debug;
use wormhole_supported_chains::Chain;

use crate::{
    config::{ChainPolicy, DecodeOptions, PayloadEncoding},
    digest::{digest, Digest},
    error::DecodeError,
    reader::ByteReader,
    Address,
};

/// Size of the fixed fields of a body.
pub const BODY_HEADER_LEN: usize = 51;

/// Size of one signature entry on the wire.
pub const SIGNATURE_LEN: usize = 66;

/// Shortest possible VAA: a header without signatures followed by an empty-payload body.
pub const MIN_VAA_LEN: usize = 6 + BODY_HEADER_LEN;

/// Signatures are typical ECDSA signatures prefixed with a Guardian position. These have the
/// following byte layout:
/// ```markdown
/// 0  .. 64: Signature   (ECDSA)
/// 64 .. 65: Recovery ID (ECDSA)
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature {
    pub index: u8,
    #[serde(with = "crate::serde_hex")]
    pub signature: [u8; 65],
}

impl Default for Signature {
    fn default() -> Self {
        Self {
            index: 0,
            signature: [0; 65],
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq, Hash)]
pub struct Header {
    pub version: u8,
    pub guardian_set_index: u32,
    pub signatures: Vec<Signature>,
}

/// The body of a VAA: the part guardians observe and sign.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq, Hash)]
pub struct Body {
    pub timestamp: u32,
    pub nonce: u32,
    pub emitter_chain: Chain,
    pub emitter_address: Address,
    pub sequence: u64,
    pub consistency_level: u8,
    #[serde(with = "serde_bytes")]
    pub payload: Vec<u8>,
}

impl Body {
    /// Encodes the body in the classic wire format.
    pub fn encode(&self) -> Vec<u8> {
        self.encode_with(PayloadEncoding::Trailing)
    }

    pub fn encode_with(&self, encoding: PayloadEncoding) -> Vec<u8> {
        let mut out = Vec::with_capacity(BODY_HEADER_LEN + 4 + self.payload.len());
        self.write_to(&mut out, encoding);
        out
    }

    pub fn write_to(&self, out: &mut Vec<u8>, encoding: PayloadEncoding) {
        out.extend_from_slice(&self.timestamp.to_be_bytes());
        out.extend_from_slice(&self.nonce.to_be_bytes());
        out.extend_from_slice(&u16::from(self.emitter_chain).to_be_bytes());
        out.extend_from_slice(&self.emitter_address.0);
        out.extend_from_slice(&self.sequence.to_be_bytes());
        out.push(self.consistency_level);
        if encoding == PayloadEncoding::LengthPrefixed {
            // Payloads never approach 4GiB; saturate rather than wrap.
            let len = u32::try_from(self.payload.len()).unwrap_or(u32::MAX);
            out.extend_from_slice(&len.to_be_bytes());
        }
        out.extend_from_slice(&self.payload);
    }

    pub fn decode(bytes: &[u8], opts: &DecodeOptions) -> Result<Body, DecodeError> {
        let mut r = ByteReader::new(bytes);
        let timestamp = r.read_u32("timestamp")?;
        let nonce = r.read_u32("nonce")?;
        let raw_chain = r.read_u16("emitter_chain")?;
        let emitter_chain = Chain::from(raw_chain);
        if !emitter_chain.is_known() {
            match opts.chain_policy {
                ChainPolicy::PassThrough => {
                    debug!(chain = raw_chain, "passing through unknown emitter chain");
                }
                ChainPolicy::RejectUnknown => return Err(DecodeError::InvalidChainId(raw_chain)),
            }
        }
        let emitter_address = Address(r.read_array("emitter_address")?);
        let sequence = r.read_u64("sequence")?;
        let consistency_level = r.read_u8("consistency_level")?;

        let payload = match opts.payload_encoding {
            PayloadEncoding::Trailing => r.rest(),
            PayloadEncoding::LengthPrefixed => {
                let declared = r.read_u32("payload_length")?;
                let remaining = r.remaining();
                if usize::try_from(declared).ok() != Some(remaining) {
                    return Err(DecodeError::PayloadLengthMismatch {
                        declared,
                        remaining,
                    });
                }
                r.rest()
            }
        };

        Ok(Body {
            timestamp,
            nonce,
            emitter_chain,
            emitter_address,
            sequence,
            consistency_level,
            payload: payload.to_vec(),
        })
    }

    /// Digest of the classic encoding of this body.
    pub fn digest(&self) -> Digest {
        digest(&self.encode())
    }

    /// Returns a copy of this body with the payload replaced.
    pub fn with_payload(&self, payload: Vec<u8>) -> Body {
        Body {
            payload,
            ..self.clone()
        }
    }
}

/// A classic VAA: header and body together.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq, Hash)]
pub struct Vaa {
    pub header: Header,
    pub body: Body,
}

/// A decoded VAA that still borrows the raw body bytes it was decoded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedVaa<'a> {
    pub header: Header,
    pub body: Body,
    pub body_bytes: &'a [u8],
}

impl Vaa {
    pub const VERSION: u8 = 1;

    pub fn parse<'a>(raw: &'a [u8], opts: &DecodeOptions) -> Result<ParsedVaa<'a>, DecodeError> {
        let mut r = ByteReader::new(raw);
        let header = parse_header(&mut r)?;
        let body_bytes = r.rest();
        let body = Body::decode(body_bytes, opts)?;

        debug!(
            guardian_set_index = header.guardian_set_index,
            signatures = header.signatures.len(),
            emitter_chain = %body.emitter_chain,
            sequence = body.sequence,
            "parsed vaa"
        );

        Ok(ParsedVaa {
            header,
            body,
            body_bytes,
        })
    }

    /// Locates the body of a raw VAA without decoding its fields.
    pub fn body_bytes(raw: &[u8]) -> Result<&[u8], DecodeError> {
        let mut r = ByteReader::new(raw);
        parse_header(&mut r)?;
        let body = r.rest();
        if body.len() < BODY_HEADER_LEN {
            return Err(DecodeError::TruncatedInput {
                field: "body",
                offset: raw.len() - body.len(),
                needed: BODY_HEADER_LEN,
                remaining: body.len(),
            });
        }
        Ok(body)
    }

    pub fn serialize(&self) -> Result<Vec<u8>, DecodeError> {
        let n = self.header.signatures.len();
        let count = u8::try_from(n).map_err(|_| DecodeError::TooManySignatures(n))?;

        let mut out =
            Vec::with_capacity(6 + n * SIGNATURE_LEN + BODY_HEADER_LEN + self.body.payload.len());
        out.push(self.header.version);
        out.extend_from_slice(&self.header.guardian_set_index.to_be_bytes());
        out.push(count);
        for sig in &self.header.signatures {
            out.push(sig.index);
            out.extend_from_slice(&sig.signature);
        }
        self.body.write_to(&mut out, PayloadEncoding::Trailing);
        Ok(out)
    }

    pub fn digest(&self) -> Digest {
        self.body.digest()
    }
}

fn parse_header(r: &mut ByteReader<'_>) -> Result<Header, DecodeError> {
    let version = r.read_u8("version")?;
    if version != Vaa::VERSION {
        return Err(DecodeError::InvalidVersion(version));
    }
    let guardian_set_index = r.read_u32("guardian_set_index")?;
    let count = r.read_u8("signature_count")?;

    let signatures = (0..count)
        .map(|_| {
            Ok(Signature {
                index: r.read_u8("signature.index")?,
                signature: r.read_array("signature")?,
            })
        })
        .collect::<Result<Vec<_>, DecodeError>>()?;

    Ok(Header {
        version,
        guardian_set_index,
        signatures,
    })
}
