//! Signed bundle codec.
//!
//! A bundle is a program serialized in a canonical form together with an
//! HMAC-SHA256 tag over that form.  Canonical bytes are produced by
//! converting the program to a `serde_json::Value` first, where object keys
//! sort lexicographically, integers render in decimal, and floats take
//! their shortest round-trippable form.  The tag recomputed over a
//! decoded-then-re-encoded program therefore matches the original.
//! Verification compares tags in constant time via `Mac::verify_slice`.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use crate::bytecode::Program;

type HmacSha256 = Hmac<Sha256>;

/// Length in bytes of the tag carried by a signed bundle.
pub const SIGNATURE_LEN: usize = 32;

/// Failures reading or writing bundles.
#[derive(Debug, Error)]
pub enum BundleError {
    #[error("malformed bundle: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("bundle signature verification failed")]
    InvalidBundleSignature,
    #[error("signing key rejected")]
    InvalidKey,
}

/// On-disk record: the program plus its authentication tag.  The signature
/// is hex in the serialized form and 0 or [`SIGNATURE_LEN`] bytes decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Envelope {
    program: Program,
    #[serde(with = "hex::serde")]
    signature: Vec<u8>,
}

/// Serialize a program to its canonical byte form.
pub fn canonical_payload(program: &Program) -> Result<Vec<u8>, BundleError> {
    let value = serde_json::to_value(program)?;
    Ok(serde_json::to_vec(&value)?)
}

fn compute_tag(payload: &[u8], key: &[u8]) -> Result<Vec<u8>, BundleError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| BundleError::InvalidKey)?;
    mac.update(payload);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Encode a program as bundle bytes, tagging it when a key is supplied.
pub fn write_bundle(program: &Program, key: Option<&[u8]>) -> Result<Vec<u8>, BundleError> {
    let signature = match key {
        Some(key) => {
            let payload = canonical_payload(program)?;
            compute_tag(&payload, key)?
        }
        None => Vec::new(),
    };
    let envelope = Envelope {
        program: program.clone(),
        signature,
    };
    let value = serde_json::to_value(&envelope)?;
    Ok(serde_json::to_vec(&value)?)
}

/// Decode bundle bytes back into a program.  With a key, the tag is
/// recomputed over the decoded program's canonical form and compared in
/// constant time; without one, the signature field is ignored.
pub fn read_bundle(bytes: &[u8], key: Option<&[u8]>) -> Result<Program, BundleError> {
    let envelope: Envelope = serde_json::from_slice(bytes)?;
    if let Some(key) = key {
        let payload = canonical_payload(&envelope.program)?;
        let mut mac = HmacSha256::new_from_slice(key).map_err(|_| BundleError::InvalidKey)?;
        mac.update(&payload);
        mac.verify_slice(&envelope.signature)
            .map_err(|_| BundleError::InvalidBundleSignature)?;
    }
    Ok(envelope.program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;

    fn sample_program() -> Program {
        compile(
            "func greet(_ name: String) { log(\"Hola \" + name) }\n\
             func main() { greet(\"Rafa\")\n return 41 }",
        )
        .expect("compile")
    }

    #[test]
    fn canonical_payload_is_deterministic() {
        let program = sample_program();
        assert_eq!(
            canonical_payload(&program).expect("payload"),
            canonical_payload(&program.clone()).expect("payload")
        );
    }

    #[test]
    fn distinct_programs_have_distinct_payloads() {
        let a = compile("func main() { return 1 }").expect("compile");
        let b = compile("func main() { return 2 }").expect("compile");
        assert_ne!(
            canonical_payload(&a).expect("payload"),
            canonical_payload(&b).expect("payload")
        );
    }

    #[test]
    fn signed_round_trip_preserves_the_program() {
        let program = sample_program();
        let key: &[u8] = b"super secret key";
        let bytes = write_bundle(&program, Some(key)).expect("write");
        let decoded = read_bundle(&bytes, Some(key)).expect("read");
        assert_eq!(decoded, program);
    }

    #[test]
    fn unsigned_round_trip_skips_verification() {
        let program = sample_program();
        let bytes = write_bundle(&program, None).expect("write");
        let decoded = read_bundle(&bytes, None).expect("read");
        assert_eq!(decoded, program);
        // A signed bundle read without a key is also accepted.
        let signed = write_bundle(&program, Some(b"k1".as_slice())).expect("write");
        assert!(read_bundle(&signed, None).is_ok());
    }

    #[test]
    fn wrong_key_fails_verification() {
        let program = sample_program();
        let bytes = write_bundle(&program, Some(b"key one".as_slice())).expect("write");
        let err = read_bundle(&bytes, Some(b"key two".as_slice())).unwrap_err();
        assert!(matches!(err, BundleError::InvalidBundleSignature));
    }

    #[test]
    fn tampered_program_field_fails_verification() {
        let program = sample_program();
        let key: &[u8] = b"key";
        let bytes = write_bundle(&program, Some(key)).expect("write");
        let text = String::from_utf8(bytes).expect("utf8 bundle");
        // The call argument appears exactly once, in main's constant pool;
        // it cannot collide with the lowercase-hex signature.
        assert_eq!(text.matches("Rafa").count(), 1);
        let tampered = text.replace("Rafa", "Mika").into_bytes();
        let err = read_bundle(&tampered, Some(key)).unwrap_err();
        assert!(matches!(err, BundleError::InvalidBundleSignature));
    }

    #[test]
    fn signature_length_matches_the_scheme() {
        let program = sample_program();
        let signed = write_bundle(&program, Some(b"k".as_slice())).expect("write");
        let envelope: Envelope = serde_json::from_slice(&signed).expect("decode");
        assert_eq!(envelope.signature.len(), SIGNATURE_LEN);
        let unsigned = write_bundle(&program, None).expect("write");
        let envelope: Envelope = serde_json::from_slice(&unsigned).expect("decode");
        assert!(envelope.signature.is_empty());
    }

    #[test]
    fn garbage_bytes_are_malformed() {
        let err = read_bundle(b"not a bundle", None).unwrap_err();
        assert!(matches!(err, BundleError::Malformed(_)));
    }
}
