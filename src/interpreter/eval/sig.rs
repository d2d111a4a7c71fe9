use crate::constants::{COMPRESSED_PUBKEY_SIZE, HALF_ORDER};
use crate::signature_checker::SignatureChecker;
use crate::VerifyFlags;
use bitcoin::script::{Builder, PushBytesBuf};
use bitcoin::Script;
use num_bigint::Sign;

const SIGHASH_ALL: u8 = 0x01;
const SIGHASH_SINGLE: u8 = 0x03;
const SIGHASH_ANYONECANPAY: u8 = 0x80;

/// Ways a signature can violate strict DER encoding.
///
/// The walk mirrors the layout
/// `0x30 [total-length] 0x02 [R-length] [R] 0x02 [S-length] [S] [sighash-type]`.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum SignatureEncodingError {
    #[error("DER encoded signature is too short")]
    TooShort,
    #[error("DER encoded signature is too long")]
    TooLong,
    #[error("signature does not have the expected ASN.1 sequence ID")]
    InvalidSequenceId,
    #[error("signature length does not match its contents")]
    InvalidDataLength,
    #[error("R integer marker")]
    InvalidIntegerIdR,
    #[error("R length is zero")]
    ZeroLengthR,
    #[error("R is negative")]
    NegativeR,
    #[error("R value has too much padding")]
    TooMuchPaddingR,
    #[error("S integer marker")]
    InvalidIntegerIdS,
    #[error("S length is zero")]
    ZeroLengthS,
    #[error("S is negative")]
    NegativeS,
    #[error("S value has too much padding")]
    TooMuchPaddingS,
}

/// Checksig error type.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum CheckSigError {
    #[error("unsupported signature hash type")]
    UnsupportedSigHashType,
    #[error("unsupported public key type")]
    BadPubKey,
    #[error("signature violates low-S requirement")]
    HighS,
    #[error("invalid signature encoding: {0:?}")]
    Der(#[from] SignatureEncodingError),
}

/// Evaluates a single signature against a single public key.
///
/// Encoding violations under the active flags are hard failures; a signature
/// that is merely wrong yields `Ok(false)` and lets the script decide.
pub(super) fn eval_checksig(
    sig: &[u8],
    pubkey: &[u8],
    script: &Script,
    begincode: usize,
    flags: &VerifyFlags,
    checker: &impl SignatureChecker,
) -> Result<bool, CheckSigError> {
    let mut subscript = script.as_bytes()[begincode..].to_vec();

    // A script cannot commit to its own signature, so the signature push is
    // stripped from the code being hashed.
    find_and_delete(&mut subscript, sig);

    check_signature_encoding(sig, flags)?;
    check_pubkey_encoding(pubkey, flags)?;

    let script_code = Script::from_bytes(&subscript);

    Ok(checker.check_sig(sig, pubkey, script_code))
}

/// Removes every occurrence of `sig`, re-encoded as the push operation that
/// carried it, from `script`. Returns how many were removed.
///
/// Matches only at instruction boundaries, so a push whose payload merely
/// contains the encoded signature bytes is left intact.
pub(super) fn find_and_delete(script: &mut Vec<u8>, sig: &[u8]) -> usize {
    if sig.is_empty() {
        return 0;
    }

    let mut push_buf = PushBytesBuf::with_capacity(sig.len());
    push_buf
        .extend_from_slice(sig)
        .expect("Stack elements never exceed push length limits; qed");
    let pattern = Builder::default().push_slice(push_buf).into_script();
    let pattern = pattern.as_bytes();

    if pattern.len() > script.len() {
        return 0;
    }

    let mut found = 0;
    let mut result = Vec::with_capacity(script.len());
    let mut i = 0;

    while i < script.len() {
        if script.len() - i >= pattern.len() && &script[i..i + pattern.len()] == pattern {
            found += 1;
            i += pattern.len();
            continue;
        }
        let step = instruction_len(&script[i..]);
        result.extend_from_slice(&script[i..i + step]);
        i += step;
    }

    *script = result;

    found
}

/// Length in bytes of the instruction starting at `bytes[0]`, including any
/// push payload, clamped to the bytes actually available when a declared push
/// length runs past the end of the script.
fn instruction_len(bytes: &[u8]) -> usize {
    let len = match bytes[0] {
        n @ 0x01..=0x4b => 1 + n as usize,
        0x4c => 2 + bytes.get(1).copied().unwrap_or(0) as usize,
        0x4d => {
            3 + bytes
                .get(1..3)
                .map(|b| u16::from_le_bytes([b[0], b[1]]) as usize)
                .unwrap_or(0)
        }
        0x4e => {
            5 + bytes
                .get(1..5)
                .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as usize)
                .unwrap_or(0)
        }
        _ => 1,
    };
    len.min(bytes.len())
}

pub(super) fn check_signature_encoding(
    sig: &[u8],
    flags: &VerifyFlags,
) -> Result<(), CheckSigError> {
    // An empty signature is not strictly DER encoded but is allowed as the
    // compact way to express a deliberately failing checksig.
    if sig.is_empty() {
        return Ok(());
    }

    if flags.intersects(VerifyFlags::DERSIG | VerifyFlags::LOW_S | VerifyFlags::STRICTENC) {
        is_valid_signature_encoding(sig)?;
    }

    if flags.intersects(VerifyFlags::LOW_S) {
        is_low_der_signature(sig)?;
    }

    if flags.intersects(VerifyFlags::STRICTENC) && !is_defined_hashtype_signature(sig) {
        return Err(CheckSigError::UnsupportedSigHashType);
    }

    Ok(())
}

struct EncodedS {
    offset: usize,
    length: usize,
}

fn is_valid_signature_encoding(sig: &[u8]) -> Result<EncodedS, SignatureEncodingError> {
    if sig.len() < 9 {
        return Err(SignatureEncodingError::TooShort);
    }

    if sig.len() > 73 {
        return Err(SignatureEncodingError::TooLong);
    }

    // A signature is of type 0x30 (compound).
    if sig[0] != 0x30 {
        return Err(SignatureEncodingError::InvalidSequenceId);
    }

    // Make sure the length covers the entire signature.
    if sig[1] as usize != sig.len() - 3 {
        return Err(SignatureEncodingError::InvalidDataLength);
    }

    let len_r = sig[3] as usize;

    // Make sure the length of the S element is still inside the signature.
    if 5 + len_r >= sig.len() {
        return Err(SignatureEncodingError::InvalidDataLength);
    }

    let len_s = sig[5 + len_r] as usize;

    // The lengths of the elements must add up to the signature length.
    if len_r + len_s + 7 != sig.len() {
        return Err(SignatureEncodingError::InvalidDataLength);
    }

    // Check whether the R element is an integer.
    if sig[2] != 0x02 {
        return Err(SignatureEncodingError::InvalidIntegerIdR);
    }

    if len_r == 0 {
        return Err(SignatureEncodingError::ZeroLengthR);
    }

    if sig[4] & 0x80 != 0 {
        return Err(SignatureEncodingError::NegativeR);
    }

    // Null bytes at the start of R are not allowed, unless R would otherwise
    // be interpreted as a negative number.
    if len_r > 1 && sig[4] == 0x00 && sig[5] & 0x80 == 0 {
        return Err(SignatureEncodingError::TooMuchPaddingR);
    }

    // Check whether the S element is an integer.
    if sig[len_r + 4] != 0x02 {
        return Err(SignatureEncodingError::InvalidIntegerIdS);
    }

    if len_s == 0 {
        return Err(SignatureEncodingError::ZeroLengthS);
    }

    if sig[len_r + 6] & 0x80 != 0 {
        return Err(SignatureEncodingError::NegativeS);
    }

    // Null bytes at the start of S are not allowed, unless S would otherwise
    // be interpreted as a negative number.
    if len_s > 1 && sig[len_r + 6] == 0x00 && sig[len_r + 7] & 0x80 == 0 {
        return Err(SignatureEncodingError::TooMuchPaddingS);
    }

    Ok(EncodedS {
        offset: len_r + 6,
        length: len_s,
    })
}

fn is_low_der_signature(sig: &[u8]) -> Result<(), CheckSigError> {
    let encoded_s = is_valid_signature_encoding(sig)?;

    let s_bytes = &sig[encoded_s.offset..encoded_s.offset + encoded_s.length];

    // An S above half the curve order has a shorter complement that verifies
    // equally well; accepting both makes the signature, and with it the
    // transaction hash, malleable.
    let s_value = num_bigint::BigInt::from_bytes_be(Sign::Plus, s_bytes);

    if s_value > *HALF_ORDER {
        return Err(CheckSigError::HighS);
    }

    Ok(())
}

fn is_defined_hashtype_signature(sig: &[u8]) -> bool {
    let Some(last_byte) = sig.last().copied() else {
        return false;
    };

    let hash_type = last_byte & !SIGHASH_ANYONECANPAY;

    (SIGHASH_ALL..=SIGHASH_SINGLE).contains(&hash_type)
}

pub(super) fn check_pubkey_encoding(pubkey: &[u8], flags: &VerifyFlags) -> Result<(), CheckSigError> {
    if flags.intersects(VerifyFlags::STRICTENC) && !is_public_key(pubkey) {
        return Err(CheckSigError::BadPubKey);
    }

    Ok(())
}

fn is_public_key(v: &[u8]) -> bool {
    match v.len() {
        COMPRESSED_PUBKEY_SIZE if v[0] == 2 || v[0] == 3 => true,
        65 if v[0] == 4 => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_public_key() {
        assert!(!is_public_key(&[]));
        assert!(!is_public_key(&[1]));
        assert!(is_public_key(&hex::decode("0495dfb90f202c7d016ef42c65bc010cd26bb8237b06253cc4d12175097bef767ed6b1fcb3caf1ed57c98d92e6cb70278721b952e29a335134857acd4c199b9d2f").unwrap()));
        assert!(is_public_key(&[2; 33]));
        assert!(is_public_key(&[3; 33]));
        assert!(!is_public_key(&[4; 33]));
    }

    #[test]
    fn test_check_pubkey_encoding() {
        let uncompressed = hex::decode(
            "0411db93e1dcdb8a016b49840f8c53bc1eb68a382e97b1482ecad7b148a6909a\
             5cb2e0eaddfb84ccf9744464f82e160bfa9b8b64f9d4c03f999b8643f656b412a3",
        )
        .unwrap();
        let compressed =
            hex::decode("02ce0b14fb842b1ba549fdd675c98075f12e9c510f8ef52bd021a9a1f4809d3b4d")
                .unwrap();
        let hybrid = hex::decode(
            "0679be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f817\
             98483ada7726a3c4655da4fbfc0e1108a8fd17b448a68554199c47d08ffb10d4b8",
        )
        .unwrap();

        let flags = VerifyFlags::STRICTENC;

        assert_eq!(check_pubkey_encoding(&uncompressed, &flags), Ok(()));
        assert_eq!(check_pubkey_encoding(&compressed, &flags), Ok(()));
        assert_eq!(
            check_pubkey_encoding(&[], &flags),
            Err(CheckSigError::BadPubKey)
        );
        assert_eq!(
            check_pubkey_encoding(&hybrid, &flags),
            Err(CheckSigError::BadPubKey)
        );
        // Without STRICTENC anything goes.
        assert_eq!(check_pubkey_encoding(&hybrid, &VerifyFlags::NONE), Ok(()));
    }

    #[test]
    fn test_check_signature_encoding() {
        let valid = [
            "304402204e45e16932b8af514961a1d3a1a25",
            "fdf3f4f7732e9d624c6c61548ab5fb8cd41022018152",
            "2ec8eca07de4860a4acdd12909d831cc56cbbac46220",
            "82221a8768d1d09",
        ]
        .concat();

        struct TestCase {
            name: &'static str,
            sig: String,
            expected: Result<(), CheckSigError>,
        }

        let test_cases = [
            TestCase {
                name: "valid signature",
                sig: valid.clone(),
                expected: Ok(()),
            },
            TestCase {
                name: "empty",
                sig: String::new(),
                expected: Ok(()),
            },
            TestCase {
                name: "bad magic",
                sig: format!("31{}", &valid[2..]),
                expected: Err(SignatureEncodingError::InvalidSequenceId.into()),
            },
            TestCase {
                name: "bad 1st int marker",
                sig: [
                    "304403204e45e16932b8af514961a1d3a1a25",
                    "fdf3f4f7732e9d624c6c61548ab5fb8cd41022018152",
                    "2ec8eca07de4860a4acdd12909d831cc56cbbac46220",
                    "82221a8768d1d09",
                ]
                .concat(),
                expected: Err(SignatureEncodingError::InvalidIntegerIdR.into()),
            },
            TestCase {
                name: "bad 2nd int marker",
                sig: [
                    "304402204e45e16932b8af514961a1d3a1a25",
                    "fdf3f4f7732e9d624c6c61548ab5fb8cd41032018152",
                    "2ec8eca07de4860a4acdd12909d831cc56cbbac46220",
                    "82221a8768d1d09",
                ]
                .concat(),
                expected: Err(SignatureEncodingError::InvalidIntegerIdS.into()),
            },
            TestCase {
                name: "short len",
                sig: format!("3043{}", &valid[4..]),
                expected: Err(SignatureEncodingError::InvalidDataLength.into()),
            },
            TestCase {
                name: "long len",
                sig: format!("3045{}", &valid[4..]),
                expected: Err(SignatureEncodingError::InvalidDataLength.into()),
            },
            TestCase {
                name: "trailing garbage",
                sig: format!("{valid}01"),
                expected: Err(SignatureEncodingError::InvalidDataLength.into()),
            },
            TestCase {
                name: "extra R padding",
                sig: [
                    "30450221004e45e16932b8af514961a1d3a1a",
                    "25fdf3f4f7732e9d624c6c61548ab5fb8cd410220181",
                    "522ec8eca07de4860a4acdd12909d831cc56cbbac462",
                    "2082221a8768d1d09",
                ]
                .concat(),
                expected: Err(SignatureEncodingError::TooMuchPaddingR.into()),
            },
            TestCase {
                name: "extra S padding",
                sig: [
                    "304502204e45e16932b8af514961a1d3a1a25",
                    "fdf3f4f7732e9d624c6c61548ab5fb8cd41022100181",
                    "522ec8eca07de4860a4acdd12909d831cc56cbbac462",
                    "2082221a8768d1d09",
                ]
                .concat(),
                expected: Err(SignatureEncodingError::TooMuchPaddingS.into()),
            },
        ];

        let flags = VerifyFlags::STRICTENC;

        for TestCase {
            name,
            sig,
            expected,
        } in test_cases
        {
            // The DER checks run on the full signature including the trailing
            // hash-type byte.
            let full_sig = if sig.is_empty() {
                sig
            } else {
                format!("{sig}01")
            };
            let full_sig = hex::decode(full_sig).expect("Invalid hex string");
            assert_eq!(
                check_signature_encoding(&full_sig, &flags),
                expected,
                "case: {name}"
            );
        }
    }

    #[test]
    fn test_high_s_is_rejected_under_low_s() {
        // S = half order + 1.
        let sig = hex_literal::hex!(
            "304402204e45e16932b8af514961a1d3a1a25fdf3f4f7732e9d624c6c61548ab5fb8cd41"
            "02207fffffffffffffffffffffffffffffff5d576e7357a4501ddfe92f46681b20a101"
        );
        assert_eq!(
            check_signature_encoding(&sig, &VerifyFlags::LOW_S),
            Err(CheckSigError::HighS)
        );
        // Tolerated without the flag.
        assert_eq!(check_signature_encoding(&sig, &VerifyFlags::NONE), Ok(()));
    }

    #[test]
    fn test_undefined_hash_type() {
        let valid = [
            "304402204e45e16932b8af514961a1d3a1a25",
            "fdf3f4f7732e9d624c6c61548ab5fb8cd41022018152",
            "2ec8eca07de4860a4acdd12909d831cc56cbbac46220",
            "82221a8768d1d09",
        ]
        .concat();
        let sig = hex::decode(format!("{valid}00")).unwrap();
        assert_eq!(
            check_signature_encoding(&sig, &VerifyFlags::STRICTENC),
            Err(CheckSigError::UnsupportedSigHashType)
        );
    }

    #[test]
    fn test_find_and_delete() {
        let sig = vec![0xaa; 4];
        // [push 4 bytes of 0xaa] OP_DUP [push 4 bytes of 0xaa]
        let mut script = vec![0x04, 0xaa, 0xaa, 0xaa, 0xaa, 0x76, 0x04, 0xaa, 0xaa, 0xaa, 0xaa];
        assert_eq!(find_and_delete(&mut script, &sig), 2);
        assert_eq!(script, vec![0x76]);

        // Raw signature bytes without the push opcode are left alone.
        let mut script = vec![0xaa, 0xaa, 0xaa, 0xaa];
        assert_eq!(find_and_delete(&mut script, &sig), 0);
        assert_eq!(script, vec![0xaa, 0xaa, 0xaa, 0xaa]);
    }

    #[test]
    fn test_find_and_delete_is_instruction_aligned() {
        let sig = vec![0xaa; 4];
        // A 6-byte push whose payload happens to contain the encoded
        // signature push; the instruction must survive intact.
        let mut script = vec![0x06, 0x04, 0xaa, 0xaa, 0xaa, 0xaa, 0xbb];
        let original = script.clone();
        assert_eq!(find_and_delete(&mut script, &sig), 0);
        assert_eq!(script, original);

        // The same payload preceded by a real signature push: only the real
        // one is removed.
        let mut script = vec![
            0x04, 0xaa, 0xaa, 0xaa, 0xaa, 0x06, 0x04, 0xaa, 0xaa, 0xaa, 0xaa, 0xbb,
        ];
        assert_eq!(find_and_delete(&mut script, &sig), 1);
        assert_eq!(script, vec![0x06, 0x04, 0xaa, 0xaa, 0xaa, 0xaa, 0xbb]);
    }
}
