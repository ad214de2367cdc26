//! ElGamal encryption on BLS12-381 G1.
//!
//! # Field encryption (hashed ElGamal)
//!
//! To encrypt a 32-byte field block `m` under oracle public key `pk = x·G`:
//! 1. Sample random scalar r
//! 2. Compute E = r·G (ephemeral public key)
//! 3. Compute shared = r·pk
//! 4. Derive keystream = H(shared)
//! 5. masked = m ⊕ keystream
//!
//! The oracle recovers shared = x·E and unmasks. Recovery is exact for any
//! block, so fields carry arbitrary participant identifiers, not just small
//! numbers.
//!
//! # Counter encryption (exponent ElGamal)
//!
//! A counter value `v` encrypts as (c1, c2) = (r·G, r·pk + v·G). Two
//! ciphertexts add componentwise, giving a ciphertext of the sum. With r = 0
//! the ciphertext is trivial and deterministic, which is what the ledger uses
//! for its in-place increments. Decryption recovers v·G = c2 - x·c1 and
//! solves the discrete log by search, so v must stay under a small bound.

use bls12_381::{G1Affine, G1Projective, Scalar};
use group::Curve;
use rand::{CryptoRng, RngCore};

use grid_types::{
    encode_field, ClearTrade, CounterCiphertext, FieldCiphertext, G1Point, FIELD_BLOCK,
};

use crate::error::CryptoError;

/// Generate a random scalar.
pub fn random_scalar<R: RngCore + CryptoRng>(rng: &mut R) -> Scalar {
    let mut bytes = [0u8; 64];
    rng.fill_bytes(&mut bytes);
    Scalar::from_bytes_wide(&bytes)
}

/// Generate an oracle keypair (x, pk = x·G).
pub fn keygen<R: RngCore + CryptoRng>(rng: &mut R) -> (Scalar, G1Affine) {
    let secret = random_scalar(rng);
    let public = (G1Projective::generator() * secret).to_affine();
    (secret, public)
}

/// Derive the masking keystream from a shared Diffie-Hellman point.
pub fn derive_keystream(shared: &G1Affine) -> [u8; FIELD_BLOCK] {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(b"GRID_FIELD_KEYSTREAM_V1:");
    hasher.update(shared.to_compressed());
    hasher.finalize().into()
}

/// Encrypt one 32-byte field block under the oracle public key.
pub fn encrypt_field<R: RngCore + CryptoRng>(
    public_key: &G1Affine,
    block: &[u8; FIELD_BLOCK],
    rng: &mut R,
) -> FieldCiphertext {
    let r = random_scalar(rng);
    let ephemeral = (G1Projective::generator() * r).to_affine();
    let shared = (G1Projective::from(*public_key) * r).to_affine();

    let keystream = derive_keystream(&shared);
    let mut masked = [0u8; FIELD_BLOCK];
    for (i, byte) in block.iter().enumerate() {
        masked[i] = byte ^ keystream[i];
    }

    FieldCiphertext {
        ephemeral: compress_g1(&ephemeral),
        masked,
    }
}

/// Encrypt all four fields of a cleartext trade in canonical order.
///
/// Fields longer than the plaintext domain are rejected before any
/// randomness is drawn.
pub fn encrypt_trade<R: RngCore + CryptoRng>(
    public_key: &G1Affine,
    trade: &ClearTrade,
    rng: &mut R,
) -> Result<[FieldCiphertext; 4], CryptoError> {
    let mut blocks = [[0u8; FIELD_BLOCK]; 4];
    for (slot, field) in blocks.iter_mut().zip(trade.fields()) {
        *slot = encode_field(field).ok_or(CryptoError::FieldTooLong { len: field.len() })?;
    }

    Ok([
        encrypt_field(public_key, &blocks[0], rng),
        encrypt_field(public_key, &blocks[1], rng),
        encrypt_field(public_key, &blocks[2], rng),
        encrypt_field(public_key, &blocks[3], rng),
    ])
}

/// Recover the shared point x·E for a field ciphertext.
pub fn recover_shared(
    secret: &Scalar,
    ciphertext: &FieldCiphertext,
) -> Result<G1Affine, CryptoError> {
    let ephemeral = decompress_g1(&ciphertext.ephemeral.0)?;
    Ok((G1Projective::from(ephemeral) * secret).to_affine())
}

/// Unmask a field ciphertext given its shared point.
pub fn unmask_block(ciphertext: &FieldCiphertext, shared: &G1Affine) -> [u8; FIELD_BLOCK] {
    let keystream = derive_keystream(shared);
    let mut block = [0u8; FIELD_BLOCK];
    for (i, byte) in ciphertext.masked.iter().enumerate() {
        block[i] = byte ^ keystream[i];
    }
    block
}

/// Decrypt a field ciphertext with the oracle secret key.
pub fn decrypt_field(
    secret: &Scalar,
    ciphertext: &FieldCiphertext,
) -> Result<[u8; FIELD_BLOCK], CryptoError> {
    let shared = recover_shared(secret, ciphertext)?;
    Ok(unmask_block(ciphertext, &shared))
}

/// Check that a claimed cleartext block matches a ciphertext under a given
/// shared point.
///
/// Used by the ledger after DLEQ verification: the proof establishes that
/// `shared` is the true decryption point, and this check establishes that
/// the claimed cleartext is what the point unmasks.
pub fn verify_masked_payload(
    ciphertext: &FieldCiphertext,
    shared: &G1Affine,
    block: &[u8; FIELD_BLOCK],
) -> Result<(), CryptoError> {
    if unmask_block(ciphertext, shared) == *block {
        Ok(())
    } else {
        Err(CryptoError::PayloadMismatch)
    }
}

/// Encrypt a counter value with fresh randomness.
pub fn encrypt_counter<R: RngCore + CryptoRng>(
    public_key: &G1Affine,
    value: u64,
    rng: &mut R,
) -> CounterCiphertext {
    let r = random_scalar(rng);
    let c1 = (G1Projective::generator() * r).to_affine();
    let c2 = (G1Projective::from(*public_key) * r + G1Projective::generator() * Scalar::from(value))
        .to_affine();

    CounterCiphertext {
        c1: compress_g1(&c1),
        c2: compress_g1(&c2),
    }
}

/// Deterministic counter ciphertext with zero randomness: (0·G, v·G).
///
/// Adding this to a real ciphertext increments its value without any
/// randomness source, which keeps ledger state transitions replayable.
pub fn trivial_counter(value: u64) -> CounterCiphertext {
    let c1 = G1Affine::identity();
    let c2 = (G1Projective::generator() * Scalar::from(value)).to_affine();

    CounterCiphertext {
        c1: compress_g1(&c1),
        c2: compress_g1(&c2),
    }
}

/// Homomorphically add two counter ciphertexts.
pub fn add_counters(
    a: &CounterCiphertext,
    b: &CounterCiphertext,
) -> Result<CounterCiphertext, CryptoError> {
    let a1 = decompress_g1(&a.c1.0)?;
    let a2 = decompress_g1(&a.c2.0)?;
    let b1 = decompress_g1(&b.c1.0)?;
    let b2 = decompress_g1(&b.c2.0)?;

    let c1 = (G1Projective::from(a1) + G1Projective::from(b1)).to_affine();
    let c2 = (G1Projective::from(a2) + G1Projective::from(b2)).to_affine();

    Ok(CounterCiphertext {
        c1: compress_g1(&c1),
        c2: compress_g1(&c2),
    })
}

/// Decrypt a counter ciphertext by solving the discrete log up to `bound`.
pub fn decrypt_counter(
    secret: &Scalar,
    ciphertext: &CounterCiphertext,
    bound: u64,
) -> Result<u64, CryptoError> {
    let c1 = decompress_g1(&ciphertext.c1.0)?;
    let c2 = decompress_g1(&ciphertext.c2.0)?;

    // v·G = c2 - x·c1
    let target = G1Projective::from(c2) - G1Projective::from(c1) * secret;

    let mut acc = G1Projective::identity();
    let generator = G1Projective::generator();
    for value in 0..=bound {
        if acc == target {
            return Ok(value);
        }
        acc += generator;
    }

    Err(CryptoError::CounterOutOfRange { bound })
}

/// Compress a G1 point to bytes.
pub fn compress_g1(point: &G1Affine) -> G1Point {
    G1Point(point.to_compressed())
}

/// Decompress a G1 point from bytes.
pub fn decompress_g1(bytes: &[u8; 48]) -> Result<G1Affine, CryptoError> {
    let point = G1Affine::from_compressed(bytes);
    if point.is_some().into() {
        Ok(point.unwrap())
    } else {
        Err(CryptoError::InvalidG1Point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grid_types::decode_field;
    use rand::rngs::OsRng;

    #[test]
    fn test_field_encrypt_decrypt_roundtrip() {
        let mut rng = OsRng;
        let (secret, public) = keygen(&mut rng);

        let block = encode_field("alice").unwrap();
        let ciphertext = encrypt_field(&public, &block, &mut rng);

        let recovered = decrypt_field(&secret, &ciphertext).unwrap();
        assert_eq!(recovered, block);
        assert_eq!(decode_field(&recovered), "alice");
    }

    #[test]
    fn test_wrong_secret_fails_to_unmask() {
        let mut rng = OsRng;
        let (_, public) = keygen(&mut rng);
        let (wrong_secret, _) = keygen(&mut rng);

        let block = encode_field("bob").unwrap();
        let ciphertext = encrypt_field(&public, &block, &mut rng);

        let recovered = decrypt_field(&wrong_secret, &ciphertext).unwrap();
        assert_ne!(recovered, block);
    }

    #[test]
    fn test_encrypt_trade_all_fields() {
        let mut rng = OsRng;
        let (secret, public) = keygen(&mut rng);

        let trade = ClearTrade {
            seller_id: "alice".to_string(),
            buyer_id: "bob".to_string(),
            energy_amount: "120".to_string(),
            price: "2500".to_string(),
        };

        let ciphertexts = encrypt_trade(&public, &trade, &mut rng).unwrap();
        assert_eq!(ciphertexts.len(), 4);

        let decoded: Vec<String> = ciphertexts
            .iter()
            .map(|ct| decode_field(&decrypt_field(&secret, ct).unwrap()))
            .collect();
        assert_eq!(decoded, vec!["alice", "bob", "120", "2500"]);
    }

    #[test]
    fn test_encrypt_trade_rejects_long_field() {
        let mut rng = OsRng;
        let (_, public) = keygen(&mut rng);

        let trade = ClearTrade {
            seller_id: "s".repeat(40),
            buyer_id: "bob".to_string(),
            energy_amount: "1".to_string(),
            price: "1".to_string(),
        };

        let result = encrypt_trade(&public, &trade, &mut rng);
        assert!(matches!(result, Err(CryptoError::FieldTooLong { len: 40 })));
    }

    #[test]
    fn test_verify_masked_payload() {
        let mut rng = OsRng;
        let (secret, public) = keygen(&mut rng);

        let block = encode_field("seller-7").unwrap();
        let ciphertext = encrypt_field(&public, &block, &mut rng);
        let shared = recover_shared(&secret, &ciphertext).unwrap();

        assert!(verify_masked_payload(&ciphertext, &shared, &block).is_ok());

        let wrong = encode_field("seller-8").unwrap();
        assert!(matches!(
            verify_masked_payload(&ciphertext, &shared, &wrong),
            Err(CryptoError::PayloadMismatch)
        ));
    }

    #[test]
    fn test_counter_homomorphic_addition() {
        let mut rng = OsRng;
        let (secret, public) = keygen(&mut rng);

        let mut acc = encrypt_counter(&public, 1, &mut rng);
        for _ in 0..4 {
            acc = add_counters(&acc, &trivial_counter(1)).unwrap();
        }

        assert_eq!(decrypt_counter(&secret, &acc, 100).unwrap(), 5);
    }

    #[test]
    fn test_trivial_counter_is_deterministic() {
        assert_eq!(trivial_counter(1), trivial_counter(1));
        assert_ne!(trivial_counter(1), trivial_counter(2));
    }

    #[test]
    fn test_decrypt_counter_out_of_range() {
        let mut rng = OsRng;
        let (secret, public) = keygen(&mut rng);

        let ciphertext = encrypt_counter(&public, 50, &mut rng);
        let result = decrypt_counter(&secret, &ciphertext, 10);
        assert!(matches!(
            result,
            Err(CryptoError::CounterOutOfRange { bound: 10 })
        ));
    }

    #[test]
    fn test_decompress_rejects_garbage() {
        let garbage = [0xffu8; 48];
        assert!(decompress_g1(&garbage).is_err());
    }
}
