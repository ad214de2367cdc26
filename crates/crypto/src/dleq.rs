//! DLEQ proofs of correct decryption (Chaum-Pedersen protocol).
//!
//! For each field ciphertext (E, masked) the oracle reveals the shared point
//! S = x·E and proves log_G(pk) = log_E(S), i.e. that S was derived with the
//! same secret x that backs the published public key pk = x·G. The challenge
//! transcript also binds the ciphertext bytes and the request token, so an
//! opening cannot be replayed against a different record or request.

use bls12_381::{G1Affine, G1Projective, Scalar};
use group::Curve;
use rand::{CryptoRng, RngCore};

use grid_types::{
    DleqProof, FieldCiphertext, FieldOpening, G1Point, RequestToken, Scalar as TypesScalar,
};

use crate::elgamal::{compress_g1, decompress_g1, random_scalar};
use crate::error::CryptoError;

/// Produce the opening for one field ciphertext: the shared point plus a
/// DLEQ proof that it was derived with the oracle secret.
pub fn prove_field_opening<R: RngCore + CryptoRng>(
    secret: &Scalar,
    public_key: &G1Affine,
    ciphertext: &FieldCiphertext,
    token: &RequestToken,
    rng: &mut R,
) -> Result<FieldOpening, CryptoError> {
    let ephemeral = decompress_g1(&ciphertext.ephemeral.0)?;
    let shared = (G1Projective::from(ephemeral) * secret).to_affine();

    // Commitments t1 = k·G, t2 = k·E
    let k = random_scalar(rng);
    let generator = G1Affine::generator();
    let t1 = (G1Projective::from(generator) * k).to_affine();
    let t2 = (G1Projective::from(ephemeral) * k).to_affine();

    let c = opening_challenge(&ephemeral, public_key, &shared, &t1, &t2, ciphertext, token);

    // Response s = k - c·x
    let s = k - c * secret;

    Ok(FieldOpening {
        shared: compress_g1(&shared),
        proof: DleqProof {
            challenge: TypesScalar(c.to_bytes()),
            response: TypesScalar(s.to_bytes()),
        },
    })
}

/// Verify one field opening against the published oracle public key, the
/// original ciphertext and the request token the opening answers.
pub fn verify_field_opening(
    public_key: &G1Point,
    ciphertext: &FieldCiphertext,
    token: &RequestToken,
    opening: &FieldOpening,
) -> Result<(), CryptoError> {
    let pk = decompress_g1(&public_key.0)?;
    let ephemeral = decompress_g1(&ciphertext.ephemeral.0)?;
    let shared = decompress_g1(&opening.shared.0)?;

    // Reduce transmitted scalars modulo field order
    let mut c_bytes_wide = [0u8; 64];
    c_bytes_wide[..32].copy_from_slice(&opening.proof.challenge.0);
    let c = Scalar::from_bytes_wide(&c_bytes_wide);

    let mut s_bytes_wide = [0u8; 64];
    s_bytes_wide[..32].copy_from_slice(&opening.proof.response.0);
    let s = Scalar::from_bytes_wide(&s_bytes_wide);

    let generator = G1Affine::generator();

    // Recompute t1 = s·G + c·pk and t2 = s·E + c·S
    let t1 = (G1Projective::from(generator) * s + G1Projective::from(pk) * c).to_affine();
    let t2 = (G1Projective::from(ephemeral) * s + G1Projective::from(shared) * c).to_affine();

    let expected_c = opening_challenge(&ephemeral, &pk, &shared, &t1, &t2, ciphertext, token);

    if c == expected_c {
        Ok(())
    } else {
        Err(CryptoError::DleqVerificationFailed)
    }
}

/// Fiat-Shamir challenge over the full opening transcript.
fn opening_challenge(
    ephemeral: &G1Affine,
    public_key: &G1Affine,
    shared: &G1Affine,
    t1: &G1Affine,
    t2: &G1Affine,
    ciphertext: &FieldCiphertext,
    token: &RequestToken,
) -> Scalar {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(b"GRID_OPENING_V1:");
    hasher.update(G1Affine::generator().to_compressed());
    hasher.update(ephemeral.to_compressed());
    hasher.update(public_key.to_compressed());
    hasher.update(shared.to_compressed());
    hasher.update(t1.to_compressed());
    hasher.update(t2.to_compressed());
    hasher.update(ciphertext.to_bytes());
    hasher.update(token.0);
    let hash = hasher.finalize();

    // Reduce modulo field order
    let mut c_bytes_wide = [0u8; 64];
    c_bytes_wide[..32].copy_from_slice(&hash);
    Scalar::from_bytes_wide(&c_bytes_wide)
}
