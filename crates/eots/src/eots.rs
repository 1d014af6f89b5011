use fp_primitives::Buf32;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::elliptic_curve::{
    ops::{MulByGenerator, Reduce},
    point::{AffineCoordinates, DecompressPoint},
    subtle::Choice,
    PrimeField,
};
use k256::{AffinePoint, FieldBytes, ProjectivePoint, Scalar, U256};
use sha2::{Digest, Sha256};

use crate::error::EotsError;
use crate::Result;

const CHALLENGE_TAG: &[u8] = b"BIP0340/challenge";

/// BIP-340 tagged hash: `sha256(sha256(tag) || sha256(tag) || ...)`.
fn tagged_hash(tag: &[u8]) -> Sha256 {
    let tag_hash = Sha256::digest(tag);
    let mut digest = Sha256::new();
    digest.update(tag_hash);
    digest.update(tag_hash);
    digest
}

/// Secret randomness, a scalar on the secp256k1 curve.
pub type SecRand = Scalar;

/// Parses 32 bytes into secret randomness. Zero is rejected; it has no
/// public point.
pub fn new_sec_rand(r: &Buf32) -> Result<SecRand> {
    let k = Scalar::from_repr_vartime(FieldBytes::from(r.into_inner()))
        .ok_or(EotsError::ScalarParseFailed)?;
    if bool::from(k.is_zero()) {
        return Err(EotsError::ScalarParseFailed);
    }
    Ok(k)
}

/// Public randomness, a curve point. Encoded x-only on the wire; parsing
/// lifts the even-y point.
pub type PubRand = ProjectivePoint;

/// Parses a 32-byte x coordinate into public randomness.
pub fn new_pub_rand(x_bytes: &Buf32) -> Result<PubRand> {
    lift_x(x_bytes.as_bytes())
}

/// X-only encoding of a public randomness point.
pub fn pub_rand_to_bytes(p: &PubRand) -> Buf32 {
    Buf32::from(point_x_bytes(p))
}

/// Byte encoding of secret randomness.
pub fn sec_rand_to_bytes(k: &SecRand) -> Buf32 {
    Buf32::from(<[u8; 32]>::from(k.to_bytes()))
}

/// An EOTS signature, i.e. `s` in a Schnorr signature `(R, s)`.
pub type Signature = Scalar;

pub fn new_sig(s: &Buf32) -> Result<Signature> {
    Scalar::from_repr_vartime(FieldBytes::from(s.into_inner())).ok_or(EotsError::ScalarParseFailed)
}

pub fn sig_to_bytes(s: &Signature) -> Buf32 {
    Buf32::from(<[u8; 32]>::from(s.to_bytes()))
}

fn point_x_bytes(p: &ProjectivePoint) -> [u8; 32] {
    let encoded = p.to_encoded_point(false);
    let x = encoded.x().expect("eots: point at infinity");
    (*x).into()
}

/// Lifts a 32-byte x coordinate to the curve point with even y.
fn lift_x(x_bytes: &[u8]) -> Result<ProjectivePoint> {
    let array: [u8; 32] = x_bytes
        .try_into()
        .map_err(|_| EotsError::InvalidInputLength(x_bytes.len()))?;
    let affine = AffinePoint::decompress(&FieldBytes::from(array), Choice::from(0));
    if affine.is_some().into() {
        Ok(ProjectivePoint::from(affine.unwrap()))
    } else {
        Err(EotsError::PointParseFailed)
    }
}

/// BIP-340 challenge scalar `e = H_tag(x(R) || x(P) || m)`.
fn challenge(r_bytes: &[u8; 32], p_bytes: &[u8; 32], msg_hash: &Buf32) -> Scalar {
    <Scalar as Reduce<U256>>::reduce_bytes(
        &tagged_hash(CHALLENGE_TAG)
            .chain_update(r_bytes)
            .chain_update(p_bytes)
            .chain_update(msg_hash.as_bytes())
            .finalize(),
    )
}

/// An EOTS secret key, a nonzero scalar.
#[derive(Debug, Clone)]
pub struct SecretKey {
    inner: k256::SecretKey,
}

impl SecretKey {
    pub fn from_bytes(x: &Buf32) -> Result<Self> {
        let scalar = Scalar::from_repr_vartime(FieldBytes::from(x.into_inner()))
            .ok_or(EotsError::SecretKeyParseFailed)?;
        if bool::from(scalar.is_zero()) {
            return Err(EotsError::SecretKeyParseFailed);
        }
        Ok(Self {
            inner: k256::SecretKey::new(scalar.into()),
        })
    }

    pub fn pubkey(&self) -> PublicKey {
        PublicKey {
            inner: self.inner.public_key(),
        }
    }

    pub fn to_bytes(&self) -> Buf32 {
        Buf32::from(<[u8; 32]>::from(self.inner.to_bytes()))
    }

    /// Signs `msg_hash` against the fixed randomness `sec_rand`.
    ///
    /// Both the key and the nonce are negated when their public point has an
    /// odd y coordinate, so the signature verifies against the x-only
    /// encodings the chain holds.
    pub fn sign(&self, sec_rand: &SecRand, msg_hash: &Buf32) -> Signature {
        let mut x: Scalar = *self.inner.to_nonzero_scalar();
        let p = ProjectivePoint::mul_by_generator(&x);
        if bool::from(p.to_affine().y_is_odd()) {
            x = -x;
        }
        let p_bytes = point_x_bytes(&p);

        let mut k = *sec_rand;
        let r = ProjectivePoint::mul_by_generator(&k);
        if bool::from(r.to_affine().y_is_odd()) {
            k = -k;
        }
        let r_bytes = point_x_bytes(&r);

        let c = challenge(&r_bytes, &p_bytes, msg_hash);
        k + c * x
    }
}

/// An EOTS public key, encoded x-only on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    inner: k256::PublicKey,
}

impl PublicKey {
    pub fn from_bytes(x_bytes: &Buf32) -> Result<Self> {
        let point = lift_x(x_bytes.as_bytes())?;
        let inner = k256::PublicKey::from_affine(point.to_affine())
            .map_err(|_| EotsError::PointParseFailed)?;
        Ok(Self { inner })
    }

    pub fn to_bytes(&self) -> Buf32 {
        Buf32::from(point_x_bytes(&self.inner.to_projective()))
    }

    /// Verifies `sig` over `msg_hash` against the committed randomness.
    pub fn verify(&self, pub_rand: &PubRand, msg_hash: &Buf32, sig: &Signature) -> Result<bool> {
        let p_bytes = point_x_bytes(&self.inner.to_projective());
        let p = lift_x(&p_bytes)?;
        let r_bytes = point_x_bytes(pub_rand);
        let r = lift_x(&r_bytes)?;

        let c = challenge(&r_bytes, &p_bytes, msg_hash);
        let recovered = ProjectivePoint::mul_by_generator(sig) - p * c;
        Ok(recovered == r)
    }
}

/// Extracts the secret key from two signatures under the same randomness
/// over distinct messages.
pub fn extract(
    pk: &PublicKey,
    pub_rand: &PubRand,
    msg1: &Buf32,
    sig1: &Signature,
    msg2: &Buf32,
    sig2: &Signature,
) -> Result<SecretKey> {
    let p_bytes = point_x_bytes(&pk.inner.to_projective());
    let r_bytes = point_x_bytes(pub_rand);

    let e1 = challenge(&r_bytes, &p_bytes, msg1);
    let e2 = challenge(&r_bytes, &p_bytes, msg2);
    let e_delta = e1 - e2;
    let s_delta = *sig1 - *sig2;

    let inverted = e_delta.invert();
    if bool::from(inverted.is_none()) {
        return Err(EotsError::NotInvertible);
    }
    let mut sk = s_delta * inverted.unwrap();

    // The signer may have negated its key for even-y; recover the scalar
    // matching the x-only public key.
    let candidate = ProjectivePoint::mul_by_generator(&sk);
    if point_x_bytes(&candidate) != point_x_bytes(&pk.inner.to_projective()) {
        sk = -sk;
    }

    if bool::from(sk.is_zero()) {
        return Err(EotsError::SecretKeyParseFailed);
    }
    Ok(SecretKey {
        inner: k256::SecretKey::new(sk.into()),
    })
}
