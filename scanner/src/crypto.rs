//! Dual-key stealth addresses over curve25519
//!
//! Recipient keys are a scan/viewing scalar `s` and a spend scalar `b`, with
//! public keys `S = s·G` and `B = b·G`. A donor picks an ephemeral `r`,
//! publishes `R = r·G` and pays to the address of `P = B + H(r·S)·G`.
//!
//! The announced ephemeral key region is `view_tag || R`. The one-byte view
//! tag lets the recipient discard almost every foreign announcement after a
//! single scalar multiplication, before any hashing to the curve.

use alloy_primitives::{keccak256, Address};
use curve25519_dalek::{
    constants::ED25519_BASEPOINT_POINT,
    edwards::{CompressedEdwardsY, EdwardsPoint},
    scalar::Scalar,
};
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::announcement::Announcement;
use crate::collaborators::KeyMaterial;
use crate::error::MatchError;

/// Domain separator for the shared-secret scalar
const DOMAIN_SEPARATOR: &[u8] = b"stealth-donations/v1";

/// Domain separator for the view tag
const VIEW_TAG_DOMAIN: &[u8] = b"stealth-donations/view-tag/v1";

/// Prefix of the published meta-address
pub const META_ADDRESS_PREFIX: &str = "st:eth:0x";

/// Length of a tagged ephemeral key region
pub const TAGGED_EPHEMERAL_LEN: usize = 33;

/// Decides whether an announcement is addressed to the holder of some keys.
///
/// Implementations own the layout of the ephemeral key region, including
/// where (and whether) a view tag lives in it.
pub trait StealthScheme: Send + Sync {
    /// Cheap pre-filter. `Ok(false)` means "certainly not ours".
    fn view_tag_matches(&self, keys: &KeyMaterial, announcement: &Announcement) -> Result<bool, MatchError>;

    /// Full derivation of the address this announcement would pay for `keys`
    fn derive_recipient(&self, keys: &KeyMaterial, announcement: &Announcement) -> Result<Address, MatchError>;
}

/// A scalar that zeroizes its bytes on drop
#[derive(Clone)]
pub struct SecretScalar {
    bytes: [u8; 32],
}

impl SecretScalar {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    pub fn from_scalar(scalar: &Scalar) -> Self {
        Self { bytes: scalar.to_bytes() }
    }

    pub fn to_scalar(&self) -> Scalar {
        Scalar::from_bytes_mod_order(self.bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }
}

impl Drop for SecretScalar {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

/// Complete recipient key set
///
/// Not `Clone`: secrets should not be duplicated by accident.
pub struct StealthKeys {
    scan_secret: SecretScalar,
    spend_secret: SecretScalar,
    /// `S = s·G`
    pub scan_pubkey: [u8; 32],
    /// `B = b·G`
    pub spend_pubkey: [u8; 32],
}

impl StealthKeys {
    /// Generate new random keys from OS entropy
    pub fn generate() -> Self {
        let mut rng = rand::rngs::OsRng;
        let scan = random_scalar(&mut rng);
        let spend = random_scalar(&mut rng);
        Self::from_scalars(&scan, &spend)
    }

    /// Reconstruct keys from stored secrets
    pub fn from_secrets(scan_secret: &[u8; 32], spend_secret: &[u8; 32]) -> Self {
        let scan = Scalar::from_bytes_mod_order(*scan_secret);
        let spend = Scalar::from_bytes_mod_order(*spend_secret);
        Self::from_scalars(&scan, &spend)
    }

    fn from_scalars(scan: &Scalar, spend: &Scalar) -> Self {
        let g = ED25519_BASEPOINT_POINT;
        Self {
            scan_secret: SecretScalar::from_scalar(scan),
            spend_secret: SecretScalar::from_scalar(spend),
            scan_pubkey: (scan * g).compress().to_bytes(),
            spend_pubkey: (spend * g).compress().to_bytes(),
        }
    }

    /// `st:eth:0x<spend pubkey><scan pubkey>`
    pub fn meta_address(&self) -> String {
        encode_meta_address(&self.spend_pubkey, &self.scan_pubkey)
    }

    /// Export secrets as `(scan, spend)` for encrypted storage
    pub fn export_secrets(&self) -> ([u8; 32], [u8; 32]) {
        (*self.scan_secret.as_bytes(), *self.spend_secret.as_bytes())
    }

    pub fn key_material(&self) -> KeyMaterial {
        KeyMaterial::new(*self.spend_secret.as_bytes(), *self.scan_secret.as_bytes())
    }
}

pub fn encode_meta_address(spend_pubkey: &[u8; 32], scan_pubkey: &[u8; 32]) -> String {
    format!(
        "{META_ADDRESS_PREFIX}{}{}",
        hex::encode(spend_pubkey),
        hex::encode(scan_pubkey)
    )
}

/// Split a meta-address into `(spend_pubkey, scan_pubkey)`
pub fn decode_meta_address(meta_address: &str) -> Result<([u8; 32], [u8; 32]), MatchError> {
    let hex_part = meta_address
        .trim()
        .strip_prefix(META_ADDRESS_PREFIX)
        .ok_or(MatchError::InvalidMetaAddress("missing st:eth:0x prefix"))?;
    let bytes = hex::decode(hex_part).map_err(|_| MatchError::InvalidMetaAddress("not hex"))?;
    if bytes.len() != 64 {
        return Err(MatchError::InvalidMetaAddress("expected two 32-byte keys"));
    }

    let mut spend = [0u8; 32];
    let mut scan = [0u8; 32];
    spend.copy_from_slice(&bytes[..32]);
    scan.copy_from_slice(&bytes[32..]);
    if decompress_point(&spend).is_none() || decompress_point(&scan).is_none() {
        return Err(MatchError::InvalidMetaAddress("key is not a curve point"));
    }
    Ok((spend, scan))
}

fn random_scalar<R: RngCore>(rng: &mut R) -> Scalar {
    let mut bytes = [0u8; 32];
    rng.fill_bytes(&mut bytes);
    let scalar = Scalar::from_bytes_mod_order(bytes);
    bytes.zeroize();
    scalar
}

fn hash_to_scalar(data: &[u8]) -> Scalar {
    let mut hasher = Sha256::new();
    hasher.update(DOMAIN_SEPARATOR);
    hasher.update(data);
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&hasher.finalize());
    let scalar = Scalar::from_bytes_mod_order(bytes);
    bytes.zeroize();
    scalar
}

fn view_tag_of(shared_secret: &[u8; 32]) -> u8 {
    let mut hasher = Sha256::new();
    hasher.update(VIEW_TAG_DOMAIN);
    hasher.update(shared_secret);
    hasher.finalize()[0]
}

fn decompress_point(bytes: &[u8; 32]) -> Option<EdwardsPoint> {
    CompressedEdwardsY::from_slice(bytes).decompress()
}

/// Ethereum-style address of a curve point: last 20 bytes of keccak256
pub fn point_address(point: &EdwardsPoint) -> Address {
    let hash = keccak256(point.compress().as_bytes());
    Address::from_slice(&hash[12..])
}

/// Split the ephemeral region into an optional tag and `R`
fn split_ephemeral(region: &[u8]) -> Result<(Option<u8>, [u8; 32]), MatchError> {
    let (tag, point) = match region.len() {
        TAGGED_EPHEMERAL_LEN => (Some(region[0]), &region[1..]),
        32 => (None, region),
        _ => return Err(MatchError::InvalidEphemeralKey),
    };
    let mut r = [0u8; 32];
    r.copy_from_slice(point);
    Ok((tag, r))
}

/// `ss = s·R`, compressed
fn shared_secret(scan_secret: &Scalar, ephemeral: &[u8; 32]) -> Result<[u8; 32], MatchError> {
    let r = decompress_point(ephemeral).ok_or(MatchError::InvalidEphemeralKey)?;
    Ok((scan_secret * r).compress().to_bytes())
}

/// What a donor publishes and pays to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StealthPayment {
    /// `view_tag || R`
    pub ephemeral_pub_key: Vec<u8>,
    pub view_tag: u8,
    pub stealth_address: Address,
}

/// Sender side: derive a fresh one-time address for `(S, B)`
pub fn compute_stealth_payment(
    scan_pubkey: &[u8; 32],
    spend_pubkey: &[u8; 32],
) -> Result<StealthPayment, MatchError> {
    let g = ED25519_BASEPOINT_POINT;
    let scan_point = decompress_point(scan_pubkey).ok_or(MatchError::InvalidMetaAddress("scan key is not a curve point"))?;
    let spend_point = decompress_point(spend_pubkey).ok_or(MatchError::InvalidSpendKey)?;

    let ephemeral = SecretScalar::from_scalar(&random_scalar(&mut rand::rngs::OsRng));
    let r = ephemeral.to_scalar();
    let ephemeral_pubkey = (r * g).compress().to_bytes();

    let mut ss = (r * scan_point).compress().to_bytes();
    let view_tag = view_tag_of(&ss);
    let stealth_point = spend_point + hash_to_scalar(&ss) * g;
    ss.zeroize();

    let mut region = Vec::with_capacity(TAGGED_EPHEMERAL_LEN);
    region.push(view_tag);
    region.extend_from_slice(&ephemeral_pubkey);

    Ok(StealthPayment {
        ephemeral_pub_key: region,
        view_tag,
        stealth_address: point_address(&stealth_point),
    })
}

/// Recipient side: the one-time spending scalar `p = b + H(s·R)`
pub fn derive_spending_key(keys: &KeyMaterial, ephemeral_region: &[u8]) -> Result<SecretScalar, MatchError> {
    let (_, r) = split_ephemeral(ephemeral_region)?;
    let scan = SecretScalar::from_bytes(*keys.viewing_key());
    let spend = SecretScalar::from_bytes(*keys.spending_key());
    let mut ss = shared_secret(&scan.to_scalar(), &r)?;
    let p = spend.to_scalar() + hash_to_scalar(&ss);
    ss.zeroize();
    Ok(SecretScalar::from_scalar(&p))
}

/// Default scheme: DKSAP over curve25519 with a leading view tag
#[derive(Debug, Clone, Copy, Default)]
pub struct DksapScheme;

impl StealthScheme for DksapScheme {
    fn view_tag_matches(&self, keys: &KeyMaterial, announcement: &Announcement) -> Result<bool, MatchError> {
        let (tag, r) = split_ephemeral(&announcement.ephemeral_pub_key)?;
        let Some(tag) = tag else {
            // untagged announcements cannot be filtered cheaply
            return Ok(true);
        };
        let scan = SecretScalar::from_bytes(*keys.viewing_key());
        let mut ss = shared_secret(&scan.to_scalar(), &r)?;
        let matches = bool::from(view_tag_of(&ss).ct_eq(&tag));
        ss.zeroize();
        Ok(matches)
    }

    fn derive_recipient(&self, keys: &KeyMaterial, announcement: &Announcement) -> Result<Address, MatchError> {
        let (_, r) = split_ephemeral(&announcement.ephemeral_pub_key)?;
        let scan = SecretScalar::from_bytes(*keys.viewing_key());
        let spend_point = SecretScalar::from_bytes(*keys.spending_key()).to_scalar() * ED25519_BASEPOINT_POINT;
        if spend_point == EdwardsPoint::default() {
            return Err(MatchError::InvalidSpendKey);
        }

        let mut ss = shared_secret(&scan.to_scalar(), &r)?;
        let stealth_point = spend_point + hash_to_scalar(&ss) * ED25519_BASEPOINT_POINT;
        ss.zeroize();
        Ok(point_address(&stealth_point))
    }
}
