use curve25519_dalek::edwards::CompressedEdwardsY;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::ops::Deref;

/// Identifies an edition class. Multiple interchangeable units share one token id.
pub type TokenId = u64;

// Address identifies an account or a ledger-owned identity.
// It is a 32 byte long unique identifier, resembling a public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address([u8; 32]);

impl Default for Address {
    fn default() -> Self {
        Address([0; 32])
    }
}

impl Deref for Address {
    type Target = [u8; 32];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl Address {
    pub fn new(bytes: [u8; 32]) -> Self {
        Address(bytes)
    }

    pub fn create_address(seeds: &[&[u8]], bump: u8) -> [u8; 32] {
        let mut hasher = Sha256::new();

        // Domain separator
        hasher.update(b"EDITIONS_Address");

        // Add all seeds
        for seed in seeds {
            hasher.update(seed);
        }

        // Add bump
        hasher.update([bump]);

        hasher.finalize().into()
    }

    /// Verify that a 32-byte array is not a valid point on the ed25519 curve.
    /// Off-curve addresses have no corresponding private key, so nothing can
    /// ever sign for them. Ledger-owned identities must be off-curve.
    pub fn is_off_curve(bytes: &[u8; 32]) -> bool {
        let Ok(compressed_edwards_y) = CompressedEdwardsY::from_slice(bytes.as_ref()) else {
            return false;
        };
        compressed_edwards_y.decompress().is_none()
    }

    /// Try to find an off-curve Address for the given seeds
    pub fn try_find_derived(seeds: &[&[u8]]) -> Option<(Address, u8)> {
        for bump in 0..255 {
            let id = Address::create_address(seeds, bump);
            if Address::is_off_curve(&id) {
                return Some((Address(id), bump));
            }
        }
        None
    }

    /// Find an off-curve Address for the given seeds
    pub fn find_derived(seeds: &[&[u8]]) -> (Address, u8) {
        Address::try_find_derived(seeds).expect("Failed to find a derived Address")
    }
}
