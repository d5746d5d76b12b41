//! Blake3 content digests for compiled units.

use blake3::Hash;
use core::array::TryFromSliceError;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash as StdHash, Hasher};

pub const DIGEST_LEN: usize = 32;

/// A 32-byte Blake3 digest of a unit body. Two units with the same
/// declarations in the same order have the same digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Digest {
  hash: Hash,
}

impl Digest {
  pub fn of(input: &[u8]) -> Self {
    Digest { hash: blake3::hash(input) }
  }

  pub fn from_slice(input: &[u8]) -> Result<Self, TryFromSliceError> {
    Ok(Digest { hash: Hash::from_slice(input)? })
  }

  pub fn hex(&self) -> String {
    self.hash.to_hex().as_str().to_owned()
  }

  pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
    self.hash.as_bytes()
  }
}

impl Ord for Digest {
  fn cmp(&self, other: &Digest) -> Ordering {
    self.as_bytes().cmp(other.as_bytes())
  }
}

impl PartialOrd for Digest {
  fn partial_cmp(&self, other: &Digest) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl StdHash for Digest {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.as_bytes().hash(state);
  }
}

impl fmt::Display for Digest {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", &self.hex()[..16])
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use quickcheck::{Arbitrary, Gen};
  use quickcheck_macros::quickcheck;

  impl Arbitrary for Digest {
    fn arbitrary(g: &mut Gen) -> Self {
      let bytes: Vec<u8> = (0..DIGEST_LEN).map(|_| u8::arbitrary(g)).collect();
      Digest::from_slice(&bytes).unwrap()
    }
  }

  #[quickcheck]
  fn prop_bytes_roundtrip(d: Digest) -> bool {
    Digest::from_slice(d.as_bytes()).unwrap() == d
  }

  #[test]
  fn short_slices_rejected() {
    assert!(Digest::from_slice(&[0u8; 31]).is_err());
  }

  #[test]
  fn display_is_hex_prefix() {
    let d = Digest::of(b"unit");
    assert_eq!(d.to_string(), d.hex()[..16]);
    assert_eq!(d.hex().len(), 64);
  }
}
