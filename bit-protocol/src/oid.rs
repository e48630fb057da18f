use std::fmt::{self, Debug, Display, Formatter};
use std::str::FromStr;

use crate::error::{Error, Result};

/// Size in bytes of a SHA-1 object id.
pub const OID_SIZE: usize = 20;

/// A 20-byte SHA-1 object identifier.
///
/// Renders as 40 lowercase hex characters on the wire. The all-zero value is the
/// sentinel for "no object" and is the only encoding of that concept; callers must
/// never compare hex strings directly, always parse to an `ObjectId` first.
#[derive(PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ObjectId([u8; OID_SIZE]);

impl ObjectId {
    /// the sentinel "no object" id
    pub const ZERO: Self = Self([0; OID_SIZE]);

    #[inline]
    pub fn new(bytes: [u8; OID_SIZE]) -> Self {
        Self(bytes)
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; OID_SIZE] {
        &self.0
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// parse a raw 40-character hex string, failing with `InvalidAdvertisement` rather
    /// than a generic parse error, since this is always invoked while decoding wire data
    pub fn parse_hex(s: &str) -> Result<Self> {
        if s.len() != OID_SIZE * 2 {
            return Err(Error::InvalidAdvertisement(format!(
                "expected a {}-character hex object id, got `{}` ({} chars)",
                OID_SIZE * 2,
                s,
                s.len()
            )));
        }
        let mut bytes = [0u8; OID_SIZE];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|_| Error::InvalidAdvertisement(format!("invalid hex object id `{}`", s)))?;
        Ok(Self(bytes))
    }
}

impl Debug for ObjectId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

impl Display for ObjectId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::ZERO
    }
}

impl FromStr for ObjectId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse_hex(s)
    }
}

#[cfg(test)]
impl<'a> From<&'a str> for ObjectId {
    fn from(s: &'a str) -> Self {
        Self::from_str(s).unwrap()
    }
}

#[cfg(test)]
impl quickcheck::Arbitrary for ObjectId {
    fn arbitrary(g: &mut quickcheck::Gen) -> Self {
        let mut bytes = [0u8; OID_SIZE];
        for b in &mut bytes {
            *b = u8::arbitrary(g);
        }
        Self(bytes)
    }
}
