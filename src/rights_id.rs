//! Content rights identifiers.
//!
//! Every ticket authorizes exactly one rights id: the 8-byte title id of the
//! content followed by reserved bytes and a trailing key-generation byte.
//! The text form used in key files and tool output is 32 lowercase hex
//! characters.

use std::fmt;
use std::str::FromStr;

use byteorder::{BigEndian, ByteOrder};

use crate::error::{Error, Result};

/// Byte length of a rights id.
pub const RIGHTS_ID_SIZE: usize = 16;

/// A 16-byte content rights identifier.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RightsId([u8; RIGHTS_ID_SIZE]);

impl RightsId {
    /// Wrap raw rights-id bytes.
    pub fn new(bytes: [u8; RIGHTS_ID_SIZE]) -> Self {
        Self(bytes)
    }

    /// Raw bytes, big-endian wire order.
    pub fn as_bytes(&self) -> &[u8; RIGHTS_ID_SIZE] {
        &self.0
    }

    /// Title id of the content this rights id belongs to.
    pub fn title_id(&self) -> u64 {
        BigEndian::read_u64(&self.0[..8])
    }

    /// Key-generation byte (the final byte of the id).
    pub fn key_generation(&self) -> u8 {
        self.0[RIGHTS_ID_SIZE - 1]
    }

    /// True for the all-zero id.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; RIGHTS_ID_SIZE]
    }
}

impl From<[u8; RIGHTS_ID_SIZE]> for RightsId {
    fn from(bytes: [u8; RIGHTS_ID_SIZE]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for RightsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for RightsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RightsId({})", hex::encode(self.0))
    }
}

impl FromStr for RightsId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut bytes = [0u8; RIGHTS_ID_SIZE];
        hex::decode_to_slice(s.trim(), &mut bytes)
            .map_err(|_| Error::MalformedKeyData("rights id must be 32 hex characters"))?;
        Ok(Self(bytes))
    }
}
