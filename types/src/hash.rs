//! Fixed-size identifiers and hex serde helpers.

use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error, Read, Write};
use commonware_cryptography::{sha256::Sha256, Hasher};
use commonware_utils::{from_hex, hex};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A 32-byte identifier (token IDs, transaction IDs, header and proof hashes).
///
/// Ordering is bytewise, which keeps every `BTreeMap` keyed by an ID stable across
/// nodes.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct H256(pub [u8; 32]);

/// Internal token identifier.
pub type TokenId = H256;

/// Transaction identifier of the shard transaction that carried an action.
pub type TxId = H256;

impl H256 {
    pub const LEN: usize = 32;
    pub const ZERO: H256 = H256([0u8; 32]);

    /// SHA-256 of `data`.
    pub fn digest(data: &[u8]) -> Self {
        let digest = Sha256::hash(data);
        let mut out = [0u8; 32];
        out.copy_from_slice(digest.as_ref());
        Self(out)
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let array: [u8; 32] = bytes.try_into().ok()?;
        Some(Self(array))
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        Self::from_slice(&from_hex(s)?)
    }

    pub fn to_hex(&self) -> String {
        hex(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for H256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for H256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "H256({})", self.to_hex())
    }
}

impl Serialize for H256 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for H256 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        H256::from_hex(&s).ok_or_else(|| serde::de::Error::custom("expected 32-byte hex string"))
    }
}

impl Write for H256 {
    fn write(&self, writer: &mut impl BufMut) {
        writer.put_slice(&self.0);
    }
}

impl Read for H256 {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        if reader.remaining() < Self::LEN {
            return Err(Error::EndOfBuffer);
        }
        let mut out = [0u8; 32];
        reader.copy_to_slice(&mut out);
        Ok(Self(out))
    }
}

impl EncodeSize for H256 {
    fn encode_size(&self) -> usize {
        Self::LEN
    }
}

/// Serde adapter for variable-length byte strings carried as hex (external token
/// IDs, unique ETH transaction IDs).
pub mod serde_hex_bytes {
    use commonware_utils::{from_hex, hex};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        from_hex(&s).ok_or_else(|| serde::de::Error::custom("invalid hex string"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use commonware_codec::{Encode, ReadExt};

    #[test]
    fn hex_round_trip_and_ordering() {
        let a = H256::digest(b"token-a");
        let parsed = H256::from_hex(&a.to_hex()).expect("hex should parse");
        assert_eq!(a, parsed);

        let mut low = [0u8; 32];
        low[31] = 1;
        let mut high = [0u8; 32];
        high[0] = 1;
        assert!(H256(low) < H256(high));
    }

    #[test]
    fn rejects_wrong_length_hex() {
        assert!(H256::from_hex("abcd").is_none());
        assert!(H256::from_hex("zz").is_none());
    }

    #[test]
    fn serde_uses_hex_strings() {
        let id = H256::digest(b"tx");
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, format!("\"{}\"", id.to_hex()));
        let back: H256 = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, id);
    }

    #[test]
    fn codec_rejects_truncated_buffer() {
        let id = H256::digest(b"codec");
        let encoded = id.encode();
        assert_eq!(encoded.len(), 32);
        let mut short = &encoded[..31];
        assert!(matches!(H256::read(&mut short), Err(Error::EndOfBuffer)));
    }
}
