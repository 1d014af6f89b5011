use std::{fmt, str};

use borsh::{BorshDeserialize, BorshSerialize};

/// 32-byte buf, useful for hashes and x-only schnorr pubkeys.
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Buf32(pub [u8; 32]);

impl Buf32 {
    pub fn zero() -> Self {
        Self([0; 32])
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_inner(self) -> [u8; 32] {
        self.0
    }
}

impl From<[u8; 32]> for Buf32 {
    fn from(value: [u8; 32]) -> Self {
        Self(value)
    }
}

impl AsRef<[u8]> for Buf32 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl TryFrom<&[u8]> for Buf32 {
    type Error = ParseBufError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let array: [u8; 32] = value
            .try_into()
            .map_err(|_| ParseBufError::InvalidLength(32, value.len()))?;
        Ok(Self(array))
    }
}

impl str::FromStr for Buf32 {
    type Err = ParseBufError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut array = [0u8; 32];
        hex::decode_to_slice(s, &mut array)?;
        Ok(Self(array))
    }
}

impl fmt::Display for Buf32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Buf32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl BorshSerialize for Buf32 {
    fn serialize<W: std::io::Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&self.0)
    }
}

impl BorshDeserialize for Buf32 {
    fn deserialize_reader<R: std::io::Read>(reader: &mut R) -> std::io::Result<Self> {
        let mut array = [0u8; 32];
        reader.read_exact(&mut array)?;
        Ok(Self(array))
    }
}

/// 64-byte buf, useful for schnorr signatures.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Buf64(pub [u8; 64]);

impl Buf64 {
    pub fn zero() -> Self {
        Self([0; 64])
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 64]> for Buf64 {
    fn from(value: [u8; 64]) -> Self {
        Self(value)
    }
}

impl AsRef<[u8]> for Buf64 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Buf64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Buf64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl BorshSerialize for Buf64 {
    fn serialize<W: std::io::Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&self.0)
    }
}

impl BorshDeserialize for Buf64 {
    fn deserialize_reader<R: std::io::Read>(reader: &mut R) -> std::io::Result<Self> {
        let mut array = [0u8; 64];
        reader.read_exact(&mut array)?;
        Ok(Self(array))
    }
}

// Serde via hex strings, for config files and the json-rpc transport.
impl serde::Serialize for Buf32 {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> serde::Deserialize<'de> for Buf32 {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl serde::Serialize for Buf64 {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> serde::Deserialize<'de> for Buf64 {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        let mut array = [0u8; 64];
        hex::decode_to_slice(&s, &mut array).map_err(serde::de::Error::custom)?;
        Ok(Self(array))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ParseBufError {
    #[error("expected {0} bytes, got {1}")]
    InvalidLength(usize, usize),

    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::Buf32;

    #[test]
    fn test_buf32_hex_roundtrip() {
        let buf = Buf32::from([0xa5; 32]);
        let s = buf.to_string();
        assert_eq!(s.len(), 64);
        assert_eq!(Buf32::from_str(&s).unwrap(), buf);
    }

    #[test]
    fn test_buf32_rejects_short_hex() {
        assert!(Buf32::from_str("deadbeef").is_err());
    }

    #[test]
    fn test_buf32_serde_hex() {
        let buf = Buf32::from([0x1f; 32]);
        let json = serde_json::to_string(&buf).unwrap();
        assert_eq!(json, format!("\"{buf}\""));
        let back: Buf32 = serde_json::from_str(&json).unwrap();
        assert_eq!(back, buf);
    }

    #[test]
    fn test_buf32_borsh_roundtrip() {
        let buf = Buf32::from([7; 32]);
        let enc = borsh::to_vec(&buf).unwrap();
        assert_eq!(enc.len(), 32);
        let dec: Buf32 = borsh::from_slice(&enc).unwrap();
        assert_eq!(dec, buf);
    }
}
