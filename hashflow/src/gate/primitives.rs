//! Hash primitive implementations.

use crate::errors::PrimitiveError;
use md5::{Digest, Md5};
use std::fmt;

/// Which primitive a call targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    /// The digest function.
    Digest,
    /// The checksum function.
    Checksum,
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Digest => write!(f, "digest"),
            Self::Checksum => write!(f, "checksum"),
        }
    }
}

/// The two string-to-string functions the hashing stages consume.
///
/// Implementations are synchronous and may block; the gate runs them on the
/// blocking pool.
#[cfg_attr(test, mockall::automock)]
pub trait HashPrimitives: Send + Sync {
    /// Computes the digest of `data`.
    fn digest(&self, data: &str) -> Result<String, PrimitiveError>;

    /// Computes the checksum of `data`.
    fn checksum(&self, data: &str) -> Result<String, PrimitiveError>;
}

/// MD5 digest and CRC-32 checksum, both rendered as lowercase hex.
///
/// Checksums are always 8 characters wide.
#[derive(Debug, Clone, Copy, Default)]
pub struct Md5Crc32;

impl HashPrimitives for Md5Crc32 {
    fn digest(&self, data: &str) -> Result<String, PrimitiveError> {
        Ok(hex::encode(Md5::digest(data.as_bytes())))
    }

    fn checksum(&self, data: &str) -> Result<String, PrimitiveError> {
        Ok(format!("{:08x}", crc32fast::hash(data.as_bytes())))
    }
}

/// Transparent primitives for predictable outputs.
///
/// `digest(x) = x` and `checksum(x) = "C(" + x + ")"`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StubPrimitives;

impl HashPrimitives for StubPrimitives {
    fn digest(&self, data: &str) -> Result<String, PrimitiveError> {
        Ok(data.to_string())
    }

    fn checksum(&self, data: &str) -> Result<String, PrimitiveError> {
        Ok(format!("C({data})"))
    }
}
