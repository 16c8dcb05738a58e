//! Streaming file digests.
//!
//! Files are read in fixed 1 MiB chunks and every chunk is fed to one or
//! more accumulators. `multi_hash` exists so that checking records created
//! with different algorithms costs a single read of the file.

use std::collections::HashMap;
use std::fmt;
use std::io::{self, Read};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::digest::DynDigest;

/// Read buffer size (1 MiB)
pub const BUF_SIZE: usize = 1024 * 1024;

/// A streaming digest that can be fed chunk by chunk.
pub type Accumulator = Box<dyn DynDigest + Send>;

/// Hashing algorithms a record may be created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Algorithm {
    #[serde(rename = "SHA256", alias = "sha256", alias = "SHA_256", alias = "sha_256")]
    Sha256,
    #[serde(
        rename = "RIPEMD160",
        alias = "ripemd160",
        alias = "RIPEMD_160",
        alias = "ripemd_160"
    )]
    Ripemd160,
    #[serde(rename = "SHA3256", alias = "sha3256", alias = "SHA3_256", alias = "sha3_256")]
    Sha3_256,
}

impl Algorithm {
    pub const ALL: [Algorithm; 3] = [Algorithm::Sha256, Algorithm::Ripemd160, Algorithm::Sha3_256];

    /// Canonical name as stored in the metadata blob.
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Sha256 => "SHA256",
            Algorithm::Ripemd160 => "RIPEMD160",
            Algorithm::Sha3_256 => "SHA3256",
        }
    }

    /// Number of hex characters in a digest produced by this algorithm.
    pub fn hex_len(&self) -> usize {
        match self {
            Algorithm::Ripemd160 => 40,
            Algorithm::Sha256 | Algorithm::Sha3_256 => 64,
        }
    }

    /// Create a fresh accumulator for this algorithm.
    pub fn accumulator(&self) -> Accumulator {
        match self {
            Algorithm::Sha256 => Box::new(sha2::Sha256::default()),
            Algorithm::Ripemd160 => Box::new(ripemd::Ripemd160::default()),
            Algorithm::Sha3_256 => Box::new(sha3::Sha3_256::default()),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a name does not denote a supported algorithm.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown hashing algorithm \"{0}\"")]
pub struct UnknownAlgorithm(pub String);

impl FromStr for Algorithm {
    type Err = UnknownAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SHA256" | "sha256" | "SHA_256" | "sha_256" => Ok(Algorithm::Sha256),
            "RIPEMD160" | "ripemd160" | "RIPEMD_160" | "ripemd_160" => Ok(Algorithm::Ripemd160),
            "SHA3256" | "sha3256" | "SHA3_256" | "sha3_256" => Ok(Algorithm::Sha3_256),
            other => Err(UnknownAlgorithm(other.to_string())),
        }
    }
}

/// Feed everything readable from `src` into `acc`.
///
/// Reads until end of stream; any read error other than `Interrupted` is
/// returned as is.
pub fn hash<R: Read + ?Sized>(src: &mut R, acc: &mut dyn DynDigest) -> io::Result<u64> {
    let mut buf = vec![0u8; BUF_SIZE];
    let mut total = 0u64;
    loop {
        let n = match src.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        acc.update(&buf[..n]);
        total += n as u64;
    }
    Ok(total)
}

/// Feed `src` into every accumulator of `accs` in a single read pass.
pub fn multi_hash<R: Read + ?Sized>(
    src: &mut R,
    accs: &mut HashMap<Algorithm, Accumulator>,
) -> io::Result<u64> {
    let mut buf = vec![0u8; BUF_SIZE];
    let mut total = 0u64;
    loop {
        let n = match src.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        for acc in accs.values_mut() {
            acc.update(&buf[..n]);
        }
        total += n as u64;
    }
    Ok(total)
}

/// Finalize an accumulator into a lowercase hex string and reset it.
#[inline]
pub fn digest_hex(acc: &mut dyn DynDigest) -> String {
    hex::encode(acc.finalize_reset())
}

/// Hash all of `src` with a single algorithm and return the hex digest.
pub fn hash_hex<R: Read + ?Sized>(src: &mut R, algorithm: Algorithm) -> io::Result<String> {
    let mut acc = algorithm.accumulator();
    hash(src, acc.as_mut())?;
    Ok(digest_hex(acc.as_mut()))
}
