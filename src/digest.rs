//! SHA-256 content digests for fetched archives.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

use crate::runtime::Runtime;

/// Chunk size for reading files during hashing (1MB)
const CHUNK_SIZE: usize = 1024 * 1024;

/// Compute the lowercase hex SHA-256 of everything `reader` yields.
pub fn sha256_reader(reader: &mut impl Read) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        let n = reader.read(&mut buffer).context("read error while hashing")?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Compute the lowercase hex SHA-256 of a file.
#[tracing::instrument(skip(runtime))]
pub fn sha256_file<R: Runtime>(runtime: &R, path: &Path) -> Result<String> {
    let mut file = runtime
        .open(path)
        .with_context(|| format!("Failed to open {:?} for hashing", path))?;
    sha256_reader(&mut file).with_context(|| format!("Failed to hash {:?}", path))
}

/// Outcome of comparing a file against its recorded digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Match,
    Mismatch { expected: String, actual: String },
}

/// Compare the file's digest with `expected` (case-insensitive).
pub fn verify_sha256<R: Runtime>(runtime: &R, path: &Path, expected: &str) -> Result<Verification> {
    let actual = sha256_file(runtime, path)?;
    let expected = expected.to_ascii_lowercase();
    if actual == expected {
        Ok(Verification::Match)
    } else {
        Ok(Verification::Mismatch { expected, actual })
    }
}
